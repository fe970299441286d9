use std::path::PathBuf;

use clap::{Parser, Subcommand};
use mirador::{ContentType, SearchIndex, Settings, logging};

#[derive(Parser)]
#[command(name = "mirador")]
#[command(about = "Live change events and full-text search for markdown content")]
struct Cli {
    /// Path to the configuration file (defaults to ./mirador.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the event stream and search server
    Serve {
        /// Bind address (overrides config)
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Build the index once and run a search query
    Search {
        /// Search query
        query: String,

        /// Filter by content type ("thought" or "dream")
        #[arg(short = 't', long = "type")]
        content_type: Option<String>,

        /// Maximum results to return
        #[arg(short, long, default_value_t = 20)]
        limit: usize,

        /// Number of results to skip
        #[arg(short, long, default_value_t = 0)]
        offset: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut settings = match &cli.config {
        Some(path) => Settings::load_from(path)?,
        None => Settings::load()?,
    };
    logging::init_with_config(&settings.logging);

    match cli.command {
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                settings.server.bind = bind;
            }

            #[cfg(feature = "http-server")]
            {
                mirador::http::serve(settings).await?;
            }

            #[cfg(not(feature = "http-server"))]
            {
                eprintln!("HTTP server support is not compiled in.");
                eprintln!("Please rebuild with: cargo build --features http-server");
                std::process::exit(1);
            }
        }

        Commands::Search {
            query,
            content_type,
            limit,
            offset,
        } => {
            let index = SearchIndex::new(&settings.content)?;
            let index = std::sync::Arc::new(index);
            {
                let index = index.clone();
                tokio::task::spawn_blocking(move || index.rebuild()).await??;
            }

            let content_type = content_type.as_deref().and_then(ContentType::parse);
            let response = index.search(&query, content_type, limit, offset);
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
    }

    Ok(())
}
