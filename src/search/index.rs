//! Tantivy-backed full-text search over the content tree.
//!
//! The index lives in RAM and is rebuilt from the filesystem at startup;
//! after that the search subscriber keeps it current one document at a
//! time. Markdown syntax is stripped before body text is indexed, queries
//! are sanitized and assembled programmatically (prefix matching on the
//! final token for incremental typing), and title matches are boosted over
//! body-only matches.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use parking_lot::Mutex;
use regex::Regex;
use serde::Serialize;
use tantivy::collector::{Count, TopDocs};
use tantivy::query::{BooleanQuery, BoostQuery, FuzzyTermQuery, Occur, Query, TermQuery};
use tantivy::schema::{
    Field, IndexRecordOption, STORED, STRING, Schema, SchemaBuilder, TextFieldIndexing,
    TextOptions, Value,
};
use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument as Document, Term};
use thiserror::Error;

use crate::config::ContentConfig;
use crate::content::{ContentError, DreamMeta, ThoughtMeta, read_content};

/// Relevance boost for title matches over body matches.
const TITLE_BOOST: f32 = 10.0;

/// Character budget for title and body snippets.
const TITLE_SNIPPET_CHARS: usize = 120;
const BODY_SNIPPET_CHARS: usize = 160;

const HIGHLIGHT_START: &str = "<mark>";
const HIGHLIGHT_END: &str = "</mark>";

/// Errors from index mutation. Query-side failures never surface; they
/// degrade to empty results inside `search`.
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("index error: {0}")]
    Tantivy(#[from] tantivy::TantivyError),

    #[error(transparent)]
    Content(#[from] ContentError),
}

/// Content kind discriminator for indexed documents and search results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Thought,
    Dream,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Thought => "thought",
            ContentType::Dream => "dream",
        }
    }

    /// Parse a client-supplied filter value. Unknown values mean no filter.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "thought" => Some(ContentType::Thought),
            "dream" => Some(ContentType::Dream),
            _ => None,
        }
    }
}

/// Individual search result with highlighted snippets.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub slug: String,
    /// Title with `<mark>` highlights.
    pub title: String,
    #[serde(rename = "type")]
    pub content_type: ContentType,
    pub date: String,
    /// Body excerpt with `<mark>` highlights.
    pub snippet: String,
    /// Relevance score; lower is better.
    pub score: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mood: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dream_type: Option<String>,
}

/// Paginated search response envelope.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<SearchResult>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

impl SearchResponse {
    fn empty(query: &str, limit: usize, offset: usize) -> Self {
        Self {
            query: query.to_string(),
            results: Vec::new(),
            total: 0,
            limit,
            offset,
        }
    }
}

static MARKDOWN_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"(?m)^#{1,6}\s+", ""),
        (r"(?ms)^```.*?```$", ""),
        (r"\*\*(.+?)\*\*", "$1"),
        (r"\*(.+?)\*", "$1"),
        (r"__(.+?)__", "$1"),
        (r"_(.+?)_", "$1"),
        (r"~~(.+?)~~", "$1"),
        (r"`(.+?)`", "$1"),
        (r"!?\[([^\]]*)\]\([^)]*\)", "$1"),
        (r"(?m)^>\s?", ""),
        (r"(?m)^[-*+]\s", ""),
        (r"(?m)^\d+\.\s", ""),
        (r"(?m)^---+$", ""),
        (r"\n{3,}", "\n\n"),
    ]
    .into_iter()
    .map(|(pattern, replacement)| {
        (
            Regex::new(pattern).expect("markdown pattern is valid"),
            replacement,
        )
    })
    .collect()
});

/// Remove markdown formatting so indexed body text is plain prose.
pub fn strip_markdown(text: &str) -> String {
    let mut result = text.to_string();
    for (pattern, replacement) in MARKDOWN_PATTERNS.iter() {
        result = pattern.replace_all(&result, *replacement).into_owned();
    }
    result.trim().to_string()
}

/// Sanitize a raw user query into lowercase search tokens.
///
/// Splitting on non-alphanumeric characters neutralizes every
/// query-syntax-significant character and mirrors how the default
/// tokenizer splits indexed text. Returns `None` when nothing survives.
pub fn sanitize_query(raw: &str) -> Option<Vec<String>> {
    let tokens: Vec<String> = raw
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect();
    if tokens.is_empty() { None } else { Some(tokens) }
}

/// Extract a window of roughly `window_chars` characters centered on the
/// first token match, expanded outward to word boundaries.
fn excerpt(text: &str, tokens: &[String], window_chars: usize) -> String {
    let text_lower = text.to_lowercase();
    let mut best: Option<usize> = None;
    for token in tokens {
        if let Some(pos) = text_lower.find(token.as_str()) {
            best = Some(best.map_or(pos, |b| b.min(pos)));
        }
    }

    let mut match_pos = best.unwrap_or(0).min(text.len());
    while match_pos > 0 && !text.is_char_boundary(match_pos) {
        match_pos -= 1;
    }

    let chars: Vec<char> = text.chars().collect();
    let total_chars = chars.len();
    let char_pos = text[..match_pos].chars().count();

    let half_window = window_chars / 2;
    let mut start = char_pos.saturating_sub(half_window);
    let mut end = (char_pos + half_window).min(total_chars);

    // Expand to word boundaries so the window never cuts a word.
    while start > 0 && !chars[start - 1].is_whitespace() {
        start -= 1;
    }
    while end < total_chars && !chars[end].is_whitespace() {
        end += 1;
    }

    let mut preview = String::new();
    if start > 0 {
        preview.push_str("...");
    }
    preview.extend(chars[start..end].iter());
    if end < total_chars {
        preview.push_str("...");
    }
    preview
}

/// Wrap every token occurrence with `<mark>` tags, merging overlapping or
/// touching matches into a single span.
fn highlight(text: &str, tokens: &[String]) -> String {
    let text_lower = text.to_lowercase();
    let mut matches: Vec<(usize, usize)> = Vec::new();

    for token in tokens {
        if token.len() < 2 {
            continue;
        }
        let mut search_start = 0;
        while search_start < text_lower.len() {
            let Some(rel) = text_lower[search_start..].find(token.as_str()) else {
                break;
            };
            let start = search_start + rel;
            let end = start + token.len();
            if end <= text.len() && text.is_char_boundary(start) && text.is_char_boundary(end) {
                matches.push((start, end));
            }
            search_start = end;
            while search_start < text_lower.len() && !text_lower.is_char_boundary(search_start) {
                search_start += 1;
            }
        }
    }

    if matches.is_empty() {
        return text.to_string();
    }

    matches.sort_by_key(|m| m.0);
    let mut merged: Vec<(usize, usize)> = Vec::new();
    for (start, end) in matches {
        if let Some(last) = merged.last_mut()
            && start <= last.1
        {
            last.1 = last.1.max(end);
            continue;
        }
        merged.push((start, end));
    }

    let mut out = String::with_capacity(text.len() + merged.len() * 13);
    let mut offset = 0;
    for (start, end) in merged {
        out.push_str(&text[offset..start]);
        out.push_str(HIGHLIGHT_START);
        out.push_str(&text[start..end]);
        out.push_str(HIGHLIGHT_END);
        offset = end;
    }
    out.push_str(&text[offset..]);
    out
}

fn snippet(text: &str, tokens: &[String], window_chars: usize) -> String {
    highlight(&excerpt(text, tokens, window_chars), tokens)
}

/// Schema fields for the content index.
#[derive(Debug)]
struct ContentSchema {
    title: Field,
    body: Field,
    /// Composite `{type}:{slug}` identity used for single-term deletes.
    key: Field,
    slug: Field,
    content_type: Field,
    date: Field,
    mood: Field,
    dream_type: Field,
}

impl ContentSchema {
    fn build() -> (Schema, ContentSchema) {
        let mut builder = SchemaBuilder::default();

        let text_options = TextOptions::default()
            .set_indexing_options(
                TextFieldIndexing::default()
                    .set_tokenizer("default")
                    .set_index_option(IndexRecordOption::WithFreqsAndPositions),
            )
            .set_stored();

        let title = builder.add_text_field("title", text_options.clone());
        let body = builder.add_text_field("body", text_options);

        let key = builder.add_text_field("key", STRING | STORED);
        let slug = builder.add_text_field("slug", STRING | STORED);
        let content_type = builder.add_text_field("content_type", STRING | STORED);
        let date = builder.add_text_field("date", STRING | STORED);
        let mood = builder.add_text_field("mood", STRING | STORED);
        let dream_type = builder.add_text_field("dream_type", STRING | STORED);

        let schema = builder.build();
        let content_schema = ContentSchema {
            title,
            body,
            key,
            slug,
            content_type,
            date,
            mood,
            dream_type,
        };

        (schema, content_schema)
    }
}

/// One row ready for insertion.
struct IndexedDocument {
    title: String,
    body: String,
    slug: String,
    content_type: ContentType,
    date: String,
    mood: Option<String>,
    dream_type: Option<String>,
}

/// In-memory full-text index over both content roots.
///
/// Mutation goes through a mutex-guarded writer; queries go through the
/// tantivy reader and never take that lock.
pub struct SearchIndex {
    reader: IndexReader,
    schema: ContentSchema,
    writer: Mutex<IndexWriter<Document>>,
    thoughts_dir: PathBuf,
    dreams_dir: PathBuf,
}

impl std::fmt::Debug for SearchIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchIndex")
            .field("thoughts_dir", &self.thoughts_dir)
            .field("dreams_dir", &self.dreams_dir)
            .field("document_count", &self.document_count())
            .finish()
    }
}

impl SearchIndex {
    /// Create an empty in-RAM index for the configured content roots.
    pub fn new(content: &ContentConfig) -> Result<Self, SearchError> {
        let (schema, content_schema) = ContentSchema::build();
        let index = Index::create_in_ram(schema);

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;
        let writer = index.writer::<Document>(50_000_000)?;

        Ok(Self {
            reader,
            schema: content_schema,
            writer: Mutex::new(writer),
            thoughts_dir: content.thoughts_dir.clone(),
            dreams_dir: content.dreams_dir.clone(),
        })
    }

    /// Total indexed documents.
    pub fn document_count(&self) -> u64 {
        self.reader.searcher().num_docs()
    }

    /// Expected file location for a document, used to guard stale events.
    pub fn content_path(&self, content_type: ContentType, slug: &str) -> PathBuf {
        let root = match content_type {
            ContentType::Thought => &self.thoughts_dir,
            ContentType::Dream => &self.dreams_dir,
        };
        root.join(format!("{slug}.md"))
    }

    /// Clear the index and rescan both content roots.
    ///
    /// Files that fail to parse are skipped with a warning. Returns the
    /// number of documents indexed.
    pub fn rebuild(&self) -> Result<usize, SearchError> {
        let mut count = 0;
        {
            let mut writer = self.writer.lock();
            writer.delete_all_documents()?;
            count += self.index_directory(&mut writer, &self.thoughts_dir, ContentType::Thought)?;
            count += self.index_directory(&mut writer, &self.dreams_dir, ContentType::Dream)?;
            writer.commit()?;
        }
        self.reader.reload()?;
        crate::log_event!("search", "rebuilt", "{count} documents");
        Ok(count)
    }

    fn index_directory(
        &self,
        writer: &mut IndexWriter<Document>,
        dir: &Path,
        content_type: ContentType,
    ) -> Result<usize, SearchError> {
        if !dir.is_dir() {
            return Ok(0);
        }

        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
            .map_err(|source| ContentError::Io {
                path: dir.to_path_buf(),
                source,
            })?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "md"))
            .collect();
        paths.sort();

        let mut count = 0;
        for path in paths {
            match self.load_document(&path, content_type) {
                Ok(doc) => {
                    self.add_document(writer, &doc)?;
                    count += 1;
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), "skipping unparsable content file: {e}");
                }
            }
        }
        Ok(count)
    }

    fn load_document(
        &self,
        path: &Path,
        content_type: ContentType,
    ) -> Result<IndexedDocument, ContentError> {
        let slug = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();

        match content_type {
            ContentType::Thought => {
                let parsed = read_content::<ThoughtMeta>(path)?;
                Ok(IndexedDocument {
                    title: parsed.meta.title,
                    body: strip_markdown(&parsed.body),
                    slug,
                    content_type,
                    date: parsed.meta.date,
                    mood: parsed.meta.mood,
                    dream_type: None,
                })
            }
            ContentType::Dream => {
                let parsed = read_content::<DreamMeta>(path)?;
                Ok(IndexedDocument {
                    title: parsed.meta.title,
                    body: strip_markdown(&parsed.body),
                    slug,
                    content_type,
                    date: parsed.meta.date,
                    mood: None,
                    dream_type: Some(parsed.meta.dream_type.as_str().to_string()),
                })
            }
        }
    }

    fn add_document(
        &self,
        writer: &mut IndexWriter<Document>,
        doc: &IndexedDocument,
    ) -> Result<(), SearchError> {
        let mut row = Document::new();
        row.add_text(self.schema.title, &doc.title);
        row.add_text(self.schema.body, &doc.body);
        row.add_text(self.schema.key, document_key(doc.content_type, &doc.slug));
        row.add_text(self.schema.slug, &doc.slug);
        row.add_text(self.schema.content_type, doc.content_type.as_str());
        row.add_text(self.schema.date, &doc.date);
        if let Some(mood) = &doc.mood {
            row.add_text(self.schema.mood, mood);
        }
        if let Some(dream_type) = &doc.dream_type {
            row.add_text(self.schema.dream_type, dream_type);
        }
        writer.add_document(row)?;
        Ok(())
    }

    /// Content type for a path, derived from its parent directory.
    fn content_type_for(&self, path: &Path) -> Option<ContentType> {
        let parent = path.parent()?;
        if parent == self.thoughts_dir {
            Some(ContentType::Thought)
        } else if parent == self.dreams_dir {
            Some(ContentType::Dream)
        } else {
            None
        }
    }

    /// Index or re-index a single file. Idempotent for create and modify:
    /// any existing row for the same (slug, type) is replaced. Files
    /// outside the content roots are ignored.
    pub fn upsert_document(&self, path: &Path) -> Result<(), SearchError> {
        let Some(content_type) = self.content_type_for(path) else {
            return Ok(());
        };
        let doc = self.load_document(path, content_type)?;

        {
            let mut writer = self.writer.lock();
            writer.delete_term(Term::from_field_text(
                self.schema.key,
                &document_key(content_type, &doc.slug),
            ));
            self.add_document(&mut writer, &doc)?;
            writer.commit()?;
        }
        self.reader.reload()?;

        crate::log_event!(
            "search",
            "upserted",
            "{} {}",
            content_type.as_str(),
            doc.slug
        );
        Ok(())
    }

    /// Remove a document. No-op when absent.
    pub fn delete_document(&self, slug: &str, content_type: ContentType) -> Result<(), SearchError> {
        {
            let mut writer = self.writer.lock();
            writer.delete_term(Term::from_field_text(
                self.schema.key,
                &document_key(content_type, slug),
            ));
            writer.commit()?;
        }
        self.reader.reload()?;

        crate::log_event!("search", "deleted", "{} {slug}", content_type.as_str());
        Ok(())
    }

    /// Execute a full-text search.
    ///
    /// Single-token queries prefix-match; multi-token queries exact-match
    /// all but the last token and prefix-match the last, so results track
    /// incremental typing. Failures degrade to an empty response.
    pub fn search(
        &self,
        query: &str,
        content_type: Option<ContentType>,
        limit: usize,
        offset: usize,
    ) -> SearchResponse {
        let Some(tokens) = sanitize_query(query) else {
            return SearchResponse::empty(query, limit, offset);
        };

        match self.execute_search(query, &tokens, content_type, limit, offset) {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(query, "search failed: {e}");
                SearchResponse::empty(query, limit, offset)
            }
        }
    }

    fn execute_search(
        &self,
        query: &str,
        tokens: &[String],
        content_type: Option<ContentType>,
        limit: usize,
        offset: usize,
    ) -> Result<SearchResponse, tantivy::TantivyError> {
        let searcher = self.reader.searcher();
        let parsed_query = self.build_query(tokens, content_type);

        // The type filter lives inside the query, so count and page agree.
        let total = searcher.search(&*parsed_query, &Count)?;
        let top_docs = searcher.search(
            &*parsed_query,
            &TopDocs::with_limit(limit.max(1)).and_offset(offset),
        )?;

        let mut results = Vec::with_capacity(top_docs.len());
        for (score, doc_address) in top_docs {
            let doc: Document = searcher.doc(doc_address)?;

            let get_str = |field: Field| {
                doc.get_first(field)
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string()
            };

            let slug = get_str(self.schema.slug);
            let title = get_str(self.schema.title);
            let body = get_str(self.schema.body);
            let row_type = match ContentType::parse(&get_str(self.schema.content_type)) {
                Some(t) => t,
                None => continue,
            };
            let mood = doc
                .get_first(self.schema.mood)
                .and_then(|v| v.as_str())
                .map(String::from);
            let dream_type = doc
                .get_first(self.schema.dream_type)
                .and_then(|v| v.as_str())
                .map(String::from);

            let title_snippet = snippet(&title, tokens, TITLE_SNIPPET_CHARS);
            results.push(SearchResult {
                title: if title_snippet.is_empty() {
                    slug.clone()
                } else {
                    title_snippet
                },
                slug,
                content_type: row_type,
                date: get_str(self.schema.date),
                snippet: snippet(&body, tokens, BODY_SNIPPET_CHARS),
                // Public contract: lower is better, page ordered ascending.
                score: (-score * 10_000.0).round() / 10_000.0,
                mood,
                dream_type,
            });
        }

        Ok(SearchResponse {
            query: query.to_string(),
            results,
            total,
            limit,
            offset,
        })
    }

    fn build_query(&self, tokens: &[String], content_type: Option<ContentType>) -> Box<dyn Query> {
        let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::new();
        let last = tokens.len() - 1;

        for (i, token) in tokens.iter().enumerate() {
            let title_term = Term::from_field_text(self.schema.title, token);
            let body_term = Term::from_field_text(self.schema.body, token);

            // The final token prefix-matches; earlier tokens are exact.
            let (title_query, body_query): (Box<dyn Query>, Box<dyn Query>) = if i == last {
                (
                    Box::new(FuzzyTermQuery::new_prefix(title_term, 0, true)),
                    Box::new(FuzzyTermQuery::new_prefix(body_term, 0, true)),
                )
            } else {
                (
                    Box::new(TermQuery::new(
                        title_term,
                        IndexRecordOption::WithFreqsAndPositions,
                    )),
                    Box::new(TermQuery::new(
                        body_term,
                        IndexRecordOption::WithFreqsAndPositions,
                    )),
                )
            };

            let either = BooleanQuery::new(vec![
                (
                    Occur::Should,
                    Box::new(BoostQuery::new(title_query, TITLE_BOOST)) as Box<dyn Query>,
                ),
                (Occur::Should, body_query),
            ]);
            clauses.push((Occur::Must, Box::new(either)));
        }

        if let Some(content_type) = content_type {
            let term = Term::from_field_text(self.schema.content_type, content_type.as_str());
            clauses.push((
                Occur::Must,
                Box::new(TermQuery::new(term, IndexRecordOption::Basic)),
            ));
        }

        Box::new(BooleanQuery::new(clauses))
    }
}

fn document_key(content_type: ContentType, slug: &str) -> String {
    format!("{}:{slug}", content_type.as_str())
}
