//! Tantivy-backed search index keyed by question id.
//!
//! One document per question; upserts are delete-then-add under the writer
//! lock, and every write commits and reloads the reader so a subsequent
//! query observes it. Write volume here is one commit per domain event,
//! which is well within tantivy's comfort zone for this workload.

use std::path::Path;

use anyhow::Context;
use parking_lot::Mutex;
use tantivy::collector::{Count, TopDocs};
use tantivy::directory::MmapDirectory;
use tantivy::query::{AllQuery, BooleanQuery, Occur, Query, QueryParser, TermQuery};
use tantivy::schema::{
    Field, IndexRecordOption, Schema, Value, FAST, INDEXED, STORED, STRING, TEXT,
};
use tantivy::{doc, Index, IndexReader, IndexWriter, TantivyDocument, Term};
use uuid::Uuid;

use askstack_core::document::SearchDocument;

/// Writer heap budget. Tantivy needs a few MB per indexing thread; this is
/// comfortable for single-document commits.
const WRITER_HEAP_BYTES: usize = 50_000_000;

#[derive(Debug, Clone, Copy)]
struct Fields {
    id: Field,
    title: Field,
    content: Field,
    tag: Field,
    has_accepted_answer: Field,
    answer_count: Field,
}

fn build_schema() -> (Schema, Fields) {
    let mut builder = Schema::builder();
    let fields = Fields {
        id: builder.add_text_field("id", STRING | STORED),
        title: builder.add_text_field("title", TEXT | STORED),
        content: builder.add_text_field("content", TEXT | STORED),
        // Raw tokenizer: tags are exact slugs, one value per tag.
        tag: builder.add_text_field("tag", STRING | STORED),
        has_accepted_answer: builder.add_bool_field("has_accepted_answer", INDEXED | STORED),
        answer_count: builder.add_u64_field("answer_count", INDEXED | STORED | FAST),
    };
    (builder.build(), fields)
}

/// A scored search result.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub score: f32,
    pub document: SearchDocument,
}

pub struct SearchIndex {
    index: Index,
    writer: Mutex<IndexWriter>,
    reader: IndexReader,
    fields: Fields,
}

impl SearchIndex {
    /// Opens (or creates) an on-disk index under `path`.
    ///
    /// # Errors
    ///
    /// Fails when the directory cannot be created or an existing index has an
    /// incompatible schema.
    pub fn open_in_dir(path: &Path) -> anyhow::Result<Self> {
        std::fs::create_dir_all(path)
            .with_context(|| format!("creating index directory {}", path.display()))?;
        let (schema, fields) = build_schema();
        let directory = MmapDirectory::open(path)?;
        let index = Index::open_or_create(directory, schema)?;
        Self::from_index(index, fields)
    }

    /// Opens a fresh in-RAM index. Used by tests and ephemeral deployments.
    ///
    /// # Errors
    ///
    /// Fails if the index writer cannot be created.
    pub fn open_in_ram() -> anyhow::Result<Self> {
        let (schema, fields) = build_schema();
        Self::from_index(Index::create_in_ram(schema), fields)
    }

    fn from_index(index: Index, fields: Fields) -> anyhow::Result<Self> {
        let writer: IndexWriter = index.writer(WRITER_HEAP_BYTES)?;
        let reader = index.reader()?;
        Ok(Self {
            index,
            writer: Mutex::new(writer),
            reader,
            fields,
        })
    }

    fn id_term(&self, id: Uuid) -> Term {
        Term::from_field_text(self.fields.id, &id.to_string())
    }

    /// Creates or replaces the document under its question id.
    ///
    /// # Errors
    ///
    /// Fails if the write or commit fails.
    pub fn upsert(&self, document: &SearchDocument) -> anyhow::Result<()> {
        let mut tdoc = doc!(
            self.fields.id => document.id.to_string(),
            self.fields.title => document.title.clone(),
            self.fields.content => document.content.clone(),
            self.fields.has_accepted_answer => document.has_accepted_answer,
            self.fields.answer_count => u64::from(document.answer_count),
        );
        for tag in &document.tags {
            tdoc.add_text(self.fields.tag, tag);
        }

        {
            let mut writer = self.writer.lock();
            writer.delete_term(self.id_term(document.id));
            writer.add_document(tdoc)?;
            writer.commit()?;
        }
        self.reader.reload()?;
        Ok(())
    }

    /// Removes the document for `id`. Removing an absent id is a no-op.
    ///
    /// # Errors
    ///
    /// Fails if the commit fails.
    pub fn remove(&self, id: Uuid) -> anyhow::Result<()> {
        {
            let mut writer = self.writer.lock();
            writer.delete_term(self.id_term(id));
            writer.commit()?;
        }
        self.reader.reload()?;
        Ok(())
    }

    /// The currently indexed document for `id`, if any.
    ///
    /// # Errors
    ///
    /// Fails if the index read fails or a stored document is malformed.
    pub fn fetch(&self, id: Uuid) -> anyhow::Result<Option<SearchDocument>> {
        let searcher = self.reader.searcher();
        let query = TermQuery::new(self.id_term(id), IndexRecordOption::Basic);
        let top = searcher.search(&query, &TopDocs::with_limit(1))?;
        let Some((_score, address)) = top.first() else {
            return Ok(None);
        };
        let doc: TantivyDocument = searcher.doc(*address)?;
        self.to_document(&doc).map(Some)
    }

    /// Full-text query over title and content with an optional exact tag
    /// filter. An empty query string matches everything (tag filter only).
    ///
    /// Returns the top `limit` hits by score plus the total match count.
    ///
    /// # Errors
    ///
    /// Fails on an unparsable query or an index read failure.
    pub fn search(
        &self,
        query_str: &str,
        tag: Option<&str>,
        limit: usize,
    ) -> anyhow::Result<(Vec<SearchHit>, usize)> {
        let searcher = self.reader.searcher();

        let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::new();
        let trimmed = query_str.trim();
        if !trimmed.is_empty() {
            let parser =
                QueryParser::for_index(&self.index, vec![self.fields.title, self.fields.content]);
            clauses.push((Occur::Must, parser.parse_query(trimmed)?));
        }
        if let Some(tag) = tag {
            clauses.push((
                Occur::Must,
                Box::new(TermQuery::new(
                    Term::from_field_text(self.fields.tag, tag),
                    IndexRecordOption::Basic,
                )),
            ));
        }

        let query: Box<dyn Query> = if clauses.is_empty() {
            Box::new(AllQuery)
        } else {
            Box::new(BooleanQuery::new(clauses))
        };

        let collector = (TopDocs::with_limit(limit.max(1)), Count);
        let (top, total) = searcher.search(query.as_ref(), &collector)?;

        let mut hits = Vec::with_capacity(top.len());
        for (score, address) in top {
            let doc: TantivyDocument = searcher.doc(address)?;
            hits.push(SearchHit {
                score,
                document: self.to_document(&doc)?,
            });
        }
        Ok((hits, total))
    }

    #[allow(clippy::cast_possible_truncation)]
    fn to_document(&self, doc: &TantivyDocument) -> anyhow::Result<SearchDocument> {
        let id_text = doc
            .get_first(self.fields.id)
            .and_then(|v| v.as_str())
            .context("stored document missing id")?;
        let id = Uuid::parse_str(id_text).context("stored document id is not a uuid")?;

        Ok(SearchDocument {
            id,
            title: doc
                .get_first(self.fields.title)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            content: doc
                .get_first(self.fields.content)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            tags: doc
                .get_all(self.fields.tag)
                .filter_map(|v| v.as_str())
                .map(str::to_string)
                .collect(),
            has_accepted_answer: doc
                .get_first(self.fields.has_accepted_answer)
                .and_then(|v| v.as_bool())
                .unwrap_or(false),
            answer_count: doc
                .get_first(self.fields.answer_count)
                .and_then(|v| v.as_u64())
                .unwrap_or(0) as u32,
        })
    }
}
