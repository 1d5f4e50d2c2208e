use crate::LexicalScope;
use codegraph_core::error::StoreError;
use codegraph_core::types::{EntityKind, SearchChannel, SearchHit};
use std::path::Path;
use std::sync::Mutex;
use tantivy::collector::TopDocs;
use tantivy::query::QueryParser;
use tantivy::schema::{Field, STORED, STRING, Schema, TEXT, Value};
use tantivy::{Index, IndexReader, IndexWriter, TantivyDocument, doc};
use tracing::{debug, info};

const WRITER_HEAP_BYTES: usize = 15_000_000;

const REQUIRED_FIELDS: &[&str] = &["node_id", "name", "signature", "context", "content"];

/// A document indexed into one lexical scope.
#[derive(Debug, Clone, Default)]
pub struct EntityDocument {
    pub node_id: String,
    pub name: String,
    pub signature: String,
    pub context: String,
    pub content: String,
}

struct LexicalFields {
    node_id: Field,
    name: Field,
    signature: Field,
    context: Field,
    content: Field,
}

struct LexicalIndex {
    reader: IndexReader,
    writer: Mutex<IndexWriter>,
    parser: QueryParser,
    fields: LexicalFields,
    kind: EntityKind,
}

/// The four lexical indexes the engine searches: methods, classes,
/// descriptions, and file docs.
pub struct IndexSet {
    methods: LexicalIndex,
    classes: LexicalIndex,
    descriptions: LexicalIndex,
    filedocs: LexicalIndex,
}

impl IndexSet {
    /// Create or open all four indexes under `base_dir`.
    pub fn open(base_dir: &Path) -> Result<Self, StoreError> {
        Ok(Self {
            methods: open_scope_index(base_dir, LexicalScope::Methods)?,
            classes: open_scope_index(base_dir, LexicalScope::Classes)?,
            descriptions: open_scope_index(base_dir, LexicalScope::Descriptions)?,
            filedocs: open_scope_index(base_dir, LexicalScope::FileDocs)?,
        })
    }

    fn scope(&self, scope: LexicalScope) -> &LexicalIndex {
        match scope {
            LexicalScope::Methods => &self.methods,
            LexicalScope::Classes => &self.classes,
            LexicalScope::Descriptions => &self.descriptions,
            LexicalScope::FileDocs => &self.filedocs,
        }
    }

    pub fn add_document(
        &self,
        scope: LexicalScope,
        document: &EntityDocument,
    ) -> Result<(), StoreError> {
        let index = self.scope(scope);
        let writer = index.writer.lock().map_err(StoreError::tantivy)?;
        writer
            .add_document(doc!(
                index.fields.node_id => document.node_id.clone(),
                index.fields.name => document.name.clone(),
                index.fields.signature => document.signature.clone(),
                index.fields.context => document.context.clone(),
                index.fields.content => document.content.clone(),
            ))
            .map_err(StoreError::tantivy)?;
        Ok(())
    }

    /// Commit pending writes in every scope and refresh the readers.
    pub fn commit(&self) -> Result<(), StoreError> {
        for scope in LexicalScope::ALL {
            let index = self.scope(scope);
            index
                .writer
                .lock()
                .map_err(StoreError::tantivy)?
                .commit()
                .map_err(StoreError::tantivy)?;
            index.reader.reload().map_err(StoreError::tantivy)?;
        }
        Ok(())
    }

    /// Ranked full-text search within one scope. Scores are raw BM25 values
    /// (unbounded); the combiner normalizes them.
    pub fn search(
        &self,
        scope: LexicalScope,
        terms: &[String],
        limit: usize,
    ) -> Result<Vec<SearchHit>, StoreError> {
        let query_text = sanitize_query(terms);
        if query_text.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let index = self.scope(scope);
        let query = index
            .parser
            .parse_query(&query_text)
            .map_err(StoreError::tantivy)?;
        let searcher = index.reader.searcher();
        let top_docs = searcher
            .search(&query, &TopDocs::with_limit(limit))
            .map_err(StoreError::tantivy)?;

        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, address) in top_docs {
            let stored: TantivyDocument = searcher.doc(address).map_err(StoreError::tantivy)?;
            let field_str = |field: Field| {
                stored
                    .get_first(field)
                    .and_then(|value| value.as_str())
                    .map(ToString::to_string)
            };
            let Some(node_id) = field_str(index.fields.node_id) else {
                continue;
            };
            hits.push(SearchHit {
                node_id,
                name: field_str(index.fields.name).filter(|v| !v.is_empty()),
                signature: field_str(index.fields.signature).filter(|v| !v.is_empty()),
                context: field_str(index.fields.context).filter(|v| !v.is_empty()),
                score: f64::from(score),
                kind: index.kind,
                channel: SearchChannel::Lexical,
            });
        }
        debug!(
            scope = scope.index_name(),
            query = query_text,
            hits = hits.len(),
            "lexical search"
        );
        Ok(hits)
    }
}

fn open_scope_index(base_dir: &Path, scope: LexicalScope) -> Result<LexicalIndex, StoreError> {
    let dir = base_dir.join(scope.index_name());
    std::fs::create_dir_all(&dir).map_err(StoreError::Io)?;

    let schema = build_schema();
    let index = if dir_is_empty(&dir)? {
        Index::create_in_dir(&dir, schema).map_err(StoreError::tantivy)?
    } else {
        Index::open_in_dir(&dir).map_err(|e| {
            StoreError::SchemaIncompatible(format!(
                "failed to open index at {}: {}",
                dir.display(),
                e
            ))
        })?
    };
    validate_required_fields(&index)?;

    let fields = resolve_fields(&index)?;
    let parser = QueryParser::for_index(&index, vec![fields.name, fields.signature, fields.content]);
    let writer = index.writer(WRITER_HEAP_BYTES).map_err(StoreError::tantivy)?;
    let reader = index.reader().map_err(StoreError::tantivy)?;
    info!(?dir, scope = scope.index_name(), "lexical index opened");

    Ok(LexicalIndex {
        reader,
        writer: Mutex::new(writer),
        parser,
        fields,
        kind: scope_kind(scope),
    })
}

fn scope_kind(scope: LexicalScope) -> EntityKind {
    match scope {
        LexicalScope::Methods => EntityKind::Method,
        LexicalScope::Classes => EntityKind::Class,
        LexicalScope::Descriptions => EntityKind::Description,
        LexicalScope::FileDocs => EntityKind::FileDoc,
    }
}

fn build_schema() -> Schema {
    let mut builder = Schema::builder();
    builder.add_text_field("node_id", STRING | STORED);
    builder.add_text_field("name", TEXT | STORED);
    builder.add_text_field("signature", TEXT | STORED);
    builder.add_text_field("context", TEXT | STORED);
    builder.add_text_field("content", TEXT);
    builder.build()
}

fn resolve_fields(index: &Index) -> Result<LexicalFields, StoreError> {
    let schema = index.schema();
    let get = |name: &str| {
        schema
            .get_field(name)
            .map_err(|_| StoreError::SchemaIncompatible(format!("missing field: {name}")))
    };
    Ok(LexicalFields {
        node_id: get("node_id")?,
        name: get("name")?,
        signature: get("signature")?,
        context: get("context")?,
        content: get("content")?,
    })
}

fn validate_required_fields(index: &Index) -> Result<(), StoreError> {
    let schema = index.schema();
    let missing: Vec<&str> = REQUIRED_FIELDS
        .iter()
        .copied()
        .filter(|name| schema.get_field(name).is_err())
        .collect();
    if !missing.is_empty() {
        return Err(StoreError::SchemaIncompatible(format!(
            "index missing required fields: {missing:?}; reindex required"
        )));
    }
    Ok(())
}

fn dir_is_empty(path: &Path) -> Result<bool, StoreError> {
    let mut entries = std::fs::read_dir(path).map_err(StoreError::Io)?;
    Ok(entries.next().is_none())
}

/// Strip query-parser metacharacters so raw identifiers and free text are
/// safe to parse; empty output means nothing searchable remained.
fn sanitize_query(terms: &[String]) -> String {
    let mut pieces = Vec::new();
    for term in terms {
        let cleaned: String = term
            .chars()
            .map(|c| {
                if c.is_alphanumeric() || c == '_' {
                    c
                } else {
                    ' '
                }
            })
            .collect();
        for piece in cleaned.split_whitespace() {
            pieces.push(piece.to_string());
        }
    }
    pieces.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make_doc(node_id: &str, name: &str, content: &str) -> EntityDocument {
        EntityDocument {
            node_id: node_id.to_string(),
            name: name.to_string(),
            signature: format!("{name}()"),
            context: "PaymentService".to_string(),
            content: content.to_string(),
        }
    }

    #[test]
    fn indexed_documents_are_searchable_after_commit() {
        let dir = TempDir::new().unwrap();
        let set = IndexSet::open(dir.path()).unwrap();

        set.add_document(
            LexicalScope::Methods,
            &make_doc("m1", "processRefund", "process a refund for a payment"),
        )
        .unwrap();
        set.add_document(
            LexicalScope::Methods,
            &make_doc("m2", "createInvoice", "create a new invoice"),
        )
        .unwrap();
        set.commit().unwrap();

        let hits = set
            .search(LexicalScope::Methods, &["refund".to_string()], 10)
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].node_id, "m1");
        assert_eq!(hits[0].kind, EntityKind::Method);
        assert_eq!(hits[0].channel, SearchChannel::Lexical);
        assert!(hits[0].score > 0.0);
    }

    #[test]
    fn empty_terms_return_no_hits_without_error() {
        let dir = TempDir::new().unwrap();
        let set = IndexSet::open(dir.path()).unwrap();
        let hits = set.search(LexicalScope::Classes, &[], 10).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn query_metacharacters_are_sanitized() {
        assert_eq!(
            sanitize_query(&["process(Refund)".to_string(), "a:b".to_string()]),
            "process Refund a b"
        );
        assert_eq!(sanitize_query(&["()!".to_string()]), "");
    }

    #[test]
    fn scopes_are_isolated() {
        let dir = TempDir::new().unwrap();
        let set = IndexSet::open(dir.path()).unwrap();
        set.add_document(
            LexicalScope::Classes,
            &make_doc("c1", "PaymentService", "handles payments"),
        )
        .unwrap();
        set.commit().unwrap();

        let class_hits = set
            .search(LexicalScope::Classes, &["payment".to_string()], 10)
            .unwrap();
        let method_hits = set
            .search(LexicalScope::Methods, &["payment".to_string()], 10)
            .unwrap();
        assert_eq!(class_hits.len(), 1);
        assert!(method_hits.is_empty());
    }
}
