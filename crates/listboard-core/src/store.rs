use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::error::{Error, Result};

const DOCUMENTS_FILE: &str = "documents.data";

/// Slash separated path of a collection, e.g. `lists` or `lists/{id}/items`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionRef(String);

impl CollectionRef {
    pub fn root(name: &str) -> Self {
        Self(name.to_string())
    }

    pub fn doc(&self, id: &str) -> DocRef {
        DocRef {
            collection: self.clone(),
            id: id.to_string(),
        }
    }

    pub fn path(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocRef {
    collection: CollectionRef,
    id: String,
}

impl DocRef {
    pub fn path(&self) -> String {
        format!("{}/{}", self.collection.0, self.id)
    }

    pub fn collection(&self, name: &str) -> CollectionRef {
        CollectionRef(format!("{}/{}", self.path(), name))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// Equality filters plus an optional single-field ordering.
#[derive(Debug, Clone, Default)]
pub struct Query {
    filters: Vec<(String, Value)>,
    order_by: Option<(String, Direction)>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn where_eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filters.push((field.to_string(), value.into()));
        self
    }

    pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
        self.order_by = Some((field.to_string(), direction));
        self
    }

    fn matches(&self, doc: &Value) -> bool {
        self.filters
            .iter()
            .all(|(field, expected)| doc.get(field).unwrap_or(&Value::Null) == expected)
    }
}

#[derive(Debug, Clone)]
enum WriteOp {
    Set { path: String, data: Value },
    Update { path: String, fields: Map<String, Value> },
    Delete { path: String },
}

/// A group of writes applied all-or-nothing by [`DocumentStore::commit`].
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set<T: Serialize>(&mut self, doc: &DocRef, data: &T) -> Result<&mut Self> {
        self.ops.push(WriteOp::Set {
            path: doc.path(),
            data: serde_json::to_value(data)?,
        });
        Ok(self)
    }

    pub fn update(&mut self, doc: &DocRef, fields: Map<String, Value>) -> &mut Self {
        self.ops.push(WriteOp::Update {
            path: doc.path(),
            fields,
        });
        self
    }

    pub fn delete(&mut self, doc: &DocRef) -> &mut Self {
        self.ops.push(WriteOp::Delete { path: doc.path() });
        self
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredDocument {
    path: String,
    data: Value,
}

/// Document database with top-level collections and per-document
/// subcollections. Backed by a JSON lines file when opened from a
/// directory, or purely in memory.
#[derive(Debug)]
pub struct DocumentStore {
    documents_path: Option<PathBuf>,
    docs: BTreeMap<String, Value>,
}

impl DocumentStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)?;

        let documents_path = data_dir.join(DOCUMENTS_FILE);
        if !documents_path.exists() {
            fs::write(&documents_path, "")?;
        }

        let docs = load_jsonl(&documents_path)?;
        info!(
            data_dir = %data_dir.display(),
            documents = docs.len(),
            "opened document store"
        );

        Ok(Self {
            documents_path: Some(documents_path),
            docs,
        })
    }

    pub fn in_memory() -> Self {
        Self {
            documents_path: None,
            docs: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn exists(&self, doc: &DocRef) -> bool {
        self.docs.contains_key(&doc.path())
    }

    pub fn get<T: DeserializeOwned>(&self, doc: &DocRef) -> Result<Option<T>> {
        self.docs
            .get(&doc.path())
            .map(|value| serde_json::from_value(value.clone()).map_err(Error::from))
            .transpose()
    }

    #[tracing::instrument(skip(self, query), fields(collection = %collection.path()))]
    pub fn query<T: DeserializeOwned>(&self, collection: &CollectionRef, query: &Query) -> Result<Vec<T>> {
        let prefix = format!("{}/", collection.path());
        let mut hits: Vec<&Value> = self
            .docs
            .range(prefix.clone()..)
            .take_while(|(path, _)| path.starts_with(&prefix))
            .filter(|(path, _)| !path[prefix.len()..].contains('/'))
            .map(|(_, value)| value)
            .filter(|value| query.matches(value))
            .collect();

        if let Some((field, direction)) = &query.order_by {
            hits.sort_by(|a, b| {
                let ord = compare_values(
                    a.get(field).unwrap_or(&Value::Null),
                    b.get(field).unwrap_or(&Value::Null),
                );
                match direction {
                    Direction::Ascending => ord,
                    Direction::Descending => ord.reverse(),
                }
            });
        }

        debug!(count = hits.len(), "query matched documents");
        hits.into_iter()
            .map(|value| serde_json::from_value(value.clone()).map_err(Error::from))
            .collect()
    }

    pub fn set<T: Serialize>(&mut self, doc: &DocRef, data: &T) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch.set(doc, data)?;
        self.commit(batch)
    }

    pub fn update(&mut self, doc: &DocRef, fields: Map<String, Value>) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch.update(doc, fields);
        self.commit(batch)
    }

    pub fn delete(&mut self, doc: &DocRef) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch.delete(doc);
        self.commit(batch)
    }

    /// Applies every write in `batch` or none of them. The batch is replayed
    /// against a copy of the documents and only swapped in once the backing
    /// file has been replaced.
    #[tracing::instrument(skip(self, batch), fields(ops = batch.len()))]
    pub fn commit(&mut self, batch: WriteBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut next = self.docs.clone();
        for op in batch.ops {
            match op {
                WriteOp::Set { path, data } => {
                    next.insert(path, data);
                }
                WriteOp::Update { path, fields } => {
                    let Some(Value::Object(existing)) = next.get_mut(&path) else {
                        return Err(Error::Store(format!("cannot update missing document {path}")));
                    };
                    for (key, value) in fields {
                        existing.insert(key, value);
                    }
                }
                WriteOp::Delete { path } => {
                    next.remove(&path);
                }
            }
        }

        if let Some(path) = &self.documents_path {
            save_jsonl_atomic(path, &next)?;
        }
        debug!(before = self.docs.len(), after = next.len(), "committed batch");
        self.docs = next;
        Ok(())
    }
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

#[tracing::instrument(skip(path))]
fn load_jsonl(path: &Path) -> Result<BTreeMap<String, Value>> {
    debug!(file = %path.display(), "loading jsonl");
    let file = fs::File::open(path)?;
    let reader = BufReader::new(file);

    let mut out = BTreeMap::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let stored: StoredDocument = serde_json::from_str(trimmed).map_err(|err| {
            Error::Store(format!("failed parsing {} line {}: {err}", path.display(), idx + 1))
        })?;
        out.insert(stored.path, stored.data);
    }

    debug!(count = out.len(), "loaded documents from jsonl");
    Ok(out)
}

#[tracing::instrument(skip(path, docs))]
fn save_jsonl_atomic(path: &Path, docs: &BTreeMap<String, Value>) -> Result<()> {
    debug!(file = %path.display(), count = docs.len(), "saving jsonl atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    for (doc_path, data) in docs {
        let line = serde_json::to_string(&StoredDocument {
            path: doc_path.clone(),
            data: data.clone(),
        })?;
        writeln!(temp, "{line}")?;
    }
    temp.flush()?;

    temp.persist(path).map_err(|err| Error::Persist {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })?;

    Ok(())
}
