//! Document persistence for vidshare.
//!
//! Every collection lives in a single SQLite table as one JSON body per row,
//! keyed by `(collection, id)`. Relation documents additionally carry a
//! `relation_key` with a partial unique index, which is what keeps a
//! (subscriber, channel) or (liker, target) pair from ever being stored twice.
//!
//! The store hands out short-lived connections per call so it can be shared
//! freely across blocking tasks. Writes that read before they write run in
//! `BEGIN IMMEDIATE` transactions; aggregations run inside one read
//! transaction so joined collections come from the same snapshot.
//!
//! A leading match stage is also handed to SQLite as a prefilter, so
//! single-document lookups decode one row instead of the whole collection.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

use rusqlite::types::Value as SqlValue;
use rusqlite::{
    Connection, ErrorCode, OptionalExtension, TransactionBehavior, params, params_from_iter,
};
use serde_json::Value;
use tracing::debug;

use crate::error::{Result, StoreError};
use crate::models::{Collection, DocId, Document, Relation, now};
use crate::pipeline::{CollectionSource, Filter, JoinIndex, Pipeline, Stage};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Outcome of [`DocumentStore::toggle`].
#[derive(Debug, Clone, PartialEq)]
pub enum Toggled<D> {
    Added(D),
    Removed(D),
}

impl<D> Toggled<D> {
    pub fn is_added(&self) -> bool {
        matches!(self, Toggled::Added(_))
    }

    pub fn into_inner(self) -> D {
        match self {
            Toggled::Added(doc) | Toggled::Removed(doc) => doc,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DocumentStore {
    db_path: PathBuf,
}

impl DocumentStore {
    /// Opens (and if necessary creates) the database and its schema. WAL mode
    /// keeps readers from blocking the writer.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let store = Self {
            db_path: path.to_path_buf(),
        };
        let mut conn = store.connect()?;
        conn.pragma_update(None, "journal_mode", &"WAL")?;
        conn.pragma_update(None, "synchronous", &"NORMAL")?;
        ensure_tables(&mut conn)?;

        debug!(path = %path.display(), "document store ready");
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.db_path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(conn)
    }

    fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        let mut conn = self.connect()?;
        f(&mut conn)
    }

    pub fn insert<D: Document>(&self, doc: &D) -> Result<()> {
        let body = serde_json::to_string(doc)?;
        let key = doc.relation_key();
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO documents (collection, id, body, relation_key) VALUES (?1, ?2, ?3, ?4)",
                params![D::COLLECTION.as_str(), doc.id().as_str(), body, key],
            )
            .map_err(|err| {
                conflict_or(err, D::COLLECTION, key.as_deref().unwrap_or(doc.id().as_str()))
            })?;
            Ok(())
        })
    }

    pub fn get<D: Document>(&self, id: &DocId) -> Result<Option<D>> {
        self.with_connection(|conn| {
            let body: Option<String> = conn
                .query_row(
                    "SELECT body FROM documents WHERE collection = ?1 AND id = ?2",
                    params![D::COLLECTION.as_str(), id.as_str()],
                    |row| row.get(0),
                )
                .optional()?;
            body.map(|body| serde_json::from_str(&body).map_err(StoreError::from))
                .transpose()
        })
    }

    pub fn exists(&self, collection: Collection, id: &DocId) -> Result<bool> {
        self.with_connection(|conn| {
            let found = conn
                .query_row(
                    "SELECT 1 FROM documents WHERE collection = ?1 AND id = ?2",
                    params![collection.as_str(), id.as_str()],
                    |_| Ok(()),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    /// Documents of `D`'s collection matching `filter`, in insertion order.
    pub fn find<D: Document>(&self, filter: Filter) -> Result<Vec<D>> {
        self.aggregate(D::COLLECTION, &Pipeline::new().matching(filter))?
            .into_iter()
            .map(|value| serde_json::from_value(value).map_err(StoreError::from))
            .collect()
    }

    pub fn find_one<D: Document>(&self, filter: Filter) -> Result<Option<D>> {
        Ok(self.find(filter)?.into_iter().next())
    }

    /// Applies `change` to the stored document and writes it back with a new
    /// `updatedAt`. Returns `None` when the document does not exist.
    pub fn update<D, F>(&self, id: &DocId, change: F) -> Result<Option<D>>
    where
        D: Document,
        F: FnOnce(&mut D),
    {
        self.with_connection(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let body: Option<String> = tx
                .query_row(
                    "SELECT body FROM documents WHERE collection = ?1 AND id = ?2",
                    params![D::COLLECTION.as_str(), id.as_str()],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(body) = body else {
                return Ok(None);
            };

            let mut doc: D = serde_json::from_str(&body)?;
            change(&mut doc);
            doc.touch(now());

            let key = doc.relation_key();
            tx.execute(
                "UPDATE documents SET body = ?3, relation_key = ?4 WHERE collection = ?1 AND id = ?2",
                params![
                    D::COLLECTION.as_str(),
                    id.as_str(),
                    serde_json::to_string(&doc)?,
                    key
                ],
            )
            .map_err(|err| conflict_or(err, D::COLLECTION, key.as_deref().unwrap_or(id.as_str())))?;
            tx.commit()?;
            Ok(Some(doc))
        })
    }

    /// Removes a document and returns what was stored.
    pub fn delete<D: Document>(&self, id: &DocId) -> Result<Option<D>> {
        self.with_connection(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let body: Option<String> = tx
                .query_row(
                    "SELECT body FROM documents WHERE collection = ?1 AND id = ?2",
                    params![D::COLLECTION.as_str(), id.as_str()],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(body) = body else {
                return Ok(None);
            };
            tx.execute(
                "DELETE FROM documents WHERE collection = ?1 AND id = ?2",
                params![D::COLLECTION.as_str(), id.as_str()],
            )?;
            tx.commit()?;
            Ok(Some(serde_json::from_str(&body)?))
        })
    }

    /// Removes every document of `collection` matching `filter` and returns
    /// how many were removed.
    pub fn delete_many(&self, collection: Collection, filter: &Filter) -> Result<usize> {
        self.with_connection(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let doomed: Vec<String> = load_matching(&tx, collection, Some(filter))?
                .iter()
                .filter(|doc| filter.matches(doc))
                .filter_map(|doc| doc.get("_id").and_then(Value::as_str).map(str::to_string))
                .collect();
            for id in &doomed {
                tx.execute(
                    "DELETE FROM documents WHERE collection = ?1 AND id = ?2",
                    params![collection.as_str(), id],
                )?;
            }
            tx.commit()?;
            Ok(doomed.len())
        })
    }

    /// Deletes the stored relation with the same key as `candidate`, or
    /// inserts `candidate` when there is none. The lookup and the write share
    /// one write-locked transaction, so concurrent toggles on the same pair
    /// serialize instead of racing.
    pub fn toggle<D: Relation>(&self, candidate: D) -> Result<Toggled<D>> {
        let key = candidate.key();
        self.with_connection(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let existing: Option<(String, String)> = tx
                .query_row(
                    "SELECT id, body FROM documents WHERE collection = ?1 AND relation_key = ?2",
                    params![D::COLLECTION.as_str(), key],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            let outcome = match existing {
                Some((id, body)) => {
                    tx.execute(
                        "DELETE FROM documents WHERE collection = ?1 AND id = ?2",
                        params![D::COLLECTION.as_str(), id],
                    )?;
                    Toggled::Removed(serde_json::from_str(&body)?)
                }
                None => {
                    tx.execute(
                        "INSERT INTO documents (collection, id, body, relation_key) VALUES (?1, ?2, ?3, ?4)",
                        params![
                            D::COLLECTION.as_str(),
                            candidate.id().as_str(),
                            serde_json::to_string(&candidate)?,
                            key
                        ],
                    )
                    .map_err(|err| conflict_or(err, D::COLLECTION, &key))?;
                    Toggled::Added(candidate)
                }
            };
            tx.commit()?;

            debug!(
                collection = %D::COLLECTION,
                key = %key,
                added = outcome.is_added(),
                "toggled relation"
            );
            Ok(outcome)
        })
    }

    /// Runs `pipeline` over every document of `collection`.
    pub fn aggregate(&self, collection: Collection, pipeline: &Pipeline) -> Result<Vec<Value>> {
        let leading = match pipeline.stages().first() {
            Some(Stage::Match(filter)) => Some(filter),
            _ => None,
        };
        self.with_connection(|conn| {
            let tx = conn.transaction()?;
            let output = {
                let source = SnapshotSource {
                    conn: &tx,
                    loaded: RefCell::new(HashMap::new()),
                    indexes: RefCell::new(HashMap::new()),
                };
                let docs = load_matching(&tx, collection, leading)?;
                pipeline.run(docs, &source)?
            };
            tx.commit()?;
            Ok(output)
        })
    }
}

fn ensure_tables(conn: &mut Connection) -> Result<()> {
    let tx = conn.transaction()?;
    tx.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            collection TEXT NOT NULL,
            id TEXT NOT NULL,
            body TEXT NOT NULL,
            relation_key TEXT,
            PRIMARY KEY (collection, id)
        );

        CREATE UNIQUE INDEX IF NOT EXISTS idx_documents_relation
            ON documents(collection, relation_key)
            WHERE relation_key IS NOT NULL;
        "#,
    )?;
    tx.commit()?;
    Ok(())
}

fn conflict_or(err: rusqlite::Error, collection: Collection, key: &str) -> StoreError {
    match &err {
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == ErrorCode::ConstraintViolation =>
        {
            StoreError::Conflict {
                collection: collection.as_str(),
                key: key.to_string(),
            }
        }
        _ => StoreError::Sqlite(err),
    }
}

/// Documents of `collection` in insertion order, narrowed by `filter` as far
/// as SQLite can evaluate it.
fn load_matching(conn: &Connection, collection: Collection, filter: Option<&Filter>) -> Result<Vec<Value>> {
    let mut bound = vec![SqlValue::Text(collection.as_str().to_string())];
    let mut sql = String::from("SELECT body FROM documents WHERE collection = ?");
    if let Some(clause) = filter.and_then(|filter| prefilter(filter, &mut bound)) {
        sql.push_str(" AND ");
        sql.push_str(&clause);
    }
    sql.push_str(" ORDER BY rowid");

    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params_from_iter(bound))?;
    let mut docs = Vec::new();
    while let Some(row) = rows.next()? {
        let body: String = row.get(0)?;
        docs.push(serde_json::from_str(&body)?);
    }
    Ok(docs)
}

/// SQL for the part of `filter` SQLite can check. It may keep rows the
/// filter rejects but never drops a row the filter keeps, so the match stage
/// still runs on what comes back. `None` means no narrowing.
fn prefilter(filter: &Filter, bound: &mut Vec<SqlValue>) -> Option<String> {
    let mark = bound.len();
    let clause = match filter {
        Filter::Eq(path, expected) => {
            let value = match expected {
                Value::String(text) => SqlValue::Text(text.clone()),
                Value::Bool(flag) => SqlValue::Integer(i64::from(*flag)),
                Value::Number(number) => match number.as_i64() {
                    Some(int) => SqlValue::Integer(int),
                    None => SqlValue::Real(number.as_f64()?),
                },
                _ => return None,
            };
            if path == "_id" {
                if !expected.is_string() {
                    return None;
                }
                bound.push(value);
                Some("id = ?".to_string())
            } else {
                let mut clause = String::from("(json_extract(body, ?) = ?");
                bound.push(SqlValue::Text(format!("$.{path}")));
                bound.push(value);
                // Arrays anywhere along the path are matched in memory.
                let mut prefix = String::from("$");
                for segment in path.split('.') {
                    prefix.push('.');
                    prefix.push_str(segment);
                    clause.push_str(" OR json_type(body, ?) = 'array'");
                    bound.push(SqlValue::Text(prefix.clone()));
                }
                clause.push(')');
                Some(clause)
            }
        }
        Filter::And(filters) => {
            let parts: Vec<String> = filters
                .iter()
                .filter_map(|filter| prefilter(filter, bound))
                .collect();
            (!parts.is_empty()).then(|| format!("({})", parts.join(" AND ")))
        }
        Filter::Or(filters) if !filters.is_empty() => filters
            .iter()
            .map(|filter| prefilter(filter, bound))
            .collect::<Option<Vec<String>>>()
            .map(|parts| format!("({})", parts.join(" OR "))),
        _ => None,
    };
    if clause.is_none() {
        bound.truncate(mark);
    }
    clause
}

/// Loads each joined collection at most once per aggregation and keeps the
/// join indexes built over it.
struct SnapshotSource<'c> {
    conn: &'c Connection,
    loaded: RefCell<HashMap<Collection, Rc<[Value]>>>,
    indexes: RefCell<HashMap<(Collection, String), Rc<JoinIndex>>>,
}

impl CollectionSource for SnapshotSource<'_> {
    fn load(&self, collection: Collection) -> Result<Rc<[Value]>> {
        if let Some(docs) = self.loaded.borrow().get(&collection) {
            return Ok(Rc::clone(docs));
        }
        let docs: Rc<[Value]> = load_matching(self.conn, collection, None)?.into();
        self.loaded.borrow_mut().insert(collection, Rc::clone(&docs));
        Ok(docs)
    }

    fn join_index(&self, collection: Collection, foreign_field: &str) -> Result<Rc<JoinIndex>> {
        let key = (collection, foreign_field.to_string());
        if let Some(index) = self.indexes.borrow().get(&key) {
            return Ok(Rc::clone(index));
        }
        let index = Rc::new(JoinIndex::build(self.load(collection)?, foreign_field));
        self.indexes.borrow_mut().insert(key, Rc::clone(&index));
        Ok(index)
    }
}
