//! The persistent record store.
//!
//! The core sees durable storage as a mapping from a collection name to an
//! ordered sequence of JSON records. Two implementations are provided: an
//! in-memory one for tests and embedding, and a directory of JSON files (one
//! file per collection) used by the command line program.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value as JSValue;
use snafu::{ResultExt, Snafu};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StoreError {
    #[snafu(display("Error reading collection file {path}"))]
    ReadingCollection {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error writing collection file {path}"))]
    WritingCollection {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Malformed records in collection {collection}"))]
    ParsingRecords {
        source: serde_json::Error,
        collection: &'static str,
    },
    #[snafu(display("Could not encode records of collection {collection}"))]
    EncodingRecords {
        source: serde_json::Error,
        collection: &'static str,
    },
}

pub type StoreResult<T> = Result<T, StoreError>;

/// The logical collections of an election.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum Collection {
    Positions,
    Candidates,
    Voters,
    Votes,
    Progress,
    /// Singleton: the voter currently holding the booth, if any.
    CurrentSession,
}

impl Collection {
    pub fn key(&self) -> &'static str {
        match self {
            Collection::Positions => "voting-positions",
            Collection::Candidates => "voting-candidates",
            Collection::Voters => "voting-voters",
            Collection::Votes => "voting-votes",
            Collection::Progress => "voting-progress",
            Collection::CurrentSession => "current-voter-session",
        }
    }
}

/// Durable storage used by the election.
///
/// A `write` replaces the whole collection: implementations must make it
/// all-or-nothing.
pub trait RecordStore: Send + Sync {
    fn read(&self, collection: Collection) -> StoreResult<Vec<JSValue>>;
    fn write(&self, collection: Collection, records: Vec<JSValue>) -> StoreResult<()>;
    fn clear(&self, collection: Collection) -> StoreResult<()>;
}

pub fn load_records<T: DeserializeOwned>(
    store: &dyn RecordStore,
    collection: Collection,
) -> StoreResult<Vec<T>> {
    let mut res: Vec<T> = Vec::new();
    for js in store.read(collection)? {
        let record: T = serde_json::from_value(js).context(ParsingRecordsSnafu {
            collection: collection.key(),
        })?;
        res.push(record);
    }
    Ok(res)
}

pub fn save_records<'a, T, I>(
    store: &dyn RecordStore,
    collection: Collection,
    records: I,
) -> StoreResult<()>
where
    T: Serialize + 'a,
    I: IntoIterator<Item = &'a T>,
{
    let mut res: Vec<JSValue> = Vec::new();
    for r in records {
        res.push(serde_json::to_value(r).context(EncodingRecordsSnafu {
            collection: collection.key(),
        })?);
    }
    store.write(collection, res)
}

/// Keeps all the collections in memory. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: Mutex<HashMap<Collection, Vec<JSValue>>>,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }
}

impl RecordStore for MemoryStore {
    fn read(&self, collection: Collection) -> StoreResult<Vec<JSValue>> {
        Ok(self
            .collections
            .lock()
            .get(&collection)
            .cloned()
            .unwrap_or_default())
    }

    fn write(&self, collection: Collection, records: Vec<JSValue>) -> StoreResult<()> {
        self.collections.lock().insert(collection, records);
        Ok(())
    }

    fn clear(&self, collection: Collection) -> StoreResult<()> {
        self.collections.lock().remove(&collection);
        Ok(())
    }
}

/// One pretty-printed JSON array per collection, stored as
/// `<root>/<collection key>.json`.
///
/// Writes go to a temporary file which is then renamed over the previous
/// one, so a reader never observes a half-written collection.
#[derive(Debug, Clone)]
pub struct JsonDirStore {
    root: PathBuf,
}

impl JsonDirStore {
    pub fn open(root: impl AsRef<Path>) -> StoreResult<JsonDirStore> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).context(WritingCollectionSnafu {
            path: root.display().to_string(),
        })?;
        debug!("JsonDirStore: opened {:?}", root);
        Ok(JsonDirStore { root })
    }

    fn path_for(&self, collection: Collection) -> PathBuf {
        self.root.join(format!("{}.json", collection.key()))
    }
}

impl RecordStore for JsonDirStore {
    fn read(&self, collection: Collection) -> StoreResult<Vec<JSValue>> {
        let p = self.path_for(collection);
        if !p.exists() {
            return Ok(Vec::new());
        }
        let contents = fs::read_to_string(&p).context(ReadingCollectionSnafu {
            path: p.display().to_string(),
        })?;
        if contents.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(contents.as_str()).context(ParsingRecordsSnafu {
            collection: collection.key(),
        })
    }

    fn write(&self, collection: Collection, records: Vec<JSValue>) -> StoreResult<()> {
        let p = self.path_for(collection);
        let tmp = self.root.join(format!(".{}.json.tmp", collection.key()));
        let contents = serde_json::to_string_pretty(&records).context(EncodingRecordsSnafu {
            collection: collection.key(),
        })?;
        fs::write(&tmp, contents).context(WritingCollectionSnafu {
            path: tmp.display().to_string(),
        })?;
        fs::rename(&tmp, &p).context(WritingCollectionSnafu {
            path: p.display().to_string(),
        })?;
        debug!(
            "JsonDirStore: wrote {} records to {:?}",
            records.len(),
            p.display()
        );
        Ok(())
    }

    fn clear(&self, collection: Collection) -> StoreResult<()> {
        let p = self.path_for(collection);
        if p.exists() {
            fs::remove_file(&p).context(WritingCollectionSnafu {
                path: p.display().to_string(),
            })?;
        }
        Ok(())
    }
}
