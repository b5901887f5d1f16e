//! Storage engine implementation.

use dashmap::DashMap;
use serde_json::Value as JsonValue;
use sled::{Db, Tree};
use tracing::trace;

use super::key::{display_id, RecordKey};
use super::record::encode_document;
use super::{Record, StorageConfig};
use crate::error::Error;

/// Tree name prefix for per-entity record trees.
const ENTITY_TREE_PREFIX: &str = "entity:";

/// The main storage engine wrapping sled.
///
/// Each entity type lives in its own tree (`entity:<Name>`), keyed by the
/// encoded record id.
pub struct StorageEngine {
    /// The underlying sled database.
    db: Db,

    /// Opened entity trees, by entity name.
    trees: DashMap<String, Tree>,
}

impl StorageEngine {
    /// Open or create a storage engine with the given configuration.
    pub fn open(config: StorageConfig) -> Result<Self, Error> {
        let db = config.to_sled_config().open()?;
        Ok(Self {
            db,
            trees: DashMap::new(),
        })
    }

    /// Get (opening on first use) the tree for an entity type.
    pub fn tree(&self, entity: &str) -> Result<Tree, Error> {
        if let Some(tree) = self.trees.get(entity) {
            return Ok(tree.clone());
        }
        let tree = self
            .db
            .open_tree(format!("{}{}", ENTITY_TREE_PREFIX, entity))?;
        self.trees.insert(entity.to_string(), tree.clone());
        Ok(tree)
    }

    /// Get the current record for an id.
    pub fn get(&self, entity: &str, id: &JsonValue) -> Result<Option<Record>, Error> {
        let key = RecordKey::from_id(id)?;
        match self.tree(entity)?.get(key)? {
            Some(bytes) => Ok(Some(Record::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Write a document under `id`.
    ///
    /// With `expected_version` set, the write only succeeds if the stored
    /// version equals it (`Some(0)` means the id must be absent); otherwise
    /// it is an upsert. The swap is atomic via `compare_and_swap`.
    pub fn write(
        &self,
        entity: &str,
        id: &JsonValue,
        document: &JsonValue,
        expected_version: Option<u64>,
    ) -> Result<Record, Error> {
        let key = RecordKey::from_id(id)?;
        let tree = self.tree(entity)?;
        let data = encode_document(document)?;

        loop {
            let current_bytes = tree.get(&key)?;
            let current = current_bytes
                .as_ref()
                .map(|bytes| Record::from_bytes(bytes))
                .transpose()?;
            let found = current.as_ref().map_or(0, |r| r.version);

            if let Some(expected) = expected_version {
                if expected != found {
                    return Err(Self::conflict(entity, id, expected, found));
                }
            }

            let next = match &current {
                Some(record) => record.next(data.clone()),
                None => Record::new(data.clone()),
            };

            match tree.compare_and_swap(&key, current_bytes.as_ref(), Some(next.to_bytes()?))? {
                Ok(()) => {
                    trace!(entity, id = %display_id(id), version = next.version, "record written");
                    return Ok(next);
                }
                // Lost a race with another writer: retry an upsert, fail a
                // versioned write.
                Err(_) if expected_version.is_none() => continue,
                Err(cas) => {
                    let found = cas
                        .current
                        .as_ref()
                        .map(|bytes| Record::from_bytes(bytes).map(|r| r.version))
                        .transpose()?
                        .unwrap_or(0);
                    return Err(Self::conflict(
                        entity,
                        id,
                        expected_version.unwrap_or_default(),
                        found,
                    ));
                }
            }
        }
    }

    /// Remove a record, returning it if it existed.
    pub fn remove(&self, entity: &str, id: &JsonValue) -> Result<Option<Record>, Error> {
        let key = RecordKey::from_id(id)?;
        match self.tree(entity)?.remove(key)? {
            Some(bytes) => Ok(Some(Record::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Scan every record of an entity type in id order.
    pub fn scan(
        &self,
        entity: &str,
    ) -> Result<impl Iterator<Item = Result<(JsonValue, Record), Error>>, Error> {
        Ok(self
            .tree(entity)?
            .iter()
            .map(|result| -> Result<(JsonValue, Record), Error> {
                let (key, value) = result?;
                Ok((RecordKey::decode(&key)?, Record::from_bytes(&value)?))
            }))
    }

    /// Number of records of an entity type.
    pub fn count(&self, entity: &str) -> Result<usize, Error> {
        Ok(self.tree(entity)?.len())
    }

    /// Remove every record of an entity type, returning how many there were.
    pub fn clear(&self, entity: &str) -> Result<usize, Error> {
        let tree = self.tree(entity)?;
        let removed = tree.len();
        tree.clear()?;
        Ok(removed)
    }

    /// Names of entity types that have a tree in this database.
    pub fn entity_types(&self) -> Vec<String> {
        self.db
            .tree_names()
            .into_iter()
            .filter_map(|name| {
                std::str::from_utf8(&name)
                    .ok()
                    .and_then(|n| n.strip_prefix(ENTITY_TREE_PREFIX))
                    .map(str::to_string)
            })
            .collect()
    }

    /// Generate a new record id for an entity type.
    ///
    /// Ids come from the database-wide monotonic counter. Values already
    /// taken in the entity's tree (records saved with an explicit id) are
    /// skipped.
    pub fn generate_id(&self, entity: &str) -> Result<i64, Error> {
        let tree = self.tree(entity)?;
        loop {
            let id = i64::try_from(self.db.generate_id()? + 1)
                .map_err(|_| Error::InvalidRequest("id space exhausted".into()))?;
            let key = RecordKey::from_id(&JsonValue::from(id))?;
            if !tree.contains_key(key)? {
                return Ok(id);
            }
            trace!(entity, id, "generated id already taken");
        }
    }

    /// Flush all pending writes to disk.
    pub fn flush(&self) -> Result<(), Error> {
        self.db.flush()?;
        Ok(())
    }

    fn conflict(entity: &str, id: &JsonValue, expected: u64, found: u64) -> Error {
        Error::VersionConflict {
            entity: entity.to_string(),
            id: display_id(id),
            expected,
            found,
        }
    }
}
