//! Sled-backed persistence session.

use ruledao_proto::EntityQuery;
use serde_json::Value as JsonValue;
use tracing::{debug, trace};

use super::filter::FilterEvaluator;
use super::key::display_id;
use super::{Record, StorageConfig, StorageEngine};
use crate::error::Error;
use crate::session::{QueryOutput, Session, Stored};

/// A [`Session`] over a [`StorageEngine`].
///
/// Queries are answered by scanning the entity's tree and evaluating the
/// filter against each document.
pub struct StoreSession {
    engine: StorageEngine,
}

impl StoreSession {
    /// Wrap an open engine.
    pub fn new(engine: StorageEngine) -> Self {
        Self { engine }
    }

    /// Open a store with the given configuration.
    pub fn open(config: StorageConfig) -> Result<Self, Error> {
        Ok(Self::new(StorageEngine::open(config)?))
    }

    /// The underlying engine.
    pub fn engine(&self) -> &StorageEngine {
        &self.engine
    }

    fn stored(document: JsonValue, record: &Record) -> Stored {
        Stored {
            document,
            version: record.version,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

impl Session for StoreSession {
    fn select(&self, query: &EntityQuery) -> Result<QueryOutput, Error> {
        let mut rows = Vec::new();
        for item in self.engine.scan(&query.entity)? {
            let (_, record) = item?;
            let document = record.document()?;
            if query
                .filter
                .as_ref()
                .map_or(true, |f| FilterEvaluator::evaluate(f, &document))
            {
                rows.push(document);
            }
        }
        trace!(entity = %query.entity, matched = rows.len(), "select");

        if query.is_count() {
            return Ok(QueryOutput::Count(rows.len() as u64));
        }

        if !query.order_by.is_empty() {
            rows.sort_by(|a, b| FilterEvaluator::compare_documents(a, b, &query.order_by));
        }

        if let Some(page) = query.pagination {
            rows = rows
                .into_iter()
                .skip(page.offset as usize)
                .take(page.limit as usize)
                .collect();
        }

        Ok(QueryOutput::Rows(rows))
    }

    fn find(&self, entity: &str, id: &JsonValue) -> Result<Option<Stored>, Error> {
        match self.engine.get(entity, id)? {
            Some(record) => Ok(Some(Self::stored(record.document()?, &record))),
            None => Ok(None),
        }
    }

    fn merge(
        &self,
        entity: &str,
        id: &JsonValue,
        document: &JsonValue,
        expected_version: Option<u64>,
    ) -> Result<Stored, Error> {
        let record = self.engine.write(entity, id, document, expected_version)?;
        debug!(entity, id = %display_id(id), version = record.version, "merged");
        Ok(Self::stored(document.clone(), &record))
    }

    fn remove(&self, entity: &str, id: &JsonValue) -> Result<Option<Stored>, Error> {
        match self.engine.remove(entity, id)? {
            Some(record) => {
                debug!(entity, id = %display_id(id), "removed");
                Ok(Some(Self::stored(record.document()?, &record)))
            }
            None => Ok(None),
        }
    }

    fn remove_all(&self, entity: &str) -> Result<usize, Error> {
        let removed = self.engine.clear(entity)?;
        debug!(entity, removed, "cleared");
        Ok(removed)
    }

    fn next_id(&self, entity: &str) -> Result<JsonValue, Error> {
        Ok(JsonValue::from(self.engine.generate_id(entity)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ruledao_proto::{FilterExpr, OrderSpec, Pagination};
    use serde_json::json;

    fn session() -> (StoreSession, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let session = StoreSession::open(StorageConfig::new(dir.path())).unwrap();
        for (id, code, pop) in [(1, "FR", 68), (2, "DE", 84), (3, "BE", 12)] {
            session
                .merge("Country", &json!(id), &json!({"id": id, "code": code, "pop": pop}), None)
                .unwrap();
        }
        (session, dir)
    }

    #[test]
    fn test_select_filter_order_page() {
        let (session, _dir) = session();
        let query = EntityQuery::new("Country")
            .with_filter(FilterExpr::gt("pop", 20i64))
            .with_order(OrderSpec::desc("pop"))
            .with_pagination(Pagination::limit(1));

        let rows = session.select(&query).unwrap().into_rows();
        assert_eq!(rows, vec![json!({"id": 2, "code": "DE", "pop": 84})]);
    }

    #[test]
    fn test_count() {
        let (session, _dir) = session();
        let query = EntityQuery::count("Country").with_filter(FilterExpr::like("code", "%E"));
        assert_eq!(session.select(&query).unwrap(), QueryOutput::Count(2));
    }

    #[test]
    fn test_textual_query() {
        let (session, _dir) = session();
        let session: &dyn Session = &session;

        let mut query = session
            .create_query("find Country where code = :var0")
            .unwrap();
        query.bind("var0", "BE");
        assert_eq!(query.execute().unwrap().size(), 1);

        query.bind("var0", "XX");
        assert!(query.execute().unwrap().is_empty());
    }

    #[test]
    fn test_find_merge_remove() {
        let (session, _dir) = session();

        let stored = session.find("Country", &json!(1)).unwrap().unwrap();
        assert_eq!(stored.version, 1);

        let updated = session
            .merge("Country", &json!(1), &json!({"id": 1, "code": "FX"}), Some(1))
            .unwrap();
        assert_eq!(updated.version, 2);

        let removed = session.remove("Country", &json!(1)).unwrap().unwrap();
        assert_eq!(removed.document["code"], "FX");
        assert!(session.find("Country", &json!(1)).unwrap().is_none());
        assert_eq!(session.remove_all("Country").unwrap(), 2);
    }
}
