//! Persistence session boundary.
//!
//! The validation core only talks to the store through [`Session`]: it builds
//! textual queries, binds named parameters and reads back rows or a count.

use std::collections::HashMap;
use std::sync::Arc;

use ruledao_lang::Statement;
use ruledao_proto::{EntityQuery, Value};
use serde_json::Value as JsonValue;
use tracing::trace;

use crate::error::{Error, EvaluationError};

/// Result of executing a query.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutput {
    /// Matching documents (`find`).
    Rows(Vec<JsonValue>),
    /// Number of matching documents (`count`).
    Count(u64),
}

impl QueryOutput {
    /// Result-set size: the row count, or the scalar for `count` queries.
    pub fn size(&self) -> u64 {
        match self {
            QueryOutput::Rows(rows) => rows.len() as u64,
            QueryOutput::Count(n) => *n,
        }
    }

    /// Whether the result set is empty.
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// The rows, or nothing for a count.
    pub fn into_rows(self) -> Vec<JsonValue> {
        match self {
            QueryOutput::Rows(rows) => rows,
            QueryOutput::Count(_) => Vec::new(),
        }
    }
}

/// A stored document with its metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Stored {
    /// The entity document.
    pub document: JsonValue,
    /// Write counter, starting at 1.
    pub version: u64,
    /// Creation timestamp in microseconds since Unix epoch.
    pub created_at: u64,
    /// Last write timestamp in microseconds since Unix epoch.
    pub updated_at: u64,
}

/// The persistence session collaborator.
pub trait Session {
    /// Execute a structured query.
    fn select(&self, query: &EntityQuery) -> Result<QueryOutput, Error>;

    /// Load one document by id.
    fn find(&self, entity: &str, id: &JsonValue) -> Result<Option<Stored>, Error>;

    /// Write a document. `expected_version` makes the write conditional
    /// (`Some(0)`: the id must not exist yet).
    fn merge(
        &self,
        entity: &str,
        id: &JsonValue,
        document: &JsonValue,
        expected_version: Option<u64>,
    ) -> Result<Stored, Error>;

    /// Remove one document, returning it if it existed.
    fn remove(&self, entity: &str, id: &JsonValue) -> Result<Option<Stored>, Error>;

    /// Remove every document of an entity type.
    fn remove_all(&self, entity: &str) -> Result<usize, Error>;

    /// Mint a fresh id for an entity type. The id is increasing and not
    /// held by any stored record of that type.
    fn next_id(&self, entity: &str) -> Result<JsonValue, Error>;
}

impl<'s> dyn Session + 's {
    /// Parse query text into a bindable [`Query`].
    pub fn create_query(&'s self, text: &str) -> Result<Query<'s>, Error> {
        Query::new(self, text)
    }
}

impl<S: Session + ?Sized> Session for &S {
    fn select(&self, query: &EntityQuery) -> Result<QueryOutput, Error> {
        (**self).select(query)
    }

    fn find(&self, entity: &str, id: &JsonValue) -> Result<Option<Stored>, Error> {
        (**self).find(entity, id)
    }

    fn merge(
        &self,
        entity: &str,
        id: &JsonValue,
        document: &JsonValue,
        expected_version: Option<u64>,
    ) -> Result<Stored, Error> {
        (**self).merge(entity, id, document, expected_version)
    }

    fn remove(&self, entity: &str, id: &JsonValue) -> Result<Option<Stored>, Error> {
        (**self).remove(entity, id)
    }

    fn remove_all(&self, entity: &str) -> Result<usize, Error> {
        (**self).remove_all(entity)
    }

    fn next_id(&self, entity: &str) -> Result<JsonValue, Error> {
        (**self).next_id(entity)
    }
}

impl<S: Session + ?Sized> Session for Arc<S> {
    fn select(&self, query: &EntityQuery) -> Result<QueryOutput, Error> {
        (**self).select(query)
    }

    fn find(&self, entity: &str, id: &JsonValue) -> Result<Option<Stored>, Error> {
        (**self).find(entity, id)
    }

    fn merge(
        &self,
        entity: &str,
        id: &JsonValue,
        document: &JsonValue,
        expected_version: Option<u64>,
    ) -> Result<Stored, Error> {
        (**self).merge(entity, id, document, expected_version)
    }

    fn remove(&self, entity: &str, id: &JsonValue) -> Result<Option<Stored>, Error> {
        (**self).remove(entity, id)
    }

    fn remove_all(&self, entity: &str) -> Result<usize, Error> {
        (**self).remove_all(entity)
    }

    fn next_id(&self, entity: &str) -> Result<JsonValue, Error> {
        (**self).next_id(entity)
    }
}

/// A parsed query with its parameter bindings.
///
/// Parsing happens once in [`Query::new`]; a query can be cloned and bound
/// again for each execution.
#[derive(Clone)]
pub struct Query<'s> {
    session: &'s dyn Session,
    text: String,
    statement: Arc<Statement>,
    bindings: HashMap<String, Value>,
}

impl<'s> Query<'s> {
    /// Parse query text against a session.
    pub fn new(session: &'s dyn Session, text: &str) -> Result<Self, Error> {
        let statement = ruledao_lang::parse(text)?;
        Ok(Self {
            session,
            text: text.to_string(),
            statement: Arc::new(statement),
            bindings: HashMap::new(),
        })
    }

    /// The query text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// The parsed statement.
    pub fn statement(&self) -> &Statement {
        &self.statement
    }

    /// Bind a named parameter.
    pub fn bind(&mut self, name: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.bindings.insert(name.into(), value.into());
        self
    }

    /// Bind a named parameter from an evaluated JSON value.
    pub fn bind_json(
        &mut self,
        name: impl Into<String>,
        value: &JsonValue,
    ) -> Result<&mut Self, EvaluationError> {
        let value = bind_value(value)?;
        Ok(self.bind(name, value))
    }

    /// Current bindings.
    pub fn bindings(&self) -> &HashMap<String, Value> {
        &self.bindings
    }

    /// Compile the statement with the current bindings.
    pub fn compile(&self) -> Result<EntityQuery, Error> {
        Ok(ruledao_lang::compile(&self.statement, &self.bindings)?)
    }

    /// Execute the query.
    pub fn execute(&self) -> Result<QueryOutput, Error> {
        let query = self.compile()?;
        trace!(query = %self.text, bindings = ?self.bindings, "executing query");
        self.session.select(&query)
    }
}

impl std::fmt::Debug for Query<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("text", &self.text)
            .field("bindings", &self.bindings)
            .finish()
    }
}

/// Convert an evaluated JSON value into a query parameter.
///
/// Objects bind as their `id` property (entity reference semantics).
pub fn bind_value(json: &JsonValue) -> Result<Value, EvaluationError> {
    match json {
        JsonValue::Object(map) => match map.get("id") {
            Some(id) if !id.is_object() => bind_value(id),
            _ => Err(EvaluationError::Unbindable(
                "object without a scalar 'id' property".to_string(),
            )),
        },
        JsonValue::Array(items) => Ok(Value::List(
            items.iter().map(bind_value).collect::<Result<_, _>>()?,
        )),
        other => Value::from_json(other).map_err(|e| EvaluationError::Unbindable(e.to_string())),
    }
}
