//! Generic data-access object.
//!
//! One [`Dao`] serves every [`Entity`] type. Mutations run through the
//! [`Orchestrator`], so the declared constraints of the record's type are
//! checked before and after the store write.

use std::sync::Arc;

use ruledao_lang::template::is_property_path;
use ruledao_proto::{EntityQuery, FilterExpr, OrderSpec, Pagination};
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use crate::catalog::{DeclarationCatalog, Entity};
use crate::config::{DaoConfig, Phases};
use crate::constraint::{ConstraintDecl, Evaluator, FunctionTable, OperationMode, Orchestrator};
use crate::error::Error;
use crate::session::{QueryOutput, Session, Stored};
use crate::storage::key::display_id;
use crate::storage::StoreSession;

/// Parameters of [`Dao::filter`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterRequest {
    /// Predicates, all of which must hold.
    pub predicates: Vec<FilterExpr>,
    /// Sort keys, most significant first.
    pub ordering: Vec<OrderSpec>,
    /// Properties to load with each record.
    pub eager: Vec<String>,
    /// Rows to skip.
    pub offset: Option<u32>,
    /// Maximum rows to return.
    pub limit: Option<u32>,
}

impl FilterRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_predicate(mut self, predicate: FilterExpr) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn with_order(mut self, order: OrderSpec) -> Self {
        self.ordering.push(order);
        self
    }

    pub fn with_eager(mut self, path: impl Into<String>) -> Self {
        self.eager.push(path.into());
        self
    }

    pub fn with_offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Build the structured query for `entity`.
    ///
    /// Eager paths are only checked for syntax: nested objects are stored
    /// inside the document and come back with it.
    pub fn to_query(&self, entity: &str) -> Result<EntityQuery, Error> {
        if let Some(bad) = self.eager.iter().find(|p| !is_property_path(p)) {
            return Err(Error::InvalidRequest(format!(
                "'{}' is not a property path",
                bad
            )));
        }

        let mut query = EntityQuery::new(entity);
        query.filter = match self.predicates.len() {
            0 => None,
            1 => Some(self.predicates[0].clone()),
            _ => Some(FilterExpr::and(self.predicates.clone())),
        };
        query.order_by = self.ordering.clone();
        if self.offset.is_some() || self.limit.is_some() {
            query.pagination = Some(Pagination::new(
                self.limit.unwrap_or(u32::MAX),
                self.offset.unwrap_or(0),
            ));
        }
        Ok(query)
    }
}

/// One failed item of a batch.
#[derive(Debug)]
pub struct BatchFailure {
    /// Position of the item in the input.
    pub index: usize,
    /// Why it failed.
    pub error: Error,
}

/// Outcome of a batch operation.
#[derive(Debug)]
pub struct BatchReport<T> {
    /// Records written or removed, in input order.
    pub succeeded: Vec<T>,
    /// Items that failed when errors were set to continue.
    pub failures: Vec<BatchFailure>,
}

impl<T> BatchReport<T> {
    fn new() -> Self {
        Self {
            succeeded: Vec::new(),
            failures: Vec::new(),
        }
    }

    /// Whether every item succeeded.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Generic data-access object over a [`Session`].
pub struct Dao<S: Session = StoreSession> {
    session: S,
    evaluator: Evaluator,
    catalog: DeclarationCatalog,
    phases: Phases,
    continue_on_error: bool,
}

impl Dao<StoreSession> {
    /// Open the sled store described by `config`.
    pub fn open(config: DaoConfig) -> Result<Self, Error> {
        let session = StoreSession::open(config.storage.clone())?;
        Ok(Self::with_session(session, config))
    }
}

impl<S: Session> Dao<S> {
    /// Build a DAO over an existing session.
    pub fn with_session(session: S, config: DaoConfig) -> Self {
        let catalog = DeclarationCatalog::new();
        catalog.register_all(&config.declarations);
        Self {
            session,
            evaluator: Evaluator::new(FunctionTable::builtins(), config.properties),
            catalog,
            phases: config.phases,
            continue_on_error: config.continue_on_error,
        }
    }

    /// Replace the evaluator's function table.
    pub fn with_functions(mut self, functions: Arc<FunctionTable>) -> Self {
        self.evaluator = Evaluator::new(functions, self.evaluator.properties().clone());
        self
    }

    /// The persistence session.
    pub fn session(&self) -> &S {
        &self.session
    }

    /// The declaration catalog.
    pub fn catalog(&self) -> &DeclarationCatalog {
        &self.catalog
    }

    /// The value evaluator.
    pub fn evaluator(&self) -> &Evaluator {
        &self.evaluator
    }

    /// Default phases.
    pub fn phases(&self) -> Phases {
        self.phases
    }

    /// Insert a new record. A null id is replaced by a freshly generated one.
    pub fn save<T: Entity>(&self, record: &T) -> Result<T, Error> {
        self.save_with(record, self.phases)
    }

    /// [`Dao::save`] with explicit phases.
    pub fn save_with<T: Entity>(&self, record: &T, phases: Phases) -> Result<T, Error> {
        let mut document = to_document(record, OperationMode::Create)?;
        if document.get(T::ID_FIELD).map_or(true, JsonValue::is_null) {
            let id = self.session.next_id(T::NAME)?;
            debug!(entity = T::NAME, id = %id, "assigned id");
            document[T::ID_FIELD] = id;
        }
        let id = document[T::ID_FIELD].clone();

        let stored = self
            .orchestrator::<T>(OperationMode::Create, phases)
            .run(&document, || {
                self.session.merge(T::NAME, &id, &document, Some(0))
            })?;
        from_document(stored.document)
    }

    /// Replace an existing record.
    pub fn update<T: Entity>(&self, record: &T) -> Result<T, Error> {
        self.update_with(record, self.phases)
    }

    /// [`Dao::update`] with explicit phases.
    pub fn update_with<T: Entity>(&self, record: &T, phases: Phases) -> Result<T, Error> {
        let document = to_document(record, OperationMode::Update)?;
        let id = match document.get(T::ID_FIELD) {
            Some(id) if !id.is_null() => id.clone(),
            _ => {
                return Err(Error::NullInput {
                    operation: OperationMode::Update,
                    what: "id",
                })
            }
        };

        let stored = self
            .orchestrator::<T>(OperationMode::Update, phases)
            .run(&document, || {
                let current = self
                    .session
                    .find(T::NAME, &id)?
                    .ok_or_else(|| not_found::<T>(&id))?;
                self.session
                    .merge(T::NAME, &id, &document, Some(current.version))
            })?;
        from_document(stored.document)
    }

    /// Remove a record by id, returning it.
    pub fn delete<T: Entity>(&self, id: &JsonValue) -> Result<T, Error> {
        self.delete_with(id, self.phases)
    }

    /// [`Dao::delete`] with explicit phases.
    pub fn delete_with<T: Entity>(&self, id: &JsonValue, phases: Phases) -> Result<T, Error> {
        if id.is_null() {
            return Err(Error::NullInput {
                operation: OperationMode::Delete,
                what: "id",
            });
        }
        let existing = self
            .session
            .find(T::NAME, id)?
            .ok_or_else(|| not_found::<T>(id).into_mutation(OperationMode::Delete))?;

        let stored = self
            .orchestrator::<T>(OperationMode::Delete, phases)
            .run(&existing.document, || {
                self.session
                    .remove(T::NAME, id)?
                    .ok_or_else(|| not_found::<T>(id))
            })?;
        from_document(stored.document)
    }

    /// Load a record by id.
    pub fn find<T: Entity>(&self, id: &JsonValue) -> Result<Option<T>, Error> {
        match self.session.find(T::NAME, id)? {
            Some(stored) => Ok(Some(from_document(stored.document)?)),
            None => Ok(None),
        }
    }

    /// Number of stored records of `T`.
    pub fn count<T: Entity>(&self) -> Result<u64, Error> {
        Ok(self.session.select(&EntityQuery::count(T::NAME))?.size())
    }

    /// Remove every record of `T` without validation.
    pub fn clean<T: Entity>(&self) -> Result<usize, Error> {
        let removed = self.session.remove_all(T::NAME)?;
        debug!(entity = T::NAME, removed, "cleaned");
        Ok(removed)
    }

    /// Records of `T` matching a request.
    pub fn filter<T: Entity>(&self, request: &FilterRequest) -> Result<Vec<T>, Error> {
        let query = request.to_query(T::NAME)?;
        match self.session.select(&query)? {
            QueryOutput::Rows(rows) => rows.into_iter().map(from_document).collect(),
            QueryOutput::Count(_) => Ok(Vec::new()),
        }
    }

    /// Save several records, one at a time.
    pub fn save_all<T: Entity>(&self, records: &[T]) -> Result<BatchReport<T>, Error> {
        self.save_all_with(records, self.continue_on_error)
    }

    /// [`Dao::save_all`] with explicit error handling. With
    /// `continue_on_error` false the first failure is returned as is.
    pub fn save_all_with<T: Entity>(
        &self,
        records: &[T],
        continue_on_error: bool,
    ) -> Result<BatchReport<T>, Error> {
        self.batch(records, continue_on_error, |record| self.save(record))
    }

    /// Delete several records by id, one at a time.
    pub fn delete_all<T: Entity>(&self, ids: &[JsonValue]) -> Result<BatchReport<T>, Error> {
        self.delete_all_with(ids, self.continue_on_error)
    }

    /// [`Dao::delete_all`] with explicit error handling.
    pub fn delete_all_with<T: Entity>(
        &self,
        ids: &[JsonValue],
        continue_on_error: bool,
    ) -> Result<BatchReport<T>, Error> {
        self.batch(ids, continue_on_error, |id| self.delete::<T>(id))
    }

    fn batch<I, T, F>(
        &self,
        items: &[I],
        continue_on_error: bool,
        mut apply: F,
    ) -> Result<BatchReport<T>, Error>
    where
        F: FnMut(&I) -> Result<T, Error>,
    {
        let mut report = BatchReport::new();
        for (index, item) in items.iter().enumerate() {
            match apply(item) {
                Ok(done) => report.succeeded.push(done),
                Err(error) if continue_on_error => {
                    warn!(index, code = error.code(), error = %error, "batch item failed");
                    report.failures.push(BatchFailure { index, error });
                }
                Err(error) => return Err(error),
            }
        }
        Ok(report)
    }

    fn orchestrator<T: Entity>(&self, mode: OperationMode, phases: Phases) -> Operation<'_> {
        Operation {
            declarations: self.catalog.declarations_for::<T>(),
            session: &self.session,
            evaluator: &self.evaluator,
            entity: T::NAME,
            id_field: T::ID_FIELD,
            mode,
            phases,
        }
    }
}

/// One DAO call: the inputs of its orchestrator.
struct Operation<'a> {
    declarations: Arc<[ConstraintDecl]>,
    session: &'a dyn Session,
    evaluator: &'a Evaluator,
    entity: &'static str,
    id_field: &'static str,
    mode: OperationMode,
    phases: Phases,
}

impl Operation<'_> {
    fn run<F>(&self, target: &JsonValue, mutate: F) -> Result<Stored, Error>
    where
        F: FnOnce() -> Result<Stored, Error>,
    {
        Orchestrator::new(
            self.session,
            self.evaluator,
            self.entity,
            self.id_field,
            &self.declarations,
            self.mode,
        )
        .with_phases(self.phases)
        .run(target, mutate)
    }
}

fn not_found<T: Entity>(id: &JsonValue) -> Error {
    Error::NotFound {
        entity: T::NAME.to_string(),
        id: display_id(id),
    }
}

fn to_document<T: Entity>(record: &T, operation: OperationMode) -> Result<JsonValue, Error> {
    match serde_json::to_value(record) {
        Ok(JsonValue::Null) => Err(Error::NullInput {
            operation,
            what: "record",
        }),
        Ok(document @ JsonValue::Object(_)) => Ok(document),
        Ok(other) => Err(Error::InvalidRequest(format!(
            "{} must serialize to an object, got {}",
            T::NAME,
            other
        ))),
        Err(e) => Err(Error::Serialization(e.to_string())),
    }
}

fn from_document<T: Entity>(document: JsonValue) -> Result<T, Error> {
    serde_json::from_value(document).map_err(|e| Error::Deserialization(e.to_string()))
}
