//! Command execution.

use ruledao_core::constraint::display;
use ruledao_core::{Error, Evaluator, Session, StorageEngine};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::debug;

use crate::formatter::{Formatter, Resolution};

/// Execution errors.
#[derive(Debug, Error)]
pub enum ExecuteError {
    /// Template or query text error, rendered with its source.
    #[error("{0}")]
    Language(String),

    /// Core error.
    #[error("{0}")]
    Core(#[from] Error),

    /// A `--param` argument without `=`.
    #[error("invalid parameter '{0}': expected name=value")]
    InvalidParameter(String),

    /// A `--record` argument that is not JSON.
    #[error("invalid record: {0}")]
    InvalidRecord(String),
}

impl ExecuteError {
    fn from_core(error: Error, source: &str) -> Self {
        match error {
            Error::Query(e) => ExecuteError::Language(e.format_with_source(source)),
            other => ExecuteError::Core(other),
        }
    }
}

/// Resolve a template and, given a record, evaluate every parameter.
pub fn resolve(
    template: &str,
    record: Option<&str>,
    evaluator: &Evaluator,
    formatter: &dyn Formatter,
) -> Result<String, ExecuteError> {
    let model = ruledao_lang::resolve(template)
        .map_err(|e| ExecuteError::Language(e.format_with_source(template)))?;
    let Some(model) = model else {
        return Ok(formatter.format_message("blank template, nothing to resolve"));
    };

    let record = record
        .map(serde_json::from_str::<JsonValue>)
        .transpose()
        .map_err(|e| ExecuteError::InvalidRecord(e.to_string()))?;

    let values = model
        .parameters()
        .iter()
        .map(|param| {
            record.as_ref().map(|target| {
                match evaluator.evaluate(&param.expression, target) {
                    Ok(value) => display(&value),
                    Err(e) => format!("[{}]", e),
                }
            })
        })
        .collect();

    Ok(formatter.format_resolution(&Resolution {
        model: &model,
        values,
    }))
}

/// Run query text against a session with `name=value` parameters.
pub fn query(
    session: &dyn Session,
    text: &str,
    params: &[String],
    formatter: &dyn Formatter,
) -> Result<String, ExecuteError> {
    let mut query = session
        .create_query(text)
        .map_err(|e| ExecuteError::from_core(e, text))?;
    for param in params {
        let (name, value) = parse_param(param)?;
        query
            .bind_json(name, &value)
            .map_err(|e| ExecuteError::Core(e.into()))?;
    }
    debug!(query = text, bindings = ?query.bindings(), "running query");

    let output = query
        .execute()
        .map_err(|e| ExecuteError::from_core(e, text))?;
    Ok(formatter.format_output(&output))
}

/// Remove every record of an entity type.
pub fn clean(
    session: &dyn Session,
    entity: &str,
    formatter: &dyn Formatter,
) -> Result<String, ExecuteError> {
    let removed = session.remove_all(entity)?;
    Ok(formatter.format_mutation_result(removed, entity))
}

/// List stored entity types.
pub fn entities(engine: &StorageEngine, formatter: &dyn Formatter) -> String {
    formatter.format_entities(&engine.entity_types())
}

/// Split `name=value`. The value is read as JSON when it parses, else as a
/// plain string.
pub fn parse_param(arg: &str) -> Result<(&str, JsonValue), ExecuteError> {
    let (name, raw) = arg
        .split_once('=')
        .filter(|(name, _)| !name.trim().is_empty())
        .ok_or_else(|| ExecuteError::InvalidParameter(arg.to_string()))?;
    let value = serde_json::from_str(raw).unwrap_or_else(|_| JsonValue::String(raw.to_string()));
    Ok((name.trim(), value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formatter::{create_formatter, OutputFormat};
    use ruledao_core::{StorageConfig, StoreSession};
    use serde_json::json;

    fn store() -> (StoreSession, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let session = StoreSession::open(StorageConfig::new(dir.path())).unwrap();
        for (id, code) in [(1, "FR"), (2, "ES")] {
            session
                .merge("Country", &json!(id), &json!({"id": id, "code": code}), None)
                .unwrap();
        }
        (session, dir)
    }

    #[test]
    fn test_parse_param() {
        assert_eq!(parse_param("code=FR").unwrap(), ("code", json!("FR")));
        assert_eq!(parse_param("n=3").unwrap(), ("n", json!(3)));
        assert_eq!(parse_param("ids=[1,2]").unwrap(), ("ids", json!([1, 2])));
        assert!(matches!(parse_param("nothing"), Err(ExecuteError::InvalidParameter(_))));
        assert!(matches!(parse_param("=1"), Err(ExecuteError::InvalidParameter(_))));
    }

    #[test]
    fn test_query_with_params() {
        let (session, _dir) = store();
        let formatter = create_formatter(OutputFormat::Json);

        let out = query(&session, "find Country where code = :c", &["c=ES".into()], &*formatter)
            .unwrap();
        let rows: JsonValue = serde_json::from_str(&out).unwrap();
        assert_eq!(rows, json!([{"id": 2, "code": "ES"}]));

        let out = query(&session, "count Country", &[], &*formatter).unwrap();
        let count: JsonValue = serde_json::from_str(&out).unwrap();
        assert_eq!(count, json!({"count": 2}));
    }

    #[test]
    fn test_query_errors_show_source() {
        let (session, _dir) = store();
        let formatter = create_formatter(OutputFormat::Table);

        let err = query(&session, "find Country where", &[], &*formatter).unwrap_err();
        assert!(matches!(err, ExecuteError::Language(_)));

        let err = query(&session, "find Country where code = :c", &[], &*formatter).unwrap_err();
        assert!(err.to_string().contains("c"));
    }

    #[test]
    fn test_resolve_with_record() {
        let evaluator = Evaluator::default();
        let formatter = create_formatter(OutputFormat::Json);

        let out = resolve(
            "find Country where code = $F_upper(${code}) and id != ${id}",
            Some(r#"{"code": "fr", "id": 9}"#),
            &evaluator,
            &*formatter,
        )
        .unwrap();
        let json: JsonValue = serde_json::from_str(&out).unwrap();
        assert_eq!(json["computed"], "find Country where code = :var0 and id != :var1");
        assert_eq!(json["parameters"][0]["value"], "FR");
        assert_eq!(json["parameters"][1]["value"], "9");

        let out = resolve("   ", None, &evaluator, &*formatter).unwrap();
        assert!(out.contains("blank template"));

        assert!(matches!(
            resolve("find X where a = ${a}", Some("{"), &evaluator, &*formatter),
            Err(ExecuteError::InvalidRecord(_))
        ));
    }

    #[test]
    fn test_clean() {
        let (session, _dir) = store();
        let formatter = create_formatter(OutputFormat::Table);
        let out = clean(&session, "Country", &*formatter).unwrap();
        assert_eq!(out, "2 record(s) removed from Country");
        assert!(entities(session.engine(), &*formatter).contains("Country"));
    }
}
