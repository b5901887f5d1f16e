//! Value evaluator.
//!
//! Computes the value of a raw template token against the record being
//! validated. Precedence: function token, then reference token, then null.

use std::collections::BTreeMap;
use std::sync::Arc;

use ruledao_lang::template::{self, SELF_REFERENCE};
use serde_json::Value as JsonValue;
use tracing::{trace, warn};

use super::functions::{display, Function, FunctionTable};
use crate::error::EvaluationError;

/// Evaluates template tokens against records.
#[derive(Debug, Clone)]
pub struct Evaluator {
    functions: Arc<FunctionTable>,
    properties: Arc<BTreeMap<String, JsonValue>>,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new(FunctionTable::builtins(), BTreeMap::new())
    }
}

impl Evaluator {
    /// Create an evaluator over a function table and named configuration
    /// values.
    pub fn new(functions: Arc<FunctionTable>, properties: BTreeMap<String, JsonValue>) -> Self {
        Self {
            functions,
            properties: Arc::new(properties),
        }
    }

    /// The function table.
    pub fn functions(&self) -> &FunctionTable {
        &self.functions
    }

    /// Named configuration values.
    pub fn properties(&self) -> &BTreeMap<String, JsonValue> {
        &self.properties
    }

    /// Evaluate one token against `target`.
    ///
    /// Unknown functions pass their argument through. Anything that is not a
    /// token evaluates to null.
    pub fn evaluate(&self, expr: &str, target: &JsonValue) -> Result<JsonValue, EvaluationError> {
        if let Some(call) = template::parse_function(expr) {
            let arg = self.argument(call.arg, target)?;
            return match self.functions.get(call.name) {
                Some(Function::Unary(f)) => f(&arg).map_err(|reason| EvaluationError::Function {
                    name: call.name.to_string(),
                    reason,
                }),
                Some(Function::Nullary(f)) => f().map_err(|reason| EvaluationError::Function {
                    name: call.name.to_string(),
                    reason,
                }),
                None => {
                    trace!(function = call.name, "unknown function, passing argument through");
                    Ok(arg)
                }
            };
        }

        if let Some(path) = template::parse_reference(expr) {
            return self.navigate(path, target);
        }

        Ok(JsonValue::Null)
    }

    /// Function arguments: `$$` is the record, nested tokens are evaluated,
    /// other text is a string literal and blank text is null.
    fn argument(&self, arg: &str, target: &JsonValue) -> Result<JsonValue, EvaluationError> {
        let arg = arg.trim();
        if arg == SELF_REFERENCE {
            Ok(target.clone())
        } else if template::is_token(arg) {
            self.evaluate(arg, target)
        } else if arg.is_empty() {
            Ok(JsonValue::Null)
        } else {
            Ok(JsonValue::String(arg.to_string()))
        }
    }

    /// Read a dotted path off `target`, falling back to a configuration
    /// value when the first segment is not a property of the record.
    fn navigate(&self, path: &str, target: &JsonValue) -> Result<JsonValue, EvaluationError> {
        let mut segments = path.split('.');
        let first = segments.next().unwrap_or_default();

        let mut current = match target.get(first) {
            Some(value) => value,
            None => {
                return self.properties.get(path).cloned().ok_or_else(|| {
                    EvaluationError::PropertyNotFound {
                        path: path.to_string(),
                        segment: first.to_string(),
                    }
                })
            }
        };

        for segment in segments {
            current = match current {
                JsonValue::Null => return Ok(JsonValue::Null),
                JsonValue::Object(map) => {
                    map.get(segment)
                        .ok_or_else(|| EvaluationError::PropertyNotFound {
                            path: path.to_string(),
                            segment: segment.to_string(),
                        })?
                }
                _ => {
                    return Err(EvaluationError::PropertyNotFound {
                        path: path.to_string(),
                        segment: segment.to_string(),
                    })
                }
            };
        }

        Ok(current.clone())
    }

    /// Compute one message parameter.
    ///
    /// The expression is resolved like a query template and every token is
    /// replaced by its display value. A token that cannot be evaluated
    /// renders as `[expression]` instead of failing.
    pub fn message_param(&self, expr: &str, target: &JsonValue) -> String {
        let model = match template::resolve(expr) {
            Ok(Some(model)) => model,
            Ok(None) => return String::new(),
            Err(e) => {
                warn!(expression = expr, error = %e, "unresolvable message parameter");
                return format!("[{}]", expr);
            }
        };
        if model.is_constant() {
            return expr.to_string();
        }

        model.render(|param| match self.evaluate(&param.expression, target) {
            Ok(value) => display(&value),
            Err(e) => {
                warn!(expression = %param.expression, error = %e, "message parameter fallback");
                format!("[{}]", param.expression)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn evaluator() -> Evaluator {
        let mut properties = BTreeMap::new();
        properties.insert("default.zone".to_string(), json!("EU"));
        properties.insert("limit".to_string(), json!(3));
        Evaluator::new(FunctionTable::builtins(), properties)
    }

    fn order() -> JsonValue {
        json!({
            "id": 5,
            "code": "fr-01",
            "country": {"id": 1, "code": "FR", "zone": null},
            "total": -12
        })
    }

    #[test]
    fn test_reference_paths() {
        let ev = evaluator();
        let target = order();
        assert_eq!(ev.evaluate("${code}", &target).unwrap(), json!("fr-01"));
        assert_eq!(ev.evaluate("${country.code}", &target).unwrap(), json!("FR"));
        assert_eq!(ev.evaluate("${country}", &target).unwrap()["id"], json!(1));
        // Null intermediate yields null
        assert_eq!(ev.evaluate("${country.zone.name}", &target).unwrap(), json!(null));
    }

    #[test]
    fn test_missing_property() {
        let ev = evaluator();
        let err = ev.evaluate("${country.name}", &order()).unwrap_err();
        assert_eq!(
            err,
            EvaluationError::PropertyNotFound {
                path: "country.name".into(),
                segment: "name".into()
            }
        );
        assert!(ev.evaluate("${nope}", &order()).is_err());
        assert!(ev.evaluate("${code.x}", &order()).is_err());
    }

    #[test]
    fn test_configuration_fallback() {
        let ev = evaluator();
        assert_eq!(ev.evaluate("${default.zone}", &order()).unwrap(), json!("EU"));
        assert_eq!(ev.evaluate("${limit}", &json!(null)).unwrap(), json!(3));
    }

    #[test]
    fn test_functions() {
        let ev = evaluator();
        let target = order();
        assert_eq!(ev.evaluate("$F_upper(${code})", &target).unwrap(), json!("FR-01"));
        assert_eq!(
            ev.evaluate("$F_lower($F_str(${country.code}))", &target).unwrap(),
            json!("fr")
        );
        assert_eq!(ev.evaluate("$F_id($$)", &target).unwrap(), json!(5));
        assert_eq!(ev.evaluate("$F_abs(${total})", &target).unwrap(), json!(12));
        assert_eq!(ev.evaluate("$F_upper(literal)", &target).unwrap(), json!("LITERAL"));
        assert!(ev.evaluate("$F_today()", &target).unwrap().is_u64());
    }

    #[test]
    fn test_unknown_function_is_identity() {
        let ev = evaluator();
        assert_eq!(ev.evaluate("$F_mystery(${code})", &order()).unwrap(), json!("fr-01"));
    }

    #[test]
    fn test_function_error() {
        let ev = evaluator();
        let err = ev.evaluate("$F_int(${code})", &order()).unwrap_err();
        assert!(matches!(err, EvaluationError::Function { ref name, .. } if name == "int"));
    }

    #[test]
    fn test_non_token_is_null() {
        let ev = evaluator();
        assert_eq!(ev.evaluate("code", &order()).unwrap(), json!(null));
        assert_eq!(ev.evaluate("${bad path}", &order()).unwrap(), json!(null));
    }

    #[test]
    fn test_message_params() {
        let ev = evaluator();
        let target = order();
        assert_eq!(ev.message_param("${country.code}", &target), "FR");
        assert_eq!(ev.message_param("${code} in ${default.zone}", &target), "fr-01 in EU");
        assert_eq!(ev.message_param("${missing}", &target), "[${missing}]");
        assert_eq!(ev.message_param("plain", &target), "plain");
        assert_eq!(ev.message_param("$F_open(", &target), "[$F_open(]");
    }
}
