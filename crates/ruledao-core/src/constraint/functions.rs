//! Function table for `$F_name(arg)` tokens.
//!
//! The table is a statically declared `name -> fn` map. It is validated when
//! built and never mutated afterwards, so one instance is shared across
//! evaluators behind an [`Arc`].

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use serde_json::Value as JsonValue;

use crate::error::Error;
use crate::storage::key::current_timestamp;

/// A function taking no argument.
pub type NullaryFn = fn() -> Result<JsonValue, String>;

/// A function taking the evaluated argument.
pub type UnaryFn = fn(&JsonValue) -> Result<JsonValue, String>;

/// A registered function.
#[derive(Debug, Clone, Copy)]
pub enum Function {
    Nullary(NullaryFn),
    Unary(UnaryFn),
}

impl Function {
    /// Number of arguments the function reads.
    pub fn arity(&self) -> usize {
        match self {
            Function::Nullary(_) => 0,
            Function::Unary(_) => 1,
        }
    }
}

/// Immutable function dispatch table.
#[derive(Debug, Clone, Default)]
pub struct FunctionTable {
    functions: HashMap<String, Function>,
}

impl FunctionTable {
    /// Start a table from scratch.
    pub fn builder() -> FunctionTableBuilder {
        FunctionTableBuilder::default()
    }

    /// The shared table of built-in functions.
    pub fn builtins() -> Arc<FunctionTable> {
        static BUILTINS: OnceLock<Arc<FunctionTable>> = OnceLock::new();
        BUILTINS
            .get_or_init(|| {
                let table = FunctionTable::builder()
                    .with_builtins()
                    .build()
                    .expect("built-in function names are valid and distinct");
                Arc::new(table)
            })
            .clone()
    }

    /// Look up a function by name.
    pub fn get(&self, name: &str) -> Option<Function> {
        self.functions.get(name).copied()
    }

    /// Check if a function exists.
    pub fn has_function(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn function_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of registered functions.
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

/// Collects functions and validates them into a [`FunctionTable`].
#[derive(Debug, Default)]
pub struct FunctionTableBuilder {
    entries: Vec<(String, Function)>,
}

impl FunctionTableBuilder {
    /// Add every built-in function.
    pub fn with_builtins(mut self) -> Self {
        self.entries.extend(
            builtin_entries()
                .into_iter()
                .map(|(name, f)| (name.to_string(), f)),
        );
        self
    }

    /// Register a function taking no argument.
    pub fn nullary(mut self, name: impl Into<String>, f: NullaryFn) -> Self {
        self.entries.push((name.into(), Function::Nullary(f)));
        self
    }

    /// Register a single-argument function.
    pub fn unary(mut self, name: impl Into<String>, f: UnaryFn) -> Self {
        self.entries.push((name.into(), Function::Unary(f)));
        self
    }

    /// Validate names (identifiers, no duplicates) and build the table.
    pub fn build(self) -> Result<FunctionTable, Error> {
        let mut functions = HashMap::with_capacity(self.entries.len());
        for (name, f) in self.entries {
            if !is_function_name(&name) {
                return Err(Error::Config(format!("invalid function name '{}'", name)));
            }
            if functions.insert(name.clone(), f).is_some() {
                return Err(Error::Config(format!("function '{}' registered twice", name)));
            }
        }
        Ok(FunctionTable { functions })
    }
}

fn is_function_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Render a value the way it reads in a message: strings unquoted, every
/// other value as JSON.
pub fn display(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn builtin_entries() -> Vec<(&'static str, Function)> {
    vec![
        ("upper", Function::Unary(upper)),
        ("lower", Function::Unary(lower)),
        ("trim", Function::Unary(trim)),
        ("length", Function::Unary(length)),
        ("id", Function::Unary(id)),
        ("str", Function::Unary(stringify)),
        ("int", Function::Unary(int)),
        ("abs", Function::Unary(abs)),
        ("now", Function::Nullary(now)),
        ("today", Function::Nullary(today)),
    ]
}

fn map_string(value: &JsonValue, f: impl FnOnce(&str) -> String) -> JsonValue {
    match value {
        JsonValue::String(s) => JsonValue::String(f(s)),
        other => other.clone(),
    }
}

fn upper(value: &JsonValue) -> Result<JsonValue, String> {
    Ok(map_string(value, str::to_uppercase))
}

fn lower(value: &JsonValue) -> Result<JsonValue, String> {
    Ok(map_string(value, str::to_lowercase))
}

fn trim(value: &JsonValue) -> Result<JsonValue, String> {
    Ok(map_string(value, |s| s.trim().to_string()))
}

fn length(value: &JsonValue) -> Result<JsonValue, String> {
    let len = match value {
        JsonValue::Null => 0,
        JsonValue::String(s) => s.chars().count(),
        JsonValue::Array(items) => items.len(),
        JsonValue::Object(map) => map.len(),
        other => return Err(format!("no length for {}", other)),
    };
    Ok(JsonValue::from(len))
}

fn id(value: &JsonValue) -> Result<JsonValue, String> {
    Ok(value.get("id").cloned().unwrap_or(JsonValue::Null))
}

fn stringify(value: &JsonValue) -> Result<JsonValue, String> {
    Ok(JsonValue::String(display(value)))
}

fn int(value: &JsonValue) -> Result<JsonValue, String> {
    match value {
        JsonValue::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().and_then(truncate))
            .map(JsonValue::from)
            .ok_or_else(|| format!("{} is out of range", n)),
        JsonValue::String(s) => {
            let s = s.trim();
            if let Ok(i) = s.parse::<i64>() {
                return Ok(JsonValue::from(i));
            }
            let f = s
                .parse::<f64>()
                .map_err(|_| format!("'{}' is not numeric", s))?;
            truncate(f)
                .map(JsonValue::from)
                .ok_or_else(|| format!("'{}' is out of range", s))
        }
        other => Err(format!("cannot convert {} to an integer", other)),
    }
}

/// Truncate toward zero, or `None` when the result does not fit an `i64`.
fn truncate(f: f64) -> Option<i64> {
    let t = f.trunc();
    // i64::MAX as f64 rounds up to 2^63, which is itself out of range.
    (t.is_finite() && t >= i64::MIN as f64 && t < i64::MAX as f64).then_some(t as i64)
}

fn abs(value: &JsonValue) -> Result<JsonValue, String> {
    match value {
        JsonValue::Number(n) if n.is_u64() => Ok(value.clone()),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => i
                .checked_abs()
                .map(JsonValue::from)
                .ok_or_else(|| format!("{} overflows", i)),
            None => Ok(n.as_f64().map(f64::abs).map_or(JsonValue::Null, JsonValue::from)),
        },
        other => Err(format!("{} is not a number", other)),
    }
}

fn now() -> Result<JsonValue, String> {
    Ok(JsonValue::from(current_timestamp()))
}

fn today() -> Result<JsonValue, String> {
    const MICROS_PER_DAY: u64 = 86_400_000_000;
    Ok(JsonValue::from(current_timestamp() / MICROS_PER_DAY))
}
