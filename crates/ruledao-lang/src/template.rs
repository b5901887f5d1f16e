//! Constraint query templates.
//!
//! A template is query text (see [`crate::parser`]) with embedded tokens:
//!
//! - reference tokens `${path}`, a dotted property path read off the record
//!   being validated or, failing that, a named configuration value;
//! - function tokens `$F_name(arg)`, where `arg` is free text that may hold
//!   nested tokens or the self-reference `$$`.
//!
//! [`resolve`] rewrites every token into a named parameter `:varN` and keeps
//! the raw token text so it can be evaluated later against a record.
//!
//! ```text
//! find Country where designation = $F_upper(${designation}) and zone = ${zone}
//! => find Country where designation = :var0 and zone = :var1
//!    var0 = "$F_upper(${designation})", var1 = "${zone}"
//! ```

use crate::error::{ResolveError, ResolveErrorKind};
use crate::span::Span;

/// The argument literal that evaluates to the record itself.
pub const SELF_REFERENCE: &str = "$$";

/// Prefix that opens a function token.
pub const FUNCTION_PREFIX: &str = "$F_";

/// Opening marker of a reference token.
pub const REFERENCE_OPEN: &str = "${";

/// Closing marker of a reference token.
pub const REFERENCE_CLOSE: &str = "}";

/// Prefix of minted parameter names.
pub const PARAMETER_PREFIX: &str = "var";

/// Whether `c` delimits tokens inside a template.
pub fn is_separator(c: char) -> bool {
    c.is_whitespace()
        || matches!(
            c,
            '=' | '!' | '<' | '>' | '+' | '-' | '*' | '/' | '%' | ',' | ';' | '(' | ')' | '\''
                | '"' | '|' | '&'
        )
}

/// One minted parameter and the raw token text it stands for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    /// Parameter name as it appears after `:` in the computed expression.
    pub name: String,
    /// Original token text (`${code}`, `$F_upper(${code})`).
    pub expression: String,
}

/// The resolved form of a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpressionModel {
    original: String,
    computed: String,
    parameters: Vec<Parameter>,
}

impl ExpressionModel {
    /// The template as written.
    pub fn original(&self) -> &str {
        &self.original
    }

    /// The template with every token replaced by `:varN`.
    pub fn computed(&self) -> &str {
        &self.computed
    }

    /// Parameters in minting order.
    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    /// Look up the raw expression for a parameter name.
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.expression.as_str())
    }

    /// Whether the template contained no tokens.
    pub fn is_constant(&self) -> bool {
        self.parameters.is_empty()
    }

    /// Substitute every known `:name` in the computed expression with the
    /// text produced by `f`. Unknown names are left as written.
    pub fn render<F>(&self, mut f: F) -> String
    where
        F: FnMut(&Parameter) -> String,
    {
        let src = self.computed.as_str();
        let mut out = String::with_capacity(src.len());
        let mut rest = src;

        while let Some(pos) = rest.find(':') {
            out.push_str(&rest[..pos]);
            let after = &rest[pos + 1..];
            let ident_len = ident_len(after);
            let name = &after[..ident_len];
            match self.parameters.iter().find(|p| ident_len > 0 && p.name == name) {
                Some(param) => out.push_str(&f(param)),
                None => {
                    out.push(':');
                    out.push_str(name);
                }
            }
            rest = &after[ident_len..];
        }

        out.push_str(rest);
        out
    }
}

/// A parsed function token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionCall<'a> {
    /// Function name (after the `$F_` prefix).
    pub name: &'a str,
    /// Raw argument text between the outer parentheses.
    pub arg: &'a str,
}

/// Parse `expr` as a single function token. Returns `None` unless the whole
/// (trimmed) input is exactly one well-formed token.
pub fn parse_function(expr: &str) -> Option<FunctionCall<'_>> {
    let expr = expr.trim();
    let body = expr.strip_prefix(FUNCTION_PREFIX)?;
    let name_len = ident_len(body);
    if name_len == 0 || !body[name_len..].starts_with('(') {
        return None;
    }
    let open = FUNCTION_PREFIX.len() + name_len;
    let close = matching_paren(expr, open)?;
    if close + 1 != expr.len() {
        return None;
    }
    Some(FunctionCall {
        name: &body[..name_len],
        arg: &expr[open + 1..close],
    })
}

/// Parse `expr` as a single reference token, returning its path.
pub fn parse_reference(expr: &str) -> Option<&str> {
    let path = expr
        .trim()
        .strip_prefix(REFERENCE_OPEN)?
        .strip_suffix(REFERENCE_CLOSE)?;
    is_property_path(path).then_some(path)
}

/// Whether `expr` is exactly one function or reference token.
pub fn is_token(expr: &str) -> bool {
    parse_function(expr).is_some() || parse_reference(expr).is_some()
}

/// Resolve a template into an [`ExpressionModel`].
///
/// Returns `Ok(None)` for a blank template. Function tokens are extracted
/// first so references nested in their arguments stay part of the argument;
/// every occurrence gets its own parameter, even when the token text repeats.
pub fn resolve(template: &str) -> Result<Option<ExpressionModel>, ResolveError> {
    if template.trim().is_empty() {
        return Ok(None);
    }

    let mut parameters = Vec::new();
    let computed = extract_functions(template, &mut parameters)?;
    let computed = extract_references(&computed, &mut parameters);

    Ok(Some(ExpressionModel {
        original: template.to_string(),
        computed,
        parameters,
    }))
}

fn mint(parameters: &mut Vec<Parameter>, expression: &str) -> String {
    let name = format!("{}{}", PARAMETER_PREFIX, parameters.len());
    let placeholder = format!(":{}", name);
    parameters.push(Parameter {
        name,
        expression: expression.to_string(),
    });
    placeholder
}

fn extract_functions(
    template: &str,
    parameters: &mut Vec<Parameter>,
) -> Result<String, ResolveError> {
    let mut out = String::with_capacity(template.len());
    let mut cursor = 0;

    while let Some(rel) = template[cursor..].find(FUNCTION_PREFIX) {
        let start = cursor + rel;
        let at_boundary = template[..start]
            .chars()
            .next_back()
            .map_or(true, is_separator);
        if !at_boundary {
            out.push_str(&template[cursor..start + FUNCTION_PREFIX.len()]);
            cursor = start + FUNCTION_PREFIX.len();
            continue;
        }

        let body = &template[start + FUNCTION_PREFIX.len()..];
        let name_len = ident_len(body);
        if name_len == 0 {
            return Err(ResolveError::new(
                "function token has no name",
                Span::new(start, start + FUNCTION_PREFIX.len()),
                ResolveErrorKind::MissingFunctionName,
            ));
        }

        let open = start + FUNCTION_PREFIX.len() + name_len;
        if !template[open..].starts_with('(') {
            // `$F_name` without an argument list is plain text.
            out.push_str(&template[cursor..open]);
            cursor = open;
            continue;
        }

        let close = matching_paren(template, open).ok_or_else(|| {
            ResolveError::new(
                format!(
                    "function token '{}{}' is missing its closing parenthesis",
                    FUNCTION_PREFIX,
                    &body[..name_len]
                ),
                Span::new(start, template.len()),
                ResolveErrorKind::UnterminatedFunction,
            )
        })?;

        out.push_str(&template[cursor..start]);
        out.push_str(&mint(parameters, &template[start..=close]));
        cursor = close + 1;
    }

    out.push_str(&template[cursor..]);
    Ok(out)
}

fn extract_references(text: &str, parameters: &mut Vec<Parameter>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut segment_start = 0;

    for (i, c) in text.char_indices() {
        if is_separator(c) {
            push_segment(&mut out, &text[segment_start..i], parameters);
            out.push(c);
            segment_start = i + c.len_utf8();
        }
    }
    push_segment(&mut out, &text[segment_start..], parameters);

    out
}

fn push_segment(out: &mut String, segment: &str, parameters: &mut Vec<Parameter>) {
    if parse_reference(segment).is_some() {
        out.push_str(&mint(parameters, segment));
    } else {
        out.push_str(segment);
    }
}

/// Byte index of the `)` matching the `(` at `open`.
fn matching_paren(text: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in text[open..].char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + i);
                }
            }
            _ => {}
        }
    }
    None
}

fn ident_len(text: &str) -> usize {
    let mut chars = text.char_indices();
    match chars.next() {
        Some((_, c)) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return 0,
    }
    chars
        .find(|(_, c)| !(c.is_ascii_alphanumeric() || *c == '_'))
        .map_or(text.len(), |(i, _)| i)
}

/// Whether `path` is a dotted identifier path (`order.country.code`).
pub fn is_property_path(path: &str) -> bool {
    !path.is_empty() && path.split('.').all(|seg| ident_len(seg) == seg.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn exprs(model: &ExpressionModel) -> Vec<(&str, &str)> {
        model
            .parameters()
            .iter()
            .map(|p| (p.name.as_str(), p.expression.as_str()))
            .collect()
    }

    #[test]
    fn test_blank_template() {
        assert_eq!(resolve("").unwrap(), None);
        assert_eq!(resolve("   \n").unwrap(), None);
    }

    #[test]
    fn test_reference_tokens() {
        let model = resolve("find Country where designation = ${designation}").unwrap().unwrap();
        assert_eq!(model.computed(), "find Country where designation = :var0");
        assert_eq!(exprs(&model), vec![("var0", "${designation}")]);
    }

    #[test]
    fn test_tokens_adjacent_to_separators() {
        let model = resolve("find T where a=${a} and b<>${x.y} and(c>=${c})").unwrap().unwrap();
        assert_eq!(
            model.computed(),
            "find T where a=:var0 and b<>:var1 and(c>=:var2)"
        );
        assert_eq!(
            exprs(&model),
            vec![("var0", "${a}"), ("var1", "${x.y}"), ("var2", "${c}")]
        );
    }

    #[test]
    fn test_function_tokens_first() {
        let model = resolve("find T where code = ${code} and name = $F_upper(${name})")
            .unwrap()
            .unwrap();
        assert_eq!(model.computed(), "find T where code = :var1 and name = :var0");
        assert_eq!(
            exprs(&model),
            vec![("var0", "$F_upper(${name})"), ("var1", "${code}")]
        );
    }

    #[test]
    fn test_nested_function_argument() {
        let model = resolve("count T where n = $F_length($F_trim(${label}))")
            .unwrap()
            .unwrap();
        assert_eq!(model.computed(), "count T where n = :var0");
        assert_eq!(model.parameter("var0"), Some("$F_length($F_trim(${label}))"));
    }

    #[test]
    fn test_repeated_tokens_get_fresh_parameters() {
        let model = resolve("find T where a = ${code} or b = ${code}").unwrap().unwrap();
        assert_eq!(model.parameters().len(), 2);
        assert_eq!(model.computed(), "find T where a = :var0 or b = :var1");
    }

    #[test]
    fn test_non_token_segments_untouched() {
        let model = resolve("find T where a = '${not a path!}' and b = ${}").unwrap().unwrap();
        assert!(model.is_constant());
        assert_eq!(model.computed(), model.original());
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let template = "find Order where country.code = ${country.code} and ref = ${ref}";
        let a = resolve(template).unwrap().unwrap();
        let b = resolve(template).unwrap().unwrap();
        assert_eq!(a.computed(), b.computed());
        assert_eq!(exprs(&a), exprs(&b));
    }

    #[test]
    fn test_unterminated_function() {
        let err = resolve("find T where a = $F_upper(${a}").unwrap_err();
        assert_eq!(err.kind, ResolveErrorKind::UnterminatedFunction);
        assert_eq!(err.span.start, 17);
    }

    #[test]
    fn test_missing_function_name() {
        let err = resolve("find T where a = $F_(x)").unwrap_err();
        assert_eq!(err.kind, ResolveErrorKind::MissingFunctionName);
    }

    #[test]
    fn test_parse_function() {
        assert_eq!(
            parse_function("$F_upper($$)"),
            Some(FunctionCall { name: "upper", arg: "$$" })
        );
        assert_eq!(
            parse_function(" $F_id(${country}) "),
            Some(FunctionCall { name: "id", arg: "${country}" })
        );
        assert_eq!(parse_function("$F_upper(a) b"), None);
        assert_eq!(parse_function("$F_upper"), None);
        assert_eq!(parse_function("${upper}"), None);
    }

    #[test]
    fn test_parse_reference() {
        assert_eq!(parse_reference("${order.country.code}"), Some("order.country.code"));
        assert_eq!(parse_reference("${a..b}"), None);
        assert_eq!(parse_reference("$$"), None);
        assert!(is_token("${x}"));
        assert!(!is_token("plain"));
    }

    #[test]
    fn test_render() {
        let model = resolve("find T where a = ${a} and b = ${b}").unwrap().unwrap();
        let rendered = model.render(|p| format!("<{}>", p.expression));
        assert_eq!(rendered, "find T where a = <${a}> and b = <${b}>");
    }

    #[test]
    fn test_render_keeps_unknown_names() {
        let model = resolve("find T where a = :other and b = ${b}").unwrap().unwrap();
        assert_eq!(model.render(|_| "1".into()), "find T where a = :other and b = 1");
    }
}
