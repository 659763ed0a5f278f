//! Query resolution over structured documents
//!
//! Configuration may reference the runtime output of other resources with
//! brace templates such as `"{ .database.host }"` or
//! `"postgres://{ .database.host }:{ .database.port }"`. Each template is a
//! sequence of pieces: literal text, quoted literals (`{'text'}`) and path
//! expressions. Every piece contributes matches in order:
//!
//! - a path with no matches, or no matches at all, is an error
//!   ([`QueryError::NoResult`])
//! - exactly one match is returned as-is, keeping its type
//! - several matches are joined into one string
//!
//! Path expressions support `.field`, `['field']`, `[index]` (negative counts
//! from the end), `[*]` / `.*` and recursive `..field`.
//!
//! Doubled braces (`{{ .Values.name }}`) and braces around text that is not
//! a single quoted literal (`{"team": "infra"}`) are not templates, so Go
//! templates and JSON text pass through untouched.

use crate::error::QueryError;
use crate::resource::Document;
use log::debug;
use serde_json::Value;

/// Characters that open a path inside braces
const PATH_START: &[char] = &['.', '$', '['];

const QUOTES: &[char] = &['\'', '"'];

/// One step of a path expression
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Field(String),
    Index(i64),
    Wildcard,
    Descend(String),
}

/// One piece of a template
#[derive(Debug, Clone, PartialEq, Eq)]
enum Piece {
    Text(String),
    Path(Vec<Segment>),
}

/// Check whether a string holds at least one query template segment
///
/// Braces whose content does not start like an expression, such as `"{}"`
/// or `"{name}"`, are plain text, as are doubled braces.
pub fn is_query(s: &str) -> bool {
    s.match_indices('{').any(|(i, _)| opens_at(s, i))
}

/// Resolve a query against a document
///
/// `query` is either a template containing brace segments or a bare path
/// such as `database.host`.
pub fn resolve(query: &str, data: &Document) -> Result<Value, QueryError> {
    let root = Value::Object(data.clone());
    resolve_value(query, &root)
}

/// Resolve a query against an arbitrary value
pub fn resolve_value(query: &str, root: &Value) -> Result<Value, QueryError> {
    let pieces = if is_query(query) {
        split_template(query)?
    } else {
        let path = parse_path(query.trim()).map_err(|message| parse_error(query, message))?;
        vec![Piece::Path(path)]
    };

    let mut matches: Vec<Value> = Vec::new();
    for piece in &pieces {
        match piece {
            Piece::Text(text) => matches.push(Value::String(text.clone())),
            Piece::Path(path) => {
                let found = select(path, root);
                if found.is_empty() {
                    return Err(QueryError::NoResult);
                }
                matches.extend(found.into_iter().cloned());
            }
        }
    }

    match matches.len() {
        0 => Err(QueryError::NoResult),
        1 => Ok(matches.remove(0)),
        _ => Ok(Value::String(matches.iter().map(string_form).collect())),
    }
}

/// Substitute every query template in `raw` with its result against `data`
///
/// Maps and sequences are walked recursively; leaves that are not query
/// templates are copied unchanged. The first failing template fails the
/// whole call.
pub fn populate_queries(raw: &Document, data: &Document) -> Result<Document, QueryError> {
    let root = Value::Object(data.clone());
    populate_map(raw, &root)
}

fn populate_map(raw: &Document, root: &Value) -> Result<Document, QueryError> {
    raw.iter()
        .map(|(key, value)| Ok((key.clone(), populate(value, root)?)))
        .collect()
}

fn populate(value: &Value, root: &Value) -> Result<Value, QueryError> {
    match value {
        Value::String(s) if is_query(s) => {
            let resolved = resolve_value(s, root)?;
            debug!("resolved query '{}' -> {}", s, resolved);
            Ok(resolved)
        }
        Value::Array(items) => items
            .iter()
            .map(|item| populate(item, root))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(map) => populate_map(map, root).map(Value::Object),
        other => Ok(other.clone()),
    }
}

/// String form used when several matches are joined
fn string_form(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn parse_error(query: &str, message: impl Into<String>) -> QueryError {
    QueryError::Parse {
        query: query.to_string(),
        message: message.into(),
    }
}

/// Whether the `{` at byte offset `open` starts a brace segment
fn opens_at(s: &str, open: usize) -> bool {
    let after = &s[open + 1..];
    if s[..open].ends_with('{') || after.starts_with('{') {
        return false;
    }

    let body = after.trim_start();
    let close = find_unquoted(after, '}');
    if body.starts_with(QUOTES) {
        return close.is_some_and(|c| unquote(after[..c].trim()).is_some());
    }
    // unclosed paths still open so the parse error surfaces
    body.starts_with(PATH_START) && !close.is_some_and(|c| after[c + 1..].starts_with('}'))
}

// ============================================================================
// Template parsing
// ============================================================================

fn split_template(template: &str) -> Result<Vec<Piece>, QueryError> {
    let mut pieces = Vec::new();
    let mut text = String::new();
    let mut pos = 0;

    while let Some(found) = template[pos..].find('{') {
        let open = pos + found;

        if !opens_at(template, open) {
            text.push_str(&template[pos..=open]);
            pos = open + 1;
            continue;
        }

        text.push_str(&template[pos..open]);
        let after = &template[open + 1..];
        let close =
            find_unquoted(after, '}').ok_or_else(|| parse_error(template, "unclosed '{'"))?;

        if !text.is_empty() {
            pieces.push(Piece::Text(std::mem::take(&mut text)));
        }
        pieces.push(parse_piece(after[..close].trim()).map_err(|m| parse_error(template, m))?);

        pos = open + 1 + close + 1;
    }

    text.push_str(&template[pos..]);
    if !text.is_empty() {
        pieces.push(Piece::Text(text));
    }

    Ok(pieces)
}

/// Byte offset of the first `target` outside single or double quotes
fn find_unquoted(s: &str, target: char) -> Option<usize> {
    let mut quote: Option<char> = None;
    for (i, c) in s.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '\'' || c == '"' => quote = Some(c),
            None if c == target => return Some(i),
            None => {}
        }
    }
    None
}

fn parse_piece(body: &str) -> Result<Piece, String> {
    match unquote(body) {
        Some(literal) => Ok(Piece::Text(literal.to_string())),
        None => parse_path(body).map(Piece::Path),
    }
}

/// Contents of a single quoted literal with no inner quote of the same kind
fn unquote(s: &str) -> Option<&str> {
    let quote = s.chars().next().filter(|c| QUOTES.contains(c))?;
    if s.len() < 2 || !s.ends_with(quote) {
        return None;
    }
    let inner = &s[1..s.len() - 1];
    (!inner.contains(quote)).then_some(inner)
}

// ============================================================================
// Path parsing and evaluation
// ============================================================================

fn parse_path(expr: &str) -> Result<Vec<Segment>, String> {
    if expr.is_empty() {
        return Err("empty path".to_string());
    }

    let path = expr.strip_prefix('$').unwrap_or(expr);
    let path = if path.is_empty() || path.starts_with(['.', '[']) {
        path.to_string()
    } else {
        format!(".{}", path)
    };

    let chars: Vec<char> = path.chars().collect();
    let mut segments = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '.' if chars.get(i + 1) == Some(&'.') => {
                let (name, next) = read_name(&chars, i + 2);
                if name.is_empty() {
                    return Err("expected field name after '..'".to_string());
                }
                segments.push(Segment::Descend(name));
                i = next;
            }
            '.' if chars.get(i + 1) == Some(&'*') => {
                segments.push(Segment::Wildcard);
                i += 2;
            }
            '.' => {
                let (name, next) = read_name(&chars, i + 1);
                if name.is_empty() {
                    return Err("expected field name after '.'".to_string());
                }
                segments.push(Segment::Field(name));
                i = next;
            }
            '[' => {
                let inner: String = chars[i + 1..].iter().collect();
                let close = find_unquoted(&inner, ']').ok_or("unclosed '['")?;
                segments.push(parse_bracket(inner[..close].trim())?);
                i += 1 + inner[..close].chars().count() + 1;
            }
            c => return Err(format!("unexpected character '{}'", c)),
        }
    }

    Ok(segments)
}

fn read_name(chars: &[char], start: usize) -> (String, usize) {
    let mut end = start;
    while end < chars.len() && !matches!(chars[end], '.' | '[') && !chars[end].is_whitespace() {
        end += 1;
    }
    (chars[start..end].iter().collect(), end)
}

fn parse_bracket(inner: &str) -> Result<Segment, String> {
    if inner == "*" {
        return Ok(Segment::Wildcard);
    }
    if let Some(key) = unquote(inner) {
        return Ok(Segment::Field(key.to_string()));
    }
    inner
        .parse::<i64>()
        .map(Segment::Index)
        .map_err(|_| format!("invalid subscript '[{}]'", inner))
}

fn select<'a>(path: &[Segment], root: &'a Value) -> Vec<&'a Value> {
    let mut current = vec![root];
    for segment in path {
        let mut next = Vec::new();
        for value in current {
            segment.apply(value, &mut next);
        }
        current = next;
    }
    current
}

impl Segment {
    fn apply<'a>(&self, value: &'a Value, out: &mut Vec<&'a Value>) {
        match (self, value) {
            (Self::Field(name), Value::Object(map)) => out.extend(map.get(name)),
            (Self::Index(index), Value::Array(items)) => {
                let index = if *index < 0 {
                    items.len() as i64 + index
                } else {
                    *index
                };
                if index >= 0 {
                    out.extend(items.get(index as usize));
                }
            }
            (Self::Wildcard, Value::Array(items)) => out.extend(items.iter()),
            (Self::Wildcard, Value::Object(map)) => out.extend(map.values()),
            (Self::Descend(name), _) => descend(name, value, out),
            _ => {}
        }
    }
}

fn descend<'a>(name: &str, value: &'a Value, out: &mut Vec<&'a Value>) {
    match value {
        Value::Object(map) => {
            out.extend(map.get(name));
            for child in map.values() {
                descend(name, child, out);
            }
        }
        Value::Array(items) => {
            for child in items {
                descend(name, child, out);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            other => panic!("expected an object, got {}", other),
        }
    }

    fn nested() -> Document {
        doc(json!({ "nest1": { "nest2": { "nest3": "v" } } }))
    }

    #[test]
    fn test_bare_nested_path() {
        assert_eq!(resolve("nest1.nest2.nest3", &nested()).unwrap(), json!("v"));
    }

    #[test]
    fn test_braced_path_with_hyphenated_keys() {
        let data = doc(json!({ "nest-1": { "nest-2": { "nest-3": "resultvalue" } } }));
        assert_eq!(
            resolve("{ .nest-1.nest-2.nest-3 }", &data).unwrap(),
            json!("resultvalue")
        );
        assert_eq!(
            resolve("{ .nest-1.nest-2.nest-3 }{'testing'}", &data).unwrap(),
            json!("resultvaluetesting")
        );
    }

    #[test]
    fn test_single_match_keeps_type() {
        let data = doc(json!({ "db": { "port": 5432, "tls": true, "labels": { "tier": "data" } } }));
        assert_eq!(resolve("{ .db.port }", &data).unwrap(), json!(5432));
        assert_eq!(resolve("{ .db.tls }", &data).unwrap(), json!(true));
        assert_eq!(
            resolve("{ .db.labels }", &data).unwrap(),
            json!({ "tier": "data" })
        );
    }

    #[test]
    fn test_multiple_matches_concatenate_in_order() {
        let data = doc(json!({ "hosts": [ { "name": "a" }, { "name": "b" }, { "name": 3 } ] }));
        assert_eq!(
            resolve("{ .hosts[*].name }", &data).unwrap(),
            json!("ab3")
        );
    }

    #[test]
    fn test_literal_text_joins_matches() {
        let data = doc(json!({ "db": { "host": "10.0.0.1", "port": 5432 } }));
        assert_eq!(
            resolve("postgres://{ .db.host }:{ .db.port }/app", &data).unwrap(),
            json!("postgres://10.0.0.1:5432/app")
        );
    }

    #[test]
    fn test_no_match_is_error() {
        assert_eq!(
            resolve("{ .nest1.missing }", &nested()),
            Err(QueryError::NoResult)
        );
        assert_eq!(
            resolve("nest1.nest2.nest3.deeper", &nested()),
            Err(QueryError::NoResult)
        );
    }

    #[test]
    fn test_missing_path_fails_even_with_literal_text() {
        let data = doc(json!({ "db": { "port": 5432 } }));
        assert_eq!(
            resolve("postgres://{ .db.host }:5432", &data),
            Err(QueryError::NoResult)
        );
        assert_eq!(
            resolve("{ .db.port }{ .db.host }", &data),
            Err(QueryError::NoResult)
        );
        assert_eq!(
            resolve("{'prefix-'}{ .db.host }", &data),
            Err(QueryError::NoResult)
        );
    }

    #[test]
    fn test_subscripts() {
        let data = doc(json!({
            "items": [10, 20, 30],
            "odd keys": { "a.b": "dotted" }
        }));
        assert_eq!(resolve("{ .items[0] }", &data).unwrap(), json!(10));
        assert_eq!(resolve("{ .items[-1] }", &data).unwrap(), json!(30));
        assert_eq!(resolve("{ .items[7] }", &data), Err(QueryError::NoResult));
        assert_eq!(
            resolve("{ $['odd keys']['a.b'] }", &data).unwrap(),
            json!("dotted")
        );
    }

    #[test]
    fn test_recursive_descent() {
        let data = doc(json!({
            "a": { "id": "x", "b": [ { "id": "y" } ] }
        }));
        assert_eq!(resolve("{ ..id }", &data).unwrap(), json!("xy"));
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            resolve("{ .a", &nested()),
            Err(QueryError::Parse { .. })
        ));
        assert!(matches!(
            resolve("{ .items[x] }", &nested()),
            Err(QueryError::Parse { .. })
        ));
        assert!(matches!(
            resolve("{ .a b }", &nested()),
            Err(QueryError::Parse { .. })
        ));
    }

    #[test]
    fn test_is_query() {
        assert!(is_query("{ .a }"));
        assert!(is_query("prefix-{.a}"));
        assert!(is_query("{'literal'}"));
        assert!(!is_query("plain"));
        assert!(!is_query("{}"));
        assert!(!is_query("{ name }"));
        assert!(!is_query("{{ .Values.image }}"));
        assert!(!is_query(r#"{"team": "infra"}"#));
        assert!(!is_query("{'a'b'}"));
        assert!(is_query(r#"{"it's"}"#));
        assert!(is_query("{ .a"));
    }

    #[test]
    fn test_unquote_rejects_inner_quote() {
        assert_eq!(unquote("'a.b'"), Some("a.b"));
        assert_eq!(unquote(r#""it's""#), Some("it's"));
        assert_eq!(unquote("''"), Some(""));
        assert_eq!(unquote("'"), None);
        assert_eq!(unquote(r#""team": "infra""#), None);
    }

    #[test]
    fn test_json_text_and_go_templates_pass_through() {
        let data = doc(json!({ "CommonLabels": { "alertname": "down" } }));
        let raw = doc(json!({
            "annotation": r#"{"team": "infra"}"#,
            "title": "{{ .CommonLabels.alertname }}",
            "mixed": "{{ .Release.Name }}-{ .CommonLabels.alertname }"
        }));

        let populated = populate_queries(&raw, &data).unwrap();

        assert_eq!(populated["annotation"], json!(r#"{"team": "infra"}"#));
        assert_eq!(populated["title"], json!("{{ .CommonLabels.alertname }}"));
        assert_eq!(populated["mixed"], json!("{{ .Release.Name }}-down"));
    }

    #[test]
    fn test_populate_queries_walks_nested_structures() {
        let data = doc(json!({ "db": { "host": "10.0.0.1", "port": 5432 } }));
        let raw = doc(json!({
            "replicas": 2,
            "literal": "{}",
            "env": {
                "DB_HOST": "{ .db.host }",
                "DB_URL": "postgres://{ .db.host }:{ .db.port }"
            },
            "ports": ["{ .db.port }", 8080]
        }));

        let populated = populate_queries(&raw, &data).unwrap();

        assert_eq!(
            Value::Object(populated),
            json!({
                "replicas": 2,
                "literal": "{}",
                "env": {
                    "DB_HOST": "10.0.0.1",
                    "DB_URL": "postgres://10.0.0.1:5432"
                },
                "ports": [5432, 8080]
            })
        );
    }

    #[test]
    fn test_populate_queries_fails_on_any_bad_query() {
        let data = doc(json!({ "db": { "host": "10.0.0.1" } }));
        let raw = doc(json!({
            "ok": "{ .db.host }",
            "nested": [ { "bad": "{ .db.password }" } ]
        }));

        assert_eq!(populate_queries(&raw, &data), Err(QueryError::NoResult));
    }
}
