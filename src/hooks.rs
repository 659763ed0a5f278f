//! Hooks the CLI registers on the worker

use anyhow::{Context, Result, bail};
use converge::{ConsolidatedErrors, Document, Error, Hook};
use serde_json::Value;
use std::fs;
use std::path::PathBuf;

use crate::ui;

/// Renders run failures
pub struct ReportHook;

impl Hook for ReportHook {
    fn on_error(&mut self, error: &Error) {
        ui::error(&error.to_string());
    }

    fn on_consolidated_errors(&mut self, errors: &ConsolidatedErrors) {
        ui::consolidated_errors(errors);
    }
}

/// Writes resolved `--query` values to a JSON file after a successful run
pub struct OutputsHook {
    path: PathBuf,
    queries: Document,
}

impl OutputsHook {
    pub fn new(path: PathBuf, queries: Document) -> Self {
        Self { path, queries }
    }
}

impl Hook for OutputsHook {
    fn data_queries(&self) -> Document {
        self.queries.clone()
    }

    fn post_apply(&mut self, data: &Document) -> Result<()> {
        let content = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, content)
            .with_context(|| format!("Could not write {}", self.path.display()))?;
        ui::success(&format!("Wrote outputs to {}", self.path.display()));
        Ok(())
    }
}

/// Parse `key=expr` pairs into a query template
///
/// Without any pair, every resource's full output is selected.
pub fn parse_queries(pairs: &[String], resources: &[String]) -> Result<Document> {
    let mut queries = Document::new();

    if pairs.is_empty() {
        for name in resources {
            queries.insert(name.clone(), Value::String(output_query(name)?));
        }
        return Ok(queries);
    }

    for pair in pairs {
        let Some((key, expr)) = pair.split_once('=') else {
            bail!("invalid query '{}', expected KEY=EXPR", pair);
        };
        let key = key.trim();
        if key.is_empty() {
            bail!("invalid query '{}', key is empty", pair);
        }
        queries.insert(key.to_string(), Value::String(expr.to_string()));
    }
    Ok(queries)
}

/// Bracketed query for a resource's whole output, safe for any key
fn output_query(name: &str) -> Result<String> {
    match (name.contains('\''), name.contains('"')) {
        (false, _) => Ok(format!("{{ ['{}'] }}", name)),
        (true, false) => Ok(format!("{{ [\"{}\"] }}", name)),
        (true, true) => bail!("resource name {} cannot be used as an output key", name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_parse_queries() {
        let pairs = vec![
            "db_host={ .db.host }".to_string(),
            "url=https://{ .web.host }/?a=b".to_string(),
        ];
        let queries = parse_queries(&pairs, &[]).unwrap();
        assert_eq!(
            Value::Object(queries),
            json!({ "db_host": "{ .db.host }", "url": "https://{ .web.host }/?a=b" })
        );
    }

    #[test]
    fn test_parse_queries_rejects_malformed() {
        assert!(parse_queries(&["nokey".to_string()], &[]).is_err());
        assert!(parse_queries(&["=expr".to_string()], &[]).is_err());
    }

    #[test]
    fn test_default_queries_select_every_output() {
        let queries = parse_queries(&[], &["db".to_string(), "web".to_string()]).unwrap();
        assert_eq!(
            Value::Object(queries),
            json!({ "db": "{ ['db'] }", "web": "{ ['web'] }" })
        );
    }

    #[test]
    fn test_default_queries_resolve_awkward_names() {
        let names = vec![
            "db.primary".to_string(),
            "cache [eu]".to_string(),
            "owner's-bucket".to_string(),
        ];
        let queries = parse_queries(&[], &names).unwrap();
        let data = json!({
            "db.primary": { "host": "10.0.0.5" },
            "cache [eu]": { "port": 6379 },
            "owner's-bucket": { "arn": "arn:aws:s3:::b" }
        })
        .as_object()
        .cloned()
        .unwrap();

        let resolved = converge::populate_queries(&queries, &data).unwrap();

        assert_eq!(Value::Object(resolved), Value::Object(data));
    }

    #[test]
    fn test_default_queries_reject_name_with_both_quotes() {
        assert!(parse_queries(&[], &[r#"a'b"c"#.to_string()]).is_err());
    }

    #[test]
    fn test_outputs_hook_writes_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("outputs.json");
        let mut hook = OutputsHook::new(path.clone(), Document::new());

        let data = json!({ "db_host": "10.0.0.5" }).as_object().cloned().unwrap();
        hook.post_apply(&data).unwrap();

        let written: Value = serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(written, json!({ "db_host": "10.0.0.5" }));
    }
}
