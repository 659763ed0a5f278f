//! Built-in command-line drivers
//!
//! Each driver shells out to the backend's own CLI (`helm`, `kubectl`,
//! `terraform`) and parses its JSON output. Source and target documents are
//! validated when the driver is constructed so a bad resource fails before
//! anything runs.

pub mod helm;
pub mod kubernetes;
pub mod terraform;

use anyhow::{Context, Result, bail};
use converge::{BoxedDriver, Document, DriverRegistry, Resource, SharedDriverOpts};
use serde_json::Value;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};

use crate::config::Tools;

/// Registry with every built-in driver registered
pub fn registry(tools: &Tools, default_driver: &str) -> converge::Result<DriverRegistry> {
    let mut registry = DriverRegistry::new();

    let helm = tools.helm.clone();
    registry.register(
        "helm",
        move |resource: &Resource, opts: &SharedDriverOpts| -> Result<BoxedDriver> {
            Ok(Box::new(helm::HelmDriver::new(
                resource,
                opts,
                Tool::new(&helm),
            )?))
        },
    )?;

    let kubectl = tools.kubectl.clone();
    registry.register(
        "kubernetes",
        move |resource: &Resource, opts: &SharedDriverOpts| -> Result<BoxedDriver> {
            Ok(Box::new(kubernetes::KubernetesDriver::new(
                resource,
                opts,
                Tool::new(&kubectl),
            )?))
        },
    )?;

    let terraform = tools.terraform.clone();
    registry.register(
        "terraform",
        move |resource: &Resource, opts: &SharedDriverOpts| -> Result<BoxedDriver> {
            Ok(Box::new(terraform::TerraformDriver::new(
                resource,
                opts,
                Tool::new(&terraform),
            )?))
        },
    )?;

    registry.set_default(default_driver)?;
    Ok(registry)
}

/// An external executable invoked by a driver
#[derive(Debug, Clone)]
pub struct Tool {
    program: String,
}

impl Tool {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Run and capture stdout, failing with stderr on a non-zero exit
    pub fn run(&self, args: &[String]) -> Result<String> {
        self.exec(args, None, None)
    }

    /// Run inside a working directory
    pub fn run_in(&self, dir: &Path, args: &[String]) -> Result<String> {
        self.exec(args, Some(dir), None)
    }

    /// Run with `input` written to stdin
    pub fn run_with_input(&self, args: &[String], input: &[u8]) -> Result<String> {
        self.exec(args, None, Some(input))
    }

    fn exec(&self, args: &[String], dir: Option<&Path>, input: Option<&[u8]>) -> Result<String> {
        let display = format!("{} {}", self.program, args.join(" "));
        log::debug!("running: {}", display);

        let mut cmd = Command::new(&self.program);
        cmd.args(args)
            .stdin(if input.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd
            .spawn()
            .with_context(|| format!("Failed to execute: {}", display))?;

        if let Some(input) = input
            && let Some(mut stdin) = child.stdin.take()
        {
            stdin
                .write_all(input)
                .with_context(|| format!("Failed to write stdin of: {}", display))?;
        }

        let output = child
            .wait_with_output()
            .with_context(|| format!("Failed to wait for: {}", display))?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("{} failed: {}", self.program, stderr.trim())
        }
    }
}

/// Optional string field; present but not a string is an error
pub fn optional_string(doc: &Document, key: &str) -> Result<Option<String>> {
    match doc.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => bail!("parameter \"{}\" is not of type \"string\"", key),
    }
}

/// Required, non-empty string field
pub fn required_string(doc: &Document, key: &str) -> Result<String> {
    optional_string(doc, key)?.with_context(|| format!("parameter \"{}\" must be set", key))
}

/// Parse command output as a JSON object; empty output is an empty document
pub fn parse_object(stdout: &str) -> Result<Document> {
    if stdout.trim().is_empty() {
        return Ok(Document::new());
    }
    match serde_json::from_str(stdout).context("Invalid JSON in command output")? {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Document::new()),
        other => bail!("expected a JSON object, got: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_optional_string() {
        let d = doc(json!({ "a": "x", "b": "", "c": 3 }));
        assert_eq!(optional_string(&d, "a").unwrap(), Some("x".to_string()));
        assert_eq!(optional_string(&d, "b").unwrap(), None);
        assert_eq!(optional_string(&d, "missing").unwrap(), None);
        assert_eq!(
            optional_string(&d, "c").unwrap_err().to_string(),
            "parameter \"c\" is not of type \"string\""
        );
    }

    #[test]
    fn test_required_string() {
        let d = doc(json!({ "kind": "local" }));
        assert_eq!(required_string(&d, "kind").unwrap(), "local");
        assert_eq!(
            required_string(&d, "path").unwrap_err().to_string(),
            "parameter \"path\" must be set"
        );
    }

    #[test]
    fn test_parse_object() {
        assert!(parse_object("").unwrap().is_empty());
        assert!(parse_object("null").unwrap().is_empty());
        assert_eq!(parse_object("{\"a\": 1}").unwrap()["a"], json!(1));
        assert!(parse_object("[1]").is_err());
    }

    #[test]
    fn test_registry_defaults() {
        let registry = registry(&Tools::default(), "helm").unwrap();
        assert_eq!(
            registry.names().collect::<Vec<_>>(),
            vec!["helm", "kubernetes", "terraform"]
        );
        assert_eq!(registry.default_driver(), Some("helm"));

        assert!(matches!(
            super::registry(&Tools::default(), "pulumi"),
            Err(converge::Error::UnknownDefaultDriver(_))
        ));
    }

    #[test]
    fn test_tool_reports_missing_program() {
        let tool = Tool::new("switchboard-definitely-missing-tool");
        let err = tool.run(&["--version".to_string()]).unwrap_err();
        assert!(err.to_string().starts_with("Failed to execute"));
    }
}
