//! Terraform driver - runs `init` and `apply` in a local module directory
//!
//! Config becomes the module's variables, either written to `tfvars.json`
//! next to the module or passed as `-var` flags.

use anyhow::{Context, Result, bail};
use converge::{Document, Driver, Resource, SharedDriverOpts};
use serde_json::Value;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use super::{Tool, optional_string, parse_object, required_string};

const SOURCE_KIND_LOCAL: &str = "local";
const VAR_FILE: &str = "tfvars.json";

/// How variables reach terraform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarMethod {
    File,
    Env,
}

impl VarMethod {
    fn parse(value: Option<String>) -> Result<Self> {
        match value.as_deref() {
            None | Some("file") => Ok(Self::File),
            Some("env") => Ok(Self::Env),
            Some(other) => bail!("unsupported var_method \"{}\"", other),
        }
    }
}

pub struct TerraformDriver {
    module_dir: PathBuf,
    var_method: VarMethod,
    terraform: Tool,
    applied: AtomicBool,
}

impl TerraformDriver {
    pub fn new(resource: &Resource, opts: &SharedDriverOpts, terraform: Tool) -> Result<Self> {
        let source = &resource.source;
        let kind = required_string(source, "kind").context("invalid source")?;
        if kind != SOURCE_KIND_LOCAL {
            bail!("unsupported source kind \"{}\"", kind);
        }

        let module_dir = opts.resolve_path(required_string(source, "path")?);
        if !module_dir.is_dir() {
            bail!("terraform module {} is not a directory", module_dir.display());
        }
        let var_method = VarMethod::parse(optional_string(source, "var_method")?)?;

        Ok(Self {
            module_dir,
            var_method,
            terraform,
            applied: AtomicBool::new(false),
        })
    }

    fn var_file(&self) -> PathBuf {
        self.module_dir.join(VAR_FILE)
    }

    /// Arguments for `terraform apply`, writing the var file when needed
    fn apply_args(&self, config: &Document) -> Result<Vec<String>> {
        let mut args = vec![
            "apply".to_string(),
            "-auto-approve".to_string(),
            "-input=false".to_string(),
        ];

        match self.var_method {
            VarMethod::File => {
                let path = self.var_file();
                let content = serde_json::to_string_pretty(config)?;
                fs::write(&path, content)
                    .with_context(|| format!("Could not write {}", path.display()))?;
                args.push(format!("-var-file={}", path.display()));
            }
            VarMethod::Env => {
                for (key, value) in config {
                    args.push("-var".to_string());
                    args.push(format!("{}={}", key, var_value(value)));
                }
            }
        }

        Ok(args)
    }
}

/// Strings pass through raw; everything else is JSON, which terraform reads as HCL
fn var_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// `terraform output -json` wraps each value in `{ "value": ..., "type": ... }`
fn flatten_outputs(raw: Document) -> Document {
    raw.into_iter()
        .map(|(name, meta)| {
            let value = match meta {
                Value::Object(mut meta) => meta.remove("value").unwrap_or(Value::Null),
                other => other,
            };
            (name, value)
        })
        .collect()
}

impl Driver for TerraformDriver {
    fn apply(&self, resource: &Resource) -> Result<()> {
        self.terraform.run_in(
            &self.module_dir,
            &["init".to_string(), "-input=false".to_string()],
        )?;

        let args = self.apply_args(&resource.config)?;
        self.terraform.run_in(&self.module_dir, &args)?;
        self.applied.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn output(&self) -> Result<Document> {
        if !self.applied.load(Ordering::SeqCst) {
            return Ok(Document::new());
        }
        let stdout = self
            .terraform
            .run_in(&self.module_dir, &["output".to_string(), "-json".to_string()])?;
        Ok(flatten_outputs(parse_object(&stdout)?))
    }
}
