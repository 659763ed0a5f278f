//! Kubernetes driver - applies a single manifest with `kubectl apply`
//!
//! The manifest is the resource's config, deep-merged over an optional base
//! manifest read from `source.path`.

use anyhow::{Context, Result, bail};
use converge::{Document, Driver, Resource, SharedDriverOpts};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::OnceLock;

use super::{Tool, optional_string, parse_object, required_string};
use crate::loader;

const TARGET_KIND_LOCAL: &str = "local";
const SOURCE_KIND_NONE: &str = "none";
const SOURCE_KIND_LOCAL: &str = "local";

/// Cluster a resource is applied to; shared with the Helm driver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub kind: String,
    pub namespace: String,
    pub kubeconfig_path: Option<PathBuf>,
    pub kubeconfig_context: Option<String>,
}

impl Target {
    pub fn parse(target: &Document, opts: &SharedDriverOpts) -> Result<Self> {
        let kind = required_string(target, "kind").context("invalid target")?;
        if kind != TARGET_KIND_LOCAL {
            bail!("unsupported target kind \"{}\"", kind);
        }

        let namespace =
            optional_string(target, "namespace")?.unwrap_or_else(|| "default".to_string());
        let kubeconfig_path = optional_string(target, "kubeconfig_path")?
            .map(|p| opts.resolve_path(shellexpand::tilde(&p).into_owned()));
        let kubeconfig_context = optional_string(target, "kubeconfig_context")?;

        Ok(Self {
            kind,
            namespace,
            kubeconfig_path,
            kubeconfig_context,
        })
    }

    /// Connection flags; Helm and kubectl spell the context flag differently
    pub fn connection_args(&self, context_flag: &str) -> Vec<String> {
        let mut args = vec!["--namespace".to_string(), self.namespace.clone()];
        if let Some(path) = &self.kubeconfig_path {
            args.push("--kubeconfig".to_string());
            args.push(path.display().to_string());
        }
        if let Some(context) = &self.kubeconfig_context {
            args.push(context_flag.to_string());
            args.push(context.clone());
        }
        args
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Source {
    None,
    Local { path: PathBuf, base: Document },
}

impl Source {
    fn parse(source: &Document, opts: &SharedDriverOpts) -> Result<Self> {
        let kind =
            optional_string(source, "kind")?.unwrap_or_else(|| SOURCE_KIND_NONE.to_string());

        match kind.as_str() {
            SOURCE_KIND_NONE => Ok(Self::None),
            SOURCE_KIND_LOCAL => {
                let path = optional_string(source, "path")?.with_context(|| {
                    "source parameter \"path\" must be set when using \"local\" kind"
                })?;
                let path = opts.resolve_path(path);
                if !path.is_file() {
                    bail!(
                        "source file {} does not exist or is a directory",
                        path.display()
                    );
                }
                let base = loader::read_document(&path)?;
                Ok(Self::Local { path, base })
            }
            other => bail!("unsupported source kind \"{}\"", other),
        }
    }

    fn base(&self) -> Document {
        match self {
            Self::None => Document::new(),
            Self::Local { base, .. } => base.clone(),
        }
    }
}

pub struct KubernetesDriver {
    name: String,
    source: Source,
    target: Target,
    kubectl: Tool,
    output: OnceLock<Document>,
}

impl KubernetesDriver {
    pub fn new(resource: &Resource, opts: &SharedDriverOpts, kubectl: Tool) -> Result<Self> {
        let source = Source::parse(&resource.source, opts)?;
        let target = Target::parse(&resource.target, opts)?;

        if let Source::Local { path, .. } = &source {
            opts.diagnostics.info(
                &resource.name,
                &format!("using base manifest {}", path.display()),
            );
        }

        Ok(Self {
            name: resource.name.clone(),
            source,
            target,
            kubectl,
            output: OnceLock::new(),
        })
    }

    fn manifest(&self, config: &Document) -> Document {
        let mut manifest = self.source.base();
        merge(&mut manifest, config);
        manifest
    }

    fn apply_args(&self) -> Vec<String> {
        let mut args: Vec<String> = ["apply", "-o", "json", "-f", "-"]
            .iter()
            .map(ToString::to_string)
            .collect();
        args.extend(self.target.connection_args("--context"));
        args
    }
}

impl Driver for KubernetesDriver {
    fn apply(&self, resource: &Resource) -> Result<()> {
        let manifest = self.manifest(&resource.config);
        if manifest.is_empty() {
            bail!("resource {} has an empty manifest", self.name);
        }

        let input = serde_json::to_vec(&manifest)?;
        let stdout = self.kubectl.run_with_input(&self.apply_args(), &input)?;
        let applied = parse_object(&stdout)?;
        let _ = self.output.set(applied);
        Ok(())
    }

    fn output(&self) -> Result<Document> {
        Ok(self.output.get().cloned().unwrap_or_default())
    }
}

/// Deep merge `overlay` into `base`; maps merge key by key, anything else is replaced
pub fn merge(base: &mut Document, overlay: &Document) {
    for (key, value) in overlay {
        if let (Some(Value::Object(existing)), Value::Object(incoming)) =
            (base.get_mut(key), value)
        {
            merge(existing, incoming);
            continue;
        }
        base.insert(key.clone(), value.clone());
    }
}
