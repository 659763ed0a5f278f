//! Helm driver - installs or upgrades a chart release with the config as values

use anyhow::Result;
use converge::{Document, Driver, Resource, SharedDriverOpts};
use std::sync::OnceLock;

use super::kubernetes::Target;
use super::{Tool, optional_string, parse_object, required_string};

#[derive(Debug, Clone, PartialEq, Eq)]
struct Chart {
    name: String,
    repository: Option<String>,
    version: Option<String>,
}

impl Chart {
    fn parse(source: &Document) -> Result<Self> {
        Ok(Self {
            name: required_string(source, "chart_name")?,
            repository: optional_string(source, "chart_repository")?,
            version: optional_string(source, "chart_version")?,
        })
    }
}

pub struct HelmDriver {
    release: String,
    chart: Chart,
    target: Target,
    helm: Tool,
    output: OnceLock<Document>,
}

impl HelmDriver {
    pub fn new(resource: &Resource, opts: &SharedDriverOpts, helm: Tool) -> Result<Self> {
        let chart = Chart::parse(&resource.source)?;
        let target = Target::parse(&resource.target, opts)?;
        let release =
            optional_string(&resource.target, "name")?.unwrap_or_else(|| resource.name.clone());

        Ok(Self {
            release,
            chart,
            target,
            helm,
            output: OnceLock::new(),
        })
    }

    fn upgrade_args(&self) -> Vec<String> {
        let mut args = vec![
            "upgrade".to_string(),
            "--install".to_string(),
            self.release.clone(),
            self.chart.name.clone(),
        ];
        if let Some(repo) = &self.chart.repository {
            args.push("--repo".to_string());
            args.push(repo.clone());
        }
        if let Some(version) = &self.chart.version {
            args.push("--version".to_string());
            args.push(version.clone());
        }
        args.extend(["--values".to_string(), "-".to_string()]);
        args.extend(self.target.connection_args("--kube-context"));
        args
    }

    fn values_args(&self) -> Vec<String> {
        let mut args = vec![
            "get".to_string(),
            "values".to_string(),
            self.release.clone(),
            "--all".to_string(),
            "-o".to_string(),
            "json".to_string(),
        ];
        args.extend(self.target.connection_args("--kube-context"));
        args
    }
}

impl Driver for HelmDriver {
    fn apply(&self, resource: &Resource) -> Result<()> {
        let values = serde_json::to_vec(&resource.config)?;
        self.helm.run_with_input(&self.upgrade_args(), &values)?;

        let stdout = self.helm.run(&self.values_args())?;
        let _ = self.output.set(parse_object(&stdout)?);
        Ok(())
    }

    fn output(&self) -> Result<Document> {
        Ok(self.output.get().cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    fn driver(source: Value, target: Value) -> Result<HelmDriver> {
        let resource = Resource {
            source: doc(source),
            target: doc(target),
            ..Resource::new("redis")
        };
        HelmDriver::new(&resource, &SharedDriverOpts::new("/work"), Tool::new("helm"))
    }

    #[test]
    fn test_chart_name_is_required() {
        let err = driver(json!({}), json!({ "kind": "local" })).err().unwrap();
        assert_eq!(err.to_string(), "parameter \"chart_name\" must be set");
    }

    #[test]
    fn test_upgrade_args() {
        let driver = driver(
            json!({
                "chart_name": "redis",
                "chart_repository": "https://charts.example.test",
                "chart_version": "17.0.0"
            }),
            json!({ "kind": "local", "name": "cache", "namespace": "data" }),
        )
        .unwrap();

        assert_eq!(
            driver.upgrade_args(),
            vec![
                "upgrade",
                "--install",
                "cache",
                "redis",
                "--repo",
                "https://charts.example.test",
                "--version",
                "17.0.0",
                "--values",
                "-",
                "--namespace",
                "data"
            ]
        );
    }

    #[test]
    fn test_release_defaults_to_resource_name() {
        let driver = driver(json!({ "chart_name": "redis" }), json!({ "kind": "local" })).unwrap();
        assert_eq!(
            driver.values_args(),
            vec!["get", "values", "redis", "--all", "-o", "json", "--namespace", "default"]
        );
        assert!(driver.output().unwrap().is_empty());
    }
}
