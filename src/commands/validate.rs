//! `switchboard validate` - parse, check the graph and driver names

use anyhow::{Result, bail};
use converge::{ConsolidatedErrors, Graph};

use super::Input;
use crate::Context;
use crate::cli::FileArgs;
use crate::ui;

pub fn run(ctx: &Context, args: FileArgs) -> Result<()> {
    let input = Input::load(&args.file, args.default_driver.as_deref())?;
    let errors = check(&input)?;

    if !errors.is_empty() {
        ui::consolidated_errors(&errors);
        bail!("{} is invalid", input.path.display());
    }

    if !ctx.quiet {
        ui::success(&format!(
            "{} is valid ({} resource(s))",
            input.path.display(),
            input.set.len()
        ));
    }
    Ok(())
}

/// Structural errors are returned as `Err`, driver-name problems per resource
fn check(input: &Input) -> Result<ConsolidatedErrors> {
    Graph::build(&input.set.resources)?;

    let registry = input.registry()?;
    let mut errors = ConsolidatedErrors::new();
    for resource in &input.set.resources {
        if let Err(err) = registry.kind_for(resource) {
            errors.insert(resource.name.clone(), err);
        }
    }
    Ok(errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use converge::{Resource, ResourceSet};
    use std::path::PathBuf;

    fn input(resources: Vec<Resource>) -> Input {
        Input {
            path: PathBuf::from("switchboard.json"),
            set: ResourceSet {
                version: "v1".to_string(),
                resources,
            },
            config: Config::default(),
            default_driver: "helm".to_string(),
        }
    }

    #[test]
    fn test_valid_set() {
        let input = input(vec![
            Resource::new("db"),
            Resource::new("vpc").with_driver("terraform"),
            Resource::new("app").with_driver("kubernetes").depends_on("db"),
        ]);
        assert!(check(&input).unwrap().is_empty());
    }

    #[test]
    fn test_unknown_driver_reported_per_resource() {
        let input = input(vec![
            Resource::new("db").with_driver("pulumi"),
            Resource::new("app"),
        ]);
        let errors = check(&input).unwrap();
        assert_eq!(errors.names().collect::<Vec<_>>(), vec!["db"]);
    }

    #[test]
    fn test_graph_errors_fail() {
        let input = input(vec![Resource::new("app").depends_on("db")]);
        let err = check(&input).unwrap_err();
        assert_eq!(err.to_string(), "invalid dependency 'db' for resource 'app'");
    }
}
