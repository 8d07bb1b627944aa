//! Configuration commands: `configure-product`, `configure-director`, `interpolate`

use std::io::Read;
use std::path::PathBuf;

use clap::Args;
use om_config::{render, render_selection, ConfigTree, LoadOptions, Merger, MissingPolicy, SectionKind};
use om_director::DirectorGateway;

use crate::config::default_vars_env;
use crate::error::{CliError, CliResult};
use crate::output::{print_info, print_success, print_warning};

const PRODUCT_NAME_KEY: &str = "product-name";

/// Variable and overlay inputs shared by commands that read a config file
#[derive(Debug, Clone, Default, Args)]
pub struct VarsArgs {
    /// Load variables from `PREFIX_name` environment variables (repeatable)
    #[arg(long = "vars-env")]
    pub vars_env: Vec<String>,

    /// Load variables from a YAML file (repeatable)
    #[arg(short = 'l', long = "vars-file")]
    pub vars_files: Vec<PathBuf>,

    /// Set a variable, `NAME=VALUE` (repeatable)
    #[arg(short = 'v', long = "var")]
    pub vars: Vec<String>,

    /// Apply an operations file (repeatable)
    #[arg(short = 'o', long = "ops-file")]
    pub ops_files: Vec<PathBuf>,
}

impl VarsArgs {
    pub fn load_options(&self) -> LoadOptions {
        let mut var_env_prefixes = self.vars_env.clone();
        if var_env_prefixes.is_empty() {
            var_env_prefixes.extend(default_vars_env());
        }
        LoadOptions {
            var_files: self.vars_files.clone(),
            vars: self.vars.clone(),
            var_env_prefixes,
            ops_files: self.ops_files.clone(),
            ..Default::default()
        }
    }
}

/// Arguments of `configure-product`
#[derive(Debug, Clone, Args)]
pub struct ConfigureProductArgs {
    /// Product configuration file
    #[arg(short, long)]
    pub config: PathBuf,

    #[command(flatten)]
    pub vars: VarsArgs,
}

/// Arguments of `configure-director`
#[derive(Debug, Clone, Args)]
pub struct ConfigureDirectorArgs {
    /// Director configuration file
    #[arg(short, long)]
    pub config: PathBuf,

    #[command(flatten)]
    pub vars: VarsArgs,
}

/// Arguments of `interpolate`
#[derive(Debug, Clone, Args)]
pub struct InterpolateArgs {
    /// File to interpolate; read from stdin when omitted
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Print only the value at this path, e.g. `/private_key`
    #[arg(long)]
    pub path: Option<String>,

    /// Leave unresolved placeholders in place
    #[arg(short, long)]
    pub skip_missing: bool,

    #[command(flatten)]
    pub vars: VarsArgs,
}

/// `configure-product`
pub async fn configure_product(args: ConfigureProductArgs, director: &dyn DirectorGateway) -> CliResult<()> {
    let tree = Merger::new(args.vars.load_options()).load_tree(&args.config)?;
    let name = product_name(&tree)?;
    warn_unknown_keys(&tree, &[PRODUCT_NAME_KEY]);

    let staged = director
        .get_staged_product(&name)
        .await
        .map_err(|e| CliError::remote("failed to configure product", e))?;
    print_info(&format!("configuring {}...", name));
    director
        .apply_product_config(&staged.guid, &tree)
        .await
        .map_err(|e| CliError::remote("failed to configure product", e))?;
    print_success("finished configuring product");
    Ok(())
}

/// `configure-director`
pub async fn configure_director(args: ConfigureDirectorArgs, director: &dyn DirectorGateway) -> CliResult<()> {
    let tree = Merger::new(args.vars.load_options()).load_tree(&args.config)?;
    warn_unknown_keys(&tree, &[]);
    if tree.get(SectionKind::OpsmanConfiguration).is_some() {
        tracing::debug!("ignoring opsman-configuration section");
    }

    print_info("started configuring director options for bosh tile");
    director
        .apply_director_config(&tree)
        .await
        .map_err(|e| CliError::remote("director configuration could not be applied", e))?;
    print_success("finished configuring director");
    Ok(())
}

/// `interpolate`
pub fn interpolate(args: InterpolateArgs) -> CliResult<()> {
    let mut options = args.vars.load_options();
    options.path = args.path;
    if args.skip_missing {
        options.missing = MissingPolicy::Skip;
    }
    let merger = Merger::new(options);

    let doc = match &args.config {
        Some(path) => merger.load(path)?,
        None => {
            let mut input = String::new();
            std::io::stdin().read_to_string(&mut input)?;
            if input.trim().is_empty() {
                return Err(CliError::invalid(
                    "no file or STDIN input provided. Please provide a valid --config file or use a pipe to get STDIN",
                ));
            }
            merger.load_str("STDIN", &input)?
        }
    };

    let rendered = if merger.options().path.is_some() {
        render_selection(&doc)?
    } else {
        render(&doc)?
    };
    print!("{}", rendered);
    if !rendered.ends_with('\n') {
        println!();
    }
    Ok(())
}

fn product_name(tree: &ConfigTree) -> CliResult<String> {
    tree.get_key(PRODUCT_NAME_KEY)
        .and_then(|v| v.as_str())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| CliError::invalid("configuration file must specify \"product-name\""))
}

fn warn_unknown_keys(tree: &ConfigTree, expected: &[&str]) {
    let unknown: Vec<String> = tree
        .unknown_keys()
        .filter_map(|key| key.as_str())
        .filter(|key| !expected.contains(key))
        .map(str::to_string)
        .collect();
    if !unknown.is_empty() {
        print_warning(&format!("ignoring unrecognized keys: {}", unknown.join(", ")));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeDirector;

    fn write(dir: &tempfile::TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[tokio::test]
    async fn test_configure_product_targets_staged_guid() {
        let dir = tempfile::tempdir().unwrap();
        let config = write(
            &dir,
            "cf.yml",
            "product-name: cf\nproduct-properties:\n  .properties.enabled:\n    value: ((enabled))\nextra: carried\n",
        );
        let director = FakeDirector::default();
        director.state().staged.push(FakeDirector::staged("cf", "2.0.1"));

        let args = ConfigureProductArgs {
            config,
            vars: VarsArgs {
                vars: vec!["enabled=true".into()],
                ..Default::default()
            },
        };
        configure_product(args, &director).await.unwrap();

        let state = director.state();
        let (guid, tree) = &state.configured[0];
        assert_eq!(guid, "cf-guid");
        let properties = tree.get(SectionKind::ProductProperties).unwrap();
        assert_eq!(
            properties[".properties.enabled"]["value"],
            serde_yaml::Value::Bool(true)
        );
    }

    #[tokio::test]
    async fn test_configure_product_requires_name() {
        let dir = tempfile::tempdir().unwrap();
        let config = write(&dir, "cf.yml", "product-properties: {}\n");
        let args = ConfigureProductArgs {
            config,
            vars: VarsArgs::default(),
        };
        let err = configure_product(args, &FakeDirector::default()).await.unwrap_err();
        assert!(matches!(err, CliError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_configure_product_unknown_product() {
        let dir = tempfile::tempdir().unwrap();
        let config = write(&dir, "cf.yml", "product-name: cf\n");
        let args = ConfigureProductArgs {
            config,
            vars: VarsArgs::default(),
        };
        let err = configure_product(args, &FakeDirector::default()).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "failed to configure product: could not find product \"cf\""
        );
    }

    #[tokio::test]
    async fn test_configure_director_missing_variables() {
        let dir = tempfile::tempdir().unwrap();
        let config = write(&dir, "director.yml", "iaas-configuration:\n  project: ((project))\n");
        let director = FakeDirector::default();
        let args = ConfigureDirectorArgs {
            config,
            vars: VarsArgs::default(),
        };
        let err = configure_director(args, &director).await.unwrap_err();
        assert!(matches!(
            err,
            CliError::Config(om_config::ConfigError::MissingVariables { .. })
        ));
        assert!(director.state().director_configured.is_empty());
    }

    #[test]
    fn test_explicit_vars_env_wins_over_default() {
        let args = VarsArgs {
            vars_env: vec!["MY".into()],
            ..Default::default()
        };
        assert_eq!(args.load_options().var_env_prefixes, vec!["MY".to_string()]);
    }
}
