//! `product-diff`: staged versus deployed manifests

use std::io::Write;

use clap::Args;
use om_director::{CpiConfigDiff, DirectorGateway, ManifestDiff, RuntimeConfigDiff};

use crate::error::{CliError, CliResult};
use crate::output::colorize_diff;

const DIRECTOR_PRODUCT: &str = "p-bosh";

/// Arguments of `product-diff`
#[derive(Debug, Clone, Default, Args)]
pub struct ProductDiffArgs {
    /// Product to diff (repeatable); every staged product when omitted
    #[arg(short = 'n', long = "product", visible_alias = "product-name")]
    pub products: Vec<String>,

    /// Include the director diff
    #[arg(long)]
    pub director: bool,

    /// Exit 2 if anything differs
    #[arg(long)]
    pub check: bool,
}

/// `product-diff`
pub async fn product_diff(args: ProductDiffArgs, director: &dyn DirectorGateway) -> CliResult<()> {
    let stdout = std::io::stdout();
    write_diff(args, director, &mut stdout.lock()).await
}

async fn write_diff(args: ProductDiffArgs, director: &dyn DirectorGateway, out: &mut dyn Write) -> CliResult<()> {
    let everything = !args.director && args.products.is_empty();
    let mut changes = false;

    if args.director || everything {
        let diff = director
            .director_diff()
            .await
            .map_err(|e| CliError::remote("could not discover the director diff", e))?;
        changes |= diff.has_changes();

        writeln!(out, "## Director Manifest\n")?;
        if write_manifest(out, &diff.manifest)? {
            writeln!(out, "## Director Cloud Config\n")?;
            write_manifest(out, &diff.cloud_config)?;
            writeln!(out, "## Director Runtime Configs\n")?;
            write_runtime_configs(out, &diff.runtime_configs)?;
            writeln!(out, "## Director CPI Configs\n")?;
            write_cpi_configs(out, &diff.cpi_configs)?;
        }
    }

    let products = if everything {
        let staged = director
            .list_staged_products()
            .await
            .map_err(|e| CliError::remote("could not discover staged products to diff", e))?;
        let mut names: Vec<String> = staged
            .into_iter()
            .map(|p| p.product_type)
            .filter(|t| t != DIRECTOR_PRODUCT)
            .collect();
        names.sort();
        names
    } else {
        args.products
    };

    for product in &products {
        let diff = director.product_diff(product).await?;
        changes |= diff.has_changes();

        writeln!(out, "## Product Manifest for {}\n", product)?;
        if write_manifest(out, &diff.manifest)? {
            writeln!(out, "## Runtime Configs for {}\n", product)?;
            write_runtime_configs(out, &diff.runtime_configs)?;
        }
    }

    if args.check && changes {
        return Err(CliError::DiffHasChanges);
    }
    Ok(())
}

/// Returns false when the product is not deployed yet and nothing else applies.
fn write_manifest(out: &mut dyn Write, diff: &ManifestDiff) -> CliResult<bool> {
    match diff.status.as_str() {
        "same" => writeln!(out, "no changes\n")?,
        "does_not_exist" => writeln!(out, "no manifest for this product\n")?,
        "different" => writeln!(out, "{}\n", colorize_diff(&diff.diff))?,
        "to_be_installed" => {
            writeln!(
                out,
                "This product is not yet deployed, so the product and runtime diffs are not available."
            )?;
            return Ok(false);
        }
        other => writeln!(out, "unrecognized product status: {}\n\n{}\n", other, diff.diff)?,
    }
    Ok(true)
}

fn write_runtime_configs(out: &mut dyn Write, configs: &[RuntimeConfigDiff]) -> CliResult<()> {
    let changed: Vec<(&str, &str)> = configs
        .iter()
        .filter(|c| c.status != "same")
        .map(|c| (c.name.as_str(), c.diff.as_str()))
        .collect();
    write_sections(out, &changed)
}

fn write_cpi_configs(out: &mut dyn Write, configs: &[CpiConfigDiff]) -> CliResult<()> {
    let changed: Vec<(&str, &str)> = configs
        .iter()
        .filter(|c| c.status != "same")
        .map(|c| (c.iaas_configuration_name.as_str(), c.diff.as_str()))
        .collect();
    write_sections(out, &changed)
}

fn write_sections(out: &mut dyn Write, changed: &[(&str, &str)]) -> CliResult<()> {
    if changed.is_empty() {
        writeln!(out, "no changes\n")?;
    }
    for (name, diff) in changed {
        writeln!(out, "### {}\n", name)?;
        writeln!(out, "{}\n", colorize_diff(diff))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeDirector;
    use om_director::ProductDiff;

    fn same() -> ManifestDiff {
        ManifestDiff {
            status: "same".into(),
            diff: String::new(),
        }
    }

    fn director_in_sync() -> FakeDirector {
        colored::control::set_override(false);
        let director = FakeDirector::default();
        {
            let mut state = director.state();
            state.director_diff.manifest = same();
            state.director_diff.cloud_config = same();
            state.staged.push(FakeDirector::staged("p-bosh", "2.10.0"));
            state.staged.push(FakeDirector::staged("cf", "2.10.1"));
            state.product_diffs.insert(
                "cf".into(),
                ProductDiff {
                    manifest: same(),
                    runtime_configs: Vec::new(),
                },
            );
        }
        director
    }

    async fn run(args: ProductDiffArgs, director: &FakeDirector) -> (CliResult<()>, String) {
        let mut out = Vec::new();
        let result = write_diff(args, director, &mut out).await;
        (result, String::from_utf8(out).unwrap())
    }

    #[tokio::test]
    async fn test_check_passes_when_in_sync() {
        let director = director_in_sync();
        let (result, out) = run(
            ProductDiffArgs {
                check: true,
                ..Default::default()
            },
            &director,
        )
        .await;
        result.unwrap();
        assert!(out.starts_with("## Director Manifest\n\nno changes\n"));
        assert!(out.contains("## Product Manifest for cf\n\nno changes\n"));
        assert!(!out.contains("p-bosh"));
    }

    #[tokio::test]
    async fn test_check_fails_on_runtime_change() {
        let director = director_in_sync();
        director
            .state()
            .product_diffs
            .get_mut("cf")
            .unwrap()
            .runtime_configs
            .push(RuntimeConfigDiff {
                name: "dns".into(),
                status: "different".into(),
                diff: "+ addons: []".into(),
            });

        let (result, out) = run(
            ProductDiffArgs {
                products: vec!["cf".into()],
                check: true,
                ..Default::default()
            },
            &director,
        )
        .await;
        assert!(matches!(result.unwrap_err(), CliError::DiffHasChanges));
        assert!(!out.contains("Director Manifest"));
        assert!(out.contains("### dns\n\n+ addons: []\n"));
    }

    #[tokio::test]
    async fn test_changes_without_check_succeed() {
        let director = director_in_sync();
        director.state().director_diff.manifest = ManifestDiff {
            status: "different".into(),
            diff: "- a\n+ b".into(),
        };
        let (result, out) = run(
            ProductDiffArgs {
                director: true,
                ..Default::default()
            },
            &director,
        )
        .await;
        result.unwrap();
        assert!(out.contains("- a\n+ b\n"));
        assert!(out.contains("## Director CPI Configs\n\nno changes\n"));
    }

    #[tokio::test]
    async fn test_undeployed_product_skips_runtime_configs() {
        let director = director_in_sync();
        director.state().product_diffs.get_mut("cf").unwrap().manifest = ManifestDiff {
            status: "to_be_installed".into(),
            diff: String::new(),
        };
        let (result, out) = run(
            ProductDiffArgs {
                products: vec!["cf".into()],
                ..Default::default()
            },
            &director,
        )
        .await;
        result.unwrap();
        assert!(out.contains("not yet deployed"));
        assert!(!out.contains("## Runtime Configs for cf"));
    }

    #[tokio::test]
    async fn test_unknown_product() {
        let director = director_in_sync();
        let (result, _) = run(
            ProductDiffArgs {
                products: vec!["mysql".into()],
                ..Default::default()
            },
            &director,
        )
        .await;
        assert!(matches!(result.unwrap_err(), CliError::Director(_)));
    }
}
