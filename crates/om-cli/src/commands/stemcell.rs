//! Stemcell commands: `upload-stemcell` and `assign-multi-stemcell`

use std::path::PathBuf;

use clap::{ArgAction, Args, ValueEnum};
use om_director::{DirectorGateway, ProductStemcells, Stemcell, StemcellAssociations};

use crate::error::{CliError, CliResult};
use crate::output::{print_info, print_success, print_warning};
use crate::progress::BarProgress;

/// How to treat a `--stemcell` value that names only a version
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum MissingOsPolicy {
    /// Use the only operating system offering that version
    #[default]
    Infer,
    /// Require `os:version`
    Reject,
}

/// Arguments of `upload-stemcell`
#[derive(Debug, Clone, Args)]
pub struct UploadStemcellArgs {
    /// Path to the stemcell tarball
    #[arg(short = 's', long)]
    pub stemcell: PathBuf,

    /// Assign the stemcell to every product that can use it
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub floating: bool,
}

/// Arguments of `assign-multi-stemcell`
#[derive(Debug, Clone, Args)]
pub struct AssignMultiStemcellArgs {
    /// Product to assign stemcells to
    #[arg(short = 'n', long)]
    pub product_name: String,

    /// `os:version` or `os:latest` (repeatable)
    #[arg(short = 's', long = "stemcell", required = true)]
    pub stemcells: Vec<String>,

    /// What to do with a value that has no operating system
    #[arg(long, value_enum, default_value_t = MissingOsPolicy::Infer)]
    pub stemcell_os_policy: MissingOsPolicy,
}

/// `upload-stemcell`
pub async fn upload(args: UploadStemcellArgs, director: &dyn DirectorGateway) -> CliResult<()> {
    print_info("beginning stemcell upload to Ops Manager");
    let name = args
        .stemcell
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut progress = BarProgress::new(name);
    director
        .upload_stemcell(&args.stemcell, args.floating, &mut progress)
        .await
        .map_err(|e| CliError::remote("failed to upload stemcell", e))?;
    print_success("finished upload");
    Ok(())
}

/// `assign-multi-stemcell`
pub async fn assign_multi(args: AssignMultiStemcellArgs, director: &dyn DirectorGateway) -> CliResult<()> {
    print_info(&format!(
        "finding available stemcells for product: \"{}\"...",
        args.product_name
    ));
    let associations = director.list_multi_stemcells().await?;
    let product = associations
        .products
        .into_iter()
        .find(|p| p.product_name == args.product_name)
        .ok_or_else(|| {
            CliError::NotFound(format!(
                "could not list product stemcell: product \"{}\" not found",
                args.product_name
            ))
        })?;
    if product.staged_for_deletion {
        return Err(CliError::StateConflict(format!(
            "could not assign stemcell: product \"{}\" is staged for deletion",
            args.product_name
        )));
    }

    print_info("validating that stemcell exists in Ops Manager...");
    let selected = select_stemcells(&product, &args.stemcells, args.stemcell_os_policy)?;

    let names: Vec<String> = selected.iter().map(|s| format!("{}:{}", s.os, s.version)).collect();
    print_info(&format!(
        "assigning stemcells: \"{}\" to product \"{}\"...",
        names.join(", "),
        args.product_name
    ));
    director
        .assign_multi_stemcell(&StemcellAssociations {
            products: vec![ProductStemcells {
                guid: product.guid,
                staged_stemcells: selected,
                ..Default::default()
            }],
        })
        .await?;
    print_success("assigned stemcells successfully");
    Ok(())
}

/// Resolve each requested stemcell against what the product can use.
fn select_stemcells(
    product: &ProductStemcells,
    requested: &[String],
    policy: MissingOsPolicy,
) -> CliResult<Vec<Stemcell>> {
    let available = &product.available_stemcells;
    if available.is_empty() {
        let required: Vec<String> = product.required_stemcells.iter().map(ToString::to_string).collect();
        return Err(CliError::NotFound(format!(
            "no stemcells are available for \"{}\". minimum required stemcells are: {}. upload-stemcell, and try again",
            product.product_name,
            required.join(", ")
        )));
    }

    requested
        .iter()
        .map(|value| {
            let (os, version) = split_stemcell(value, available, &product.product_name, policy)?;
            let found = if version == "latest" {
                available.iter().rev().find(|s| s.os == os)
            } else {
                available.iter().find(|s| s.os == os && s.version == version)
            };
            found.cloned().ok_or_else(|| not_found(product, &os, &version))
        })
        .collect()
}

fn split_stemcell(
    value: &str,
    available: &[Stemcell],
    product: &str,
    policy: MissingOsPolicy,
) -> CliResult<(String, String)> {
    if let Some((os, version)) = value.split_once(':') {
        return Ok((os.to_string(), version.to_string()));
    }
    if value == "latest" {
        return Err(CliError::invalid(
            "expected \"--stemcell\" format value as \"operating-system:latest\"",
        ));
    }
    if policy == MissingOsPolicy::Reject {
        return Err(CliError::invalid(format!(
            "expected \"--stemcell\" format value as \"operating-system:version\", got {:?}",
            value
        )));
    }

    let oses: Vec<&str> = available
        .iter()
        .filter(|s| s.version == value)
        .map(|s| s.os.as_str())
        .collect();
    match oses.as_slice() {
        [os] => {
            print_warning(&format!(
                "updated \"--stemcell\" format value to \"operating-system:version\", \"{}:{}\"",
                os, value
            ));
            Ok((os.to_string(), value.to_string()))
        }
        [] => Err(CliError::NotFound(format!(
            "stemcell version {} not found in Ops Manager.\nthere are no available stemcells to for \"{}\"\nupload-stemcell, and try again",
            value, product
        ))),
        _ => Err(CliError::invalid(format!(
            "multiple stemcells match version {} in Ops Manager.\nexpected \"--stemcell\" format value as \"operating-system:version\"",
            value
        ))),
    }
}

fn not_found(product: &ProductStemcells, os: &str, version: &str) -> CliError {
    let for_os: Vec<&str> = product
        .available_stemcells
        .iter()
        .filter(|s| s.os == os)
        .map(|s| s.version.as_str())
        .collect();
    if for_os.is_empty() {
        return CliError::NotFound(format!(
            "stemcell version {} for {} not found in Ops Manager.\nthere are no available stemcells to for \"{}\"\nupload-stemcell, and try again",
            version, os, product.product_name
        ));
    }
    CliError::NotFound(format!(
        "stemcell version {} for {} not found in Ops Manager.\nAvailable Stemcells for \"{}\": {}",
        version,
        os,
        product.product_name,
        for_os
            .iter()
            .map(|v| format!("{} {}", os, v))
            .collect::<Vec<_>>()
            .join(", ")
    ))
}
