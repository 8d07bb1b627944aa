//! Certificate authority commands

use clap::Args;
use om_director::{CertificateAuthority, DirectorGateway};
use serde::Serialize;
use tabled::Tabled;

use crate::error::{CliError, CliResult};
use crate::output::{self, print_info, print_success, OutputFormat};

/// Arguments of `activate-certificate-authority`
#[derive(Debug, Clone, Args)]
pub struct ActivateCertificateAuthorityArgs {
    /// GUID of the authority; defaults to the only inactive one
    #[arg(short, long)]
    pub id: Option<String>,
}

#[derive(Debug, Serialize, Tabled)]
struct AuthorityRow {
    id: String,
    issuer: String,
    active: bool,
    created_on: String,
    expires_on: String,
}

impl From<CertificateAuthority> for AuthorityRow {
    fn from(ca: CertificateAuthority) -> Self {
        Self {
            id: ca.guid,
            issuer: ca.issuer,
            active: ca.active,
            created_on: ca.created_on,
            expires_on: ca.expires_on,
        }
    }
}

/// `certificate-authorities`
pub async fn list(director: &dyn DirectorGateway, format: OutputFormat) -> CliResult<()> {
    let authorities = director
        .list_certificate_authorities()
        .await
        .map_err(|e| CliError::remote("could not list certificate authorities", e))?;
    output::print_output(authorities.into_iter().map(AuthorityRow::from).collect(), format)
}

/// `activate-certificate-authority`
pub async fn activate(args: ActivateCertificateAuthorityArgs, director: &dyn DirectorGateway) -> CliResult<()> {
    let guid = match args.id {
        Some(id) => id,
        None => {
            let authorities = director
                .list_certificate_authorities()
                .await
                .map_err(|e| CliError::remote("could not list certificate authorities", e))?;
            only_inactive(&authorities)?
        }
    };

    print_info(&format!("activating certificate authority {}", guid));
    director
        .activate_certificate_authority(&guid)
        .await
        .map_err(|e| CliError::remote("could not activate certificate authority", e))?;
    print_success(&format!("Certificate authority '{}' activated", guid));
    Ok(())
}

/// `regenerate-certificates`
pub async fn regenerate(director: &dyn DirectorGateway) -> CliResult<()> {
    director
        .regenerate_certificate_authorities()
        .await
        .map_err(|e| CliError::remote("could not regenerate certificates", e))?;
    print_success("Certificates regenerated.");
    Ok(())
}

fn only_inactive(authorities: &[CertificateAuthority]) -> CliResult<String> {
    let inactive: Vec<&CertificateAuthority> = authorities.iter().filter(|ca| !ca.active).collect();
    match inactive.as_slice() {
        [ca] => Ok(ca.guid.clone()),
        [] => Err(CliError::NotFound("no inactive certificate authorities to activate".into())),
        _ => Err(CliError::invalid(
            "multiple inactive certificate authorities; pass --id to choose one",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeDirector;

    fn authority(guid: &str, active: bool) -> CertificateAuthority {
        CertificateAuthority {
            guid: guid.into(),
            issuer: "Pivotal".into(),
            created_on: "2017-01-09".into(),
            expires_on: "2021-01-09".into(),
            active,
            cert_pem: String::new(),
        }
    }

    #[tokio::test]
    async fn test_activate_picks_only_inactive() {
        let director = FakeDirector::default();
        {
            let mut state = director.state();
            state.authorities.push(authority("old", true));
            state.authorities.push(authority("new", false));
        }
        activate(ActivateCertificateAuthorityArgs { id: None }, &director)
            .await
            .unwrap();
        assert_eq!(director.state().activated, vec!["new".to_string()]);
    }

    #[tokio::test]
    async fn test_activate_explicit_id() {
        let director = FakeDirector::default();
        activate(
            ActivateCertificateAuthorityArgs {
                id: Some("given".into()),
            },
            &director,
        )
        .await
        .unwrap();
        assert_eq!(director.state().activated, vec!["given".to_string()]);
    }

    #[test]
    fn test_only_inactive_ambiguous() {
        let err = only_inactive(&[authority("a", false), authority("b", false)]).unwrap_err();
        assert!(matches!(err, CliError::InvalidInput(_)));
        assert!(matches!(
            only_inactive(&[authority("a", true)]).unwrap_err(),
            CliError::NotFound(_)
        ));
    }
}
