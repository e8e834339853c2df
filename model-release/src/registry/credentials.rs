use secrecy::Secret;
use serde::Deserialize;
use tokio::process::Command;

use crate::error::Error;

pub const AZURE_ML_RESOURCE: &str = "https://management.azure.com/";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CliAccessToken {
    access_token: Secret<String>,
}

/// Where the Azure ML bearer token comes from.
#[derive(Debug)]
pub enum TokenSource {
    /// Token handed in directly, e.g. from a pipeline secret variable
    Static(Secret<String>),
    /// Ask a logged-in Azure CLI, same as `AzureCliAuthentication`
    AzureCli { resource: String },
}

impl Default for TokenSource {
    fn default() -> Self {
        Self::AzureCli {
            resource: AZURE_ML_RESOURCE.to_string(),
        }
    }
}

impl TokenSource {
    pub async fn token(&self) -> Result<Secret<String>, Error> {
        match self {
            Self::Static(token) => Ok(token.clone()),
            Self::AzureCli { resource } => {
                log::info!("Requesting Azure ML token from the Azure CLI");
                let output = Command::new("az")
                    .args(["account", "get-access-token", "--output", "json"])
                    .args(["--resource", resource.as_str()])
                    .output()
                    .await
                    .map_err(|err| Error::CredentialError(format!("failed to run az: {err}")))?;
                if !output.status.success() {
                    return Err(Error::CredentialError(
                        String::from_utf8_lossy(&output.stderr).trim().to_string(),
                    ));
                }
                parse_cli_token(&output.stdout)
            }
        }
    }
}

fn parse_cli_token(stdout: &[u8]) -> Result<Secret<String>, Error> {
    let token: CliAccessToken = serde_json::from_slice(stdout)
        .map_err(|err| Error::CredentialError(format!("unexpected az output: {err}")))?;
    Ok(token.access_token)
}
