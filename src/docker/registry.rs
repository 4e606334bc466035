//! Registry authentication through the `aws` CLI.
//!
//! An MFA session token is exchanged with STS and stored in a dedicated
//! profile; ECR login then uses that profile to obtain a `docker login`
//! command, which is run as-is.

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::info;

use super::client::Docker;
use crate::machine::command;

pub const DEFAULT_PROFILE: &str = "normal";
pub const DEFAULT_MFA_PROFILE: &str = "mfa";
pub const DEFAULT_REGION: &str = "eu-west-1";

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SessionTokenResponse {
    credentials: SessionCredentials,
}

/// Temporary credentials returned by `aws sts get-session-token`.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SessionCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    #[serde(default)]
    pub expiration: Option<String>,
}

impl std::fmt::Debug for SessionCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("expiration", &self.expiration)
            .finish_non_exhaustive()
    }
}

/// Parse the JSON printed by `aws sts get-session-token`.
pub fn parse_session_token(output: &str) -> Result<SessionCredentials> {
    let response: SessionTokenResponse =
        serde_json::from_str(output).context("parse sts get-session-token output")?;
    Ok(response.credentials)
}

impl Docker {
    /// Exchange an MFA code for session credentials and store them in
    /// `mfa_profile`.
    pub async fn aws_session(
        &self,
        serial_number: &str,
        token_code: &str,
        profile: &str,
        mfa_profile: &str,
    ) -> Result<SessionCredentials> {
        let output = self
            .context()
            .capture(&command::sts_session_token(serial_number, token_code, profile))
            .await?;
        let credentials = parse_session_token(&output)?;

        for (key, value) in [
            ("aws_access_key_id", &credentials.access_key_id),
            ("aws_secret_access_key", &credentials.secret_access_key),
            ("aws_session_token", &credentials.session_token),
        ] {
            self.context()
                .call(&command::aws_configure_set(key, value, mfa_profile))
                .await?;
        }

        info!(profile = mfa_profile, expiration = ?credentials.expiration, "stored MFA session credentials");
        Ok(credentials)
    }

    /// Log the engine in to ECR using the `docker login` command the AWS
    /// CLI prints.
    pub async fn ecr_login(&self, region: &str, profile: &str) -> Result<()> {
        let login = self
            .context()
            .capture(&command::ecr_get_login(region, profile))
            .await?;
        info!(region, profile, "logging in to ECR");
        self.context().call(&login).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_session_token() {
        let output = r#"{
            "Credentials": {
                "AccessKeyId": "ASIAEXAMPLE",
                "SecretAccessKey": "secret",
                "SessionToken": "token",
                "Expiration": "2024-03-01T22:00:00Z"
            }
        }"#;

        let creds = parse_session_token(output).unwrap();
        assert_eq!(creds.access_key_id, "ASIAEXAMPLE");
        assert_eq!(creds.session_token, "token");
        assert_eq!(creds.expiration.as_deref(), Some("2024-03-01T22:00:00Z"));
    }

    #[test]
    fn debug_hides_secrets() {
        let creds = SessionCredentials {
            access_key_id: "ASIAEXAMPLE".into(),
            secret_access_key: "secret".into(),
            session_token: "token".into(),
            expiration: None,
        };
        let shown = format!("{creds:?}");
        assert!(shown.contains("ASIAEXAMPLE"));
        assert!(!shown.contains("secret\""));
        assert!(!shown.contains("token\""));
    }

    #[test]
    fn missing_credentials_is_error() {
        assert!(parse_session_token(r#"{"Other": {}}"#).is_err());
    }
}
