//! The third-party identity-token verifier (§6): out of scope to implement,
//! represented here as a narrow async trait with one HTTP-backed client.

use super::error::AuthError;
use crate::config::IdentityVerifierSecrets;
use crate::retry::{RetryConfig, RetryExecutor};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// What the verifier hands back for a valid token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    pub account_id: String,
    pub display_name: String,
}

#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify_token(&self, token: &str) -> Result<VerifiedIdentity, AuthError>;
}

#[derive(Debug, Serialize)]
struct VerifyRequest<'a> {
    token: &'a str,
    secret: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum VerifyResponse {
    Ok {
        account_id: String,
        display_name: String,
        #[allow(dead_code)]
        token_time: Option<i64>,
    },
    Err {
        error: String,
    },
}

/// Calls the upstream verifier over HTTP, retrying transient failures.
pub struct HttpIdentityVerifier {
    client: reqwest::Client,
    url: String,
    secret: String,
    retry: RetryExecutor,
}

impl HttpIdentityVerifier {
    #[must_use]
    pub fn new(secrets: &IdentityVerifierSecrets) -> Option<Self> {
        let url = secrets.url.clone()?;
        let secret = secrets.secret.clone().unwrap_or_default();
        Some(Self {
            client: reqwest::Client::new(),
            url,
            secret,
            retry: RetryExecutor::new(RetryConfig::default()),
        })
    }
}

#[async_trait]
impl IdentityVerifier for HttpIdentityVerifier {
    async fn verify_token(&self, token: &str) -> Result<VerifiedIdentity, AuthError> {
        let body = VerifyRequest {
            token,
            secret: &self.secret,
        };

        let response = self
            .retry
            .execute("identity_verifier.verify_token", || async {
                self.client
                    .post(&self.url)
                    .json(&body)
                    .send()
                    .await?
                    .error_for_status()
            })
            .await
            .map_err(|err| AuthError::VerifierUnavailable(err.to_string()))?;

        let parsed: VerifyResponse = response
            .json()
            .await
            .map_err(|err| AuthError::VerifierUnavailable(err.to_string()))?;

        match parsed {
            VerifyResponse::Ok {
                account_id,
                display_name,
                ..
            } => Ok(VerifiedIdentity {
                account_id,
                display_name,
            }),
            VerifyResponse::Err { error } => Err(AuthError::VerifierRejected(error)),
        }
    }
}
