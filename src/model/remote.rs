//! HTTP clients for the other services, used when the roles run as separate processes.

use reqwest::{Client, StatusCode};

use crate::model::{
    api::{ForwardRequest, PublicKeyResponse},
    intermediary::{BallotSink, BindingSource, SubmissionError},
    store::StoreError,
    submission::EncryptedBallot,
    token::{KeyBinding, VotingToken},
};

/// Reads key bindings from a remote auth server.
pub struct AuthClient {
    http: Client,
    base_url: String,
}

impl AuthClient {
    pub fn new(http: Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }
}

#[rocket::async_trait]
impl BindingSource for AuthClient {
    async fn binding(&self, token: VotingToken) -> Result<Option<KeyBinding>, StoreError> {
        let response = self
            .http
            .get(format!("{}/bindings/{token}", self.base_url))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(response.error_for_status()?.json().await?))
    }
}

/// Delivers ballots to a remote backend.
pub struct BackendClient {
    http: Client,
    base_url: String,
}

impl BackendClient {
    pub fn new(http: Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch the backend's ballot encryption key.
    pub async fn public_key(&self) -> Result<String, StoreError> {
        let response: PublicKeyResponse = self
            .http
            .get(format!("{}/public_key", self.base_url))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response.public_key)
    }
}

#[rocket::async_trait]
impl BallotSink for BackendClient {
    async fn deliver(&self, ballot: &EncryptedBallot) -> Result<(), SubmissionError> {
        let body = ForwardRequest {
            encrypted_vote: ballot.clone(),
        };
        let response = self
            .http
            .post(format!("{}/vote", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| SubmissionError::BackendUnavailable(e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else if status.is_client_error() {
            Err(SubmissionError::BackendRefused(status.to_string()))
        } else {
            Err(SubmissionError::BackendUnavailable(status.to_string()))
        }
    }
}
