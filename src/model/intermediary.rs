//! Ballot validation and forwarding.
//!
//! A submission for a token moves through `Unseen -> Verifying -> {Accepted, Rejected}`.
//! The ledger insert is the only point where concurrent submissions for one
//! token are ordered; everything before it is a read, everything after it runs
//! with the token already spent.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use rocket::tokio::{self, task::JoinHandle};
use thiserror::Error;

use crate::model::{
    auth::AuthCore,
    crypto::CryptoProvider,
    ledger::Ledger,
    store::StoreError,
    submission::{EncryptedBallot, Submission},
    token::{KeyBinding, VotingToken},
};

#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("Vote already recorded.")]
    AlreadyVoted,
    #[error("Not allowed: unknown voter token")]
    UnknownToken,
    #[error("Not allowed: invalid signature")]
    InvalidSignature,
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),
    /// The backend answered but will never take this ballot as sent.
    #[error("Backend refused ballot: {0}")]
    BackendRefused(String),
    #[error(transparent)]
    Storage(#[from] StoreError),
}

/// Where the intermediary learns which key a token must be signed with.
#[rocket::async_trait]
pub trait BindingSource: Send + Sync {
    async fn binding(&self, token: VotingToken) -> Result<Option<KeyBinding>, StoreError>;
}

#[rocket::async_trait]
impl BindingSource for AuthCore {
    async fn binding(&self, token: VotingToken) -> Result<Option<KeyBinding>, StoreError> {
        AuthCore::binding(self, token).await
    }
}

/// Where validated ballots go.
#[rocket::async_trait]
pub trait BallotSink: Send + Sync {
    async fn deliver(&self, ballot: &EncryptedBallot) -> Result<(), SubmissionError>;
}

/// Delivers ballots to a [`BallotSink`] in the background, retrying with
/// exponential backoff while the sink reports itself unavailable.
#[derive(Clone)]
pub struct Forwarder {
    sink: Arc<dyn BallotSink>,
    retries: u32,
    backoff: Duration,
}

impl Forwarder {
    pub fn new(sink: Arc<dyn BallotSink>, retries: u32, backoff: Duration) -> Self {
        Self {
            sink,
            retries,
            backoff,
        }
    }

    /// Start delivering `ballot`. Must be called from within a Tokio runtime.
    pub fn dispatch(&self, ballot: EncryptedBallot) -> JoinHandle<Result<(), SubmissionError>> {
        let forwarder = self.clone();
        tokio::spawn(async move { forwarder.deliver(ballot).await })
    }

    async fn deliver(&self, ballot: EncryptedBallot) -> Result<(), SubmissionError> {
        let mut delay = self.backoff;
        let mut attempt = 0;
        loop {
            match self.sink.deliver(&ballot).await {
                Ok(()) => {
                    debug!("Ballot delivered after {} attempt(s)", attempt + 1);
                    return Ok(());
                }
                Err(SubmissionError::BackendUnavailable(reason)) if attempt < self.retries => {
                    warn!("Backend unavailable ({reason}), retrying in {delay:?}");
                    tokio::time::sleep(delay).await;
                    delay = delay.saturating_mul(2);
                    attempt += 1;
                }
                Err(e) => {
                    error!("Dropping ballot after {} attempt(s): {e}", attempt + 1);
                    return Err(e);
                }
            }
        }
    }
}

/// A submission that passed validation. Its ballot is on its way to the backend.
#[derive(Debug)]
pub struct Accepted {
    delivery: JoinHandle<Result<(), SubmissionError>>,
}

impl Accepted {
    /// Wait for the background delivery to finish.
    pub async fn delivered(self) -> Result<(), SubmissionError> {
        self.delivery
            .await
            .map_err(|e| SubmissionError::BackendUnavailable(e.to_string()))?
    }
}

/// Validates signed submissions and forwards their ballots.
pub struct IntermediaryCore {
    ledger: Arc<dyn Ledger>,
    bindings: Arc<dyn BindingSource>,
    crypto: Arc<dyn CryptoProvider>,
    forwarder: Forwarder,
}

impl IntermediaryCore {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        bindings: Arc<dyn BindingSource>,
        crypto: Arc<dyn CryptoProvider>,
        forwarder: Forwarder,
    ) -> Self {
        Self {
            ledger,
            bindings,
            crypto,
            forwarder,
        }
    }

    /// Accept `submission` at most once per token.
    ///
    /// An unknown token is rejected without being spent. Once a known token
    /// passes the ledger insert it stays spent, even if its signature then
    /// fails to verify or the backend never receives the ballot.
    pub async fn submit(&self, submission: &Submission) -> Result<Accepted, SubmissionError> {
        let token = submission.token;

        if self.ledger.contains(token).await? {
            debug!("Replay of spent token {token}");
            return Err(SubmissionError::AlreadyVoted);
        }

        let binding = self
            .bindings
            .binding(token)
            .await?
            .ok_or(SubmissionError::UnknownToken)?;

        if !self.ledger.insert_if_absent(token).await? {
            debug!("Lost race for token {token}");
            return Err(SubmissionError::AlreadyVoted);
        }

        let verification = self
            .crypto
            .verify(&submission.signing_payload(), &submission.signature);
        if !verification.signed_by(&binding.fingerprint) {
            warn!("Invalid signature for token {token}, token is now spent");
            return Err(SubmissionError::InvalidSignature);
        }

        info!("Accepted ballot for token {token}");
        Ok(Accepted {
            delivery: self.forwarder.dispatch(submission.ballot.clone()),
        })
    }

    /// Whether a ballot has been recorded against `token`.
    pub async fn status(&self, token: VotingToken) -> Result<bool, StoreError> {
        self.ledger.contains(token).await
    }
}
