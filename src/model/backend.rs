use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use log::info;
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::model::{
    crypto::TallyKeys,
    intermediary::{BallotSink, SubmissionError},
    store::StoreError,
    submission::EncryptedBallot,
};

/// An encrypted ballot as held for tallying.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredBallot {
    pub encrypted_vote: EncryptedBallot,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub received_at: DateTime<Utc>,
}

impl StoredBallot {
    pub fn new(encrypted_vote: EncryptedBallot) -> Self {
        Self {
            encrypted_vote,
            received_at: Utc::now(),
        }
    }
}

/// Storage for accepted ballots.
#[rocket::async_trait]
pub trait BallotArchive: Send + Sync {
    async fn store(&self, ballot: StoredBallot) -> Result<(), StoreError>;

    async fn count(&self) -> Result<u64, StoreError>;

    async fn all(&self) -> Result<Vec<StoredBallot>, StoreError>;
}

#[derive(Debug, Default)]
pub struct MemoryArchive {
    ballots: Mutex<Vec<StoredBallot>>,
}

impl MemoryArchive {
    fn ballots(&self) -> std::sync::MutexGuard<'_, Vec<StoredBallot>> {
        self.ballots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[rocket::async_trait]
impl BallotArchive for MemoryArchive {
    async fn store(&self, ballot: StoredBallot) -> Result<(), StoreError> {
        self.ballots().push(ballot);
        Ok(())
    }

    async fn count(&self) -> Result<u64, StoreError> {
        Ok(self.ballots().len() as u64)
    }

    async fn all(&self) -> Result<Vec<StoredBallot>, StoreError> {
        Ok(self.ballots().clone())
    }
}

/// The tally service's intake: holds the ballot encryption key pair and keeps
/// every ballot the intermediary forwards. Ballots arrive pre-validated and
/// are never inspected here.
pub struct BackendStub {
    keys: TallyKeys,
    archive: Arc<dyn BallotArchive>,
}

impl BackendStub {
    pub fn new(keys: TallyKeys, archive: Arc<dyn BallotArchive>) -> Self {
        Self { keys, archive }
    }

    /// The base64 public key voters encrypt to.
    pub fn public_key(&self) -> String {
        self.keys.public_key()
    }

    pub fn keys(&self) -> &TallyKeys {
        &self.keys
    }

    pub async fn accept(&self, ballot: EncryptedBallot) -> Result<(), StoreError> {
        self.archive.store(StoredBallot::new(ballot)).await?;
        info!("Stored encrypted ballot");
        Ok(())
    }

    pub async fn ballots(&self) -> Result<Vec<StoredBallot>, StoreError> {
        self.archive.all().await
    }

    pub async fn ballot_count(&self) -> Result<u64, StoreError> {
        self.archive.count().await
    }
}

#[rocket::async_trait]
impl BallotSink for BackendStub {
    async fn deliver(&self, ballot: &EncryptedBallot) -> Result<(), SubmissionError> {
        self.accept(ballot.clone())
            .await
            .map_err(|e| SubmissionError::BackendUnavailable(e.to_string()))
    }
}
