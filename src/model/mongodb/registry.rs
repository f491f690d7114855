use mongodb::{bson::doc, Database};
use serde::{Deserialize, Serialize};

use crate::model::{
    auth::{NewRegistration, Registration, Registry},
    crypto::Fingerprint,
    mongodb::{errors::is_duplicate_key_error, Coll},
    store::StoreError,
    token::{IdentityDigest, KeyBinding, VotingToken},
};

/// One registered voter. `_id` is the token; `identity_hmac` carries a unique index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoterRecord {
    #[serde(rename = "_id")]
    pub token: i64,
    pub identity_hmac: IdentityDigest,
    pub fingerprint: Fingerprint,
}

impl VoterRecord {
    fn token(&self) -> VotingToken {
        VotingToken::from(self.token as u64)
    }
}

pub struct MongoRegistry {
    voters: Coll<VoterRecord>,
}

impl MongoRegistry {
    pub fn new(db: &Database) -> Self {
        Self {
            voters: Coll::from_db(db),
        }
    }
}

#[rocket::async_trait]
impl Registry for MongoRegistry {
    async fn register(&self, registration: NewRegistration) -> Result<Registration, StoreError> {
        let token = registration.binding.token;
        let record = VoterRecord {
            token: token.value() as i64,
            identity_hmac: registration.identity.clone(),
            fingerprint: registration.binding.fingerprint,
        };
        match self.voters.insert_one(record, None).await {
            Ok(_) => Ok(Registration::Created(token)),
            Err(e) if is_duplicate_key_error(&e) => {
                // Either the identity or the token already exists; find out which.
                let with_identity = doc! { "identity_hmac": registration.identity.as_str() };
                Ok(match self.voters.find_one(with_identity, None).await? {
                    Some(existing) => Registration::Existing(existing.token()),
                    None => Registration::TokenTaken,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn binding(&self, token: VotingToken) -> Result<Option<KeyBinding>, StoreError> {
        Ok(self
            .voters
            .find_one(token.as_doc(), None)
            .await?
            .map(|record| KeyBinding {
                token: record.token(),
                fingerprint: record.fingerprint,
            }))
    }
}
