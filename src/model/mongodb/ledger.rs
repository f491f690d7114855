use chrono::{DateTime, Utc};
use mongodb::{bson::serde_helpers::chrono_datetime_as_bson_datetime, Database};
use serde::{Deserialize, Serialize};

use crate::model::{
    ledger::Ledger,
    mongodb::{errors::is_duplicate_key_error, Coll},
    store::StoreError,
    token::VotingToken,
};

/// A spent token. The token is the document `_id`, so the primary key index
/// is what makes spending atomic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpentToken {
    #[serde(rename = "_id")]
    pub token: i64,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub spent_at: DateTime<Utc>,
}

pub struct MongoLedger {
    spent: Coll<SpentToken>,
}

impl MongoLedger {
    pub fn new(db: &Database) -> Self {
        Self {
            spent: Coll::from_db(db),
        }
    }
}

#[rocket::async_trait]
impl Ledger for MongoLedger {
    async fn insert_if_absent(&self, token: VotingToken) -> Result<bool, StoreError> {
        let record = SpentToken {
            token: token.value() as i64,
            spent_at: Utc::now(),
        };
        match self.spent.insert_one(record, None).await {
            Ok(_) => Ok(true),
            Err(e) if is_duplicate_key_error(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn contains(&self, token: VotingToken) -> Result<bool, StoreError> {
        Ok(self.spent.find_one(token.as_doc(), None).await?.is_some())
    }
}
