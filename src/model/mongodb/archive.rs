use mongodb::Database;
use rocket::futures::TryStreamExt;

use crate::model::{
    backend::{BallotArchive, StoredBallot},
    mongodb::Coll,
    store::StoreError,
};

pub struct MongoArchive {
    ballots: Coll<StoredBallot>,
}

impl MongoArchive {
    pub fn new(db: &Database) -> Self {
        Self {
            ballots: Coll::from_db(db),
        }
    }
}

#[rocket::async_trait]
impl BallotArchive for MongoArchive {
    async fn store(&self, ballot: StoredBallot) -> Result<(), StoreError> {
        self.ballots.insert_one(ballot, None).await?;
        Ok(())
    }

    async fn count(&self) -> Result<u64, StoreError> {
        Ok(self.ballots.count_documents(None, None).await?)
    }

    async fn all(&self) -> Result<Vec<StoredBallot>, StoreError> {
        Ok(self.ballots.find(None, None).await?.try_collect().await?)
    }
}
