use std::ops::Deref;

use log::debug;
use mongodb::{
    bson::doc, error::Error as DbError, options::IndexOptions, Collection, Database, IndexModel,
};

use crate::model::{
    backend::StoredBallot,
    mongodb::{ledger::SpentToken, registry::VoterRecord},
};

/// A type that can be directly inserted/read to/from the database.
pub trait MongoCollection {
    /// The name of the collection.
    const NAME: &'static str;
}

/// A database collection of the given type.
pub struct Coll<T>(Collection<T>);

impl<T> Coll<T>
where
    T: MongoCollection,
{
    /// Get a handle on this collection in the given database.
    pub fn from_db(db: &Database) -> Self {
        Self(db.collection(T::NAME))
    }
}

// `Derive(Clone)` would only derive if `T: Clone`, but we don't need that bound.
impl<T> Clone for Coll<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> Deref for Coll<T> {
    type Target = Collection<T>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl MongoCollection for SpentToken {
    const NAME: &'static str = "spent_tokens";
}

impl MongoCollection for VoterRecord {
    const NAME: &'static str = "voters";
}

impl MongoCollection for StoredBallot {
    const NAME: &'static str = "ballots";
}

/// Ensure that all the required indexes exist on the given database.
///
/// This operation is idempotent.
pub async fn ensure_indexes_exist(db: &Database) -> Result<(), DbError> {
    debug!("Ensuring collection indexes exist");

    let unique = IndexOptions::builder().unique(true).build();

    // One token per identity. Tokens themselves are unique as `_id`.
    let voter_index = IndexModel::builder()
        .keys(doc! {"identity_hmac": 1})
        .options(unique)
        .build();
    Coll::<VoterRecord>::from_db(db)
        .create_index(voter_index, None)
        .await?;

    let ballot_index = IndexModel::builder()
        .keys(doc! {"received_at": 1})
        .build();
    Coll::<StoredBallot>::from_db(db)
        .create_index(ballot_index, None)
        .await?;

    Ok(())
}
