use std::sync::Arc;

use mongodb::{error::Error as DbError, Database};
use thiserror::Error;

use crate::model::{
    auth::{MemoryRegistry, Registry},
    backend::{BallotArchive, MemoryArchive},
    ledger::{Ledger, MemoryLedger},
    mongodb::{MongoArchive, MongoLedger, MongoRegistry},
};

/// Infrastructure failures, as opposed to protocol outcomes.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] DbError),
    #[error("remote service error: {0}")]
    Remote(#[from] reqwest::Error),
}

/// Where durable state lives. Placed in managed state by the storage fairing.
pub enum Storage {
    /// Process-local; everything is lost on restart.
    Memory,
    /// The database handle keeps its client's connection pool alive.
    Mongo(Database),
}

impl Storage {
    pub fn ledger(&self) -> Arc<dyn Ledger> {
        match self {
            Self::Memory => Arc::new(MemoryLedger::default()),
            Self::Mongo(db) => Arc::new(MongoLedger::new(db)),
        }
    }

    pub fn registry(&self) -> Arc<dyn Registry> {
        match self {
            Self::Memory => Arc::new(MemoryRegistry::default()),
            Self::Mongo(db) => Arc::new(MongoRegistry::new(db)),
        }
    }

    pub fn archive(&self) -> Arc<dyn BallotArchive> {
        match self {
            Self::Memory => Arc::new(MemoryArchive::default()),
            Self::Mongo(db) => Arc::new(MongoArchive::new(db)),
        }
    }
}
