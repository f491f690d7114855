mod archive;
mod collection;
mod errors;
mod ledger;
mod registry;

pub use archive::MongoArchive;
pub use collection::{ensure_indexes_exist, Coll, MongoCollection};
pub use errors::{is_duplicate_key_error, DUPLICATE_KEY};
pub use ledger::{MongoLedger, SpentToken};
pub use registry::{MongoRegistry, VoterRecord};

/// These need a live MongoDB at `ROCKET_DB_URI` and are skipped by default.
#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use mongodb::{Client, Database};

    use crate::model::{
        auth::{AuthCore, Identity, ReauthPolicy},
        backend::{BackendStub, BallotArchive, StoredBallot},
        crypto::{Dalek, SignerKeys, TallyKeys},
        ledger::Ledger,
        submission::EncryptedBallot,
        token::VotingToken,
    };

    use super::*;

    async fn test_db() -> Database {
        let uri =
            std::env::var("ROCKET_DB_URI").unwrap_or_else(|_| "mongodb://localhost:27017".into());
        let client = Client::with_uri_str(uri).await.unwrap();
        let random: u32 = rand::random();
        let db = client.database(&format!("anonvote_test{random}"));
        ensure_indexes_exist(&db).await.unwrap();
        db
    }

    #[rocket::async_test]
    #[ignore]
    async fn ledger_spends_once() {
        let db = test_db().await;
        let ledger = MongoLedger::new(&db);
        let token = VotingToken::from(77);

        assert!(!ledger.contains(token).await.unwrap());
        assert!(ledger.insert_if_absent(token).await.unwrap());
        assert!(!ledger.insert_if_absent(token).await.unwrap());
        assert!(ledger.contains(token).await.unwrap());

        db.drop(None).await.unwrap();
    }

    #[rocket::async_test]
    #[ignore]
    async fn registry_issues_one_token_per_identity() {
        let db = test_db().await;
        let auth = AuthCore::new(
            Arc::new(MongoRegistry::new(&db)),
            Arc::new(Dalek),
            "secret",
            ReauthPolicy::ReturnExisting,
        );
        let keys = SignerKeys::generate();

        let first = auth
            .authenticate(Identity::example("ID-1", &keys))
            .await
            .unwrap();
        let second = auth
            .authenticate(Identity::example("ID-1", &SignerKeys::generate()))
            .await
            .unwrap();
        assert!(first.fresh);
        assert!(!second.fresh);
        assert_eq!(first.token, second.token);

        let binding = auth.binding(first.token).await.unwrap().unwrap();
        assert_eq!(binding.fingerprint, keys.fingerprint());

        db.drop(None).await.unwrap();
    }

    #[rocket::async_test]
    #[ignore]
    async fn archive_keeps_ballots() {
        let db = test_db().await;
        let archive = Arc::new(MongoArchive::new(&db));
        let backend = BackendStub::new(TallyKeys::generate(), archive.clone());

        backend
            .accept(EncryptedBallot::from("opaque".to_string()))
            .await
            .unwrap();
        archive
            .store(StoredBallot::new(EncryptedBallot::from("other".to_string())))
            .await
            .unwrap();
        assert_eq!(backend.ballot_count().await.unwrap(), 2);
        assert_eq!(backend.ballots().await.unwrap().len(), 2);

        db.drop(None).await.unwrap();
    }
}
