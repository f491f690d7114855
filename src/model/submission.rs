use std::fmt::{Display, Formatter};

use rand::rngs::OsRng;
use rocket::serde::json::serde_json;
use serde::{Deserialize, Serialize};

use crate::model::{
    ballot::{BallotOption, BallotPlaintext},
    crypto::{CryptoError, CryptoProvider, SignerKeys},
    token::VotingToken,
};

/// Armoured ciphertext of a padded [`BallotPlaintext`], opaque to everyone but the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncryptedBallot(String);

impl EncryptedBallot {
    /// Nonce-wrap, pad and encrypt a selection to the backend's public key.
    pub fn seal(
        crypto: &dyn CryptoProvider,
        selection: Option<BallotOption>,
        backend_key: &str,
    ) -> Result<Self, CryptoError> {
        let plaintext = BallotPlaintext::new(selection, &mut OsRng);
        crypto
            .encrypt(&plaintext.to_padded_bytes(), backend_key)
            .map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for EncryptedBallot {
    fn from(armoured: String) -> Self {
        Self(armoured)
    }
}

impl Display for EncryptedBallot {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A signed ballot as submitted to the intermediary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    #[serde(rename = "vote_id")]
    pub token: VotingToken,
    #[serde(rename = "plain")]
    pub ballot: EncryptedBallot,
    #[serde(rename = "signed")]
    pub signature: String,
}

impl Submission {
    /// Sign `ballot` under `token`.
    pub fn sign(
        crypto: &dyn CryptoProvider,
        keys: &SignerKeys,
        token: VotingToken,
        ballot: EncryptedBallot,
    ) -> Self {
        let signature = crypto.sign(&signing_payload(token, &ballot), keys);
        Self {
            token,
            ballot,
            signature,
        }
    }

    /// The exact bytes the signature must cover.
    pub fn signing_payload(&self) -> Vec<u8> {
        signing_payload(self.token, &self.ballot)
    }
}

#[derive(Serialize)]
struct SignedPayload<'a> {
    vote_id: VotingToken,
    vote: &'a str,
}

/// Canonical JSON `{"vote_id": <token>, "vote": <ciphertext>}`.
pub fn signing_payload(token: VotingToken, ballot: &EncryptedBallot) -> Vec<u8> {
    let payload = SignedPayload {
        vote_id: token,
        vote: ballot.as_str(),
    };
    serde_json::to_vec(&payload).expect("payload serialization does not fail")
}

#[cfg(test)]
mod tests {
    use crate::model::crypto::{Dalek, TallyKeys};

    use super::*;

    #[test]
    fn payload_is_canonical() {
        let ballot = EncryptedBallot::from("Y2lwaGVy".to_string());
        assert_eq!(
            signing_payload(VotingToken::from(42), &ballot),
            br#"{"vote_id":42,"vote":"Y2lwaGVy"}"#.to_vec()
        );
    }

    #[test]
    fn wire_field_names() {
        let submission = Submission {
            token: VotingToken::from(7),
            ballot: EncryptedBallot::from("ct".to_string()),
            signature: "sig".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&submission).unwrap(),
            serde_json::json!({ "vote_id": 7, "plain": "ct", "signed": "sig" })
        );
    }

    #[test]
    fn signature_binds_token_and_ballot() {
        let keys = SignerKeys::generate();
        let tally = TallyKeys::generate();
        let ballot = EncryptedBallot::seal(&Dalek, None, &tally.public_key()).unwrap();
        let submission = Submission::sign(&Dalek, &keys, VotingToken::from(42), ballot);

        let verification = Dalek.verify(&submission.signing_payload(), &submission.signature);
        assert!(verification.signed_by(&keys.fingerprint()));

        // Moving the signature to another token breaks it.
        let moved = Submission {
            token: VotingToken::from(43),
            ..submission.clone()
        };
        assert!(!Dalek.verify(&moved.signing_payload(), &moved.signature).valid);

        // So does swapping the ballot.
        let swapped = Submission {
            ballot: EncryptedBallot::seal(&Dalek, None, &tally.public_key()).unwrap(),
            ..submission
        };
        assert!(!Dalek.verify(&swapped.signing_payload(), &swapped.signature).valid);
    }

    #[test]
    fn blank_and_cast_ciphertexts_are_indistinguishable_by_length() {
        let tally = TallyKeys::generate();
        let blank = EncryptedBallot::seal(&Dalek, None, &tally.public_key()).unwrap();
        let cast = EncryptedBallot::seal(
            &Dalek,
            Some(BallotOption::new("Alice", "Green")),
            &tally.public_key(),
        )
        .unwrap();
        assert_eq!(blank.as_str().len(), cast.as_str().len());

        // Both carry a nonce and decrypt to what was sealed.
        let blank = Dalek.decrypt(blank.as_str(), &tally).unwrap();
        let blank = BallotPlaintext::from_padded_bytes(&blank).unwrap();
        assert!(blank.is_blank());
        let cast = Dalek.decrypt(cast.as_str(), &tally).unwrap();
        let cast = BallotPlaintext::from_padded_bytes(&cast).unwrap();
        assert_eq!(cast.vote, Some(BallotOption::new("Alice", "Green")));
        assert_ne!(blank.nonce, cast.nonce);
    }

    #[test]
    fn two_blank_ballots_differ() {
        let tally = TallyKeys::generate();
        let first = EncryptedBallot::seal(&Dalek, None, &tally.public_key()).unwrap();
        let second = EncryptedBallot::seal(&Dalek, None, &tally.public_key()).unwrap();
        assert_ne!(first, second);
    }
}
