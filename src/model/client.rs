use crate::model::{
    auth::Identity,
    ballot::BallotOption,
    crypto::{CryptoError, CryptoProvider, Dalek, SignerKeys},
    submission::{EncryptedBallot, Submission},
    token::VotingToken,
};

/// A voter's device: owns the signing key and builds submissions.
pub struct Voter {
    keys: SignerKeys,
    crypto: Box<dyn CryptoProvider>,
}

impl Voter {
    /// A voter with a fresh key pair.
    pub fn generate() -> Self {
        Self::with_keys(SignerKeys::generate(), Box::new(Dalek))
    }

    pub fn with_keys(keys: SignerKeys, crypto: Box<dyn CryptoProvider>) -> Self {
        Self { keys, crypto }
    }

    pub fn public_key(&self) -> String {
        self.keys.public_key()
    }

    /// The identity to present to the auth server.
    pub fn identity(&self, external_id: impl Into<String>) -> Identity {
        Identity {
            external_id: external_id.into(),
            public_key: self.public_key(),
        }
    }

    /// Build the signed submission for `selection`, or a blank ballot for `None`.
    pub fn cast(
        &self,
        token: VotingToken,
        selection: Option<BallotOption>,
        backend_key: &str,
    ) -> Result<Submission, CryptoError> {
        let ballot = EncryptedBallot::seal(self.crypto.as_ref(), selection, backend_key)?;
        Ok(Submission::sign(
            self.crypto.as_ref(),
            &self.keys,
            token,
            ballot,
        ))
    }
}
