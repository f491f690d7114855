//! Identity authentication and voting token issuance.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use log::{debug, info, warn};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{
    crypto::{CryptoProvider, Fingerprint},
    store::StoreError,
    token::{ExternalId, IdentityDigest, KeyBinding, VotingToken},
};

/// Attempts at drawing an unused token before giving up.
const MAX_MINT_ATTEMPTS: usize = 8;

/// A voter presenting themselves for authentication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub external_id: String,
    /// Base64 Ed25519 verifying key the voter will sign their ballot with.
    pub public_key: String,
}

/// What to do when an identity that already holds a token authenticates again.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReauthPolicy {
    /// Hand back the token issued the first time.
    #[default]
    ReturnExisting,
    /// Refuse with [`AuthError::AlreadyAuthenticated`].
    Reject,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("identity rejected: {0}")]
    IdentityRejected(String),
    #[error("identity has already been issued a voting token")]
    AlreadyAuthenticated,
    #[error("could not mint an unused token after {0} attempts")]
    TokenSpaceExhausted(usize),
    #[error(transparent)]
    Storage(#[from] StoreError),
}

/// A successful authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Authenticated {
    pub token: VotingToken,
    /// False if this token was issued by an earlier authentication.
    pub fresh: bool,
}

/// A registration to be recorded atomically.
#[derive(Debug, Clone)]
pub struct NewRegistration {
    pub identity: IdentityDigest,
    pub binding: KeyBinding,
}

/// Result of an atomic registration attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// The identity was new and now holds the proposed token.
    Created(VotingToken),
    /// The identity already held this token; nothing was written.
    Existing(VotingToken),
    /// The proposed token belongs to another identity; nothing was written.
    TokenTaken,
}

/// Storage for identity -> token -> key bindings.
#[rocket::async_trait]
pub trait Registry: Send + Sync {
    /// Record `registration` unless its identity or token is already present.
    /// Must be atomic: two concurrent calls for one identity never both create.
    async fn register(&self, registration: NewRegistration) -> Result<Registration, StoreError>;

    async fn binding(&self, token: VotingToken) -> Result<Option<KeyBinding>, StoreError>;
}

#[derive(Debug, Default)]
struct Voters {
    tokens: HashMap<IdentityDigest, VotingToken>,
    bindings: HashMap<VotingToken, Fingerprint>,
}

/// A process-local registry.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    voters: Mutex<Voters>,
}

impl MemoryRegistry {
    fn voters(&self) -> std::sync::MutexGuard<'_, Voters> {
        self.voters
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[rocket::async_trait]
impl Registry for MemoryRegistry {
    async fn register(&self, registration: NewRegistration) -> Result<Registration, StoreError> {
        let mut voters = self.voters();
        if let Some(token) = voters.tokens.get(&registration.identity) {
            return Ok(Registration::Existing(*token));
        }
        let KeyBinding { token, fingerprint } = registration.binding;
        if voters.bindings.contains_key(&token) {
            return Ok(Registration::TokenTaken);
        }
        voters.tokens.insert(registration.identity, token);
        voters.bindings.insert(token, fingerprint);
        Ok(Registration::Created(token))
    }

    async fn binding(&self, token: VotingToken) -> Result<Option<KeyBinding>, StoreError> {
        Ok(self
            .voters()
            .bindings
            .get(&token)
            .map(|fingerprint| KeyBinding {
                token,
                fingerprint: fingerprint.clone(),
            }))
    }
}

/// Issues at most one voting token per legal identity.
pub struct AuthCore {
    registry: Arc<dyn Registry>,
    crypto: Arc<dyn CryptoProvider>,
    hmac_secret: Vec<u8>,
    policy: ReauthPolicy,
}

impl AuthCore {
    pub fn new(
        registry: Arc<dyn Registry>,
        crypto: Arc<dyn CryptoProvider>,
        hmac_secret: impl Into<Vec<u8>>,
        policy: ReauthPolicy,
    ) -> Self {
        Self {
            registry,
            crypto,
            hmac_secret: hmac_secret.into(),
            policy,
        }
    }

    pub fn policy(&self) -> ReauthPolicy {
        self.policy
    }

    /// Authenticate `identity`, issuing a token if it has never been seen.
    pub async fn authenticate(&self, identity: Identity) -> Result<Authenticated, AuthError> {
        let external_id = identity
            .external_id
            .parse::<ExternalId>()
            .map_err(|e| AuthError::IdentityRejected(e.to_string()))?;
        if identity.public_key.trim().is_empty() {
            return Err(AuthError::IdentityRejected(
                "public key is empty".to_string(),
            ));
        }
        let fingerprint = self
            .crypto
            .import_key(&identity.public_key)
            .map_err(|e| AuthError::IdentityRejected(e.to_string()))?;
        let digest = external_id.digest(&self.hmac_secret);

        for _ in 0..MAX_MINT_ATTEMPTS {
            let token = VotingToken::random(&mut OsRng);
            let registration = NewRegistration {
                identity: digest.clone(),
                binding: KeyBinding {
                    token,
                    fingerprint: fingerprint.clone(),
                },
            };
            match self.registry.register(registration).await? {
                Registration::Created(token) => {
                    info!("Issued voting token {token}");
                    return Ok(Authenticated { token, fresh: true });
                }
                Registration::Existing(token) => {
                    return match self.policy {
                        ReauthPolicy::ReturnExisting => {
                            debug!("Re-authentication returned existing token {token}");
                            Ok(Authenticated {
                                token,
                                fresh: false,
                            })
                        }
                        ReauthPolicy::Reject => {
                            warn!("Rejected repeat authentication");
                            Err(AuthError::AlreadyAuthenticated)
                        }
                    };
                }
                Registration::TokenTaken => {
                    warn!("Token collision while minting, drawing again");
                }
            }
        }

        Err(AuthError::TokenSpaceExhausted(MAX_MINT_ATTEMPTS))
    }

    /// The key binding for `token`, if it was ever issued.
    pub async fn binding(&self, token: VotingToken) -> Result<Option<KeyBinding>, StoreError> {
        self.registry.binding(token).await
    }
}
