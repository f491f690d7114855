use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};
use mongodb::Client as MongoClient;
use rocket::{
    fairing::{Fairing, Info, Kind},
    serde::json::serde_json,
    tokio, Build, Rocket,
};
use serde::Deserialize;
use thiserror::Error;

use crate::model::{
    api::{InitResponse, PartyList, ServerAddress},
    auth::{AuthCore, ReauthPolicy},
    backend::BackendStub,
    crypto::{Dalek, TallyKeys},
    intermediary::{Forwarder, IntermediaryCore},
    mongodb::ensure_indexes_exist,
    remote::{AuthClient, BackendClient},
    store::Storage,
};

/// Which service this process runs as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Auth,
    Intermediary,
    Backend,
}

impl Display for Role {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Auth => "auth",
            Self::Intermediary => "intermediary",
            Self::Backend => "backend",
        })
    }
}

/// Configuration shared by every role, derived from `Rocket.toml` and
/// `ROCKET_*` environment variables.
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    pub role: Role,
}

/// Configuration for the auth role.
#[derive(Deserialize)]
pub struct AuthConfig {
    // secrets
    hmac_secret: String,
    // non-secrets
    #[serde(default)]
    reauth_policy: ReauthPolicy,
}

impl AuthConfig {
    /// Secret key used to HMAC identity identifiers.
    pub fn hmac_secret(&self) -> &[u8] {
        self.hmac_secret.as_bytes()
    }

    /// How a second authentication of the same identity is answered.
    pub fn reauth_policy(&self) -> ReauthPolicy {
        self.reauth_policy
    }
}

/// Configuration for the intermediary role.
#[derive(Deserialize)]
pub struct IntermediaryConfig {
    auth_host: String,
    auth_port: u16,
    backend_url: String,
    #[serde(default = "default_parties_path")]
    parties_path: PathBuf,
    #[serde(default = "default_forward_retries")]
    forward_retries: u32,
    #[serde(default = "default_forward_backoff_ms")]
    forward_backoff_ms: u64,
    #[serde(default = "default_request_timeout_ms")]
    request_timeout_ms: u64,
}

fn default_parties_path() -> PathBuf {
    PathBuf::from("parties.json")
}

fn default_forward_retries() -> u32 {
    5
}

fn default_forward_backoff_ms() -> u64 {
    200
}

fn default_request_timeout_ms() -> u64 {
    5000
}

impl IntermediaryConfig {
    /// The auth server, as advertised to voters and used for binding lookups.
    pub fn auth_server(&self) -> ServerAddress {
        ServerAddress {
            host: self.auth_host.clone(),
            port: self.auth_port,
        }
    }

    /// Base URL of the backend.
    pub fn backend_url(&self) -> &str {
        self.backend_url.trim_end_matches('/')
    }

    /// The JSON party list offered on the ballot.
    pub fn parties_path(&self) -> &Path {
        &self.parties_path
    }

    /// Extra delivery attempts made while the backend is unavailable.
    pub fn forward_retries(&self) -> u32 {
        self.forward_retries
    }

    /// Delay before the first retry; doubles on each subsequent one.
    pub fn forward_backoff(&self) -> Duration {
        Duration::from_millis(self.forward_backoff_ms)
    }

    /// Upper bound on any single request to the auth server or the backend.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Configuration for the backend role.
#[derive(Deserialize)]
pub struct BackendConfig {
    // secrets
    tally_secret_key: Option<String>,
}

/// Configuration for durable storage.
#[derive(Deserialize)]
struct StorageConfig {
    // secrets
    db_uri: Option<String>,
}

/// A fairing that connects to MongoDB if `db_uri` is configured, performs any
/// setup necessary, and places the resulting [`Storage`] into managed state.
/// Without `db_uri`, state lives in memory.
pub struct StorageFairing;

#[rocket::async_trait]
impl Fairing for StorageFairing {
    fn info(&self) -> Info {
        Info {
            name: "Storage",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> rocket::fairing::Result {
        let config = match rocket.figment().extract::<StorageConfig>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load storage config: {e}");
                return Err(rocket);
            }
        };
        let Some(db_uri) = config.db_uri else {
            warn!("No `db_uri` configured, state will be lost on restart");
            return Ok(rocket.manage(Storage::Memory));
        };

        info!("Loaded database config, connecting...");
        let client = match MongoClient::with_uri_str(db_uri).await {
            Ok(client) => client,
            Err(e) => {
                error!("Failed to connect to database: {e}");
                return Err(rocket);
            }
        };
        let db = client.database(&get_database_name());

        // Ensure the required indexes exist.
        if let Err(e) = ensure_indexes_exist(&db).await {
            error!("Failed to connect to database: {e}");
            return Err(rocket);
        }
        info!("...database connection online!");

        Ok(rocket.manage(Storage::Mongo(db)))
    }
}

/// Get the name of the database to use (production version).
#[cfg(not(test))]
fn get_database_name() -> String {
    "anonvote".to_string()
}

/// Get the name of the database to use (test version).
/// Use a random name to avoid collisions between tests.
#[cfg(test)]
fn get_database_name() -> String {
    let random: u32 = rand::random();
    let db = format!("test{random}");
    info!("Using database {db}");
    db
}

/// Builds the [`AuthCore`] and places it into managed state.
pub struct AuthFairing;

#[rocket::async_trait]
impl Fairing for AuthFairing {
    fn info(&self) -> Info {
        Info {
            name: "Auth",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> rocket::fairing::Result {
        let config = match rocket.figment().extract::<AuthConfig>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load auth config: {e}");
                return Err(rocket);
            }
        };
        let Some(storage) = rocket.state::<Storage>() else {
            error!("Auth role requires storage to be configured first");
            return Err(rocket);
        };

        let auth = AuthCore::new(
            storage.registry(),
            Arc::new(Dalek),
            config.hmac_secret(),
            config.reauth_policy(),
        );
        info!("Auth core ready, re-authentication policy {:?}", auth.policy());
        Ok(rocket.manage(Arc::new(auth)))
    }
}

/// Loads the party list, discovers the backend's key and builds the
/// [`IntermediaryCore`], placing it and the `/init` response into managed state.
pub struct IntermediaryFairing;

/// Attempts at fetching the backend key during launch.
const KEY_FETCH_ATTEMPTS: u32 = 5;

#[rocket::async_trait]
impl Fairing for IntermediaryFairing {
    fn info(&self) -> Info {
        Info {
            name: "Intermediary",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> rocket::fairing::Result {
        let config = match rocket.figment().extract::<IntermediaryConfig>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load intermediary config: {e}");
                return Err(rocket);
            }
        };
        let Some(storage) = rocket.state::<Storage>() else {
            error!("Intermediary role requires storage to be configured first");
            return Err(rocket);
        };

        let parties = match load_parties(config.parties_path()) {
            Ok(parties) => parties,
            Err(e) => {
                error!(
                    "Failed to load party list from {}: {e}",
                    config.parties_path().display()
                );
                return Err(rocket);
            }
        };
        info!("Loaded {} ballot options", parties.politicians.len());

        let http = match reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
        {
            Ok(http) => http,
            Err(e) => {
                error!("Failed to build HTTP client: {e}");
                return Err(rocket);
            }
        };
        let backend = BackendClient::new(http.clone(), config.backend_url());
        let backend_key = match fetch_backend_key(&backend).await {
            Some(key) => key,
            None => {
                error!("Could not fetch the backend public key from {}", backend.base_url());
                return Err(rocket);
            }
        };

        let auth_server = config.auth_server();
        let intermediary = IntermediaryCore::new(
            storage.ledger(),
            Arc::new(AuthClient::new(http, auth_server.url())),
            Arc::new(Dalek),
            Forwarder::new(
                Arc::new(backend),
                config.forward_retries(),
                config.forward_backoff(),
            ),
        );
        let discovery = InitResponse {
            auth_server,
            backend_key,
            parties: parties.politicians,
        };

        Ok(rocket.manage(intermediary).manage(discovery))
    }
}

#[derive(Debug, Error)]
enum PartyListError {
    #[error("could not read file: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed party list: {0}")]
    Json(#[from] serde_json::Error),
}

fn load_parties(path: &Path) -> Result<PartyList, PartyListError> {
    let contents = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

async fn fetch_backend_key(backend: &BackendClient) -> Option<String> {
    let mut delay = Duration::from_millis(250);
    for attempt in 1..=KEY_FETCH_ATTEMPTS {
        match backend.public_key().await {
            Ok(key) => return Some(key),
            Err(e) => {
                warn!("Backend key fetch attempt {attempt} failed: {e}");
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
        }
    }
    None
}

/// Loads or generates the tally key pair and places the [`BackendStub`] into managed state.
pub struct BackendFairing;

#[rocket::async_trait]
impl Fairing for BackendFairing {
    fn info(&self) -> Info {
        Info {
            name: "Backend",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> rocket::fairing::Result {
        let config = match rocket.figment().extract::<BackendConfig>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load backend config: {e}");
                return Err(rocket);
            }
        };
        let Some(storage) = rocket.state::<Storage>() else {
            error!("Backend role requires storage to be configured first");
            return Err(rocket);
        };

        let keys = match config.tally_secret_key {
            Some(secret) => match TallyKeys::from_secret(&secret) {
                Ok(keys) => keys,
                Err(e) => {
                    error!("Invalid `tally_secret_key`: {e}");
                    return Err(rocket);
                }
            },
            None => {
                warn!("No `tally_secret_key` configured, generated an ephemeral key pair");
                TallyKeys::generate()
            }
        };

        let backend = BackendStub::new(keys, storage.archive());
        info!("Backend ready, public key {}", backend.public_key());
        Ok(rocket.manage(Arc::new(backend)))
    }
}
