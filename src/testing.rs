//! In-memory wiring of all three roles for HTTP tests.

use std::sync::Arc;
use std::time::Duration;

use rocket::{
    local::asynchronous::Client,
    tokio::{self, net::TcpListener},
    Build, Rocket,
};

use crate::{
    config::Role,
    model::{
        api::{InitResponse, ServerAddress},
        auth::{AuthCore, ReauthPolicy},
        backend::BackendStub,
        ballot::BallotOption,
        crypto::Dalek,
        intermediary::{Forwarder, IntermediaryCore},
        ledger::MemoryLedger,
    },
};

pub fn init_logging() {
    log4rs_test_utils::test_logging::init_logging_once_for(["anonvote_backend"], None, None);
}

/// The services behind every role, sharing state the way separate processes
/// would over HTTP.
pub struct Services {
    pub auth: Arc<AuthCore>,
    pub ledger: Arc<MemoryLedger>,
    pub backend: Arc<BackendStub>,
}

impl Services {
    pub fn new() -> Self {
        Self::with_policy(ReauthPolicy::ReturnExisting)
    }

    pub fn with_policy(policy: ReauthPolicy) -> Self {
        Self {
            auth: Arc::new(AuthCore::example(policy)),
            ledger: Arc::new(MemoryLedger::default()),
            backend: Arc::new(BackendStub::example()),
        }
    }

    pub fn intermediary(&self) -> IntermediaryCore {
        IntermediaryCore::new(
            self.ledger.clone(),
            self.auth.clone(),
            Arc::new(Dalek),
            Forwarder::new(self.backend.clone(), 0, Duration::ZERO),
        )
    }

    pub fn discovery(&self) -> InitResponse {
        InitResponse {
            auth_server: ServerAddress {
                host: "127.0.0.1".to_string(),
                port: 7878,
            },
            backend_key: self.backend.public_key(),
            parties: vec![
                BallotOption::new("Zed", "Green"),
                BallotOption::new("Alice", "Red"),
                BallotOption::new("Bob", "Green"),
            ],
        }
    }

    /// A server for `role`, with that role's routes mounted over these services.
    pub fn rocket(&self, role: Role) -> Rocket<Build> {
        let rocket = crate::mount(rocket::build(), role);
        match role {
            Role::Auth => rocket.manage(self.auth.clone()),
            Role::Intermediary => rocket
                .manage(self.intermediary())
                .manage(self.discovery()),
            Role::Backend => rocket.manage(self.backend.clone()),
        }
    }

    /// A local client for `role`.
    pub async fn client(&self, role: Role) -> Client {
        Client::tracked(self.rocket(role)).await.unwrap()
    }

    /// Wait for every accepted ballot to reach the backend.
    pub async fn wait_for_ballots(&self, count: u64) {
        for _ in 0..200 {
            if self.backend.ballot_count().await.unwrap() >= count {
                return;
            }
            rocket::tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("backend never received {count} ballot(s)");
    }
}

/// Serve `rocket` on a free local port and return its base URL once it accepts connections.
pub async fn launch(rocket: Rocket<Build>) -> String {
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let figment = rocket
        .figment()
        .clone()
        .merge(("address", "127.0.0.1"))
        .merge(("port", port));
    tokio::spawn(rocket.configure(figment).launch());

    let address = format!("127.0.0.1:{port}");
    for _ in 0..200 {
        if tokio::net::TcpStream::connect(&address).await.is_ok() {
            return format!("http://{address}");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("server on {address} never came up");
}

/// A peer that accepts connections and never answers.
pub async fn silent_peer() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });
    format!("http://{address}")
}
