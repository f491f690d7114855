//! Request and response bodies shared by the servers and the voter client.

use serde::{Deserialize, Serialize};

use crate::model::{
    ballot::BallotOption, submission::EncryptedBallot, token::VotingToken,
};

pub const VOTE_ACCEPTED: &str = "New vote recorded successfully.";
pub const VOTE_FOUND: &str = "Vote found successfully.";
pub const VOTE_NOT_FOUND: &str = "No vote found.";
pub const REGISTERED: &str = "Successfully registered";
pub const ALREADY_REGISTERED: &str = "eID already registered";

/// Response to `POST /login`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthResponse {
    pub voter_token: Option<VotingToken>,
    pub message: String,
}

impl AuthResponse {
    pub fn issued(token: VotingToken, fresh: bool) -> Self {
        Self {
            voter_token: Some(token),
            message: if fresh { REGISTERED } else { ALREADY_REGISTERED }.to_string(),
        }
    }

    pub fn refused(message: impl Into<String>) -> Self {
        Self {
            voter_token: None,
            message: message.into(),
        }
    }
}

/// A plain `{"message": ...}` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerAddress {
    pub host: String,
    pub port: u16,
}

impl ServerAddress {
    pub fn url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// Response to `GET /init`: everything a voter needs to start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitResponse {
    pub auth_server: ServerAddress,
    pub backend_key: String,
    pub parties: Vec<BallotOption>,
}

/// On-disk party list, as `{"politicians": [{"name": ..., "party": ...}, ...]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartyList {
    pub politicians: Vec<BallotOption>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKeyResponse {
    pub public_key: String,
}

/// Body of the intermediary's delivery to `POST /vote` on the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardRequest {
    pub encrypted_vote: EncryptedBallot,
}
