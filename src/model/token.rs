use std::fmt::{Display, Formatter};
use std::num::ParseIntError;
use std::str::FromStr;

use data_encoding::HEXUPPER;
use hmac::{Hmac, Mac};
use mongodb::bson::{doc, Document};
use rand::{CryptoRng, Rng, RngCore};
use rocket::{
    http::{
        impl_from_uri_param_identity,
        uri::fmt::{Path, UriDisplay},
    },
    request::FromParam,
};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

use crate::model::crypto::Fingerprint;

pub type HmacSha256 = Hmac<Sha256>;

/// Exclusive upper bound of the token space.
/// Every token is exactly representable as a JSON number and a BSON `Int64`.
pub const TOKEN_SPACE: u64 = 1 << 53;

/// An anonymous, one-time voting right.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VotingToken(u64);

impl VotingToken {
    /// Draw a fresh token uniformly from `[1, TOKEN_SPACE)`.
    pub fn random(rng: &mut (impl RngCore + CryptoRng)) -> Self {
        Self(rng.gen_range(1..TOKEN_SPACE))
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    /// A filter matching the record keyed by this token.
    pub fn as_doc(&self) -> Document {
        // Lossless: tokens are below 2^53.
        doc! { "_id": self.0 as i64 }
    }
}

impl From<u64> for VotingToken {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl Display for VotingToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for VotingToken {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u64>().map(Self)
    }
}

impl<'a> FromParam<'a> for VotingToken {
    type Error = ParseIntError;

    fn from_param(param: &'a str) -> Result<Self, Self::Error> {
        param.parse()
    }
}

impl UriDisplay<Path> for VotingToken {
    fn fmt(&self, formatter: &mut rocket::http::uri::fmt::Formatter<'_, Path>) -> std::fmt::Result {
        formatter.write_value(self.0.to_string())
    }
}

impl_from_uri_param_identity!([Path] VotingToken);

/// A legal-identity identifier of the form `<ISSUER>-<SERIAL>`, e.g. `BE-63963937392`.
///
/// The issuer is two or more uppercase ASCII letters, the serial 1 to 20 ASCII digits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalId(String);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExternalIdError {
    #[error("expected `<ISSUER>-<SERIAL>`")]
    MissingSeparator,
    #[error("issuer must be at least two uppercase ASCII letters")]
    BadIssuer,
    #[error("serial must be 1 to 20 ASCII digits")]
    BadSerial,
}

impl FromStr for ExternalId {
    type Err = ExternalIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (issuer, serial) = s
            .split_once('-')
            .ok_or(ExternalIdError::MissingSeparator)?;
        if issuer.len() < 2 || !issuer.bytes().all(|b| b.is_ascii_uppercase()) {
            return Err(ExternalIdError::BadIssuer);
        }
        if serial.is_empty() || serial.len() > 20 || !serial.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ExternalIdError::BadSerial);
        }
        Ok(Self(s.to_string()))
    }
}

impl ExternalId {
    /// Keyed digest of the identifier. Only the digest is ever stored.
    pub fn digest(&self, secret: &[u8]) -> IdentityDigest {
        let mut hmac = HmacSha256::new_from_slice(secret).expect("HMAC can take key of any size");
        hmac.update(self.0.as_bytes());
        IdentityDigest(HEXUPPER.encode(&hmac.finalize().into_bytes()))
    }
}

/// HMAC of an [`ExternalId`], hex encoded.
#[derive(Debug, Clone, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityDigest(String);

impl IdentityDigest {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// The key a token's submissions must be signed with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyBinding {
    #[serde(rename = "voter_token")]
    pub token: VotingToken,
    pub fingerprint: Fingerprint,
}
