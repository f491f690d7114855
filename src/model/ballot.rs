use rand::{CryptoRng, RngCore};
use rocket::serde::json::serde_json;
use serde::{Deserialize, Serialize};

/// Plaintexts are padded to a multiple of this many bytes before encryption,
/// so blank and substantive ballots encrypt to the same length.
pub const PADDING_BLOCK: usize = 256;

const LENGTH_PREFIX: usize = 4;

/// A selectable candidate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BallotOption {
    pub name: String,
    pub party: String,
}

impl BallotOption {
    pub fn new(name: impl Into<String>, party: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            party: party.into(),
        }
    }
}

/// Order options for presentation: by party, then by name.
/// The sort is stable, so exact duplicates keep their relative order.
pub fn present_options(options: &[BallotOption]) -> Vec<BallotOption> {
    let mut sorted = options.to_vec();
    sorted.sort_by(|a, b| a.party.cmp(&b.party).then_with(|| a.name.cmp(&b.name)));
    sorted
}

/// What gets encrypted to the backend: a fresh nonce and the selection.
/// A `None` vote is a blank ballot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BallotPlaintext {
    pub nonce: u64,
    pub vote: Option<BallotOption>,
}

impl BallotPlaintext {
    pub fn new(vote: Option<BallotOption>, rng: &mut (impl RngCore + CryptoRng)) -> Self {
        Self {
            nonce: rng.next_u64(),
            vote,
        }
    }

    pub fn is_blank(&self) -> bool {
        self.vote.is_none()
    }

    /// Length-prefixed JSON, zero padded to a multiple of [`PADDING_BLOCK`].
    pub fn to_padded_bytes(&self) -> Vec<u8> {
        let json = serde_json::to_vec(self).expect("plaintext serialization does not fail");
        let length = u32::try_from(json.len()).expect("ballot plaintext fits in 4 GiB");

        let unpadded = LENGTH_PREFIX + json.len();
        let padded = unpadded.div_ceil(PADDING_BLOCK) * PADDING_BLOCK;
        let mut bytes = Vec::with_capacity(padded);
        bytes.extend_from_slice(&length.to_be_bytes());
        bytes.extend(json);
        bytes.resize(padded, 0);
        bytes
    }

    /// Inverse of [`BallotPlaintext::to_padded_bytes`]; `None` if malformed.
    pub fn from_padded_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() % PADDING_BLOCK != 0 || bytes.len() < LENGTH_PREFIX {
            return None;
        }
        let (prefix, rest) = bytes.split_at(LENGTH_PREFIX);
        let length = u32::from_be_bytes(prefix.try_into().ok()?) as usize;
        if length > rest.len() || rest[length..].iter().any(|b| *b != 0) {
            return None;
        }
        serde_json::from_slice(&rest[..length]).ok()
    }
}
