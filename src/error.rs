use log::{error, warn};
use rocket::{
    http::Status,
    response::{status::Custom, Responder},
    serde::json::Json,
};
use thiserror::Error;

use crate::model::{
    api::{AuthResponse, MessageResponse},
    auth::AuthError,
    intermediary::SubmissionError,
    store::StoreError,
};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Submission(#[from] SubmissionError),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Not found: {0}")]
    NotFound(String),
}

impl Error {
    pub fn status(&self) -> Status {
        match self {
            Self::Store(e) => store_status(e),
            Self::Auth(e) => match e {
                AuthError::IdentityRejected(_) => Status::BadRequest,
                AuthError::AlreadyAuthenticated => Status::Conflict,
                AuthError::TokenSpaceExhausted(_) => Status::InternalServerError,
                AuthError::Storage(e) => store_status(e),
            },
            Self::Submission(e) => match e {
                SubmissionError::AlreadyVoted => Status::Conflict,
                SubmissionError::UnknownToken => Status::NotFound,
                SubmissionError::InvalidSignature => Status::Forbidden,
                SubmissionError::BackendUnavailable(_) => Status::ServiceUnavailable,
                SubmissionError::BackendRefused(_) => Status::BadGateway,
                SubmissionError::Storage(e) => store_status(e),
            },
            Self::BadRequest(_) => Status::BadRequest,
            Self::NotFound(_) => Status::NotFound,
        }
    }
}

fn store_status(err: &StoreError) -> Status {
    match err {
        StoreError::Db(_) => Status::InternalServerError,
        StoreError::Remote(_) => Status::ServiceUnavailable,
    }
}

impl<'r, 'o: 'r> Responder<'r, 'o> for Error {
    fn respond_to(self, req: &'r rocket::Request<'_>) -> rocket::response::Result<'o> {
        let status = self.status();
        if status.class().is_server_error() {
            error!("{self}");
            return Err(status);
        }
        warn!("{self}");
        match self {
            // Protocol outcomes carry a body the client can show the voter.
            Self::Auth(e) => {
                Custom(status, Json(AuthResponse::refused(e.to_string()))).respond_to(req)
            }
            Self::Submission(e) => {
                Custom(status, Json(MessageResponse::new(e.to_string()))).respond_to(req)
            }
            _ => Err(status),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_statuses() {
        assert_eq!(
            Error::from(SubmissionError::AlreadyVoted).status(),
            Status::Conflict
        );
        assert_eq!(
            Error::from(SubmissionError::InvalidSignature).status(),
            Status::Forbidden
        );
        assert_eq!(
            Error::from(SubmissionError::UnknownToken).status(),
            Status::NotFound
        );
        assert_eq!(
            Error::from(SubmissionError::BackendRefused("422".to_string())).status(),
            Status::BadGateway
        );
        assert_eq!(
            Error::from(AuthError::AlreadyAuthenticated).status(),
            Status::Conflict
        );
        assert_eq!(
            Error::from(AuthError::IdentityRejected("bad".to_string())).status(),
            Status::BadRequest
        );
    }
}
