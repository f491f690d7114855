use std::sync::Arc;

use rocket::{get, http::Status, post, routes, serde::json::Json, Route, State};

use crate::{
    error::Result,
    model::{
        api::{ForwardRequest, PublicKeyResponse},
        backend::BackendStub,
    },
};

pub fn routes() -> Vec<Route> {
    routes![public_key, vote]
}

#[get("/public_key")]
pub fn public_key(backend: &State<Arc<BackendStub>>) -> Json<PublicKeyResponse> {
    Json(PublicKeyResponse {
        public_key: backend.public_key(),
    })
}

/// Intake of ballots the intermediary has already validated.
#[post("/vote", data = "<request>", format = "json")]
pub async fn vote(
    request: Json<ForwardRequest>,
    backend: &State<Arc<BackendStub>>,
) -> Result<Status> {
    backend.accept(request.into_inner().encrypted_vote).await?;
    Ok(Status::Ok)
}

#[cfg(test)]
mod tests {
    use rocket::{
        http::ContentType, local::asynchronous::Client, serde::json::serde_json::json, uri,
    };

    use crate::{model::submission::EncryptedBallot, testing::Services};

    use super::*;

    #[backend_test(backend)]
    async fn serves_public_key(client: Client, services: Services) {
        let response = client.get(uri!(public_key)).dispatch().await;
        assert_eq!(Status::Ok, response.status());

        let body = response.into_json::<PublicKeyResponse>().await.unwrap();
        assert_eq!(body.public_key, services.backend.public_key());
    }

    #[backend_test(backend)]
    async fn stores_forwarded_ballot(client: Client, services: Services) {
        let response = client
            .post(uri!(vote))
            .header(ContentType::JSON)
            .body(json!({ "encrypted_vote": "b3BhcXVl" }).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());

        let stored = services.backend.ballots().await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(
            stored[0].encrypted_vote,
            EncryptedBallot::from("b3BhcXVl".to_string())
        );
    }
}
