use std::sync::Arc;

use rocket::{get, post, routes, serde::json::Json, Route, State};

use crate::{
    error::{Error, Result},
    model::{
        api::AuthResponse,
        auth::{AuthCore, Identity},
        token::{KeyBinding, VotingToken},
    },
};

pub fn routes() -> Vec<Route> {
    routes![login, binding]
}

#[post("/login", data = "<identity>", format = "json")]
pub async fn login(
    identity: Json<Identity>,
    auth: &State<Arc<AuthCore>>,
) -> Result<Json<AuthResponse>> {
    let issued = auth.authenticate(identity.into_inner()).await?;
    Ok(Json(AuthResponse::issued(issued.token, issued.fresh)))
}

/// Read side for the intermediary: which key must sign this token's ballot.
#[get("/bindings/<token>")]
pub async fn binding(
    token: VotingToken,
    auth: &State<Arc<AuthCore>>,
) -> Result<Json<KeyBinding>> {
    auth.binding(token)
        .await?
        .map(Json)
        .ok_or_else(|| Error::NotFound(format!("No voter with token {token}")))
}

#[cfg(test)]
mod tests {
    use rocket::{
        http::{ContentType, Status},
        local::asynchronous::Client,
        serde::json::serde_json::{self, json},
        uri,
    };

    use crate::{
        config::Role,
        model::{
            api::{ALREADY_REGISTERED, REGISTERED},
            auth::ReauthPolicy,
            crypto::SignerKeys,
        },
        testing::Services,
    };

    use super::*;

    async fn login_as(
        client: &Client,
        external_id: &str,
        keys: &SignerKeys,
    ) -> (Status, AuthResponse) {
        let response = client
            .post(uri!(login))
            .header(ContentType::JSON)
            .body(json!(Identity::example(external_id, keys)).to_string())
            .dispatch()
            .await;
        let status = response.status();
        let body = response.into_json::<AuthResponse>().await.unwrap();
        (status, body)
    }

    #[backend_test(auth)]
    async fn login_issues_token(client: Client, services: Services) {
        let keys = SignerKeys::generate();
        let (status, body) = login_as(&client, "ID-1", &keys).await;

        assert_eq!(Status::Ok, status);
        assert_eq!(body.message, REGISTERED);
        let token = body.voter_token.unwrap();

        let bound = services.auth.binding(token).await.unwrap().unwrap();
        assert_eq!(bound.fingerprint, keys.fingerprint());
    }

    #[backend_test(auth)]
    async fn repeat_login_returns_same_token(client: Client) {
        let keys = SignerKeys::generate();
        let (_, first) = login_as(&client, "ID-1", &keys).await;
        let (status, second) = login_as(&client, "ID-1", &keys).await;

        assert_eq!(Status::Ok, status);
        assert_eq!(second.message, ALREADY_REGISTERED);
        assert_eq!(first.voter_token, second.voter_token);
    }

    #[rocket::async_test]
    async fn repeat_login_rejected_under_reject_policy() {
        crate::testing::init_logging();
        let services = Services::with_policy(ReauthPolicy::Reject);
        let client = services.client(Role::Auth).await;
        let keys = SignerKeys::generate();

        let (status, _) = login_as(&client, "ID-1", &keys).await;
        assert_eq!(Status::Ok, status);

        let (status, body) = login_as(&client, "ID-1", &keys).await;
        assert_eq!(Status::Conflict, status);
        assert_eq!(body.voter_token, None);
    }

    #[backend_test(auth)]
    async fn bad_identity_rejected(client: Client) {
        let keys = SignerKeys::generate();
        let (status, body) = login_as(&client, "63963937392", &keys).await;

        assert_eq!(Status::BadRequest, status);
        assert_eq!(body.voter_token, None);
        assert!(body.message.starts_with("identity rejected"));
    }

    #[backend_test(auth)]
    async fn malformed_login_rejected(client: Client) {
        let response = client
            .post(uri!(login))
            .header(ContentType::JSON)
            .body(r#"{"external_id": "ID-1"}"#)
            .dispatch()
            .await;
        assert_eq!(Status::UnprocessableEntity, response.status());
    }

    #[backend_test(auth)]
    async fn binding_lookup(client: Client) {
        let keys = SignerKeys::generate();
        let (_, body) = login_as(&client, "ID-1", &keys).await;
        let token = body.voter_token.unwrap();

        let response = client.get(uri!(binding(token))).dispatch().await;
        assert_eq!(Status::Ok, response.status());
        let raw = response.into_string().await.unwrap();
        let fetched = serde_json::from_str::<KeyBinding>(&raw).unwrap();
        assert_eq!(fetched.token, token);
        assert_eq!(fetched.fingerprint, keys.fingerprint());

        let response = client
            .get(uri!(binding(VotingToken::from(1))))
            .dispatch()
            .await;
        assert_eq!(Status::NotFound, response.status());
    }
}
