use rocket::{get, post, routes, serde::json::Json, Route, State};

use crate::{
    error::Result,
    model::{
        api::{InitResponse, MessageResponse, VOTE_ACCEPTED, VOTE_FOUND, VOTE_NOT_FOUND},
        intermediary::IntermediaryCore,
        submission::Submission,
        token::VotingToken,
    },
};

pub fn routes() -> Vec<Route> {
    routes![init, vote, validate]
}

/// Everything a voter needs before authenticating.
#[get("/init")]
pub fn init(discovery: &State<InitResponse>) -> Json<InitResponse> {
    Json(discovery.inner().clone())
}

#[post("/vote", data = "<submission>", format = "json")]
pub async fn vote(
    submission: Json<Submission>,
    intermediary: &State<IntermediaryCore>,
) -> Result<Json<MessageResponse>> {
    // Delivery carries on in the background; its outcome is logged there.
    let _ = intermediary.submit(&submission).await?;
    Ok(Json(MessageResponse::new(VOTE_ACCEPTED)))
}

#[get("/validate/<token>")]
pub async fn validate(
    token: VotingToken,
    intermediary: &State<IntermediaryCore>,
) -> Result<Json<MessageResponse>> {
    let message = if intermediary.status(token).await? {
        VOTE_FOUND
    } else {
        VOTE_NOT_FOUND
    };
    Ok(Json(MessageResponse::new(message)))
}

#[cfg(test)]
mod tests {
    use rocket::{
        http::{ContentType, Status},
        local::asynchronous::Client,
        serde::json::serde_json::json,
        uri,
    };

    use crate::{
        model::{
            auth::Identity,
            ballot::{present_options, BallotOption},
            client::Voter,
        },
        testing::Services,
    };

    use super::*;

    async fn register(services: &Services, voter: &Voter, external_id: &str) -> VotingToken {
        services
            .auth
            .authenticate(voter.identity(external_id))
            .await
            .unwrap()
            .token
    }

    async fn post_vote(client: &Client, submission: &Submission) -> (Status, MessageResponse) {
        let response = client
            .post(uri!(vote))
            .header(ContentType::JSON)
            .body(json!(submission).to_string())
            .dispatch()
            .await;
        let status = response.status();
        (status, response.into_json().await.unwrap())
    }

    #[backend_test(intermediary)]
    async fn init_advertises_auth_and_backend(client: Client, services: Services) {
        let response = client.get(uri!(init)).dispatch().await;
        assert_eq!(Status::Ok, response.status());

        let body = response.into_json::<InitResponse>().await.unwrap();
        assert_eq!(body.backend_key, services.backend.public_key());
        assert_eq!(body.auth_server.port, 7878);
        assert_eq!(
            present_options(&body.parties)[0],
            BallotOption::new("Bob", "Green")
        );
    }

    #[backend_test(intermediary)]
    async fn vote_scenario(client: Client, services: Services) {
        let voter = Voter::generate();
        let token = register(&services, &voter, "ID-1").await;
        let backend_key = services.backend.public_key();

        let submission = voter
            .cast(token, Some(BallotOption::new("Alice", "Red")), &backend_key)
            .unwrap();
        let (status, body) = post_vote(&client, &submission).await;
        assert_eq!(Status::Ok, status);
        assert_eq!(body.message, VOTE_ACCEPTED);
        services.wait_for_ballots(1).await;

        // Replay.
        let (status, body) = post_vote(&client, &submission).await;
        assert_eq!(Status::Conflict, status);
        assert_eq!(body.message, "Vote already recorded.");

        // Another registered voter's token, signed with a foreign key.
        let victim = Voter::generate();
        let victim_token = register(&services, &victim, "ID-2").await;
        let forged = voter.cast(victim_token, None, &backend_key).unwrap();
        let (status, body) = post_vote(&client, &forged).await;
        assert_eq!(Status::Forbidden, status);
        assert_eq!(body.message, "Not allowed: invalid signature");

        assert_eq!(services.backend.ballot_count().await.unwrap(), 1);
    }

    #[backend_test(intermediary)]
    async fn unknown_token_rejected(client: Client, services: Services) {
        let voter = Voter::generate();
        let token = VotingToken::from(424242);
        let submission = voter
            .cast(token, None, &services.backend.public_key())
            .unwrap();

        let (status, body) = post_vote(&client, &submission).await;
        assert_eq!(Status::NotFound, status);
        assert_eq!(body.message, "Not allowed: unknown voter token");

        // Still unspent.
        let response = client.get(uri!(validate(token))).dispatch().await;
        let body = response.into_json::<MessageResponse>().await.unwrap();
        assert_eq!(body.message, VOTE_NOT_FOUND);
    }

    #[backend_test(intermediary)]
    async fn validate_reports_spent_tokens(client: Client, services: Services) {
        let voter = Voter::generate();
        let token = register(&services, &voter, "ID-1").await;

        let response = client.get(uri!(validate(token))).dispatch().await;
        assert_eq!(Status::Ok, response.status());
        let body = response.into_json::<MessageResponse>().await.unwrap();
        assert_eq!(body.message, VOTE_NOT_FOUND);

        let submission = voter
            .cast(token, None, &services.backend.public_key())
            .unwrap();
        let (status, _) = post_vote(&client, &submission).await;
        assert_eq!(Status::Ok, status);

        let response = client.get(uri!(validate(token))).dispatch().await;
        let body = response.into_json::<MessageResponse>().await.unwrap();
        assert_eq!(body.message, VOTE_FOUND);
    }

    #[backend_test(intermediary)]
    async fn malformed_submission_rejected(client: Client) {
        let response = client
            .post(uri!(vote))
            .header(ContentType::JSON)
            .body(json!({ "vote_id": "not a number", "plain": "x", "signed": "y" }).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::UnprocessableEntity, response.status());
    }

    #[backend_test(intermediary)]
    async fn one_identity_one_vote(client: Client, services: Services) {
        let voter = Voter::generate();
        let identity: Identity = voter.identity("BE-63963937392");

        // Logging in again yields the same token, so the second ballot is a duplicate.
        let first = services.auth.authenticate(identity.clone()).await.unwrap();
        let second = services.auth.authenticate(identity).await.unwrap();
        assert_eq!(first.token, second.token);

        let key = services.backend.public_key();
        let (status, _) = post_vote(&client, &voter.cast(first.token, None, &key).unwrap()).await;
        assert_eq!(Status::Ok, status);
        let (status, _) = post_vote(&client, &voter.cast(second.token, None, &key).unwrap()).await;
        assert_eq!(Status::Conflict, status);
    }
}
