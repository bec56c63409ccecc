//! Token issuance and revocation. Collaborators of the dynamic API rather
//! than registered collections: `POST /api/auth/login` verifies a hashed
//! credential and returns a bearer token pair, recording a session;
//! `POST /api/auth/logout` marks the session's logout timestamp.

use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde_json::{json, Map, Value};

use crate::auth;
use crate::engine::{ApiReply, RequestContext};
use crate::error::AppError;
use crate::response;
use crate::state::AppState;
use crate::store::FindOptions;

pub const SESSION_COLLECTION: &str = "session";

fn reply(result: Result<(StatusCode, response::Envelope), AppError>) -> ApiReply {
    match result {
        Ok((status, envelope)) => (status, Json(envelope)),
        Err(err) => (
            err.status_code(),
            Json(response::fail(
                &err.to_string(),
                err.status_code().as_u16(),
                err.details(),
            )),
        ),
    }
}

pub async fn login(state: &AppState, ctx: &RequestContext) -> ApiReply {
    reply(try_login(state, ctx).await)
}

async fn try_login(
    state: &AppState,
    ctx: &RequestContext,
) -> Result<(StatusCode, response::Envelope), AppError> {
    let body = match &ctx.body {
        Some(Value::Object(m)) => m,
        _ => return Err(AppError::BadRequest("body must be a JSON object".into())),
    };
    let password = body
        .get("password")
        .and_then(Value::as_str)
        .ok_or_else(|| AppError::BadRequest("password is required".into()))?;

    let mut filter = Map::new();
    if let Some(email) = body.get("email").and_then(Value::as_str) {
        filter.insert("email".into(), json!(email));
    } else if let Some(user_id) = body.get("user_id").and_then(Value::as_str) {
        filter.insert("user_id".into(), json!(user_id));
    } else {
        return Err(AppError::BadRequest("email or user_id is required".into()));
    }

    let store = state.db.get().await?;
    let user = store
        .find_one("user", &filter, &FindOptions::default())
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid credentials".into()))?;
    let hashed = user
        .get("password")
        .and_then(Value::as_str)
        .ok_or_else(|| AppError::Unauthorized("Invalid credentials".into()))?;
    if !auth::verify_password(password, hashed) {
        tracing::warn!("failed login attempt");
        return Err(AppError::Unauthorized("Invalid credentials".into()));
    }

    let tokens = auth::issue_tokens(&state.config, &user)?;
    let session = json!({
        "user_id": user["_id"],
        "refresh_token": tokens.refresh_token,
        "logged_in_at": Utc::now().to_rfc3339(),
        "logged_out_at": Value::Null,
    });
    let session = store
        .insert_one(SESSION_COLLECTION, session.as_object().cloned().unwrap_or_default())
        .await?;

    let data = json!({
        "access_token": tokens.access_token,
        "refresh_token": tokens.refresh_token,
        "token_type": tokens.token_type,
        "expires_in": tokens.expires_in,
        "session_id": session["_id"],
    });
    Ok((
        StatusCode::OK,
        response::success_with_message(data, 200, "Login Successful".into()),
    ))
}

pub async fn logout(state: &AppState, ctx: &RequestContext) -> ApiReply {
    reply(try_logout(state, ctx).await)
}

async fn try_logout(
    state: &AppState,
    ctx: &RequestContext,
) -> Result<(StatusCode, response::Envelope), AppError> {
    let identity = ctx
        .identity()
        .ok_or_else(|| AppError::Unauthorized("No token provided".into()))?;
    let store = state.db.get().await?;
    let mut filter = Map::new();
    filter.insert("user_id".into(), json!(identity.id));
    filter.insert("logged_out_at".into(), Value::Null);
    let mut changes = Map::new();
    changes.insert("logged_out_at".into(), json!(Utc::now().to_rfc3339()));
    let session = store
        .update_one(SESSION_COLLECTION, &filter, &changes)
        .await?
        .ok_or_else(|| AppError::NotFound("session".into()))?;
    Ok((
        StatusCode::OK,
        response::success_with_message(session, 200, "Logout Successful".into()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::engine::{USER_ID_HEADER, USER_ROLE_HEADER};
    use crate::registry::Registry;
    use crate::store::{LazyConnection, MemoryStore};
    use std::sync::Arc;

    async fn state_with_user() -> AppState {
        let store = MemoryStore::new();
        store
            .seed(
                "user",
                vec![json!({
                    "_id": "64f1a2b3c4d5e6f708192a3b",
                    "user_id": "U1",
                    "email": "a@x.com",
                    "name": "A",
                    "role_id": "user",
                    "password": auth::hash_password("secret").unwrap(),
                })],
            )
            .await;
        AppState {
            db: Arc::new(LazyConnection::connected(Arc::new(store))),
            registry: Arc::new(Registry::with_defaults()),
            config: Arc::new(AppConfig::new("secret-key", vec![])),
        }
    }

    fn body_ctx(v: Value) -> RequestContext {
        RequestContext {
            body: Some(v),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn login_returns_bearer_pair_and_records_session() {
        let state = state_with_user().await;
        let (status, body) = login(
            &state,
            &body_ctx(json!({"email": "a@x.com", "password": "secret"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let grant = &body.0.data[0];
        assert_eq!(grant["token_type"], "Bearer");
        assert!(grant["access_token"].as_str().unwrap().contains('.'));

        let store = state.db.get().await.unwrap();
        let sessions = store
            .find(SESSION_COLLECTION, &Map::new(), &FindOptions::default())
            .await
            .unwrap();
        assert_eq!(sessions.len(), 1);
        assert!(sessions[0]["logged_out_at"].is_null());
    }

    #[tokio::test]
    async fn login_by_user_id_works() {
        let state = state_with_user().await;
        let (status, _) = login(
            &state,
            &body_ctx(json!({"user_id": "U1", "password": "secret"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn wrong_password_is_401_with_empty_data() {
        let state = state_with_user().await;
        let (status, body) = login(
            &state,
            &body_ctx(json!({"email": "a@x.com", "password": "nope"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body.0.status, "FAIL");
        assert!(body.0.data.is_empty());
    }

    #[tokio::test]
    async fn logout_marks_the_session() {
        let state = state_with_user().await;
        login(
            &state,
            &body_ctx(json!({"email": "a@x.com", "password": "secret"})),
        )
        .await;
        let mut ctx = RequestContext::default();
        ctx.headers
            .insert(USER_ID_HEADER, "64f1a2b3c4d5e6f708192a3b".parse().unwrap());
        ctx.headers.insert(USER_ROLE_HEADER, "user".parse().unwrap());
        let (status, body) = logout(&state, &ctx).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.0.data[0]["logged_out_at"].is_string());
    }
}
