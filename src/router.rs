//! Dynamic dispatch: one catch-all handler for the whole `/api` surface.
//!
//! Pipeline per request: parse slug -> resolve collection (plural folding)
//! -> authenticate -> attach identity headers -> dispatch to the resource
//! operation or a registered sub-resource handler -> envelope. Nothing
//! escapes unformatted; a panic anywhere is converted to a 500 envelope.
//!
//! PUT and PATCH share partial-merge semantics: there is no full-replace
//! PUT. Kept for compatibility with existing clients of the protocol.

use axum::body::{to_bytes, Body};
use axum::extract::{Query, State};
use axum::http::{header, HeaderValue, Method, Request, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures_util::FutureExt;
use serde_json::Value;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;

use crate::auth;
use crate::engine::{ApiReply, RequestContext, USER_ID_HEADER, USER_ROLE_HEADER};
use crate::error::AppError;
use crate::response;
use crate::sessions;
use crate::state::AppState;
use crate::stats;

const ALLOWED_METHODS: &str = "GET, POST, PUT, PATCH, DELETE, OPTIONS";
const BODY_LIMIT: usize = 2 * 1024 * 1024;

/// Entry point for every `/api` request. The panic boundary lives here so
/// the router never surfaces a raw error to the client.
pub async fn dispatch(State(state): State<AppState>, req: Request<Body>) -> Response {
    match AssertUnwindSafe(handle(state, req)).catch_unwind().await {
        Ok(response) => response,
        Err(_) => {
            tracing::error!("handler panicked");
            let env = response::fail("Internal server error", 500, None);
            (StatusCode::INTERNAL_SERVER_ERROR, Json(env)).into_response()
        }
    }
}

fn fail_reply(err: AppError) -> ApiReply {
    (
        err.status_code(),
        Json(response::fail(
            &err.to_string(),
            err.status_code().as_u16(),
            err.details(),
        )),
    )
}

fn parse_query(uri: &Uri) -> HashMap<String, String> {
    Query::<HashMap<String, String>>::try_from_uri(uri)
        .map(|Query(params)| params)
        .unwrap_or_default()
}

/// Decode a URI path segment. Unlike query strings, `+` in a path is a
/// literal plus, so only `%XX` escapes are unfolded.
fn decode_path_segment(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%'
            && i + 2 < bytes.len()
            && bytes[i + 1].is_ascii_hexdigit()
            && bytes[i + 2].is_ascii_hexdigit()
        {
            if let Ok(byte) = u8::from_str_radix(&raw[i + 1..i + 3], 16) {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8(out).unwrap_or_else(|_| raw.to_string())
}

async fn handle(state: AppState, req: Request<Body>) -> Response {
    let method = req.method().clone();

    if method == Method::OPTIONS {
        return (
            StatusCode::NO_CONTENT,
            [
                (header::ALLOW, ALLOWED_METHODS),
                (header::ACCESS_CONTROL_ALLOW_METHODS, ALLOWED_METHODS),
                (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
                (
                    header::ACCESS_CONTROL_ALLOW_HEADERS,
                    "Content-Type, Authorization",
                ),
            ],
        )
            .into_response();
    }
    if method == Method::HEAD {
        return fail_reply(AppError::MethodNotAllowed("HEAD".into())).into_response();
    }

    // positional slug: /api/{collection}/{id}/{subResource}
    let path = req.uri().path().trim_start_matches("/api");
    let segments: Vec<String> = path
        .split('/')
        .filter(|s| !s.is_empty())
        .map(decode_path_segment)
        .collect();

    let Some(requested) = segments.first().cloned() else {
        return fail_reply(AppError::BadRequest("Collection name is required".into()))
            .into_response();
    };
    let id = segments.get(1).cloned();
    let sub_resource = segments.get(2).cloned();

    let query = parse_query(req.uri());
    let mut headers = req.headers().clone();
    // identity headers are set by this router only; never trust the client's
    headers.remove(USER_ID_HEADER);
    headers.remove(USER_ROLE_HEADER);
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    let body = if method == Method::POST || method == Method::PUT || method == Method::PATCH {
        match to_bytes(req.into_body(), BODY_LIMIT).await {
            Ok(bytes) if !bytes.is_empty() => serde_json::from_slice::<Value>(&bytes).ok(),
            _ => None,
        }
    } else {
        None
    };

    // collaborator slugs handled ahead of collection resolution
    if requested == "auth" {
        let mut ctx = RequestContext {
            headers: headers.clone(),
            query,
            body,
        };
        if method == Method::POST && id.as_deref() == Some("login") {
            return sessions::login(&state, &ctx).await.into_response();
        }
        if method == Method::POST && id.as_deref() == Some("logout") {
            return match auth::authenticate(&state.config, "session", authorization.as_deref()) {
                Ok(identity) => {
                    attach_identity(&mut ctx.headers, identity.as_ref());
                    sessions::logout(&state, &ctx).await.into_response()
                }
                Err(err) => fail_reply(err).into_response(),
            };
        }
        return fail_reply(AppError::NotFound(requested)).into_response();
    }
    if requested == "statistics" {
        if id.as_deref() != Some("owner-stats") || method != Method::GET {
            return fail_reply(AppError::NotFound(requested)).into_response();
        }
        return match auth::authenticate(&state.config, "statistics", authorization.as_deref()) {
            Ok(identity) => {
                let mut ctx = RequestContext {
                    headers,
                    query,
                    body,
                };
                attach_identity(&mut ctx.headers, identity.as_ref());
                stats::owner_stats(&state, &ctx).await.into_response()
            }
            Err(err) => fail_reply(err).into_response(),
        };
    }

    let Some(resource) = state.registry.resolve(&requested) else {
        return fail_reply(AppError::NotFound(format!(
            "Collection '{}' not found",
            requested
        )))
        .into_response();
    };

    let identity = match auth::authenticate(&state.config, &resource.name, authorization.as_deref())
    {
        Ok(identity) => identity,
        Err(err) => return fail_reply(err).into_response(),
    };
    attach_identity(&mut headers, identity.as_ref());

    let ctx = RequestContext {
        headers,
        query,
        body,
    };

    let store = match state.db.get().await {
        Ok(store) => store.clone(),
        Err(err) => return fail_reply(err).into_response(),
    };

    if let (Some(id), Some(sub)) = (id.as_deref(), sub_resource.as_deref()) {
        let Some(handler) = resource.sub_resources.get(sub) else {
            return fail_reply(AppError::NotFound(format!(
                "Sub-resource '{}' not found",
                sub
            )))
            .into_response();
        };
        return handler(&state, &ctx, &resource, id, &method).await.into_response();
    }

    let reply: ApiReply = if method == Method::GET {
        match id.as_deref() {
            None => resource.get_all(store.as_ref(), &ctx).await,
            Some(id) => resource.get_by_id(store.as_ref(), &ctx, id).await,
        }
    } else if method == Method::POST {
        match id {
            None => resource.create(store.as_ref(), &ctx).await,
            // creation never targets an existing id
            Some(_) => fail_reply(AppError::MethodNotAllowed(
                "POST with id is not allowed".into(),
            )),
        }
    } else if method == Method::PUT || method == Method::PATCH {
        // PUT and PATCH share partial-merge semantics
        match id.as_deref() {
            Some(id) => resource.update_by_id(store.as_ref(), &ctx, id).await,
            None => fail_reply(AppError::BadRequest("id is required".into())),
        }
    } else if method == Method::DELETE {
        match id.as_deref() {
            Some(id) => resource.delete_by_id(store.as_ref(), &ctx, id).await,
            None => fail_reply(AppError::BadRequest("id is required".into())),
        }
    } else {
        fail_reply(AppError::MethodNotAllowed(method.to_string()))
    };
    reply.into_response()
}

fn attach_identity(headers: &mut axum::http::HeaderMap, identity: Option<&auth::Identity>) {
    let Some(identity) = identity else {
        return;
    };
    if let Ok(v) = HeaderValue::from_str(&identity.id) {
        headers.insert(USER_ID_HEADER, v);
    }
    if let Some(role) = &identity.role {
        if let Ok(v) = HeaderValue::from_str(role) {
            headers.insert(USER_ROLE_HEADER, v);
        }
    }
}
