//! Product sub-resources. `feedback` is the public submission flow: GET
//! returns the product's review questions for the feedback form, POST files
//! a review for the product through the product-review controller so its
//! hooks (rating validation, owner denormalization) run.

use axum::http::{Method, StatusCode};
use axum::Json;
use futures_util::future::BoxFuture;
use serde_json::{json, Value};

use crate::engine::{ApiReply, RequestContext, Resource};
use crate::error::AppError;
use crate::query;
use crate::response::{self, Operation};
use crate::state::AppState;
use crate::store::FindOptions;

pub fn handle_feedback<'a>(
    state: &'a AppState,
    ctx: &'a RequestContext,
    resource: &'a Resource,
    id: &'a str,
    method: &'a Method,
) -> BoxFuture<'a, ApiReply> {
    Box::pin(async move {
        if *method == Method::GET {
            questions(state, resource, id).await
        } else if *method == Method::POST {
            submit(state, ctx, id).await
        } else {
            let err = AppError::MethodNotAllowed(method.to_string());
            (
                err.status_code(),
                Json(response::fail(&err.to_string(), err.status_code().as_u16(), None)),
            )
        }
    })
}

async fn questions(state: &AppState, resource: &Resource, id: &str) -> ApiReply {
    let result: Result<Value, AppError> = async {
        let store = state.db.get().await?;
        let filter = query::id_filter(id);
        let options = FindOptions {
            select: Some(vec!["name".into(), "description".into(), "questions".into()]),
            ..Default::default()
        };
        store
            .find_one(&resource.name, &filter, &options)
            .await?
            .ok_or_else(|| AppError::NotFound(resource.name.clone()))
    }
    .await;
    match result {
        Ok(product) => (
            StatusCode::OK,
            Json(response::success_with_message(
                product,
                200,
                "Product Feedback Questions Fetched Successfully".into(),
            )),
        ),
        Err(err) => (
            err.status_code(),
            Json(response::operation_failed(&err, Operation::GetById, "Product Feedback")),
        ),
    }
}

async fn submit(state: &AppState, ctx: &RequestContext, id: &str) -> ApiReply {
    let review = match state.registry.get("product-review") {
        Some(r) => r,
        None => {
            let err = AppError::NotFound("product-review".into());
            return (
                err.status_code(),
                Json(response::operation_failed(&err, Operation::Create, "Product Feedback")),
            );
        }
    };
    let store = match state.db.get().await {
        Ok(s) => s.clone(),
        Err(err) => {
            return (
                err.status_code(),
                Json(response::operation_failed(&err, Operation::Create, "Product Feedback")),
            )
        }
    };
    // the submitted review always targets the product in the path
    let mut ctx = ctx.clone();
    let mut body = match ctx.body.take() {
        Some(Value::Object(m)) => m,
        _ => {
            let err = AppError::BadRequest("body must be a JSON object".into());
            return (
                err.status_code(),
                Json(response::operation_failed(&err, Operation::Create, "Product Feedback")),
            );
        }
    };
    body.insert("product_id".to_string(), json!(id));
    ctx.body = Some(Value::Object(body));
    review.create(store.as_ref(), &ctx).await
}
