//! Owner statistics: aggregates a product owner's catalogue into a summary
//! for the dashboard collaborator. `GET /api/statistics/owner-stats`.

use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Map, Value};

use crate::engine::{ApiReply, RequestContext};
use crate::error::AppError;
use crate::response;
use crate::state::AppState;
use crate::store::FindOptions;

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

pub async fn owner_stats(state: &AppState, ctx: &RequestContext) -> ApiReply {
    match try_owner_stats(state, ctx).await {
        Ok(envelope) => (StatusCode::OK, Json(envelope)),
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

async fn try_owner_stats(
    state: &AppState,
    ctx: &RequestContext,
) -> Result<response::Envelope, AppError> {
    let owner_id = ctx
        .query
        .get("product_owner_id")
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::BadRequest("product_owner_id is required".into()))?;

    let store = state.db.get().await?;
    let mut filter = Map::new();
    filter.insert("product_owner_id".into(), json!(owner_id));

    let options = FindOptions::default();
    let (products, review_count) = tokio::join!(
        store.find("product", &filter, &options),
        store.count("product-review", &filter)
    );
    let (products, review_count) = (products?, review_count?);

    let rated: Vec<f64> = products
        .iter()
        .filter_map(|p| p.get("average_rating").and_then(Value::as_f64))
        .collect();
    let average_rating = if rated.is_empty() {
        0.0
    } else {
        round1(rated.iter().sum::<f64>() / rated.len() as f64)
    };

    let data = json!({
        "summary": {
            "product_count": products.len(),
            "average_rating": average_rating,
            "review_count": review_count,
        },
        "products": products,
    });
    Ok(response::success_with_message(
        data,
        200,
        "Owner Statistics Fetched Successfully".into(),
    ))
}
