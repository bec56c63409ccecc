//! Product review hooks: rating validation, average computation, and
//! denormalization of the product owner onto the review at write time.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::auth::Identity;
use crate::engine::ResourceHooks;
use crate::error::AppError;
use crate::query;
use crate::response::Operation;
use crate::store::{DocumentStore, FindOptions};

/// Average for a review with no rating entries. Intentional product
/// behavior, kept as-is; see the pinned test below.
const EMPTY_RATINGS_AVERAGE: f64 = 1.0;

pub struct ProductReviewHooks;

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

/// Mean of per-question ratings, rounded to one decimal. Every entry must
/// carry a numeric `rating` in [1,10].
fn average_rating(ratings: &[Value]) -> Result<f64, AppError> {
    if ratings.is_empty() {
        return Ok(EMPTY_RATINGS_AVERAGE);
    }
    let mut sum = 0.0;
    for entry in ratings {
        let rating = entry
            .get("rating")
            .and_then(Value::as_f64)
            .ok_or_else(|| AppError::Validation("each rating entry needs a numeric rating".into()))?;
        if !(1.0..=10.0).contains(&rating) {
            return Err(AppError::Validation("rating must be between 1 and 10".into()));
        }
        sum += rating;
    }
    Ok(round1(sum / ratings.len() as f64))
}

#[async_trait]
impl ResourceHooks for ProductReviewHooks {
    async fn pre_save(
        &self,
        store: &dyn DocumentStore,
        data: &mut Map<String, Value>,
        op: Operation,
        _user: Option<&Identity>,
    ) -> Result<(), AppError> {
        if !matches!(op, Operation::Create | Operation::Update) {
            return Ok(());
        }

        if let Some(raw) = data.get("ratings") {
            let entries = raw
                .as_array()
                .ok_or_else(|| AppError::Validation("ratings must be an array".into()))?;
            let average = average_rating(entries)?;
            data.insert(
                "average_rating".to_string(),
                serde_json::Number::from_f64(average)
                    .map(Value::Number)
                    .unwrap_or(Value::Null),
            );
        } else if op == Operation::Create {
            return Err(AppError::Validation("ratings are required".into()));
        }

        if op == Operation::Create {
            // best effort: the product lookup is not transactional with the write
            if let Some(product_id) = data.get("product_id").and_then(Value::as_str) {
                let filter = query::id_filter(product_id);
                if let Some(product) = store
                    .find_one("product", &filter, &FindOptions::default())
                    .await?
                {
                    for field in ["product_owner_id", "product_owner_name"] {
                        if let Some(v) = product.get(field) {
                            data.insert(field.to_string(), v.clone());
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn body(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    fn ratings(values: &[i64]) -> Value {
        Value::Array(
            values
                .iter()
                .map(|v| json!({"question_id": "q", "rating": v}))
                .collect(),
        )
    }

    #[tokio::test]
    async fn average_is_mean_rounded_to_one_decimal() {
        let store = MemoryStore::new();
        let mut data = body(json!({"ratings": ratings(&[3, 5, 7])}));
        ProductReviewHooks
            .pre_save(&store, &mut data, Operation::Create, None)
            .await
            .unwrap();
        assert_eq!(data["average_rating"], json!(5.0));

        let mut data = body(json!({"ratings": ratings(&[10])}));
        ProductReviewHooks
            .pre_save(&store, &mut data, Operation::Create, None)
            .await
            .unwrap();
        assert_eq!(data["average_rating"], json!(10.0));

        let mut data = body(json!({"ratings": ratings(&[3, 4])}));
        ProductReviewHooks
            .pre_save(&store, &mut data, Operation::Update, None)
            .await
            .unwrap();
        assert_eq!(data["average_rating"], json!(3.5));
    }

    #[tokio::test]
    async fn empty_rating_list_defaults_to_one() {
        // pinned: empty ratings store 1.0, not 0 and not a rejection
        let store = MemoryStore::new();
        let mut data = body(json!({"ratings": []}));
        ProductReviewHooks
            .pre_save(&store, &mut data, Operation::Create, None)
            .await
            .unwrap();
        assert_eq!(data["average_rating"], json!(1.0));
    }

    #[tokio::test]
    async fn out_of_range_rating_is_rejected() {
        let store = MemoryStore::new();
        for bad in [0, 11] {
            let mut data = body(json!({"ratings": ratings(&[bad])}));
            let err = ProductReviewHooks
                .pre_save(&store, &mut data, Operation::Create, None)
                .await
                .unwrap_err();
            assert!(err.to_string().contains("between 1 and 10"));
        }
    }

    #[tokio::test]
    async fn create_without_ratings_is_rejected() {
        let store = MemoryStore::new();
        let mut data = body(json!({"product_id": "p1"}));
        assert!(ProductReviewHooks
            .pre_save(&store, &mut data, Operation::Create, None)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn owner_is_denormalized_from_the_product() {
        let store = MemoryStore::new();
        store
            .seed(
                "product",
                vec![json!({
                    "_id": "64f1a2b3c4d5e6f708192a3b",
                    "name": "Phone",
                    "product_owner_id": "o1",
                    "product_owner_name": "Owner"
                })],
            )
            .await;
        let mut data = body(json!({
            "product_id": "64f1a2b3c4d5e6f708192a3b",
            "ratings": ratings(&[5])
        }));
        ProductReviewHooks
            .pre_save(&store, &mut data, Operation::Create, None)
            .await
            .unwrap();
        assert_eq!(data["product_owner_id"], "o1");
        assert_eq!(data["product_owner_name"], "Owner");
    }

    #[tokio::test]
    async fn missing_product_is_tolerated() {
        let store = MemoryStore::new();
        let mut data = body(json!({"product_id": "nope", "ratings": ratings(&[5])}));
        ProductReviewHooks
            .pre_save(&store, &mut data, Operation::Create, None)
            .await
            .unwrap();
        assert!(data.get("product_owner_id").is_none());
    }
}
