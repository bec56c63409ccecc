//! User entity hooks: credential hashing on write, scrubbing on read.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::auth::{hash_password, Identity};
use crate::engine::ResourceHooks;
use crate::error::AppError;
use crate::response::Operation;
use crate::store::DocumentStore;

pub struct UserHooks;

#[async_trait]
impl ResourceHooks for UserHooks {
    async fn pre_save(
        &self,
        _store: &dyn DocumentStore,
        data: &mut Map<String, Value>,
        op: Operation,
        _user: Option<&Identity>,
    ) -> Result<(), AppError> {
        if op == Operation::Create {
            let mut missing = Vec::new();
            for field in ["email", "password"] {
                let present = data
                    .get(field)
                    .and_then(Value::as_str)
                    .map(|s| !s.is_empty())
                    .unwrap_or(false);
                if !present {
                    missing.push(format!("{} is required", field));
                }
            }
            if !missing.is_empty() {
                return Err(AppError::ValidationDetails(missing));
            }
        }
        // plaintext never reaches storage
        if let Some(Value::String(plain)) = data.get("password").cloned() {
            data.insert("password".to_string(), Value::String(hash_password(&plain)?));
        }
        Ok(())
    }

    async fn post_save(
        &self,
        _store: &dyn DocumentStore,
        doc: &mut Value,
        _op: Operation,
        _user: Option<&Identity>,
    ) -> Result<(), AppError> {
        if let Some(obj) = doc.as_object_mut() {
            obj.remove("password");
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

    #[tokio::test]
    async fn password_is_hashed_before_storage() {
        let store = MemoryStore::new();
        let mut data = body(json!({"email": "a@x.com", "password": "secret"}));
        UserHooks
            .pre_save(&store, &mut data, Operation::Create, None)
            .await
            .unwrap();
        let stored = data["password"].as_str().unwrap();
        assert_ne!(stored, "secret");
        assert!(crate::auth::verify_password("secret", stored));
    }

    #[tokio::test]
    async fn create_requires_email_and_password() {
        let store = MemoryStore::new();
        let mut data = body(json!({"name": "A"}));
        let err = UserHooks
            .pre_save(&store, &mut data, Operation::Create, None)
            .await
            .unwrap_err();
        let details = err.details().unwrap();
        assert_eq!(details.len(), 2);
    }

    #[tokio::test]
    async fn update_without_password_leaves_it_alone() {
        let store = MemoryStore::new();
        let mut data = body(json!({"name": "B"}));
        UserHooks
            .pre_save(&store, &mut data, Operation::Update, None)
            .await
            .unwrap();
        assert!(data.get("password").is_none());
    }

    #[tokio::test]
    async fn responses_are_scrubbed() {
        let store = MemoryStore::new();
        let mut doc = json!({"_id": "x", "email": "a@x.com", "password": "hash"});
        UserHooks
            .post_save(&store, &mut doc, Operation::Create, None)
            .await
            .unwrap();
        assert!(doc.get("password").is_none());
    }
}
