//! Built-in entities: role, user, product, product-review. Each supplies
//! its collection name, label, and searchable fields; user and
//! product-review add hook strategies, product adds the public feedback
//! sub-resource.

pub mod product;
pub mod product_review;
pub mod user;

use crate::engine::Resource;
use std::sync::Arc;

pub fn role() -> Resource {
    Resource::new("role", "Role", &["name"])
}

pub fn user() -> Resource {
    Resource::new("user", "User", &["name", "email"]).with_hooks(Arc::new(user::UserHooks))
}

pub fn product() -> Resource {
    Resource::new("product", "Product", &["name", "description"])
        .with_sub_resource("feedback", product::handle_feedback)
}

pub fn product_review() -> Resource {
    Resource::new("product-review", "Product Review", &["comment"])
        .with_hooks(Arc::new(product_review::ProductReviewHooks))
}
