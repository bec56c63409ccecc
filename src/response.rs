//! Uniform response envelope. Every endpoint, success or failure, returns
//! this shape with the HTTP status mirrored in `status_code`. `data` is
//! always an array, even for single-entity results; callers index `[0]`.

use serde::Serialize;
use serde_json::Value;

use crate::error::AppError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    GetAll,
    GetById,
    Create,
    Update,
    Delete,
}

impl Operation {
    pub fn label(&self) -> &'static str {
        match self {
            Operation::GetAll => "GET_ALL",
            Operation::GetById => "GET_BY_ID",
            Operation::Create => "CREATE",
            Operation::Update => "UPDATE",
            Operation::Delete => "DELETE",
        }
    }

    fn success_phrase(&self, collection: &str) -> String {
        match self {
            Operation::GetAll => format!("{} Collection Fetched Successfully", collection),
            Operation::GetById => format!("{} Fetched Successfully", collection),
            Operation::Create => format!("{} Created Successfully", collection),
            Operation::Update => format!("{} Updated Successfully", collection),
            Operation::Delete => format!("{} Deleted Successfully", collection),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct PageInfo {
    pub current_page: u64,
    pub page_count: u64,
    pub total_record_count: u64,
    pub limit: u64,
}

impl PageInfo {
    /// Pagination block for `total` records split into pages of `limit`.
    pub fn new(current_page: u64, limit: u64, total: u64) -> Self {
        PageInfo {
            current_page,
            page_count: total.div_ceil(limit),
            total_record_count: total,
            limit,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Envelope {
    pub status: &'static str,
    pub status_code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub data: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_record_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<PageInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_details: Option<Vec<String>>,
}

fn wrap(data: Value) -> Vec<Value> {
    match data {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        single => vec![single],
    }
}

/// Success envelope with a synthesized operation message.
pub fn success(data: Value, status_code: u16, op: Operation, collection: &str) -> Envelope {
    success_with_message(data, status_code, op.success_phrase(collection))
}

/// Success envelope with an explicit message.
pub fn success_with_message(data: Value, status_code: u16, message: String) -> Envelope {
    let data = wrap(data);
    Envelope {
        status: "SUCCESS",
        status_code,
        message: Some(message),
        error: None,
        total_record_count: Some(data.len() as u64),
        data,
        pagination: None,
        error_details: None,
    }
}

/// Success envelope for a paginated page: the pagination block is attached
/// verbatim and carries the total count instead of the top-level field.
pub fn success_paginated(
    data: Value,
    status_code: u16,
    op: Operation,
    collection: &str,
    pagination: PageInfo,
) -> Envelope {
    Envelope {
        status: "SUCCESS",
        status_code,
        message: Some(op.success_phrase(collection)),
        error: None,
        data: wrap(data),
        total_record_count: None,
        pagination: Some(pagination),
        error_details: None,
    }
}

/// Fail envelope with a raw message.
pub fn fail(message: &str, status_code: u16, details: Option<&[String]>) -> Envelope {
    Envelope {
        status: "FAIL",
        status_code,
        message: None,
        error: Some(message.to_string()),
        data: Vec::new(),
        total_record_count: None,
        pagination: None,
        error_details: details.map(|d| d.to_vec()),
    }
}

/// Fail envelope scoped to an operation and collection. Uniqueness and
/// schema-validation failures get their fixed specializations.
pub fn operation_failed(err: &AppError, op: Operation, collection: &str) -> Envelope {
    let base = format!(
        "{} {} Failed",
        collection,
        op.label().replace('_', " ")
    );
    let message = match err {
        AppError::Duplicate(_) => format!("{}: Duplicate entry found", base),
        AppError::Validation(_) | AppError::ValidationDetails(_) => {
            format!("{}: Validation error", base)
        }
        _ => base,
    };
    fail(&message, err.status_code().as_u16(), err.details())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn single_result_is_wrapped_in_array() {
        let env = success(json!({"a": 1}), 200, Operation::GetById, "Product");
        assert_eq!(env.data.len(), 1);
        assert_eq!(env.data[0]["a"], 1);
        assert_eq!(env.total_record_count, Some(1));
    }

    #[test]
    fn array_result_is_kept_flat() {
        let env = success(json!([{"a": 1}, {"a": 2}]), 200, Operation::GetAll, "Product");
        assert_eq!(env.data.len(), 2);
        assert_eq!(env.total_record_count, Some(2));
        assert_eq!(
            env.message.as_deref(),
            Some("Product Collection Fetched Successfully")
        );
    }

    #[test]
    fn page_count_rounds_up() {
        let p = PageInfo::new(3, 10, 23);
        assert_eq!(p.page_count, 3);
        assert_eq!(p.total_record_count, 23);
    }

    #[test]
    fn fail_always_has_empty_data() {
        let env = fail("nope", 401, None);
        assert_eq!(env.status, "FAIL");
        assert!(env.data.is_empty());
        assert_eq!(env.error.as_deref(), Some("nope"));
    }

    #[test]
    fn duplicate_failure_is_specialized() {
        let err = AppError::Duplicate("email".into());
        let env = operation_failed(&err, Operation::Create, "User");
        assert_eq!(
            env.error.as_deref(),
            Some("User CREATE Failed: Duplicate entry found")
        );
        assert_eq!(env.status_code, 400);
    }

    #[test]
    fn validation_details_are_flattened() {
        let err = AppError::ValidationDetails(vec!["name is required".into()]);
        let env = operation_failed(&err, Operation::Update, "Role");
        assert_eq!(env.error_details.as_deref(), Some(&["name is required".to_string()][..]));
    }
}
