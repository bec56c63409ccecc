//! Bearer-token authentication and the public-collection policy.
//!
//! Per request: `NoToken -> TokenPresent -> {Valid, Expired, Malformed} ->
//! {Authorized, Rejected}`. Public collections skip the machine entirely.
//! Identity is derived once from the verified token and never re-checked
//! downstream; the router hands it to controllers as request headers.

use chrono::Utc;
use jsonwebtoken::{decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::AppConfig;
use crate::error::AppError;

/// The minimal identity a verified token yields.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

/// Token payload: a nested `user` object plus standard expiry.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub user: UserClaim,
    pub exp: u64,
    pub iat: u64,
    #[serde(default)]
    pub token_type: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserClaim {
    pub _id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub role_name: Option<String>,
}

impl From<UserClaim> for Identity {
    fn from(u: UserClaim) -> Self {
        Identity {
            id: u._id,
            email: u.email,
            name: u.name,
            role: u.role_name,
        }
    }
}

fn strip_bearer(header: &str) -> &str {
    let trimmed = header.trim();
    if trimmed.len() >= 7 && trimmed[..7].eq_ignore_ascii_case("bearer ") {
        trimmed[7..].trim()
    } else {
        trimmed
    }
}

/// Verify a raw `Authorization` header value against the shared secret and
/// project the payload's `user` object into an [`Identity`].
pub fn verify_token(config: &AppConfig, header: &str) -> Result<Identity, AppError> {
    let token = strip_bearer(header);
    if token.is_empty() {
        return Err(AppError::Unauthorized("No token provided".into()));
    }
    let key = DecodingKey::from_secret(config.jwt_secret.as_bytes());
    let data = decode::<Claims>(token, &key, &Validation::default()).map_err(|err| {
        let message = match err.kind() {
            ErrorKind::ExpiredSignature => "Token expired",
            ErrorKind::InvalidToken
            | ErrorKind::InvalidSignature
            | ErrorKind::Base64(_)
            | ErrorKind::Json(_)
            | ErrorKind::Utf8(_) => "Invalid token format",
            _ => "Invalid token",
        };
        AppError::Unauthorized(message.into())
    })?;
    Ok(data.claims.user.into())
}

/// Authenticate a request against a collection's public/private policy.
/// `Ok(None)` means the collection is public and carries no identity;
/// `Ok(Some(_))` is a verified caller.
pub fn authenticate(
    config: &AppConfig,
    collection: &str,
    authorization: Option<&str>,
) -> Result<Option<Identity>, AppError> {
    if config.is_public(collection) {
        return Ok(None);
    }
    let header = authorization
        .filter(|h| !h.trim().is_empty())
        .ok_or_else(|| AppError::Unauthorized("No token provided".into()))?;
    verify_token(config, header).map(Some)
}

/// Issued token pair, as returned by the login collaborator endpoint.
#[derive(Debug, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    pub expires_in: u64,
}

/// Mint an access/refresh token pair for a stored user document.
pub fn issue_tokens(config: &AppConfig, user: &Value) -> Result<TokenPair, AppError> {
    let now = Utc::now().timestamp() as u64;
    let claim = UserClaim {
        _id: user
            .get("_id")
            .and_then(Value::as_str)
            .ok_or_else(|| AppError::Internal("user document missing _id".into()))?
            .to_string(),
        email: user.get("email").and_then(Value::as_str).map(String::from),
        name: user.get("name").and_then(Value::as_str).map(String::from),
        role_name: user
            .get("role_id")
            .and_then(Value::as_str)
            .map(String::from),
    };
    let key = EncodingKey::from_secret(config.jwt_secret.as_bytes());
    let mint = |ttl: u64, token_type: &str| -> Result<String, AppError> {
        let claims = Claims {
            user: UserClaim {
                _id: claim._id.clone(),
                email: claim.email.clone(),
                name: claim.name.clone(),
                role_name: claim.role_name.clone(),
            },
            exp: now + ttl,
            iat: now,
            token_type: Some(token_type.into()),
        };
        encode(&Header::default(), &claims, &key)
            .map_err(|e| AppError::Internal(format!("token encoding: {}", e)))
    };
    Ok(TokenPair {
        access_token: mint(config.access_token_ttl_secs, "access")?,
        refresh_token: mint(config.refresh_token_ttl_secs, "refresh")?,
        token_type: "Bearer",
        expires_in: config.access_token_ttl_secs,
    })
}

pub fn hash_password(plain: &str) -> Result<String, AppError> {
    bcrypt::hash(plain, bcrypt::DEFAULT_COST)
        .map_err(|e| AppError::Internal(format!("password hashing: {}", e)))
}

pub fn verify_password(plain: &str, hashed: &str) -> bool {
    bcrypt::verify(plain, hashed).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config() -> AppConfig {
        AppConfig::new("test-secret", vec!["product".into()])
    }

    fn user_doc() -> Value {
        json!({
            "_id": "64f1a2b3c4d5e6f708192a3b",
            "email": "a@x.com",
            "name": "A",
            "role_id": "admin"
        })
    }

    #[test]
    fn public_collection_skips_authentication() {
        let outcome = authenticate(&config(), "product", None).unwrap();
        assert!(outcome.is_none());
    }

    #[test]
    fn missing_header_is_rejected() {
        let err = authenticate(&config(), "user", None).unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn issued_token_verifies_and_projects_identity() {
        let cfg = config();
        let pair = issue_tokens(&cfg, &user_doc()).unwrap();
        assert_eq!(pair.token_type, "Bearer");
        let header = format!("Bearer {}", pair.access_token);
        let identity = authenticate(&cfg, "user", Some(&header)).unwrap().unwrap();
        assert_eq!(identity.id, "64f1a2b3c4d5e6f708192a3b");
        assert_eq!(identity.role.as_deref(), Some("admin"));
    }

    #[test]
    fn garbage_token_is_a_format_error() {
        let err = verify_token(&config(), "Bearer not.a.token").unwrap_err();
        assert!(err.to_string().contains("Invalid token format"));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let cfg = config();
        let pair = issue_tokens(&cfg, &user_doc()).unwrap();
        let other = AppConfig::new("other-secret", vec![]);
        assert!(verify_token(&other, &pair.access_token).is_err());
    }

    #[test]
    fn bearer_prefix_is_optional_and_case_insensitive() {
        let cfg = config();
        let pair = issue_tokens(&cfg, &user_doc()).unwrap();
        assert!(verify_token(&cfg, &format!("BEARER {}", pair.access_token)).is_ok());
        assert!(verify_token(&cfg, &pair.access_token).is_ok());
    }

    #[test]
    fn password_hash_round_trip() {
        let hashed = hash_password("secret").unwrap();
        assert_ne!(hashed, "secret");
        assert!(verify_password("secret", &hashed));
        assert!(!verify_password("wrong", &hashed));
    }
}
