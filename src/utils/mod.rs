use bcrypt::{hash, verify};
use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::ValidationError;

/// 密码最短长度
pub const MIN_PASSWORD_LEN: usize = 6;

pub fn hash_password(password: &str, cost: u32) -> Result<String, bcrypt::BcryptError> {
    hash(password.as_bytes(), cost)
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool, bcrypt::BcryptError> {
    verify(password.as_bytes(), hash)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // 用户ID
    pub exp: i64,    // 过期时间
    pub iat: i64,    // 签发时间
    pub jti: String, // 会话ID
}

/// 生成会话令牌
pub fn generate_token(
    user_id: &str,
    secret: &str,
    ttl_secs: i64,
) -> Result<(String, i64), jsonwebtoken::errors::Error> {
    let now = Utc::now().timestamp();
    let expiration = now.saturating_add(ttl_secs);

    let claims = Claims {
        sub: user_id.to_string(),
        exp: expiration,
        iat: now,
        jti: Uuid::new_v4().to_string(),
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok((token, expiration))
}

pub fn verify_token(token: &str, secret: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;

    Ok(token_data.claims)
}

/// 由邮箱派生稳定的用户ID（28 位十六进制）
pub fn derive_user_id(email: &str) -> String {
    let digest = Sha256::digest(normalize_email(email).as_bytes());
    digest
        .iter()
        .take(14)
        .map(|b| format!("{:02x}", b))
        .collect()
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// 简单的邮箱格式检查：local@domain.tld
pub fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') || email.chars().any(char::is_whitespace) {
        return false;
    }
    match domain.rsplit_once('.') {
        Some((host, tld)) => !host.is_empty() && tld.len() >= 2,
        None => false,
    }
}

/// 校验登录表单
pub fn validate_credentials(email: &str, password: &str) -> Result<(), ValidationError> {
    let mut err = ValidationError::default();
    check_credentials(&mut err, email, password);
    err.into_result()
}

pub(crate) fn check_credentials(err: &mut ValidationError, email: &str, password: &str) {
    if email.trim().is_empty() {
        err.push("email", "is required");
    } else if !is_valid_email(email.trim()) {
        err.push("email", "is not a valid address");
    }

    if password.is_empty() {
        err.push("password", "is required");
    } else if password.chars().count() < MIN_PASSWORD_LEN {
        err.push("password", "must have at least 6 characters");
    }
}
