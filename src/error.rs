use std::fmt;

use thiserror::Error;

use crate::config::ConfigError;
use crate::models::PoiError;

/// 身份认证错误，直接反馈给用户，不重试
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("email already registered: {0}")]
    EmailTaken(String),
    #[error(transparent)]
    InvalidInput(#[from] ValidationError),
    #[error("no user is signed in")]
    NotSignedIn,
    #[error("session token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
    #[error("password hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),
}

/// 共享记录存储错误；写入时出现即为写入失败，只记录日志
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

/// 实时订阅错误；订阅不会自动重建
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeedError {
    #[error("subscription cancelled: {0}")]
    Cancelled(String),
    #[error("subscriber lagged behind by {0} events")]
    Lagged(u64),
    #[error("feed transport error: {0}")]
    Transport(String),
}

/// 单个字段的校验问题
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldProblem {
    pub field: &'static str,
    pub message: &'static str,
}

/// 表单校验错误，汇总所有字段问题
#[derive(Debug, Clone, PartialEq, Eq, Default, Error)]
pub struct ValidationError {
    pub problems: Vec<FieldProblem>,
}

impl ValidationError {
    pub fn push(&mut self, field: &'static str, message: &'static str) {
        self.problems.push(FieldProblem { field, message });
    }

    pub fn has(&self, field: &str) -> bool {
        self.problems.iter().any(|p| p.field == field)
    }

    /// 没有问题时返回 Ok
    pub fn into_result(self) -> Result<(), ValidationError> {
        if self.problems.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid input")?;
        for (i, problem) in self.problems.iter().enumerate() {
            let sep = if i == 0 { ": " } else { "; " };
            write!(f, "{}{} {}", sep, problem.field, problem.message)?;
        }
        Ok(())
    }
}

/// 应用级错误
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Feed(#[from] FeedError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    PointsOfInterest(#[from] PoiError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_lists_every_problem() {
        let mut err = ValidationError::default();
        err.push("email", "is not a valid address");
        err.push("password", "must have at least 6 characters");

        assert!(err.has("email"));
        assert!(!err.has("name"));
        assert_eq!(
            err.to_string(),
            "invalid input: email is not a valid address; password must have at least 6 characters"
        );
    }

    #[test]
    fn empty_validation_is_ok() {
        assert!(ValidationError::default().into_result().is_ok());
    }
}
