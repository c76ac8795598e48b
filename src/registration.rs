use tracing::{error, info};

use crate::auth::IdentityProvider;
use crate::error::{AppError, ValidationError};
use crate::models::{UserId, UserRecord};
use crate::store::RecordStore;
use crate::utils::{check_credentials, normalize_email};

/// 注册表单，字段均为用户输入的原始文本
#[derive(Debug, Clone, Default)]
pub struct RegistrationForm {
    pub name: String,
    pub surname: String,
    pub email: String,
    pub password: String,
    pub id_number: String,
    pub latitude: String,
    pub longitude: String,
    /// 已编码的头像
    pub profile_image: Option<String>,
}

impl RegistrationForm {
    /// 校验表单，一次性报告所有问题
    ///
    /// # Errors
    ///
    /// 任一字段不合法时返回汇总的校验错误。
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut err = ValidationError::default();

        if self.name.trim().is_empty() {
            err.push("name", "is required");
        }
        if self.surname.trim().is_empty() {
            err.push("surname", "is required");
        }
        check_credentials(&mut err, &self.email, &self.password);
        if self.id_number.trim().is_empty() {
            err.push("id_number", "is required");
        } else if self.id_number.trim().parse::<i64>().is_err() {
            err.push("id_number", "must be a whole number");
        }

        err.into_result()
    }

    /// 生成初始记录：不可用状态，坐标解析失败时为 0
    pub fn to_record(&self) -> UserRecord {
        let coordinate = |text: &str| text.trim().parse::<f64>().unwrap_or(0.0);
        UserRecord {
            name: self.name.trim().to_owned(),
            surname: self.surname.trim().to_owned(),
            id_number: self.id_number.trim().parse().unwrap_or(0),
            email: normalize_email(&self.email),
            profile_image: self.profile_image.clone().unwrap_or_default(),
            latitude: coordinate(&self.latitude),
            longitude: coordinate(&self.longitude),
            available: false,
        }
    }
}

/// 注册新用户：校验表单、创建账号、写入初始记录
///
/// # Errors
///
/// 表单不合法或账号创建失败时返回 [`AppError::Validation`] / [`AppError::Auth`]；
/// 记录写入失败时返回 [`AppError::Store`]，此时账号已经创建。
pub async fn register(
    identity: &dyn IdentityProvider,
    store: &dyn RecordStore,
    form: &RegistrationForm,
) -> Result<UserId, AppError> {
    form.validate()?;

    let user_id = identity.create_account(&form.email, &form.password).await?;
    let record = form.to_record();

    if let Err(e) = store.put_record(&user_id, &record).await {
        error!(user_id = %user_id, error = %e, "failed to store user record");
        return Err(e.into());
    }

    info!(user_id = %user_id, "user registered");
    Ok(user_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_form() -> RegistrationForm {
        RegistrationForm {
            name: "Ana".into(),
            surname: "Gomez".into(),
            email: "ana@example.com".into(),
            password: "secret1".into(),
            id_number: "1020".into(),
            latitude: "4.6".into(),
            longitude: "".into(),
            profile_image: None,
        }
    }

    #[test]
    fn valid_form_passes() {
        assert!(valid_form().validate().is_ok());
    }

    #[test]
    fn every_problem_is_reported() {
        let form = RegistrationForm {
            email: "ana".into(),
            password: "123".into(),
            id_number: "12a".into(),
            ..Default::default()
        };

        let err = form.validate().unwrap_err();
        for field in ["name", "surname", "email", "password", "id_number"] {
            assert!(err.has(field), "missing problem for {field}");
        }
    }

    #[test]
    fn record_starts_unavailable_with_lenient_coordinates() {
        let record = valid_form().to_record();
        assert!(!record.available);
        assert_eq!(record.id_number, 1020);
        assert_eq!(record.latitude, 4.6);
        assert_eq!(record.longitude, 0.0);
        assert_eq!(record.profile_image, "");
    }
}
