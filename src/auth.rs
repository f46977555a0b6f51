//! Registration and OTP account activation.
//!
//! A registration creates an inactive user plus a `pending_verifications`
//! row keyed by a fresh nonce; the six-digit code travels by mail. No
//! pending state lives in a session.

use chrono::Utc;
use rand::Rng;
use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::config::Config;
use crate::domain::{PendingVerification, User};
use crate::error::{is_unique_violation, Result, StoreError};
use crate::notify::{Notification, Notifier};

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 3, max = 255))]
    pub username: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1, max = 255))]
    pub first_name: String,
    #[validate(length(min = 1, max = 255))]
    pub last_name: String,
    #[validate(length(min = 1))]
    pub default_address: String,
    #[validate(custom = "validate_phone")]
    pub default_phone_number: String,
}

/// Ten digits, leading zero.
fn validate_phone(value: &str) -> std::result::Result<(), ValidationError> {
    let ok = value.len() == 10
        && value.starts_with('0')
        && value.chars().all(|c| c.is_ascii_digit());
    if ok {
        Ok(())
    } else {
        Err(ValidationError::new("phone_number"))
    }
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub nonce: Uuid,
    pub code: String,
}

/// Creates the inactive account and mails out the verification code.
/// Returns the nonce the client must present together with the code.
pub async fn register(
    db: &PgPool,
    config: &Config,
    notifier: &Notifier,
    req: &RegisterRequest,
) -> Result<Uuid> {
    req.validate()?;

    let user = sqlx::query_as::<_, User>(
        "INSERT INTO users (id, username, email, first_name, last_name,
                            default_address, default_phone_number, is_active)
         VALUES ($1, $2, $3, $4, $5, $6, $7, FALSE) RETURNING *",
    )
    .bind(Uuid::now_v7())
    .bind(&req.username)
    .bind(&req.email)
    .bind(&req.first_name)
    .bind(&req.last_name)
    .bind(&req.default_address)
    .bind(&req.default_phone_number)
    .fetch_one(db)
    .await
    .map_err(|err| {
        if is_unique_violation(&err) {
            StoreError::Validation("username or email is already taken".into())
        } else {
            err.into()
        }
    })?;

    let code = format!("{:06}", rand::thread_rng().gen_range(0..1_000_000));
    let nonce = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO pending_verifications (nonce, user_id, code, expires_at)
         VALUES ($1, $2, $3, $4)",
    )
    .bind(nonce)
    .bind(user.id)
    .bind(&code)
    .bind(Utc::now() + config.otp_ttl)
    .execute(db)
    .await?;

    notifier
        .send(Notification::VerificationCode {
            user_id: user.id,
            email: user.email.clone(),
            code,
        })
        .await;

    Ok(nonce)
}

/// Activates the account when the code matches and has not expired.
/// Expired records are removed so the nonce cannot be retried forever.
pub async fn verify(db: &PgPool, req: &VerifyRequest) -> Result<()> {
    let mut tx = db.begin().await?;
    let pending = sqlx::query_as::<_, PendingVerification>(
        "SELECT * FROM pending_verifications WHERE nonce = $1 FOR UPDATE",
    )
    .bind(req.nonce)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(StoreError::NotFound("verification"))?;

    if pending.is_expired(Utc::now()) {
        sqlx::query("DELETE FROM pending_verifications WHERE nonce = $1")
            .bind(pending.nonce)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        return Err(StoreError::Validation(
            "verification code has expired, please register again".into(),
        ));
    }
    if pending.code != req.code {
        return Err(StoreError::Validation("invalid verification code".into()));
    }

    sqlx::query("UPDATE users SET is_active = TRUE, updated_at = NOW() WHERE id = $1")
        .bind(pending.user_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM pending_verifications WHERE nonce = $1")
        .bind(pending.nonce)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn phone_numbers_must_be_ten_digits_starting_with_zero() {
        assert!(validate_phone("0123456789").is_ok());
        assert!(validate_phone("1234567890").is_err());
        assert!(validate_phone("012345678").is_err());
        assert!(validate_phone("01234567890").is_err());
        assert!(validate_phone("0a23456789").is_err());
    }

    #[test]
    fn pending_verification_expiry() {
        let now = Utc::now();
        let pending = PendingVerification {
            nonce: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            code: "123456".into(),
            expires_at: now + Duration::minutes(3),
            created_at: now,
        };
        assert!(!pending.is_expired(now));
        assert!(!pending.is_expired(now + Duration::minutes(3)));
        assert!(pending.is_expired(now + Duration::minutes(4)));
    }

    #[test]
    fn register_payload_validation() {
        let valid = RegisterRequest {
            username: "testuser".into(),
            email: "testuser@example.com".into(),
            first_name: "Test".into(),
            last_name: "User".into(),
            default_address: "Hà Nội".into(),
            default_phone_number: "0123456789".into(),
        };
        assert!(valid.validate().is_ok());

        let bad_phone = RegisterRequest {
            default_phone_number: "999".into(),
            ..valid
        };
        assert!(bad_phone.validate().is_err());
    }
}
