use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::repo_types::{User, UserRole};

/// Request body for patient registration.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub password: String,
    pub registration_method: String, // emirates_id, passport or manual
    pub date_of_birth: Option<String>, // YYYY-MM-DD
    pub gender: Option<String>,
    pub nationality: Option<String>,
    pub emirates_id: Option<String>,
    pub passport_number: Option<String>,
    pub height: Option<f64>, // cm
    pub weight: Option<f64>, // kg
    pub emirate: Option<String>,
    pub city: Option<String>,
    pub address: Option<String>,
    pub location_pin: Option<String>,
    pub medical_conditions: Option<String>,
}

/// Request body for OTP verification; exactly one identifier is expected.
#[derive(Debug, Deserialize)]
pub struct VerifyOtpRequest {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub otp: String,
}

/// Request body for re-sending an OTP.
#[derive(Debug, Deserialize)]
pub struct ResendOtpRequest {
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// Request body for login; `username` is an email or a phone number.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub remember_me: bool,
}

/// Request body for token refresh.
#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Request body for changing the password while logged in.
#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

/// Request body for starting a password reset.
#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

/// Request body for completing a password reset with the emailed code.
#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub email: String,
    pub otp: String,
    pub new_password: String,
}

/// Optional logout body; without it every session is revoked.
#[derive(Debug, Deserialize)]
pub struct LogoutRequest {
    pub refresh_token: String,
}

/// Access/refresh token pair issued to a client.
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String, // always "bearer"
    pub expires_in: i64,    // access token lifetime in seconds
}

/// Public view of a user account.
#[derive(Debug, Clone, Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub phone: Option<String>,
    pub full_name: String,
    pub role: UserRole,
    pub is_active: bool,
    pub is_verified: bool,
    pub email_verified: bool,
    pub phone_verified: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_login: Option<OffsetDateTime>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            phone: user.phone,
            full_name: user.full_name,
            role: user.role,
            is_active: user.is_active,
            is_verified: user.is_verified,
            email_verified: user.email_verified,
            phone_verified: user.phone_verified,
            created_at: user.created_at,
            last_login: user.last_login,
        }
    }
}

/// Response returned after registration.
#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub message: String,
    pub user_id: Uuid,
    pub email: String,
    pub otp_sent: bool,
}

/// Response returned after OTP verification.
#[derive(Debug, Serialize)]
pub struct OtpVerificationResponse {
    pub message: String,
    pub verified: bool,
    pub user: Option<UserResponse>,
    pub tokens: Option<TokenPair>,
}

/// Response returned after login.
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub message: String,
    pub user: UserResponse,
    pub tokens: TokenPair,
}

/// Generic success envelope.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
    pub status: String,
}

impl MessageResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: "success".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn register_request_optionals_default_to_none() {
        let payload = json!({
            "full_name": "Aisha Khan",
            "email": "aisha@example.com",
            "phone": "+971501234567",
            "password": "Str0ng!pass",
            "registration_method": "manual",
        });
        let req: RegisterRequest = serde_json::from_value(payload).expect("deserialize");
        assert_eq!(req.full_name, "Aisha Khan");
        assert!(req.emirates_id.is_none());
        assert!(req.date_of_birth.is_none());
        assert!(req.height.is_none());
    }

    #[test]
    fn login_request_remember_me_defaults_to_false() {
        let req: LoginRequest = serde_json::from_value(json!({
            "username": "aisha@example.com",
            "password": "Str0ng!pass",
        }))
        .expect("deserialize");
        assert!(!req.remember_me);
    }

    #[test]
    fn user_response_hides_nothing_it_should_show() {
        let now = OffsetDateTime::now_utc();
        let response = UserResponse {
            id: Uuid::new_v4(),
            email: "aisha@example.com".to_string(),
            phone: Some("+971501234567".to_string()),
            full_name: "Aisha Khan".to_string(),
            role: UserRole::Patient,
            is_active: true,
            is_verified: true,
            email_verified: true,
            phone_verified: false,
            created_at: now,
            last_login: None,
        };
        let value = serde_json::to_value(&response).expect("serialize");
        assert_eq!(value["email"], "aisha@example.com");
        assert_eq!(value["role"], "patient");
        assert_eq!(value["last_login"], serde_json::Value::Null);
        assert!(value.get("password_hash").is_none());
    }
}
