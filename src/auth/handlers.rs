use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{debug, info, instrument, warn};

use crate::{
    auth::{
        dto::{
            ChangePasswordRequest, ForgotPasswordRequest, LoginRequest, LoginResponse,
            LogoutRequest, MessageResponse, OtpVerificationResponse, RefreshRequest,
            RegisterRequest, RegisterResponse, ResendOtpRequest, ResetPasswordRequest, TokenPair,
            UserResponse, VerifyOtpRequest,
        },
        jwt::{AuthUser, JwtKeys},
        otp::OtpPurpose,
        password::{hash_password, verify_password},
        repo_types::{NewUser, UserRole, VerifyChannel},
        validate::{
            check_password_strength, is_valid_email, is_valid_otp, normalize_emirates_id,
            normalize_uae_phone, parse_date_ymd,
        },
    },
    error::ApiError,
    patients::repo_types::{is_valid_gender, NewPatient},
    state::AppState,
};

const REGISTRATION_METHODS: [&str; 3] = ["emirates_id", "passport", "manual"];

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/verify-otp", post(verify_otp))
        .route("/auth/resend-otp", post(resend_otp))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/auth/change-password", post(change_password))
        .route("/auth/forgot-password", post(forgot_password))
        .route("/auth/reset-password", post(reset_password))
        .route("/auth/logout", post(logout))
        .route("/auth/me", get(me))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), ApiError> {
    let email = payload.email.trim().to_lowercase();
    if !is_valid_email(&email) {
        warn!(email = %email, "invalid email");
        return Err(ApiError::Validation("Invalid email format".to_string()));
    }
    let phone = normalize_uae_phone(&payload.phone).ok_or_else(|| {
        ApiError::Validation("Invalid UAE phone number format. Expected: +971 XX XXX XXXX".to_string())
    })?;
    check_password_strength(&payload.password, state.config.password_min_length)
        .map_err(ApiError::Validation)?;

    if !REGISTRATION_METHODS.contains(&payload.registration_method.as_str()) {
        return Err(ApiError::Validation(
            "Invalid registration method. Expected emirates_id, passport or manual".to_string(),
        ));
    }
    if payload.registration_method == "emirates_id" && payload.emirates_id.is_none() {
        return Err(ApiError::Validation(
            "Emirates ID is required for this registration method".to_string(),
        ));
    }
    if payload.registration_method == "passport" && payload.passport_number.is_none() {
        return Err(ApiError::Validation(
            "Passport number is required for this registration method".to_string(),
        ));
    }

    let emirates_id = match &payload.emirates_id {
        Some(raw) => Some(normalize_emirates_id(raw).ok_or_else(|| {
            ApiError::Validation(
                "Invalid Emirates ID format. Must be 15 digits starting with 784.".to_string(),
            )
        })?),
        None => None,
    };
    if let Some(gender) = &payload.gender {
        if !is_valid_gender(gender) {
            return Err(ApiError::Validation(
                "Gender must be Male, Female or Other".to_string(),
            ));
        }
    }
    let date_of_birth = match &payload.date_of_birth {
        Some(raw) => Some(parse_date_ymd(raw).ok_or_else(|| {
            ApiError::Validation("Invalid date of birth. Expected YYYY-MM-DD".to_string())
        })?),
        None => None,
    };

    // Friendly duplicate checks up front; the partial unique indexes still
    // back them up under concurrency.
    if state.users.find_by_email(&email).await?.is_some() {
        warn!(email = %email, "email already registered");
        return Err(ApiError::DuplicateEmail);
    }
    if state.users.find_by_login(&phone).await?.is_some() {
        warn!(phone = %phone, "phone already registered");
        return Err(ApiError::DuplicatePhone);
    }
    if let Some(eid) = &emirates_id {
        if state.patients.find_by_emirates_id(eid).await?.is_some() {
            warn!("emirates id already registered");
            return Err(ApiError::DuplicateEmiratesId);
        }
    }

    let password_hash = hash_password(&payload.password)?;
    let user = state
        .users
        .create(NewUser {
            email: email.clone(),
            phone: Some(phone),
            password_hash,
            full_name: payload.full_name.trim().to_string(),
            role: UserRole::Patient,
        })
        .await?;

    let new_patient = NewPatient {
        user_id: user.id,
        emirates_id,
        passport_number: payload.passport_number.clone(),
        date_of_birth,
        gender: payload.gender.clone(),
        nationality: payload.nationality.clone(),
        height: payload.height,
        weight: payload.weight,
        emirate: payload.emirate.clone(),
        city: payload.city.clone(),
        address: payload.address.clone(),
        location_pin: payload.location_pin.clone(),
        medical_conditions: payload.medical_conditions.clone(),
    };
    if let Err(e) = state.patients.create(new_patient).await {
        warn!(user_id = %user.id, error = %e, "patient profile creation failed, rolling back user");
        // A failed rollback strands a user row that still claims the
        // email and phone.
        if let Err(e) = state.users.soft_delete(user.id).await {
            warn!(user_id = %user.id, error = %e, "user rollback failed");
        }
        return Err(e.into());
    }

    let issued = state.otp.issue(OtpPurpose::VerifyAccount, &email).await;
    dispatch_otp(&state, &email, &issued.code);

    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: "Registration successful. Please verify your email with the OTP sent."
                .to_string(),
            user_id: user.id,
            email: user.email,
            otp_sent: true,
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn verify_otp(
    State(state): State<AppState>,
    Json(payload): Json<VerifyOtpRequest>,
) -> Result<Json<OtpVerificationResponse>, ApiError> {
    let identifier = contact_identifier(&payload.email, &payload.phone)?;
    if !is_valid_otp(&payload.otp) {
        warn!(identifier, "malformed otp");
        return Err(ApiError::Validation("OTP must be 6 digits".to_string()));
    }

    // The code is checked before the user lookup so probing codes cannot
    // distinguish registered identifiers from unknown ones.
    state
        .otp
        .verify(OtpPurpose::VerifyAccount, &identifier, &payload.otp)
        .await?;

    let user = state
        .users
        .find_by_login(&identifier)
        .await?
        .ok_or(ApiError::NotFound("User not found"))?;
    let channel = VerifyChannel::for_identifier(&identifier);
    state.users.mark_verified(user.id, channel).await?;

    let keys = JwtKeys::from_ref(&state);
    let tokens = keys.sign_pair(user.id, false)?;
    let user = state
        .users
        .find_by_id(user.id)
        .await?
        .ok_or(ApiError::NotFound("User not found"))?;

    info!(user_id = %user.id, channel = ?channel, "account verified");
    Ok(Json(OtpVerificationResponse {
        message: "Verification successful".to_string(),
        verified: true,
        user: Some(UserResponse::from(user)),
        tokens: Some(tokens),
    }))
}

#[instrument(skip(state, payload))]
pub async fn resend_otp(
    State(state): State<AppState>,
    Json(payload): Json<ResendOtpRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let identifier = contact_identifier(&payload.email, &payload.phone)?;
    let user = state
        .users
        .find_by_login(&identifier)
        .await?
        .ok_or(ApiError::NotFound("User not found"))?;
    if user.is_verified {
        warn!(user_id = %user.id, "resend requested for verified account");
        return Err(ApiError::Validation(
            "Account is already verified".to_string(),
        ));
    }

    let issued = state
        .otp
        .resend(OtpPurpose::VerifyAccount, &identifier)
        .await?;
    dispatch_otp(&state, &identifier, &issued.code);

    info!(user_id = %user.id, "otp re-sent");
    Ok(Json(MessageResponse::ok(format!(
        "OTP sent successfully to {identifier}"
    ))))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let identifier = if payload.username.contains('@') {
        payload.username.trim().to_lowercase()
    } else {
        normalize_uae_phone(&payload.username).unwrap_or_else(|| payload.username.trim().to_string())
    };

    let user = match state.users.find_by_login(&identifier).await? {
        Some(user) => user,
        None => {
            // Burn a hash so unknown identifiers cost the same as wrong
            // passwords.
            let _ = hash_password(&payload.password);
            warn!(identifier, "login for unknown identifier");
            return Err(ApiError::InvalidCredentials);
        }
    };
    if !verify_password(&payload.password, &user.password_hash)? {
        warn!(user_id = %user.id, "login with wrong password");
        return Err(ApiError::InvalidCredentials);
    }
    if !user.is_active {
        warn!(user_id = %user.id, "login for inactive account");
        return Err(ApiError::AccountInactive);
    }
    if !user.is_verified {
        warn!(user_id = %user.id, "login for unverified account");
        return Err(ApiError::AccountNotVerified);
    }

    state.users.record_login(user.id).await?;
    let user = state
        .users
        .find_by_id(user.id)
        .await?
        .ok_or(ApiError::InvalidCredentials)?;

    let keys = JwtKeys::from_ref(&state);
    let tokens = keys.sign_pair(user.id, payload.remember_me)?;

    info!(user_id = %user.id, remember = payload.remember_me, "user logged in");
    Ok(Json(LoginResponse {
        message: "Login successful".to_string(),
        user: UserResponse::from(user),
        tokens,
    }))
}

#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<TokenPair>, ApiError> {
    let keys = JwtKeys::from_ref(&state);
    let claims = keys
        .rotate_refresh(&state.revoked, &payload.refresh_token)
        .await?;

    let user = state
        .users
        .find_by_id(claims.sub)
        .await?
        .ok_or(ApiError::Unauthorized("User not found or inactive"))?;
    if !user.is_active {
        return Err(ApiError::Unauthorized("User not found or inactive"));
    }

    let tokens = keys.sign_pair(user.id, false)?;
    debug!(user_id = %user.id, "tokens refreshed");
    Ok(Json(tokens))
}

#[instrument(skip(state, payload))]
pub async fn change_password(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let user = state
        .users
        .find_by_id(user_id)
        .await?
        .ok_or(ApiError::Unauthorized("User not found or inactive"))?;
    if !verify_password(&payload.old_password, &user.password_hash)? {
        warn!(user_id = %user.id, "change password with wrong current password");
        return Err(ApiError::Unauthorized("Invalid current password"));
    }
    check_password_strength(&payload.new_password, state.config.password_min_length)
        .map_err(ApiError::Validation)?;

    let password_hash = hash_password(&payload.new_password)?;
    state.users.update_password(user.id, &password_hash).await?;
    // A changed password invalidates every session, this one included.
    state.revoked.revoke_all_for(user.id).await;

    info!(user_id = %user.id, "password changed");
    Ok(Json(MessageResponse::ok("Password changed successfully")))
}

#[instrument(skip(state, payload))]
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(payload): Json<ForgotPasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let email = payload.email.trim().to_lowercase();
    if !is_valid_email(&email) {
        return Err(ApiError::Validation("Invalid email format".to_string()));
    }

    if let Some(user) = state.users.find_by_email(&email).await? {
        match state.otp.resend(OtpPurpose::PasswordReset, &email).await {
            Ok(issued) => dispatch_otp(&state, &email, &issued.code),
            // The response must not reveal whether the account exists or
            // is throttled.
            Err(e) => debug!(user_id = %user.id, error = %e, "reset otp suppressed"),
        }
    }

    Ok(Json(MessageResponse::ok(
        "If the account exists, a reset code has been sent",
    )))
}

#[instrument(skip(state, payload))]
pub async fn reset_password(
    State(state): State<AppState>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let email = payload.email.trim().to_lowercase();
    if !is_valid_email(&email) {
        return Err(ApiError::Validation("Invalid email format".to_string()));
    }
    if !is_valid_otp(&payload.otp) {
        return Err(ApiError::Validation("OTP must be 6 digits".to_string()));
    }
    check_password_strength(&payload.new_password, state.config.password_min_length)
        .map_err(ApiError::Validation)?;

    state
        .otp
        .verify(OtpPurpose::PasswordReset, &email, &payload.otp)
        .await?;
    let user = state
        .users
        .find_by_email(&email)
        .await?
        .ok_or(ApiError::NotFound("User not found"))?;

    let password_hash = hash_password(&payload.new_password)?;
    state.users.update_password(user.id, &password_hash).await?;
    state.revoked.revoke_all_for(user.id).await;

    info!(user_id = %user.id, "password reset completed");
    Ok(Json(MessageResponse::ok("Password reset successfully")))
}

#[instrument(skip(state, payload))]
pub async fn logout(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    payload: Option<Json<LogoutRequest>>,
) -> Result<Json<MessageResponse>, ApiError> {
    let keys = JwtKeys::from_ref(&state);
    match payload {
        Some(Json(body)) => match keys.verify_refresh(&body.refresh_token) {
            Ok(claims) if claims.sub == user_id => {
                state.revoked.revoke_once(claims.jti, claims.exp as i64).await;
                debug!(user_id = %user_id, "refresh token revoked on logout");
            }
            // An unusable or foreign token gets the conservative treatment.
            _ => state.revoked.revoke_all_for(user_id).await,
        },
        None => state.revoked.revoke_all_for(user_id).await,
    }

    info!(user_id = %user_id, "user logged out");
    Ok(Json(MessageResponse::ok(
        "Logout successful. Please discard your tokens.",
    )))
}

#[instrument(skip(state))]
pub async fn me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<UserResponse>, ApiError> {
    let user = state
        .users
        .find_by_id(user_id)
        .await?
        .ok_or(ApiError::Unauthorized("User not found or inactive"))?;
    if !user.is_active {
        return Err(ApiError::Unauthorized("User not found or inactive"));
    }
    Ok(Json(UserResponse::from(user)))
}

/// Picks the contact identifier out of an email/phone pair and normalizes
/// it the same way registration does.
fn contact_identifier(
    email: &Option<String>,
    phone: &Option<String>,
) -> Result<String, ApiError> {
    if let Some(email) = email {
        let email = email.trim().to_lowercase();
        if !is_valid_email(&email) {
            return Err(ApiError::Validation("Invalid email format".to_string()));
        }
        return Ok(email);
    }
    if let Some(phone) = phone {
        return normalize_uae_phone(phone).ok_or_else(|| {
            ApiError::Validation(
                "Invalid UAE phone number format. Expected: +971 XX XXX XXXX".to_string(),
            )
        });
    }
    Err(ApiError::Validation(
        "Email or phone number required".to_string(),
    ))
}

/// Delivery is out of band; until a mail/SMS gateway is wired up the code
/// only reaches the logs, and only when `DEBUG` is set.
fn dispatch_otp(state: &AppState, identifier: &str, code: &str) {
    // TODO: hand off to the notification gateway once one exists
    if state.config.debug {
        info!(identifier, code, "otp ready for delivery");
    }
}
