use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::{
        jwt::AuthUser,
        repo_types::{User, UserRole},
        validate::{normalize_emirates_id, parse_date_ymd},
    },
    error::ApiError,
    patients::{
        dto::{
            EmiratesIdCheckResponse, ProfileCompletionResponse, UpdatePatientRequest,
            VerifyEmiratesIdRequest,
        },
        repo_types::{is_valid_gender, Patient},
    },
    state::AppState,
};

pub fn patient_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/patients/me",
            get(get_my_profile)
                .put(update_my_profile)
                .delete(delete_my_account),
        )
        .route("/patients/me/profile-completion", get(profile_completion))
        .route("/patients/verify-emirates-id", post(verify_emirates_id))
        .route("/patients/:id", get(get_patient))
}

#[instrument(skip(state))]
pub async fn get_my_profile(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<Patient>, ApiError> {
    let (_, patient) = require_patient(&state, user_id).await?;
    Ok(Json(patient))
}

#[instrument(skip(state, payload))]
pub async fn update_my_profile(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<UpdatePatientRequest>,
) -> Result<Json<Patient>, ApiError> {
    let (_, mut patient) = require_patient(&state, user_id).await?;
    apply_update(&mut patient, payload)?;
    patient.profile_completion = patient.calculate_profile_completion();
    let saved = state.patients.save(&patient).await?;
    info!(
        patient_id = %saved.id,
        completion = saved.profile_completion,
        "profile updated"
    );
    Ok(Json(saved))
}

#[instrument(skip(state))]
pub async fn profile_completion(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<ProfileCompletionResponse>, ApiError> {
    let (_, patient) = require_patient(&state, user_id).await?;
    Ok(Json(ProfileCompletionResponse {
        percentage: patient.calculate_profile_completion(),
        missing_fields: patient.missing_fields(),
    }))
}

/// Soft-deletes the profile and the account behind it and kills every
/// outstanding session.
#[instrument(skip(state))]
pub async fn delete_my_account(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<StatusCode, ApiError> {
    let (user, _) = require_patient(&state, user_id).await?;
    state.patients.soft_delete_by_user(user.id).await?;
    state.users.soft_delete(user.id).await?;
    state.revoked.revoke_all_for(user.id).await;
    info!(user_id = %user.id, "account deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Pre-registration availability check, so the signup form can flag a
/// taken Emirates ID before submitting. Unauthenticated on purpose.
#[instrument(skip(state, payload))]
pub async fn verify_emirates_id(
    State(state): State<AppState>,
    Json(payload): Json<VerifyEmiratesIdRequest>,
) -> Result<Json<EmiratesIdCheckResponse>, ApiError> {
    let emirates_id = normalize_emirates_id(&payload.emirates_id).ok_or_else(|| {
        ApiError::Validation(
            "Invalid Emirates ID format. Must be 15 digits starting with 784.".to_string(),
        )
    })?;
    let exists = state
        .patients
        .find_by_emirates_id(&emirates_id)
        .await?
        .is_some();
    let message = if exists {
        "This Emirates ID is already registered"
    } else {
        "Emirates ID is available for registration"
    };
    Ok(Json(EmiratesIdCheckResponse {
        available: !exists,
        exists,
        message: message.to_string(),
    }))
}

#[instrument(skip(state))]
pub async fn get_patient(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Patient>, ApiError> {
    let (_, own) = require_patient(&state, user_id).await?;
    if own.id != id {
        warn!(requested = %id, "cross-profile access blocked");
        return Err(ApiError::Forbidden("You can only view your own profile"));
    }
    Ok(Json(own))
}

/// Resolves the caller to an active patient account with a live profile.
async fn require_patient(
    state: &AppState,
    user_id: Uuid,
) -> Result<(User, Patient), ApiError> {
    let user = state
        .users
        .find_by_id(user_id)
        .await?
        .ok_or(ApiError::Unauthorized("User not found or inactive"))?;
    if !user.is_active {
        return Err(ApiError::Unauthorized("User not found or inactive"));
    }
    if user.role != UserRole::Patient {
        return Err(ApiError::Forbidden("Access forbidden: Patient role required"));
    }
    let patient = state
        .patients
        .find_by_user(user.id)
        .await?
        .ok_or(ApiError::NotFound("Patient profile not found"))?;
    Ok((user, patient))
}

fn apply_update(patient: &mut Patient, update: UpdatePatientRequest) -> Result<(), ApiError> {
    if let Some(raw) = &update.date_of_birth {
        let date = parse_date_ymd(raw).ok_or_else(|| {
            ApiError::Validation("Invalid date of birth. Expected YYYY-MM-DD".to_string())
        })?;
        patient.date_of_birth = Some(date);
    }
    if let Some(gender) = update.gender {
        if !is_valid_gender(&gender) {
            return Err(ApiError::Validation(
                "Gender must be Male, Female or Other".to_string(),
            ));
        }
        patient.gender = Some(gender);
    }
    if let Some(height) = update.height {
        if !(0.0..=300.0).contains(&height) {
            return Err(ApiError::Validation(
                "Height must be between 0 and 300 cm".to_string(),
            ));
        }
        patient.height = Some(height);
    }
    if let Some(weight) = update.weight {
        if !(0.0..=500.0).contains(&weight) {
            return Err(ApiError::Validation(
                "Weight must be between 0 and 500 kg".to_string(),
            ));
        }
        patient.weight = Some(weight);
    }
    if let Some(coordinates) = update.coordinates {
        patient.coordinates = Some(coordinates);
    }
    assign_trimmed(&mut patient.nationality, update.nationality);
    assign_trimmed(&mut patient.blood_group, update.blood_group);
    assign_trimmed(&mut patient.emirate, update.emirate);
    assign_trimmed(&mut patient.city, update.city);
    assign_trimmed(&mut patient.address, update.address);
    assign_trimmed(&mut patient.location_pin, update.location_pin);
    assign_trimmed(&mut patient.medical_conditions, update.medical_conditions);
    assign_trimmed(&mut patient.allergies, update.allergies);
    assign_trimmed(&mut patient.medications, update.medications);
    assign_trimmed(
        &mut patient.emergency_contact_name,
        update.emergency_contact_name,
    );
    assign_trimmed(
        &mut patient.emergency_contact_phone,
        update.emergency_contact_phone,
    );
    Ok(())
}

fn assign_trimmed(slot: &mut Option<String>, value: Option<String>) {
    if let Some(value) = value {
        *slot = Some(value.trim().to_string());
    }
}
