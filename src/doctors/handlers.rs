use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    doctors::{
        dto::{DoctorListItem, DoctorListResponse, DoctorQuery, SpecialtyResponse},
        repo::{self, Doctor},
    },
    error::ApiError,
    state::AppState,
};

// The directory is read only; doctor onboarding happens out of band.
pub fn doctor_routes() -> Router<AppState> {
    Router::new()
        .route("/doctors", get(search_doctors))
        .route("/doctors/specialties", get(list_specialties))
        .route("/doctors/:id", get(get_doctor))
}

#[instrument(skip(state))]
pub async fn search_doctors(
    State(state): State<AppState>,
    Query(query): Query<DoctorQuery>,
) -> Result<Json<DoctorListResponse>, ApiError> {
    let page = query.page.max(1);
    let limit = query.limit.clamp(1, 100);
    let (doctors, total) = repo::search(&state.db, &query, limit, (page - 1) * limit).await?;
    let doctors: Vec<DoctorListItem> = doctors.into_iter().map(DoctorListItem::from).collect();
    Ok(Json(DoctorListResponse {
        doctors,
        total,
        page,
        limit,
        total_pages: total_pages(total, limit),
    }))
}

#[instrument(skip(state))]
pub async fn list_specialties(
    State(state): State<AppState>,
) -> Result<Json<SpecialtyResponse>, ApiError> {
    let specialties = repo::specialties(&state.db).await?;
    Ok(Json(SpecialtyResponse { specialties }))
}

#[instrument(skip(state))]
pub async fn get_doctor(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Doctor>, ApiError> {
    let doctor = repo::find_by_id(&state.db, id)
        .await?
        .ok_or(ApiError::NotFound("Doctor not found"))?;
    Ok(Json(doctor))
}

fn total_pages(total: i64, limit: i64) -> i64 {
    if total == 0 {
        0
    } else {
        (total + limit - 1) / limit
    }
}
