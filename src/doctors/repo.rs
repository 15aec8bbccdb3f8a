use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::doctors::dto::DoctorQuery;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "doctor_status", rename_all = "snake_case")]
pub enum DoctorStatus {
    Active,
    Inactive,
    OnLeave,
    Suspended,
}

/// Directory row joined with the owning user for the display name.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Doctor {
    pub id: Uuid,
    pub user_id: Uuid,
    pub full_name: String,
    pub specialty: String,
    pub sub_specialty: Option<String>,
    pub license_number: String,
    pub years_of_experience: Option<i32>,
    pub qualifications: Option<Vec<String>>,
    pub medical_school: Option<String>,
    pub hospital_affiliation: Option<String>,
    pub clinic_name: Option<String>,
    pub clinic_address: Option<String>,
    pub location: Option<String>,
    pub coordinates: Option<serde_json::Value>,
    pub consultation_fee: f64,
    pub consultation_types: Option<Vec<String>>,
    pub languages: Option<Vec<String>>,
    pub rating: f64,
    pub total_reviews: i32,
    pub total_consultations: i32,
    pub is_accepting_patients: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub next_available_slot: Option<OffsetDateTime>,
    pub working_hours: Option<serde_json::Value>,
    pub bio: Option<String>,
    pub specialization_description: Option<String>,
    pub avatar_url: Option<String>,
    pub profile_images: Option<Vec<String>>,
    pub status: DoctorStatus,
    pub verified: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

const DOCTOR_COLUMNS: &str = "d.id, d.user_id, u.full_name, d.specialty, d.sub_specialty, \
     d.license_number, d.years_of_experience, d.qualifications, d.medical_school, \
     d.hospital_affiliation, d.clinic_name, d.clinic_address, d.location, d.coordinates, \
     d.consultation_fee, d.consultation_types, d.languages, d.rating, d.total_reviews, \
     d.total_consultations, d.is_accepting_patients, d.next_available_slot, d.working_hours, \
     d.bio, d.specialization_description, d.avatar_url, d.profile_images, d.status, \
     d.verified, d.created_at, d.updated_at";

// Only live, active, admin-verified doctors are listed. Each filter
// collapses to TRUE when its bind is NULL.
const SEARCH_FILTER: &str = "d.deleted_at IS NULL \
     AND d.status = 'active' \
     AND d.verified \
     AND ($1::text IS NULL OR d.specialty ILIKE $1) \
     AND ($2::text IS NULL OR u.full_name ILIKE $2 OR d.specialty ILIKE $2) \
     AND ($3::text IS NULL OR d.location ILIKE $3) \
     AND ($4::float8 IS NULL OR d.rating >= $4) \
     AND ($5::float8 IS NULL OR d.consultation_fee <= $5) \
     AND ($6::text IS NULL OR $6 = ANY(d.consultation_types)) \
     AND ($7::text IS NULL OR $7 = ANY(d.languages))";

pub async fn search(
    db: &PgPool,
    filters: &DoctorQuery,
    limit: i64,
    offset: i64,
) -> anyhow::Result<(Vec<Doctor>, i64)> {
    let specialty = filters.specialty.as_deref().map(like_pattern);
    let name_or_specialty = filters.search.as_deref().map(like_pattern);
    let location = filters.location.as_deref().map(like_pattern);

    let doctors = sqlx::query_as::<_, Doctor>(&format!(
        "SELECT {DOCTOR_COLUMNS} \
         FROM doctors d \
         JOIN users u ON u.id = d.user_id AND u.deleted_at IS NULL \
         WHERE {SEARCH_FILTER} \
         ORDER BY d.rating DESC \
         LIMIT $8 OFFSET $9"
    ))
    .bind(&specialty)
    .bind(&name_or_specialty)
    .bind(&location)
    .bind(filters.min_rating)
    .bind(filters.max_fee)
    .bind(&filters.consultation_type)
    .bind(&filters.language)
    .bind(limit)
    .bind(offset)
    .fetch_all(db)
    .await?;

    let total = sqlx::query_scalar::<_, i64>(&format!(
        "SELECT count(*) \
         FROM doctors d \
         JOIN users u ON u.id = d.user_id AND u.deleted_at IS NULL \
         WHERE {SEARCH_FILTER}"
    ))
    .bind(&specialty)
    .bind(&name_or_specialty)
    .bind(&location)
    .bind(filters.min_rating)
    .bind(filters.max_fee)
    .bind(&filters.consultation_type)
    .bind(&filters.language)
    .fetch_one(db)
    .await?;

    Ok((doctors, total))
}

pub async fn specialties(db: &PgPool) -> anyhow::Result<Vec<String>> {
    let rows = sqlx::query_scalar::<_, String>(
        "SELECT DISTINCT specialty FROM doctors \
         WHERE deleted_at IS NULL AND status = 'active' \
         ORDER BY specialty",
    )
    .fetch_all(db)
    .await?;
    Ok(rows)
}

pub async fn find_by_id(db: &PgPool, id: Uuid) -> anyhow::Result<Option<Doctor>> {
    let doctor = sqlx::query_as::<_, Doctor>(&format!(
        "SELECT {DOCTOR_COLUMNS} \
         FROM doctors d \
         JOIN users u ON u.id = d.user_id AND u.deleted_at IS NULL \
         WHERE d.id = $1 AND d.deleted_at IS NULL"
    ))
    .bind(id)
    .fetch_optional(db)
    .await?;
    Ok(doctor)
}

fn like_pattern(term: &str) -> String {
    format!("%{}%", term.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_pattern_wraps_and_trims() {
        assert_eq!(like_pattern("cardio"), "%cardio%");
        assert_eq!(like_pattern("  Dr. Said "), "%Dr. Said%");
    }
}
