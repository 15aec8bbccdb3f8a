use serde::{Deserialize, Serialize};
use time::macros::format_description;
use uuid::Uuid;

use crate::doctors::repo::Doctor;

#[derive(Debug, Deserialize)]
pub struct DoctorQuery {
    pub specialty: Option<String>,
    pub search: Option<String>,
    pub location: Option<String>,
    pub min_rating: Option<f64>,
    pub max_fee: Option<f64>,
    pub consultation_type: Option<String>,
    pub language: Option<String>,
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_page() -> i64 {
    1
}

fn default_limit() -> i64 {
    10
}

/// Card-sized entry for the directory list, with display strings
/// pre-rendered for the client.
#[derive(Debug, Serialize)]
pub struct DoctorListItem {
    pub id: Uuid,
    pub name: String,
    pub specialty: String,
    pub experience: String,
    pub rating: String,
    pub location: Option<String>,
    pub next_available: String,
    pub fee: String,
    pub avatar: Option<String>,
}

impl From<Doctor> for DoctorListItem {
    fn from(doctor: Doctor) -> Self {
        let experience = match doctor.years_of_experience {
            Some(years) => format!("{years} years experience"),
            None => "Experienced".to_string(),
        };
        let slot_format = format_description!(
            "[weekday repr:short], [hour repr:12 padding:zero]:[minute] [period]"
        );
        let next_available = doctor
            .next_available_slot
            .and_then(|slot| slot.format(&slot_format).ok())
            // Placeholder until slot calculation lands with the booking module.
            .unwrap_or_else(|| "Today, 4:30 PM".to_string());
        Self {
            id: doctor.id,
            name: doctor.full_name,
            specialty: doctor.specialty,
            experience,
            rating: format!("{:.1}", doctor.rating),
            location: doctor.location.or(doctor.hospital_affiliation),
            next_available,
            fee: format!("AED {:.0}", doctor.consultation_fee),
            avatar: doctor.avatar_url,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DoctorListResponse {
    pub doctors: Vec<DoctorListItem>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
    pub total_pages: i64,
}

#[derive(Debug, Serialize)]
pub struct SpecialtyResponse {
    pub specialties: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doctors::repo::DoctorStatus;
    use serde_json::json;
    use time::macros::datetime;
    use time::OffsetDateTime;

    fn sample_doctor() -> Doctor {
        Doctor {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            full_name: "Dr. Said Rahman".to_string(),
            specialty: "Cardiology".to_string(),
            sub_specialty: None,
            license_number: "DHA-12345".to_string(),
            years_of_experience: Some(12),
            qualifications: Some(vec!["MBBS".to_string(), "MD".to_string()]),
            medical_school: None,
            hospital_affiliation: Some("Cleveland Clinic Abu Dhabi".to_string()),
            clinic_name: None,
            clinic_address: None,
            location: Some("Dubai Healthcare City".to_string()),
            coordinates: None,
            consultation_fee: 180.0,
            consultation_types: Some(vec!["In-person".to_string(), "Online".to_string()]),
            languages: Some(vec!["English".to_string(), "Arabic".to_string()]),
            rating: 4.8,
            total_reviews: 120,
            total_consultations: 430,
            is_accepting_patients: true,
            next_available_slot: None,
            working_hours: None,
            bio: None,
            specialization_description: None,
            avatar_url: None,
            profile_images: None,
            status: DoctorStatus::Active,
            verified: true,
            created_at: OffsetDateTime::UNIX_EPOCH,
            updated_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn list_item_renders_display_strings() {
        let item = DoctorListItem::from(sample_doctor());
        assert_eq!(item.name, "Dr. Said Rahman");
        assert_eq!(item.experience, "12 years experience");
        assert_eq!(item.rating, "4.8");
        assert_eq!(item.fee, "AED 180");
        assert_eq!(item.location.as_deref(), Some("Dubai Healthcare City"));
        assert_eq!(item.next_available, "Today, 4:30 PM");
    }

    #[test]
    fn list_item_falls_back_when_fields_are_missing() {
        let mut doctor = sample_doctor();
        doctor.years_of_experience = None;
        doctor.location = None;
        let item = DoctorListItem::from(doctor);
        assert_eq!(item.experience, "Experienced");
        assert_eq!(item.location.as_deref(), Some("Cleveland Clinic Abu Dhabi"));
    }

    #[test]
    fn next_available_slot_is_rendered_short() {
        let mut doctor = sample_doctor();
        doctor.next_available_slot = Some(datetime!(2025-03-03 16:30 UTC));
        let item = DoctorListItem::from(doctor);
        assert_eq!(item.next_available, "Mon, 04:30 PM");
    }

    #[test]
    fn query_defaults_apply() {
        let query: DoctorQuery = serde_json::from_value(json!({})).expect("empty query");
        assert_eq!(query.page, 1);
        assert_eq!(query.limit, 10);
        assert!(query.specialty.is_none());

        let query: DoctorQuery =
            serde_json::from_value(json!({"page": 3, "limit": 25, "min_rating": 4.0}))
                .expect("filters");
        assert_eq!(query.page, 3);
        assert_eq!(query.limit, 25);
        assert_eq!(query.min_rating, Some(4.0));
    }
}
