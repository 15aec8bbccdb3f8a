use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

pub const GENDERS: [&str; 3] = ["Male", "Female", "Other"];

pub fn is_valid_gender(value: &str) -> bool {
    GENDERS.contains(&value)
}

/// Patient profile row, one live row per user.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Patient {
    pub id: Uuid,
    pub user_id: Uuid,
    pub date_of_birth: Option<Date>,
    pub gender: Option<String>,
    pub nationality: Option<String>,
    pub emirates_id: Option<String>, // formatted 784-XXXX-XXXXXXX-X
    pub passport_number: Option<String>,
    pub height: Option<f64>, // cm
    pub weight: Option<f64>, // kg
    pub blood_group: Option<String>,
    pub emirate: Option<String>,
    pub city: Option<String>,
    pub address: Option<String>,
    pub location_pin: Option<String>,
    pub coordinates: Option<serde_json::Value>, // {latitude, longitude}
    pub medical_conditions: Option<String>,
    pub allergies: Option<String>,
    pub medications: Option<String>,
    pub emergency_contact_name: Option<String>,
    pub emergency_contact_phone: Option<String>,
    pub profile_completion: f64, // percentage, two decimals
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(skip_serializing, default, with = "time::serde::rfc3339::option")]
    pub deleted_at: Option<OffsetDateTime>,
}

impl Patient {
    /// Completion tracks eleven core fields; either identity document
    /// counts as the one identity slot.
    pub fn calculate_profile_completion(&self) -> f64 {
        let fields = self.completion_fields();
        let filled = fields.iter().filter(|(_, present)| *present).count();
        let pct = filled as f64 / fields.len() as f64 * 100.0;
        (pct * 100.0).round() / 100.0
    }

    /// Names of the completion fields that are still empty.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        self.completion_fields()
            .into_iter()
            .filter(|(_, present)| !present)
            .map(|(name, _)| name)
            .collect()
    }

    fn completion_fields(&self) -> [(&'static str, bool); 11] {
        let some_str = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        [
            ("date_of_birth", self.date_of_birth.is_some()),
            ("gender", some_str(&self.gender)),
            ("nationality", some_str(&self.nationality)),
            (
                "identity_document",
                some_str(&self.emirates_id) || some_str(&self.passport_number),
            ),
            ("height", self.height.is_some()),
            ("weight", self.weight.is_some()),
            ("blood_group", some_str(&self.blood_group)),
            ("emirate", some_str(&self.emirate)),
            ("address", some_str(&self.address)),
            (
                "emergency_contact_name",
                some_str(&self.emergency_contact_name),
            ),
            (
                "emergency_contact_phone",
                some_str(&self.emergency_contact_phone),
            ),
        ]
    }
}

/// Insert payload created during registration.
#[derive(Debug, Clone)]
pub struct NewPatient {
    pub user_id: Uuid,
    pub emirates_id: Option<String>,
    pub passport_number: Option<String>,
    pub date_of_birth: Option<Date>,
    pub gender: Option<String>,
    pub nationality: Option<String>,
    pub height: Option<f64>,
    pub weight: Option<f64>,
    pub emirate: Option<String>,
    pub city: Option<String>,
    pub address: Option<String>,
    pub location_pin: Option<String>,
    pub medical_conditions: Option<String>,
}

impl NewPatient {
    /// Completion of the profile as it will land at registration time.
    pub fn initial_completion(&self) -> f64 {
        Patient {
            id: Uuid::nil(),
            user_id: self.user_id,
            date_of_birth: self.date_of_birth,
            gender: self.gender.clone(),
            nationality: self.nationality.clone(),
            emirates_id: self.emirates_id.clone(),
            passport_number: self.passport_number.clone(),
            height: self.height,
            weight: self.weight,
            blood_group: None,
            emirate: self.emirate.clone(),
            city: self.city.clone(),
            address: self.address.clone(),
            location_pin: self.location_pin.clone(),
            coordinates: None,
            medical_conditions: self.medical_conditions.clone(),
            allergies: None,
            medications: None,
            emergency_contact_name: None,
            emergency_contact_phone: None,
            profile_completion: 0.0,
            created_at: OffsetDateTime::UNIX_EPOCH,
            updated_at: OffsetDateTime::UNIX_EPOCH,
            deleted_at: None,
        }
        .calculate_profile_completion()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    fn empty_patient() -> Patient {
        Patient {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            date_of_birth: None,
            gender: None,
            nationality: None,
            emirates_id: None,
            passport_number: None,
            height: None,
            weight: None,
            blood_group: None,
            emirate: None,
            city: None,
            address: None,
            location_pin: None,
            coordinates: None,
            medical_conditions: None,
            allergies: None,
            medications: None,
            emergency_contact_name: None,
            emergency_contact_phone: None,
            profile_completion: 0.0,
            created_at: OffsetDateTime::UNIX_EPOCH,
            updated_at: OffsetDateTime::UNIX_EPOCH,
            deleted_at: None,
        }
    }

    #[test]
    fn empty_profile_scores_zero() {
        let patient = empty_patient();
        assert_eq!(patient.calculate_profile_completion(), 0.0);
        assert_eq!(patient.missing_fields().len(), 11);
    }

    #[test]
    fn full_profile_scores_one_hundred() {
        let mut patient = empty_patient();
        patient.date_of_birth = Some(date!(1990 - 04 - 12));
        patient.gender = Some("Female".to_string());
        patient.nationality = Some("UAE".to_string());
        patient.emirates_id = Some("784-1987-1234567-1".to_string());
        patient.height = Some(164.0);
        patient.weight = Some(58.0);
        patient.blood_group = Some("O+".to_string());
        patient.emirate = Some("Dubai".to_string());
        patient.address = Some("12 Marina Walk".to_string());
        patient.emergency_contact_name = Some("Omar Khan".to_string());
        patient.emergency_contact_phone = Some("+971501112222".to_string());

        assert_eq!(patient.calculate_profile_completion(), 100.0);
        assert!(patient.missing_fields().is_empty());
    }

    #[test]
    fn either_identity_document_fills_the_slot() {
        let mut patient = empty_patient();
        patient.passport_number = Some("P1234567".to_string());
        assert!(!patient.missing_fields().contains(&"identity_document"));

        patient.passport_number = None;
        patient.emirates_id = Some("784-1987-1234567-1".to_string());
        assert!(!patient.missing_fields().contains(&"identity_document"));
    }

    #[test]
    fn partial_profile_rounds_to_two_decimals() {
        let mut patient = empty_patient();
        patient.date_of_birth = Some(date!(1990 - 04 - 12));
        patient.gender = Some("Female".to_string());
        patient.nationality = Some("UAE".to_string());
        patient.height = Some(164.0);
        patient.weight = Some(58.0);
        // 5 of 11 fields.
        assert_eq!(patient.calculate_profile_completion(), 45.45);
    }

    #[test]
    fn blank_strings_do_not_count_as_filled() {
        let mut patient = empty_patient();
        patient.gender = Some("  ".to_string());
        assert_eq!(patient.calculate_profile_completion(), 0.0);
        assert!(patient.missing_fields().contains(&"gender"));
    }

    #[test]
    fn gender_values_are_constrained() {
        assert!(is_valid_gender("Male"));
        assert!(is_valid_gender("Female"));
        assert!(is_valid_gender("Other"));
        assert!(!is_valid_gender("female"));
        assert!(!is_valid_gender(""));
    }
}
