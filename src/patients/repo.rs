use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::auth::repo_types::StoreError;
use crate::patients::repo_types::{NewPatient, Patient};

const PATIENT_COLUMNS: &str = "id, user_id, date_of_birth, gender, nationality, emirates_id, \
     passport_number, height, weight, blood_group, emirate, city, address, location_pin, \
     coordinates, medical_conditions, allergies, medications, emergency_contact_name, \
     emergency_contact_phone, profile_completion, created_at, updated_at, deleted_at";

/// Persistence seam for patient profiles, mirroring [`crate::auth::repo::UserStore`].
#[async_trait]
pub trait PatientStore: Send + Sync {
    async fn create(&self, new: NewPatient) -> Result<Patient, StoreError>;
    async fn find_by_user(&self, user_id: Uuid) -> Result<Option<Patient>, StoreError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Patient>, StoreError>;
    async fn find_by_emirates_id(&self, emirates_id: &str)
        -> Result<Option<Patient>, StoreError>;
    /// Writes the mutable profile fields back. Identity documents are
    /// fixed at registration and not part of the update.
    async fn save(&self, patient: &Patient) -> Result<Patient, StoreError>;
    async fn soft_delete_by_user(&self, user_id: Uuid) -> Result<(), StoreError>;
}

pub struct PgPatientStore {
    db: PgPool,
}

impl PgPatientStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl PatientStore for PgPatientStore {
    async fn create(&self, new: NewPatient) -> Result<Patient, StoreError> {
        let completion = new.initial_completion();
        let patient = sqlx::query_as::<_, Patient>(&format!(
            r#"
            INSERT INTO patients (
                user_id, date_of_birth, gender, nationality, emirates_id,
                passport_number, height, weight, emirate, city, address,
                location_pin, medical_conditions, profile_completion
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING {PATIENT_COLUMNS}
            "#
        ))
        .bind(new.user_id)
        .bind(new.date_of_birth)
        .bind(&new.gender)
        .bind(&new.nationality)
        .bind(&new.emirates_id)
        .bind(&new.passport_number)
        .bind(new.height)
        .bind(new.weight)
        .bind(&new.emirate)
        .bind(&new.city)
        .bind(&new.address)
        .bind(&new.location_pin)
        .bind(&new.medical_conditions)
        .bind(completion)
        .fetch_one(&self.db)
        .await?;
        Ok(patient)
    }

    async fn find_by_user(&self, user_id: Uuid) -> Result<Option<Patient>, StoreError> {
        let patient = sqlx::query_as::<_, Patient>(&format!(
            r#"
            SELECT {PATIENT_COLUMNS}
            FROM patients
            WHERE user_id = $1 AND deleted_at IS NULL
            "#
        ))
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(patient)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Patient>, StoreError> {
        let patient = sqlx::query_as::<_, Patient>(&format!(
            r#"
            SELECT {PATIENT_COLUMNS}
            FROM patients
            WHERE id = $1 AND deleted_at IS NULL
            "#
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(patient)
    }

    async fn find_by_emirates_id(
        &self,
        emirates_id: &str,
    ) -> Result<Option<Patient>, StoreError> {
        let patient = sqlx::query_as::<_, Patient>(&format!(
            r#"
            SELECT {PATIENT_COLUMNS}
            FROM patients
            WHERE emirates_id = $1 AND deleted_at IS NULL
            "#
        ))
        .bind(emirates_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(patient)
    }

    async fn save(&self, patient: &Patient) -> Result<Patient, StoreError> {
        let updated = sqlx::query_as::<_, Patient>(&format!(
            r#"
            UPDATE patients SET
                date_of_birth = $2, gender = $3, nationality = $4, height = $5,
                weight = $6, blood_group = $7, emirate = $8, city = $9,
                address = $10, location_pin = $11, coordinates = $12,
                medical_conditions = $13, allergies = $14, medications = $15,
                emergency_contact_name = $16, emergency_contact_phone = $17,
                profile_completion = $18, updated_at = now()
            WHERE id = $1 AND deleted_at IS NULL
            RETURNING {PATIENT_COLUMNS}
            "#
        ))
        .bind(patient.id)
        .bind(patient.date_of_birth)
        .bind(&patient.gender)
        .bind(&patient.nationality)
        .bind(patient.height)
        .bind(patient.weight)
        .bind(&patient.blood_group)
        .bind(&patient.emirate)
        .bind(&patient.city)
        .bind(&patient.address)
        .bind(&patient.location_pin)
        .bind(&patient.coordinates)
        .bind(&patient.medical_conditions)
        .bind(&patient.allergies)
        .bind(&patient.medications)
        .bind(&patient.emergency_contact_name)
        .bind(&patient.emergency_contact_phone)
        .bind(patient.profile_completion)
        .fetch_one(&self.db)
        .await?;
        Ok(updated)
    }

    async fn soft_delete_by_user(&self, user_id: Uuid) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE patients SET deleted_at = now(), updated_at = now() \
             WHERE user_id = $1 AND deleted_at IS NULL",
        )
        .bind(user_id)
        .execute(&self.db)
        .await?;
        Ok(())
    }
}

/// Vec-backed store used by handler tests.
#[derive(Default)]
pub struct MemoryPatientStore {
    patients: RwLock<Vec<Patient>>,
}

impl MemoryPatientStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PatientStore for MemoryPatientStore {
    async fn create(&self, new: NewPatient) -> Result<Patient, StoreError> {
        let mut patients = self.patients.write().await;
        if let Some(eid) = &new.emirates_id {
            if patients
                .iter()
                .any(|p| p.deleted_at.is_none() && p.emirates_id.as_deref() == Some(eid.as_str()))
            {
                return Err(StoreError::DuplicateEmiratesId);
            }
        }
        if let Some(passport) = &new.passport_number {
            if patients.iter().any(|p| {
                p.deleted_at.is_none() && p.passport_number.as_deref() == Some(passport.as_str())
            }) {
                return Err(StoreError::DuplicatePassport);
            }
        }
        let completion = new.initial_completion();
        let now = OffsetDateTime::now_utc();
        let patient = Patient {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            date_of_birth: new.date_of_birth,
            gender: new.gender,
            nationality: new.nationality,
            emirates_id: new.emirates_id,
            passport_number: new.passport_number,
            height: new.height,
            weight: new.weight,
            blood_group: None,
            emirate: new.emirate,
            city: new.city,
            address: new.address,
            location_pin: new.location_pin,
            coordinates: None,
            medical_conditions: new.medical_conditions,
            allergies: None,
            medications: None,
            emergency_contact_name: None,
            emergency_contact_phone: None,
            profile_completion: completion,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        patients.push(patient.clone());
        Ok(patient)
    }

    async fn find_by_user(&self, user_id: Uuid) -> Result<Option<Patient>, StoreError> {
        let patients = self.patients.read().await;
        Ok(patients
            .iter()
            .find(|p| p.deleted_at.is_none() && p.user_id == user_id)
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Patient>, StoreError> {
        let patients = self.patients.read().await;
        Ok(patients
            .iter()
            .find(|p| p.deleted_at.is_none() && p.id == id)
            .cloned())
    }

    async fn find_by_emirates_id(
        &self,
        emirates_id: &str,
    ) -> Result<Option<Patient>, StoreError> {
        let patients = self.patients.read().await;
        Ok(patients
            .iter()
            .find(|p| p.deleted_at.is_none() && p.emirates_id.as_deref() == Some(emirates_id))
            .cloned())
    }

    async fn save(&self, patient: &Patient) -> Result<Patient, StoreError> {
        let mut patients = self.patients.write().await;
        let slot = patients
            .iter_mut()
            .find(|p| p.deleted_at.is_none() && p.id == patient.id)
            .ok_or(StoreError::Database(sqlx::Error::RowNotFound))?;
        slot.date_of_birth = patient.date_of_birth;
        slot.gender = patient.gender.clone();
        slot.nationality = patient.nationality.clone();
        slot.height = patient.height;
        slot.weight = patient.weight;
        slot.blood_group = patient.blood_group.clone();
        slot.emirate = patient.emirate.clone();
        slot.city = patient.city.clone();
        slot.address = patient.address.clone();
        slot.location_pin = patient.location_pin.clone();
        slot.coordinates = patient.coordinates.clone();
        slot.medical_conditions = patient.medical_conditions.clone();
        slot.allergies = patient.allergies.clone();
        slot.medications = patient.medications.clone();
        slot.emergency_contact_name = patient.emergency_contact_name.clone();
        slot.emergency_contact_phone = patient.emergency_contact_phone.clone();
        slot.profile_completion = patient.profile_completion;
        slot.updated_at = OffsetDateTime::now_utc();
        Ok(slot.clone())
    }

    async fn soft_delete_by_user(&self, user_id: Uuid) -> Result<(), StoreError> {
        let mut patients = self.patients.write().await;
        if let Some(patient) = patients
            .iter_mut()
            .find(|p| p.deleted_at.is_none() && p.user_id == user_id)
        {
            let now = OffsetDateTime::now_utc();
            patient.deleted_at = Some(now);
            patient.updated_at = now;
        }
        Ok(())
    }
}
