use serde::{Deserialize, Serialize};

/// Partial profile update; absent fields keep their stored value.
/// Identity documents are deliberately not part of this payload.
#[derive(Debug, Default, Deserialize)]
pub struct UpdatePatientRequest {
    pub date_of_birth: Option<String>,
    pub gender: Option<String>,
    pub nationality: Option<String>,
    pub height: Option<f64>,
    pub weight: Option<f64>,
    pub blood_group: Option<String>,
    pub emirate: Option<String>,
    pub city: Option<String>,
    pub address: Option<String>,
    pub location_pin: Option<String>,
    pub coordinates: Option<serde_json::Value>,
    pub medical_conditions: Option<String>,
    pub allergies: Option<String>,
    pub medications: Option<String>,
    pub emergency_contact_name: Option<String>,
    pub emergency_contact_phone: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ProfileCompletionResponse {
    pub percentage: f64,
    pub missing_fields: Vec<&'static str>,
}

#[derive(Debug, Deserialize)]
pub struct VerifyEmiratesIdRequest {
    pub emirates_id: String,
}

#[derive(Debug, Serialize)]
pub struct EmiratesIdCheckResponse {
    pub available: bool,
    pub exists: bool,
    pub message: String,
}
