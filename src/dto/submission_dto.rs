use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Text fields of the multipart upload form.
#[derive(Debug, Deserialize, Validate)]
pub struct UploadFields {
    #[validate(length(min = 1, max = 100))]
    pub first_name: String,
    #[validate(length(min = 1, max = 100))]
    pub last_name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(max = 32))]
    pub phone: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub id: Uuid,
    pub status: String,
}
