use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Owner profile for uploaded bills. Authentication lives outside this
/// crate; the pipeline only needs the claimed name for the ownership check
/// and name/address to copy into newly created inventory items.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PharmacyProfile {
    pub id: Uuid,
    pub name: String,
    pub address: String,
    pub phone: String,
    pub license_number: String,
    pub created_at: NaiveDateTime,
}
