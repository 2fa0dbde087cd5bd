use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::BillStatus;

/// One ingested bill document plus its processing status and the inventory
/// items it created or merged into, in extraction order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bill {
    pub id: Uuid,
    pub pharmacy_id: Uuid,
    /// Stored filename in the uploads directory (timestamp-prefixed).
    pub file_name: String,
    pub original_name: String,
    /// Gate-facing URL the stored file is served under.
    pub file_url: String,
    pub status: BillStatus,
    pub medicine_ids: Vec<Uuid>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}
