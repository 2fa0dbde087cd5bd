use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A medicine/product record scoped to one pharmacy.
///
/// Matching during reconciliation is case-insensitive exact on `name`,
/// scoped to `pharmacy_id`. `source_bill` records the bill that first
/// created the item and is never reassigned by later merges.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryItem {
    pub id: Uuid,
    pub name: String,
    pub generic_name: String,
    pub category: String,
    pub form: String,
    pub quantity: i64,
    pub price: Option<f64>,
    pub expiry_date: Option<NaiveDate>,
    /// Human-readable owner name, copied from the profile at creation.
    pub pharmacy_name: String,
    pub pharmacy_id: Uuid,
    pub source_bill: Option<Uuid>,
    pub location: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}
