//! Reconciliation of extracted candidates against a pharmacy's inventory.
//!
//! Upsert-by-name: a candidate whose name matches an existing item
//! (case-insensitive exact, owner-scoped) merges into it; otherwise a new
//! item is created with provenance pointing at the bill being processed.
//! Two spellings of the same real-world medicine become two records; that
//! is accepted behavior, not something to fix up here. Lookups and writes
//! are independent per candidate, so concurrent uploads for the same owner
//! race last-writer-wins on quantity/price.

use rusqlite::Connection;
use uuid::Uuid;

use super::extract::CandidateItem;
use crate::db::repository;
use crate::db::DatabaseError;
use crate::models::{InventoryItem, PharmacyProfile};

/// Apply candidates to the owner's inventory, returning the touched item
/// ids in candidate order.
pub fn reconcile_candidates(
    conn: &Connection,
    pharmacy: &PharmacyProfile,
    bill_id: &Uuid,
    candidates: &[CandidateItem],
) -> Result<Vec<Uuid>, DatabaseError> {
    let mut item_ids = Vec::with_capacity(candidates.len());
    let mut created = 0usize;
    let mut merged = 0usize;

    for candidate in candidates {
        let name = candidate.name.trim();
        if name.is_empty() {
            continue;
        }

        match repository::find_item_by_name(conn, &pharmacy.id, name)? {
            Some(existing) => {
                repository::apply_candidate_update(
                    conn,
                    &existing.id,
                    candidate.quantity,
                    candidate.price,
                    candidate.expiry_date,
                )?;
                item_ids.push(existing.id);
                merged += 1;
            }
            None => {
                let now = chrono::Local::now().naive_local();
                let item = InventoryItem {
                    id: Uuid::new_v4(),
                    name: name.to_string(),
                    generic_name: candidate.generic_name.clone(),
                    category: candidate.category.clone(),
                    form: candidate.form.clone(),
                    quantity: candidate.quantity.unwrap_or(0),
                    price: candidate.price,
                    expiry_date: candidate.expiry_date,
                    pharmacy_name: pharmacy.name.clone(),
                    pharmacy_id: pharmacy.id,
                    source_bill: Some(*bill_id),
                    location: pharmacy.address.clone(),
                    created_at: now,
                    updated_at: now,
                };
                repository::insert_item(conn, &item)?;
                item_ids.push(item.id);
                created += 1;
            }
        }
    }

    tracing::info!(
        bill_id = %bill_id,
        pharmacy_id = %pharmacy.id,
        created,
        merged,
        "Reconciliation finished"
    );
    Ok(item_ids)
}
