use chrono::NaiveDate;
use rusqlite::{params, params_from_iter, Connection};
use uuid::Uuid;

use super::{parse_datetime, parse_uuid};
use crate::db::DatabaseError;
use crate::models::{InventoryFilter, InventoryItem};

pub fn insert_item(conn: &Connection, item: &InventoryItem) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO inventory_items (id, name, generic_name, category, form, quantity, price,
         expiry_date, pharmacy_name, pharmacy_id, source_bill, location, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        params![
            item.id.to_string(),
            item.name,
            item.generic_name,
            item.category,
            item.form,
            item.quantity,
            item.price,
            item.expiry_date.map(|d| d.to_string()),
            item.pharmacy_name,
            item.pharmacy_id.to_string(),
            item.source_bill.map(|id| id.to_string()),
            item.location,
            item.created_at.to_string(),
            item.updated_at.to_string(),
        ],
    )?;
    Ok(())
}

pub fn get_item(conn: &Connection, id: &Uuid) -> Result<Option<InventoryItem>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "{SELECT_COLUMNS} FROM inventory_items WHERE id = ?1"
    ))?;
    let result = stmt.query_row(params![id.to_string()], item_row_from_rusqlite);

    match result {
        Ok(row) => Ok(Some(item_from_row(row)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Case-insensitive exact-name lookup scoped to one pharmacy.
///
/// This is the reconciliation matching rule: `LOWER(name) = LOWER(?)`,
/// never a substring match.
pub fn find_item_by_name(
    conn: &Connection,
    pharmacy_id: &Uuid,
    name: &str,
) -> Result<Option<InventoryItem>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "{SELECT_COLUMNS} FROM inventory_items
         WHERE pharmacy_id = ?1 AND LOWER(name) = LOWER(?2)
         LIMIT 1"
    ))?;
    let result = stmt.query_row(params![pharmacy_id.to_string(), name], item_row_from_rusqlite);

    match result {
        Ok(row) => Ok(Some(item_from_row(row)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Merge the fields a bill candidate actually supplied into an existing item.
///
/// Only quantity, price and expiry date are candidate-updatable; provenance
/// and descriptive fields stay as created.
pub fn apply_candidate_update(
    conn: &Connection,
    id: &Uuid,
    quantity: Option<i64>,
    price: Option<f64>,
    expiry_date: Option<NaiveDate>,
) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE inventory_items SET
            quantity = COALESCE(?2, quantity),
            price = COALESCE(?3, price),
            expiry_date = COALESCE(?4, expiry_date),
            updated_at = ?5
         WHERE id = ?1",
        params![
            id.to_string(),
            quantity,
            price,
            expiry_date.map(|d| d.to_string()),
            chrono::Local::now().naive_local().to_string(),
        ],
    )?;
    Ok(())
}

/// Delete every item whose provenance is the given bill. Returns how many
/// rows went away.
pub fn delete_items_by_source_bill(
    conn: &Connection,
    bill_id: &Uuid,
) -> Result<usize, DatabaseError> {
    let deleted = conn.execute(
        "DELETE FROM inventory_items WHERE source_bill = ?1",
        params![bill_id.to_string()],
    )?;
    Ok(deleted)
}

/// Filtered inventory listing for one pharmacy, name-ordered.
pub fn list_items_for_pharmacy(
    conn: &Connection,
    pharmacy_id: &Uuid,
    filter: &InventoryFilter,
) -> Result<Vec<InventoryItem>, DatabaseError> {
    let mut sql = format!("{SELECT_COLUMNS} FROM inventory_items WHERE pharmacy_id = ?");
    let mut bindings: Vec<String> = vec![pharmacy_id.to_string()];

    if let Some(search) = filter.search.as_deref().filter(|s| !s.trim().is_empty()) {
        sql.push_str(" AND (LOWER(name) LIKE LOWER(?) OR LOWER(generic_name) LIKE LOWER(?))");
        let pattern = format!("%{}%", search.trim());
        bindings.push(pattern.clone());
        bindings.push(pattern);
    }
    if let Some(category) = &filter.category {
        sql.push_str(" AND category = ?");
        bindings.push(category.clone());
    }
    if let Some(form) = &filter.form {
        sql.push_str(" AND form = ?");
        bindings.push(form.clone());
    }
    if filter.in_stock_only {
        sql.push_str(" AND quantity > 0");
    }
    sql.push_str(" ORDER BY name COLLATE NOCASE");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(bindings.iter()), item_row_from_rusqlite)?;

    let mut items = Vec::new();
    for row in rows {
        items.push(item_from_row(row?)?);
    }
    Ok(items)
}

const SELECT_COLUMNS: &str = "SELECT id, name, generic_name, category, form, quantity, price,
 expiry_date, pharmacy_name, pharmacy_id, source_bill, location, created_at, updated_at";

struct ItemRow {
    id: String,
    name: String,
    generic_name: String,
    category: String,
    form: String,
    quantity: i64,
    price: Option<f64>,
    expiry_date: Option<String>,
    pharmacy_name: String,
    pharmacy_id: String,
    source_bill: Option<String>,
    location: String,
    created_at: String,
    updated_at: String,
}

fn item_row_from_rusqlite(row: &rusqlite::Row<'_>) -> Result<ItemRow, rusqlite::Error> {
    Ok(ItemRow {
        id: row.get(0)?,
        name: row.get(1)?,
        generic_name: row.get(2)?,
        category: row.get(3)?,
        form: row.get(4)?,
        quantity: row.get(5)?,
        price: row.get(6)?,
        expiry_date: row.get(7)?,
        pharmacy_name: row.get(8)?,
        pharmacy_id: row.get(9)?,
        source_bill: row.get(10)?,
        location: row.get(11)?,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
    })
}

fn item_from_row(row: ItemRow) -> Result<InventoryItem, DatabaseError> {
    Ok(InventoryItem {
        id: parse_uuid(&row.id)?,
        name: row.name,
        generic_name: row.generic_name,
        category: row.category,
        form: row.form,
        quantity: row.quantity,
        price: row.price,
        expiry_date: row
            .expiry_date
            .and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok()),
        pharmacy_name: row.pharmacy_name,
        pharmacy_id: parse_uuid(&row.pharmacy_id)?,
        source_bill: row.source_bill.as_deref().and_then(|s| Uuid::parse_str(s).ok()),
        location: row.location,
        created_at: parse_datetime(&row.created_at)?,
        updated_at: parse_datetime(&row.updated_at)?,
    })
}
