use rusqlite::{params, Connection};
use uuid::Uuid;

use super::{parse_datetime, parse_uuid};
use crate::db::DatabaseError;
use crate::models::PharmacyProfile;

pub fn insert_pharmacy(conn: &Connection, pharmacy: &PharmacyProfile) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO pharmacies (id, name, address, phone, license_number, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            pharmacy.id.to_string(),
            pharmacy.name,
            pharmacy.address,
            pharmacy.phone,
            pharmacy.license_number,
            pharmacy.created_at.to_string(),
        ],
    )?;
    Ok(())
}

pub fn get_pharmacy(conn: &Connection, id: &Uuid) -> Result<Option<PharmacyProfile>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, name, address, phone, license_number, created_at
         FROM pharmacies WHERE id = ?1",
    )?;

    let result = stmt.query_row(params![id.to_string()], |row| {
        Ok(PharmacyRow {
            id: row.get::<_, String>(0)?,
            name: row.get::<_, String>(1)?,
            address: row.get::<_, String>(2)?,
            phone: row.get::<_, String>(3)?,
            license_number: row.get::<_, String>(4)?,
            created_at: row.get::<_, String>(5)?,
        })
    });

    match result {
        Ok(row) => Ok(Some(pharmacy_from_row(row)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

struct PharmacyRow {
    id: String,
    name: String,
    address: String,
    phone: String,
    license_number: String,
    created_at: String,
}

fn pharmacy_from_row(row: PharmacyRow) -> Result<PharmacyProfile, DatabaseError> {
    Ok(PharmacyProfile {
        id: parse_uuid(&row.id)?,
        name: row.name,
        address: row.address,
        phone: row.phone,
        license_number: row.license_number,
        created_at: parse_datetime(&row.created_at)?,
    })
}
