use std::str::FromStr;

use rusqlite::{params, Connection};
use uuid::Uuid;

use super::{parse_datetime, parse_uuid};
use crate::db::DatabaseError;
use crate::models::{Bill, BillStatus};

pub fn insert_bill(conn: &Connection, bill: &Bill) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO bills (id, pharmacy_id, file_name, original_name, file_url, status,
         created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            bill.id.to_string(),
            bill.pharmacy_id.to_string(),
            bill.file_name,
            bill.original_name,
            bill.file_url,
            bill.status.as_str(),
            bill.created_at.to_string(),
            bill.updated_at.to_string(),
        ],
    )?;
    set_bill_medicines(conn, &bill.id, &bill.medicine_ids)?;
    Ok(())
}

pub fn get_bill(conn: &Connection, id: &Uuid) -> Result<Option<Bill>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, pharmacy_id, file_name, original_name, file_url, status,
         created_at, updated_at
         FROM bills WHERE id = ?1",
    )?;

    let result = stmt.query_row(params![id.to_string()], |row| {
        Ok(BillRow {
            id: row.get::<_, String>(0)?,
            pharmacy_id: row.get::<_, String>(1)?,
            file_name: row.get::<_, String>(2)?,
            original_name: row.get::<_, String>(3)?,
            file_url: row.get::<_, String>(4)?,
            status: row.get::<_, String>(5)?,
            created_at: row.get::<_, String>(6)?,
            updated_at: row.get::<_, String>(7)?,
        })
    });

    match result {
        Ok(row) => {
            let medicine_ids = get_bill_medicines(conn, id)?;
            Ok(Some(bill_from_row(row, medicine_ids)?))
        }
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// All bills uploaded by a pharmacy, newest first.
pub fn list_bills_for_pharmacy(
    conn: &Connection,
    pharmacy_id: &Uuid,
) -> Result<Vec<Bill>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, pharmacy_id, file_name, original_name, file_url, status,
         created_at, updated_at
         FROM bills WHERE pharmacy_id = ?1
         ORDER BY created_at DESC",
    )?;

    let rows = stmt.query_map(params![pharmacy_id.to_string()], |row| {
        Ok(BillRow {
            id: row.get::<_, String>(0)?,
            pharmacy_id: row.get::<_, String>(1)?,
            file_name: row.get::<_, String>(2)?,
            original_name: row.get::<_, String>(3)?,
            file_url: row.get::<_, String>(4)?,
            status: row.get::<_, String>(5)?,
            created_at: row.get::<_, String>(6)?,
            updated_at: row.get::<_, String>(7)?,
        })
    })?;

    let mut bills = Vec::new();
    for row in rows {
        let row = row?;
        let id = parse_uuid(&row.id)?;
        let medicine_ids = get_bill_medicines(conn, &id)?;
        bills.push(bill_from_row(row, medicine_ids)?);
    }
    Ok(bills)
}

/// Advance a bill's status. Transitions are monotonic and one-directional;
/// anything else is a constraint violation.
pub fn advance_bill_status(
    conn: &Connection,
    id: &Uuid,
    next: BillStatus,
) -> Result<(), DatabaseError> {
    let current: String = conn
        .query_row(
            "SELECT status FROM bills WHERE id = ?1",
            params![id.to_string()],
            |row| row.get(0),
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => DatabaseError::NotFound {
                entity_type: "Bill".into(),
                id: id.to_string(),
            },
            other => other.into(),
        })?;

    let current = BillStatus::from_str(&current)?;
    if !current.can_advance_to(next) {
        return Err(DatabaseError::ConstraintViolation(format!(
            "illegal bill status transition: {} -> {}",
            current.as_str(),
            next.as_str()
        )));
    }

    conn.execute(
        "UPDATE bills SET status = ?2, updated_at = ?3 WHERE id = ?1",
        params![
            id.to_string(),
            next.as_str(),
            chrono::Local::now().naive_local().to_string(),
        ],
    )?;
    Ok(())
}

/// Replace the ordered inventory-item references of a bill.
pub fn set_bill_medicines(
    conn: &Connection,
    bill_id: &Uuid,
    medicine_ids: &[Uuid],
) -> Result<(), DatabaseError> {
    conn.execute(
        "DELETE FROM bill_medicines WHERE bill_id = ?1",
        params![bill_id.to_string()],
    )?;
    let mut stmt = conn.prepare(
        "INSERT INTO bill_medicines (bill_id, position, medicine_id) VALUES (?1, ?2, ?3)",
    )?;
    for (position, medicine_id) in medicine_ids.iter().enumerate() {
        stmt.execute(params![
            bill_id.to_string(),
            position as i64,
            medicine_id.to_string(),
        ])?;
    }
    Ok(())
}

pub fn get_bill_medicines(conn: &Connection, bill_id: &Uuid) -> Result<Vec<Uuid>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT medicine_id FROM bill_medicines WHERE bill_id = ?1 ORDER BY position",
    )?;
    let rows = stmt.query_map(params![bill_id.to_string()], |row| {
        row.get::<_, String>(0)
    })?;

    let mut ids = Vec::new();
    for row in rows {
        ids.push(parse_uuid(&row?)?);
    }
    Ok(ids)
}

pub fn delete_bill(conn: &Connection, id: &Uuid) -> Result<(), DatabaseError> {
    conn.execute("DELETE FROM bills WHERE id = ?1", params![id.to_string()])?;
    Ok(())
}

struct BillRow {
    id: String,
    pharmacy_id: String,
    file_name: String,
    original_name: String,
    file_url: String,
    status: String,
    created_at: String,
    updated_at: String,
}

fn bill_from_row(row: BillRow, medicine_ids: Vec<Uuid>) -> Result<Bill, DatabaseError> {
    Ok(Bill {
        id: parse_uuid(&row.id)?,
        pharmacy_id: parse_uuid(&row.pharmacy_id)?,
        file_name: row.file_name,
        original_name: row.original_name,
        file_url: row.file_url,
        status: BillStatus::from_str(&row.status)?,
        medicine_ids,
        created_at: parse_datetime(&row.created_at)?,
        updated_at: parse_datetime(&row.updated_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_memory_database;
    use crate::db::repository::insert_pharmacy;
    use crate::models::PharmacyProfile;

    fn setup() -> (rusqlite::Connection, Uuid) {
        let conn = open_memory_database().unwrap();
        let pharmacy = PharmacyProfile {
            id: Uuid::new_v4(),
            name: "Apollo Pharmacy".into(),
            address: "12 MG Road".into(),
            phone: String::new(),
            license_number: "KA-B-1".into(),
            created_at: chrono::Local::now().naive_local(),
        };
        insert_pharmacy(&conn, &pharmacy).unwrap();
        (conn, pharmacy.id)
    }

    fn sample_bill(pharmacy_id: Uuid) -> Bill {
        let now = chrono::Local::now().naive_local();
        Bill {
            id: Uuid::new_v4(),
            pharmacy_id,
            file_name: "1754550000000-bill.jpg".into(),
            original_name: "bill.jpg".into(),
            file_url: "/uploads/1754550000000-bill.jpg".into(),
            status: BillStatus::Uploaded,
            medicine_ids: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn insert_and_get_round_trip() {
        let (conn, pharmacy_id) = setup();
        let bill = sample_bill(pharmacy_id);
        insert_bill(&conn, &bill).unwrap();

        let loaded = get_bill(&conn, &bill.id).unwrap().unwrap();
        assert_eq!(loaded.id, bill.id);
        assert_eq!(loaded.pharmacy_id, pharmacy_id);
        assert_eq!(loaded.status, BillStatus::Uploaded);
        assert!(loaded.medicine_ids.is_empty());
    }

    #[test]
    fn status_advances_along_the_happy_path() {
        let (conn, pharmacy_id) = setup();
        let bill = sample_bill(pharmacy_id);
        insert_bill(&conn, &bill).unwrap();

        advance_bill_status(&conn, &bill.id, BillStatus::Processing).unwrap();
        advance_bill_status(&conn, &bill.id, BillStatus::Completed).unwrap();

        let loaded = get_bill(&conn, &bill.id).unwrap().unwrap();
        assert_eq!(loaded.status, BillStatus::Completed);
    }

    #[test]
    fn terminal_status_cannot_be_left() {
        let (conn, pharmacy_id) = setup();
        let bill = sample_bill(pharmacy_id);
        insert_bill(&conn, &bill).unwrap();
        advance_bill_status(&conn, &bill.id, BillStatus::Processing).unwrap();
        advance_bill_status(&conn, &bill.id, BillStatus::Completed).unwrap();

        for next in [
            BillStatus::Uploaded,
            BillStatus::Processing,
            BillStatus::Error,
        ] {
            let err = advance_bill_status(&conn, &bill.id, next).unwrap_err();
            assert!(matches!(err, DatabaseError::ConstraintViolation(_)));
        }
        let loaded = get_bill(&conn, &bill.id).unwrap().unwrap();
        assert_eq!(loaded.status, BillStatus::Completed);
    }

    #[test]
    fn uploaded_cannot_jump_to_terminal() {
        let (conn, pharmacy_id) = setup();
        let bill = sample_bill(pharmacy_id);
        insert_bill(&conn, &bill).unwrap();

        let err = advance_bill_status(&conn, &bill.id, BillStatus::Completed).unwrap_err();
        assert!(matches!(err, DatabaseError::ConstraintViolation(_)));
    }

    #[test]
    fn advancing_missing_bill_is_not_found() {
        let (conn, _) = setup();
        let err =
            advance_bill_status(&conn, &Uuid::new_v4(), BillStatus::Processing).unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound { .. }));
    }

    #[test]
    fn medicine_references_keep_their_order() {
        let (conn, pharmacy_id) = setup();
        let bill = sample_bill(pharmacy_id);
        insert_bill(&conn, &bill).unwrap();

        let ids: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();
        set_bill_medicines(&conn, &bill.id, &ids).unwrap();

        let loaded = get_bill(&conn, &bill.id).unwrap().unwrap();
        assert_eq!(loaded.medicine_ids, ids);
    }

    #[test]
    fn list_is_newest_first() {
        let (conn, pharmacy_id) = setup();

        let mut older = sample_bill(pharmacy_id);
        older.created_at = chrono::NaiveDate::from_ymd_opt(2026, 1, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();
        let mut newer = sample_bill(pharmacy_id);
        newer.created_at = chrono::NaiveDate::from_ymd_opt(2026, 6, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();
        insert_bill(&conn, &older).unwrap();
        insert_bill(&conn, &newer).unwrap();

        let bills = list_bills_for_pharmacy(&conn, &pharmacy_id).unwrap();
        assert_eq!(bills.len(), 2);
        assert_eq!(bills[0].id, newer.id);
        assert_eq!(bills[1].id, older.id);
    }

    #[test]
    fn delete_removes_bill_and_references() {
        let (conn, pharmacy_id) = setup();
        let bill = sample_bill(pharmacy_id);
        insert_bill(&conn, &bill).unwrap();
        set_bill_medicines(&conn, &bill.id, &[Uuid::new_v4()]).unwrap();

        delete_bill(&conn, &bill.id).unwrap();
        assert!(get_bill(&conn, &bill.id).unwrap().is_none());

        let orphaned: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM bill_medicines WHERE bill_id = ?1",
                params![bill.id.to_string()],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(orphaned, 0);
    }
}
