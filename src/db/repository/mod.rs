//! Repository layer — entity-scoped database operations over `&Connection`.

mod bill;
mod inventory;
mod pharmacy;

pub use bill::*;
pub use inventory::*;
pub use pharmacy::*;

use chrono::NaiveDateTime;
use uuid::Uuid;

use super::DatabaseError;

pub(crate) fn parse_uuid(value: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(value).map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))
}

/// Timestamps are written with `NaiveDateTime::to_string()`, which emits a
/// space separator and an optional fractional part.
pub(crate) fn parse_datetime(value: &str) -> Result<NaiveDateTime, DatabaseError> {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f"))
        .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))
}
