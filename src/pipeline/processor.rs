//! Bill lifecycle controller.
//!
//! Single entry point that drives the full ingestion pipeline for one
//! uploaded bill: recognize -> verify ownership -> persist bill ->
//! extract -> reconcile -> complete, publishing lifecycle events as state
//! changes land. Uses trait-based DI for the recognizer and the LLM so the
//! whole flow is testable with mock implementations.
//!
//! Failure semantics: a recognition or storage failure is fatal for the
//! upload; an extraction-service failure is not (the extractor falls back).
//! Inventory writes that landed before a storage failure are not rolled
//! back; the explicit `delete_bill` compensation is the only rollback.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rusqlite::Connection;
use thiserror::Error;
use uuid::Uuid;

use super::extract::extract_candidates;
use super::ollama::{LlmClient, OllamaClient, VisionClient};
use super::recognize::{
    OllamaVisionRecognizer, RecognitionError, SharedRecognizer, TextRecognizer,
};
use super::reconcile::reconcile_candidates;
use super::store;
use super::verify::{verify_ownership, OwnershipVerdict};
use crate::config::{self, AiSettings};
use crate::db::repository;
use crate::db::DatabaseError;
use crate::events::{Notifier, PipelineEvent};
use crate::models::{Bill, BillStatus};

#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("text recognition failed: {0}")]
    Recognition(#[from] RecognitionError),

    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("unknown pharmacy: {0}")]
    UnknownPharmacy(Uuid),

    #[error("bill not found: {0}")]
    BillNotFound(Uuid),

    #[error("bill {bill_id} does not belong to pharmacy {pharmacy_id}")]
    NotOwner { bill_id: Uuid, pharmacy_id: Uuid },
}

/// What the caller gets back from an upload run.
///
/// A rejection ("not your bill") is a regular outcome, not an error; fatal
/// faults come back as `ProcessingError`.
#[derive(Debug)]
pub enum UploadOutcome {
    Rejected { detected_name: String },
    Processed(Bill),
}

pub struct BillProcessor {
    recognizer: SharedRecognizer,
    llm: Option<Arc<dyn LlmClient>>,
    notifier: Notifier,
    settings: AiSettings,
    uploads_dir: PathBuf,
}

impl BillProcessor {
    pub fn new(
        recognizer: SharedRecognizer,
        llm: Option<Arc<dyn LlmClient>>,
        settings: AiSettings,
        uploads_dir: PathBuf,
    ) -> Self {
        Self {
            recognizer,
            llm,
            notifier: Notifier::new(),
            settings,
            uploads_dir,
        }
    }

    /// Production wiring: one Ollama client serves both the vision OCR and
    /// the text model. The recognizer engine is built lazily on first use.
    pub fn from_settings(settings: AiSettings) -> Self {
        let client = Arc::new(OllamaClient::new(&settings.base_url, settings.timeout_secs));

        let vision: Arc<dyn VisionClient> = client.clone();
        let ocr_model = settings.ocr_model.clone();
        let recognizer = SharedRecognizer::new(Box::new(move || {
            Ok(Box::new(OllamaVisionRecognizer::new(
                vision.clone(),
                ocr_model.clone(),
            )) as Box<dyn TextRecognizer>)
        }));

        let llm = settings
            .llm_enabled
            .then(|| client as Arc<dyn LlmClient>);

        Self::new(recognizer, llm, settings, config::uploads_dir())
    }

    /// Subscribe point for lifecycle events.
    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Run the full pipeline for one stored upload.
    pub fn process_upload(
        &self,
        conn: &Connection,
        pharmacy_id: &Uuid,
        stored_file: &Path,
        original_name: &str,
    ) -> Result<UploadOutcome, ProcessingError> {
        let _span =
            tracing::info_span!("process_upload", pharmacy_id = %pharmacy_id, file = original_name)
                .entered();

        let pharmacy = repository::get_pharmacy(conn, pharmacy_id)?
            .ok_or(ProcessingError::UnknownPharmacy(*pharmacy_id))?;

        // Stage 1: OCR. No fallback exists here; failure fails the upload
        // before any bill record exists.
        let raw_text = self.recognizer.recognize(stored_file)?;
        tracing::info!(text_len = raw_text.len(), "Bill text recognized");

        // Stage 2: ownership gate.
        let llm = self.llm.as_deref();
        match verify_ownership(llm, &self.settings.text_model, &raw_text, &pharmacy.name) {
            OwnershipVerdict::Accepted => {}
            OwnershipVerdict::Rejected { detected_name } => {
                tracing::info!(detected = %detected_name, "Upload rejected, removing stored file");
                store::remove_upload(stored_file);
                return Ok(UploadOutcome::Rejected { detected_name });
            }
        }

        // Stage 3: persist the bill, then advance it into processing.
        let file_name = stored_file
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload")
            .to_string();
        let now = chrono::Local::now().naive_local();
        let bill = Bill {
            id: Uuid::new_v4(),
            pharmacy_id: pharmacy.id,
            file_url: format!("/uploads/{file_name}"),
            file_name,
            original_name: original_name.to_string(),
            status: BillStatus::Uploaded,
            medicine_ids: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        repository::insert_bill(conn, &bill)?;
        repository::advance_bill_status(conn, &bill.id, BillStatus::Processing)?;

        // Stages 4-6: extract, reconcile, complete. From here on the bill
        // exists, so a storage failure leaves it in the error state.
        match self.run_reconciliation(conn, &pharmacy, &bill.id, &raw_text) {
            Ok(()) => {}
            Err(e) => {
                self.mark_failed(conn, &bill.id);
                return Err(e.into());
            }
        }

        self.notifier.publish(PipelineEvent::BillProcessed {
            bill_id: bill.id,
            pharmacy_id: pharmacy.id,
        });
        self.notifier.publish(PipelineEvent::MedicinesUpdated {
            pharmacy_id: pharmacy.id,
        });

        let bill = repository::get_bill(conn, &bill.id)?
            .ok_or(ProcessingError::BillNotFound(bill.id))?;
        tracing::info!(bill_id = %bill.id, items = bill.medicine_ids.len(), "Bill processed");
        Ok(UploadOutcome::Processed(bill))
    }

    fn run_reconciliation(
        &self,
        conn: &Connection,
        pharmacy: &crate::models::PharmacyProfile,
        bill_id: &Uuid,
        raw_text: &str,
    ) -> Result<(), DatabaseError> {
        let candidates =
            extract_candidates(self.llm.as_deref(), &self.settings.text_model, raw_text);
        tracing::info!(count = candidates.len(), "Candidates extracted");

        // Zero candidates is a completed bill with no item references,
        // not an error.
        let item_ids = reconcile_candidates(conn, pharmacy, bill_id, &candidates)?;
        repository::set_bill_medicines(conn, bill_id, &item_ids)?;
        repository::advance_bill_status(conn, bill_id, BillStatus::Completed)?;
        Ok(())
    }

    /// Best-effort transition into the error state. The original fault is
    /// what the caller sees; a failure here only gets logged.
    fn mark_failed(&self, conn: &Connection, bill_id: &Uuid) {
        if let Err(e) = repository::advance_bill_status(conn, bill_id, BillStatus::Error) {
            tracing::error!(bill_id = %bill_id, error = %e, "Could not mark bill as failed");
        }
    }

    /// Delete a bill, its stored file, and every inventory item it created.
    ///
    /// Dependents go first, then the file (best-effort), then the bill
    /// record. This compensation runs only on explicit request, never
    /// automatically on a mid-pipeline failure.
    pub fn delete_bill(
        &self,
        conn: &Connection,
        pharmacy_id: &Uuid,
        bill_id: &Uuid,
    ) -> Result<(), ProcessingError> {
        let bill = repository::get_bill(conn, bill_id)?
            .ok_or(ProcessingError::BillNotFound(*bill_id))?;

        if bill.pharmacy_id != *pharmacy_id {
            return Err(ProcessingError::NotOwner {
                bill_id: *bill_id,
                pharmacy_id: *pharmacy_id,
            });
        }

        let deleted = repository::delete_items_by_source_bill(conn, bill_id)?;
        store::remove_upload(&self.uploads_dir.join(&bill.file_name));
        repository::delete_bill(conn, bill_id)?;

        tracing::info!(bill_id = %bill_id, items_deleted = deleted, "Bill deleted");
        self.notifier.publish(PipelineEvent::BillDeleted {
            bill_id: *bill_id,
            pharmacy_id: *pharmacy_id,
        });
        self.notifier.publish(PipelineEvent::MedicinesUpdated {
            pharmacy_id: *pharmacy_id,
        });
        Ok(())
    }
}
