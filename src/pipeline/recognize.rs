//! Text recognition (OCR) for uploaded bill images.
//!
//! Unlike entity extraction there is no heuristic fallback here: if the
//! recognizer fails, that upload fails. The engine is a single shared
//! exclusive resource: recognitions are strictly serialized and the engine
//! is built lazily on first use, so concurrent uploads queue behind the lock
//! rather than running their recognition step in parallel.

use std::path::Path;
use std::sync::{Arc, Mutex};

use base64::Engine as _;
use thiserror::Error;

use super::ollama::VisionClient;

#[derive(Error, Debug)]
pub enum RecognitionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("recognizer initialization failed: {0}")]
    Init(String),

    #[error("text recognition failed: {0}")]
    Engine(String),
}

/// OCR engine abstraction (allows mocking for tests)
pub trait TextRecognizer: Send {
    fn recognize(&self, path: &Path) -> Result<String, RecognitionError>;
}

const OCR_SYSTEM_PROMPT: &str = "\
You are a receipt and invoice transcriber. Your task is to extract ALL visible \
text from the provided bill image, line by line, top to bottom. Keep each \
printed line on its own output line. Be thorough and accurate.";

const OCR_USER_PROMPT: &str = "\
Transcribe all visible text from this pharmacy bill image as plain text. \
Preserve the line structure of the bill. Do not summarize, annotate, or \
translate; output the text exactly as printed.";

/// Vision-model OCR backed by any `VisionClient`.
pub struct OllamaVisionRecognizer {
    vision: Arc<dyn VisionClient>,
    model: String,
}

impl OllamaVisionRecognizer {
    pub fn new(vision: Arc<dyn VisionClient>, model: String) -> Self {
        Self { vision, model }
    }
}

impl TextRecognizer for OllamaVisionRecognizer {
    fn recognize(&self, path: &Path) -> Result<String, RecognitionError> {
        let _span = tracing::info_span!("recognize", model = %self.model).entered();
        let start = std::time::Instant::now();

        let image_bytes = std::fs::read(path)?;
        let base64_image = base64::engine::general_purpose::STANDARD.encode(&image_bytes);
        let images = vec![base64_image];

        let text = self
            .vision
            .chat_with_images(&self.model, OCR_USER_PROMPT, &images, Some(OCR_SYSTEM_PROMPT))
            .map_err(|e| RecognitionError::Engine(e.to_string()))?;

        tracing::info!(
            model = %self.model,
            elapsed_ms = %start.elapsed().as_millis(),
            text_len = text.len(),
            "Bill text recognized"
        );

        Ok(text.trim().to_string())
    }
}

type RecognizerFactory =
    Box<dyn Fn() -> Result<Box<dyn TextRecognizer>, RecognitionError> + Send + Sync>;

/// Mutex-guarded shared recognizer handle.
///
/// Exclusive-access contract: at most one recognition is in flight at any
/// time across the process; callers block on the lock. The underlying engine
/// is built by the factory on the first call and reused afterwards. A failed
/// build is returned to the caller and retried on the next call.
pub struct SharedRecognizer {
    engine: Mutex<Option<Box<dyn TextRecognizer>>>,
    factory: RecognizerFactory,
}

impl SharedRecognizer {
    pub fn new(factory: RecognizerFactory) -> Self {
        Self {
            engine: Mutex::new(None),
            factory,
        }
    }

    pub fn recognize(&self, path: &Path) -> Result<String, RecognitionError> {
        // A panicking engine must not wedge every later upload.
        let mut guard = self
            .engine
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let engine = match &mut *guard {
            Some(engine) => engine,
            slot => {
                tracing::info!("Initializing shared text recognizer");
                slot.insert((self.factory)()?)
            }
        };
        engine.recognize(path)
    }
}
