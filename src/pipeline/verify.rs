//! Bill ownership verification.
//!
//! Decides whether recognized bill text plausibly originates from the
//! claimed pharmacy. Detection prefers the LLM; without one (or on any
//! service error) the issuer surrogate is the first three non-empty lines
//! of the bill. Absence of evidence is not evidence of mismatch: when no
//! name can be detected at all, the upload is accepted.

use super::ollama::LlmClient;

const DETECTION_SYSTEM_PROMPT: &str = "\
You are given raw OCR text from a pharmacy bill. Identify the pharmacy or \
shop name that issued the bill. Return ONLY the name as plain text, no \
explanation, no JSON. If unclear, return \"Unknown\".";

fn build_detection_prompt(raw_text: &str) -> String {
    format!("OCR TEXT:\n---\n{raw_text}\n---")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OwnershipVerdict {
    Accepted,
    Rejected {
        /// The issuer name the check matched against, for the caller's
        /// rejection message.
        detected_name: String,
    },
}

/// Check whether `raw_text` looks like it was issued by `claimed_name`.
pub fn verify_ownership(
    llm: Option<&dyn LlmClient>,
    model: &str,
    raw_text: &str,
    claimed_name: &str,
) -> OwnershipVerdict {
    let detected =
        detect_issuer_name(llm, model, raw_text).or_else(|| heuristic_issuer_name(raw_text));

    let detected_norm = detected.as_deref().map(normalize_name).unwrap_or_default();
    let claimed_norm = normalize_name(claimed_name);

    if !detected_norm.is_empty()
        && !(detected_norm.contains(&claimed_norm) || claimed_norm.contains(&detected_norm))
    {
        tracing::info!(
            detected = %detected_norm,
            claimed = %claimed_norm,
            "Bill issuer does not match uploader"
        );
        return OwnershipVerdict::Rejected {
            detected_name: detected.unwrap_or_default(),
        };
    }

    OwnershipVerdict::Accepted
}

/// LLM-assisted issuer detection. Service errors and the "Unknown" sentinel
/// both come back as None; a detection failure is never a pipeline failure.
fn detect_issuer_name(llm: Option<&dyn LlmClient>, model: &str, raw_text: &str) -> Option<String> {
    let llm = llm?;
    match llm.generate(model, &build_detection_prompt(raw_text), DETECTION_SYSTEM_PROMPT) {
        Ok(output) => {
            let output = output.trim();
            if output.is_empty() || output.eq_ignore_ascii_case("unknown") {
                None
            } else {
                Some(output.to_lowercase())
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "Issuer detection failed, falling back to heuristic");
            None
        }
    }
}

/// Heuristic surrogate: the bill header, i.e. the first three non-empty lines.
fn heuristic_issuer_name(raw_text: &str) -> Option<String> {
    let header: Vec<&str> = raw_text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .take(3)
        .collect();
    if header.is_empty() {
        None
    } else {
        Some(header.join(" ").to_lowercase())
    }
}

/// Lowercase and strip everything non-alphanumeric, so "Apollo Pharmacy
/// Pvt. Ltd." and "apollo pharmacy pvt ltd" compare equal.
pub(crate) fn normalize_name(name: &str) -> String {
    name.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::ollama::AiError;

    struct FixedLlm(&'static str);
    impl LlmClient for FixedLlm {
        fn generate(&self, _model: &str, _prompt: &str, _system: &str) -> Result<String, AiError> {
            Ok(self.0.to_string())
        }
    }

    struct FailingLlm;
    impl LlmClient for FailingLlm {
        fn generate(&self, _model: &str, _prompt: &str, _system: &str) -> Result<String, AiError> {
            Err(AiError::Connection("http://localhost:11434".into()))
        }
    }

    const BILL_TEXT: &str = "APOLLO PHARMACY PVT LTD\n12 MG Road\nGSTIN 29ABCDE\n\nParacetamol 500mg x10 ₹20";

    #[test]
    fn containment_accepts_shortened_detection() {
        let llm = FixedLlm("apollo pharmacy");
        let verdict = verify_ownership(
            Some(&llm),
            "llama3.1",
            BILL_TEXT,
            "Apollo Pharmacy Pvt Ltd",
        );
        assert_eq!(verdict, OwnershipVerdict::Accepted);
    }

    #[test]
    fn mismatch_is_rejected() {
        let llm = FixedLlm("XYZ Mart");
        let verdict = verify_ownership(Some(&llm), "llama3.1", BILL_TEXT, "Apollo");
        assert!(matches!(verdict, OwnershipVerdict::Rejected { .. }));
    }

    #[test]
    fn unknown_sentinel_falls_back_to_header() {
        let llm = FixedLlm("Unknown");
        // Header contains "apollo pharmacy pvt ltd", which contains "apollo".
        let verdict = verify_ownership(Some(&llm), "llama3.1", BILL_TEXT, "Apollo");
        assert_eq!(verdict, OwnershipVerdict::Accepted);

        // And the same header rejects a stranger.
        let llm = FixedLlm("Unknown");
        let verdict = verify_ownership(Some(&llm), "llama3.1", BILL_TEXT, "MedPlus");
        assert!(matches!(verdict, OwnershipVerdict::Rejected { .. }));
    }

    #[test]
    fn service_error_is_not_a_rejection() {
        let verdict = verify_ownership(Some(&FailingLlm), "llama3.1", BILL_TEXT, "Apollo");
        assert_eq!(verdict, OwnershipVerdict::Accepted);
    }

    #[test]
    fn no_llm_uses_header_heuristic() {
        let verdict = verify_ownership(None, "llama3.1", BILL_TEXT, "Apollo Pharmacy");
        assert_eq!(verdict, OwnershipVerdict::Accepted);
    }

    #[test]
    fn empty_text_is_accepted() {
        // No name could be detected at all: absence of evidence.
        let verdict = verify_ownership(None, "llama3.1", "   \n\n  ", "Apollo");
        assert_eq!(verdict, OwnershipVerdict::Accepted);
    }

    #[test]
    fn normalization_strips_punctuation_and_case() {
        assert_eq!(
            normalize_name("Apollo Pharmacy Pvt. Ltd."),
            "apollopharmacypvtltd"
        );
        assert_eq!(normalize_name("  XYZ-Mart #3 "), "xyzmart3");
        assert_eq!(normalize_name("™©"), "");
    }
}
