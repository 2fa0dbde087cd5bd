//! Line-item extraction from recognized bill text.
//!
//! Two-tier strategy: a structured LLM extraction with a fixed JSON schema,
//! and a deterministic line-oriented parser used whenever the service is
//! absent, unreachable, or returns something unparseable. The function is
//! total (any input yields a possibly empty candidate list, never an
//! error), so the pipeline always has something to reconcile.

use std::collections::HashSet;
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::Deserialize;

use super::ollama::LlmClient;

/// An extracted line item awaiting reconciliation. Never persisted.
///
/// `quantity`/`price`/`expiry_date` are `None` when the bill did not supply
/// them; reconciliation merges only supplied fields into existing items.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateItem {
    pub name: String,
    pub generic_name: String,
    pub category: String,
    pub form: String,
    pub quantity: Option<i64>,
    pub price: Option<f64>,
    pub expiry_date: Option<NaiveDate>,
}

const EXTRACTION_SYSTEM_PROMPT: &str = "\
You are given raw OCR text extracted from a pharmacy bill. Extract medicine \
items as a JSON array. Each item must have:
- name (string)
- genericName (string or empty)
- category (string, e.g., Painkillers, Antibiotics, or \"Unknown\")
- form (string like Tablet, Syrup or empty)
- quantity (integer or 0)
- price (number or null)
- expiryDate (YYYY-MM-DD or null)

Return only valid JSON (an array). Example:
[{\"name\":\"Paracetamol\",\"genericName\":\"Acetaminophen\",\"category\":\"Painkillers\",\"form\":\"Tablet\",\"quantity\":10,\"price\":20,\"expiryDate\":null}]";

fn build_extraction_prompt(raw_text: &str) -> String {
    format!("OCR TEXT:\n---\n{raw_text}\n---")
}

/// Extract candidate line items from recognized bill text.
pub fn extract_candidates(
    llm: Option<&dyn LlmClient>,
    model: &str,
    raw_text: &str,
) -> Vec<CandidateItem> {
    if let Some(llm) = llm {
        match llm.generate(model, &build_extraction_prompt(raw_text), EXTRACTION_SYSTEM_PROMPT) {
            Ok(response) => {
                if let Some(candidates) = parse_candidates_json(&response) {
                    tracing::debug!(count = candidates.len(), "Structured extraction succeeded");
                    return candidates;
                }
                tracing::warn!("Structured extraction returned unparseable output, falling back");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Structured extraction failed, falling back");
            }
        }
    }
    fallback_parse(raw_text)
}

/// Loosely-typed item as the extraction service reports it.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCandidate {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    generic_name: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    form: Option<String>,
    #[serde(default)]
    quantity: Option<serde_json::Value>,
    #[serde(default)]
    price: Option<serde_json::Value>,
    #[serde(default)]
    expiry_date: Option<String>,
}

/// Locate and parse the JSON array in an LLM response.
///
/// The payload is found by scanning for the first `[` and last `]`, which
/// tolerates prose around the array. Malformed entries are skipped rather
/// than failing the batch; a response with no parseable array is None.
fn parse_candidates_json(response: &str) -> Option<Vec<CandidateItem>> {
    let start = response.find('[')?;
    let end = response.rfind(']')?;
    if end < start {
        return None;
    }

    let values: Vec<serde_json::Value> = serde_json::from_str(&response[start..=end]).ok()?;

    let candidates = values
        .into_iter()
        .filter_map(|value| serde_json::from_value::<RawCandidate>(value).ok())
        .filter_map(candidate_from_raw)
        .collect();
    Some(candidates)
}

fn candidate_from_raw(raw: RawCandidate) -> Option<CandidateItem> {
    let name = raw.name?.trim().to_string();
    if name.is_empty() {
        return None;
    }

    let category = raw
        .category
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| "Unknown".to_string());

    Some(CandidateItem {
        name,
        generic_name: raw.generic_name.unwrap_or_default().trim().to_string(),
        category,
        form: raw.form.unwrap_or_default().trim().to_string(),
        quantity: raw
            .quantity
            .as_ref()
            .and_then(json_to_quantity)
            .filter(|q| *q >= 0),
        price: raw
            .price
            .as_ref()
            .and_then(serde_json::Value::as_f64)
            .filter(|p| *p >= 0.0),
        expiry_date: raw.expiry_date.as_deref().and_then(parse_expiry_date),
    })
}

fn json_to_quantity(value: &serde_json::Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|f| f.trunc() as i64))
}

/// Parse an expiry date as the service reports it (ISO first, then the
/// regional day-first forms that show up on printed bills).
fn parse_expiry_date(date_str: &str) -> Option<NaiveDate> {
    let trimmed = date_str.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return None;
    }

    // ISO 8601: YYYY-MM-DD
    if let Ok(d) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Some(d);
    }
    // DD/MM/YYYY
    if let Ok(d) = NaiveDate::parse_from_str(trimmed, "%d/%m/%Y") {
        return Some(d);
    }
    // DD-MM-YYYY
    if let Ok(d) = NaiveDate::parse_from_str(trimmed, "%d-%m-%Y") {
        return Some(d);
    }
    // MM/YYYY (expiry as printed on blister packs) -> first of the month
    if let Ok(d) = NaiveDate::parse_from_str(&format!("01/{trimmed}"), "%d/%m/%Y") {
        return Some(d);
    }
    None
}

/// One bill line: leading alphabetic name, optional dosage/unit token,
/// optional `x`-multiplier, optional currency amount. Lines that do not fit
/// (totals, addresses, GSTIN rows) simply fail the match and are discarded.
static LINE_ITEM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?P<name>[A-Za-z][A-Za-z\s\-/]*?)\s*(?:\d+(?:\.\d+)?\s*(?:mg|mcg|g|ml|iu|tabs?|tablets?|caps?|capsules?|pcs)\b\.?)?\s*(?:x\s*(?P<qty>\d+))?\s*(?:(?:₹|Rs\.?|INR)\s*(?P<price>\d+(?:\.\d+)?))?\s*$",
    )
    .unwrap()
});

/// Deterministic line-oriented parser, used when no extraction service is
/// configured or its output is unusable. Trades precision for availability.
pub(crate) fn fallback_parse(raw_text: &str) -> Vec<CandidateItem> {
    let mut items = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for line in raw_text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let Some(captures) = LINE_ITEM_RE.captures(line) else {
            continue;
        };
        let name = captures["name"].trim().to_string();
        if name.is_empty() {
            continue;
        }

        // Dedupe by case-insensitive name, keeping the first occurrence.
        if !seen.insert(name.to_lowercase()) {
            continue;
        }

        let quantity = captures
            .name("qty")
            .and_then(|m| m.as_str().parse::<i64>().ok())
            .unwrap_or(0);
        let price = captures
            .name("price")
            .and_then(|m| m.as_str().parse::<f64>().ok());

        items.push(CandidateItem {
            name,
            generic_name: String::new(),
            category: "Unknown".to_string(),
            form: String::new(),
            quantity: Some(quantity),
            price,
            expiry_date: None,
        });
    }

    tracing::debug!(count = items.len(), "Fallback parser extracted candidates");
    items
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

    // ── Structured extraction ──

    #[test]
    fn parses_json_surrounded_by_prose() {
        let llm = FixedLlm(
            r#"Here are the extracted items:
[{"name":"Paracetamol","genericName":"Acetaminophen","category":"Painkillers","form":"Tablet","quantity":10,"price":20,"expiryDate":"2027-03-31"}]
Let me know if you need anything else."#,
        );
        let items = extract_candidates(Some(&llm), "llama3.1", "whatever");
        assert_eq!(items.len(), 1);
        let item = &items[0];
        assert_eq!(item.name, "Paracetamol");
        assert_eq!(item.generic_name, "Acetaminophen");
        assert_eq!(item.category, "Painkillers");
        assert_eq!(item.quantity, Some(10));
        assert_eq!(item.price, Some(20.0));
        assert_eq!(item.expiry_date, NaiveDate::from_ymd_opt(2027, 3, 31));
    }

    #[test]
    fn malformed_entries_are_skipped_not_fatal() {
        let llm = FixedLlm(
            r#"[{"name":"Paracetamol","quantity":10},
                 {"name":42},
                 "not even an object",
                 {"quantity":5},
                 {"name":"  "},
                 {"name":"Cetirizine","price":-3,"quantity":-1}]"#,
        );
        let items = extract_candidates(Some(&llm), "llama3.1", "whatever");
        // The nameless/invalid entries vanish; negative numbers are dropped
        // field-wise, not item-wise.
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].name, "Paracetamol");
        assert_eq!(items[0].category, "Unknown");
        assert_eq!(items[1].name, "Cetirizine");
        assert_eq!(items[1].quantity, None);
        assert_eq!(items[1].price, None);
    }

    #[test]
    fn unparseable_response_falls_back() {
        let llm = FixedLlm("I could not find any items, sorry.");
        let items = extract_candidates(
            Some(&llm),
            "llama3.1",
            "Paracetamol 500mg x10 ₹20",
        );
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "Paracetamol");
    }

    #[test]
    fn service_error_falls_back() {
        let items = extract_candidates(
            Some(&FailingLlm),
            "llama3.1",
            "Paracetamol 500mg x10 ₹20",
        );
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "Paracetamol");
    }

    #[test]
    fn empty_array_is_a_valid_result() {
        let llm = FixedLlm("[]");
        let items = extract_candidates(Some(&llm), "llama3.1", "TOTAL ₹240\nThank you");
        assert!(items.is_empty());
    }

    #[test]
    fn expiry_date_formats() {
        assert_eq!(
            parse_expiry_date("2027-03-31"),
            NaiveDate::from_ymd_opt(2027, 3, 31)
        );
        assert_eq!(
            parse_expiry_date("31/03/2027"),
            NaiveDate::from_ymd_opt(2027, 3, 31)
        );
        assert_eq!(
            parse_expiry_date("31-03-2027"),
            NaiveDate::from_ymd_opt(2027, 3, 31)
        );
        assert_eq!(
            parse_expiry_date("03/2027"),
            NaiveDate::from_ymd_opt(2027, 3, 1)
        );
        assert_eq!(parse_expiry_date("null"), None);
        assert_eq!(parse_expiry_date("soon"), None);
    }

    // ── Fallback parser ──

    #[test]
    fn fallback_parses_a_full_line() {
        let items = fallback_parse("Paracetamol 500mg x10 ₹20");
        assert_eq!(items.len(), 1);
        let item = &items[0];
        assert_eq!(item.name, "Paracetamol");
        assert_eq!(item.quantity, Some(10));
        assert_eq!(item.price, Some(20.0));
        assert_eq!(item.category, "Unknown");
        assert_eq!(item.expiry_date, None);
    }

    #[test]
    fn fallback_handles_partial_lines() {
        let items = fallback_parse("Cetirizine\nBenadryl Syrup 100ml ₹95\nCrocin x5");
        assert_eq!(items.len(), 3);

        assert_eq!(items[0].name, "Cetirizine");
        assert_eq!(items[0].quantity, Some(0));
        assert_eq!(items[0].price, None);

        assert_eq!(items[1].name, "Benadryl Syrup");
        assert_eq!(items[1].price, Some(95.0));

        assert_eq!(items[2].name, "Crocin");
        assert_eq!(items[2].quantity, Some(5));
    }

    #[test]
    fn fallback_accepts_rs_currency_marker() {
        let items = fallback_parse("Azithromycin 250mg x6 Rs. 120.50");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "Azithromycin");
        assert_eq!(items[0].quantity, Some(6));
        assert_eq!(items[0].price, Some(120.50));
    }

    #[test]
    fn fallback_discards_lines_without_a_name() {
        let text = "12/04/2026\nGSTIN: 29ABCDE1234F\nTOTAL: ₹240\n₹ 20\nParacetamol 500mg x10 ₹20";
        let items = fallback_parse(text);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "Paracetamol");
    }

    #[test]
    fn fallback_dedupes_case_insensitively() {
        let items = fallback_parse("Paracetamol 500mg x10 ₹20\nPARACETAMOL x99");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].quantity, Some(10));
    }

    #[test]
    fn extraction_is_total_on_arbitrary_text() {
        for text in ["", "\n\n\n", "∆∆∆ 123 ###", "x10 ₹20"] {
            let items = extract_candidates(None, "llama3.1", text);
            assert!(items.is_empty(), "expected no items for {text:?}");
        }
    }
}
