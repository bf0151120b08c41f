//! Confidence extraction and consensus scoring (spec §4.5, §8 "Confidence extraction
//! idempotence")
//!
//! Grounded on `original_source/backend/agents/agent_to_agent_communicator.py`'s
//! `_extract_confidence_score` and `_calculate_consensus_confidence`.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

static DECIMAL_CONFIDENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(0\.\d+|1\.0)").expect("static pattern"));
static PERCENT_CONFIDENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{1,3})%").expect("static pattern"));

/// Parses a numeric confidence out of free-form validator text. Decimal forms (`0.xxxx`, `1.0`)
/// are preferred; a trailing `NN%` is accepted next; absent either, `0.5` is returned. Pure
/// function of `text` (§8's idempotence property).
#[must_use]
pub fn extract_confidence_score(text: &str) -> f64 {
    if let Some(m) = DECIMAL_CONFIDENCE.captures(text) {
        if let Ok(value) = m[1].parse::<f64>() {
            return value;
        }
    }
    if let Some(m) = PERCENT_CONFIDENCE.captures(text) {
        if let Ok(percent) = m[1].parse::<f64>() {
            if (0.0..=100.0).contains(&percent) {
                return percent / 100.0;
            }
        }
    }
    0.5
}

/// Mean confidence across responses, penalized by `0.05` per distinct content beyond the first
/// (spec §4.5 "Parallel consensus", §8 scenario 5), clamped to `[0, 1]`.
#[must_use]
pub fn calculate_consensus_confidence(scores: &[f64], contents: &[String]) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    let avg = scores.iter().sum::<f64>() / scores.len() as f64;
    let unique: HashSet<&str> = contents.iter().map(String::as_str).collect();
    let diversity_penalty = unique.len().saturating_sub(1) as f64 * 0.05;
    (avg - diversity_penalty).clamp(0.0, 1.0)
}
