//! Result formatting and batch summary reporting.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::ParseOutcome;

/// How many error details a batch summary carries at most.
pub const MAX_REPORTED_ERRORS: usize = 10;

/// Output fidelity for formatted parse results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Fidelity {
    /// Success flag, data, and error only.
    Compact,
    /// Adds command/brand/method/timestamp metadata.
    Standard,
    /// Adds confidence, template identity, and command classification.
    Detailed,
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Formats one parse outcome at the requested fidelity.
pub fn format_outcome(outcome: &ParseOutcome, fidelity: Fidelity) -> Value {
    let mut value = match fidelity {
        Fidelity::Compact => json!({
            "success": outcome.success,
            "data": outcome.data,
        }),
        Fidelity::Standard => json!({
            "success": outcome.success,
            "data": outcome.data,
            "metadata": {
                "command": outcome.command,
                "brand": outcome.brand.as_str(),
                "parse_method": outcome.parse_method.as_str(),
                "timestamp_ms": now_ms(),
            },
        }),
        Fidelity::Detailed => json!({
            "success": outcome.success,
            "data": outcome.data,
            "raw_output": outcome.raw_output,
            "metadata": {
                "command": outcome.command,
                "brand": outcome.brand.as_str(),
                "command_type": outcome.command_type,
                "parse_method": outcome.parse_method.as_str(),
                "template": outcome.template,
                "confidence": outcome.brand_confidence,
                "timestamp_ms": now_ms(),
            },
        }),
    };

    if let Some(error) = &outcome.error
        && let Some(map) = value.as_object_mut()
    {
        map.insert("error".to_string(), json!(error));
    }

    value
}

/// Formats a batch of outcomes at one fidelity.
pub fn format_batch(outcomes: &[ParseOutcome], fidelity: Fidelity) -> Vec<Value> {
    outcomes
        .iter()
        .map(|outcome| format_outcome(outcome, fidelity))
        .collect()
}

/// One reported batch error.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BatchErrorDetail {
    pub command: String,
    pub brand: String,
    pub error: String,
}

/// Aggregate view of a parse batch.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub success_rate_pct: f64,
    pub brand_distribution: BTreeMap<String, usize>,
    pub parse_method_distribution: BTreeMap<String, usize>,
    /// First [`MAX_REPORTED_ERRORS`] error details.
    pub errors: Vec<BatchErrorDetail>,
    pub generated_at_ms: u64,
}

/// Aggregates a batch into counts, distributions, and a capped error list.
pub fn summary_report(outcomes: &[ParseOutcome]) -> BatchSummary {
    let total = outcomes.len();
    let succeeded = outcomes.iter().filter(|o| o.success).count();
    let failed = total - succeeded;

    let mut brand_distribution = BTreeMap::new();
    let mut parse_method_distribution = BTreeMap::new();
    let mut errors = Vec::new();

    for outcome in outcomes {
        *brand_distribution
            .entry(outcome.brand.as_str().to_string())
            .or_insert(0) += 1;
        *parse_method_distribution
            .entry(outcome.parse_method.as_str().to_string())
            .or_insert(0) += 1;

        if !outcome.success
            && let Some(error) = &outcome.error
            && errors.len() < MAX_REPORTED_ERRORS
        {
            errors.push(BatchErrorDetail {
                command: outcome.command.clone(),
                brand: outcome.brand.as_str().to_string(),
                error: error.clone(),
            });
        }
    }

    let success_rate_pct = if total > 0 {
        (succeeded as f64 / total as f64 * 10_000.0).round() / 100.0
    } else {
        0.0
    };

    BatchSummary {
        total,
        succeeded,
        failed,
        success_rate_pct,
        brand_distribution,
        parse_method_distribution,
        errors,
        generated_at_ms: now_ms(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brand::Brand;
    use crate::parser::ParseMethod;

    fn outcome(success: bool, brand: Brand) -> ParseOutcome {
        ParseOutcome {
            success,
            data: Vec::new(),
            parse_method: if success {
                ParseMethod::TemplateIndex
            } else {
                ParseMethod::RawOnly
            },
            brand,
            command: "show version".to_string(),
            command_type: "show_version".to_string(),
            template: success.then(|| "cisco/show_version".to_string()),
            raw_output: (!success).then(|| "raw".to_string()),
            brand_confidence: Some(0.8),
            error: (!success).then(|| "no template".to_string()),
        }
    }

    #[test]
    fn compact_format_has_no_metadata() {
        let value = format_outcome(&outcome(true, Brand::Cisco), Fidelity::Compact);
        assert!(value.get("metadata").is_none());
        assert_eq!(value.get("success"), Some(&serde_json::json!(true)));
    }

    #[test]
    fn standard_format_carries_method_and_brand() {
        let value = format_outcome(&outcome(true, Brand::Cisco), Fidelity::Standard);
        let metadata = value.get("metadata").expect("metadata");
        assert_eq!(metadata.get("brand"), Some(&serde_json::json!("cisco")));
        assert_eq!(
            metadata.get("parse_method"),
            Some(&serde_json::json!("template_index"))
        );
    }

    #[test]
    fn detailed_format_carries_template_and_confidence() {
        let value = format_outcome(&outcome(true, Brand::Cisco), Fidelity::Detailed);
        let metadata = value.get("metadata").expect("metadata");
        assert_eq!(
            metadata.get("template"),
            Some(&serde_json::json!("cisco/show_version"))
        );
        assert_eq!(metadata.get("confidence"), Some(&serde_json::json!(0.8)));
    }

    #[test]
    fn failure_formats_carry_the_error() {
        let value = format_outcome(&outcome(false, Brand::Huawei), Fidelity::Compact);
        assert_eq!(value.get("error"), Some(&serde_json::json!("no template")));
    }

    #[test]
    fn summary_counts_and_caps_errors() {
        let mut outcomes = vec![outcome(true, Brand::Cisco), outcome(true, Brand::Huawei)];
        for _ in 0..15 {
            outcomes.push(outcome(false, Brand::H3c));
        }

        let summary = summary_report(&outcomes);
        assert_eq!(summary.total, 17);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 15);
        assert_eq!(summary.errors.len(), MAX_REPORTED_ERRORS);
        assert_eq!(summary.brand_distribution.get("h3c"), Some(&15));
        assert_eq!(
            summary.parse_method_distribution.get("raw_only"),
            Some(&15)
        );
    }

    #[test]
    fn empty_batch_summary_is_zeroed() {
        let summary = summary_report(&[]);
        assert_eq!(summary.total, 0);
        assert_eq!(summary.success_rate_pct, 0.0);
        assert!(summary.errors.is_empty());
    }
}
