//! Structured parsing of raw CLI output.
//!
//! Two interchangeable strategies are tried in order, falling back to raw
//! passthrough when neither produces records:
//!
//! 1. **Template index** ([`templates`]) — extraction templates keyed by
//!    `(brand, command type)`.
//! 2. **Vendor table** ([`table`]) — TextFSM templates keyed by the brand's
//!    fixed platform identifier.
//!
//! Parsing never fails the surrounding command execution: a strategy error is
//! folded into the outcome and the raw output is preserved.

use std::collections::HashMap;

use log::debug;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::brand::{Brand, HostFacts};

pub mod format;
pub mod table;
pub mod templates;

pub use format::{BatchSummary, Fidelity, format_batch, format_outcome, summary_report};
pub use table::platform_for;
pub use templates::{ExtractionTemplate, register_template};

/// One parsed row: field name to extracted value.
pub type ParsedRecord = HashMap<String, String>;

/// Which strategy produced (or failed to produce) the structured data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ParseMethod {
    TemplateIndex,
    VendorTable,
    RawOnly,
}

impl ParseMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParseMethod::TemplateIndex => "template_index",
            ParseMethod::VendorTable => "vendor_table",
            ParseMethod::RawOnly => "raw_only",
        }
    }
}

/// Result of parsing one command output.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ParseOutcome {
    pub success: bool,
    pub data: Vec<ParsedRecord>,
    pub parse_method: ParseMethod,
    pub brand: Brand,
    pub command: String,
    pub command_type: String,
    /// Identity of the template that produced the data.
    pub template: Option<String>,
    /// Original output, carried when no strategy produced records.
    pub raw_output: Option<String>,
    /// Brand-detection confidence, when the caller ran detection.
    pub brand_confidence: Option<f64>,
    pub error: Option<String>,
}

/// One item of a batch parse.
#[derive(Debug, Clone)]
pub struct ParseRequest {
    pub raw_output: String,
    pub command: String,
    pub brand: Brand,
}

/// Ordered substring rules mapping a command string to a command type.
/// First match wins.
const COMMAND_TYPE_RULES: &[(&str, &str)] = &[
    ("version", "show_version"),
    ("running-config", "show_running_config"),
    ("current-configuration", "show_running_config"),
    ("interface", "show_interface"),
    ("route", "show_ip_route"),
    ("vlan", "show_vlan"),
    ("arp", "show_arp"),
    ("mac", "show_mac"),
];

/// Derives the command type used for template lookup.
pub fn infer_command_type(command: &str) -> String {
    let normalized = command.trim().to_ascii_lowercase();
    for (needle, command_type) in COMMAND_TYPE_RULES {
        if normalized.contains(needle) {
            return (*command_type).to_string();
        }
    }
    normalized.replace([' ', '-', '/'], "_")
}

/// Parses raw output through the strategy chain.
pub fn parse(raw_output: &str, command: &str, brand: Brand) -> ParseOutcome {
    let command_type = infer_command_type(command);
    let mut failures: Vec<String> = Vec::new();

    match templates::extract(brand, &command_type, raw_output) {
        Ok((template, records)) if !records.is_empty() => {
            return ParseOutcome {
                success: true,
                data: records,
                parse_method: ParseMethod::TemplateIndex,
                brand,
                command: command.to_string(),
                command_type,
                template: Some(template),
                raw_output: None,
                brand_confidence: None,
                error: None,
            };
        }
        Ok((template, _)) => failures.push(format!("template {template} matched no records")),
        Err(err) => failures.push(err.to_string()),
    }

    match table::parse(brand, &command_type, raw_output) {
        Ok((template, records)) if !records.is_empty() => {
            return ParseOutcome {
                success: true,
                data: records,
                parse_method: ParseMethod::VendorTable,
                brand,
                command: command.to_string(),
                command_type,
                template: Some(template),
                raw_output: None,
                brand_confidence: None,
                error: None,
            };
        }
        Ok((template, _)) => failures.push(format!("vendor table {template} matched no records")),
        Err(err) => failures.push(err.to_string()),
    }

    debug!("parse fell back to raw output for '{command}' ({brand}): {}", failures.join("; "));

    ParseOutcome {
        success: false,
        data: Vec::new(),
        parse_method: ParseMethod::RawOnly,
        brand,
        command: command.to_string(),
        command_type,
        template: None,
        raw_output: Some(raw_output.to_string()),
        brand_confidence: None,
        error: Some(failures.join("; ")),
    }
}

/// Detects the brand from host facts and raw output, then parses.
///
/// Returns `None` when no brand can be determined; otherwise the outcome
/// carries the detection confidence.
pub fn parse_with_detection(
    raw_output: &str,
    command: &str,
    facts: &HostFacts,
) -> Option<ParseOutcome> {
    let (brand, confidence) = crate::brand::detect(facts, Some(raw_output));
    brand.map(|brand| {
        let mut outcome = parse(raw_output, command, brand);
        outcome.brand_confidence = Some(confidence);
        outcome
    })
}

/// Parses a batch of items independently. One item's failure becomes a
/// failure record for that item only; this call itself cannot fail.
pub fn parse_batch(requests: &[ParseRequest]) -> Vec<ParseOutcome> {
    requests
        .iter()
        .map(|request| parse(&request.raw_output, &request.command, request.brand))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const CISCO_IP_INT_BRIEF: &str = "\
Interface              IP-Address      OK? Method Status                Protocol
GigabitEthernet0/1     10.0.0.1        YES manual up                    up
GigabitEthernet0/2     unassigned      YES unset  administratively down down
";

    #[test]
    fn command_type_inference_follows_rule_order() {
        assert_eq!(infer_command_type("show version"), "show_version");
        assert_eq!(infer_command_type("display version"), "show_version");
        assert_eq!(infer_command_type("show ip interface brief"), "show_interface");
        assert_eq!(infer_command_type("display ip routing-table"), "show_ip_route");
        assert_eq!(infer_command_type("show mac address-table"), "show_mac");
        assert_eq!(infer_command_type("display current-configuration"), "show_running_config");
    }

    #[test]
    fn unknown_command_type_is_the_sanitized_command() {
        assert_eq!(infer_command_type("show spanning-tree"), "show_spanning_tree");
    }

    #[test]
    fn template_index_strategy_is_tried_first() {
        let outcome = parse(CISCO_IP_INT_BRIEF, "show ip interface brief", Brand::Cisco);
        assert!(outcome.success);
        assert_eq!(outcome.parse_method, ParseMethod::TemplateIndex);
        assert_eq!(outcome.data.len(), 2);
        assert_eq!(outcome.data[0].get("interface").map(String::as_str), Some("GigabitEthernet0/1"));
        assert_eq!(
            outcome.data[1].get("status").map(String::as_str),
            Some("administratively down")
        );
        assert!(outcome.raw_output.is_none());
    }

    #[test]
    fn missing_template_falls_back_to_raw_output() {
        let raw = "some output nothing can parse";
        let outcome = parse(raw, "show obscure feature", Brand::Arista);
        assert!(!outcome.success);
        assert_eq!(outcome.parse_method, ParseMethod::RawOnly);
        assert_eq!(outcome.raw_output.as_deref(), Some(raw));
        assert!(outcome.error.is_some());
        assert!(outcome.data.is_empty());
    }

    #[test]
    fn detection_integrated_parse_stamps_confidence() {
        let facts = HostFacts {
            platform: Some("cisco_iosxe".to_string()),
            ..Default::default()
        };
        let raw = "Cisco IOS XE Software, Version 17.03.04\nsw1 uptime is 1 week\n";
        let outcome = parse_with_detection(raw, "show version", &facts).expect("brand detected");
        assert_eq!(outcome.brand, Brand::Cisco);
        assert_eq!(outcome.brand_confidence, Some(0.95));
        assert!(outcome.success);

        let unknown = HostFacts::default();
        assert!(parse_with_detection("nothing recognizable", "show version", &unknown).is_none());
    }

    #[test]
    fn batch_parse_isolates_failures_per_item() {
        let requests = vec![
            ParseRequest {
                raw_output: CISCO_IP_INT_BRIEF.to_string(),
                command: "show ip interface brief".to_string(),
                brand: Brand::Cisco,
            },
            ParseRequest {
                raw_output: "garbage".to_string(),
                command: "show obscure".to_string(),
                brand: Brand::Huawei,
            },
            ParseRequest {
                raw_output: "more garbage".to_string(),
                command: "show other".to_string(),
                brand: Brand::Cisco,
            },
        ];

        let outcomes = parse_batch(&requests);
        assert_eq!(outcomes.len(), 3);
        assert!(outcomes[0].success);
        assert!(!outcomes[1].success);
        assert!(!outcomes[2].success);
        assert_eq!(outcomes[1].parse_method, ParseMethod::RawOnly);
        assert_eq!(outcomes[2].parse_method, ParseMethod::RawOnly);
    }
}
