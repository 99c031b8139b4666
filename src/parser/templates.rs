//! Template-index parsing strategy.
//!
//! Extraction templates are line-oriented regular expressions with named
//! capture groups; each matching line yields one record. The registry maps
//! `(brand, command type)` to a template, is populated with built-ins on
//! first use, and accepts caller-registered templates at runtime.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::brand::Brand;
use crate::error::{NetopsError, Result};

use super::ParsedRecord;

/// A compiled line-oriented extraction template.
#[derive(Debug)]
pub struct ExtractionTemplate {
    name: String,
    line_pattern: Regex,
}

impl ExtractionTemplate {
    /// Compiles a template. The pattern must contain at least one named
    /// capture group; the group names become record field names.
    pub fn new(name: impl Into<String>, pattern: &str) -> Result<Self> {
        let line_pattern = Regex::new(pattern)
            .map_err(|err| NetopsError::ParseFailure(format!("invalid extraction pattern: {err}")))?;
        if line_pattern.capture_names().flatten().next().is_none() {
            return Err(NetopsError::ParseFailure(
                "extraction pattern has no named capture groups".to_string(),
            ));
        }
        Ok(Self {
            name: name.into(),
            line_pattern,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Extracts one record per matching line.
    pub fn extract(&self, raw: &str) -> Vec<ParsedRecord> {
        raw.lines()
            .filter_map(|line| self.line_pattern.captures(line))
            .map(|caps| {
                self.line_pattern
                    .capture_names()
                    .flatten()
                    .filter_map(|group| {
                        caps.name(group)
                            .map(|m| (group.to_string(), m.as_str().to_string()))
                    })
                    .collect()
            })
            .collect()
    }
}

type RegistryKey = (Brand, String);

static REGISTRY: Lazy<RwLock<HashMap<RegistryKey, Arc<ExtractionTemplate>>>> =
    Lazy::new(|| RwLock::new(builtin_templates()));

fn insert_builtin(
    map: &mut HashMap<RegistryKey, Arc<ExtractionTemplate>>,
    brand: Brand,
    command_type: &str,
    pattern: &str,
) {
    let name = format!("{brand}/{command_type}");
    let template = ExtractionTemplate::new(name, pattern).expect("builtin extraction template");
    map.insert((brand, command_type.to_string()), Arc::new(template));
}

fn builtin_templates() -> HashMap<RegistryKey, Arc<ExtractionTemplate>> {
    let mut map = HashMap::new();

    insert_builtin(
        &mut map,
        Brand::Cisco,
        "show_version",
        r"^Cisco IOS(?: XE)? Software.*Version (?P<version>[^,\s]+)",
    );
    insert_builtin(
        &mut map,
        Brand::Cisco,
        "show_interface",
        r"^(?P<interface>\S+)\s+(?P<ip_address>\S+)\s+\S+\s+\S+\s+(?P<status>up|down|administratively down)\s+(?P<protocol>up|down)\s*$",
    );
    insert_builtin(
        &mut map,
        Brand::Cisco,
        "show_vlan",
        r"^(?P<vlan_id>\d+)\s+(?P<name>\S+)\s+(?P<status>active|suspended|act/unsup)\s*(?P<ports>.*)$",
    );
    insert_builtin(
        &mut map,
        Brand::Cisco,
        "show_arp",
        r"^Internet\s+(?P<ip_address>\d+\.\d+\.\d+\.\d+)\s+(?P<age>\S+)\s+(?P<mac_address>[0-9a-fA-F]{4}\.[0-9a-fA-F]{4}\.[0-9a-fA-F]{4})\s+ARPA\s+(?P<interface>\S+)",
    );
    insert_builtin(
        &mut map,
        Brand::Cisco,
        "show_mac",
        r"^\s*(?P<vlan>\d+)\s+(?P<mac_address>[0-9a-fA-F]{4}\.[0-9a-fA-F]{4}\.[0-9a-fA-F]{4})\s+(?P<entry_type>\S+)\s+(?P<port>\S+)\s*$",
    );

    insert_builtin(
        &mut map,
        Brand::Huawei,
        "show_version",
        r"^VRP \(R\) software, Version (?P<version>\S+)",
    );
    insert_builtin(
        &mut map,
        Brand::Huawei,
        "show_interface",
        r"^(?P<interface>\S+)\s+(?P<phy_status>\*?(?:up|down))\s+(?P<protocol_status>\*?(?:up|down))\b.*$",
    );
    insert_builtin(
        &mut map,
        Brand::Huawei,
        "show_arp",
        r"^(?P<ip_address>\d+\.\d+\.\d+\.\d+)\s+(?P<mac_address>[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4})\s+(?P<expire>\S+)\s+(?P<entry_type>\S+)\s+(?P<interface>\S+)",
    );
    insert_builtin(
        &mut map,
        Brand::Huawei,
        "show_mac",
        r"^(?P<mac_address>[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4})\s+(?P<vlan>\d+)(?:/\S+)?\s+(?P<port>\S+)\s+(?P<entry_type>\S+)",
    );

    insert_builtin(
        &mut map,
        Brand::H3c,
        "show_version",
        r"^H3C Comware Software, Version (?P<version>.+?)\s*$",
    );
    insert_builtin(
        &mut map,
        Brand::H3c,
        "show_interface",
        r"^(?P<interface>\S+)\s+(?P<phy_status>\*?(?:up|down))\s+(?P<protocol_status>\*?(?:up|down))\b.*$",
    );
    insert_builtin(
        &mut map,
        Brand::H3c,
        "show_mac",
        r"^(?P<mac_address>[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4})\s+(?P<vlan>\d+)\s+(?P<entry_type>\S+)\s+(?P<port>\S+)\s+(?P<aging>\S+)\s*$",
    );

    insert_builtin(
        &mut map,
        Brand::Juniper,
        "show_version",
        r"^Junos: (?P<version>\S+)",
    );
    insert_builtin(
        &mut map,
        Brand::Juniper,
        "show_interface",
        r"^(?P<interface>[a-z]+-\d+/\d+/\d+(?:\.\d+)?|lo\d+|fxp\d+|em\d+)\s+(?P<admin_status>up|down)\s+(?P<link_status>up|down)\b.*$",
    );

    insert_builtin(
        &mut map,
        Brand::Arista,
        "show_version",
        r"^Software image version:\s+(?P<version>\S+)",
    );

    map
}

/// Registers (or replaces) a template for a `(brand, command type)` pair.
pub fn register_template(brand: Brand, command_type: &str, template: ExtractionTemplate) {
    let mut registry = REGISTRY.write().expect("template registry poisoned");
    registry.insert((brand, command_type.to_string()), Arc::new(template));
}

/// Looks up a registered template.
pub fn lookup(brand: Brand, command_type: &str) -> Option<Arc<ExtractionTemplate>> {
    let registry = REGISTRY.read().expect("template registry poisoned");
    registry.get(&(brand, command_type.to_string())).cloned()
}

/// Runs the template-index strategy for one output.
pub(super) fn extract(
    brand: Brand,
    command_type: &str,
    raw: &str,
) -> Result<(String, Vec<ParsedRecord>)> {
    let template = lookup(brand, command_type).ok_or_else(|| NetopsError::TemplateNotFound {
        brand: brand.to_string(),
        command_type: command_type.to_string(),
    })?;
    Ok((template.name().to_string(), template.extract(raw)))
}
