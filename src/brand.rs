//! Vendor brand detection.
//!
//! A brand can be inferred from device metadata (explicit brand field,
//! platform string, device type) or from raw command output (version banners
//! first, then keyword fallback). When both sources are available the
//! detector scores its confidence by how well they agree.

use std::fmt;

use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::device::DeviceRecord;

/// Supported device vendors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Brand {
    Cisco,
    Huawei,
    H3c,
    Juniper,
    Arista,
}

impl Brand {
    pub const ALL: &'static [Brand] = &[
        Brand::Cisco,
        Brand::Huawei,
        Brand::H3c,
        Brand::Juniper,
        Brand::Arista,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Brand::Cisco => "cisco",
            Brand::Huawei => "huawei",
            Brand::H3c => "h3c",
            Brand::Juniper => "juniper",
            Brand::Arista => "arista",
        }
    }

    /// Case-insensitive lookup in the supported set.
    pub fn parse(name: &str) -> Option<Brand> {
        match name.trim().to_ascii_lowercase().as_str() {
            "cisco" => Some(Brand::Cisco),
            "huawei" => Some(Brand::Huawei),
            "h3c" => Some(Brand::H3c),
            "juniper" => Some(Brand::Juniper),
            "arista" => Some(Brand::Arista),
            _ => None,
        }
    }
}

impl fmt::Display for Brand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Host facts fed to the detector. All fields optional.
#[derive(Debug, Default, Clone)]
pub struct HostFacts {
    /// Explicit brand field from the data store, when present.
    pub brand: Option<String>,
    pub platform: Option<String>,
    pub device_type: Option<String>,
}

impl From<&DeviceRecord> for HostFacts {
    fn from(device: &DeviceRecord) -> Self {
        HostFacts {
            brand: device.brand.clone(),
            platform: Some(device.platform.clone()),
            device_type: device.model.clone(),
        }
    }
}

struct BrandPatterns {
    brand: Brand,
    keywords: &'static [&'static str],
    version_patterns: Vec<Regex>,
}

static BRAND_PATTERNS: Lazy<Vec<BrandPatterns>> = Lazy::new(|| {
    fn compile(patterns: &[&str]) -> Vec<Regex> {
        patterns
            .iter()
            .map(|p| Regex::new(&format!("(?i){p}")).expect("brand version pattern"))
            .collect()
    }

    vec![
        BrandPatterns {
            brand: Brand::Cisco,
            keywords: &["cisco", "ios", "iosxe", "iosxr", "nxos", "asa"],
            version_patterns: compile(&[
                r"Cisco IOS",
                r"Cisco Nexus",
                r"Cisco Adaptive Security Appliance",
                r"IOS-XE",
                r"IOS-XR",
                r"System image file is.*cisco",
            ]),
        },
        BrandPatterns {
            brand: Brand::Huawei,
            keywords: &["huawei", "vrp", "cloudengine", "s5700", "s6700"],
            version_patterns: compile(&[
                r"Huawei Versatile Routing Platform",
                r"VRP \(R\) software",
                r"CloudEngine",
                r"HUAWEI.*Version",
            ]),
        },
        BrandPatterns {
            brand: Brand::H3c,
            keywords: &["h3c", "comware", "s5120", "s5130", "msr"],
            version_patterns: compile(&[
                r"H3C Comware",
                r"Comware Software",
                r"H3C.*Version",
            ]),
        },
        BrandPatterns {
            brand: Brand::Juniper,
            keywords: &["juniper", "junos", "srx", "mx", "qfx"],
            version_patterns: compile(&[r"JUNOS", r"Juniper Networks", r"junos-install"]),
        },
        BrandPatterns {
            brand: Brand::Arista,
            keywords: &["arista", "eos"],
            version_patterns: compile(&[r"Arista DCS", r"Arista EOS"]),
        },
    ]
});

/// Names of every supported brand.
pub fn supported_brands() -> Vec<&'static str> {
    Brand::ALL.iter().map(Brand::as_str).collect()
}

/// True when `name` is in the supported set (case-insensitive).
pub fn is_supported(name: &str) -> bool {
    Brand::parse(name).is_some()
}

fn match_keywords(value: &str) -> Option<Brand> {
    let value = value.to_ascii_lowercase();
    BRAND_PATTERNS
        .iter()
        .find(|p| p.keywords.iter().any(|k| value.contains(k)))
        .map(|p| p.brand)
}

/// Infers a brand from device metadata alone.
pub fn detect_from_metadata(facts: &HostFacts) -> Option<Brand> {
    if let Some(name) = facts.brand.as_deref()
        && let Some(brand) = Brand::parse(name)
    {
        debug!("brand taken from explicit metadata field: {brand}");
        return Some(brand);
    }

    if let Some(platform) = facts.platform.as_deref()
        && let Some(brand) = match_keywords(platform)
    {
        debug!("brand inferred from platform '{platform}': {brand}");
        return Some(brand);
    }

    if let Some(device_type) = facts.device_type.as_deref()
        && let Some(brand) = match_keywords(device_type)
    {
        debug!("brand inferred from device type '{device_type}': {brand}");
        return Some(brand);
    }

    None
}

/// Infers a brand from raw command output. Version banners are checked before
/// the keyword fallback.
pub fn detect_from_output(output: &str) -> Option<Brand> {
    if output.is_empty() {
        return None;
    }

    for patterns in BRAND_PATTERNS.iter() {
        if patterns.version_patterns.iter().any(|re| re.is_match(output)) {
            debug!("brand matched from output banner: {}", patterns.brand);
            return Some(patterns.brand);
        }
    }

    match_keywords(output)
}

/// Combined detection with a confidence score in `0.0..=1.0`.
///
/// Both sources agreeing scores highest; on disagreement, metadata wins when
/// the store carries an explicit brand field, otherwise the output wins.
pub fn detect(facts: &HostFacts, output: Option<&str>) -> (Option<Brand>, f64) {
    let from_metadata = detect_from_metadata(facts);
    let from_output = output.and_then(detect_from_output);

    match (from_metadata, from_output) {
        (Some(meta), Some(out)) if meta == out => (Some(meta), 0.95),
        (Some(meta), Some(out)) => {
            warn!("brand detection disagreement: metadata={meta}, output={out}");
            if facts.brand.is_some() {
                (Some(meta), 0.9)
            } else {
                (Some(out), 0.7)
            }
        }
        (Some(meta), None) => (Some(meta), 0.8),
        (None, Some(out)) => (Some(out), 0.85),
        (None, None) => (None, 0.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_platform_only_scores_point_eight() {
        let facts = HostFacts {
            platform: Some("cisco_iosxe".to_string()),
            ..Default::default()
        };
        let (brand, confidence) = detect(&facts, None);
        assert_eq!(brand, Some(Brand::Cisco));
        assert!((confidence - 0.8).abs() < f64::EPSILON);
    }

    #[test]
    fn agreeing_sources_score_point_nine_five() {
        let facts = HostFacts {
            platform: Some("huawei_vrp".to_string()),
            ..Default::default()
        };
        let output = "Huawei Versatile Routing Platform Software\nVRP (R) software, Version 8.180";
        let (brand, confidence) = detect(&facts, Some(output));
        assert_eq!(brand, Some(Brand::Huawei));
        assert!((confidence - 0.95).abs() < f64::EPSILON);
    }

    #[test]
    fn explicit_brand_field_wins_a_disagreement() {
        let facts = HostFacts {
            brand: Some("cisco".to_string()),
            platform: Some("cisco_iosxe".to_string()),
            ..Default::default()
        };
        let output = "H3C Comware Software, Version 7.1.070";
        let (brand, confidence) = detect(&facts, Some(output));
        assert_eq!(brand, Some(Brand::Cisco));
        assert!((confidence - 0.9).abs() < f64::EPSILON);
    }

    #[test]
    fn output_wins_a_disagreement_without_explicit_field() {
        let facts = HostFacts {
            platform: Some("cisco_ios".to_string()),
            ..Default::default()
        };
        let output = "JUNOS Software Release [20.4R3]";
        let (brand, confidence) = detect(&facts, Some(output));
        assert_eq!(brand, Some(Brand::Juniper));
        assert!((confidence - 0.7).abs() < f64::EPSILON);
    }

    #[test]
    fn output_only_scores_point_eight_five() {
        let facts = HostFacts::default();
        let (brand, confidence) = detect(&facts, Some("Arista DCS-7050SX-64"));
        assert_eq!(brand, Some(Brand::Arista));
        assert!((confidence - 0.85).abs() < f64::EPSILON);
    }

    #[test]
    fn nothing_matching_scores_zero() {
        let facts = HostFacts {
            platform: Some("unknown_vendor_os".to_string()),
            ..Default::default()
        };
        let (brand, confidence) = detect(&facts, Some("no banner here"));
        assert_eq!(brand, None);
        assert_eq!(confidence, 0.0);
    }

    #[test]
    fn version_banner_is_checked_before_keywords() {
        // Output mentioning "cisco" as a keyword but carrying an H3C banner
        // must resolve to the banner match.
        let output = "H3C Comware Software\nuplink to cisco-core-1";
        assert_eq!(detect_from_output(output), Some(Brand::H3c));
    }

    #[test]
    fn supported_set_is_closed() {
        assert!(is_supported("CISCO"));
        assert!(is_supported("h3c"));
        assert!(!is_supported("netgear"));
        assert_eq!(supported_brands().len(), Brand::ALL.len());
    }
}
