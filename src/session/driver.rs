use std::sync::Once;

use super::*;

/// Closed set of vendor driver variants.
///
/// New vendors are added as a variant plus a mapping entry in
/// [`select_driver`] and a profile in [`profile_for`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DriverKind {
    CiscoIos,
    HuaweiVrp,
    H3cComware,
    Generic,
}

impl DriverKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DriverKind::CiscoIos => "cisco_ios",
            DriverKind::HuaweiVrp => "huawei_vrp",
            DriverKind::H3cComware => "h3c_comware",
            DriverKind::Generic => "generic",
        }
    }
}

static GENERIC_FALLBACK_LOGGED: Once = Once::new();

/// Pure mapping from (brand hint, platform string) to a driver variant.
///
/// Unrecognized platforms degrade to the generic profile; the degradation is
/// logged once per process.
pub fn select_driver(brand: Option<Brand>, platform: &str) -> DriverKind {
    match brand {
        Some(Brand::Cisco) => return DriverKind::CiscoIos,
        Some(Brand::Huawei) => return DriverKind::HuaweiVrp,
        Some(Brand::H3c) => return DriverKind::H3cComware,
        _ => {}
    }

    let platform = platform.to_ascii_lowercase();
    if platform.contains("cisco") {
        DriverKind::CiscoIos
    } else if platform.contains("huawei") || platform.contains("vrp") {
        DriverKind::HuaweiVrp
    } else if platform.contains("h3c") || platform.contains("comware") {
        DriverKind::H3cComware
    } else {
        GENERIC_FALLBACK_LOGGED.call_once(|| {
            warn!("no vendor driver for platform '{platform}'; degrading to the generic session profile");
        });
        DriverKind::Generic
    }
}

/// Prompt, error, and pagination vocabulary plus the command set for one
/// vendor family.
pub struct VendorProfile {
    pub kind: DriverKind,
    prompt_patterns: Vec<Regex>,
    error_patterns: RegexSet,
    more_patterns: Vec<Regex>,
    /// Keystroke answering a pagination prompt.
    pub more_response: &'static str,
    pub disable_paging_command: Option<&'static str>,
    pub version_command: &'static str,
    pub inventory_command: Option<&'static str>,
    pub config_view_command: &'static str,
    pub enter_config_command: Option<&'static str>,
    pub exit_config_command: Option<&'static str>,
    pub save_command: Option<&'static str>,
    pub enable_command: Option<&'static str>,
    enable_password_prompt: Option<Regex>,
    login_prompt: Option<Regex>,
}

impl VendorProfile {
    /// True when `tail` (the last line of accumulated output) is a prompt.
    pub fn matches_prompt(&self, tail: &str) -> bool {
        self.prompt_patterns.iter().any(|re| re.is_match(tail))
    }

    /// True when `tail` is a pagination marker awaiting a keystroke.
    pub fn matches_more(&self, tail: &str) -> bool {
        self.more_patterns.iter().any(|re| re.is_match(tail))
    }

    /// First output line the vendor flags as an error, if any.
    pub fn vendor_error(&self, output: &str) -> Option<String> {
        output
            .lines()
            .find(|line| self.error_patterns.is_match(line))
            .map(|line| line.trim().to_string())
    }

    /// True when the prompt shows an unprivileged login mode that `enable`
    /// must be sent from.
    pub fn needs_enable(&self, prompt: &str) -> bool {
        self.login_prompt
            .as_ref()
            .is_some_and(|re| re.is_match(prompt))
    }

    pub(super) fn matches_enable_password_prompt(&self, tail: &str) -> bool {
        self.enable_password_prompt
            .as_ref()
            .is_some_and(|re| re.is_match(tail))
    }
}

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).expect("vendor profile pattern"))
        .collect()
}

static CISCO_PROFILE: Lazy<VendorProfile> = Lazy::new(|| VendorProfile {
    kind: DriverKind::CiscoIos,
    prompt_patterns: compile(&[
        r"^\S+\(\S+\)#\s*$",
        r"^[^\s#]+#\s*$",
        r"^[^\s<>]+>\s*$",
    ]),
    error_patterns: RegexSet::new([
        r"% Invalid",
        r"^%.+",
        r"^Command authorization failed",
        r"^Command rejected:",
        r"ERROR:.+",
        r"Access denied",
    ])
    .expect("cisco error patterns"),
    more_patterns: compile(&[r"--More--\s*$", r"<--- More --->\s*$"]),
    more_response: " ",
    disable_paging_command: Some("terminal length 0"),
    version_command: "show version",
    inventory_command: Some("show inventory"),
    config_view_command: "show running-config",
    enter_config_command: Some("configure terminal"),
    exit_config_command: Some("end"),
    save_command: Some("write memory"),
    enable_command: Some("enable"),
    enable_password_prompt: Some(Regex::new(r"(?i)password:\s*$").expect("enable prompt")),
    login_prompt: Some(Regex::new(r"^[^\s<>]+>\s*$").expect("login prompt")),
});

static HUAWEI_PROFILE: Lazy<VendorProfile> = Lazy::new(|| VendorProfile {
    kind: DriverKind::HuaweiVrp,
    prompt_patterns: compile(&[
        r"^(HRP_M|HRP_S)?<[^<>]+>\s*$",
        r"^(HRP_M|HRP_S)?\[[^\[\]]+\]\s*$",
    ]),
    error_patterns: RegexSet::new([r"^Error:.+", r"^\s+\^$", r"Unrecognized command"])
        .expect("huawei error patterns"),
    more_patterns: compile(&[r"---- More ----\s*$"]),
    more_response: " ",
    disable_paging_command: Some("screen-length 0 temporary"),
    version_command: "display version",
    inventory_command: Some("display device"),
    config_view_command: "display current-configuration",
    enter_config_command: Some("system-view"),
    exit_config_command: Some("return"),
    save_command: Some("save"),
    enable_command: None,
    enable_password_prompt: None,
    login_prompt: None,
});

static H3C_PROFILE: Lazy<VendorProfile> = Lazy::new(|| VendorProfile {
    kind: DriverKind::H3cComware,
    prompt_patterns: compile(&[
        r"^(RBM_P|RBM_S)?<[^<>]+>\s*$",
        r"^(RBM_P|RBM_S)?\[[^\[\]]+\]\s*$",
    ]),
    error_patterns: RegexSet::new([
        r"% Unrecognized command",
        r"% Wrong parameter",
        r"does not exist",
        r"doesn't exist",
    ])
    .expect("h3c error patterns"),
    more_patterns: compile(&[r"---- More ----\s*$"]),
    more_response: " ",
    disable_paging_command: Some("screen-length disable"),
    version_command: "display version",
    inventory_command: Some("display device"),
    config_view_command: "display current-configuration",
    enter_config_command: Some("system-view"),
    exit_config_command: Some("return"),
    save_command: Some("save force"),
    enable_command: None,
    enable_password_prompt: None,
    login_prompt: None,
});

static GENERIC_PROFILE: Lazy<VendorProfile> = Lazy::new(|| VendorProfile {
    kind: DriverKind::Generic,
    prompt_patterns: compile(&[r"^\S+[#>$%]\s*$"]),
    error_patterns: RegexSet::new([r"^%.+", r"^Error:", r"^ERROR:", r"Unrecognized command"])
        .expect("generic error patterns"),
    more_patterns: compile(&[r"--\s*[Mm]ore\s*--"]),
    more_response: " ",
    disable_paging_command: None,
    version_command: "show version",
    inventory_command: None,
    config_view_command: "show running-config",
    enter_config_command: None,
    exit_config_command: None,
    save_command: None,
    enable_command: None,
    enable_password_prompt: None,
    login_prompt: None,
});

/// Profile for a driver variant.
pub fn profile_for(kind: DriverKind) -> &'static VendorProfile {
    match kind {
        DriverKind::CiscoIos => &CISCO_PROFILE,
        DriverKind::HuaweiVrp => &HUAWEI_PROFILE,
        DriverKind::H3cComware => &H3C_PROFILE,
        DriverKind::Generic => &GENERIC_PROFILE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn brand_hint_takes_precedence_over_platform() {
        assert_eq!(
            select_driver(Some(Brand::Cisco), "whatever"),
            DriverKind::CiscoIos
        );
        assert_eq!(
            select_driver(Some(Brand::Huawei), "cisco_iosxe"),
            DriverKind::HuaweiVrp
        );
    }

    #[test]
    fn platform_substrings_drive_selection() {
        assert_eq!(select_driver(None, "cisco_iosxe"), DriverKind::CiscoIos);
        assert_eq!(select_driver(None, "huawei_vrp"), DriverKind::HuaweiVrp);
        assert_eq!(select_driver(None, "vrp-v8"), DriverKind::HuaweiVrp);
        assert_eq!(select_driver(None, "hp_comware"), DriverKind::H3cComware);
        assert_eq!(select_driver(None, "h3c-s5130"), DriverKind::H3cComware);
    }

    #[test]
    fn unknown_platform_degrades_to_generic() {
        assert_eq!(select_driver(None, "mystery_os"), DriverKind::Generic);
        assert_eq!(
            select_driver(Some(Brand::Juniper), "junos"),
            DriverKind::Generic
        );
    }

    #[test]
    fn cisco_profile_matches_expected_prompts() {
        let profile = profile_for(DriverKind::CiscoIos);
        assert!(profile.matches_prompt("sw-core-01#"));
        assert!(profile.matches_prompt("sw-core-01(config)# "));
        assert!(profile.matches_prompt("sw-core-01>"));
        assert!(!profile.matches_prompt("building configuration..."));
        assert!(profile.needs_enable("sw-core-01>"));
        assert!(!profile.needs_enable("sw-core-01#"));
    }

    #[test]
    fn huawei_profile_matches_system_view_prompt() {
        let profile = profile_for(DriverKind::HuaweiVrp);
        assert!(profile.matches_prompt("<CE6865-lab>"));
        assert!(profile.matches_prompt("[CE6865-lab]"));
        assert!(!profile.matches_prompt("Info: operation succeeded"));
    }

    #[test]
    fn vendor_error_reports_first_flagged_line() {
        let profile = profile_for(DriverKind::CiscoIos);
        let output = "line one\n% Invalid input detected at '^' marker.\nline three";
        assert_eq!(
            profile.vendor_error(output).as_deref(),
            Some("% Invalid input detected at '^' marker.")
        );
        assert!(profile.vendor_error("all good").is_none());
    }

    #[test]
    fn pagination_marker_is_recognized() {
        let profile = profile_for(DriverKind::H3cComware);
        assert!(profile.matches_more("  ---- More ----"));
        assert!(!profile.matches_more("<H3C>"));
    }
}
