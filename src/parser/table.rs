//! Vendor-table parsing strategy.
//!
//! Each brand maps to a fixed platform identifier understood by the
//! table-driven TextFSM library; templates are keyed by
//! `(platform, command type)`. Any parser error is converted into a
//! structured failure so the original raw output is never lost.

use textfsm_rust::Template;

use crate::brand::Brand;
use crate::error::{NetopsError, Result};

use super::ParsedRecord;

/// Fixed platform identifier used for table lookups.
pub fn platform_for(brand: Brand) -> &'static str {
    match brand {
        Brand::Cisco => "cisco_ios",
        Brand::Huawei => "huawei_vrp",
        Brand::H3c => "hp_comware",
        Brand::Juniper => "juniper_junos",
        Brand::Arista => "arista_eos",
    }
}

const CISCO_IOS_SHOW_VERSION: &str = "\
Value Required version ([^,\\s]+)
Value hostname (\\S+)
Value uptime (.+)

Start
  ^Cisco IOS.*Version ${version}
  ^${hostname} uptime is ${uptime}$$ -> Record
";

const CISCO_IOS_SHOW_INTERFACE: &str = "\
Value Required interface (\\S+)
Value ip_address (\\S+)
Value status (up|down|administratively down)
Value protocol (up|down)

Start
  ^${interface}\\s+${ip_address}\\s+\\w+\\s+\\w+\\s+${status}\\s+${protocol}\\s*$$ -> Record
";

const CISCO_IOS_SHOW_ARP: &str = "\
Value Required ip_address (\\d+\\.\\d+\\.\\d+\\.\\d+)
Value age (\\S+)
Value mac_address ([0-9a-fA-F]{4}\\.[0-9a-fA-F]{4}\\.[0-9a-fA-F]{4})
Value interface (\\S+)

Start
  ^Internet\\s+${ip_address}\\s+${age}\\s+${mac_address}\\s+ARPA\\s+${interface}\\s*$$ -> Record
";

const HUAWEI_VRP_SHOW_INTERFACE: &str = "\
Value Required interface (\\S+)
Value phy_status (\\*?up|\\*?down)
Value protocol_status (\\*?up|\\*?down)

Start
  ^${interface}\\s+${phy_status}\\s+${protocol_status}.*$$ -> Record
";

const HP_COMWARE_SHOW_MAC: &str = "\
Value Required mac_address ([0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4})
Value vlan (\\d+)
Value entry_type (\\S+)
Value port (\\S+)
Value aging (\\S+)

Start
  ^${mac_address}\\s+${vlan}\\s+${entry_type}\\s+${port}\\s+${aging}\\s*$$ -> Record
";

const JUNIPER_JUNOS_SHOW_INTERFACE: &str = "\
Value Required interface (\\S+)
Value admin_status (up|down)
Value link_status (up|down)

Start
  ^${interface}\\s+${admin_status}\\s+${link_status}.*$$ -> Record
";

fn table_template(platform: &str, command_type: &str) -> Option<&'static str> {
    match (platform, command_type) {
        ("cisco_ios", "show_version") => Some(CISCO_IOS_SHOW_VERSION),
        ("cisco_ios", "show_interface") => Some(CISCO_IOS_SHOW_INTERFACE),
        ("cisco_ios", "show_arp") => Some(CISCO_IOS_SHOW_ARP),
        ("huawei_vrp", "show_interface") => Some(HUAWEI_VRP_SHOW_INTERFACE),
        ("hp_comware", "show_mac") => Some(HP_COMWARE_SHOW_MAC),
        ("juniper_junos", "show_interface") => Some(JUNIPER_JUNOS_SHOW_INTERFACE),
        _ => None,
    }
}

/// Runs the vendor-table strategy for one output.
pub(super) fn parse(
    brand: Brand,
    command_type: &str,
    raw: &str,
) -> Result<(String, Vec<ParsedRecord>)> {
    let platform = platform_for(brand);
    let source =
        table_template(platform, command_type).ok_or_else(|| NetopsError::TemplateNotFound {
            brand: platform.to_string(),
            command_type: command_type.to_string(),
        })?;

    let template = Template::parse_str(source).map_err(|err| {
        NetopsError::ParseFailure(format!("textfsm template {platform}/{command_type}: {err}"))
    })?;
    let mut parser = template.parser();
    let records = parser.parse_text_to_dicts(raw).map_err(|err| {
        NetopsError::ParseFailure(format!("textfsm parse {platform}/{command_type}: {err}"))
    })?;

    Ok((format!("{platform}/{command_type}"), records))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_mapping_is_fixed() {
        assert_eq!(platform_for(Brand::Cisco), "cisco_ios");
        assert_eq!(platform_for(Brand::H3c), "hp_comware");
        assert_eq!(platform_for(Brand::Juniper), "juniper_junos");
    }

    #[test]
    fn cisco_interface_table_parses_rows() {
        let raw = "\
Interface              IP-Address      OK? Method Status                Protocol
GigabitEthernet0/1     10.0.0.1        YES manual up                    up
Vlan100                10.0.100.1      YES NVRAM  down                  down
";
        let (name, records) = parse(Brand::Cisco, "show_interface", raw).expect("parse");
        assert_eq!(name, "cisco_ios/show_interface");
        assert_eq!(records.len(), 2);
        assert_eq!(
            records[0].get("interface").map(String::as_str),
            Some("GigabitEthernet0/1")
        );
        assert_eq!(records[1].get("status").map(String::as_str), Some("down"));
    }

    #[test]
    fn comware_mac_table_parses_rows() {
        let raw = "0001-0203-0405   10       Learned        GE1/0/1     Y\n";
        let (_, records) = parse(Brand::H3c, "show_mac", raw).expect("parse");
        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0].get("mac_address").map(String::as_str),
            Some("0001-0203-0405")
        );
    }

    #[test]
    fn missing_table_template_is_template_not_found() {
        let err = parse(Brand::Arista, "show_mac", "anything").expect_err("no template");
        assert!(matches!(err, NetopsError::TemplateNotFound { .. }));
    }
}
