//! Domain conversions shared by the decoders.

use chrono::DateTime;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref IOS_XE_VERSION_RE: Regex = Regex::new(r"Version (.*?),").unwrap();
}

/// BGP neighbor FSM state to the integer used for dashboard cell coloring.
/// Unknown states map to `None`.
pub fn bgp_fsm_to_integer(state: &str) -> Option<i64> {
    match state {
        "fsm-idle" => Some(0),
        "fsm-connect" => Some(1),
        "fsm-active" => Some(2),
        "fsm-opensent" => Some(3),
        "fsm-openconfirm" => Some(4),
        "fsm-established" => Some(5),
        _ => None,
    }
}

/// OSPF neighbor state to its numeric rank; unknown states rank 0.
pub fn ospf_nbr_state_to_num(state: &str) -> f64 {
    match state {
        "ospf-nbr-down" => 1.0,
        "ospf-nbr-attempt" => 2.0,
        "ospf-nbr-init" => 3.0,
        "ospf-nbr-two-way" => 4.0,
        "ospf-nbr-exchange-start" => 5.0,
        "ospf-nbr-exchange" => 6.0,
        "ospf-nbr-loading" => 7.0,
        "ospf-nbr-full" => 8.0,
        _ => 0.0,
    }
}

/// Interface admin/oper status rendered as "100" (ready/up) or "0".
pub fn interface_status_to_integer(status: &str) -> &'static str {
    match status {
        "if-oper-state-ready" | "if-state-up" => "100",
        _ => "0",
    }
}

/// IP SLA probe return code to its numeric value; unknown codes are not
/// instrumented.
pub fn ip_sla_return_code(code: &str) -> Option<f64> {
    let value = match code {
        "ret-code-unknown" => 0.0,
        "ret-code-ok" => 1.0,
        "ret-code-disconnected" => 2.0,
        "ret-code-busy" => 3.0,
        "ret-code-timeout" => 4.0,
        "ret-code-no-connection" => 5.0,
        "ret-code-internal-error" => 6.0,
        "ret-code-operation-failure" => 7.0,
        "ret-code-code-could-not-find" => 8.0,
        _ => return None,
    };
    Some(value)
}

/// ToS byte to DSCP class name. The DSCP decimal is the upper six bits;
/// unknown decimals render as the empty string.
pub fn tos_to_dscp(tos: i64) -> &'static str {
    match tos >> 2 {
        8 => "CS1",
        10 => "AF11",
        12 => "AF12",
        14 => "AF13",
        16 => "CS2",
        18 => "AF21",
        20 => "AF22",
        22 => "AF23",
        24 => "CS3",
        26 => "AF31",
        28 => "AF32",
        30 => "AF33",
        32 => "CS4",
        34 => "AF41",
        36 => "AF42",
        38 => "AF43",
        40 => "CS5",
        46 => "EF",
        48 => "CS6",
        56 => "CS7",
        _ => "",
    }
}

/// Decomposes the standard IP SLA tag `COSx_<desc>_<host>:<port>` into the
/// class of service and destination host. Anything else is ("N/A", "N/A").
pub fn sla_tag_to_cos_dest(tag: &str) -> (String, String) {
    if tag.is_empty() {
        return ("N/A".to_string(), "N/A".to_string());
    }

    let parts: Vec<&str> = tag.split('_').collect();
    if parts.len() == 3 && parts[0].contains("COS") {
        let cos = parts[0].to_string();
        let dst_host = parts[2].split(':').next().unwrap_or("").to_string();
        return (cos, dst_host);
    }

    ("N/A".to_string(), "N/A".to_string())
}

/// 32-bit router id to its dotted-quad rendering (big-endian octets).
pub fn u32_to_dotted_quad(value: u32) -> String {
    format!(
        "{}.{}.{}.{}",
        (value >> 24) & 0xff,
        (value >> 16) & 0xff,
        (value >> 8) & 0xff,
        value & 0xff
    )
}

/// VRF naming: the default VRF is reported as "default" or empty, rendered
/// as "Global" everywhere.
pub fn normalize_vrf(name: &str) -> String {
    if name.is_empty() || name == "default" {
        "Global".to_string()
    } else {
        name.to_string()
    }
}

/// Extracts the IOS-XE version from the full `show version` banner, i.e.
/// the capture between "Version " and the following comma. Returns the
/// input unchanged when the pattern does not match.
pub fn ios_xe_version(banner: &str) -> String {
    match IOS_XE_VERSION_RE.captures(banner) {
        Some(caps) => caps[1].to_string(),
        None => banner.to_string(),
    }
}

/// RFC3339 timestamp to Unix epoch seconds (UTC).
pub fn rfc3339_to_epoch(value: &str) -> Option<i64> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|t| t.timestamp())
}

/// IP protocol number to its common name; uncatalogued protocols keep
/// their numeric rendering.
pub fn ip_protocol_name(proto: f64) -> String {
    let name = match proto as i64 {
        1 => "icmp",
        2 => "igmp",
        6 => "tcp",
        17 => "udp",
        47 => "gre",
        50 => "esp",
        51 => "ah",
        58 => "ipv6-icmp",
        88 => "eigrp",
        89 => "ospf",
        132 => "sctp",
        other => return other.to_string(),
    };
    name.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn bgp_fsm_states_map_to_integers() {
        assert_eq!(bgp_fsm_to_integer("fsm-idle"), Some(0));
        assert_eq!(bgp_fsm_to_integer("fsm-connect"), Some(1));
        assert_eq!(bgp_fsm_to_integer("fsm-active"), Some(2));
        assert_eq!(bgp_fsm_to_integer("fsm-opensent"), Some(3));
        assert_eq!(bgp_fsm_to_integer("fsm-openconfirm"), Some(4));
        assert_eq!(bgp_fsm_to_integer("fsm-established"), Some(5));
        assert_eq!(bgp_fsm_to_integer("fsm-wat"), None);
    }

    #[test]
    fn ospf_states_map_to_ranks() {
        assert_eq!(ospf_nbr_state_to_num("ospf-nbr-down"), 1.0);
        assert_eq!(ospf_nbr_state_to_num("ospf-nbr-two-way"), 4.0);
        assert_eq!(ospf_nbr_state_to_num("ospf-nbr-full"), 8.0);
        assert_eq!(ospf_nbr_state_to_num("nonsense"), 0.0);
    }

    #[test]
    fn interface_status_renders_up_or_down() {
        assert_eq!(interface_status_to_integer("if-oper-state-ready"), "100");
        assert_eq!(interface_status_to_integer("if-state-up"), "100");
        assert_eq!(interface_status_to_integer("if-state-down"), "0");
        assert_eq!(interface_status_to_integer("if-oper-state-no-pass"), "0");
        assert_eq!(interface_status_to_integer(""), "0");
    }

    #[test]
    fn sla_return_codes_map() {
        assert_eq!(ip_sla_return_code("ret-code-ok"), Some(1.0));
        assert_eq!(ip_sla_return_code("ret-code-timeout"), Some(4.0));
        assert_eq!(
            ip_sla_return_code("ret-code-code-could-not-find"),
            Some(8.0)
        );
        assert_eq!(ip_sla_return_code("something-else"), None);
    }

    #[test]
    fn tos_ef_classification() {
        // 0xB8 >> 2 == 46, the EF class.
        assert_eq!(tos_to_dscp(0xB8), "EF");
        assert_eq!(tos_to_dscp(0x68), "AF31");
        assert_eq!(tos_to_dscp(0), "");
        assert_eq!(tos_to_dscp(0x04), "");
    }

    #[test]
    fn dscp_table_covers_every_tos_byte() {
        for tos in 0..=255i64 {
            // Must never panic and must agree with the decimal table.
            let class = tos_to_dscp(tos);
            let known = [
                8, 10, 12, 14, 16, 18, 20, 22, 24, 26, 28, 30, 32, 34, 36, 38, 40, 46, 48, 56,
            ];
            assert_eq!(known.contains(&(tos >> 2)), !class.is_empty());
        }
    }

    #[test]
    fn sla_tag_decomposition() {
        let (cos, host) = sla_tag_to_cos_dest("COS1_VOICE_gw1.example.net:5060");
        assert_eq!(cos, "COS1");
        assert_eq!(host, "gw1.example.net");

        assert_eq!(
            sla_tag_to_cos_dest(""),
            ("N/A".to_string(), "N/A".to_string())
        );
        assert_eq!(
            sla_tag_to_cos_dest("freeform description"),
            ("N/A".to_string(), "N/A".to_string())
        );
        assert_eq!(
            sla_tag_to_cos_dest("A_B_C_D"),
            ("N/A".to_string(), "N/A".to_string())
        );
    }

    #[test]
    fn dotted_quad_roundtrip() {
        assert_eq!(u32_to_dotted_quad(0x0A00_0001), "10.0.0.1");
        assert_eq!(u32_to_dotted_quad(0), "0.0.0.0");
        assert_eq!(u32_to_dotted_quad(u32::MAX), "255.255.255.255");

        for value in [0u32, 1, 0xC0A8_0101, 0xDEAD_BEEF, u32::MAX] {
            let rendered = u32_to_dotted_quad(value);
            let parsed: Ipv4Addr = rendered.parse().unwrap();
            assert_eq!(u32::from(parsed), value);
        }
    }

    #[test]
    fn vrf_default_renders_global() {
        assert_eq!(normalize_vrf(""), "Global");
        assert_eq!(normalize_vrf("default"), "Global");
        assert_eq!(normalize_vrf("CUSTOMER-A"), "CUSTOMER-A");
    }

    #[test]
    fn version_extraction() {
        let banner = "Cisco IOS XE Software, Version 16.11.1, RELEASE SOFTWARE (fc1)";
        assert_eq!(ios_xe_version(banner), "16.11.1");
        assert_eq!(ios_xe_version("no match here"), "no match here");
    }

    #[test]
    fn rfc3339_parses_to_epoch_seconds() {
        assert_eq!(
            rfc3339_to_epoch("2023-11-14T22:13:20+00:00"),
            Some(1_700_000_000)
        );
        assert_eq!(
            rfc3339_to_epoch("2023-11-15T05:13:20+07:00"),
            Some(1_700_000_000)
        );
        assert_eq!(rfc3339_to_epoch("not a time"), None);
    }

    #[test]
    fn protocol_names() {
        assert_eq!(ip_protocol_name(6.0), "tcp");
        assert_eq!(ip_protocol_name(17.0), "udp");
        assert_eq!(ip_protocol_name(143.0), "143");
    }
}
