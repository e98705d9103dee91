//! Network interface autodetection for the netdev LED monitor.

use std::fs;
use std::path::Path;

use super::host::{Host, HostPaths};

/// Interface name prefixes that never carry the NAS uplink.
const VIRTUAL_PREFIXES: &[&str] = &["lo", "veth", "docker", "br-", "virbr", "kube", "vnet", "tun", "tap"];

/// Interface used by the default route in `ip route show default` output.
#[must_use]
pub fn parse_default_route(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let mut words = line.split_whitespace();
        if words.next()? != "default" {
            return None;
        }
        words
            .skip_while(|w| *w != "dev")
            .nth(1)
            .map(str::to_string)
    })
}

/// First physical-looking interface under `/sys/class/net`, by name.
#[must_use]
pub fn first_physical_interface(sys_class_net: &Path) -> Option<String> {
    let mut names: Vec<String> = fs::read_dir(sys_class_net)
        .ok()?
        .filter_map(std::result::Result::ok)
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| !VIRTUAL_PREFIXES.iter().any(|p| name.starts_with(p)))
        .collect();
    names.sort();
    names.into_iter().next()
}

/// Pick the interface for `ugreen-netdevmon@<iface>`.
///
/// Order: configured name, default route, first physical interface.
#[must_use]
pub fn detect_interface(host: &Host, paths: &HostPaths, configured: Option<&str>) -> Option<String> {
    if let Some(name) = configured.filter(|n| !n.trim().is_empty()) {
        tracing::info!(interface = name, "Using configured network interface");
        return Some(name.trim().to_string());
    }

    match host.query("ip", &["route", "show", "default"]) {
        Ok(output) if output.success => {
            if let Some(name) = parse_default_route(&output.stdout) {
                tracing::info!(interface = %name, "Detected interface from default route");
                return Some(name);
            }
        }
        Ok(_) => tracing::debug!("`ip route` returned an error"),
        Err(e) => tracing::debug!(error = %e, "`ip` unavailable"),
    }

    let found = first_physical_interface(&paths.sys_class_net());
    match &found {
        Some(name) => tracing::info!(interface = %name, "Detected interface from sysfs"),
        None => tracing::warn!("No network interface detected, netdev LED service will be skipped"),
    }
    found
}
