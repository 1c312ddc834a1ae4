//! Startup prerequisite checks run before any subsystem thread starts.

use std::path::Path;

#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum PreflightError {
    #[error("mw-supervisord must run as root")]
    NotRoot,
    #[error("reading {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("IPv4 forwarding is disabled; enable it with sysctl net.ipv4.ip_forward=1")]
    ForwardingDisabled,
}

pub fn require_root(is_root: bool) -> Result<(), PreflightError> {
    if is_root {
        Ok(())
    } else {
        Err(PreflightError::NotRoot)
    }
}

/// Every forwarder relies on `iptables` NAT/FORWARD rules, which only take
/// effect once the kernel is forwarding IPv4 traffic at all.
pub fn require_ipv4_forwarding(proc_path: &Path) -> Result<(), PreflightError> {
    let contents = std::fs::read_to_string(proc_path)
        .map_err(|source| PreflightError::Read { path: proc_path.display().to_string(), source })?;
    if contents.trim() == "1" {
        Ok(())
    } else {
        Err(PreflightError::ForwardingDisabled)
    }
}
