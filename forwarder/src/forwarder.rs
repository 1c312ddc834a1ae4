//! A bundle of three packet-filter rules redirecting one external port to
//! one INS address.

use std::net::IpAddr;
use std::sync::Arc;

use crate::filter::{FilterError, PacketFilter, Table};

/// One rule this forwarder installed, in the order it was installed.
#[derive(Debug, Clone)]
struct InstalledRule {
    table: Table,
    chain: &'static str,
    rule: String,
}

/// Manages the three-rule bundle redirecting `external_port` to
/// `destination` on the INS, mirroring the upstream `PortForwarder`.
pub struct Forwarder {
    backend: Arc<dyn PacketFilter>,
    external_port: u16,
    destination: IpAddr,
    active: bool,
    installed: Vec<InstalledRule>,
}

impl Forwarder {
    pub fn new(backend: Arc<dyn PacketFilter>, external_port: u16, destination: IpAddr) -> Self {
        Forwarder {
            backend,
            external_port,
            destination,
            active: false,
            installed: Vec::new(),
        }
    }

    pub fn external_port(&self) -> u16 {
        self.external_port
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    fn rules(&self) -> [InstalledRule; 3] {
        let dest = self.destination;
        let port = self.external_port;
        [
            InstalledRule {
                table: Table::Nat,
                chain: "PREROUTING",
                rule: format!(
                    "-p tcp -m tcp --dport {port} -m comment --comment \"mw1 {dest}\" -j DNAT --to-destination {dest}:{port}"
                ),
            },
            InstalledRule {
                table: Table::Filter,
                chain: "FORWARD",
                rule: format!("-p tcp -m tcp --dport {port} -m comment --comment \"mw2 {dest}\" -j ACCEPT"),
            },
            InstalledRule {
                table: Table::Filter,
                chain: "FORWARD",
                rule: format!(
                    "-p tcp -m conntrack --ctstate RELATED,ESTABLISHED -m comment --comment \"mw3 {dest}\" -j ACCEPT"
                ),
            },
        ]
    }

    /// Installs the three rules. A no-op if already active. On partial
    /// failure, every rule installed so far in this call is rolled back
    /// in reverse order before the error is returned.
    pub fn activate(&mut self) -> Result<(), FilterError> {
        if self.active {
            return Ok(());
        }
        for rule in self.rules() {
            match self.backend.insert_rule(rule.table, rule.chain, &rule.rule) {
                Ok(()) => self.installed.push(rule),
                Err(err) => {
                    self.rollback();
                    return Err(err);
                }
            }
        }
        self.active = true;
        tracing::info!(port = self.external_port, dest = %self.destination, "activated forwarder");
        Ok(())
    }

    /// Removes every rule this forwarder installed, in reverse order. A
    /// no-op if already inactive.
    pub fn deactivate(&mut self) -> Result<(), FilterError> {
        if !self.active {
            return Ok(());
        }
        let result = self.rollback();
        self.active = false;
        tracing::info!(port = self.external_port, dest = %self.destination, "deactivated forwarder");
        result
    }

    fn rollback(&mut self) -> Result<(), FilterError> {
        let mut first_err = None;
        while let Some(rule) = self.installed.pop() {
            if let Err(err) = self.backend.delete_rule(rule.table, rule.chain, &rule.rule) {
                first_err.get_or_insert(err);
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl Drop for Forwarder {
    fn drop(&mut self) {
        if self.active {
            let _ = self.rollback();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MockFilter {
        installed: Mutex<Vec<(Table, String, String)>>,
        fail_on: Mutex<Option<usize>>,
    }

    impl PacketFilter for MockFilter {
        fn insert_rule(&self, table: Table, chain: &str, rule: &str) -> Result<(), FilterError> {
            let mut installed = self.installed.lock().unwrap();
            if let Some(fail_at) = *self.fail_on.lock().unwrap() {
                if installed.len() == fail_at {
                    return Err(FilterError::new_for_test(table, chain));
                }
            }
            installed.push((table, chain.to_string(), rule.to_string()));
            Ok(())
        }

        fn delete_rule(&self, table: Table, chain: &str, rule: &str) -> Result<(), FilterError> {
            let mut installed = self.installed.lock().unwrap();
            installed.retain(|(t, c, r)| !(*t == table && c == chain && r == rule));
            Ok(())
        }
    }

    fn dest() -> IpAddr {
        "10.0.0.5".parse().unwrap()
    }

    #[test]
    fn activate_installs_three_rules_in_order() {
        let backend = Arc::new(MockFilter::default());
        let mut fwd = Forwarder::new(backend.clone(), 8080, dest());
        fwd.activate().unwrap();
        assert!(fwd.is_active());
        assert_eq!(backend.installed.lock().unwrap().len(), 3);
    }

    #[test]
    fn activate_twice_is_idempotent() {
        let backend = Arc::new(MockFilter::default());
        let mut fwd = Forwarder::new(backend.clone(), 8080, dest());
        fwd.activate().unwrap();
        fwd.activate().unwrap();
        assert_eq!(backend.installed.lock().unwrap().len(), 3);
    }

    #[test]
    fn deactivate_removes_every_installed_rule() {
        let backend = Arc::new(MockFilter::default());
        let mut fwd = Forwarder::new(backend.clone(), 8080, dest());
        fwd.activate().unwrap();
        fwd.deactivate().unwrap();
        assert!(backend.installed.lock().unwrap().is_empty());
        assert!(!fwd.is_active());
    }

    #[test]
    fn partial_failure_rolls_back_already_installed_rules() {
        let backend = Arc::new(MockFilter::default());
        *backend.fail_on.lock().unwrap() = Some(1);
        let mut fwd = Forwarder::new(backend.clone(), 8080, dest());
        assert!(fwd.activate().is_err());
        assert!(!fwd.is_active());
        assert!(backend.installed.lock().unwrap().is_empty());
    }

    impl FilterError {
        fn new_for_test(table: Table, chain: &str) -> Self {
            FilterError::new(table, chain, std::io::Error::other("mock failure"))
        }
    }
}
