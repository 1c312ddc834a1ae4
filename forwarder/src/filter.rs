//! The packet-filter backend abstraction and the `iptables`-backed
//! implementation used in production.

use std::fmt;

/// Which iptables table a rule belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Nat,
    Filter,
}

impl Table {
    fn as_str(self) -> &'static str {
        match self {
            Table::Nat => "nat",
            Table::Filter => "filter",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by a [`PacketFilter`] backend.
#[derive(Debug, thiserror::Error)]
#[error("packet filter operation failed on {table}/{chain}: {source}")]
pub struct FilterError {
    table: Table,
    chain: String,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
}

impl FilterError {
    /// Builds an error for a `table`/`chain` rule mutation that failed.
    /// Public so any [`PacketFilter`] implementor outside this crate —
    /// test doubles included — can report failures through it.
    pub fn new(table: Table, chain: &str, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        FilterError {
            table,
            chain: chain.to_string(),
            source: Box::new(source),
        }
    }
}

/// Idempotent chain/rule mutation, kept opaque so the forwarder never has
/// to know how rules are actually enforced.
pub trait PacketFilter: Send + Sync {
    /// Inserts `rule` at the head of `table`/`chain`. A no-op if the
    /// identical rule is already present.
    fn insert_rule(&self, table: Table, chain: &str, rule: &str) -> Result<(), FilterError>;

    /// Removes `rule` from `table`/`chain`. A no-op if it is already gone.
    fn delete_rule(&self, table: Table, chain: &str, rule: &str) -> Result<(), FilterError>;
}

/// Production backend: shells out to the kernel's iptables rule table via
/// the `iptables` crate, the same way `python-iptables` does in the
/// original implementation.
pub struct ShellPacketFilter {
    inner: iptables::IPTables,
}

impl ShellPacketFilter {
    pub fn new(is_ipv6: bool) -> Result<Self, FilterError> {
        let inner = iptables::new(is_ipv6).map_err(|source| FilterError {
            table: Table::Filter,
            chain: "<init>".to_string(),
            source: Box::<dyn std::error::Error + Send + Sync>::from(source.to_string()),
        })?;
        Ok(ShellPacketFilter { inner })
    }
}

impl PacketFilter for ShellPacketFilter {
    fn insert_rule(&self, table: Table, chain: &str, rule: &str) -> Result<(), FilterError> {
        match self.inner.exists(table.as_str(), chain, rule) {
            Ok(true) => return Ok(()),
            Ok(false) => {}
            Err(source) => return Err(FilterError::new(table, chain, std::io::Error::other(source.to_string()))),
        }
        self.inner
            .insert(table.as_str(), chain, rule, 1)
            .map(|_| ())
            .map_err(|source| FilterError::new(table, chain, std::io::Error::other(source.to_string())))
    }

    fn delete_rule(&self, table: Table, chain: &str, rule: &str) -> Result<(), FilterError> {
        match self.inner.exists(table.as_str(), chain, rule) {
            Ok(false) => return Ok(()),
            Ok(true) => {}
            Err(source) => return Err(FilterError::new(table, chain, std::io::Error::other(source.to_string()))),
        }
        self.inner
            .delete(table.as_str(), chain, rule)
            .map(|_| ())
            .map_err(|source| FilterError::new(table, chain, std::io::Error::other(source.to_string())))
    }
}
