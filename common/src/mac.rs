//! Hardware address type and the fixed pool instances are allocated from.

use std::fmt;

/// A MAC address, stored as six raw octets.
#[must_use]
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Mac(pub [u8; 6]);

impl From<[u8; 6]> for Mac {
    fn from(value: [u8; 6]) -> Self {
        Mac(value)
    }
}

impl fmt::Display for Mac {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

/// Error returned when a textual MAC address cannot be parsed.
#[derive(Debug, thiserror::Error)]
#[error("invalid mac address: {0:?}")]
pub struct ParseMacError(String);

impl std::str::FromStr for Mac {
    type Err = ParseMacError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut octets = [0u8; 6];
        let mut parts = s.split(':');
        for octet in &mut octets {
            let part = parts.next().ok_or_else(|| ParseMacError(s.to_string()))?;
            *octet = u8::from_str_radix(part, 16).map_err(|_| ParseMacError(s.to_string()))?;
        }
        if parts.next().is_some() {
            return Err(ParseMacError(s.to_string()));
        }
        Ok(Mac(octets))
    }
}

/// Error returned when the pool has no free address left to hand out.
#[derive(Debug, thiserror::Error)]
#[error("mac pool exhausted: all {0} addresses are in use")]
pub struct MacPoolExhausted(pub usize);

/// The fixed multiset of MACs the supervisor may assign to instances.
///
/// Every address starts free. `alloc` hands out the lowest-ordered free
/// address and marks it in use; `release` returns it to the pool.
#[derive(Debug, Clone)]
pub struct MacPool {
    entries: Vec<(Mac, bool)>,
}

impl MacPool {
    /// Builds a pool from an explicit address list, every entry starting free.
    pub fn new(addrs: impl IntoIterator<Item = Mac>) -> Self {
        MacPool {
            entries: addrs.into_iter().map(|m| (m, false)).collect(),
        }
    }

    /// The pool shipped by the upstream instance distributor: 32 locally
    /// administered addresses in the `00:16:3e:28:2a:50..6f` block.
    pub fn default_pool() -> Self {
        Self::new((0x50..=0x6f).map(|low| Mac([0x00, 0x16, 0x3e, 0x28, 0x2a, low])))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Hands out the lowest-ordered address not currently in use.
    pub fn alloc(&mut self) -> Result<Mac, MacPoolExhausted> {
        let slot = self
            .entries
            .iter_mut()
            .find(|(_, in_use)| !*in_use)
            .ok_or(MacPoolExhausted(self.entries.len()))?;
        slot.1 = true;
        Ok(slot.0)
    }

    /// Returns `mac` to the free set. A no-op if `mac` is not a pool member
    /// or was already free; releasing twice must never double-free a slot
    /// another instance has since claimed.
    pub fn release(&mut self, mac: Mac) {
        if let Some(slot) = self.entries.iter_mut().find(|(m, _)| *m == mac) {
            slot.1 = false;
        }
    }

    pub fn in_use_count(&self) -> usize {
        self.entries.iter().filter(|(_, in_use)| *in_use).count()
    }
}
