//! The small integer identity the hypervisor assigns to each instance.

use std::fmt;

/// A domain id, as assigned by the hypervisor when an instance registers.
///
/// Unique among currently-live instances; may be reused once an instance
/// with that id has fully died.
#[must_use]
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DomainId(pub u32);

impl From<u32> for DomainId {
    fn from(value: u32) -> Self {
        DomainId(value)
    }
}

impl fmt::Display for DomainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for DomainId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(DomainId)
    }
}
