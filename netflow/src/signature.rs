//! Message signatures tagging the front of every frame.

/// The three message kinds the wire protocol distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Signature {
    /// Unsolicited traffic observation.
    Info = 0xd310,
    /// A feature request sent by this process.
    FeatureRequest = 0xd320,
    /// A feature response sent by the instance.
    FeatureResponse = 0xd32f,
}

/// `SIG_INFO` is an alias for `SIG_NF_INFO` in the upstream header; both
/// names refer to the same wire value.
pub const SIG_INFO: u16 = Signature::Info as u16;
pub const SIG_NF_INFO: u16 = Signature::Info as u16;
pub const SIG_FEA_REQ: u16 = Signature::FeatureRequest as u16;
pub const SIG_FEA_RES: u16 = Signature::FeatureResponse as u16;

impl TryFrom<u16> for Signature {
    type Error = ();

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            SIG_INFO => Ok(Signature::Info),
            SIG_FEA_REQ => Ok(Signature::FeatureRequest),
            SIG_FEA_RES => Ok(Signature::FeatureResponse),
            _ => Err(()),
        }
    }
}
