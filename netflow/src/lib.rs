//! Wire protocol, feature table, and TCP client for the netflow channel
//! an instance exposes to report traffic observations and answer
//! feature requests about its sockets.

pub mod client;
pub mod feature;
pub mod flags;
pub mod outstanding;
pub mod signature;
pub mod wire;

pub use client::{ChannelEvent, ClientError, NetflowClient};
pub use flags::Flags;
pub use outstanding::{feature_name, OutstandingRequestTable, PendingRequest};
pub use signature::Signature;
pub use wire::{
    Base, Endpoint, FeatureRequest, FeatureResponse, Observation, ObservationKind, WireError,
};
