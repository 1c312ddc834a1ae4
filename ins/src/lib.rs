//! Instance records, the shared instance table, and the network-parameter
//! generator handed to each newly registered instance.

pub mod instance;
pub mod map;
pub mod netparams;
pub mod stats;

pub use instance::Instance;
pub use map::{InsMap, SharedInstance};
pub use netparams::generate_sys_net_opts;
pub use stats::Stats;
