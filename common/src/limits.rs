//! Compile-time constants shared by every crate, mirroring the C header
//! the instance distributor and the kernel module both build against.

/// Hard ceiling on concurrently live instances, independent of any
/// `--instance-limit` the operator passes on the command line.
pub const MAX_INS_COUNT: usize = 8;

/// Seconds between heartbeats an instance is expected to publish.
pub const HEARTBEAT_INTERVAL_SEC: u64 = 5;

/// Consecutive missed heartbeats tolerated before an instance is declared dead.
pub const HEARTBEAT_MAX_MISSES: u32 = 3;

/// Grace period added on top of the nominal heartbeat deadline to absorb
/// scheduling jitter on the bus reader.
pub const HEARTBEAT_GRACE_SEC: u64 = 1;

/// Default load fraction (0.0-1.0) above which an instance is considered
/// overloaded by the balancer.
pub const DEFAULT_MAX_INS_LOAD: f64 = 0.80;

/// Default supervisor poll period, in milliseconds.
pub const SUPERVISOR_POLL_MS: u64 = 50;
