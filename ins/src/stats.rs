//! Per-instance socket and byte counters.

/// Snapshot of an instance's socket usage and traffic counters, as
/// published on the bus in `max:used:recv:sent` hex-colon form.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    pub max_sockets: u64,
    pub used_sockets: u64,
    pub recv_bytes: u64,
    pub sent_bytes: u64,
}

/// Error returned when a `network_stats` event value cannot be parsed.
#[derive(Debug, thiserror::Error)]
#[error("malformed network_stats value {0:?}")]
pub struct ParseStatsError(String);

impl std::str::FromStr for Stats {
    type Err = ParseStatsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut fields = s.split(':');
        let mut next = || -> Result<u64, ParseStatsError> {
            let field = fields.next().ok_or_else(|| ParseStatsError(s.to_string()))?;
            u64::from_str_radix(field, 16).map_err(|_| ParseStatsError(s.to_string()))
        };
        let max_sockets = next()?;
        let used_sockets = next()?;
        let recv_bytes = next()?;
        let sent_bytes = next()?;
        Ok(Stats {
            max_sockets,
            used_sockets,
            recv_bytes,
            sent_bytes,
        })
    }
}

impl Stats {
    /// Fraction of `max_sockets` currently in use; `0.0` when the
    /// instance has not yet reported any capacity.
    pub fn load(&self) -> f64 {
        if self.max_sockets == 0 {
            return 0.0;
        }
        self.used_sockets as f64 / self.max_sockets as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hex_colon_fields() {
        let stats: Stats = "64:20:ff:100".parse().unwrap();
        assert_eq!(stats.max_sockets, 0x64);
        assert_eq!(stats.used_sockets, 0x20);
        assert_eq!(stats.recv_bytes, 0xff);
        assert_eq!(stats.sent_bytes, 0x100);
    }

    #[test]
    fn rejects_short_values() {
        assert!("64:20".parse::<Stats>().is_err());
    }

    #[test]
    fn load_is_used_over_max() {
        let stats = Stats {
            max_sockets: 100,
            used_sockets: 25,
            ..Default::default()
        };
        assert!((stats.load() - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn load_is_zero_with_no_capacity() {
        let stats = Stats::default();
        assert_eq!(stats.load(), 0.0);
    }
}
