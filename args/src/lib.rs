//! Command line parsing and the validated [`Config`] it is turned into.
//!
//! Mirrors the two-stage pattern used throughout this workspace: an
//! untrusted [`CmdArgs`] produced by `clap`, then a fallible conversion
//! into a [`Config`] that every later stage can treat as already sane.

use std::path::{Path, PathBuf};

use clap::{Parser, ValueEnum};
use common::limits::MAX_INS_COUNT;

/// Raw command line arguments, parsed but not yet validated.
#[derive(Debug, Clone, Parser, serde::Serialize)]
#[command(name = "mw-supervisord", about = "Supervises isolated network stack instances")]
pub struct CmdArgs {
    /// INS load percentage (1-100) that triggers load balancing.
    #[arg(short = 'l', long = "max-ins-load", value_name = "PERCENT", default_value_t = 80)]
    pub max_ins_load: u32,

    /// INS load monitor frequency in milliseconds; 0 disables periodic balancing.
    #[arg(short = 'm', long = "monitor-period-ms", value_name = "MS", default_value_t = 50)]
    pub monitor_period_ms: u64,

    /// Logging verbosity.
    #[arg(short = 'g', long = "log-level", value_enum, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,

    /// Full path to an overloaded-trigger sentinel file; must not exist yet.
    #[arg(short = 'o', long = "overloaded-trigger", value_name = "PATH")]
    pub overloaded_trigger: Option<PathBuf>,

    /// Start every configured instance immediately instead of on demand.
    #[arg(short = 's', long = "start-all")]
    pub start_all_ins_instances: bool,

    /// Limit the number of concurrently live instances; 0 means use the compiled-in cap.
    #[arg(short = 'i', long = "instance-limit", value_name = "COUNT", default_value_t = 0)]
    pub ins_instance_limit: usize,

    /// Root path the bus's instance paths are published under.
    #[arg(short = 'b', long = "bus-root", value_name = "PATH", default_value = "/mw")]
    pub bus_root: String,
}

/// Logging verbosity levels exposed on the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, serde::Serialize)]
pub enum LogLevel {
    Critical,
    Error,
    Warning,
    Info,
    Debug,
}

impl LogLevel {
    pub fn as_tracing_level(self) -> tracing::Level {
        match self {
            LogLevel::Critical | LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warning => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
        }
    }
}

/// Errors that can occur while validating [`CmdArgs`] into a [`Config`].
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum ConfigError {
    #[error("--max-ins-load must be 1-100, got {0}")]
    LoadOutOfRange(u32),
    #[error("--instance-limit must not exceed the compiled-in cap of {MAX_INS_COUNT}, got {0}")]
    InstanceLimitTooHigh(usize),
    #[error("--overloaded-trigger file already exists: {0}")]
    TriggerAlreadyExists(PathBuf),
}

/// A fully validated, immutable configuration for one supervisor run.
#[derive(Debug, Clone)]
pub struct Config {
    pub max_ins_load: f64,
    pub monitor_period_ms: u64,
    pub log_level: LogLevel,
    pub overloaded_trigger: Option<PathBuf>,
    pub start_all_ins_instances: bool,
    pub max_ins_count: usize,
    pub bus_root: String,
}

impl TryFrom<CmdArgs> for Config {
    type Error = ConfigError;

    fn try_from(args: CmdArgs) -> Result<Self, Self::Error> {
        if args.max_ins_load < 1 || args.max_ins_load > 100 {
            return Err(ConfigError::LoadOutOfRange(args.max_ins_load));
        }
        if args.ins_instance_limit > MAX_INS_COUNT {
            return Err(ConfigError::InstanceLimitTooHigh(args.ins_instance_limit));
        }
        if let Some(trigger) = &args.overloaded_trigger {
            if trigger_exists(trigger) {
                return Err(ConfigError::TriggerAlreadyExists(trigger.clone()));
            }
        }

        let max_ins_count = if args.ins_instance_limit == 0 {
            MAX_INS_COUNT
        } else {
            args.ins_instance_limit
        };

        Ok(Config {
            max_ins_load: f64::from(args.max_ins_load) / 100.0,
            monitor_period_ms: args.monitor_period_ms,
            log_level: args.log_level,
            overloaded_trigger: args.overloaded_trigger,
            start_all_ins_instances: args.start_all_ins_instances,
            max_ins_count,
            bus_root: args.bus_root,
        })
    }
}

fn trigger_exists(path: &Path) -> bool {
    path.is_file()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> CmdArgs {
        CmdArgs {
            max_ins_load: 80,
            monitor_period_ms: 50,
            log_level: LogLevel::Info,
            overloaded_trigger: None,
            start_all_ins_instances: false,
            ins_instance_limit: 0,
            bus_root: "/mw".to_string(),
        }
    }

    #[test]
    fn valid_args_convert_to_config() {
        let cfg = Config::try_from(base_args()).unwrap();
        assert_eq!(cfg.max_ins_count, MAX_INS_COUNT);
        assert!((cfg.max_ins_load - 0.80).abs() < f64::EPSILON);
    }

    #[test]
    fn rejects_out_of_range_load() {
        let mut args = base_args();
        args.max_ins_load = 0;
        assert!(matches!(Config::try_from(args), Err(ConfigError::LoadOutOfRange(0))));
        let mut args = base_args();
        args.max_ins_load = 101;
        assert!(matches!(Config::try_from(args), Err(ConfigError::LoadOutOfRange(101))));
    }

    #[test]
    fn rejects_instance_limit_above_cap() {
        let mut args = base_args();
        args.ins_instance_limit = MAX_INS_COUNT + 1;
        assert!(matches!(Config::try_from(args), Err(ConfigError::InstanceLimitTooHigh(_))));
    }

    #[test]
    fn instance_limit_of_zero_uses_compiled_in_cap() {
        let cfg = Config::try_from(base_args()).unwrap();
        assert_eq!(cfg.max_ins_count, MAX_INS_COUNT);
    }

    #[test]
    fn explicit_instance_limit_is_honored() {
        let mut args = base_args();
        args.ins_instance_limit = 2;
        let cfg = Config::try_from(args).unwrap();
        assert_eq!(cfg.max_ins_count, 2);
    }
}
