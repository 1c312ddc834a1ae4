//! Entry point: validates the environment, wires every subsystem
//! together, and runs until a shutdown signal arrives.

mod netflow_addr;
mod preflight;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use miette::{Context, IntoDiagnostic};
use parking_lot::Mutex;
use tracing::{debug, info, warn};
use tracing_subscriber::layer::SubscriberExt;

use args::{CmdArgs, Config};
use common::{install_signal_handlers, MacPool, ShutdownFlag};
use forwarder::{PacketFilter, ShellPacketFilter};
use ins::InsMap;
use kv::Bus;
use netflow_addr::parse_netflow_addr;
use supervisor::{Dispatcher, Runner, RunnerConfig, ShellHypervisor};

const IPV4_FORWARD_PATH: &str = "/proc/sys/net/ipv4/ip_forward";
const NETFLOW_SERVER_KEY: &str = "netflow";

fn early_init(level: tracing::Level) {
    let subscriber = tracing_subscriber::fmt()
        .with_ansi(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_level(true)
        .with_max_level(level)
        .with_line_number(true)
        .finish()
        .with(tracing_error::ErrorLayer::default());
    tracing::subscriber::set_global_default(subscriber)
        .into_diagnostic()
        .wrap_err("failed to set tracing subscriber")
        .unwrap();
    color_eyre::install().unwrap();
    debug!("color-eyre enabled");
}

fn build_bus(root: &str) -> Arc<dyn Bus> {
    #[cfg(feature = "xenstore")]
    {
        match kv::XenStoreBus::connect(root) {
            Ok(bus) => return Arc::new(bus),
            Err(err) => {
                warn!(%err, "falling back to an in-memory bus");
            }
        }
    }
    let _ = root;
    Arc::new(kv::MockBus::new())
}

fn main() {
    let cmd_args = CmdArgs::parse();
    early_init(cmd_args.log_level.as_tracing_level());

    let args_yaml = serde_yaml_ng::to_string(&cmd_args)
        .into_diagnostic()
        .wrap_err("failed to serialize command line arguments")
        .unwrap();
    info!("parsed command line arguments as:\n---\n{args_yaml}");

    let config = Config::try_from(cmd_args)
        .into_diagnostic()
        .wrap_err("invalid command line arguments given")
        .unwrap();

    preflight::require_root(nix::unistd::Uid::effective().is_root())
        .into_diagnostic()
        .wrap_err("startup prerequisite check failed")
        .unwrap();
    preflight::require_ipv4_forwarding(Path::new(IPV4_FORWARD_PATH))
        .into_diagnostic()
        .wrap_err("startup prerequisite check failed")
        .unwrap();

    let shutdown = install_signal_handlers(ShutdownFlag::new())
        .into_diagnostic()
        .wrap_err("failed to install signal handlers")
        .unwrap();

    let bus = build_bus(&config.bus_root);
    let (watcher_handle, events) = kv::spawn_watcher(bus.clone(), config.bus_root.clone(), shutdown.clone());

    let backend: Arc<dyn PacketFilter> = Arc::new(
        ShellPacketFilter::new(false)
            .into_diagnostic()
            .wrap_err("failed to initialize the packet filter backend")
            .unwrap(),
    );

    let map = Arc::new(InsMap::new());
    let macs = Arc::new(Mutex::new(MacPool::default_pool()));

    let dispatcher = Dispatcher::new(config.bus_root.clone(), map.clone(), backend.clone());
    let dispatcher_shutdown = shutdown.clone();
    let dispatcher_handle = std::thread::Builder::new()
        .name("mw-dispatcher".into())
        .spawn(move || {
            while !dispatcher_shutdown.is_set() {
                match events.recv_timeout(Duration::from_millis(200)) {
                    Ok(event) => {
                        if let Err(err) = dispatcher.dispatch(event) {
                            debug!(%err, "dropping unrecognized or malformed bus event");
                        }
                    }
                    Err(std::sync::mpsc::RecvTimeoutError::Timeout) => continue,
                    Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => break,
                }
            }
        })
        .expect("spawning dispatcher thread");

    let hypervisor = Arc::new(ShellHypervisor::new(
        "xl",
        vec!["create".into(), "-M".into(), "256".into(), "-N".into(), "{name}".into(), "mac={mac}".into()],
        "xl",
        vec!["destroy".into(), "{domid}".into()],
    ));

    let runner_config = RunnerConfig {
        max_ins_load: config.max_ins_load,
        max_ins_count: config.max_ins_count,
        start_all_ins_instances: config.start_all_ins_instances,
        monitor_interval: (config.monitor_period_ms > 0)
            .then(|| Duration::from_millis(config.monitor_period_ms)),
    };
    let runner_handle = supervisor::spawn_runner(runner_config, map.clone(), macs, hypervisor, shutdown.clone());

    let netflow_handles = match bus.read(&format!("{}/{NETFLOW_SERVER_KEY}", config.bus_root)) {
        Ok(Some(raw)) => match parse_netflow_addr(&raw) {
            Ok(addr) => match netflow::NetflowClient::connect(addr) {
                Ok(client) => {
                    let client = Arc::new(client);
                    match client.try_clone_stream() {
                        Ok(stream) => {
                            let (events, reader_handle) = client.spawn_reader(stream, shutdown.clone());
                            let console_state = Arc::new(Mutex::new(console::ConsoleState::default()));
                            let printer_handle =
                                console::spawn_event_printer(events, console_state.clone(), shutdown.clone());
                            let console_handle = console::spawn_console(client, console_state, shutdown.clone());
                            Some((reader_handle, printer_handle, console_handle))
                        }
                        Err(err) => {
                            warn!(%err, "failed to clone netflow stream, console disabled");
                            None
                        }
                    }
                }
                Err(err) => {
                    warn!(%err, "failed to connect to the netflow server, console disabled");
                    None
                }
            },
            Err(err) => {
                warn!(%err, "malformed netflow server address on the bus, console disabled");
                None
            }
        },
        Ok(None) => {
            warn!("no netflow server address published yet, console disabled");
            None
        }
        Err(err) => {
            warn!(%err, "failed to read netflow server address, console disabled");
            None
        }
    };

    runner_handle.join().expect("supervisor thread panicked");
    dispatcher_handle.join().expect("dispatcher thread panicked");
    watcher_handle.join().expect("watcher thread panicked");
    if let Some((reader_handle, printer_handle, console_handle)) = netflow_handles {
        reader_handle.join().expect("netflow reader thread panicked");
        printer_handle.join().expect("netflow event printer thread panicked");
        console_handle.join().expect("console thread panicked");
    }

    info!("mw-supervisord exiting cleanly");
}
