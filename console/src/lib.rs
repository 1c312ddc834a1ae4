//! Interactive operator console for the netflow channel: a raw-mode
//! stdin loop offering the same single-character commands as the
//! original toolset, backed by a live [`netflow::NetflowClient`].

pub mod command;
pub mod term;

use std::io::{self, Read, Write};
use std::os::fd::AsFd;
use std::os::unix::io::BorrowedFd;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use parking_lot::Mutex;
use tracing::info;

use common::ShutdownFlag;
use netflow::{feature, ChannelEvent, Flags, NetflowClient};

pub use command::{Command, HELP_TEXT};
pub use term::{RawModeGuard, TermError};

const POLL_INTERVAL_MS: u16 = 100;

/// Local console state, separate from the netflow client's own
/// bookkeeping: whether the monitor is on and whether its output is
/// muted on this terminal. Shared between the stdin loop and the
/// channel-event printer thread.
#[derive(Debug, Clone, Copy)]
pub struct ConsoleState {
    pub monitor_on: bool,
    pub muted: bool,
}

impl Default for ConsoleState {
    fn default() -> Self {
        ConsoleState { monitor_on: true, muted: false }
    }
}

/// Apply a command against live state, returning `false` when the
/// command requests the console loop to exit. Side-effecting commands
/// (monitor on/off, close socket) go out over `client`; everything else
/// only touches `state` and stdout.
pub fn apply_command(
    command: Command,
    state: &Mutex<ConsoleState>,
    client: &NetflowClient,
    out: &mut impl Write,
) -> io::Result<bool> {
    match command {
        Command::Quit => {
            writeln!(out, "*** GoodBye ***")?;
            return Ok(false);
        }
        Command::Help => {
            writeln!(out, "*** Commands ***")?;
            writeln!(out, "{HELP_TEXT}")?;
        }
        Command::PrintOpenSockets => {
            if state.lock().monitor_on {
                writeln!(out, "*** Open socket list ***")?;
                for sockfd in client.open_sockets() {
                    writeln!(out, "socket {sockfd:#x}/{sockfd}")?;
                }
            } else {
                writeln!(out, "*** Open socket list (disabled when traffic monitor is off) ***")?;
            }
        }
        Command::UnmuteMonitor => {
            state.lock().muted = false;
            writeln!(out, "*** NetFlow Information Display (Un-Muted) ***")?;
        }
        Command::MuteMonitor => {
            state.lock().muted = true;
            writeln!(out, "*** NetFlow Information Display (Muted) ***")?;
        }
        Command::MonitorOn => {
            client.send_feature_request(
                Flags::READ,
                feature::MT_CHANNEL_TRAFFIC_MONITOR_ON,
                0,
                0,
                0,
            ).map_err(io::Error::other)?;
            state.lock().monitor_on = true;
            writeln!(out, "*** NetFlow Information Display (On) ***")?;
        }
        Command::MonitorOff => {
            client.send_feature_request(
                Flags::READ,
                feature::MT_CHANNEL_TRAFFIC_MONITOR_OFF,
                0,
                0,
                0,
            ).map_err(io::Error::other)?;
            state.lock().monitor_on = false;
            client.clear_open_sockets();
            writeln!(out, "*** NetFlow Information Display (Off) ***")?;
        }
        Command::CloseSocket => close_socket_interactive(client, out)?,
    }
    Ok(true)
}

fn close_socket_interactive(client: &NetflowClient, out: &mut impl Write) -> io::Result<()> {
    let open = client.open_sockets();
    if open.is_empty() {
        writeln!(out, "*** No open sockets ***")?;
        return Ok(());
    }
    writeln!(out, " 0) exit without closing socket")?;
    for (i, sockfd) in open.iter().enumerate() {
        writeln!(out, "{:>2}) socket {:#x}/{}", i + 1, sockfd, sockfd)?;
    }
    write!(out, "Index of socket to close: ")?;
    out.flush()?;

    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    let index: usize = match line.trim().parse() {
        Ok(0) => return Ok(()),
        Ok(n) if n >= 1 && n <= open.len() => n,
        _ => {
            writeln!(out, "*** Invalid option, you needed to enter a valid index ***")?;
            return Ok(());
        }
    };
    let sockfd = open[index - 1];
    writeln!(out, "*** Closing open socket {sockfd:#x} ***")?;
    client
        .send_feature_request(
            Flags::WRITE | Flags::BY_SOCK,
            feature::MT_SOCK_ATTRIB_OPEN,
            0,
            0,
            sockfd,
        )
        .map_err(io::Error::other)?;
    Ok(())
}

/// Drain whatever netflow channel events are ready, printing them
/// unless the console is currently muted.
pub fn print_channel_events(events: &Receiver<ChannelEvent>, state: &Mutex<ConsoleState>, out: &mut impl Write) {
    while let Ok(event) = events.try_recv() {
        if state.lock().muted {
            continue;
        }
        match event {
            ChannelEvent::Observation(obs) => {
                let _ = writeln!(
                    out,
                    "obs={:?} sockfd={} remote={}:{}",
                    obs.kind(),
                    obs.sockfd,
                    obs.remote.addr,
                    obs.remote.port
                );
            }
            ChannelEvent::FeatureResponse { response, request } => {
                let _ = writeln!(out, "feature response status={} for={:?}", response.status, request);
            }
        }
    }
}

/// Run the interactive stdin loop until the operator quits or shutdown
/// is requested. `fd` must already be in raw/cbreak mode (see
/// [`RawModeGuard`]).
pub fn run_stdin_loop(
    fd: BorrowedFd<'_>,
    client: &NetflowClient,
    state: &Mutex<ConsoleState>,
    shutdown: &ShutdownFlag,
) -> io::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    writeln!(out, "*** Type 'h' for help menu ***")?;

    while !shutdown.is_set() {
        let mut fds = [PollFd::new(fd, PollFlags::POLLIN)];
        let ready = poll(&mut fds, PollTimeout::from(POLL_INTERVAL_MS)).unwrap_or(0);
        if ready <= 0 {
            continue;
        }
        let mut byte = [0u8; 1];
        if io::stdin().read(&mut byte)? == 0 {
            break;
        }
        let Some(command) = Command::from_byte(byte[0]) else {
            continue;
        };
        if !apply_command(command, state, client, &mut out)? {
            shutdown.trigger();
            break;
        }
    }
    Ok(())
}

/// Spawns the interactive stdin loop on a dedicated thread.
pub fn spawn_console(
    client: Arc<NetflowClient>,
    state: Arc<Mutex<ConsoleState>>,
    shutdown: ShutdownFlag,
) -> std::thread::JoinHandle<()> {
    std::thread::Builder::new()
        .name("mw-console".into())
        .spawn(move || {
            let stdin = io::stdin();
            let fd = stdin.as_fd();
            match RawModeGuard::enable(fd) {
                Ok(guard) => {
                    if let Err(err) = run_stdin_loop(fd, &client, &state, &shutdown) {
                        tracing::warn!(%err, "console loop exited with an error");
                    }
                    if let Err(err) = guard.restore(fd) {
                        tracing::warn!(%err, "failed to restore terminal settings");
                    }
                }
                Err(err) => {
                    tracing::warn!(%err, "console running without raw mode");
                    if let Err(err) = run_stdin_loop(fd, &client, &state, &shutdown) {
                        tracing::warn!(%err, "console loop exited with an error");
                    }
                }
            }
            info!("console thread exiting");
        })
        .expect("spawning console thread")
}

/// Spawns the thread that drains and prints netflow channel events,
/// sharing `state` with the stdin loop so muting one mutes the other.
pub fn spawn_event_printer(
    events: Receiver<ChannelEvent>,
    state: Arc<Mutex<ConsoleState>>,
    shutdown: ShutdownFlag,
) -> std::thread::JoinHandle<()> {
    std::thread::Builder::new()
        .name("mw-console-events".into())
        .spawn(move || {
            let stdout = io::stdout();
            let mut out = stdout.lock();
            while !shutdown.is_set() {
                match events.recv_timeout(Duration::from_millis(200)) {
                    Ok(event) => {
                        print_channel_events_single(&event, &state, &mut out);
                    }
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
        })
        .expect("spawning console event printer thread")
}

fn print_channel_events_single(event: &ChannelEvent, state: &Mutex<ConsoleState>, out: &mut impl Write) {
    if state.lock().muted {
        return;
    }
    match event {
        ChannelEvent::Observation(obs) => {
            let _ = writeln!(
                out,
                "obs={:?} sockfd={} remote={}:{}",
                obs.kind(),
                obs.sockfd,
                obs.remote.addr,
                obs.remote.port
            );
        }
        ChannelEvent::FeatureResponse { response, request } => {
            let _ = writeln!(out, "feature response status={} for={:?}", response.status, request);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::sync::mpsc::channel;

    fn connected_client() -> NetflowClient {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let _accept_thread = std::thread::spawn(move || listener.accept());
        NetflowClient::connect(addr).unwrap()
    }

    #[test]
    fn quit_signals_the_loop_to_stop() {
        let client = connected_client();
        let state = Mutex::new(ConsoleState::default());
        let mut out = Vec::new();
        let keep_going = apply_command(Command::Quit, &state, &client, &mut out).unwrap();
        assert!(!keep_going);
    }

    #[test]
    fn help_prints_every_command() {
        let client = connected_client();
        let state = Mutex::new(ConsoleState::default());
        let mut out = Vec::new();
        apply_command(Command::Help, &state, &client, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("q - quit"));
    }

    #[test]
    fn mute_and_unmute_toggle_state_only() {
        let client = connected_client();
        let state = Mutex::new(ConsoleState::default());
        let mut out = Vec::new();
        apply_command(Command::MuteMonitor, &state, &client, &mut out).unwrap();
        assert!(state.lock().muted);
        apply_command(Command::UnmuteMonitor, &state, &client, &mut out).unwrap();
        assert!(!state.lock().muted);
    }

    #[test]
    fn closing_with_no_open_sockets_reports_it() {
        let client = connected_client();
        let mut out = Vec::new();
        close_socket_interactive(&client, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("No open sockets"));
    }

    #[test]
    fn print_channel_events_skips_output_while_muted() {
        let (tx, rx) = channel();
        tx.send(ChannelEvent::FeatureResponse {
            response: netflow::FeatureResponse {
                base: netflow::Base { sig: 0xd32f, id: 1 },
                status: 0,
                val: [0u8; 16],
            },
            request: None,
        })
        .unwrap();
        let state = Mutex::new(ConsoleState { monitor_on: true, muted: true });
        let mut out = Vec::new();
        print_channel_events(&rx, &state, &mut out);
        assert!(out.is_empty());
    }
}
