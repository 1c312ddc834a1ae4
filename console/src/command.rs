//! The single-character operator commands the console recognizes.

/// One keystroke the operator console understands, matching the
/// original toolset's key bindings exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Quit,
    Help,
    PrintOpenSockets,
    UnmuteMonitor,
    MuteMonitor,
    MonitorOn,
    MonitorOff,
    CloseSocket,
}

impl Command {
    /// Map a single input byte to the command it triggers, if any.
    pub fn from_byte(byte: u8) -> Option<Command> {
        Some(match byte {
            b'q' => Command::Quit,
            b'h' => Command::Help,
            b'p' => Command::PrintOpenSockets,
            b'm' => Command::UnmuteMonitor,
            b'M' => Command::MuteMonitor,
            b'o' => Command::MonitorOn,
            b'O' => Command::MonitorOff,
            b'c' => Command::CloseSocket,
            _ => return None,
        })
    }
}

pub const HELP_TEXT: &str = "\
q - quit
h - help
p - print open sockets
m - netflow information monitor un-muted
M - netflow information monitor muted
o - netflow information monitor on (enables open socket list)
O - netflow information monitor off (disables open socket list)
c - close socket (mitigation)";
