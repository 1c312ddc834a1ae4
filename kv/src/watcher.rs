//! The thread that blocks on [`Bus::next_event`] and forwards every change
//! to a channel for the dispatcher to consume.

use std::sync::Arc;
use std::sync::mpsc::{Receiver, Sender, channel};
use std::thread::{self, JoinHandle};

use common::ShutdownFlag;
use tracing::{debug, warn};

use crate::bus::{Bus, Event};

/// Spawns the watcher thread and returns its handle plus the receiving
/// end of the event channel. The thread exits once `shutdown` is set and
/// the bus implementation's current blocking call returns.
pub fn spawn_watcher(bus: Arc<dyn Bus>, root: String, shutdown: ShutdownFlag) -> (JoinHandle<()>, Receiver<Event>) {
    let (tx, rx): (Sender<Event>, Receiver<Event>) = channel();
    let handle = thread::Builder::new()
        .name("mw-kv-watcher".to_string())
        .spawn(move || {
            while !shutdown.is_set() {
                match bus.next_event(&root) {
                    Ok(event) => {
                        debug!(path = %event.path, "bus event");
                        if tx.send(event).is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        // A timed-out poll looks the same as a real bus hiccup from here;
                        // either way the right move is to check shutdown and try again.
                        debug!(%err, "no event ready");
                    }
                }
            }
            warn!("kv watcher thread exiting");
        })
        .expect("failed to spawn kv watcher thread");
    (handle, rx)
}
