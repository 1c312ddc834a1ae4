//! TCP client for the netflow channel: connects to the address an
//! instance publishes on the bus, reads observations and feature
//! responses off a blocking reader thread, and lets other threads send
//! feature requests.

use std::collections::HashSet;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::mpsc::{Receiver, Sender, channel};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use bytes::{Buf, BytesMut};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use common::ShutdownFlag;

use crate::flags::Flags;
use crate::outstanding::{feature_name, OutstandingRequestTable};
use crate::signature::Signature;
use crate::wire::{Base, FeatureRequest, FeatureResponse, Observation, WireError, BASE_LEN};

/// A read-loop connection error, surfaced to the caller that owns the
/// reconnect policy.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("connecting to netflow channel at {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("writing feature request: {0}")]
    Write(#[from] std::io::Error),
}

/// Events the reader thread hands to whoever is consuming the channel
/// (the operator console, principally).
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    Observation(Observation),
    FeatureResponse {
        response: FeatureResponse,
        request: Option<crate::outstanding::PendingRequest>,
    },
}

/// A connected netflow channel: a writer half for feature requests, an
/// open-socket set maintained from observed lifecycle events, and the
/// outstanding-request table the reader thread consults to label
/// responses.
pub struct NetflowClient {
    writer: Mutex<TcpStream>,
    outstanding: Arc<OutstandingRequestTable>,
    open_sockets: Arc<Mutex<HashSet<u64>>>,
}

impl NetflowClient {
    pub fn connect(addr: SocketAddr) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr).map_err(|source| ClientError::Connect { addr, source })?;
        stream.set_nodelay(true).ok();
        Ok(NetflowClient {
            writer: Mutex::new(stream),
            outstanding: Arc::new(OutstandingRequestTable::new()),
            open_sockets: Arc::new(Mutex::new(HashSet::new())),
        })
    }

    /// Spawn the blocking reader thread. Returns a receiver of decoded
    /// events and the join handle; the thread exits once the shutdown
    /// flag is set or the peer closes the connection.
    pub fn spawn_reader(
        &self,
        stream: TcpStream,
        shutdown: ShutdownFlag,
    ) -> (Receiver<ChannelEvent>, JoinHandle<()>) {
        let (tx, rx): (Sender<ChannelEvent>, Receiver<ChannelEvent>) = channel();
        let outstanding = Arc::clone(&self.outstanding);
        let open_sockets = Arc::clone(&self.open_sockets);
        let handle = thread::Builder::new()
            .name("mw-netflow-reader".into())
            .spawn(move || read_loop(stream, shutdown, tx, outstanding, open_sockets))
            .expect("spawning netflow reader thread");
        (rx, handle)
    }

    /// The sockets currently believed open, derived from observed
    /// create/accept/close events.
    pub fn open_sockets(&self) -> Vec<u64> {
        self.open_sockets.lock().iter().copied().collect()
    }

    /// Clear the locally tracked open-socket set (operator `O` command).
    pub fn clear_open_sockets(&self) {
        self.open_sockets.lock().clear();
    }

    pub fn outstanding_count(&self) -> usize {
        self.outstanding.outstanding_count()
    }

    /// Encode and send a feature request, returning the id it was
    /// allocated under so the caller can match it against later
    /// responses if it wants to track its own request independently of
    /// the outstanding table.
    pub fn send_feature_request(
        &self,
        flags: Flags,
        name: u16,
        val0: u64,
        val1: u64,
        sockfd: u64,
    ) -> Result<u32, ClientError> {
        let id = self.outstanding.insert(name, sockfd);
        info!(feature = feature_name(name), ?flags, sockfd, "sending feature request");
        let request = FeatureRequest {
            base: Base { sig: Signature::FeatureRequest as u16, id },
            flags,
            name,
            val0,
            val1,
            sockfd,
        };
        let mut buf = BytesMut::with_capacity(FeatureRequest::ENCODED_LEN);
        request.encode(&mut buf);
        self.writer.lock().write_all(&buf)?;
        Ok(id)
    }

    /// A handle to the same stream this client writes on, for the reader
    /// thread to read from (`TcpStream::try_clone`).
    pub fn try_clone_stream(&self) -> std::io::Result<TcpStream> {
        self.writer.lock().try_clone()
    }
}

fn read_loop(
    mut stream: TcpStream,
    shutdown: ShutdownFlag,
    tx: Sender<ChannelEvent>,
    outstanding: Arc<OutstandingRequestTable>,
    open_sockets: Arc<Mutex<HashSet<u64>>>,
) {
    stream
        .set_read_timeout(Some(Duration::from_millis(200)))
        .ok();

    'reader: while !shutdown.is_set() {
        let mut header = [0u8; BASE_LEN];
        match read_exact_or_timeout(&mut stream, &mut header) {
            ReadOutcome::TimedOut => continue,
            ReadOutcome::Closed => {
                warn!("netflow channel closed by peer");
                break 'reader;
            }
            ReadOutcome::Ready => {}
        }

        let mut header_buf = &header[..];
        let base = Base::decode(&mut header_buf).expect("fixed-size header decode cannot fail");

        match base.signature() {
            Ok(Signature::Info) => {
                let mut payload = [0u8; crate::wire::OBSERVATION_PAYLOAD_LEN];
                if let ReadOutcome::Closed = read_exact_or_timeout(&mut stream, &mut payload) {
                    warn!("netflow channel closed mid-observation");
                    break 'reader;
                }
                let mut payload_buf = &payload[..];
                match Observation::decode(base, &mut payload_buf) {
                    Ok(observation) => {
                        track_open_sockets(&open_sockets, &observation);
                        if tx.send(ChannelEvent::Observation(observation)).is_err() {
                            break 'reader;
                        }
                    }
                    Err(err) => debug!(%err, "dropping malformed observation"),
                }
            }
            Ok(Signature::FeatureResponse) => {
                let mut payload = [0u8; crate::wire::FEATURE_RESPONSE_PAYLOAD_LEN];
                if let ReadOutcome::Closed = read_exact_or_timeout(&mut stream, &mut payload) {
                    warn!("netflow channel closed mid-response");
                    break 'reader;
                }
                let mut payload_buf = &payload[..];
                match FeatureResponse::decode(base, &mut payload_buf) {
                    Ok(response) => {
                        let request = outstanding.take_for_response(&response);
                        if request.is_none() {
                            debug!(id = response.base.id, "response with no matching outstanding request");
                        }
                        if tx.send(ChannelEvent::FeatureResponse { response, request }).is_err() {
                            break 'reader;
                        }
                    }
                    Err(err) => debug!(%err, "dropping malformed feature response"),
                }
            }
            Ok(Signature::FeatureRequest) | Err(WireError::UnknownSignature(_)) => {
                warn!(sig = format!("{:#06x}", base.sig), "unrecognized signature, resynchronizing channel");
                break 'reader;
            }
            Err(err) => {
                debug!(%err, "dropping frame with malformed signature");
            }
        }
    }
}

enum ReadOutcome {
    Ready,
    TimedOut,
    Closed,
}

fn read_exact_or_timeout(stream: &mut TcpStream, buf: &mut [u8]) -> ReadOutcome {
    let mut filled = 0;
    while filled < buf.len() {
        match stream.read(&mut buf[filled..]) {
            Ok(0) => return ReadOutcome::Closed,
            Ok(n) => filled += n,
            Err(err)
                if err.kind() == std::io::ErrorKind::WouldBlock
                    || err.kind() == std::io::ErrorKind::TimedOut =>
            {
                if filled == 0 {
                    return ReadOutcome::TimedOut;
                }
                continue;
            }
            Err(_) => return ReadOutcome::Closed,
        }
    }
    ReadOutcome::Ready
}

fn track_open_sockets(open_sockets: &Mutex<HashSet<u64>>, observation: &Observation) {
    use crate::wire::ObservationKind::*;
    match observation.kind() {
        Some(Create) => {
            open_sockets.lock().insert(observation.sockfd);
        }
        // The listening socket accepts; `extra` carries the fd of the
        // newly accepted connection, which is the one that's actually open.
        Some(Accept) => {
            open_sockets.lock().insert(observation.extra);
        }
        Some(Close) => {
            open_sockets.lock().remove(&observation.sockfd);
        }
        _ => {}
    }
}
