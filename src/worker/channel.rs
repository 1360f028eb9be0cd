//! Duplex message channel between the orchestrator and a worker
//!
//! A channel end is split into an [`Outlet`] (sending half, clonable) and an
//! [`Inlet`] (receiving half). Two carriers are supported:
//!
//! - in-memory crossbeam channels, for thread-hosted workers
//! - newline-delimited JSON over a byte stream pair, for process-hosted
//!   workers (child stdin/stdout)
//!
//! Channel teardown is never an error: a failed send marks the outlet closed
//! and returns `false`, a receiver whose peer is gone polls [`Poll::Closed`].

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use log::{debug, trace, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::{BufRead, BufReader, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Result of polling an [`Inlet`]
#[derive(Debug, PartialEq)]
pub enum Poll<T> {
    /// A message was received
    Message(T),
    /// Nothing arrived within the poll interval
    Empty,
    /// The peer is gone and no message is pending
    Closed,
}

type SharedWriter = Arc<Mutex<Box<dyn Write + Send>>>;

enum Sink<T> {
    Channel(Sender<T>),
    Stream(SharedWriter),
}

impl<T> Clone for Sink<T> {
    fn clone(&self) -> Self {
        match self {
            Sink::Channel(tx) => Sink::Channel(tx.clone()),
            Sink::Stream(writer) => Sink::Stream(Arc::clone(writer)),
        }
    }
}

/// Sending half of a channel end
pub struct Outlet<T> {
    sink: Sink<T>,
    closed: Arc<AtomicBool>,
}

impl<T> Clone for Outlet<T> {
    fn clone(&self) -> Self {
        Self {
            sink: self.sink.clone(),
            closed: Arc::clone(&self.closed),
        }
    }
}

impl<T: Serialize> Outlet<T> {
    /// Send a message, returning `false` if it could not be delivered
    pub fn send(&self, message: T) -> bool {
        if self.is_closed() {
            return false;
        }

        let delivered = match &self.sink {
            Sink::Channel(tx) => tx.send(message).is_ok(),
            Sink::Stream(writer) => {
                let line = match serde_json::to_string(&message) {
                    Ok(line) => line,
                    Err(e) => {
                        warn!("Cannot encode message: {}", e);
                        return false;
                    }
                };
                let mut writer = writer.lock().unwrap_or_else(|e| e.into_inner());
                writeln!(writer, "{}", line)
                    .and_then(|_| writer.flush())
                    .is_ok()
            }
        };

        if !delivered {
            debug!("Peer gone, closing channel");
            self.closed.store(true, Ordering::SeqCst);
        }
        delivered
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Receiving half of a channel end
pub struct Inlet<T> {
    rx: Receiver<T>,
}

impl<T> Inlet<T> {
    /// Wait up to `timeout` for a message
    pub fn poll(&self, timeout: Duration) -> Poll<T> {
        match self.rx.recv_timeout(timeout) {
            Ok(message) => Poll::Message(message),
            Err(RecvTimeoutError::Timeout) => Poll::Empty,
            Err(RecvTimeoutError::Disconnected) => Poll::Closed,
        }
    }

    /// Non-blocking poll
    pub fn try_poll(&self) -> Poll<T> {
        match self.rx.try_recv() {
            Ok(message) => Poll::Message(message),
            Err(TryRecvError::Empty) => Poll::Empty,
            Err(TryRecvError::Disconnected) => Poll::Closed,
        }
    }
}

/// One end of a duplex channel
pub type End<S, R> = (Outlet<S>, Inlet<R>);

/// Create a connected in-memory channel pair
///
/// The first end sends `A` and receives `B`, the second the reverse.
pub fn pair<A, B>() -> (End<A, B>, End<B, A>) {
    let (a_tx, a_rx) = unbounded();
    let (b_tx, b_rx) = unbounded();
    let closed_a = Arc::new(AtomicBool::new(false));
    let closed_b = Arc::new(AtomicBool::new(false));

    (
        (
            Outlet {
                sink: Sink::Channel(a_tx),
                closed: closed_a,
            },
            Inlet { rx: b_rx },
        ),
        (
            Outlet {
                sink: Sink::Channel(b_tx),
                closed: closed_b,
            },
            Inlet { rx: a_rx },
        ),
    )
}

/// Build a channel end over a byte stream pair
///
/// A pump thread decodes one JSON message per line from `reader`. Lines that
/// do not decode are logged and skipped; end of stream closes the inlet.
pub fn from_streams<S, R>(
    reader: impl Read + Send + 'static,
    writer: impl Write + Send + 'static,
    label: &str,
) -> End<S, R>
where
    R: DeserializeOwned + Send + 'static,
{
    let (tx, rx) = unbounded();
    let label = label.to_string();

    let spawned = thread::Builder::new()
        .name(format!("{}-pump", label))
        .spawn(move || pump(reader, tx, &label));
    if let Err(e) = spawned {
        // The sender was moved into the failed closure and dropped: the inlet reads Closed
        warn!("Cannot start channel reader: {}", e);
    }

    let writer: Box<dyn Write + Send> = Box::new(writer);
    (
        Outlet {
            sink: Sink::Stream(Arc::new(Mutex::new(writer))),
            closed: Arc::new(AtomicBool::new(false)),
        },
        Inlet { rx },
    )
}

fn pump<R: DeserializeOwned>(reader: impl Read, tx: Sender<R>, label: &str) {
    for line in BufReader::new(reader).lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                debug!("{}: stream read failed: {}", label, e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<R>(&line) {
            Ok(message) => {
                if tx.send(message).is_err() {
                    break;
                }
            }
            Err(e) => warn!("{}: ignoring unknown message '{}': {}", label, line, e),
        }
    }
    trace!("{}: stream closed", label);
}
