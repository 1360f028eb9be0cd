//! Worker hosting and command protocol
//!
//! Every worker (scanner, EXIF loader, mover) is a [`Worker`] implementation
//! driven by the same command loop:
//!
//! - poll the channel for a [`Request`] with a bounded interval
//! - dispatch `Run(command)` to [`Worker::handle`]
//! - exit on `Stop` or when the orchestrator side is gone
//!
//! Workers publish [`Worker::Event`]s; each event names its topic so the
//! orchestrator-side [`WorkerProxy`] can route it to subscribers.
//!
//! # Submodules
//!
//! - `channel` - Duplex channel over crossbeam channels or JSON lines
//! - `proxy` - Orchestrator-side handle: start, send, subscribe, stop

pub mod channel;
pub mod proxy;

pub use channel::{Inlet, Outlet, Poll};
pub use proxy::WorkerProxy;

use log::{debug, info};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt::Debug;
use std::path::PathBuf;
use std::time::Duration;

/// Message with a routing tag: the verb of a command, the topic of an event
pub trait Tagged {
    fn tag(&self) -> &'static str;
}

/// Envelope of every message sent to a worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Request<C> {
    /// Exit the command loop
    Stop,
    /// Run a worker-specific command
    Run(C),
}

/// The kinds of worker the orchestrator starts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum WorkerKind {
    Scanner,
    ExifLoader,
    Mover,
}

impl WorkerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerKind::Scanner => "scanner",
            WorkerKind::ExifLoader => "exif-loader",
            WorkerKind::Mover => "mover",
        }
    }
}

/// Where workers run
#[derive(Debug, Clone, PartialEq)]
pub enum Hosting {
    /// A thread of the current process, in-memory channels
    Thread,
    /// A child process speaking JSON lines over stdin/stdout
    Process {
        /// Executable providing the `worker <kind>` entry point
        program: PathBuf,
        /// Configuration file forwarded to the child
        config: Option<PathBuf>,
    },
}

/// Loop timing shared by workers and their proxies
#[derive(Debug, Clone, Copy)]
pub struct Timing {
    pub poll_interval: Duration,
    pub stop_timeout: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(10),
            stop_timeout: Duration::from_millis(250),
        }
    }
}

/// A command-driven worker
pub trait Worker: Send + 'static {
    const KIND: WorkerKind;
    const NAME: &'static str;

    type Command: Tagged + Serialize + DeserializeOwned + Debug + Send + 'static;
    type Event: Tagged + Serialize + DeserializeOwned + Debug + Send + 'static;

    /// Called once before the first command
    fn pre_run(&mut self, _publisher: &Publisher<Self::Event>) {}

    fn handle(&mut self, command: Self::Command, ctx: &mut Context<'_, Self::Command, Self::Event>);

    /// Called once after the loop exits, to release owned resources
    fn post_run(&mut self) {}
}

/// Clonable handle publishing events back to the orchestrator
pub struct Publisher<E> {
    outlet: Outlet<E>,
}

impl<E> Clone for Publisher<E> {
    fn clone(&self) -> Self {
        Self {
            outlet: self.outlet.clone(),
        }
    }
}

impl<E: Tagged + Serialize> Publisher<E> {
    pub fn new(outlet: Outlet<E>) -> Self {
        Self { outlet }
    }

    /// Publish an event; `false` once the orchestrator is gone
    pub fn publish(&self, event: E) -> bool {
        log::trace!("Publishing {}", event.tag());
        self.outlet.send(event)
    }

    pub fn is_closed(&self) -> bool {
        self.outlet.is_closed()
    }
}

/// Per-command view of the worker loop
pub struct Context<'a, C, E> {
    publisher: &'a Publisher<E>,
    inlet: &'a Inlet<Request<C>>,
    deferred: &'a mut VecDeque<Request<C>>,
}

impl<C: Tagged, E: Tagged + Serialize> Context<'_, C, E> {
    pub fn publish(&self, event: E) -> bool {
        self.publisher.publish(event)
    }

    pub fn publisher(&self) -> &Publisher<E> {
        self.publisher
    }

    /// Check for an interruption while a long command runs
    ///
    /// Requests that arrived in the meantime are drained without blocking.
    /// `Stop`, a closed channel, or a command matching `is_interrupt`
    /// interrupt; other commands are deferred until the current one returns.
    /// A matching command is consumed, `Stop` stays queued for the loop.
    pub fn interrupted(&mut self, is_interrupt: impl Fn(&C) -> bool) -> bool {
        if self.deferred.iter().any(|r| matches!(r, Request::Stop)) {
            return true;
        }
        loop {
            match self.inlet.try_poll() {
                Poll::Message(Request::Run(command)) if is_interrupt(&command) => {
                    debug!("Interrupted by {}", command.tag());
                    return true;
                }
                Poll::Message(Request::Stop) => {
                    self.deferred.push_back(Request::Stop);
                    return true;
                }
                Poll::Message(request) => self.deferred.push_back(request),
                Poll::Empty => return false,
                Poll::Closed => {
                    self.deferred.push_back(Request::Stop);
                    return true;
                }
            }
        }
    }
}

/// Run a worker's command loop until `Stop` or channel close
pub fn run<W: Worker>(
    mut worker: W,
    outlet: Outlet<W::Event>,
    inlet: Inlet<Request<W::Command>>,
    poll_interval: Duration,
) {
    info!("{} started", W::NAME);
    let publisher = Publisher::new(outlet);
    worker.pre_run(&publisher);

    let mut deferred = VecDeque::new();
    loop {
        let request = match deferred.pop_front() {
            Some(request) => request,
            None => match inlet.poll(poll_interval) {
                Poll::Message(request) => request,
                Poll::Empty => continue,
                Poll::Closed => {
                    debug!("{}: orchestrator gone", W::NAME);
                    break;
                }
            },
        };

        match request {
            Request::Stop => break,
            Request::Run(command) => {
                debug!("{} handling {}", W::NAME, command.tag());
                let mut ctx = Context {
                    publisher: &publisher,
                    inlet: &inlet,
                    deferred: &mut deferred,
                };
                worker.handle(command, &mut ctx);
            }
        }
    }

    worker.post_run();
    info!("{} stopped", W::NAME);
}

/// Host a worker over this process's stdin/stdout
pub fn serve_stdio<W: Worker>(worker: W, poll_interval: Duration) {
    let (outlet, inlet) = channel::from_streams(std::io::stdin(), std::io::stdout(), W::NAME);
    run(worker, outlet, inlet, poll_interval);
}
