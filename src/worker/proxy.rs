//! Orchestrator-side worker handle
//!
//! A [`WorkerProxy`] starts a worker (thread or child process), sends it
//! commands and routes its events to topic subscribers. A listener thread
//! polls the channel and invokes every callback subscribed to the event's
//! topic while holding a single lock, so callbacks must return quickly and
//! must not subscribe from inside a callback.

use crate::core::error::{DownloadError, Result};
use crate::worker::channel::{self, Inlet, Outlet, Poll};
use crate::worker::{run, Hosting, Request, Tagged, Timing, Worker};
use log::{debug, trace, warn};
use std::collections::HashMap;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

type Callback<E> = Box<dyn Fn(&E) + Send>;
type Subscribers<E> = Arc<Mutex<HashMap<&'static str, Vec<Callback<E>>>>>;

enum Host {
    Thread(Option<JoinHandle<()>>),
    Process(Child),
}

/// Handle on a running worker
pub struct WorkerProxy<W: Worker> {
    name: &'static str,
    outlet: Outlet<Request<W::Command>>,
    subscribers: Subscribers<W::Event>,
    listener_stop: Arc<AtomicBool>,
    listener: Option<JoinHandle<()>>,
    host: Host,
    timing: Timing,
    stopped: bool,
}

impl<W: Worker> WorkerProxy<W> {
    /// Start a worker
    ///
    /// `make` builds the worker instance and is only called for thread
    /// hosting; a process-hosted worker is built by the child itself.
    pub fn start(hosting: &Hosting, timing: Timing, make: impl FnOnce() -> W) -> Result<Self> {
        match hosting {
            Hosting::Thread => Self::start_thread(make(), timing),
            Hosting::Process { program, config } => {
                let mut command = Command::new(program);
                if let Some(config) = config {
                    command.arg("--config").arg(config);
                }
                command.arg("worker").arg(W::KIND.as_str());
                Self::start_process(command, timing)
            }
        }
    }

    /// Run `worker` on a dedicated thread
    pub fn start_thread(worker: W, timing: Timing) -> Result<Self> {
        let ((outlet, inlet), (worker_out, worker_in)) = channel::pair();
        let handle = thread::Builder::new()
            .name(W::NAME.to_string())
            .spawn(move || run(worker, worker_out, worker_in, timing.poll_interval))
            .map_err(|e| DownloadError::Worker(format!("cannot start {}: {}", W::NAME, e)))?;

        Self::with_listener(outlet, inlet, Host::Thread(Some(handle)), timing)
    }

    /// Spawn `command` as a child process hosting the worker over stdin/stdout
    pub fn start_process(mut command: Command, timing: Timing) -> Result<Self> {
        let mut child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| DownloadError::Worker(format!("cannot spawn {}: {}", W::NAME, e)))?;
        debug!("{} running as process {}", W::NAME, child.id());

        let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            _ => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(DownloadError::Worker(format!(
                    "{}: child process has no stdio pipes",
                    W::NAME
                )));
            }
        };

        let (outlet, inlet) = channel::from_streams(stdout, stdin, W::NAME);
        Self::with_listener(outlet, inlet, Host::Process(child), timing)
    }

    fn with_listener(
        outlet: Outlet<Request<W::Command>>,
        inlet: Inlet<W::Event>,
        host: Host,
        timing: Timing,
    ) -> Result<Self> {
        let subscribers: Subscribers<W::Event> = Arc::new(Mutex::new(HashMap::new()));
        let listener_stop = Arc::new(AtomicBool::new(false));

        let listener = {
            let subscribers = Arc::clone(&subscribers);
            let stop = Arc::clone(&listener_stop);
            thread::Builder::new()
                .name(format!("{}-listener", W::NAME))
                .spawn(move || listen(inlet, subscribers, stop, timing.poll_interval, W::NAME))
                .map_err(|e| DownloadError::Worker(format!("cannot start listener: {}", e)))?
        };

        Ok(Self {
            name: W::NAME,
            outlet,
            subscribers,
            listener_stop,
            listener: Some(listener),
            host,
            timing,
            stopped: false,
        })
    }

    /// Send a command; silently dropped once the worker is gone
    pub fn send(&self, command: W::Command) -> bool {
        trace!("{} <- {}", self.name, command.tag());
        self.outlet.send(Request::Run(command))
    }

    /// Register a callback for every event published under `topic`
    pub fn subscribe(&self, topic: &'static str, callback: impl Fn(&W::Event) + Send + 'static) {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        subscribers.entry(topic).or_default().push(Box::new(callback));
    }

    pub fn is_alive(&self) -> bool {
        !self.stopped && !self.outlet.is_closed()
    }

    /// Stop the worker, waiting at most the configured timeout
    ///
    /// A worker still running after the timeout is killed (process) or
    /// detached (thread). Events already published are delivered first.
    pub fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        self.outlet.send(Request::Stop);
        let deadline = Instant::now() + self.timing.stop_timeout;

        let finished = match &mut self.host {
            Host::Thread(handle) => match handle.take() {
                Some(handle) => {
                    wait_until(deadline, || handle.is_finished());
                    if handle.is_finished() {
                        let _ = handle.join();
                        true
                    } else {
                        warn!("{} did not stop in time, detaching its thread", self.name);
                        false
                    }
                }
                None => true,
            },
            Host::Process(child) => {
                wait_until(deadline, || matches!(child.try_wait(), Ok(Some(_))));
                if matches!(child.try_wait(), Ok(Some(_))) {
                    true
                } else {
                    warn!("{} did not stop in time, terminating it", self.name);
                    let _ = child.kill();
                    let _ = child.wait();
                    true
                }
            }
        };

        if let Some(listener) = self.listener.take() {
            // A finished worker closes its channel: let the listener drain it
            if finished {
                wait_until(deadline + self.timing.stop_timeout, || listener.is_finished());
            }
            self.listener_stop.store(true, Ordering::SeqCst);
            let _ = listener.join();
        }
        debug!("{} proxy stopped", self.name);
    }
}

impl<W: Worker> Drop for WorkerProxy<W> {
    fn drop(&mut self) {
        self.stop();
    }
}

fn wait_until(deadline: Instant, mut done: impl FnMut() -> bool) {
    while !done() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(2));
    }
}

fn listen<E: Tagged>(
    inlet: Inlet<E>,
    subscribers: Subscribers<E>,
    stop: Arc<AtomicBool>,
    poll_interval: Duration,
    name: &str,
) {
    while !stop.load(Ordering::SeqCst) {
        match inlet.poll(poll_interval) {
            Poll::Message(event) => {
                let subscribers = subscribers.lock().unwrap_or_else(|e| e.into_inner());
                match subscribers.get(event.tag()) {
                    Some(callbacks) => callbacks.iter().for_each(|callback| callback(&event)),
                    None => trace!("{}: no subscriber for {}", name, event.tag()),
                }
            }
            Poll::Empty => continue,
            Poll::Closed => break,
        }
    }
    trace!("{} listener exiting", name);
}
