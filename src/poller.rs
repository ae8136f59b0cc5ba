//! Polling coordinator: the connect/read/publish cycle that turns a
//! [`RegisterMap`] and a transport into a stream of [`ReadingSet`]
//! snapshots.
//!
//! One coordinator owns one transport connection. Reads within a cycle are
//! issued sequentially (Modbus framing is one-in-flight per connection) and
//! cycles never overlap. The blocking read batch is meant to run on a
//! background worker ([`PollerWorker`]); consumers share the latest
//! published snapshot through a cloneable [`PollerHandle`] and are never
//! blocked on network I/O.

use crate::registers::{RegisterMap, RegisterType, ReadingSet};
use log::{debug, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Default fixed poll period.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// What a single register read can report back to the coordinator. The
/// coordinator never inspects failure reasons beyond this split.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The device answered with a Modbus exception. Only the offending
    /// address is absent this cycle; the batch continues.
    #[error("Modbus exception: {0}")]
    Exception(String),

    /// The transport itself failed (connection dropped, timeout). The whole
    /// cycle fails and the connection is rebuilt next period.
    #[error("Modbus error: {0}")]
    Transport(String),
}

/// Why a whole poll cycle failed. Surfaced to the host as the update-failure
/// signal; dependent entities are unavailable until the next successful
/// cycle.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PollError {
    #[error("Could not connect to Modbus device ({0})")]
    Connect(String),

    #[error("Modbus error: {0}")]
    Transport(String),
}

/// Capability surface the coordinator requires from a connected transport,
/// independent of whether the wire is TCP or RS-485.
pub trait Transport {
    /// Ensures a usable connection exists; idempotent. Ordinary
    /// connectivity failure returns `false`, it is not an error.
    fn connect(&mut self) -> bool;

    /// Reads a single 16-bit register from the given address space.
    fn read_register(
        &mut self,
        register_type: RegisterType,
        address: u16,
    ) -> Result<u16, TransportError>;

    /// Releases the underlying connection; safe to call repeatedly.
    fn close(&mut self);

    /// Human-readable connection-method label, used in failure reasons.
    fn describe(&self) -> String;
}

/// Per-device polling coordinator. Owns the transport and the register map,
/// retains the last published snapshot and the last cycle's failure reason.
pub struct Poller<T> {
    transport: T,
    map: RegisterMap,
    latest: Option<Arc<ReadingSet>>,
    last_error: Option<PollError>,
}

impl<T: Transport> Poller<T> {
    pub fn new(transport: T, map: RegisterMap) -> Self {
        Self {
            transport,
            map,
            latest: None,
            last_error: None,
        }
    }

    pub fn map(&self) -> &RegisterMap {
        &self.map
    }

    /// The most recently published snapshot, if any cycle has succeeded.
    /// A failed cycle leaves the previous snapshot in place.
    pub fn latest(&self) -> Option<Arc<ReadingSet>> {
        self.latest.clone()
    }

    /// Failure reason of the last cycle, cleared by the next success.
    pub fn last_error(&self) -> Option<&PollError> {
        self.last_error.as_ref()
    }

    /// Whether the last completed cycle published a snapshot.
    pub fn last_update_ok(&self) -> bool {
        self.latest.is_some() && self.last_error.is_none()
    }

    /// Runs one poll cycle: ensure connection, read every needed
    /// `(address, type)` pair, publish the assembled snapshot.
    ///
    /// A per-address Modbus exception records that address as absent and the
    /// cycle proceeds. A connect failure or a transport-level error fails
    /// the whole cycle: nothing is published, the previous snapshot stays,
    /// and the connection is closed so the next cycle reconnects from
    /// scratch.
    pub fn poll_once(&mut self) -> Result<Arc<ReadingSet>, PollError> {
        if !self.transport.connect() {
            return Err(self.fail_cycle(PollError::Connect(self.transport.describe())));
        }

        let mut readings = ReadingSet::new();
        for (address, register_type) in self.map.needed_reads() {
            match self.transport.read_register(register_type, address) {
                Ok(raw) => readings.insert(address, register_type, Some(raw)),
                Err(TransportError::Exception(reason)) => {
                    warn!("error reading address {address} ({register_type}): {reason}");
                    readings.insert(address, register_type, None);
                }
                Err(TransportError::Transport(detail)) => {
                    self.transport.close();
                    return Err(self.fail_cycle(PollError::Transport(detail)));
                }
            }
        }

        let snapshot = Arc::new(readings);
        self.latest = Some(Arc::clone(&snapshot));
        self.last_error = None;
        debug!("published snapshot with {} register reads", snapshot.len());
        Ok(snapshot)
    }

    fn fail_cycle(&mut self, error: PollError) -> PollError {
        warn!("update failed: {error}");
        self.last_error = Some(error.clone());
        error
    }

    /// Tears the coordinator down, closing the transport connection.
    pub fn shutdown(mut self) {
        self.transport.close();
    }
}

#[derive(Debug, Default)]
struct Shared {
    latest: Option<Arc<ReadingSet>>,
    last_error: Option<PollError>,
}

/// Cloneable consumer-side view of a background poller. Reading the latest
/// snapshot never touches the transport.
#[derive(Clone)]
pub struct PollerHandle {
    shared: Arc<Mutex<Shared>>,
}

impl PollerHandle {
    pub fn latest(&self) -> Option<Arc<ReadingSet>> {
        self.shared.lock().unwrap().latest.clone()
    }

    pub fn last_error(&self) -> Option<PollError> {
        self.shared.lock().unwrap().last_error.clone()
    }

    pub fn last_update_ok(&self) -> bool {
        let shared = self.shared.lock().unwrap();
        shared.latest.is_some() && shared.last_error.is_none()
    }
}

/// Background worker driving a [`Poller`] at a fixed interval on its own
/// thread. An in-flight cycle always runs to completion; stopping takes
/// effect between cycles.
pub struct PollerWorker {
    shared: Arc<Mutex<Shared>>,
    stop: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl PollerWorker {
    /// Spawns the worker thread. State from cycles already run on `poller`
    /// (e.g. the host's first refresh) is visible through the handle
    /// immediately.
    pub fn spawn<T>(mut poller: Poller<T>, interval: Duration) -> std::io::Result<Self>
    where
        T: Transport + Send + 'static,
    {
        let shared = Arc::new(Mutex::new(Shared {
            latest: poller.latest(),
            last_error: poller.last_error().cloned(),
        }));
        let stop = Arc::new(AtomicBool::new(false));

        let worker_shared = Arc::clone(&shared);
        let worker_stop = Arc::clone(&stop);
        let thread = thread::Builder::new()
            .name("modbus-poller".into())
            .spawn(move || {
                while !worker_stop.load(Ordering::SeqCst) {
                    let started = Instant::now();
                    let result = poller.poll_once();
                    {
                        let mut shared = worker_shared.lock().unwrap();
                        match result {
                            Ok(snapshot) => {
                                shared.latest = Some(snapshot);
                                shared.last_error = None;
                            }
                            Err(error) => shared.last_error = Some(error),
                        }
                    }
                    sleep_remaining(&worker_stop, interval, started.elapsed());
                }
                poller.shutdown();
            })?;

        Ok(Self {
            shared,
            stop,
            thread: Some(thread),
        })
    }

    pub fn handle(&self) -> PollerHandle {
        PollerHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Requests a stop and waits for the in-flight cycle to finish.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for PollerWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

// Sleep out the rest of the poll period in short slices so a stop request
// is honored promptly between cycles.
fn sleep_remaining(stop: &AtomicBool, interval: Duration, elapsed: Duration) {
    const SLICE: Duration = Duration::from_millis(100);
    let mut remaining = interval.saturating_sub(elapsed);
    while !remaining.is_zero() && !stop.load(Ordering::SeqCst) {
        let slice = remaining.min(SLICE);
        thread::sleep(slice);
        remaining -= slice;
    }
}
