//! Test doubles for the transport layer
//!
//! [`MockConnector`] hands out [`MockBus`] instances that share one scripted
//! state: queued reads, recorded writes, injected faults, open counts and the
//! time interval of every bus operation (for mutual exclusion checks).

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::config::FilterSpec;
use crate::error::{OpenStep, TransportError};
use crate::frame::Frame;
use crate::transport::{BusConnector, CanBus};

/// Scripted failure for a read or write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFault {
    /// The receive timeout elapses
    Timeout,
    /// An error frame arrives with the given class bits
    ErrorFrame(u32),
    /// The write sends fewer bytes than a frame
    ShortWrite,
    /// The OS call fails with this errno
    Os(i32),
}

impl MockFault {
    fn read_error(self) -> TransportError {
        match self {
            Self::Timeout => TransportError::TimedOut,
            Self::ErrorFrame(class) => TransportError::ErrorFrame(class),
            Self::ShortWrite => TransportError::from_read_io(io::Error::from_raw_os_error(0)),
            Self::Os(errno) => TransportError::from_read_io(io::Error::from_raw_os_error(errno)),
        }
    }

    fn write_error(self) -> TransportError {
        match self {
            Self::Timeout => TransportError::WriteTimedOut,
            Self::ErrorFrame(class) => TransportError::ErrorFrame(class),
            Self::ShortWrite => TransportError::ShortWrite,
            Self::Os(errno) => TransportError::from_write_io(io::Error::from_raw_os_error(errno)),
        }
    }
}

#[derive(Default)]
struct Script {
    reads: VecDeque<Result<Frame, MockFault>>,
    write_faults: VecDeque<Option<MockFault>>,
    written: Vec<Frame>,
    open_failure: Option<OpenStep>,
    intervals: Vec<(Instant, Instant)>,
    specs: Vec<FilterSpec>,
}

struct Shared {
    script: Mutex<Script>,
    opens: AtomicUsize,
    live: AtomicUsize,
    active: AtomicUsize,
    overlaps: AtomicUsize,
    next_fd: AtomicI32,
    op_delay: Mutex<Duration>,
}

/// Connector producing scripted in-memory buses
#[derive(Clone)]
pub struct MockConnector {
    shared: Arc<Shared>,
}

impl Default for MockConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl MockConnector {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                script: Mutex::new(Script::default()),
                opens: AtomicUsize::new(0),
                live: AtomicUsize::new(0),
                active: AtomicUsize::new(0),
                overlaps: AtomicUsize::new(0),
                next_fd: AtomicI32::new(100),
                op_delay: Mutex::new(Duration::ZERO),
            }),
        }
    }

    /// Queue a frame for the next read
    pub fn push_frame(&self, frame: Frame) {
        self.shared.script.lock().reads.push_back(Ok(frame));
    }

    /// Queue a failure for the next read
    pub fn push_fault(&self, fault: MockFault) {
        self.shared.script.lock().reads.push_back(Err(fault));
    }

    /// Script the outcome of upcoming writes in order; `None` succeeds
    pub fn script_writes(&self, outcomes: impl IntoIterator<Item = Option<MockFault>>) {
        self.shared.script.lock().write_faults.extend(outcomes);
    }

    /// Fail the next open at the given step
    pub fn fail_open(&self, step: OpenStep) {
        self.shared.script.lock().open_failure = Some(step);
    }

    /// Time every read and write takes
    pub fn set_op_delay(&self, delay: Duration) {
        *self.shared.op_delay.lock() = delay;
    }

    pub fn written(&self) -> Vec<Frame> {
        self.shared.script.lock().written.clone()
    }

    pub fn open_count(&self) -> usize {
        self.shared.opens.load(Ordering::SeqCst)
    }

    /// Buses opened and not yet dropped
    pub fn live_buses(&self) -> usize {
        self.shared.live.load(Ordering::SeqCst)
    }

    /// Specs the buses were opened with, in order
    pub fn opened_specs(&self) -> Vec<FilterSpec> {
        self.shared.script.lock().specs.clone()
    }

    /// Start/end of every bus operation in completion order
    pub fn intervals(&self) -> Vec<(Instant, Instant)> {
        self.shared.script.lock().intervals.clone()
    }

    /// Number of operations that started while another was running
    pub fn overlap_count(&self) -> usize {
        self.shared.overlaps.load(Ordering::SeqCst)
    }

    /// True if any two recorded intervals intersect
    pub fn intervals_overlap(&self) -> bool {
        let mut intervals = self.intervals();
        intervals.sort_by_key(|(start, _)| *start);
        intervals.windows(2).any(|pair| pair[1].0 < pair[0].1)
    }
}

impl BusConnector for MockConnector {
    type Bus = MockBus;

    fn open(&self, spec: &FilterSpec) -> Result<MockBus, TransportError> {
        let mut script = self.shared.script.lock();
        if let Some(step) = script.open_failure.take() {
            return Err(TransportError::open_failure(
                step,
                &spec.interface_name,
                io::Error::from_raw_os_error(libc::ENODEV),
            ));
        }
        script.specs.push(spec.clone());
        drop(script);

        self.shared.opens.fetch_add(1, Ordering::SeqCst);
        self.shared.live.fetch_add(1, Ordering::SeqCst);
        Ok(MockBus {
            fd: self.shared.next_fd.fetch_add(1, Ordering::SeqCst),
            timeout: spec.receive_timeout,
            shared: Arc::clone(&self.shared),
        })
    }
}

/// In-memory bus backed by the connector's script
pub struct MockBus {
    fd: i32,
    timeout: Duration,
    shared: Arc<Shared>,
}

impl MockBus {
    /// Run one bus operation, then wait `extra` (still inside the operation)
    fn operation<T>(&self, op: impl FnOnce(&mut Script) -> (T, Duration)) -> T {
        let start = Instant::now();
        if self.shared.active.fetch_add(1, Ordering::SeqCst) > 0 {
            self.shared.overlaps.fetch_add(1, Ordering::SeqCst);
        }

        let delay = *self.shared.op_delay.lock();
        if !delay.is_zero() {
            thread::sleep(delay);
        }
        let (result, extra) = {
            let mut script = self.shared.script.lock();
            op(&mut *script)
        };
        if !extra.is_zero() {
            thread::sleep(extra);
        }

        self.shared.active.fetch_sub(1, Ordering::SeqCst);
        self.shared
            .script
            .lock()
            .intervals
            .push((start, Instant::now()));
        result
    }
}

impl CanBus for MockBus {
    fn read_frame(&mut self) -> Result<Frame, TransportError> {
        let timeout = self.timeout;
        let next = self.operation(|script| match script.reads.pop_front() {
            Some(read) => (Some(read), Duration::ZERO),
            // Nothing queued: behave like a silent bus
            None => (None, timeout),
        });
        match next {
            Some(Ok(frame)) => Ok(frame),
            Some(Err(fault)) => Err(fault.read_error()),
            None => Err(TransportError::TimedOut),
        }
    }

    fn write_frame(&mut self, frame: &Frame) -> Result<(), TransportError> {
        self.operation(|script| {
            let result = match script.write_faults.pop_front().flatten() {
                Some(fault) => Err(fault.write_error()),
                None => {
                    script.written.push(*frame);
                    Ok(())
                },
            };
            (result, Duration::ZERO)
        })
    }

    fn descriptor(&self) -> i32 {
        self.fd
    }
}

impl Drop for MockBus {
    fn drop(&mut self) {
        self.shared.live.fetch_sub(1, Ordering::SeqCst);
    }
}
