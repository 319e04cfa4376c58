/// The node context and its four cooperative tasks.
///
/// Everything runs on one thread. The board (radio, pins, HTTPS, clock) sits
/// behind a single async mutex: frame capture, output synchronization,
/// connectivity changes and web responses each take it for the duration of
/// their radio use, so they never interleave. Registry and controller state
/// live in `RefCell`s that are only borrowed between suspension points.
///
/// Tasks:
/// - sniffer: captures frames on the associated channel while nothing is
///   pending and the web task is quiet
/// - ticker: turns beacon counters into presence once a second and
///   synchronizes pending outputs
/// - resync: marks every output pending once an hour
/// - connectivity: drives the station / access-point controller
use alloc::string::String;
use core::cell::{Cell, RefCell};

use embassy_futures::join::join4;
use embassy_futures::select::{select, Either};
use embassy_futures::yield_now;
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::mutex::Mutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Instant, Timer};

use crate::board::{self, Hostname};
use crate::config::Configuration;
use crate::connectivity::{ConnectivityController, Link};
use crate::defaults::{
    CAPTURE_IDLE, FRAME_HEADER_LEN, HTTP_BUSY_WINDOW, RESYNC_INTERVAL, SNIFFER_IDLE, TICK_INTERVAL,
};
use crate::hal::Board;
use crate::protocol::{Snapshot, VERSION};
use crate::registry::Registry;
use crate::Error;

/// Why [`Node::run`] returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartReason {
    /// Asked for through the status surface
    Requested,
    /// The radio stack failed in a way the controller cannot recover from
    RadioFault,
}

/// Outcome of one capture step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capture {
    /// A frame was read; carries the number of beacons it matched
    Frame(usize),
    /// Nothing queued
    Empty,
    /// Capture was torn down; the session must be reopened
    Paused,
}

pub struct Node<B: Board> {
    board: Mutex<NoopRawMutex, B>,
    registry: RefCell<Registry>,
    connectivity: RefCell<ConnectivityController>,
    /// Time of the last web response write
    web_activity: Cell<Option<Instant>>,
    restart: Signal<NoopRawMutex, RestartReason>,
}

impl<B: Board> Node<B> {
    pub fn new(board: B, config: &Configuration, hostname: Hostname, now: Instant) -> Self {
        Self {
            board: Mutex::new(board),
            registry: RefCell::new(Registry::from_config(config, now)),
            connectivity: RefCell::new(ConnectivityController::new(config.wifi.clone(), hostname)),
            web_activity: Cell::new(None),
            restart: Signal::new(),
        }
    }

    pub fn location(&self) -> Option<String> {
        self.connectivity.borrow().location().map(String::from)
    }

    fn link(&self) -> Option<Link> {
        self.connectivity.borrow().link().cloned()
    }

    pub fn needs_sync(&self) -> bool {
        self.registry.borrow().needs_sync()
    }

    /// Record that the web task is writing a response.
    pub fn note_web_activity(&self, now: Instant) {
        self.web_activity.set(Some(now));
    }

    pub fn web_busy(&self, now: Instant) -> bool {
        self.web_activity
            .get()
            .is_some_and(|at| now.saturating_duration_since(at) < HTTP_BUSY_WINDOW)
    }

    // ── Ticker ──────────────────────────────────────────────────────

    /// Consume beacon counters for the current location and re-check
    /// timeouts. Returns whether a synchronize pass is due.
    pub fn observe(&self, now: Instant) -> bool {
        let location = self.location();
        self.registry.borrow_mut().observe(location.as_deref(), now)
    }

    /// Activate all pending outputs as one batch under the lock. Capture
    /// is stopped first; the sniffer reopens it once nothing is pending.
    pub async fn synchronize(&self, now: Instant) -> usize {
        let mut board = self.board.lock().await;
        board.stop_capture();
        self.registry.borrow_mut().synchronize(&mut *board, now)
    }

    pub async fn tick(&self, now: Instant) -> usize {
        if self.observe(now) {
            self.synchronize(now).await
        } else {
            0
        }
    }

    pub fn resynchronize(&self) {
        log::info!("resynchronizing all outputs");
        self.registry.borrow_mut().force_resync();
    }

    // ── Sniffer ─────────────────────────────────────────────────────

    /// Why capture must stay closed, if it must.
    fn capture_blocked(&self, now: Instant) -> Option<&'static str> {
        if self.link().is_none() {
            Some("not associated")
        } else if self.needs_sync() {
            Some("pausing packet analysis")
        } else if self.web_busy(now) {
            Some("waiting for http responses to complete")
        } else {
            None
        }
    }

    /// Open a capture session on the associated channel.
    pub async fn start_capture(&self, now: Instant) -> bool {
        let mut board = self.board.lock().await;
        if self.capture_blocked(now).is_some() {
            return false;
        }
        let Some(link) = self.link() else {
            return false;
        };
        match board.start_capture(link.channel) {
            Ok(()) => {
                log::info!("listening on channel {}", link.channel);
                true
            }
            Err(e) => {
                log::warn!("capture start failed: {e}");
                false
            }
        }
    }

    /// One capture step under the lock: tear down if blocked, otherwise
    /// match the next queued frame.
    pub async fn capture(&self, now: Instant) -> Capture {
        let mut board = self.board.lock().await;
        if let Some(reason) = self.capture_blocked(now) {
            log::info!("{reason}");
            board.stop_capture();
            return Capture::Paused;
        }

        let mut buf = [0u8; FRAME_HEADER_LEN];
        match board.next_frame(&mut buf) {
            Ok(Some(len)) => Capture::Frame(self.registry.borrow_mut().record_frame(&buf[..len])),
            Ok(None) => Capture::Empty,
            Err(e) => {
                log::warn!("capture failed: {e}");
                board.stop_capture();
                Capture::Paused
            }
        }
    }

    // ── Connectivity ────────────────────────────────────────────────

    pub async fn poll_connectivity(&self) -> Result<Duration, Error> {
        let mut board = self.board.lock().await;
        self.connectivity.borrow_mut().poll(&mut *board)
    }

    // ── Status surface ──────────────────────────────────────────────

    /// Run `respond` under the lock on behalf of the web task, marking the
    /// web task busy before and after. The second mark is taken once the
    /// response is written, however long the lock took.
    pub async fn respond<R>(&self, respond: impl FnOnce(&mut B) -> R) -> R {
        self.note_web_activity(Instant::now());
        let mut board = self.board.lock().await;
        let result = respond(&mut *board);
        self.note_web_activity(Instant::now());
        result
    }

    pub fn snapshot(&self, now: Instant) -> Snapshot {
        let connectivity = self.connectivity.borrow();
        let registry = self.registry.borrow();
        Snapshot {
            version: VERSION,
            board: board::BOARD_NAME,
            hostname: connectivity.hostname().into(),
            mode: connectivity.mode().as_str(),
            ready: connectivity.is_ready(),
            ssid: connectivity.link().map(|l| l.ssid.clone()),
            location: connectivity.location().map(String::from),
            beacons: registry.beacon_status(),
            outputs: registry.output_status(now),
        }
    }

    pub fn request_restart(&self, reason: RestartReason) {
        log::warn!("restart requested: {reason:?}");
        self.restart.signal(reason);
    }

    // ── Tasks ───────────────────────────────────────────────────────

    async fn sniffer(&self) {
        loop {
            Timer::after(SNIFFER_IDLE).await;

            if !self.start_capture(Instant::now()).await {
                continue;
            }

            loop {
                match self.capture(Instant::now()).await {
                    Capture::Frame(_) => yield_now().await,
                    Capture::Empty => Timer::after(CAPTURE_IDLE).await,
                    Capture::Paused => break,
                }
            }
            log::info!("stopped packet analysis");
        }
    }

    async fn ticker(&self) {
        loop {
            Timer::after(TICK_INTERVAL).await;
            self.tick(Instant::now()).await;
        }
    }

    async fn resync(&self) {
        loop {
            Timer::after(RESYNC_INTERVAL).await;
            self.resynchronize();
        }
    }

    async fn connectivity(&self) {
        loop {
            match self.poll_connectivity().await {
                Ok(delay) => Timer::after(delay).await,
                Err(e) => {
                    log::error!("radio fault: {e}");
                    self.request_restart(RestartReason::RadioFault);
                    Timer::after(SNIFFER_IDLE).await;
                }
            }
        }
    }

    /// Run all tasks until a restart is requested.
    pub async fn run(&self) -> RestartReason {
        log::info!(
            "proximity v{} starting on {} as {}",
            VERSION,
            board::BOARD_NAME,
            self.connectivity.borrow().hostname()
        );

        let tasks = join4(self.sniffer(), self.ticker(), self.resync(), self.connectivity());
        match select(tasks, self.restart.wait()).await {
            Either::First(_) => RestartReason::Requested,
            Either::Second(reason) => reason,
        }
    }
}
