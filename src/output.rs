/// Per-output state machine and activation.
///
/// Presence assertions move `desired_on` and raise `pending`; activation
/// applies the desired level through the output's kind and clears it. An
/// output whose presence is not renewed within its idle timeout is forced
/// off on the next assertion, whatever that assertion carries.
use alloc::string::String;

use embassy_time::{Duration, Instant};

use crate::cloud::CloudOutputClient;
use crate::config::OutputSettings;
use crate::hal::{HttpTransport, Pins, WallClock};
use crate::protocol::OutputStatus;
use crate::Error;

/// How an output applies its level
#[derive(Debug)]
pub enum OutputKind {
    Gpio { pin: String },
    /// Same effect as a GPIO write; kept distinct for status reporting
    Led { pin: String },
    Cloud(CloudOutputClient),
}

impl OutputKind {
    pub fn from_settings(settings: OutputSettings) -> Self {
        match settings {
            OutputSettings::Gpio { pin } => OutputKind::Gpio { pin },
            OutputSettings::Led { pin } => OutputKind::Led { pin },
            OutputSettings::Cloud(cloud) => OutputKind::Cloud(CloudOutputClient::new(cloud)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputKind::Gpio { .. } => "gpio",
            OutputKind::Led { .. } => "led",
            OutputKind::Cloud(_) => "cloud",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputState {
    pub desired_on: bool,
    /// Set by the first assertion; until then the real level is unknown
    pub known: bool,
    /// The applied level may differ from `desired_on`
    pub pending: bool,
    pub last_asserted: Instant,
}

#[derive(Debug)]
pub struct Output {
    pub id: String,
    kind: OutputKind,
    timeout: Duration,
    state: OutputState,
}

impl Output {
    pub fn new(id: &str, settings: OutputSettings, timeout_secs: u64, now: Instant) -> Self {
        Self {
            id: id.into(),
            kind: OutputKind::from_settings(settings),
            timeout: Duration::from_secs(timeout_secs),
            state: OutputState {
                desired_on: false,
                known: false,
                pending: false,
                last_asserted: now,
            },
        }
    }

    pub fn kind(&self) -> &OutputKind {
        &self.kind
    }

    pub fn state(&self) -> &OutputState {
        &self.state
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Whether the idle timeout has elapsed since the last assertion.
    pub fn is_idle(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.state.last_asserted) > self.timeout
    }

    /// Record presence (`Some`) or only re-check the idle timeout (`None`).
    ///
    /// The timeout is evaluated against the state on entry, so a presence
    /// assertion cannot mask an already expired output.
    pub fn assert(&mut self, presence: Option<bool>, now: Instant) {
        let idle = self.is_idle(now);

        if let Some(on) = presence {
            self.apply(on, now);
            log::info!("U: {}", self.status(now));
        }

        if idle {
            self.apply(false, now);
            self.state.pending = true;
            log::info!("T: {}", self.status(now));
        }
    }

    fn apply(&mut self, on: bool, now: Instant) {
        if self.state.desired_on != on || !self.state.known {
            self.state.pending = true;
        }
        self.state.known = true;
        self.state.desired_on = on;
        self.state.last_asserted = now;
    }

    pub fn needs_sync(&self) -> bool {
        self.state.pending
    }

    pub fn mark_pending(&mut self) {
        self.state.pending = true;
    }

    /// Apply `desired_on`. On failure `pending` stays set so the next
    /// synchronize pass retries.
    pub fn activate<B>(&mut self, board: &mut B, now: Instant) -> Result<(), Error>
    where
        B: Pins + HttpTransport + WallClock,
    {
        let on = self.state.desired_on;
        match &mut self.kind {
            OutputKind::Gpio { pin } | OutputKind::Led { pin } => board.set_level(pin, on)?,
            OutputKind::Cloud(client) => client.activate(board, on)?,
        }

        self.state.pending = false;
        self.state.last_asserted = now;
        log::info!("A: {}", self.status(now));
        Ok(())
    }

    pub fn status(&self, now: Instant) -> OutputStatus {
        OutputStatus {
            id: self.id.clone(),
            kind: self.kind.as_str(),
            on: self.state.desired_on,
            known: self.state.known,
            pending: self.state.pending,
            idle: now.saturating_duration_since(self.state.last_asserted).as_secs(),
            timeout: self.timeout.as_secs(),
        }
    }
}
