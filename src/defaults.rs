/// Compiled-in timing and sizing defaults.
///
/// Cadences of the cooperative tasks, protocol margins and buffer sizes.
/// Per-output values (idle timeout) can be overridden by configuration.
use embassy_time::Duration;

/// Ticker cadence: beacon counters are consumed and outputs asserted.
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Every output is forced pending at this interval, whatever its state.
pub const RESYNC_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Connectivity controller poll cadence (also the button sampling period).
pub const CONNECTIVITY_POLL: Duration = Duration::from_millis(250);

/// Continuous button hold required to toggle station / access-point mode.
pub const BUTTON_HOLD: Duration = Duration::from_secs(5);

/// Button samples needed to reach [`BUTTON_HOLD`].
pub const BUTTON_HOLD_SAMPLES: u32 =
    (BUTTON_HOLD.as_millis() / CONNECTIVITY_POLL.as_millis()) as u32;

/// Delay before rescanning once every known network failed to associate.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Output idle timeout when the configuration does not set one (seconds).
pub const OUTPUT_TIMEOUT_SECS: u64 = 30 * 60;

/// Cloud access tokens are dropped this long before the server-declared
/// expiry, to absorb clock drift between the node and the API.
pub const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Leading bytes of each captured frame inspected by the matcher.
/// Covers frame control, duration and the first two address fields.
pub const FRAME_HEADER_LEN: usize = 22;

/// The web task counts as busy for this long after its last response write.
pub const HTTP_BUSY_WINDOW: Duration = Duration::from_secs(1);

/// Sniffer back-off between capture session attempts.
pub const SNIFFER_IDLE: Duration = Duration::from_secs(1);

/// Wait when the capture queue is empty before polling it again.
pub const CAPTURE_IDLE: Duration = Duration::from_millis(10);

/// Pause between a requested restart and the chip restarting, so the log
/// line and any in-flight response get out.
pub const RESTART_DELAY: Duration = Duration::from_secs(1);

/// Pause between a fatal error being logged and the chip restarting.
pub const CRASH_RESTART_DELAY: Duration = Duration::from_secs(10);

/// Largest cloud API response body read into memory.
pub const MAX_RESPONSE_LEN: usize = 4096;
