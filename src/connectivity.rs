/// Station / access-point mode controller.
///
/// In station mode the controller scans, keeps only configured networks,
/// and tries them strongest first; the first association resolves the
/// node's location. In access-point mode it hosts a local network named
/// after the node. A sustained press of the mode button flips between the
/// two. Plain association failures and bad network entries move on to the
/// next candidate; any other error from `connect` is returned to the caller
/// as a radio fault.
use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;

use embassy_time::Duration;

use crate::board::{Hostname, STATUS_LED_PIN};
use crate::config::NetworkConfig;
use crate::defaults::{BUTTON_HOLD_SAMPLES, CONNECTIVITY_POLL, RECONNECT_DELAY};
use crate::hal::{AccessPoint, Pins, Radio};
use crate::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Station,
    AccessPoint,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Station => "station",
            Mode::AccessPoint => "ap",
        }
    }

    fn toggled(self) -> Self {
        match self {
            Mode::Station => Mode::AccessPoint,
            Mode::AccessPoint => Mode::Station,
        }
    }
}

/// The network the station is associated with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub ssid: String,
    pub channel: u8,
}

#[derive(Debug)]
pub struct ConnectivityController {
    mode: Mode,
    ready: bool,
    /// Consecutive polls with the button held, capped at the hold threshold
    held: u32,
    blink: bool,
    link: Option<Link>,
    /// Survives link loss until another network resolves a new one
    location: Option<String>,
    networks: BTreeMap<String, NetworkConfig>,
    hostname: Hostname,
}

impl ConnectivityController {
    /// Starts in station mode, or in access-point mode when no network is
    /// configured.
    pub fn new(networks: BTreeMap<String, NetworkConfig>, hostname: Hostname) -> Self {
        let mode = if networks.is_empty() {
            Mode::AccessPoint
        } else {
            Mode::Station
        };
        Self {
            mode,
            ready: false,
            held: 0,
            blink: false,
            link: None,
            location: None,
            networks,
            hostname,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn link(&self) -> Option<&Link> {
        self.link.as_ref()
    }

    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    pub fn hostname(&self) -> &str {
        self.hostname.as_str()
    }

    /// One controller step. Returns how long to wait before the next one.
    pub fn poll<B: Radio + Pins>(&mut self, board: &mut B) -> Result<Duration, Error> {
        self.sample_button(board);

        match self.mode {
            Mode::Station => self.poll_station(board),
            Mode::AccessPoint => self.poll_access_point(board),
        }
    }

    fn sample_button<B: Pins>(&mut self, board: &mut B) {
        if board.button_pressed() {
            self.held = (self.held + 1).min(BUTTON_HOLD_SAMPLES);
            if self.held == BUTTON_HOLD_SAMPLES {
                self.blink = !self.blink;
                self.set_led(board, self.blink);
            }
            return;
        }

        if self.held == BUTTON_HOLD_SAMPLES {
            self.mode = self.mode.toggled();
            self.ready = false;
            self.blink = false;
            self.set_led(board, false);
            log::info!("mode changed to {}", self.mode.as_str());
        }
        self.held = 0;
    }

    fn set_led<B: Pins>(&self, board: &mut B, on: bool) {
        if let Err(e) = board.set_level(STATUS_LED_PIN, on) {
            log::warn!("status led: {e}");
        }
    }

    fn poll_station<B: Radio>(&mut self, board: &mut B) -> Result<Duration, Error> {
        if self.ready && !board.is_connected() {
            if let Some(link) = self.link.take() {
                log::warn!("lost connection to {}", link.ssid);
            }
            self.ready = false;
        }

        if self.ready {
            return Ok(CONNECTIVITY_POLL);
        }

        board.stop_capture();
        if let Err(e) = board.stop_access_point() {
            log::warn!("stopping access point: {e}");
        }

        let networks = match board.scan() {
            Ok(networks) => networks,
            Err(e) => {
                log::warn!("scan failed: {e}");
                return Ok(RECONNECT_DELAY);
            }
        };

        for ap in self.candidates(networks) {
            let Some(network) = self.networks.get(&ap.ssid) else {
                continue;
            };

            log::info!("connecting to {} (rssi {}, channel {})", ap.ssid, ap.rssi, ap.channel);
            match board.connect(&ap.ssid, &network.password) {
                Ok(()) => {
                    log::info!("connected to {}, location {}", ap.ssid, network.location);
                    self.location = Some(network.location.clone());
                    self.link = Some(Link {
                        ssid: ap.ssid,
                        channel: ap.channel,
                    });
                    self.ready = true;
                    return Ok(CONNECTIVITY_POLL);
                }
                Err(e) if e.is_configuration() => log::error!("skipping {}: {e}", ap.ssid),
                Err(e) if !e.is_radio_fault() => log::warn!("{e}"),
                Err(e) => return Err(e),
            }
        }

        log::warn!(
            "no known network joined, rescanning in {}s",
            RECONNECT_DELAY.as_secs()
        );
        Ok(RECONNECT_DELAY)
    }

    /// Configured networks from a scan, strongest first. Logs the full
    /// listing with known networks starred.
    fn candidates(&self, networks: Vec<AccessPoint>) -> Vec<AccessPoint> {
        let mut known: Vec<AccessPoint> = networks
            .into_iter()
            .filter(|ap| {
                let configured = self.networks.contains_key(&ap.ssid);
                log::info!(
                    "{} {:4} {:2} {}",
                    if configured { '*' } else { ' ' },
                    ap.rssi,
                    ap.channel,
                    ap.ssid
                );
                configured
            })
            .collect();
        known.sort_by(|a, b| b.rssi.cmp(&a.rssi));
        known
    }

    fn poll_access_point<B: Radio>(&mut self, board: &mut B) -> Result<Duration, Error> {
        if self.ready {
            return Ok(CONNECTIVITY_POLL);
        }

        board.stop_capture();
        self.link = None;
        if let Err(e) = board.stop_station() {
            log::warn!("stopping station: {e}");
        }

        if let Err(e) = board.start_access_point(&self.hostname) {
            log::warn!("starting access point: {e}");
            return Ok(RECONNECT_DELAY);
        }

        log::info!("access point {} up", self.hostname);
        self.ready = true;
        Ok(CONNECTIVITY_POLL)
    }
}
