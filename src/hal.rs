/// Hardware seams between the core and a board.
///
/// Every call is blocking and is made while the node's shared lock is held,
/// so implementations never see two of them interleaved. The firmware crate
/// implements these on top of ESP-IDF; tests use [`mock::MockBoard`].
use alloc::string::String;
use alloc::vec::Vec;

use crate::Error;

/// A network seen during a scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessPoint {
    pub ssid: String,
    pub rssi: i8,
    pub channel: u8,
}

/// The single radio shared by scanning, association and frame capture.
pub trait Radio {
    /// Whether the station interface is associated.
    fn is_connected(&mut self) -> bool;

    fn scan(&mut self) -> Result<Vec<AccessPoint>, Error>;

    /// Associate with a network. A plain rejection is reported as
    /// [`Error::Association`]; anything else is treated as a radio fault.
    fn connect(&mut self, ssid: &str, password: &str) -> Result<(), Error>;

    fn stop_station(&mut self) -> Result<(), Error>;

    fn start_access_point(&mut self, ssid: &str) -> Result<(), Error>;

    fn stop_access_point(&mut self) -> Result<(), Error>;

    /// Enter promiscuous capture on the given channel.
    fn start_capture(&mut self, channel: u8) -> Result<(), Error>;

    /// Copy the leading bytes of the next captured frame into `buf`.
    /// Returns the number of bytes written, or `None` when nothing is queued.
    fn next_frame(&mut self, buf: &mut [u8]) -> Result<Option<usize>, Error>;

    /// Leave promiscuous capture. Must be idempotent.
    fn stop_capture(&mut self);
}

/// Logical GPIO access, addressed by pin name.
pub trait Pins {
    fn set_level(&mut self, pin: &str, high: bool) -> Result<(), Error>;

    /// Whether the mode button is currently held down.
    fn button_pressed(&mut self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

/// An outgoing HTTPS request
#[derive(Debug)]
pub struct Request<'a> {
    pub method: Method,
    pub url: &'a str,
    pub headers: &'a [(&'a str, &'a str)],
    pub body: &'a [u8],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub body: Vec<u8>,
}

pub trait HttpTransport {
    fn send(&mut self, request: &Request<'_>) -> Result<Response, Error>;
}

/// Network-synchronised wall clock.
pub trait WallClock {
    /// Milliseconds since the Unix epoch; fails until synchronised.
    fn unix_millis(&mut self) -> Result<u64, Error>;
}

/// Everything the shared lock guards.
pub trait Board: Radio + Pins + HttpTransport + WallClock {}

impl<T: Radio + Pins + HttpTransport + WallClock> Board for T {}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use alloc::collections::{BTreeMap, VecDeque};
    use alloc::string::ToString;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct SentRequest {
        pub method: Method,
        pub url: String,
        pub headers: Vec<(String, String)>,
        pub body: Vec<u8>,
    }

    impl SentRequest {
        pub fn header(&self, name: &str) -> Option<&str> {
            self.headers
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.as_str())
        }
    }

    /// Scriptable board recording every interaction.
    #[derive(Debug, Default)]
    pub struct MockBoard {
        // radio
        pub networks: Vec<AccessPoint>,
        pub rejecting: Vec<String>,
        pub faulting: Vec<String>,
        pub misconfigured: Vec<String>,
        pub connected: bool,
        pub attempts: Vec<String>,
        pub access_point: Option<String>,
        pub station_stops: usize,
        pub capture: Option<u8>,
        pub captures_started: usize,
        pub frames: VecDeque<Vec<u8>>,
        // pins
        pub levels: BTreeMap<String, bool>,
        pub writes: Vec<(String, bool)>,
        pub broken_pins: Vec<String>,
        pub button: bool,
        // http + clock
        pub requests: Vec<SentRequest>,
        pub responses: VecDeque<Result<Response, Error>>,
        pub clock_ms: Option<u64>,
    }

    impl MockBoard {
        pub fn new() -> Self {
            Self {
                clock_ms: Some(1_700_000_000_000),
                ..Self::default()
            }
        }

        pub fn network(mut self, ssid: &str, rssi: i8, channel: u8) -> Self {
            self.networks.push(AccessPoint {
                ssid: ssid.to_string(),
                rssi,
                channel,
            });
            self
        }

        pub fn respond_json(&mut self, status: u16, body: &str) {
            self.responses.push_back(Ok(Response {
                status,
                body: body.as_bytes().to_vec(),
            }));
        }

        pub fn respond_token(&mut self, token: &str, expire_secs: u64) {
            let body = alloc::format!(
                r#"{{"result":{{"access_token":"{token}","expire_time":{expire_secs},"refresh_token":"r","uid":"u"}},"success":true,"t":1}}"#
            );
            self.respond_json(200, &body);
        }

        pub fn respond_ok(&mut self) {
            self.respond_json(200, r#"{"result":true,"success":true,"t":1}"#);
        }
    }

    impl Radio for MockBoard {
        fn is_connected(&mut self) -> bool {
            self.connected
        }

        fn scan(&mut self) -> Result<Vec<AccessPoint>, Error> {
            Ok(self.networks.clone())
        }

        fn connect(&mut self, ssid: &str, _password: &str) -> Result<(), Error> {
            self.attempts.push(ssid.to_string());
            if self.faulting.iter().any(|s| s == ssid) {
                return Err(Error::Radio("driver fault".to_string()));
            }
            if self.misconfigured.iter().any(|s| s == ssid) {
                return Err(Error::Config(alloc::format!("password for `{ssid}` too long")));
            }
            if self.rejecting.iter().any(|s| s == ssid) {
                return Err(Error::Association(ssid.to_string()));
            }
            self.connected = true;
            Ok(())
        }

        fn stop_station(&mut self) -> Result<(), Error> {
            self.station_stops += 1;
            self.connected = false;
            Ok(())
        }

        fn start_access_point(&mut self, ssid: &str) -> Result<(), Error> {
            self.access_point = Some(ssid.to_string());
            Ok(())
        }

        fn stop_access_point(&mut self) -> Result<(), Error> {
            self.access_point = None;
            Ok(())
        }

        fn start_capture(&mut self, channel: u8) -> Result<(), Error> {
            self.capture = Some(channel);
            self.captures_started += 1;
            Ok(())
        }

        fn next_frame(&mut self, buf: &mut [u8]) -> Result<Option<usize>, Error> {
            Ok(self.frames.pop_front().map(|frame| {
                let len = frame.len().min(buf.len());
                buf[..len].copy_from_slice(&frame[..len]);
                len
            }))
        }

        fn stop_capture(&mut self) {
            self.capture = None;
        }
    }

    impl Pins for MockBoard {
        fn set_level(&mut self, pin: &str, high: bool) -> Result<(), Error> {
            if self.broken_pins.iter().any(|p| p == pin) {
                return Err(Error::Gpio {
                    pin: pin.to_string(),
                    reason: "not an output".to_string(),
                });
            }
            self.levels.insert(pin.to_string(), high);
            self.writes.push((pin.to_string(), high));
            Ok(())
        }

        fn button_pressed(&mut self) -> bool {
            self.button
        }
    }

    impl HttpTransport for MockBoard {
        fn send(&mut self, request: &Request<'_>) -> Result<Response, Error> {
            self.requests.push(SentRequest {
                method: request.method,
                url: request.url.to_string(),
                headers: request
                    .headers
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                body: request.body.to_vec(),
            });
            self.responses
                .pop_front()
                .unwrap_or_else(|| Err(Error::Transport("no scripted response".to_string())))
        }
    }

    impl WallClock for MockBoard {
        fn unix_millis(&mut self) -> Result<u64, Error> {
            self.clock_ms
                .ok_or_else(|| Error::Clock("not synchronised".to_string()))
        }
    }
}
