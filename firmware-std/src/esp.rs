//! ESP-IDF implementation of the `proximity::hal` traits.

use std::collections::BTreeMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use embedded_svc::http::client::Client as HttpClient;
use embedded_svc::http::{Method as HttpMethod, Status};
use embedded_svc::io::{Read, Write};
use embedded_svc::wifi::{AccessPointConfiguration, AuthMethod, ClientConfiguration, Configuration};
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::hal::gpio::{AnyInputPin, AnyOutputPin, Input, Output, PinDriver, Pull};
use esp_idf_svc::hal::modem::Modem;
use esp_idf_svc::http::client::{Configuration as HttpConfiguration, EspHttpConnection};
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::sntp::{EspSntp, SyncStatus};
use esp_idf_svc::wifi::{BlockingWifi, EspWifi};
use proximity::board::{gpio_number, BUTTON_PIN};
use proximity::defaults::MAX_RESPONSE_LEN;
use proximity::hal::{AccessPoint, HttpTransport, Method, Pins, Radio, Request, Response, WallClock};
use proximity::Error;

use crate::capture;

const HTTP_TIMEOUT: Duration = Duration::from_secs(15);

/// Which interface the driver is currently configured for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Idle,
    Station,
    AccessPoint,
}

pub struct EspBoard {
    wifi: BlockingWifi<EspWifi<'static>>,
    role: Role,
    outputs: BTreeMap<String, PinDriver<'static, AnyOutputPin, Output>>,
    button: PinDriver<'static, AnyInputPin, Input>,
    sntp: EspSntp<'static>,
}

fn radio(e: impl core::fmt::Debug) -> Error {
    Error::Radio(format!("{e:?}"))
}

fn transport(e: impl core::fmt::Debug) -> Error {
    Error::Transport(format!("{e:?}"))
}

impl EspBoard {
    pub fn new(
        modem: Modem,
        sys_loop: EspSystemEventLoop,
        nvs: EspDefaultNvsPartition,
    ) -> anyhow::Result<Self> {
        let wifi = BlockingWifi::wrap(EspWifi::new(modem, sys_loop.clone(), Some(nvs))?, sys_loop)?;

        let button_gpio = gpio_number(BUTTON_PIN)
            .ok_or_else(|| anyhow::anyhow!("invalid button pin {BUTTON_PIN}"))?;
        // Safety: the button pin is not handed out anywhere else
        let mut button = PinDriver::input(unsafe { AnyInputPin::new(button_gpio as i32) })?;
        button.set_pull(Pull::Up)?;

        Ok(Self {
            wifi,
            role: Role::Idle,
            outputs: BTreeMap::new(),
            button,
            sntp: EspSntp::new_default()?,
        })
    }

    /// Station interface MAC, used for the node hostname.
    pub fn mac(&self) -> anyhow::Result<[u8; 6]> {
        Ok(self.wifi.wifi().sta_netif().get_mac()?)
    }

    fn ensure_station(&mut self) -> Result<(), Error> {
        if self.role == Role::Station {
            return Ok(());
        }
        self.wifi
            .set_configuration(&Configuration::Client(ClientConfiguration::default()))
            .map_err(radio)?;
        self.wifi.start().map_err(radio)?;
        self.role = Role::Station;
        Ok(())
    }
}

impl Radio for EspBoard {
    fn is_connected(&mut self) -> bool {
        self.wifi.is_connected().unwrap_or(false)
    }

    fn scan(&mut self) -> Result<Vec<AccessPoint>, Error> {
        self.ensure_station()?;
        let found = self.wifi.scan().map_err(radio)?;
        Ok(found
            .into_iter()
            .map(|ap| AccessPoint {
                ssid: ap.ssid.as_str().to_string(),
                rssi: ap.signal_strength,
                channel: ap.channel,
            })
            .collect())
    }

    fn connect(&mut self, ssid: &str, password: &str) -> Result<(), Error> {
        let auth_method = if password.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPAWPA2Personal
        };
        let config = ClientConfiguration {
            ssid: ssid
                .try_into()
                .map_err(|_| Error::Config(format!("ssid `{ssid}` too long")))?,
            password: password
                .try_into()
                .map_err(|_| Error::Config(format!("password for `{ssid}` too long")))?,
            auth_method,
            ..Default::default()
        };
        self.wifi
            .set_configuration(&Configuration::Client(config))
            .map_err(radio)?;
        if !self.wifi.is_started().map_err(radio)? {
            self.wifi.start().map_err(radio)?;
        }
        self.role = Role::Station;

        // A refused or timed-out join is an ordinary association failure
        self.wifi
            .connect()
            .map_err(|e| Error::Association(format!("{ssid}: {e}")))?;
        self.wifi
            .wait_netif_up()
            .map_err(|e| Error::Association(format!("{ssid}: {e}")))?;
        Ok(())
    }

    fn stop_station(&mut self) -> Result<(), Error> {
        if self.role == Role::Station {
            if self.wifi.is_connected().map_err(radio)? {
                self.wifi.disconnect().map_err(radio)?;
            }
            self.wifi.stop().map_err(radio)?;
            self.role = Role::Idle;
        }
        Ok(())
    }

    fn start_access_point(&mut self, ssid: &str) -> Result<(), Error> {
        self.wifi
            .set_configuration(&Configuration::AccessPoint(AccessPointConfiguration {
                ssid: ssid
                    .try_into()
                    .map_err(|_| Error::Config(format!("access point name `{ssid}` too long")))?,
                auth_method: AuthMethod::None,
                channel: 1,
                ..Default::default()
            }))
            .map_err(radio)?;
        self.wifi.start().map_err(radio)?;
        self.wifi.wait_netif_up().map_err(radio)?;
        self.role = Role::AccessPoint;
        Ok(())
    }

    fn stop_access_point(&mut self) -> Result<(), Error> {
        if self.role == Role::AccessPoint {
            self.wifi.stop().map_err(radio)?;
            self.role = Role::Idle;
        }
        Ok(())
    }

    fn start_capture(&mut self, channel: u8) -> Result<(), Error> {
        capture::start(channel).map_err(radio)
    }

    fn next_frame(&mut self, buf: &mut [u8]) -> Result<Option<usize>, Error> {
        Ok(capture::pop(buf))
    }

    fn stop_capture(&mut self) {
        capture::stop();
    }
}

impl Pins for EspBoard {
    fn set_level(&mut self, pin: &str, high: bool) -> Result<(), Error> {
        let gpio = |reason: String| Error::Gpio {
            pin: pin.to_string(),
            reason,
        };

        if !self.outputs.contains_key(pin) {
            let number = gpio_number(pin).ok_or_else(|| gpio("unknown pin name".to_string()))?;
            // Safety: output pins are created once, by name, and never shared
            let driver = PinDriver::output(unsafe { AnyOutputPin::new(number as i32) })
                .map_err(|e| gpio(format!("{e:?}")))?;
            self.outputs.insert(pin.to_string(), driver);
        }

        let driver = self
            .outputs
            .get_mut(pin)
            .ok_or_else(|| gpio("driver missing".to_string()))?;
        let written = if high {
            driver.set_high()
        } else {
            driver.set_low()
        };
        written.map_err(|e| gpio(format!("{e:?}")))
    }

    fn button_pressed(&mut self) -> bool {
        self.button.is_low()
    }
}

impl HttpTransport for EspBoard {
    fn send(&mut self, request: &Request<'_>) -> Result<Response, Error> {
        let config = HttpConfiguration {
            timeout: Some(HTTP_TIMEOUT),
            crt_bundle_attach: Some(esp_idf_svc::sys::esp_crt_bundle_attach),
            ..Default::default()
        };
        let mut client = HttpClient::wrap(EspHttpConnection::new(&config).map_err(transport)?);

        let method = match request.method {
            Method::Get => HttpMethod::Get,
            Method::Post => HttpMethod::Post,
        };
        let content_length = request.body.len().to_string();
        let mut headers = request.headers.to_vec();
        headers.push(("Content-Length", content_length.as_str()));

        let mut outgoing = client
            .request(method, request.url, &headers)
            .map_err(transport)?;
        outgoing.write_all(request.body).map_err(transport)?;
        outgoing.flush().map_err(transport)?;

        let mut response = outgoing.submit().map_err(transport)?;
        let status = response.status();

        let mut body = Vec::new();
        let mut chunk = [0u8; 512];
        loop {
            let read = response.read(&mut chunk).map_err(transport)?;
            if read == 0 {
                break;
            }
            if body.len() + read > MAX_RESPONSE_LEN {
                return Err(Error::Decode(format!(
                    "response larger than {MAX_RESPONSE_LEN} bytes"
                )));
            }
            body.extend_from_slice(&chunk[..read]);
        }

        Ok(Response { status, body })
    }
}

impl WallClock for EspBoard {
    fn unix_millis(&mut self) -> Result<u64, Error> {
        if self.sntp.get_sync_status() != SyncStatus::Completed {
            return Err(Error::Clock("sntp not synchronised".to_string()));
        }
        let since_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| Error::Clock(e.to_string()))?;
        Ok(since_epoch.as_millis() as u64)
    }
}
