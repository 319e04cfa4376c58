//! Proximity — ESP-IDF std firmware
//!
//! Runs the node's cooperative tasks on the main thread with the ESP-IDF
//! executor. The board implementation drives the WiFi driver (scan,
//! association, access point, promiscuous capture), GPIO, HTTPS and SNTP.
//! Any error escaping the node is logged and followed by a chip restart.

mod capture;
mod esp;

use std::thread;
use std::time::Duration as StdDuration;

use anyhow::Context;
use embassy_futures::select::{select, Either};
use embassy_time::{Duration, Instant, Timer};
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::hal::peripherals::Peripherals;
use esp_idf_svc::hal::task::block_on;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use proximity::config::Configuration;
use proximity::defaults::{CRASH_RESTART_DELAY, RESTART_DELAY};
use proximity::protocol::VERSION;
use proximity::scheduler::{Node, RestartReason};
use proximity::{board, filter};

use esp::EspBoard;

/// Configuration document embedded at build time
static CONFIG: &[u8] = include_bytes!("../config.json");

/// Cadence of the status line written to the log
const STATUS_INTERVAL: Duration = Duration::from_secs(30);

fn main() {
    esp_idf_svc::sys::link_patches();
    // Bind the ESP-IDF logger to the `log` facade
    esp_idf_svc::log::EspLogger::initialize_default();

    let pause = match run() {
        Ok(reason) => {
            log::warn!("restarting: {reason:?}");
            RESTART_DELAY
        }
        Err(e) => {
            log::error!("fatal: {e:?}");
            CRASH_RESTART_DELAY
        }
    };

    thread::sleep(StdDuration::from_millis(pause.as_millis()));
    unsafe { esp_idf_svc::sys::esp_restart() }
}

fn run() -> anyhow::Result<RestartReason> {
    log::info!("Proximity v{} starting on {} (std)", VERSION, board::BOARD_NAME);

    let config = Configuration::from_json(CONFIG).context("embedded configuration")?;
    log::info!(
        "{} beacons, {} outputs, {} networks, {} locations",
        config.beacon.len(),
        config.output.len(),
        config.wifi.len(),
        config.mapping.len()
    );

    let peripherals = Peripherals::take()?;
    let sys_loop = EspSystemEventLoop::take()?;
    let nvs = EspDefaultNvsPartition::take()?;

    let board = EspBoard::new(peripherals.modem, sys_loop, nvs)?;
    let mac = board.mac()?;
    let mut mac_str = filter::MacString::new();
    filter::format_mac(&mac, &mut mac_str);
    let hostname = board::hostname(&mac);
    log::info!("station {} hostname {}", mac_str, hostname);

    let node = Node::new(board, &config, hostname, Instant::now());

    Ok(block_on(async {
        match select(node.run(), status(&node)).await {
            Either::First(reason) => reason,
            Either::Second(never) => match never {},
        }
    }))
}

/// Periodic status report, mirroring what the status surface serves.
async fn status(node: &Node<EspBoard>) -> core::convert::Infallible {
    loop {
        Timer::after(STATUS_INTERVAL).await;
        let snapshot = node.snapshot(Instant::now());
        for output in &snapshot.outputs {
            log::info!("{}", output);
        }
        match snapshot.to_json() {
            Ok(json) => log::debug!("{}", String::from_utf8_lossy(&json)),
            Err(e) => log::warn!("status: {e}"),
        }
    }
}
