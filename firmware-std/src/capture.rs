//! Promiscuous-mode capture queue.
//!
//! The WiFi driver hands every management frame to [`promisc_rx_cb`], which
//! copies the leading header bytes into a small fixed queue. The sniffer
//! task drains it through `Radio::next_frame`.

use std::sync::Mutex;

use esp_idf_svc::sys::{
    esp, esp_wifi_set_channel, esp_wifi_set_promiscuous, esp_wifi_set_promiscuous_filter,
    esp_wifi_set_promiscuous_rx_cb, wifi_promiscuous_filter_t, wifi_promiscuous_pkt_t,
    wifi_promiscuous_pkt_type_t, wifi_second_chan_t_WIFI_SECOND_CHAN_NONE, EspError,
    WIFI_PROMIS_FILTER_MASK_MGMT,
};
use heapless::Deque;
use proximity::defaults::FRAME_HEADER_LEN;

/// Frames held between sniffer polls; the oldest is dropped when full
const QUEUE_LEN: usize = 32;

#[derive(Clone, Copy)]
struct Frame {
    len: usize,
    header: [u8; FRAME_HEADER_LEN],
}

static QUEUE: Mutex<Deque<Frame, QUEUE_LEN>> = Mutex::new(Deque::new());

/// WiFi promiscuous mode callback.
///
/// Runs in the WiFi driver task and must not block, so the queue is only
/// ever taken with `try_lock`; a frame arriving while the sniffer holds it
/// is dropped.
unsafe extern "C" fn promisc_rx_cb(
    buf: *mut std::ffi::c_void,
    _pkt_type: wifi_promiscuous_pkt_type_t,
) {
    let pkt = unsafe { &*(buf as *const wifi_promiscuous_pkt_t) };
    let len = (pkt.rx_ctrl.sig_len() as usize).min(FRAME_HEADER_LEN);
    if len == 0 {
        return;
    }

    // Safety: the driver guarantees at least `sig_len` payload bytes
    let payload = unsafe { std::slice::from_raw_parts(pkt.payload.as_ptr(), len) };
    let mut frame = Frame {
        len,
        header: [0; FRAME_HEADER_LEN],
    };
    frame.header[..len].copy_from_slice(payload);

    if let Ok(mut queue) = QUEUE.try_lock() {
        if queue.is_full() {
            queue.pop_front();
        }
        let _ = queue.push_back(frame);
    }
}

/// Enter promiscuous mode for management frames on `channel`.
pub fn start(channel: u8) -> Result<(), EspError> {
    clear();
    let filter = wifi_promiscuous_filter_t {
        filter_mask: WIFI_PROMIS_FILTER_MASK_MGMT,
    };
    unsafe {
        esp!(esp_wifi_set_promiscuous_filter(&filter))?;
        esp!(esp_wifi_set_promiscuous_rx_cb(Some(promisc_rx_cb)))?;
        esp!(esp_wifi_set_promiscuous(true))?;
    }

    // Already on this channel while associated; the driver may refuse the
    // switch in that case
    if let Err(e) = esp!(unsafe {
        esp_wifi_set_channel(channel, wifi_second_chan_t_WIFI_SECOND_CHAN_NONE)
    }) {
        log::debug!("set channel {channel}: {e}");
    }
    Ok(())
}

pub fn stop() {
    let _ = unsafe { esp_wifi_set_promiscuous(false) };
    clear();
}

/// Copy the oldest queued header into `buf`.
pub fn pop(buf: &mut [u8]) -> Option<usize> {
    let frame = QUEUE.lock().ok()?.pop_front()?;
    let len = frame.len.min(buf.len());
    buf[..len].copy_from_slice(&frame.header[..len]);
    Some(len)
}

fn clear() {
    if let Ok(mut queue) = QUEUE.lock() {
        queue.clear();
    }
}
