/// Beacon identifiers and the captured-frame matcher.
///
/// Each captured frame's leading bytes are rendered as colon-delimited
/// upper-case hex and every enabled beacon identifier is searched for as a
/// literal substring. Identifiers appear verbatim inside the address fields,
/// so the search tolerates subtype and offset differences between frame
/// kinds. A stray match is possible; callers treat hits as a noisy presence
/// signal that is debounced by the output idle timeout.
use core::fmt;

use alloc::string::String;

use crate::defaults::FRAME_HEADER_LEN;

/// Rendered header: two hex digits per byte plus separators
pub const HEADER_HEX_LEN: usize = FRAME_HEADER_LEN * 3;

pub type HeaderHex = heapless::String<HEADER_HEX_LEN>;

/// Maximum length for MAC address strings ("AA:BB:CC:DD:EE:FF")
pub type MacString = heapless::String<18>;

/// A configured wireless identifier whose presence drives outputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Beacon {
    /// Normalised identifier, e.g. "AA:BB:CC:DD:EE:FF"
    pub id: String,
    pub name: String,
    pub enabled: bool,
    /// Frames matched since the ticker last consumed this beacon
    pub frames: u32,
}

impl Beacon {
    pub fn new(id: &str, name: &str, enabled: bool) -> Self {
        Self {
            id: normalize_id(id),
            name: name.into(),
            enabled,
            frames: 0,
        }
    }

    /// Whether this beacon's identifier occurs in a rendered header.
    pub fn matches(&self, header: &str) -> bool {
        self.enabled && !self.id.is_empty() && header.contains(self.id.as_str())
    }

    /// Return and reset the match counter.
    pub fn take_frames(&mut self) -> u32 {
        core::mem::take(&mut self.frames)
    }
}

impl fmt::Display for Beacon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:10} {} {}", self.name, self.id, self.frames)
    }
}

/// Run of dashes as wide as a matched identifier
struct Underline(usize);

impl fmt::Display for Underline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pad = f.width().unwrap_or(0).saturating_sub(self.0);
        for _ in 0..pad {
            f.write_str(" ")?;
        }
        for _ in 0..self.0 {
            f.write_str("-")?;
        }
        Ok(())
    }
}

/// Upper-case an identifier and accept '-' as a separator.
pub fn normalize_id(id: &str) -> String {
    id.trim()
        .chars()
        .map(|c| if c == '-' { ':' } else { c.to_ascii_uppercase() })
        .collect()
}

/// Render up to [`FRAME_HEADER_LEN`] leading bytes as "B4:00:3A:01:...".
pub fn header_hex(raw: &[u8]) -> HeaderHex {
    use core::fmt::Write;
    let mut out = HeaderHex::new();
    for (i, byte) in raw.iter().take(FRAME_HEADER_LEN).enumerate() {
        if i > 0 {
            let _ = out.push(':');
        }
        let _ = write!(out, "{byte:02X}");
    }
    out
}

/// Match one raw frame against all beacons, incrementing the counter of
/// every beacon found. Counters are not deduplicated within a cycle.
///
/// Returns the number of beacons matched.
pub fn match_frame(raw: &[u8], beacons: &mut [Beacon]) -> usize {
    let header = header_hex(raw);
    let mut hits = 0;

    for beacon in beacons.iter_mut() {
        if !beacon.matches(&header) {
            continue;
        }
        let offset = header.find(beacon.id.as_str()).unwrap_or(0);

        beacon.frames = beacon.frames.saturating_add(1);
        hits += 1;

        log::debug!("F: {}", beacon.name);
        log::debug!("{}", header);
        // Caret line under the matched identifier
        log::debug!("{:>width$}", Underline(beacon.id.len()), width = offset + beacon.id.len());
    }

    hits
}

/// Format a 6-byte MAC address into "AA:BB:CC:DD:EE:FF" string
pub fn format_mac(mac: &[u8; 6], buf: &mut MacString) {
    use core::fmt::Write;
    let _ = write!(
        buf,
        "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
        mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]
    );
}
