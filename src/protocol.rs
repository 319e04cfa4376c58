/// JSON bodies exchanged with the cloud plug API and the status snapshot.
///
/// Outbound command bodies are small and fixed in shape, so they are
/// serialized with `serde_json_core` into a stack buffer. API responses and
/// the snapshot have open-ended keys and go through `serde_json` on the heap.
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use serde::{Deserialize, Serialize};

use crate::Error;

/// Firmware version string
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Maximum size of a serialized command body
pub const MAX_MSG_LEN: usize = 256;

/// Buffer type for serialized command bodies
pub type MsgBuffer = [u8; MAX_MSG_LEN];

/// API error code answered when the access token is no longer accepted
pub const TOKEN_INVALID: u32 = 1010;

/// One data point write
#[derive(Debug, Clone, Serialize)]
pub struct Command<'a> {
    pub code: &'a str,
    pub value: bool,
}

/// Body of `POST /v1.0/iot-03/devices/{device_id}/commands`
#[derive(Debug, Serialize)]
pub struct CommandBatch<'a> {
    pub commands: &'a [Command<'a>],
}

/// Serialize a single switch command into `buf`, returning the body length.
pub fn encode_command(code: &str, value: bool, buf: &mut MsgBuffer) -> Result<usize, Error> {
    let commands = [Command { code, value }];
    serde_json_core::to_slice(&CommandBatch { commands: &commands }, buf).map_err(|_| Error::Encode)
}

/// Envelope wrapping every cloud API response
#[derive(Debug, Deserialize)]
pub struct ApiEnvelope<T> {
    pub success: bool,
    #[serde(default)]
    pub code: u32,
    #[serde(default)]
    pub msg: String,
    pub result: Option<T>,
}

/// `result` of `GET /v1.0/token?grant_type=1`
#[derive(Debug, Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    /// Lifetime in seconds
    pub expire_time: u64,
}

/// Read-only view of the node served by the web task
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub version: &'static str,
    pub board: &'static str,
    pub hostname: String,
    /// "station" or "ap"
    pub mode: &'static str,
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub beacons: Vec<BeaconStatus>,
    pub outputs: Vec<OutputStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BeaconStatus {
    pub id: String,
    pub name: String,
    pub enabled: bool,
    /// Matches since the last tick
    pub frames: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputStatus {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub on: bool,
    pub known: bool,
    pub pending: bool,
    /// Seconds since presence was last asserted
    pub idle: u64,
    pub timeout: u64,
}

impl fmt::Display for OutputStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:8} {:24} {:5} {} {} {:5}",
            self.kind,
            self.id,
            self.on,
            if self.pending { 'P' } else { '_' },
            if self.known { 'K' } else { '_' },
            self.idle
        )
    }
}

impl Snapshot {
    pub fn to_json(&self) -> Result<Vec<u8>, Error> {
        serde_json::to_vec(self).map_err(|_| Error::Encode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;
    use alloc::vec;

    // ── Command bodies ──────────────────────────────────────────────

    #[test]
    fn command_body_layout() {
        let mut buf: MsgBuffer = [0; MAX_MSG_LEN];
        let len = encode_command("switch_1", true, &mut buf).unwrap();
        let json = core::str::from_utf8(&buf[..len]).unwrap();
        assert_eq!(json, r#"{"commands":[{"code":"switch_1","value":true}]}"#);
    }

    #[test]
    fn oversized_command_is_an_encode_error() {
        let code = "x".repeat(MAX_MSG_LEN);
        let mut buf: MsgBuffer = [0; MAX_MSG_LEN];
        assert_eq!(encode_command(&code, false, &mut buf), Err(Error::Encode));
    }

    // ── Envelopes ───────────────────────────────────────────────────

    #[test]
    fn token_envelope_parses() {
        let body = br#"{"result":{"access_token":"abc","expire_time":7200,"refresh_token":"r","uid":"u"},"success":true,"t":1}"#;
        let envelope: ApiEnvelope<TokenGrant> = serde_json::from_slice(body).unwrap();
        assert!(envelope.success);
        let grant = envelope.result.unwrap();
        assert_eq!(grant.access_token, "abc");
        assert_eq!(grant.expire_time, 7200);
    }

    #[test]
    fn failure_envelope_has_no_result() {
        let body = br#"{"code":1010,"msg":"token invalid","success":false,"t":1}"#;
        let envelope: ApiEnvelope<bool> = serde_json::from_slice(body).unwrap();
        assert!(!envelope.success);
        assert_eq!(envelope.code, TOKEN_INVALID);
        assert_eq!(envelope.msg, "token invalid");
        assert!(envelope.result.is_none());
    }

    // ── Snapshot ────────────────────────────────────────────────────

    fn porch() -> OutputStatus {
        OutputStatus {
            id: "porch_light".to_string(),
            kind: "gpio",
            on: true,
            known: true,
            pending: false,
            idle: 12,
            timeout: 60,
        }
    }

    #[test]
    fn snapshot_serializes_state() {
        let snapshot = Snapshot {
            version: VERSION,
            board: "test_board",
            hostname: "proximity-00-11-22-33-44-55".to_string(),
            mode: "station",
            ready: true,
            ssid: Some("HomeNet".to_string()),
            location: None,
            beacons: vec![BeaconStatus {
                id: "AA:BB:CC:DD:EE:FF".to_string(),
                name: "badge1".to_string(),
                enabled: true,
                frames: 3,
            }],
            outputs: vec![porch()],
        };
        let json = String::from_utf8(snapshot.to_json().unwrap()).unwrap();
        assert!(json.contains(r#""mode":"station""#));
        assert!(json.contains(r#""ssid":"HomeNet""#));
        assert!(json.contains(r#""frames":3"#));
        assert!(json.contains(r#""type":"gpio""#));
        assert!(json.contains(r#""idle":12"#));
        // location omitted when unresolved
        assert!(!json.contains("location"));
    }

    #[test]
    fn output_status_line() {
        let line = porch().to_string();
        assert!(line.starts_with("gpio     porch_light"));
        assert!(line.contains("true  _ K"));
    }

    // ── Version constant ────────────────────────────────────────────

    #[test]
    fn version_is_semver() {
        let parts: heapless::Vec<&str, 4> = VERSION.split('.').collect();
        assert_eq!(
            parts.len(),
            3,
            "VERSION should be semver (major.minor.patch)"
        );
        for part in &parts {
            assert!(part.parse::<u32>().is_ok(), "'{part}' is not a number");
        }
    }
}
