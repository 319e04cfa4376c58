/// Signed, token-refreshing client for one cloud smart plug.
///
/// Every request carries a millisecond timestamp and an HMAC-SHA256 signature
/// over the client id, the access token, the timestamp, the method, the body
/// hash and the path. The token is fetched lazily and dropped a minute before
/// the server-declared expiry. Nothing here retries: a failed call surfaces
/// as an activation failure and the output stays pending.
use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use data_encoding::{HEXLOWER, HEXUPPER};
use hmac::{Hmac, Mac};
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};

use crate::config::CloudSettings;
use crate::defaults::TOKEN_EXPIRY_MARGIN;
use crate::hal::{HttpTransport, Method, Request, WallClock};
use crate::protocol::{self, ApiEnvelope, MsgBuffer, TokenGrant, MAX_MSG_LEN, TOKEN_INVALID};
use crate::Error;

type HmacSha256 = Hmac<Sha256>;

const TOKEN_PATH: &str = "/v1.0/token?grant_type=1";

#[derive(Debug, Clone)]
struct Session {
    token: String,
    /// Wall-clock milliseconds when the token was issued
    issued_at: u64,
    /// Server-declared lifetime in seconds
    expire_secs: u64,
}

impl Session {
    fn is_stale(&self, now: u64) -> bool {
        let lifetime = self
            .expire_secs
            .saturating_mul(1000)
            .saturating_sub(TOKEN_EXPIRY_MARGIN.as_millis());
        now.saturating_sub(self.issued_at) > lifetime
    }
}

#[derive(Debug)]
pub struct CloudOutputClient {
    settings: CloudSettings,
    session: Option<Session>,
}

impl CloudOutputClient {
    pub fn new(settings: CloudSettings) -> Self {
        Self {
            settings,
            session: None,
        }
    }

    pub fn has_token(&self) -> bool {
        self.session.is_some()
    }

    /// Switch the plug's data point on or off.
    pub fn activate<B: HttpTransport + WallClock>(&mut self, io: &mut B, on: bool) -> Result<(), Error> {
        let now = io.unix_millis()?;

        if self.session.as_ref().is_some_and(|s| s.is_stale(now)) {
            log::debug!("cloud {}: token expired", self.settings.device_id);
            self.session = None;
        }

        if self.session.is_none() {
            self.authenticate(io, now)?;
        }

        let mut body: MsgBuffer = [0; MAX_MSG_LEN];
        let len = protocol::encode_command(&self.settings.code, on, &mut body)?;
        let path = format!("/v1.0/iot-03/devices/{}/commands", self.settings.device_id);
        self.call::<_, serde::de::IgnoredAny>(io, Method::Post, &path, &body[..len])?;
        Ok(())
    }

    fn authenticate<B: HttpTransport + WallClock>(&mut self, io: &mut B, now: u64) -> Result<(), Error> {
        let grant: TokenGrant = self
            .call(io, Method::Get, TOKEN_PATH, &[])?
            .ok_or_else(|| Error::Decode("token response without result".to_string()))?;

        log::info!(
            "cloud {}: token acquired, valid {}s",
            self.settings.device_id,
            grant.expire_time
        );
        self.session = Some(Session {
            token: grant.access_token,
            issued_at: now,
            expire_secs: grant.expire_time,
        });
        Ok(())
    }

    /// Sign and send one request, unwrapping the API envelope.
    fn call<B, T>(&mut self, io: &mut B, method: Method, path: &str, body: &[u8]) -> Result<Option<T>, Error>
    where
        B: HttpTransport + WallClock,
        T: DeserializeOwned,
    {
        let t = io.unix_millis()?;
        let token = self.session.as_ref().map_or("", |s| s.token.as_str());
        let sign = signature(
            &self.settings.client_secret,
            &self.settings.client_id,
            token,
            t,
            method,
            body,
            path,
        )?;
        let t = t.to_string();
        let url = format!("{}{}", self.settings.server, path);

        let mut headers: Vec<(&str, &str)> = alloc::vec![
            ("sign_method", "HMAC-SHA256"),
            ("client_id", self.settings.client_id.as_str()),
            ("t", t.as_str()),
            ("sign", sign.as_str()),
            ("Content-Type", "application/json"),
        ];
        if !token.is_empty() {
            headers.push(("access_token", token));
        }

        let response = io.send(&Request {
            method,
            url: &url,
            headers: &headers,
            body,
        })?;

        if !(200..300).contains(&response.status) {
            return Err(Error::Status(response.status));
        }

        let envelope: ApiEnvelope<T> =
            serde_json::from_slice(&response.body).map_err(|e| Error::Decode(e.to_string()))?;

        if !envelope.success {
            if envelope.code == TOKEN_INVALID {
                self.session = None;
            }
            return Err(Error::Api {
                code: envelope.code,
                msg: envelope.msg,
            });
        }
        Ok(envelope.result)
    }
}

/// Request signature: upper-case hex HMAC-SHA256 keyed by the client secret
/// over `client_id + token + t + method + "\n" + sha256(body) + "\n\n" + path`.
pub fn signature(
    secret: &str,
    client_id: &str,
    token: &str,
    t: u64,
    method: Method,
    body: &[u8],
    path: &str,
) -> Result<String, Error> {
    let body_hash = HEXLOWER.encode(&Sha256::digest(body));

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| Error::Signing)?;
    mac.update(client_id.as_bytes());
    mac.update(token.as_bytes());
    mac.update(t.to_string().as_bytes());
    mac.update(method.as_str().as_bytes());
    mac.update(b"\n");
    mac.update(body_hash.as_bytes());
    mac.update(b"\n\n");
    mac.update(path.as_bytes());

    Ok(HEXUPPER.encode(&mac.finalize().into_bytes()))
}
