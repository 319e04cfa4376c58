use alloc::string::String;

/// Errors raised by the core and by board implementations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Radio stack failure (scan, mode change, capture).
    #[error("radio: {0}")]
    Radio(String),

    /// Plain association failure; the next candidate network is tried.
    #[error("association with `{0}` failed")]
    Association(String),

    #[error("gpio `{pin}`: {reason}")]
    Gpio { pin: String, reason: String },

    #[error("http transport: {0}")]
    Transport(String),

    #[error("http status {0}")]
    Status(u16),

    /// The cloud API answered with `success: false`.
    #[error("cloud api error {code}: {msg}")]
    Api { code: u32, msg: String },

    #[error("time source: {0}")]
    Clock(String),

    #[error("malformed response: {0}")]
    Decode(String),

    #[error("request body does not fit the buffer")]
    Encode,

    #[error("request signing failed")]
    Signing,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("unknown output `{0}`")]
    UnknownOutput(String),

    #[error("no mapping for location `{0}`")]
    UnknownLocation(String),
}

impl Error {
    /// Configuration problems are skipped per lookup rather than retried.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::Config(_) | Error::UnknownOutput(_) | Error::UnknownLocation(_)
        )
    }

    /// Errors from `Radio::connect` that are neither a plain association
    /// failure nor a bad network entry leave the radio stack in an unknown
    /// state.
    pub fn is_radio_fault(&self) -> bool {
        !matches!(self, Error::Association(_)) && !self.is_configuration()
    }
}
