/* Shared ratbagd error definitions: RatbagError aggregates device/capability/value/system/
 * implementation failures surfaced at the DBus interface boundary. Hardware I/O failures use
 * `driver::DriverError`, defined alongside the `DeviceIo` methods that raise them. */
use thiserror::Error;

/* Errors surfaced across the broker. Bus methods never propagate these directly -
 * they translate to a numeric return code or a zbus::fdo::Error at the interface
 * boundary, per the daemon's error propagation policy. */
#[derive(Debug, Error)]
#[allow(dead_code)]
pub enum RatbagError {
    #[error("Device error: {0}")]
    Device(String),

    #[error("Unsupported capability: {0}")]
    Capability(String),

    #[error("Invalid value: {0}")]
    Value(String),

    #[error("System error: {0}")]
    System(#[from] std::io::Error),

    #[error("DBus error: {0}")]
    Dbus(#[from] zbus::Error),

    #[error("Driver implementation error: {0}")]
    Implementation(String),
}

impl RatbagError {
    /// Numeric error code mirroring the original daemon's
    /// `ghostcat_error_code`-style taxonomy (SUCCESS=0, negative on failure).
    pub fn code(&self) -> i32 {
        match self {
            RatbagError::Device(_) => -1000,
            RatbagError::Capability(_) => -1001,
            RatbagError::Value(_) => -1002,
            RatbagError::System(_) => -1003,
            RatbagError::Implementation(_) => -1004,
            RatbagError::Dbus(_) => -1003,
        }
    }
}

/* Bus-facing methods construct a RatbagError and convert it at the return
 * boundary rather than building zbus::fdo::Error variants inline, keeping
 * the §7 error taxonomy (Device/Capability/Value/System/Implementation) as
 * the single source of truth for which D-Bus error name each failure maps to. */
impl From<RatbagError> for zbus::fdo::Error {
    fn from(err: RatbagError) -> Self {
        match err {
            RatbagError::Capability(msg) => zbus::fdo::Error::NotSupported(msg),
            RatbagError::Value(msg) => zbus::fdo::Error::InvalidArgs(msg),
            RatbagError::Device(msg) => zbus::fdo::Error::Failed(msg),
            RatbagError::Implementation(msg) => zbus::fdo::Error::Failed(msg),
            RatbagError::System(e) => zbus::fdo::Error::Failed(e.to_string()),
            RatbagError::Dbus(e) => zbus::fdo::Error::Failed(e.to_string()),
        }
    }
}

/* `?`/`.into()` at a bus method's return site need to land on zbus::Error
 * directly (that's the Err arm of zbus::Result); go through the fdo::Error
 * mapping above rather than duplicating it. */
impl From<RatbagError> for zbus::Error {
    fn from(err: RatbagError) -> Self {
        zbus::fdo::Error::from(err).into()
    }
}
