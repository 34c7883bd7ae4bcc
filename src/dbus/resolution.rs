/* DBus Resolution interface: per-resolution object for DPI values, capabilities, active/default
 * flags; mutates DeviceInfo and optionally triggers hardware commit via actor. */
use std::sync::Arc;

use tokio::sync::RwLock;
use zbus::interface;
use zbus::zvariant::{OwnedValue, Value};

use crate::device::{DeviceInfo, Dpi, RESOLUTION_CAP_DISABLE, RESOLUTION_CAP_SEPARATE_XY};
use crate::error::RatbagError;

use super::fallback_owned_value;

/// The `org.freedesktop.ratbag1.Resolution` interface.
///
/// Represents one resolution preset within a profile.
/// State is shared with the parent device through `Arc<RwLock<DeviceInfo>>`
/// so that mutations here are visible to `commit()`.
/// Items are looked up by their stored `.index` ID, not by vector position.
pub struct RatbagResolution {
    device_info: Arc<RwLock<DeviceInfo>>,
    conn: zbus::Connection,
    profile_path: String,
    profile_id: u32,
    resolution_id: u32,
}

impl RatbagResolution {
    pub fn new(
        device_info: Arc<RwLock<DeviceInfo>>,
        conn: zbus::Connection,
        profile_path: String,
        profile_id: u32,
        resolution_id: u32,
    ) -> Self {
        Self {
            device_info,
            conn,
            profile_path,
            profile_id,
            resolution_id,
        }
    }
}

#[interface(name = "org.freedesktop.ratbag1.Resolution")]
impl RatbagResolution {
    /// Zero-based resolution index (constant).
    #[zbus(property)]
    fn index(&self) -> u32 {
        self.resolution_id
    }

    /// Resolution capabilities (constant).
    #[zbus(property)]
    async fn capabilities(&self) -> Vec<u32> {
        let info = self.device_info.read().await;
        info.find_profile(self.profile_id)
            .and_then(|p| p.find_resolution(self.resolution_id))
            .map(|r| r.capabilities.clone())
            .unwrap_or_default()
    }

    /// Whether this is the active resolution (read-only).
    #[zbus(property)]
    async fn is_active(&self) -> bool {
        let info = self.device_info.read().await;
        info.find_profile(self.profile_id)
            .and_then(|p| p.find_resolution(self.resolution_id))
            .is_some_and(|r| r.is_active)
    }

    /// Whether this is the default resolution (read-only).
    #[zbus(property)]
    async fn is_default(&self) -> bool {
        let info = self.device_info.read().await;
        info.find_profile(self.profile_id)
            .and_then(|p| p.find_resolution(self.resolution_id))
            .is_some_and(|r| r.is_default)
    }

    /// Whether this resolution is disabled (read-write).
    #[zbus(property)]
    async fn is_disabled(&self) -> bool {
        let info = self.device_info.read().await;
        info.find_profile(self.profile_id)
            .and_then(|p| p.find_resolution(self.resolution_id))
            .is_some_and(|r| r.is_disabled)
    }

    #[zbus(property)]
    async fn set_is_disabled(
        &self,
        disabled: bool,
        #[zbus(signal_emitter)] emitter: zbus::object_server::SignalEmitter<'_>,
    ) -> zbus::Result<()> {
        {
            let mut info = self.device_info.write().await;
            let Some(profile) = info.find_profile_mut(self.profile_id) else {
                return Ok(());
            };
            let Some(res) = profile.find_resolution_mut(self.resolution_id) else {
                return Ok(());
            };
            if disabled {
                if res.is_active || res.is_default {
                    return Err(RatbagError::Value(
                        "cannot disable the active or default resolution".into(),
                    )
                    .into());
                }
                if !res.has_capability(RESOLUTION_CAP_DISABLE) {
                    return Err(RatbagError::Capability(
                        "resolution does not support disabling".into(),
                    )
                    .into());
                }
            }
            res.is_disabled = disabled;
            profile.is_dirty = true;
        }
        let _ = self.is_disabled_changed(&emitter).await;
        super::notify_profile_dirty(&self.conn, &self.profile_path).await;
        Ok(())
    }

    /// DPI value as a variant: either a `u32` or a `(u32, u32)` tuple.
    #[zbus(property)]
    async fn resolution(&self) -> OwnedValue {
        let info = self.device_info.read().await;
        let dpi = info
            .find_profile(self.profile_id)
            .and_then(|p| p.find_resolution(self.resolution_id))
            .map(|r| r.dpi)
            .unwrap_or(Dpi::Unknown);
        match dpi {
            Dpi::Unified(val) => {
                OwnedValue::try_from(Value::from(val)).unwrap_or_else(|_| fallback_owned_value())
            }
            Dpi::Separate { x, y } => {
                OwnedValue::try_from(Value::from((x, y)))
                    .unwrap_or_else(|_| fallback_owned_value())
            }
            Dpi::Unknown => fallback_owned_value(),
        }
    }

    #[zbus(property)]
    async fn set_resolution(
        &self,
        value: OwnedValue,
        #[zbus(signal_emitter)] emitter: zbus::object_server::SignalEmitter<'_>,
    ) -> zbus::Result<()> {
        // Parse the incoming value before taking the write lock to minimize hold time.
        let inner: Value<'_> = value.into();
        let new_dpi = match &inner {
            Value::U32(val) => Some(Dpi::Unified(*val)),
            Value::Structure(s) => {
                if let [Value::U32(x), Value::U32(y)] = s.fields() {
                    Some(Dpi::Separate { x: *x, y: *y })
                } else {
                    tracing::warn!("Invalid structure in resolution value");
                    None
                }
            }
            _ => {
                tracing::warn!("Invalid resolution value received over DBus");
                None
            }
        };

        let Some(dpi) = new_dpi else {
            return Err(
                RatbagError::Value("expected u32 or (u32, u32) DPI value".into()).into(),
            );
        };

        // (x == 0) == (y == 0): both zero or both non-zero, never a mix.
        if let Dpi::Separate { x, y } = dpi {
            if (x == 0) != (y == 0) {
                return Err(RatbagError::Value(
                    "dpi_x and dpi_y must both be zero or both non-zero".into(),
                )
                .into());
            }
        }

        {
            let mut info = self.device_info.write().await;
            let Some(profile) = info.find_profile_mut(self.profile_id) else {
                return Ok(());
            };
            let Some(res) = profile.find_resolution_mut(self.resolution_id) else {
                return Ok(());
            };

            if let Dpi::Separate { x, y } = dpi {
                if x != y && !res.has_capability(RESOLUTION_CAP_SEPARATE_XY) {
                    return Err(RatbagError::Capability(
                        "resolution does not support asymmetric x/y DPI".into(),
                    )
                    .into());
                }
                if (x != 0 && !res.dpi_list.contains(&x)) || (y != 0 && !res.dpi_list.contains(&y))
                {
                    return Err(RatbagError::Value(
                        "dpi value is not a member of the resolution's DPI list".into(),
                    )
                    .into());
                }
            } else if let Dpi::Unified(v) = dpi {
                if v != 0 && !res.dpi_list.contains(&v) {
                    return Err(RatbagError::Value(
                        "dpi value is not a member of the resolution's DPI list".into(),
                    )
                    .into());
                }
            }

            res.dpi = dpi;
            profile.is_dirty = true;
        }
        let _ = self.resolution_changed(&emitter).await;
        super::notify_profile_dirty(&self.conn, &self.profile_path).await;
        Ok(())
    }

    /// List of supported DPI values (constant).
    #[zbus(property)]
    async fn resolutions(&self) -> Vec<u32> {
        let info = self.device_info.read().await;
        info.find_profile(self.profile_id)
            .and_then(|p| p.find_resolution(self.resolution_id))
            .map(|r| r.dpi_list.clone())
            .unwrap_or_default()
    }

    /// Set this resolution as the active one.
    ///
    /// Deactivates all sibling resolutions in the same profile first.
    async fn set_active(
        &self,
        #[zbus(signal_emitter)] emitter: zbus::object_server::SignalEmitter<'_>,
    ) {
        {
            let mut info = self.device_info.write().await;
            if let Some(profile) = info.find_profile_mut(self.profile_id) {
                for res in &mut profile.resolutions {
                    res.is_active = false;
                }
                if let Some(res) = profile.find_resolution_mut(self.resolution_id) {
                    res.is_active = true;
                }
                profile.is_dirty = true;
            }
        }
        let _ = self.is_active_changed(&emitter).await;
        super::notify_profile_dirty(&self.conn, &self.profile_path).await;
        tracing::info!(
            "Resolution {} in profile {} set as active",
            self.resolution_id,
            self.profile_id,
        );
    }

    /// Set this resolution as the default one.
    ///
    /// Clears default on all sibling resolutions in the same profile first.
    async fn set_default(
        &self,
        #[zbus(signal_emitter)] emitter: zbus::object_server::SignalEmitter<'_>,
    ) {
        {
            let mut info = self.device_info.write().await;
            if let Some(profile) = info.find_profile_mut(self.profile_id) {
                for res in &mut profile.resolutions {
                    res.is_default = false;
                }
                if let Some(res) = profile.find_resolution_mut(self.resolution_id) {
                    res.is_default = true;
                }
                profile.is_dirty = true;
            }
        }
        let _ = self.is_default_changed(&emitter).await;
        super::notify_profile_dirty(&self.conn, &self.profile_path).await;
        tracing::info!(
            "Resolution {} in profile {} set as default",
            self.resolution_id,
            self.profile_id,
        );
    }
}
