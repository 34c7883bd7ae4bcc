/* DBus Device interface: per-mouse object exposing model/name/firmware and child profile paths,
 * backed by shared DeviceInfo; Commit() defers to the main loop's commit scheduler. */
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use zbus::interface;
use zbus::zvariant::ObjectPath;

use crate::device::DeviceInfo;

/// The `org.freedesktop.ratbag1.Device` interface.
///
/// Each connected mouse has one Device object registered on the DBus bus.
/// Holds a shared reference to [`DeviceInfo`] so that child objects
/// (profiles, buttons, etc.) mutate the same state that `commit()` reads.
///
/// `Commit()` does not call the driver directly: it enqueues the device's
/// sysname on `commit_tx` and returns immediately, so the DBus reply is sent
/// before the deferred commit task runs on the main event loop. Multiple
/// `Commit()` calls therefore enqueue multiple tasks that run strictly in
/// FIFO order; nothing is coalesced.
pub struct RatbagDevice {
    info: Arc<RwLock<DeviceInfo>>,
    path: String,
    sysname: String,
    commit_tx: mpsc::Sender<String>,
}

impl RatbagDevice {
    pub fn new(
        info: Arc<RwLock<DeviceInfo>>,
        path: String,
        sysname: String,
        commit_tx: mpsc::Sender<String>,
    ) -> Self {
        Self {
            info,
            path,
            sysname,
            commit_tx,
        }
    }
}

#[interface(name = "org.freedesktop.ratbag1.Device")]
impl RatbagDevice {
    /// Device model string, e.g. "usb:046d:c539:0".
    #[zbus(property)]
    async fn model(&self) -> String {
        self.info.read().await.model.clone()
    }

    /// Human-readable device name.
    #[zbus(property)]
    async fn name(&self) -> String {
        self.info.read().await.name.clone()
    }

    /// Firmware version string, may be empty.
    #[zbus(property)]
    async fn firmware_version(&self) -> String {
        self.info.read().await.firmware_version.clone()
    }

    /// Array of object paths to this device's profiles.
    #[zbus(property)]
    async fn profiles(&self) -> Vec<ObjectPath<'static>> {
        let info = self.info.read().await;
        info.profiles
            .iter()
            .filter_map(|p| {
                ObjectPath::try_from(format!("{}/p{}", self.path, p.index)).ok()
            })
            .collect()
    }

    /// Schedule a commit of pending changes to the device hardware.
    ///
    /// Always returns 0 immediately: the actual driver commit happens on a
    /// deferred task run by the main event loop. Failure is reported
    /// asynchronously through the `Resync` signal and `IsDirty`
    /// re-announcement on every profile, not through this return value.
    async fn commit(&self) -> u32 {
        if self.commit_tx.send(self.sysname.clone()).await.is_err() {
            tracing::warn!("Commit requested but event loop is gone for {}", self.path);
            return 1;
        }
        0
    }

    /// Signal emitted when an error occurs during commit, instructing
    /// clients to invalidate their cached view of this device's subtree.
    #[zbus(signal)]
    pub async fn resync(signal_emitter: &zbus::object_server::SignalEmitter<'_>) -> zbus::Result<()>;
}
