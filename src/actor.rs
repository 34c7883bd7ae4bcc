/* Per-device hardware actor: owns the `DeviceIo` handle and the driver instance exclusively
 * on a background task, so that probe/commit/poll calls against a single device are always
 * serialized and never race with each other even though several DBus calls and the active-
 * resolution poll timer can all want to talk to the same device concurrently. */
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::{debug, error, info, warn};

use crate::device::DeviceInfo;
use crate::driver::{DeviceDriver, DeviceIo};

/// Requests the actor task accepts over its command channel.
enum ActorCommand {
    /// Write all dirty entities back to hardware, then clear their dirty flags.
    Commit(oneshot::Sender<Result<()>>),
    /// Re-read which resolution is active on hardware; replies `true` if it changed.
    RefreshActiveResolution(oneshot::Sender<Result<bool>>),
    Shutdown,
}

/// A cheaply-clonable handle to a running device actor.
///
/// Dropping every handle does not stop the actor; callers must explicitly
/// `shutdown()` it (mirrors the strong-reference semantics in the spec, where
/// a pending commit keeps the device alive independent of bus-side refcounts).
#[derive(Clone)]
pub struct ActorHandle {
    tx: mpsc::Sender<ActorCommand>,
}

impl ActorHandle {
    /// Ask the actor to commit all dirty state. Awaits the driver's reply.
    pub async fn commit(&self) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(ActorCommand::Commit(reply_tx))
            .await
            .map_err(|_| anyhow!("device actor task is gone"))?;
        reply_rx
            .await
            .map_err(|_| anyhow!("device actor dropped the commit reply"))?
    }

    /// Ask the actor to re-read the hardware-active resolution.
    ///
    /// Returns `Ok(true)` if the active resolution (or profile) changed.
    pub async fn refresh_active_resolution(&self) -> Result<bool> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(ActorCommand::RefreshActiveResolution(reply_tx))
            .await
            .map_err(|_| anyhow!("device actor task is gone"))?;
        reply_rx
            .await
            .map_err(|_| anyhow!("device actor dropped the refresh reply"))?
    }

    /// Stop the actor task. Any commit already in flight still completes.
    pub async fn shutdown(&self) {
        let _ = self.tx.send(ActorCommand::Shutdown).await;
    }
}

/// Open the hidraw node, probe the driver, populate `info` from hardware, and
/// spawn the background task that will serialize all further hardware access.
///
/// On probe failure the `DeviceIo` and driver are dropped and the error is
/// returned to the caller (hotplug add), which logs and skips the candidate.
pub async fn spawn_device_actor(
    devnode: &Path,
    mut driver: Box<dyn DeviceDriver>,
    info: Arc<RwLock<DeviceInfo>>,
) -> Result<ActorHandle> {
    let devnode_display = devnode.display().to_string();
    let mut io = DeviceIo::open(devnode).await?;

    driver.probe(&mut io).await?;
    {
        let mut locked = info.write().await;
        driver.load_profiles(&mut io, &mut locked).await?;
        if let Err(e) = locked.sanity_check() {
            error!("driver bug: {devnode_display} ({}) failed sanity check: {e}", driver.name());
            driver.remove();
            return Err(anyhow!(e));
        }
    }

    let (tx, mut rx) = mpsc::channel(8);

    tokio::spawn(async move {
        info!("device actor started for {devnode_display} ({})", driver.name());

        while let Some(cmd) = rx.recv().await {
            match cmd {
                ActorCommand::Commit(reply) => {
                    let result = {
                        let locked = info.read().await;
                        driver.commit(&mut io, &locked).await
                    };
                    match &result {
                        Ok(()) => {
                            let mut locked = info.write().await;
                            for profile in &mut locked.profiles {
                                profile.is_dirty = false;
                            }
                        }
                        Err(e) => error!("commit failed for {devnode_display}: {e:#}"),
                    }
                    let _ = reply.send(result);
                }
                ActorCommand::RefreshActiveResolution(reply) => {
                    let result = {
                        let mut locked = info.write().await;
                        driver.refresh_active_resolution(&mut io, &mut locked).await
                    };
                    if let Err(ref e) = result {
                        warn!("active-resolution refresh failed for {devnode_display}: {e:#}");
                    }
                    let _ = reply.send(result);
                }
                ActorCommand::Shutdown => break,
            }
        }

        debug!("device actor exiting for {devnode_display}");
        driver.remove();
    });

    Ok(ActorHandle { tx })
}
