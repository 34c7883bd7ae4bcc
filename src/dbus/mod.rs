/* DBus surface: zbus interface implementations for Manager/Device/Profile/Resolution/Button/LED,
 * plus helpers to register devices and translate device actions from udev. */
pub mod button;
pub mod device;
pub mod led;
pub mod manager;
pub mod profile;
pub mod resolution;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::{mpsc, RwLock};
use tracing::{error, info, warn};
use zbus::connection::Builder;
use zbus::zvariant::OwnedValue;

use crate::actor::{self, ActorHandle};
use crate::device::DeviceInfo;
use crate::device_database::{BusType, DeviceDb};
use crate::driver;
use crate::udev_monitor::DeviceAction;

/// Fallback [`OwnedValue`] (`u32` zero) used when zvariant serialization fails.
#[inline]
pub(crate) fn fallback_owned_value() -> OwnedValue {
    OwnedValue::from(0u32)
}

/// Re-emit a Profile's `IsDirty` PropertiesChanged signal on behalf of a
/// sibling Resolution/Button/LED object that just flipped the parent
/// profile's dirty flag directly (those objects have no `RatbagProfile`
/// `&self` to call `is_dirty_changed` on themselves).
pub(crate) async fn notify_profile_dirty(conn: &zbus::Connection, profile_path: &str) {
    let object_server = conn.object_server();
    let Ok(iface_ref) = object_server
        .interface::<_, profile::RatbagProfile>(profile_path)
        .await
    else {
        return;
    };
    let emitter = iface_ref.signal_emitter();
    let _ = iface_ref.get().await.is_dirty_changed(emitter).await;
}

/// Register a new device and its children (profiles, buttons, etc) onto the DBus bus.
///
/// Returns a list of all object paths that were registered.
/// Child objects share the same `Arc<RwLock<DeviceInfo>>` so property
/// mutations propagate to the device-level `commit()` path.
async fn register_device_on_dbus(
    conn: &zbus::Connection,
    device_path: &str,
    sysname: &str,
    shared_info: Arc<RwLock<DeviceInfo>>,
    commit_tx: mpsc::Sender<String>,
) -> (Vec<String>, Vec<String>) {
    let mut object_paths = Vec::with_capacity(64);
    let mut profile_paths = Vec::with_capacity(8);
    object_paths.push(device_path.to_owned());
    let object_server = conn.object_server();

    // Register the Device object.
    let device_obj = device::RatbagDevice::new(
        Arc::clone(&shared_info),
        device_path.to_owned(),
        sysname.to_owned(),
        commit_tx,
    );

    if let Err(e) = object_server.at(device_path, device_obj).await {
        warn!("Failed to register device at {device_path}: {e}");
        return (object_paths, profile_paths);
    }

    // Register Profile, Resolution, Button, LED child objects.
    // We snapshot the structure for iteration but children hold the shared
    // Arc so mutations propagate correctly to the commit path.
    let info_snapshot = shared_info.read().await;
    for prof in &info_snapshot.profiles {
        let profile_path = crate::path::profile_path(device_path, prof.index);
        let profile_obj = profile::RatbagProfile::new(
            Arc::clone(&shared_info),
            device_path.to_owned(),
            prof.index,
        );
        if let Err(e) = object_server.at(profile_path.as_str(), profile_obj).await {
            warn!("Failed to register profile {profile_path}: {e}");
        }
        object_paths.push(profile_path.clone());
        profile_paths.push(profile_path.clone());

        for res in &prof.resolutions {
            let res_path = crate::path::resolution_path(&profile_path, res.index);
            let res_obj = resolution::RatbagResolution::new(
                Arc::clone(&shared_info),
                conn.clone(),
                profile_path.clone(),
                prof.index,
                res.index,
            );
            if let Err(e) = object_server.at(res_path.as_str(), res_obj).await {
                warn!("Failed to register resolution {res_path}: {e}");
            }
            object_paths.push(res_path);
        }

        for btn in &prof.buttons {
            let btn_path = crate::path::button_path(&profile_path, btn.index);
            let btn_obj = button::RatbagButton::new(
                Arc::clone(&shared_info),
                conn.clone(),
                profile_path.clone(),
                prof.index,
                btn.index,
            );
            if let Err(e) = object_server.at(btn_path.as_str(), btn_obj).await {
                warn!("Failed to register button {btn_path}: {e}");
            }
            object_paths.push(btn_path);
        }

        for led_info in &prof.leds {
            let led_path = crate::path::led_path(&profile_path, led_info.index);
            let led_obj = led::RatbagLed::new(
                Arc::clone(&shared_info),
                conn.clone(),
                profile_path.clone(),
                prof.index,
                led_info.index,
            );
            if let Err(e) = object_server.at(led_path.as_str(), led_obj).await {
                warn!("Failed to register LED {led_path}: {e}");
            }
            object_paths.push(led_path);
        }
    }

    (object_paths, profile_paths)
}

/// Unregister a device and all its children from the DBus object server,
/// then remove it from the manager's device list.
///
/// Shared between the `Remove` (udev) and `RemoveTest` (dev-hooks) paths.
async fn remove_device(
    conn: &zbus::Connection,
    sysname: &str,
    registered_devices: &mut HashMap<String, Vec<String>>,
    actor_handles: &mut HashMap<String, ActorHandle>,
    profile_paths: &mut HashMap<String, Vec<String>>,
) -> Result<()> {
    // Shut down the hardware actor if one is running.
    if let Some(handle) = actor_handles.remove(sysname) {
        handle.shutdown().await;
    }
    profile_paths.remove(sysname);

    if let Some(paths) = registered_devices.remove(sysname) {
        let object_server = conn.object_server();

        // Remove child objects first (reverse order), then the device itself.
        // We attempt all interface types per path; only the matching one succeeds.
        for path in paths.iter().rev() {
            let _ = object_server
                .remove::<device::RatbagDevice, _>(path.as_str())
                .await;
            let _ = object_server
                .remove::<profile::RatbagProfile, _>(path.as_str())
                .await;
            let _ = object_server
                .remove::<resolution::RatbagResolution, _>(path.as_str())
                .await;
            let _ = object_server
                .remove::<button::RatbagButton, _>(path.as_str())
                .await;
            let _ = object_server
                .remove::<led::RatbagLed, _>(path.as_str())
                .await;
        }

        // The device root path is always paths[0]; update the manager list.
        let device_path = &paths[0];
        let iface_ref = object_server
            .interface::<_, manager::RatbagManager>("/org/freedesktop/ratbag1")
            .await?;
        iface_ref.get_mut().await.remove_device(device_path);
        iface_ref
            .get()
            .await
            .devices_changed(iface_ref.signal_emitter())
            .await?;

        info!("Device {} removed ({} objects)", sysname, paths.len());
    } else {
        info!("Device removed: {} (was not registered)", sysname);
    }

    Ok(())
}

/// Outcome of trying to acquire the bus name and bring up the object server;
/// distinguished so `main` can map it to the right process exit code.
pub enum StartupError {
    /// Another instance already owns `org.freedesktop.ratbag1`.
    AlreadyRunning,
    Other(anyhow::Error),
}

impl<E: Into<anyhow::Error>> From<E> for StartupError {
    fn from(e: E) -> Self {
        StartupError::Other(e.into())
    }
}

/// Start the DBus server and register all interfaces.
///
/// This function blocks until the daemon is shut down. It receives device
/// hotplug events from the udev monitor through the `device_rx` channel.
pub async fn run_server(
    mut device_rx: mpsc::Receiver<DeviceAction>,
    device_db: DeviceDb,
) -> Result<(), StartupError> {
    let manager = manager::RatbagManager::default();

    let conn = match Builder::system()?
        .name("org.freedesktop.ratbag1")?
        .serve_at("/org/freedesktop/ratbag1", manager)?
        .build()
        .await
    {
        Ok(conn) => conn,
        Err(e) => {
            // zbus surfaces a taken well-known name as a NameTaken variant (or,
            // depending on version, an fdo::Error::AddressInUse-shaped reply);
            // match on the rendered message rather than the exact enum so this
            // keeps working across zbus point releases.
            let msg = e.to_string();
            if msg.contains("NameTaken") || msg.contains("already") || msg.contains("Exists") {
                error!("Bus name is taken, another instance of ratbagd is already running");
                return Err(StartupError::AlreadyRunning);
            }
            return Err(StartupError::Other(e.into()));
        }
    };

    info!("DBus server ready on org.freedesktop.ratbag1");

    // Under dev-hooks, wire a secondary channel to the manager so that
    // LoadTestDevice / ResetTestDevice can inject synthetic DeviceActions
    // into this same event loop.
    #[cfg(feature = "dev-hooks")]
    let mut test_rx = {
        let (test_tx, test_rx) =
            tokio::sync::mpsc::channel::<DeviceAction>(16);
        let object_server = conn.object_server();
        let iface_ref = object_server
            .interface::<_, manager::RatbagManager>("/org/freedesktop/ratbag1")
            .await?;
        iface_ref.get_mut().await.set_test_device_tx(test_tx);
        test_rx
    };

    // Track registered device paths so we can clean up on removal.
    let mut registered_devices: HashMap<String, Vec<String>> = HashMap::new();

    // Track actor handles so we can shut them down on removal.
    let mut actor_handles: HashMap<String, ActorHandle> = HashMap::new();

    // Track each device's profile object paths, so the active-resolution poll
    // below knows what to re-announce without re-walking the whole tree.
    let mut profile_paths: HashMap<String, Vec<String>> = HashMap::new();

    // Every 2 seconds, ask each device's driver whether the hardware-active
    // resolution changed (e.g. a DPI button was pressed), independent of any
    // client-initiated write.
    let mut poll_interval = tokio::time::interval(std::time::Duration::from_secs(2));
    poll_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    // Commit scheduler: `Device.Commit()` sends the sysname here and replies
    // to its caller immediately, before the deferred task below ever runs.
    // Because this channel is drained on the same single-threaded loop as
    // every other event source, commits for a given device always run in the
    // FIFO order their `Commit()` calls were received, one at a time.
    let (commit_tx, mut commit_rx) = mpsc::channel::<String>(32);

    // Idle-exit timer: reset to "now + IDLE_TIMEOUT" on every loop iteration,
    // regardless of which branch fired. If nothing happens on the bus or from
    // udev for the full timeout, the daemon exits and relies on bus
    // activation to be restarted on the next request.
    const IDLE_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(20 * 60);
    let mut idle_deadline = tokio::time::Instant::now() + IDLE_TIMEOUT;

    enum LoopEvent {
        Action(DeviceAction),
        Poll,
        Commit(String),
        IdleTimeout,
        Closed,
    }

    // Main event loop: process udev device events (and, when dev-hooks is
    // enabled, synthetic test device actions from the DBus manager), plus the
    // periodic active-resolution poll.
    loop {
        #[cfg(feature = "dev-hooks")]
        let event = tokio::select! {
            a = device_rx.recv() => a.map(LoopEvent::Action).unwrap_or(LoopEvent::Closed),
            a = test_rx.recv()   => a.map(LoopEvent::Action).unwrap_or(LoopEvent::Closed),
            _ = poll_interval.tick() => LoopEvent::Poll,
            Some(s) = commit_rx.recv() => LoopEvent::Commit(s),
            _ = tokio::time::sleep_until(idle_deadline) => LoopEvent::IdleTimeout,
        };
        #[cfg(not(feature = "dev-hooks"))]
        let event = tokio::select! {
            a = device_rx.recv() => a.map(LoopEvent::Action).unwrap_or(LoopEvent::Closed),
            _ = poll_interval.tick() => LoopEvent::Poll,
            Some(s) = commit_rx.recv() => LoopEvent::Commit(s),
            _ = tokio::time::sleep_until(idle_deadline) => LoopEvent::IdleTimeout,
        };

        // Only genuine activity (a hotplug event or a bus-initiated commit)
        // counts against idleness; the 2-second poll tick fires regardless of
        // whether anything is actually happening and would otherwise starve
        // the timeout forever.
        if matches!(event, LoopEvent::Action(_) | LoopEvent::Commit(_)) {
            idle_deadline = tokio::time::Instant::now() + IDLE_TIMEOUT;
        }

        let action = match event {
            LoopEvent::Action(a) => a,
            LoopEvent::Closed => break,
            LoopEvent::IdleTimeout => {
                info!("Idle for {}s with no activity, exiting", IDLE_TIMEOUT.as_secs());
                break;
            }
            LoopEvent::Commit(sysname) => {
                // Deferred commit task: runs strictly after the `Commit()`
                // DBus reply was already sent to the caller.
                let result = match actor_handles.get(&sysname) {
                    Some(actor) => actor.commit().await,
                    // Test devices (and any device whose driver actor failed
                    // to spawn) have no hardware to write back to; treat the
                    // commit as an immediate local success.
                    None => Ok(()),
                };

                let object_server = conn.object_server();
                let device_path = crate::path::device_path(&sysname);

                if let Err(ref e) = result {
                    error!("commit failed for {sysname}: {e:#}");
                    if let Ok(iface_ref) = object_server
                        .interface::<_, device::RatbagDevice>(device_path.as_str())
                        .await
                    {
                        let _ = device::RatbagDevice::resync(iface_ref.signal_emitter()).await;
                    }
                }

                // Whether commit succeeded or failed, every profile's
                // `IsDirty` may have changed and must be re-announced. On
                // failure, also re-announce the properties the resync
                // protocol promises clients will be fresh after re-reading.
                if let Some(paths) = profile_paths.get(&sysname) {
                    for path in paths {
                        let Ok(iface_ref) = object_server
                            .interface::<_, profile::RatbagProfile>(path.as_str())
                            .await
                        else {
                            continue;
                        };
                        let emitter = iface_ref.signal_emitter();
                        let iface = iface_ref.get().await;
                        let _ = iface.is_dirty_changed(emitter).await;
                        if result.is_err() {
                            let _ = iface.resolutions_changed(emitter).await;
                            let _ = iface.buttons_changed(emitter).await;
                            let _ = iface.leds_changed(emitter).await;
                            let _ = iface.is_active_changed(emitter).await;
                        }
                    }
                }
                continue;
            }
            LoopEvent::Poll => {
                for (sysname, handle) in actor_handles.iter() {
                    match handle.refresh_active_resolution().await {
                        Ok(true) => {
                            let Some(paths) = profile_paths.get(sysname) else {
                                continue;
                            };
                            let object_server = conn.object_server();
                            for path in paths {
                                let Ok(iface_ref) = object_server
                                    .interface::<_, profile::RatbagProfile>(path.as_str())
                                    .await
                                else {
                                    continue;
                                };
                                let emitter = iface_ref.signal_emitter();
                                let iface = iface_ref.get().await;
                                let _ = iface.resolutions_changed(emitter).await;
                                let _ = iface.is_active_changed(emitter).await;
                            }
                        }
                        Ok(false) => {}
                        Err(e) => warn!("active-resolution poll failed for {sysname}: {e:#}"),
                    }
                }
                continue;
            }
        };

        match action {
            DeviceAction::Add {
                sysname,
                devnode,
                name,
                bustype,
                vid,
                pid,
            } => {
                let key = (BusType::from_u16(bustype), vid, pid);

                let entry = match device_db.get(&key) {
                    Some(e) => e,
                    None => {
                        info!(
                            "Ignoring unsupported device {} ({:04x}:{:04x})",
                            sysname, vid, pid
                        );
                        continue;
                    }
                };

                info!(
                    "Matched device: {} -> {} (driver: {})",
                    sysname, entry.name, entry.driver
                );

                let device_info =
                    DeviceInfo::from_entry(&sysname, &name, bustype, vid, pid, entry);
                let device_path = crate::path::device_path(&sysname);

                // Wrap DeviceInfo in Arc<RwLock> so actor and DBus share state.
                let shared_info = Arc::new(RwLock::new(device_info));

                // Try to create and spawn the hardware driver actor.
                let actor_handle = match driver::create_driver(&entry.driver) {
                    Some(drv) => {
                        match actor::spawn_device_actor(
                            &devnode,
                            drv,
                            Arc::clone(&shared_info),
                        )
                        .await
                        {
                            Ok(handle) => {
                                info!(
                                    "Driver {} active for {}",
                                    entry.driver, sysname
                                );
                                Some(handle)
                            }
                            Err(e) => {
                                warn!(
                                    "Driver {} probe failed for {}: {e:#}",
                                    entry.driver, sysname
                                );
                                None
                            }
                        }
                    }
                    None => None,
                };

                let (object_paths, profiles) = register_device_on_dbus(
                    &conn,
                    &device_path,
                    &sysname,
                    Arc::clone(&shared_info),
                    commit_tx.clone(),
                )
                .await;
                profile_paths.insert(sysname.clone(), profiles);

                // Update the manager's device list.
                let object_server = conn.object_server();
                let iface_ref = object_server
                    .interface::<_, manager::RatbagManager>(
                        "/org/freedesktop/ratbag1",
                    )
                    .await?;
                iface_ref.get_mut().await.add_device(device_path.clone());
                iface_ref
                    .get()
                    .await
                    .devices_changed(iface_ref.signal_emitter())
                    .await?;

                if let Some(handle) = actor_handle {
                    actor_handles.insert(sysname.clone(), handle);
                }
                registered_devices.insert(sysname.clone(), object_paths);

                info!(
                    "Device {} registered at {} ({} child objects)",
                    entry.name,
                    device_path,
                    registered_devices[&sysname].len() - 1
                );
            }

            DeviceAction::Remove { sysname } => {
                remove_device(
                    &conn,
                    &sysname,
                    &mut registered_devices,
                    &mut actor_handles,
                    &mut profile_paths,
                )
                .await?;
            }

            // ----------------------------------------------------------------
            // dev-hooks only: synthetic test device injection
            // ----------------------------------------------------------------
            #[cfg(feature = "dev-hooks")]
            DeviceAction::InjectTest { sysname, device_info } => {
                let device_path = crate::path::device_path(&sysname);

                info!("InjectTest: registering '{}' at {}", sysname, device_path);

                let shared_info = Arc::new(RwLock::new(device_info));

                // Test devices have no hardware actor: Commit() still goes
                // through the scheduler, which treats an absent actor handle
                // as a local no-op success.
                let (object_paths, profiles) = register_device_on_dbus(
                    &conn,
                    &device_path,
                    &sysname,
                    Arc::clone(&shared_info),
                    commit_tx.clone(),
                )
                .await;
                profile_paths.insert(sysname.clone(), profiles);

                let object_server = conn.object_server();
                let iface_ref = object_server
                    .interface::<_, manager::RatbagManager>(
                        "/org/freedesktop/ratbag1",
                    )
                    .await?;
                iface_ref.get_mut().await.add_device(device_path.clone());
                iface_ref
                    .get()
                    .await
                    .devices_changed(iface_ref.signal_emitter())
                    .await?;

                registered_devices.insert(sysname, object_paths);
            }

            #[cfg(feature = "dev-hooks")]
            DeviceAction::RemoveTest { sysname } => {
                remove_device(
                    &conn,
                    &sysname,
                    &mut registered_devices,
                    &mut actor_handles,
                    &mut profile_paths,
                )
                .await?;
            }
        }
    }

    info!("udev monitor channel closed, shutting down");
    Ok(())
}
