use std::{future::Future, sync::Arc, time::Duration};

use futures::StreamExt;
use tokio::time::Instant;
use zbus::SignalContext;

use crate::*;

/// How long shutdown waits for status icons to be unexported.
const ICON_UNEXPORT_TIMEOUT: Duration = Duration::from_secs(2);

/// Why [`run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// No status icon monitor was around for the whole idle timeout.
    Idle,
    Interrupted,
    /// Another watcher took our name, or we never got it.
    NameLost,
}

/// Run the watcher service on `con` until it's time to exit.
///
/// The watcher is only exported (and its name claimed) once a status icon monitor shows up on
/// the bus. Resolves once `shutdown` does, the idle timeout expires, or another instance takes
/// over.
pub async fn run(con: zbus::Connection, config: WatcherConfig, shutdown: impl Future<Output = ()>) -> Result<ExitReason> {
    let config = Arc::new(config);
    let dbus = zbus::fdo::DBusProxy::new(&con).await?;
    let mut owner_changes = dbus.receive_name_owner_changed().await?;
    let unique_name = con.unique_name().map(|n| n.to_string()).unwrap_or_default();

    let registry = Registry::new();
    let mut icon_host = None;
    let mut lifecycle = Lifecycle::new(config.idle_timeout, Instant::now());
    let mut exit_reason = None;

    if presence::any_monitors(&dbus).await? {
        if let Err(reason) = transition(&con, &config, &registry, &mut icon_host, &mut lifecycle, true).await {
            exit_reason = Some(reason);
        }
    } else {
        log::info!("No status icon monitors, exiting in {:?} unless one appears", config.idle_timeout);
    }

    tokio::pin!(shutdown);
    while exit_reason.is_none() {
        tokio::select! {
            _ = &mut shutdown => {
                log::info!("Shutting down");
                exit_reason = Some(ExitReason::Interrupted);
            }
            _ = sleep_until(lifecycle.deadline()) => {
                if lifecycle.expire(Instant::now()) {
                    log::info!("No status icon monitors for {:?}, exiting", config.idle_timeout);
                    exit_reason = Some(ExitReason::Idle);
                }
            }
            signal = owner_changes.next() => {
                let Some(signal) = signal else {
                    log::warn!("NameOwnerChanged stream ended");
                    exit_reason = Some(ExitReason::Interrupted);
                    continue;
                };
                let Some(change) = presence::OwnerChange::from_signal(&signal) else {
                    continue;
                };

                if lifecycle.activated() {
                    if change.is_watcher_name_lost(&unique_name) {
                        log::warn!("Lost {} to {:?}, exiting", names::WATCHER_BUS, change.new_owner);
                        exit_reason = Some(ExitReason::NameLost);
                        continue;
                    }
                    if change.is_loss() {
                        let ctxt = SignalContext::new(&con, names::WATCHER_OBJECT)?;
                        if let Err(e) = Watcher::owner_lost(&ctxt, &registry, &change.name).await {
                            log::error!("failed to signal Watcher: {}", e);
                        }
                    }
                }

                if change.is_monitor() {
                    let present = if change.is_monitor_appearance() {
                        true
                    } else {
                        match presence::any_monitors(&dbus).await {
                            Ok(present) => present,
                            Err(e) => {
                                log::warn!("Could not list bus names: {}", e);
                                continue;
                            }
                        }
                    };
                    if let Err(reason) = transition(&con, &config, &registry, &mut icon_host, &mut lifecycle, present).await {
                        exit_reason = Some(reason);
                    }
                }
            }
        }
    }

    lifecycle.terminate();
    drop(owner_changes);
    registry.clear().await;
    if let Some(icon_host) = icon_host {
        // an item registering during shutdown can keep its icon alive until the watcher is gone
        if tokio::time::timeout(ICON_UNEXPORT_TIMEOUT, icon_host.wait_for_icons()).await.is_err() {
            log::warn!("status icons still exported after {:?}", ICON_UNEXPORT_TIMEOUT);
        }
    }
    if lifecycle.activated() {
        if let Err(e) = Watcher::detach_from(&con).await {
            log::warn!("failed to unexport the watcher: {}", e);
        }
    }
    drop(con);

    Ok(exit_reason.unwrap_or(ExitReason::Interrupted))
}

/// Apply a change in monitor presence. Fails with the reason to exit if the watcher couldn't be
/// brought up.
async fn transition(
    con: &zbus::Connection,
    config: &Arc<WatcherConfig>,
    registry: &Arc<Registry>,
    icon_host: &mut Option<Arc<XAppIconHost>>,
    lifecycle: &mut Lifecycle,
    present: bool,
) -> std::result::Result<(), ExitReason> {
    match lifecycle.monitors_changed(present, Instant::now()) {
        Transition::Activate => {
            log::info!("Status icon monitor present, starting {}", names::WATCHER_BUS);
            let host = Arc::new(XAppIconHost::new(con.clone(), config.fallback_icon_size));
            *icon_host = Some(host.clone());
            let ctx = ItemContext { host, config: config.clone() };
            match Watcher::new(registry.clone(), ctx).attach_to(con).await {
                Ok(()) => Ok(()),
                Err(e) => {
                    log::warn!("{}, exiting", e);
                    Err(ExitReason::NameLost)
                }
            }
        }
        Transition::CountdownCancelled => {
            log::info!("Status icon monitor is back, staying around");
            Ok(())
        }
        Transition::CountdownArmed => {
            log::info!("Last status icon monitor left, exiting in {:?} unless one appears", config.idle_timeout);
            Ok(())
        }
        Transition::Nothing => Ok(()),
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
