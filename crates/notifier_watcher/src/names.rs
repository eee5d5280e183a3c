//! Well-known bus names, object paths and interfaces used by the watcher.

/// Well-known name the watcher tries to own while it is active.
pub const WATCHER_BUS: &str = "org.kde.StatusNotifierWatcher";
/// Object path the watcher interface is exported at.
pub const WATCHER_OBJECT: &str = "/StatusNotifierWatcher";

/// Interface implemented by tray items.
pub const ITEM_INTERFACE: &str = "org.kde.StatusNotifierItem";
/// Object path assumed when an item registers with just a bus name.
pub const ITEM_OBJECT: &str = "/StatusNotifierItem";

/// Items exported below this path speak the libappindicator flavour of the protocol.
pub const APPINDICATOR_PATH_PREFIX: &str = "/org/ayatana/NotificationItem/";

/// Namespace that status icon monitors (the applets displaying our icons) own names in.
pub const MONITOR_NAMESPACE: &str = "org.x.StatusIconMonitor";

/// Prefix of the names each exported status icon owns.
pub const STATUS_ICON_BUS_PREFIX: &str = "org.x.StatusIcon";
/// Prefix of the object paths status icons are exported at.
pub const STATUS_ICON_OBJECT_PREFIX: &str = "/org/x/StatusIcon/Icon";

/// Whether `name` is [`MONITOR_NAMESPACE`] itself or a name below it.
pub fn is_monitor_name(name: &str) -> bool {
    match name.strip_prefix(MONITOR_NAMESPACE) {
        Some(rest) => rest.is_empty() || rest.starts_with('.'),
        None => false,
    }
}
