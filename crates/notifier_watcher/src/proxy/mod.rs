//! Proxies for DBus services, so we can call them.
//!
//! The item proxy only declares the methods we forward user interaction to. Properties are read
//! through `org.freedesktop.DBus.Properties` directly (see [`crate::RemoteProperties`]), since
//! plenty of items don't keep their property cache or signal arguments consistent.
//!
//! For more information, see ["Writing a client proxy" in the zbus
//! tutorial](https://dbus2.github.io/zbus/).

mod dbus_status_notifier_item;
pub use dbus_status_notifier_item::*;
