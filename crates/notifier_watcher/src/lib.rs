//! The `org.kde.StatusNotifierWatcher` side of the [StatusNotifierItem
//! specification](https://freedesktop.org/wiki/Specifications/StatusNotifierItem/).
//!
//! Applications register their tray items with the [`Watcher`]. Each item gets an
//! [`ItemAdapter`] that follows the item's properties and signals and mirrors its state onto a
//! [`StatusIcon`], created by an [`IconHost`]. The service itself, including deciding when to
//! run at all, is [`run`].

pub mod names;
pub mod presence;
pub mod proxy;

mod config;
pub use config::*;

mod error;
pub use error::*;

mod host;
pub use host::*;

mod icon;
pub use icon::*;

mod item;
pub use item::*;

mod lifecycle;
pub use lifecycle::*;

mod properties;
pub use properties::*;

mod registry;
pub use registry::*;

mod service;
pub use service::*;

mod status_icon;
pub use status_icon::*;

mod watcher;
pub use watcher::*;

#[cfg(test)]
mod test_util;
