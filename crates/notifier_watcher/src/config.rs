use std::{path::PathBuf, time::Duration};

use smart_default::SmartDefault;

/// Tunables of the watcher service.
#[derive(Debug, Clone, SmartDefault)]
pub struct WatcherConfig {
    /// How long the service stays around once the last status icon monitor left the bus.
    #[default(Duration::from_secs(30))]
    pub idle_timeout: Duration,

    /// Upper bound of a single property round-trip to a tray item.
    #[default(Duration::from_secs(5))]
    pub property_timeout: Duration,

    /// Directory the PNG renditions of pixmap icons are written to.
    #[default(std::env::temp_dir())]
    pub icon_dir: PathBuf,

    /// Icon size assumed while a monitor hasn't told us its preferred size.
    #[default(24)]
    pub fallback_icon_size: i32,
}
