use std::{path::PathBuf, time::Duration};

use clap::Parser;
use notifier_watcher::WatcherConfig;

/// Struct that gets generated from `RawOpt`.
#[derive(Debug, PartialEq)]
pub struct Opt {
    pub log_debug: bool,
    pub idle_timeout: Option<Duration>,
    pub property_timeout: Option<Duration>,
    pub icon_dir: Option<PathBuf>,
}

#[derive(Parser, Debug, PartialEq)]
#[command(name = "snwatcher", version, about = "StatusNotifierWatcher for status icon monitors", long_about = None)]
struct RawOpt {
    /// Write out debug logs.
    #[arg(long = "debug")]
    log_debug: bool,

    /// Seconds to keep running after the last status icon monitor left.
    #[arg(long, value_name = "SECS")]
    idle_timeout: Option<u64>,

    /// Seconds to wait for a tray item to answer a property request.
    #[arg(long, value_name = "SECS")]
    property_timeout: Option<u64>,

    /// Directory to write the PNG renditions of pixmap icons to.
    #[arg(long, value_name = "PATH")]
    icon_dir: Option<PathBuf>,
}

impl Opt {
    pub fn from_env() -> Self {
        RawOpt::parse().into()
    }

    /// The default configuration with the given flags applied.
    pub fn watcher_config(&self) -> WatcherConfig {
        let defaults = WatcherConfig::default();
        WatcherConfig {
            idle_timeout: self.idle_timeout.unwrap_or(defaults.idle_timeout),
            property_timeout: self.property_timeout.unwrap_or(defaults.property_timeout),
            icon_dir: self.icon_dir.clone().unwrap_or(defaults.icon_dir),
            ..defaults
        }
    }
}

impl From<RawOpt> for Opt {
    fn from(other: RawOpt) -> Self {
        let RawOpt { log_debug, idle_timeout, property_timeout, icon_dir } = other;
        Opt {
            log_debug,
            idle_timeout: idle_timeout.map(Duration::from_secs),
            property_timeout: property_timeout.map(Duration::from_secs),
            icon_dir,
        }
    }
}
