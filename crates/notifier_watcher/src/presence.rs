//! Tracking who is on the bus: status icon monitors, item owners, and the owner of our own name.

use zbus::{
    fdo::{DBusProxy, NameOwnerChanged},
    names::UniqueName,
};

use crate::*;

/// Whether any status icon monitor currently owns a name on the bus.
pub async fn any_monitors(dbus: &DBusProxy<'_>) -> zbus::fdo::Result<bool> {
    let names = dbus.list_names().await?;
    Ok(names.iter().any(|name| names::is_monitor_name(name.as_str())))
}

/// A decoded `NameOwnerChanged` broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerChange {
    pub name: String,
    pub old_owner: Option<String>,
    pub new_owner: Option<String>,
}

impl OwnerChange {
    /// Decode the signal; malformed ones are `None`.
    pub fn from_signal(signal: &NameOwnerChanged) -> Option<OwnerChange> {
        let args = match signal.args() {
            Ok(args) => args,
            Err(e) => {
                log::debug!("ignoring malformed NameOwnerChanged: {}", e);
                return None;
            }
        };
        let old_owner: &Option<UniqueName<'_>> = args.old_owner();
        let new_owner: &Option<UniqueName<'_>> = args.new_owner();
        Some(OwnerChange {
            name: args.name().to_string(),
            old_owner: old_owner.as_ref().map(|o| o.to_string()),
            new_owner: new_owner.as_ref().map(|o| o.to_string()),
        })
    }

    /// The name has no owner anymore.
    pub fn is_loss(&self) -> bool {
        self.new_owner.is_none()
    }

    pub fn is_monitor(&self) -> bool {
        names::is_monitor_name(&self.name)
    }

    /// A monitor name got an owner.
    pub fn is_monitor_appearance(&self) -> bool {
        self.is_monitor() && self.new_owner.is_some()
    }

    /// We (`unique_name`) owned the watcher name and don't anymore, because it was released or
    /// taken over by another instance.
    pub fn is_watcher_name_lost(&self, unique_name: &str) -> bool {
        self.name == names::WATCHER_BUS
            && self.old_owner.as_deref() == Some(unique_name)
            && self.new_owner.as_deref() != Some(unique_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change(name: &str, old_owner: &str, new_owner: &str) -> OwnerChange {
        let owner = |s: &str| if s.is_empty() { None } else { Some(s.to_string()) };
        OwnerChange { name: name.to_string(), old_owner: owner(old_owner), new_owner: owner(new_owner) }
    }

    #[test]
    fn test_monitor_changes() {
        let appeared = change("org.x.StatusIconMonitor.cinnamon_0", "", ":1.30");
        assert!(appeared.is_monitor_appearance());
        assert!(!appeared.is_loss());

        let gone = change("org.x.StatusIconMonitor.cinnamon_0", ":1.30", "");
        assert!(gone.is_monitor());
        assert!(!gone.is_monitor_appearance());
        assert!(gone.is_loss());

        assert!(!change(":1.30", ":1.30", "").is_monitor());
    }

    #[test]
    fn test_watcher_name_lost() {
        let ours = ":1.4";
        assert!(change(names::WATCHER_BUS, ours, ":1.77").is_watcher_name_lost(ours));
        assert!(change(names::WATCHER_BUS, ours, "").is_watcher_name_lost(ours));
        // us taking the name over
        assert!(!change(names::WATCHER_BUS, ":1.77", ours).is_watcher_name_lost(ours));
        assert!(!change(names::WATCHER_BUS, "", ours).is_watcher_name_lost(ours));
        assert!(!change("org.example.Other", ours, "").is_watcher_name_lost(ours));
    }
}
