use std::{
    collections::HashMap,
    future::Future,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Weak,
    },
};

use crate::*;

/// Outcome of a successful [`Registry::register`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Added,
    AlreadyRegistered,
}

/// An item removed from the registry, either because its owner left the bus or because it
/// could not be set up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evicted {
    pub key: String,
    /// The string the item registered itself with.
    pub service: String,
}

struct TrackedItem {
    id: u64,
    owner: String,
    service: String,
    task: tokio::task::JoinHandle<()>,
}

impl Drop for TrackedItem {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// All registered items, keyed by `{owner}{object path}`.
#[derive(Default)]
pub struct Registry {
    // tokio's mutex, since registration holds it while the item's proxy is being built. That is
    // what keeps two racing registrations of the same key from both creating an item.
    items: tokio::sync::Mutex<HashMap<String, TrackedItem>>,
    next_id: AtomicU64,
}

impl Registry {
    pub fn new() -> Arc<Registry> {
        Default::default()
    }

    /// Register the item at `address` unless its key is already known.
    ///
    /// `spawn` is only called for new keys; it gets the [`Liveness`] of the new item and
    /// returns the task driving it. If it fails, nothing is registered and the error is handed
    /// back.
    pub async fn register<F, Fut, E>(
        self: &Arc<Self>,
        address: &ItemAddress,
        service: &str,
        spawn: F,
    ) -> std::result::Result<Registration, E>
    where
        F: FnOnce(Liveness) -> Fut,
        Fut: Future<Output = std::result::Result<tokio::task::JoinHandle<()>, E>>,
    {
        let key = address.key();
        let mut items = self.items.lock().await;
        if items.contains_key(&key) {
            return Ok(Registration::AlreadyRegistered);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let liveness = Liveness { registry: Arc::downgrade(self), key: key.clone(), id };
        let task = spawn(liveness).await?;

        items.insert(key, TrackedItem { id, owner: address.owner.clone(), service: service.to_owned(), task });
        Ok(Registration::Added)
    }

    /// Remove every item owned by `owner`, stopping their adapters.
    pub async fn evict_owner(&self, owner: &str) -> Vec<Evicted> {
        let removed: Vec<(String, TrackedItem)> = {
            let mut items = self.items.lock().await;
            let keys: Vec<String> = items.iter().filter(|(_, item)| item.owner == owner).map(|(k, _)| k.clone()).collect();
            keys.into_iter().filter_map(|k| items.remove_entry(&k)).collect()
        };

        removed
            .into_iter()
            .map(|(key, item)| {
                log::info!("gone item: {}", key);
                Evicted { key, service: item.service.clone() }
            })
            .collect()
    }

    /// The registered keys, sorted.
    pub async fn keys(&self) -> Vec<String> {
        let items = self.items.lock().await;
        let mut keys: Vec<String> = items.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub async fn len(&self) -> usize {
        self.items.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drop all items, waiting until each adapter has been torn down.
    pub async fn clear(&self) {
        let items: Vec<TrackedItem> = self.items.lock().await.drain().map(|(_, item)| item).collect();
        for mut item in items {
            item.task.abort();
            // a cancelled task has dropped its adapter by the time its handle resolves
            let _ = (&mut item.task).await;
        }
    }

    async fn is_live(&self, key: &str, id: u64) -> bool {
        self.items.lock().await.get(key).is_some_and(|item| item.id == id)
    }

    async fn remove_if_current(&self, key: &str, id: u64) -> Option<TrackedItem> {
        let mut items = self.items.lock().await;
        if items.get(key).is_some_and(|item| item.id == id) {
            items.remove(key)
        } else {
            None
        }
    }
}

/// Lets an item's task find out whether it is still the registered item for its key.
#[derive(Debug, Clone)]
pub struct Liveness {
    registry: Weak<Registry>,
    key: String,
    id: u64,
}

impl Liveness {
    /// Identifier of the item, unique for the lifetime of the registry.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub async fn is_live(&self) -> bool {
        match self.registry.upgrade() {
            Some(registry) => registry.is_live(&self.key, self.id).await,
            None => false,
        }
    }

    /// Unregister the item, if it is still the current one for its key.
    ///
    /// This aborts the item's task. When called from that task, it must not await anything
    /// after this returns.
    pub async fn abandon(&self) -> Option<Evicted> {
        let registry = self.registry.upgrade()?;
        let item = registry.remove_if_current(&self.key, self.id).await?;
        log::info!("gone item: {} (setup failed)", self.key);
        Some(Evicted { key: self.key.clone(), service: item.service.clone() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    fn address(owner: &str, path: &str) -> ItemAddress {
        ItemAddress { owner: owner.to_string(), path: path.to_string() }
    }

    async fn idle_task(_: Liveness) -> std::result::Result<tokio::task::JoinHandle<()>, Error> {
        Ok(tokio::spawn(std::future::pending()))
    }

    #[tokio::test]
    async fn test_register_twice_adds_once() {
        let registry = Registry::new();
        let addr = address(":1.5", "/StatusNotifierItem");

        let spawned = Arc::new(Mutex::new(0));
        for _ in 0..2 {
            let spawned = spawned.clone();
            let result = registry
                .register(&addr, ":1.5", |l| {
                    *spawned.lock().unwrap() += 1;
                    idle_task(l)
                })
                .await;
            assert!(result.is_ok());
        }

        assert_eq!(*spawned.lock().unwrap(), 1);
        assert_eq!(registry.keys().await, vec![":1.5/StatusNotifierItem".to_string()]);
    }

    #[tokio::test]
    async fn test_racing_registrations() {
        let registry = Registry::new();
        let addr = address(":1.5", "/StatusNotifierItem");

        let slow = |l| async move {
            tokio::task::yield_now().await;
            idle_task(l).await
        };
        let (a, b) = tokio::join!(registry.register(&addr, ":1.5", slow), registry.register(&addr, ":1.5", slow));

        let mut outcomes = vec![a.unwrap(), b.unwrap()];
        outcomes.sort_by_key(|r| *r == Registration::AlreadyRegistered);
        assert_eq!(outcomes, vec![Registration::Added, Registration::AlreadyRegistered]);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_failed_spawn_registers_nothing() {
        let registry = Registry::new();
        let addr = address(":1.5", "/StatusNotifierItem");

        let result = registry
            .register(&addr, ":1.5", |_| async {
                Err::<tokio::task::JoinHandle<()>, _>(Error::DbusError(zbus::Error::InvalidField))
            })
            .await;

        assert!(result.is_err());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_evict_owner_keeps_unrelated_items() {
        let registry = Registry::new();
        registry.register(&address(":1.5", "/StatusNotifierItem"), ":1.5", idle_task).await.unwrap();
        registry.register(&address(":1.5", "/org/ayatana/NotificationItem/a"), "/org/ayatana/NotificationItem/a", idle_task).await.unwrap();
        registry.register(&address(":1.50", "/StatusNotifierItem"), ":1.50", idle_task).await.unwrap();

        let mut evicted = registry.evict_owner(":1.5").await;
        evicted.sort_by(|a, b| a.key.cmp(&b.key));

        assert_eq!(
            evicted,
            vec![
                Evicted { key: ":1.5/StatusNotifierItem".to_string(), service: ":1.5".to_string() },
                Evicted {
                    key: ":1.5/org/ayatana/NotificationItem/a".to_string(),
                    service: "/org/ayatana/NotificationItem/a".to_string()
                },
            ]
        );
        assert_eq!(registry.keys().await, vec![":1.50/StatusNotifierItem".to_string()]);
        assert!(registry.evict_owner(":1.99").await.is_empty());
    }

    #[tokio::test]
    async fn test_liveness_follows_registration() {
        let registry = Registry::new();
        let addr = address("org.example.Tray", "/StatusNotifierItem");

        let captured = Arc::new(Mutex::new(None));
        let captured_clone = captured.clone();
        registry
            .register(&addr, "org.example.Tray", move |l| {
                *captured_clone.lock().unwrap() = Some(l.clone());
                idle_task(l)
            })
            .await
            .unwrap();
        let liveness = captured.lock().unwrap().clone().unwrap();
        assert!(liveness.is_live().await);

        registry.evict_owner("org.example.Tray").await;
        assert!(!liveness.is_live().await);

        // a new registration under the same key doesn't revive the old item
        registry.register(&addr, "org.example.Tray", idle_task).await.unwrap();
        assert!(!liveness.is_live().await);
    }

    #[tokio::test]
    async fn test_abandon_only_removes_own_registration() {
        let registry = Registry::new();
        let addr = address(":1.5", "/org/ayatana/NotificationItem/a");

        let captured = Arc::new(Mutex::new(None));
        let captured_clone = captured.clone();
        registry
            .register(&addr, "/org/ayatana/NotificationItem/a", move |l| {
                *captured_clone.lock().unwrap() = Some(l.clone());
                idle_task(l)
            })
            .await
            .unwrap();
        let liveness = captured.lock().unwrap().clone().unwrap();

        assert_eq!(
            liveness.abandon().await,
            Some(Evicted {
                key: ":1.5/org/ayatana/NotificationItem/a".to_string(),
                service: "/org/ayatana/NotificationItem/a".to_string()
            })
        );
        assert!(registry.is_empty().await);
        assert_eq!(liveness.abandon().await, None);

        // a later registration under the same key is left alone
        registry.register(&addr, "/org/ayatana/NotificationItem/a", idle_task).await.unwrap();
        assert_eq!(liveness.abandon().await, None);
        assert_eq!(registry.keys().await, vec![":1.5/org/ayatana/NotificationItem/a".to_string()]);
    }

    #[tokio::test]
    async fn test_abandon_from_own_task() {
        let registry = Registry::new();
        let (tx, rx) = tokio::sync::oneshot::channel();
        registry
            .register(&address(":1.5", "/StatusNotifierItem"), ":1.5", move |l| async move {
                Ok::<_, Error>(tokio::spawn(async move {
                    tokio::task::yield_now().await;
                    let evicted = l.abandon().await;
                    let _ = tx.send(evicted);
                }))
            })
            .await
            .unwrap();

        let evicted = rx.await.unwrap();
        assert_eq!(evicted.map(|e| e.service), Some(":1.5".to_string()));
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_clear_stops_adapters() {
        struct SetOnDrop(Arc<Mutex<bool>>);
        impl Drop for SetOnDrop {
            fn drop(&mut self) {
                *self.0.lock().unwrap() = true;
            }
        }

        let registry = Registry::new();
        let torn_down = Arc::new(Mutex::new(false));
        let flag = SetOnDrop(torn_down.clone());
        registry
            .register(&address(":1.5", "/StatusNotifierItem"), ":1.5", move |_| async move {
                Ok::<_, Error>(tokio::spawn(async move {
                    let _flag = flag;
                    std::future::pending::<()>().await
                }))
            })
            .await
            .unwrap();

        registry.clear().await;
        assert!(*torn_down.lock().unwrap());
        assert!(registry.is_empty().await);
    }
}
