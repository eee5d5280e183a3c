use std::{collections::HashMap, fmt, sync::Arc};

use zbus::{interface, message::Header, Interface, SignalContext};

use crate::*;

/// Where a registered item lives: the bus name that owns it and the object path within that
/// connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ItemAddress {
    pub owner: String,
    pub path: String,
}

impl ItemAddress {
    /// Work out the address of an item from the string it registered with.
    ///
    /// The freedesktop.org specification has this be just the bus name, however some items
    /// (notably libappindicator ones) send their object path instead, in which case the owner
    /// is whoever sent the registration.
    pub fn derive(service: &str, sender: Option<&str>) -> Result<ItemAddress> {
        let invalid = |reason: String| Error::InvalidService { service: service.to_string(), reason };

        let (owner, path) = if service.starts_with('/') {
            // they sent us just the object path
            match sender {
                Some(sender) => (sender, service),
                None => return Err(invalid("unknown sender".to_string())),
            }
        } else {
            (service, names::ITEM_OBJECT)
        };

        zbus::names::BusName::try_from(owner).map_err(|e| invalid(e.to_string()))?;
        zbus::zvariant::ObjectPath::try_from(path).map_err(|e| invalid(e.to_string()))?;

        Ok(ItemAddress { owner: owner.to_string(), path: path.to_string() })
    }

    /// The registry key of this item.
    pub fn key(&self) -> String {
        format!("{}{}", self.owner, self.path)
    }

    pub fn is_appindicator(&self) -> bool {
        self.path.starts_with(names::APPINDICATOR_PATH_PREFIX)
    }
}

impl fmt::Display for ItemAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.owner, self.path)
    }
}

/// An instance of [`org.kde.StatusNotifierWatcher`]. Every item that registers gets an
/// [`ItemAdapter`] which keeps its status icon up to date.
///
/// [`org.kde.StatusNotifierWatcher`]: https://freedesktop.org/wiki/Specifications/StatusNotifierItem/StatusNotifierWatcher/
pub struct Watcher {
    registry: Arc<Registry>,
    ctx: ItemContext,
}

/// Implementation of the `StatusNotifierWatcher` service.
///
/// Methods and properties correspond to methods and properties on the DBus service that can be
/// used by others, while signals are events that we generate that other services listen to.
#[interface(name = "org.kde.StatusNotifierWatcher")]
impl Watcher {
    /// RegisterStatusNotifierHost method
    ///
    /// Hosts don't keep us alive, status icon monitors do, so there is nothing to track here.
    async fn register_status_notifier_host(
        &self,
        service: &str,
        #[zbus(header)] hdr: Header<'_>,
    ) -> zbus::fdo::Result<()> {
        log::debug!("host registered: {} (from {:?})", service, hdr.sender());
        Ok(())
    }

    /// IsStatusNotifierHostRegistered property
    #[zbus(property)]
    async fn is_status_notifier_host_registered(&self) -> bool {
        // we are only exported while some monitor is around to show the items
        true
    }

    // ------------------------------------------------------------------------

    /// RegisterStatusNotifierItem method
    async fn register_status_notifier_item(
        &self,
        service: &str,
        #[zbus(header)] hdr: Header<'_>,
        #[zbus(connection)] con: &zbus::Connection,
        #[zbus(signal_context)] ctxt: SignalContext<'_>,
    ) -> zbus::fdo::Result<()> {
        let address = match ItemAddress::derive(service, hdr.sender().map(|s| s.as_str())) {
            Ok(address) => address,
            Err(e) => {
                log::warn!("rejecting item: {}", e);
                return Err(e.into());
            }
        };

        let registration = self
            .registry
            .register(&address, service, |liveness| {
                let address = address.clone();
                let ctx = self.ctx.clone();
                async move {
                    let sni = item_proxy(con, &address).await?;
                    Ok::<_, Error>(spawn_item(sni, address, liveness, ctx))
                }
            })
            .await;

        match registration {
            Ok(Registration::AlreadyRegistered) => {
                log::info!("new item: {} (duplicate)", address);
                Ok(())
            }
            Ok(Registration::Added) => {
                log::info!("new item: {}", address);
                self.registered_status_notifier_items_changed(&ctxt).await?;
                Watcher::status_notifier_item_registered(&ctxt, service).await?;
                Ok(())
            }
            Err(e) => {
                log::warn!("could not register {}: {}", address, e);
                Err(e.into())
            }
        }
    }

    /// StatusNotifierItemRegistered signal
    #[zbus(signal)]
    async fn status_notifier_item_registered(ctxt: &SignalContext<'_>, service: &str) -> zbus::Result<()>;

    /// StatusNotifierItemUnregistered signal
    #[zbus(signal)]
    async fn status_notifier_item_unregistered(ctxt: &SignalContext<'_>, service: &str) -> zbus::Result<()>;

    /// RegisteredStatusNotifierItems property
    #[zbus(property)]
    async fn registered_status_notifier_items(&self) -> Vec<String> {
        self.registry.keys().await
    }

    // ------------------------------------------------------------------------

    /// ProtocolVersion property
    #[zbus(property)]
    fn protocol_version(&self) -> i32 {
        0
    }
}

impl Watcher {
    pub fn new(registry: Arc<Registry>, ctx: ItemContext) -> Watcher {
        Watcher { registry, ctx }
    }

    /// Export the Watcher on `con` and take over [`names::WATCHER_BUS`].
    ///
    /// An existing watcher gets replaced if it lets us. If the name can't be had, the object is
    /// unexported again and [`Error::NameNotAcquired`] returned.
    pub async fn attach_to(self, con: &zbus::Connection) -> Result<()> {
        if !con.object_server().at(names::WATCHER_OBJECT, self).await? {
            return Err(zbus::Error::Failure(format!(
                "Object already exists at {} on this connection -- is StatusNotifierWatcher already running?",
                names::WATCHER_OBJECT
            ))
            .into());
        }

        let flags = [
            zbus::fdo::RequestNameFlags::ReplaceExisting,
            zbus::fdo::RequestNameFlags::AllowReplacement,
            zbus::fdo::RequestNameFlags::DoNotQueue,
        ];
        let acquired = match con.request_name_with_flags(names::WATCHER_BUS, flags.into_iter().collect()).await {
            Ok(zbus::fdo::RequestNameReply::PrimaryOwner | zbus::fdo::RequestNameReply::AlreadyOwner) => Ok(()),
            Ok(_) | Err(zbus::Error::NameTaken) => Err(Error::NameNotAcquired(names::WATCHER_BUS.to_string())),
            Err(e) => Err(e.into()),
        };

        if acquired.is_err() {
            con.object_server().remove::<Watcher, _>(names::WATCHER_OBJECT).await?;
        }
        acquired
    }

    /// Release [`names::WATCHER_BUS`], then unexport the Watcher.
    pub async fn detach_from(con: &zbus::Connection) -> Result<()> {
        if let Err(e) = con.release_name(names::WATCHER_BUS).await {
            log::debug!("failed to release {}: {}", names::WATCHER_BUS, e);
        }
        con.object_server().remove::<Watcher, _>(names::WATCHER_OBJECT).await?;
        Ok(())
    }

    /// Evict all items owned by `owner`, which just left the bus, and tell everyone about it.
    pub async fn owner_lost(ctxt: &SignalContext<'_>, registry: &Registry, owner: &str) -> zbus::Result<()> {
        let evicted = registry.evict_owner(owner).await;
        Watcher::announce_evicted(ctxt, &evicted).await
    }

    /// Tell everyone that the `evicted` items are gone.
    pub async fn announce_evicted(ctxt: &SignalContext<'_>, evicted: &[Evicted]) -> zbus::Result<()> {
        if evicted.is_empty() {
            return Ok(());
        }

        Watcher::registered_status_notifier_items_refresh(ctxt).await?;
        for item in evicted {
            Watcher::status_notifier_item_unregistered(ctxt, &item.service).await?;
        }
        Ok(())
    }

    /// Equivalent to `registered_status_notifier_items_invalidate`, but without requiring `self`.
    async fn registered_status_notifier_items_refresh(ctxt: &SignalContext<'_>) -> zbus::Result<()> {
        zbus::fdo::Properties::properties_changed(ctxt, Self::name(), &HashMap::new(), &["RegisteredStatusNotifierItems"])
            .await
    }
}
