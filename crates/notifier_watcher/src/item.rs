use crate::*;

use futures::StreamExt;

/// Recognised values of [`org.freedesktop.StatusNotifierItem.Status`].
///
/// [`org.freedesktop.StatusNotifierItem.Status`]: https://www.freedesktop.org/wiki/Specifications/StatusNotifierItem/StatusNotifierItem/#org.freedesktop.statusnotifieritem.status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// The item doesn't convey important information to the user, it can be considered an "idle"
    /// status and is likely that visualizations will chose to hide it.
    Passive,
    /// The item is active, is more important that the item will be shown in some way to the user.
    Active,
    /// The item carries really important information for the user, such as battery charge running
    /// out and is wants to incentive the direct user intervention. Visualizations should emphasize
    /// in some way the items with NeedsAttention status.
    NeedsAttention,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct ParseStatusError;

impl std::str::FromStr for Status {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> std::result::Result<Self, ParseStatusError> {
        match s {
            "Passive" => Ok(Status::Passive),
            "Active" => Ok(Status::Active),
            "NeedsAttention" => Ok(Status::NeedsAttention),
            _ => Err(ParseStatusError),
        }
    }
}

impl Status {
    /// Interpret the `Status` property. Missing and unknown values count as [`Status::Active`].
    pub fn from_property(value: Option<&str>) -> Status {
        value.and_then(|s| s.parse().ok()).unwrap_or(Status::Active)
    }

    pub fn is_visible(self) -> bool {
        self != Status::Passive
    }
}

/// Signals of `org.kde.StatusNotifierItem` the adapter reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::EnumString)]
pub enum ItemSignal {
    NewIcon,
    NewAttentionIcon,
    NewOverlayIcon,
    NewStatus,
    NewMenu,
    NewToolTip,
    XAyatanaNewLabel,
}

impl ItemSignal {
    /// Map a signal member name; anything we don't care about is `None`.
    pub fn from_member(member: &str) -> Option<ItemSignal> {
        member.parse().ok()
    }
}

/// Keeps the [`StatusIcon`] of one registered item in sync with the item's properties.
pub struct ItemAdapter<P> {
    id: String,
    owner: String,
    properties: P,
    icon: Box<dyn StatusIcon>,
    /// libappindicator items have a label instead of a tooltip.
    is_appindicator: bool,

    status: Status,
    representation: IconRepresentation,
    menu: Option<MenuBinding>,
    tooltip: String,
    pixmap_files: PixmapFiles,
}

impl<P: PropertySource> ItemAdapter<P> {
    pub fn new(
        address: &ItemAddress,
        properties: P,
        icon: Box<dyn StatusIcon>,
        pixmap_files: PixmapFiles,
    ) -> Self {
        Self {
            id: address.key(),
            owner: address.owner.clone(),
            properties,
            icon,
            is_appindicator: address.is_appindicator(),
            status: Status::Passive,
            representation: IconRepresentation::Missing,
            menu: None,
            tooltip: String::new(),
            pixmap_files,
        }
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn representation(&self) -> &IconRepresentation {
        &self.representation
    }

    pub fn menu(&self) -> Option<&MenuBinding> {
        self.menu.as_ref()
    }

    pub fn tooltip(&self) -> &str {
        &self.tooltip
    }

    /// Resolve everything from scratch. The icon goes last since it depends on the status.
    pub async fn initialize(&mut self) {
        self.refresh_status().await;
        self.update_menu().await;
        self.update_tooltip().await;
        self.update_icon().await;
    }

    pub async fn handle_signal(&mut self, signal: ItemSignal) {
        log::debug!("{}: {:?}", self.id, signal);
        match signal {
            ItemSignal::NewIcon | ItemSignal::NewAttentionIcon | ItemSignal::NewOverlayIcon => self.update_icon().await,
            ItemSignal::NewStatus => self.update_status().await,
            ItemSignal::NewMenu => self.update_menu().await,
            ItemSignal::NewToolTip | ItemSignal::XAyatanaNewLabel => self.update_tooltip().await,
        }
    }

    /// Re-read the status, and the icon too if the status actually changed.
    pub async fn update_status(&mut self) {
        if self.refresh_status().await {
            self.update_icon().await;
        }
    }

    /// Returns whether the status changed.
    async fn refresh_status(&mut self) -> bool {
        let status = self.properties.text(ItemProperty::Status).await;
        let status = Status::from_property(status.as_deref());
        self.icon.set_visible(status.is_visible());

        let old_status = std::mem::replace(&mut self.status, status);
        old_status != status
    }

    pub async fn update_icon(&mut self) {
        let mut props = IconProperties {
            theme_path: self.properties.text(ItemProperty::IconThemePath).await,
            icon_name: self.properties.text(ItemProperty::IconName).await,
            attention_icon_name: self.properties.text(ItemProperty::AttentionIconName).await,
            overlay_icon_name: self.properties.text(ItemProperty::OverlayIconName).await,
            ..Default::default()
        };

        // only fetch the pixmap that is going to be used, these can be large
        if !props.has_names() {
            match self.status {
                Status::Active => props.icon_pixmap = self.properties.pixmaps(ItemProperty::IconPixmap).await,
                Status::NeedsAttention => {
                    props.attention_icon_pixmap = self.properties.pixmaps(ItemProperty::AttentionIconPixmap).await;
                    if props.attention_icon_pixmap.is_none() {
                        props.icon_pixmap = self.properties.pixmaps(ItemProperty::IconPixmap).await;
                    }
                }
                Status::Passive => {}
            }
            log::debug!("{}: resolving pixmap icon, host icon size {}", self.id, self.icon.icon_size());
        }

        self.representation = resolve_icon(self.status, &props, &mut self.pixmap_files);
        self.icon.set_icon_name(&self.representation.token());
    }

    pub async fn update_menu(&mut self) {
        match self.properties.text(ItemProperty::Menu).await {
            Some(object_path) => {
                let menu = MenuBinding { bus_name: self.owner.clone(), object_path };
                self.icon.set_secondary_menu(Some(&menu));
                self.menu = Some(menu);
            }
            None => {
                self.menu = None;
                self.icon.set_secondary_menu(None);
            }
        }
    }

    pub async fn update_tooltip(&mut self) {
        self.tooltip = if self.is_appindicator {
            self.properties.text(ItemProperty::XAyatanaLabel).await.unwrap_or_default()
        } else {
            // no generic tooltip support yet
            String::new()
        };
        self.icon.set_tooltip_text(&self.tooltip);
    }
}

impl<P> Drop for ItemAdapter<P> {
    fn drop(&mut self) {
        log::debug!("tearing down {}", self.id);
        if self.menu.take().is_some() {
            self.icon.set_secondary_menu(None);
        }
        // pixmap files go away with `pixmap_files`, the icon with `icon`
    }
}

/// Everything an item needs from the watcher besides its own address.
#[derive(Clone)]
pub struct ItemContext {
    pub host: std::sync::Arc<dyn IconHost>,
    pub config: std::sync::Arc<WatcherConfig>,
}

/// Build the proxy for the item at `address`. Fails if the address isn't usable on the bus.
pub async fn item_proxy(
    con: &zbus::Connection,
    address: &ItemAddress,
) -> zbus::Result<proxy::StatusNotifierItemProxy<'static>> {
    proxy::StatusNotifierItemProxy::builder(con)
        .destination(address.owner.clone())?
        .path(address.path.clone())?
        .cache_properties(zbus::proxy::CacheProperties::No)
        .build()
        .await
}

/// Spawn the task driving the adapter of a freshly registered item.
///
/// The task stops on its own once it notices that it isn't `liveness`'s current item anymore;
/// the registry additionally aborts it on eviction. If the item can't be set up, it is
/// unregistered again.
pub fn spawn_item(
    sni: proxy::StatusNotifierItemProxy<'static>,
    address: ItemAddress,
    liveness: Liveness,
    ctx: ItemContext,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let properties = match RemoteProperties::acquire(&sni, ctx.config.property_timeout).await {
            Ok(p) => p,
            Err(e) => {
                log::warn!("Could not get properties proxy for {}: {}", address, e);
                give_up(&liveness, sni.inner().connection()).await;
                return;
            }
        };
        if !liveness.is_live().await {
            log::debug!("{} went away before it was initialized", address);
            return;
        }

        let mut signals = match sni.inner().receive_all_signals().await {
            Ok(s) => s,
            Err(e) => {
                log::warn!("Could not subscribe to signals of {}: {}", address, e);
                give_up(&liveness, sni.inner().connection()).await;
                return;
            }
        };

        let icon = ctx.host.create_icon(&sni);
        let files = PixmapFiles::new(
            &ctx.config.icon_dir,
            format!("snwatcher-{}-{}", std::process::id(), liveness.id()),
        );
        let mut adapter = ItemAdapter::new(&address, properties, icon, files);
        adapter.initialize().await;

        while let Some(msg) = signals.next().await {
            let header = msg.header();
            let Some(signal) = header.member().and_then(|m| ItemSignal::from_member(m.as_str())) else {
                continue;
            };
            if !liveness.is_live().await {
                break;
            }
            adapter.handle_signal(signal).await;
        }
        log::debug!("signal stream of {} ended", address);
    })
}

/// Unregister an item whose setup failed and announce that it is gone.
///
/// Abandoning the item aborts the calling task, so the announcement goes out from a task of its
/// own and the caller has to return right away.
async fn give_up(liveness: &Liveness, con: &zbus::Connection) {
    let Some(evicted) = liveness.abandon().await else {
        return;
    };
    let con = con.clone();
    tokio::spawn(async move {
        let announced = match zbus::SignalContext::new(&con, names::WATCHER_OBJECT) {
            Ok(ctxt) => Watcher::announce_evicted(&ctxt, &[evicted]).await,
            Err(e) => Err(e),
        };
        if let Err(e) = announced {
            log::error!("failed to signal Watcher: {}", e);
        }
    });
}
