//! Republishing items as `org.x.StatusIcon` objects, which is what status icon monitors (the
//! applets in panels) display.

use std::{
    future::Future,
    sync::{
        atomic::{AtomicI32, AtomicU32, Ordering},
        Arc,
    },
};

use tokio::sync::mpsc;
use zbus::{interface, object_server::InterfaceRef};

use crate::*;

/// What a monitor asks of an item when the user interacts with its icon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemAction {
    Activate,
    SecondaryActivate,
    ContextMenu,
}

impl ItemAction {
    /// Map a released mouse button (1 = primary, 2 = middle, 3 = secondary).
    pub fn for_button(button: u32) -> Option<ItemAction> {
        match button {
            1 => Some(ItemAction::Activate),
            2 => Some(ItemAction::SecondaryActivate),
            3 => Some(ItemAction::ContextMenu),
            _ => None,
        }
    }
}

/// Orientation string of `org.kde.StatusNotifierItem.Scroll` for a scroll direction as sent by
/// monitors (up, down, left, right).
pub fn scroll_orientation(direction: i32) -> Option<&'static str> {
    match direction {
        0 | 1 => Some("vertical"),
        2 | 3 => Some("horizontal"),
        _ => None,
    }
}

/// [`IconHost`] exporting an `org.x.StatusIcon` object per item on the watcher's connection.
pub struct XAppIconHost {
    con: zbus::Connection,
    fallback_icon_size: i32,
    next_index: AtomicU32,
    tasks: IconTasks,
}

impl XAppIconHost {
    pub fn new(con: zbus::Connection, fallback_icon_size: i32) -> Self {
        Self { con, fallback_icon_size, next_index: AtomicU32::new(0), tasks: IconTasks::default() }
    }

    /// Wait until the icons are unexported and their names released.
    ///
    /// Only returns once every [`XAppStatusIcon`] this host created has been dropped.
    pub async fn wait_for_icons(&self) {
        self.tasks.wait_all().await;
    }
}

/// The tasks serving exported icons.
#[derive(Default)]
struct IconTasks(std::sync::Mutex<Vec<tokio::task::JoinHandle<()>>>);

impl IconTasks {
    fn spawn(&self, task: impl Future<Output = ()> + Send + 'static) {
        // unwrap: mutex poisoning is okay
        let mut tasks = self.0.lock().unwrap();
        tasks.retain(|task| !task.is_finished());
        tasks.push(tokio::spawn(task));
    }

    async fn wait_all(&self) {
        // unwrap: mutex poisoning is okay
        let tasks = std::mem::take(&mut *self.0.lock().unwrap());
        for task in tasks {
            if let Err(e) = task.await {
                log::debug!("status icon task failed: {}", e);
            }
        }
    }
}

impl IconHost for XAppIconHost {
    fn create_icon(&self, item: &proxy::StatusNotifierItemProxy<'static>) -> Box<dyn StatusIcon> {
        let index = self.next_index.fetch_add(1, Ordering::Relaxed);
        let icon_size = Arc::new(AtomicI32::new(0));
        let exported = ExportedIcon {
            item: item.clone(),
            name: item.inner().destination().to_string(),
            icon_name: String::new(),
            tooltip_text: String::new(),
            visible: false,
            icon_size: icon_size.clone(),
        };

        let (updates, rx) = mpsc::unbounded_channel();
        self.tasks.spawn(serve_icon(self.con.clone(), index, exported, rx));

        Box::new(XAppStatusIcon { updates, icon_size, fallback_icon_size: self.fallback_icon_size, menu: None })
    }
}

#[derive(Debug)]
enum IconUpdate {
    IconName(String),
    Visible(bool),
    TooltipText(String),
}

/// Handle of an exported icon. Dropping it unexports the icon.
pub struct XAppStatusIcon {
    updates: mpsc::UnboundedSender<IconUpdate>,
    icon_size: Arc<AtomicI32>,
    fallback_icon_size: i32,
    menu: Option<MenuBinding>,
}

impl XAppStatusIcon {
    fn send(&self, update: IconUpdate) {
        // the export failed if nobody is listening anymore, which has been logged already
        let _ = self.updates.send(update);
    }
}

impl StatusIcon for XAppStatusIcon {
    fn set_icon_name(&mut self, token: &str) {
        self.send(IconUpdate::IconName(token.to_string()));
    }

    fn set_visible(&mut self, visible: bool) {
        self.send(IconUpdate::Visible(visible));
    }

    fn set_tooltip_text(&mut self, text: &str) {
        self.send(IconUpdate::TooltipText(text.to_string()));
    }

    fn set_secondary_menu(&mut self, menu: Option<&MenuBinding>) {
        // menus are drawn by whoever shows the icon, all we can do is keep track of it
        match menu {
            Some(menu) => log::debug!("menu of icon is {}{}", menu.bus_name, menu.object_path),
            None if self.menu.is_some() => log::debug!("menu detached"),
            None => {}
        }
        self.menu = menu.cloned();
    }

    fn icon_size(&self) -> i32 {
        match self.icon_size.load(Ordering::Relaxed) {
            0 => self.fallback_icon_size,
            size => size,
        }
    }
}

struct ExportedIcon {
    item: proxy::StatusNotifierItemProxy<'static>,
    name: String,
    icon_name: String,
    tooltip_text: String,
    visible: bool,
    icon_size: Arc<AtomicI32>,
}

#[interface(name = "org.x.StatusIcon")]
impl ExportedIcon {
    async fn button_press(&self, _x: i32, _y: i32, _button: u32, _time: u32, _panel_position: i32) {}

    async fn button_release(&self, x: i32, y: i32, button: u32, _time: u32, _panel_position: i32) {
        let Some(action) = ItemAction::for_button(button) else {
            log::debug!("ignoring release of button {}", button);
            return;
        };
        let item = self.item.clone();
        tokio::spawn(async move {
            let result = match action {
                ItemAction::Activate => match item.activate(x, y).await {
                    // plenty of items only implement SecondaryActivate
                    Err(_) => item.secondary_activate(x, y).await,
                    ok => ok,
                },
                ItemAction::SecondaryActivate => item.secondary_activate(x, y).await,
                ItemAction::ContextMenu => item.context_menu(x, y).await,
            };
            if let Err(e) = result {
                log::debug!("{:?} on {} failed: {}", action, item.inner().destination(), e);
            }
        });
    }

    async fn scroll(&self, delta: i32, orientation: i32, _time: u32) {
        let Some(orientation) = scroll_orientation(orientation) else {
            return;
        };
        let item = self.item.clone();
        tokio::spawn(async move {
            if let Err(e) = item.scroll(delta, orientation).await {
                log::debug!("scrolling {} failed: {}", item.inner().destination(), e);
            }
        });
    }

    #[zbus(property, name = "Name")]
    fn item_name(&self) -> String {
        self.name.clone()
    }

    #[zbus(property)]
    fn icon_name(&self) -> String {
        self.icon_name.clone()
    }

    #[zbus(property)]
    fn tooltip_text(&self) -> String {
        self.tooltip_text.clone()
    }

    #[zbus(property)]
    fn label(&self) -> String {
        String::new()
    }

    #[zbus(property)]
    fn visible(&self) -> bool {
        self.visible
    }

    #[zbus(property)]
    fn icon_size(&self) -> i32 {
        self.icon_size.load(Ordering::Relaxed)
    }

    #[zbus(property)]
    fn set_icon_size(&mut self, size: i32) {
        self.icon_size.store(size, Ordering::Relaxed);
    }

    #[zbus(property)]
    fn primary_menu_is_open(&self) -> bool {
        false
    }

    #[zbus(property)]
    fn secondary_menu_is_open(&self) -> bool {
        false
    }

    #[zbus(property)]
    fn metadata(&self) -> String {
        String::new()
    }
}

async fn serve_icon(
    con: zbus::Connection,
    index: u32,
    icon: ExportedIcon,
    mut updates: mpsc::UnboundedReceiver<IconUpdate>,
) {
    let path = format!("{}{}", names::STATUS_ICON_OBJECT_PREFIX, index);
    let bus_name = format!("{}.PID-{}-{}", names::STATUS_ICON_BUS_PREFIX, std::process::id(), index);

    let iface = match export(&con, &path, &bus_name, icon).await {
        Ok(iface) => iface,
        Err(e) => {
            log::warn!("Could not export status icon {}: {}", path, e);
            return;
        }
    };
    log::debug!("exported status icon {} as {}", path, bus_name);

    while let Some(update) = updates.recv().await {
        if let Err(e) = apply(&iface, update).await {
            log::debug!("failed to update status icon {}: {}", path, e);
        }
    }

    if let Err(e) = con.release_name(bus_name.as_str()).await {
        log::debug!("failed to release {}: {}", bus_name, e);
    }
    if let Err(e) = con.object_server().remove::<ExportedIcon, _>(path.as_str()).await {
        log::debug!("failed to unexport {}: {}", path, e);
    }
}

async fn export(
    con: &zbus::Connection,
    path: &str,
    bus_name: &str,
    icon: ExportedIcon,
) -> zbus::Result<InterfaceRef<ExportedIcon>> {
    con.object_server().at(path, icon).await?;
    let iface = con.object_server().interface::<_, ExportedIcon>(path).await?;
    con.request_name(bus_name).await?;
    Ok(iface)
}

async fn apply(iface: &InterfaceRef<ExportedIcon>, update: IconUpdate) -> zbus::Result<()> {
    let ctxt = iface.signal_context();
    let mut icon = iface.get_mut().await;
    match update {
        IconUpdate::IconName(name) if name != icon.icon_name => {
            icon.icon_name = name;
            icon.icon_name_changed(ctxt).await
        }
        IconUpdate::Visible(visible) if visible != icon.visible => {
            icon.visible = visible;
            icon.visible_changed(ctxt).await
        }
        IconUpdate::TooltipText(text) if text != icon.tooltip_text => {
            icon.tooltip_text = text;
            icon.tooltip_text_changed(ctxt).await
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_button_mapping() {
        assert_eq!(ItemAction::for_button(1), Some(ItemAction::Activate));
        assert_eq!(ItemAction::for_button(2), Some(ItemAction::SecondaryActivate));
        assert_eq!(ItemAction::for_button(3), Some(ItemAction::ContextMenu));
        assert_eq!(ItemAction::for_button(8), None);
    }

    #[test]
    fn test_scroll_orientation() {
        assert_eq!(scroll_orientation(0), Some("vertical"));
        assert_eq!(scroll_orientation(1), Some("vertical"));
        assert_eq!(scroll_orientation(2), Some("horizontal"));
        assert_eq!(scroll_orientation(3), Some("horizontal"));
        assert_eq!(scroll_orientation(-1), None);
    }

    #[tokio::test]
    async fn test_wait_all_icon_tasks() {
        let tasks = IconTasks::default();
        let done = Arc::new(AtomicU32::new(0));
        for _ in 0..3 {
            let done = done.clone();
            tasks.spawn(async move {
                tokio::task::yield_now().await;
                done.fetch_add(1, Ordering::Relaxed);
            });
        }

        tasks.wait_all().await;
        assert_eq!(done.load(Ordering::Relaxed), 3);
        assert!(tasks.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_finished_icon_tasks_are_dropped() {
        let tasks = IconTasks::default();
        tasks.spawn(async {});
        tasks.spawn(async {});
        while !tasks.0.lock().unwrap().iter().all(|task| task.is_finished()) {
            tokio::task::yield_now().await;
        }

        tasks.spawn(std::future::pending());
        assert_eq!(tasks.0.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_icon_size_falls_back() {
        let (updates, _rx) = mpsc::unbounded_channel();
        let icon = XAppStatusIcon { updates, icon_size: Arc::new(AtomicI32::new(0)), fallback_icon_size: 24, menu: None };
        assert_eq!(icon.icon_size(), 24);

        icon.icon_size.store(32, Ordering::Relaxed);
        assert_eq!(icon.icon_size(), 32);
    }

    #[test]
    fn test_updates_survive_a_failed_export() {
        let (updates, rx) = mpsc::unbounded_channel();
        drop(rx);
        let mut icon = XAppStatusIcon { updates, icon_size: Arc::new(AtomicI32::new(0)), fallback_icon_size: 24, menu: None };

        icon.set_icon_name("firefox");
        icon.set_visible(true);
        icon.set_secondary_menu(Some(&MenuBinding { bus_name: ":1.3".to_string(), object_path: "/Menu".to_string() }));
        assert_eq!(icon.menu.as_ref().map(|m| m.object_path.as_str()), Some("/Menu"));
    }
}
