use crate::*;

/// A secondary (context) menu exported by an item over the dbusmenu protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuBinding {
    /// Bus name the menu is served from, i.e. the item's owner.
    pub bus_name: String,
    /// Object path of the menu.
    pub object_path: String,
}

/// The visual representation of a single item, as provided by whatever displays it.
///
/// All calls are cheap and infallible from the caller's point of view; a host that has to do
/// I/O to apply them is expected to do so in the background.
pub trait StatusIcon: Send {
    /// Show the icon given by `token`: a theme icon name or an absolute file path.
    fn set_icon_name(&mut self, token: &str);

    fn set_visible(&mut self, visible: bool);

    fn set_tooltip_text(&mut self, text: &str);

    /// Attach a menu to be shown on secondary click, or detach the current one.
    fn set_secondary_menu(&mut self, menu: Option<&MenuBinding>);

    /// The size, in pixels, the host would like icons to have.
    fn icon_size(&self) -> i32;
}

/// Creates a [`StatusIcon`] for each item that gets registered.
pub trait IconHost: Send + Sync {
    /// Create the visual representation of the item behind `item`. The proxy may be used to
    /// forward user interaction back to the item.
    fn create_icon(&self, item: &proxy::StatusNotifierItemProxy<'static>) -> Box<dyn StatusIcon>;
}
