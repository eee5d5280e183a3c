//! Reading item properties over `org.freedesktop.DBus.Properties`.
//!
//! Every property is decoded into a concrete type right here; anything that can't be fetched or
//! decoded in time is reported as absent, so the code above only ever deals with `Option`s.

use std::{future::Future, time::Duration};

use zbus::{
    fdo::PropertiesProxy,
    names::InterfaceName,
    zvariant::{OwnedValue, Value},
};

use crate::*;

/// The item properties the watcher consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::IntoStaticStr, strum::Display)]
pub enum ItemProperty {
    Status,
    IconThemePath,
    IconName,
    AttentionIconName,
    OverlayIconName,
    IconPixmap,
    AttentionIconPixmap,
    Menu,
    /// Label shown next to libappindicator icons, which we use as their tooltip.
    XAyatanaLabel,
}

/// Something item properties can be read from.
///
/// Implementations must bound the time a single read takes, and must report failures, timeouts
/// and empty strings all as `None`.
pub trait PropertySource: Send + Sync {
    /// Read a string (or object path) property.
    fn text(&self, property: ItemProperty) -> impl Future<Output = Option<String>> + Send;

    /// Read an `a(iiay)` pixmap property.
    fn pixmaps(&self, property: ItemProperty) -> impl Future<Output = Option<Vec<Pixmap>>> + Send;
}

/// Property access to a live item on the bus.
pub struct RemoteProperties {
    proxy: PropertiesProxy<'static>,
    timeout: Duration,
}

impl RemoteProperties {
    /// Create the properties proxy for the same object `item` points at.
    pub async fn acquire(item: &proxy::StatusNotifierItemProxy<'static>, timeout: Duration) -> zbus::Result<Self> {
        let item = item.inner();
        let proxy = PropertiesProxy::builder(item.connection())
            .destination(item.destination().to_owned())?
            .path(item.path().to_owned())?
            .build()
            .await?;
        Ok(Self { proxy, timeout })
    }

    async fn get(&self, property: ItemProperty) -> Option<OwnedValue> {
        let interface = InterfaceName::from_static_str_unchecked(names::ITEM_INTERFACE);
        match tokio::time::timeout(self.timeout, self.proxy.get(interface, property.into())).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(e)) => {
                log::debug!("couldn't get {} of {}: {}", property, self.proxy.inner().destination(), e);
                None
            }
            Err(_) => {
                log::debug!("timed out getting {} of {}", property, self.proxy.inner().destination());
                None
            }
        }
    }
}

impl PropertySource for RemoteProperties {
    async fn text(&self, property: ItemProperty) -> Option<String> {
        let value = self.get(property).await?;
        decode_text(&value)
    }

    async fn pixmaps(&self, property: ItemProperty) -> Option<Vec<Pixmap>> {
        decode_pixmaps(self.get(property).await?)
    }
}

/// Strings and object paths both come out as text; the empty string is treated as unset.
pub fn decode_text(value: &Value<'_>) -> Option<String> {
    let text = match value {
        Value::Str(s) => s.as_str(),
        Value::ObjectPath(p) => p.as_str(),
        Value::Value(inner) => return decode_text(inner),
        other => {
            log::debug!("expected a string, got {:?}", other.value_signature());
            return None;
        }
    };
    if text.is_empty() {
        None
    } else {
        Some(text.to_owned())
    }
}

pub fn decode_pixmaps(value: OwnedValue) -> Option<Vec<Pixmap>> {
    match Vec::<(i32, i32, Vec<u8>)>::try_from(value) {
        Ok(pixmaps) => Some(pixmaps.into_iter().map(Pixmap::from).collect()),
        Err(e) => {
            log::debug!("malformed pixmap property: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zbus::zvariant::ObjectPath;

    #[test]
    fn test_decode_text() {
        assert_eq!(decode_text(&Value::from("Active")), Some("Active".to_string()));
        assert_eq!(decode_text(&Value::from("")), None);
        assert_eq!(decode_text(&Value::from(ObjectPath::from_static_str_unchecked("/MenuBar"))), Some("/MenuBar".to_string()));
        assert_eq!(decode_text(&Value::from(42u32)), None);
    }

    #[test]
    fn test_decode_pixmaps() {
        let value = OwnedValue::try_from(Value::from(vec![(16i32, 16i32, vec![0x7fu8; 1024]), (1, 1, vec![1, 2, 3, 4])]))
            .unwrap();
        assert_eq!(
            decode_pixmaps(value),
            Some(vec![
                Pixmap { width: 16, height: 16, data: vec![0x7f; 1024] },
                Pixmap { width: 1, height: 1, data: vec![1, 2, 3, 4] },
            ])
        );
    }

    #[test]
    fn test_decode_malformed_pixmaps() {
        assert_eq!(decode_pixmaps(OwnedValue::from(42u32)), None);

        let sizes_only = OwnedValue::try_from(Value::from(vec![(16i32, 16i32)])).unwrap();
        assert_eq!(decode_pixmaps(sizes_only), None);
    }

    #[test]
    fn test_property_names() {
        let name: &'static str = ItemProperty::AttentionIconPixmap.into();
        assert_eq!(name, "AttentionIconPixmap");
        assert_eq!(ItemProperty::XAyatanaLabel.to_string(), "XAyatanaLabel");
    }
}
