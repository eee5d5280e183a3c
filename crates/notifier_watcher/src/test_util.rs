use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
};

use crate::*;

#[derive(Debug, Clone)]
pub enum FakeValue {
    Text(String),
    Pixmaps(Vec<Pixmap>),
}

impl From<&str> for FakeValue {
    fn from(s: &str) -> Self {
        FakeValue::Text(s.to_string())
    }
}

/// In-memory item properties. Clones share their values, so a test can change properties
/// underneath an adapter.
#[derive(Debug, Clone, Default)]
pub struct FakeProperties {
    values: Arc<Mutex<HashMap<ItemProperty, FakeValue>>>,
}

impl FakeProperties {
    pub fn new(values: HashMap<ItemProperty, FakeValue>) -> Self {
        Self { values: Arc::new(Mutex::new(values)) }
    }

    pub fn set(&self, property: ItemProperty, value: FakeValue) {
        self.values.lock().unwrap().insert(property, value);
    }

    pub fn remove(&self, property: ItemProperty) {
        self.values.lock().unwrap().remove(&property);
    }
}

impl PropertySource for FakeProperties {
    async fn text(&self, property: ItemProperty) -> Option<String> {
        match self.values.lock().unwrap().get(&property) {
            Some(FakeValue::Text(s)) if !s.is_empty() => Some(s.clone()),
            _ => None,
        }
    }

    async fn pixmaps(&self, property: ItemProperty) -> Option<Vec<Pixmap>> {
        match self.values.lock().unwrap().get(&property) {
            Some(FakeValue::Pixmaps(p)) => Some(p.clone()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IconCall {
    Icon(String),
    Visible(bool),
    Tooltip(String),
    Menu(Option<String>),
}

/// What happened to a [`RecordingIcon`], readable after the icon was moved into an adapter.
#[derive(Debug, Clone, Default)]
pub struct IconLog {
    calls: Arc<Mutex<Vec<IconCall>>>,
    dropped: Arc<AtomicBool>,
}

impl IconLog {
    pub fn calls(&self) -> Vec<IconCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn icon_updates(&self) -> usize {
        self.calls().iter().filter(|c| matches!(c, IconCall::Icon(_))).count()
    }

    pub fn dropped(&self) -> bool {
        self.dropped.load(Ordering::Relaxed)
    }
}

pub struct RecordingIcon {
    log: IconLog,
}

impl RecordingIcon {
    pub fn new() -> (Self, IconLog) {
        let log = IconLog::default();
        (Self { log: log.clone() }, log)
    }

    fn record(&self, call: IconCall) {
        self.log.calls.lock().unwrap().push(call);
    }
}

impl StatusIcon for RecordingIcon {
    fn set_icon_name(&mut self, token: &str) {
        self.record(IconCall::Icon(token.to_string()));
    }

    fn set_visible(&mut self, visible: bool) {
        self.record(IconCall::Visible(visible));
    }

    fn set_tooltip_text(&mut self, text: &str) {
        self.record(IconCall::Tooltip(text.to_string()));
    }

    fn set_secondary_menu(&mut self, menu: Option<&MenuBinding>) {
        self.record(IconCall::Menu(menu.map(|m| m.object_path.clone())));
    }

    fn icon_size(&self) -> i32 {
        0
    }
}

impl Drop for RecordingIcon {
    fn drop(&mut self) {
        self.log.dropped.store(true, Ordering::Relaxed);
    }
}
