//! Fakes for exercising the tray widgets without a session bus.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use iced::widget::image;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

use super::service::{PointerEvent, Tooltip, TrayError, TrayItem, TrayWatcher};
use super::signal::Signal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    Activate,
    SecondaryActivate,
    InvokeMenu,
}

/// Scriptable tray item that records every request it receives.
pub struct FakeItem {
    identifier: String,
    title: RefCell<Option<String>>,
    tooltip: RefCell<Tooltip>,
    is_menu: Cell<bool>,
    icon: RefCell<Option<image::Handle>>,
    activate_result: RefCell<Result<(), TrayError>>,
    secondary_result: RefCell<Result<(), TrayError>>,
    calls: RefCell<Vec<Call>>,
    requested_sizes: RefCell<Vec<u16>>,
    last_event: Cell<Option<PointerEvent>>,
    changed: Signal<()>,
}

impl FakeItem {
    pub fn new(identifier: &str) -> Rc<Self> {
        Rc::new(Self {
            identifier: identifier.to_string(),
            title: RefCell::new(None),
            tooltip: RefCell::new(Tooltip::default()),
            is_menu: Cell::new(false),
            icon: RefCell::new(None),
            activate_result: RefCell::new(Ok(())),
            secondary_result: RefCell::new(Ok(())),
            calls: RefCell::new(Vec::new()),
            requested_sizes: RefCell::new(Vec::new()),
            last_event: Cell::new(None),
            changed: Signal::new(),
        })
    }

    pub fn set_title(&self, title: Option<&str>) {
        *self.title.borrow_mut() = title.map(str::to_string);
    }

    pub fn set_tooltip(&self, title: Option<&str>, description: Option<&str>) {
        *self.tooltip.borrow_mut() = Tooltip {
            title: title.map(str::to_string),
            description: description.map(str::to_string),
        };
    }

    pub fn set_is_menu(&self, is_menu: bool) {
        self.is_menu.set(is_menu);
    }

    pub fn set_icon(&self, icon: Option<image::Handle>) {
        *self.icon.borrow_mut() = icon;
    }

    pub fn fail_activate(&self, err: TrayError) {
        *self.activate_result.borrow_mut() = Err(err);
    }

    pub fn fail_secondary_activate(&self, err: TrayError) {
        *self.secondary_result.borrow_mut() = Err(err);
    }

    pub fn notify_changed(&self) {
        self.changed.emit(&());
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn requested_sizes(&self) -> Vec<u16> {
        self.requested_sizes.borrow().clone()
    }

    pub fn last_event(&self) -> Option<PointerEvent> {
        self.last_event.get()
    }

    fn record(&self, call: Call, event: &PointerEvent) {
        self.calls.borrow_mut().push(call);
        self.last_event.set(Some(*event));
    }
}

impl TrayItem for FakeItem {
    fn identifier(&self) -> String {
        self.identifier.clone()
    }

    fn title(&self) -> Option<String> {
        self.title.borrow().clone()
    }

    fn tooltip(&self) -> Tooltip {
        self.tooltip.borrow().clone()
    }

    fn is_menu(&self) -> bool {
        self.is_menu.get()
    }

    fn preferred_icon(&self, size: u16) -> Option<image::Handle> {
        self.requested_sizes.borrow_mut().push(size);
        self.icon.borrow().clone()
    }

    fn changed(&self) -> &Signal<()> {
        &self.changed
    }

    fn activate(&self, event: &PointerEvent) -> Result<(), TrayError> {
        self.record(Call::Activate, event);
        self.activate_result.borrow().clone()
    }

    fn secondary_activate(&self, event: &PointerEvent) -> Result<(), TrayError> {
        self.record(Call::SecondaryActivate, event);
        self.secondary_result.borrow().clone()
    }

    fn invoke_menu(&self, event: &PointerEvent) {
        self.record(Call::InvokeMenu, event);
    }
}

/// Watcher whose notifications are driven by the test.
#[derive(Default)]
pub struct FakeWatcher {
    items: RefCell<HashMap<String, Rc<FakeItem>>>,
    added: Signal<String>,
    removed: Signal<String>,
}

impl FakeWatcher {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Register the item and announce it.
    pub fn add(&self, item: &Rc<FakeItem>) {
        let identifier = item.identifier();
        self.items
            .borrow_mut()
            .insert(identifier.clone(), Rc::clone(item));
        self.added.emit(&identifier);
    }

    /// Forget the item and announce it.
    pub fn remove(&self, identifier: &str) {
        self.items.borrow_mut().remove(identifier);
        self.removed.emit(&identifier.to_string());
    }

    /// Register without announcing.
    pub fn insert_silently(&self, item: &Rc<FakeItem>) {
        self.items
            .borrow_mut()
            .insert(item.identifier(), Rc::clone(item));
    }

    pub fn announce_added(&self, identifier: &str) {
        self.added.emit(&identifier.to_string());
    }

    pub fn announce_removed(&self, identifier: &str) {
        self.removed.emit(&identifier.to_string());
    }

    pub fn listener_count(&self) -> usize {
        self.added.handler_count() + self.removed.handler_count()
    }
}

impl TrayWatcher for FakeWatcher {
    fn current_items(&self) -> HashMap<String, Rc<dyn TrayItem>> {
        self.items
            .borrow()
            .iter()
            .map(|(id, item)| (id.clone(), Rc::clone(item) as Rc<dyn TrayItem>))
            .collect()
    }

    fn item_added(&self) -> &Signal<String> {
        &self.added
    }

    fn item_removed(&self) -> &Signal<String> {
        &self.removed
    }
}

/// A log record seen while running [`capture_logs`].
#[derive(Debug, Clone)]
pub struct CapturedEvent {
    pub level: Level,
    /// Message and fields rendered as `name=value` pairs.
    pub fields: String,
}

#[derive(Clone, Default)]
struct CaptureLayer {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

struct FieldWriter<'a>(&'a mut String);

impl Visit for FieldWriter<'_> {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        use std::fmt::Write;
        let _ = write!(self.0, "{}={:?} ", field.name(), value);
    }
}

impl<S: Subscriber> Layer<S> for CaptureLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut fields = String::new();
        event.record(&mut FieldWriter(&mut fields));
        self.events
            .lock()
            .expect("capture lock poisoned")
            .push(CapturedEvent {
                level: *event.metadata().level(),
                fields,
            });
    }
}

/// Run `f` with a subscriber that records every log event on this thread.
pub fn capture_logs<R>(f: impl FnOnce() -> R) -> (R, Vec<CapturedEvent>) {
    let layer = CaptureLayer::default();
    let events = Arc::clone(&layer.events);
    let subscriber = tracing_subscriber::registry().with(layer);

    let result = tracing::subscriber::with_default(subscriber, f);
    let events = events.lock().expect("capture lock poisoned").clone();
    (result, events)
}
