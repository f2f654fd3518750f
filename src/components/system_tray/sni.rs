//! [`TrayWatcher`] and [`TrayItem`] backed by the `system-tray` SNI client.
//!
//! The client runs on the tokio runtime inside an iced subscription. Its
//! events reach this module as messages on the UI thread, so everything here
//! is single-threaded. Only activation crosses back: it blocks the UI thread
//! on a helper thread that drives the D-Bus call through the runtime handle.
//!
//! `Activate` and `SecondaryActivate` are called on the item directly rather
//! than through the client, which discards the item's reply. The reply is
//! what tells a declined request apart from a broken one.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use iced::widget::image;
use system_tray::client::{ActivateRequest, Client};
use system_tray::item::StatusNotifierItem;
use tracing::debug;
use zbus::proxy::{Builder, CacheProperties};
use zbus::Proxy;

use super::icon::{self, IconSource, Pixmap};
use super::menu::MenuItem;
use super::service::{PointerEvent, Tooltip, TrayError, TrayItem, TrayWatcher};
use super::signal::Signal;

/// Menu path used when an item does not publish one.
const DEFAULT_MENU_PATH: &str = "/MenuBar";

const ITEM_INTERFACE: &str = "org.kde.StatusNotifierItem";
const DEFAULT_ITEM_PATH: &str = "/StatusNotifierItem";

/// Item methods that take the pointer position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemMethod {
    Activate,
    SecondaryActivate,
}

impl ItemMethod {
    fn member(self) -> &'static str {
        match self {
            ItemMethod::Activate => "Activate",
            ItemMethod::SecondaryActivate => "SecondaryActivate",
        }
    }
}

/// Split an item address into bus name and object path.
///
/// `:1.72/org/ayatana/NotificationItem/x` names its object; a bare bus name
/// uses the standard `/StatusNotifierItem`.
fn split_address(address: &str) -> (&str, String) {
    match address.split_once('/') {
        Some((destination, path)) => (destination, format!("/{path}")),
        None => (address, DEFAULT_ITEM_PATH.to_string()),
    }
}

async fn call_item(
    connection: &zbus::Connection,
    address: &str,
    method: ItemMethod,
    x: i32,
    y: i32,
) -> zbus::Result<()> {
    let (destination, path) = split_address(address);
    let proxy = Builder::<Proxy<'_>>::new(connection)
        .destination(destination)?
        .path(path)?
        .interface(ITEM_INTERFACE)?
        .cache_properties(CacheProperties::No)
        .build()
        .await?;

    proxy.call_method(method.member(), &(x, y)).await?;
    Ok(())
}

/// Handle to the connected SNI client, cheap to clone.
#[derive(Clone)]
pub struct SniClient {
    client: Arc<Client>,
    connection: zbus::Connection,
    runtime: tokio::runtime::Handle,
}

impl std::fmt::Debug for SniClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SniClient").finish_non_exhaustive()
    }
}

impl SniClient {
    pub fn new(
        client: Arc<Client>,
        connection: zbus::Connection,
        runtime: tokio::runtime::Handle,
    ) -> Self {
        Self {
            client,
            connection,
            runtime,
        }
    }

    /// Call `method` on the item at `address` and wait for its reply.
    pub fn call_item_blocking(
        &self,
        address: &str,
        method: ItemMethod,
        event: &PointerEvent,
    ) -> Result<(), TrayError> {
        let connection = self.connection.clone();
        let runtime = self.runtime.clone();
        let address = address.to_string();
        let PointerEvent { x, y, .. } = *event;

        // The UI thread may already be inside the runtime's context, where
        // `block_on` is not allowed.
        std::thread::spawn(move || {
            runtime
                .block_on(call_item(&connection, &address, method, x, y))
                .map_err(TrayError::from)
        })
        .join()
        .map_err(|_| TrayError::Unexpected("activation thread panicked".to_string()))?
    }

    /// Menu entry activation; the client's own request is enough here.
    pub async fn activate(&self, request: ActivateRequest) -> Result<(), TrayError> {
        self.client.activate(request).await.map_err(TrayError::from)
    }
}

/// State of one item as last reported by the client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemSnapshot {
    /// D-Bus address, used as the identifier.
    pub address: String,
    pub title: Option<String>,
    pub tooltip: Tooltip,
    pub item_is_menu: bool,
    pub icon: IconSource,
    pub menu_path: Option<String>,
}

impl ItemSnapshot {
    pub fn from_sni(address: &str, item: &StatusNotifierItem) -> Self {
        let tooltip = item
            .tool_tip
            .as_ref()
            .map(|tip| Tooltip {
                title: non_empty(&tip.title),
                description: non_empty(&tip.description),
            })
            .unwrap_or_default();

        Self {
            address: address.to_string(),
            title: item.title.clone(),
            tooltip,
            item_is_menu: item.item_is_menu,
            icon: IconSource {
                pixmaps: item
                    .icon_pixmap
                    .iter()
                    .flatten()
                    .map(Pixmap::from)
                    .collect(),
                icon_name: item.icon_name.clone(),
                icon_theme_path: item.icon_theme_path.clone(),
            },
            menu_path: item.menu.clone(),
        }
    }
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}

/// A context menu the user asked for, waiting for the host to show it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuRequest {
    pub address: String,
    pub event: PointerEvent,
}

type SharedClient = Rc<RefCell<Option<SniClient>>>;

pub struct SniItem {
    state: RefCell<ItemSnapshot>,
    /// Last resolved icon and the size it was resolved for.
    icon_cache: RefCell<Option<(u16, Option<image::Handle>)>>,
    changed: Signal<()>,
    client: SharedClient,
    menu_requests: Rc<RefCell<Vec<MenuRequest>>>,
}

impl SniItem {
    fn new(
        snapshot: ItemSnapshot,
        client: SharedClient,
        menu_requests: Rc<RefCell<Vec<MenuRequest>>>,
    ) -> Self {
        Self {
            state: RefCell::new(snapshot),
            icon_cache: RefCell::new(None),
            changed: Signal::new(),
            client,
            menu_requests,
        }
    }

    /// Replace the state. Returns whether anything changed.
    fn apply(&self, snapshot: ItemSnapshot) -> bool {
        let mut state = self.state.borrow_mut();
        if *state == snapshot {
            return false;
        }
        if state.icon != snapshot.icon {
            self.icon_cache.borrow_mut().take();
        }
        *state = snapshot;
        true
    }

    fn menu_path(&self) -> String {
        self.state
            .borrow()
            .menu_path
            .clone()
            .unwrap_or_else(|| DEFAULT_MENU_PATH.to_string())
    }

    fn call(&self, method: ItemMethod, event: &PointerEvent) -> Result<(), TrayError> {
        let client = self.client.borrow().clone();
        match client {
            Some(client) => client.call_item_blocking(&self.identifier(), method, event),
            None => Err(TrayError::Unexpected(
                "system tray client is not connected".to_string(),
            )),
        }
    }
}

impl TrayItem for SniItem {
    fn identifier(&self) -> String {
        self.state.borrow().address.clone()
    }

    fn title(&self) -> Option<String> {
        self.state.borrow().title.clone()
    }

    fn tooltip(&self) -> Tooltip {
        self.state.borrow().tooltip.clone()
    }

    fn is_menu(&self) -> bool {
        self.state.borrow().item_is_menu
    }

    fn preferred_icon(&self, size: u16) -> Option<image::Handle> {
        if let Some((cached_size, handle)) = &*self.icon_cache.borrow() {
            if *cached_size == size {
                return handle.clone();
            }
        }

        let handle = icon::resolve_icon(&self.state.borrow().icon, size);
        *self.icon_cache.borrow_mut() = Some((size, handle.clone()));
        handle
    }

    fn changed(&self) -> &Signal<()> {
        &self.changed
    }

    fn activate(&self, event: &PointerEvent) -> Result<(), TrayError> {
        self.call(ItemMethod::Activate, event)
    }

    fn secondary_activate(&self, event: &PointerEvent) -> Result<(), TrayError> {
        self.call(ItemMethod::SecondaryActivate, event)
    }

    fn invoke_menu(&self, event: &PointerEvent) {
        self.menu_requests.borrow_mut().push(MenuRequest {
            address: self.identifier(),
            event: *event,
        });
    }
}

/// Mirror of the client's item map, kept on the UI thread.
#[derive(Default)]
pub struct SniWatcher {
    items: RefCell<HashMap<String, Rc<SniItem>>>,
    menus: RefCell<HashMap<String, Vec<MenuItem>>>,
    client: SharedClient,
    menu_requests: Rc<RefCell<Vec<MenuRequest>>>,
    item_added: Signal<String>,
    item_removed: Signal<String>,
}

impl std::fmt::Debug for SniWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SniWatcher")
            .field("items", &self.items.borrow().len())
            .field("connected", &self.is_connected())
            .finish()
    }
}

thread_local! {
    static WATCHER: std::cell::OnceCell<Rc<SniWatcher>> = const { std::cell::OnceCell::new() };
}

/// The watcher shared by everything on this thread, created on first use.
pub fn shared_watcher() -> Rc<SniWatcher> {
    WATCHER.with(|cell| Rc::clone(cell.get_or_init(|| Rc::new(SniWatcher::new()))))
}

impl SniWatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach_client(&self, client: SniClient) {
        *self.client.borrow_mut() = Some(client);
    }

    pub fn client(&self) -> Option<SniClient> {
        self.client.borrow().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.client.borrow().is_some()
    }

    /// Register a new item, or update it if the address is already known.
    pub fn insert(&self, snapshot: ItemSnapshot) {
        let existing = self.items.borrow().get(&snapshot.address).cloned();
        if let Some(item) = existing {
            if item.apply(snapshot) {
                item.changed.emit(&());
            }
            return;
        }

        let address = snapshot.address.clone();
        let item = Rc::new(SniItem::new(
            snapshot,
            Rc::clone(&self.client),
            Rc::clone(&self.menu_requests),
        ));
        self.items.borrow_mut().insert(address.clone(), item);
        debug!(address = %address, "tray item registered");
        self.item_added.emit(&address);
    }

    /// Update a known item. Unknown addresses are ignored.
    pub fn update(&self, snapshot: ItemSnapshot) {
        let existing = self.items.borrow().get(&snapshot.address).cloned();
        match existing {
            Some(item) => {
                if item.apply(snapshot) {
                    item.changed.emit(&());
                }
            }
            None => debug!(address = %snapshot.address, "update for unknown tray item"),
        }
    }

    pub fn set_menu(&self, address: &str, items: Vec<MenuItem>) {
        self.menus.borrow_mut().insert(address.to_string(), items);
    }

    pub fn menu(&self, address: &str) -> Vec<MenuItem> {
        self.menus.borrow().get(address).cloned().unwrap_or_default()
    }

    pub fn menu_path(&self, address: &str) -> String {
        self.items
            .borrow()
            .get(address)
            .map(|item| item.menu_path())
            .unwrap_or_else(|| DEFAULT_MENU_PATH.to_string())
    }

    pub fn remove(&self, address: &str) {
        let removed = self.items.borrow_mut().remove(address);
        self.menus.borrow_mut().remove(address);

        if removed.is_some() {
            debug!(address, "tray item unregistered");
            self.item_removed.emit(&address.to_string());
        }
    }

    /// Menus requested since the last call.
    pub fn take_menu_requests(&self) -> Vec<MenuRequest> {
        std::mem::take(&mut *self.menu_requests.borrow_mut())
    }
}

impl TrayWatcher for SniWatcher {
    fn current_items(&self) -> HashMap<String, Rc<dyn TrayItem>> {
        self.items
            .borrow()
            .iter()
            .map(|(address, item)| (address.clone(), Rc::clone(item) as Rc<dyn TrayItem>))
            .collect()
    }

    fn item_added(&self) -> &Signal<String> {
        &self.item_added
    }

    fn item_removed(&self) -> &Signal<String> {
        &self.item_removed
    }
}
