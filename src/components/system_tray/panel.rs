//! Container holding one [`TrayItemWidget`] per item known to the watcher.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use iced::widget::Row;
use iced::Element;
use tracing::{debug, warn};

use super::item::{ItemInput, ItemStyle, TrayItemWidget};
use super::service::{PointerEvent, TrayError, TrayWatcher};
use super::signal::Connection;

/// Icon size used when none is configured.
pub const DEFAULT_ICON_SIZE: u16 = 24;

#[derive(Default)]
struct Children {
    /// Identifiers in display order.
    order: Vec<String>,
    widgets: HashMap<String, TrayItemWidget>,
}

struct PanelState {
    watcher: Rc<dyn TrayWatcher>,
    icon_size: Cell<u16>,
    children: RefCell<Children>,
}

/// The tray panel. Follows the watcher's add/remove notifications for as
/// long as it lives.
pub struct TrayPanel {
    state: Rc<PanelState>,
    _added: Connection,
    _removed: Connection,
}

impl std::fmt::Debug for TrayPanel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrayPanel")
            .field("icon_size", &self.state.icon_size.get())
            .field("items", &self.state.children.borrow().order)
            .finish()
    }
}

impl TrayPanel {
    pub fn new(watcher: Rc<dyn TrayWatcher>, icon_size: u16) -> Self {
        let state = Rc::new(PanelState {
            watcher,
            icon_size: Cell::new(icon_size.max(1)),
            children: RefCell::new(Children::default()),
        });

        let weak: Weak<PanelState> = Rc::downgrade(&state);
        let added = state.watcher.item_added().connect(move |identifier| {
            if let Some(state) = weak.upgrade() {
                state.on_item_added(identifier);
            }
        });

        let weak: Weak<PanelState> = Rc::downgrade(&state);
        let removed = state.watcher.item_removed().connect(move |identifier| {
            if let Some(state) = weak.upgrade() {
                state.on_item_removed(identifier);
            }
        });

        // Items registered before we started listening.
        let mut known: Vec<String> = state.watcher.current_items().into_keys().collect();
        known.sort();
        for identifier in known {
            state.on_item_added(&identifier);
        }

        Self {
            state,
            _added: added,
            _removed: removed,
        }
    }

    /// Identifiers of the visible children, in display order.
    pub fn identifiers(&self) -> Vec<String> {
        self.state.children.borrow().order.clone()
    }

    pub fn len(&self) -> usize {
        self.state.children.borrow().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.state.children.borrow().widgets.contains_key(identifier)
    }

    pub fn icon_size(&self) -> u16 {
        self.state.icon_size.get()
    }

    /// Run `f` against the widget for `identifier`, if there is one.
    pub fn with_widget<R>(
        &self,
        identifier: &str,
        f: impl FnOnce(&TrayItemWidget) -> R,
    ) -> Option<R> {
        self.state.children.borrow().widgets.get(identifier).map(f)
    }

    /// Route a pointer press to the widget for `identifier`. Unknown
    /// identifiers are ignored.
    pub fn handle_press(&self, identifier: &str, event: &PointerEvent) -> Result<(), TrayError> {
        // Release the borrow before calling into the item: a synchronous
        // call may end in a watcher notification that mutates the panel.
        let widget = self
            .state
            .children
            .borrow()
            .widgets
            .get(identifier)
            .map(TrayItemWidget::shared_state);

        match widget {
            Some(widget) => widget.on_button_press(event),
            None => {
                debug!(identifier, "press for unknown tray item");
                Ok(())
            }
        }
    }

    /// Track whether the pointer is over `identifier`'s icon.
    pub fn set_hovered(&self, identifier: &str, hovered: bool) {
        if self.with_widget(identifier, |w| w.set_hovered(hovered)).is_none() {
            debug!(identifier, "hover for unknown tray item");
        }
    }

    pub fn set_icon_size(&self, size: u16) {
        let size = size.max(1);
        if self.state.icon_size.replace(size) == size {
            return;
        }

        let widgets: Vec<_> = self
            .state
            .children
            .borrow()
            .widgets
            .values()
            .map(TrayItemWidget::shared_state)
            .collect();
        for widget in widgets {
            widget.resize(size);
        }
    }

    pub fn view<'a, M>(
        &self,
        style: ItemStyle,
        spacing: f32,
        on_input: impl Fn(String, ItemInput) -> M,
    ) -> Element<'a, M>
    where
        M: Clone + 'a,
    {
        let children = self.state.children.borrow();
        let icons = children
            .order
            .iter()
            .filter_map(|identifier| {
                children.widgets.get(identifier).map(|widget| {
                    widget.view(style, |input| on_input(identifier.clone(), input))
                })
            })
            .collect::<Vec<_>>();

        Row::from_vec(icons)
            .spacing(spacing)
            .align_y(iced::Alignment::Center)
            .into()
    }
}

impl PanelState {
    fn on_item_added(&self, identifier: &str) {
        if self.children.borrow().widgets.contains_key(identifier) {
            warn!(identifier, "tray item announced twice, keeping the existing widget");
            return;
        }

        let Some(item) = self.watcher.current_items().remove(identifier) else {
            debug!(identifier, "tray item vanished before it could be shown");
            return;
        };

        // Built outside the borrow: construction reads the item.
        let widget = TrayItemWidget::new(item, self.icon_size.get());

        let mut children = self.children.borrow_mut();
        children.order.push(identifier.to_string());
        children.widgets.insert(identifier.to_string(), widget);
        debug!(identifier, "tray item added");
    }

    fn on_item_removed(&self, identifier: &str) {
        let removed = {
            let mut children = self.children.borrow_mut();
            let removed = children.widgets.remove(identifier);
            if removed.is_some() {
                children.order.retain(|id| id != identifier);
            }
            removed
        };

        match removed {
            Some(_) => debug!(identifier, "tray item removed"),
            None => debug!(identifier, "removal of unknown tray item ignored"),
        }
    }
}
