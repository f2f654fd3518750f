//! Bookkeeping for tray menu popup windows.

use std::collections::HashMap;

use iced::window::Id;

use crate::components::system_tray::menu::{self, MenuItem};

/// Popups are never taller than this; longer menus get clipped.
const MAX_HEIGHT: u32 = 400;
const VERTICAL_PADDING: u32 = 16;
pub const WIDTH: u32 = 200;

/// Menu shown in one popup window.
#[derive(Debug, Clone)]
pub struct MenuPopup {
    pub address: String,
    pub items: Vec<MenuItem>,
}

/// Open popups keyed by window id. At most one is shown at a time.
#[derive(Debug, Default)]
pub struct MenuPopups {
    windows: HashMap<Id, MenuPopup>,
}

impl MenuPopups {
    /// Record a new popup and return its window id plus the ids of popups
    /// that must be closed to make room for it.
    pub fn open(&mut self, address: String, items: Vec<MenuItem>) -> (Id, Vec<Id>) {
        let stale = self.windows.keys().copied().collect();
        let id = Id::unique();
        self.windows.insert(id, MenuPopup { address, items });
        (id, stale)
    }

    pub fn forget(&mut self, id: Id) {
        self.windows.remove(&id);
    }

    pub fn get(&self, id: Id) -> Option<&MenuPopup> {
        self.windows.get(&id)
    }

    /// Any open popup, for closing on Escape.
    pub fn any(&self) -> Option<Id> {
        self.windows.keys().next().copied()
    }
}

/// Window height needed to show `items` without scrolling.
pub fn height_for(items: &[MenuItem]) -> u32 {
    let rows = menu::row_count(items) as u32;
    (rows * menu::ROW_HEIGHT + VERTICAL_PADDING).min(MAX_HEIGHT)
}
