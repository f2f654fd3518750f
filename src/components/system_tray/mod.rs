//! System tray component for displaying StatusNotifierItem (SNI) icons.
//!
//! This component provides:
//! - A panel with one clickable icon per registered SNI item
//! - Activation, secondary activation and context menus per click
//! - The `TrayWatcher`/`TrayItem` seam between widgets and the SNI client

mod icon;
pub mod item;
pub mod menu;
pub mod panel;
pub mod service;
pub mod signal;
pub mod sni;
mod tray;

#[cfg(test)]
mod test_support;

pub use panel::DEFAULT_ICON_SIZE;
pub use tray::{Message, SystemTray};
