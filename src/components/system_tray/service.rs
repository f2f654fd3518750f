//! Interfaces between the tray widgets and the service that tracks tray items.
//!
//! The widgets only ever talk to [`TrayWatcher`] and [`TrayItem`]. The
//! production implementation lives in `sni.rs`; tests use fakes.

use std::collections::HashMap;
use std::rc::Rc;

use iced::widget::image;
use thiserror::Error;

use super::signal::Signal;

/// Pointer button numbers, X11 style.
pub const BUTTON_PRIMARY: u32 = 1;
pub const BUTTON_MIDDLE: u32 = 2;
pub const BUTTON_SECONDARY: u32 = 3;

/// A pointer press forwarded to a tray item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointerEvent {
    pub button: u32,
    pub x: i32,
    pub y: i32,
}

impl PointerEvent {
    pub fn new(button: u32) -> Self {
        Self { button, x: 0, y: 0 }
    }

    pub fn at(button: u32, x: i32, y: i32) -> Self {
        Self { button, x, y }
    }
}

/// Tooltip as published by the item.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tooltip {
    pub title: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TrayError {
    /// The item refused or does not implement the request.
    #[error("request declined: {0}")]
    Declined(String),
    #[error("{0}")]
    Unexpected(String),
}

impl TrayError {
    /// Whether this is a normal refusal rather than a fault.
    pub fn is_expected(&self) -> bool {
        matches!(self, TrayError::Declined(_))
    }
}

impl From<system_tray::error::Error> for TrayError {
    fn from(err: system_tray::error::Error) -> Self {
        use system_tray::error::Error;

        match err {
            Error::ZBus(err) => err.into(),
            Error::ZBusFdo(err) => err.into(),
            err => TrayError::Unexpected(err.to_string()),
        }
    }
}

/// Error replies from the item mean it answered and said no.
impl From<zbus::Error> for TrayError {
    fn from(err: zbus::Error) -> Self {
        match err {
            zbus::Error::FDO(err) => TrayError::from(*err),
            err @ zbus::Error::MethodError(..) => TrayError::Declined(err.to_string()),
            err => TrayError::Unexpected(err.to_string()),
        }
    }
}

impl From<zbus::fdo::Error> for TrayError {
    fn from(err: zbus::fdo::Error) -> Self {
        match err {
            zbus::fdo::Error::ZBus(err) => err.into(),
            // Everything else is a named org.freedesktop.DBus.Error reply.
            err => TrayError::Declined(err.to_string()),
        }
    }
}

/// One tray item as seen by the widgets.
pub trait TrayItem {
    /// Stable key of the item.
    fn identifier(&self) -> String;

    fn title(&self) -> Option<String>;

    fn tooltip(&self) -> Tooltip;

    /// Item only supports the context menu, not activation.
    fn is_menu(&self) -> bool;

    /// Best icon for a square of `size` pixels, if any.
    fn preferred_icon(&self, size: u16) -> Option<image::Handle>;

    /// Fired whenever any of the above changes.
    fn changed(&self) -> &Signal<()>;

    fn activate(&self, event: &PointerEvent) -> Result<(), TrayError>;

    fn secondary_activate(&self, event: &PointerEvent) -> Result<(), TrayError>;

    fn invoke_menu(&self, event: &PointerEvent);
}

/// The service that knows which tray items currently exist.
pub trait TrayWatcher {
    fn current_items(&self) -> HashMap<String, Rc<dyn TrayItem>>;

    /// Carries the identifier of a newly registered item.
    fn item_added(&self) -> &Signal<String>;

    /// Carries the identifier of an item that went away.
    fn item_removed(&self) -> &Signal<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    use system_tray::error::Error as ClientError;
    use zbus::fdo;

    #[test]
    fn dbus_error_replies_are_declines() {
        let err = TrayError::from(ClientError::ZBusFdo(fdo::Error::UnknownMethod(
            "No such method 'Activate'".to_string(),
        )));
        assert!(err.is_expected());

        let err = TrayError::from(ClientError::ZBus(zbus::Error::FDO(Box::new(
            fdo::Error::NotSupported("SecondaryActivate".to_string()),
        ))));
        assert!(err.is_expected());
        assert!(err.to_string().contains("SecondaryActivate"));
    }

    #[test]
    fn transport_failures_are_unexpected() {
        let err = TrayError::from(ClientError::ZBus(zbus::Error::Failure(
            "broken pipe".to_string(),
        )));
        assert!(!err.is_expected());
        assert!(err.to_string().contains("broken pipe"));

        let err = TrayError::from(ClientError::MissingProperty("Id"));
        assert!(!err.is_expected());
    }

    #[test]
    fn wrapped_transport_failures_stay_unexpected() {
        let err = TrayError::from(fdo::Error::ZBus(zbus::Error::InterfaceNotFound));
        assert!(!err.is_expected());

        let err = TrayError::from(zbus::Error::FDO(Box::new(fdo::Error::ZBus(
            zbus::Error::Failure("connection reset".to_string()),
        ))));
        assert!(!err.is_expected());
    }

    #[test]
    fn pointer_event_defaults_to_origin() {
        let event = PointerEvent::new(BUTTON_MIDDLE);
        assert_eq!(event, PointerEvent { button: 2, x: 0, y: 0 });
    }
}
