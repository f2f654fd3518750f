//! A single clickable tray icon.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use iced::widget::{container, image, mouse_area, text, tooltip};
use iced::{mouse, Color, Element, Length};
use tracing::warn;

use crate::styles::tray_icon_style;

use super::service::{
    PointerEvent, TrayError, TrayItem, BUTTON_MIDDLE, BUTTON_PRIMARY, BUTTON_SECONDARY,
};
use super::signal::Connection;

/// What the widget currently shows.
#[derive(Debug, Clone)]
pub enum RenderedIcon {
    Bitmap(image::Handle),
    /// Placeholder used when the item offers no usable icon.
    Missing { size: u16 },
}

/// Pointer input on a rendered widget, turned into a host message by `view`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemInput {
    /// A button went down; X11 numbering.
    Press(u32),
    Hover(bool),
}

/// Colors the widget is drawn with.
#[derive(Debug, Clone, Copy)]
pub struct ItemStyle {
    pub padding: f32,
    pub text: Color,
    pub hover: Color,
}

impl Default for ItemStyle {
    fn default() -> Self {
        Self {
            padding: 4.0,
            text: Color::from_rgb8(0xc0, 0xca, 0xf5),
            hover: Color::from_rgba8(0x41, 0x48, 0x68, 0.5),
        }
    }
}

pub(super) struct WidgetState {
    item: Rc<dyn TrayItem>,
    icon_size: Cell<u16>,
    icon: RefCell<RenderedIcon>,
    tooltip: RefCell<String>,
    hovered: Cell<bool>,
}

/// Widget for one tray item. Re-renders on every change notification of
/// the item until dropped.
pub struct TrayItemWidget {
    state: Rc<WidgetState>,
    _changed: Connection,
}

impl std::fmt::Debug for TrayItemWidget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrayItemWidget")
            .field("identifier", &self.state.item.identifier())
            .field("icon_size", &self.state.icon_size.get())
            .field("tooltip", &self.state.tooltip.borrow())
            .finish()
    }
}

impl TrayItemWidget {
    pub fn new(item: Rc<dyn TrayItem>, icon_size: u16) -> Self {
        let icon_size = icon_size.max(1);
        let state = Rc::new(WidgetState {
            item,
            icon_size: Cell::new(icon_size),
            icon: RefCell::new(RenderedIcon::Missing { size: icon_size }),
            tooltip: RefCell::new(String::new()),
            hovered: Cell::new(false),
        });

        let weak: Weak<WidgetState> = Rc::downgrade(&state);
        let changed = state.item.changed().connect(move |_| {
            if let Some(state) = weak.upgrade() {
                state.refresh();
            }
        });

        state.refresh();

        Self {
            state,
            _changed: changed,
        }
    }

    pub fn icon(&self) -> RenderedIcon {
        self.state.icon.borrow().clone()
    }

    pub fn tooltip(&self) -> String {
        self.state.tooltip.borrow().clone()
    }

    pub fn icon_size(&self) -> u16 {
        self.state.icon_size.get()
    }

    pub fn set_icon_size(&self, size: u16) {
        self.state.resize(size);
    }

    pub fn is_hovered(&self) -> bool {
        self.state.hovered.get()
    }

    pub fn set_hovered(&self, hovered: bool) {
        self.state.hovered.set(hovered);
    }

    pub fn on_button_press(&self, event: &PointerEvent) -> Result<(), TrayError> {
        self.state.on_button_press(event)
    }

    pub(super) fn shared_state(&self) -> Rc<WidgetState> {
        Rc::clone(&self.state)
    }

    /// Render the icon with a tooltip. `on_input` maps pointer input to the
    /// message sent for it. Presses fire when the button goes down.
    pub fn view<'a, M>(&self, style: ItemStyle, on_input: impl Fn(ItemInput) -> M) -> Element<'a, M>
    where
        M: Clone + 'a,
    {
        let size = self.state.icon_size.get();
        let side = Length::Fixed(f32::from(size));

        let icon: Element<'a, M> = match &*self.state.icon.borrow() {
            RenderedIcon::Bitmap(handle) => image(handle.clone()).width(side).height(side).into(),
            RenderedIcon::Missing { size } => container(text("?").size(f32::from(*size) * 0.6))
                .width(side)
                .height(side)
                .center_x(side)
                .center_y(side)
                .into(),
        };

        let ItemStyle {
            padding,
            text: text_color,
            hover,
        } = style;
        let framed = container(icon).padding(padding).style(tray_icon_style(
            text_color,
            hover,
            self.state.hovered.get(),
        ));

        let clickable = mouse_area(framed)
            .interaction(mouse::Interaction::Pointer)
            .on_press(on_input(ItemInput::Press(BUTTON_PRIMARY)))
            .on_middle_press(on_input(ItemInput::Press(BUTTON_MIDDLE)))
            .on_right_press(on_input(ItemInput::Press(BUTTON_SECONDARY)))
            .on_enter(on_input(ItemInput::Hover(true)))
            .on_exit(on_input(ItemInput::Hover(false)));

        tooltip(
            clickable,
            text(self.state.tooltip.borrow().clone()).size(12),
            tooltip::Position::Bottom,
        )
        .into()
    }
}

impl WidgetState {
    pub(super) fn resize(&self, size: u16) {
        self.icon_size.set(size.max(1));
        self.refresh();
    }

    fn refresh(&self) {
        let size = self.icon_size.get();
        let icon = match self.item.preferred_icon(size) {
            Some(handle) => RenderedIcon::Bitmap(handle),
            None => RenderedIcon::Missing { size },
        };
        let tooltip = tooltip_text(self.item.as_ref());

        *self.icon.borrow_mut() = icon;
        *self.tooltip.borrow_mut() = tooltip;
    }

    /// Dispatch a pointer press to the item.
    ///
    /// Only a failed secondary activation that is not a decline comes back
    /// as an error; everything else is handled here.
    pub(super) fn on_button_press(&self, event: &PointerEvent) -> Result<(), TrayError> {
        let item = self.item.as_ref();

        match event.button {
            BUTTON_PRIMARY => {
                if item.is_menu() {
                    item.invoke_menu(event);
                    return Ok(());
                }

                match item.activate(event) {
                    Ok(()) => {}
                    Err(err) if err.is_expected() => item.invoke_menu(event),
                    Err(err) => warn!(
                        identifier = %item.identifier(),
                        error = %err,
                        "unexpected error activating tray item"
                    ),
                }
                Ok(())
            }
            BUTTON_MIDDLE => match item.secondary_activate(event) {
                Err(err) if err.is_expected() => Ok(()),
                other => other,
            },
            BUTTON_SECONDARY => {
                item.invoke_menu(event);
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

/// First non-empty of: tooltip description, tooltip title, item title in
/// title case, `"Unknown"`.
pub fn tooltip_text(item: &dyn TrayItem) -> String {
    let tooltip = item.tooltip();

    tooltip
        .description
        .filter(|s| !s.is_empty())
        .or_else(|| tooltip.title.filter(|s| !s.is_empty()))
        .or_else(|| {
            item.title()
                .filter(|s| !s.is_empty())
                .map(|s| title_case(&s))
        })
        .unwrap_or_else(|| "Unknown".to_string())
}

/// Upper-case the first letter of every word, lower-case the rest.
///
/// A word is a run of cased letters; uncased ones such as CJK or digits end
/// it, just like punctuation.
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut previous_cased = false;

    for c in s.chars() {
        if previous_cased {
            out.extend(c.to_lowercase());
        } else {
            out.extend(c.to_uppercase());
        }
        previous_cased = c.is_lowercase() || c.is_uppercase();
    }

    out
}
