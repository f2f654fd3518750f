//! Context menus of tray items.
//!
//! The DBusMenu tree sent by the client is flattened into [`MenuItem`]s,
//! which the host renders in a popup window.

use iced::widget::{button, column, container, row, text, Space};
use iced::{Border, Color, Element, Length};
use system_tray::menu::{MenuItem as SniMenuItem, MenuType, ToggleState, ToggleType, TrayMenu};

use crate::styles::menu_row_style;

/// Rough height of one rendered row, used to size popup windows.
pub const ROW_HEIGHT: u32 = 28;

/// One visible menu entry.
#[derive(Debug, Clone, PartialEq)]
pub struct MenuItem {
    /// DBusMenu id, sent back on activation
    pub id: i32,
    pub label: String,
    pub enabled: bool,
    pub is_separator: bool,
    /// Checkbox or radio item
    pub is_checkable: bool,
    pub is_checked: bool,
    pub submenu: Vec<MenuItem>,
}

impl MenuItem {
    fn is_visible(&self) -> bool {
        self.is_separator || !self.label.is_empty()
    }
}

/// Visible entries of `menu`, with mnemonics stripped.
pub fn convert_menu(menu: &TrayMenu) -> Vec<MenuItem> {
    menu.submenus
        .iter()
        .filter(|item| item.visible)
        .map(convert_menu_item)
        .collect()
}

fn convert_menu_item(item: &SniMenuItem) -> MenuItem {
    MenuItem {
        id: item.id,
        label: strip_mnemonic(item.label.as_deref().unwrap_or_default()),
        enabled: item.enabled,
        is_separator: matches!(item.menu_type, MenuType::Separator),
        is_checkable: !matches!(item.toggle_type, ToggleType::CannotBeToggled),
        is_checked: matches!(item.toggle_state, ToggleState::On),
        submenu: item
            .submenu
            .iter()
            .filter(|child| child.visible)
            .map(convert_menu_item)
            .collect(),
    }
}

/// Drop access key markers (`_File` -> `File`), keeping escaped `__` as `_`.
fn strip_mnemonic(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    let mut chars = label.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '_' {
            if chars.peek() == Some(&'_') {
                chars.next();
                out.push('_');
            }
            continue;
        }
        out.push(c);
    }

    out
}

/// Number of rows [`render_menu`] draws for `items`.
pub fn row_count(items: &[MenuItem]) -> usize {
    items
        .iter()
        .filter(|item| item.is_visible())
        .map(|item| 1 + row_count(&item.submenu))
        .sum()
}

/// Colors used by [`render_menu`].
#[derive(Debug, Clone, Copy)]
pub struct MenuPalette {
    pub surface: Color,
    pub border: Color,
    pub hover: Color,
    pub text: Color,
    pub muted: Color,
    pub font_size: f32,
}

/// Render a menu as an Iced element. Submenus are shown inline, indented
/// under their parent.
pub fn render_menu<'a, M>(
    items: &'a [MenuItem],
    palette: MenuPalette,
    on_item_click: impl Fn(i32) -> M + Clone + 'a,
) -> Element<'a, M>
where
    M: Clone + 'a,
{
    let mut rows = Vec::new();
    push_rows(&mut rows, items, 0, palette, &on_item_click);

    if rows.is_empty() {
        return Space::new(0, 0).into();
    }

    container(column(rows).spacing(0).width(Length::Fill))
        .width(Length::Fill)
        .height(Length::Fill)
        .padding(4)
        .style(move |_theme| container::Style {
            background: Some(palette.surface.into()),
            border: Border {
                color: palette.border,
                width: 1.0,
                radius: 6.0.into(),
            },
            ..Default::default()
        })
        .into()
}

fn push_rows<'a, M>(
    rows: &mut Vec<Element<'a, M>>,
    items: &'a [MenuItem],
    depth: u16,
    palette: MenuPalette,
    on_item_click: &(impl Fn(i32) -> M + Clone + 'a),
) where
    M: Clone + 'a,
{
    for item in items.iter().filter(|item| item.is_visible()) {
        rows.push(render_menu_item(item, depth, palette, on_item_click.clone()));
        push_rows(rows, &item.submenu, depth + 1, palette, on_item_click);
    }
}

fn render_menu_item<'a, M>(
    item: &'a MenuItem,
    depth: u16,
    palette: MenuPalette,
    on_click: impl Fn(i32) -> M + 'a,
) -> Element<'a, M>
where
    M: Clone + 'a,
{
    if item.is_separator {
        return container(Space::new(Length::Fill, 1))
            .style(move |_theme| container::Style {
                background: Some(palette.border.into()),
                ..Default::default()
            })
            .width(Length::Fill)
            .padding([4, 0])
            .into();
    }

    let check_mark: Element<'_, M> = if item.is_checkable {
        text(if item.is_checked { "✓" } else { " " })
            .size(palette.font_size - 1.0)
            .into()
    } else {
        Space::new(0, 0).into()
    };

    let content = row![
        Space::with_width(f32::from(depth) * 12.0),
        check_mark,
        text(&item.label).size(palette.font_size),
    ]
    .spacing(4)
    .align_y(iced::Alignment::Center);

    let has_submenu = !item.submenu.is_empty();
    let mut btn = button(content)
        .width(Length::Fill)
        .padding([6, 12])
        .style(menu_row_style(
            item.enabled,
            palette.text,
            palette.muted,
            palette.hover,
        ));

    // Submenu parents only group their children.
    if item.enabled && !has_submenu {
        btn = btn.on_press(on_click(item.id));
    }

    btn.into()
}
