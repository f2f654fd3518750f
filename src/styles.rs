//! Button styles shared by the tray icons and the menu popups.

use iced::widget::{button, container};
use iced::{Border, Color};

fn hover_background(status: button::Status, hover: Color) -> Option<iced::Background> {
    match status {
        button::Status::Hovered | button::Status::Pressed => Some(hover.into()),
        _ => None,
    }
}

/// Style for a tray icon: transparent until hovered, rounded corners.
pub fn tray_icon_style(
    text_color: Color,
    hover_bg: Color,
    hovered: bool,
) -> impl Fn(&iced::Theme) -> container::Style {
    move |_theme| container::Style {
        background: hovered.then(|| hover_bg.into()),
        text_color: Some(text_color),
        border: Border {
            radius: 4.0.into(),
            ..Border::default()
        },
        ..container::Style::default()
    }
}

/// Style for one row of a tray menu.
///
/// Disabled rows never highlight and use `muted_color` for their label.
pub fn menu_row_style(
    enabled: bool,
    text_color: Color,
    muted_color: Color,
    hover_bg: Color,
) -> impl Fn(&iced::Theme, button::Status) -> button::Style {
    move |_theme, status| button::Style {
        background: if enabled {
            hover_background(status, hover_bg)
        } else {
            None
        },
        text_color: if enabled { text_color } else { muted_color },
        border: Border::default(),
        shadow: Default::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_menu_rows_do_not_highlight() {
        let hover = Color::from_rgb(0.2, 0.2, 0.3);
        let muted = Color::from_rgb(0.5, 0.5, 0.5);
        let style = menu_row_style(false, Color::WHITE, muted, hover);

        let hovered = style(&iced::Theme::Dark, button::Status::Hovered);
        assert!(hovered.background.is_none());
        assert_eq!(hovered.text_color, muted);
    }

    #[test]
    fn tray_icons_highlight_on_hover() {
        let hover = Color::from_rgb(0.2, 0.2, 0.3);
        let idle = tray_icon_style(Color::WHITE, hover, false)(&iced::Theme::Dark);
        assert!(idle.background.is_none());

        let hovered = tray_icon_style(Color::WHITE, hover, true)(&iced::Theme::Dark);
        assert_eq!(hovered.background, Some(hover.into()));
    }
}
