use iced::{Color, Theme};
use tracing::warn;

use crate::components::system_tray::item::ItemStyle;
use crate::components::system_tray::menu::MenuPalette;
use crate::config::{Config, ThemeConfig};

// The tray never shows success or danger states; iced still wants them.
const SUCCESS: Color = Color::from_rgb(0.62, 0.81, 0.42);
const DANGER: Color = Color::from_rgb(0.97, 0.46, 0.56);

/// Colors and metrics resolved from the config once per (re)load.
#[derive(Clone, Copy, Debug)]
pub struct AppTheme {
    background: Color,
    text: Color,
    accent: Color,
    muted: Color,
    hover: Color,
    menu_background: Color,
    menu_border: Color,
    menu_font_size: f32,
    spacing: f32,
    padding: f32,
}

impl From<&Config> for AppTheme {
    fn from(config: &Config) -> Self {
        let ThemeConfig {
            background,
            background_alpha,
            text,
            accent,
            muted,
            hover,
            hover_alpha,
            menu_background,
            menu_background_alpha,
            menu_border,
            menu_font_size,
        } = &config.theme;

        Self {
            background: hex_color(background, *background_alpha),
            text: hex_color(text, 1.0),
            accent: hex_color(accent, 1.0),
            muted: hex_color(muted, 1.0),
            hover: hex_color(hover, *hover_alpha),
            menu_background: hex_color(menu_background, *menu_background_alpha),
            menu_border: hex_color(menu_border, 1.0),
            menu_font_size: *menu_font_size,
            spacing: config.tray.spacing,
            padding: config.tray.padding,
        }
    }
}

impl AppTheme {
    pub fn background(&self) -> Color {
        self.background
    }

    pub fn accent(&self) -> Color {
        self.accent
    }

    pub fn spacing(&self) -> f32 {
        self.spacing
    }

    pub fn item_style(&self) -> ItemStyle {
        ItemStyle {
            padding: self.padding,
            text: self.text,
            hover: self.hover,
        }
    }

    pub fn menu_palette(&self) -> MenuPalette {
        MenuPalette {
            surface: self.menu_background,
            border: self.menu_border,
            hover: self.hover,
            text: self.text,
            muted: self.muted,
            font_size: self.menu_font_size,
        }
    }
}

impl From<AppTheme> for Theme {
    fn from(theme: AppTheme) -> Self {
        Theme::custom(
            String::from("traybar"),
            iced::theme::Palette {
                // The bar draws its own rounded background.
                background: Color::TRANSPARENT,
                text: theme.text,
                primary: theme.accent,
                success: SUCCESS,
                danger: DANGER,
            },
        )
    }
}

/// Parse `#rrggbb` (the `#` is optional). Anything else logs and falls back
/// to white so a typo never hides the bar.
fn hex_color(hex: &str, alpha: f32) -> Color {
    let digits = hex.trim_start_matches('#');
    let channel = |range: std::ops::Range<usize>| {
        digits
            .get(range)
            .and_then(|pair| u8::from_str_radix(pair, 16).ok())
    };

    match (digits.len(), channel(0..2), channel(2..4), channel(4..6)) {
        (6, Some(r), Some(g), Some(b)) => Color::from_rgba8(r, g, b, alpha),
        _ => {
            warn!(color = hex, "invalid color in config, using white");
            Color::from_rgba(1.0, 1.0, 1.0, alpha)
        }
    }
}
