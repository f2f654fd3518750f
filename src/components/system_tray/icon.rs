//! Turning what an SNI item publishes into an image handle.
//!
//! Pixmaps win over names. Names are either absolute paths or looked up in
//! the item's own theme directory.

use iced::widget::image;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{LazyLock, RwLock};
use system_tray::item::IconPixmap;

/// Raw ARGB32 icon as published by an SNI item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pixmap {
    pub width: i32,
    pub height: i32,
    /// ARGB32, network byte order.
    pub pixels: Vec<u8>,
}

impl From<&IconPixmap> for Pixmap {
    fn from(pixmap: &IconPixmap) -> Self {
        Self {
            width: pixmap.width,
            height: pixmap.height,
            pixels: pixmap.pixels.clone(),
        }
    }
}

/// Everything an item publishes about its icon.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IconSource {
    pub pixmaps: Vec<Pixmap>,
    pub icon_name: Option<String>,
    pub icon_theme_path: Option<String>,
}

/// `(theme path, icon name)` to the file found there, if any.
/// Key: (theme_path, icon_name, size), Value: resolved path or None
static ICON_CACHE: LazyLock<RwLock<HashMap<(String, String, u16), Option<PathBuf>>>> =
    LazyLock::new(|| RwLock::new(HashMap::new()));

/// Resolve the best icon for a square of `size` pixels.
///
/// Resolution priority:
/// 1. Icon pixmap (raw ARGB32 data from the app), closest to `size`
/// 2. Icon name within the item's custom theme path (cached)
///
/// Freedesktop theme lookup is left to the toolkit and not attempted here.
pub fn resolve_icon(source: &IconSource, size: u16) -> Option<image::Handle> {
    if let Some(handle) = pixmap_to_handle(&source.pixmaps, size) {
        return Some(handle);
    }

    let icon_name = source.icon_name.as_deref().filter(|n| !n.is_empty())?;

    // Absolute paths are occasionally published as icon names.
    let direct = PathBuf::from(icon_name);
    if direct.is_absolute() && direct.exists() {
        return Some(image::Handle::from_path(direct));
    }

    let theme_path = source.icon_theme_path.as_deref().filter(|p| !p.is_empty())?;
    find_icon_in_path_cached(theme_path, icon_name, size).map(image::Handle::from_path)
}

/// RGBA handle for the pixmap closest to `size`.
fn pixmap_to_handle(pixmaps: &[Pixmap], size: u16) -> Option<image::Handle> {
    let pixmap = closest_pixmap(pixmaps, size)?;

    let rgba = argb32_to_rgba(
        &pixmap.pixels,
        pixmap.width as usize,
        pixmap.height as usize,
    );

    Some(image::Handle::from_rgba(
        pixmap.width as u32,
        pixmap.height as u32,
        rgba,
    ))
}

/// Pick the usable pixmap whose width is closest to `size`.
fn closest_pixmap(pixmaps: &[Pixmap], size: u16) -> Option<&Pixmap> {
    pixmaps
        .iter()
        .filter(|p| p.width > 0 && p.height > 0 && !p.pixels.is_empty())
        .min_by_key(|p| (p.width - i32::from(size)).abs())
}

/// Reorder `[A, R, G, B]` pixels into `[R, G, B, A]`. Short buffers yield a
/// fully transparent image.
fn argb32_to_rgba(argb: &[u8], width: usize, height: usize) -> Vec<u8> {
    let expected_len = width * height * 4;
    if argb.len() < expected_len {
        return vec![0; expected_len];
    }

    argb[..expected_len]
        .chunks_exact(4)
        .flat_map(|px| [px[1], px[2], px[3], px[0]])
        .collect()
}

/// [`find_icon_in_path`], remembering both hits and misses.
fn find_icon_in_path_cached(theme_path: &str, icon_name: &str, size: u16) -> Option<PathBuf> {
    let key = (theme_path.to_string(), icon_name.to_string(), size);

    if let Ok(cache) = ICON_CACHE.read() {
        if let Some(cached) = cache.get(&key) {
            return cached.clone();
        }
    }

    let result = find_icon_in_path(theme_path, icon_name, size);

    if let Ok(mut cache) = ICON_CACHE.write() {
        cache.insert(key, result.clone());
    }

    result
}

/// Look for `icon_name` under the theme path the item published.
fn find_icon_in_path(theme_path: &str, icon_name: &str, size: u16) -> Option<PathBuf> {
    let extensions = ["png", "svg", "xpm"];
    let sizes: [u16; 6] = [size, 24, 32, 48, 22, 16];
    let root = PathBuf::from(theme_path);

    // Size-specific directories, then the bare directory, then hicolor.
    let candidates = sizes
        .iter()
        .map(|s| root.join(format!("{s}x{s}")))
        .chain(std::iter::once(root.clone()))
        .chain(
            sizes
                .iter()
                .map(|s| root.join("hicolor").join(format!("{s}x{s}")).join("apps")),
        );

    for dir in candidates {
        for ext in &extensions {
            let path = dir.join(format!("{icon_name}.{ext}"));
            if path.exists() {
                return Some(path);
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: i32, argb: [u8; 4]) -> Pixmap {
        Pixmap {
            width,
            height: width,
            pixels: argb.repeat((width * width) as usize),
        }
    }

    #[test]
    fn argb_is_reordered_to_rgba() {
        let rgba = argb32_to_rgba(&[0x80, 1, 2, 3, 0xff, 4, 5, 6], 2, 1);
        assert_eq!(rgba, vec![1, 2, 3, 0x80, 4, 5, 6, 0xff]);
    }

    #[test]
    fn short_pixel_data_becomes_transparent() {
        assert_eq!(argb32_to_rgba(&[1, 2, 3], 1, 1), vec![0; 4]);
    }

    #[test]
    fn closest_pixmap_wins() {
        let pixmaps = vec![solid(16, [255; 4]), solid(22, [255; 4]), solid(64, [255; 4])];
        assert_eq!(closest_pixmap(&pixmaps, 24).map(|p| p.width), Some(22));
        assert_eq!(closest_pixmap(&pixmaps, 48).map(|p| p.width), Some(64));
    }

    #[test]
    fn empty_pixmaps_are_skipped() {
        let pixmaps = vec![
            Pixmap {
                width: 24,
                height: 24,
                pixels: Vec::new(),
            },
            solid(0, [0; 4]),
        ];
        assert!(closest_pixmap(&pixmaps, 24).is_none());
        assert!(resolve_icon(
            &IconSource {
                pixmaps,
                ..IconSource::default()
            },
            24
        )
        .is_none());
    }

    #[test]
    fn finds_icon_in_sized_theme_directory() {
        let dir = tempfile::tempdir().unwrap();
        let sized = dir.path().join("24x24");
        std::fs::create_dir_all(&sized).unwrap();
        std::fs::write(sized.join("app-indicator.png"), b"png").unwrap();

        let found = find_icon_in_path(dir.path().to_str().unwrap(), "app-indicator", 24);
        assert_eq!(found, Some(sized.join("app-indicator.png")));
    }

    #[test]
    fn finds_icon_in_hicolor_layout() {
        let dir = tempfile::tempdir().unwrap();
        let apps = dir.path().join("hicolor").join("32x32").join("apps");
        std::fs::create_dir_all(&apps).unwrap();
        std::fs::write(apps.join("tray.svg"), b"<svg/>").unwrap();

        let found = find_icon_in_path(dir.path().to_str().unwrap(), "tray", 24);
        assert_eq!(found, Some(apps.join("tray.svg")));
    }

    #[test]
    fn missing_name_resolves_to_nothing() {
        let source = IconSource {
            icon_name: Some("does-not-exist".into()),
            icon_theme_path: Some("/nonexistent/theme".into()),
            ..IconSource::default()
        };
        assert!(resolve_icon(&source, 24).is_none());
    }
}
