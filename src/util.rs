use std::path::Path;

use directories::BaseDirs;
use ratatui::{buffer::Buffer, layout::Rect, style::Color};

pub fn fill_bg(buf: &mut Buffer, area: Rect, color: Color) {
    let area = area.intersection(buf.area);
    for x in area.left()..area.right() {
        for y in area.top()..area.bottom() {
            buf[(x, y)].set_bg(color);
        }
    }
}

pub fn pad<S: AsRef<str>>(s: S, pad: usize) -> String {
    let margin = " ".repeat(pad);
    format!("{margin}{}{margin}", s.as_ref())
}

/// A `width` x `height` rect centered in `area`, shrunk to fit.
pub fn centered_rect(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}

pub fn abbreviate_home(path: &Path) -> String {
    let Some(base_dirs) = BaseDirs::new() else {
        return path.display().to_string();
    };
    match path.strip_prefix(base_dirs.home_dir()) {
        Ok(rest) if rest.as_os_str().is_empty() => "~".to_string(),
        Ok(rest) => format!("~/{}", rest.display()),
        Err(_) => path.display().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pad_wraps_both_sides() {
        assert_eq!(pad("Brands", 2), "  Brands  ");
        assert_eq!(pad("x", 0), "x");
    }

    #[test]
    fn centered_rect_shrinks_to_fit() {
        assert_eq!(
            centered_rect(Rect::new(0, 0, 80, 24), 40, 10),
            Rect::new(20, 7, 40, 10)
        );
        assert_eq!(
            centered_rect(Rect::new(2, 1, 20, 5), 40, 10),
            Rect::new(2, 1, 20, 5)
        );
    }
}
