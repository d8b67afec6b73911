use std::{env, str::FromStr, sync::OnceLock};

use ratatui::style::{Color, Modifier, Style};
use thiserror::Error;

use tablemate::table::NoticeKind;

const THEME_ENV: &str = "TABLEMATE_THEME";
/// Backgrounds brighter than this get the light palette.
const LIGHT_BACKGROUND_LUMA: f32 = 0.6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Light,
    Dark,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown theme {0:?} (expected light or dark)")]
pub struct UnknownMode(String);

impl FromStr for Mode {
    type Err = UnknownMode;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "light" => Ok(Mode::Light),
            "dark" => Ok(Mode::Dark),
            _ => Err(UnknownMode(raw.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Palette {
    backdrop: Color,
    surface: Color,
    popup: Color,
    field: Color,
    ink: Color,
    faint: Color,
    rule: Color,
    heading: Color,
    title: Color,
    cursor_bg: Color,
    cursor_fg: Color,
    ok: Color,
    busy: Color,
    danger: Color,
}

const DARK: Palette = Palette {
    backdrop: Color::Rgb(14, 20, 22),
    surface: Color::Rgb(20, 28, 31),
    popup: Color::Rgb(28, 38, 42),
    field: Color::Rgb(36, 48, 53),
    ink: Color::Rgb(214, 222, 218),
    faint: Color::Rgb(128, 146, 142),
    rule: Color::Rgb(58, 76, 80),
    heading: Color::Rgb(230, 196, 98),
    title: Color::Rgb(94, 200, 180),
    cursor_bg: Color::Rgb(44, 84, 88),
    cursor_fg: Color::Rgb(240, 246, 244),
    ok: Color::Rgb(120, 204, 140),
    busy: Color::Rgb(224, 166, 72),
    danger: Color::Rgb(232, 96, 96),
};

const LIGHT: Palette = Palette {
    backdrop: Color::Rgb(244, 241, 234),
    surface: Color::Rgb(252, 250, 245),
    popup: Color::Rgb(255, 255, 255),
    field: Color::Rgb(234, 230, 220),
    ink: Color::Rgb(36, 40, 38),
    faint: Color::Rgb(112, 116, 108),
    rule: Color::Rgb(186, 180, 166),
    heading: Color::Rgb(150, 96, 10),
    title: Color::Rgb(10, 118, 108),
    cursor_bg: Color::Rgb(196, 228, 222),
    cursor_fg: Color::Rgb(18, 40, 36),
    ok: Color::Rgb(40, 130, 60),
    busy: Color::Rgb(168, 98, 0),
    danger: Color::Rgb(186, 40, 40),
};

/// Styles by role: the table, the dialog, popups and notices ask for what
/// they draw, not for raw colors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Theme {
    palette: Palette,
}

impl Theme {
    pub fn new(mode: Mode) -> Self {
        let palette = match mode {
            Mode::Light => LIGHT,
            Mode::Dark => DARK,
        };
        Self { palette }
    }

    /// `TABLEMATE_THEME` if set and valid, otherwise the terminal's
    /// background. Resolved once per process.
    pub fn detect() -> Self {
        static THEME: OnceLock<Theme> = OnceLock::new();
        *THEME.get_or_init(|| Self::new(detect_mode()))
    }

    pub fn backdrop(&self) -> Color {
        self.palette.backdrop
    }

    pub fn popup_bg(&self) -> Color {
        self.palette.popup
    }

    /// Body of the table block.
    pub fn surface(&self) -> Style {
        Style::default()
            .bg(self.palette.surface)
            .fg(self.palette.ink)
    }

    pub fn popup(&self) -> Style {
        Style::default()
            .bg(self.palette.popup)
            .fg(self.palette.ink)
    }

    pub fn text(&self) -> Style {
        Style::default().fg(self.palette.ink)
    }

    pub fn muted(&self) -> Style {
        Style::default().fg(self.palette.faint)
    }

    /// Field names and `key:` prefixes.
    pub fn label(&self) -> Style {
        self.muted().add_modifier(Modifier::BOLD)
    }

    /// Key names in the help footer.
    pub fn key(&self) -> Style {
        self.text().add_modifier(Modifier::BOLD)
    }

    pub fn rule(&self) -> Style {
        Style::default().fg(self.palette.rule)
    }

    pub fn title(&self) -> Style {
        Style::default()
            .fg(self.palette.title)
            .add_modifier(Modifier::BOLD)
    }

    pub fn column_header(&self) -> Style {
        Style::default()
            .fg(self.palette.heading)
            .add_modifier(Modifier::BOLD)
    }

    /// An identifier that is only a hint.
    pub fn proposed(&self) -> Style {
        Style::default().fg(self.palette.heading)
    }

    pub fn highlight(&self) -> Style {
        Style::default()
            .bg(self.palette.cursor_bg)
            .fg(self.palette.cursor_fg)
    }

    pub fn field(&self, focused: bool) -> Style {
        if focused {
            self.highlight()
        } else {
            Style::default()
                .bg(self.palette.field)
                .fg(self.palette.ink)
        }
    }

    pub fn busy(&self) -> Style {
        Style::default().fg(self.palette.busy)
    }

    pub fn danger(&self) -> Style {
        Style::default().fg(self.palette.danger)
    }

    /// Border of a block, red once the thing inside has failed.
    pub fn frame(&self, failed: bool) -> Style {
        if failed { self.danger() } else { self.rule() }
    }

    pub fn notice(&self, kind: NoticeKind) -> Style {
        match kind {
            NoticeKind::Info => Style::default().fg(self.palette.ok),
            NoticeKind::Error => self.danger(),
        }
    }
}

fn detect_mode() -> Mode {
    if let Ok(raw) = env::var(THEME_ENV) {
        match raw.parse() {
            Ok(mode) => return mode,
            Err(err) => {
                tracing::warn!(env = THEME_ENV, error = %err, "Ignoring theme override")
            }
        }
    }
    match terminal_light::luma() {
        Ok(luma) if luma.is_finite() => mode_for_luma(luma),
        Ok(_) => Mode::Dark,
        Err(err) => {
            tracing::debug!(error = ?err, "Terminal background unknown, using dark theme");
            Mode::Dark
        }
    }
}

fn mode_for_luma(luma: f32) -> Mode {
    if luma > LIGHT_BACKGROUND_LUMA {
        Mode::Light
    } else {
        Mode::Dark
    }
}
