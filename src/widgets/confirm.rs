use crossterm::event::{KeyCode, KeyEvent};
use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Layout, Margin, Rect},
    style::Modifier,
    text::{Line, Span, Text},
    widgets::{Block, BorderType, Clear, Paragraph, Wrap},
};

use super::{help::Entry, theme::Theme};
use crate::util::{centered_rect, fill_bg, pad};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Selection {
    Confirm,
    Cancel,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Answer {
    Confirmed,
    Cancelled,
    Undecided,
}

/// Yes/no popup for destructive actions. Starts on Cancel.
pub struct ConfirmPopup {
    title: String,
    message: String,
    confirm_label: String,
    selection: Selection,
}

impl ConfirmPopup {
    pub const HELP: &'static [Entry] = &[
        Entry::new("tab/←/→", "move"),
        Entry::new("⏎", "select"),
        Entry::new("y", "confirm"),
        Entry::new("esc", "cancel"),
    ];

    pub fn new(
        title: impl Into<String>,
        message: impl Into<String>,
        confirm_label: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            confirm_label: confirm_label.into(),
            selection: Selection::Cancel,
        }
    }

    pub fn handle_key(&mut self, key: &KeyEvent) -> Answer {
        match key.code {
            KeyCode::Char('y') => Answer::Confirmed,
            KeyCode::Char('n') | KeyCode::Esc => Answer::Cancelled,
            KeyCode::Left | KeyCode::Right | KeyCode::Tab | KeyCode::BackTab => {
                self.selection = match self.selection {
                    Selection::Confirm => Selection::Cancel,
                    Selection::Cancel => Selection::Confirm,
                };
                Answer::Undecided
            }
            KeyCode::Enter => match self.selection {
                Selection::Confirm => Answer::Confirmed,
                Selection::Cancel => Answer::Cancelled,
            },
            _ => Answer::Undecided,
        }
    }

    pub fn rect(area: Rect) -> Rect {
        let width = (area.width * 2 / 5)
            .max(34)
            .min(area.width.saturating_sub(4));
        let height = 8u16.min(area.height.saturating_sub(2));
        centered_rect(area, width, height)
    }

    pub fn render(&self, frame: &mut Frame, area: Rect, theme: &Theme) {
        let area = Self::rect(area);
        frame.render_widget(Clear, area);
        fill_bg(frame.buffer_mut(), area, theme.popup_bg());
        let title = Line::styled(
            pad(self.title.as_str(), 1),
            theme.danger().add_modifier(Modifier::BOLD),
        )
        .centered();
        let block = Block::bordered()
            .border_type(BorderType::Rounded)
            .title(title)
            .border_style(theme.danger())
            .style(theme.popup());
        let inner = block.inner(area).inner(Margin::new(1, 0));
        frame.render_widget(block, area);
        let [body_area, buttons_area] =
            Layout::vertical([Constraint::Min(1), Constraint::Length(1)]).areas(inner);

        // `key=value` lines get a muted key.
        let lines: Vec<Line> = self
            .message
            .lines()
            .map(|line| match line.split_once('=') {
                Some((key, value)) => Line::from(vec![
                    Span::styled(format!("{key}: "), theme.label()),
                    Span::styled(value.to_string(), theme.text()),
                ]),
                None => Line::styled(line.to_string(), theme.text()),
            })
            .collect();
        let body = Paragraph::new(Text::from(lines))
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true });
        frame.render_widget(body, body_area);

        let danger = theme.danger().add_modifier(Modifier::BOLD);
        let confirm_style = if self.selection == Selection::Confirm {
            danger.add_modifier(Modifier::REVERSED)
        } else {
            danger
        };
        let cancel_style = if self.selection == Selection::Cancel {
            theme.highlight().add_modifier(Modifier::BOLD)
        } else {
            theme.text()
        };
        let buttons = Line::from(vec![
            Span::styled(format!("[ {} ]", self.confirm_label), confirm_style),
            Span::raw("  "),
            Span::styled("[ Cancel ]", cancel_style),
        ])
        .centered();
        frame.render_widget(Paragraph::new(buttons), buttons_area);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::KeyModifiers;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn enter_defaults_to_cancel() {
        let mut popup = ConfirmPopup::new("Delete", "Delete brand 3?", "Delete");
        assert_eq!(popup.handle_key(&key(KeyCode::Enter)), Answer::Cancelled);
    }

    #[test]
    fn tab_then_enter_confirms() {
        let mut popup = ConfirmPopup::new("Delete", "Delete brand 3?", "Delete");
        assert_eq!(popup.handle_key(&key(KeyCode::Tab)), Answer::Undecided);
        assert_eq!(popup.handle_key(&key(KeyCode::Enter)), Answer::Confirmed);
        assert_eq!(popup.handle_key(&key(KeyCode::Char('y'))), Answer::Confirmed);
        assert_eq!(popup.handle_key(&key(KeyCode::Esc)), Answer::Cancelled);
    }

    #[test]
    fn rect_is_centered_and_fits() {
        let area = Rect::new(0, 0, 100, 40);
        let rect = ConfirmPopup::rect(area);
        assert_eq!(rect, Rect::new(30, 16, 40, 8));
        let tiny = ConfirmPopup::rect(Rect::new(0, 0, 30, 6));
        assert!(tiny.width <= 26 && tiny.height <= 4);
    }
}
