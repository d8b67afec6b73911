use ratatui::{
    Frame,
    layout::{Alignment, Rect},
    text::{Line, Span},
    widgets::{Paragraph, Wrap},
};

use super::theme::Theme;

/// One key hint in the footer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry {
    pub keys: &'static str,
    pub short: &'static str,
}

impl Entry {
    pub const fn new(keys: &'static str, short: &'static str) -> Self {
        Self { keys, short }
    }
}

fn spans<'a>(entries: &[Entry], theme: &Theme) -> Vec<Span<'a>> {
    let mut spans: Vec<Span<'a>> = entries
        .iter()
        .flat_map(|entry| {
            [
                Span::styled(format!("[{}]", entry.keys), theme.key()),
                Span::raw(" "),
                Span::styled(entry.short, theme.muted()),
                Span::styled(" • ", theme.rule()),
            ]
        })
        .collect();
    // trailing separator
    spans.pop();
    spans
}

pub fn render(entries: &[Entry], frame: &mut Frame, area: Rect, theme: &Theme) {
    let footer = Paragraph::new(Line::from(spans(entries, theme)))
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true });
    frame.render_widget(footer, area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::widgets::theme::Mode;

    #[test]
    fn separators_sit_between_entries_only() {
        let theme = Theme::new(Mode::Dark);
        let entries = [Entry::new("n", "next"), Entry::new("p", "previous")];
        let text: String = spans(&entries, &theme)
            .iter()
            .map(|span| span.content.as_ref())
            .collect();
        assert_eq!(text, "[n] next • [p] previous");
    }
}
