use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::{
    Frame,
    layout::{Constraint, Layout, Margin, Position, Rect},
    style::Modifier,
    text::{Line, Span},
    widgets::{Block, BorderType, Clear, Paragraph, Wrap},
};
use unicode_width::UnicodeWidthStr;

use tablemate::table::{Draft, EditMode, EditSession, FieldSpec, TableSchema};

use super::{help::Entry, theme::Theme};
use crate::util::{centered_rect, fill_bg, pad};

pub const HELP: &[Entry] = &[
    Entry::new("tab/↑/↓", "field"),
    Entry::new("⏎", "save"),
    Entry::new("esc", "cancel"),
];

/// What a key press inside the dialog asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialogAction {
    SetField { field: String, value: String },
    Focus(usize),
    Submit,
    Close,
    Ignore,
}

/// Text editing always happens at the end of the focused field.
pub fn action_for_key(
    key: &KeyEvent,
    fields: &[FieldSpec],
    draft: &Draft,
    focus: usize,
) -> DialogAction {
    let count = fields.len();
    let Some(field) = fields.get(focus) else {
        return DialogAction::Ignore;
    };
    match key.code {
        KeyCode::Esc => DialogAction::Close,
        KeyCode::Enter => DialogAction::Submit,
        KeyCode::Tab | KeyCode::Down => DialogAction::Focus((focus + 1) % count),
        KeyCode::BackTab | KeyCode::Up => DialogAction::Focus((focus + count - 1) % count),
        KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            DialogAction::SetField {
                field: field.name.clone(),
                value: String::new(),
            }
        }
        KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
            let mut value = draft.get(&field.name).to_string();
            value.push(c);
            DialogAction::SetField {
                field: field.name.clone(),
                value,
            }
        }
        KeyCode::Backspace => {
            let mut value = draft.get(&field.name).to_string();
            if value.pop().is_none() {
                return DialogAction::Ignore;
            }
            DialogAction::SetField {
                field: field.name.clone(),
                value,
            }
        }
        _ => DialogAction::Ignore,
    }
}

fn identifier_line(session: &EditSession, theme: &Theme) -> Line<'static> {
    let label = Span::styled("ID  ", theme.label());
    let value = match session.mode() {
        EditMode::Edit { original } => Span::styled(original.id.to_string(), theme.text()),
        EditMode::Create { hint: Some(hint) } => {
            Span::styled(format!("{} (proposed)", hint.value), theme.proposed())
        }
        EditMode::Create { hint: None } => Span::styled("assigned on save", theme.muted()),
    };
    Line::from(vec![label, value])
}

pub fn render(
    frame: &mut Frame,
    area: Rect,
    theme: &Theme,
    schema: &TableSchema,
    session: &EditSession,
    focus: usize,
) {
    let label_width = schema
        .fields
        .iter()
        .map(|field| field.label.width())
        .max()
        .unwrap_or(0)
        + 2;
    let height = schema.fields.len() as u16 + 8;
    let width = (area.width * 3 / 5).max(44);
    let area = centered_rect(area, width, height);
    frame.render_widget(Clear, area);
    fill_bg(frame.buffer_mut(), area, theme.popup_bg());

    let title = if session.is_create() {
        format!("New {}", schema.label)
    } else {
        format!("Edit {}", schema.label)
    };
    let border = if session.error().is_some() {
        theme.danger()
    } else {
        theme.title()
    };
    let block = Block::bordered()
        .border_type(BorderType::Rounded)
        .title(Line::styled(pad(title, 1), border.add_modifier(Modifier::BOLD)))
        .border_style(border)
        .style(theme.popup());
    let inner = block.inner(area).inner(Margin::new(1, 1));
    frame.render_widget(block, area);

    let mut constraints = vec![Constraint::Length(1), Constraint::Length(1)];
    constraints.extend(schema.fields.iter().map(|_| Constraint::Length(1)));
    constraints.push(Constraint::Fill(1));
    constraints.push(Constraint::Length(1));
    let rows = Layout::vertical(constraints).split(inner);

    frame.render_widget(Paragraph::new(identifier_line(session, theme)), rows[0]);

    let draft = session.draft();
    for (idx, field) in schema.fields.iter().enumerate() {
        let area = rows[idx + 2];
        let focused = idx == focus;
        let marker = if field.required { "*" } else { " " };
        let label = format!("{}{marker}", field.label);
        let value = draft.get(&field.name);
        let value_width = (area.width as usize).saturating_sub(label_width);
        let line = Line::from(vec![
            Span::styled(format!("{label:<label_width$}"), theme.muted()),
            Span::styled(
                format!(
                    "{value}{}",
                    " ".repeat(value_width.saturating_sub(value.width()))
                ),
                theme.field(focused),
            ),
        ]);
        frame.render_widget(Paragraph::new(line), area);
        if focused && !session.is_submitting() {
            let offset = (label_width + value.width()).min((area.width as usize).saturating_sub(1));
            frame.set_cursor_position(Position::new(area.x + offset as u16, area.y));
        }
    }

    let message_area = rows[schema.fields.len() + 2];
    if let Some(err) = session.error() {
        let message = Paragraph::new(Span::styled(err.to_string(), theme.danger()))
            .wrap(Wrap { trim: true });
        frame.render_widget(message, message_area);
    }

    let status_area = rows[schema.fields.len() + 3];
    let status = if session.is_submitting() {
        Span::styled("Saving…", theme.busy())
    } else {
        Span::styled("* required", theme.muted())
    };
    frame.render_widget(Paragraph::new(Line::from(status).right_aligned()), status_area);
}
