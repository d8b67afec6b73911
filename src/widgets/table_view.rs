use std::time::{Duration, Instant};

use crossterm::event::{Event, KeyCode, KeyEvent};
use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    text::{Line, Span},
    widgets::{Block, HighlightSpacing, Paragraph, Row as TableRow, Table, TableState, Wrap},
};
use unicode_width::UnicodeWidthStr;

use tablemate::table::{
    Notice, NoticeKind, PendingOp, Phase, Row, SortDirection, TableEvent, TableManager,
};

use super::{
    confirm::{Answer, ConfirmPopup},
    dialog::{self, DialogAction},
    help::{self, Entry},
    theme::Theme,
};
use crate::util::pad;

const NOTICE_TTL: Duration = Duration::from_secs(5);
const PAGE_SIZE_STEP: usize = 5;

const HELP: &[Entry] = &[
    Entry::new("←/→", "page"),
    Entry::new("↑/↓", "select"),
    Entry::new("1-9", "sort"),
    Entry::new("+/-", "page size"),
    Entry::new("c", "create"),
    Entry::new("e", "edit"),
    Entry::new("d", "delete"),
    Entry::new("r", "retry"),
    Entry::new("q", "quit"),
];

/// A delete waiting for the user to confirm it.
struct PendingDelete {
    id: i64,
    popup: ConfirmPopup,
}

/// Paged view over one table with the create/edit dialog on top.
pub struct TableView {
    manager: TableManager,
    selected: usize,
    focus: usize,
    confirm: Option<PendingDelete>,
    notice: Option<(Notice, Instant)>,
}

impl TableView {
    pub fn new(manager: TableManager) -> Self {
        Self {
            manager,
            selected: 0,
            focus: 0,
            confirm: None,
            notice: None,
        }
    }

    pub fn start(&mut self) {
        self.manager.start();
    }

    pub async fn next_event(&mut self) -> Option<TableEvent> {
        self.manager.next_event().await
    }

    pub fn handle_table_event(&mut self, event: TableEvent) {
        self.manager.handle_event(event);
        self.after_update();
    }

    /// Column names in display order; `id` first.
    fn columns(&self) -> Vec<(&str, &str)> {
        std::iter::once(("id", "ID"))
            .chain(
                self.manager
                    .schema()
                    .fields
                    .iter()
                    .map(|field| (field.name.as_str(), field.label.as_str())),
            )
            .collect()
    }

    fn selected_row(&self) -> Option<&Row> {
        self.manager.controller().rows().get(self.selected)
    }

    fn after_update(&mut self) {
        let len = self.manager.controller().rows().len();
        self.selected = self.selected.min(len.saturating_sub(1));
        if let Some(notice) = self.manager.take_notice() {
            self.notice = Some((notice, Instant::now()));
        }
    }

    fn show(&mut self, kind: NoticeKind, message: impl Into<String>) {
        self.notice = Some((
            Notice {
                kind,
                message: message.into(),
            },
            Instant::now(),
        ));
    }

    fn handle_dialog_key(&mut self, key: &KeyEvent) {
        let Some(session) = self.manager.dialog().session() else {
            return;
        };
        if session.is_submitting() {
            if key.code == KeyCode::Esc {
                self.show(NoticeKind::Info, "Still saving");
            }
            return;
        }
        let action = dialog::action_for_key(
            key,
            self.manager.dialog().fields(),
            session.draft(),
            self.focus,
        );
        match action {
            DialogAction::SetField { field, value } => {
                self.manager.on_draft_field_change(&field, value);
            }
            DialogAction::Focus(focus) => self.focus = focus,
            DialogAction::Submit => self.manager.on_submit(),
            DialogAction::Close => {
                self.manager.on_dialog_close();
            }
            DialogAction::Ignore => {}
        }
    }

    fn handle_confirm_key(&mut self, key: &KeyEvent) {
        let Some(pending) = self.confirm.as_mut() else {
            return;
        };
        match pending.popup.handle_key(key) {
            Answer::Confirmed => {
                let id = pending.id;
                self.confirm = None;
                self.manager.on_delete_requested(id);
            }
            Answer::Cancelled => self.confirm = None,
            Answer::Undecided => {}
        }
    }

    fn request_delete(&mut self) {
        let Some(row) = self.selected_row() else {
            return;
        };
        let id = row.id;
        let schema = self.manager.schema();
        let mut message = format!("Delete {} {id}?", schema.label.to_lowercase());
        for field in &schema.fields {
            message.push_str(&format!("\n{}={}", field.label, row.display(&field.name)));
        }
        let popup = ConfirmPopup::new(format!("Delete {}", schema.label), message, "Delete");
        self.confirm = Some(PendingDelete { id, popup });
    }

    fn handle_table_key(&mut self, key: &KeyEvent) -> bool {
        let rows = self.manager.controller().rows().len();
        match key.code {
            KeyCode::Down | KeyCode::Char('j') => {
                self.selected = (self.selected + 1).min(rows.saturating_sub(1));
            }
            KeyCode::Up | KeyCode::Char('k') => self.selected = self.selected.saturating_sub(1),
            KeyCode::Right | KeyCode::PageDown | KeyCode::Char('n') => {
                self.manager.on_next_page();
            }
            KeyCode::Left | KeyCode::PageUp | KeyCode::Char('p') => {
                self.manager.on_previous_page();
            }
            KeyCode::Home | KeyCode::Char('g') => self.manager.on_page_change(0),
            KeyCode::End | KeyCode::Char('G') => {
                let pages = self.manager.controller().page_state().total_pages();
                let last = pages.saturating_sub(1);
                self.manager.on_page_change(last);
            }
            KeyCode::Char(digit @ '1'..='9') => {
                let column = digit as usize - '1' as usize;
                let field = self.columns().get(column).map(|(name, _)| name.to_string());
                if let Some(field) = field {
                    self.manager.on_sort_toggle(&field);
                }
            }
            KeyCode::Char('s') => self.manager.on_sort_change(None),
            KeyCode::Char('+') | KeyCode::Char('=') => {
                let size = self.manager.controller().page_state().page_size();
                self.manager.on_page_size_change(size + PAGE_SIZE_STEP);
            }
            KeyCode::Char('-') => {
                let size = self.manager.controller().page_state().page_size();
                let smaller = if size > PAGE_SIZE_STEP {
                    size - PAGE_SIZE_STEP
                } else {
                    size.saturating_sub(1).max(1)
                };
                self.manager.on_page_size_change(smaller);
            }
            KeyCode::Char('c') => {
                self.focus = 0;
                self.manager.on_create_requested();
            }
            KeyCode::Char('e') | KeyCode::Enter => {
                if let Some(row) = self.selected_row().cloned() {
                    self.focus = 0;
                    self.manager.on_edit_requested(&row);
                }
            }
            KeyCode::Char('d') | KeyCode::Delete => self.request_delete(),
            KeyCode::Char('r') => self.manager.on_retry(),
            _ => return false,
        }
        true
    }

    /// Returns true if the event was consumed.
    pub fn handle_event(&mut self, event: &Event) -> bool {
        let Some(key) = event.as_key_press_event() else {
            return false;
        };
        let handled = if self.manager.dialog().is_open() {
            self.handle_dialog_key(&key);
            true
        } else if self.confirm.is_some() {
            self.handle_confirm_key(&key);
            true
        } else {
            self.handle_table_key(&key)
        };
        self.after_update();
        handled
    }

    fn title_line(&self, theme: &Theme) -> Line<'static> {
        let controller = self.manager.controller();
        let (state, style) = match controller.phase() {
            Phase::Idle | Phase::Loaded => (None, theme.text()),
            Phase::Loading => (Some("Loading…"), theme.busy()),
            Phase::Mutating(PendingOp::Insert) => (Some("Creating…"), theme.busy()),
            Phase::Mutating(PendingOp::Update(_)) => (Some("Saving…"), theme.busy()),
            Phase::Mutating(PendingOp::Delete(_)) => (Some("Deleting…"), theme.busy()),
            Phase::Error(_) => (Some("Error"), theme.danger()),
        };
        let mut spans = vec![Span::styled(pad(controller.table_name(), 1), theme.title())];
        if let Some(state) = state {
            spans.push(Span::styled(pad(state, 1), style));
        }
        Line::from(spans)
    }

    fn footer_line(&self) -> String {
        let state = self.manager.controller().page_state();
        let sort = match state.sort() {
            Some(sort) => format!("{} {}", sort.field, arrow(sort.direction)),
            None => "default order".to_string(),
        };
        pad(
            format!(
                "Page {} of {} · {} rows · {} per page · {sort}",
                state.page_index() + 1,
                state.total_pages(),
                state.total_count(),
                state.page_size(),
            ),
            1,
        )
    }

    fn render_table(&self, frame: &mut Frame, area: Rect, theme: &Theme) {
        let controller = self.manager.controller();
        let failed = matches!(controller.phase(), Phase::Error(_));
        let block = Block::bordered()
            .title_top(self.title_line(theme))
            .title_bottom(Line::styled(self.footer_line(), theme.muted()))
            .border_style(theme.frame(failed))
            .style(theme.surface());

        if let Some(err) = controller.error()
            && controller.rows().is_empty()
        {
            let body = Paragraph::new(vec![
                Line::styled(err.to_string(), theme.danger()),
                Line::styled("Press r to retry", theme.muted()),
            ])
            .wrap(Wrap { trim: true })
            .block(block);
            frame.render_widget(body, area);
            return;
        }

        let columns = self.columns();
        let sort = controller.page_state().sort();
        let headers: Vec<String> = columns
            .iter()
            .enumerate()
            .map(|(idx, (name, label))| {
                let indicator = match sort {
                    Some(sort) if sort.field == *name => format!(" {}", arrow(sort.direction)),
                    _ => String::new(),
                };
                format!("{} {label}{indicator}", idx + 1)
            })
            .collect();
        let cells: Vec<Vec<String>> = controller
            .rows()
            .iter()
            .map(|row| columns.iter().map(|(name, _)| row.display(name)).collect())
            .collect();
        let widths: Vec<Constraint> = headers
            .iter()
            .enumerate()
            .map(|(idx, header)| {
                let widest = cells
                    .iter()
                    .map(|row| row[idx].width())
                    .chain(std::iter::once(header.width()))
                    .max()
                    .unwrap_or(0);
                Constraint::Min(widest as u16)
            })
            .collect();

        let header = TableRow::new(headers).style(theme.column_header());
        let rows: Vec<TableRow> = cells.into_iter().map(TableRow::new).collect();
        let empty = rows.is_empty();
        let table = Table::new(rows, widths)
            .block(block)
            .header(header)
            .highlight_spacing(HighlightSpacing::Always)
            .highlight_symbol(">>")
            .row_highlight_style(theme.highlight());
        let mut state = TableState::default();
        if !empty {
            state.select(Some(self.selected));
        }
        frame.render_stateful_widget(table, area, &mut state);
    }

    fn render_status(&self, frame: &mut Frame, area: Rect, theme: &Theme) {
        let controller = self.manager.controller();
        let line = match (&self.notice, controller.error()) {
            (Some((notice, at)), _) if at.elapsed() < NOTICE_TTL => {
                Line::styled(notice.message.clone(), theme.notice(notice.kind))
            }
            (_, Some(err)) => Line::styled(format!("{err} · press r to retry"), theme.danger()),
            _ => Line::default(),
        };
        frame.render_widget(Paragraph::new(line), area);
    }

    pub fn render(&self, frame: &mut Frame, area: Rect, theme: &Theme) {
        let [table_area, status_area, help_area] = Layout::vertical([
            Constraint::Fill(1),
            Constraint::Length(1),
            Constraint::Length(1),
        ])
        .areas(area);
        self.render_table(frame, table_area, theme);
        self.render_status(frame, status_area, theme);

        let entries = if let Some(session) = self.manager.dialog().session() {
            dialog::render(
                frame,
                table_area,
                theme,
                self.manager.schema(),
                session,
                self.focus,
            );
            dialog::HELP
        } else if let Some(pending) = &self.confirm {
            pending.popup.render(frame, table_area, theme);
            ConfirmPopup::HELP
        } else {
            HELP
        };
        help::render(entries, frame, help_area, theme);
    }
}

fn arrow(direction: SortDirection) -> &'static str {
    if direction.is_ascending() { "▲" } else { "▼" }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crossterm::event::KeyModifiers;
    use tablemate::{
        remote::{MemoryTableService, memory::Op},
        table::{SortSpec, TableSchema},
    };

    use super::*;

    fn press(view: &mut TableView, code: KeyCode) -> bool {
        view.handle_event(&Event::Key(KeyEvent::new(code, KeyModifiers::NONE)))
    }

    async fn view(rows: i64) -> (Arc<MemoryTableService>, TableView) {
        let service = Arc::new(
            MemoryTableService::new("brands", SortSpec::asc("name")).with_rows((1..=rows).map(
                |id| {
                    Row::new(id)
                        .with("name", format!("Brand {id:02}"))
                        .with("country", "Italy")
                },
            )),
        );
        let manager = TableManager::new(
            TableSchema::brands(),
            service.clone(),
            Duration::from_secs(30),
        );
        let mut view = TableView::new(manager);
        view.start();
        view.manager.settle().await;
        (service, view)
    }

    #[tokio::test]
    async fn digit_keys_toggle_sort_on_columns() {
        let (_, mut view) = view(3).await;
        assert!(press(&mut view, KeyCode::Char('3')));
        view.manager.settle().await;
        assert_eq!(
            view.manager.controller().page_state().sort(),
            Some(&SortSpec::asc("country"))
        );
        press(&mut view, KeyCode::Char('3'));
        view.manager.settle().await;
        assert_eq!(
            view.manager.controller().page_state().sort(),
            Some(&SortSpec::desc("country"))
        );
        assert!(press(&mut view, KeyCode::Char('9')));
    }

    #[tokio::test]
    async fn delete_needs_confirmation() {
        let (service, mut view) = view(3).await;
        press(&mut view, KeyCode::Char('d'));
        assert!(view.confirm.is_some());
        press(&mut view, KeyCode::Esc);
        assert!(view.confirm.is_none());
        assert_eq!(service.calls(Op::Delete), 0);

        press(&mut view, KeyCode::Char('d'));
        press(&mut view, KeyCode::Char('y'));
        view.manager.settle().await;
        view.after_update();
        assert_eq!(service.calls(Op::Delete), 1);
        assert_eq!(view.manager.controller().rows().len(), 2);
        let (notice, _) = view.notice.as_ref().unwrap();
        assert_eq!(notice.message, "Brand deleted");
    }

    #[tokio::test]
    async fn dialog_captures_keys_until_closed() {
        let (service, mut view) = view(2).await;
        press(&mut view, KeyCode::Char('e'));
        assert!(view.manager.dialog().is_open());
        press(&mut view, KeyCode::Char('!'));
        // 'q' types into the field instead of quitting
        assert!(press(&mut view, KeyCode::Char('q')));
        assert_eq!(
            view.manager.dialog().session().unwrap().draft().get("name"),
            "Brand 01!q"
        );
        press(&mut view, KeyCode::Enter);
        view.manager.settle().await;
        assert!(!view.manager.dialog().is_open());
        assert_eq!(service.row(1).unwrap().display("name"), "Brand 01!q");
    }

    #[tokio::test]
    async fn unhandled_keys_fall_through() {
        let (_, mut view) = view(1).await;
        assert!(!press(&mut view, KeyCode::Char('q')));
        assert!(!press(&mut view, KeyCode::Esc));
    }
}
