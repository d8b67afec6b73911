use std::{future::Future, sync::Arc, time::Duration};

use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

use super::{
    allocator::{AllocatedIdentifier, IdentifierAllocator},
    controller::{
        FetchOutcome, FetchTask, Mutation, MutationOrigin, MutationOutcome, MutationTask,
        PendingOp, TableController,
    },
    error::TableError,
    page::SortSpec,
    row::Row,
    schema::TableSchema,
    session::EditDialog,
};
use crate::remote::RemoteTableService;

/// Results of background work, delivered back to the manager in
/// completion order.
#[derive(Debug)]
pub enum TableEvent {
    Fetched(FetchOutcome),
    Mutated(MutationOutcome),
    IdentifierProposed {
        session_id: u64,
        result: Result<AllocatedIdentifier, TableError>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Info,
    Error,
}

/// A transient message for the status line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
}

/// Wires a controller and its dialog to user intents.
///
/// Every `on_*` method returns immediately; any I/O it needs is spawned on
/// the tokio runtime and comes back as a [`TableEvent`] through
/// [`TableManager::next_event`].
pub struct TableManager {
    schema: TableSchema,
    controller: TableController,
    dialog: EditDialog,
    notice: Option<Notice>,
    last_saved: Option<Row>,
    tx: UnboundedSender<TableEvent>,
    rx: UnboundedReceiver<TableEvent>,
    pending: usize,
}

impl TableManager {
    pub fn new(
        schema: TableSchema,
        service: Arc<dyn RemoteTableService>,
        staleness_window: Duration,
    ) -> Self {
        let allocator =
            IdentifierAllocator::new(service.clone()).with_staleness_window(staleness_window);
        let controller = TableController::new(service, allocator, schema.page_size);
        let dialog = EditDialog::new(schema.fields.clone());
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        Self {
            schema,
            controller,
            dialog,
            notice: None,
            last_saved: None,
            tx,
            rx,
            pending: 0,
        }
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub fn controller(&self) -> &TableController {
        &self.controller
    }

    pub fn dialog(&self) -> &EditDialog {
        &self.dialog
    }

    /// Number of spawned operations whose events have not been handled yet.
    pub fn pending(&self) -> usize {
        self.pending
    }

    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref()
    }

    pub fn take_notice(&mut self) -> Option<Notice> {
        self.notice.take()
    }

    /// The row as the backend stored it after the latest successful insert
    /// or update.
    pub fn last_saved(&self) -> Option<&Row> {
        self.last_saved.as_ref()
    }

    pub fn start(&mut self) {
        let task = self.controller.load();
        self.spawn_fetch(Some(task));
    }

    pub fn on_page_change(&mut self, index: usize) {
        let task = self.controller.go_to_page(index);
        self.spawn_fetch(task);
    }

    pub fn on_next_page(&mut self) {
        let task = self.controller.next_page();
        self.spawn_fetch(task);
    }

    pub fn on_previous_page(&mut self) {
        let task = self.controller.previous_page();
        self.spawn_fetch(task);
    }

    pub fn on_page_size_change(&mut self, size: usize) {
        let task = self.controller.set_page_size(size);
        self.spawn_fetch(task);
    }

    pub fn on_sort_change(&mut self, sort: Option<SortSpec>) {
        if let Some(spec) = &sort
            && !self.schema.is_sortable(&spec.field)
        {
            self.notify(
                NoticeKind::Error,
                format!("Cannot sort {} by {}", self.schema.name, spec.field),
            );
            return;
        }
        let task = self.controller.set_sort(sort);
        self.spawn_fetch(Some(task));
    }

    /// Sorts by `field`, flipping the direction when it is already the
    /// sort field.
    pub fn on_sort_toggle(&mut self, field: &str) {
        let sort = SortSpec::toggled(self.controller.page_state().sort(), field);
        self.on_sort_change(Some(sort));
    }

    pub fn on_retry(&mut self) {
        let task = self.controller.retry();
        self.spawn_fetch(task);
    }

    pub fn on_create_requested(&mut self) {
        let Some(session_id) = self.dialog.open_create() else {
            return;
        };
        let allocator = self.controller.allocator().clone();
        self.spawn(async move {
            TableEvent::IdentifierProposed {
                session_id,
                result: allocator.propose().await,
            }
        });
    }

    pub fn on_edit_requested(&mut self, row: &Row) {
        self.dialog.open_edit(row);
    }

    pub fn on_delete_requested(&mut self, id: i64) {
        match self
            .controller
            .mutate(Mutation::Delete { id }, MutationOrigin::Inline)
        {
            Ok(task) => self.spawn_mutation(task),
            Err(err) => self.notify(NoticeKind::Error, format!("Cannot delete: {err}")),
        }
    }

    pub fn on_draft_field_change(&mut self, field: &str, value: impl Into<String>) {
        self.dialog.set_field(field, value);
    }

    pub fn on_submit(&mut self) {
        let (session_id, mutation) = match self.dialog.submit() {
            Ok(submission) => submission,
            Err(err) => {
                tracing::debug!(table = %self.schema.name, error = %err, "submit_rejected");
                return;
            }
        };
        match self
            .controller
            .mutate(mutation, MutationOrigin::Dialog { session_id })
        {
            Ok(task) => self.spawn_mutation(task),
            Err(err) => {
                self.dialog.finish_submit(session_id, Err(err));
            }
        }
    }

    pub fn on_dialog_close(&mut self) -> bool {
        self.dialog.close()
    }

    pub async fn next_event(&mut self) -> Option<TableEvent> {
        self.rx.recv().await
    }

    /// Handles events until nothing spawned by this manager is outstanding,
    /// including follow-up fetches triggered along the way.
    pub async fn settle(&mut self) {
        while self.pending > 0 {
            match self.rx.recv().await {
                Some(event) => self.handle_event(event),
                None => break,
            }
        }
    }

    pub fn handle_event(&mut self, event: TableEvent) {
        self.pending = self.pending.saturating_sub(1);
        match event {
            TableEvent::Fetched(outcome) => {
                let follow_up = self.controller.apply_fetch(outcome);
                self.spawn_fetch(follow_up);
            }
            TableEvent::Mutated(outcome) => {
                let refetch = self.controller.apply_mutation(&outcome);
                self.spawn_fetch(refetch);
                self.route_mutation_result(outcome);
            }
            TableEvent::IdentifierProposed { session_id, result } => {
                self.dialog.apply_hint(session_id, result);
            }
        }
    }

    fn route_mutation_result(&mut self, outcome: MutationOutcome) {
        let verb = match outcome.op {
            PendingOp::Insert => "created",
            PendingOp::Update(_) => "updated",
            PendingOp::Delete(_) => "deleted",
        };
        let result = outcome.result.map(|saved| {
            if saved.is_some() {
                self.last_saved = saved;
            }
        });
        match outcome.origin {
            MutationOrigin::Dialog { session_id } => {
                let succeeded = result.is_ok();
                if self.dialog.finish_submit(session_id, result) && succeeded {
                    self.notify(NoticeKind::Info, format!("{} {verb}", self.schema.label));
                }
            }
            MutationOrigin::Inline => match result {
                Ok(()) => self.notify(NoticeKind::Info, format!("{} {verb}", self.schema.label)),
                Err(err) => {
                    let message = format!(
                        "Failed to {} {}: {err}",
                        verb_infinitive(&outcome.op),
                        self.schema.label.to_lowercase()
                    );
                    self.notify(NoticeKind::Error, message);
                }
            },
        }
    }

    fn notify(&mut self, kind: NoticeKind, message: String) {
        match kind {
            NoticeKind::Info => tracing::info!(table = %self.schema.name, %message, "notice"),
            NoticeKind::Error => tracing::warn!(table = %self.schema.name, %message, "notice"),
        }
        self.notice = Some(Notice { kind, message });
    }

    fn spawn_fetch(&mut self, task: Option<FetchTask>) {
        if let Some(task) = task {
            self.spawn(async move { TableEvent::Fetched(task.run().await) });
        }
    }

    fn spawn_mutation(&mut self, task: MutationTask) {
        self.spawn(async move { TableEvent::Mutated(task.run().await) });
    }

    fn spawn<F>(&mut self, work: F)
    where
        F: Future<Output = TableEvent> + Send + 'static,
    {
        self.pending += 1;
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let _ = tx.send(work.await);
        });
    }
}

fn verb_infinitive(op: &PendingOp) -> &'static str {
    match op {
        PendingOp::Insert => "create",
        PendingOp::Update(_) => "update",
        PendingOp::Delete(_) => "delete",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        remote::{MemoryTableService, RemoteError, memory::Op},
        table::{Phase, SortSpec},
    };

    fn manager(rows: usize) -> (Arc<MemoryTableService>, TableManager) {
        let rows = (1..=rows as i64).map(|id| {
            Row::new(id)
                .with("name", format!("Brand {id:02}"))
                .with("country", "France")
        });
        let service =
            Arc::new(MemoryTableService::new("brands", SortSpec::asc("name")).with_rows(rows));
        let manager = TableManager::new(
            TableSchema::brands(),
            service.clone(),
            Duration::from_secs(30),
        );
        (service, manager)
    }

    #[tokio::test]
    async fn create_flow_inserts_with_proposed_id_and_refreshes() {
        let (service, mut manager) = manager(3);
        manager.start();
        manager.settle().await;

        manager.on_create_requested();
        manager.settle().await;
        assert_eq!(manager.dialog().session().unwrap().target_id(), Some(4));

        manager.on_draft_field_change("name", "Bugatti");
        manager.on_draft_field_change("country", "France");
        manager.on_submit();
        assert!(manager.dialog().session().unwrap().is_submitting());
        manager.settle().await;

        assert!(!manager.dialog().is_open());
        assert_eq!(service.row(4).unwrap().display("name"), "Bugatti");
        assert_eq!(manager.last_saved().map(|row| row.id), Some(4));
        assert_eq!(manager.controller().page_state().total_count(), 4);
        assert_eq!(manager.controller().phase(), &Phase::Loaded);
        assert_eq!(
            manager.take_notice(),
            Some(Notice {
                kind: NoticeKind::Info,
                message: "Brand created".to_string()
            })
        );
    }

    #[tokio::test]
    async fn validation_failure_never_touches_backend() {
        let (service, mut manager) = manager(3);
        manager.start();
        manager.settle().await;

        manager.on_create_requested();
        manager.settle().await;
        manager.on_draft_field_change("name", "Bugatti");
        manager.on_submit();
        manager.settle().await;

        let session = manager.dialog().session().unwrap();
        assert!(matches!(session.error(), Some(TableError::Validation(_))));
        assert_eq!(service.calls(Op::Insert), 0);
    }

    #[tokio::test]
    async fn inline_delete_failure_is_a_notice() {
        let (service, mut manager) = manager(3);
        manager.start();
        manager.settle().await;

        service.fail_next(Op::Delete, RemoteError::Transport("503".to_string()));
        manager.on_delete_requested(2);
        manager.settle().await;

        assert_eq!(manager.controller().rows().len(), 3);
        assert_eq!(manager.controller().phase(), &Phase::Loaded);
        let notice = manager.take_notice().unwrap();
        assert_eq!(notice.kind, NoticeKind::Error);
        assert!(notice.message.starts_with("Failed to delete brand"));
    }

    #[tokio::test]
    async fn unknown_sort_field_is_rejected() {
        let (service, mut manager) = manager(3);
        manager.start();
        manager.settle().await;
        manager.on_sort_change(Some(SortSpec::asc("horsepower")));
        manager.settle().await;
        assert_eq!(service.calls(Op::FetchPage), 1);
        assert_eq!(manager.take_notice().unwrap().kind, NoticeKind::Error);
    }
}
