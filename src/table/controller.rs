//! Page/sort state, the rows currently on screen, and the mutations that
//! change them.
//!
//! The controller never awaits the backend itself. Every intent that needs
//! I/O hands back a task ([`FetchTask`], [`MutationTask`]) owning what it
//! needs; whoever drives the controller runs the task (inline or spawned)
//! and feeds the outcome back through `apply_fetch` / `apply_mutation`.
//! Outcomes carry the request id and query they were issued for, and only
//! the one matching the latest request is applied.

use std::sync::Arc;

use super::{
    allocator::{AllocatedIdentifier, IdentifierAllocator},
    error::TableError,
    page::{PageQuery, PageState, SortSpec},
    row::{Fields, Patch, Row},
};
use crate::remote::{Page, RemoteError, RemoteTableService};

/// Inserts try the hinted id, then one re-proposed id, then give up.
pub const MAX_INSERT_ATTEMPTS: u32 = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingOp {
    Insert,
    Update(i64),
    Delete(i64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Loading,
    Loaded,
    Mutating(PendingOp),
    Error(TableError),
}

/// Rows as last returned by the backend, with the query that produced them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub rows: Vec<Row>,
    pub query: PageQuery,
    pub total_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Insert {
        hint: Option<AllocatedIdentifier>,
        fields: Fields,
    },
    Update {
        id: i64,
        patch: Patch,
    },
    Delete {
        id: i64,
    },
}

impl Mutation {
    fn pending(&self) -> PendingOp {
        match self {
            Mutation::Insert { .. } => PendingOp::Insert,
            Mutation::Update { id, .. } => PendingOp::Update(*id),
            Mutation::Delete { id } => PendingOp::Delete(*id),
        }
    }
}

/// Where a mutation came from, so its result can be routed back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOrigin {
    Dialog { session_id: u64 },
    Inline,
}

pub struct FetchTask {
    service: Arc<dyn RemoteTableService>,
    request_id: u64,
    query: PageQuery,
}

impl FetchTask {
    pub fn request_id(&self) -> u64 {
        self.request_id
    }

    pub fn query(&self) -> &PageQuery {
        &self.query
    }

    pub async fn run(self) -> FetchOutcome {
        let (start, end) = self.query.range();
        tracing::trace!(
            table = %self.service.table_name(),
            request_id = self.request_id,
            range_start = start,
            range_end = end,
            "fetch_page_start"
        );
        let result = self
            .service
            .fetch_page(start, end, self.query.sort.as_ref())
            .await
            .map_err(TableError::from);
        FetchOutcome {
            request_id: self.request_id,
            query: self.query,
            result,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub request_id: u64,
    pub query: PageQuery,
    pub result: Result<Page, TableError>,
}

pub struct MutationTask {
    service: Arc<dyn RemoteTableService>,
    allocator: IdentifierAllocator,
    mutation_id: u64,
    origin: MutationOrigin,
    mutation: Mutation,
}

impl MutationTask {
    pub fn mutation_id(&self) -> u64 {
        self.mutation_id
    }

    pub async fn run(self) -> MutationOutcome {
        let op = self.mutation.pending();
        let result = match &self.mutation {
            Mutation::Insert { hint, fields } => self.insert(*hint, fields).await.map(Some),
            Mutation::Update { id, patch } => self
                .service
                .update(*id, patch.clone())
                .await
                .map(Some)
                .map_err(TableError::from),
            Mutation::Delete { id } => self
                .service
                .delete(*id)
                .await
                .map(|()| None)
                .map_err(TableError::from),
        };
        MutationOutcome {
            mutation_id: self.mutation_id,
            origin: self.origin,
            op,
            result,
        }
    }

    async fn insert(
        &self,
        hint: Option<AllocatedIdentifier>,
        fields: &Fields,
    ) -> Result<Row, TableError> {
        let table = self.service.table_name().to_string();
        let mut candidate = self.allocator.revalidate(hint).await?;
        let mut attempt = 1;
        loop {
            let row = Row {
                id: candidate.value,
                fields: fields.clone(),
            };
            match self.service.insert(row).await {
                Ok(row) => {
                    tracing::debug!(table = %table, id = row.id, attempt, "insert_ok");
                    return Ok(row);
                }
                Err(RemoteError::Conflict(message)) if attempt < MAX_INSERT_ATTEMPTS => {
                    tracing::warn!(
                        table = %table,
                        id = candidate.value,
                        attempt,
                        error = %message,
                        "Identifier taken by a concurrent insert, proposing again"
                    );
                    attempt += 1;
                    candidate = self.allocator.propose().await?;
                }
                Err(err) => {
                    tracing::error!(
                        table = %table,
                        id = candidate.value,
                        attempt,
                        error = %err,
                        "insert_failed"
                    );
                    return Err(err.into());
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct MutationOutcome {
    pub mutation_id: u64,
    pub origin: MutationOrigin,
    pub op: PendingOp,
    /// The persisted row for inserts and updates, `None` for deletes.
    pub result: Result<Option<Row>, TableError>,
}

pub struct TableController {
    service: Arc<dyn RemoteTableService>,
    allocator: IdentifierAllocator,
    page: PageState,
    phase: Phase,
    snapshot: Option<Snapshot>,
    request_seq: u64,
    in_flight: Option<(u64, PageQuery)>,
    mutation_seq: u64,
    pending_mutation: Option<u64>,
}

impl TableController {
    pub fn new(
        service: Arc<dyn RemoteTableService>,
        allocator: IdentifierAllocator,
        page_size: usize,
    ) -> Self {
        Self {
            service,
            allocator,
            page: PageState::new(page_size),
            phase: Phase::Idle,
            snapshot: None,
            request_seq: 0,
            in_flight: None,
            mutation_seq: 0,
            pending_mutation: None,
        }
    }

    pub fn table_name(&self) -> &str {
        self.service.table_name()
    }

    pub fn allocator(&self) -> &IdentifierAllocator {
        &self.allocator
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn page_state(&self) -> &PageState {
        &self.page
    }

    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.snapshot.as_ref()
    }

    /// Rows to display: the last successful page, kept through errors and
    /// in-flight requests.
    pub fn rows(&self) -> &[Row] {
        self.snapshot
            .as_ref()
            .map(|snapshot| snapshot.rows.as_slice())
            .unwrap_or(&[])
    }

    pub fn error(&self) -> Option<&TableError> {
        match &self.phase {
            Phase::Error(err) => Some(err),
            _ => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.phase, Phase::Loading)
    }

    pub fn is_mutating(&self) -> bool {
        self.pending_mutation.is_some()
    }

    /// Requests the current page.
    pub fn load(&mut self) -> FetchTask {
        self.issue_fetch()
    }

    pub fn go_to_page(&mut self, index: usize) -> Option<FetchTask> {
        if !self.page.go_to(index) {
            return None;
        }
        Some(self.issue_fetch())
    }

    pub fn next_page(&mut self) -> Option<FetchTask> {
        if !self.page.can_next() {
            return None;
        }
        self.go_to_page(self.page.page_index() + 1)
    }

    pub fn previous_page(&mut self) -> Option<FetchTask> {
        if !self.page.can_previous() {
            return None;
        }
        self.go_to_page(self.page.page_index() - 1)
    }

    pub fn set_page_size(&mut self, size: usize) -> Option<FetchTask> {
        if size == 0 {
            tracing::warn!(table = %self.table_name(), "Ignoring zero page size");
            return None;
        }
        if !self.page.set_page_size(size) {
            return None;
        }
        Some(self.issue_fetch())
    }

    /// Always resets to the first page, even when the sort is unchanged.
    pub fn set_sort(&mut self, sort: Option<SortSpec>) -> FetchTask {
        self.page.set_sort(sort);
        self.issue_fetch()
    }

    pub fn toggle_sort(&mut self, field: &str) -> FetchTask {
        let sort = SortSpec::toggled(self.page.sort(), field);
        self.set_sort(Some(sort))
    }

    /// Re-issues the failed page query. Only valid in `Error`.
    pub fn retry(&mut self) -> Option<FetchTask> {
        if !matches!(self.phase, Phase::Error(_)) {
            return None;
        }
        tracing::info!(
            table = %self.table_name(),
            page_index = self.page.page_index(),
            "retry_fetch"
        );
        Some(self.issue_fetch())
    }

    /// Applies a page response. Returns a follow-up fetch when the reported
    /// total leaves the current index past the last page.
    pub fn apply_fetch(&mut self, outcome: FetchOutcome) -> Option<FetchTask> {
        let is_current = self
            .in_flight
            .as_ref()
            .is_some_and(|(id, query)| *id == outcome.request_id && *query == outcome.query);
        if !is_current {
            tracing::debug!(
                table = %self.table_name(),
                request_id = outcome.request_id,
                page_index = outcome.query.page_index,
                "Dropping stale page response"
            );
            return None;
        }
        self.in_flight = None;

        match outcome.result {
            Ok(page) => {
                if self.page.set_total_count(page.total_count) {
                    tracing::debug!(
                        table = %self.table_name(),
                        request_id = outcome.request_id,
                        requested = outcome.query.page_index,
                        clamped = self.page.page_index(),
                        total = page.total_count,
                        "Page index past the end, fetching last page"
                    );
                    return Some(self.issue_fetch());
                }
                tracing::debug!(
                    table = %self.table_name(),
                    request_id = outcome.request_id,
                    page_index = outcome.query.page_index,
                    rows = page.rows.len(),
                    total = page.total_count,
                    "page_loaded"
                );
                self.snapshot = Some(Snapshot {
                    rows: page.rows,
                    query: outcome.query,
                    total_count: page.total_count,
                });
                self.phase = Phase::Loaded;
                None
            }
            Err(err) => {
                tracing::error!(
                    table = %self.table_name(),
                    request_id = outcome.request_id,
                    error = %err,
                    "fetch_page_error"
                );
                self.phase = Phase::Error(err);
                None
            }
        }
    }

    /// Starts a mutation. Only one may be in flight, and only against a
    /// loaded table; refusals do no I/O.
    pub fn mutate(
        &mut self,
        mutation: Mutation,
        origin: MutationOrigin,
    ) -> Result<MutationTask, TableError> {
        if self.pending_mutation.is_some() {
            return Err(TableError::Busy("another change is in progress"));
        }
        if !matches!(self.phase, Phase::Loaded) {
            return Err(TableError::Busy("table is not loaded"));
        }
        self.mutation_seq += 1;
        let mutation_id = self.mutation_seq;
        let op = mutation.pending();
        tracing::debug!(
            table = %self.table_name(),
            mutation_id,
            op = ?op,
            origin = ?origin,
            "start_mutation"
        );
        self.pending_mutation = Some(mutation_id);
        self.phase = Phase::Mutating(op);
        Ok(MutationTask {
            service: self.service.clone(),
            allocator: self.allocator.clone(),
            mutation_id,
            origin,
            mutation,
        })
    }

    /// Success re-fetches the same page index; failure goes back to the
    /// loaded rows untouched.
    pub fn apply_mutation(&mut self, outcome: &MutationOutcome) -> Option<FetchTask> {
        if self.pending_mutation != Some(outcome.mutation_id) {
            tracing::debug!(
                table = %self.table_name(),
                mutation_id = outcome.mutation_id,
                "Dropping stale mutation result"
            );
            return None;
        }
        self.pending_mutation = None;
        let still_mutating = matches!(self.phase, Phase::Mutating(_));
        match &outcome.result {
            Ok(_) => {
                tracing::info!(
                    table = %self.table_name(),
                    mutation_id = outcome.mutation_id,
                    op = ?outcome.op,
                    "mutation_ok"
                );
                Some(self.issue_fetch())
            }
            Err(err) => {
                tracing::warn!(
                    table = %self.table_name(),
                    mutation_id = outcome.mutation_id,
                    op = ?outcome.op,
                    error = %err,
                    "mutation_failed"
                );
                if still_mutating {
                    self.phase = Phase::Loaded;
                }
                None
            }
        }
    }

    fn issue_fetch(&mut self) -> FetchTask {
        self.request_seq += 1;
        let request_id = self.request_seq;
        let query = self.page.query();
        tracing::debug!(
            table = %self.table_name(),
            request_id,
            page_index = query.page_index,
            page_size = query.page_size,
            sort = ?query.sort,
            "start_fetch"
        );
        self.in_flight = Some((request_id, query.clone()));
        self.phase = Phase::Loading;
        FetchTask {
            service: self.service.clone(),
            request_id,
            query,
        }
    }
}
