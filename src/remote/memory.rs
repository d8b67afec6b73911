use std::{
    collections::{BTreeMap, HashMap, VecDeque},
    sync::{Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;

use super::{Page, RemoteError, RemoteTableService, send_remote_request};
use crate::table::{Patch, Row, SortSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    FetchPage,
    FetchMaxIdentifier,
    Insert,
    Update,
    Delete,
}

/// A table kept in process memory.
///
/// Behaves like the remote services (exact counts, inclusive ranges,
/// conflicting inserts) and can be told to fail or race specific calls,
/// which is what the controller tests drive it with.
pub struct MemoryTableService {
    table_name: String,
    default_sort: SortSpec,
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    rows: BTreeMap<i64, Row>,
    failures: HashMap<Op, VecDeque<RemoteError>>,
    racing_inserts: usize,
    calls: HashMap<Op, usize>,
}

impl MemoryTableService {
    pub fn new(table_name: &str, default_sort: SortSpec) -> Self {
        Self {
            table_name: table_name.to_string(),
            default_sort,
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn with_rows(self, rows: impl IntoIterator<Item = Row>) -> Self {
        {
            let mut inner = self.lock();
            for row in rows {
                inner.rows.insert(row.id, row);
            }
        }
        self
    }

    /// Makes the next call of `op` fail with `err`. Calls queue up.
    pub fn fail_next(&self, op: Op, err: RemoteError) {
        self.lock().failures.entry(op).or_default().push_back(err);
    }

    /// The next `count` inserts lose a race: another writer takes the
    /// requested id first, so the insert reports a conflict and the max
    /// identifier moves past it.
    pub fn race_next_inserts(&self, count: usize) {
        self.lock().racing_inserts += count;
    }

    pub fn calls(&self, op: Op) -> usize {
        self.lock().calls.get(&op).copied().unwrap_or(0)
    }

    pub fn row(&self, id: i64) -> Option<Row> {
        self.lock().rows.get(&id).cloned()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin(&self, op: Op) -> Result<MutexGuard<'_, Inner>, RemoteError> {
        let mut inner = self.lock();
        *inner.calls.entry(op).or_default() += 1;
        if let Some(err) = inner.failures.get_mut(&op).and_then(VecDeque::pop_front) {
            return Err(err);
        }
        Ok(inner)
    }
}

#[async_trait]
impl RemoteTableService for MemoryTableService {
    fn table_name(&self) -> &str {
        &self.table_name
    }

    async fn fetch_page(
        &self,
        range_start: usize,
        range_end: usize,
        sort: Option<&SortSpec>,
    ) -> Result<Page, RemoteError> {
        let span = tracing::trace_span!(
            "FetchPage",
            table = %self.table_name,
            range_start,
            range_end
        );
        send_remote_request(span, || async {
            let inner = self.begin(Op::FetchPage)?;
            let rows = inner.rows.values().cloned().collect();
            Ok::<_, RemoteError>(Page::slice(
                rows,
                range_start,
                range_end,
                sort.unwrap_or(&self.default_sort),
            ))
        })
        .await
    }

    async fn fetch_max_identifier(&self) -> Result<Option<i64>, RemoteError> {
        let span = tracing::trace_span!("FetchMaxIdentifier", table = %self.table_name);
        send_remote_request(span, || async {
            let inner = self.begin(Op::FetchMaxIdentifier)?;
            Ok::<_, RemoteError>(inner.rows.keys().next_back().copied())
        })
        .await
    }

    async fn insert(&self, row: Row) -> Result<Row, RemoteError> {
        let span = tracing::trace_span!("Insert", table = %self.table_name, id = row.id);
        send_remote_request(span, || async {
            let mut inner = self.begin(Op::Insert)?;
            if inner.racing_inserts > 0 {
                inner.racing_inserts -= 1;
                let mut winner = row.clone();
                winner.fields.clear();
                inner.rows.insert(row.id, winner);
            }
            if inner.rows.contains_key(&row.id) {
                return Err(RemoteError::Conflict(format!(
                    "duplicate key value violates unique constraint on id {}",
                    row.id
                )));
            }
            inner.rows.insert(row.id, row.clone());
            Ok::<_, RemoteError>(row)
        })
        .await
    }

    async fn update(&self, id: i64, patch: Patch) -> Result<Row, RemoteError> {
        let span =
            tracing::trace_span!("Update", table = %self.table_name, id, fields = patch.len());
        send_remote_request(span, || async {
            let mut inner = self.begin(Op::Update)?;
            let row = inner.rows.get_mut(&id).ok_or(RemoteError::NotFound(id))?;
            row.apply(&patch);
            Ok::<_, RemoteError>(row.clone())
        })
        .await
    }

    async fn delete(&self, id: i64) -> Result<(), RemoteError> {
        let span = tracing::trace_span!("Delete", table = %self.table_name, id);
        send_remote_request(span, || async {
            let mut inner = self.begin(Op::Delete)?;
            inner.rows.remove(&id);
            Ok::<_, RemoteError>(())
        })
        .await
    }
}
