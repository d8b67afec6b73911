//! Backends a table controller can page through and mutate.
//!
//! The controller only ever sees [`RemoteTableService`]; the DynamoDB and
//! in-memory services are interchangeable behind it.

use async_trait::async_trait;
use thiserror::Error;

use crate::table::{Patch, Row, SortSpec};

pub mod debug;
pub mod dynamodb;
pub mod memory;

pub use debug::send_remote_request;
pub use dynamodb::DynamoTableService;
pub use memory::MemoryTableService;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("{0}")]
    Transport(String),
    #[error("{0}")]
    Conflict(String),
    #[error("no row with id {0}")]
    NotFound(i64),
}

/// One slice of the table plus the exact row count of the whole table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Page {
    pub rows: Vec<Row>,
    pub total_count: usize,
}

impl Page {
    /// Sorts the whole table and cuts out the inclusive range. Ties on the
    /// sort field fall back to ascending id so paging is stable.
    pub fn slice(
        mut rows: Vec<Row>,
        range_start: usize,
        range_end: usize,
        sort: &SortSpec,
    ) -> Self {
        rows.sort_by(|a, b| {
            let ord = a.sort_key(&sort.field).cmp(&b.sort_key(&sort.field));
            let ord = if sort.direction.is_ascending() {
                ord
            } else {
                ord.reverse()
            };
            ord.then(a.id.cmp(&b.id))
        });
        let total_count = rows.len();
        let rows = rows
            .into_iter()
            .skip(range_start)
            .take(range_end.saturating_sub(range_start) + 1)
            .collect();
        Self { rows, total_count }
    }
}

#[async_trait]
pub trait RemoteTableService: Send + Sync {
    /// Name of the backing table, for logs.
    fn table_name(&self) -> &str;

    /// Rows `range_start..=range_end` ordered by `sort`, or by the service's
    /// default display order when `sort` is `None`.
    async fn fetch_page(
        &self,
        range_start: usize,
        range_end: usize,
        sort: Option<&SortSpec>,
    ) -> Result<Page, RemoteError>;

    async fn fetch_max_identifier(&self) -> Result<Option<i64>, RemoteError>;

    /// Fails with `Conflict` when `row.id` is already taken.
    async fn insert(&self, row: Row) -> Result<Row, RemoteError>;

    async fn update(&self, id: i64, patch: Patch) -> Result<Row, RemoteError>;

    async fn delete(&self, id: i64) -> Result<(), RemoteError>;
}

