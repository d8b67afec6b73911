use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};

use super::error::TableError;
use crate::remote::RemoteTableService;

/// A candidate id for a new row. Nothing is reserved: another writer may
/// take the same value before the insert commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocatedIdentifier {
    pub value: i64,
    pub valid_as_of: DateTime<Utc>,
}

impl AllocatedIdentifier {
    pub fn new(value: i64) -> Self {
        Self {
            value,
            valid_as_of: Utc::now(),
        }
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.valid_as_of).to_std().unwrap_or(Duration::ZERO)
    }

    pub fn is_stale(&self, window: Duration, now: DateTime<Utc>) -> bool {
        self.age(now) > window
    }
}

/// Proposes `max(id) + 1` for new rows.
#[derive(Clone)]
pub struct IdentifierAllocator {
    service: Arc<dyn RemoteTableService>,
    staleness_window: Duration,
}

impl IdentifierAllocator {
    pub const DEFAULT_STALENESS_WINDOW: Duration = Duration::from_secs(30);

    pub fn new(service: Arc<dyn RemoteTableService>) -> Self {
        Self {
            service,
            staleness_window: Self::DEFAULT_STALENESS_WINDOW,
        }
    }

    pub fn with_staleness_window(mut self, window: Duration) -> Self {
        self.staleness_window = window;
        self
    }

    pub async fn propose(&self) -> Result<AllocatedIdentifier, TableError> {
        let max = self.service.fetch_max_identifier().await?;
        let value = match max {
            None => 1,
            Some(max) => max.checked_add(1).ok_or_else(|| {
                TableError::Conflict(format!("identifier space exhausted (max id {max})"))
            })?,
        };
        tracing::debug!(
            table = %self.service.table_name(),
            max = ?max,
            proposed = value,
            "propose_identifier"
        );
        Ok(AllocatedIdentifier::new(value))
    }

    /// Returns `hint` while it is fresh, otherwise a new proposal.
    pub async fn revalidate(
        &self,
        hint: Option<AllocatedIdentifier>,
    ) -> Result<AllocatedIdentifier, TableError> {
        match hint {
            Some(hint) if !hint.is_stale(self.staleness_window, Utc::now()) => Ok(hint),
            Some(hint) => {
                tracing::debug!(
                    table = %self.service.table_name(),
                    hint = hint.value,
                    age_ms = hint.age(Utc::now()).as_millis(),
                    "Identifier hint is stale, proposing again"
                );
                self.propose().await
            }
            None => self.propose().await,
        }
    }
}
