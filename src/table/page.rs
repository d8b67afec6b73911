use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn flipped(self) -> Self {
        match self {
            SortDirection::Asc => SortDirection::Desc,
            SortDirection::Desc => SortDirection::Asc,
        }
    }

    pub fn is_ascending(self) -> bool {
        matches!(self, SortDirection::Asc)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: String,
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn asc(field: &str) -> Self {
        Self {
            field: field.to_string(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: &str) -> Self {
        Self {
            field: field.to_string(),
            direction: SortDirection::Desc,
        }
    }

    /// Sort on `field`, flipping direction if `current` already sorts on it.
    pub fn toggled(current: Option<&SortSpec>, field: &str) -> Self {
        match current {
            Some(spec) if spec.field == field => Self {
                field: spec.field.clone(),
                direction: spec.direction.flipped(),
            },
            _ => Self::asc(field),
        }
    }
}

impl fmt::Display for SortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dir = match self.direction {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        };
        write!(f, "{}:{}", self.field, dir)
    }
}

impl FromStr for SortSpec {
    type Err = String;

    /// Parses `field`, `field:asc` or `field:desc`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (field, dir) = match s.split_once(':') {
            Some((field, dir)) => (field.trim(), dir.trim()),
            None => (s.trim(), "asc"),
        };
        if field.is_empty() {
            return Err("sort field must not be empty".to_string());
        }
        let direction = match dir.to_ascii_lowercase().as_str() {
            "asc" => SortDirection::Asc,
            "desc" => SortDirection::Desc,
            other => return Err(format!("unknown sort direction: {other}")),
        };
        Ok(Self {
            field: field.to_string(),
            direction,
        })
    }
}

/// What a fetch asks for. Responses are tagged with the query they were
/// issued for and only applied while it is still the desired one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageQuery {
    pub page_index: usize,
    pub page_size: usize,
    pub sort: Option<SortSpec>,
}

impl PageQuery {
    /// Inclusive row range, as the backing store expects it.
    pub fn range(&self) -> (usize, usize) {
        let start = self.page_index * self.page_size;
        (start, start + self.page_size - 1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageState {
    page_index: usize,
    page_size: usize,
    total_count: usize,
    sort: Option<SortSpec>,
}

impl PageState {
    pub const DEFAULT_PAGE_SIZE: usize = 10;

    /// A zero page size is bumped to one.
    pub fn new(page_size: usize) -> Self {
        Self {
            page_index: 0,
            page_size: page_size.max(1),
            total_count: 0,
            sort: None,
        }
    }

    pub fn page_index(&self) -> usize {
        self.page_index
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn total_count(&self) -> usize {
        self.total_count
    }

    pub fn sort(&self) -> Option<&SortSpec> {
        self.sort.as_ref()
    }

    /// `ceil(total / size)`, never less than one.
    pub fn total_pages(&self) -> usize {
        total_pages(self.total_count, self.page_size)
    }

    pub fn can_next(&self) -> bool {
        self.page_index + 1 < self.total_pages()
    }

    pub fn can_previous(&self) -> bool {
        self.page_index > 0
    }

    pub fn query(&self) -> PageQuery {
        PageQuery {
            page_index: self.page_index,
            page_size: self.page_size,
            sort: self.sort.clone(),
        }
    }

    /// Moves to `index` clamped into the known page range. Returns whether
    /// the index changed.
    pub fn go_to(&mut self, index: usize) -> bool {
        let index = index.min(self.total_pages() - 1);
        if index == self.page_index {
            return false;
        }
        self.page_index = index;
        true
    }

    /// Returns false for a zero or unchanged size.
    pub fn set_page_size(&mut self, size: usize) -> bool {
        if size == 0 || size == self.page_size {
            return false;
        }
        self.page_size = size;
        self.page_index = 0;
        true
    }

    pub fn set_sort(&mut self, sort: Option<SortSpec>) {
        self.sort = sort;
        self.page_index = 0;
    }

    /// Records the server-reported total. Returns true when the current index
    /// fell past the end and was clamped.
    pub fn set_total_count(&mut self, total: usize) -> bool {
        self.total_count = total;
        let clamped = clamp_index(self.page_index, total, self.page_size);
        if clamped == self.page_index {
            return false;
        }
        self.page_index = clamped;
        true
    }
}

impl Default for PageState {
    fn default() -> Self {
        Self::new(Self::DEFAULT_PAGE_SIZE)
    }
}

pub fn total_pages(total_count: usize, page_size: usize) -> usize {
    total_count.div_ceil(page_size.max(1)).max(1)
}

pub fn clamp_index(index: usize, total_count: usize, page_size: usize) -> usize {
    index.min(total_pages(total_count, page_size) - 1)
}
