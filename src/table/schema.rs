use serde::{Deserialize, Serialize};

use super::{
    page::{PageState, SortSpec},
    row::FieldSpec,
};

/// Describes one editable table: which fields it has and how it pages by
/// default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    /// Singular label used in dialog titles and notices ("Brand").
    pub label: String,
    pub fields: Vec<FieldSpec>,
    pub default_sort: SortSpec,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

fn default_page_size() -> usize {
    PageState::DEFAULT_PAGE_SIZE
}

impl TableSchema {
    pub fn brands() -> Self {
        Self {
            name: "brands".to_string(),
            label: "Brand".to_string(),
            fields: vec![
                FieldSpec::text("name", "Name"),
                FieldSpec::text("country", "Country"),
            ],
            default_sort: SortSpec::asc("name"),
            page_size: default_page_size(),
        }
    }

    pub fn models() -> Self {
        Self {
            name: "models".to_string(),
            label: "Model".to_string(),
            fields: vec![
                FieldSpec::text("name", "Name"),
                FieldSpec::integer("brand_id", "Brand ID"),
            ],
            default_sort: SortSpec::asc("name"),
            page_size: default_page_size(),
        }
    }

    pub fn builtin() -> Vec<Self> {
        vec![Self::brands(), Self::models()]
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// Sorting is allowed on declared fields and on `id`.
    pub fn is_sortable(&self, name: &str) -> bool {
        name == "id" || self.field(name).is_some()
    }
}
