use std::{cmp::Ordering, collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::TableError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
}

impl Scalar {
    fn rank(&self) -> u8 {
        match self {
            Scalar::Null => 0,
            Scalar::Bool(_) => 1,
            Scalar::Int(_) => 2,
            Scalar::Text(_) => 3,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    pub fn to_json(&self) -> Value {
        match self {
            Scalar::Null => Value::Null,
            Scalar::Bool(value) => Value::Bool(*value),
            Scalar::Int(value) => Value::from(*value),
            Scalar::Text(text) => Value::String(text.clone()),
        }
    }
}

impl Ord for Scalar {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Scalar::Bool(a), Scalar::Bool(b)) => a.cmp(b),
            (Scalar::Int(a), Scalar::Int(b)) => a.cmp(b),
            (Scalar::Text(a), Scalar::Text(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for Scalar {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => Ok(()),
            Scalar::Bool(value) => write!(f, "{value}"),
            Scalar::Int(value) => write!(f, "{value}"),
            Scalar::Text(text) => f.write_str(text),
        }
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Text(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::Text(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Int(value)
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Scalar::Bool(value)
    }
}

pub type Fields = BTreeMap<String, Scalar>;

/// A persisted record. Rows are only ever replaced wholesale by a fetch;
/// nothing edits one in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    pub id: i64,
    #[serde(flatten)]
    pub fields: Fields,
}

impl Row {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            fields: Fields::new(),
        }
    }

    pub fn with(mut self, name: &str, value: impl Into<Scalar>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&Scalar> {
        self.fields.get(name)
    }

    /// Value used for ordering and display; `id` is addressable like a field.
    pub fn sort_key(&self, name: &str) -> Scalar {
        if name == "id" {
            return Scalar::Int(self.id);
        }
        self.fields.get(name).cloned().unwrap_or(Scalar::Null)
    }

    pub fn display(&self, name: &str) -> String {
        self.sort_key(name).to_string()
    }

    pub fn apply(&mut self, patch: &Patch) {
        for (name, value) in &patch.0 {
            if value.is_null() {
                self.fields.remove(name);
            } else {
                self.fields.insert(name.clone(), value.clone());
            }
        }
    }
}

/// Field changes sent with an update. A `Null` value clears the field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Patch(pub Fields);

impl Patch {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn fields(&self) -> &Fields {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Text,
    Integer,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub label: String,
    #[serde(default = "FieldSpec::default_kind")]
    pub kind: FieldKind,
    #[serde(default)]
    pub required: bool,
}

impl FieldSpec {
    pub fn text(name: &str, label: &str) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            kind: FieldKind::Text,
            required: true,
        }
    }

    pub fn integer(name: &str, label: &str) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            kind: FieldKind::Integer,
            required: true,
        }
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    fn default_kind() -> FieldKind {
        FieldKind::Text
    }

    fn parse(&self, raw: &str) -> Result<Scalar, TableError> {
        let value = raw.trim();
        if value.is_empty() {
            if self.required {
                return Err(TableError::Validation(format!("{} is required", self.label)));
            }
            return Ok(Scalar::Null);
        }
        match self.kind {
            FieldKind::Text => Ok(Scalar::Text(value.to_string())),
            FieldKind::Integer => value.parse::<i64>().map(Scalar::Int).map_err(|_| {
                TableError::Validation(format!("{} must be a whole number", self.label))
            }),
        }
    }
}

/// Raw dialog input, keyed by field name. Never aliases a table row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Draft {
    values: BTreeMap<String, String>,
}

impl Draft {
    pub fn empty(fields: &[FieldSpec]) -> Self {
        Self {
            values: fields
                .iter()
                .map(|field| (field.name.clone(), String::new()))
                .collect(),
        }
    }

    pub fn from_row(fields: &[FieldSpec], row: &Row) -> Self {
        Self {
            values: fields
                .iter()
                .map(|field| (field.name.clone(), row.display(&field.name)))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> &str {
        self.values.get(name).map(String::as_str).unwrap_or("")
    }

    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        self.values.insert(name.to_string(), value.into());
    }

    /// Converts the draft into typed fields, failing on the first invalid one
    /// in declaration order.
    pub fn to_fields(&self, fields: &[FieldSpec]) -> Result<Fields, TableError> {
        let mut out = Fields::new();
        for field in fields {
            let value = field.parse(self.get(&field.name))?;
            if !value.is_null() {
                out.insert(field.name.clone(), value);
            }
        }
        Ok(out)
    }

    /// Fields that differ from `original`. Cleared optional fields show up
    /// as `Null`.
    pub fn to_patch(&self, fields: &[FieldSpec], original: &Row) -> Result<Patch, TableError> {
        let typed = self.to_fields(fields)?;
        let mut patch = Fields::new();
        for field in fields {
            let next = typed.get(&field.name).cloned().unwrap_or(Scalar::Null);
            let current = original.get(&field.name).cloned().unwrap_or(Scalar::Null);
            if next != current {
                patch.insert(field.name.clone(), next);
            }
        }
        Ok(Patch(patch))
    }
}
