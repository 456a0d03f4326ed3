//! JSON records, their accessor, and command-line argument parsing.

use std::collections::HashSet;
use std::fmt;

use lazyrow_memory::Filter;
use lazyrow_view::{Record, RecordAccessor};
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors reading a record file or parsing arguments.
#[derive(Debug, Error)]
pub enum RowsError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("expected a JSON array of objects")]
    NotAnArray,

    #[error("record {index} is not an object")]
    NotAnObject { index: usize },

    #[error("record {index} has no usable '{field}' (expected a string or integer)")]
    MissingId { index: usize, field: String },

    #[error("duplicate identity {0}")]
    DuplicateId(RowId),

    #[error("invalid filter '{0}': expected <property><op><value> with op one of = != > >= < <= ~ ~~")]
    InvalidFilter(String),

    #[error("invalid sort '{0}': expected <property>[:asc|:desc]")]
    InvalidSort(String),
}

/// Identity of a JSON record: an integer or a string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RowId {
    Int(i64),
    Text(String),
}

impl RowId {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(RowId::Int),
            Value::String(s) => Some(RowId::Text(s.clone())),
            _ => None,
        }
    }

    /// Identities a command-line argument may refer to, most likely first.
    pub fn candidates(arg: &str) -> Vec<RowId> {
        match arg.parse::<i64>() {
            Ok(n) => vec![RowId::Int(n), RowId::Text(arg.to_string())],
            Err(_) => vec![RowId::Text(arg.to_string())],
        }
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowId::Int(n) => write!(f, "{n}"),
            RowId::Text(s) => write!(f, "{s:?}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JsonRow {
    id: RowId,
    fields: Map<String, Value>,
}

impl JsonRow {
    pub fn to_json(&self) -> Value {
        Value::Object(self.fields.clone())
    }

    /// Value at a dotted path such as `address.city`.
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let mut current = self.fields.get(parts.next()?)?;
        for part in parts {
            current = current.as_object()?.get(part)?;
        }
        Some(current)
    }
}

impl Record for JsonRow {
    type Id = RowId;

    fn id(&self) -> RowId {
        self.id.clone()
    }
}

/// Parse a JSON array of objects, taking identities from `id_field`.
pub fn parse_rows(text: &str, id_field: &str) -> Result<Vec<JsonRow>, RowsError> {
    let Value::Array(values) = serde_json::from_str::<Value>(text)? else {
        return Err(RowsError::NotAnArray);
    };

    let mut seen = HashSet::new();
    let mut rows = Vec::with_capacity(values.len());
    for (index, value) in values.into_iter().enumerate() {
        let Value::Object(fields) = value else {
            return Err(RowsError::NotAnObject { index });
        };
        let id = fields
            .get(id_field)
            .and_then(RowId::from_value)
            .ok_or_else(|| RowsError::MissingId {
                index,
                field: id_field.to_string(),
            })?;
        if !seen.insert(id.clone()) {
            return Err(RowsError::DuplicateId(id));
        }
        rows.push(JsonRow { id, fields });
    }
    Ok(rows)
}

/// Accessor exposing every scalar path found in the loaded records.
pub struct JsonAccessor {
    columns: Vec<String>,
}

impl JsonAccessor {
    /// The identity field comes first, then every other column in the order
    /// first seen (keys of one record in sorted order). Nested objects
    /// contribute dotted paths to their leaves.
    pub fn from_rows(rows: &[JsonRow], id_field: &str) -> Self {
        let mut columns = vec![id_field.to_string()];
        let mut seen = HashSet::from([id_field.to_string()]);
        for row in rows {
            collect_paths("", &row.fields, &mut columns, &mut seen);
        }
        Self { columns }
    }
}

fn collect_paths(
    prefix: &str,
    fields: &Map<String, Value>,
    columns: &mut Vec<String>,
    seen: &mut HashSet<String>,
) {
    for (key, value) in fields {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            Value::Object(nested) => collect_paths(&path, nested, columns, seen),
            _ => {
                if seen.insert(path.clone()) {
                    columns.push(path);
                }
            }
        }
    }
}

impl RecordAccessor<JsonRow> for JsonAccessor {
    fn all(&self) -> Vec<String> {
        self.columns.clone()
    }

    fn sortable(&self) -> Vec<String> {
        self.columns.clone()
    }

    fn filterable(&self) -> Vec<String> {
        self.columns.clone()
    }

    fn column_name(&self, property: &str) -> String {
        property
            .split(['.', '_'])
            .filter(|word| !word.is_empty())
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect(),
                    None => String::new(),
                }
            })
            .collect::<Vec<String>>()
            .join(" ")
    }

    fn value(&self, record: &JsonRow, property: &str) -> Option<Value> {
        record.lookup(property).cloned()
    }

    fn sentinel(&self, index: usize) -> JsonRow {
        JsonRow {
            id: RowId::Text(format!("<unavailable #{index}>")),
            fields: Map::new(),
        }
    }
}

const OPERATORS: [&str; 8] = ["!=", ">=", "<=", "~~", "=", ">", "<", "~"];

/// Parse `<property><op><value>`.
///
/// Values are read as JSON when they parse as JSON and as plain strings
/// otherwise; `null` with `=`/`!=` tests for a missing value.
pub fn parse_filter(arg: &str) -> Result<Filter<RowId>, RowsError> {
    let invalid = || RowsError::InvalidFilter(arg.to_string());

    let at = arg.find(['!', '<', '>', '=', '~']).ok_or_else(invalid)?;
    let property = arg[..at].trim();
    if property.is_empty() {
        return Err(invalid());
    }
    let rest = &arg[at..];
    let op = OPERATORS
        .iter()
        .find(|op| rest.starts_with(*op))
        .ok_or_else(invalid)?;
    let raw = rest[op.len()..].trim();
    let value = serde_json::from_str::<Value>(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    let property = property.to_string();

    Ok(match (*op, value) {
        ("=", Value::Null) => Filter::IsNull { property },
        ("!=", Value::Null) => Filter::not(Filter::IsNull { property }),
        ("=", value) => Filter::Equal { property, value },
        ("!=", value) => Filter::not(Filter::Equal { property, value }),
        (">", value) => Filter::Greater { property, value },
        (">=", value) => Filter::GreaterOrEqual { property, value },
        ("<", value) => Filter::Less { property, value },
        ("<=", value) => Filter::LessOrEqual { property, value },
        ("~", _) => Filter::like(property, raw),
        ("~~", _) => Filter::contains(property, raw),
        _ => return Err(invalid()),
    })
}

/// Parse `<property>[:asc|:desc]` into a property and direction.
pub fn parse_sort(arg: &str) -> Result<(String, bool), RowsError> {
    let (property, ascending) = match arg.rsplit_once(':') {
        Some((property, "asc")) => (property, true),
        Some((property, "desc")) => (property, false),
        Some(_) => return Err(RowsError::InvalidSort(arg.to_string())),
        None => (arg, true),
    };
    if property.is_empty() {
        return Err(RowsError::InvalidSort(arg.to_string()));
    }
    Ok((property.to_string(), ascending))
}

/// Cell text for a value: strings unquoted, missing and null empty.
pub fn format_value(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Render a header row and body rows as left-aligned columns.
pub fn render_table(headers: &[String], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let line = |cells: &[String]| {
        let padded: Vec<String> = cells
            .iter()
            .zip(&widths)
            .map(|(cell, &width)| format!("{cell:<width$}"))
            .collect();
        padded.join("  ").trim_end().to_string()
    };

    let mut out = String::new();
    out.push_str(&line(headers));
    out.push('\n');
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    out.push_str(&line(&rule[..]));
    out.push('\n');
    for row in rows {
        out.push_str(&line(&row[..]));
        out.push('\n');
    }
    out
}
