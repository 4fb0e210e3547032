//! Which filter pair a facet value corresponds to, and whether it is selected.

use serde::Deserialize;

use crate::error::{FacetError, Result};
use crate::filter::FilterState;

pub const THROUGH_KEY: &str = "_through";

/// A many-to-many selection: rows related to `value` through `table.column`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
pub struct ThroughToken {
    pub column: String,
    pub table: String,
    pub value: String,
}

impl ThroughToken {
    pub fn new(table: &str, column: &str, value: &str) -> Self {
        Self { column: column.to_string(), table: table.to_string(), value: value.to_string() }
    }

    /// Compact JSON with sorted keys and non-ASCII characters written as
    /// `\uXXXX`, so the same triple always yields the same token.
    pub fn to_token(&self) -> String {
        let json = format!(
            r#"{{"column":{},"table":{},"value":{}}}"#,
            quoted(&self.column),
            quoted(&self.table),
            quoted(&self.value),
        );
        ascii_escaped(&json)
    }

    pub fn parse(token: &str) -> Result<Self> {
        serde_json::from_str(token)
            .map_err(|e| FacetError::InvalidConfiguration(format!("bad {THROUGH_KEY} token {token}: {e}")))
    }
}

fn quoted(text: &str) -> String {
    serde_json::Value::String(text.to_string()).to_string()
}

fn ascii_escaped(json: &str) -> String {
    let mut escaped = String::with_capacity(json.len());
    let mut units = [0u16; 2];
    for ch in json.chars() {
        if ch.is_ascii() {
            escaped.push(ch);
        } else {
            for unit in ch.encode_utf16(&mut units).iter() {
                escaped.push_str(&format!("\\u{unit:04x}"));
            }
        }
    }
    escaped
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// `column = value`
    Equality { column: String, value: String },
    /// the JSON array in `column` contains `value`
    Contains { column: String, value: String },
    /// `date(column) = value`
    DateEquals { column: String, value: String },
    Through(ThroughToken),
}

impl Selection {
    /// The filter pair that expresses this selection.
    pub fn pair(&self) -> (String, String) {
        match self {
            Selection::Equality { column, value } => (column.clone(), value.clone()),
            Selection::Contains { column, value } => (format!("{column}__arraycontains"), value.clone()),
            Selection::DateEquals { column, value } => (format!("{column}__date"), value.clone()),
            Selection::Through(token) => (THROUGH_KEY.to_string(), token.to_token()),
        }
    }

    pub fn is_selected(&self, filter: &dyn FilterState) -> bool {
        let (key, value) = self.pair();
        filter.contains(&key, &value)
    }

    /// Url that flips this selection: removes the pair when selected, adds it
    /// otherwise.
    pub fn toggle_url(&self, filter: &dyn FilterState) -> String {
        let (key, value) = self.pair();
        if filter.contains(&key, &value) {
            filter.with_removed(&key, &value)
        } else {
            filter.with_added(&key, &value)
        }
    }
}
