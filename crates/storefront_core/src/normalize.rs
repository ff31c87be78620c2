//! The single boundary where loosely shaped API payloads become typed values.
//!
//! Endpoints answer with a bare array, `{products: [...]}`, `{data: [...]}`
//! or `{success: false}`. Nothing past this module branches on shape.

use serde::de::DeserializeOwned;
use serde_json::Value;
use shared::protocol::Product;
use tracing::{debug, warn};

use crate::filter::PageState;

const LIST_FIELDS: [&str; 2] = ["products", "data"];
const NESTED_LIST_FIELDS: [&str; 2] = ["products", "items"];
const TOTAL_FIELDS: [&str; 4] = ["total", "totalCount", "totalProducts", "count"];
const RECORD_FIELDS: [&str; 3] = ["data", "cartItem", "item"];

/// Canonical paged result every catalog response resolves to.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult<T = Product> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
}

impl<T> QueryResult<T> {
    pub fn empty(requested: PageState) -> Self {
        Self {
            items: Vec::new(),
            total: 0,
            page: requested.page(),
            per_page: requested.per_page(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Outcome of extracting one echoed record from a mutation response.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordOutcome<T> {
    Record(T),
    Rejected(Option<String>),
    Unrecognized,
}

/// Never fails: unknown and failure shapes degrade to an empty page.
pub fn normalize<T: DeserializeOwned>(raw: &Value, requested: PageState) -> QueryResult<T> {
    if is_failure(raw) {
        debug!("normalize: failure marker in payload");
        return QueryResult::empty(requested);
    }
    let Some(entries) = locate_list(raw) else {
        debug!("normalize: unrecognized payload shape");
        return QueryResult::empty(requested);
    };

    let items = decode_entries::<T>(entries);
    let counted = items.len() as u64;
    let total = declared_total(raw).map_or(counted, |declared| declared.max(counted));

    QueryResult {
        items,
        total,
        page: requested.page(),
        per_page: requested.per_page(),
    }
}

/// List-valued part of a payload without paging metadata (cart listings).
pub fn normalize_list<T: DeserializeOwned>(raw: &Value) -> Vec<T> {
    if is_failure(raw) {
        return Vec::new();
    }
    locate_list(raw)
        .map(|entries| decode_entries(entries))
        .unwrap_or_default()
}

pub fn normalize_record<T: DeserializeOwned>(raw: &Value) -> RecordOutcome<T> {
    if is_failure(raw) {
        let message = raw
            .get("message")
            .or_else(|| raw.get("error"))
            .and_then(Value::as_str)
            .map(str::to_owned);
        return RecordOutcome::Rejected(message);
    }

    let nested = RECORD_FIELDS.iter().filter_map(|field| raw.get(*field));
    for candidate in std::iter::once(raw).chain(nested) {
        if !candidate.is_object() {
            continue;
        }
        if let Ok(record) = T::deserialize(candidate) {
            return RecordOutcome::Record(record);
        }
    }
    RecordOutcome::Unrecognized
}

fn is_failure(raw: &Value) -> bool {
    raw.get("success").and_then(Value::as_bool) == Some(false)
}

fn locate_list(raw: &Value) -> Option<&Vec<Value>> {
    match raw {
        Value::Array(entries) => Some(entries),
        Value::Object(map) => LIST_FIELDS
            .iter()
            .find_map(|field| map.get(*field))
            .and_then(|value| match value {
                Value::Array(entries) => Some(entries),
                Value::Object(inner) => NESTED_LIST_FIELDS
                    .iter()
                    .find_map(|field| inner.get(*field))
                    .and_then(Value::as_array),
                _ => None,
            }),
        _ => None,
    }
}

fn decode_entries<T: DeserializeOwned>(entries: &[Value]) -> Vec<T> {
    entries
        .iter()
        .enumerate()
        .filter_map(|(index, entry)| match T::deserialize(entry) {
            Ok(item) => Some(item),
            Err(err) => {
                warn!(index, error = %err, "normalize: skipping undecodable entry");
                None
            }
        })
        .collect()
}

fn declared_total(raw: &Value) -> Option<u64> {
    let nested = raw.get("data").filter(|data| data.is_object());
    std::iter::once(raw)
        .chain(nested)
        .flat_map(|scope| TOTAL_FIELDS.iter().filter_map(move |field| scope.get(*field)))
        .find_map(Value::as_u64)
}

#[cfg(test)]
#[path = "tests/normalize_tests.rs"]
mod tests;
