//! Result mapping.
//!
//! Converts a buffered [`RowSet`] into scalars, field maps, or hydrated
//! entities. Hydration assigns column values to same-named fields on a
//! `Default`-constructed entity and captures the field snapshot immediately
//! afterwards; it never validates shape, so an unmatched column is simply
//! dropped and an unmatched field keeps its default.

use crate::entity::{Entity, Tracked};
use crate::row::RowSet;
use crate::value::SqlValue;
use serde_json::Value as JsonValue;

/// First column of the first row, `None` if the result is empty.
pub fn for_column(rows: &RowSet) -> Option<JsonValue> {
    let row = rows.first()?;
    let column = rows.columns.first()?;
    match row.get(column) {
        Some(JsonValue::Null) | None => None,
        Some(value) => Some(value.clone()),
    }
}

/// First column of every row.
pub fn for_column_list(rows: &RowSet) -> Vec<JsonValue> {
    let Some(column) = rows.columns.first() else {
        return Vec::new();
    };
    rows.rows
        .iter()
        .map(|row| row.get(column).cloned().unwrap_or(JsonValue::Null))
        .collect()
}

/// First row as a field-name -> value map, empty map if no row.
pub fn for_row(rows: &RowSet) -> serde_json::Map<String, JsonValue> {
    rows.first().cloned().unwrap_or_default()
}

/// All rows as field-name -> value maps.
pub fn for_list(rows: &RowSet) -> Vec<serde_json::Map<String, JsonValue>> {
    rows.rows.clone()
}

/// First row hydrated into `T`, snapshot captured.
pub fn for_object<T: Entity>(rows: &RowSet) -> Option<Tracked<T>> {
    rows.first().map(|row| hydrate(row))
}

/// All rows hydrated into `T`, one snapshot per entity.
pub fn for_object_list<T: Entity>(rows: &RowSet) -> Vec<Tracked<T>> {
    rows.rows.iter().map(|row| hydrate(row)).collect()
}

fn hydrate<T: Entity>(row: &serde_json::Map<String, JsonValue>) -> Tracked<T> {
    let mut entity = T::default();
    for field in T::field_names() {
        if let Some(value) = row.get(*field) {
            entity.set(field, SqlValue::from_json(value));
        }
    }
    Tracked::hydrated(entity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity_fields;

    #[derive(Debug, Default, Clone)]
    struct Topic {
        id: i64,
        title: String,
        sticky: bool,
    }

    entity_fields!(Topic { id, title, sticky });

    fn sample_rows() -> RowSet {
        let mut first = serde_json::Map::new();
        first.insert("id".to_string(), JsonValue::Number(1.into()));
        first.insert("title".to_string(), JsonValue::String("hello".to_string()));
        first.insert("sticky".to_string(), JsonValue::Bool(true));
        first.insert("extra".to_string(), JsonValue::String("ignored".to_string()));

        let mut second = serde_json::Map::new();
        second.insert("id".to_string(), JsonValue::Number(2.into()));
        second.insert("title".to_string(), JsonValue::String("world".to_string()));
        second.insert("sticky".to_string(), JsonValue::Bool(false));
        second.insert("extra".to_string(), JsonValue::Null);

        RowSet {
            columns: vec![
                "id".to_string(),
                "title".to_string(),
                "sticky".to_string(),
                "extra".to_string(),
            ],
            rows: vec![first, second],
        }
    }

    #[test]
    fn test_for_column() {
        assert_eq!(for_column(&sample_rows()), Some(JsonValue::Number(1.into())));
        assert_eq!(for_column(&RowSet::default()), None);
    }

    #[test]
    fn test_for_column_list() {
        let values = for_column_list(&sample_rows());
        assert_eq!(
            values,
            vec![JsonValue::Number(1.into()), JsonValue::Number(2.into())]
        );
        assert!(for_column_list(&RowSet::default()).is_empty());
    }

    #[test]
    fn test_for_row() {
        let row = for_row(&sample_rows());
        assert_eq!(row["title"], JsonValue::String("hello".to_string()));
        assert!(for_row(&RowSet::default()).is_empty());
    }

    #[test]
    fn test_for_list() {
        assert_eq!(for_list(&sample_rows()).len(), 2);
    }

    #[test]
    fn test_for_object_hydrates_and_snapshots() {
        let topic: Tracked<Topic> = for_object(&sample_rows()).unwrap();
        assert_eq!(topic.id, 1);
        assert_eq!(topic.title, "hello");
        assert!(topic.sticky);
        // Snapshot captured after hydration: nothing is dirty yet.
        assert!(topic.is_clean());
    }

    #[test]
    fn test_for_object_empty() {
        assert!(for_object::<Topic>(&RowSet::default()).is_none());
    }

    #[test]
    fn test_for_object_list() {
        let topics: Vec<Tracked<Topic>> = for_object_list(&sample_rows());
        assert_eq!(topics.len(), 2);
        assert_eq!(topics[1].title, "world");
        assert!(topics.iter().all(|t| t.is_clean()));
    }

    #[test]
    fn test_missing_column_keeps_default() {
        let mut row = serde_json::Map::new();
        row.insert("id".to_string(), JsonValue::Number(9.into()));
        let rows = RowSet {
            columns: vec!["id".to_string()],
            rows: vec![row],
        };
        let topic: Tracked<Topic> = for_object(&rows).unwrap();
        assert_eq!(topic.id, 9);
        assert_eq!(topic.title, "");
        assert!(!topic.sticky);
    }
}
