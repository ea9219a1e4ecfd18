//! Typed entities and dirty-field tracking.
//!
//! An `Entity` exposes an explicit field table (names plus typed get/set
//! accessors) instead of runtime reflection. Hydration starts from
//! `Default::default()` and assigns fields directly; no custom constructor
//! runs. `Tracked<T>` pairs an entity with the field snapshot captured at
//! hydration time, the baseline for dirty-field diffing on update.

use crate::value::SqlValue;
use std::collections::BTreeMap;

/// A struct that maps onto one table row.
///
/// Implemented with the [`entity_fields!`](crate::entity_fields) macro:
///
/// ```
/// use dbal::entity_fields;
///
/// #[derive(Debug, Default, Clone)]
/// struct Account {
///     id: i64,
///     email: String,
///     active: bool,
/// }
///
/// entity_fields!(Account { id, email, active });
/// ```
pub trait Entity: Default {
    /// Declared field names, in column order.
    fn field_names() -> &'static [&'static str];

    /// Read one field as a bind value. Unknown names read as null.
    fn get(&self, field: &str) -> SqlValue;

    /// Assign one field from a decoded value. Unknown names and
    /// incompatible values are ignored; the field keeps its default.
    fn set(&mut self, field: &str, value: SqlValue);
}

/// Snapshot of an entity's field values, keyed by field name.
pub type FieldSnapshot = BTreeMap<&'static str, SqlValue>;

fn snapshot_of<T: Entity>(entity: &T) -> FieldSnapshot {
    T::field_names()
        .iter()
        .map(|f| (*f, entity.get(f)))
        .collect()
}

/// An entity plus the field snapshot captured when it was hydrated.
///
/// The snapshot is immutable after capture; it changes only through
/// re-hydration or an explicit [`rebaseline`](Tracked::rebaseline).
#[derive(Debug, Clone)]
pub struct Tracked<T: Entity> {
    entity: T,
    snapshot: FieldSnapshot,
}

impl<T: Entity> Tracked<T> {
    /// Wrap a freshly hydrated entity; the snapshot equals its current
    /// field values, so nothing starts dirty.
    pub fn hydrated(entity: T) -> Self {
        let snapshot = snapshot_of(&entity);
        Self { entity, snapshot }
    }

    /// Wrap an entity with no database baseline; every field counts as
    /// dirty, so an update writes all of them.
    pub fn detached(entity: T) -> Self {
        Self {
            entity,
            snapshot: FieldSnapshot::new(),
        }
    }

    /// Fields whose current value differs from the snapshot, in field
    /// order. A field absent from the snapshot is dirty.
    pub fn dirty_fields(&self) -> Vec<&'static str> {
        T::field_names()
            .iter()
            .copied()
            .filter(|f| self.snapshot.get(f) != Some(&self.entity.get(f)))
            .collect()
    }

    /// True when no field differs from the snapshot.
    pub fn is_clean(&self) -> bool {
        self.dirty_fields().is_empty()
    }

    /// Replace the snapshot with the current field values, e.g. after a
    /// successful update.
    pub fn rebaseline(&mut self) {
        self.snapshot = snapshot_of(&self.entity);
    }

    /// The captured snapshot.
    pub fn snapshot(&self) -> &FieldSnapshot {
        &self.snapshot
    }

    /// Consume the wrapper and return the entity.
    pub fn into_inner(self) -> T {
        self.entity
    }
}

impl<T: Entity> std::ops::Deref for Tracked<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.entity
    }
}

impl<T: Entity> std::ops::DerefMut for Tracked<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.entity
    }
}

/// Conversion between a concrete field type and [`SqlValue`].
///
/// Implemented for the column types entities may declare; the
/// `entity_fields!` macro routes get/set through it.
pub trait FieldType: Sized {
    fn to_sql_value(&self) -> SqlValue;
    fn from_sql_value(value: SqlValue) -> Option<Self>;
}

impl FieldType for i64 {
    fn to_sql_value(&self) -> SqlValue {
        SqlValue::Int(*self)
    }

    fn from_sql_value(value: SqlValue) -> Option<Self> {
        match value {
            SqlValue::Int(v) => Some(v),
            SqlValue::Bool(v) => Some(v as i64),
            SqlValue::Text(s) => s.parse().ok(),
            _ => None,
        }
    }
}

impl FieldType for i32 {
    fn to_sql_value(&self) -> SqlValue {
        SqlValue::Int(*self as i64)
    }

    fn from_sql_value(value: SqlValue) -> Option<Self> {
        i64::from_sql_value(value).and_then(|v| i32::try_from(v).ok())
    }
}

impl FieldType for bool {
    fn to_sql_value(&self) -> SqlValue {
        SqlValue::Bool(*self)
    }

    fn from_sql_value(value: SqlValue) -> Option<Self> {
        match value {
            SqlValue::Bool(v) => Some(v),
            // SQLite stores booleans as 0/1 integers
            SqlValue::Int(v) => Some(v != 0),
            _ => None,
        }
    }
}

impl FieldType for f64 {
    fn to_sql_value(&self) -> SqlValue {
        SqlValue::Float(*self)
    }

    fn from_sql_value(value: SqlValue) -> Option<Self> {
        match value {
            SqlValue::Float(v) => Some(v),
            SqlValue::Int(v) => Some(v as f64),
            SqlValue::Text(s) => s.parse().ok(),
            _ => None,
        }
    }
}

impl FieldType for String {
    fn to_sql_value(&self) -> SqlValue {
        SqlValue::Text(self.clone())
    }

    fn from_sql_value(value: SqlValue) -> Option<Self> {
        match value {
            SqlValue::Text(s) => Some(s),
            SqlValue::Int(v) => Some(v.to_string()),
            SqlValue::Float(v) => Some(v.to_string()),
            _ => None,
        }
    }
}

impl<T: FieldType> FieldType for Option<T> {
    fn to_sql_value(&self) -> SqlValue {
        match self {
            Some(v) => v.to_sql_value(),
            None => SqlValue::Null,
        }
    }

    fn from_sql_value(value: SqlValue) -> Option<Self> {
        match value {
            SqlValue::Null => Some(None),
            other => T::from_sql_value(other).map(Some),
        }
    }
}

/// Generate the [`Entity`](crate::entity::Entity) impl for a struct with
/// named fields of [`FieldType`](crate::entity::FieldType) types.
#[macro_export]
macro_rules! entity_fields {
    ($ty:ty { $($field:ident),+ $(,)? }) => {
        impl $crate::entity::Entity for $ty {
            fn field_names() -> &'static [&'static str] {
                &[$(stringify!($field)),+]
            }

            fn get(&self, field: &str) -> $crate::value::SqlValue {
                match field {
                    $(stringify!($field) =>
                        $crate::entity::FieldType::to_sql_value(&self.$field),)+
                    _ => $crate::value::SqlValue::Null,
                }
            }

            fn set(&mut self, field: &str, value: $crate::value::SqlValue) {
                match field {
                    $(stringify!($field) => {
                        if let Some(v) = $crate::entity::FieldType::from_sql_value(value) {
                            self.$field = v;
                        }
                    })+
                    _ => {}
                }
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, Clone)]
    struct Account {
        id: i64,
        email: String,
        active: bool,
        score: Option<i64>,
    }

    entity_fields!(Account { id, email, active, score });

    #[test]
    fn test_field_table() {
        assert_eq!(Account::field_names(), &["id", "email", "active", "score"]);
    }

    #[test]
    fn test_get_set() {
        let mut acc = Account::default();
        acc.set("id", SqlValue::Int(7));
        acc.set("email", SqlValue::Text("a@b.c".to_string()));
        acc.set("active", SqlValue::Int(1));
        acc.set("score", SqlValue::Null);
        acc.set("unknown", SqlValue::Int(1));

        assert_eq!(acc.id, 7);
        assert_eq!(acc.email, "a@b.c");
        assert!(acc.active);
        assert_eq!(acc.score, None);
        assert_eq!(acc.get("id"), SqlValue::Int(7));
        assert_eq!(acc.get("unknown"), SqlValue::Null);
    }

    #[test]
    fn test_incompatible_value_keeps_default() {
        let mut acc = Account::default();
        acc.set("id", SqlValue::Text("not a number".to_string()));
        assert_eq!(acc.id, 0);
    }

    #[test]
    fn test_hydrated_starts_clean() {
        let acc = Account {
            id: 1,
            email: "a@b.c".to_string(),
            active: true,
            score: Some(10),
        };
        let tracked = Tracked::hydrated(acc);
        assert!(tracked.is_clean());
        assert!(tracked.dirty_fields().is_empty());
    }

    #[test]
    fn test_dirty_after_mutation() {
        let mut tracked = Tracked::hydrated(Account {
            id: 1,
            email: "a@b.c".to_string(),
            active: true,
            score: None,
        });
        tracked.email = "new@b.c".to_string();
        assert_eq!(tracked.dirty_fields(), vec!["email"]);

        tracked.score = Some(5);
        assert_eq!(tracked.dirty_fields(), vec!["email", "score"]);

        tracked.rebaseline();
        assert!(tracked.is_clean());
    }

    #[test]
    fn test_detached_is_fully_dirty() {
        let tracked = Tracked::detached(Account::default());
        assert_eq!(tracked.dirty_fields().len(), Account::field_names().len());
    }

    #[test]
    fn test_reverting_a_change_clears_dirtiness() {
        let mut tracked = Tracked::hydrated(Account {
            id: 1,
            email: "a@b.c".to_string(),
            active: false,
            score: None,
        });
        tracked.active = true;
        tracked.active = false;
        assert!(tracked.is_clean());
    }
}
