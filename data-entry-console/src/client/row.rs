//! Rows as the editor holds them

use crate::schema::RowValues;
use serde_json::Value;

/// A row in the editor's visible set
///
/// A pending row was inserted optimistically and has not been confirmed by
/// the server. Its temporary identifier exists only on this variant and is
/// never sent to the backend.
#[derive(Debug, Clone, PartialEq)]
pub enum RowEntry {
    Pending { temp_id: String, values: RowValues },
    Confirmed { values: RowValues },
}

impl RowEntry {
    pub fn pending(values: RowValues) -> Self {
        RowEntry::Pending {
            temp_id: format!("temp-{}", uuid::Uuid::new_v4()),
            values,
        }
    }

    pub fn confirmed(values: RowValues) -> Self {
        RowEntry::Confirmed { values }
    }

    pub fn values(&self) -> &RowValues {
        match self {
            RowEntry::Pending { values, .. } | RowEntry::Confirmed { values } => values,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, RowEntry::Pending { .. })
    }

    pub fn temp_id(&self) -> Option<&str> {
        match self {
            RowEntry::Pending { temp_id, .. } => Some(temp_id),
            RowEntry::Confirmed { .. } => None,
        }
    }

    /// The value of the key column, for confirmed rows only
    pub fn key(&self, column: &str) -> Option<&Value> {
        match self {
            RowEntry::Confirmed { values } => values.get(column).filter(|value| !value.is_null()),
            RowEntry::Pending { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_pending_rows_have_no_key() {
        let mut values = RowValues::new();
        values.insert("id".to_string(), json!(7));

        let pending = RowEntry::pending(values.clone());
        assert!(pending.is_pending());
        assert!(pending.temp_id().unwrap().starts_with("temp-"));
        assert_eq!(pending.key("id"), None);
        assert!(!pending.values().contains_key("_tempId"));

        let confirmed = RowEntry::confirmed(values);
        assert_eq!(confirmed.key("id"), Some(&json!(7)));
        assert_eq!(confirmed.temp_id(), None);
    }
}
