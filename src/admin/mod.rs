//! Admin registry: which entities the admin API exposes and how their lists
//! are shown. Built once at startup and handed to the server in `AppState`.

use std::cmp::Ordering;

use serde::Serialize;
use serde_json::{Map, Value};

/// Where an entity's rows come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AdminSource {
    Users,
    Recipes,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdminEntity {
    pub name: &'static str,
    #[serde(skip)]
    pub source: AdminSource,
    /// Columns shown in the list, in order.
    pub list_display: &'static [&'static str],
    /// Column to sort by; a leading `-` sorts descending.
    pub ordering: &'static str,
}

impl AdminEntity {
    /// Sorts serialized rows by `ordering` and keeps only `list_display` columns.
    #[must_use]
    pub fn project(&self, mut rows: Vec<Value>) -> Vec<Value> {
        let (key, descending) = match self.ordering.strip_prefix('-') {
            Some(key) => (key, true),
            None => (self.ordering, false),
        };

        rows.sort_by(|a, b| {
            let ord = compare_values(a.get(key), b.get(key));
            if descending { ord.reverse() } else { ord }
        });

        rows.into_iter()
            .map(|row| {
                let columns: Map<String, Value> = self
                    .list_display
                    .iter()
                    .map(|col| (col.to_string(), row.get(*col).cloned().unwrap_or(Value::Null)))
                    .collect();
                Value::Object(columns)
            })
            .collect()
    }
}

/// Nulls sort first; mixed types compare equal.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (None | Some(Value::Null), None | Some(Value::Null)) => Ordering::Equal,
        (None | Some(Value::Null), _) => Ordering::Less,
        (_, None | Some(Value::Null)) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

#[derive(Debug, Clone, Default)]
pub struct AdminRegistry {
    entities: Vec<AdminEntity>,
}

impl AdminRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entity, replacing any earlier one with the same name.
    #[must_use]
    pub fn register(mut self, entity: AdminEntity) -> Self {
        self.entities.retain(|e| e.name != entity.name);
        self.entities.push(entity);
        self
    }

    /// Users listed by id with email, name and active flag; recipes by id.
    #[must_use]
    pub fn standard() -> Self {
        Self::new()
            .register(AdminEntity {
                name: "users",
                source: AdminSource::Users,
                list_display: &["id", "email", "name", "is_active"],
                ordering: "id",
            })
            .register(AdminEntity {
                name: "recipes",
                source: AdminSource::Recipes,
                list_display: &["id", "title", "user_id", "time_minutes", "price"],
                ordering: "id",
            })
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&AdminEntity> {
        self.entities.iter().find(|e| e.name == name)
    }

    #[must_use]
    pub fn entities(&self) -> &[AdminEntity] {
        &self.entities
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_standard_registry() {
        let registry = AdminRegistry::standard();
        assert_eq!(registry.entities().len(), 2);
        assert_eq!(registry.get("users").unwrap().source, AdminSource::Users);
        assert!(registry.get("tags").is_none());
    }

    #[test]
    fn test_register_replaces_same_name() {
        let registry = AdminRegistry::standard().register(AdminEntity {
            name: "users",
            source: AdminSource::Users,
            list_display: &["email"],
            ordering: "-id",
        });
        assert_eq!(registry.entities().len(), 2);
        assert_eq!(registry.get("users").unwrap().list_display, &["email"]);
    }

    #[test]
    fn test_project_orders_and_selects_columns() {
        let entity = AdminEntity {
            name: "users",
            source: AdminSource::Users,
            list_display: &["id", "email"],
            ordering: "-id",
        };
        let rows = vec![
            json!({"id": 1, "email": "a@example.com", "password": "x"}),
            json!({"id": 3, "email": "c@example.com"}),
            json!({"id": 2}),
        ];

        assert_eq!(
            entity.project(rows),
            vec![
                json!({"id": 3, "email": "c@example.com"}),
                json!({"id": 2, "email": null}),
                json!({"id": 1, "email": "a@example.com"}),
            ]
        );
    }
}
