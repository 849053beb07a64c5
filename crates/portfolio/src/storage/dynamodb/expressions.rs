//! Rendering of conditions, mutations and key conditions into DynamoDB
//! expression strings.
//!
//! Every attribute name goes through a `#n` placeholder and every value
//! through a `:v` placeholder, so reserved words such as `count` or `Status`
//! never need special handling.

use std::collections::HashMap;

use aws_sdk_dynamodb::types::AttributeValue;
use portfolio_core::storage::{Action, Condition, KeyCondition, Mutation, SortCondition};
use serde_json::Value;

use super::conversions::to_attribute;

/// Accumulates placeholders shared by all expressions of one request.
#[derive(Debug, Default)]
pub struct ExpressionBuilder {
    names: HashMap<String, String>,
    values: HashMap<String, AttributeValue>,
    name_ids: HashMap<String, String>,
}

impl ExpressionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Placeholder for one attribute name.
    fn name(&mut self, attribute: &str) -> String {
        if let Some(placeholder) = self.name_ids.get(attribute) {
            return placeholder.clone();
        }
        let placeholder = format!("#n{}", self.name_ids.len());
        self.name_ids
            .insert(attribute.to_string(), placeholder.clone());
        self.names
            .insert(placeholder.clone(), attribute.to_string());
        placeholder
    }

    /// Placeholder path for a dotted document path.
    fn path(&mut self, path: &str) -> String {
        path.split('.')
            .map(|segment| self.name(segment))
            .collect::<Vec<_>>()
            .join(".")
    }

    fn value(&mut self, value: AttributeValue) -> String {
        let placeholder = format!(":v{}", self.values.len());
        self.values.insert(placeholder.clone(), value);
        placeholder
    }

    fn json(&mut self, value: &Value) -> String {
        self.value(to_attribute(value))
    }

    /// Renders a condition. `key_attribute` is the attribute whose presence
    /// stands for the record's existence.
    pub fn condition(&mut self, condition: &Condition, key_attribute: &str) -> String {
        match condition {
            Condition::Exists => format!("attribute_exists({})", self.name(key_attribute)),
            Condition::NotExists => format!("attribute_not_exists({})", self.name(key_attribute)),
            Condition::Equals(path, value) => {
                format!("{} = {}", self.path(path), self.json(value))
            }
            // `<>` holds for a missing attribute, comparisons against missing
            // attributes must not.
            Condition::NotEquals(path, value) => {
                let path = self.path(path);
                format!("(attribute_exists({path}) AND {path} <> {})", self.json(value))
            }
            Condition::LessThan(path, value) => {
                format!("{} < {}", self.path(path), self.json(value))
            }
            Condition::GreaterThan(path, value) => {
                format!("{} > {}", self.path(path), self.json(value))
            }
            Condition::And(all) if all.is_empty() => {
                let key = self.name(key_attribute);
                format!("(attribute_exists({key}) OR attribute_not_exists({key}))")
            }
            Condition::Or(any) if any.is_empty() => {
                let key = self.name(key_attribute);
                format!("(attribute_exists({key}) AND attribute_not_exists({key}))")
            }
            Condition::And(all) => self.join(all, " AND ", key_attribute),
            Condition::Or(any) => self.join(any, " OR ", key_attribute),
        }
    }

    fn join(&mut self, conditions: &[Condition], separator: &str, key_attribute: &str) -> String {
        let parts: Vec<String> = conditions
            .iter()
            .map(|c| self.condition(c, key_attribute))
            .collect();
        format!("({})", parts.join(separator))
    }

    /// Renders an update expression.
    pub fn update(&mut self, mutation: &Mutation) -> String {
        let mut sets = Vec::new();
        let mut removes = Vec::new();

        for action in mutation.actions() {
            match action {
                Action::Set(path, value) => {
                    let path = self.path(path);
                    sets.push(format!("{path} = {}", self.json(value)));
                }
                Action::SetIfAbsent(path, value) => {
                    let path = self.path(path);
                    sets.push(format!("{path} = if_not_exists({path}, {})", self.json(value)));
                }
                Action::Add(path, by) => {
                    let path = self.path(path);
                    let zero = self.value(AttributeValue::N("0".to_string()));
                    let by = self.value(AttributeValue::N(by.to_string()));
                    sets.push(format!("{path} = if_not_exists({path}, {zero}) + {by}"));
                }
                Action::Remove(path) => removes.push(self.path(path)),
            }
        }

        let mut clauses = Vec::new();
        if !sets.is_empty() {
            clauses.push(format!("SET {}", sets.join(", ")));
        }
        if !removes.is_empty() {
            clauses.push(format!("REMOVE {}", removes.join(", ")));
        }
        clauses.join(" ")
    }

    /// Renders a key condition for a Query.
    ///
    /// The partition must be an equality; prefix partitions are served by a
    /// Scan with [`ExpressionBuilder::scan_filter`] instead.
    pub fn key_condition(
        &mut self,
        partition_attribute: &str,
        partition: &str,
        sort_attribute: &str,
        sort: Option<&SortCondition>,
    ) -> String {
        let pk = self.name(partition_attribute);
        let pk_value = self.value(AttributeValue::S(partition.to_string()));
        let mut expression = format!("{pk} = {pk_value}");
        if let Some(sort) = sort {
            expression.push_str(" AND ");
            expression.push_str(&self.sort_condition(sort_attribute, sort));
        }
        expression
    }

    /// Renders key conditions as a Scan filter, combined with an optional
    /// attribute filter.
    pub fn scan_filter(
        &mut self,
        partition_attribute: &str,
        partition: &KeyCondition,
        sort_attribute: &str,
        sort: Option<&SortCondition>,
        filter: Option<&Condition>,
    ) -> String {
        let pk = self.name(partition_attribute);
        let mut parts = vec![match partition {
            KeyCondition::Equals(value) => {
                let value = self.value(AttributeValue::S(value.clone()));
                format!("{pk} = {value}")
            }
            KeyCondition::BeginsWith(prefix) => {
                let value = self.value(AttributeValue::S(prefix.clone()));
                format!("begins_with({pk}, {value})")
            }
        }];
        if let Some(sort) = sort {
            parts.push(self.sort_condition(sort_attribute, sort));
        }
        if let Some(filter) = filter {
            parts.push(self.condition(filter, partition_attribute));
        }
        parts.join(" AND ")
    }

    fn sort_condition(&mut self, sort_attribute: &str, sort: &SortCondition) -> String {
        let sk = self.name(sort_attribute);
        match sort {
            SortCondition::Equals(value) => {
                let value = self.value(AttributeValue::S(value.clone()));
                format!("{sk} = {value}")
            }
            SortCondition::BeginsWith(prefix) => {
                let value = self.value(AttributeValue::S(prefix.clone()));
                format!("begins_with({sk}, {value})")
            }
            SortCondition::Between(low, high) => {
                let low = self.value(AttributeValue::S(low.clone()));
                let high = self.value(AttributeValue::S(high.clone()));
                format!("{sk} BETWEEN {low} AND {high}")
            }
        }
    }

    /// Placeholder names, or `None` when no name was used.
    pub fn names(&self) -> Option<HashMap<String, String>> {
        (!self.names.is_empty()).then(|| self.names.clone())
    }

    /// Placeholder values, or `None` when no value was used.
    pub fn values(&self) -> Option<HashMap<String, AttributeValue>> {
        (!self.values.is_empty()).then(|| self.values.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_condition_rendering() {
        let mut builder = ExpressionBuilder::new();
        let condition = Condition::equals("Status", "DRAFT").and(Condition::equals("Version", 2));

        let expression = builder.condition(&condition, "PK");

        assert_eq!(expression, "(#n0 = :v0 AND #n1 = :v1)");
        let names = builder.names().unwrap();
        assert_eq!(names["#n0"], "Status");
        assert_eq!(names["#n1"], "Version");
        let values = builder.values().unwrap();
        assert_eq!(values[":v0"], AttributeValue::S("DRAFT".to_string()));
        assert_eq!(values[":v1"], AttributeValue::N("2".to_string()));
    }

    #[test]
    fn test_existence_and_not_equals() {
        let mut builder = ExpressionBuilder::new();
        let condition =
            Condition::NotExists.or(Condition::not_equals("Data.lastTrackedDate", "2024-01-01"));

        let expression = builder.condition(&condition, "PK");

        assert_eq!(
            expression,
            "(attribute_not_exists(#n0) OR (attribute_exists(#n1.#n2) AND #n1.#n2 <> :v0))"
        );
    }

    #[test]
    fn test_update_rendering() {
        let mut builder = ExpressionBuilder::new();
        let mutation = Mutation::new()
            .set("Data.title", "New")
            .set_if_absent("EntityType", "POST")
            .add("viewCount", 1)
            .remove("PublishedAt");

        let expression = builder.update(&mutation);

        assert_eq!(
            expression,
            "SET #n0.#n1 = :v0, #n2 = if_not_exists(#n2, :v1), \
             #n3 = if_not_exists(#n3, :v2) + :v3 REMOVE #n4"
        );
        assert_eq!(builder.names().unwrap()["#n3"], "viewCount");
    }

    #[test]
    fn test_key_condition_rendering() {
        let mut builder = ExpressionBuilder::new();
        let between = SortCondition::Between("2024-01-01".to_string(), "2024-01-31".to_string());

        let expression =
            builder.key_condition("GSI1PK", "VISITOR#DAILY", "GSI1SK", Some(&between));

        assert_eq!(expression, "#n0 = :v0 AND #n1 BETWEEN :v1 AND :v2");
    }

    #[test]
    fn test_scan_filter_rendering() {
        let mut builder = ExpressionBuilder::new();
        let expression = builder.scan_filter(
            "PK",
            &KeyCondition::BeginsWith("POST#".to_string()),
            "SK",
            Some(&SortCondition::Equals("METADATA".to_string())),
            None,
        );

        assert_eq!(expression, "begins_with(#n0, :v0) AND #n1 = :v1");
    }

    #[test]
    fn test_empty_builder_has_no_maps() {
        let builder = ExpressionBuilder::new();
        assert!(builder.names().is_none());
        assert!(builder.values().is_none());
    }
}
