//! Request options for content and search calls.
//!
//! Parameter names are part of the API contract: `publicId`,
//! `legacyMetadata`, `skip`, `take`, `contentDefinition`, `repositories`,
//! `tags`, `propFilters` and `sorting`.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::query::{EncodeValues, QueryValues, ToQuery};

/// Options for fetching a single content item.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentOptions {
    /// Public id of the content to retrieve.
    pub public_id: String,
    pub legacy_metadata: bool,
}

impl ContentOptions {
    pub fn new(public_id: impl Into<String>) -> Self {
        Self {
            public_id: public_id.into(),
            legacy_metadata: false,
        }
    }
}

impl ToQuery for ContentOptions {
    fn append_to(&self, values: &mut QueryValues) -> Result<()> {
        if self.legacy_metadata {
            values.add("legacyMetadata", "true");
        }
        values.add("publicId", &self.public_id);
        Ok(())
    }
}

/// Options for a paginated search.
///
/// `skip` and `take` are always sent; every other field is left out while
/// empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchOptions {
    pub skip: u32,
    pub take: u32,
    pub public_id: Vec<String>,
    pub content_definition: Vec<String>,
    pub repositories: Vec<String>,
    pub legacy_metadata: bool,
    pub tags: Vec<String>,
    pub prop_filters: PropFilters,
    pub sorting: Sorting,
}

impl SearchOptions {
    pub fn new(skip: u32, take: u32) -> Self {
        Self {
            skip,
            take,
            ..Self::default()
        }
    }
}

impl ToQuery for SearchOptions {
    fn append_to(&self, values: &mut QueryValues) -> Result<()> {
        values.add("skip", self.skip.to_string());
        values.add("take", self.take.to_string());
        values.add_all("publicId", &self.public_id);
        values.add_all("contentDefinition", &self.content_definition);
        values.add_all("repositories", &self.repositories);
        if self.legacy_metadata {
            values.add("legacyMetadata", "true");
        }
        values.add_all("tags", &self.tags);
        self.prop_filters.encode_values("propFilters", values)?;
        self.sorting.encode_values("sorting", values)?;
        Ok(())
    }
}

/// One sort key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortingField {
    pub field_name: String,
    pub ascending: bool,
}

impl SortingField {
    pub fn asc(field_name: impl Into<String>) -> Self {
        Self {
            field_name: field_name.into(),
            ascending: true,
        }
    }

    pub fn desc(field_name: impl Into<String>) -> Self {
        Self {
            field_name: field_name.into(),
            ascending: false,
        }
    }
}

/// Ordered sort specification, sent as `+field,-other`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sorting(pub Vec<SortingField>);

impl Sorting {
    /// Wire form of the sort keys. Fields with a blank name are dropped.
    pub fn serialize(&self) -> String {
        self.0
            .iter()
            .filter_map(|field| {
                let name = field.field_name.trim();
                if name.is_empty() {
                    return None;
                }
                let sign = if field.ascending { '+' } else { '-' };
                Some(format!("{sign}{name}"))
            })
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<SortingField>> for Sorting {
    fn from(fields: Vec<SortingField>) -> Self {
        Self(fields)
    }
}

impl EncodeValues for Sorting {
    fn encode_values(&self, key: &str, values: &mut QueryValues) -> Result<()> {
        let serialized = self.serialize();
        if !serialized.is_empty() {
            values.set(key, serialized);
        }
        Ok(())
    }
}

/// Logical operator joining property filter items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Condition {
    And,
    Or,
}

/// Comparison applied by a property filter item. `_IC` variants ignore case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operator {
    Contains,
    ContainsIc,
    Equals,
    EqualsIc,
    In,
    InIc,
    StartsWith,
    StartsWithIc,
}

/// Server-side property filter, sent as compact JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<PropFilterItem>,
}

impl PropFilters {
    pub fn new(condition: Condition) -> Self {
        Self {
            condition: Some(condition),
            items: Vec::new(),
        }
    }

    pub fn with_item(
        mut self,
        field: impl Into<String>,
        operator: Operator,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.items.push(PropFilterItem {
            field: field.into(),
            operator: Some(operator),
            value: value.into(),
        });
        self
    }
}

impl EncodeValues for PropFilters {
    fn encode_values(&self, key: &str, values: &mut QueryValues) -> Result<()> {
        if self.items.is_empty() {
            return Ok(());
        }
        let json = serde_json::to_string(self).map_err(|e| Error::Encode(e.to_string()))?;
        values.set(key, json);
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropFilterItem {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<Operator>,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub value: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{add_options, query_values};

    fn sorting(fields: &[(&str, bool)]) -> Sorting {
        Sorting(
            fields
                .iter()
                .map(|(name, ascending)| SortingField {
                    field_name: name.to_string(),
                    ascending: *ascending,
                })
                .collect(),
        )
    }

    #[test]
    fn blank_sort_field_is_not_serialized() {
        assert_eq!(sorting(&[("", false)]).serialize(), "");
        assert_eq!(sorting(&[("   ", true)]).serialize(), "");
    }

    #[test]
    fn sort_field_name_is_trimmed() {
        assert_eq!(sorting(&[(" publicId", true)]).serialize(), "+publicId");
    }

    #[test]
    fn sort_direction_sets_sign() {
        assert_eq!(sorting(&[("publicId", false)]).serialize(), "-publicId");
        assert_eq!(sorting(&[("publicId", true)]).serialize(), "+publicId");
    }

    #[test]
    fn sort_fields_keep_input_order() {
        let s = sorting(&[("publicId", true), ("onlineDate", false)]);
        assert_eq!(s.serialize(), "+publicId,-onlineDate");
    }

    #[test]
    fn blank_sort_fields_leave_no_stray_separator() {
        let s = sorting(&[("", true), ("publicId", true), (" ", false), ("onlineDate", false)]);
        assert_eq!(s.serialize(), "+publicId,-onlineDate");
    }

    #[test]
    fn all_blank_sorting_is_omitted_from_query() {
        let opts = SearchOptions {
            sorting: sorting(&[("", false)]),
            ..SearchOptions::new(0, 10)
        };
        let values = query_values(&opts).unwrap();
        assert!(!values.contains_key("sorting"));
    }

    #[test]
    fn content_options_always_send_public_id() {
        let values = query_values(&ContentOptions::default()).unwrap();
        assert_eq!(values.get("publicId"), Some(""));
        assert!(!values.contains_key("legacyMetadata"));
    }

    #[test]
    fn content_options_send_legacy_metadata_when_set() {
        let opts = ContentOptions {
            public_id: "home".to_string(),
            legacy_metadata: true,
        };
        let path = add_options("/content", Some(&opts)).unwrap();
        assert_eq!(path, "/content?legacyMetadata=true&publicId=home");
    }

    #[test]
    fn empty_search_sends_only_pagination() {
        let path = add_options("/search", Some(&SearchOptions::new(0, 0))).unwrap();
        assert_eq!(path, "/search?skip=0&take=0");
    }

    #[test]
    fn search_options_repeat_multi_value_filters() {
        let opts = SearchOptions {
            public_id: vec!["a".to_string(), "b".to_string()],
            content_definition: vec!["article".to_string()],
            repositories: vec!["news".to_string()],
            tags: vec!["x".to_string()],
            ..SearchOptions::new(5, 10)
        };
        let values = query_values(&opts).unwrap();
        assert_eq!(values.get_all("publicId"), ["a".to_string(), "b".to_string()]);
        assert_eq!(values.get("contentDefinition"), Some("article"));
        assert_eq!(values.get("repositories"), Some("news"));
        assert_eq!(values.get("tags"), Some("x"));
        assert_eq!(values.get("skip"), Some("5"));
        assert_eq!(values.get("take"), Some("10"));
    }

    #[test]
    fn prop_filters_without_items_are_omitted() {
        let opts = SearchOptions {
            prop_filters: PropFilters::new(Condition::And),
            ..SearchOptions::new(0, 10)
        };
        let values = query_values(&opts).unwrap();
        assert!(!values.contains_key("propFilters"));
    }

    #[test]
    fn prop_filters_encode_as_compact_json() {
        let opts = SearchOptions {
            prop_filters: PropFilters::new(Condition::Or)
                .with_item("title", Operator::ContainsIc, "rust")
                .with_item("rank", Operator::In, serde_json::json!([1, 2])),
            ..SearchOptions::new(0, 10)
        };
        let values = query_values(&opts).unwrap();
        assert_eq!(
            values.get("propFilters"),
            Some(
                r#"{"condition":"OR","items":[{"field":"title","operator":"CONTAINS_IC","value":"rust"},{"field":"rank","operator":"IN","value":[1,2]}]}"#
            )
        );
    }

    #[test]
    fn prop_filter_item_drops_empty_members() {
        let filters = PropFilters {
            condition: None,
            items: vec![PropFilterItem::default()],
        };
        let json = serde_json::to_string(&filters).unwrap();
        assert_eq!(json, r#"{"items":[{}]}"#);
    }

    #[test]
    fn sorting_lands_in_query() {
        let opts = SearchOptions {
            sorting: Sorting(vec![SortingField::asc("publicId"), SortingField::desc("onlineDate")]),
            ..SearchOptions::new(0, 1)
        };
        let path = add_options("/s", Some(&opts)).unwrap();
        assert_eq!(path, "/s?skip=0&sorting=%2BpublicId%2C-onlineDate&take=1");
    }
}
