//! Explore request types: column/aggregate/sort specifications.
//!
//! Field spellings match the wire format the endpoints accept
//! (`aggregate`, `op`, `args`); serialization is canonical so that two
//! structurally identical requests produce identical bytes for the
//! content-addressed cache key.

use serde::{Deserialize, Serialize};

use super::filter::FilterSpec;

/// A grouping column. `alias` defaults to `name` when blank.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ColumnSpec {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

impl ColumnSpec {
    pub fn effective_alias(&self) -> &str {
        match self.alias.as_deref() {
            Some(alias) if !alias.is_empty() => alias,
            _ => &self.name,
        }
    }
}

/// An aggregate over a source column. `alias` defaults to `column`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AggregateSpec {
    #[serde(default)]
    pub column: String,
    #[serde(default, rename = "aggregate")]
    pub function: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

impl AggregateSpec {
    pub fn effective_alias(&self) -> &str {
        match self.alias.as_deref() {
            Some(alias) if !alias.is_empty() => alias,
            _ => &self.column,
        }
    }
}

/// A sort key. Direction is the literal token `desc` (case-insensitive)
/// for descending; anything else sorts ascending.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SortSpec {
    #[serde(default)]
    pub column: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<String>,
}

impl SortSpec {
    pub fn is_descending(&self) -> bool {
        self.direction
            .as_deref()
            .is_some_and(|d| d.eq_ignore_ascii_case("desc"))
    }
}

/// The explore endpoint request body.
///
/// `offset` is only honored when `limit` was explicitly supplied; see
/// `query::pipeline`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExploreRequest {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub columns: Vec<ColumnSpec>,
    #[serde(
        default,
        rename = "aggregate",
        alias = "aggregates",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub aggregates: Vec<AggregateSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<FilterSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sorts: Vec<SortSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alias_defaults_to_name() {
        let col = ColumnSpec {
            name: "country".to_string(),
            alias: None,
        };
        assert_eq!(col.effective_alias(), "country");

        let col = ColumnSpec {
            name: "country".to_string(),
            alias: Some(String::new()),
        };
        assert_eq!(col.effective_alias(), "country");

        let col = ColumnSpec {
            name: "country".to_string(),
            alias: Some("land".to_string()),
        };
        assert_eq!(col.effective_alias(), "land");
    }

    #[test]
    fn sort_direction_token() {
        let sort = SortSpec {
            column: "year".to_string(),
            direction: Some("DESC".to_string()),
        };
        assert!(sort.is_descending());

        let sort = SortSpec {
            column: "year".to_string(),
            direction: Some("ascending".to_string()),
        };
        assert!(!sort.is_descending());

        assert!(!SortSpec::default().is_descending());
    }

    #[test]
    fn canonical_serialization_is_stable_across_key_order() {
        let a: ExploreRequest = serde_json::from_str(
            r#"{"columns":[{"name":"country"}],"limit":5,"aggregate":[{"column":"id","aggregate":"count","alias":"total"}]}"#,
        )
        .expect("request a");
        let b: ExploreRequest = serde_json::from_str(
            r#"{"aggregate":[{"alias":"total","aggregate":"count","column":"id"}],"columns":[{"name":"country"}],"limit":5}"#,
        )
        .expect("request b");

        let a = serde_json::to_string(&a).expect("serialize a");
        let b = serde_json::to_string(&b).expect("serialize b");
        assert_eq!(a, b);
    }

    #[test]
    fn aggregates_alias_accepted_on_input() {
        let req: ExploreRequest =
            serde_json::from_str(r#"{"aggregates":[{"column":"valueUSD","aggregate":"sum"}]}"#)
                .expect("request");
        assert_eq!(req.aggregates.len(), 1);
        assert_eq!(req.aggregates[0].function, "sum");
    }
}
