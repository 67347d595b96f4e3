//! Wire-level parsing for the list endpoint's query surface.
//!
//! The list endpoint reads paging, sorting, and search controls from a
//! reserved set of parameter names; every other parameter feeds the
//! flat filter compiler. The raw multimap is kept in wire order so the
//! compiled predicate is deterministic.

use thiserror::Error;

use crate::query::DEFAULT_LIMIT;

/// Parameter names that never become filter clauses.
pub const RESERVED_PARAMS: &[&str] = &["limit", "offset", "page", "sortby", "sort_by", "search"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ListParamsError {
    #[error("`{0}` must be an integer")]
    InvalidInteger(&'static str),
}

/// Parsed list-endpoint controls plus the raw parameter multimap.
#[derive(Debug, Clone)]
pub struct ListParams {
    pub limit: i64,
    pub offset: i64,
    pub sorts: Vec<(String, i64)>,
    pub search: Option<String>,
    pub pairs: Vec<(String, String)>,
}

impl ListParams {
    pub fn parse(raw_query: &str) -> Result<Self, ListParamsError> {
        let pairs: Vec<(String, String)> = url::form_urlencoded::parse(raw_query.as_bytes())
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();

        let limit = match first(&pairs, "limit") {
            Some(raw) => raw
                .parse::<i64>()
                .map_err(|_| ListParamsError::InvalidInteger("limit"))?,
            None => DEFAULT_LIMIT,
        };

        // An explicit offset wins; otherwise a 1-based page is converted.
        let offset = match first(&pairs, "offset") {
            Some(raw) => raw
                .parse::<i64>()
                .map_err(|_| ListParamsError::InvalidInteger("offset"))?,
            None => match first(&pairs, "page") {
                Some(raw) => {
                    let page = raw
                        .parse::<i64>()
                        .map_err(|_| ListParamsError::InvalidInteger("page"))?;
                    if page > 0 { (page - 1) * limit } else { 0 }
                }
                None => 0,
            },
        };

        let mut sorts = Vec::new();
        for (key, value) in &pairs {
            if key != "sortby" && key != "sort_by" {
                continue;
            }
            for field in value.split(',') {
                let (column, direction) = match field.strip_prefix('-') {
                    Some(column) => (column, -1),
                    None => (field.as_ref(), 1),
                };
                if !column.is_empty() {
                    sorts.push((column.to_string(), direction));
                }
            }
        }

        let search = first(&pairs, "search")
            .filter(|value| !value.is_empty())
            .map(str::to_string);

        Ok(Self {
            limit,
            offset,
            sorts,
            search,
            pairs,
        })
    }
}

fn first<'a>(pairs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    pairs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}
