//! Flat-mode filter compilation for list endpoints.
//!
//! Every query parameter that is not part of the paging/sorting surface
//! becomes a predicate clause: candidates for one key are OR'd, keys are
//! AND'd. `*`-wildcards become case-insensitive patterns; bare values
//! expand into every typed equality reading that parses (see
//! `coerce::expand_candidates`).

use serde_json::{Map, Value, json};

use super::coerce::expand_candidates;

/// Compile a query-parameter multimap into AND'd predicate clauses.
///
/// `params` preserves wire order; repeated keys contribute to the same
/// clause. Keys listed in `ignored` are skipped entirely.
pub fn compile_flat(params: &[(String, String)], ignored: &[&str]) -> Vec<Value> {
    let mut grouped: Vec<(String, Vec<&str>)> = Vec::new();
    for (key, value) in params {
        if ignored.contains(&key.as_str()) {
            continue;
        }
        match grouped.iter_mut().find(|(k, _)| k == key) {
            Some((_, values)) => values.push(value.as_str()),
            None => grouped.push((key.clone(), vec![value.as_str()])),
        }
    }

    let mut clauses = Vec::new();
    for (key, values) in grouped {
        // `.id` is rewritten as a substring here, unlike the recursive
        // compiler's per-segment rewrite.
        let key = key.replace(".id", "._id");

        let mut alternatives = Vec::new();
        for value in values {
            let mut candidates: Vec<&str> = value.split(',').collect();
            if candidates.len() > 1 {
                // Keep the raw unsplit value too, so a literal comma
                // still matches.
                candidates.push(value);
            }

            for candidate in candidates {
                let candidate = candidate.trim();
                if candidate.is_empty() {
                    continue;
                }
                alternatives.extend(candidate_clauses(&key, candidate));
            }
        }

        if !alternatives.is_empty() {
            clauses.push(json!({"$or": alternatives}));
        }
    }

    clauses
}

fn candidate_clauses(key: &str, candidate: &str) -> Vec<Value> {
    if candidate.starts_with('*') && candidate.ends_with('*') {
        let pattern = candidate.replace('*', "");
        return vec![regex_clause(key, &pattern)];
    }

    if candidate.contains('*') {
        let pattern = candidate.replace('*', ".");
        return vec![regex_clause(key, &pattern)];
    }

    expand_candidates(candidate)
        .into_iter()
        .map(|value| {
            let mut clause = Map::new();
            clause.insert(key.to_string(), value);
            Value::Object(clause)
        })
        .collect()
}

/// Case-insensitive contains clauses for the free-text search surface:
/// one `$regex` alternative per searchable field, OR'd by the caller.
pub fn search_clauses(term: &str, fields: &[&str]) -> Vec<Value> {
    fields
        .iter()
        .map(|field| regex_clause(field, term))
        .collect()
}

fn regex_clause(key: &str, pattern: &str) -> Value {
    let mut clause = Map::new();
    clause.insert(
        key.to_string(),
        json!({"$regex": pattern, "$options": "i"}),
    );
    Value::Object(clause)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn ignored_keys_are_skipped() {
        let clauses = compile_flat(
            &params(&[("limit", "10"), ("country", "Thailand")]),
            &["limit", "offset"],
        );
        assert_eq!(
            clauses,
            vec![json!({"$or": [{"country": "Thailand"}]})]
        );
    }

    #[test]
    fn keys_are_anded_candidates_are_ored() {
        let clauses = compile_flat(
            &params(&[("country", "Thailand"), ("year", "2020")]),
            &[],
        );
        assert_eq!(clauses.len(), 2);
        // "2020" parses as a float too, so the year clause carries both
        // readings.
        assert_eq!(
            clauses[1],
            json!({"$or": [{"year": "2020"}, {"year": 2020.0}]})
        );
    }

    #[test]
    fn double_wildcard_is_case_insensitive_contains() {
        let clauses = compile_flat(&params(&[("productName", "*rice*")]), &[]);
        assert_eq!(
            clauses,
            vec![json!({"$or": [
                {"productName": {"$regex": "rice", "$options": "i"}},
            ]})]
        );
    }

    #[test]
    fn embedded_wildcard_becomes_any_char() {
        let clauses = compile_flat(&params(&[("productName", "ri*e")]), &[]);
        assert_eq!(
            clauses,
            vec![json!({"$or": [
                {"productName": {"$regex": "ri.e", "$options": "i"}},
            ]})]
        );
    }

    #[test]
    fn comma_split_keeps_the_raw_value_as_a_candidate() {
        let clauses = compile_flat(&params(&[("category", "fruit,grain")]), &[]);
        let alternatives = clauses[0]["$or"].as_array().expect("or array");
        assert!(alternatives.contains(&json!({"category": "fruit"})));
        assert!(alternatives.contains(&json!({"category": "grain"})));
        assert!(alternatives.contains(&json!({"category": "fruit,grain"})));
    }

    #[test]
    fn dotted_id_key_is_rewritten() {
        let clauses = compile_flat(
            &params(&[("product.id", "64ab00112233445566778899")]),
            &[],
        );
        let alternatives = clauses[0]["$or"].as_array().expect("or array");
        assert_eq!(
            alternatives[0],
            json!({"product._id": "64ab00112233445566778899"})
        );
    }

    #[test]
    fn repeated_keys_merge_into_one_clause() {
        let clauses = compile_flat(
            &params(&[("country", "Thailand"), ("country", "Laos")]),
            &[],
        );
        assert_eq!(clauses.len(), 1);
        let alternatives = clauses[0]["$or"].as_array().expect("or array");
        assert!(alternatives.contains(&json!({"country": "Thailand"})));
        assert!(alternatives.contains(&json!({"country": "Laos"})));
    }

    #[test]
    fn blank_values_do_not_produce_clauses() {
        let clauses = compile_flat(&params(&[("country", " ")]), &[]);
        assert!(clauses.is_empty());

        let clauses = compile_flat(&params(&[("country", "")]), &[]);
        assert!(clauses.is_empty());
    }

    #[test]
    fn comma_only_value_keeps_the_raw_candidate() {
        // " , " splits into blanks, but the raw unsplit value survives
        // trimming; the literal-comma match is preserved.
        let clauses = compile_flat(&params(&[("country", " , ")]), &[]);
        assert_eq!(clauses, vec![json!({"$or": [{"country": ","}]})]);
    }
}
