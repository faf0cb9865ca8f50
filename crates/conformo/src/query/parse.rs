//! Query string parsing.

use super::{TestQuery, LEVEL_SEPARATOR, PATH_SEPARATOR, WILDCARD};
use crate::params::CaseParams;
use crate::result::{CtsError, CtsResult};
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

/// Pattern every suite, file, test and param name part must match
pub const NAME_PATTERN: &str = "^[a-zA-Z0-9_]+$";

fn name_regex() -> &'static Regex {
    static NAME_RE: OnceLock<Regex> = OnceLock::new();
    NAME_RE.get_or_init(|| Regex::new(NAME_PATTERN).expect("static name pattern must compile"))
}

/// Check one name part against [`NAME_PATTERN`]
pub fn validate_name_part(name: &str) -> CtsResult<()> {
    if name_regex().is_match(name) {
        Ok(())
    } else {
        Err(CtsError::InvalidName {
            name: name.to_string(),
            pattern: NAME_PATTERN,
        })
    }
}

/// Parse a query string
///
/// A bare suite name is read as `suite:*`; an empty params segment is `{}`.
pub fn parse_query(s: &str) -> CtsResult<TestQuery> {
    parse_impl(s).map_err(|message| CtsError::query_parse(s, message))
}

fn parse_impl(s: &str) -> Result<TestQuery, String> {
    let big: Vec<&str> = s.splitn(4, LEVEL_SEPARATOR).collect();
    let suite = big[0];
    check_name(suite, "suite")?;

    if big.len() == 1 {
        return Ok(TestQuery::multi_file(suite, Vec::new()));
    }

    let (file, file_wildcard) = split_path(big[1])?;
    if big.len() == 2 {
        if !file_wildcard {
            return Err(format!(
                "File-level query without wildcard {WILDCARD}; append ,{WILDCARD} for a \
                 file-level query or :{WILDCARD} for a test-level query"
            ));
        }
        return Ok(TestQuery::multi_file(suite, file));
    }
    if file_wildcard {
        return Err(format!("Wildcard {WILDCARD} must be at the end of the query string"));
    }
    if file.is_empty() {
        return Err("File part of test-level query was empty (::)".to_string());
    }

    let (test, test_wildcard) = split_path(big[2])?;
    if big.len() == 3 {
        if !test_wildcard {
            return Err(format!(
                "Test-level query without wildcard {WILDCARD}; append ,{WILDCARD} for a \
                 test-level query or :{WILDCARD} for a case-level query"
            ));
        }
        return Ok(TestQuery::multi_test(suite, file, test));
    }
    if test_wildcard {
        return Err(format!("Wildcard {WILDCARD} must be at the end of the query string"));
    }
    if test.is_empty() {
        return Err("Test part of case-level query was empty (::)".to_string());
    }

    let (params, params_wildcard) = parse_params(big[3])?;
    Ok(if params_wildcard {
        TestQuery::MultiCase {
            suite: suite.to_string(),
            file,
            test,
            params,
        }
    } else {
        TestQuery::SingleCase {
            suite: suite.to_string(),
            file,
            test,
            params,
        }
    })
}

fn check_name(name: &str, what: &str) -> Result<(), String> {
    if name_regex().is_match(name) {
        Ok(())
    } else if name.is_empty() {
        Err(format!("{what} name must not be empty (is there a trailing comma?)"))
    } else {
        Err(format!("{what} name '{name}' must match {NAME_PATTERN}"))
    }
}

fn split_path(segment: &str) -> Result<(Vec<String>, bool), String> {
    if segment.is_empty() {
        return Ok((Vec::new(), false));
    }
    let mut parts: Vec<&str> = segment.split(PATH_SEPARATOR).collect();
    let wildcard = parts.last() == Some(&WILDCARD);
    if wildcard {
        parts.pop();
    }
    for part in &parts {
        if part.contains(WILDCARD) {
            return Err(format!(
                "Wildcard {WILDCARD} must be the complete last part of a path \
                 (e.g. suite:a,b,{WILDCARD} or suite:a,b,c:{WILDCARD})"
            ));
        }
        check_name(part, "path part")?;
    }
    Ok((parts.into_iter().map(str::to_string).collect(), wildcard))
}

fn parse_params(segment: &str) -> Result<(CaseParams, bool), String> {
    let (body, wildcard) = if segment == WILDCARD {
        ("", true)
    } else if let Some(body) = segment.strip_suffix(",*") {
        if body.is_empty() {
            return Err("Params before wildcard must not be blank".to_string());
        }
        (body, true)
    } else {
        (segment, false)
    };
    if body.is_empty() {
        return Ok((CaseParams::new(), wildcard));
    }

    let value: Value =
        serde_json::from_str(body).map_err(|e| format!("Params must be a JSON object: {e}"))?;
    let params =
        CaseParams::from_value(value).map_err(|_| "Params must be a JSON object".to_string())?;
    for key in params.keys() {
        check_name(key, "param")?;
        if !CaseParams::is_public_key(key) {
            return Err(format!("Param '{key}' in a query must not be private (start with _)"));
        }
    }
    Ok((params, wildcard))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::query::Level;
    use proptest::prelude::*;

    mod valid_tests {
        use super::*;

        #[test]
        fn test_levels() {
            let cases = [
                ("s:*", Level::MultiFile),
                ("s:a,b,*", Level::MultiFile),
                ("s:a,b:*", Level::MultiTest),
                ("s:a,b:t1,*", Level::MultiTest),
                ("s:a,b:t1,t2:*", Level::MultiCase),
                (r#"s:a,b:t:{"n":1},*"#, Level::MultiCase),
                (r#"s:a,b:t:{"n":1,"s":"a"}"#, Level::Single),
                ("s:a:t:{}", Level::Single),
            ];
            for (text, level) in cases {
                let q = parse_query(text).unwrap();
                assert_eq!(q.level(), level, "{text}");
                assert_eq!(q.to_string(), text);
            }
        }

        #[test]
        fn test_bare_suite() {
            let q = parse_query("webgpu").unwrap();
            assert_eq!(q.to_string(), "webgpu:*");
        }

        #[test]
        fn test_empty_params_is_single() {
            let q = parse_query("s:a:t:").unwrap();
            assert_eq!(q.level(), Level::Single);
            assert_eq!(q.to_string(), "s:a:t:{}");
        }

        #[test]
        fn test_params_may_contain_separators() {
            let q = parse_query(r#"s:a:t:{"s":"x:y,*"}"#).unwrap();
            assert_eq!(q.params().unwrap().str("s").unwrap(), "x:y,*");
            assert_eq!(q.level(), Level::Single);
        }

        #[test]
        fn test_nested_param_values() {
            let q = parse_query(r#"s:a:t:{"size":[4,4,1],"fmt":{"a":null}}"#).unwrap();
            assert_eq!(parse_query(&q.to_string()).unwrap(), q);
        }
    }

    mod invalid_tests {
        use super::*;

        fn message(text: &str) -> String {
            match parse_query(text).unwrap_err() {
                CtsError::QueryParse { query, message } => {
                    assert_eq!(query, text);
                    message
                }
                other => panic!("unexpected error {other}"),
            }
        }

        #[test]
        fn test_file_level_without_wildcard() {
            assert!(message("s:a,b").contains("without wildcard"));
        }

        #[test]
        fn test_test_level_without_wildcard() {
            assert!(message("s:a:t").contains("without wildcard"));
        }

        #[test]
        fn test_misplaced_wildcard() {
            assert!(message("s:a,*:t:*").contains("end of the query"));
            assert!(message("s:a,*,b,*").contains("complete last part"));
            assert!(message("s:a:t,*:*").contains("end of the query"));
        }

        #[test]
        fn test_empty_parts() {
            assert!(message("s::*").contains("empty"));
            assert!(message("s:a::*").contains("empty"));
            assert!(message("s:a,,b,*").contains("must not be empty"));
            assert!(message(":a,*").contains("suite"));
        }

        #[test]
        fn test_bad_params() {
            assert!(message(r#"s:a:t:{"n":1"#).contains("JSON"));
            assert!(message("s:a:t:[1]").contains("JSON object"));
            assert!(message(r#"s:a:t:{"_p":1}"#).contains("private"));
            assert!(message(r#"s:a:t:{"bad key":1}"#).contains("must match"));
            assert!(message("s:a:t:,*").contains("blank"));
        }

        #[test]
        fn test_invalid_names() {
            assert!(message("s:a b,*").contains("must match"));
            assert!(message("s:a:t-1,*").contains("must match"));
        }

        #[test]
        fn test_validate_name_part() {
            assert!(validate_name_part("abc_123").is_ok());
            assert!(matches!(
                validate_name_part("a b"),
                Err(CtsError::InvalidName { .. })
            ));
            assert!(validate_name_part("").is_err());
        }
    }

    mod round_trip_tests {
        use super::*;

        fn name() -> impl Strategy<Value = String> {
            "[a-z][a-z0-9_]{0,6}"
        }

        fn value() -> impl Strategy<Value = Value> {
            prop_oneof![
                any::<i32>().prop_map(Value::from),
                any::<bool>().prop_map(Value::from),
                "[a-z:,*{} ]{0,5}".prop_map(Value::from),
            ]
        }

        fn query() -> impl Strategy<Value = TestQuery> {
            let suite = name();
            let file = prop::collection::vec(name(), 0..3);
            let test = prop::collection::vec(name(), 0..3);
            let params = prop::collection::vec((name(), value()), 0..3);
            (suite, file, test, params, 0..4u8).prop_map(|(suite, file, test, params, level)| {
                let params = params
                    .into_iter()
                    .fold(CaseParams::new(), |acc, (k, v)| acc.with(k, v));
                let file_full = if file.is_empty() { vec!["f".to_string()] } else { file.clone() };
                let test_full = if test.is_empty() { vec!["t".to_string()] } else { test.clone() };
                match level {
                    0 => TestQuery::multi_file(suite, file),
                    1 => TestQuery::multi_test(suite, file_full, test),
                    2 => TestQuery::multi_case(suite, file_full, test_full, params),
                    _ => TestQuery::single_case(suite, file_full, test_full, params),
                }
            })
        }

        proptest! {
            #[test]
            fn prop_parse_inverts_display(q in query()) {
                let text = q.to_string();
                let parsed = parse_query(&text).unwrap();
                prop_assert_eq!(&parsed, &q);
                prop_assert_eq!(parsed.to_string(), text);
            }
        }
    }
}
