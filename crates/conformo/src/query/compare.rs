//! Query ordering and containment.

use super::TestQuery;
use crate::params::CaseParams;
use std::cmp::Ordering;

/// Containment relation between two queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryRelation {
    /// Neither contains the other
    Unordered,
    /// `self` strictly contains `other`
    StrictSuperset,
    /// Both select exactly the same set
    Equal,
    /// `other` strictly contains `self`
    StrictSubset,
}

impl QueryRelation {
    /// Relation seen from the other side
    #[must_use]
    pub const fn reversed(self) -> Self {
        match self {
            Self::StrictSuperset => Self::StrictSubset,
            Self::StrictSubset => Self::StrictSuperset,
            other => other,
        }
    }
}

impl TestQuery {
    /// Containment relation of `self` to `other`
    ///
    /// At each level a query is "big" if it selects everything below that
    /// level (e.g. `s:a,*` is big at test level, `s:a:*` is not).
    #[must_use]
    pub fn relation(&self, other: &Self) -> QueryRelation {
        if self.suite() != other.suite() {
            return QueryRelation::Unordered;
        }

        let file = cmp_level(
            compare_paths(self.file_parts(), other.file_parts()),
            self.test_parts().is_none(),
            other.test_parts().is_none(),
        );
        if let Some(rel) = file {
            return rel;
        }

        let (Some(a_test), Some(b_test)) = (self.test_parts(), other.test_parts()) else {
            return QueryRelation::Unordered;
        };
        let test = cmp_level(
            compare_paths(a_test, b_test),
            self.params().is_none(),
            other.params().is_none(),
        );
        if let Some(rel) = test {
            return rel;
        }

        let (Some(a_params), Some(b_params)) = (self.params(), other.params()) else {
            return QueryRelation::Unordered;
        };
        cmp_level(
            compare_params(a_params, b_params),
            self.ends_with_wildcard(),
            other.ends_with_wildcard(),
        )
        .unwrap_or(QueryRelation::Equal)
    }

    /// Whether every case selected by `other` is selected by `self`
    #[must_use]
    pub fn contains(&self, other: &Self) -> bool {
        matches!(
            self.relation(other),
            QueryRelation::StrictSuperset | QueryRelation::Equal
        )
    }

    /// Whether every case selected by `self` is selected by `other`
    #[must_use]
    pub fn is_covered_by(&self, other: &Self) -> bool {
        other.contains(self)
    }
}

fn cmp_level(ordering: QueryRelation, a_big: bool, b_big: bool) -> Option<QueryRelation> {
    if !a_big && !b_big {
        return (ordering != QueryRelation::Equal).then_some(QueryRelation::Unordered);
    }
    match ordering {
        QueryRelation::Unordered => Some(QueryRelation::Unordered),
        QueryRelation::StrictSuperset => Some(if a_big || !b_big {
            QueryRelation::StrictSuperset
        } else {
            QueryRelation::Unordered
        }),
        QueryRelation::StrictSubset => Some(if !a_big || b_big {
            QueryRelation::StrictSubset
        } else {
            QueryRelation::Unordered
        }),
        QueryRelation::Equal => Some(match (a_big, b_big) {
            (true, true) => QueryRelation::Equal,
            (true, false) => QueryRelation::StrictSuperset,
            _ => QueryRelation::StrictSubset,
        }),
    }
}

fn prefix_relation(a_len: usize, b_len: usize) -> QueryRelation {
    match a_len.cmp(&b_len) {
        Ordering::Equal => QueryRelation::Equal,
        Ordering::Less => QueryRelation::StrictSuperset,
        Ordering::Greater => QueryRelation::StrictSubset,
    }
}

fn compare_paths(a: &[String], b: &[String]) -> QueryRelation {
    if a.iter().zip(b).any(|(x, y)| x != y) {
        return QueryRelation::Unordered;
    }
    prefix_relation(a.len(), b.len())
}

fn compare_params(a: &CaseParams, b: &CaseParams) -> QueryRelation {
    if a.iter().zip(b.iter()).any(|(x, y)| x != y) {
        return QueryRelation::Unordered;
    }
    prefix_relation(a.len(), b.len())
}

/// Serialized param entries, compared element-wise
fn param_entries(params: Option<&CaseParams>) -> Option<Vec<(&str, String)>> {
    params.map(|p| p.iter().map(|(k, v)| (k, v.to_string())).collect())
}

impl Ord for TestQuery {
    /// Total order consistent with tree pre-order: suite, file parts, test
    /// parts, then params, each element-wise. A prefix sorts before its
    /// descendants and at an equal path the wildcard query sorts first.
    fn cmp(&self, other: &Self) -> Ordering {
        self.suite()
            .cmp(other.suite())
            .then_with(|| self.file_parts().cmp(other.file_parts()))
            .then_with(|| self.test_parts().cmp(&other.test_parts()))
            .then_with(|| param_entries(self.params()).cmp(&param_entries(other.params())))
            .then_with(|| other.ends_with_wildcard().cmp(&self.ends_with_wildcard()))
    }
}

impl PartialOrd for TestQuery {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Compare two queries in tree order
#[must_use]
pub fn compare_queries(a: &TestQuery, b: &TestQuery) -> Ordering {
    a.cmp(b)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::query::parse_query;

    fn q(s: &str) -> TestQuery {
        parse_query(s).unwrap()
    }

    fn rel(a: &str, b: &str) -> QueryRelation {
        q(a).relation(&q(b))
    }

    mod relation_tests {
        use super::*;

        #[test]
        fn test_different_suites_unordered() {
            assert_eq!(rel("a:*", "b:*"), QueryRelation::Unordered);
        }

        #[test]
        fn test_file_level() {
            assert_eq!(rel("s:*", "s:*"), QueryRelation::Equal);
            assert_eq!(rel("s:*", "s:a,*"), QueryRelation::StrictSuperset);
            assert_eq!(rel("s:a,*", "s:*"), QueryRelation::StrictSubset);
            assert_eq!(rel("s:a,*", "s:b,*"), QueryRelation::Unordered);
            assert_eq!(rel("s:a,*", "s:a:*"), QueryRelation::StrictSuperset);
            assert_eq!(rel("s:a,*", "s:a,b:*"), QueryRelation::StrictSuperset);
            assert_eq!(rel("s:a,b,*", "s:a:*"), QueryRelation::Unordered);
        }

        #[test]
        fn test_test_level() {
            assert_eq!(rel("s:a:*", "s:a:*"), QueryRelation::Equal);
            assert_eq!(rel("s:a:*", "s:a:t,*"), QueryRelation::StrictSuperset);
            assert_eq!(rel("s:a:t,*", "s:a:t:*"), QueryRelation::StrictSuperset);
            assert_eq!(rel("s:a:t:*", "s:a:t,*"), QueryRelation::StrictSubset);
            assert_eq!(rel("s:a:t:*", "s:a:u:*"), QueryRelation::Unordered);
            assert_eq!(rel("s:a:t:*", "s:a:t,u:*"), QueryRelation::Unordered);
            assert_eq!(rel("s:a:*", "s:b:*"), QueryRelation::Unordered);
        }

        #[test]
        fn test_case_level() {
            assert_eq!(rel("s:a:t:*", r#"s:a:t:{"x":1}"#), QueryRelation::StrictSuperset);
            assert_eq!(
                rel(r#"s:a:t:{"x":1},*"#, r#"s:a:t:{"x":1,"y":2}"#),
                QueryRelation::StrictSuperset
            );
            assert_eq!(
                rel(r#"s:a:t:{"x":1},*"#, r#"s:a:t:{"x":1}"#),
                QueryRelation::StrictSuperset
            );
            assert_eq!(
                rel(r#"s:a:t:{"x":1}"#, r#"s:a:t:{"x":1,"y":2}"#),
                QueryRelation::Unordered
            );
            assert_eq!(rel(r#"s:a:t:{"x":1}"#, r#"s:a:t:{"x":1}"#), QueryRelation::Equal);
            assert_eq!(rel(r#"s:a:t:{"x":1}"#, r#"s:a:t:{"x":2}"#), QueryRelation::Unordered);
            assert_eq!(
                rel(r#"s:a:t:{"x":1,"y":2}"#, r#"s:a:t:{"x":1},*"#),
                QueryRelation::StrictSubset
            );
        }

        #[test]
        fn test_contains_and_covered() {
            let file = q("s:a:*");
            let case = q(r#"s:a:t:{"x":1}"#);
            assert!(file.contains(&case));
            assert!(case.is_covered_by(&file));
            assert!(!case.contains(&file));
            assert!(file.contains(&file));
        }

        #[test]
        fn test_reversed() {
            assert_eq!(
                rel("s:*", "s:a,*").reversed(),
                rel("s:a,*", "s:*")
            );
        }
    }

    mod order_tests {
        use super::*;

        #[test]
        fn test_prefix_sorts_first() {
            let mut list = vec![
                q(r#"s:a:t:{"x":1}"#),
                q("s:a:t:*"),
                q("s:a,*"),
                q("s:*"),
                q("s:a:*"),
                q("s:a:t,*"),
            ];
            list.sort();
            let text: Vec<_> = list.iter().map(ToString::to_string).collect();
            assert_eq!(
                text,
                vec!["s:*", "s:a,*", "s:a:*", "s:a:t,*", "s:a:t:*", r#"s:a:t:{"x":1}"#]
            );
        }

        #[test]
        fn test_wildcard_first_at_equal_path() {
            let wild = q(r#"s:a:t:{"x":1},*"#);
            let single = q(r#"s:a:t:{"x":1}"#);
            assert_eq!(compare_queries(&wild, &single), Ordering::Less);
        }

        #[test]
        fn test_element_wise() {
            assert!(q("s:a,b:*") < q("s:a,c:*"));
            assert!(q("s:a:t1:*") < q("s:a:t2:*"));
            assert!(q("a:*") < q("b:*"));
            assert!(q(r#"s:a:t:{"x":1}"#) < q(r#"s:a:t:{"x":2}"#));
        }

        #[test]
        fn test_equal_queries() {
            assert_eq!(compare_queries(&q("s:a:*"), &q("s:a:*")), Ordering::Equal);
        }
    }
}
