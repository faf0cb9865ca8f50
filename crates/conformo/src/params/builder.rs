//! Lazy param-space combinators.
//!
//! A param space is a chain of immutable stages shared through `Arc`. Each
//! call to an iterator restarts generation from the root, so a space of any
//! size is produced one record at a time and can be walked again from
//! scratch. Earlier axes vary slowest.
//!
//! ```ignore
//! let space = ParamsBuilder::new()
//!     .combine("format", ["r8unorm", "rgba8unorm"])
//!     .pbool("mipmapped")
//!     .begin_subcases()
//!     .expand("level", |p| Ok(if p.bool("mipmapped")? { 0..4 } else { 0..1 }))
//!     .build()?;
//! ```

use super::value::CaseParams;
use crate::query::validate_name_part;
use crate::result::{CtsError, CtsResult};
use serde_json::Value;
use std::collections::HashSet;
use std::iter;
use std::marker::PhantomData;
use std::sync::Arc;

type ParamIter = Box<dyn Iterator<Item = CtsResult<CaseParams>> + Send>;
type ValueIter = Box<dyn Iterator<Item = Value> + Send>;
type Predicate = Arc<dyn Fn(&CaseParams) -> CtsResult<bool> + Send + Sync>;
type ExpandValues = Arc<dyn Fn(&CaseParams) -> CtsResult<ValueIter> + Send + Sync>;
type ExpandRecords = Arc<dyn Fn(&CaseParams) -> CtsResult<ParamIter> + Send + Sync>;

enum Stage {
    /// Yields the seed record once
    Root,
    Combine {
        parent: Arc<Stage>,
        name: Arc<str>,
        values: Arc<[Value]>,
    },
    CombineWithParams {
        parent: Arc<Stage>,
        records: Arc<[CaseParams]>,
    },
    Filter {
        parent: Arc<Stage>,
        predicate: Predicate,
        keep_when: bool,
    },
    Expand {
        parent: Arc<Stage>,
        name: Arc<str>,
        values: ExpandValues,
    },
    ExpandWithParams {
        parent: Arc<Stage>,
        records: ExpandRecords,
    },
}

impl Stage {
    fn iter(self: &Arc<Self>, seed: &CaseParams) -> ParamIter {
        match &**self {
            Self::Root => Box::new(iter::once(Ok(seed.clone()))),
            Self::Combine {
                parent,
                name,
                values,
            } => {
                let name = Arc::clone(name);
                let values = Arc::clone(values);
                flat_map_ok(parent.iter(seed), move |base| {
                    let name = Arc::clone(&name);
                    let values = Arc::clone(&values);
                    Box::new((0..values.len()).map(move |i| {
                        let mut p = base.clone();
                        p.insert(name.to_string(), values[i].clone());
                        Ok(p)
                    }))
                })
            }
            Self::CombineWithParams { parent, records } => {
                let records = Arc::clone(records);
                flat_map_ok(parent.iter(seed), move |base| {
                    let records = Arc::clone(&records);
                    Box::new((0..records.len()).map(move |i| base.merged(&records[i])))
                })
            }
            Self::Filter {
                parent,
                predicate,
                keep_when,
            } => {
                let predicate = Arc::clone(predicate);
                let keep_when = *keep_when;
                Box::new(parent.iter(seed).filter_map(move |item| match item {
                    Ok(p) => match predicate(&p) {
                        Ok(keep) if keep == keep_when => Some(Ok(p)),
                        Ok(_) => None,
                        Err(e) => Some(Err(e)),
                    },
                    Err(e) => Some(Err(e)),
                }))
            }
            Self::Expand {
                parent,
                name,
                values,
            } => {
                let name = Arc::clone(name);
                let values = Arc::clone(values);
                flat_map_ok(parent.iter(seed), move |base| match values(&base) {
                    Ok(derived) => {
                        let name = Arc::clone(&name);
                        Box::new(derived.map(move |v| {
                            if base.contains_key(&name) {
                                return Err(CtsError::DuplicateParamKey {
                                    key: name.to_string(),
                                });
                            }
                            let mut p = base.clone();
                            p.insert(name.to_string(), v);
                            Ok(p)
                        }))
                    }
                    Err(e) => Box::new(iter::once(Err(e))),
                })
            }
            Self::ExpandWithParams { parent, records } => {
                let records = Arc::clone(records);
                flat_map_ok(parent.iter(seed), move |base| match records(&base) {
                    Ok(derived) => Box::new(derived.map(move |r| r.and_then(|r| base.merged(&r)))),
                    Err(e) => Box::new(iter::once(Err(e))),
                })
            }
        }
    }
}

fn flat_map_ok<F>(parent: ParamIter, f: F) -> ParamIter
where
    F: Fn(CaseParams) -> ParamIter + Send + 'static,
{
    Box::new(parent.flat_map(move |item| match item {
        Ok(p) => f(p),
        Err(e) => Box::new(iter::once(Err(e))) as ParamIter,
    }))
}

/// Marker: axes added are case (public key) axes
#[derive(Debug, Clone, Copy)]
pub struct CasePhase;

/// Marker: axes added after `begin_subcases` are subcase axes
#[derive(Debug, Clone, Copy)]
pub struct SubcasePhase;

/// Fluent builder for a param space
///
/// Configuration errors are stored and reported by [`ParamsBuilder::build`].
pub struct ParamsBuilder<P = CasePhase> {
    cases: Option<Arc<Stage>>,
    current: Arc<Stage>,
    declared: Vec<String>,
    error: Option<CtsError>,
    _phase: PhantomData<P>,
}

impl<P> std::fmt::Debug for ParamsBuilder<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParamsBuilder")
            .field("declared", &self.declared)
            .field("in_subcases", &self.cases.is_some())
            .field("error", &self.error)
            .finish()
    }
}

impl Default for ParamsBuilder<CasePhase> {
    fn default() -> Self {
        Self::new()
    }
}

impl ParamsBuilder<CasePhase> {
    /// Start from the space `[{}]`
    #[must_use]
    pub fn new() -> Self {
        Self {
            cases: None,
            current: Arc::new(Stage::Root),
            declared: Vec::new(),
            error: None,
            _phase: PhantomData,
        }
    }

    /// Axes added from here on are subcase axes sharing one case body
    #[must_use]
    pub fn begin_subcases(self) -> ParamsBuilder<SubcasePhase> {
        ParamsBuilder {
            cases: Some(self.current),
            current: Arc::new(Stage::Root),
            declared: self.declared,
            error: self.error,
            _phase: PhantomData,
        }
    }
}

impl<P> ParamsBuilder<P> {
    /// Axes declared so far, in order
    #[must_use]
    pub fn declared_axes(&self) -> &[String] {
        &self.declared
    }

    /// Cartesian product with `{name: v}` for each value
    ///
    /// An empty value list empties the space.
    #[must_use]
    pub fn combine<I, V>(mut self, name: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.declare(name);
        let values: Arc<[Value]> = values.into_iter().map(Into::<Value>::into).collect();
        self.push(|parent| Stage::Combine {
            parent,
            name: Arc::from(name),
            values,
        })
    }

    /// Cartesian product with `[false, true]`
    #[must_use]
    pub fn pbool(self, name: &str) -> Self {
        self.combine(name, [false, true])
    }

    /// Cartesian product with whole records, for correlated axes
    ///
    /// Each record must be a JSON object.
    #[must_use]
    pub fn combine_with_params<I>(mut self, records: I) -> Self
    where
        I: IntoIterator<Item = Value>,
    {
        let mut parsed = Vec::new();
        let mut keys: Vec<String> = Vec::new();
        for record in records {
            match CaseParams::from_value(record) {
                Ok(p) => {
                    for key in p.keys() {
                        if !keys.iter().any(|k| k == key) {
                            keys.push(key.to_string());
                        }
                    }
                    parsed.push(p);
                }
                Err(e) => self.fail(e),
            }
        }
        for key in &keys {
            self.declare(key);
        }
        let records: Arc<[CaseParams]> = parsed.into();
        self.push(|parent| Stage::CombineWithParams { parent, records })
    }

    /// Keep records for which `predicate` is true
    #[must_use]
    pub fn filter<F>(self, predicate: F) -> Self
    where
        F: Fn(&CaseParams) -> CtsResult<bool> + Send + Sync + 'static,
    {
        self.push(|parent| Stage::Filter {
            parent,
            predicate: Arc::new(predicate),
            keep_when: true,
        })
    }

    /// Drop records for which `predicate` is true
    #[must_use]
    pub fn unless<F>(self, predicate: F) -> Self
    where
        F: Fn(&CaseParams) -> CtsResult<bool> + Send + Sync + 'static,
    {
        self.push(|parent| Stage::Filter {
            parent,
            predicate: Arc::new(predicate),
            keep_when: false,
        })
    }

    /// Flat-map each record into one record per value of `f(record)`
    ///
    /// A record for which `f` yields nothing is dropped.
    #[must_use]
    pub fn expand<F, I, V>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(&CaseParams) -> CtsResult<I> + Send + Sync + 'static,
        I: IntoIterator<Item = V>,
        I::IntoIter: Send + 'static,
        V: Into<Value> + 'static,
    {
        self.declare(name);
        let values: ExpandValues = Arc::new(move |p: &CaseParams| {
            let derived = f(p)?.into_iter().map(Into::<Value>::into);
            Ok(Box::new(derived) as ValueIter)
        });
        self.push(|parent| Stage::Expand {
            parent,
            name: Arc::from(name),
            values,
        })
    }

    /// Flat-map each record into whole derived records
    ///
    /// Each derived value must be a JSON object; its keys must not collide
    /// with existing axes.
    #[must_use]
    pub fn expand_with_params<F, I>(self, f: F) -> Self
    where
        F: Fn(&CaseParams) -> CtsResult<I> + Send + Sync + 'static,
        I: IntoIterator<Item = Value>,
        I::IntoIter: Send + 'static,
    {
        let records: ExpandRecords = Arc::new(move |p: &CaseParams| {
            let derived = f(p)?.into_iter().map(CaseParams::from_value);
            Ok(Box::new(derived) as ParamIter)
        });
        self.push(|parent| Stage::ExpandWithParams { parent, records })
    }

    /// Finish the chain
    pub fn build(self) -> CtsResult<ParamSpace> {
        if let Some(err) = self.error {
            return Err(err);
        }
        Ok(match self.cases {
            Some(cases) => ParamSpace {
                cases,
                subcases: Some(self.current),
            },
            None => ParamSpace {
                cases: self.current,
                subcases: None,
            },
        })
    }

    fn declare(&mut self, name: &str) {
        if let Err(e) = validate_name_part(name) {
            self.fail(e);
        } else if self.declared.iter().any(|d| d == name) {
            self.fail(CtsError::DuplicateParamKey {
                key: name.to_string(),
            });
        } else {
            self.declared.push(name.to_string());
        }
    }

    fn fail(&mut self, err: CtsError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }

    fn push(mut self, make: impl FnOnce(Arc<Stage>) -> Stage) -> Self {
        self.current = Arc::new(make(Arc::clone(&self.current)));
        self
    }
}

/// A built, restartable param space
#[derive(Clone)]
pub struct ParamSpace {
    cases: Arc<Stage>,
    subcases: Option<Arc<Stage>>,
}

impl std::fmt::Debug for ParamSpace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParamSpace")
            .field("has_subcases", &self.subcases.is_some())
            .finish()
    }
}

impl Default for ParamSpace {
    fn default() -> Self {
        Self::unit()
    }
}

impl ParamSpace {
    /// The single empty case
    #[must_use]
    pub fn unit() -> Self {
        Self {
            cases: Arc::new(Stage::Root),
            subcases: None,
        }
    }

    /// Whether axes were declared after `begin_subcases`
    #[must_use]
    pub const fn has_subcases(&self) -> bool {
        self.subcases.is_some()
    }

    /// Iterate cases; cases whose subcase space is empty are dropped
    pub fn cases(&self) -> impl Iterator<Item = CtsResult<CaseSpec>> {
        let subcases = self.subcases.clone();
        self.cases
            .iter(&CaseParams::new())
            .filter_map(move |item| match item {
                Ok(params) => {
                    let spec = CaseSpec {
                        params,
                        subcases: subcases.clone(),
                    };
                    spec.has_any_subcase().then_some(Ok(spec))
                }
                Err(e) => Some(Err(e)),
            })
    }

    /// Iterate every full record (case params merged with subcase params)
    pub fn records(&self) -> impl Iterator<Item = CtsResult<CaseParams>> {
        self.cases().flat_map(|case| match case {
            Ok(case) => case.subcases(),
            Err(e) => Box::new(iter::once(Err(e))) as ParamIter,
        })
    }

    /// Walk the whole space once, surfacing the first configuration error
    /// and rejecting cases whose public params repeat
    pub fn validate(&self, test: &str) -> CtsResult<usize> {
        let mut seen = HashSet::new();
        let mut count = 0;
        for case in self.cases() {
            let case = case?;
            let key = case.key();
            if !seen.insert(key.clone()) {
                return Err(CtsError::DuplicateCase {
                    test: test.to_string(),
                    params: key,
                });
            }
            for subcase in case.subcases() {
                subcase?;
            }
            count += 1;
        }
        Ok(count)
    }
}

/// One case and the lazy space of its subcases
#[derive(Clone)]
pub struct CaseSpec {
    params: CaseParams,
    subcases: Option<Arc<Stage>>,
}

impl std::fmt::Debug for CaseSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaseSpec")
            .field("params", &self.params)
            .field("has_subcases", &self.subcases.is_some())
            .finish()
    }
}

impl CaseSpec {
    /// Case-level params (everything declared before `begin_subcases`)
    #[must_use]
    pub const fn params(&self) -> &CaseParams {
        &self.params
    }

    /// Serialized public params identifying this case
    #[must_use]
    pub fn key(&self) -> String {
        self.params.key_string()
    }

    /// Whether the case was declared with subcase axes
    #[must_use]
    pub const fn has_subcases(&self) -> bool {
        self.subcases.is_some()
    }

    /// Full records of the subcases, seeded from the case params
    ///
    /// Without subcase axes this yields the case params once.
    pub fn subcases(&self) -> ParamIter {
        match &self.subcases {
            Some(stage) => stage.iter(&self.params),
            None => Box::new(iter::once(Ok(self.params.clone()))),
        }
    }

    /// Only the params a subcase adds on top of the case
    #[must_use]
    pub fn subcase_only(&self, full: &CaseParams) -> CaseParams {
        full.iter()
            .filter(|(k, _)| !self.params.contains_key(k))
            .fold(CaseParams::new(), |acc, (k, v)| acc.with(k, v.clone()))
    }

    fn has_any_subcase(&self) -> bool {
        self.subcases().next().is_some()
    }
}
