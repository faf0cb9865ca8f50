//! Param spaces: declarative, lazily expanded case parameters.

mod builder;
mod value;

pub use builder::{CasePhase, CaseSpec, ParamSpace, ParamsBuilder, SubcasePhase};
pub use value::{CaseParams, PRIVATE_PREFIX};
