//! # Path Module
//!
//! Path template compilation and matching.
//!
//! ## Overview
//!
//! Resource classes, resource methods and sub-resource locators declare URI templates such as
//! `/widgets/{id}` or `/files/{name: .+}`. At registration each template is compiled into a
//! [`PathExpression`]: an anchored regex plus the metadata used to rank competing matches
//! (literal characters, capturing groups, explicit-regex groups).
//!
//! During dispatch the request path is normalized into a [`RemainingPath`] and consumed
//! left to right, one template at a time:
//!
//! ```rust
//! use restdispatch::path::{PathExpression, RemainingPath};
//!
//! let expr = PathExpression::compile("/widgets/{id}").unwrap();
//! let result = expr.match_path(&RemainingPath::new("/widgets/42/parts")).unwrap();
//! assert_eq!(result.matched, "widgets/42");
//! assert_eq!(result.variables[0].1, "42");
//! assert_eq!(result.remainder.as_str(), "parts/");
//! ```

mod rank;
mod remaining;
mod template;

pub use rank::{compare_rank, select_best, Ranked};
pub use remaining::{matrix_params, RemainingPath};
pub use template::{
    MatchResult, ParamVec, PathExpression, DEFAULT_VARIABLE_REGEX, MAX_INLINE_PARAMS,
};
