//! Query compilation and execution.
//!
//! Two filter compilation modes feed one pipeline shape:
//!
//! - **Recursive mode** (`compiler`): the explore endpoints' boolean
//!   filter tree, parsed once into a typed AST and lowered to a
//!   predicate document.
//! - **Flat mode** (`flat`): list endpoints' query parameters, expanded
//!   into AND-of-OR equality/pattern clauses.
//!
//! `pipeline` assembles the match → group → project → sort → skip →
//! limit stage list, and `executor` runs compiled plans against the
//! document store under a wall-clock deadline.

pub mod coerce;
pub mod compiler;
pub mod error;
pub mod executor;
pub mod flat;
pub mod pipeline;

pub use compiler::{FilterNode, compile_filter, rewrite_id_segments};
pub use error::FilterError;
pub use executor::AggregationExecutor;
pub use flat::compile_flat;
pub use pipeline::{CompiledPipeline, DEFAULT_LIMIT, build_pipeline};
