// Telemetry is a submodule of query
pub mod telemetry;

// Method-name compilation, from tokens to a bound specification
mod assemble;
pub mod cache;
mod keyword;
mod params;
mod path;
mod predicate;
mod signature;
mod template;
mod tokenize;

// Store predicate model, evaluation and rendering
mod eval;
mod parse;
mod render;
mod types;

pub use assemble::{CompiledQuery, QuerySpecification};
pub use cache::QueryCache;
pub use eval::{compare_docs, eval_filter, lookup, points_at, project_fields};
pub use keyword::{Operator, ValueShape};
pub use params::Param;
pub use parse::{parse_filter_document, parse_filter_json};
pub use path::{LeafKind, PropertyPath};
pub use predicate::{Criterion, NearQuery, Predicate, like_to_regex};
pub use signature::{MethodSignature, ParamKind, ResultShape};
pub use template::QueryTemplate;
pub use tokenize::{Clause, OrderClause, PartTree, QueryKind, normalize_method_name};
pub use types::{CmpOp, Filter, FindOptions, Order, PageRequest, Sort, SortSpec};

pub(crate) use assemble::resolve_sort;
pub(crate) use types::MAX_PATH_DEPTH;
