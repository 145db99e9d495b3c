//! Parameter-safe SQL building for jsonbq.
//!
//! Provides the fragment type the query compiler emits into: SQL text plus
//! an ordered parameter vector, with placeholder renumbering on
//! concatenation so user-supplied values never appear in the text.

mod builder;
mod expr;
pub mod identifier;
mod param;
mod select;

pub use builder::SqlFragment;
pub use expr::{Expr, NullsOrder, OrderDirection, OrderExpr};
pub use identifier::{escape_ident, is_valid_identifier};
pub use param::SqlParam;
pub use select::SelectBuilder;
