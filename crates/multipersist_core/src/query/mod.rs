//! Condition documents, their translation, and recordsets.

mod document;
mod filter;
mod order;
mod recordset;
mod translate;

pub use document::{Document, IntoDocument, Node, Operand};
pub use filter::{Clause, ClauseOperand, Cmp, CompiledFilter, FilterExpr};
pub use order::{Direction, OrderSpec, OrderTerm};
pub use recordset::{Entities, Query, Recordset};
pub use translate::translate;
