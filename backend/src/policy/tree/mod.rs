// Policy DSL decision trees (§4.4).
//
// A decision tree is a JSON document (`types.rs`) evaluated against a
// per-payment, per-agent context (`context.rs`) by a pure interpreter
// (`interpreter.rs`), after being checked for structural safety
// (`validation.rs`). `executor.rs` wraps a validated tree as a
// `CashManagerPolicy`.

pub mod context;
pub mod executor;
pub mod interpreter;
pub mod types;
pub mod validation;

pub use context::{ContextError, EvalContext};
pub use executor::{TreePolicy, TreePolicyError};
pub use interpreter::{build_decision, evaluate_computation, evaluate_expression, evaluate_value, EvalError};
pub use types::{ActionSpec, Computation, DecisionTreeDef, Expression, TreeNode, Value};
pub use validation::{validate_tree, ValidationError};
