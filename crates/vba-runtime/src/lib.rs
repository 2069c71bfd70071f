//! Interpreter for the macro language embedded in office documents.
//!
//! The pipeline is conventional: a hand-written lexer feeds a
//! recursive-descent parser that builds a closed-union IR, and a
//! tree-walking evaluator executes it with dynamic values, lexical scope
//! chains, a With stack, and structured exit flags. Everything the
//! language needs from the surrounding document goes through the
//! [`HostApi`] trait; the interpreter itself owns no object model.
//!
//! ```
//! use vba_runtime::{NullHost, Value, VbaRuntime};
//!
//! let mut runtime = VbaRuntime::new();
//! runtime
//!     .register_source(
//!         "Function Add(a, b)\n    Add = a + b\nEnd Function\n",
//!     )
//!     .unwrap();
//! let mut host = NullHost;
//! let sum = runtime
//!     .call(&mut host, "Add", &[Value::Number(2.0), Value::Number(3.0)])
//!     .unwrap();
//! assert_eq!(sum, Value::Number(5.0));
//! ```

mod ast;
mod builtins;
mod error;
mod eval;
mod host;
mod lexer;
mod parser;
mod runtime;
mod scope;
mod token;
mod value;

pub use ast::{
    ArrayDim, BinaryOp, CaseArm, CaseCondition, ConditionPosition, DimVar, ErrorHandling,
    ExitKind, Expr, Literal, LoopConditionKind, Stmt, UnaryOp,
};
pub use error::VbaError;
pub use eval::{evaluate_expression, execute_statements, Context};
pub use host::{HostApi, HostObject, NullHost};
pub use lexer::Lexer;
pub use parser::{parse_expression, parse_procedure_body, parse_source};
pub use runtime::{
    extract_procedures, EvalLimits, ParamDef, ProcedureDef, ProcedureKind, VbaRuntime,
};
pub use token::{Token, TokenKind};
pub use value::{
    datetime_to_ole, ole_to_datetime, parse_date_text, Value, MS_PER_DAY, OLE_EPOCH_OFFSET_DAYS,
};
