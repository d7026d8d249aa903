//! Remote function bridge.
//!
//! Client defined functions are deployed to the backend as SQL functions
//! under one of three calling conventions and invoked from generated SQL:
//!
//! - Scalar: a plain function call usable anywhere an expression is.
//! - Array: aggregated parameters receive all of a group's values as an
//!   array; the call site wraps those arguments in `array_agg`.
//! - Aggregate: transition and optional final function registered with
//!   `CREATE AGGREGATE`, called like any other aggregate.

pub mod builtin;
mod call;
pub mod environment;
pub mod registry;
pub mod remote;

pub use environment::{PlPgSqlEnvironment, ProcedureEnvironment, ScriptEnvironment, SqlEnvironment};
pub use remote::{
    CallingConvention,
    FunctionBody,
    FunctionBuilder,
    Parameter,
    RemoteFunction,
    ReturnShape,
    Signature,
};
