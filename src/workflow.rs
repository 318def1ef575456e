//! Declarative reduction workflows.
//!
//! A [TaskGraph] is an ordered list of stages loaded from YAML or JSON. Each stage names a
//! function from the [Registry], its positional arguments, keyword options and the names to
//! bind its outputs to. Arguments of the form `$name` or `$name.field` refer to values in the
//! [Context]; `$$` escapes a literal dollar sign. Anything else is a literal.
//!
//! The [Engine] validates the whole graph before the first stage runs, then executes stages
//! strictly in order.

pub mod context;
pub mod engine;
pub mod graph;
pub mod handlers;
pub mod registry;

pub use context::{Context, Value, ValueKind};
pub use engine::{Engine, EngineState};
pub use graph::{Arg, StageDescriptor, TaskGraph};
pub use registry::{Handler, Invocation, Registry, Services};
