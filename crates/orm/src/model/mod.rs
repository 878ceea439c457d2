//! Model System - compiled models, instances and the model handle
//!
//! - `compiler`: schema definitions in, `ModelRegistry` out
//! - `compiled`: the immutable per-entity metadata
//! - `handle`: static query contract (`find`, `create`, ...)
//! - `instance`: one row with dirty tracking and relation access
//! - `persistence`: write paths shared by handles and instances

pub mod compiled;
pub mod compiler;
pub mod handle;
pub mod instance;
pub mod persistence;

pub use compiled::CompiledModel;
pub use compiler::{ModelCompiler, ModelRegistry};
pub use handle::Model;
pub use instance::ModelInstance;
