// Target Engine Module
// Connectivity, safety, and type layer for caller-supplied databases

pub mod error;
pub mod sql_safety;
pub mod target;
pub mod types;

pub use error::{EngineError, EngineResult};
pub use target::{PostgresTarget, TargetConnector, TargetSession};
pub use types::*;
