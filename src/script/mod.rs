/*!
 * Script Engine
 * Interpreter seam used by executables and processes
 */

mod rhai_engine;

pub use rhai_engine::RhaiEngine;

use serde_json::Value;
use std::sync::Arc;

pub use crate::core::errors::{ScriptError, ScriptResult};

/// Why a host operation did not produce a value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    /// The operation failed; the script sees a catchable error
    Failed(String),
    /// The script must stop now and cannot catch it
    Halted,
}

impl From<String> for HostError {
    fn from(message: String) -> Self {
        HostError::Failed(message)
    }
}

/// Operations a running script may call
///
/// Implementations are invoked on the interpreter's thread and may block.
pub trait ScriptHost: Send + Sync {
    /// Names exposed to the script as functions
    fn operations(&self) -> Vec<String>;

    /// Perform one operation
    fn call(&self, op: &str, args: Vec<Value>) -> Result<Value, HostError>;

    /// Polled by the interpreter; true aborts the run
    fn is_terminated(&self) -> bool {
        false
    }
}

/// Embeddable interpreter
///
/// Both calls are synchronous and may run for a long time; async callers
/// run them on a blocking thread.
pub trait ScriptEngine: Send + Sync {
    /// Run `source`, calling `entry` with `args` when the script defines it
    fn run(
        &self,
        source: &str,
        entry: &str,
        args: Vec<Value>,
        host: Arc<dyn ScriptHost>,
    ) -> ScriptResult<Value>;

    /// Evaluate `source` and return the value of its export `name`
    ///
    /// An export is a zero-argument function or a top-level constant.
    fn evaluate_export(&self, source: &str, name: &str) -> ScriptResult<Value>;
}

/// Host exposing nothing
pub struct NullHost;

impl ScriptHost for NullHost {
    fn operations(&self) -> Vec<String> {
        Vec::new()
    }

    fn call(&self, op: &str, _args: Vec<Value>) -> Result<Value, HostError> {
        Err(HostError::Failed(format!("unknown operation {}", op)))
    }
}
