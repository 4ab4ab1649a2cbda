/*!
 * Rhai Script Engine
 * Embedded interpreter with host operations registered as functions
 *
 * Each run builds a fresh `Engine` with safety limits, registers every host
 * operation for arities 0 to 3, and converts values across the boundary with
 * serde. Operations whose names the grammar reserves (`import`) are reachable
 * through the generic `syscall(op, ...)` function.
 */

use rhai::serde::{from_dynamic, to_dynamic};
use rhai::{Array, Dynamic, Engine, EvalAltResult, Position, Scope};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use super::{HostError, ScriptEngine, ScriptError, ScriptHost, ScriptResult};
use crate::core::limits::{SCRIPT_MAX_EXPR_DEPTH, SCRIPT_MAX_OPERATIONS, SCRIPT_MAX_STRING_SIZE};

type RhaiResult = Result<Dynamic, Box<EvalAltResult>>;

/// Rhai-backed [`ScriptEngine`]
#[derive(Debug, Default, Clone, Copy)]
pub struct RhaiEngine;

impl RhaiEngine {
    pub fn new() -> Self {
        Self
    }

    fn create_engine(host: Option<Arc<dyn ScriptHost>>) -> Engine {
        let mut engine = Engine::new();

        // Configure safety limits
        engine.set_max_expr_depths(SCRIPT_MAX_EXPR_DEPTH, SCRIPT_MAX_EXPR_DEPTH);
        engine.set_max_operations(SCRIPT_MAX_OPERATIONS);
        engine.set_max_string_size(SCRIPT_MAX_STRING_SIZE);

        if let Some(host) = host {
            Self::register_host(&mut engine, host);
        }
        engine
    }

    fn register_host(engine: &mut Engine, host: Arc<dyn ScriptHost>) {
        let progress = Arc::clone(&host);
        engine.on_progress(move |_| {
            if progress.is_terminated() {
                Some(Dynamic::UNIT)
            } else {
                None
            }
        });

        for op in host.operations() {
            let (h, name) = (Arc::clone(&host), op.clone());
            engine.register_fn(op.as_str(), move || invoke(&h, &name, Vec::new()));

            let (h, name) = (Arc::clone(&host), op.clone());
            engine.register_fn(op.as_str(), move |a: Dynamic| invoke(&h, &name, vec![a]));

            let (h, name) = (Arc::clone(&host), op.clone());
            engine.register_fn(op.as_str(), move |a: Dynamic, b: Dynamic| {
                invoke(&h, &name, vec![a, b])
            });

            let (h, name) = (Arc::clone(&host), op.clone());
            engine.register_fn(op.as_str(), move |a: Dynamic, b: Dynamic, c: Dynamic| {
                invoke(&h, &name, vec![a, b, c])
            });
        }

        // syscall(op, ...)
        let h = Arc::clone(&host);
        engine.register_fn("syscall", move |op: &str| invoke(&h, op, Vec::new()));
        let h = Arc::clone(&host);
        engine.register_fn("syscall", move |op: &str, a: Dynamic| invoke(&h, op, vec![a]));
        let h = Arc::clone(&host);
        engine.register_fn("syscall", move |op: &str, a: Dynamic, b: Dynamic| {
            invoke(&h, op, vec![a, b])
        });
        let h = host;
        engine.register_fn("syscall", move |op: &str, a: Dynamic, b: Dynamic, c: Dynamic| {
            invoke(&h, op, vec![a, b, c])
        });
    }
}

fn invoke(host: &Arc<dyn ScriptHost>, op: &str, args: Vec<Dynamic>) -> RhaiResult {
    let values = args
        .iter()
        .map(|arg| from_dynamic::<Value>(arg))
        .collect::<Result<Vec<_>, _>>()?;

    match host.call(op, values) {
        Ok(value) => to_dynamic(value),
        Err(HostError::Failed(message)) => Err(message.into()),
        Err(HostError::Halted) => Err(Box::new(EvalAltResult::ErrorTerminated(
            Dynamic::UNIT,
            Position::NONE,
        ))),
    }
}

/// Innermost error, past function-call and module wrappers
fn root_cause(err: &EvalAltResult) -> &EvalAltResult {
    match err {
        EvalAltResult::ErrorInFunctionCall(_, _, inner, _) => root_cause(inner),
        EvalAltResult::ErrorInModule(_, inner, _) => root_cause(inner),
        other => other,
    }
}

fn to_value(value: &Dynamic) -> ScriptResult<Value> {
    from_dynamic::<Value>(value).map_err(|e| ScriptError::Conversion(e.to_string()))
}

fn finish(outcome: RhaiResult) -> ScriptResult<Value> {
    let err = match outcome {
        Ok(value) => return to_value(&value),
        Err(err) => err,
    };
    match root_cause(&err) {
        // Built-in exit(value) ends the run with that value
        EvalAltResult::Exit(value, _) => to_value(value),
        EvalAltResult::ErrorTerminated(..) => Err(ScriptError::Terminated),
        EvalAltResult::ErrorRuntime(value, _) => Err(ScriptError::Runtime(value.to_string())),
        _ => Err(ScriptError::Runtime(err.to_string())),
    }
}

impl ScriptEngine for RhaiEngine {
    fn run(
        &self,
        source: &str,
        entry: &str,
        args: Vec<Value>,
        host: Arc<dyn ScriptHost>,
    ) -> ScriptResult<Value> {
        let engine = Self::create_engine(Some(host));
        let ast = engine
            .compile(source)
            .map_err(|e| ScriptError::Compile(e.to_string()))?;

        let argv: Array = args
            .into_iter()
            .map(to_dynamic)
            .collect::<Result<_, _>>()
            .map_err(|e| ScriptError::Conversion(e.to_string()))?;

        let mut scope = Scope::new();
        scope.push_constant("ARGS", argv.clone());

        let arity = ast
            .iter_functions()
            .find(|f| f.name == entry)
            .map(|f| f.params.len());
        debug!(entry, arity = ?arity, "Running script");

        let outcome = match arity {
            Some(0) => engine.call_fn::<Dynamic>(&mut scope, &ast, entry, ()),
            Some(1) => engine.call_fn::<Dynamic>(&mut scope, &ast, entry, (argv,)),
            Some(n) => {
                let mut spread: Vec<Dynamic> = argv;
                spread.resize(n, Dynamic::UNIT);
                engine.call_fn::<Dynamic>(&mut scope, &ast, entry, spread)
            }
            None => engine.eval_ast_with_scope::<Dynamic>(&mut scope, &ast),
        };
        finish(outcome)
    }

    fn evaluate_export(&self, source: &str, name: &str) -> ScriptResult<Value> {
        let engine = Self::create_engine(None);
        let ast = engine
            .compile(source)
            .map_err(|e| ScriptError::Compile(e.to_string()))?;
        let mut scope = Scope::new();

        if ast
            .iter_functions()
            .any(|f| f.name == name && f.params.is_empty())
        {
            return finish(engine.call_fn::<Dynamic>(&mut scope, &ast, name, ()));
        }

        finish(engine.run_ast_with_scope(&mut scope, &ast).map(|_| Dynamic::UNIT))?;
        match scope.get_value::<Dynamic>(name) {
            Some(value) => to_value(&value),
            None => Err(ScriptError::ExportNotFound(name.to_string())),
        }
    }
}
