/*!
 * Syscall Types
 * Request decoding and response encoding for the process wire protocol
 *
 * Request:  [correlationId, opName, ...args]
 * Response: [correlationId, returnValue]
 */

use serde_json::{json, Value};

use crate::core::errors::{ProcessError, ProcessResult};
use crate::core::types::{CorrelationId, Fd};

/// Operation names as scripts call them
pub mod ops {
    pub const OPEN: &str = "open";
    pub const CLOSE: &str = "close";
    pub const READ: &str = "read";
    pub const WRITE: &str = "write";
    pub const IMPORT: &str = "import";
    pub const FORK: &str = "fork";
    pub const EXEC: &str = "exec";
    pub const EXIT: &str = "exit";
    pub const ERROR: &str = "error";

    /// Every operation, in registration order
    pub const ALL: [&str; 9] = [OPEN, CLOSE, READ, WRITE, IMPORT, FORK, EXEC, EXIT, ERROR];

    /// Operations after which the process is torn down without a reply
    #[inline]
    pub fn is_terminal(op: &str) -> bool {
        op == EXIT || op == ERROR
    }
}

/// System call types
#[derive(Debug, Clone, PartialEq)]
pub enum Syscall {
    Open { path: String },
    Close { fd: Fd },
    Read { fd: Fd },
    Write { fd: Fd, data: String },
    Import { path: String, name: String },
    Fork,
    Exec { path: String, args: Vec<Value> },
    Exit { message: Value },
    Error { message: Value },
}

impl Syscall {
    pub fn name(&self) -> &'static str {
        match self {
            Syscall::Open { .. } => ops::OPEN,
            Syscall::Close { .. } => ops::CLOSE,
            Syscall::Read { .. } => ops::READ,
            Syscall::Write { .. } => ops::WRITE,
            Syscall::Import { .. } => ops::IMPORT,
            Syscall::Fork => ops::FORK,
            Syscall::Exec { .. } => ops::EXEC,
            Syscall::Exit { .. } => ops::EXIT,
            Syscall::Error { .. } => ops::ERROR,
        }
    }
}

/// Decoded request frame
#[derive(Debug, Clone, PartialEq)]
pub struct SyscallRequest {
    pub id: CorrelationId,
    pub call: Syscall,
}

impl SyscallRequest {
    /// Build the wire frame for `op` with `args`
    pub fn frame(id: CorrelationId, op: &str, args: Vec<Value>) -> Value {
        let mut frame = Vec::with_capacity(args.len() + 2);
        frame.push(json!(id));
        frame.push(json!(op));
        frame.extend(args);
        Value::Array(frame)
    }

    pub fn decode(frame: &Value) -> ProcessResult<Self> {
        let items = frame
            .as_array()
            .ok_or_else(|| malformed("request is not an array"))?;
        let id = items
            .first()
            .and_then(Value::as_u64)
            .ok_or_else(|| malformed("missing correlation id"))?;
        let op = items
            .get(1)
            .and_then(Value::as_str)
            .ok_or_else(|| malformed("missing operation name"))?;
        let args = &items[2..];

        let call = match op {
            ops::OPEN => Syscall::Open {
                path: string_arg(args, 0, op)?,
            },
            ops::CLOSE => Syscall::Close {
                fd: fd_arg(args, 0, op)?,
            },
            ops::READ => Syscall::Read {
                fd: fd_arg(args, 0, op)?,
            },
            ops::WRITE => Syscall::Write {
                fd: fd_arg(args, 0, op)?,
                data: text(args.get(1).unwrap_or(&Value::Null)),
            },
            ops::IMPORT => Syscall::Import {
                path: string_arg(args, 0, op)?,
                name: string_arg(args, 1, op)?,
            },
            ops::FORK => Syscall::Fork,
            ops::EXEC => Syscall::Exec {
                path: string_arg(args, 0, op)?,
                args: exec_args(&args[1.min(args.len())..]),
            },
            ops::EXIT => Syscall::Exit {
                message: args.first().cloned().unwrap_or(Value::Null),
            },
            ops::ERROR => Syscall::Error {
                message: args.first().cloned().unwrap_or(Value::Null),
            },
            other => return Err(malformed(&format!("unknown operation {}", other))),
        };
        Ok(Self { id, call })
    }
}

/// Decoded response frame
#[derive(Debug, Clone, PartialEq)]
pub struct SyscallResponse {
    pub id: CorrelationId,
    pub value: Value,
}

impl SyscallResponse {
    pub fn new(id: CorrelationId, value: Value) -> Self {
        Self { id, value }
    }

    pub fn encode(&self) -> Value {
        json!([self.id, self.value])
    }

    pub fn decode(frame: &Value) -> ProcessResult<Self> {
        match frame.as_array().map(Vec::as_slice) {
            Some([id, value]) => Ok(Self {
                id: id
                    .as_u64()
                    .ok_or_else(|| malformed("missing correlation id"))?,
                value: value.clone(),
            }),
            _ => Err(malformed("response is not [id, value]")),
        }
    }
}

/// Render a script value as output text
pub fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn malformed(reason: &str) -> ProcessError {
    ProcessError::MalformedSyscall(reason.to_string())
}

fn string_arg(args: &[Value], index: usize, op: &str) -> ProcessResult<String> {
    args.get(index)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| malformed(&format!("{} expects a string argument {}", op, index)))
}

fn fd_arg(args: &[Value], index: usize, op: &str) -> ProcessResult<Fd> {
    args.get(index)
        .and_then(Value::as_u64)
        .and_then(|fd| Fd::try_from(fd).ok())
        .ok_or_else(|| malformed(&format!("{} expects a descriptor", op)))
}

/// `exec(path, [a, b])` and `exec(path, a, b)` are equivalent
fn exec_args(rest: &[Value]) -> Vec<Value> {
    match rest {
        [Value::Array(items)] => items.clone(),
        other => other.to_vec(),
    }
}
