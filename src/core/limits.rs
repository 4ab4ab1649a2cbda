/*!
 * System Limits and Constants
 *
 * Centralized location for system-wide limits, thresholds, and magic numbers.
 * Organized by domain for maintainability and discoverability.
 */

// =============================================================================
// PATH RESOLUTION
// =============================================================================

/// Maximum number of reference links followed while resolving one path
/// Same bound Linux applies before returning ELOOP
pub const MAX_LINK_HOPS: usize = 40;

/// MIME marker carried by synthetic `.` / `..` reference links
pub const LINK_MIME_TYPE: &str = "application/x-vfs-link";

/// MIME type reported for directories
pub const DIRECTORY_MIME_TYPE: &str = "inode/directory";

/// MIME type used when a caller does not supply one
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

// =============================================================================
// EVENTS
// =============================================================================

/// Buffered change events per filesystem broadcast channel
/// Slow subscribers lag rather than block writers
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

// =============================================================================
// EXECUTABLES
// =============================================================================

/// Suffix appended to a command name when searching the executable path
pub const SCRIPT_SUFFIX: &str = ".rhai";

/// Entry point invoked in every executable script
pub const SCRIPT_ENTRY_POINT: &str = "main";

/// Default executable search path (colon separated)
pub const DEFAULT_EXEC_PATH: &str = "/bin";

/// Interpreter operation budget per script run
/// [SECURITY] Bounds runaway loops in untrusted scripts
pub const SCRIPT_MAX_OPERATIONS: u64 = 10_000_000;

/// Maximum expression nesting depth for scripts
pub const SCRIPT_MAX_EXPR_DEPTH: usize = 64;

/// Maximum string size produced by scripts (16MB)
pub const SCRIPT_MAX_STRING_SIZE: usize = 16 * 1024 * 1024;

// =============================================================================
// PROCESSES
// =============================================================================

/// First file descriptor handed out by `open`
/// 0, 1, 2 are stdin, stdout, stderr
pub const FD_START: u32 = 3;

/// Standard output descriptor
pub const STDOUT_FD: u32 = 1;

/// Standard error descriptor
pub const STDERR_FD: u32 = 2;

/// Pending syscall requests buffered per process
/// [PERF] Scripts issue one blocking call at a time, a small bound suffices
pub const SYSCALL_CHANNEL_CAPACITY: usize = 64;

/// Prefix written to stderr when a syscall handler fails
pub const SYSTEM_ERROR_PREFIX: &str = "System error: ";

/// Prefix written to stderr when a process reports an error
pub const PROCESS_ERROR_PREFIX: &str = "Error: ";

// =============================================================================
// REMOTE BACKENDS
// =============================================================================

/// Per-request timeout for HTTP and WebDAV backends (seconds)
pub const REMOTE_REQUEST_TIMEOUT_SECS: u64 = 30;
