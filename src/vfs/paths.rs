/*!
 * Filesystem Paths
 * Segment-based path handling and standard tree layout
 *
 * Paths are ordered sequences of segment names. The string form uses `/`
 * as separator; a leading `/` makes a path absolute.
 */

use super::types::{VfsError, VfsResult};

/// Standard mount points
pub mod mounts {
    /// Volatile scratch space
    pub const TMP: &str = "tmp";

    /// Live process registry
    pub const PROC: &str = "proc";
}

/// Standard directories created at boot
pub mod standard {
    /// Executables searched by default
    pub const BIN: &str = "/bin";

    /// User files and data
    pub const HOME: &str = "/home";
}

/// All standard directories that should be created at init
pub fn standard_directories() -> Vec<&'static str> {
    vec![standard::BIN, standard::HOME]
}

/// True when the string form starts at the root
#[inline]
pub fn is_absolute(path: &str) -> bool {
    path.starts_with('/')
}

/// Split a path string into segments, dropping empty ones
pub fn parse(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect()
}

/// Resolve a path string against a base path
///
/// Absolute strings ignore the base. `.` and `..` are kept as segments so the
/// resolver can follow them as reference links.
pub fn join(base: &[String], path: &str) -> Vec<String> {
    if is_absolute(path) {
        return parse(path);
    }
    let mut segments = base.to_vec();
    segments.extend(parse(path));
    segments
}

/// Lexically fold `.` and `..` segments
pub fn normalize(segments: &[String]) -> Vec<String> {
    let cleaned = path_clean::clean(&format(segments));
    parse(&cleaned.to_string_lossy())
}

/// Render segments as an absolute path string
pub fn format(segments: &[String]) -> String {
    if segments.is_empty() {
        return "/".to_string();
    }
    let mut out = String::new();
    for segment in segments {
        out.push('/');
        out.push_str(segment);
    }
    out
}

/// Validate a single node name
pub fn validate_name(name: &str) -> VfsResult<()> {
    if name.is_empty() {
        return Err(VfsError::InvalidPath("name cannot be empty".into()));
    }
    if name.contains('\0') {
        return Err(VfsError::InvalidPath("name cannot contain null bytes".into()));
    }
    if name.contains('/') {
        return Err(VfsError::InvalidPath(format!(
            "name cannot contain path separators: {}",
            name
        )));
    }
    if name == "." || name == ".." {
        return Err(VfsError::InvalidPath(format!("reserved name: {}", name)));
    }
    Ok(())
}
