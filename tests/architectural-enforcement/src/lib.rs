//! Architectural Enforcement Integration Tests
//!
//! Source-scanning helpers shared by the tests in `tests/`:
//! - No sleep() calls in production code
//! - No blocking I/O inside async code
//!
//! The scanners are line based. They find the function enclosing a line by
//! scanning upwards for a `fn` header, so they can be fooled by unusual
//! formatting; rustfmt output is what they are written against.

use std::fmt;
use std::path::{Path, PathBuf};

/// Production source directories, relative to the workspace root
pub const PRODUCTION_DIRS: &[&str] = &["client/core/src", "client/cli/src"];

/// Workspace root, independent of the directory tests are run from
#[must_use]
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../..")
}

/// Every `.rs` file below `dir` (relative to the workspace root)
#[must_use]
pub fn rust_files(dir: &str) -> Vec<PathBuf> {
    let path = workspace_root().join(dir);
    if !path.exists() {
        return Vec::new();
    }

    walkdir::WalkDir::new(path)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("rs"))
        .map(|e| e.into_path())
        .collect()
}

/// Read a source file into owned lines; unreadable files yield nothing
#[must_use]
pub fn read_lines(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .map(|c| c.lines().map(str::to_string).collect())
        .unwrap_or_default()
}

/// A rule broken at a specific line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// File the violation is in
    pub path: PathBuf,
    /// 1-based line number
    pub line: usize,
    /// What kind of violation it is
    pub kind: &'static str,
    /// The offending line, trimmed
    pub text: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} - {}: {}",
            self.path.display(),
            self.line,
            self.kind,
            self.text
        )
    }
}

/// The code of a line with any `//` comment removed
#[must_use]
pub fn code_part(line: &str) -> &str {
    line.split("//").next().unwrap_or(line)
}

/// A function header found while scanning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FnHeader {
    /// Line index of the header
    pub idx: usize,
    /// Whether the function is `async`
    pub is_async: bool,
}

/// Parse a line as a function header, ignoring visibility and qualifiers
#[must_use]
pub fn parse_fn_header(line: &str) -> Option<bool> {
    let mut rest = line.trim();
    for prefix in ["pub(crate) ", "pub(super) ", "pub "] {
        if let Some(stripped) = rest.strip_prefix(prefix) {
            rest = stripped;
            break;
        }
    }

    let mut is_async = false;
    loop {
        if let Some(stripped) = rest.strip_prefix("async ") {
            is_async = true;
            rest = stripped;
        } else if let Some(stripped) = rest
            .strip_prefix("const ")
            .or_else(|| rest.strip_prefix("unsafe "))
        {
            rest = stripped;
        } else {
            break;
        }
    }

    rest.starts_with("fn ").then_some(is_async)
}

fn is_boundary(line: &str) -> bool {
    let line = line.trim();
    line.starts_with("mod ")
        || line.starts_with("pub mod ")
        || (line.starts_with("impl") && line.contains('{'))
}

/// The function enclosing `current_idx`, if any
#[must_use]
pub fn enclosing_fn<S: AsRef<str>>(lines: &[S], current_idx: usize) -> Option<FnHeader> {
    for i in (0..=current_idx.min(lines.len().saturating_sub(1))).rev() {
        let line = lines[i].as_ref();
        if let Some(is_async) = parse_fn_header(line) {
            return Some(FnHeader { idx: i, is_async });
        }
        if i < current_idx && is_boundary(line) {
            return None;
        }
    }
    None
}

/// Whether `current_idx` is test-only code
///
/// True inside a `#[cfg(test)]` module or a function marked `#[test]` /
/// `#[tokio::test]`.
#[must_use]
pub fn is_in_test_code<S: AsRef<str>>(lines: &[S], current_idx: usize) -> bool {
    let in_test_module = lines[..current_idx.min(lines.len())]
        .iter()
        .any(|l| l.as_ref().trim() == "#[cfg(test)]");
    if in_test_module {
        return true;
    }

    let Some(header) = enclosing_fn(lines, current_idx) else {
        return false;
    };
    for i in (0..header.idx).rev() {
        let line = lines[i].as_ref().trim();
        if line.starts_with("#[test]") || line.starts_with("#[tokio::test") {
            return true;
        }
        if !line.starts_with("#[") && !line.starts_with("///") {
            break;
        }
    }
    false
}

/// Whether `current_idx` is inside an `async fn`
#[must_use]
pub fn is_in_async_function<S: AsRef<str>>(lines: &[S], current_idx: usize) -> bool {
    enclosing_fn(lines, current_idx).is_some_and(|h| h.is_async)
}

/// Whether `current_idx` is inside a plain (non-async) `fn`
#[must_use]
pub fn is_in_non_async_function<S: AsRef<str>>(lines: &[S], current_idx: usize) -> bool {
    enclosing_fn(lines, current_idx).is_some_and(|h| !h.is_async)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fn_header_parsing() {
        assert_eq!(parse_fn_header("fn main() {"), Some(false));
        assert_eq!(parse_fn_header("    pub fn load(path: &Path) -> Result<()> {"), Some(false));
        assert_eq!(parse_fn_header("pub(crate) async fn drive(self) {"), Some(true));
        assert_eq!(parse_fn_header("    async fn open(&self) {"), Some(true));
        assert_eq!(parse_fn_header("pub const fn new() -> Self {"), Some(false));
        assert_eq!(parse_fn_header("let f = fn_ptr;"), None);
        assert_eq!(parse_fn_header("// fn commented()"), None);
    }

    #[test]
    fn test_blocking_io_detection() {
        let code = [
            "pub async fn bad_function() {",
            "    let contents = std::fs::read_to_string(\"file.txt\")?;",
            "}",
        ];
        assert!(is_in_async_function(&code, 1));
        assert!(!is_in_non_async_function(&code, 1));
    }

    #[test]
    fn test_non_async_function_detection() {
        let code = [
            "impl Config {",
            "    pub fn load() -> Self {",
            "        let contents = std::fs::read_to_string(\"config.toml\")?;",
            "    }",
            "}",
        ];
        assert!(is_in_non_async_function(&code, 2));
    }

    #[test]
    fn test_impl_boundary_stops_scan() {
        let code = ["fn free() {}", "impl Thing {", "    const X: u8 = 1;"];
        assert_eq!(enclosing_fn(&code, 2), None);
    }

    #[test]
    fn test_test_code_detection() {
        let code = [
            "#[tokio::test]",
            "async fn test_something() {",
            "    tokio::time::sleep(d).await;",
            "}",
        ];
        assert!(is_in_test_code(&code, 2));

        let module = ["fn prod() {}", "#[cfg(test)]", "mod tests {", "    fn helper() {}"];
        assert!(!is_in_test_code(&module, 0));
        assert!(is_in_test_code(&module, 3));
    }
}
