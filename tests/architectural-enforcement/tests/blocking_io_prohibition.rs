//! Integration Test: Blocking I/O Prohibition
//!
//! **Policy**: Async code in the client crates MUST NOT use blocking I/O.
//! **Required**: Use `tokio::fs`, `tokio::io`, `tokio::net` inside async functions.
//!
//! Blocking calls are tolerated in plain functions (config loading before the
//! runtime does anything interesting) and in test code.

use architectural_enforcement::{
    code_part, is_in_async_function, is_in_non_async_function, is_in_test_code, read_lines,
    rust_files, Violation, PRODUCTION_DIRS,
};

/// Test that production code does not use blocking I/O
#[test]
fn test_no_blocking_io_in_production_code() {
    let violations = find_blocking_io_violations();

    if !violations.is_empty() {
        eprintln!("\n❌ CRITICAL: Blocking I/O calls found in production code!\n");

        for violation in &violations {
            eprintln!("  ❌ {violation}");
        }

        eprintln!("\n❌ FORBIDDEN in async code:");
        eprintln!("  - std::fs::*, std::net::*");
        eprintln!("  - std::io::stdin(), std::io::stdout()");
        eprintln!("  - std::process::Command");
        eprintln!("  - reqwest::blocking::*");
        eprintln!("\n✅ REQUIRED async I/O:");
        eprintln!("  - tokio::fs::read().await");
        eprintln!("  - tokio::io::stdin() / tokio::io::stdout()");
        eprintln!("  - reqwest::Client (async)");

        panic!(
            "\nFound {} blocking I/O violation(s) in production code.\nFix these before merging!",
            violations.len()
        );
    }
}

/// Test that the scanner actually sees the client sources
#[test]
fn test_production_dirs_are_scanned() {
    for dir in PRODUCTION_DIRS {
        assert!(
            !rust_files(dir).is_empty(),
            "No Rust files found under {dir}; scanner paths are stale"
        );
    }
}

fn find_blocking_io_violations() -> Vec<Violation> {
    PRODUCTION_DIRS
        .iter()
        .flat_map(|dir| rust_files(dir))
        .flat_map(|path| {
            let lines = read_lines(&path);
            check_lines(&lines)
                .into_iter()
                .map(|(line, kind, text)| Violation {
                    path: path.clone(),
                    line,
                    kind,
                    text,
                })
                .collect::<Vec<_>>()
        })
        .collect()
}

fn check_lines(lines: &[String]) -> Vec<(usize, &'static str, String)> {
    let mut found = Vec::new();

    for (idx, line) in lines.iter().enumerate() {
        let code = code_part(line);

        if is_in_test_code(lines, idx) || is_in_non_async_function(lines, idx) {
            continue;
        }

        let kind = if code.contains("std::fs::") || code.contains("use std::fs") {
            Some("Blocking file I/O")
        } else if code.contains("std::net::") || code.contains("use std::net") {
            Some("Blocking network I/O")
        } else if code.contains("std::process::Command") {
            Some("Blocking process I/O")
        } else if code.contains("reqwest::blocking") {
            Some("Blocking HTTP client")
        } else if (code.contains("std::io::stdin()") || code.contains("std::io::stdout()"))
            && is_in_async_function(lines, idx)
        {
            Some("Blocking stdin/stdout in async")
        } else {
            None
        };

        if let Some(kind) = kind {
            found.push((idx + 1, kind, line.trim().to_string()));
        }
    }

    found
}

#[test]
fn test_detects_fs_in_async_method() {
    let code: Vec<String> = [
        "impl Loader {",
        "    pub async fn load(&self) -> String {",
        "        std::fs::read_to_string(\"x\").unwrap_or_default()",
        "    }",
        "}",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    let found = check_lines(&code);
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].0, 3);
    assert_eq!(found[0].1, "Blocking file I/O");
}

#[test]
fn test_allows_fs_in_plain_pub_fn() {
    let code: Vec<String> = [
        "pub fn load_config(path: &Path) -> Result<Config, Error> {",
        "    let text = std::fs::read_to_string(path)?;",
        "}",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    assert!(check_lines(&code).is_empty());
}
