//! Integration Test: Sleep Prohibition
//!
//! **Policy**: Client code MUST NOT call sleep methods. Waiting is done on I/O,
//! channels or `watch` notifications.
//! **Exceptions**: exponential backoff in retry logic.
//!
//! Test modules inside `src/` are held to the same rule: tests synchronize on
//! session updates, not on time.

use architectural_enforcement::{
    code_part, is_in_test_code, read_lines, rust_files, Violation, PRODUCTION_DIRS,
};

struct SleepPolicy {
    allow_backoff: bool,
    allow_tests: bool,
}

const CLIENT_POLICY: SleepPolicy = SleepPolicy {
    allow_backoff: true,
    allow_tests: false,
};

/// Test that production code does not contain sleep() calls
#[test]
fn test_no_sleep_in_production_code() {
    let violations: Vec<Violation> = PRODUCTION_DIRS
        .iter()
        .flat_map(|dir| rust_files(dir))
        .flat_map(|path| {
            let lines = read_lines(&path);
            check_lines(&lines, &CLIENT_POLICY)
                .into_iter()
                .map(|line| Violation {
                    path: path.clone(),
                    line: line + 1,
                    kind: "sleep",
                    text: lines[line].trim().to_string(),
                })
                .collect::<Vec<_>>()
        })
        .collect();

    if !violations.is_empty() {
        eprintln!("\n❌ CRITICAL: Sleep calls found in production code!\n");

        for violation in &violations {
            eprintln!("  ❌ {violation}");
        }

        eprintln!("\n✅ ACCEPTABLE sleep uses:");
        eprintln!("  - Exponential backoff in retry logic");
        eprintln!("\n❌ FORBIDDEN:");
        eprintln!("  - Sleep in polling loops");
        eprintln!("  - Sleep to 'wait' for a stream or task (await it instead)");

        panic!(
            "\nFound {} sleep violation(s) in production code.\nFix these before merging!",
            violations.len()
        );
    }
}

/// Line indices with a forbidden sleep
fn check_lines(lines: &[String], policy: &SleepPolicy) -> Vec<usize> {
    lines
        .iter()
        .enumerate()
        .filter(|(_, line)| {
            let code = code_part(line);
            code.contains("::sleep(") || code.contains(".sleep(")
        })
        .filter(|(idx, _)| !(policy.allow_tests && is_in_test_code(lines, *idx)))
        .filter(|(idx, _)| !(policy.allow_backoff && is_backoff_context(lines, *idx)))
        .map(|(idx, _)| idx)
        .collect()
}

/// Check if sleep is used for exponential backoff (acceptable for retry logic)
fn is_backoff_context(lines: &[String], current_idx: usize) -> bool {
    let context = &lines[current_idx.saturating_sub(15)..(current_idx + 5).min(lines.len())];

    let has_backoff_calc = context.iter().any(|l| {
        let l = l.to_lowercase();
        l.contains("<<") || l.contains("pow") || l.contains("* 2")
    });
    let has_retry_context = context.iter().any(|l| {
        let l = l.to_lowercase();
        l.contains("retry") || l.contains("backoff") || l.contains("attempt")
    });

    has_backoff_calc && has_retry_context
}

fn owned(code: &[&str]) -> Vec<String> {
    code.iter().map(|s| s.to_string()).collect()
}

#[test]
fn test_sleep_violation_detection() {
    let code = owned(&[
        "async fn wait_for_stream() {",
        "    tokio::time::sleep(Duration::from_millis(10)).await;",
        "}",
    ]);
    assert_eq!(check_lines(&code, &CLIENT_POLICY), vec![1]);
}

#[test]
fn test_sleep_in_src_test_module_is_flagged() {
    let code = owned(&[
        "#[cfg(test)]",
        "mod tests {",
        "    #[tokio::test]",
        "    async fn test_waits() {",
        "        tokio::time::sleep(Duration::from_millis(10)).await;",
        "    }",
        "}",
    ]);
    assert_eq!(check_lines(&code, &CLIENT_POLICY), vec![4]);

    let lenient = SleepPolicy {
        allow_backoff: false,
        allow_tests: true,
    };
    assert!(check_lines(&code, &lenient).is_empty());
}

#[test]
fn test_backoff_detection() {
    let code = owned(&[
        "async fn reconnect() {",
        "    let delay = base_delay * (1 << attempt);",
        "    tracing::warn!(attempt, \"Retrying\");",
        "    tokio::time::sleep(Duration::from_millis(delay)).await;",
        "}",
    ]);
    assert!(is_backoff_context(&code, 3));
    assert!(check_lines(&code, &CLIENT_POLICY).is_empty());
}

#[test]
fn test_comments_are_ignored() {
    let code = owned(&["// never thread::sleep(d) here"]);
    assert!(check_lines(&code, &CLIENT_POLICY).is_empty());
}
