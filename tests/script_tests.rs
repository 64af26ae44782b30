//! Runs every `tests/scripts/*.lisp` file.
//!
//! Source lines accumulate until an expectation line:
//! `;=> text` compares the printed result of the pending forms with `text`,
//! `;!> text` expects evaluation to fail with an error whose message contains `text`.

use lispxp::builtinops::Arity;
use lispxp::{Environment, Error, Value, create_global_env, eval_str, pr_str};
use std::fs;
use std::path::{Path, PathBuf};

fn scripts_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests").join("scripts")
}

/// Script environment with a `slurp` that reads relative to the scripts directory
fn script_env() -> Environment {
    let env = create_global_env();
    env.define_native("slurp", Arity::Exact(1), |_ctx, args| {
        let path = args[0].as_str()?;
        fs::read_to_string(scripts_dir().join(path))
            .map(Value::String)
            .map_err(|e| Error::EvalError(format!("slurp {path}: {e}")))
    });
    env
}

/// Returns one failure description per mismatched expectation
fn run_script(path: &Path) -> Vec<String> {
    let source = fs::read_to_string(path).expect("Failed to read script");
    let env = script_env();
    let mut pending = String::new();
    let mut failures = Vec::new();

    for (i, line) in source.lines().enumerate() {
        let line_no = i + 1;
        let (expect_error, expected) = if let Some(rest) = line.strip_prefix(";=>") {
            (false, rest.trim())
        } else if let Some(rest) = line.strip_prefix(";!>") {
            (true, rest.trim())
        } else {
            pending.push_str(line);
            pending.push('\n');
            continue;
        };

        let result = eval_str(&pending, &env);
        match (expect_error, result) {
            (false, Ok(value)) => {
                let actual = pr_str(&value, true);
                if actual != expected {
                    failures.push(format!("line {line_no}: expected {expected}, got {actual}"));
                }
            }
            (false, Err(e)) => {
                failures.push(format!("line {line_no}: expected {expected}, got error {e}"));
            }
            (true, Ok(value)) => failures.push(format!(
                "line {line_no}: expected error containing '{expected}', got {}",
                pr_str(&value, true)
            )),
            (true, Err(e)) => {
                let message = e.to_string();
                if !message.contains(expected) {
                    failures.push(format!(
                        "line {line_no}: expected error containing '{expected}', got {message}"
                    ));
                }
            }
        }
        pending.clear();
    }

    failures
}

#[test]
fn test_all_script_files() {
    let mut script_count = 0;
    let mut all_failures = Vec::new();

    let entries = fs::read_dir(scripts_dir()).expect("Failed to read scripts directory");
    for entry in entries {
        let path = entry.expect("Failed to read directory entry").path();
        if path.extension().and_then(|s| s.to_str()) != Some("lisp") {
            continue;
        }

        let name = path.file_stem().and_then(|s| s.to_str()).unwrap_or("unknown").to_owned();
        script_count += 1;

        let failures = run_script(&path);
        if failures.is_empty() {
            println!("PASSED: {name}");
        }
        for failure in failures {
            println!("FAILED: {name} {failure}");
            all_failures.push(format!("{name} {failure}"));
        }
    }

    assert!(script_count > 0, "No .lisp scripts found");
    assert!(all_failures.is_empty(), "Script failures:\n{}", all_failures.join("\n"));
}
