//! Architectural Enforcement Integration Tests
//!
//! This package contains checks that enforce architectural principles of
//! `voicelink-core`:
//! - No blocking sleeps in production code (the core is single-task async)
//! - No lock types (the session owns its state; only atomics are shared)
//! - No `unwrap()`/`expect()` in production code
//! - No audio device or UI framework dependencies
//!
//! Only code before a file's `#[cfg(test)]` module is inspected.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// A rule violation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Offending file
    pub path: PathBuf,
    /// 1-based line number
    pub line: usize,
    /// The offending line, trimmed
    pub text: String,
}

/// Root of the core crate
#[must_use]
pub fn core_crate_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
        .join("voicelink")
        .join("core")
}

/// Production lines of every `.rs` file under `dir`
///
/// Yields `(path, line_number, line)`, stopping each file at its test
/// module and skipping comment lines.
pub fn production_lines(dir: &Path) -> Vec<(PathBuf, usize, String)> {
    let mut lines = Vec::new();

    for entry in WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "rs"))
    {
        let Ok(content) = std::fs::read_to_string(entry.path()) else {
            continue;
        };

        for (idx, line) in content.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.starts_with("#[cfg(test)]") {
                break;
            }
            if trimmed.starts_with("//") {
                continue;
            }
            lines.push((entry.path().to_path_buf(), idx + 1, line.to_string()));
        }
    }

    lines
}

/// Find production lines matching `predicate`
pub fn find_violations<F>(dir: &Path, predicate: F) -> Vec<Violation>
where
    F: Fn(&str) -> bool,
{
    production_lines(dir)
        .into_iter()
        .filter(|(_, _, line)| predicate(line))
        .map(|(path, line, text)| Violation {
            path,
            line,
            text: text.trim().to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn core_src() -> PathBuf {
        core_crate_dir().join("src")
    }

    fn report(rule: &str, violations: &[Violation]) -> String {
        let mut out = format!("{rule}: {} violation(s)\n", violations.len());
        for v in violations {
            out.push_str(&format!("  {}:{}: {}\n", v.path.display(), v.line, v.text));
        }
        out
    }

    #[test]
    fn test_core_sources_found() {
        assert!(
            !production_lines(&core_src()).is_empty(),
            "no sources under {}",
            core_src().display()
        );
    }

    #[test]
    fn test_no_blocking_sleep() {
        let violations = find_violations(&core_src(), |line| line.contains("thread::sleep"));
        assert!(violations.is_empty(), "{}", report("blocking sleep", &violations));
    }

    #[test]
    fn test_no_lock_types() {
        let violations = find_violations(&core_src(), |line| {
            line.contains("Mutex") || line.contains("RwLock")
        });
        assert!(violations.is_empty(), "{}", report("lock type", &violations));
    }

    #[test]
    fn test_no_unwrap_in_production() {
        let violations = find_violations(&core_src(), |line| {
            line.contains(".unwrap()") || line.contains(".expect(")
        });
        assert!(violations.is_empty(), "{}", report("unwrap/expect", &violations));
    }

    #[test]
    fn test_no_device_or_ui_dependencies() {
        let manifest = std::fs::read_to_string(core_crate_dir().join("Cargo.toml")).unwrap();
        for forbidden in ["ratatui", "crossterm", "cpal", "rodio"] {
            assert!(
                !manifest.contains(forbidden),
                "voicelink-core must not depend on {forbidden}"
            );
        }
    }

    #[test]
    fn test_scanner_stops_at_test_module() {
        let scratch = tempfile::tempdir().unwrap();
        let dir = scratch.path();
        std::fs::write(
            dir.join("sample.rs"),
            "fn a() {}\n// thread::sleep in a comment\n#[cfg(test)]\nmod tests { fn b() { std::thread::sleep(d); } }\n",
        )
        .unwrap();

        let violations = find_violations(dir, |line| line.contains("thread::sleep"));
        assert!(violations.is_empty());
        assert_eq!(production_lines(dir).len(), 1);
    }
}
