//! Runs every `.cgt` file under `tests/filetest` through the check runner.

use offload_ipa::text_ir::{TestRunner, TestSpec};
use std::fs;
use std::path::{Path, PathBuf};

/// Discovers all .cgt files in a directory recursively
fn discover_cgt_files(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    if let Ok(entries) = fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                files.extend(discover_cgt_files(&path));
            } else if path.extension().and_then(|s| s.to_str()) == Some("cgt") {
                files.push(path);
            }
        }
    }

    files.sort();
    files
}

fn run_cgt_file(path: &Path) -> Result<(), String> {
    let content = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
    let spec = TestSpec::parse(&content)?;
    TestRunner::new(false).run_test(&spec)
}

#[test]
fn test_all_filetests() {
    let _ = env_logger::builder().is_test(true).try_init();

    let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/filetest");
    let files = discover_cgt_files(&dir);
    assert!(!files.is_empty(), "No .cgt files found in {}", dir.display());

    let mut failures = Vec::new();
    for path in &files {
        match run_cgt_file(path) {
            Ok(()) => println!("PASS {}", path.display()),
            Err(e) => {
                println!("FAIL {}: {}", path.display(), e);
                failures.push(format!("{}: {}", path.display(), e));
            }
        }
    }

    assert!(
        failures.is_empty(),
        "{} of {} filetests failed:\n{}",
        failures.len(),
        files.len(),
        failures.join("\n")
    );
}
