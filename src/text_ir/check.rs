//! FileCheck-style test validation for text IR files.
//!
//! A test file is ordinary text IR with `; RUN:` and `; CHECK...` comment
//! lines. Each RUN line runs the offload pass over a fresh copy of the module
//! and the resulting call graph, summary dump and diagnostics are matched
//! against the CHECK directives.

use super::Module;
use crate::core::{PassOptions, PassSession};
use crate::offload::{OffloadPass, SymtabEncoder};
use bumpalo::Bump;

/// A CHECK directive extracted from a test file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckDirective {
    /// CHECK: pattern - Match on any later line
    Check(String),
    /// CHECK-LABEL: pattern - Label for a section
    CheckLabel(String),
    /// CHECK-NEXT: pattern - Match on the next line
    CheckNext(String),
    /// CHECK-NOT: pattern - Must not occur before the next match
    CheckNot(String),
    /// CHECK-EMPTY - Match empty line
    CheckEmpty,
    /// COM: comment - Comment, ignored
    Comment(String),
}

/// A RUN directive specifying how to execute the test
#[derive(Debug, Clone)]
pub struct RunDirective {
    pub command: String,
    pub args: Vec<String>,
}

impl RunDirective {
    fn has(&self, flag: &str) -> bool {
        self.args.iter().any(|arg| arg == flag)
    }
}

/// Test specification extracted from a test file
#[derive(Debug)]
pub struct TestSpec {
    pub run_directives: Vec<RunDirective>,
    pub check_directives: Vec<CheckDirective>,
    pub ir_content: String,
}

impl TestSpec {
    /// Split a test file into RUN lines, CHECK lines and IR
    pub fn parse(content: &str) -> Result<Self, String> {
        let mut run_directives = Vec::new();
        let mut check_directives = Vec::new();
        let mut ir_lines = Vec::new();

        for line in content.lines() {
            let trimmed = line.trim();

            if let Some(run_cmd) = trimmed.strip_prefix("; RUN:") {
                let parts: Vec<&str> = run_cmd.split_whitespace().collect();
                if let Some((command, args)) = parts.split_first() {
                    run_directives.push(RunDirective {
                        command: command.to_string(),
                        args: args.iter().map(|s| s.to_string()).collect(),
                    });
                }
            } else if let Some(pattern) = trimmed.strip_prefix("; CHECK-LABEL:") {
                check_directives.push(CheckDirective::CheckLabel(pattern.trim().to_string()));
            } else if let Some(pattern) = trimmed.strip_prefix("; CHECK-NEXT:") {
                check_directives.push(CheckDirective::CheckNext(pattern.trim().to_string()));
            } else if let Some(pattern) = trimmed.strip_prefix("; CHECK-NOT:") {
                check_directives.push(CheckDirective::CheckNot(pattern.trim().to_string()));
            } else if trimmed.starts_with("; CHECK-EMPTY") {
                check_directives.push(CheckDirective::CheckEmpty);
            } else if let Some(pattern) = trimmed.strip_prefix("; CHECK:") {
                check_directives.push(CheckDirective::Check(pattern.trim().to_string()));
            } else if let Some(comment) = trimmed.strip_prefix("; COM:") {
                check_directives.push(CheckDirective::Comment(comment.trim().to_string()));
            } else {
                ir_lines.push(line);
            }
        }

        if run_directives.is_empty() {
            return Err("Test file has no RUN directive".to_string());
        }

        Ok(TestSpec {
            run_directives,
            check_directives,
            ir_content: ir_lines.join("\n"),
        })
    }
}

/// Test runner that executes offload tests
pub struct TestRunner {
    verbose: bool,
}

impl TestRunner {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    /// Run every RUN directive of a test and validate its output
    pub fn run_test(&self, spec: &TestSpec) -> Result<(), String> {
        let module = Module::parse(&spec.ir_content).map_err(|e| e.to_string())?;

        for run_dir in &spec.run_directives {
            let output = self.execute_command(&module, run_dir)?;
            if self.verbose {
                println!("Output of '{} {}':\n{}", run_dir.command, run_dir.args.join(" "), output);
            }
            self.validate_output(&output, &spec.check_directives)?;
        }

        Ok(())
    }

    /// Run the pass as described by the RUN line and render what it did.
    ///
    /// Flags: `--offload`, `--par-offload`, `--verbose`, `--no-warn`,
    /// `--roundtrip` (dump summaries after a trip through an object file),
    /// `--print-stats`.
    pub fn execute_command(&self, module: &Module, run_dir: &RunDirective) -> Result<String, String> {
        let options = PassOptions::new()
            .offload_requested(run_dir.has("--offload"))
            .parallel_offload(run_dir.has("--par-offload"))
            .verbose(run_dir.has("--verbose"))
            .warn_offload(!run_dir.has("--no-warn"));

        let mut module = module.clone();
        let arena = Bump::new();
        let session = PassSession::new(&arena);
        let mut pass = OffloadPass::new(options);

        let mut output = Vec::new();
        if !pass.gate() {
            output.push("Offload pass skipped".to_string());
        } else {
            pass.execute(&mut module, &session);
        }

        output.push(module.print().trim_end().to_string());

        let summary_dump = if run_dir.has("--roundtrip") {
            let encoder = SymtabEncoder::for_functions(&module);
            let object = pass
                .write_summary(&module, &encoder)
                .map_err(|e| e.to_string())?
                .ok_or_else(|| "No summaries to write".to_string())?;
            let mut reader = OffloadPass::new(options);
            reader
                .read_summary(&mut module, &encoder, &[object.as_slice()])
                .map_err(|e| e.to_string())?;
            reader.dump(&module)
        } else {
            pass.dump(&module)
        };
        if !summary_dump.is_empty() {
            output.push(summary_dump.trim_end().to_string());
        }

        for diag in session.diagnostics() {
            output.push(diag.to_string());
        }

        if run_dir.has("--print-stats") {
            output.push(session.stats().to_string().trim_end().to_string());
        }

        Ok(output.join("\n"))
    }

    /// Validate output against CHECK directives
    pub fn validate_output(&self, output: &str, directives: &[CheckDirective]) -> Result<(), String> {
        let output_lines: Vec<_> = output.lines().collect();
        let mut line_idx = 0;
        let mut pending_nots: Vec<&str> = Vec::new();

        for directive in directives {
            match directive {
                CheckDirective::Comment(_) => continue,

                CheckDirective::CheckNot(pattern) => pending_nots.push(pattern),

                CheckDirective::Check(pattern) | CheckDirective::CheckLabel(pattern) => {
                    let found = output_lines
                        .iter()
                        .skip(line_idx)
                        .position(|line| line.contains(pattern.as_str()));

                    let Some(idx) = found else {
                        let kind = if matches!(directive, CheckDirective::CheckLabel(_)) {
                            "CHECK-LABEL"
                        } else {
                            "CHECK"
                        };
                        return Err(format!("{}: pattern '{}' not found in output", kind, pattern));
                    };
                    Self::check_nots(&output_lines[line_idx..line_idx + idx], &mut pending_nots)?;
                    line_idx += idx + 1;
                    if self.verbose {
                        println!("CHECK: '{}' found at line {}", pattern, line_idx - 1);
                    }
                }

                CheckDirective::CheckNext(pattern) => {
                    if line_idx >= output_lines.len() {
                        return Err(format!("CHECK-NEXT: no more lines, expected '{}'", pattern));
                    }

                    let line = output_lines[line_idx];
                    if !line.contains(pattern.as_str()) {
                        return Err(format!(
                            "CHECK-NEXT: expected '{}' but got '{}'",
                            pattern, line
                        ));
                    }
                    pending_nots.clear();
                    line_idx += 1;
                }

                CheckDirective::CheckEmpty => {
                    if line_idx >= output_lines.len() {
                        continue; // End of output counts as empty
                    }

                    let line = output_lines[line_idx];
                    if !line.trim().is_empty() {
                        return Err(format!(
                            "CHECK-EMPTY: expected empty line but got '{}'",
                            line
                        ));
                    }
                    pending_nots.clear();
                    line_idx += 1;
                }
            }
        }

        let rest = &output_lines[line_idx.min(output_lines.len())..];
        Self::check_nots(rest, &mut pending_nots)
    }

    fn check_nots(lines: &[&str], pending: &mut Vec<&str>) -> Result<(), String> {
        for pattern in pending.drain(..) {
            if let Some(line) = lines.iter().find(|line| line.contains(pattern)) {
                return Err(format!("CHECK-NOT: pattern '{}' found in '{}'", pattern, line));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_directives() {
        let content = r#"; RUN: offload-ipa --offload %s
; CHECK-LABEL: Function k
; CHECK-NEXT: Attributes: hsa_kernel
; CHECK-NOT: k.hsa
; COM: kernels are never cloned
k() [hsa_kernel] {
entry:
  ret
}"#;

        let spec = TestSpec::parse(content).unwrap();
        assert_eq!(spec.run_directives.len(), 1);
        assert_eq!(spec.run_directives[0].args, vec!["--offload", "%s"]);
        assert_eq!(spec.check_directives.len(), 4);
        assert!(spec.ir_content.contains("k()"));
    }

    #[test]
    fn test_check_matching() {
        let runner = TestRunner::new(false);
        let output = "Function f\n  Flags: public\nSummary f: kind=function role=host\n";

        let directives = vec![
            CheckDirective::CheckLabel("Function f".to_string()),
            CheckDirective::CheckNext("Flags: public".to_string()),
            CheckDirective::CheckNot("role=accelerator".to_string()),
            CheckDirective::Check("role=host".to_string()),
        ];

        runner.validate_output(output, &directives).unwrap();
    }

    #[test]
    fn test_check_not_failure() {
        let runner = TestRunner::new(false);
        let output = "Line 1\nLine 2\nLine 3\n";

        let directives = vec![
            CheckDirective::Check("Line 1".to_string()),
            CheckDirective::CheckNot("Line 2".to_string()),
            CheckDirective::Check("Line 3".to_string()),
        ];
        let err = runner.validate_output(output, &directives).unwrap_err();
        assert!(err.contains("CHECK-NOT"));

        let trailing = vec![CheckDirective::CheckNot("Line 3".to_string())];
        assert!(runner.validate_output(output, &trailing).is_err());
    }

    #[test]
    fn test_check_next_failure() {
        let runner = TestRunner::new(false);
        let output = "Line 1\nLine 2\nLine 3\n";

        let directives = vec![
            CheckDirective::Check("Line 1".to_string()),
            CheckDirective::CheckNext("Line 3".to_string()),
        ];

        let result = runner.validate_output(output, &directives);
        assert!(result.unwrap_err().contains("CHECK-NEXT"));
    }

    #[test]
    fn test_run_pass_on_spec() {
        let spec = TestSpec::parse(
            r#"; RUN: offload-ipa --offload --roundtrip %s
; CHECK: Function f.hsa.0
; CHECK: Summary f: kind=function role=host bound=f.hsa.0
; CHECK-NEXT: Summary f.hsa.0: kind=function role=accelerator
f() [hsa_function] {
entry:
  ret
}"#,
        )
        .unwrap();

        TestRunner::new(false).run_test(&spec).unwrap();
    }
}
