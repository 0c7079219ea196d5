use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;

use crate::error::PackError;

/// Outcome of running the static type checker over a source tree.
#[derive(Clone, Debug)]
pub struct TypeCheckOutcome {
    pub success: bool,
    /// Lines of the form `file:line:column: error: message`.
    pub errors: Vec<String>,
    /// Complete combined stdout + stderr.
    pub output: String,
}

/// Run mypy over the source tree. No timeout: the checker is bounded by the
/// size of the tree, and the pipeline stages around it carry the deadlines.
pub async fn validate_python(source_path: &Path) -> Result<TypeCheckOutcome, PackError> {
    let output = Command::new("mypy")
        .arg(source_path)
        .args(["--ignore-missing-imports", "--show-column-numbers"])
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                PackError::ToolMissing { tool: "mypy" }
            } else {
                PackError::Io(e)
            }
        })?;

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();

    let errors = if success {
        Vec::new()
    } else {
        extract_errors(&stdout)
    };
    debug!(success, error_count = errors.len(), "mypy finished");

    Ok(TypeCheckOutcome {
        success,
        errors,
        output: format!("{stdout}{stderr}"),
    })
}

/// Keep only the error lines; mypy writes errors to stdout as
/// `file:line:column: error: message` and a summary line at the end.
fn extract_errors(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .filter(|line| !line.is_empty() && line.contains(": error:"))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_lines_keep_position_information() {
        let stdout = "\
app.py:3:5: error: Incompatible types in assignment
app.py:9:1: error: Name \"handler\" is not defined
app.py:12:1: note: See documentation
Found 2 errors in 1 file (checked 1 source file)
";
        let errors = extract_errors(stdout);
        assert_eq!(errors.len(), 2);
        assert!(errors[0].starts_with("app.py:3:5:"));
        assert!(errors[1].contains("is not defined"));
    }

    #[test]
    fn clean_output_yields_no_errors() {
        let stdout = "Success: no issues found in 1 source file\n";
        assert!(extract_errors(stdout).is_empty());
    }
}
