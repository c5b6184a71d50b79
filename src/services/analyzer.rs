use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::warn;

#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("analyzer could not be started: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("analyzer failed while running: {0}")]
    Wait(#[source] std::io::Error),

    #[error("analyzer exited with status {status}")]
    ExitStatus { status: std::process::ExitStatus },

    #[error("analyzer produced unparseable output")]
    Parse {
        #[source]
        source: serde_json::Error,
        raw_stdout: String,
    },

    #[error("analyzer timed out after {0:?}")]
    Timeout(Duration),
}

/// Invokes the external defect detector and interprets its output.
///
/// The analyzer is opaque: any JSON it prints on stdout is passed through
/// unmodified. Only the boundary is contractual — one path argument, one
/// JSON document on stdout, exit code 0.
pub struct AnalyzerBridge {
    program: String,
    fixed_args: Vec<String>,
    timeout: Duration,
}

impl AnalyzerBridge {
    pub fn new(program: impl Into<String>, fixed_args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            fixed_args,
            timeout,
        }
    }

    /// Run the analyzer on one staged image.
    ///
    /// The path is passed as a single argv entry with no shell in between, so
    /// filenames containing spaces or metacharacters cannot alter the
    /// invocation.
    pub async fn analyze(&self, asset_path: &Path) -> Result<serde_json::Value, AnalyzerError> {
        let child = Command::new(&self.program)
            .args(&self.fixed_args)
            .arg(asset_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(AnalyzerError::Spawn)?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| AnalyzerError::Timeout(self.timeout))?
            .map_err(AnalyzerError::Wait)?;

        // Diagnostic side channel only; non-empty stderr is not a failure.
        if !output.stderr.is_empty() {
            warn!(
                analyzer = %self.program,
                stderr = %String::from_utf8_lossy(&output.stderr),
                "analyzer wrote to stderr"
            );
        }

        if !output.status.success() {
            return Err(AnalyzerError::ExitStatus {
                status: output.status,
            });
        }

        serde_json::from_slice(&output.stdout).map_err(|source| AnalyzerError::Parse {
            source,
            raw_stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::PathBuf;

    /// Writes an executable shell script standing in for the detector.
    fn fake_analyzer(dir: &Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("analyzer.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn bridge(script: &Path) -> AnalyzerBridge {
        AnalyzerBridge::new(
            script.to_str().unwrap(),
            Vec::new(),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn test_valid_json_passes_through() {
        let dir = tempfile::tempdir().unwrap();
        let script = fake_analyzer(
            dir.path(),
            r#"echo '{"defects":[{"type":"short"}],"analysis":"1 defect found"}'"#,
        );

        let value = bridge(&script).analyze(Path::new("/tmp/img.png")).await.unwrap();
        assert_eq!(
            value,
            json!({"defects":[{"type":"short"}],"analysis":"1 defect found"})
        );
    }

    #[tokio::test]
    async fn test_path_passed_as_single_argument() {
        let dir = tempfile::tempdir().unwrap();
        // Echoes argv[1] back inside a JSON string.
        let script = fake_analyzer(dir.path(), r#"printf '{"path":"%s"}' "$1""#);

        let tricky = Path::new("/tmp/with space;rm -rf.png");
        let value = bridge(&script).analyze(tricky).await.unwrap();
        assert_eq!(value["path"], "/tmp/with space;rm -rf.png");
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_execution_error() {
        let dir = tempfile::tempdir().unwrap();
        let script = fake_analyzer(dir.path(), "echo '{\"ok\":true}'\nexit 3");

        let err = bridge(&script).analyze(Path::new("/tmp/img.png")).await.unwrap_err();
        assert!(matches!(err, AnalyzerError::ExitStatus { .. }));
    }

    #[tokio::test]
    async fn test_non_json_stdout_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let script = fake_analyzer(dir.path(), "echo detector exploded");

        let err = bridge(&script).analyze(Path::new("/tmp/img.png")).await.unwrap_err();
        match err {
            AnalyzerError::Parse { raw_stdout, .. } => {
                assert!(raw_stdout.contains("detector exploded"))
            }
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_stderr_alone_is_not_failure() {
        let dir = tempfile::tempdir().unwrap();
        let script = fake_analyzer(
            dir.path(),
            "echo 'model warning' >&2\necho '{\"defects\":[]}'",
        );

        let value = bridge(&script).analyze(Path::new("/tmp/img.png")).await.unwrap();
        assert_eq!(value, json!({"defects":[]}));
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let bridge = AnalyzerBridge::new(
            "/nonexistent/detector",
            Vec::new(),
            Duration::from_secs(5),
        );
        let err = bridge.analyze(Path::new("/tmp/img.png")).await.unwrap_err();
        assert!(matches!(err, AnalyzerError::Spawn(_)));
    }

    #[tokio::test]
    async fn test_slow_analyzer_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let script = fake_analyzer(dir.path(), "sleep 30");
        let bridge = AnalyzerBridge::new(
            script.to_str().unwrap(),
            Vec::new(),
            Duration::from_millis(200),
        );

        let err = bridge.analyze(Path::new("/tmp/img.png")).await.unwrap_err();
        assert!(matches!(err, AnalyzerError::Timeout(_)));
    }
}
