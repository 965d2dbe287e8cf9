use crate::{Error, Result};
use std::env;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, instrument, warn};

/// Runs `program args...` and returns its stdout split in lines. The lines
/// printed before a non-zero exit are kept, only spawn and io errors fail.
#[instrument(name = "process", level = "debug", fields(program = program), skip_all)]
pub async fn run_tool(program: &str, args: &[String]) -> Result<Vec<String>> {
    debug!("Running {} {}", program, args.join(" "));
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .await?;

    if !output.status.success() {
        warn!("{} exited with {:?}", program, output.status.code());
    }

    Ok(String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(|line| line.to_string())
        .collect())
}

/// Same as `echo <input> | program args...`, stdout is discarded.
#[instrument(name = "process", level = "debug", fields(program = program), skip_all)]
pub async fn run_with_stdin(program: &str, args: &[String], input: &str) -> Result<()> {
    debug!("Running echo {} | {} {}", input, program, args.join(" "));
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(format!("{}\n", input).as_bytes()).await?;
        stdin.shutdown().await?;
    }

    let status = child.wait().await?;
    if !status.success() {
        return Err(Error::ToolStatus {
            tool: program.to_string(),
            code: status.code(),
        });
    }

    Ok(())
}

pub fn is_installed(program: &str) -> bool {
    let Some(paths) = env::var_os("PATH") else {
        return false;
    };
    env::split_paths(&paths).any(|dir| dir.join(program).is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["-c".to_string(), script.to_string()]
    }

    #[tokio::test]
    async fn captures_stdout_lines() {
        let lines = run_tool("sh", &sh("printf 'a.example.com\\nb.example.com\\n'"))
            .await
            .unwrap();
        assert_eq!(vec!["a.example.com", "b.example.com"], lines);
    }

    #[tokio::test]
    async fn non_zero_exit_keeps_printed_lines() {
        let lines = run_tool("sh", &sh("echo partial; exit 3")).await.unwrap();
        assert_eq!(vec!["partial"], lines);
    }

    #[tokio::test]
    async fn piped_tool_status_is_an_error() {
        let res = run_with_stdin("sh", &sh("cat > /dev/null; exit 2"), "www.example.com").await;
        assert!(matches!(res, Err(Error::ToolStatus { code: Some(2), .. })));
    }

    #[tokio::test]
    async fn missing_program_is_an_error() {
        let res = run_tool("subrecon-missing-binary", &[]).await;
        assert!(matches!(res, Err(Error::File(_))));
    }

    #[tokio::test]
    async fn feeds_stdin() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("host.txt");
        let script = format!("cat > {}", out.display());
        run_with_stdin("sh", &sh(&script), "www.example.com")
            .await
            .unwrap();
        assert_eq!(
            "www.example.com\n",
            std::fs::read_to_string(out).unwrap()
        );
    }

    #[test]
    fn finds_programs_on_path() {
        assert!(is_installed("sh"));
        assert!(!is_installed("subrecon-missing-binary"));
    }
}
