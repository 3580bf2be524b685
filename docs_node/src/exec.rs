//! Running file contents for EXEC.
//!
//! `ShellExecutor` hands the text to `sh -c` with the name server's
//! privileges. Anyone with read access to a file can run it, so deployments
//! that do not trust their users should plug in a sandboxed [`Executor`].

use std::fmt::Debug;

use tokio::process::Command;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutput {
    pub success: bool,
    /// stdout followed by stderr.
    pub output: String,
}

#[async_trait::async_trait]
pub trait Executor: Send + Sync + Debug {
    async fn run(&self, script: &str) -> anyhow::Result<ExecOutput>;
}

#[derive(Debug, Clone, Default)]
pub struct ShellExecutor;

#[async_trait::async_trait]
impl Executor for ShellExecutor {
    async fn run(&self, script: &str) -> anyhow::Result<ExecOutput> {
        let out = Command::new("sh")
            .arg("-c")
            .arg(script)
            .kill_on_drop(true)
            .output()
            .await?;
        let mut output = String::from_utf8_lossy(&out.stdout).into_owned();
        output.push_str(&String::from_utf8_lossy(&out.stderr));
        Ok(ExecOutput {
            success: out.status.success(),
            output,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_output_and_status() {
        let ok = ShellExecutor.run("echo hello").await.unwrap();
        assert!(ok.success);
        assert_eq!(ok.output, "hello\n");

        let failed = ShellExecutor.run("echo oops >&2; exit 3").await.unwrap();
        assert!(!failed.success);
        assert_eq!(failed.output, "oops\n");
    }
}
