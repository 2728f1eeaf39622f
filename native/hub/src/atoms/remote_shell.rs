// 远程执行能力：在路由器上执行命令与传输文件。
// 具体传输（ssh/scp）由调用方注入，这里只定义接口与结果判定。

use async_trait::async_trait;
use std::path::Path;

use crate::error::Result;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    // None 表示被信号终止
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: Some(0),
        }
    }

    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            exit_code: Some(code),
        }
    }

    // 默认规则：退出码非零或 stderr 有内容即失败；
    // tolerate_stderr 用于成功时也会写 stderr 的命令
    pub fn is_success(&self, tolerate_stderr: bool) -> bool {
        let exit_ok = self.exit_code == Some(0);
        exit_ok && (tolerate_stderr || self.stderr.trim().is_empty())
    }

    pub fn describe_failure(&self) -> String {
        let code = match self.exit_code {
            Some(code) => code.to_string(),
            None => "信号终止".to_string(),
        };
        format!("退出码：{}，stderr：{}", code, self.stderr.trim())
    }
}

// 单个路由器的会话句柄；命令不可并发复用同一会话，由调用方串行化
#[async_trait]
pub trait RemoteShell: Send + Sync {
    async fn execute(&self, command: &str) -> Result<CommandOutput>;

    async fn copy(&self, local: &Path, remote: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stderr_fails_unless_tolerated() {
        let output = CommandOutput {
            stdout: String::new(),
            stderr: "Warning: Section @zone[1] has no forward".to_string(),
            exit_code: Some(0),
        };
        assert!(!output.is_success(false));
        assert!(output.is_success(true));
    }

    #[test]
    fn test_nonzero_exit_always_fails() {
        let output = CommandOutput::failed(1, "");
        assert!(!output.is_success(true));
        assert!(CommandOutput::ok("done").is_success(false));
    }
}
