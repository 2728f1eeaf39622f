// 基于 OpenSSH 客户端的远程执行：ssh 执行命令，scp 上传文件

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

use vrouter_hub::atoms::{CommandOutput, RemoteShell};
use vrouter_hub::error::{Result, VRouterError};
use vrouter_hub::services::RouterEndpoint;

#[derive(Debug, Clone)]
pub struct OpenSshShell {
    destination: String,
    port: u16,
    identity_file: Option<PathBuf>,
    connect_timeout_secs: u64,
    // OpenWrt 的 dropbear 没有 sftp-server，新版 scp 需要 -O 走旧协议
    legacy_scp: bool,
}

impl OpenSshShell {
    pub fn new(endpoint: &RouterEndpoint) -> Self {
        Self {
            destination: format!("{}@{}", endpoint.username, endpoint.address),
            port: endpoint.ssh_port,
            identity_file: endpoint.identity_file.clone(),
            connect_timeout_secs: endpoint.connect_timeout_secs,
            legacy_scp: true,
        }
    }

    pub fn with_legacy_scp(mut self, enabled: bool) -> Self {
        self.legacy_scp = enabled;
        self
    }

    fn common_options(&self) -> Vec<String> {
        let mut args = vec![
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.connect_timeout_secs),
            "-o".to_string(),
            "StrictHostKeyChecking=accept-new".to_string(),
        ];
        if let Some(identity) = &self.identity_file {
            args.push("-i".to_string());
            args.push(identity.display().to_string());
        }
        args
    }

    fn ssh_args(&self, command: &str) -> Vec<String> {
        let mut args = vec!["-p".to_string(), self.port.to_string()];
        args.extend(self.common_options());
        args.push(self.destination.clone());
        args.push(command.to_string());
        args
    }

    // scp 的端口参数是大写 -P
    fn scp_args(&self, local: &Path, remote: &str) -> Vec<String> {
        let mut args = vec!["-q".to_string()];
        if self.legacy_scp {
            args.push("-O".to_string());
        }
        args.push("-P".to_string());
        args.push(self.port.to_string());
        args.extend(self.common_options());
        args.push(local.display().to_string());
        args.push(format!("{}:{}", self.destination, remote));
        args
    }
}

#[async_trait]
impl RemoteShell for OpenSshShell {
    async fn execute(&self, command: &str) -> Result<CommandOutput> {
        let output = Command::new("ssh")
            .args(self.ssh_args(command))
            .stdin(Stdio::null())
            .output()
            .await?;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
        })
    }

    async fn copy(&self, local: &Path, remote: &str) -> Result<()> {
        let output = Command::new("scp")
            .args(self.scp_args(local, remote))
            .stdin(Stdio::null())
            .output()
            .await?;

        if output.status.success() {
            Ok(())
        } else {
            Err(VRouterError::Transfer {
                local: local.to_path_buf(),
                remote: remote.to_string(),
                detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint() -> RouterEndpoint {
        RouterEndpoint {
            address: "10.0.0.1".to_string(),
            ssh_port: 2222,
            identity_file: Some(PathBuf::from("/home/u/.ssh/router")),
            ..RouterEndpoint::default()
        }
    }

    #[test]
    fn test_ssh_args() {
        let shell = OpenSshShell::new(&endpoint());
        let args = shell.ssh_args("ps -w");
        assert_eq!(&args[..2], ["-p", "2222"]);
        assert!(args.contains(&"ConnectTimeout=10".to_string()));
        assert!(args.windows(2).any(|w| w == ["-i", "/home/u/.ssh/router"]));
        assert_eq!(&args[args.len() - 2..], ["root@10.0.0.1", "ps -w"]);
    }

    #[test]
    fn test_scp_args_use_uppercase_port_and_legacy_protocol() {
        let shell = OpenSshShell::new(&endpoint());
        let args = shell.scp_args(Path::new("/tmp/stage/firewall.user"), "/etc/firewall.user.vrouter-new");
        assert_eq!(&args[..4], ["-q", "-O", "-P", "2222"]);
        assert_eq!(
            args.last().map(String::as_str),
            Some("root@10.0.0.1:/etc/firewall.user.vrouter-new")
        );

        let modern = shell.with_legacy_scp(false);
        let args = modern.scp_args(Path::new("/tmp/a"), "/b");
        assert!(!args.contains(&"-O".to_string()));
    }
}
