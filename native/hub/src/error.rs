// VRouter 统一错误类型

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, VRouterError>;

#[derive(Debug, Error)]
pub enum VRouterError {
    // 配置校验失败（未知枚举值、缺失字段等），不会生成任何产物
    #[error("配置校验失败：{0}")]
    Validation(String),

    #[error("读取列表文件失败 {path:?}：{source}")]
    ListRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // 服务器地址无法解析时必须中止 iptables 生成，否则会形成回环
    #[error("无法解析服务器地址 {host}：{reason}")]
    Resolve { host: String, reason: String },

    #[error("远程命令执行失败：{command}\n{detail}")]
    Remote { command: String, detail: String },

    #[error("文件传输失败 {local:?} -> {remote}：{detail}")]
    Transfer {
        local: PathBuf,
        remote: String,
        detail: String,
    },

    #[error("{what} 在重试 {attempts} 次后仍然失败")]
    Retry { what: String, attempts: u32 },

    #[error("软件包安装失败：{}", .0.join(", "))]
    PackagesNotInstalled(Vec<String>),

    #[error("步骤 {step} 缺少前置步骤 {missing}")]
    StepOrder { step: String, missing: String },

    #[error("配置文件错误 {path:?}：{detail}")]
    Config { path: PathBuf, detail: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl VRouterError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}
