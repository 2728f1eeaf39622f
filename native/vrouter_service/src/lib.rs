// VRouter 命令行
//
// 读取本地配置，生成路由器配置产物并通过 SSH 推送到 OpenWrt 路由器

pub mod logger;
pub mod ssh;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use thiserror::Error;

use vrouter_hub::RouterCoordinator;
use vrouter_hub::molecules::provisioning::ProgressReporter;
use vrouter_hub::molecules::router_config::BypassMode;
use vrouter_hub::services::{AppConfig, ConfigStore, path_service};

use ssh::OpenSshShell;

// 失败时附带输出的最近日志行数
const FAILURE_LOG_LINES: usize = 20;
const DEFAULT_LOG_LINES: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliCommand {
    Generate {
        profile: Option<String>,
        out_dir: Option<PathBuf>,
    },
    Apply {
        profile: Option<String>,
    },
    Mode {
        mode: BypassMode,
    },
    Provision,
    Status,
    Profiles,
    Logs {
        lines: usize,
    },
    Version,
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliArgs {
    pub config: Option<PathBuf>,
    pub command: CliCommand,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UsageError {
    #[error("{0} 需要一个参数")]
    MissingValue(&'static str),
    #[error("未知命令：{0}")]
    UnknownCommand(String),
    #[error("未知的绕行模式：{0}（可选 whitelist / blacklist / global / none）")]
    InvalidMode(String),
    #[error("无效的行数：{0}")]
    InvalidNumber(String),
    #[error("多余的参数：{0}")]
    UnexpectedArgument(String),
}

// args 不含程序名
pub fn parse_args(args: &[String]) -> std::result::Result<CliArgs, UsageError> {
    let mut config = None;
    let mut out_dir = None;
    let mut positional: Vec<&str> = Vec::new();

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                let value = iter.next().ok_or(UsageError::MissingValue("--config"))?;
                config = Some(PathBuf::from(value));
            }
            "--out" | "-o" => {
                let value = iter.next().ok_or(UsageError::MissingValue("--out"))?;
                out_dir = Some(PathBuf::from(value));
            }
            other => positional.push(other),
        }
    }

    let (name, rest) = match positional.split_first() {
        Some((name, rest)) => (*name, rest),
        None => {
            return Ok(CliArgs {
                config,
                command: CliCommand::Help,
            });
        }
    };

    let optional = |rest: &[&str]| -> std::result::Result<Option<String>, UsageError> {
        match rest {
            [] => Ok(None),
            [value] => Ok(Some(value.to_string())),
            [_, extra, ..] => Err(UsageError::UnexpectedArgument(extra.to_string())),
        }
    };

    let command = match name {
        "generate" => CliCommand::Generate {
            profile: optional(rest)?,
            out_dir,
        },
        "apply" => CliCommand::Apply {
            profile: optional(rest)?,
        },
        "mode" => {
            let raw = optional(rest)?.ok_or(UsageError::MissingValue("mode"))?;
            let mode = raw
                .parse::<BypassMode>()
                .map_err(|_| UsageError::InvalidMode(raw.clone()))?;
            CliCommand::Mode { mode }
        }
        "logs" => {
            let lines = match optional(rest)? {
                Some(raw) => raw
                    .parse::<usize>()
                    .map_err(|_| UsageError::InvalidNumber(raw.clone()))?,
                None => DEFAULT_LOG_LINES,
            };
            CliCommand::Logs { lines }
        }
        "provision" | "status" | "profiles" | "version" | "-v" | "--version" | "help"
        | "-h" | "--help" => {
            if let Some(extra) = rest.first() {
                return Err(UsageError::UnexpectedArgument(extra.to_string()));
            }
            match name {
                "provision" => CliCommand::Provision,
                "status" => CliCommand::Status,
                "profiles" => CliCommand::Profiles,
                "help" | "-h" | "--help" => CliCommand::Help,
                _ => CliCommand::Version,
            }
        }
        other => return Err(UsageError::UnknownCommand(other.to_string())),
    };

    Ok(CliArgs { config, command })
}

// 命令行入口
pub fn cli() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let parsed = match parse_args(&args) {
        Ok(parsed) => parsed,
        Err(e) => {
            eprintln!("错误: {}", e);
            println!();
            print_usage();
            std::process::exit(2);
        }
    };

    logger::init_logger();
    path_service::init();

    let runtime = tokio::runtime::Runtime::new().context("无法创建异步运行时")?;
    let result = runtime.block_on(handle_command(&parsed));
    if result.is_err() && is_remote_command(&parsed.command) {
        eprintln!();
        eprintln!("最近的日志：");
        for line in logger::get_recent_logs(FAILURE_LOG_LINES) {
            eprintln!("  {}", line);
        }
    }
    result
}

fn is_remote_command(command: &CliCommand) -> bool {
    matches!(
        command,
        CliCommand::Apply { .. } | CliCommand::Mode { .. } | CliCommand::Provision | CliCommand::Status
    )
}

// 打印使用说明
pub fn print_usage() {
    println!("VRouter v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("用法：vrouter [--config <路径>] <命令>");
    println!();
    println!("可用命令：");
    println!("  generate [配置档] [--out <目录>]  - 只生成配置产物，不推送");
    println!("  apply [配置档]                    - 生成并应用配置档");
    println!("  mode <模式>                       - 切换当前配置档的绕行模式");
    println!("  provision                         - 等待路由器就绪并安装软件包");
    println!("  status                            - 查看各代理进程状态");
    println!("  profiles                          - 列出配置档");
    println!("  logs [行数]                       - 查看最近的日志");
    println!("  version                           - 显示版本号");
    println!();
    println!("未指定配置档时使用 activeProfile；配置文件位置可由 VROUTER_CONFIG 覆盖");
}

fn config_store(args: &CliArgs) -> ConfigStore {
    match &args.config {
        Some(path) => ConfigStore::new(path),
        None => ConfigStore::at_default_location(),
    }
}

fn load_config(store: &ConfigStore) -> Result<AppConfig> {
    store
        .load()
        .with_context(|| format!("加载配置失败：{}", store.path().display()))
}

fn coordinator(config: &AppConfig) -> RouterCoordinator<OpenSshShell> {
    RouterCoordinator::new(OpenSshShell::new(&config.router), config.deploy_settings())
}

// 订阅进度并打印到标准输出
fn progress_printer() -> (ProgressReporter, tokio::task::JoinHandle<()>) {
    let (reporter, mut receiver) = ProgressReporter::channel();
    let handle = tokio::spawn(async move {
        while let Some(event) = receiver.recv().await {
            println!("{}", event);
        }
    });
    (reporter, handle)
}

// 处理命令
pub async fn handle_command(args: &CliArgs) -> Result<()> {
    match &args.command {
        CliCommand::Help => {
            print_usage();
            Ok(())
        }
        CliCommand::Version => {
            println!("VRouter v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        CliCommand::Logs { lines } => {
            let path = path_service::log_file();
            let tail = logger::read_log_tail(&path, *lines)
                .with_context(|| format!("读取日志失败：{}", path.display()))?;
            for line in tail {
                println!("{}", line);
            }
            Ok(())
        }
        CliCommand::Profiles => {
            let config = load_config(&config_store(args))?;
            if config.profiles.is_empty() {
                println!("尚未配置任何配置档");
            }
            for profile in &config.profiles {
                let marker = if config.active_profile.as_deref() == Some(profile.name.as_str()) {
                    "*"
                } else {
                    " "
                };
                println!("{} {} ({} / {})", marker, profile.name, profile.proxies, profile.mode);
            }
            Ok(())
        }
        CliCommand::Generate { profile, out_dir } => {
            let config = load_config(&config_store(args))?;
            let out_dir = out_dir.clone().unwrap_or_else(|| config.host.staging_dir.clone());
            let written = run_generate(&config, profile.as_deref(), &out_dir).await?;
            for (local, remote) in written {
                println!("{} -> {}", local.display(), remote);
            }
            Ok(())
        }
        CliCommand::Apply { profile } => {
            let store = config_store(args);
            let mut config = load_config(&store)?;
            let selected = config.select_profile(profile.as_deref())?.clone();

            let (reporter, printer) = progress_printer();
            let coordinator = coordinator(&config).with_progress(reporter);
            let result = coordinator.apply_profile(&selected).await;
            drop(coordinator);
            let _ = printer.await;
            result.with_context(|| format!("应用配置档 {} 失败", selected.name))?;

            config.active_profile = Some(selected.name.clone());
            store.save(&config).context("保存配置失败")?;
            println!("配置档 {} 已应用", selected.name);
            Ok(())
        }
        CliCommand::Mode { mode } => {
            let store = config_store(args);
            let mut config = load_config(&store)?;
            let active = config
                .active_profile()
                .cloned()
                .context("没有已应用的配置档，请先执行 apply")?;

            let (reporter, printer) = progress_printer();
            let coordinator = coordinator(&config).with_progress(reporter);
            coordinator.assume_committed(active.clone());
            let result = coordinator.change_mode(*mode).await;
            drop(coordinator);
            let _ = printer.await;
            let updated = result.with_context(|| format!("切换到 {} 模式失败", mode))?;

            if let Some(stored) = config.profiles.iter_mut().find(|p| p.name == updated.name) {
                stored.mode = updated.mode;
            }
            store.save(&config).context("保存配置失败")?;
            println!("配置档 {} 已切换到 {} 模式", updated.name, updated.mode);
            Ok(())
        }
        CliCommand::Provision => {
            let config = load_config(&config_store(args))?;
            let (reporter, printer) = progress_printer();
            let coordinator = coordinator(&config).with_progress(reporter);
            let result = coordinator.provision().await;
            drop(coordinator);
            let _ = printer.await;
            result.context("初始化路由器失败")?;
            println!("路由器初始化完成");
            Ok(())
        }
        CliCommand::Status => {
            let config = load_config(&config_store(args))?;
            let status = coordinator(&config)
                .service_status()
                .await
                .context("查询进程状态失败")?;
            for role in status {
                let state = if role.running { "运行中" } else { "未运行" };
                println!("{:<16} {:<18} {}", role.role.to_string(), role.service, state);
            }
            Ok(())
        }
    }
}

// 编译配置档并写入 out_dir，返回 (本地路径, 远程路径)
pub async fn run_generate(
    config: &AppConfig,
    profile: Option<&str>,
    out_dir: &Path,
) -> Result<Vec<(PathBuf, String)>> {
    let selected = config.select_profile(profile)?;
    let bundle = coordinator(config)
        .generate(selected)
        .await
        .with_context(|| format!("生成配置档 {} 失败", selected.name))?;
    let written = bundle
        .write_to(out_dir)
        .await
        .with_context(|| format!("写入 {} 失败", out_dir.display()))?;
    log::info!("已生成 {} 个文件到 {}", written.len(), out_dir.display());
    Ok(written
        .into_iter()
        .map(|(local, artifact)| (local, artifact.remote_path.clone()))
        .collect())
}
