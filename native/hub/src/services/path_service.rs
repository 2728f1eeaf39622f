// 本地文件路径管理服务，单例模式
// 负责配置文件、列表目录与暂存目录的定位，避免路径逻辑分散

use once_cell::sync::Lazy;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

// 覆盖默认配置文件位置的环境变量
pub const CONFIG_ENV: &str = "VROUTER_CONFIG";

const APP_DIR: &str = "vrouter";
const CONFIG_FILE: &str = "config.json";

// 路径服务单例
pub static PATH_SERVICE: Lazy<RwLock<PathService>> = Lazy::new(|| {
    let service = PathService::new().unwrap_or_else(|e| {
        eprintln!("[PathService] 初始化失败：{}，使用降级路径", e);
        PathService::fallback()
    });
    RwLock::new(service)
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathService {
    config_file: PathBuf,

    // 用户维护的列表文件
    list_dir: PathBuf,

    // 随包分发的默认列表，用户目录缺文件时回退到这里
    template_dir: PathBuf,

    // 上传前的本地暂存目录
    staging_dir: PathBuf,

    // 日志文件路径
    log_file: PathBuf,
}

impl PathService {
    pub fn new() -> Result<Self, String> {
        let config_dir = dirs::config_dir().ok_or_else(|| "无法获取用户配置目录".to_string())?;
        let data_dir = dirs::data_dir()
            .ok_or_else(|| "无法获取用户数据目录".to_string())?
            .join(APP_DIR);

        let config_file = resolve_config_file(std::env::var_os(CONFIG_ENV), &config_dir);

        Ok(Self {
            config_file,
            list_dir: data_dir.join("lists"),
            template_dir: data_dir.join("templates"),
            staging_dir: std::env::temp_dir().join("vrouter-staging"),
            log_file: data_dir.join("vrouter.log"),
        })
    }

    // 降级路径（初始化失败时使用）
    fn fallback() -> Self {
        let current_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let config_file = resolve_config_file(std::env::var_os(CONFIG_ENV), &current_dir);

        Self {
            config_file,
            list_dir: current_dir.join("lists"),
            template_dir: current_dir.join("templates"),
            staging_dir: current_dir.join("staging"),
            log_file: current_dir.join("vrouter.log"),
        }
    }

    pub fn config_file(&self) -> &PathBuf {
        &self.config_file
    }

    pub fn list_dir(&self) -> &PathBuf {
        &self.list_dir
    }

    pub fn template_dir(&self) -> &PathBuf {
        &self.template_dir
    }

    pub fn staging_dir(&self) -> &PathBuf {
        &self.staging_dir
    }

    pub fn log_file(&self) -> &PathBuf {
        &self.log_file
    }

    // 确保列表目录、配置目录与日志目录存在
    pub fn ensure_dirs(&self) -> Result<(), String> {
        let mut dirs = vec![self.list_dir.clone()];
        dirs.extend(self.config_file.parent().map(Path::to_path_buf));
        dirs.extend(self.log_file.parent().map(Path::to_path_buf));

        for dir in &dirs {
            if !dir.as_os_str().is_empty() && !dir.exists() {
                std::fs::create_dir_all(dir)
                    .map_err(|e| format!("无法创建目录 {}：{}", dir.display(), e))?;
                log::debug!("已创建目录：{}", dir.display());
            }
        }

        Ok(())
    }
}

// 环境变量非空时优先，否则为 <config_dir>/vrouter/config.json
pub fn resolve_config_file(env_override: Option<OsString>, config_dir: &Path) -> PathBuf {
    match env_override {
        Some(path) if !path.is_empty() => PathBuf::from(path),
        _ => config_dir.join(APP_DIR).join(CONFIG_FILE),
    }
}

// 便捷访问函数

pub fn config_file() -> PathBuf {
    PATH_SERVICE
        .read()
        .map(|s| s.config_file().clone())
        .unwrap_or_else(|_| PathBuf::from(CONFIG_FILE))
}

pub fn list_dir() -> PathBuf {
    PATH_SERVICE
        .read()
        .map(|s| s.list_dir().clone())
        .unwrap_or_else(|_| PathBuf::from("lists"))
}

pub fn template_dir() -> PathBuf {
    PATH_SERVICE
        .read()
        .map(|s| s.template_dir().clone())
        .unwrap_or_else(|_| PathBuf::from("templates"))
}

pub fn staging_dir() -> PathBuf {
    PATH_SERVICE
        .read()
        .map(|s| s.staging_dir().clone())
        .unwrap_or_else(|_| PathBuf::from("staging"))
}

pub fn log_file() -> PathBuf {
    PATH_SERVICE
        .read()
        .map(|s| s.log_file().clone())
        .unwrap_or_else(|_| PathBuf::from("vrouter.log"))
}

// 初始化路径服务（预加载单例，创建必要目录）
pub fn init() {
    Lazy::force(&PATH_SERVICE);

    if let Err(e) = ensure_dirs() {
        log::error!("创建必要目录失败：{}", e);
    }

    log::debug!("PathService 已初始化");
}

pub fn ensure_dirs() -> Result<(), String> {
    PATH_SERVICE
        .read()
        .map_err(|e| format!("无法获取路径服务锁：{}", e))?
        .ensure_dirs()
}
