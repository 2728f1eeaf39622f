// 持久化配置：配置档列表、当前配置档、部署元数据与路由器连接信息
// 整个 JSON 文档一次读取、一次写回

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::path_service;
use crate::atoms::ListDirs;
use crate::coordinator::DeploySettings;
use crate::error::{Result, VRouterError};
use crate::molecules::provisioning::service_plan::DEFAULT_PACKAGES;
use crate::molecules::router_config::{FirewallInfo, Profile, ProxyRuntimeInfo, RemoteLayout};

pub const CONFIG_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HostPaths {
    pub list_dir: PathBuf,
    pub template_dir: PathBuf,
    pub staging_dir: PathBuf,
}

impl Default for HostPaths {
    fn default() -> Self {
        Self {
            list_dir: path_service::list_dir(),
            template_dir: path_service::template_dir(),
            staging_dir: path_service::staging_dir(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RouterEndpoint {
    pub address: String,
    pub ssh_port: u16,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity_file: Option<PathBuf>,
    pub remote_cfg_dir: String,
    pub connect_timeout_secs: u64,
    pub packages: Vec<String>,
}

impl Default for RouterEndpoint {
    fn default() -> Self {
        Self {
            address: "192.168.1.1".to_string(),
            ssh_port: 22,
            username: "root".to_string(),
            identity_file: None,
            remote_cfg_dir: RemoteLayout::default().cfg_dir,
            connect_timeout_secs: 10,
            packages: DEFAULT_PACKAGES.iter().map(|p| p.to_string()).collect(),
        }
    }
}

impl RouterEndpoint {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    pub version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_profile: Option<String>,
    pub profiles: Vec<Profile>,
    pub proxies_info: ProxyRuntimeInfo,
    pub firewall_info: FirewallInfo,
    pub host: HostPaths,
    pub router: RouterEndpoint,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            active_profile: None,
            profiles: Vec::new(),
            proxies_info: ProxyRuntimeInfo::default(),
            firewall_info: FirewallInfo::default(),
            host: HostPaths::default(),
            router: RouterEndpoint::default(),
        }
    }
}

impl AppConfig {
    pub fn profile(&self, name: &str) -> Option<&Profile> {
        self.profiles.iter().find(|p| p.name == name)
    }

    /// 按名称取配置档；未指定名称时取 activeProfile
    pub fn select_profile(&self, name: Option<&str>) -> Result<&Profile> {
        let name = name
            .or(self.active_profile.as_deref())
            .ok_or_else(|| VRouterError::validation("未指定配置档且没有 activeProfile"))?;
        self.profile(name)
            .ok_or_else(|| VRouterError::validation(format!("配置档不存在：{}", name)))
    }

    pub fn active_profile(&self) -> Option<&Profile> {
        self.active_profile
            .as_deref()
            .and_then(|name| self.profile(name))
    }

    pub fn remote_layout(&self) -> RemoteLayout {
        RemoteLayout {
            cfg_dir: self.router.remote_cfg_dir.clone(),
            ..RemoteLayout::default()
        }
    }

    pub fn deploy_settings(&self) -> DeploySettings {
        let lists = ListDirs::new(&self.host.list_dir, &self.host.template_dir);
        let mut settings = DeploySettings::new(lists, &self.host.staging_dir);
        settings.runtime = self.proxies_info.clone();
        settings.firewall = self.firewall_info.clone();
        settings.layout = self.remote_layout();
        settings.packages = self.router.packages.clone();
        settings
    }

    // 名称唯一、activeProfile 存在、每个配置档通过校验
    pub fn validate(&self) -> Result<()> {
        for (i, profile) in self.profiles.iter().enumerate() {
            if self.profiles[..i].iter().any(|p| p.name == profile.name) {
                return Err(VRouterError::validation(format!(
                    "配置档名称重复：{}",
                    profile.name
                )));
            }
            profile.validate(&self.firewall_info)?;
        }
        if let Some(active) = &self.active_profile
            && self.profile(active).is_none()
        {
            return Err(VRouterError::validation(format!(
                "activeProfile 指向不存在的配置档：{}",
                active
            )));
        }
        Ok(())
    }
}

pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    // 默认位置，见 path_service
    pub fn at_default_location() -> Self {
        Self::new(path_service::config_file())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 文件不存在时返回默认配置
    pub fn load(&self) -> Result<AppConfig> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("配置文件 {:?} 不存在，使用默认配置", self.path);
                return Ok(AppConfig::default());
            }
            Err(e) => return Err(self.config_error(format!("读取失败：{}", e))),
        };

        let config: AppConfig = serde_json::from_str(&content)
            .map_err(|e| self.config_error(format!("解析失败：{}", e)))?;
        config.validate()?;
        log::debug!(
            "已加载配置 {:?}，共 {} 个配置档",
            self.path,
            config.profiles.len()
        );
        Ok(config)
    }

    // 先写临时文件再改名，中途失败不会留下半个配置文件
    pub fn save(&self, config: &AppConfig) -> Result<()> {
        config.validate()?;
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let mut content = serde_json::to_string_pretty(config)?;
        content.push('\n');

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, &self.path)
            .map_err(|e| self.config_error(format!("写回失败：{}", e)))?;
        log::debug!("配置已保存到 {:?}", self.path);
        Ok(())
    }

    fn config_error(&self, detail: String) -> VRouterError {
        VRouterError::Config {
            path: self.path.clone(),
            detail,
        }
    }
}
