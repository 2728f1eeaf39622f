// 本地服务：配置持久化与路径管理

pub mod config_store;
pub mod path_service;

pub use config_store::{AppConfig, ConfigStore, HostPaths, RouterEndpoint};
