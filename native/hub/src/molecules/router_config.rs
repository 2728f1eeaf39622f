// 路由配置数据模型分子模块

pub mod firewall_info;
pub mod profile;
pub mod remote_layout;
pub mod runtime_info;

pub use firewall_info::{FirewallInfo, IpsetNames, LAN_NETWORKS};
pub use profile::{
    BypassMode, KcptunParams, Profile, ProxyChain, ProxyTunnel, ProxyVariant, ShadowsocksParams,
    ShadowsocksrParams,
};
pub use remote_layout::{RemoteLayout, join_remote};
pub use runtime_info::{Flavored, ProxyRole, ProxyRuntimeInfo, RoleInfo, TcpRoleInfo};
