// 路由配置档（Profile）：代理链、绕行模式、黑白名单选择与各代理连接参数

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::firewall_info::FirewallInfo;
use crate::atoms::ExtraOptions;
use crate::error::{Result, VRouterError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProxyVariant {
    Shadowsocks,
    ShadowsocksR,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProxyTunnel {
    Direct,
    Kcptun,
}

// 代理链：持久化时沿用 ss / ssr / ssKt / ssrKt 字符串
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProxyChain {
    pub variant: ProxyVariant,
    pub tunnel: ProxyTunnel,
}

impl ProxyChain {
    pub const SS: Self = Self::new(ProxyVariant::Shadowsocks, ProxyTunnel::Direct);
    pub const SSR: Self = Self::new(ProxyVariant::ShadowsocksR, ProxyTunnel::Direct);
    pub const SS_KT: Self = Self::new(ProxyVariant::Shadowsocks, ProxyTunnel::Kcptun);
    pub const SSR_KT: Self = Self::new(ProxyVariant::ShadowsocksR, ProxyTunnel::Kcptun);

    pub const fn new(variant: ProxyVariant, tunnel: ProxyTunnel) -> Self {
        Self { variant, tunnel }
    }

    pub fn uses_kcptun(&self) -> bool {
        self.tunnel == ProxyTunnel::Kcptun
    }

    pub fn as_str(&self) -> &'static str {
        match (self.variant, self.tunnel) {
            (ProxyVariant::Shadowsocks, ProxyTunnel::Direct) => "ss",
            (ProxyVariant::ShadowsocksR, ProxyTunnel::Direct) => "ssr",
            (ProxyVariant::Shadowsocks, ProxyTunnel::Kcptun) => "ssKt",
            (ProxyVariant::ShadowsocksR, ProxyTunnel::Kcptun) => "ssrKt",
        }
    }
}

impl FromStr for ProxyChain {
    type Err = VRouterError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ss" => Ok(Self::SS),
            "ssr" => Ok(Self::SSR),
            "ssKt" => Ok(Self::SS_KT),
            "ssrKt" => Ok(Self::SSR_KT),
            other => Err(VRouterError::validation(format!(
                "未知的代理链：{}（可选 ss / ssr / ssKt / ssrKt）",
                other
            ))),
        }
    }
}

impl TryFrom<String> for ProxyChain {
    type Error = VRouterError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ProxyChain> for String {
    fn from(chain: ProxyChain) -> Self {
        chain.as_str().to_string()
    }
}

impl fmt::Display for ProxyChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// 绕行模式
// whitelist：默认走代理，白名单直连
// blacklist：默认直连，黑名单走代理
// global：全部走代理
// none：不代理
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BypassMode {
    Whitelist,
    Blacklist,
    Global,
    None,
}

impl BypassMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Whitelist => "whitelist",
            Self::Blacklist => "blacklist",
            Self::Global => "global",
            Self::None => "none",
        }
    }
}

impl FromStr for BypassMode {
    type Err = VRouterError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "whitelist" => Ok(Self::Whitelist),
            "blacklist" => Ok(Self::Blacklist),
            "global" => Ok(Self::Global),
            "none" => Ok(Self::None),
            other => Err(VRouterError::validation(format!(
                "未知的绕行模式：{}（可选 whitelist / blacklist / global / none）",
                other
            ))),
        }
    }
}

impl fmt::Display for BypassMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_timeout() -> u32 {
    300
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShadowsocksParams {
    pub address: String,
    pub port: u16,
    pub password: String,
    #[serde(default = "default_timeout")]
    pub timeout: u32,
    pub method: String,
    #[serde(default)]
    pub fast_open: bool,
    #[serde(default)]
    pub others: ExtraOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShadowsocksrParams {
    #[serde(flatten)]
    pub base: ShadowsocksParams,
    pub protocol: String,
    #[serde(default)]
    pub protocol_param: String,
    pub obfs: String,
    #[serde(default)]
    pub obfs_param: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KcptunParams {
    pub address: String,
    pub port: u16,
    pub key: String,
    #[serde(default = "default_kcptun_crypt")]
    pub crypt: String,
    #[serde(default = "default_kcptun_mode")]
    pub mode: String,
    #[serde(default)]
    pub others: ExtraOptions,
}

fn default_kcptun_crypt() -> String {
    "aes".to_string()
}

fn default_kcptun_mode() -> String {
    "fast".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub name: String,
    pub proxies: ProxyChain,
    pub mode: BypassMode,
    #[serde(default)]
    pub enable_tunnel_dns: bool,
    #[serde(default, rename = "enableRelayUDP")]
    pub enable_relay_udp: bool,
    #[serde(default)]
    pub selected_blacklists: Vec<String>,
    #[serde(default)]
    pub selected_whitelists: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shadowsocks: Option<ShadowsocksParams>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shadowsocksr: Option<ShadowsocksrParams>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kcptun: Option<KcptunParams>,
    #[serde(default, rename = "serverSSHPort", skip_serializing_if = "Option::is_none")]
    pub server_ssh_port: Option<u16>,
    #[serde(default, rename = "speedupServerSSH")]
    pub speedup_server_ssh: bool,
}

impl Profile {
    // 当前生效的 Shadowsocks(R) 基础参数：由代理链的 variant 唯一决定
    pub fn base_proxy(&self) -> Result<&ShadowsocksParams> {
        match self.proxies.variant {
            ProxyVariant::Shadowsocks => self.shadowsocks.as_ref().ok_or_else(|| {
                VRouterError::validation(format!("配置档 {} 缺少 shadowsocks 参数", self.name))
            }),
            ProxyVariant::ShadowsocksR => self
                .shadowsocksr
                .as_ref()
                .map(|ssr| &ssr.base)
                .ok_or_else(|| {
                    VRouterError::validation(format!(
                        "配置档 {} 缺少 shadowsocksr 参数",
                        self.name
                    ))
                }),
        }
    }

    pub fn shadowsocksr_params(&self) -> Result<&ShadowsocksrParams> {
        self.shadowsocksr.as_ref().ok_or_else(|| {
            VRouterError::validation(format!("配置档 {} 缺少 shadowsocksr 参数", self.name))
        })
    }

    // 仅当代理链经过 Kcptun 时返回 Some
    pub fn kcptun_params(&self) -> Result<Option<&KcptunParams>> {
        if !self.proxies.uses_kcptun() {
            return Ok(None);
        }
        self.kcptun.as_ref().map(Some).ok_or_else(|| {
            VRouterError::validation(format!(
                "配置档 {} 使用 {} 但缺少 kcptun 参数",
                self.name, self.proxies
            ))
        })
    }

    // 生成前校验，任何一项失败都不会产生部分产物
    pub fn validate(&self, firewall: &FirewallInfo) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(VRouterError::validation("配置档名称不能为空"));
        }

        let base = self.base_proxy()?;
        check_endpoint(&self.name, "shadowsocks", &base.address, base.port)?;
        if self.proxies.variant == ProxyVariant::ShadowsocksR {
            let ssr = self.shadowsocksr_params()?;
            if ssr.protocol.trim().is_empty() || ssr.obfs.trim().is_empty() {
                return Err(VRouterError::validation(format!(
                    "配置档 {} 的 shadowsocksr 缺少 protocol/obfs",
                    self.name
                )));
            }
        }

        if let Some(kcptun) = self.kcptun_params()? {
            check_endpoint(&self.name, "kcptun", &kcptun.address, kcptun.port)?;
        }

        if self.speedup_server_ssh {
            if !self.proxies.uses_kcptun() {
                log::warn!(
                    "配置档 {} 启用了 SSH 加速但代理链 {} 未使用 Kcptun，该选项将被忽略",
                    self.name,
                    self.proxies
                );
            } else if self.server_ssh_port.unwrap_or(0) == 0 {
                return Err(VRouterError::validation(format!(
                    "配置档 {} 启用了 SSH 加速但未设置 serverSSHPort",
                    self.name
                )));
            }
        }

        for key in self
            .selected_blacklists
            .iter()
            .chain(self.selected_whitelists.iter())
        {
            if !firewall.lists.contains_key(key) {
                return Err(VRouterError::validation(format!(
                    "配置档 {} 引用了未知的列表：{}",
                    self.name, key
                )));
            }
        }

        Ok(())
    }
}

fn check_endpoint(profile: &str, role: &str, address: &str, port: u16) -> Result<()> {
    if address.trim().is_empty() {
        return Err(VRouterError::validation(format!(
            "配置档 {} 的 {} 服务器地址为空",
            profile, role
        )));
    }
    if port == 0 {
        return Err(VRouterError::validation(format!(
            "配置档 {} 的 {} 服务器端口无效",
            profile, role
        )));
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_profile() -> Profile {
        Profile {
            name: "kcptun-whitelist".to_string(),
            proxies: ProxyChain::SS_KT,
            mode: BypassMode::Whitelist,
            enable_tunnel_dns: true,
            enable_relay_udp: false,
            selected_blacklists: vec!["gfwDomains".to_string(), "extraBlackList".to_string()],
            selected_whitelists: vec![
                "chinaIPs".to_string(),
                "lanNetworks".to_string(),
                "extraWhiteList".to_string(),
            ],
            shadowsocks: Some(ShadowsocksParams {
                address: "1.2.3.4".to_string(),
                port: 8989,
                password: "secret".to_string(),
                timeout: 300,
                method: "chacha20-ietf-poly1305".to_string(),
                fast_open: true,
                others: ExtraOptions::default(),
            }),
            shadowsocksr: Some(ShadowsocksrParams {
                base: ShadowsocksParams {
                    address: "1.2.3.4".to_string(),
                    port: 8990,
                    password: "secret".to_string(),
                    timeout: 300,
                    method: "aes-256-cfb".to_string(),
                    fast_open: false,
                    others: ExtraOptions::default(),
                },
                protocol: "auth_aes128_md5".to_string(),
                protocol_param: String::new(),
                obfs: "tls1.2_ticket_auth".to_string(),
                obfs_param: String::new(),
            }),
            kcptun: Some(KcptunParams {
                address: "1.2.3.4".to_string(),
                port: 8989,
                key: "kcp-secret".to_string(),
                crypt: "aes".to_string(),
                mode: "fast2".to_string(),
                others: ExtraOptions::parse("sndwnd=256;rcvwnd=2048;nocomp=true"),
            }),
            server_ssh_port: Some(22),
            speedup_server_ssh: false,
        }
    }

    #[test]
    fn test_proxy_chain_round_trips_legacy_strings() {
        for raw in ["ss", "ssr", "ssKt", "ssrKt"] {
            let chain: ProxyChain = raw.parse().unwrap();
            assert_eq!(chain.as_str(), raw);
        }
        assert!(ProxyChain::SSR_KT.uses_kcptun());
        assert_eq!(ProxyChain::SSR.variant, ProxyVariant::ShadowsocksR);
    }

    #[test]
    fn test_unknown_enum_values_are_validation_errors() {
        assert!(matches!(
            "ssKcp".parse::<ProxyChain>(),
            Err(VRouterError::Validation(_))
        ));
        assert!(matches!(
            "smart".parse::<BypassMode>(),
            Err(VRouterError::Validation(_))
        ));

        let json = r#"{"name":"x","proxies":"v2ray","mode":"global"}"#;
        assert!(serde_json::from_str::<Profile>(json).is_err());
    }

    #[test]
    fn test_profile_json_uses_legacy_field_names() {
        let profile = sample_profile();
        let json = serde_json::to_value(&profile).unwrap();
        assert_eq!(json["proxies"], "ssKt");
        assert_eq!(json["mode"], "whitelist");
        assert_eq!(json["serverSSHPort"], 22);
        assert_eq!(json["enableRelayUDP"], false);
        assert_eq!(json["kcptun"]["others"], "sndwnd=256;rcvwnd=2048;nocomp=true");

        let back: Profile = serde_json::from_value(json).unwrap();
        assert_eq!(back, profile);
    }

    #[test]
    fn test_base_proxy_follows_variant() {
        let mut profile = sample_profile();
        assert_eq!(profile.base_proxy().unwrap().port, 8989);

        profile.proxies = ProxyChain::SSR;
        assert_eq!(profile.base_proxy().unwrap().port, 8990);
        assert!(profile.kcptun_params().unwrap().is_none());
    }

    #[test]
    fn test_validate_rejects_missing_kcptun_and_unknown_list() {
        let firewall = FirewallInfo::default();
        let mut profile = sample_profile();
        assert!(profile.validate(&firewall).is_ok());

        profile.kcptun = None;
        assert!(matches!(
            profile.validate(&firewall),
            Err(VRouterError::Validation(_))
        ));

        let mut profile = sample_profile();
        profile.selected_blacklists.push("nonexistent".to_string());
        assert!(profile.validate(&firewall).is_err());
    }

    #[test]
    fn test_validate_requires_ssh_port_for_speedup() {
        let firewall = FirewallInfo::default();
        let mut profile = sample_profile();
        profile.speedup_server_ssh = true;
        profile.server_ssh_port = None;
        assert!(profile.validate(&firewall).is_err());
    }
}
