// 代理运行时信息：各代理角色的本地端口、配置文件名、服务名与二进制名。
// 属于部署元数据，不来自用户输入。

use serde::{Deserialize, Serialize};
use std::fmt;

use super::profile::{Profile, ProxyChain, ProxyTunnel, ProxyVariant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProxyRole {
    Shadowsocks,
    ShadowsocksR,
    Kcptun,
    TunnelDns(ProxyVariant),
    RelayUdp(ProxyVariant),
}

impl ProxyRole {
    // 停止顺序：先停依赖上游的附加角色，再停主代理，最后停 Kcptun
    pub const STOP_ORDER: [ProxyRole; 7] = [
        ProxyRole::RelayUdp(ProxyVariant::Shadowsocks),
        ProxyRole::RelayUdp(ProxyVariant::ShadowsocksR),
        ProxyRole::TunnelDns(ProxyVariant::Shadowsocks),
        ProxyRole::TunnelDns(ProxyVariant::ShadowsocksR),
        ProxyRole::Shadowsocks,
        ProxyRole::ShadowsocksR,
        ProxyRole::Kcptun,
    ];

    pub fn tcp(variant: ProxyVariant) -> Self {
        match variant {
            ProxyVariant::Shadowsocks => Self::Shadowsocks,
            ProxyVariant::ShadowsocksR => Self::ShadowsocksR,
        }
    }
}

impl fmt::Display for ProxyRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Shadowsocks => "shadowsocks",
            Self::ShadowsocksR => "shadowsocksr",
            Self::Kcptun => "kcptun",
            Self::TunnelDns(ProxyVariant::Shadowsocks) => "tunnelDns(ss)",
            Self::TunnelDns(ProxyVariant::ShadowsocksR) => "tunnelDns(ssr)",
            Self::RelayUdp(ProxyVariant::Shadowsocks) => "relayUDP(ss)",
            Self::RelayUdp(ProxyVariant::ShadowsocksR) => "relayUDP(ssr)",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleInfo {
    pub local_port: u16,
    pub cfg_name: String,
    pub service: String,
    pub binary: String,
    // rc.common 的 START 优先级
    pub start_priority: u8,
}

impl RoleInfo {
    fn new(local_port: u16, cfg_name: &str, service: &str, binary: &str, start_priority: u8) -> Self {
        Self {
            local_port,
            cfg_name: cfg_name.to_string(),
            service: service.to_string(),
            binary: binary.to_string(),
            start_priority,
        }
    }
}

// TCP 透明代理：经 Kcptun 时改为监听 over_kt_port
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TcpRoleInfo {
    #[serde(flatten)]
    pub info: RoleInfo,
    pub over_kt_port: u16,
}

// 依 ss / ssr 区分的角色信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flavored<T> {
    pub ss: T,
    pub ssr: T,
}

impl<T> Flavored<T> {
    pub fn get(&self, variant: ProxyVariant) -> &T {
        match variant {
            ProxyVariant::Shadowsocks => &self.ss,
            ProxyVariant::ShadowsocksR => &self.ssr,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyRuntimeInfo {
    pub shadowsocks: TcpRoleInfo,
    pub shadowsocksr: TcpRoleInfo,
    pub kcptun: RoleInfo,
    pub tunnel_dns: Flavored<RoleInfo>,
    #[serde(rename = "relayUDP")]
    pub relay_udp: Flavored<RoleInfo>,
    // tunnel DNS 转发的上游解析器
    pub tunnel_dns_upstream: String,
    // 经 Kcptun 时 Shadowsocks(R) 超时的下限（秒）
    pub over_kt_min_timeout: u32,
}

impl Default for ProxyRuntimeInfo {
    fn default() -> Self {
        Self {
            shadowsocks: TcpRoleInfo {
                info: RoleInfo::new(1010, "ss-client.json", "vrouter-ss", "ss-redir", 90),
                over_kt_port: 1090,
            },
            shadowsocksr: TcpRoleInfo {
                info: RoleInfo::new(1010, "ssr-client.json", "vrouter-ssr", "ssr-redir", 90),
                over_kt_port: 1090,
            },
            kcptun: RoleInfo::new(9000, "kt-client.json", "vrouter-kcptun", "kcptun", 88),
            tunnel_dns: Flavored {
                ss: RoleInfo::new(5353, "ss-dns.json", "vrouter-ss-dns", "ss-tunnel", 91),
                ssr: RoleInfo::new(5353, "ssr-dns.json", "vrouter-ssr-dns", "ssr-tunnel", 91),
            },
            relay_udp: Flavored {
                ss: RoleInfo::new(1060, "ss-udp.json", "vrouter-ss-udp", "ss-redir", 92),
                ssr: RoleInfo::new(1060, "ssr-udp.json", "vrouter-ssr-udp", "ssr-redir", 92),
            },
            tunnel_dns_upstream: "8.8.8.8:53".to_string(),
            over_kt_min_timeout: 50,
        }
    }
}

impl ProxyRuntimeInfo {
    pub fn role(&self, role: ProxyRole) -> &RoleInfo {
        match role {
            ProxyRole::Shadowsocks => &self.shadowsocks.info,
            ProxyRole::ShadowsocksR => &self.shadowsocksr.info,
            ProxyRole::Kcptun => &self.kcptun,
            ProxyRole::TunnelDns(variant) => self.tunnel_dns.get(variant),
            ProxyRole::RelayUdp(variant) => self.relay_udp.get(variant),
        }
    }

    pub fn tcp_role(&self, variant: ProxyVariant) -> &TcpRoleInfo {
        match variant {
            ProxyVariant::Shadowsocks => &self.shadowsocks,
            ProxyVariant::ShadowsocksR => &self.shadowsocksr,
        }
    }

    // iptables REDIRECT 的目标端口：当前生效的 TCP 透明代理监听端口
    pub fn redir_port(&self, chain: ProxyChain) -> u16 {
        let tcp = self.tcp_role(chain.variant);
        match chain.tunnel {
            ProxyTunnel::Direct => tcp.info.local_port,
            ProxyTunnel::Kcptun => tcp.over_kt_port,
        }
    }

    pub fn udp_redir_port(&self, variant: ProxyVariant) -> u16 {
        self.relay_udp.get(variant).local_port
    }

    // tunnel DNS 在 dnsmasq 中的上游写法：127.0.0.1#<port>
    pub fn tunnel_dns_address(&self, variant: ProxyVariant) -> String {
        format!("127.0.0.1#{}", self.tunnel_dns.get(variant).local_port)
    }

    // 配置档启用的角色，按启动依赖顺序排列
    pub fn active_roles(&self, profile: &Profile) -> Vec<ProxyRole> {
        let variant = profile.proxies.variant;
        let mut roles = Vec::with_capacity(4);
        if profile.proxies.uses_kcptun() {
            roles.push(ProxyRole::Kcptun);
        }
        roles.push(ProxyRole::tcp(variant));
        if profile.enable_tunnel_dns {
            roles.push(ProxyRole::TunnelDns(variant));
        }
        if profile.enable_relay_udp {
            roles.push(ProxyRole::RelayUdp(variant));
        }
        roles
    }
}
