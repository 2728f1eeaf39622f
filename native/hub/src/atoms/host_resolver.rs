// 服务器地址解析：生成 iptables 规则前把域名解析为 IPv4 地址
//
// 解析是异步的，在编译之前一次完成；编译器只查 ResolvedHosts 表，不做任何 IO。

use async_trait::async_trait;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};

use crate::error::{Result, VRouterError};

#[async_trait]
pub trait HostResolver: Send + Sync {
    async fn resolve(&self, host: &str) -> Result<Vec<Ipv4Addr>>;
}

// 使用系统解析器（tokio::net::lookup_host，不阻塞运行时线程）
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemResolver;

#[async_trait]
impl HostResolver for SystemResolver {
    async fn resolve(&self, host: &str) -> Result<Vec<Ipv4Addr>> {
        if let Some(ip) = parse_literal(host)? {
            return Ok(vec![ip]);
        }

        let addrs = tokio::net::lookup_host((host, 0))
            .await
            .map_err(|e| VRouterError::Resolve {
                host: host.to_string(),
                reason: e.to_string(),
            })?;

        let mut ips: Vec<Ipv4Addr> = Vec::new();
        for addr in addrs {
            if let IpAddr::V4(ip) = addr.ip()
                && !ips.contains(&ip)
            {
                ips.push(ip);
            }
        }

        if ips.is_empty() {
            return Err(VRouterError::Resolve {
                host: host.to_string(),
                reason: "没有可用的 IPv4 地址".to_string(),
            });
        }

        log::debug!("解析 {} → {:?}", host, ips);
        Ok(ips)
    }
}

// 主机名到地址的固定映射。既是编译器的输入，也可直接当作离线解析器使用
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ResolvedHosts {
    table: HashMap<String, Vec<Ipv4Addr>>,
}

impl ResolvedHosts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, host: &str, ips: &[Ipv4Addr]) -> Self {
        self.table.insert(host.to_string(), ips.to_vec());
        self
    }

    // 依次解析 hosts，任何一个失败即整体失败；IP 字面量不进表
    pub async fn resolve_all(resolver: &dyn HostResolver, hosts: &[&str]) -> Result<Self> {
        let mut resolved = Self::new();
        for &host in hosts {
            if parse_literal(host)?.is_some() || resolved.table.contains_key(host) {
                continue;
            }
            let ips = resolver.resolve(host).await?;
            resolved.table.insert(host.to_string(), ips);
        }
        Ok(resolved)
    }

    pub fn lookup(&self, host: &str) -> Result<Vec<Ipv4Addr>> {
        if let Some(ip) = parse_literal(host)? {
            return Ok(vec![ip]);
        }
        self.table
            .get(host)
            .filter(|ips| !ips.is_empty())
            .cloned()
            .ok_or_else(|| VRouterError::Resolve {
                host: host.to_string(),
                reason: "未知主机".to_string(),
            })
    }
}

#[async_trait]
impl HostResolver for ResolvedHosts {
    async fn resolve(&self, host: &str) -> Result<Vec<Ipv4Addr>> {
        self.lookup(host)
    }
}

// IP 字面量不走解析；IPv6 字面量无法写入 IPv4 规则，直接报错
fn parse_literal(host: &str) -> Result<Option<Ipv4Addr>> {
    match host.trim().parse::<IpAddr>() {
        Ok(IpAddr::V4(ip)) => Ok(Some(ip)),
        Ok(IpAddr::V6(_)) => Err(VRouterError::Resolve {
            host: host.to_string(),
            reason: "仅支持 IPv4 服务器地址".to_string(),
        }),
        Err(_) => Ok(None),
    }
}
