// iptables NAT 规则脚本生成
//
// 每条规则都成对输出到 PREROUTING（局域网来的流量）与 OUTPUT（路由器自身流量）。
// 规则按顺序自上而下匹配，RETURN 先命中即放行：
// 1. 脚本头与 ipset 引导
// 2. 可选的 SSH 加速
// 3. 放行代理服务器自身地址（必须在任何 REDIRECT 之前，否则流量回环）
// 4. 放行本机回环：经 Kcptun 时 ss/ssr 连接的是 127.0.0.1 上的 Kcptun 客户端
// 5. 放行局域网
// 6. 按绕行模式输出主体规则
//
// SSH 加速是唯一排在服务器放行之前的 REDIRECT，只匹配 Kcptun 服务器的 SSH 端口。

use std::net::Ipv4Addr;

use super::CompileInput;
use crate::atoms::ResolvedHosts;
use crate::error::{Result, VRouterError};
use crate::molecules::router_config::{BypassMode, Profile};

// 成对规则写入器，保证 PREROUTING/OUTPUT 两条规则体完全一致
#[derive(Default)]
struct RuleWriter {
    lines: Vec<String>,
}

impl RuleWriter {
    fn raw(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    fn pair(&mut self, rule: &str) {
        for chain in ["PREROUTING", "OUTPUT"] {
            self.lines.push(format!("iptables -t nat -A {} {}", chain, rule));
        }
    }

    fn finish(self) -> String {
        let mut script = self.lines.join("\n");
        script.push('\n');
        script
    }
}

// 回环网段
const LOOPBACK_NET: &str = "127.0.0.0/8";

pub fn gen_iptables_file(input: &CompileInput<'_>, hosts: &ResolvedHosts) -> Result<String> {
    let profile = input.profile;
    let ipsets = &input.firewall.ipsets;
    let redir_port = input.runtime.redir_port(profile.proxies);
    let udp_port = profile
        .enable_relay_udp
        .then(|| input.runtime.udp_redir_port(profile.proxies.variant));

    // 查表放在最前面，失败时不产生任何输出
    let server_ips = resolve_servers(profile, hosts)?;

    let mut w = RuleWriter::default();
    w.raw("#!/bin/sh");
    w.raw(format!("# proxies: {}", profile.proxies));
    w.raw(format!("# mode: {}", profile.mode));
    w.raw("ipset flush");
    w.raw(format!(
        "ipset restore -f -! {}",
        input.layout.cfg_path(&input.firewall.ipset_file)
    ));

    if let Some(kcptun) = profile.kcptun_params()?
        && profile.speedup_server_ssh
        && let Some(ssh_port) = profile.server_ssh_port
    {
        for ip in hosts.lookup(&kcptun.address)? {
            w.pair(&format!(
                "-d {} -p tcp --dport {} -j REDIRECT --to-ports {}",
                ip, ssh_port, redir_port
            ));
        }
    }

    for ip in &server_ips {
        w.pair(&format!("-d {} -j RETURN", ip));
    }
    w.pair(&format!("-d {} -j RETURN", LOOPBACK_NET));

    w.pair(&format!("-m set --match-set {} dst -j RETURN", ipsets.lan));

    let redirect_set = |w: &mut RuleWriter, set: &str| {
        w.pair(&format!(
            "-p tcp -m set --match-set {} dst -j REDIRECT --to-ports {}",
            set, redir_port
        ));
        if let Some(port) = udp_port {
            w.pair(&format!(
                "-p udp -m set --match-set {} dst -j REDIRECT --to-ports {}",
                set, port
            ));
        }
    };
    let redirect_all = |w: &mut RuleWriter| {
        w.pair(&format!("-p tcp -j REDIRECT --to-ports {}", redir_port));
        if let Some(port) = udp_port {
            w.pair(&format!("-p udp -j REDIRECT --to-ports {}", port));
        }
    };

    match profile.mode {
        BypassMode::Whitelist => {
            // 黑名单先于白名单匹配：同时出现在两个列表中的地址走代理
            redirect_set(&mut w, ipsets.black.as_str());
            w.pair(&format!("-m set --match-set {} dst -j RETURN", ipsets.white));
            redirect_all(&mut w);
        }
        BypassMode::Blacklist => {
            w.pair(&format!("-m set --match-set {} dst -j RETURN", ipsets.white));
            redirect_set(&mut w, ipsets.black.as_str());
        }
        BypassMode::Global => redirect_all(&mut w),
        BypassMode::None => {}
    }

    log::debug!(
        "iptables 规则生成完成：模式 {}，转发端口 {}，放行服务器 {:?}",
        profile.mode,
        redir_port,
        server_ips
    );
    Ok(w.finish())
}

// 当前实际连接的服务器：生效的 ss/ssr 服务器，经 Kcptun 时再加上 Kcptun 服务器
pub fn server_hosts(profile: &Profile) -> Result<Vec<&str>> {
    let mut hosts = vec![profile.base_proxy()?.address.as_str()];
    if let Some(kcptun) = profile.kcptun_params()? {
        hosts.push(kcptun.address.as_str());
    }
    Ok(hosts)
}

fn resolve_servers(profile: &Profile, hosts: &ResolvedHosts) -> Result<Vec<Ipv4Addr>> {
    let mut ips: Vec<Ipv4Addr> = Vec::new();
    for host in server_hosts(profile)? {
        for ip in hosts.lookup(host)? {
            if !ips.contains(&ip) {
                ips.push(ip);
            }
        }
    }
    if ips.is_empty() {
        return Err(VRouterError::validation(format!(
            "配置档 {} 没有可放行的服务器地址",
            profile.name
        )));
    }
    Ok(ips)
}
