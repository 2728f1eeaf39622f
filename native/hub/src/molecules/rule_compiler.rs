// 规则编译器分子模块
//
// 输入一个配置档与静态部署元数据，确定性地输出一整套互相一致的产物：
// ipset 脚本、iptables 脚本、dnsmasq 配置、代理 JSON、init 服务脚本与 watchdog。
// 所有产物共用同一组 ipset 名称与端口，编译器本身无状态。

pub mod bundle;
pub mod dnsmasq;
pub mod init_service;
pub mod ipset;
pub mod iptables;
pub mod proxy_config;
pub mod watchdog;

pub use bundle::{Artifact, ArtifactBundle, ArtifactKind};
pub use dnsmasq::gen_dnsmasq_cfg_file;
pub use init_service::gen_init_service;
pub use ipset::gen_ipset_file;
pub use iptables::{gen_iptables_file, server_hosts};
pub use proxy_config::role_config;
pub use watchdog::{cron_entry, gen_watchdog, process_cmdline};

use crate::atoms::ListDirs;
use crate::error::{Result, VRouterError};
use crate::molecules::router_config::{FirewallInfo, Profile, ProxyRuntimeInfo, RemoteLayout};

// 编译所需的全部只读输入
#[derive(Debug, Clone, Copy)]
pub struct CompileInput<'a> {
    pub profile: &'a Profile,
    pub runtime: &'a ProxyRuntimeInfo,
    pub firewall: &'a FirewallInfo,
    pub layout: &'a RemoteLayout,
    pub lists: &'a ListDirs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ListKind {
    Black,
    White,
}

// 一个被选中的列表源及其目标 ipset
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ListTarget<'a> {
    pub key: &'a str,
    pub file_name: &'a str,
    pub ipset: &'a str,
    pub kind: ListKind,
    // 黑名单域名在启用 tunnel DNS 时改走隧道解析
    pub dns_server: Option<String>,
}

// 黑名单在前、白名单在后，顺序与配置档中的选择顺序一致
pub(crate) fn list_targets<'a>(input: &CompileInput<'a>) -> Result<Vec<ListTarget<'a>>> {
    let profile = input.profile;
    let firewall = input.firewall;

    let tunnel_dns = profile
        .enable_tunnel_dns
        .then(|| input.runtime.tunnel_dns_address(profile.proxies.variant));

    let mut targets = Vec::new();
    for key in &profile.selected_blacklists {
        targets.push(ListTarget {
            key,
            file_name: lookup_list(firewall, key)?,
            ipset: firewall.blacklist_ipset(),
            kind: ListKind::Black,
            dns_server: tunnel_dns.clone(),
        });
    }
    for key in &profile.selected_whitelists {
        targets.push(ListTarget {
            key,
            file_name: lookup_list(firewall, key)?,
            ipset: firewall.whitelist_ipset(key),
            kind: ListKind::White,
            dns_server: None,
        });
    }
    Ok(targets)
}

fn lookup_list<'a>(firewall: &'a FirewallInfo, key: &str) -> Result<&'a str> {
    firewall
        .list_file(key)
        .ok_or_else(|| VRouterError::validation(format!("未知的列表：{}", key)))
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::fs;
    use std::path::Path;

    use crate::atoms::ListDirs;
    use crate::molecules::router_config::FirewallInfo;

    // 每个默认列表写入一份混合内容，模板目录留空
    pub(crate) fn write_default_lists(dir: &Path) -> ListDirs {
        let firewall = FirewallInfo::default();
        let contents = [
            ("chinaIPs", "# china\n1.0.1.0/24\n1.0.2.0/23\n"),
            ("lanNetworks", "192.168.0.0/16\n10.0.0.0/8\n"),
            ("gfwDomains", "google.com\n.youtube.com\n8.8.4.4\n"),
            ("extraBlackList", "# extra\ntwitter.com\n91.108.4.0/22\n\n"),
            ("extraWhiteList", "baidu.com\n223.5.5.5\n"),
        ];
        for (key, content) in contents {
            let file_name = firewall.list_file(key).unwrap_or(key);
            fs::write(dir.join(file_name), content).unwrap();
        }
        ListDirs::new(dir, dir.join("templates"))
    }
}
