// 防火墙命名表：ipset 名称、生成文件名、列表键到源文件的映射

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const LAN_NETWORKS: &str = "lanNetworks";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpsetNames {
    pub lan: String,
    pub white: String,
    pub black: String,
}

impl Default for IpsetNames {
    fn default() -> Self {
        Self {
            lan: "LAN".to_string(),
            white: "WHITELIST".to_string(),
            black: "BLACKLIST".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirewallInfo {
    pub ipsets: IpsetNames,
    pub ipset_file: String,
    pub iptables_file: String,
    pub dnsmasq_file: String,
    pub watchdog_file: String,
    // 列表键 → 源文件名
    pub lists: BTreeMap<String, String>,
}

impl Default for FirewallInfo {
    fn default() -> Self {
        let lists = [
            ("chinaIPs", "china_ips.txt"),
            (LAN_NETWORKS, "lan_networks.txt"),
            ("gfwDomains", "gfw_domains.txt"),
            ("extraBlackList", "extra_black_list.txt"),
            ("extraWhiteList", "extra_white_list.txt"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            ipsets: IpsetNames::default(),
            ipset_file: "custom.ipset".to_string(),
            iptables_file: "firewall.user".to_string(),
            dnsmasq_file: "custom.conf".to_string(),
            watchdog_file: "watchdog.sh".to_string(),
            lists,
        }
    }
}

impl FirewallInfo {
    // 白名单中的 lanNetworks 指向 lan 集合，其余白名单指向 white 集合
    pub fn whitelist_ipset(&self, list_key: &str) -> &str {
        if list_key == LAN_NETWORKS {
            &self.ipsets.lan
        } else {
            &self.ipsets.white
        }
    }

    pub fn blacklist_ipset(&self) -> &str {
        &self.ipsets.black
    }

    pub fn list_file(&self, list_key: &str) -> Option<&str> {
        self.lists.get(list_key).map(String::as_str)
    }
}
