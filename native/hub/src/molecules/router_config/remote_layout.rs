// 路由器端文件布局

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteLayout {
    // 代理 JSON、ipset 脚本与 watchdog 所在目录
    pub cfg_dir: String,
    pub init_dir: String,
    pub bin_dir: String,
    pub pid_dir: String,
    // firewall.user 所在目录，firewall 重启时执行
    pub firewall_dir: String,
    pub dnsmasq_dir: String,
    pub crontab: String,
}

impl Default for RemoteLayout {
    fn default() -> Self {
        Self {
            cfg_dir: "/etc/vrouter".to_string(),
            init_dir: "/etc/init.d".to_string(),
            bin_dir: "/usr/bin".to_string(),
            pid_dir: "/var/run".to_string(),
            firewall_dir: "/etc".to_string(),
            dnsmasq_dir: "/etc/dnsmasq.d".to_string(),
            crontab: "/etc/crontabs/root".to_string(),
        }
    }
}

impl RemoteLayout {
    pub fn cfg_path(&self, file_name: &str) -> String {
        join_remote(&self.cfg_dir, file_name)
    }

    pub fn init_script(&self, service: &str) -> String {
        join_remote(&self.init_dir, service)
    }

    pub fn binary(&self, binary: &str) -> String {
        join_remote(&self.bin_dir, binary)
    }

    pub fn pid_file(&self, service: &str) -> String {
        join_remote(&self.pid_dir, &format!("{}.pid", service))
    }
}

pub fn join_remote(dir: &str, file_name: &str) -> String {
    format!("{}/{}", dir.trim_end_matches('/'), file_name)
}
