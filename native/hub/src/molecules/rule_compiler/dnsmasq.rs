// dnsmasq 自定义配置生成
// ipset= 让 dnsmasq 在解析域名时把结果写入对应集合；
// 黑名单域名在启用 tunnel DNS 时额外用 server= 指定走隧道解析，防止污染

use std::collections::HashSet;

use super::{CompileInput, list_targets};
use crate::error::Result;
use crate::molecules::router_config::BypassMode;

pub const STAY_IN_WALL: &str = "# stay in wall";

pub fn gen_dnsmasq_cfg_file(input: &CompileInput<'_>) -> Result<String> {
    if input.profile.mode == BypassMode::None {
        return Ok(format!("{}\n", STAY_IN_WALL));
    }

    let mut lines: Vec<String> = Vec::new();
    let mut seen: HashSet<(&str, String)> = HashSet::new();

    for target in list_targets(input)? {
        let domains = input.lists.domains(target.file_name)?;
        log::debug!("列表 {} 中的域名：{} 条", target.key, domains.len());

        for domain in domains {
            if !seen.insert((target.ipset, domain.clone())) {
                continue;
            }
            // 白名单 dns_server 恒为 None，只写 ipset
            if let Some(server) = &target.dns_server {
                lines.push(format!("server=/{}/{}", domain, server));
            }
            lines.push(format!("ipset=/{}/{}", domain, target.ipset));
        }
    }

    if lines.is_empty() {
        return Ok(String::new());
    }
    let mut config = lines.join("\n");
    config.push('\n');
    Ok(config)
}
