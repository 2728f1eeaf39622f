// ipset 恢复脚本生成：先 create 后 add
// create 使用 -exist，防火墙每次重启都会重复执行该脚本

use super::{CompileInput, list_targets};
use crate::error::Result;
use crate::molecules::router_config::{BypassMode, FirewallInfo};

pub fn gen_ipset_file(input: &CompileInput<'_>) -> Result<String> {
    let targets = list_targets(input)?;

    let mut set_names: Vec<&str> = Vec::new();
    let referenced = targets
        .iter()
        .map(|t| t.ipset)
        .chain(referenced_by_iptables(input.firewall, input.profile.mode));
    for name in referenced {
        if !set_names.contains(&name) {
            set_names.push(name);
        }
    }

    let mut lines: Vec<String> = set_names
        .iter()
        .map(|name| {
            format!(
                "create {} hash:net family inet hashsize 1024 maxelem 65536 -exist",
                name
            )
        })
        .collect();

    for target in &targets {
        let cidrs = input.lists.cidrs(target.file_name)?;
        log::debug!(
            "列表 {} → ipset {}：{} 条",
            target.key,
            target.ipset,
            cidrs.len()
        );
        lines.extend(cidrs.iter().map(|cidr| format!("add {} {}", target.ipset, cidr)));
    }

    let mut script = lines.join("\n");
    script.push('\n');
    Ok(script)
}

// iptables 脚本会引用的集合：lan 总是引用，黑白名单模式还引用 white/black
fn referenced_by_iptables(firewall: &FirewallInfo, mode: BypassMode) -> Vec<&str> {
    let ipsets = &firewall.ipsets;
    match mode {
        BypassMode::Whitelist | BypassMode::Blacklist => {
            vec![
                ipsets.lan.as_str(),
                ipsets.white.as_str(),
                ipsets.black.as_str(),
            ]
        }
        BypassMode::Global | BypassMode::None => vec![ipsets.lan.as_str()],
    }
}
