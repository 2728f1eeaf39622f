// watchdog 脚本：每分钟由 cron 执行，按完整命令行检查各角色进程，缺失则重启对应服务

use super::CompileInput;
use crate::molecules::router_config::{FirewallInfo, ProxyRole, RemoteLayout, RoleInfo};

// ps 中该角色进程的完整命令行（不含二进制所在目录）
pub fn process_cmdline(info: &RoleInfo, layout: &RemoteLayout) -> String {
    format!("{} -c {}", info.binary, layout.cfg_path(&info.cfg_name))
}

// 首字母加方括号，避免 grep 匹配到自身
pub fn process_pattern(role: ProxyRole, input: &CompileInput<'_>) -> String {
    let cmdline = process_cmdline(input.runtime.role(role), input.layout);
    let mut chars = cmdline.chars();
    match chars.next() {
        Some(first) => format!("[{}]{}", first, chars.as_str()),
        None => String::new(),
    }
}

pub fn gen_watchdog(input: &CompileInput<'_>) -> String {
    let mut script = String::from("#!/bin/sh\n# vrouter watchdog\n");
    for role in input.runtime.active_roles(input.profile) {
        let info = input.runtime.role(role);
        script.push_str(&format!(
            r#"
if ! ps -w | grep -q "{pattern}"; then
    logger -t vrouter "{role} is not running, restarting {service}"
    {init} restart
fi
"#,
            pattern = process_pattern(role, input),
            role = role,
            service = info.service,
            init = input.layout.init_script(&info.service),
        ));
    }
    script
}

pub fn cron_entry(layout: &RemoteLayout, firewall: &FirewallInfo) -> String {
    format!("* * * * * {}", layout.cfg_path(&firewall.watchdog_file))
}
