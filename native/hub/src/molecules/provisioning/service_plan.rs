// 路由器端命令构造：两阶段推送、服务启停、watchdog、软件包

use crate::molecules::router_config::{FirewallInfo, ProxyRole, ProxyRuntimeInfo, RemoteLayout};
use crate::molecules::rule_compiler::{ArtifactBundle, cron_entry};

// 新文件先以此后缀上传，提交时统一改名
pub const STAGING_SUFFIX: &str = ".vrouter-new";

pub const RESTART_FIREWALL: &str = "/etc/init.d/firewall restart";
pub const RESTART_DNSMASQ: &str = "/etc/init.d/dnsmasq restart";
pub const RESTART_CRON: &str = "/etc/init.d/cron restart";
pub const OPKG_UPDATE: &str = "opkg update";
pub const LIST_INSTALLED: &str = "opkg list-installed";
pub const LIST_PROCESSES: &str = "ps -w";
pub const DNSMASQ_CONF: &str = "/etc/dnsmasq.conf";

// dnsmasq-full 才支持 ipset= 指令
pub const DEFAULT_PACKAGES: &[&str] = &[
    "ipset",
    "iptables-mod-nat-extra",
    "dnsmasq-full",
    "shadowsocks-libev-ss-redir",
    "shadowsocks-libev-ss-tunnel",
];

// 成功时也会输出 stderr 的命令（按前缀匹配），firewall 重启脚本总会向 stderr 打印日志
const STDERR_TOLERANT: &[&str] = &[RESTART_FIREWALL];

pub fn tolerates_stderr(command: &str) -> bool {
    STDERR_TOLERANT
        .iter()
        .any(|prefix| command.starts_with(prefix))
}

pub fn staged_path(remote_path: &str) -> String {
    format!("{}{}", remote_path, STAGING_SUFFIX)
}

// 上传前确保所有目标目录存在
pub fn prepare_dirs_command(bundle: &ArtifactBundle) -> String {
    let mut dirs: Vec<&str> = Vec::new();
    for artifact in bundle.artifacts() {
        if let Some((dir, _)) = artifact.remote_path.rsplit_once('/')
            && !dir.is_empty()
            && !dirs.contains(&dir)
        {
            dirs.push(dir);
        }
    }
    format!("mkdir -p {}", dirs.join(" "))
}

// 单条命令完成全部改名，上传失败时不会执行到这一步
pub fn commit_command(bundle: &ArtifactBundle) -> String {
    bundle
        .artifacts()
        .iter()
        .map(|a| {
            format!(
                "mv -f {staged} {target} && chmod {mode:o} {target}",
                staged = staged_path(&a.remote_path),
                target = a.remote_path,
                mode = a.mode,
            )
        })
        .collect::<Vec<_>>()
        .join(" && ")
}

// 停止并禁用所有角色（含未启用的 ss/ssr 两种风味），服务脚本不存在时跳过
pub fn stop_commands(runtime: &ProxyRuntimeInfo, layout: &RemoteLayout) -> Vec<String> {
    ProxyRole::STOP_ORDER
        .iter()
        .map(|&role| {
            let init = layout.init_script(&runtime.role(role).service);
            format!(
                "if [ -x {init} ]; then {init} stop >/dev/null 2>&1; {init} disable; fi",
                init = init
            )
        })
        .collect()
}

pub fn start_commands(
    runtime: &ProxyRuntimeInfo,
    layout: &RemoteLayout,
    roles: &[ProxyRole],
) -> Vec<String> {
    roles
        .iter()
        .map(|&role| {
            let init = layout.init_script(&runtime.role(role).service);
            format!("{init} enable && {init} start", init = init)
        })
        .collect()
}

// crontab 中已有相同行时不重复追加
pub fn install_watchdog_command(layout: &RemoteLayout, firewall: &FirewallInfo) -> String {
    let entry = cron_entry(layout, firewall);
    format!(
        "touch {tab} && (grep -qxF '{entry}' {tab} || echo '{entry}' >> {tab}) && {restart}",
        tab = layout.crontab,
        entry = entry,
        restart = RESTART_CRON,
    )
}

pub fn restore_ipset_command(layout: &RemoteLayout, firewall: &FirewallInfo) -> String {
    format!(
        "ipset restore -f -! {}",
        layout.cfg_path(&firewall.ipset_file)
    )
}

pub fn install_packages_command(packages: &[String]) -> String {
    format!("opkg install {}", packages.join(" "))
}

// dnsmasq 默认不读取 dnsmasq.d，需要追加 conf-dir
pub fn dnsmasq_conf_dir_command(layout: &RemoteLayout) -> String {
    let line = format!("conf-dir={}", layout.dnsmasq_dir);
    format!(
        "grep -qxF '{line}' {conf} || echo '{line}' >> {conf}",
        line = line,
        conf = DNSMASQ_CONF
    )
}

// opkg list-installed 每行格式为 "name - version"
pub fn missing_packages(list_installed: &str, wanted: &[String]) -> Vec<String> {
    let installed: Vec<&str> = list_installed
        .lines()
        .filter_map(|line| line.split(" - ").next())
        .map(str::trim)
        .collect();
    wanted
        .iter()
        .filter(|pkg| !installed.contains(&pkg.as_str()))
        .cloned()
        .collect()
}
