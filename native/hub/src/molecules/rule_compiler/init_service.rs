// OpenWrt rc.common 风格的 init 服务脚本
// 每个角色写独立的 PID 文件，service_stop 只会停止该角色自己的进程，
// 即使 ss/ssr 的 redir 与 UDP 转发共用同一个二进制

use super::CompileInput;
use crate::molecules::router_config::ProxyRole;

pub fn gen_init_service(role: ProxyRole, input: &CompileInput<'_>) -> String {
    let info = input.runtime.role(role);
    let layout = input.layout;
    let binary = layout.binary(&info.binary);

    format!(
        r#"#!/bin/sh /etc/rc.common
# {role}
START={priority}
SERVICE_USE_PID=1
SERVICE_WRITE_PID=1
SERVICE_DAEMONIZE=1
SERVICE_PID_FILE={pid_file}

start() {{
    service_start {binary} -c {cfg}
}}

stop() {{
    service_stop {binary}
}}
"#,
        role = role,
        priority = info.start_priority,
        pid_file = layout.pid_file(&info.service),
        binary = binary,
        cfg = layout.cfg_path(&info.cfg_name),
    )
}
