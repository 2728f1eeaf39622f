// 各代理角色的 JSON 配置
//
// 字段名沿用 shadowsocks-libev / ShadowsocksR / kcptun 的配置文件格式。
// others 附加参数先合入，再写入由部署元数据推导的字段（server、local_port、mode），
// 保证端口与 iptables 规则一致。

use serde_json::{Map, Value as JsonValue, json};

use super::CompileInput;
use crate::error::{Result, VRouterError};
use crate::molecules::router_config::{
    KcptunParams, Profile, ProxyRole, ProxyTunnel, ProxyVariant, ShadowsocksParams,
};

const LOCAL_ADDRESS: &str = "0.0.0.0";
const LOOPBACK: &str = "127.0.0.1";

pub fn role_config(role: ProxyRole, input: &CompileInput<'_>) -> Result<JsonValue> {
    match role {
        ProxyRole::Shadowsocks => tcp_config(input, ProxyVariant::Shadowsocks),
        ProxyRole::ShadowsocksR => tcp_config(input, ProxyVariant::ShadowsocksR),
        ProxyRole::Kcptun => kcptun_config(input),
        ProxyRole::TunnelDns(variant) => tunnel_dns_config(input, variant),
        ProxyRole::RelayUdp(variant) => relay_udp_config(input, variant),
    }
}

// TCP 透明代理；代理链经 Kcptun 时改连本地 Kcptun 客户端
pub fn tcp_config(input: &CompileInput<'_>, variant: ProxyVariant) -> Result<JsonValue> {
    let profile = input.profile;
    let runtime = input.runtime;
    let tcp = runtime.tcp_role(variant);
    let mut cfg = direct_fields(profile, variant)?;

    match profile.proxies.tunnel {
        ProxyTunnel::Direct => {
            cfg.insert("local_port".into(), json!(tcp.info.local_port));
        }
        ProxyTunnel::Kcptun => {
            let timeout = params_for(profile, variant)?
                .timeout
                .max(runtime.over_kt_min_timeout);
            cfg.insert("server".into(), json!(LOOPBACK));
            cfg.insert("server_port".into(), json!(runtime.kcptun.local_port));
            cfg.insert("local_port".into(), json!(tcp.over_kt_port));
            cfg.insert("timeout".into(), json!(timeout));
        }
    }
    cfg.insert("mode".into(), json!("tcp_only"));
    Ok(JsonValue::Object(cfg))
}

pub fn kcptun_config(input: &CompileInput<'_>) -> Result<JsonValue> {
    let profile = input.profile;
    let kcptun: &KcptunParams = profile.kcptun.as_ref().ok_or_else(|| {
        VRouterError::validation(format!("配置档 {} 缺少 kcptun 参数", profile.name))
    })?;

    let mut cfg = Map::new();
    cfg.insert("key".into(), json!(kcptun.key));
    cfg.insert("crypt".into(), json!(kcptun.crypt));
    cfg.insert("mode".into(), json!(kcptun.mode));
    kcptun.others.merge_into(&mut cfg);
    cfg.insert(
        "localaddr".into(),
        json!(format!(":{}", input.runtime.kcptun.local_port)),
    );
    cfg.insert(
        "remoteaddr".into(),
        json!(format!("{}:{}", kcptun.address, kcptun.port)),
    );
    Ok(JsonValue::Object(cfg))
}

// tunnel DNS 与 UDP 转发始终直连服务器，只承载 UDP
pub fn tunnel_dns_config(input: &CompileInput<'_>, variant: ProxyVariant) -> Result<JsonValue> {
    let mut cfg = direct_fields(input.profile, variant)?;
    cfg.insert(
        "local_port".into(),
        json!(input.runtime.tunnel_dns.get(variant).local_port),
    );
    cfg.insert("mode".into(), json!("udp_only"));
    cfg.insert(
        "tunnel_address".into(),
        json!(input.runtime.tunnel_dns_upstream),
    );
    Ok(JsonValue::Object(cfg))
}

pub fn relay_udp_config(input: &CompileInput<'_>, variant: ProxyVariant) -> Result<JsonValue> {
    let mut cfg = direct_fields(input.profile, variant)?;
    cfg.insert(
        "local_port".into(),
        json!(input.runtime.relay_udp.get(variant).local_port),
    );
    cfg.insert("mode".into(), json!("udp_only"));
    Ok(JsonValue::Object(cfg))
}

fn params_for(profile: &Profile, variant: ProxyVariant) -> Result<&ShadowsocksParams> {
    match variant {
        ProxyVariant::Shadowsocks => profile.shadowsocks.as_ref().ok_or_else(|| {
            VRouterError::validation(format!("配置档 {} 缺少 shadowsocks 参数", profile.name))
        }),
        ProxyVariant::ShadowsocksR => Ok(&profile.shadowsocksr_params()?.base),
    }
}

// 直连服务器时的公共字段，ShadowsocksR 额外带 protocol/obfs
fn direct_fields(profile: &Profile, variant: ProxyVariant) -> Result<Map<String, JsonValue>> {
    let params = params_for(profile, variant)?;

    let mut cfg = Map::new();
    cfg.insert("server".into(), json!(params.address));
    cfg.insert("server_port".into(), json!(params.port));
    cfg.insert("local_address".into(), json!(LOCAL_ADDRESS));
    cfg.insert("password".into(), json!(params.password));
    cfg.insert("timeout".into(), json!(params.timeout));
    cfg.insert("method".into(), json!(params.method));
    cfg.insert("fast_open".into(), json!(params.fast_open));

    if variant == ProxyVariant::ShadowsocksR {
        let ssr = profile.shadowsocksr_params()?;
        cfg.insert("protocol".into(), json!(ssr.protocol));
        cfg.insert("protocol_param".into(), json!(ssr.protocol_param));
        cfg.insert("obfs".into(), json!(ssr.obfs));
        cfg.insert("obfs_param".into(), json!(ssr.obfs_param));
    }

    params.others.merge_into(&mut cfg);
    Ok(cfg)
}
