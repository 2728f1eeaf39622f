// 产物集合：一次编译输出的全部文件及其在路由器上的目标路径

use std::fmt;
use std::path::{Path, PathBuf};

use super::{
    CompileInput, gen_dnsmasq_cfg_file, gen_init_service, gen_ipset_file, gen_iptables_file,
    gen_watchdog, role_config,
};
use crate::atoms::ResolvedHosts;
use crate::error::Result;
use crate::molecules::router_config::{ProxyRole, join_remote};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    Ipset,
    Iptables,
    Dnsmasq,
    ProxyConfig(ProxyRole),
    InitService(ProxyRole),
    Watchdog,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ipset => f.write_str("ipset"),
            Self::Iptables => f.write_str("iptables"),
            Self::Dnsmasq => f.write_str("dnsmasq"),
            Self::ProxyConfig(role) => write!(f, "{} 配置", role),
            Self::InitService(role) => write!(f, "{} 服务脚本", role),
            Self::Watchdog => f.write_str("watchdog"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub kind: ArtifactKind,
    pub file_name: String,
    pub remote_path: String,
    pub contents: String,
    // 远程文件权限
    pub mode: u32,
}

impl Artifact {
    fn new(kind: ArtifactKind, file_name: &str, remote_path: String, contents: String) -> Self {
        let mode = match kind {
            ArtifactKind::InitService(_) | ArtifactKind::Watchdog => 0o755,
            _ => 0o644,
        };
        Self {
            kind,
            file_name: file_name.to_string(),
            remote_path,
            contents,
            mode,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactBundle {
    artifacts: Vec<Artifact>,
}

impl ArtifactBundle {
    // 完整编译：防火墙三件套 + 每个启用角色的配置与服务脚本 + watchdog
    pub fn compile(input: &CompileInput<'_>, hosts: &ResolvedHosts) -> Result<Self> {
        let mut bundle = Self::compile_firewall(input, hosts)?;
        let runtime = input.runtime;
        let layout = input.layout;
        let roles = runtime.active_roles(input.profile);

        for &role in &roles {
            let info = runtime.role(role);
            let mut contents = serde_json::to_string_pretty(&role_config(role, input)?)?;
            contents.push('\n');
            bundle.artifacts.push(Artifact::new(
                ArtifactKind::ProxyConfig(role),
                &info.cfg_name,
                layout.cfg_path(&info.cfg_name),
                contents,
            ));
        }

        for &role in &roles {
            let info = runtime.role(role);
            bundle.artifacts.push(Artifact::new(
                ArtifactKind::InitService(role),
                &info.service,
                layout.init_script(&info.service),
                gen_init_service(role, input),
            ));
        }

        let watchdog_file = &input.firewall.watchdog_file;
        bundle.artifacts.push(Artifact::new(
            ArtifactKind::Watchdog,
            watchdog_file,
            layout.cfg_path(watchdog_file),
            gen_watchdog(input),
        ));

        log::info!(
            "配置档 {} 编译完成：{} 个产物",
            input.profile.name,
            bundle.artifacts.len()
        );
        Ok(bundle)
    }

    // 切换模式只需重新生成 ipset / iptables / dnsmasq
    pub fn compile_firewall(input: &CompileInput<'_>, hosts: &ResolvedHosts) -> Result<Self> {
        let firewall = input.firewall;
        let layout = input.layout;
        input.profile.validate(firewall)?;

        let ipset = gen_ipset_file(input)?;
        let iptables = gen_iptables_file(input, hosts)?;
        let dnsmasq = gen_dnsmasq_cfg_file(input)?;

        Ok(Self {
            artifacts: vec![
                Artifact::new(
                    ArtifactKind::Ipset,
                    &firewall.ipset_file,
                    layout.cfg_path(&firewall.ipset_file),
                    ipset,
                ),
                Artifact::new(
                    ArtifactKind::Iptables,
                    &firewall.iptables_file,
                    join_remote(&layout.firewall_dir, &firewall.iptables_file),
                    iptables,
                ),
                Artifact::new(
                    ArtifactKind::Dnsmasq,
                    &firewall.dnsmasq_file,
                    join_remote(&layout.dnsmasq_dir, &firewall.dnsmasq_file),
                    dnsmasq,
                ),
            ],
        })
    }

    pub fn artifacts(&self) -> &[Artifact] {
        &self.artifacts
    }

    pub fn get(&self, kind: ArtifactKind) -> Option<&Artifact> {
        self.artifacts.iter().find(|a| a.kind == kind)
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    // 写入本地暂存目录，返回 (本地路径, 产物) 列表，顺序与产物顺序一致
    pub async fn write_to(&self, staging_dir: &Path) -> Result<Vec<(PathBuf, &Artifact)>> {
        tokio::fs::create_dir_all(staging_dir).await?;
        let mut written = Vec::with_capacity(self.artifacts.len());
        for artifact in &self.artifacts {
            let path = staging_dir.join(&artifact.file_name);
            tokio::fs::write(&path, &artifact.contents).await?;
            log::debug!("写入暂存文件 {:?}", path);
            written.push((path, artifact));
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::ResolvedHosts;
    use crate::error::VRouterError;
    use crate::molecules::router_config::profile::tests::sample_profile;
    use crate::molecules::router_config::{
        BypassMode, FirewallInfo, Profile, ProxyRuntimeInfo, ProxyVariant, RemoteLayout,
    };
    use crate::molecules::rule_compiler::test_support::write_default_lists;

    fn compile(profile: &Profile, firewall_only: bool) -> Result<ArtifactBundle> {
        let dir = tempfile::tempdir().unwrap();
        let lists = write_default_lists(dir.path());
        let runtime = ProxyRuntimeInfo::default();
        let firewall = FirewallInfo::default();
        let layout = RemoteLayout::default();
        let input = CompileInput {
            profile,
            runtime: &runtime,
            firewall: &firewall,
            layout: &layout,
            lists: &lists,
        };
        if firewall_only {
            ArtifactBundle::compile_firewall(&input, &ResolvedHosts::new())
        } else {
            ArtifactBundle::compile(&input, &ResolvedHosts::new())
        }
    }

    #[test]
    fn test_full_bundle_contents() {
        let bundle = compile(&sample_profile(), false).unwrap();
        let kinds: Vec<ArtifactKind> = bundle.artifacts().iter().map(|a| a.kind).collect();
        let dns = ProxyRole::TunnelDns(ProxyVariant::Shadowsocks);

        assert_eq!(
            kinds,
            vec![
                ArtifactKind::Ipset,
                ArtifactKind::Iptables,
                ArtifactKind::Dnsmasq,
                ArtifactKind::ProxyConfig(ProxyRole::Kcptun),
                ArtifactKind::ProxyConfig(ProxyRole::Shadowsocks),
                ArtifactKind::ProxyConfig(dns),
                ArtifactKind::InitService(ProxyRole::Kcptun),
                ArtifactKind::InitService(ProxyRole::Shadowsocks),
                ArtifactKind::InitService(dns),
                ArtifactKind::Watchdog,
            ]
        );
    }

    #[test]
    fn test_remote_paths_and_modes() {
        let bundle = compile(&sample_profile(), false).unwrap();

        let iptables = bundle.get(ArtifactKind::Iptables).unwrap();
        assert_eq!(iptables.remote_path, "/etc/firewall.user");
        assert_eq!(iptables.mode, 0o644);

        let dnsmasq = bundle.get(ArtifactKind::Dnsmasq).unwrap();
        assert_eq!(dnsmasq.remote_path, "/etc/dnsmasq.d/custom.conf");

        let init = bundle
            .get(ArtifactKind::InitService(ProxyRole::Shadowsocks))
            .unwrap();
        assert_eq!(init.remote_path, "/etc/init.d/vrouter-ss");
        assert_eq!(init.mode, 0o755);

        let cfg = bundle
            .get(ArtifactKind::ProxyConfig(ProxyRole::Shadowsocks))
            .unwrap();
        assert_eq!(cfg.remote_path, "/etc/vrouter/ss-client.json");
        let json: serde_json::Value = serde_json::from_str(&cfg.contents).unwrap();
        assert_eq!(json["local_port"], 1090);
    }

    #[test]
    fn test_firewall_bundle_only_has_rule_files() {
        let mut profile = sample_profile();
        profile.mode = BypassMode::Blacklist;
        let bundle = compile(&profile, true).unwrap();
        assert_eq!(bundle.len(), 3);
        assert!(bundle.get(ArtifactKind::Watchdog).is_none());
    }

    #[test]
    fn test_invalid_profile_produces_nothing() {
        let mut profile = sample_profile();
        profile.kcptun = None;
        assert!(matches!(
            compile(&profile, false),
            Err(VRouterError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_write_to_staging_dir() {
        let bundle = compile(&sample_profile(), false).unwrap();
        let staging = tempfile::tempdir().unwrap();
        let target = staging.path().join("out");

        let written = bundle.write_to(&target).await.unwrap();
        assert_eq!(written.len(), bundle.len());
        let (path, artifact) = &written[0];
        assert_eq!(path, &target.join("custom.ipset"));
        assert_eq!(std::fs::read_to_string(path).unwrap(), artifact.contents);
    }
}
