// 路由器协调器：编排配置档应用、模式切换、软件包安装与状态查询
//
// 同一时刻只执行一个操作，对应路由器上唯一的 SSH 会话；
// 操作开始后不支持中途取消，要么全部完成，要么停在第一个失败的步骤。

use futures_util::stream::{self, StreamExt};
use std::path::PathBuf;
use std::sync::Mutex;
use tokio::sync::Mutex as SessionLock;

use crate::atoms::{
    CommandOutput, HostResolver, ListDirs, RemoteShell, ResolvedHosts, SystemResolver,
};
use crate::error::{Result, VRouterError};
use crate::molecules::provisioning::service_plan::{
    DEFAULT_PACKAGES, LIST_INSTALLED, LIST_PROCESSES, OPKG_UPDATE, RESTART_DNSMASQ,
    RESTART_FIREWALL, commit_command, dnsmasq_conf_dir_command, install_packages_command,
    install_watchdog_command, missing_packages, prepare_dirs_command, restore_ipset_command,
    staged_path, start_commands, stop_commands, tolerates_stderr,
};
use crate::molecules::provisioning::{
    ApplyPlan, ApplyStage, ApplyState, ProgressReporter, ProvisioningStep, RetryPolicy,
};
use crate::molecules::router_config::{
    BypassMode, FirewallInfo, Profile, ProxyRole, ProxyRuntimeInfo, RemoteLayout,
};
use crate::molecules::rule_compiler::{
    ArtifactBundle, CompileInput, process_cmdline, server_hosts,
};

// 部署所需的静态信息与策略
#[derive(Debug, Clone)]
pub struct DeploySettings {
    pub runtime: ProxyRuntimeInfo,
    pub firewall: FirewallInfo,
    pub layout: RemoteLayout,
    pub lists: ListDirs,
    pub staging_dir: PathBuf,
    pub packages: Vec<String>,
    pub ready_retry: RetryPolicy,
    pub install_retry: RetryPolicy,
    // 并发上传的文件数
    pub copy_concurrency: usize,
}

impl DeploySettings {
    pub fn new(lists: ListDirs, staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            runtime: ProxyRuntimeInfo::default(),
            firewall: FirewallInfo::default(),
            layout: RemoteLayout::default(),
            lists,
            staging_dir: staging_dir.into(),
            packages: DEFAULT_PACKAGES.iter().map(|p| p.to_string()).collect(),
            ready_retry: RetryPolicy::ssh_ready(),
            install_retry: RetryPolicy::package_verify(),
            copy_concurrency: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleStatus {
    pub role: ProxyRole,
    pub service: String,
    pub running: bool,
}

pub struct RouterCoordinator<S: RemoteShell> {
    shell: S,
    settings: DeploySettings,
    resolver: Box<dyn HostResolver>,
    progress: ProgressReporter,
    session: SessionLock<()>,
    state: Mutex<ApplyState>,
    // 最近一次完整成功的配置档，只在最后一步成功后更新
    committed: Mutex<Option<Profile>>,
}

impl<S: RemoteShell> RouterCoordinator<S> {
    pub fn new(shell: S, settings: DeploySettings) -> Self {
        Self {
            shell,
            settings,
            resolver: Box::new(SystemResolver),
            progress: ProgressReporter::default(),
            session: SessionLock::new(()),
            state: Mutex::new(ApplyState::Idle),
            committed: Mutex::new(None),
        }
    }

    pub fn with_resolver(mut self, resolver: impl HostResolver + 'static) -> Self {
        self.resolver = Box::new(resolver);
        self
    }

    pub fn with_progress(mut self, progress: ProgressReporter) -> Self {
        self.progress = progress;
        self
    }

    pub fn settings(&self) -> &DeploySettings {
        &self.settings
    }

    pub fn shell(&self) -> &S {
        &self.shell
    }

    pub fn state(&self) -> ApplyState {
        match self.state.lock() {
            Ok(state) => state.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn committed_profile(&self) -> Option<Profile> {
        match self.committed.lock() {
            Ok(committed) => committed.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    // 进程重启后，以持久化配置中的当前配置档作为已应用状态
    pub fn assume_committed(&self, profile: Profile) {
        self.set_committed(Some(profile));
    }

    fn set_state(&self, next: ApplyState) {
        match self.state.lock() {
            Ok(mut state) => *state = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }

    fn set_committed(&self, profile: Option<Profile>) {
        match self.committed.lock() {
            Ok(mut committed) => *committed = profile,
            Err(poisoned) => *poisoned.into_inner() = profile,
        }
    }

    fn input<'a>(&'a self, profile: &'a Profile) -> CompileInput<'a> {
        CompileInput {
            profile,
            runtime: &self.settings.runtime,
            firewall: &self.settings.firewall,
            layout: &self.settings.layout,
            lists: &self.settings.lists,
        }
    }

    // 编译前先异步解析服务器地址，编译器只查表
    async fn resolve_hosts(&self, profile: &Profile) -> Result<ResolvedHosts> {
        ResolvedHosts::resolve_all(self.resolver.as_ref(), &server_hosts(profile)?).await
    }

    /// 只编译不推送
    pub async fn generate(&self, profile: &Profile) -> Result<ArtifactBundle> {
        let hosts = self.resolve_hosts(profile).await?;
        ArtifactBundle::compile(&self.input(profile), &hosts)
    }

    /// 完整应用配置档：生成 → 推送 → 切换服务 → 恢复 ipset → 重启 firewall 与 dnsmasq
    pub async fn apply_profile(&self, profile: &Profile) -> Result<()> {
        let _session = self.session.lock().await;
        log::info!("开始应用配置档 {}（{} / {}）", profile.name, profile.proxies, profile.mode);

        self.run_plan(&ApplyPlan::apply_profile(), profile).await?;
        self.set_committed(Some(profile.clone()));
        log::info!("配置档 {} 应用完成", profile.name);
        Ok(())
    }

    /// 在已应用的配置档上切换绕行模式，只更新防火墙相关文件
    pub async fn change_mode(&self, mode: BypassMode) -> Result<Profile> {
        let _session = self.session.lock().await;
        let mut profile = self
            .committed_profile()
            .ok_or_else(|| VRouterError::validation("尚未应用任何配置档，无法切换模式"))?;
        log::info!("切换绕行模式：{} → {}", profile.mode, mode);
        profile.mode = mode;

        self.run_plan(&ApplyPlan::change_mode(), &profile).await?;
        self.set_committed(Some(profile.clone()));
        Ok(profile)
    }

    /// 等待路由器就绪并安装软件包，安装后按固定间隔重试校验
    pub async fn provision(&self) -> Result<()> {
        let _session = self.session.lock().await;
        let settings = &self.settings;

        self.progress
            .report(ApplyStage::WaitingForRouter, "等待路由器 SSH 就绪");
        let ready = settings.ready_retry;
        ready
            .run("连接路由器", |_| self.exec("true"))
            .await
            .map_err(|e| {
                log::error!("路由器始终无法连接：{}", e);
                VRouterError::Retry {
                    what: "连接路由器".to_string(),
                    attempts: ready.attempts,
                }
            })?;

        if !settings.packages.is_empty() {
            self.progress.report(
                ApplyStage::InstallingPackages,
                format!("安装软件包：{}", settings.packages.join(", ")),
            );
            // 安装命令本身的失败不在此处判定，以 list-installed 的校验结果为准
            self.exec_lenient(OPKG_UPDATE).await?;
            self.exec_lenient(&install_packages_command(&settings.packages))
                .await?;
            settings
                .install_retry
                .run("校验软件包", |_| self.verify_packages())
                .await?;
        }

        self.exec(&dnsmasq_conf_dir_command(&settings.layout)).await?;
        self.exec(&format!("mkdir -p {}", settings.layout.cfg_dir))
            .await?;
        log::info!("路由器初始化完成");
        Ok(())
    }

    /// 按完整命令行检查所有角色的进程
    pub async fn service_status(&self) -> Result<Vec<RoleStatus>> {
        let _session = self.session.lock().await;
        let output = self.exec(LIST_PROCESSES).await?;
        let settings = &self.settings;

        Ok(ProxyRole::STOP_ORDER
            .iter()
            .map(|&role| {
                let info = settings.runtime.role(role);
                let cmdline = process_cmdline(info, &settings.layout);
                RoleStatus {
                    role,
                    service: info.service.clone(),
                    running: output.stdout.lines().any(|line| line.contains(&cmdline)),
                }
            })
            .collect())
    }

    async fn run_plan(&self, plan: &ApplyPlan, profile: &Profile) -> Result<()> {
        let mut bundle: Option<ArtifactBundle> = None;
        for &step in plan.steps() {
            self.set_state(ApplyState::Running(step));
            self.progress
                .report(step.stage(), format!("{}：{}", step, profile.name));

            if let Err(e) = self.run_step(step, plan, profile, &mut bundle).await {
                log::error!("步骤 {} 失败：{}", step, e);
                self.set_state(ApplyState::Failed {
                    step,
                    error: e.to_string(),
                });
                return Err(e);
            }
        }
        self.set_state(ApplyState::Idle);
        Ok(())
    }

    async fn run_step(
        &self,
        step: ProvisioningStep,
        plan: &ApplyPlan,
        profile: &Profile,
        bundle: &mut Option<ArtifactBundle>,
    ) -> Result<()> {
        let settings = &self.settings;
        match step {
            ProvisioningStep::GenerateArtifacts => {
                let hosts = self.resolve_hosts(profile).await?;
                let input = self.input(profile);
                let compiled = if plan.contains(ProvisioningStep::StartServices) {
                    ArtifactBundle::compile(&input, &hosts)?
                } else {
                    ArtifactBundle::compile_firewall(&input, &hosts)?
                };
                *bundle = Some(compiled);
            }
            ProvisioningStep::StageArtifacts => {
                self.push_staged(generated(bundle, step)?).await?;
            }
            ProvisioningStep::CommitArtifacts => {
                self.exec(&commit_command(generated(bundle, step)?)).await?;
            }
            ProvisioningStep::StopServices => {
                for command in stop_commands(&settings.runtime, &settings.layout) {
                    self.exec(&command).await?;
                }
            }
            ProvisioningStep::StartServices => {
                let roles = settings.runtime.active_roles(profile);
                for command in start_commands(&settings.runtime, &settings.layout, &roles) {
                    self.exec(&command).await?;
                }
            }
            ProvisioningStep::InstallWatchdog => {
                self.exec(&install_watchdog_command(
                    &settings.layout,
                    &settings.firewall,
                ))
                .await?;
            }
            ProvisioningStep::RestoreIpset => {
                self.exec(&restore_ipset_command(&settings.layout, &settings.firewall))
                    .await?;
            }
            ProvisioningStep::RestartFirewall => {
                self.exec(RESTART_FIREWALL).await?;
            }
            ProvisioningStep::RestartDnsmasq => {
                self.exec(RESTART_DNSMASQ).await?;
            }
        }
        Ok(())
    }

    // 第一阶段：写入本地暂存目录后并发上传为 <目标>.vrouter-new，目标文件保持不变
    async fn push_staged(&self, bundle: &ArtifactBundle) -> Result<()> {
        let written = bundle.write_to(&self.settings.staging_dir).await?;
        self.exec(&prepare_dirs_command(bundle)).await?;

        let results: Vec<Result<()>> = stream::iter(written.iter().map(|(local, artifact)| {
            let remote = staged_path(&artifact.remote_path);
            async move {
                log::debug!("上传 {} → {}", artifact.kind, remote);
                self.shell.copy(local, &remote).await
            }
        }))
        .buffer_unordered(self.settings.copy_concurrency.max(1))
        .collect()
        .await;

        for result in results {
            if let Err(e) = result {
                log::error!("上传失败，路由器上的现有文件未改动：{}", e);
                return Err(e);
            }
        }
        Ok(())
    }

    async fn verify_packages(&self) -> Result<()> {
        let output = self.exec(LIST_INSTALLED).await?;
        let missing = missing_packages(&output.stdout, &self.settings.packages);
        if missing.is_empty() {
            Ok(())
        } else {
            Err(VRouterError::PackagesNotInstalled(missing))
        }
    }

    // 非零退出码或 stderr 有输出即失败，允许名单中的命令忽略 stderr
    async fn exec(&self, command: &str) -> Result<CommandOutput> {
        log::debug!("执行远程命令：{}", command);
        let output = self.shell.execute(command).await?;
        let tolerate = tolerates_stderr(command);
        if !output.is_success(tolerate) {
            return Err(VRouterError::Remote {
                command: command.to_string(),
                detail: output.describe_failure(),
            });
        }
        if tolerate && !output.stderr.trim().is_empty() {
            log::debug!("忽略 {} 的 stderr：{}", command, output.stderr.trim());
        }
        Ok(output)
    }

    // 只记录失败，不中止流程
    async fn exec_lenient(&self, command: &str) -> Result<()> {
        let output = self.shell.execute(command).await?;
        if !output.is_success(false) {
            log::warn!("{} 未完全成功：{}", command, output.describe_failure());
        }
        Ok(())
    }
}

fn generated(bundle: &Option<ArtifactBundle>, step: ProvisioningStep) -> Result<&ArtifactBundle> {
    bundle.as_ref().ok_or_else(|| VRouterError::StepOrder {
        step: step.to_string(),
        missing: ProvisioningStep::GenerateArtifacts.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::net::Ipv4Addr;
    use std::path::Path;
    use std::time::Duration;

    use crate::molecules::provisioning::ProgressEvent;
    use crate::molecules::router_config::profile::tests::sample_profile;
    use crate::molecules::router_config::{ProxyChain, ProxyVariant};
    use crate::molecules::rule_compiler::test_support::write_default_lists;

    // 记录所有命令与上传的假会话
    #[derive(Default)]
    struct RecordingShell {
        commands: Mutex<Vec<String>>,
        copies: Mutex<Vec<String>>,
        // 按前缀匹配的预设输出
        responses: Vec<(String, CommandOutput)>,
        // opkg list-installed 依次返回的内容，取完后重复最后一条
        installed: Mutex<VecDeque<String>>,
        fail_copy: Option<String>,
    }

    impl RecordingShell {
        fn respond(mut self, prefix: &str, output: CommandOutput) -> Self {
            self.responses.push((prefix.to_string(), output));
            self
        }

        fn commands(&self) -> Vec<String> {
            self.commands.lock().unwrap().clone()
        }

        fn copies(&self) -> Vec<String> {
            self.copies.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RemoteShell for RecordingShell {
        async fn execute(&self, command: &str) -> Result<CommandOutput> {
            self.commands.lock().unwrap().push(command.to_string());
            if command == LIST_INSTALLED {
                let mut installed = self.installed.lock().unwrap();
                let listing = if installed.len() > 1 {
                    installed.pop_front().unwrap_or_default()
                } else {
                    installed.front().cloned().unwrap_or_default()
                };
                return Ok(CommandOutput::ok(listing));
            }
            for (prefix, output) in &self.responses {
                if command.starts_with(prefix.as_str()) {
                    return Ok(output.clone());
                }
            }
            Ok(CommandOutput::ok(""))
        }

        async fn copy(&self, local: &Path, remote: &str) -> Result<()> {
            if let Some(bad) = &self.fail_copy
                && remote.contains(bad.as_str())
            {
                return Err(VRouterError::Transfer {
                    local: local.to_path_buf(),
                    remote: remote.to_string(),
                    detail: "connection reset".to_string(),
                });
            }
            assert!(local.exists());
            self.copies.lock().unwrap().push(remote.to_string());
            Ok(())
        }
    }

    struct Fixture {
        coordinator: RouterCoordinator<RecordingShell>,
        _dir: tempfile::TempDir,
    }

    fn fixture(shell: RecordingShell) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let lists = write_default_lists(dir.path());
        let mut settings = DeploySettings::new(lists, dir.path().join("staging"));
        settings.ready_retry = RetryPolicy::new(2, Duration::ZERO);
        settings.install_retry = RetryPolicy::new(3, Duration::ZERO);
        settings.packages = vec!["ipset".to_string(), "dnsmasq-full".to_string()];
        let coordinator =
            RouterCoordinator::new(shell, settings).with_resolver(ResolvedHosts::new());
        Fixture {
            coordinator,
            _dir: dir,
        }
    }

    fn position(commands: &[String], needle: &str) -> usize {
        commands
            .iter()
            .position(|c| c.contains(needle))
            .unwrap_or_else(|| panic!("未找到命令：{}", needle))
    }

    #[tokio::test]
    async fn test_apply_profile_runs_steps_in_order() {
        let f = fixture(RecordingShell::default());
        let profile = sample_profile();
        f.coordinator.apply_profile(&profile).await.unwrap();

        let commands = f.coordinator.shell().commands();
        let mkdir = position(&commands, "mkdir -p");
        let commit = position(&commands, "mv -f");
        let first_stop = position(&commands, " stop >/dev/null");
        let first_start = position(&commands, " start");
        let watchdog = position(&commands, "crontabs");
        let ipset = position(&commands, "ipset restore");
        let firewall = position(&commands, RESTART_FIREWALL);
        let dnsmasq = position(&commands, RESTART_DNSMASQ);

        assert!(mkdir < commit);
        assert!(commit < first_stop);
        assert!(first_stop < first_start);
        assert!(first_start < watchdog);
        assert!(watchdog < ipset);
        assert!(ipset < firewall);
        assert!(firewall < dnsmasq);
        assert_eq!(dnsmasq, commands.len() - 1);

        // 先停掉全部 7 个角色再启动
        let stops = commands.iter().filter(|c| c.contains(" stop >/dev/null")).count();
        assert_eq!(stops, 7);
        let starts: Vec<&String> = commands.iter().filter(|c| c.ends_with(" start")).collect();
        assert_eq!(starts.len(), 3);
        assert!(starts[0].contains("vrouter-kcptun"));

        assert_eq!(f.coordinator.state(), ApplyState::Idle);
        assert_eq!(f.coordinator.committed_profile(), Some(profile));
    }

    #[tokio::test]
    async fn test_two_phase_push() {
        let f = fixture(RecordingShell::default());
        f.coordinator.apply_profile(&sample_profile()).await.unwrap();

        let copies = f.coordinator.shell().copies();
        assert_eq!(copies.len(), 10);
        assert!(copies.iter().all(|c| c.ends_with(".vrouter-new")));
        assert!(copies.contains(&"/etc/firewall.user.vrouter-new".to_string()));

        let commands = f.coordinator.shell().commands();
        let commit = &commands[position(&commands, "mv -f")];
        assert!(commit.starts_with(
            "mv -f /etc/vrouter/custom.ipset.vrouter-new /etc/vrouter/custom.ipset && chmod 644 /etc/vrouter/custom.ipset"
        ));
        assert!(commit.contains("chmod 755 /etc/init.d/vrouter-ss "));
        assert_eq!(commands.iter().filter(|c| c.contains("mv -f")).count(), 1);
    }

    #[tokio::test]
    async fn test_switch_stops_ssr_before_starting_ss() {
        let f = fixture(RecordingShell::default());
        let mut ssr = sample_profile();
        ssr.proxies = ProxyChain::SSR;
        f.coordinator.apply_profile(&ssr).await.unwrap();
        let before = f.coordinator.shell().commands().len();

        let mut ss = sample_profile();
        ss.proxies = ProxyChain::SS;
        f.coordinator.apply_profile(&ss).await.unwrap();

        let commands = f.coordinator.shell().commands()[before..].to_vec();
        let ssr_stop = position(&commands, "/etc/init.d/vrouter-ssr stop");
        let ssr_dns_stop = position(&commands, "/etc/init.d/vrouter-ssr-dns stop");
        let ss_start = position(&commands, "/etc/init.d/vrouter-ss start");
        assert!(ssr_stop < ss_start);
        assert!(ssr_dns_stop < ss_start);
        assert!(!commands.iter().any(|c| c.contains("vrouter-ssr start")));
    }

    #[tokio::test]
    async fn test_stderr_aborts_and_keeps_previous_commit() {
        let shell = RecordingShell::default()
            .respond(RESTART_DNSMASQ, CommandOutput::failed(0, "dnsmasq: bad option"));
        let f = fixture(shell);
        let previous = sample_profile();
        f.coordinator.assume_committed(previous.clone());

        let mut next = sample_profile();
        next.name = "next".to_string();
        let err = f.coordinator.apply_profile(&next).await.unwrap_err();

        assert!(matches!(err, VRouterError::Remote { .. }));
        assert!(matches!(
            f.coordinator.state(),
            ApplyState::Failed {
                step: ProvisioningStep::RestartDnsmasq,
                ..
            }
        ));
        assert_eq!(f.coordinator.committed_profile(), Some(previous));
    }

    #[tokio::test]
    async fn test_firewall_restart_stderr_is_tolerated() {
        let shell = RecordingShell::default().respond(
            RESTART_FIREWALL,
            CommandOutput {
                stdout: String::new(),
                stderr: "Warning: Unable to locate ipset utility".to_string(),
                exit_code: Some(0),
            },
        );
        let f = fixture(shell);
        assert!(f.coordinator.apply_profile(&sample_profile()).await.is_ok());
    }

    #[tokio::test]
    async fn test_failed_upload_never_commits() {
        let shell = RecordingShell {
            fail_copy: Some("firewall.user".to_string()),
            ..Default::default()
        };
        let f = fixture(shell);
        let err = f.coordinator.apply_profile(&sample_profile()).await.unwrap_err();

        assert!(matches!(err, VRouterError::Transfer { .. }));
        let commands = f.coordinator.shell().commands();
        assert!(!commands.iter().any(|c| c.contains("mv -f")));
        assert!(!commands.iter().any(|c| c.contains(" stop")));
        assert_eq!(f.coordinator.committed_profile(), None);
    }

    #[tokio::test]
    async fn test_server_names_resolved_before_compile() {
        let mut f = fixture(RecordingShell::default());
        f.coordinator = f.coordinator.with_resolver(
            ResolvedHosts::new().with("vps.example.com", &[Ipv4Addr::new(5, 6, 7, 8)]),
        );
        let mut profile = sample_profile();
        if let Some(ss) = profile.shadowsocks.as_mut() {
            ss.address = "vps.example.com".to_string();
        }
        f.coordinator.apply_profile(&profile).await.unwrap();

        let staged = f.coordinator.settings().staging_dir.join("firewall.user");
        let script = std::fs::read_to_string(staged).unwrap();
        assert!(script.contains("-d 5.6.7.8 -j RETURN"));
    }

    #[tokio::test]
    async fn test_unresolvable_server_touches_nothing() {
        let f = fixture(RecordingShell::default());
        let mut profile = sample_profile();
        if let Some(ss) = profile.shadowsocks.as_mut() {
            ss.address = "nowhere.invalid".to_string();
        }
        let err = f.coordinator.apply_profile(&profile).await.unwrap_err();

        assert!(matches!(err, VRouterError::Resolve { .. }));
        assert!(f.coordinator.shell().commands().is_empty());
        assert!(f.coordinator.shell().copies().is_empty());
        assert_eq!(f.coordinator.committed_profile(), None);
    }

    #[tokio::test]
    async fn test_change_mode_only_touches_firewall() {
        let f = fixture(RecordingShell::default());
        assert!(matches!(
            f.coordinator.change_mode(BypassMode::Global).await,
            Err(VRouterError::Validation(_))
        ));

        f.coordinator.assume_committed(sample_profile());
        let profile = f.coordinator.change_mode(BypassMode::Blacklist).await.unwrap();
        assert_eq!(profile.mode, BypassMode::Blacklist);

        assert_eq!(f.coordinator.shell().copies().len(), 3);
        let commands = f.coordinator.shell().commands();
        assert!(!commands.iter().any(|c| c.contains(" stop") || c.ends_with(" start")));
        assert!(position(&commands, "ipset restore") < position(&commands, RESTART_FIREWALL));
        assert_eq!(
            f.coordinator.committed_profile().map(|p| p.mode),
            Some(BypassMode::Blacklist)
        );
    }

    #[tokio::test]
    async fn test_provision_retries_package_verification() {
        let shell = RecordingShell {
            installed: Mutex::new(VecDeque::from(vec![
                "ipset - 7.6-1\n".to_string(),
                "ipset - 7.6-1\ndnsmasq-full - 2.85-8\n".to_string(),
            ])),
            ..Default::default()
        };
        let f = fixture(shell);
        f.coordinator.provision().await.unwrap();

        let commands = f.coordinator.shell().commands();
        assert_eq!(commands[0], "true");
        assert_eq!(commands[1], OPKG_UPDATE);
        assert_eq!(commands[2], "opkg install ipset dnsmasq-full");
        assert_eq!(
            commands.iter().filter(|c| c.as_str() == LIST_INSTALLED).count(),
            2
        );
        assert!(commands.iter().any(|c| c.contains("conf-dir=/etc/dnsmasq.d")));
    }

    #[tokio::test]
    async fn test_provision_reports_missing_packages() {
        let shell = RecordingShell {
            installed: Mutex::new(VecDeque::from(vec!["ipset - 7.6-1\n".to_string()])),
            ..Default::default()
        }
        .respond("opkg install", CommandOutput::failed(255, "Unknown package"));
        let f = fixture(shell);

        match f.coordinator.provision().await {
            Err(VRouterError::PackagesNotInstalled(missing)) => {
                assert_eq!(missing, vec!["dnsmasq-full"]);
            }
            other => panic!("unexpected: {:?}", other),
        }
        let verifies = f
            .coordinator
            .shell()
            .commands()
            .iter()
            .filter(|c| c.as_str() == LIST_INSTALLED)
            .count();
        assert_eq!(verifies, 3);
    }

    #[tokio::test]
    async fn test_unreachable_router_is_retry_error() {
        let shell = RecordingShell::default().respond("true", CommandOutput::failed(255, "timeout"));
        let f = fixture(shell);
        assert!(matches!(
            f.coordinator.provision().await,
            Err(VRouterError::Retry { attempts: 2, .. })
        ));
    }

    #[tokio::test]
    async fn test_service_status_matches_full_cmdline() {
        let ps = "  PID USER       VSZ STAT COMMAND\n 1712 root      3044 S    /usr/bin/ss-redir -c /etc/vrouter/ss-client.json\n 1720 root      2980 S    /usr/bin/kcptun -c /etc/vrouter/kt-client.json\n";
        let shell = RecordingShell::default().respond(LIST_PROCESSES, CommandOutput::ok(ps));
        let f = fixture(shell);

        let status = f.coordinator.service_status().await.unwrap();
        let running: Vec<ProxyRole> = status.iter().filter(|s| s.running).map(|s| s.role).collect();
        assert_eq!(running, vec![ProxyRole::Shadowsocks, ProxyRole::Kcptun]);
        assert!(
            !status
                .iter()
                .find(|s| s.role == ProxyRole::RelayUdp(ProxyVariant::Shadowsocks))
                .unwrap()
                .running
        );
    }

    #[tokio::test]
    async fn test_progress_events_follow_steps() {
        let (reporter, mut receiver) = ProgressReporter::channel();
        let f = fixture(RecordingShell::default());
        let coordinator = f.coordinator.with_progress(reporter);
        coordinator.apply_profile(&sample_profile()).await.unwrap();
        drop(coordinator);

        let mut events: Vec<ProgressEvent> = Vec::new();
        while let Some(event) = receiver.recv().await {
            events.push(event);
        }
        assert_eq!(events.len(), ApplyPlan::apply_profile().steps().len());
        assert_eq!(events[0].stage, ApplyStage::GeneratingArtifacts);
        assert_eq!(events[events.len() - 1].stage, ApplyStage::RestartingDnsmasq);
    }
}
