// 部署步骤状态机
//
// 每个步骤声明两类前置条件：
// depends_on：必须出现在计划中且排在前面
// runs_after：若出现在计划中则必须排在前面
// ApplyPlan 在构造时检查这些约束，错误的顺序无法被执行。

use std::fmt;

use crate::error::{Result, VRouterError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProvisioningStep {
    GenerateArtifacts,
    StageArtifacts,
    CommitArtifacts,
    StopServices,
    StartServices,
    InstallWatchdog,
    RestoreIpset,
    RestartFirewall,
    RestartDnsmasq,
}

// 对外展示的阶段，多个步骤可能属于同一阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApplyStage {
    WaitingForRouter,
    InstallingPackages,
    GeneratingArtifacts,
    PushingConfigs,
    TogglingServices,
    RestartingFirewall,
    RestartingDnsmasq,
}

impl fmt::Display for ApplyStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::WaitingForRouter => "waiting-for-router",
            Self::InstallingPackages => "installing-packages",
            Self::GeneratingArtifacts => "generating-artifacts",
            Self::PushingConfigs => "pushing-configs",
            Self::TogglingServices => "toggling-services",
            Self::RestartingFirewall => "restarting-firewall",
            Self::RestartingDnsmasq => "restarting-dnsmasq",
        };
        f.write_str(name)
    }
}

impl ProvisioningStep {
    pub fn name(&self) -> &'static str {
        match self {
            Self::GenerateArtifacts => "generate-artifacts",
            Self::StageArtifacts => "stage-artifacts",
            Self::CommitArtifacts => "commit-artifacts",
            Self::StopServices => "stop-services",
            Self::StartServices => "start-services",
            Self::InstallWatchdog => "install-watchdog",
            Self::RestoreIpset => "restore-ipset",
            Self::RestartFirewall => "restart-firewall",
            Self::RestartDnsmasq => "restart-dnsmasq",
        }
    }

    pub fn stage(&self) -> ApplyStage {
        match self {
            Self::GenerateArtifacts => ApplyStage::GeneratingArtifacts,
            Self::StageArtifacts | Self::CommitArtifacts => ApplyStage::PushingConfigs,
            Self::StopServices | Self::StartServices | Self::InstallWatchdog => {
                ApplyStage::TogglingServices
            }
            Self::RestoreIpset | Self::RestartFirewall => ApplyStage::RestartingFirewall,
            Self::RestartDnsmasq => ApplyStage::RestartingDnsmasq,
        }
    }

    pub fn depends_on(&self) -> &'static [ProvisioningStep] {
        use ProvisioningStep::{
            CommitArtifacts, GenerateArtifacts, RestoreIpset, StageArtifacts, StartServices,
            StopServices,
        };
        match self {
            Self::GenerateArtifacts => &[],
            Self::StageArtifacts => &[GenerateArtifacts],
            Self::CommitArtifacts => &[StageArtifacts],
            Self::StopServices => &[CommitArtifacts],
            // 同端口的 ss/ssr 必须先停后启
            Self::StartServices => &[StopServices],
            Self::InstallWatchdog => &[StartServices],
            Self::RestoreIpset => &[CommitArtifacts],
            // iptables 引用的集合必须先存在
            Self::RestartFirewall => &[RestoreIpset],
            Self::RestartDnsmasq => &[CommitArtifacts],
        }
    }

    pub fn runs_after(&self) -> &'static [ProvisioningStep] {
        use ProvisioningStep::{InstallWatchdog, RestartFirewall, StartServices, StopServices};
        match self {
            Self::RestartFirewall => &[StopServices, StartServices, InstallWatchdog],
            Self::RestartDnsmasq => &[StopServices, StartServices, InstallWatchdog, RestartFirewall],
            _ => &[],
        }
    }
}

impl fmt::Display for ProvisioningStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyPlan {
    steps: Vec<ProvisioningStep>,
}

impl ApplyPlan {
    pub fn new(steps: Vec<ProvisioningStep>) -> Result<Self> {
        for (index, step) in steps.iter().enumerate() {
            let earlier = &steps[..index];
            if earlier.contains(step) {
                return Err(VRouterError::StepOrder {
                    step: step.to_string(),
                    missing: format!("{}（重复）", step),
                });
            }
            for required in step.depends_on() {
                if !earlier.contains(required) {
                    return Err(VRouterError::StepOrder {
                        step: step.to_string(),
                        missing: required.to_string(),
                    });
                }
            }
            for before in step.runs_after() {
                if steps[index..].contains(before) {
                    return Err(VRouterError::StepOrder {
                        step: step.to_string(),
                        missing: before.to_string(),
                    });
                }
            }
        }
        Ok(Self { steps })
    }

    // 完整的应用配置档流程
    pub fn apply_profile() -> Self {
        use ProvisioningStep::{
            CommitArtifacts, GenerateArtifacts, InstallWatchdog, RestartDnsmasq, RestartFirewall,
            RestoreIpset, StageArtifacts, StartServices, StopServices,
        };
        Self {
            steps: vec![
                GenerateArtifacts,
                StageArtifacts,
                CommitArtifacts,
                StopServices,
                StartServices,
                InstallWatchdog,
                RestoreIpset,
                RestartFirewall,
                RestartDnsmasq,
            ],
        }
    }

    // 只切换绕行模式：不动代理服务
    pub fn change_mode() -> Self {
        use ProvisioningStep::{
            CommitArtifacts, GenerateArtifacts, RestartDnsmasq, RestartFirewall, RestoreIpset,
            StageArtifacts,
        };
        Self {
            steps: vec![
                GenerateArtifacts,
                StageArtifacts,
                CommitArtifacts,
                RestoreIpset,
                RestartFirewall,
                RestartDnsmasq,
            ],
        }
    }

    pub fn steps(&self) -> &[ProvisioningStep] {
        &self.steps
    }

    pub fn contains(&self, step: ProvisioningStep) -> bool {
        self.steps.contains(&step)
    }
}

// 协调器当前所处的状态
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ApplyState {
    #[default]
    Idle,
    Running(ProvisioningStep),
    Failed {
        step: ProvisioningStep,
        error: String,
    },
}

impl ApplyState {
    pub fn stage(&self) -> Option<ApplyStage> {
        match self {
            Self::Running(step) => Some(step.stage()),
            _ => None,
        }
    }
}
