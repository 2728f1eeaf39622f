// 部署编排分子模块：步骤状态机、远程命令构造、进度事件与重试策略

pub mod progress;
pub mod retry;
pub mod service_plan;
pub mod step;

pub use progress::{ProgressEvent, ProgressReporter};
pub use retry::RetryPolicy;
pub use step::{ApplyPlan, ApplyStage, ApplyState, ProvisioningStep};
