// VRouter 核心库
//
// 分层：atoms（无状态工具）→ molecules（功能单元）→ coordinator（编排），
// services 负责本地持久化配置与路径。

pub mod atoms;
pub mod coordinator;
pub mod error;
pub mod molecules;
pub mod services;

pub use coordinator::{DeploySettings, RoleStatus, RouterCoordinator};
pub use error::{Result, VRouterError};
