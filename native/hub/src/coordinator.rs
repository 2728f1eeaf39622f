// L2 协调层模块入口

pub mod router_coordinator;

pub use router_coordinator::{DeploySettings, RoleStatus, RouterCoordinator};
