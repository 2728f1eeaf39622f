// 分子模块：路由配置模型、规则编译器与部署编排

pub mod provisioning;
pub mod router_config;
pub mod rule_compiler;
