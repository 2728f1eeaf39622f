// 基础原子模块：无业务状态的叶子工具

pub mod extra_options;
pub mod host_resolver;
pub mod list_loader;
pub mod remote_shell;

pub use extra_options::{ExtraOptions, ExtraValue};
pub use host_resolver::{HostResolver, ResolvedHosts, SystemResolver};
pub use list_loader::ListDirs;
pub use remote_shell::{CommandOutput, RemoteShell};
