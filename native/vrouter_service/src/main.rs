// VRouter 命令行入口

fn main() {
    if let Err(e) = vrouter_service::cli() {
        eprintln!("错误: {:#}", e);
        std::process::exit(1);
    }
}
