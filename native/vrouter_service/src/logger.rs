// 日志初始化：env_logger 输出到 stderr，同时追加到日志文件并在内存中保留最近的日志行

use env_logger::Env;
use once_cell::sync::Lazy;
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

// 内存中保留的最大行数
const RING_CAPACITY: usize = 1000;

static RECENT_LOGS: Lazy<Mutex<VecDeque<String>>> =
    Lazy::new(|| Mutex::new(VecDeque::with_capacity(RING_CAPACITY)));

static LOG_FILE: Lazy<Mutex<Option<File>>> = Lazy::new(|| Mutex::new(None));

// 多次调用只有第一次生效
pub fn init_logger() {
    open_log_file(&vrouter_hub::services::path_service::log_file());

    let result = env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format(|buf, record| {
            let line = format_line(
                &chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f").to_string(),
                record.level(),
                record.target(),
                &record.args().to_string(),
            );
            append_to_file(&line);
            push_recent(line.clone());
            writeln!(buf, "{}", line)
        })
        .try_init();

    if result.is_ok() {
        log::debug!("日志系统已初始化");
    }
}

fn format_line(timestamp: &str, level: log::Level, target: &str, message: &str) -> String {
    format!("{} [{:<5}] {}: {}", timestamp, level, target, message)
}

fn open_log_file(path: &Path) {
    if let Some(parent) = path.parent()
        && std::fs::create_dir_all(parent).is_err()
    {
        return;
    }
    match OpenOptions::new().create(true).append(true).open(path) {
        Ok(file) => {
            if let Ok(mut slot) = LOG_FILE.lock() {
                *slot = Some(file);
            }
        }
        Err(e) => eprintln!("[logger] 无法打开日志文件 {}：{}", path.display(), e),
    }
}

// 写入失败时放弃文件输出，stderr 不受影响
fn append_to_file(line: &str) {
    if let Ok(mut slot) = LOG_FILE.lock()
        && let Some(file) = slot.as_mut()
        && writeln!(file, "{}", line).is_err()
    {
        *slot = None;
    }
}

// 日志文件最后 n 行
pub fn read_log_tail(path: &Path, n: usize) -> std::io::Result<Vec<String>> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };
    let lines: Vec<&str> = content.lines().collect();
    let skip = lines.len().saturating_sub(n);
    Ok(lines[skip..].iter().map(|l| l.to_string()).collect())
}

fn push_recent(line: String) {
    let mut ring = match RECENT_LOGS.lock() {
        Ok(ring) => ring,
        Err(poisoned) => poisoned.into_inner(),
    };
    if ring.len() >= RING_CAPACITY {
        ring.pop_front();
    }
    ring.push_back(line);
}

// 最近 n 行，按时间先后排列
pub fn get_recent_logs(n: usize) -> Vec<String> {
    let ring = match RECENT_LOGS.lock() {
        Ok(ring) => ring,
        Err(poisoned) => poisoned.into_inner(),
    };
    let skip = ring.len().saturating_sub(n);
    ring.iter().skip(skip).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_keeps_latest_lines() {
        for i in 0..(RING_CAPACITY + 5) {
            push_recent(format!("line {}", i));
        }
        let recent = get_recent_logs(3);
        assert_eq!(
            recent,
            vec![
                format!("line {}", RING_CAPACITY + 2),
                format!("line {}", RING_CAPACITY + 3),
                format!("line {}", RING_CAPACITY + 4),
            ]
        );
        assert_eq!(get_recent_logs(usize::MAX).len(), RING_CAPACITY);
    }

    #[test]
    fn test_log_tail() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vrouter.log");
        assert!(read_log_tail(&path, 5).unwrap().is_empty());

        std::fs::write(&path, "a\nb\nc\n").unwrap();
        assert_eq!(read_log_tail(&path, 2).unwrap(), vec!["b", "c"]);
        assert_eq!(read_log_tail(&path, 10).unwrap().len(), 3);
    }

    #[test]
    fn test_line_format() {
        let line = format_line(
            "2024-05-01 10:00:00.000",
            log::Level::Warn,
            "vrouter_hub",
            "重试",
        );
        assert_eq!(line, "2024-05-01 10:00:00.000 [WARN ] vrouter_hub: 重试");
    }
}
