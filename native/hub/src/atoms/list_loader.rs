// 域名/IP 列表加载器：读取纯文本列表，跳过注释与空行。
// IP 集合与 dnsmasq 两个消费方各自再做一次过滤。

use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use crate::error::{Result, VRouterError};

// 正则为常量，编译失败时视为不匹配
static CIDR_PATTERN: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^\d+\.\d+\.\d+\.\d+(/\d+)?$").ok());

static DOMAIN_PATTERN: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(
        r"^(?:[A-Za-z0-9_](?:[A-Za-z0-9_-]*[A-Za-z0-9])?\.)*[A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?$",
    )
    .ok()
});

// 读取列表文件，返回去除首尾空白后的非空、非注释行
pub fn load(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path).map_err(|source| VRouterError::ListRead {
        path: path.to_path_buf(),
        source,
    })?;

    let entries: Vec<String> = clean_lines(&content).map(str::to_string).collect();
    log::debug!("加载列表 {:?}：{} 条", path, entries.len());
    Ok(entries)
}

// 优先读取用户列表，不存在时回退到随包模板
pub fn load_or_template(path: &Path, template: &Path) -> Result<Vec<String>> {
    match load(path) {
        Ok(entries) => Ok(entries),
        Err(VRouterError::ListRead { source, .. })
            if source.kind() == std::io::ErrorKind::NotFound =>
        {
            log::warn!("列表 {:?} 不存在，使用模板 {:?}", path, template);
            load(template)
        }
        Err(e) => Err(e),
    }
}

// IP 集合用：只保留合法的 a.b.c.d 或 a.b.c.d/n 条目
pub fn load_cidrs(path: &Path, template: &Path) -> Result<Vec<String>> {
    Ok(load_or_template(path, template)?
        .into_iter()
        .filter(|line| is_ipv4_cidr(line))
        .collect())
}

// dnsmasq 用：剔除 IP 条目，只保留合法域名
pub fn load_domains(path: &Path, template: &Path) -> Result<Vec<String>> {
    Ok(load_or_template(path, template)?
        .iter()
        .filter_map(|line| normalize_domain(line))
        .collect())
}

// 形状匹配后再校验每段不超过 255、前缀不超过 32
pub fn is_ipv4_cidr(entry: &str) -> bool {
    looks_like_ipv4(entry) && parse_cidr(entry).is_some()
}

fn looks_like_ipv4(entry: &str) -> bool {
    CIDR_PATTERN
        .as_ref()
        .is_some_and(|pattern| pattern.is_match(entry))
}

fn parse_cidr(entry: &str) -> Option<(Ipv4Addr, u8)> {
    let (addr, prefix) = match entry.split_once('/') {
        Some((addr, prefix)) => (addr, prefix.parse::<u8>().ok()?),
        None => (entry, 32),
    };
    let addr = addr.parse::<Ipv4Addr>().ok()?;
    (prefix <= 32).then_some((addr, prefix))
}

// gfwlist 风格的 ".example.com" 去掉前导点，域名统一转小写
pub fn normalize_domain(entry: &str) -> Option<String> {
    if looks_like_ipv4(entry) {
        return None;
    }
    let domain = entry.trim_start_matches('.').trim_end_matches('.');
    let matches = DOMAIN_PATTERN
        .as_ref()
        .is_some_and(|pattern| pattern.is_match(domain));
    // 顶级域必须含字母，排除 "1.2.3" 这类残缺 IP
    let has_alpha_tld = domain
        .rsplit('.')
        .next()
        .is_some_and(|tld| tld.chars().any(|c| c.is_ascii_alphabetic()));
    if !matches || !has_alpha_tld {
        return None;
    }
    Some(domain.to_ascii_lowercase())
}

fn clean_lines(content: &str) -> impl Iterator<Item = &str> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
}

// 用户列表目录与随包模板目录，同名文件一一对应
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListDirs {
    pub list_dir: PathBuf,
    pub template_dir: PathBuf,
}

impl ListDirs {
    pub fn new(list_dir: impl Into<PathBuf>, template_dir: impl Into<PathBuf>) -> Self {
        Self {
            list_dir: list_dir.into(),
            template_dir: template_dir.into(),
        }
    }

    pub fn cidrs(&self, file_name: &str) -> Result<Vec<String>> {
        load_cidrs(&self.list_dir.join(file_name), &self.template_dir.join(file_name))
    }

    pub fn domains(&self, file_name: &str) -> Result<Vec<String>> {
        load_domains(&self.list_dir.join(file_name), &self.template_dir.join(file_name))
    }
}
