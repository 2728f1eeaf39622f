// 代理附加参数（others 字段）解析器
//
// 格式为 ";" 分隔的 key=value 对，例如 "sndwnd=256;rcvwnd=2048;nocomp=true"
// 类型转换规则：纯数字 → 整数，true/false → 布尔，其余为去掉首尾引号的字符串
// Kcptun 的配置解析器不接受带引号的数字和布尔值，因此必须按类型输出

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value as JsonValue};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtraValue {
    Int(i64),
    Bool(bool),
    Str(String),
}

impl ExtraValue {
    fn coerce(raw: &str) -> Self {
        let raw = raw.trim();
        if !raw.is_empty()
            && raw.chars().all(|c| c.is_ascii_digit())
            && let Ok(number) = raw.parse::<i64>()
        {
            return Self::Int(number);
        }
        match raw {
            "true" => Self::Bool(true),
            "false" => Self::Bool(false),
            _ => Self::Str(strip_quotes(raw).to_string()),
        }
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            Self::Int(number) => JsonValue::from(*number),
            Self::Bool(flag) => JsonValue::Bool(*flag),
            Self::Str(text) => JsonValue::String(text.clone()),
        }
    }
}

impl fmt::Display for ExtraValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(number) => write!(f, "{}", number),
            Self::Bool(flag) => write!(f, "{}", flag),
            Self::Str(text) => write!(f, "{}", text),
        }
    }
}

fn strip_quotes(raw: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = raw
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner;
        }
    }
    raw
}

// 有序的附加参数表，保留用户书写顺序
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtraOptions {
    entries: Vec<(String, ExtraValue)>,
}

impl ExtraOptions {
    // 解析 others 字符串，无 "=" 或键为空的片段直接忽略
    pub fn parse(input: &str) -> Self {
        let mut options = Self::default();
        for pair in input.split(';') {
            let Some((key, value)) = pair.split_once('=') else {
                if !pair.trim().is_empty() {
                    log::warn!("忽略无效的附加参数：{}", pair.trim());
                }
                continue;
            };
            let key = key.trim();
            if key.is_empty() {
                continue;
            }
            options.insert(key, ExtraValue::coerce(value));
        }
        options
    }

    // 同名键后写覆盖先写，位置保持首次出现处
    pub fn insert(&mut self, key: &str, value: ExtraValue) {
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| k == key) {
            slot.1 = value;
        } else {
            self.entries.push((key.to_string(), value));
        }
    }

    pub fn get(&self, key: &str) -> Option<&ExtraValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ExtraValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    // 合并到 JSON 配置对象，同名字段以附加参数为准
    pub fn merge_into(&self, target: &mut Map<String, JsonValue>) {
        for (key, value) in self.iter() {
            target.insert(key.to_string(), value.to_json());
        }
    }
}

impl fmt::Display for ExtraOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(";");
        f.write_str(&joined)
    }
}

// 持久化时仍使用字符串形式，与旧配置文件兼容
impl Serialize for ExtraOptions {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ExtraOptions {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse(&raw))
    }
}
