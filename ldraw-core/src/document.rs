use serde::{Deserialize, Serialize};

use crate::errors::{DomError, DomResult};

pub const DEFAULT_FILEPATH: &str = "Untitled";

/// 代码生成标准，决定输出哪些头部字段以及是否允许多页面文档。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeStandard {
    #[default]
    Full,
    OfficialModelRepository,
    PartsLibrary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentStatus {
    Private,
    Released,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentData {
    pub filepath: String,
}

impl Default for DocumentData {
    fn default() -> Self {
        Self {
            filepath: DEFAULT_FILEPATH.to_string(),
        }
    }
}

/// 文件路径只允许文件系统合法字符；盘符后的 `:` 例外。
pub fn validate_filepath(path: &str) -> DomResult<()> {
    if path.trim().is_empty() {
        return Err(DomError::InvalidArgument("filepath must not be empty".to_string()));
    }
    for (index, c) in path.chars().enumerate() {
        let drive_colon = c == ':' && index == 1 && path.starts_with(|first: char| first.is_ascii_alphabetic());
        if c.is_control() || matches!(c, '<' | '>' | '"' | '|' | '?' | '*') || (c == ':' && !drive_colon) {
            return Err(DomError::InvalidArgument(format!(
                "filepath '{path}' contains illegal character {c:?}"
            )));
        }
    }
    Ok(())
}
