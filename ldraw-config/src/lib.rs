use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use ldraw_core::{CodeStandard, Palette, PaletteEntry};
use serde::Deserialize;
use thiserror::Error;

pub const CONFIG_ENV: &str = "LDRAW_DOM_CONFIG";

/// 应用配置的根结构。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub library: LibraryConfig,
    #[serde(default)]
    pub codegen: CodegenConfig,
    #[serde(default)]
    pub editor: EditorConfig,
}

impl AppConfig {
    /// 从显式路径加载配置。
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// 自动发现配置文件：优先读取环境变量 `LDRAW_DOM_CONFIG`，否则寻找 `./config/default.toml`。
    /// 若文件缺失，则返回默认配置。
    pub fn discover() -> Result<Self, ConfigError> {
        if let Some(path) = env::var_os(CONFIG_ENV) {
            return Self::from_file(PathBuf::from(path));
        }

        let default_path = env::current_dir()
            .map(|dir| dir.join("config").join("default.toml"))
            .map_err(|source| ConfigError::Context {
                message: "获取当前工作目录失败".to_string(),
                source,
            })?;

        if default_path.exists() {
            Self::from_file(default_path)
        } else {
            Ok(Self::default())
        }
    }
}

/// 日志配置，支持设置默认等级。
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
        }
    }
}

/// 零件库根目录；位于其下的文档视为已发布。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LibraryConfig {
    #[serde(default)]
    pub search_paths: Vec<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CodegenConfig {
    #[serde(default)]
    pub standard: CodeStandard,
    /// 叠加在 LDraw 基础调色板之上的颜色。
    #[serde(default)]
    pub palette: Vec<PaletteEntry>,
}

impl CodegenConfig {
    pub fn palette(&self) -> Palette {
        let mut palette = Palette::ldraw();
        palette.extend(self.palette.iter().cloned());
        palette
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EditorConfig {
    #[serde(default = "EditorConfig::default_undo_levels")]
    pub undo_levels: usize,
}

impl EditorConfig {
    fn default_undo_levels() -> usize {
        100
    }
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            undo_levels: Self::default_undo_levels(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("读取配置文件 {path:?} 失败: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("解析配置文件 {path:?} 失败: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("{message}")]
    Context {
        message: String,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_returned_when_file_missing() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.logging.level, "info");
        assert!(cfg.library.search_paths.is_empty());
        assert_eq!(cfg.codegen.standard, CodeStandard::Full);
        assert_eq!(cfg.codegen.palette().len(), Palette::ldraw().len());
        assert_eq!(cfg.editor.undo_levels, 100);
    }

    #[test]
    fn load_from_temp_file() {
        let mut file = tempfile::NamedTempFile::new().expect("create temp file");
        writeln!(
            file,
            r#"
            [logging]
            level = "debug"

            [library]
            search_paths = ["/usr/share/ldraw", "../parts"]

            [codegen]
            standard = "parts_library"

            [[codegen.palette]]
            code = 500
            name = "Custom_Teal"
            value = 0x00807F
            edge = 0x333333

            [editor]
            undo_levels = 20
            "#
        )
        .expect("write temp file");

        let cfg = AppConfig::from_file(file.path()).expect("load config");
        assert_eq!(cfg.logging.level, "debug");
        assert_eq!(cfg.library.search_paths.len(), 2);
        assert_eq!(cfg.codegen.standard, CodeStandard::PartsLibrary);
        let palette = cfg.codegen.palette();
        assert_eq!(palette.get(500).map(|entry| entry.alpha), Some(255));
        assert!(palette.contains(4));
        assert_eq!(cfg.editor.undo_levels, 20);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().expect("create temp file");
        writeln!(file, "[codegen]\nstandard = \"official_model_repository\"").expect("write temp file");
        let cfg = AppConfig::from_file(file.path()).expect("load config");
        assert_eq!(cfg.codegen.standard, CodeStandard::OfficialModelRepository);
        assert_eq!(cfg.logging.level, "info");
        assert_eq!(cfg.editor.undo_levels, 100);
    }

    #[test]
    fn invalid_standard_is_a_parse_error() {
        let mut file = tempfile::NamedTempFile::new().expect("create temp file");
        writeln!(file, "[codegen]\nstandard = \"fancy\"").expect("write temp file");
        assert!(matches!(
            AppConfig::from_file(file.path()),
            Err(ConfigError::Parse { .. })
        ));
        assert!(matches!(
            AppConfig::from_file("/definitely/not/here.toml"),
            Err(ConfigError::Io { .. })
        ));
    }
}
