use std::path::PathBuf;

use ldraw_config::{AppConfig, ConfigError};
use ldraw_core::CodeStandard;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

fn main() {
    let mut args = std::env::args().skip(1);
    let mut standard_override: Option<CodeStandard> = None;
    let mut config_override: Option<PathBuf> = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let Some(path) = args.next() else {
                    eprintln!("`--config` 需要提供配置文件路径");
                    std::process::exit(1);
                };
                config_override = Some(PathBuf::from(path));
            }
            "--standard" => {
                let Some(value) = args.next() else {
                    eprintln!("`--standard` 需要提供 full、omr 或 parts_library");
                    std::process::exit(1);
                };
                let Some(standard) = parse_standard(&value) else {
                    eprintln!("未知的代码标准：{value}");
                    std::process::exit(1);
                };
                standard_override = Some(standard);
            }
            other => {
                eprintln!("未知参数：{other}");
                std::process::exit(1);
            }
        }
    }

    let mut config = load_configuration(config_override);
    init_logging(&config);
    if let Some(standard) = standard_override {
        config.codegen.standard = standard;
    }
    info!(standard = ?config.codegen.standard, "启动 LDraw 文档模型演示");

    if let Err(err) = ldraw_frontend::run_cli_demo(&config) {
        error!(error = %err, "执行 CLI 演示失败");
        std::process::exit(1);
    }
}

fn parse_standard(value: &str) -> Option<CodeStandard> {
    match value {
        "full" => Some(CodeStandard::Full),
        "omr" | "official_model_repository" => Some(CodeStandard::OfficialModelRepository),
        "parts_library" => Some(CodeStandard::PartsLibrary),
        _ => None,
    }
}

fn load_configuration(override_path: Option<PathBuf>) -> AppConfig {
    match override_path {
        Some(path) => AppConfig::from_file(&path).unwrap_or_else(|err| {
            warn!(path = %path.display(), error = %err, "加载指定配置失败，使用默认配置");
            AppConfig::default()
        }),
        None => match AppConfig::discover() {
            Ok(cfg) => cfg,
            Err(err) => {
                match &err {
                    ConfigError::Io { path, .. } | ConfigError::Parse { path, .. } => {
                        warn!(path = %path.display(), error = %err, "加载默认配置失败，使用内建默认值");
                    }
                    ConfigError::Context { .. } => {
                        warn!(error = %err, "加载默认配置失败，使用内建默认值");
                    }
                }
                AppConfig::default()
            }
        },
    }
}

fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_new(config.logging.level.clone()).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(filter);
    if subscriber.try_init().is_err() {
        // 已初始化，忽略
    }
}
