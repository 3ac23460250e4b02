pub mod cli;
pub mod errors;
pub mod loader;
pub mod resource_locator;

use errors::FrontendError;
use ldraw_config::AppConfig;
use tracing::info;

/// 启动 CLI 演示或返回错误。
pub fn run_cli_demo(config: &AppConfig) -> Result<(), FrontendError> {
    info!(standard = ?config.codegen.standard, "启动 CLI 演示前端");
    cli::run_demo(config)
}
