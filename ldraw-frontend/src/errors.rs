use ldraw_core::DomError;
use ldraw_engine::errors::EngineError;
use ldraw_io::IoError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrontendError {
    #[error(transparent)]
    Dom(#[from] DomError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Io(#[from] IoError),
    #[error("命令 `{name}` 执行失败: {message}")]
    Command { name: String, message: String },
}
