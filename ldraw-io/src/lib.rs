use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use ldraw_core::{Dom, DomError, NodeId};
use thiserror::Error;
use tracing::info;

pub mod codegen;
mod format;
mod header;

pub use codegen::{CodeOptions, LINE_ENDING, join_lines, to_code, to_lines};
pub use format::format_number;
pub use header::{KEYWORDS_WIDTH, wrap_keywords};

#[derive(Debug, Error)]
pub enum IoError {
    #[error(transparent)]
    Dom(#[from] DomError),
    #[error("failed to write file {path:?}: {source}")]
    WriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write output {target}: {source}")]
    OutputError {
        target: String,
        #[source]
        source: std::io::Error,
    },
}

pub trait DocumentSaver {
    fn save(&self, dom: &Dom, document: NodeId, path: &Path) -> Result<(), IoError>;
}

/// 保存、导出与发布。
///
/// 导出与发布通过调用方提供的工厂 `target_name -> Write` 获取输出，
/// 每个输出文件调用一次；写入器的刷新与关闭由调用方负责。
#[derive(Debug, Clone, Default)]
pub struct LDrawFacade {
    options: CodeOptions,
}

impl LDrawFacade {
    pub fn new(options: CodeOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &CodeOptions {
        &self.options
    }

    pub fn code(&self, dom: &Dom, node: NodeId) -> Result<String, IoError> {
        to_code(dom, node, &self.options)
    }

    /// 每个页面单独输出一次，文件名为页面的 `TargetName`。返回输出的文件名。
    pub fn export<F, W>(&self, dom: &Dom, document: NodeId, factory: F) -> Result<Vec<String>, IoError>
    where
        F: FnMut(&str) -> std::io::Result<W>,
        W: Write,
    {
        let pages = dom.pages(document)?;
        if pages.is_empty() {
            return Err(codegen::empty_document(document));
        }
        let mut outputs = Vec::with_capacity(pages.len());
        for page in pages {
            outputs.push((
                dom.target_name(*page)?,
                codegen::page_lines(dom, *page, &self.options, false)?,
            ));
        }
        emit_all(outputs, factory)
    }

    /// 与导出相同，但 `InlineOnPublish` 页面不单独输出，而是展开到引用它们的页面中。
    pub fn publish<F, W>(&self, dom: &Dom, document: NodeId, factory: F) -> Result<Vec<String>, IoError>
    where
        F: FnMut(&str) -> std::io::Result<W>,
        W: Write,
    {
        let pages = dom.pages(document)?;
        if pages.is_empty() {
            return Err(codegen::empty_document(document));
        }
        let mut outputs = Vec::new();
        for page in pages {
            if dom.page(*page)?.inline_on_publish {
                continue;
            }
            outputs.push((
                dom.target_name(*page)?,
                codegen::page_lines(dom, *page, &self.options, true)?,
            ));
        }
        if outputs.is_empty() {
            return Err(DomError::InvalidOperation(format!(
                "every page of document {document} is inlined on publish"
            ))
            .into());
        }
        emit_all(outputs, factory)
    }
}

impl DocumentSaver for LDrawFacade {
    fn save(&self, dom: &Dom, document: NodeId, path: &Path) -> Result<(), IoError> {
        let code = join_lines(&codegen::document_lines(dom, document, &self.options)?);
        fs::write(path, code).map_err(|source| IoError::WriteError {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), "保存文档");
        Ok(())
    }
}

/// 全部内容生成成功后才开始写出。
fn emit_all<F, W>(outputs: Vec<(String, Vec<String>)>, mut factory: F) -> Result<Vec<String>, IoError>
where
    F: FnMut(&str) -> std::io::Result<W>,
    W: Write,
{
    let mut written = Vec::with_capacity(outputs.len());
    for (target, lines) in outputs {
        let output_error = |source| IoError::OutputError {
            target: target.clone(),
            source,
        };
        let mut writer = factory(&target).map_err(output_error)?;
        writer.write_all(join_lines(&lines).as_bytes()).map_err(output_error)?;
        info!(target = %target, lines = lines.len(), "写出文件");
        written.push(target);
    }
    Ok(written)
}
