//! 撤销/重做栈。
//!
//! 文档模型本身只在命令期间把每次修改记录为 [`Edit`]；本模块在 `start_command` /
//! `end_command` 之间收集这些记录，撤销时按逆序应用它们的逆操作。

use ldraw_core::{Dom, DomResult, Edit};
use tracing::{debug, warn};

use crate::errors::EngineError;

/// 作为一个撤销步骤的一组编辑。
#[derive(Debug, Clone)]
pub struct EditBatch {
    /// 按应用顺序排列。
    pub edits: Vec<Edit>,
    pub description: Option<String>,
}

impl EditBatch {
    pub fn new(edits: Vec<Edit>) -> Self {
        Self {
            edits,
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.edits.iter().all(Edit::is_empty)
    }

    fn revert(&self, dom: &mut Dom) -> DomResult<()> {
        for edit in self.edits.iter().rev() {
            dom.apply_edit(&edit.inverse())?;
        }
        Ok(())
    }

    fn reapply(&self, dom: &mut Dom) -> DomResult<()> {
        for edit in &self.edits {
            dom.apply_edit(edit)?;
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct UndoStack {
    undo_stack: Vec<EditBatch>,
    redo_stack: Vec<EditBatch>,
    /// 0 表示不限。
    max_levels: usize,
    depth: u32,
    description: Option<String>,
}

impl UndoStack {
    pub fn new() -> Self {
        Self::with_max_levels(100)
    }

    pub fn with_max_levels(max_levels: usize) -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            max_levels,
            depth: 0,
            description: None,
        }
    }

    /// 开始一个命令。嵌套调用只有最外层生效。
    pub fn start_command(&mut self, dom: &mut Dom, description: impl Into<String>) {
        if self.depth == 0 {
            dom.start_recording();
            self.description = Some(description.into());
        }
        self.depth += 1;
    }

    /// 结束命令；最外层结束时若有修改则压入撤销栈，返回是否压入。
    pub fn end_command(&mut self, dom: &mut Dom) -> Result<bool, EngineError> {
        if self.depth == 0 {
            return Err(EngineError::CommandNotStarted);
        }
        self.depth -= 1;
        if self.depth > 0 {
            return Ok(false);
        }
        let mut batch = EditBatch::new(dom.finish_recording());
        batch.description = self.description.take();
        if batch.is_empty() {
            return Ok(false);
        }
        debug!(description = ?batch.description, edits = batch.edits.len(), "记录撤销步骤");
        self.push_batch(batch);
        Ok(true)
    }

    /// 放弃当前命令并撤回其中已经生效的修改。
    pub fn cancel_command(&mut self, dom: &mut Dom) -> Result<(), EngineError> {
        if self.depth == 0 {
            return Err(EngineError::CommandNotStarted);
        }
        self.depth = 0;
        let batch = EditBatch::new(dom.finish_recording());
        let description = self.description.take();
        if !batch.is_empty() {
            debug!(description = ?description, edits = batch.edits.len(), "命令失败，回滚");
            batch.revert(dom)?;
        }
        Ok(())
    }

    #[inline]
    pub fn in_command(&self) -> bool {
        self.depth > 0
    }

    fn push_batch(&mut self, batch: EditBatch) {
        self.undo_stack.push(batch);
        if self.max_levels > 0 && self.undo_stack.len() > self.max_levels {
            self.undo_stack.remove(0);
        }
        self.redo_stack.clear();
    }

    pub fn undo(&mut self, dom: &mut Dom) -> Result<bool, EngineError> {
        let Some(batch) = self.undo_stack.pop() else {
            return Ok(false);
        };
        if let Err(err) = batch.revert(dom) {
            warn!(description = ?batch.description, error = %err, "撤销失败，历史记录已丢弃");
            self.clear();
            return Err(err.into());
        }
        self.redo_stack.push(batch);
        Ok(true)
    }

    pub fn redo(&mut self, dom: &mut Dom) -> Result<bool, EngineError> {
        let Some(batch) = self.redo_stack.pop() else {
            return Ok(false);
        };
        if let Err(err) = batch.reapply(dom) {
            warn!(description = ?batch.description, error = %err, "重做失败，历史记录已丢弃");
            self.clear();
            return Err(err.into());
        }
        self.undo_stack.push(batch);
        Ok(true)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_levels(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_levels(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }

    pub fn undo_description(&self) -> Option<&str> {
        self.undo_stack.last().and_then(|batch| batch.description.as_deref())
    }

    pub fn redo_description(&self) -> Option<&str> {
        self.redo_stack.last().and_then(|batch| batch.description.as_deref())
    }
}

impl Default for UndoStack {
    fn default() -> Self {
        Self::new()
    }
}
