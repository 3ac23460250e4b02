pub mod command;
pub mod undo;

pub mod errors {
    use ldraw_core::DomError;
    use thiserror::Error;

    #[derive(Debug, Error)]
    pub enum EngineError {
        #[error(transparent)]
        Dom(#[from] DomError),
        #[error("no active document")]
        NoActiveDocument,
        #[error("node {0} not found")]
        NodeNotFound(u64),
        #[error("end_command called without start_command")]
        CommandNotStarted,
    }
}

pub mod session {
    use ldraw_core::geometry::Bounds3D;
    use ldraw_core::{Dom, DomResult, NodeId, NodeKind};
    use tracing::{debug, info};

    use crate::errors::EngineError;
    use crate::undo::UndoStack;

    /// 编辑会话：持有文档模型、撤销栈、当前文档与选中集。
    #[derive(Debug)]
    pub struct Session {
        dom: Dom,
        undo: UndoStack,
        active: Option<NodeId>,
        selected: Vec<NodeId>,
    }

    impl Session {
        pub fn new() -> Self {
            Self::with_undo_levels(100)
        }

        pub fn with_undo_levels(levels: usize) -> Self {
            Self::with_dom(Dom::new(), levels)
        }

        pub fn with_dom(dom: Dom, levels: usize) -> Self {
            Self {
                dom,
                undo: UndoStack::with_max_levels(levels),
                active: None,
                selected: Vec::new(),
            }
        }

        #[inline]
        pub fn dom(&self) -> &Dom {
            &self.dom
        }

        /// 直接访问文档模型；此处的修改不进入撤销栈。
        #[inline]
        pub fn dom_mut(&mut self) -> &mut Dom {
            &mut self.dom
        }

        #[inline]
        pub fn undo_stack(&self) -> &UndoStack {
            &self.undo
        }

        /// 切换当前文档，并清空选中集与撤销历史。
        pub fn open_document(&mut self, document: NodeId) -> Result<(), EngineError> {
            self.dom.document(document)?;
            self.active = Some(document);
            self.selected.clear();
            self.undo.clear();
            info!(document = document.get(), filepath = %self.dom.document(document)?.filepath, "打开文档");
            Ok(())
        }

        pub fn active_document(&self) -> Result<NodeId, EngineError> {
            self.active.ok_or(EngineError::NoActiveDocument)
        }

        /// 在一个撤销步骤内执行修改；失败时撤回已生效的部分。
        /// 有当前文档时，整个命令只产生一次汇总的 `DocumentTreeChanged`。
        pub fn execute<T>(
            &mut self,
            description: &str,
            action: impl FnOnce(&mut Dom) -> DomResult<T>,
        ) -> Result<T, EngineError> {
            let document = self.active.filter(|document| !self.dom.is_disposed(*document));
            if let Some(document) = document {
                self.dom.begin_update(document)?;
            }
            self.undo.start_command(&mut self.dom, description);
            let result = match action(&mut self.dom) {
                Ok(value) => self.undo.end_command(&mut self.dom).map(|_| value),
                Err(err) => {
                    debug!(command = description, error = %err, "命令失败");
                    self.undo.cancel_command(&mut self.dom).and(Err(err.into()))
                }
            };
            if let Some(document) = document {
                self.dom.end_update(document)?;
            }
            result
        }

        pub fn undo(&mut self) -> Result<bool, EngineError> {
            let description = self.undo.undo_description().map(str::to_owned);
            let document = self.active;
            let done = self.bracketed(document, |dom, undo| undo.undo(dom))?;
            if done {
                info!(command = ?description, "已撤销");
                self.prune_selection();
            }
            Ok(done)
        }

        pub fn redo(&mut self) -> Result<bool, EngineError> {
            let description = self.undo.redo_description().map(str::to_owned);
            let document = self.active;
            let done = self.bracketed(document, |dom, undo| undo.redo(dom))?;
            if done {
                info!(command = ?description, "已重做");
                self.prune_selection();
            }
            Ok(done)
        }

        fn bracketed(
            &mut self,
            document: Option<NodeId>,
            action: impl FnOnce(&mut Dom, &mut UndoStack) -> Result<bool, EngineError>,
        ) -> Result<bool, EngineError> {
            let document = document.filter(|document| !self.dom.is_disposed(*document));
            if let Some(document) = document {
                self.dom.begin_update(document)?;
            }
            let result = action(&mut self.dom, &mut self.undo);
            if let Some(document) = document {
                self.dom.end_update(document)?;
            }
            result
        }

        // ---- 选中集 ----

        #[inline]
        pub fn selection_len(&self) -> usize {
            self.selected.len()
        }

        #[inline]
        pub fn is_selected(&self, id: NodeId) -> bool {
            self.selected.contains(&id)
        }

        /// 按选中顺序返回。
        #[inline]
        pub fn selection(&self) -> impl Iterator<Item = NodeId> + '_ {
            self.selected.iter().copied()
        }

        pub fn select(&mut self, id: NodeId) -> Result<(), EngineError> {
            self.ensure_selectable(id)?;
            if !self.selected.contains(&id) {
                self.selected.push(id);
            }
            Ok(())
        }

        pub fn deselect(&mut self, id: NodeId) -> bool {
            let before = self.selected.len();
            self.selected.retain(|selected| *selected != id);
            before != self.selected.len()
        }

        pub fn toggle_selection(&mut self, id: NodeId) -> Result<bool, EngineError> {
            self.ensure_selectable(id)?;
            if self.deselect(id) {
                Ok(false)
            } else {
                self.selected.push(id);
                Ok(true)
            }
        }

        #[inline]
        pub fn clear_selection(&mut self) {
            self.selected.clear();
        }

        fn ensure_selectable(&self, id: NodeId) -> Result<(), EngineError> {
            match self.dom.kind(id) {
                Ok(NodeKind::Document) | Err(_) => Err(EngineError::NodeNotFound(id.get())),
                Ok(_) => Ok(()),
            }
        }

        /// 移除已销毁的节点。
        fn prune_selection(&mut self) {
            let dom = &self.dom;
            self.selected.retain(|id| !dom.is_disposed(*id));
        }

        pub fn selection_bounds(&self) -> Option<Bounds3D> {
            let mut bounds = Bounds3D::empty();
            for id in &self.selected {
                if let Ok(node_bounds) = self.dom.bounding_box(*id) {
                    bounds.include_bounds(&node_bounds);
                }
            }
            (!bounds.is_empty()).then_some(bounds)
        }
    }

    impl Default for Session {
        fn default() -> Self {
            Self::new()
        }
    }

}
