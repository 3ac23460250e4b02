//! 文档对象模型的节点仓库。
//!
//! 所有 Document / Page / Step / Element 节点都保存在同一个 `Dom` 中，以 [`NodeId`]
//! 寻址。父节点持有有序子节点列表，子节点只保存父节点 ID，因此树中不存在引用环。
//! 未挂接到任何父节点的节点（新建、移除或克隆得到的）都是独立的根。

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::document::{DEFAULT_FILEPATH, DocumentData};
use crate::edit::{Edit, Property};
use crate::element::Element;
use crate::errors::{DomError, DomResult};
use crate::events::{ChangeEvent, ChangeParameters, DomEvent, ObserverId, ObserverRegistry, UpdateBatch, ops};
use crate::page::{PageData, PageType, normalize_page_name};
use crate::resolve::TargetResolver;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(u64);

impl NodeId {
    #[inline]
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// 提供原始数值，便于日志输出。
    #[inline]
    pub fn get(self) -> u64 {
        self.0
    }

    #[inline]
    fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Document,
    Page,
    Step,
    Element,
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct NodeFlags {
    /// 不可逆；对整棵子树生效。
    pub(crate) frozen: bool,
    /// 可逆；只阻止对自身子节点的结构性修改。
    pub(crate) locked: bool,
    /// 不可逆的只读标记，修改时报告 `NotSupported`。
    pub(crate) immutable: bool,
}

#[derive(Debug, Clone)]
pub(crate) enum NodeData {
    Document(DocumentData),
    Page(PageData),
    Step,
    Element(Element),
}

impl NodeData {
    pub(crate) fn kind(&self) -> NodeKind {
        match self {
            NodeData::Document(_) => NodeKind::Document,
            NodeData::Page(_) => NodeKind::Page,
            NodeData::Step => NodeKind::Step,
            NodeData::Element(_) => NodeKind::Element,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Node {
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) flags: NodeFlags,
    pub(crate) data: NodeData,
}

impl Node {
    fn new(data: NodeData) -> Self {
        Self {
            parent: None,
            children: Vec::new(),
            flags: NodeFlags::default(),
            data,
        }
    }
}

#[derive(Debug)]
enum Slot {
    Live(Node),
    Disposed,
}

#[derive(Debug, Default)]
pub struct Dom {
    slots: Vec<Slot>,
    pub(crate) observers: ObserverRegistry,
    pub(crate) batches: HashMap<NodeId, UpdateBatch>,
    journal: Option<Vec<Edit>>,
    replaying: bool,
    pub(crate) resolver: Option<Box<dyn TargetResolver>>,
    pub(crate) library_roots: Vec<PathBuf>,
}

impl Dom {
    pub fn new() -> Self {
        Self::default()
    }

    fn alloc(&mut self, node: Node) -> NodeId {
        let id = NodeId::new(self.slots.len() as u64);
        self.slots.push(Slot::Live(node));
        id
    }

    pub(crate) fn node(&self, id: NodeId) -> DomResult<&Node> {
        match self.slots.get(id.index()) {
            Some(Slot::Live(node)) => Ok(node),
            Some(Slot::Disposed) => Err(DomError::ObjectDisposed(id)),
            None => Err(DomError::NodeNotFound(id)),
        }
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> DomResult<&mut Node> {
        match self.slots.get_mut(id.index()) {
            Some(Slot::Live(node)) => Ok(node),
            Some(Slot::Disposed) => Err(DomError::ObjectDisposed(id)),
            None => Err(DomError::NodeNotFound(id)),
        }
    }

    /// 遍历所有存活节点。
    pub(crate) fn live_nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| match slot {
            Slot::Live(node) => Some((NodeId::new(index as u64), node)),
            Slot::Disposed => None,
        })
    }

    // ---- 创建 ----

    pub fn create_document(&mut self) -> NodeId {
        let id = self.alloc(Node::new(NodeData::Document(DocumentData::default())));
        trace!(node = id.get(), filepath = DEFAULT_FILEPATH, "创建文档");
        id
    }

    pub fn create_page(&mut self, name: &str, page_type: PageType) -> DomResult<NodeId> {
        let name = normalize_page_name(name, page_type)?;
        Ok(self.alloc(Node::new(NodeData::Page(PageData::new(name, page_type)))))
    }

    pub fn create_step(&mut self) -> NodeId {
        self.alloc(Node::new(NodeData::Step))
    }

    pub fn create_element(&mut self, element: Element) -> DomResult<NodeId> {
        element.validate()?;
        Ok(self.alloc(Node::new(NodeData::Element(element))))
    }

    // ---- 查询 ----

    pub fn is_disposed(&self, id: NodeId) -> bool {
        matches!(self.slots.get(id.index()), Some(Slot::Disposed))
    }

    pub fn kind(&self, id: NodeId) -> DomResult<NodeKind> {
        Ok(self.node(id)?.data.kind())
    }

    pub fn parent(&self, id: NodeId) -> DomResult<Option<NodeId>> {
        Ok(self.node(id)?.parent)
    }

    pub fn children(&self, id: NodeId) -> DomResult<&[NodeId]> {
        Ok(&self.node(id)?.children)
    }

    pub fn document(&self, id: NodeId) -> DomResult<&DocumentData> {
        match &self.node(id)?.data {
            NodeData::Document(document) => Ok(document),
            _ => Err(DomError::InvalidArgument(format!("node {id} is not a document"))),
        }
    }

    pub fn page(&self, id: NodeId) -> DomResult<&PageData> {
        match &self.node(id)?.data {
            NodeData::Page(page) => Ok(page),
            _ => Err(DomError::InvalidArgument(format!("node {id} is not a page"))),
        }
    }

    pub fn element(&self, id: NodeId) -> DomResult<&Element> {
        match &self.node(id)?.data {
            NodeData::Element(element) => Ok(element),
            _ => Err(DomError::InvalidArgument(format!("node {id} is not an element"))),
        }
    }

    pub fn pages(&self, document: NodeId) -> DomResult<&[NodeId]> {
        self.document(document)?;
        self.children(document)
    }

    pub fn steps(&self, page: NodeId) -> DomResult<&[NodeId]> {
        self.page(page)?;
        self.children(page)
    }

    /// Step 或 Group 的元素列表。
    pub fn elements(&self, collection: NodeId) -> DomResult<&[NodeId]> {
        match &self.node(collection)?.data {
            NodeData::Step => {}
            NodeData::Element(element) if element.is_collection() => {}
            _ => {
                return Err(DomError::InvalidArgument(format!(
                    "node {collection} is not an element collection"
                )));
            }
        }
        self.children(collection)
    }

    pub fn target_name(&self, page: NodeId) -> DomResult<String> {
        Ok(self.page(page)?.target_name())
    }

    /// 自身除外的祖先链，由近到远。
    pub fn ancestors(&self, id: NodeId) -> DomResult<Vec<NodeId>> {
        let mut result = Vec::new();
        let mut current = self.node(id)?.parent;
        while let Some(node) = current {
            result.push(node);
            current = self.node(node)?.parent;
        }
        Ok(result)
    }

    /// 先序遍历的全部后代（不含自身）。
    pub fn descendants(&self, id: NodeId) -> DomResult<Vec<NodeId>> {
        let mut result = Vec::new();
        let mut stack: Vec<NodeId> = self.node(id)?.children.iter().rev().copied().collect();
        while let Some(node) = stack.pop() {
            result.push(node);
            stack.extend(self.node(node)?.children.iter().rev().copied());
        }
        Ok(result)
    }

    fn nearest(&self, id: NodeId, kind: NodeKind) -> DomResult<Option<NodeId>> {
        let mut current = Some(id);
        while let Some(node) = current {
            let entry = self.node(node)?;
            if entry.data.kind() == kind {
                return Ok(Some(node));
            }
            current = entry.parent;
        }
        Ok(None)
    }

    /// 包含该节点的页面；若节点本身是页面则返回自身。
    pub fn owning_page(&self, id: NodeId) -> DomResult<Option<NodeId>> {
        self.nearest(id, NodeKind::Page)
    }

    pub fn owning_document(&self, id: NodeId) -> DomResult<Option<NodeId>> {
        self.nearest(id, NodeKind::Document)
    }

    pub fn index_in_parent(&self, id: NodeId) -> DomResult<Option<usize>> {
        let Some(parent) = self.node(id)?.parent else {
            return Ok(None);
        };
        Ok(self.node(parent)?.children.iter().position(|child| *child == id))
    }

    // ---- 冻结 / 锁定 / 只读 ----

    pub fn is_frozen(&self, id: NodeId) -> DomResult<bool> {
        let mut current = Some(id);
        while let Some(node) = current {
            let entry = self.node(node)?;
            if entry.flags.frozen {
                return Ok(true);
            }
            current = entry.parent;
        }
        Ok(false)
    }

    pub fn is_immutable(&self, id: NodeId) -> DomResult<bool> {
        let mut current = Some(id);
        while let Some(node) = current {
            let entry = self.node(node)?;
            if entry.flags.immutable {
                return Ok(true);
            }
            current = entry.parent;
        }
        Ok(false)
    }

    pub fn is_locked(&self, id: NodeId) -> DomResult<bool> {
        Ok(self.node(id)?.flags.locked)
    }

    /// 永久冻结节点及其子树，不可撤销。
    pub fn freeze(&mut self, id: NodeId) -> DomResult<()> {
        self.node_mut(id)?.flags.frozen = true;
        debug!(node = id.get(), "节点已冻结");
        Ok(())
    }

    /// 将节点及其子树标记为只读，常用于外部库中的页面。
    pub fn set_immutable(&mut self, id: NodeId) -> DomResult<()> {
        self.node_mut(id)?.flags.immutable = true;
        Ok(())
    }

    pub fn set_locked(&mut self, id: NodeId, locked: bool) -> DomResult<()> {
        self.set_property(id, Property::IsLocked(locked))
    }

    /// 结构性修改前的统一检查：冻结、只读、锁定。
    pub(crate) fn gate_structure(&self, collection: NodeId, ignore_lock: bool) -> DomResult<()> {
        let node = self.node(collection)?;
        if self.is_frozen(collection)? {
            return Err(DomError::ObjectFrozen(collection));
        }
        if self.is_immutable(collection)? {
            return Err(DomError::NotSupported(format!("collection {collection} is read-only")));
        }
        if node.flags.locked && !ignore_lock {
            return Err(DomError::ElementLocked(collection));
        }
        Ok(())
    }

    // ---- 销毁与克隆 ----

    /// 销毁节点及其整棵子树。冻结子树中的非根节点不能销毁；冻结的根总是可以销毁。
    pub fn dispose(&mut self, id: NodeId) -> DomResult<()> {
        let parent = self.node(id)?.parent;
        if let Some(parent) = parent {
            if self.is_frozen(id)? {
                return Err(DomError::ObjectFrozen(id));
            }
            self.gate_structure(parent, false)?;
        }
        let doomed = {
            let mut nodes = vec![id];
            nodes.extend(self.descendants(id)?);
            nodes
        };
        if let Some(parent) = parent {
            let index = self
                .index_in_parent(id)?
                .ok_or_else(|| DomError::InvalidOperation(format!("node {id} is not in its parent")))?;
            self.node_mut(parent)?.children.remove(index);
            self.node_mut(id)?.parent = None;
            self.record(Edit::Remove {
                collection: parent,
                index,
                item: id,
            });
            self.notify_parent_changed(id, Some(parent), None);
            let change = ChangeEvent::new(
                parent,
                ops::ITEMS_REMOVED,
                ChangeParameters::Items {
                    items: vec![id],
                    index,
                },
            );
            self.raise_change(Some(DomEvent::ItemsRemoved(change.clone())), change);
        }
        for node in &doomed {
            self.slots[node.index()] = Slot::Disposed;
            self.observers.forget(*node);
            self.batches.remove(node);
        }
        debug!(node = id.get(), count = doomed.len(), "节点及子树已销毁");
        Ok(())
    }

    /// 深拷贝子树，得到一个未冻结、无父节点的新根；锁定状态保留。
    pub fn clone_node(&mut self, id: NodeId) -> DomResult<NodeId> {
        let source = self.node(id)?.clone();
        let copy = self.alloc(Node {
            parent: None,
            children: Vec::with_capacity(source.children.len()),
            flags: NodeFlags {
                frozen: false,
                immutable: false,
                locked: source.flags.locked,
            },
            data: source.data,
        });
        for child in source.children {
            let cloned = self.clone_node(child)?;
            self.node_mut(cloned)?.parent = Some(copy);
            self.node_mut(copy)?.children.push(cloned);
        }
        Ok(copy)
    }

    // ---- 观察者 ----

    pub fn observe<F>(&mut self, id: NodeId, handler: F) -> DomResult<ObserverId>
    where
        F: FnMut(&DomEvent) + 'static,
    {
        self.node(id)?;
        Ok(self.observers.subscribe(id, Box::new(handler)))
    }

    pub fn unobserve(&mut self, observer: ObserverId) -> bool {
        self.observers.unsubscribe(observer)
    }

    /// 依次向源节点及其每一级祖先发出 `Changed`；到达文档时汇总为 `DocumentTreeChanged`。
    pub(crate) fn raise_change(&mut self, specific: Option<DomEvent>, change: ChangeEvent) {
        if let Some(event) = specific {
            self.observers.dispatch(change.source, &event);
        }
        let event = DomEvent::Changed(change.clone());
        let mut current = Some(change.source);
        while let Some(node) = current {
            self.observers.dispatch(node, &event);
            let Ok(entry) = self.node(node) else {
                break;
            };
            let (kind, parent) = (entry.data.kind(), entry.parent);
            if kind == NodeKind::Document {
                self.document_changed(node, &change);
            }
            current = parent;
        }
    }

    fn document_changed(&mut self, document: NodeId, change: &ChangeEvent) {
        let batch = self.batches.entry(document).or_default();
        if batch.depth > 0 {
            batch.pending.push(change.clone());
            return;
        }
        let event = DomEvent::DocumentTreeChanged {
            document,
            changes: vec![change.clone()],
        };
        self.observers.dispatch(document, &event);
    }

    pub(crate) fn notify_parent_changed(&mut self, node: NodeId, old_parent: Option<NodeId>, new_parent: Option<NodeId>) {
        let event = DomEvent::ParentChanged {
            node,
            old_parent,
            new_parent,
        };
        self.observers.dispatch(node, &event);
    }

    pub(crate) fn notify_property(&mut self, node: NodeId, old: Property, new: Property) {
        let change = ChangeEvent::new(node, new.operation(), ChangeParameters::Property { old, new });
        self.raise_change(None, change);
    }

    // ---- 批量更新 ----

    pub fn begin_update(&mut self, document: NodeId) -> DomResult<()> {
        self.document(document)?;
        let batch = self.batches.entry(document).or_default();
        batch.depth += 1;
        if batch.depth == 1 {
            self.observers.dispatch(document, &DomEvent::UpdateBegun(document));
        }
        Ok(())
    }

    /// 批量更新进行中的心跳；括号之外不产生任何事件。
    pub fn update(&mut self, document: NodeId) -> DomResult<()> {
        self.document(document)?;
        if self.is_updating(document) {
            self.observers.dispatch(document, &DomEvent::UpdateInProgress(document));
        }
        Ok(())
    }

    pub fn end_update(&mut self, document: NodeId) -> DomResult<()> {
        self.document(document)?;
        let batch = self.batches.entry(document).or_default();
        if batch.depth == 0 {
            return Err(DomError::InvalidOperation(
                "end_update called without a matching begin_update".to_string(),
            ));
        }
        batch.depth -= 1;
        if batch.depth > 0 {
            return Ok(());
        }
        let changes = std::mem::take(&mut batch.pending);
        self.observers.dispatch(document, &DomEvent::UpdateEnded(document));
        if !changes.is_empty() {
            trace!(document = document.get(), count = changes.len(), "发出汇总变更");
            self.observers
                .dispatch(document, &DomEvent::DocumentTreeChanged { document, changes });
        }
        Ok(())
    }

    pub fn is_updating(&self, document: NodeId) -> bool {
        self.batches.get(&document).is_some_and(|batch| batch.depth > 0)
    }

    // ---- 撤销日志 ----

    /// 开始记录编辑。记录期间的每个修改都会追加一条 [`Edit`]。
    pub fn start_recording(&mut self) {
        if self.journal.is_none() {
            self.journal = Some(Vec::new());
        }
    }

    pub fn finish_recording(&mut self) -> Vec<Edit> {
        self.journal.take().unwrap_or_default()
    }

    pub fn is_recording(&self) -> bool {
        self.journal.is_some()
    }

    pub(crate) fn record(&mut self, edit: Edit) {
        if self.replaying {
            return;
        }
        if let Some(journal) = self.journal.as_mut() {
            journal.push(edit);
        }
    }

    /// 重放一条编辑（撤销时传入其逆），期间不再记录日志，也不做名称/循环检查。
    pub fn apply_edit(&mut self, edit: &Edit) -> DomResult<()> {
        let previous = std::mem::replace(&mut self.replaying, true);
        let result = self.replay(edit);
        self.replaying = previous;
        result
    }

    fn replay(&mut self, edit: &Edit) -> DomResult<()> {
        if self.touches_disposed(edit) {
            trace!(?edit, "跳过涉及已销毁节点的编辑");
            return Ok(());
        }
        match edit {
            Edit::Insert {
                collection,
                index,
                item,
            } => {
                self.gate_structure(*collection, true)?;
                if let Some(parent) = self.node(*item)?.parent {
                    self.gate_structure(parent, true)?;
                    let at = self.position(parent, *item)?;
                    self.detach(parent, at)?;
                }
                let len = self.node(*collection)?.children.len();
                self.attach(*collection, (*index).min(len), *item)
            }
            Edit::Remove { collection, item, .. } => {
                self.gate_structure(*collection, true)?;
                let at = self.position(*collection, *item)?;
                self.detach(*collection, at).map(|_| ())
            }
            Edit::Replace {
                collection,
                old,
                new,
                ..
            } => {
                self.gate_structure(*collection, true)?;
                let at = self.position(*collection, *old)?;
                self.swap(*collection, at, *new).map(|_| ())
            }
            Edit::Clear { collection, .. } => {
                self.gate_structure(*collection, true)?;
                self.clear_all(*collection)
            }
            Edit::Restore { collection, items } => {
                self.gate_structure(*collection, true)?;
                let live = items.iter().filter(|item| !self.is_disposed(**item)).copied().collect::<Vec<_>>();
                for (index, item) in live.into_iter().enumerate() {
                    let len = self.node(*collection)?.children.len();
                    self.attach(*collection, index.min(len), item)?;
                }
                Ok(())
            }
            Edit::SetProperty { node, new, .. } => {
                if self.is_frozen(*node)? {
                    return Err(DomError::ObjectFrozen(*node));
                }
                let previous = self.write_property_raw(*node, new.clone())?;
                if previous != *new {
                    self.notify_property(*node, previous, new.clone());
                }
                Ok(())
            }
            Edit::Compound(edits) => {
                for edit in edits {
                    self.replay(edit)?;
                }
                Ok(())
            }
        }
    }

    /// 单条编辑涉及的节点里有已销毁的，重放时整条跳过；`Restore` 只跳过其中已销毁的成员。
    fn touches_disposed(&self, edit: &Edit) -> bool {
        match edit {
            Edit::Insert { collection, item, .. } | Edit::Remove { collection, item, .. } => {
                self.is_disposed(*collection) || self.is_disposed(*item)
            }
            Edit::Replace {
                collection, old, new, ..
            } => [collection, old, new].into_iter().any(|node| self.is_disposed(*node)),
            Edit::Clear { collection, .. } | Edit::Restore { collection, .. } => self.is_disposed(*collection),
            Edit::SetProperty { node, .. } => self.is_disposed(*node),
            Edit::Compound(_) => false,
        }
    }

    pub(crate) fn position(&self, collection: NodeId, item: NodeId) -> DomResult<usize> {
        self.node(collection)?
            .children
            .iter()
            .position(|child| *child == item)
            .ok_or_else(|| DomError::InvalidOperation(format!("node {item} is not a member of {collection}")))
    }

    // ---- 库路径 / 外部解析 ----

    pub fn set_resolver(&mut self, resolver: Box<dyn TargetResolver>) {
        self.resolver = Some(resolver);
    }

    pub fn clear_resolver(&mut self) -> Option<Box<dyn TargetResolver>> {
        self.resolver.take()
    }

    /// 位于这些目录下的文档视为已发布（Released）。
    pub fn set_library_roots(&mut self, roots: Vec<PathBuf>) {
        self.library_roots = roots;
    }

    pub fn library_roots(&self) -> &[PathBuf] {
        &self.library_roots
    }
}
