//! 变更通知：每个节点维护一组按注册顺序同步调用的观察者。

use std::collections::HashMap;
use std::fmt;

use glam::DMat4;

use crate::dom::NodeId;
use crate::edit::Property;

/// 稳定的操作标签。属性变更的标签由 [`Property::operation`] 给出。
pub mod ops {
    pub const ITEMS_ADDED: &str = "ItemsAdded";
    pub const ITEMS_REMOVED: &str = "ItemsRemoved";
    pub const ITEMS_REPLACED: &str = "ItemsReplaced";
    pub const COLLECTION_CLEARED: &str = "CollectionCleared";
    pub const TRANSFORMED: &str = "Transformed";
    pub const WINDING_REVERSED: &str = "WindingReversed";
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChangeParameters {
    None,
    Items { items: Vec<NodeId>, index: usize },
    Replaced { added: NodeId, removed: NodeId, index: usize },
    Cleared { items: Vec<NodeId> },
    Property { old: Property, new: Property },
    Transform(DMat4),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub source: NodeId,
    pub operation: &'static str,
    pub parameters: ChangeParameters,
}

impl ChangeEvent {
    pub fn new(source: NodeId, operation: &'static str, parameters: ChangeParameters) -> Self {
        Self {
            source,
            operation,
            parameters,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DomEvent {
    /// 任何变更；由源节点及其每一级祖先各触发一次。
    Changed(ChangeEvent),
    ItemsAdded(ChangeEvent),
    ItemsRemoved(ChangeEvent),
    ItemsReplaced(ChangeEvent),
    CollectionCleared(ChangeEvent),
    ParentChanged {
        node: NodeId,
        old_parent: Option<NodeId>,
        new_parent: Option<NodeId>,
    },
    /// 文档汇总事件；批量更新期间缓冲，在最外层 `end_update` 时一次性发出。
    DocumentTreeChanged {
        document: NodeId,
        changes: Vec<ChangeEvent>,
    },
    UpdateBegun(NodeId),
    UpdateInProgress(NodeId),
    UpdateEnded(NodeId),
}

impl DomEvent {
    pub fn change(&self) -> Option<&ChangeEvent> {
        match self {
            DomEvent::Changed(change)
            | DomEvent::ItemsAdded(change)
            | DomEvent::ItemsRemoved(change)
            | DomEvent::ItemsReplaced(change)
            | DomEvent::CollectionCleared(change) => Some(change),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

type Handler = Box<dyn FnMut(&DomEvent)>;

#[derive(Default)]
pub(crate) struct ObserverRegistry {
    next_id: u64,
    handlers: HashMap<NodeId, Vec<(ObserverId, Handler)>>,
}

impl ObserverRegistry {
    pub(crate) fn subscribe(&mut self, node: NodeId, handler: Handler) -> ObserverId {
        let id = ObserverId(self.next_id);
        self.next_id += 1;
        self.handlers.entry(node).or_default().push((id, handler));
        id
    }

    pub(crate) fn unsubscribe(&mut self, id: ObserverId) -> bool {
        for list in self.handlers.values_mut() {
            if let Some(position) = list.iter().position(|(existing, _)| *existing == id) {
                list.remove(position);
                return true;
            }
        }
        false
    }

    pub(crate) fn dispatch(&mut self, node: NodeId, event: &DomEvent) {
        if let Some(list) = self.handlers.get_mut(&node) {
            for (_, handler) in list.iter_mut() {
                handler(event);
            }
        }
    }

    pub(crate) fn forget(&mut self, node: NodeId) {
        self.handlers.remove(&node);
    }
}

impl fmt::Debug for ObserverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count: usize = self.handlers.values().map(Vec::len).sum();
        f.debug_struct("ObserverRegistry")
            .field("observers", &count)
            .finish()
    }
}

/// 文档级批量更新状态。
#[derive(Debug, Default)]
pub(crate) struct UpdateBatch {
    pub(crate) depth: u32,
    pub(crate) pending: Vec<ChangeEvent>,
}
