//! 可撤销集合操作：Document 的页面、Page 的步骤、Step 与 Group 的元素。
//!
//! 每个结构性修改先经过 [`Dom::can_insert`] 同一套检查，随后写入日志并发出
//! `ParentChanged` 与集合事件。

use std::collections::HashSet;

use tracing::{debug, trace};

use crate::dom::{Dom, NodeData, NodeId};
use crate::edit::Edit;
use crate::element::{Element, ElementKind};
use crate::errors::{DomError, DomResult};
use crate::events::{ChangeEvent, ChangeParameters, DomEvent, ops};
use crate::resolve::{Hypothesis, normalize_target};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertCheckFlags {
    /// 忽略集合的锁定状态；冻结与只读不受影响。
    pub ignore_is_locked: bool,
}

impl InsertCheckFlags {
    pub const NONE: Self = Self {
        ignore_is_locked: false,
    };
    pub const IGNORE_IS_LOCKED: Self = Self {
        ignore_is_locked: true,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertCheckResult {
    CanInsert,
    NotSupported,
    DuplicateName,
    CircularReference,
    TopLevelElementNotAllowed,
}

impl InsertCheckResult {
    fn from_check(result: DomResult<()>) -> Self {
        match result {
            Ok(()) => InsertCheckResult::CanInsert,
            Err(DomError::DuplicateName(_)) => InsertCheckResult::DuplicateName,
            Err(DomError::CircularReference(_)) => InsertCheckResult::CircularReference,
            Err(DomError::TopLevelElementNotAllowed(_)) => InsertCheckResult::TopLevelElementNotAllowed,
            Err(_) => InsertCheckResult::NotSupported,
        }
    }

    #[inline]
    pub fn is_allowed(self) -> bool {
        self == InsertCheckResult::CanInsert
    }
}

impl Dom {
    // ---- 查询 ----

    pub fn len(&self, collection: NodeId) -> DomResult<usize> {
        Ok(self.children(collection)?.len())
    }

    pub fn is_empty(&self, collection: NodeId) -> DomResult<bool> {
        Ok(self.children(collection)?.is_empty())
    }

    pub fn contains(&self, collection: NodeId, item: NodeId) -> DomResult<bool> {
        Ok(self.children(collection)?.contains(&item))
    }

    pub fn index_of(&self, collection: NodeId, item: NodeId) -> DomResult<Option<usize>> {
        Ok(self.children(collection)?.iter().position(|child| *child == item))
    }

    pub fn copy_to(&self, collection: NodeId, target: &mut [NodeId], start: usize) -> DomResult<()> {
        let children = self.children(collection)?;
        let end = start
            .checked_add(children.len())
            .filter(|end| *end <= target.len())
            .ok_or_else(|| {
                DomError::ArgumentOutOfRange(format!(
                    "cannot copy {} items into a slice of {} at {start}",
                    children.len(),
                    target.len()
                ))
            })?;
        target[start..end].copy_from_slice(children);
        Ok(())
    }

    /// 插入前检查，不会失败。
    pub fn can_insert(&self, collection: NodeId, item: NodeId, flags: InsertCheckFlags) -> InsertCheckResult {
        InsertCheckResult::from_check(self.check_insert(collection, item, None, flags))
    }

    /// 替换前检查；`old` 必须是集合成员。
    pub fn can_replace(
        &self,
        collection: NodeId,
        new: NodeId,
        old: NodeId,
        flags: InsertCheckFlags,
    ) -> InsertCheckResult {
        match self.contains(collection, old) {
            Ok(true) => {}
            _ => return InsertCheckResult::NotSupported,
        }
        if new == old {
            return InsertCheckResult::from_check(self.gate_structure(collection, flags.ignore_is_locked));
        }
        InsertCheckResult::from_check(self.check_insert(collection, new, Some(old), flags))
    }

    // ---- 修改 ----

    pub fn add(&mut self, collection: NodeId, item: NodeId) -> DomResult<()> {
        let len = self.len(collection)?;
        self.insert_with(collection, len, item, InsertCheckFlags::NONE)
    }

    pub fn insert(&mut self, collection: NodeId, index: usize, item: NodeId) -> DomResult<()> {
        self.insert_with(collection, index, item, InsertCheckFlags::NONE)
    }

    /// 插入 `item`；若它已属于其它集合，则先从原集合移除，整个移动要么完成要么不生效。
    pub fn insert_with(
        &mut self,
        collection: NodeId,
        index: usize,
        item: NodeId,
        flags: InsertCheckFlags,
    ) -> DomResult<()> {
        let len = self.len(collection)?;
        if index > len {
            return Err(DomError::ArgumentOutOfRange(format!(
                "index {index} exceeds collection length {len}"
            )));
        }
        self.check_insert(collection, item, None, flags).inspect_err(|err| {
            trace!(collection = collection.get(), item = item.get(), error = %err, "拒绝插入");
        })?;

        // 预检已按移动后的状态排除 item 自身
        let mut index = index;
        if let Some(parent) = self.node(item)?.parent {
            let at = self.position(parent, item)?;
            if parent == collection && at < index {
                index -= 1;
            }
            self.detach(parent, at)?;
        }
        self.attach(collection, index, item)
    }

    /// 移除成员；不是成员时返回 `false`。
    pub fn remove(&mut self, collection: NodeId, item: NodeId) -> DomResult<bool> {
        let Some(index) = self.index_of(collection, item)? else {
            return Ok(false);
        };
        self.remove_at(collection, index)?;
        Ok(true)
    }

    pub fn remove_at(&mut self, collection: NodeId, index: usize) -> DomResult<NodeId> {
        let item = self.member_at(collection, index)?;
        self.gate_structure(collection, false)?;
        self.ensure_movable(item)?;
        self.detach(collection, index)
    }

    /// 以 `new` 替换 `index` 处的成员，返回被替换的节点（已脱离集合）。
    pub fn replace(&mut self, collection: NodeId, index: usize, new: NodeId) -> DomResult<NodeId> {
        let old = self.member_at(collection, index)?;
        if old == new {
            self.gate_structure(collection, false)?;
            return Ok(old);
        }
        self.ensure_movable(old)?;
        self.check_insert(collection, new, Some(old), InsertCheckFlags::NONE)?;
        if let Some(parent) = self.node(new)?.parent {
            let at = self.position(parent, new)?;
            self.detach(parent, at)?;
        }
        let index = self.position(collection, old)?;
        self.swap(collection, index, new)
    }

    /// 清空集合；空集合不产生事件。
    pub fn clear(&mut self, collection: NodeId) -> DomResult<()> {
        self.gate_structure(collection, false)?;
        let items = self.children(collection)?.to_vec();
        if items.is_empty() {
            return Ok(());
        }
        for item in &items {
            self.ensure_movable(*item)?;
        }
        self.clear_all(collection)
    }

    /// 将一个页面或另一文档的全部页面移入 `document`。名称与循环引用检查针对整批执行，
    /// 任一失败都不会移动任何页面。
    pub fn import(&mut self, document: NodeId, source: NodeId) -> DomResult<Vec<NodeId>> {
        self.document(document)?;
        if source == document {
            return Err(DomError::InvalidOperation("a document cannot import itself".to_string()));
        }
        let pages = match &self.node(source)?.data {
            NodeData::Document(_) => self.children(source)?.to_vec(),
            NodeData::Page(_) => vec![source],
            _ => {
                return Err(DomError::InvalidArgument(format!(
                    "node {source} is neither a page nor a document"
                )));
            }
        };
        self.gate_structure(document, false)?;
        for page in &pages {
            if self.is_frozen(*page)? {
                return Err(DomError::ObjectFrozen(*page));
            }
            match self.node(*page)?.parent {
                Some(parent) if parent == document => {
                    return Err(DomError::InvalidOperation(format!(
                        "page {page} already belongs to document {document}"
                    )));
                }
                Some(parent) => self.gate_structure(parent, false)?,
                None => {}
            }
        }

        let mut names: HashSet<String> = self
            .pages(document)?
            .iter()
            .map(|page| self.target_name(*page).map(|name| normalize_target(&name)))
            .collect::<DomResult<_>>()?;
        for page in &pages {
            let name = self.target_name(*page)?;
            if !names.insert(normalize_target(&name)) {
                return Err(DomError::DuplicateName(name));
            }
        }

        let mut scope = self.document_scope(document)?;
        scope.pages.extend(pages.iter().copied());
        if self.scope_has_cycle(&scope) {
            return Err(DomError::CircularReference(format!(
                "importing into document {document} would create a reference cycle"
            )));
        }

        for page in &pages {
            if let Some(parent) = self.node(*page)?.parent {
                let at = self.position(parent, *page)?;
                self.detach(parent, at)?;
            }
            let len = self.len(document)?;
            self.attach(document, len, *page)?;
        }
        debug!(document = document.get(), count = pages.len(), "导入页面");
        Ok(pages)
    }

    // ---- 检查 ----

    fn member_at(&self, collection: NodeId, index: usize) -> DomResult<NodeId> {
        let children = self.children(collection)?;
        children.get(index).copied().ok_or_else(|| {
            DomError::ArgumentOutOfRange(format!(
                "index {index} is outside collection of length {}",
                children.len()
            ))
        })
    }

    fn ensure_movable(&self, item: NodeId) -> DomResult<()> {
        if self.node(item)?.flags.frozen {
            return Err(DomError::ObjectFrozen(item));
        }
        Ok(())
    }

    pub(crate) fn check_insert(
        &self,
        collection: NodeId,
        item: NodeId,
        replacing: Option<NodeId>,
        flags: InsertCheckFlags,
    ) -> DomResult<()> {
        let target = self.node(collection)?;
        let candidate = self.node(item)?;
        self.gate_structure(collection, flags.ignore_is_locked)?;
        if self.is_frozen(item)? {
            return Err(DomError::ObjectFrozen(item));
        }
        if let Some(parent) = candidate.parent {
            self.gate_structure(parent, flags.ignore_is_locked)?;
        }
        if item == collection || self.ancestors(collection)?.contains(&item) {
            return Err(DomError::InvalidOperation(format!(
                "node {item} cannot be inserted into its own descendant {collection}"
            )));
        }

        match (&target.data, &candidate.data) {
            (NodeData::Document(_), NodeData::Page(_)) => self.check_page_insert(collection, item, replacing),
            (NodeData::Page(_), NodeData::Step) => self.check_content_insert(collection, item, replacing),
            (NodeData::Step, NodeData::Element(element)) => {
                check_element(item, element)?;
                self.check_content_insert(collection, item, replacing)
            }
            (NodeData::Element(group), NodeData::Element(element)) if group.is_collection() => {
                if element.is_top_level() {
                    return Err(DomError::TopLevelElementNotAllowed(item));
                }
                check_element(item, element)?;
                self.check_content_insert(collection, item, replacing)
            }
            _ => Err(DomError::NotSupported(format!(
                "{:?} {collection} cannot contain {:?} {item}",
                target.data.kind(),
                candidate.data.kind()
            ))),
        }
    }

    fn check_page_insert(&self, document: NodeId, item: NodeId, replacing: Option<NodeId>) -> DomResult<()> {
        let name = self.target_name(item)?;
        let normalized = normalize_target(&name);
        for page in self.pages(document)? {
            if *page == item || Some(*page) == replacing {
                continue;
            }
            if normalize_target(&self.target_name(*page)?) == normalized {
                return Err(DomError::DuplicateName(name));
            }
        }

        let mut scope = self.document_scope(document)?;
        scope.pages.retain(|page| Some(*page) != replacing && *page != item);
        scope.pages.push(item);
        if self.scope_has_cycle(&scope) {
            return Err(DomError::CircularReference(format!(
                "page '{name}' would create a reference cycle in document {document}"
            )));
        }
        Ok(())
    }

    /// Step 或元素进入集合时：分组名称在页面内唯一（未挂到页面时在所在的游离子树内唯一），
    /// 进入页面时引用不得形成环。
    fn check_content_insert(&self, collection: NodeId, item: NodeId, replacing: Option<NodeId>) -> DomResult<()> {
        let mut excluded: HashSet<NodeId> = self.subtree(item)?.into_iter().collect();
        if let Some(old) = replacing {
            excluded.extend(self.subtree(old)?);
        }

        let incoming = self.group_names(item, &HashSet::new())?;
        {
            let mut seen = HashSet::new();
            if let Some(name) = incoming.iter().map(String::as_str).find(|name| !seen.insert(*name)) {
                return Err(DomError::DuplicateName(name.to_string()));
            }
        }

        let page = self.owning_page(collection)?;
        if !incoming.is_empty() {
            let scope_root = match page {
                Some(page) => page,
                None => self.detached_root(collection)?,
            };
            let existing = self.group_names(scope_root, &excluded)?;
            if let Some(name) = incoming.into_iter().find(|name| existing.contains(name)) {
                return Err(DomError::DuplicateName(name));
            }
        }

        let Some(page) = page else {
            return Ok(());
        };
        let extra = self.reference_names(item)?;
        if extra.is_empty() {
            return Ok(());
        }
        let hypothesis = Hypothesis {
            scope: self.scope_of(page)?,
            page: Some(page),
            extra,
            excluded,
        };
        if self.creates_cycle(&hypothesis) {
            return Err(DomError::CircularReference(format!(
                "node {item} would make page '{}' reference itself",
                self.target_name(page)?
            )));
        }
        Ok(())
    }

    /// 最上层的祖先；没有父节点时为自身。
    pub(crate) fn detached_root(&self, id: NodeId) -> DomResult<NodeId> {
        Ok(self.ancestors(id)?.last().copied().unwrap_or(id))
    }

    /// 自身加全部后代。
    pub(crate) fn subtree(&self, id: NodeId) -> DomResult<Vec<NodeId>> {
        let mut nodes = vec![id];
        nodes.extend(self.descendants(id)?);
        Ok(nodes)
    }

    pub(crate) fn group_names(&self, root: NodeId, excluded: &HashSet<NodeId>) -> DomResult<Vec<String>> {
        let mut names = Vec::new();
        for node in self.subtree(root)? {
            if excluded.contains(&node) {
                continue;
            }
            if let NodeData::Element(element) = &self.node(node)?.data {
                if let Some(name) = element.group_name() {
                    names.push(name.to_string());
                }
            }
        }
        Ok(names)
    }

    fn reference_names(&self, root: NodeId) -> DomResult<Vec<String>> {
        let mut names = Vec::new();
        for node in self.subtree(root)? {
            if let NodeData::Element(element) = &self.node(node)?.data {
                if let Some(reference) = element.as_reference() {
                    names.push(reference.target_name.clone());
                }
            }
        }
        Ok(names)
    }

    // ---- 原始修改：写日志并发出事件，不做检查 ----

    pub(crate) fn attach(&mut self, collection: NodeId, index: usize, item: NodeId) -> DomResult<()> {
        self.node_mut(collection)?.children.insert(index, item);
        self.node_mut(item)?.parent = Some(collection);
        self.record(Edit::Insert {
            collection,
            index,
            item,
        });
        self.notify_parent_changed(item, None, Some(collection));
        let change = ChangeEvent::new(
            collection,
            ops::ITEMS_ADDED,
            ChangeParameters::Items {
                items: vec![item],
                index,
            },
        );
        self.raise_change(Some(DomEvent::ItemsAdded(change.clone())), change);
        Ok(())
    }

    pub(crate) fn detach(&mut self, collection: NodeId, index: usize) -> DomResult<NodeId> {
        let item = self.member_at(collection, index)?;
        self.node_mut(collection)?.children.remove(index);
        self.node_mut(item)?.parent = None;
        self.record(Edit::Remove {
            collection,
            index,
            item,
        });
        self.notify_parent_changed(item, Some(collection), None);
        let change = ChangeEvent::new(
            collection,
            ops::ITEMS_REMOVED,
            ChangeParameters::Items {
                items: vec![item],
                index,
            },
        );
        self.raise_change(Some(DomEvent::ItemsRemoved(change.clone())), change);
        Ok(item)
    }

    pub(crate) fn swap(&mut self, collection: NodeId, index: usize, new: NodeId) -> DomResult<NodeId> {
        let old = self.member_at(collection, index)?;
        self.node_mut(collection)?.children[index] = new;
        self.node_mut(old)?.parent = None;
        self.node_mut(new)?.parent = Some(collection);
        self.record(Edit::Replace {
            collection,
            index,
            old,
            new,
        });
        self.notify_parent_changed(old, Some(collection), None);
        self.notify_parent_changed(new, None, Some(collection));
        let change = ChangeEvent::new(
            collection,
            ops::ITEMS_REPLACED,
            ChangeParameters::Replaced {
                added: new,
                removed: old,
                index,
            },
        );
        self.raise_change(Some(DomEvent::ItemsReplaced(change.clone())), change);
        Ok(old)
    }

    pub(crate) fn clear_all(&mut self, collection: NodeId) -> DomResult<()> {
        let items = std::mem::take(&mut self.node_mut(collection)?.children);
        if items.is_empty() {
            return Ok(());
        }
        for item in &items {
            self.node_mut(*item)?.parent = None;
        }
        self.record(Edit::Clear {
            collection,
            items: items.clone(),
        });
        for item in &items {
            self.notify_parent_changed(*item, Some(collection), None);
        }
        let change = ChangeEvent::new(collection, ops::COLLECTION_CLEARED, ChangeParameters::Cleared { items });
        self.raise_change(Some(DomEvent::CollectionCleared(change.clone())), change);
        Ok(())
    }
}

fn check_element(item: NodeId, element: &Element) -> DomResult<()> {
    if let ElementKind::Colour(definition) = &element.kind {
        if definition.is_direct() {
            return Err(DomError::NotSupported(format!(
                "direct colour definition {item} cannot be added to a collection"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::edit::Property;
    use crate::element::{ColourDefinition, Graphic, MetaCommand, Reference};
    use crate::geometry::Point3;
    use crate::page::PageType;
    use crate::palette;

    fn line(dom: &mut Dom) -> NodeId {
        dom.create_element(Element::graphic(Graphic::line(
            24,
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(0.0, 0.0, 1.0),
        )))
        .unwrap()
    }

    fn page_with_step(dom: &mut Dom, document: NodeId, name: &str) -> (NodeId, NodeId) {
        let page = dom.create_page(name, PageType::Model).unwrap();
        let step = dom.create_step();
        dom.add(page, step).unwrap();
        dom.add(document, page).unwrap();
        (page, step)
    }

    fn reference(dom: &mut Dom, step: NodeId, target: &str) -> NodeId {
        let element = dom.create_element(Element::reference(Reference::new(target))).unwrap();
        dom.add(step, element).unwrap();
        element
    }

    #[derive(Default)]
    struct Counts {
        changed: usize,
        added: usize,
        parent_changed: usize,
    }

    #[test]
    fn single_add_fires_one_event_per_level() {
        let mut dom = Dom::new();
        let document = dom.create_document();
        let (page, step) = page_with_step(&mut dom, document, "main");
        let element = line(&mut dom);

        let counts: Rc<RefCell<Vec<Counts>>> = Rc::new(RefCell::new(vec![Counts::default(), Counts::default(), Counts::default()]));
        for (slot, node) in [document, page, step].into_iter().enumerate() {
            let sink = Rc::clone(&counts);
            dom.observe(node, move |event| {
                let mut counts = sink.borrow_mut();
                match event {
                    DomEvent::Changed(_) => counts[slot].changed += 1,
                    DomEvent::ItemsAdded(_) => counts[slot].added += 1,
                    _ => {}
                }
            })
            .unwrap();
        }
        let sink = Rc::clone(&counts);
        dom.observe(element, move |event| {
            if matches!(event, DomEvent::ParentChanged { .. }) {
                sink.borrow_mut()[2].parent_changed += 1;
            }
        })
        .unwrap();

        dom.add(step, element).unwrap();
        let counts = counts.borrow();
        for level in counts.iter() {
            assert_eq!(level.changed, 1);
        }
        assert_eq!(counts[2].added, 1);
        assert_eq!(counts[0].added, 0);
        assert_eq!(counts[2].parent_changed, 1);
    }

    #[test]
    fn index_out_of_range_is_rejected() {
        let mut dom = Dom::new();
        let step = dom.create_step();
        let element = line(&mut dom);
        assert!(matches!(dom.insert(step, 1, element), Err(DomError::ArgumentOutOfRange(_))));
        assert!(matches!(dom.remove_at(step, 0), Err(DomError::ArgumentOutOfRange(_))));
    }

    #[test]
    fn locked_collection_needs_override() {
        let mut dom = Dom::new();
        let step = dom.create_step();
        dom.set_locked(step, true).unwrap();
        let element = line(&mut dom);

        assert_eq!(dom.can_insert(step, element, InsertCheckFlags::NONE), InsertCheckResult::NotSupported);
        assert!(matches!(dom.add(step, element), Err(DomError::ElementLocked(_))));
        assert_eq!(
            dom.can_insert(step, element, InsertCheckFlags::IGNORE_IS_LOCKED),
            InsertCheckResult::CanInsert
        );
        dom.insert_with(step, 0, element, InsertCheckFlags::IGNORE_IS_LOCKED).unwrap();
        assert_eq!(dom.elements(step).unwrap(), &[element]);
        assert!(matches!(dom.clear(step), Err(DomError::ElementLocked(_))));
    }

    #[test]
    fn frozen_collection_rejects_even_with_override() {
        let mut dom = Dom::new();
        let step = dom.create_step();
        dom.freeze(step).unwrap();
        let element = line(&mut dom);
        assert_eq!(
            dom.can_insert(step, element, InsertCheckFlags::IGNORE_IS_LOCKED),
            InsertCheckResult::NotSupported
        );
        assert!(matches!(
            dom.insert_with(step, 0, element, InsertCheckFlags::IGNORE_IS_LOCKED),
            Err(DomError::ObjectFrozen(_))
        ));
    }

    #[test]
    fn immutable_collection_is_not_supported() {
        let mut dom = Dom::new();
        let step = dom.create_step();
        dom.set_immutable(step).unwrap();
        let element = line(&mut dom);
        assert!(matches!(dom.add(step, element), Err(DomError::NotSupported(_))));
    }

    #[test]
    fn direct_colours_and_top_level_elements_are_filtered() {
        let mut dom = Dom::new();
        let step = dom.create_step();
        let group = dom.create_element(Element::group("wheels")).unwrap();
        dom.add(step, group).unwrap();

        let direct = dom
            .create_element(Element::colour(ColourDefinition {
                code: palette::direct_colour(0xFF0000),
                name: "Red".to_string(),
                value: 0xFF0000,
                edge: 0,
            }))
            .unwrap();
        assert_eq!(dom.can_insert(step, direct, InsertCheckFlags::NONE), InsertCheckResult::NotSupported);
        assert!(matches!(dom.add(step, direct), Err(DomError::NotSupported(_))));

        let pause = dom.create_element(Element::meta(MetaCommand::Pause)).unwrap();
        assert_eq!(
            dom.can_insert(group, pause, InsertCheckFlags::NONE),
            InsertCheckResult::TopLevelElementNotAllowed
        );
        assert!(matches!(dom.add(group, pause), Err(DomError::TopLevelElementNotAllowed(_))));
        dom.add(step, pause).expect("步骤允许顶层元素");
    }

    #[test]
    fn duplicate_page_names_are_rejected() {
        let mut dom = Dom::new();
        let document = dom.create_document();
        page_with_step(&mut dom, document, "wheel");
        let clash = dom.create_page("WHEEL", PageType::Model).unwrap();
        assert_eq!(dom.can_insert(document, clash, InsertCheckFlags::NONE), InsertCheckResult::DuplicateName);
        assert!(matches!(dom.add(document, clash), Err(DomError::DuplicateName(_))));
        assert_eq!(dom.len(document).unwrap(), 1);

        let part = dom.create_page("wheel", PageType::Part).unwrap();
        dom.add(document, part).expect("不同扩展名的目标名不冲突");
    }

    #[test]
    fn duplicate_group_names_are_rejected_per_page() {
        let mut dom = Dom::new();
        let document = dom.create_document();
        let (page, first) = page_with_step(&mut dom, document, "main");
        let group = dom.create_element(Element::group("wheels")).unwrap();
        dom.add(first, group).unwrap();

        let second = dom.create_step();
        dom.add(page, second).unwrap();
        let clash = dom.create_element(Element::group("wheels")).unwrap();
        assert!(matches!(dom.add(second, clash), Err(DomError::DuplicateName(_))));
        let other = dom.create_element(Element::group("Wheels")).unwrap();
        dom.add(second, other).expect("分组名区分大小写");
    }

    #[test]
    fn detached_step_keeps_group_names_unique() {
        let mut dom = Dom::new();
        let loose = dom.create_step();
        let first = dom.create_element(Element::group("g")).expect("创建分组");
        let second = dom.create_element(Element::group("g")).expect("创建分组");
        dom.add(loose, first).expect("游离步骤可以容纳分组");
        assert_eq!(dom.can_insert(loose, second, InsertCheckFlags::NONE), InsertCheckResult::DuplicateName);
        assert!(matches!(dom.add(loose, second), Err(DomError::DuplicateName(name)) if name == "g"));
        assert_eq!(dom.len(loose).expect("长度"), 1);

        let renamed = dom.create_element(Element::group("h")).expect("创建分组");
        dom.add(loose, renamed).expect("不同名称");
        assert!(matches!(
            dom.set_property(renamed, Property::Name("g".to_string())),
            Err(DomError::DuplicateName(_))
        ));

        let document = dom.create_document();
        let (page, _) = page_with_step(&mut dom, document, "main");
        let existing = dom.create_step();
        dom.add(page, existing).expect("添加步骤");
        let taken = dom.create_element(Element::group("h")).expect("创建分组");
        dom.add(existing, taken).expect("添加分组");
        assert!(matches!(dom.add(page, loose), Err(DomError::DuplicateName(name)) if name == "h"));
        assert_eq!(dom.parent(loose).expect("父节点"), None);
        assert_eq!(dom.len(page).expect("长度"), 2);
    }

    #[test]
    fn rejected_move_leaves_source_untouched() {
        let mut dom = Dom::new();
        let document = dom.create_document();
        let (_, target) = page_with_step(&mut dom, document, "a");
        let (_, source) = page_with_step(&mut dom, document, "b");
        let taken = dom.create_element(Element::group("wheels")).expect("创建分组");
        dom.add(target, taken).expect("添加分组");
        let mover = dom.create_element(Element::group("wheels")).expect("创建分组");
        dom.add(source, mover).expect("另一页面可以同名");

        let fired: Rc<RefCell<usize>> = Rc::default();
        for node in [source, target, mover] {
            let sink = Rc::clone(&fired);
            dom.observe(node, move |_| *sink.borrow_mut() += 1).expect("订阅");
        }
        dom.start_recording();
        assert!(matches!(dom.add(target, mover), Err(DomError::DuplicateName(_))));
        assert!(dom.finish_recording().is_empty());
        assert_eq!(*fired.borrow(), 0);
        assert_eq!(dom.parent(mover).expect("父节点"), Some(source));
        assert_eq!(dom.elements(source).expect("元素"), &[mover]);
    }

    #[test]
    fn circular_references_are_rejected() {
        let mut dom = Dom::new();
        let document = dom.create_document();
        let (_, a_step) = page_with_step(&mut dom, document, "a");
        let (_, b_step) = page_with_step(&mut dom, document, "b");
        reference(&mut dom, a_step, "b.ldr");

        let back = dom.create_element(Element::reference(Reference::new("A.LDR"))).unwrap();
        assert_eq!(dom.can_insert(b_step, back, InsertCheckFlags::NONE), InsertCheckResult::CircularReference);
        assert!(matches!(dom.add(b_step, back), Err(DomError::CircularReference(_))));
        assert!(dom.elements(b_step).unwrap().is_empty());

        let selfish = dom.create_element(Element::reference(Reference::new("a.ldr"))).unwrap();
        assert!(matches!(dom.add(a_step, selfish), Err(DomError::CircularReference(_))));
    }

    #[test]
    fn moving_between_collections_detaches_from_old_parent() {
        let mut dom = Dom::new();
        let first = dom.create_step();
        let second = dom.create_step();
        let element = line(&mut dom);
        dom.add(first, element).unwrap();
        dom.add(second, element).unwrap();
        assert!(dom.elements(first).unwrap().is_empty());
        assert_eq!(dom.parent(element).unwrap(), Some(second));
    }

    #[test]
    fn moving_out_of_locked_collection_fails_atomically() {
        let mut dom = Dom::new();
        let first = dom.create_step();
        let second = dom.create_step();
        let element = line(&mut dom);
        dom.add(first, element).unwrap();
        dom.set_locked(first, true).unwrap();
        assert!(matches!(dom.add(second, element), Err(DomError::ElementLocked(_))));
        assert_eq!(dom.elements(first).unwrap(), &[element]);
        assert!(dom.elements(second).unwrap().is_empty());
    }

    #[test]
    fn reordering_within_collection() {
        let mut dom = Dom::new();
        let step = dom.create_step();
        let a = line(&mut dom);
        let b = line(&mut dom);
        let c = line(&mut dom);
        for element in [a, b, c] {
            dom.add(step, element).unwrap();
        }
        dom.insert(step, 3, a).unwrap();
        assert_eq!(dom.elements(step).unwrap(), &[b, c, a]);
        dom.insert(step, 0, a).unwrap();
        assert_eq!(dom.elements(step).unwrap(), &[a, b, c]);
    }

    #[test]
    fn replace_fires_single_replaced_event() {
        let mut dom = Dom::new();
        let step = dom.create_step();
        let old = line(&mut dom);
        let new = line(&mut dom);
        dom.add(step, old).unwrap();

        let events: Rc<RefCell<Vec<DomEvent>>> = Rc::default();
        let sink = Rc::clone(&events);
        dom.observe(step, move |event| {
            if matches!(event, DomEvent::ItemsReplaced(_)) {
                sink.borrow_mut().push(event.clone());
            }
        })
        .unwrap();

        assert_eq!(dom.can_replace(step, new, old, InsertCheckFlags::NONE), InsertCheckResult::CanInsert);
        assert_eq!(dom.replace(step, 0, new).unwrap(), old);
        assert_eq!(dom.parent(old).unwrap(), None);
        let events = events.borrow();
        assert_eq!(events.len(), 1);
        let change = events[0].change().unwrap();
        assert_eq!(
            change.parameters,
            ChangeParameters::Replaced {
                added: new,
                removed: old,
                index: 0
            }
        );
    }

    #[test]
    fn clear_on_empty_collection_is_silent() {
        let mut dom = Dom::new();
        let step = dom.create_step();
        let fired: Rc<RefCell<usize>> = Rc::default();
        let sink = Rc::clone(&fired);
        dom.observe(step, move |_| *sink.borrow_mut() += 1).unwrap();
        dom.clear(step).unwrap();
        assert_eq!(*fired.borrow(), 0);

        let element = line(&mut dom);
        dom.add(step, element).unwrap();
        dom.clear(step).unwrap();
        assert!(dom.is_empty(step).unwrap());
        assert_eq!(dom.parent(element).unwrap(), None);
    }

    #[test]
    fn copy_to_checks_capacity() {
        let mut dom = Dom::new();
        let step = dom.create_step();
        let a = line(&mut dom);
        let b = line(&mut dom);
        dom.add(step, a).unwrap();
        dom.add(step, b).unwrap();

        let mut target = [NodeId::new(u64::MAX); 3];
        dom.copy_to(step, &mut target, 1).unwrap();
        assert_eq!(&target[1..], &[a, b]);
        assert!(matches!(dom.copy_to(step, &mut target, 2), Err(DomError::ArgumentOutOfRange(_))));
    }

    #[test]
    fn ancestor_cannot_be_inserted_into_descendant() {
        let mut dom = Dom::new();
        let document = dom.create_document();
        let (page, step) = page_with_step(&mut dom, document, "main");
        assert_eq!(dom.can_insert(step, page, InsertCheckFlags::NONE), InsertCheckResult::NotSupported);
        assert!(dom.add(step, page).is_err());
    }

    #[test]
    fn import_is_all_or_nothing() {
        let mut dom = Dom::new();
        let target = dom.create_document();
        page_with_step(&mut dom, target, "b");

        let source = dom.create_document();
        let (a, _) = page_with_step(&mut dom, source, "a");
        page_with_step(&mut dom, source, "b");

        assert!(matches!(dom.import(target, source), Err(DomError::DuplicateName(_))));
        assert_eq!(dom.len(target).unwrap(), 1);
        assert_eq!(dom.len(source).unwrap(), 2);

        let moved = dom.import(target, a).unwrap();
        assert_eq!(moved, vec![a]);
        assert_eq!(dom.parent(a).unwrap(), Some(target));
        assert_eq!(dom.len(source).unwrap(), 1);
    }

    #[test]
    fn import_rejects_cycles_across_documents() {
        let mut dom = Dom::new();
        let target = dom.create_document();
        let (_, step) = page_with_step(&mut dom, target, "a");
        reference(&mut dom, step, "b.ldr");

        let source = dom.create_document();
        let (_, source_step) = page_with_step(&mut dom, source, "b");
        reference(&mut dom, source_step, "a.ldr");

        assert!(matches!(dom.import(target, source), Err(DomError::CircularReference(_))));
        assert_eq!(dom.len(target).unwrap(), 1);
        assert_eq!(dom.len(source).unwrap(), 1);
    }
}
