//! 几何操作：变换、反转绕序、包围盒，以及按需扫描子树。

use std::collections::HashSet;

use glam::DMat4;
use tracing::debug;

use crate::dom::{Dom, NodeData, NodeId};
use crate::edit::{Edit, Property};
use crate::element::ElementKind;
use crate::errors::{DomError, DomResult};
use crate::events::{ChangeEvent, ChangeParameters, ops};
use crate::geometry::{Bounds3D, Point3};

impl Dom {
    /// 对节点及其全部几何后代应用变换，作为一个整体记录。
    pub fn transform(&mut self, id: NodeId, matrix: &DMat4) -> DomResult<()> {
        let targets = self.geometric_targets(id)?;
        let mut edits = Vec::with_capacity(targets.len());
        for node in targets {
            let property = match &self.element(node)?.kind {
                ElementKind::Graphic(graphic) => Property::Vertices(graphic.transformed_vertices(matrix)),
                ElementKind::Reference(reference) => Property::Matrix(*matrix * reference.matrix),
                _ => continue,
            };
            let old = self.write_property_raw(node, property.clone())?;
            edits.push(Edit::SetProperty {
                node,
                old,
                new: property,
            });
        }
        if edits.is_empty() {
            return Ok(());
        }
        self.record(Edit::Compound(edits));
        let change = ChangeEvent::new(id, ops::TRANSFORMED, ChangeParameters::Transform(*matrix));
        self.raise_change(None, change);
        Ok(())
    }

    /// 反转三角形与四边形的绕序；引用切换 `invert`。
    pub fn reverse_winding(&mut self, id: NodeId) -> DomResult<()> {
        let targets = self.geometric_targets(id)?;
        let mut edits = Vec::new();
        for node in targets {
            let property = match &self.element(node)?.kind {
                ElementKind::Graphic(graphic) if graphic.shape.has_winding() => {
                    Property::Vertices(graphic.reversed_vertices())
                }
                ElementKind::Reference(reference) => Property::Invert(!reference.invert),
                _ => continue,
            };
            let old = self.write_property_raw(node, property.clone())?;
            edits.push(Edit::SetProperty {
                node,
                old,
                new: property,
            });
        }
        if edits.is_empty() {
            return Ok(());
        }
        debug!(node = id.get(), count = edits.len(), "反转绕序");
        self.record(Edit::Compound(edits));
        self.raise_change(None, ChangeEvent::new(id, ops::WINDING_REVERSED, ChangeParameters::None));
        Ok(())
    }

    /// 检查冻结、只读和锁定，返回子树中的几何元素。
    fn geometric_targets(&self, id: NodeId) -> DomResult<Vec<NodeId>> {
        if self.is_frozen(id)? {
            return Err(DomError::ObjectFrozen(id));
        }
        if self.is_immutable(id)? {
            return Err(DomError::NotSupported(format!("node {id} is read-only")));
        }
        let mut targets = Vec::new();
        for node in self.subtree(id)? {
            let entry = self.node(node)?;
            if entry.flags.frozen {
                return Err(DomError::ObjectFrozen(node));
            }
            if entry.flags.immutable {
                return Err(DomError::NotSupported(format!("node {node} is read-only")));
            }
            if entry.flags.locked {
                return Err(DomError::ElementLocked(node));
            }
            if let NodeData::Element(element) = &entry.data {
                if element.is_geometric() {
                    targets.push(node);
                }
            }
        }
        Ok(targets)
    }

    /// 所有图形顶点与（已解析的）引用目标包围盒的并集。
    pub fn bounding_box(&self, id: NodeId) -> DomResult<Bounds3D> {
        let mut visiting = HashSet::new();
        self.bounds_of(id, &mut visiting)
    }

    fn bounds_of(&self, id: NodeId, visiting: &mut HashSet<NodeId>) -> DomResult<Bounds3D> {
        let mut bounds = Bounds3D::empty();
        for node in self.subtree(id)? {
            let NodeData::Element(element) = &self.node(node)?.data else {
                continue;
            };
            match &element.kind {
                ElementKind::Graphic(graphic) => {
                    for vertex in &graphic.vertices {
                        bounds.include_point(*vertex);
                    }
                }
                ElementKind::Reference(reference) => {
                    let Some(target) = self.target(node)? else {
                        continue;
                    };
                    if visiting.insert(target) {
                        let inner = self.bounds_of(target, visiting)?;
                        visiting.remove(&target);
                        bounds.include_bounds(&inner.transformed(&reference.matrix));
                    }
                }
                _ => {}
            }
        }
        Ok(bounds)
    }

    /// 包围盒中心；没有几何内容时为 `None`。
    pub fn origin(&self, id: NodeId) -> DomResult<Option<Point3>> {
        let bounds = self.bounding_box(id)?;
        Ok((!bounds.is_empty()).then(|| bounds.center()))
    }

    pub fn contains_colour_elements(&self, id: NodeId) -> DomResult<bool> {
        self.any_descendant(id, |data| {
            matches!(data, NodeData::Element(element) if matches!(element.kind, ElementKind::Colour(_)))
        })
    }

    pub fn contains_bfc_flag_elements(&self, id: NodeId) -> DomResult<bool> {
        self.any_descendant(id, |data| {
            matches!(data, NodeData::Element(element) if matches!(element.kind, ElementKind::BfcFlag(_)))
        })
    }

    pub fn has_locked_descendants(&self, id: NodeId) -> DomResult<bool> {
        for node in self.descendants(id)? {
            if self.node(node)?.flags.locked {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn any_descendant(&self, id: NodeId, predicate: impl Fn(&NodeData) -> bool) -> DomResult<bool> {
        for node in self.descendants(id)? {
            if predicate(&self.node(node)?.data) {
                return Ok(true);
            }
        }
        Ok(false)
    }
}
