//! 可撤销的编辑记录。每个记录都是纯数据，可以求逆并通过 [`Dom::apply_edit`] 重放。
//!
//! [`Dom::apply_edit`]: crate::dom::Dom::apply_edit

use glam::DMat4;

use crate::dom::NodeId;
use crate::element::{BfcFlag, ColourDefinition, MetaCommand};
use crate::geometry::Point3;
use crate::page::{BfcMode, HistoryEntry, License, PageType, RotationConfig, RotationPoint, Update};

/// 节点上可单独设置的属性，携带新值（或记录中的旧值）。
#[derive(Debug, Clone, PartialEq)]
pub enum Property {
    /// 页面名称或分组名称。
    Name(String),
    PageType(PageType),
    Title(String),
    Category(Option<String>),
    Theme(Option<String>),
    Bfc(BfcMode),
    Author(Option<String>),
    User(Option<String>),
    License(License),
    Update(Option<Update>),
    Help(Option<String>),
    Keywords(Vec<String>),
    History(Vec<HistoryEntry>),
    RotationPoints(Vec<RotationPoint>),
    RotationConfig(Option<RotationConfig>),
    DefaultColour(u32),
    InlineOnPublish(bool),
    Filepath(String),
    ColourValue(u32),
    Vertices(Vec<Point3>),
    Matrix(DMat4),
    TargetName(String),
    Invert(bool),
    BfcFlag(BfcFlag),
    Text(String),
    Command(MetaCommand),
    ColourDefinition(ColourDefinition),
    IsVisible(bool),
    IsGhosted(bool),
    IsLocked(bool),
}

impl Property {
    pub fn operation(&self) -> &'static str {
        match self {
            Property::Name(_) => "NameChanged",
            Property::PageType(_) => "PageTypeChanged",
            Property::Title(_) => "TitleChanged",
            Property::Category(_) => "CategoryChanged",
            Property::Theme(_) => "ThemeChanged",
            Property::Bfc(_) => "BFCChanged",
            Property::Author(_) => "AuthorChanged",
            Property::User(_) => "UserChanged",
            Property::License(_) => "LicenseChanged",
            Property::Update(_) => "UpdateChanged",
            Property::Help(_) => "HelpChanged",
            Property::Keywords(_) => "KeywordsChanged",
            Property::History(_) => "HistoryChanged",
            Property::RotationPoints(_) => "RotationPointsChanged",
            Property::RotationConfig(_) => "RotationConfigChanged",
            Property::DefaultColour(_) => "DefaultColourChanged",
            Property::InlineOnPublish(_) => "InlineOnPublishChanged",
            Property::Filepath(_) => "FilepathChanged",
            Property::ColourValue(_) => "ColourValueChanged",
            Property::Vertices(_) => "VerticesChanged",
            Property::Matrix(_) => "MatrixChanged",
            Property::TargetName(_) => "TargetNameChanged",
            Property::Invert(_) => "InvertChanged",
            Property::BfcFlag(_) => "FlagChanged",
            Property::Text(_) => "TextChanged",
            Property::Command(_) => "CommandChanged",
            Property::ColourDefinition(_) => "ColourDefinitionChanged",
            Property::IsVisible(_) => "IsVisibleChanged",
            Property::IsGhosted(_) => "IsGhostedChanged",
            Property::IsLocked(_) => "IsLockedChanged",
        }
    }

    /// 几何属性受锁定约束；其余属性在锁定状态下仍可修改。
    pub fn is_geometric(&self) -> bool {
        matches!(self, Property::Vertices(_) | Property::Matrix(_) | Property::Invert(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Edit {
    Insert {
        collection: NodeId,
        index: usize,
        item: NodeId,
    },
    Remove {
        collection: NodeId,
        index: usize,
        item: NodeId,
    },
    Replace {
        collection: NodeId,
        index: usize,
        old: NodeId,
        new: NodeId,
    },
    Clear {
        collection: NodeId,
        items: Vec<NodeId>,
    },
    Restore {
        collection: NodeId,
        items: Vec<NodeId>,
    },
    SetProperty {
        node: NodeId,
        old: Property,
        new: Property,
    },
    /// 作为一个整体撤销的一组编辑，按顺序应用。
    Compound(Vec<Edit>),
}

impl Edit {
    pub fn inverse(&self) -> Edit {
        match self {
            Edit::Insert {
                collection,
                index,
                item,
            } => Edit::Remove {
                collection: *collection,
                index: *index,
                item: *item,
            },
            Edit::Remove {
                collection,
                index,
                item,
            } => Edit::Insert {
                collection: *collection,
                index: *index,
                item: *item,
            },
            Edit::Replace {
                collection,
                index,
                old,
                new,
            } => Edit::Replace {
                collection: *collection,
                index: *index,
                old: *new,
                new: *old,
            },
            Edit::Clear { collection, items } => Edit::Restore {
                collection: *collection,
                items: items.clone(),
            },
            Edit::Restore { collection, items } => Edit::Clear {
                collection: *collection,
                items: items.clone(),
            },
            Edit::SetProperty { node, old, new } => Edit::SetProperty {
                node: *node,
                old: new.clone(),
                new: old.clone(),
            },
            Edit::Compound(edits) => Edit::Compound(edits.iter().rev().map(Edit::inverse).collect()),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Edit::Compound(edits) if edits.iter().all(Edit::is_empty))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inverse_of_compound_reverses_order() {
        let a = NodeId::new(1);
        let b = NodeId::new(2);
        let edit = Edit::Compound(vec![
            Edit::Insert {
                collection: a,
                index: 0,
                item: b,
            },
            Edit::SetProperty {
                node: b,
                old: Property::IsVisible(true),
                new: Property::IsVisible(false),
            },
        ]);
        let Edit::Compound(inverse) = edit.inverse() else {
            panic!("compound edit should invert to compound");
        };
        assert_eq!(
            inverse[0],
            Edit::SetProperty {
                node: b,
                old: Property::IsVisible(false),
                new: Property::IsVisible(true),
            }
        );
        assert!(matches!(inverse[1], Edit::Remove { index: 0, .. }));
        assert_eq!(edit.inverse().inverse(), edit);
    }

    #[test]
    fn empty_compound_is_empty() {
        assert!(Edit::Compound(Vec::new()).is_empty());
        assert!(Edit::Compound(vec![Edit::Compound(Vec::new())]).is_empty());
    }
}
