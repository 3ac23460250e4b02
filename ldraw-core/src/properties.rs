//! 属性修改：校验、写入、记录日志并通知。
//!
//! 页面改名会同步更新同一作用域内指向它的引用；改名或改引用目标若会形成循环引用，
//! 修改整体回滚。

use std::collections::HashSet;
use std::mem;

use tracing::debug;

use crate::document::validate_filepath;
use crate::dom::{Dom, NodeData, NodeId};
use crate::edit::{Edit, Property};
use crate::element::{ElementKind, MetaCommand, check_group_name, check_single_line, check_vertex_count};
use crate::errors::{DomError, DomResult};
use crate::page::{PageType, normalize_keywords, normalize_page_name, target_name_for};
use crate::resolve::normalize_target;

enum Route {
    Retarget(String, PageType),
    Reference(String),
    Group(String),
    Plain,
}

impl Dom {
    /// 设置节点属性。冻结节点返回 `ObjectFrozen`，只读节点返回 `NotSupported`；
    /// 锁定只阻止几何属性（顶点、矩阵、反转）。
    pub fn set_property(&mut self, id: NodeId, property: Property) -> DomResult<()> {
        if self.is_frozen(id)? {
            return Err(DomError::ObjectFrozen(id));
        }
        if self.is_immutable(id)? {
            return Err(DomError::NotSupported(format!("node {id} is read-only")));
        }
        if property.is_geometric() && self.is_locked(id)? {
            return Err(DomError::ElementLocked(id));
        }
        let property = self.validate_property(id, property)?;

        let route = match (&self.node(id)?.data, &property) {
            (NodeData::Page(page), Property::Name(name)) => Route::Retarget(name.clone(), page.page_type),
            (NodeData::Page(page), Property::PageType(page_type)) => Route::Retarget(page.name.clone(), *page_type),
            (NodeData::Element(_), Property::TargetName(name)) => Route::Reference(name.clone()),
            (NodeData::Element(element), Property::Name(name)) if element.is_collection() => Route::Group(name.clone()),
            _ => Route::Plain,
        };
        match route {
            Route::Retarget(name, page_type) => self.retarget_page(id, name, page_type, property),
            Route::Reference(name) => self.set_reference_target(id, name),
            Route::Group(name) => self.rename_group(id, name),
            Route::Plain => self.commit_property(id, property),
        }
    }

    fn commit_property(&mut self, id: NodeId, property: Property) -> DomResult<()> {
        let old = self.write_property_raw(id, property.clone())?;
        if old == property {
            return Ok(());
        }
        self.record(Edit::SetProperty {
            node: id,
            old: old.clone(),
            new: property.clone(),
        });
        self.notify_property(id, old, property);
        Ok(())
    }

    fn validate_property(&self, id: NodeId, property: Property) -> DomResult<Property> {
        let node = self.node(id)?;
        let property = match (&node.data, property) {
            (NodeData::Document(_), Property::Filepath(path)) => {
                validate_filepath(&path)?;
                Property::Filepath(path)
            }
            (NodeData::Page(page), Property::Name(name)) => Property::Name(normalize_page_name(&name, page.page_type)?),
            (NodeData::Page(page), Property::PageType(page_type)) => {
                normalize_page_name(&page.name, page_type)?;
                Property::PageType(page_type)
            }
            (NodeData::Page(page), Property::Category(Some(category))) => {
                if !page.page_type.allows_category() {
                    return Err(disallowed("category", page.page_type));
                }
                check_single_line("category", &category)?;
                Property::Category(Some(category.trim().to_string()))
            }
            (NodeData::Page(page), Property::Theme(Some(theme))) => {
                if !page.page_type.is_model() {
                    return Err(disallowed("theme", page.page_type));
                }
                check_single_line("theme", &theme)?;
                Property::Theme(Some(theme.trim().to_string()))
            }
            (NodeData::Page(_), Property::Title(title)) => {
                check_single_line("title", &title)?;
                Property::Title(title)
            }
            (NodeData::Page(_), Property::Author(Some(author))) => {
                check_single_line("author", &author)?;
                Property::Author(Some(author))
            }
            (NodeData::Page(_), Property::User(Some(user))) => {
                check_single_line("user", &user)?;
                Property::User(Some(user))
            }
            (NodeData::Page(_), Property::Keywords(keywords)) => {
                for keyword in &keywords {
                    check_single_line("keyword", keyword)?;
                    if keyword.contains(',') {
                        return Err(DomError::InvalidArgument(format!(
                            "keyword '{keyword}' must not contain ','"
                        )));
                    }
                }
                Property::Keywords(normalize_keywords(&keywords))
            }
            (NodeData::Page(page), Property::RotationConfig(Some(config))) => {
                let count = page.rotation_points.len() as i32;
                if !(0..=count).contains(&config.point_index) {
                    return Err(DomError::ArgumentOutOfRange(format!(
                        "rotation point index {} (page defines {count})",
                        config.point_index
                    )));
                }
                Property::RotationConfig(Some(config))
            }
            (NodeData::Page(_), Property::RotationPoints(points)) => {
                for point in &points {
                    check_single_line("rotation point name", &point.name)?;
                }
                Property::RotationPoints(points)
            }
            (NodeData::Element(element), Property::Vertices(vertices)) => {
                let Some(graphic) = element.as_graphic() else {
                    return Err(DomError::InvalidOperation(format!("element {id} has no vertices")));
                };
                check_vertex_count(graphic.shape, vertices.len())?;
                Property::Vertices(vertices)
            }
            (NodeData::Element(_), Property::TargetName(name)) => {
                let name = name.trim().to_string();
                if name.is_empty() {
                    return Err(DomError::InvalidArgument("target name must not be empty".to_string()));
                }
                check_single_line("target name", &name)?;
                Property::TargetName(name)
            }
            (NodeData::Element(_), Property::Name(name)) => {
                check_group_name(&name)?;
                Property::Name(name)
            }
            (NodeData::Element(_), Property::Text(text)) => {
                check_single_line("comment", &text)?;
                Property::Text(text)
            }
            (NodeData::Element(_), Property::Command(MetaCommand::Write(text))) => {
                check_single_line("WRITE text", &text)?;
                Property::Command(MetaCommand::Write(text))
            }
            (NodeData::Element(_), Property::ColourDefinition(definition)) => {
                if definition.is_direct() && node.parent.is_some() {
                    return Err(DomError::NotSupported(format!(
                        "element {id} cannot hold a direct colour while in a collection"
                    )));
                }
                check_single_line("colour name", &definition.name)?;
                Property::ColourDefinition(definition)
            }
            (_, property) => property,
        };
        Ok(property)
    }

    /// 直接写入字段并返回旧值；不检查、不记录、不通知。
    pub(crate) fn write_property_raw(&mut self, id: NodeId, property: Property) -> DomResult<Property> {
        let node = self.node_mut(id)?;
        if let Property::IsLocked(locked) = property {
            return Ok(Property::IsLocked(mem::replace(&mut node.flags.locked, locked)));
        }
        let old = match (&mut node.data, property) {
            (NodeData::Document(document), Property::Filepath(value)) => {
                Property::Filepath(mem::replace(&mut document.filepath, value))
            }
            (NodeData::Page(page), property) => match property {
                Property::Name(value) => Property::Name(mem::replace(&mut page.name, value)),
                Property::PageType(value) => Property::PageType(mem::replace(&mut page.page_type, value)),
                Property::Title(value) => Property::Title(mem::replace(&mut page.title, value)),
                Property::Category(value) => Property::Category(mem::replace(&mut page.category, value)),
                Property::Theme(value) => Property::Theme(mem::replace(&mut page.theme, value)),
                Property::Bfc(value) => Property::Bfc(mem::replace(&mut page.bfc, value)),
                Property::Author(value) => Property::Author(mem::replace(&mut page.author, value)),
                Property::User(value) => Property::User(mem::replace(&mut page.user, value)),
                Property::License(value) => Property::License(mem::replace(&mut page.license, value)),
                Property::Update(value) => Property::Update(mem::replace(&mut page.update, value)),
                Property::Help(value) => Property::Help(mem::replace(&mut page.help, value)),
                Property::Keywords(value) => Property::Keywords(mem::replace(&mut page.keywords, value)),
                Property::History(value) => Property::History(mem::replace(&mut page.history, value)),
                Property::RotationPoints(value) => {
                    Property::RotationPoints(mem::replace(&mut page.rotation_points, value))
                }
                Property::RotationConfig(value) => {
                    Property::RotationConfig(mem::replace(&mut page.rotation_config, value))
                }
                Property::DefaultColour(value) => {
                    Property::DefaultColour(mem::replace(&mut page.default_colour, value))
                }
                Property::InlineOnPublish(value) => {
                    Property::InlineOnPublish(mem::replace(&mut page.inline_on_publish, value))
                }
                property => return Err(mismatch(id, &property)),
            },
            (NodeData::Element(element), Property::IsVisible(value)) => {
                Property::IsVisible(mem::replace(&mut element.is_visible, value))
            }
            (NodeData::Element(element), Property::IsGhosted(value)) => {
                Property::IsGhosted(mem::replace(&mut element.is_ghosted, value))
            }
            (NodeData::Element(element), property) => match (&mut element.kind, property) {
                (ElementKind::Graphic(graphic), Property::ColourValue(value)) => {
                    Property::ColourValue(mem::replace(&mut graphic.colour, value))
                }
                (ElementKind::Graphic(graphic), Property::Vertices(value)) => {
                    Property::Vertices(mem::replace(&mut graphic.vertices, value))
                }
                (ElementKind::Reference(reference), Property::ColourValue(value)) => {
                    Property::ColourValue(mem::replace(&mut reference.colour, value))
                }
                (ElementKind::Reference(reference), Property::Matrix(value)) => {
                    Property::Matrix(mem::replace(&mut reference.matrix, value))
                }
                (ElementKind::Reference(reference), Property::TargetName(value)) => {
                    Property::TargetName(mem::replace(&mut reference.target_name, value))
                }
                (ElementKind::Reference(reference), Property::Invert(value)) => {
                    Property::Invert(mem::replace(&mut reference.invert, value))
                }
                (ElementKind::Group(group), Property::Name(value)) => Property::Name(mem::replace(&mut group.name, value)),
                (ElementKind::BfcFlag(flag), Property::BfcFlag(value)) => Property::BfcFlag(mem::replace(flag, value)),
                (ElementKind::Comment(comment), Property::Text(value)) => Property::Text(mem::replace(&mut comment.text, value)),
                (ElementKind::MetaCommand(command), Property::Command(value)) => {
                    Property::Command(mem::replace(command, value))
                }
                (ElementKind::Colour(definition), Property::ColourDefinition(value)) => {
                    Property::ColourDefinition(mem::replace(definition, value))
                }
                (_, property) => return Err(mismatch(id, &property)),
            },
            (_, property) => return Err(mismatch(id, &property)),
        };
        Ok(old)
    }

    /// 页面改名或改类型：目标名在文档内唯一，指向它的引用随之更新，不得引入循环。
    fn retarget_page(&mut self, page: NodeId, name: String, page_type: PageType, property: Property) -> DomResult<()> {
        let new_target = target_name_for(&name, page_type);
        if let Some(document) = self.parent(page)? {
            let wanted = normalize_target(&new_target);
            for other in self.pages(document)? {
                if *other != page && normalize_target(&self.target_name(*other)?) == wanted {
                    return Err(DomError::DuplicateName(new_target));
                }
            }
        }
        let references = self.references_to(page)?;
        for reference in &references {
            if self.is_frozen(*reference)? {
                return Err(DomError::ObjectFrozen(*reference));
            }
            if self.is_immutable(*reference)? {
                return Err(DomError::NotSupported(format!("reference {reference} is read-only")));
            }
        }

        let old = self.write_property_raw(page, property.clone())?;
        if old == property {
            return Ok(());
        }
        let mut cascaded = Vec::with_capacity(references.len());
        for reference in &references {
            let previous = self.write_property_raw(*reference, Property::TargetName(new_target.clone()))?;
            cascaded.push((*reference, previous));
        }

        let scope = self.scope_of(page)?;
        if self.scope_has_cycle(&scope) {
            for (reference, previous) in cascaded.into_iter().rev() {
                self.write_property_raw(reference, previous)?;
            }
            self.write_property_raw(page, old)?;
            debug!(page = page.get(), target = %new_target, "改名会形成循环引用，已恢复");
            return Err(DomError::InvalidOperation(format!(
                "renaming page to '{new_target}' would create a circular reference"
            )));
        }

        let mut edits = vec![Edit::SetProperty {
            node: page,
            old: old.clone(),
            new: property.clone(),
        }];
        edits.extend(cascaded.iter().map(|(reference, previous)| Edit::SetProperty {
            node: *reference,
            old: previous.clone(),
            new: Property::TargetName(new_target.clone()),
        }));
        self.record(Edit::Compound(edits));

        self.notify_property(page, old, property);
        for (reference, previous) in cascaded {
            self.notify_property(reference, previous, Property::TargetName(new_target.clone()));
        }
        debug!(page = page.get(), target = %new_target, references = references.len(), "页面目标名已更新");
        Ok(())
    }

    fn set_reference_target(&mut self, reference: NodeId, name: String) -> DomResult<()> {
        let property = Property::TargetName(name.clone());
        let old = self.write_property_raw(reference, property.clone())?;
        if old == property {
            return Ok(());
        }
        if let Some(page) = self.owning_page(reference)? {
            if self.page_in_cycle(page)? {
                self.write_property_raw(reference, old)?;
                return Err(DomError::CircularReference(format!(
                    "reference {reference} to '{name}' would create a cycle"
                )));
            }
        }
        self.record(Edit::SetProperty {
            node: reference,
            old: old.clone(),
            new: property.clone(),
        });
        self.notify_property(reference, old, property);
        Ok(())
    }

    fn rename_group(&mut self, group: NodeId, name: String) -> DomResult<()> {
        let scope_root = match self.owning_page(group)? {
            Some(page) => page,
            None => self.detached_root(group)?,
        };
        let excluded = HashSet::from([group]);
        if self.group_names(scope_root, &excluded)?.contains(&name) {
            return Err(DomError::DuplicateName(name));
        }
        self.commit_property(group, Property::Name(name))
    }
}

fn mismatch(id: NodeId, property: &Property) -> DomError {
    DomError::InvalidOperation(format!("{} does not apply to node {id}", property.operation()))
}

fn disallowed(what: &str, page_type: PageType) -> DomError {
    DomError::InvalidOperation(format!("{what} is not allowed for {} pages", page_type.code()))
}
