//! 引用解析与循环引用检测。
//!
//! 引用目标先在所属文档的页面中按目标名查找（不区分大小写，`/` 视同 `\`），
//! 或按页面在磁盘上的绝对位置匹配；找不到时交给外部 [`TargetResolver`]。
//! 循环检测每次都在完整的页面图上做深度优先搜索，不维护增量索引。

use std::collections::{HashMap, HashSet};
use std::fmt;

use tracing::trace;

use crate::document::DocumentStatus;
use crate::dom::{Dom, NodeData, NodeId};
use crate::errors::{DomError, DomResult};
use crate::page::PageType;

/// 外部解析器：按名称或绝对路径返回某个页面，可被重复调用。
pub trait TargetResolver: fmt::Debug {
    fn resolve(&self, dom: &Dom, target_name: &str) -> Option<NodeId>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetStatus {
    Resolved,
    Unresolved,
    CircularReference,
}

/// 目标名比较用的规范形式。
pub fn normalize_target(name: &str) -> String {
    name.trim().replace('/', "\\").to_lowercase()
}

/// 零件库目录：把目标名与绝对路径映射到其它文档中的页面。
#[derive(Debug, Default, Clone)]
pub struct LibraryCatalog {
    entries: HashMap<String, NodeId>,
}

impl LibraryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_page(&mut self, dom: &Dom, page: NodeId) -> DomResult<()> {
        self.entries.insert(normalize_target(&dom.target_name(page)?), page);
        if let Some(location) = dom.page_location(page)? {
            self.entries.insert(normalize_target(&location), page);
        }
        Ok(())
    }

    pub fn register_document(&mut self, dom: &Dom, document: NodeId) -> DomResult<usize> {
        let pages = dom.pages(document)?.to_vec();
        for page in &pages {
            self.register_page(dom, *page)?;
        }
        Ok(pages.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl TargetResolver for LibraryCatalog {
    fn resolve(&self, dom: &Dom, target_name: &str) -> Option<NodeId> {
        self.entries
            .get(&normalize_target(target_name))
            .copied()
            .filter(|page| !dom.is_disposed(*page))
    }
}

/// 本地解析的页面集合：文档的页面，或独立页面自身。
#[derive(Debug, Clone, Default)]
pub(crate) struct Scope {
    pub(crate) document: Option<NodeId>,
    pub(crate) pages: Vec<NodeId>,
}

/// 假设性修改：`extra` 中的目标名视为 `page` 新增的引用，`excluded` 中的节点视为已移除。
#[derive(Debug, Default)]
pub(crate) struct Hypothesis {
    pub(crate) scope: Scope,
    pub(crate) page: Option<NodeId>,
    pub(crate) extra: Vec<String>,
    pub(crate) excluded: HashSet<NodeId>,
}

impl Dom {
    pub(crate) fn document_scope(&self, document: NodeId) -> DomResult<Scope> {
        Ok(Scope {
            document: Some(document),
            pages: self.pages(document)?.to_vec(),
        })
    }

    pub(crate) fn scope_of(&self, page: NodeId) -> DomResult<Scope> {
        match self.node(page)?.parent {
            Some(document) => self.document_scope(document),
            None => Ok(Scope {
                document: None,
                pages: vec![page],
            }),
        }
    }

    /// 页面在磁盘上的位置：单页文档即文档路径，多页文档为文档目录下的目标名。
    pub fn page_location(&self, page: NodeId) -> DomResult<Option<String>> {
        let scope = self.scope_of(page)?;
        self.location_in(&scope, page)
    }

    fn location_in(&self, scope: &Scope, page: NodeId) -> DomResult<Option<String>> {
        let Some(document) = scope.document else {
            return Ok(None);
        };
        let filepath = self.document(document)?.filepath.replace('/', "\\");
        if scope.pages.len() == 1 {
            return Ok(Some(filepath));
        }
        let target = self.target_name(page)?;
        Ok(Some(match filepath.rsplit_once('\\') {
            Some((directory, _)) => format!("{directory}\\{target}"),
            None => target,
        }))
    }

    pub(crate) fn resolve_in(&self, scope: &Scope, target_name: &str) -> Option<NodeId> {
        let wanted = normalize_target(target_name);
        let local = scope.pages.iter().copied().find(|page| {
            self.target_name(*page)
                .is_ok_and(|name| normalize_target(&name) == wanted)
        });
        let local = local.or_else(|| {
            scope.pages.iter().copied().find(|page| {
                matches!(self.location_in(scope, *page), Ok(Some(location)) if normalize_target(&location) == wanted)
            })
        });
        local.or_else(|| {
            self.resolver
                .as_ref()
                .and_then(|resolver| resolver.resolve(self, target_name))
        })
    }

    /// 页面下所有引用的目标名。
    fn outgoing_names(&self, page: NodeId, excluded: &HashSet<NodeId>) -> Vec<String> {
        let Ok(nodes) = self.descendants(page) else {
            return Vec::new();
        };
        nodes
            .into_iter()
            .filter(|node| !excluded.contains(node))
            .filter_map(|node| match self.node(node) {
                Ok(entry) => match &entry.data {
                    NodeData::Element(element) => element.as_reference().map(|r| r.target_name.clone()),
                    _ => None,
                },
                Err(_) => None,
            })
            .collect()
    }

    fn edges(&self, hypothesis: &Hypothesis, page: NodeId) -> Vec<NodeId> {
        let own;
        let scope = if hypothesis.scope.pages.contains(&page) {
            &hypothesis.scope
        } else {
            own = self.scope_of(page).unwrap_or_default();
            &own
        };
        let mut names = self.outgoing_names(page, &hypothesis.excluded);
        if hypothesis.page == Some(page) {
            names.extend(hypothesis.extra.iter().cloned());
        }
        names
            .iter()
            .filter_map(|name| self.resolve_in(scope, name))
            .collect()
    }

    fn reaches(&self, hypothesis: &Hypothesis, start: NodeId, goal: NodeId) -> bool {
        let mut visited = HashSet::new();
        let mut stack = vec![start];
        while let Some(page) = stack.pop() {
            for target in self.edges(hypothesis, page) {
                if target == goal {
                    return true;
                }
                if visited.insert(target) {
                    stack.push(target);
                }
            }
        }
        false
    }

    pub(crate) fn creates_cycle(&self, hypothesis: &Hypothesis) -> bool {
        let found = match hypothesis.page {
            Some(page) => self.reaches(hypothesis, page, page),
            None => hypothesis
                .scope
                .pages
                .iter()
                .any(|page| self.reaches(hypothesis, *page, *page)),
        };
        if found {
            trace!(page = ?hypothesis.page.map(NodeId::get), "检测到循环引用");
        }
        found
    }

    pub(crate) fn scope_has_cycle(&self, scope: &Scope) -> bool {
        self.creates_cycle(&Hypothesis {
            scope: scope.clone(),
            ..Hypothesis::default()
        })
    }

    /// 页面是否能经由引用回到自身。
    pub fn page_in_cycle(&self, page: NodeId) -> DomResult<bool> {
        self.page(page)?;
        Ok(self.creates_cycle(&Hypothesis {
            scope: self.scope_of(page)?,
            page: Some(page),
            ..Hypothesis::default()
        }))
    }

    fn reference_scope(&self, reference: NodeId) -> DomResult<(String, Option<NodeId>, Scope)> {
        let name = self
            .element(reference)?
            .as_reference()
            .map(|r| r.target_name.clone())
            .ok_or_else(|| DomError::InvalidArgument(format!("node {reference} is not a reference")))?;
        let page = self.owning_page(reference)?;
        let scope = match page {
            Some(page) => self.scope_of(page)?,
            None => Scope::default(),
        };
        Ok((name, page, scope))
    }

    /// 引用当前解析到的页面。
    pub fn target(&self, reference: NodeId) -> DomResult<Option<NodeId>> {
        let (name, _, scope) = self.reference_scope(reference)?;
        Ok(self.resolve_in(&scope, &name))
    }

    pub fn target_status(&self, reference: NodeId) -> DomResult<TargetStatus> {
        let (name, page, scope) = self.reference_scope(reference)?;
        let Some(target) = self.resolve_in(&scope, &name) else {
            return Ok(TargetStatus::Unresolved);
        };
        if let Some(page) = page {
            let hypothesis = Hypothesis {
                scope,
                ..Hypothesis::default()
            };
            if target == page || self.reaches(&hypothesis, target, page) {
                return Ok(TargetStatus::CircularReference);
            }
        }
        Ok(TargetStatus::Resolved)
    }

    /// 同一作用域内解析到 `page` 的全部引用元素。
    pub fn references_to(&self, page: NodeId) -> DomResult<Vec<NodeId>> {
        let scope = self.scope_of(page)?;
        let mut result = Vec::new();
        for source in &scope.pages {
            for node in self.descendants(*source)? {
                let NodeData::Element(element) = &self.node(node)?.data else {
                    continue;
                };
                if let Some(reference) = element.as_reference() {
                    if self.resolve_in(&scope, &reference.target_name) == Some(page) {
                        result.push(node);
                    }
                }
            }
        }
        Ok(result)
    }

    /// 页面直接引用的、可解析的页面（去重，保持首次出现顺序）。
    pub fn dependencies(&self, page: NodeId) -> DomResult<Vec<NodeId>> {
        let scope = self.scope_of(page)?;
        let mut seen = HashSet::new();
        Ok(self
            .outgoing_names(page, &HashSet::new())
            .iter()
            .filter_map(|name| self.resolve_in(&scope, name))
            .filter(|target| seen.insert(*target))
            .collect())
    }

    /// 文件位于某个库根目录下即视为已发布。
    pub fn document_status(&self, document: NodeId) -> DomResult<DocumentStatus> {
        let filepath = normalize_target(&self.document(document)?.filepath);
        let released = self.library_roots.iter().any(|root| {
            let mut root = normalize_target(&root.to_string_lossy());
            if !root.ends_with('\\') {
                root.push('\\');
            }
            filepath.starts_with(&root)
        });
        Ok(if released {
            DocumentStatus::Released
        } else {
            DocumentStatus::Private
        })
    }

    /// 任一页面为模型时文档为模型，否则取首个页面的类型；空文档没有类型。
    pub fn document_type(&self, document: NodeId) -> DomResult<Option<PageType>> {
        let pages = self.pages(document)?;
        let mut first = None;
        for page in pages {
            let page_type = self.page(*page)?.page_type;
            if page_type.is_model() {
                return Ok(Some(PageType::Model));
            }
            first.get_or_insert(page_type);
        }
        Ok(first)
    }
}
