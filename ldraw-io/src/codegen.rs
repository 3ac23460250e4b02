//! 文档树到 LDraw 文本的转换。
//!
//! 输出以行为单位收集，最终以 CRLF 连接。正文的 BFC 状态在输出中单独跟踪：
//! 源页面中的 `BFC` 标记只改变“期望状态”，在下一个几何元素之前若与已输出状态不同，
//! 才写出 `0 BFC CLIP` / `NOCLIP` / `CW` / `CCW`。`PartsLibrary` 标准下不写这些过渡行，
//! 改为反转多边形的顶点顺序。

use std::collections::HashMap;

use glam::DMat4;
use ldraw_core::geometry::is_mirroring;
use ldraw_core::palette::{MAIN_COLOUR, Palette};
use ldraw_core::{
    BfcFlag, BfcMode, CodeStandard, ColourDefinition, Dom, DomError, Element, ElementKind,
    Graphic, NodeId, NodeKind, Reference, Winding,
};
use tracing::trace;

use crate::IoError;
use crate::format::{format_colour, format_colour_definition, format_matrix, format_point};
use crate::header::header_lines;

pub const LINE_ENDING: &str = "\r\n";

#[derive(Debug, Clone)]
pub struct CodeOptions {
    pub standard: CodeStandard,
    pub palette: Palette,
}

impl CodeOptions {
    pub fn new(standard: CodeStandard) -> Self {
        Self {
            standard,
            palette: Palette::ldraw(),
        }
    }

    pub fn with_palette(mut self, palette: Palette) -> Self {
        self.palette = palette;
        self
    }
}

impl Default for CodeOptions {
    fn default() -> Self {
        Self::new(CodeStandard::default())
    }
}

/// 任意节点的代码文本，每行以 CRLF 结尾。
pub fn to_code(dom: &Dom, node: NodeId, options: &CodeOptions) -> Result<String, IoError> {
    Ok(join_lines(&to_lines(dom, node, options)?))
}

pub fn to_lines(dom: &Dom, node: NodeId, options: &CodeOptions) -> Result<Vec<String>, IoError> {
    match dom.kind(node)? {
        NodeKind::Document => document_lines(dom, node, options),
        NodeKind::Page => page_lines(dom, node, options, false),
        NodeKind::Step => {
            let mut writer = CodeWriter::new(dom, options, node, false)?;
            writer.step(node, &mut Context::plain())?;
            Ok(writer.lines)
        }
        NodeKind::Element => {
            let mut writer = CodeWriter::new(dom, options, node, false)?;
            writer.element(node, &mut Context::plain())?;
            Ok(writer.lines)
        }
    }
}

pub fn join_lines(lines: &[String]) -> String {
    let mut code = String::new();
    for line in lines {
        code.push_str(line);
        code.push_str(LINE_ENDING);
    }
    code
}

/// 单页文档直接输出该页；多页文档用 `0 FILE` / `0 NOFILE` 包裹每一页。
pub fn document_lines(dom: &Dom, document: NodeId, options: &CodeOptions) -> Result<Vec<String>, IoError> {
    let pages = dom.pages(document)?;
    let Some(first) = pages.first().copied() else {
        return Err(empty_document(document));
    };
    if pages.len() == 1 {
        return page_lines(dom, first, options, false);
    }
    if options.standard == CodeStandard::PartsLibrary {
        if dom.document_type(document)?.is_some_and(|page_type| page_type.is_model()) {
            return Err(DomError::InvalidArgument(
                "the parts library standard does not allow multi-page models".to_string(),
            )
            .into());
        }
        return page_lines(dom, first, options, false);
    }
    let mut lines = Vec::new();
    for page in pages {
        lines.push(format!("0 FILE {}", dom.target_name(*page)?));
        lines.extend(page_lines(dom, *page, options, false)?);
        lines.push("0 NOFILE".to_string());
    }
    Ok(lines)
}

/// `inline` 为真时，指向 `InlineOnPublish` 页面的引用被展开为目标页面的正文。
pub fn page_lines(dom: &Dom, page: NodeId, options: &CodeOptions, inline: bool) -> Result<Vec<String>, IoError> {
    let data = dom.page(page)?;
    let mut lines = header_lines(data, options.standard);
    let mut writer = CodeWriter::new(dom, options, page, inline)?;
    writer.certify(data.bfc);
    writer.visiting.push(page);
    let mut context = Context::for_page(data.bfc, Context::plain());
    for (index, step) in dom.steps(page)?.iter().enumerate() {
        if index > 0 {
            writer.lines.push("0 STEP".to_string());
        }
        writer.step(*step, &mut context)?;
    }
    if !writer.lines.is_empty() {
        lines.push(String::new());
        lines.append(&mut writer.lines);
    }
    Ok(lines)
}

pub(crate) fn empty_document(document: NodeId) -> IoError {
    DomError::InvalidOperation(format!("document {document} has no pages")).into()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BfcState {
    clip: bool,
    winding: Winding,
}

impl BfcState {
    const UNCERTIFIED: BfcState = BfcState {
        clip: false,
        winding: Winding::CounterClockwise,
    };

    fn apply(&mut self, flag: BfcFlag) {
        match flag {
            BfcFlag::SetWindingClockwise => self.winding = Winding::Clockwise,
            BfcFlag::SetWindingCounterClockwise => self.winding = Winding::CounterClockwise,
            BfcFlag::EnableBackFaceCulling => self.clip = true,
            BfcFlag::DisableBackFaceCulling => self.clip = false,
            BfcFlag::EnableBackFaceCullingAndSetWindingClockwise => {
                self.clip = true;
                self.winding = Winding::Clockwise;
            }
            BfcFlag::EnableBackFaceCullingAndSetWindingCounterClockwise => {
                self.clip = true;
                self.winding = Winding::CounterClockwise;
            }
            BfcFlag::InvertNext => {}
        }
    }
}

/// 当前源页面的输出上下文；展开引用时按引用派生。
#[derive(Debug, Clone)]
struct Context {
    transform: DMat4,
    /// 替换主颜色 16。
    colour: Option<u32>,
    /// 来自 `BFC INVERTNEXT` 的累积反转。
    inverted: bool,
    hidden: bool,
    ghosted: bool,
    /// 源页面声明了 BFC 认证时，`BFC` 标记才影响状态。
    certified: bool,
    state: BfcState,
}

impl Context {
    fn plain() -> Self {
        Self {
            transform: DMat4::IDENTITY,
            colour: None,
            inverted: false,
            hidden: false,
            ghosted: false,
            certified: false,
            state: BfcState::UNCERTIFIED,
        }
    }

    fn for_page(bfc: BfcMode, mut base: Context) -> Self {
        base.certified = bfc.winding().is_some();
        base.state = BfcState {
            clip: base.certified,
            winding: bfc.winding().unwrap_or(Winding::CounterClockwise),
        };
        if base.flipped() {
            base.state.winding = base.state.winding.flip();
        }
        base
    }

    /// 几何在输出中是否与源页面的绕序相反。
    fn flipped(&self) -> bool {
        self.inverted != is_mirroring(&self.transform)
    }

    fn colour(&self, colour: u32) -> u32 {
        match self.colour {
            Some(replacement) if colour == MAIN_COLOUR => replacement,
            _ => colour,
        }
    }

    fn decorate(&self, element: &Element, line: String) -> String {
        decorate(line, self.hidden || !element.is_visible, self.ghosted || element.is_ghosted)
    }

    fn apply_flag(&mut self, flag: BfcFlag) {
        self.state.apply(flag);
        let sets_winding = matches!(
            flag,
            BfcFlag::SetWindingClockwise
                | BfcFlag::SetWindingCounterClockwise
                | BfcFlag::EnableBackFaceCullingAndSetWindingClockwise
                | BfcFlag::EnableBackFaceCullingAndSetWindingCounterClockwise
        );
        if sets_winding && self.flipped() {
            self.state.winding = self.state.winding.flip();
        }
    }
}

fn decorate(line: String, hidden: bool, ghosted: bool) -> String {
    let line = if hidden { format!("0 MLCAD HIDE {line}") } else { line };
    if ghosted { format!("0 GHOST {line}") } else { line }
}

struct CodeWriter<'a> {
    dom: &'a Dom,
    options: &'a CodeOptions,
    definitions: HashMap<u32, ColourDefinition>,
    inline: bool,
    /// 输出文件本身是否经过 BFC 认证。
    certified: bool,
    emitted: BfcState,
    visiting: Vec<NodeId>,
    lines: Vec<String>,
}

impl<'a> CodeWriter<'a> {
    fn new(dom: &'a Dom, options: &'a CodeOptions, node: NodeId, inline: bool) -> Result<Self, IoError> {
        let scope = match dom.owning_document(node)? {
            Some(document) => document,
            None => dom.owning_page(node)?.unwrap_or(node),
        };
        Ok(Self {
            dom,
            options,
            definitions: colour_definitions(dom, scope)?,
            inline,
            certified: false,
            emitted: BfcState::UNCERTIFIED,
            visiting: Vec::new(),
            lines: Vec::new(),
        })
    }

    fn certify(&mut self, bfc: BfcMode) {
        if let Some(winding) = bfc.winding() {
            self.certified = true;
            self.emitted = BfcState { clip: true, winding };
        }
    }

    fn uses_markers(&self) -> bool {
        self.certified && self.options.standard != CodeStandard::PartsLibrary
    }

    fn colour(&self, code: u32) -> String {
        format_colour(code, &self.options.palette, &self.definitions)
    }

    fn step(&mut self, step: NodeId, context: &mut Context) -> Result<(), IoError> {
        let dom = self.dom;
        for element in dom.elements(step)? {
            self.element(*element, context)?;
        }
        Ok(())
    }

    fn element(&mut self, node: NodeId, context: &mut Context) -> Result<(), IoError> {
        let dom = self.dom;
        let element = dom.element(node)?;
        match &element.kind {
            ElementKind::Graphic(graphic) => self.graphic(element, graphic, context),
            ElementKind::Reference(reference) => self.reference(node, element, reference, context)?,
            ElementKind::Group(group) => self.group(node, element, &group.name, context)?,
            ElementKind::BfcFlag(flag) => {
                if *flag == BfcFlag::InvertNext || (!context.certified && !self.certified) {
                    let line = context.decorate(element, flag.code().to_string());
                    self.lines.push(line);
                } else if context.certified {
                    context.apply_flag(*flag);
                }
                // 未认证页面内联到已认证输出时，其中的标记被忽略
            }
            ElementKind::Comment(comment) => {
                let line = format!("0 // {}", comment.text).trim_end().to_string();
                self.lines.push(context.decorate(element, line));
            }
            ElementKind::MetaCommand(command) => {
                self.lines.push(context.decorate(element, command.code()));
            }
            ElementKind::Colour(definition) => {
                self.lines.push(context.decorate(element, format_colour_definition(definition)));
            }
        }
        Ok(())
    }

    /// 已输出状态与期望状态不同时写出过渡行。
    fn sync_bfc(&mut self, wanted: BfcState) {
        if !self.uses_markers() {
            return;
        }
        if self.emitted.clip != wanted.clip {
            let line = if wanted.clip { "0 BFC CLIP" } else { "0 BFC NOCLIP" };
            self.lines.push(line.to_string());
        }
        if self.emitted.winding != wanted.winding {
            self.lines.push(format!("0 BFC {}", wanted.winding.code()));
        }
        self.emitted = wanted;
    }

    fn graphic(&mut self, element: &Element, graphic: &Graphic, context: &Context) {
        let mut vertices = graphic.transformed_vertices(&context.transform);
        if graphic.shape.has_winding() {
            self.sync_bfc(context.state);
            let reverse = if self.uses_markers() {
                false
            } else if self.certified {
                context.state.winding != self.emitted.winding
            } else {
                context.flipped()
            };
            if reverse {
                vertices[1..].reverse();
            }
        }
        let points = vertices.into_iter().map(format_point).collect::<Vec<_>>().join(" ");
        let line = format!(
            "{} {} {points}",
            graphic.shape.line_type(),
            self.colour(context.colour(graphic.colour))
        );
        self.lines.push(context.decorate(element, line));
    }

    fn reference(
        &mut self,
        node: NodeId,
        element: &Element,
        reference: &Reference,
        context: &Context,
    ) -> Result<(), IoError> {
        let dom = self.dom;
        if self.inline {
            if let Some(target) = dom.target(node)? {
                let page = dom.page(target)?;
                if page.inline_on_publish && !self.visiting.contains(&target) {
                    trace!(reference = node.get(), target = target.get(), "展开内联页面");
                    let base = Context {
                        transform: context.transform * reference.matrix,
                        colour: Some(context.colour(reference.colour)),
                        inverted: context.inverted != reference.invert,
                        hidden: context.hidden || !element.is_visible,
                        ghosted: context.ghosted || element.is_ghosted,
                        certified: false,
                        state: BfcState::UNCERTIFIED,
                    };
                    let mut inner = Context::for_page(page.bfc, base);
                    self.visiting.push(target);
                    for step in dom.steps(target)? {
                        self.step(*step, &mut inner)?;
                    }
                    self.visiting.pop();
                    return Ok(());
                }
            }
        }

        self.sync_bfc(context.state);
        if context.inverted != reference.invert {
            self.lines.push(context.decorate(element, BfcFlag::InvertNext.code().to_string()));
        }
        let line = format!(
            "1 {} {} {}",
            self.colour(context.colour(reference.colour)),
            format_matrix(&(context.transform * reference.matrix)),
            reference.target_name.trim()
        );
        self.lines.push(context.decorate(element, line));
        Ok(())
    }

    /// 每个成员行之前写 `0 MLCAD BTG <name>`，最后写 `0 GROUP <count> <name>`。
    fn group(&mut self, node: NodeId, element: &Element, name: &str, context: &mut Context) -> Result<(), IoError> {
        let outer_hidden = context.hidden;
        let outer_ghosted = context.ghosted;
        context.hidden |= !element.is_visible;
        context.ghosted |= element.is_ghosted;

        let dom = self.dom;
        let mut tagged = 0;
        for member in dom.elements(node)? {
            let start = self.lines.len();
            self.element(*member, context)?;
            let produced = self.lines.split_off(start);
            tagged += produced.len();
            for line in produced {
                self.lines.push(format!("0 MLCAD BTG {name}"));
                self.lines.push(line);
            }
        }

        context.hidden = outer_hidden;
        context.ghosted = outer_ghosted;
        self.lines.push(format!("0 GROUP {tagged} {name}"));
        Ok(())
    }
}

/// 作用域内的 `!COLOUR` 定义，按编号索引；后定义的覆盖先定义的。
fn colour_definitions(dom: &Dom, scope: NodeId) -> Result<HashMap<u32, ColourDefinition>, IoError> {
    let mut definitions = HashMap::new();
    for node in dom.descendants(scope)?.into_iter().chain(std::iter::once(scope)) {
        if dom.kind(node)? != NodeKind::Element {
            continue;
        }
        if let ElementKind::Colour(definition) = &dom.element(node)?.kind {
            definitions.insert(definition.code, definition.clone());
        }
    }
    Ok(definitions)
}
