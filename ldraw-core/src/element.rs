use glam::DMat4;
use serde::{Deserialize, Serialize};

use crate::errors::{DomError, DomResult};
use crate::geometry::Point3;
use crate::palette::{self, MAIN_COLOUR};

/// 图形图元的形状，决定顶点数量与行类型。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Shape {
    Line,
    Triangle,
    Quadrilateral,
    /// 条件线：两个端点加两个控制点。
    OptionalLine,
}

impl Shape {
    pub fn vertex_count(self) -> usize {
        match self {
            Shape::Line => 2,
            Shape::Triangle => 3,
            Shape::Quadrilateral | Shape::OptionalLine => 4,
        }
    }

    pub fn line_type(self) -> u8 {
        match self {
            Shape::Line => 2,
            Shape::Triangle => 3,
            Shape::Quadrilateral => 4,
            Shape::OptionalLine => 5,
        }
    }

    /// 只有三角形和四边形有绕序。
    pub fn has_winding(self) -> bool {
        matches!(self, Shape::Triangle | Shape::Quadrilateral)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Graphic {
    pub shape: Shape,
    pub colour: u32,
    pub vertices: Vec<Point3>,
}

impl Graphic {
    pub fn new(shape: Shape, colour: u32, vertices: Vec<Point3>) -> DomResult<Self> {
        check_vertex_count(shape, vertices.len())?;
        Ok(Self {
            shape,
            colour,
            vertices,
        })
    }

    pub fn line(colour: u32, a: Point3, b: Point3) -> Self {
        Self {
            shape: Shape::Line,
            colour,
            vertices: vec![a, b],
        }
    }

    pub fn triangle(colour: u32, a: Point3, b: Point3, c: Point3) -> Self {
        Self {
            shape: Shape::Triangle,
            colour,
            vertices: vec![a, b, c],
        }
    }

    pub fn quadrilateral(colour: u32, a: Point3, b: Point3, c: Point3, d: Point3) -> Self {
        Self {
            shape: Shape::Quadrilateral,
            colour,
            vertices: vec![a, b, c, d],
        }
    }

    pub fn optional_line(colour: u32, a: Point3, b: Point3, control_a: Point3, control_b: Point3) -> Self {
        Self {
            shape: Shape::OptionalLine,
            colour,
            vertices: vec![a, b, control_a, control_b],
        }
    }

    /// 返回反转绕序后的顶点；线段与条件线保持不变。
    pub fn reversed_vertices(&self) -> Vec<Point3> {
        let mut vertices = self.vertices.clone();
        if self.shape.has_winding() {
            vertices[1..].reverse();
        }
        vertices
    }

    pub fn transformed_vertices(&self, matrix: &DMat4) -> Vec<Point3> {
        self.vertices.iter().map(|vertex| vertex.transform(matrix)).collect()
    }
}

pub(crate) fn check_vertex_count(shape: Shape, count: usize) -> DomResult<()> {
    if count != shape.vertex_count() {
        return Err(DomError::InvalidArgument(format!(
            "{shape:?} requires {} vertices, got {count}",
            shape.vertex_count()
        )));
    }
    Ok(())
}

/// 对其它页面的引用（行类型 1）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    pub colour: u32,
    pub matrix: DMat4,
    pub target_name: String,
    /// 对应 `BFC INVERTNEXT`。
    pub invert: bool,
}

impl Reference {
    pub fn new(target_name: impl Into<String>) -> Self {
        Self {
            colour: MAIN_COLOUR,
            matrix: DMat4::IDENTITY,
            target_name: target_name.into(),
            invert: false,
        }
    }

    pub fn with_colour(mut self, colour: u32) -> Self {
        self.colour = colour;
        self
    }

    pub fn with_matrix(mut self, matrix: DMat4) -> Self {
        self.matrix = matrix;
        self
    }
}

/// MLCAD 分组，成员作为子元素保存。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BfcFlag {
    SetWindingClockwise,
    SetWindingCounterClockwise,
    EnableBackFaceCulling,
    DisableBackFaceCulling,
    EnableBackFaceCullingAndSetWindingClockwise,
    EnableBackFaceCullingAndSetWindingCounterClockwise,
    InvertNext,
}

impl BfcFlag {
    pub fn code(self) -> &'static str {
        match self {
            BfcFlag::SetWindingClockwise => "0 BFC CW",
            BfcFlag::SetWindingCounterClockwise => "0 BFC CCW",
            BfcFlag::EnableBackFaceCulling => "0 BFC CLIP",
            BfcFlag::DisableBackFaceCulling => "0 BFC NOCLIP",
            BfcFlag::EnableBackFaceCullingAndSetWindingClockwise => "0 BFC CLIP CW",
            BfcFlag::EnableBackFaceCullingAndSetWindingCounterClockwise => "0 BFC CLIP CCW",
            BfcFlag::InvertNext => "0 BFC INVERTNEXT",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetaCommand {
    Step,
    Clear,
    Pause,
    Save,
    Write(String),
}

impl MetaCommand {
    pub fn code(&self) -> String {
        match self {
            MetaCommand::Step => "0 STEP".to_string(),
            MetaCommand::Clear => "0 CLEAR".to_string(),
            MetaCommand::Pause => "0 PAUSE".to_string(),
            MetaCommand::Save => "0 SAVE".to_string(),
            MetaCommand::Write(text) => format!("0 WRITE {text}"),
        }
    }
}

/// `!COLOUR` 定义，用于页面内自定义颜色。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColourDefinition {
    pub code: u32,
    pub name: String,
    /// `0xRRGGBB`
    pub value: u32,
    pub edge: u32,
}

impl ColourDefinition {
    /// 直接颜色本身不需要定义，不允许放入集合。
    pub fn is_direct(&self) -> bool {
        palette::is_direct_colour(self.code)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ElementKind {
    Graphic(Graphic),
    Reference(Reference),
    Group(Group),
    BfcFlag(BfcFlag),
    Comment(Comment),
    MetaCommand(MetaCommand),
    Colour(ColourDefinition),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub kind: ElementKind,
    pub is_visible: bool,
    pub is_ghosted: bool,
}

impl Element {
    pub fn new(kind: ElementKind) -> Self {
        Self {
            kind,
            is_visible: true,
            is_ghosted: false,
        }
    }

    pub fn graphic(graphic: Graphic) -> Self {
        Self::new(ElementKind::Graphic(graphic))
    }

    pub fn reference(reference: Reference) -> Self {
        Self::new(ElementKind::Reference(reference))
    }

    pub fn group(name: impl Into<String>) -> Self {
        Self::new(ElementKind::Group(Group { name: name.into() }))
    }

    pub fn bfc(flag: BfcFlag) -> Self {
        Self::new(ElementKind::BfcFlag(flag))
    }

    pub fn comment(text: impl Into<String>) -> Self {
        Self::new(ElementKind::Comment(Comment { text: text.into() }))
    }

    pub fn meta(command: MetaCommand) -> Self {
        Self::new(ElementKind::MetaCommand(command))
    }

    pub fn colour(definition: ColourDefinition) -> Self {
        Self::new(ElementKind::Colour(definition))
    }

    pub fn hidden(mut self) -> Self {
        self.is_visible = false;
        self
    }

    pub fn ghosted(mut self) -> Self {
        self.is_ghosted = true;
        self
    }

    /// 顶层元素只能直接位于 Step 中，不能嵌套进 Group。
    pub fn is_top_level(&self) -> bool {
        matches!(self.kind, ElementKind::Group(_) | ElementKind::MetaCommand(_))
    }

    pub fn is_collection(&self) -> bool {
        matches!(self.kind, ElementKind::Group(_))
    }

    pub fn is_geometric(&self) -> bool {
        matches!(self.kind, ElementKind::Graphic(_) | ElementKind::Reference(_))
    }

    pub fn as_reference(&self) -> Option<&Reference> {
        match &self.kind {
            ElementKind::Reference(reference) => Some(reference),
            _ => None,
        }
    }

    pub fn as_graphic(&self) -> Option<&Graphic> {
        match &self.kind {
            ElementKind::Graphic(graphic) => Some(graphic),
            _ => None,
        }
    }

    pub fn group_name(&self) -> Option<&str> {
        match &self.kind {
            ElementKind::Group(group) => Some(&group.name),
            _ => None,
        }
    }

    /// 创建元素前的字段校验。
    pub(crate) fn validate(&self) -> DomResult<()> {
        match &self.kind {
            ElementKind::Graphic(graphic) => check_vertex_count(graphic.shape, graphic.vertices.len()),
            ElementKind::Reference(reference) => check_single_line("target name", &reference.target_name),
            ElementKind::Group(group) => check_group_name(&group.name),
            ElementKind::Comment(comment) => check_single_line("comment", &comment.text),
            ElementKind::MetaCommand(MetaCommand::Write(text)) => check_single_line("WRITE text", text),
            ElementKind::Colour(definition) => check_single_line("colour name", &definition.name),
            ElementKind::BfcFlag(_) | ElementKind::MetaCommand(_) => Ok(()),
        }
    }
}

pub(crate) fn check_single_line(what: &str, value: &str) -> DomResult<()> {
    if value.contains(['\r', '\n']) {
        return Err(DomError::InvalidArgument(format!("{what} must be a single line")));
    }
    Ok(())
}

pub(crate) fn check_group_name(name: &str) -> DomResult<()> {
    if name.trim().is_empty() {
        return Err(DomError::InvalidArgument("group name must not be empty".to_string()));
    }
    check_single_line("group name", name)
}
