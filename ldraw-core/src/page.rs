use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::errors::{DomError, DomResult};
use crate::geometry::Point3;
use crate::palette::MAIN_COLOUR;

const MAX_NAME_LENGTH: usize = 255;
const RESERVED_CHARACTERS: [char; 7] = ['<', '>', ':', '"', '|', '?', '*'];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageType {
    Model,
    Part,
    PartAlias,
    PartPhysicalColour,
    Shortcut,
    ShortcutAlias,
    ShortcutPhysicalColour,
    Subpart,
    Primitive,
    HiresPrimitive,
}

impl PageType {
    /// `!LDRAW_ORG` 行中使用的类型字符串。
    pub fn code(self) -> &'static str {
        match self {
            PageType::Model => "Model",
            PageType::Part => "Part",
            PageType::PartAlias => "Part Alias",
            PageType::PartPhysicalColour => "Part Physical_Colour",
            PageType::Shortcut => "Shortcut",
            PageType::ShortcutAlias => "Shortcut Alias",
            PageType::ShortcutPhysicalColour => "Shortcut Physical_Colour",
            PageType::Subpart => "Subpart",
            PageType::Primitive => "Primitive",
            PageType::HiresPrimitive => "48_Primitive",
        }
    }

    pub fn is_model(self) -> bool {
        matches!(self, PageType::Model)
    }

    pub fn is_primitive(self) -> bool {
        matches!(self, PageType::Primitive | PageType::HiresPrimitive)
    }

    /// 零件族：零件、快捷方式及其别名/实体颜色变体。
    pub fn is_part_family(self) -> bool {
        matches!(
            self,
            PageType::Part
                | PageType::PartAlias
                | PageType::PartPhysicalColour
                | PageType::Shortcut
                | PageType::ShortcutAlias
                | PageType::ShortcutPhysicalColour
        )
    }

    /// 只有零件族与子零件可设置 `!CATEGORY`。
    pub fn allows_category(self) -> bool {
        !self.is_model() && !self.is_primitive()
    }

    pub fn target_prefix(self) -> &'static str {
        match self {
            PageType::Subpart => "s\\",
            PageType::HiresPrimitive => "48\\",
            _ => "",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            PageType::Model => ".ldr",
            _ => ".dat",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Winding {
    CounterClockwise,
    Clockwise,
}

impl Winding {
    pub fn flip(self) -> Self {
        match self {
            Winding::CounterClockwise => Winding::Clockwise,
            Winding::Clockwise => Winding::CounterClockwise,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Winding::CounterClockwise => "CCW",
            Winding::Clockwise => "CW",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BfcMode {
    #[default]
    NotSpecified,
    Certified(Winding),
    NoCertify,
}

impl BfcMode {
    pub fn winding(self) -> Option<Winding> {
        match self {
            BfcMode::Certified(winding) => Some(winding),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum License {
    #[default]
    None,
    Ccal2,
    CcBy4,
    NonRedistributable,
}

impl License {
    pub fn code(self) -> Option<&'static str> {
        match self {
            License::None => None,
            License::Ccal2 => Some("Redistributable under CCAL version 2.0 : see CAreadme.txt"),
            License::CcBy4 => Some("Licensed under CC BY 4.0 : see CAreadme.txt"),
            License::NonRedistributable => Some("Not redistributable : see NonCAreadme.txt"),
        }
    }
}

/// 官方零件库的发布批次，例如 `2004-03`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Update {
    pub year: u16,
    pub release: u8,
}

impl Update {
    pub fn new(year: u16, release: u8) -> DomResult<Self> {
        if !(1000..=9999).contains(&year) {
            return Err(DomError::ArgumentOutOfRange(format!("update year {year}")));
        }
        if !(1..=99).contains(&release) {
            return Err(DomError::ArgumentOutOfRange(format!("update release {release}")));
        }
        Ok(Self { year, release })
    }

    pub fn code(self) -> String {
        format!("UPDATE {:04}-{:02}", self.year, self.release)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub date: NaiveDate,
    pub name: String,
    /// 真实姓名写作 `{Name}`，用户名写作 `[Name]`。
    pub is_real_name: bool,
    pub description: String,
}

impl HistoryEntry {
    pub fn new(date: NaiveDate, name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            date,
            name: name.into(),
            is_real_name: false,
            description: description.into(),
        }
    }

    pub fn code(&self) -> String {
        let name = if self.is_real_name {
            format!("{{{}}}", self.name)
        } else {
            format!("[{}]", self.name)
        };
        format!("0 !HISTORY {} {name} {}", self.date.format("%Y-%m-%d"), self.description)
    }
}

/// MLCAD 旋转中心。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RotationPoint {
    pub name: String,
    pub point: Point3,
    pub visible: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationConfig {
    /// 0 表示零件原点，n 表示第 n 个自定义旋转中心。
    pub point_index: i32,
    pub visible: bool,
}

/// 页面元数据。字段只能通过 `Dom` 的属性接口修改。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageData {
    pub name: String,
    pub page_type: PageType,
    pub title: String,
    pub category: Option<String>,
    pub theme: Option<String>,
    pub bfc: BfcMode,
    pub author: Option<String>,
    pub user: Option<String>,
    pub license: License,
    pub update: Option<Update>,
    pub help: Option<String>,
    pub keywords: Vec<String>,
    pub history: Vec<HistoryEntry>,
    pub rotation_points: Vec<RotationPoint>,
    pub rotation_config: Option<RotationConfig>,
    pub default_colour: u32,
    pub inline_on_publish: bool,
}

impl PageData {
    pub(crate) fn new(name: String, page_type: PageType) -> Self {
        Self {
            name,
            page_type,
            title: String::new(),
            category: None,
            theme: None,
            bfc: BfcMode::default(),
            author: None,
            user: None,
            license: License::default(),
            update: None,
            help: None,
            keywords: Vec::new(),
            history: Vec::new(),
            rotation_points: Vec::new(),
            rotation_config: None,
            default_colour: MAIN_COLOUR,
            inline_on_publish: false,
        }
    }

    pub fn target_name(&self) -> String {
        target_name_for(&self.name, self.page_type)
    }
}

/// 由名称与类型推导输出文件名，例如 `s\widget.dat`。
pub fn target_name_for(name: &str, page_type: PageType) -> String {
    format!("{}{}{}", page_type.target_prefix(), name, page_type.extension())
}

/// 校验并规范化页面名称：去除 `.dat` / `.ldr` / `.mpd` 扩展名。
pub fn normalize_page_name(name: &str, page_type: PageType) -> DomResult<String> {
    let trimmed = name.trim();
    let lower = trimmed.to_ascii_lowercase();
    let stem = [".dat", ".ldr", ".mpd"]
        .iter()
        .find(|ext| lower.ends_with(*ext))
        .map(|ext| &trimmed[..trimmed.len() - ext.len()])
        .unwrap_or(trimmed);

    if stem.is_empty() {
        return Err(DomError::InvalidArgument("page name must not be empty".to_string()));
    }
    if stem.chars().count() > MAX_NAME_LENGTH {
        return Err(DomError::InvalidArgument(format!(
            "page name exceeds {MAX_NAME_LENGTH} characters"
        )));
    }
    if stem.chars().any(|c| c.is_control() || RESERVED_CHARACTERS.contains(&c)) {
        return Err(DomError::InvalidArgument(format!(
            "page name '{stem}' contains illegal characters"
        )));
    }
    if stem.contains('/') {
        return Err(DomError::InvalidArgument(format!(
            "page name '{stem}' must use '\\' as separator"
        )));
    }
    if !page_type.is_model() && stem.chars().any(char::is_whitespace) {
        return Err(DomError::InvalidArgument(format!(
            "{} names must not contain whitespace: '{stem}'",
            page_type.code()
        )));
    }
    let separators = stem.matches('\\').count();
    let allowed = if page_type.is_primitive() { 1 } else { 0 };
    if separators > allowed || stem.starts_with('\\') || stem.ends_with('\\') {
        return Err(DomError::InvalidArgument(format!(
            "page name '{stem}' has an invalid path component"
        )));
    }
    Ok(stem.to_string())
}

/// 关键字去重，并将连续空白折叠为单个空格。
pub fn normalize_keywords<I, S>(keywords: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut normalized: Vec<String> = Vec::new();
    for keyword in keywords {
        let collapsed = keyword.as_ref().split_whitespace().collect::<Vec<_>>().join(" ");
        if collapsed.is_empty() || normalized.contains(&collapsed) {
            continue;
        }
        normalized.push(collapsed);
    }
    normalized
}
