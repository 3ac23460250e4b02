//! LDraw 调色板：颜色编号到 RGB 值的映射，以及直接颜色（`0x2RRGGBB`）的编码规则。

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// 主颜色：引用时继承父级颜色。
pub const MAIN_COLOUR: u32 = 16;
/// 边线颜色：继承父级颜色对应的边线色。
pub const EDGE_COLOUR: u32 = 24;

const DIRECT_OPAQUE: u32 = 0x200_0000;
const DIRECT_TRANSPARENT: u32 = 0x300_0000;
const DIRECT_MASK: u32 = 0xFF_FFFF;

/// 判断颜色值是否为直接颜色（不经过调色板）。
#[inline]
pub fn is_direct_colour(value: u32) -> bool {
    let tag = value & !DIRECT_MASK;
    tag == DIRECT_OPAQUE || tag == DIRECT_TRANSPARENT
}

/// 由 RGB 构造不透明直接颜色。
#[inline]
pub fn direct_colour(rgb: u32) -> u32 {
    DIRECT_OPAQUE | (rgb & DIRECT_MASK)
}

/// 直接颜色的文本形式，例如 `#2FF0000`。
pub fn format_direct_colour(value: u32) -> String {
    format!("#{value:07X}")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaletteEntry {
    pub code: u32,
    pub name: String,
    /// `0xRRGGBB`
    pub value: u32,
    #[serde(default)]
    pub edge: u32,
    #[serde(default = "PaletteEntry::default_alpha")]
    pub alpha: u8,
}

impl PaletteEntry {
    fn default_alpha() -> u8 {
        255
    }

    pub fn new(code: u32, name: impl Into<String>, value: u32, edge: u32) -> Self {
        Self {
            code,
            name: name.into(),
            value,
            edge,
            alpha: Self::default_alpha(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Palette {
    entries: BTreeMap<u32, PaletteEntry>,
}

impl Palette {
    pub fn new() -> Self {
        Self::default()
    }

    /// LDraw 官方调色板中最常用的一部分。
    pub fn ldraw() -> Self {
        let mut palette = Self::new();
        for (code, name, value, edge) in [
            (0, "Black", 0x1B2A34, 0x808080),
            (1, "Blue", 0x1E5AA8, 0x333333),
            (2, "Green", 0x00852B, 0x333333),
            (4, "Red", 0xB40000, 0x333333),
            (7, "Light_Grey", 0x8A928D, 0x333333),
            (8, "Dark_Grey", 0x545955, 0x333333),
            (14, "Yellow", 0xFAC80A, 0x333333),
            (15, "White", 0xF4F4F4, 0x333333),
            (19, "Tan", 0xE4CD9E, 0x333333),
            (25, "Orange", 0xD67923, 0x333333),
            (71, "Light_Bluish_Grey", 0xA0A5A9, 0x333333),
            (72, "Dark_Bluish_Grey", 0x6C6E68, 0x333333),
        ] {
            palette.insert(PaletteEntry::new(code, name, value, edge));
        }
        let mut clear = PaletteEntry::new(47, "Trans_Clear", 0xFCFCFC, 0xC3C3C3);
        clear.alpha = 128;
        palette.insert(clear);
        palette
    }

    pub fn insert(&mut self, entry: PaletteEntry) -> Option<PaletteEntry> {
        self.entries.insert(entry.code, entry)
    }

    pub fn get(&self, code: u32) -> Option<&PaletteEntry> {
        self.entries.get(&code)
    }

    /// 主颜色、边线颜色总是可用；其余编号需在调色板中定义。
    pub fn contains(&self, code: u32) -> bool {
        code == MAIN_COLOUR || code == EDGE_COLOUR || self.entries.contains_key(&code)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &PaletteEntry> {
        self.entries.values()
    }

    pub fn extend(&mut self, entries: impl IntoIterator<Item = PaletteEntry>) {
        for entry in entries {
            self.insert(entry);
        }
    }
}
