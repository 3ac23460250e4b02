//! 行内数值、矩阵与颜色的文本格式。

use std::collections::HashMap;

use glam::DMat4;
use ldraw_core::geometry::Point3;
use ldraw_core::palette::{self, Palette};
use ldraw_core::ColourDefinition;

/// 最多 6 位小数，去掉末尾的 0，`-0` 写作 `0`。
pub fn format_number(value: f64) -> String {
    let text = format!("{value:.6}");
    let text = text.trim_end_matches('0').trim_end_matches('.');
    if text == "-0" {
        "0".to_string()
    } else {
        text.to_string()
    }
}

pub fn format_point(point: Point3) -> String {
    format!(
        "{} {} {}",
        format_number(point.x()),
        format_number(point.y()),
        format_number(point.z())
    )
}

/// 类型 1 行的 `x y z a b c d e f g h i`：先平移，再按行写出 3x3 部分。
pub fn format_matrix(matrix: &DMat4) -> String {
    let translation = matrix.w_axis;
    let mut fields = vec![translation.x, translation.y, translation.z];
    for row in 0..3 {
        let row = matrix.row(row);
        fields.extend([row.x, row.y, row.z]);
    }
    fields.into_iter().map(format_number).collect::<Vec<_>>().join(" ")
}

/// 颜色编号的输出形式。调色板里没有、但页面里有 `!COLOUR` 定义的编号改写为直接颜色。
pub fn format_colour(
    code: u32,
    palette: &Palette,
    definitions: &HashMap<u32, ColourDefinition>,
) -> String {
    if palette::is_direct_colour(code) {
        return palette::format_direct_colour(code);
    }
    if palette.contains(code) {
        return code.to_string();
    }
    match definitions.get(&code) {
        Some(definition) => palette::format_direct_colour(palette::direct_colour(definition.value)),
        None => code.to_string(),
    }
}

pub fn format_colour_definition(definition: &ColourDefinition) -> String {
    format!(
        "0 !COLOUR {} CODE {} VALUE #{:06X} EDGE #{:06X}",
        definition.name, definition.code, definition.value, definition.edge
    )
}
