//! 页面头部。各组之间以空行分隔，空组不输出。

use ldraw_core::palette::MAIN_COLOUR;
use ldraw_core::{BfcMode, CodeStandard, PageData};

use crate::format::format_point;

/// `!KEYWORDS` 行超过该宽度后换行。
pub const KEYWORDS_WIDTH: usize = 60;

pub fn header_lines(page: &PageData, standard: CodeStandard) -> Vec<String> {
    let groups = [
        identity_lines(page, standard),
        help_lines(page),
        bfc_lines(page),
        classification_lines(page),
        command_line(page),
        history_lines(page),
        tool_lines(page, standard),
        rotation_lines(page, standard),
    ];
    let mut lines = Vec::new();
    for group in groups.into_iter().filter(|group| !group.is_empty()) {
        if !lines.is_empty() {
            lines.push(String::new());
        }
        lines.extend(group);
    }
    lines
}

fn identity_lines(page: &PageData, standard: CodeStandard) -> Vec<String> {
    let mut lines = vec![
        format!("0 {}", page.title).trim_end().to_string(),
        format!("0 Name: {}", page.target_name()),
    ];
    match (&page.author, &page.user) {
        (Some(author), Some(user)) => lines.push(format!("0 Author: {author} [{user}]")),
        (Some(author), None) => lines.push(format!("0 Author: {author}")),
        (None, Some(user)) => lines.push(format!("0 Author: [{user}]")),
        (None, None) => {}
    }
    lines.push(type_line(page, standard));
    if let Some(license) = page.license.code() {
        lines.push(format!("0 !LICENSE {license}"));
    }
    lines
}

fn type_line(page: &PageData, standard: CodeStandard) -> String {
    let code = page.page_type.code();
    match standard {
        CodeStandard::Full => format!("0 !LDRAW_ORG Unofficial_{code}"),
        CodeStandard::OfficialModelRepository | CodeStandard::PartsLibrary => match page.update {
            Some(update) => format!("0 !LDRAW_ORG {code} {}", update.code()),
            None => format!("0 !LDRAW_ORG {code}"),
        },
    }
}

fn help_lines(page: &PageData) -> Vec<String> {
    page.help
        .iter()
        .flat_map(|help| help.lines())
        .map(|line| format!("0 !HELP {line}").trim_end().to_string())
        .collect()
}

fn bfc_lines(page: &PageData) -> Vec<String> {
    match page.bfc {
        BfcMode::Certified(winding) => vec![format!("0 BFC CERTIFY {}", winding.code())],
        BfcMode::NoCertify => vec!["0 BFC NOCERTIFY".to_string()],
        BfcMode::NotSpecified => Vec::new(),
    }
}

fn classification_lines(page: &PageData) -> Vec<String> {
    let mut lines = Vec::new();
    if page.page_type.is_model() {
        if let Some(theme) = &page.theme {
            lines.push(format!("0 !THEME {theme}"));
        }
    } else if page.page_type.allows_category() {
        if let Some(category) = &page.category {
            lines.push(format!("0 !CATEGORY {category}"));
        }
    }
    lines.extend(wrap_keywords(&page.keywords).into_iter().map(|line| format!("0 !KEYWORDS {line}")));
    lines
}

/// 贪心装箱：加入关键字后当前行超过宽度即换行。
pub fn wrap_keywords(keywords: &[String]) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for keyword in keywords {
        if !current.is_empty() {
            current.push_str(", ");
        }
        current.push_str(keyword);
        if current.len() > KEYWORDS_WIDTH {
            lines.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

fn command_line(page: &PageData) -> Vec<String> {
    if page.page_type.is_part_family() && page.default_colour != MAIN_COLOUR {
        vec![format!("0 !CMDLINE -c{}", page.default_colour)]
    } else {
        Vec::new()
    }
}

fn history_lines(page: &PageData) -> Vec<String> {
    let mut history: Vec<_> = page.history.iter().collect();
    history.sort_by_key(|entry| entry.date);
    history.into_iter().map(|entry| entry.code()).collect()
}

fn tool_lines(page: &PageData, standard: CodeStandard) -> Vec<String> {
    if standard == CodeStandard::Full && page.inline_on_publish {
        vec!["0 !DIGITALIS_LDTOOLS_DOM INLINEONPUBLISH".to_string()]
    } else {
        Vec::new()
    }
}

fn rotation_lines(page: &PageData, standard: CodeStandard) -> Vec<String> {
    if standard == CodeStandard::PartsLibrary {
        return Vec::new();
    }
    let mut lines: Vec<String> = page
        .rotation_points
        .iter()
        .map(|point| {
            format!(
                "0 ROTATION CENTER {} {} \"{}\"",
                format_point(point.point),
                u8::from(point.visible),
                point.name
            )
        })
        .collect();
    if let Some(config) = page.rotation_config {
        lines.push(format!("0 ROTATION CONFIG {} {}", config.point_index, u8::from(config.visible)));
    }
    lines
}
