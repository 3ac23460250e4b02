use chrono::NaiveDate;
use glam::{DMat4, DVec3};

use ldraw_core::geometry::Point3;
use ldraw_core::{
    BfcFlag, BfcMode, CodeStandard, ColourDefinition, Dom, DomError, Element, Graphic,
    HistoryEntry, License, MetaCommand, NodeId, PageType, Palette, PaletteEntry, Property,
    Reference, RotationConfig, RotationPoint, Update, Winding,
};
use ldraw_io::{CodeOptions, IoError, to_code, to_lines};

fn options(standard: CodeStandard) -> CodeOptions {
    CodeOptions::new(standard)
}

fn set(dom: &mut Dom, node: NodeId, properties: Vec<Property>) {
    for property in properties {
        dom.set_property(node, property).expect("设置属性失败");
    }
}

fn add_element(dom: &mut Dom, collection: NodeId, element: Element) -> NodeId {
    let node = dom.create_element(element).expect("创建元素失败");
    dom.add(collection, node).expect("添加元素失败");
    node
}

fn p(x: f64, y: f64, z: f64) -> Point3 {
    Point3::new(x, y, z)
}

fn brick_page(dom: &mut Dom) -> NodeId {
    let page = dom.create_page("3001", PageType::Part).expect("创建页面");
    let date = |y, m, d| NaiveDate::from_ymd_opt(y, m, d).expect("日期");
    let mut moved = HistoryEntry::new(date(2004, 3, 1), "James Jessiman", "Moved");
    moved.is_real_name = true;
    let official = HistoryEntry::new(date(2002, 6, 1), "PTadmin", "Official Update 2002-03");
    set(
        dom,
        page,
        vec![
            Property::Title("Brick 2 x 4".to_string()),
            Property::Author(Some("James Jessiman".to_string())),
            Property::License(License::Ccal2),
            Property::Update(Some(Update::new(2004, 3).expect("更新批次"))),
            Property::Help(Some("first line\r\nsecond line".to_string())),
            Property::Bfc(BfcMode::Certified(Winding::CounterClockwise)),
            Property::Category(Some("Brick".to_string())),
            Property::Keywords(vec!["bricks".to_string(), "classic".to_string()]),
            Property::DefaultColour(4),
            Property::History(vec![moved, official]),
            Property::InlineOnPublish(true),
            Property::RotationPoints(vec![RotationPoint {
                name: "Top".to_string(),
                point: p(0.0, -24.0, 0.0),
                visible: true,
            }]),
            Property::RotationConfig(Some(RotationConfig {
                point_index: 1,
                visible: false,
            })),
        ],
    );
    page
}

#[test]
fn full_header_lists_every_group_in_order() {
    let mut dom = Dom::new();
    let page = brick_page(&mut dom);
    let lines = to_lines(&dom, page, &options(CodeStandard::Full)).expect("生成代码");
    let expected = [
        "0 Brick 2 x 4",
        "0 Name: 3001.dat",
        "0 Author: James Jessiman",
        "0 !LDRAW_ORG Unofficial_Part",
        "0 !LICENSE Redistributable under CCAL version 2.0 : see CAreadme.txt",
        "",
        "0 !HELP first line",
        "0 !HELP second line",
        "",
        "0 BFC CERTIFY CCW",
        "",
        "0 !CATEGORY Brick",
        "0 !KEYWORDS bricks, classic",
        "",
        "0 !CMDLINE -c4",
        "",
        "0 !HISTORY 2002-06-01 [PTadmin] Official Update 2002-03",
        "0 !HISTORY 2004-03-01 {James Jessiman} Moved",
        "",
        "0 !DIGITALIS_LDTOOLS_DOM INLINEONPUBLISH",
        "",
        "0 ROTATION CENTER 0 -24 0 1 \"Top\"",
        "0 ROTATION CONFIG 1 0",
    ];
    assert_eq!(lines, expected);
}

#[test]
fn official_standards_trim_the_header() {
    let mut dom = Dom::new();
    let page = brick_page(&mut dom);

    let omr = to_lines(&dom, page, &options(CodeStandard::OfficialModelRepository)).expect("生成代码");
    assert_eq!(omr[3], "0 !LDRAW_ORG Part UPDATE 2004-03");
    assert!(!omr.iter().any(|line| line.contains("INLINEONPUBLISH")));
    assert!(omr.iter().any(|line| line.starts_with("0 ROTATION CENTER")));

    let library = to_lines(&dom, page, &options(CodeStandard::PartsLibrary)).expect("生成代码");
    assert_eq!(library[3], "0 !LDRAW_ORG Part UPDATE 2004-03");
    assert!(!library.iter().any(|line| line.starts_with("0 ROTATION")));
    assert_eq!(library.last().map(String::as_str), Some("0 !HISTORY 2004-03-01 {James Jessiman} Moved"));
}

#[test]
fn keywords_wrap_in_the_header() {
    let mut dom = Dom::new();
    let page = dom.create_page("kw", PageType::Part).expect("创建页面");
    let keywords = (0..30).map(|index| format!("keyword {index}")).collect();
    set(&mut dom, page, vec![Property::Keywords(keywords)]);
    let lines = to_lines(&dom, page, &options(CodeStandard::Full)).expect("生成代码");
    let keyword_lines: Vec<_> = lines.iter().filter(|line| line.starts_with("0 !KEYWORDS ")).collect();
    assert_eq!(keyword_lines.len(), 5);
    assert_eq!(
        keyword_lines[0],
        "0 !KEYWORDS keyword 0, keyword 1, keyword 2, keyword 3, keyword 4, keyword 5"
    );
}

fn bfc_page(dom: &mut Dom) -> NodeId {
    let page = dom.create_page("bfc", PageType::Part).expect("创建页面");
    set(dom, page, vec![Property::Bfc(BfcMode::Certified(Winding::CounterClockwise))]);
    let first = dom.create_step();
    let second = dom.create_step();
    dom.add(page, first).expect("添加步骤");
    dom.add(page, second).expect("添加步骤");

    let triangle = |colour| Graphic::triangle(colour, p(0.0, 0.0, 0.0), p(1.0, 0.0, 0.0), p(0.0, 1.0, 0.0));
    add_element(dom, first, Element::graphic(triangle(4)));
    add_element(dom, first, Element::bfc(BfcFlag::SetWindingClockwise));
    add_element(
        dom,
        first,
        Element::graphic(Graphic::quadrilateral(
            16,
            p(0.0, 0.0, 0.0),
            p(1.0, 0.0, 0.0),
            p(1.0, 1.0, 0.0),
            p(0.0, 1.0, 0.0),
        )),
    );
    add_element(dom, first, Element::bfc(BfcFlag::DisableBackFaceCulling));
    add_element(dom, first, Element::graphic(triangle(2)));
    add_element(dom, second, Element::comment("hello"));
    add_element(dom, second, Element::meta(MetaCommand::Write("note".to_string())));
    page
}

fn body(lines: &[String]) -> Vec<&str> {
    let start = lines.iter().rposition(String::is_empty).expect("正文前应有空行");
    lines[start + 1..].iter().map(String::as_str).collect()
}

#[test]
fn bfc_transitions_are_emitted_between_polygons() {
    let mut dom = Dom::new();
    let page = bfc_page(&mut dom);
    let lines = to_lines(&dom, page, &options(CodeStandard::Full)).expect("生成代码");
    assert_eq!(
        body(&lines),
        [
            "3 4 0 0 0 1 0 0 0 1 0",
            "0 BFC CW",
            "4 16 0 0 0 1 0 0 1 1 0 0 1 0",
            "0 BFC NOCLIP",
            "3 2 0 0 0 1 0 0 0 1 0",
            "0 STEP",
            "0 // hello",
            "0 WRITE note",
        ]
    );
}

#[test]
fn parts_library_reverses_vertices_instead_of_markers() {
    let mut dom = Dom::new();
    let page = bfc_page(&mut dom);
    let lines = to_lines(&dom, page, &options(CodeStandard::PartsLibrary)).expect("生成代码");
    assert_eq!(
        body(&lines),
        [
            "3 4 0 0 0 1 0 0 0 1 0",
            "4 16 0 0 0 0 1 0 1 1 0 1 0 0",
            "3 2 0 0 0 0 1 0 1 0 0",
            "0 STEP",
            "0 // hello",
            "0 WRITE note",
        ]
    );
}

#[test]
fn uncertified_flags_are_written_verbatim() {
    let mut dom = Dom::new();
    let step = dom.create_step();
    add_element(&mut dom, step, Element::bfc(BfcFlag::SetWindingClockwise));
    add_element(
        &mut dom,
        step,
        Element::graphic(Graphic::triangle(4, p(0.0, 0.0, 0.0), p(1.0, 0.0, 0.0), p(0.0, 1.0, 0.0))),
    );
    let code = to_code(&dom, step, &options(CodeStandard::Full)).expect("生成代码");
    assert_eq!(code, "0 BFC CW\r\n3 4 0 0 0 1 0 0 0 1 0\r\n");
}

#[test]
fn groups_tag_each_member_line() {
    let mut dom = Dom::new();
    let step = dom.create_step();
    let group = add_element(&mut dom, step, Element::group("wheels"));
    add_element(&mut dom, group, Element::reference(Reference::new("wheel.dat").with_colour(0)));
    let moved = Reference::new("wheel.dat")
        .with_colour(0)
        .with_matrix(DMat4::from_translation(DVec3::new(10.0, 0.0, 0.0)));
    add_element(&mut dom, group, Element::reference(moved).hidden());
    add_element(&mut dom, step, Element::comment("spare").ghosted());
    let flipped = Reference {
        invert: true,
        ..Reference::new("axle.dat")
    };
    add_element(&mut dom, step, Element::reference(flipped).hidden().ghosted());

    let lines = to_lines(&dom, step, &options(CodeStandard::Full)).expect("生成代码");
    assert_eq!(
        lines,
        [
            "0 MLCAD BTG wheels",
            "1 0 0 0 0 1 0 0 0 1 0 0 0 1 wheel.dat",
            "0 MLCAD BTG wheels",
            "0 MLCAD HIDE 1 0 10 0 0 1 0 0 0 1 0 0 0 1 wheel.dat",
            "0 GROUP 2 wheels",
            "0 GHOST 0 // spare",
            "0 GHOST 0 MLCAD HIDE 0 BFC INVERTNEXT",
            "0 GHOST 0 MLCAD HIDE 1 16 0 0 0 1 0 0 0 1 0 0 0 1 axle.dat",
        ]
    );
}

#[test]
fn colours_use_definitions_and_direct_values() {
    let mut dom = Dom::new();
    let page = dom.create_page("colours", PageType::Part).expect("创建页面");
    let step = dom.create_step();
    dom.add(page, step).expect("添加步骤");
    add_element(
        &mut dom,
        step,
        Element::colour(ColourDefinition {
            code: 500,
            name: "Custom_Teal".to_string(),
            value: 0x00807F,
            edge: 0x333333,
        }),
    );
    let triangle = |colour| Graphic::triangle(colour, p(0.0, 0.0, 0.0), p(1.0, 0.0, 0.0), p(0.0, 1.0, 0.0));
    let custom = add_element(&mut dom, step, Element::graphic(triangle(500)));
    let direct = add_element(&mut dom, step, Element::graphic(triangle(0x2FF0000)));

    let standard = options(CodeStandard::Full);
    let lines = to_lines(&dom, page, &standard).expect("生成代码");
    assert!(lines.contains(&"0 !COLOUR Custom_Teal CODE 500 VALUE #00807F EDGE #333333".to_string()));
    assert_eq!(to_code(&dom, custom, &standard).expect("生成代码"), "3 #200807F 0 0 0 1 0 0 0 1 0\r\n");
    assert_eq!(to_code(&dom, direct, &standard).expect("生成代码"), "3 #2FF0000 0 0 0 1 0 0 0 1 0\r\n");

    let mut palette = Palette::ldraw();
    palette.insert(PaletteEntry::new(500, "Custom_Teal", 0x00807F, 0x333333));
    let custom_palette = options(CodeStandard::Full).with_palette(palette);
    assert_eq!(to_code(&dom, custom, &custom_palette).expect("生成代码"), "3 500 0 0 0 1 0 0 0 1 0\r\n");
}

fn document_with(dom: &mut Dom, pages: &[(&str, PageType)]) -> NodeId {
    let document = dom.create_document();
    for (name, page_type) in pages {
        let page = dom.create_page(name, *page_type).expect("创建页面");
        dom.add(document, page).expect("添加页面");
    }
    document
}

#[test]
fn single_page_document_matches_its_page() {
    let mut dom = Dom::new();
    let document = document_with(&mut dom, &[("solo", PageType::Model)]);
    let page = dom.pages(document).expect("页面")[0];
    let standard = options(CodeStandard::Full);
    let document_code = to_code(&dom, document, &standard).expect("生成代码");
    assert_eq!(document_code, to_code(&dom, page, &standard).expect("生成代码"));
    assert!(!document_code.contains("0 FILE"));
}

#[test]
fn multi_page_documents_follow_the_standard() {
    let mut dom = Dom::new();
    let parts = document_with(&mut dom, &[("a", PageType::Part), ("b", PageType::Subpart)]);
    let models = document_with(&mut dom, &[("car", PageType::Model), ("wheel", PageType::Part)]);

    let full = to_lines(&dom, parts, &options(CodeStandard::Full)).expect("生成代码");
    assert_eq!(full.first().map(String::as_str), Some("0 FILE a.dat"));
    assert!(full.contains(&"0 FILE s\\b.dat".to_string()));
    assert_eq!(full.iter().filter(|line| *line == "0 NOFILE").count(), 2);

    let omr = to_lines(&dom, models, &options(CodeStandard::OfficialModelRepository)).expect("生成代码");
    assert_eq!(omr.first().map(String::as_str), Some("0 FILE car.ldr"));

    let library = options(CodeStandard::PartsLibrary);
    let first_only = to_lines(&dom, parts, &library).expect("生成代码");
    let first_page = dom.pages(parts).expect("页面")[0];
    assert_eq!(first_only, to_lines(&dom, first_page, &library).expect("生成代码"));

    assert!(matches!(
        to_lines(&dom, models, &library),
        Err(IoError::Dom(DomError::InvalidArgument(_)))
    ));
}

#[test]
fn empty_document_has_no_code() {
    let mut dom = Dom::new();
    let document = dom.create_document();
    assert!(matches!(
        to_code(&dom, document, &options(CodeStandard::Full)),
        Err(IoError::Dom(DomError::InvalidOperation(_)))
    ));
}
