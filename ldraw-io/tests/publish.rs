
use glam::{DMat4, DVec3};

use golden::{Capture, assert_golden};
use ldraw_core::geometry::Point3;
use ldraw_core::{
    BfcMode, CodeStandard, Dom, DomError, Element, Graphic, License, NodeId, PageType, Property,
    Reference, Winding,
};
use ldraw_io::{CodeOptions, DocumentSaver, IoError, LDrawFacade};

struct House {
    dom: Dom,
    document: NodeId,
    house: NodeId,
    wall: NodeId,
}

/// 模型 `house` 引用内联子零件 `s\wall.dat` 和库外零件 `3001.dat`。
fn house() -> House {
    let mut dom = Dom::new();
    let document = dom.create_document();
    let house = dom.create_page("house", PageType::Model).expect("创建模型页");
    let wall = dom.create_page("wall", PageType::Subpart).expect("创建子零件页");
    dom.add(document, house).expect("添加模型页");
    dom.add(document, wall).expect("添加子零件页");

    for (property, page) in [
        (Property::Title("House".to_string()), house),
        (Property::Author(Some("Jane Doe".to_string())), house),
        (Property::License(License::CcBy4), house),
        (Property::Bfc(BfcMode::Certified(Winding::CounterClockwise)), house),
        (Property::Title("Wall".to_string()), wall),
        (Property::Bfc(BfcMode::Certified(Winding::CounterClockwise)), wall),
        (Property::InlineOnPublish(true), wall),
    ] {
        dom.set_property(page, property).expect("设置页面属性");
    }

    let wall_step = dom.create_step();
    dom.add(wall, wall_step).expect("添加步骤");
    let triangle = Graphic::triangle(
        16,
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(10.0, 0.0, 0.0),
        Point3::new(0.0, 10.0, 0.0),
    );
    let edge = Graphic::line(24, Point3::new(0.0, 0.0, 0.0), Point3::new(10.0, 0.0, 0.0));
    for element in [Element::graphic(triangle), Element::graphic(edge)] {
        let node = dom.create_element(element).expect("创建图元");
        dom.add(wall_step, node).expect("添加图元");
    }

    let first = dom.create_step();
    let second = dom.create_step();
    dom.add(house, first).expect("添加步骤");
    dom.add(house, second).expect("添加步骤");
    let wall_ref = Reference::new("s\\wall.dat")
        .with_colour(4)
        .with_matrix(DMat4::from_translation(DVec3::new(0.0, -24.0, 0.0)));
    let wall_ref = dom.create_element(Element::reference(wall_ref)).expect("创建引用");
    dom.add(first, wall_ref).expect("添加引用");
    let brick = dom
        .create_element(Element::reference(Reference::new("3001.dat").with_colour(1)))
        .expect("创建引用");
    dom.add(second, brick).expect("添加引用");

    House {
        dom,
        document,
        house,
        wall,
    }
}

#[test]
fn export_writes_every_page_once() {
    let House { dom, document, .. } = house();
    let capture = Capture::default();
    let written = LDrawFacade::default()
        .export(&dom, document, capture.factory())
        .expect("导出失败");
    assert_eq!(written, vec!["house.ldr".to_string(), "s\\wall.dat".to_string()]);
    assert_eq!(capture.targets(), written);
    assert_golden("export_house", &capture);
}

#[test]
fn publish_folds_inlined_pages_into_their_users() {
    let House { dom, document, .. } = house();
    let capture = Capture::default();
    let written = LDrawFacade::default()
        .publish(&dom, document, capture.factory())
        .expect("发布失败");
    assert_eq!(written, vec!["house.ldr".to_string()]);
    assert_golden("publish_house", &capture);
}

#[test]
fn publish_inlining_follows_mirroring_and_invert() {
    let House {
        mut dom, house, ..
    } = house();
    let step = dom.steps(house).expect("步骤")[0];
    let wall_ref = dom.elements(step).expect("元素")[0];
    dom.set_property(wall_ref, Property::Matrix(DMat4::from_scale(DVec3::new(-1.0, 1.0, 1.0))))
        .expect("镜像");

    let options = CodeOptions::new(CodeStandard::Full);
    let lines = ldraw_io::codegen::page_lines(&dom, house, &options, true).expect("生成代码");
    // 镜像后期望绕序翻转，输出 BFC 过渡行而不是改写顶点顺序
    let body: Vec<&str> = lines
        .iter()
        .skip_while(|line| !line.starts_with("0 BFC CERTIFY"))
        .map(String::as_str)
        .collect();
    assert_eq!(
        &body[2..6],
        &[
            "0 BFC CW",
            "3 4 0 0 0 -10 0 0 0 10 0",
            "2 24 0 0 0 -10 0 0",
            "0 STEP",
        ]
    );
    assert_eq!(body[6], "0 BFC CCW");

    dom.set_property(wall_ref, Property::Invert(true)).expect("反转");
    let lines = ldraw_io::codegen::page_lines(&dom, house, &options, true).expect("生成代码");
    assert!(!lines.iter().any(|line| line == "0 BFC CW"));
    assert!(!lines.iter().any(|line| line == "0 BFC INVERTNEXT"));

    let parts = CodeOptions::new(CodeStandard::PartsLibrary);
    dom.set_property(wall_ref, Property::Invert(false)).expect("取消反转");
    let lines = ldraw_io::codegen::page_lines(&dom, house, &parts, true).expect("生成代码");
    assert!(lines.contains(&"3 4 0 0 0 0 10 0 -10 0 0".to_string()));
    assert!(!lines.iter().any(|line| line == "0 BFC CW" || line == "0 BFC CCW"));
}

#[test]
fn publish_fails_when_every_page_is_inlined() {
    let House {
        mut dom,
        document,
        house,
        ..
    } = house();
    dom.set_property(house, Property::InlineOnPublish(true)).expect("设置内联");
    let capture = Capture::default();
    let err = LDrawFacade::default()
        .publish(&dom, document, capture.factory())
        .unwrap_err();
    assert!(matches!(err, IoError::Dom(DomError::InvalidOperation(_))));
    assert!(capture.targets().is_empty());
}

#[test]
fn empty_document_cannot_be_written() {
    let mut dom = Dom::new();
    let document = dom.create_document();
    let facade = LDrawFacade::default();
    let capture = Capture::default();

    let invalid = |result: Result<_, IoError>| matches!(result, Err(IoError::Dom(DomError::InvalidOperation(_))));
    assert!(invalid(facade.code(&dom, document).map(|_| ())));
    assert!(invalid(facade.export(&dom, document, capture.factory()).map(|_| ())));
    assert!(invalid(facade.publish(&dom, document, capture.factory()).map(|_| ())));
    let dir = tempfile::tempdir().expect("创建临时目录");
    assert!(invalid(facade.save(&dom, document, &dir.path().join("empty.mpd"))));
    assert!(capture.targets().is_empty());
}

#[test]
fn save_writes_multi_page_document() {
    let House { dom, document, wall, .. } = house();
    let dir = tempfile::tempdir().expect("创建临时目录");
    let path = dir.path().join("house.mpd");
    let facade = LDrawFacade::default();
    facade.save(&dom, document, &path).expect("保存失败");

    let text = std::fs::read_to_string(&path).expect("读取保存结果");
    assert_eq!(text, facade.code(&dom, document).expect("生成代码"));
    assert!(text.starts_with("0 FILE house.ldr\r\n0 House\r\n"));
    assert!(text.ends_with("0 NOFILE\r\n"));
    assert_eq!(text.matches("0 FILE ").count(), 2);

    let wall_code = facade.code(&dom, wall).expect("生成代码");
    assert!(text.contains(&format!("0 FILE s\\wall.dat\r\n{wall_code}0 NOFILE\r\n")));

    let missing = dir.path().join("missing").join("house.mpd");
    assert!(matches!(
        facade.save(&dom, document, &missing),
        Err(IoError::WriteError { .. })
    ));
}

#[test]
fn output_errors_name_the_target() {
    let House { dom, document, .. } = house();
    let err = LDrawFacade::default()
        .export(&dom, document, |_: &str| -> std::io::Result<Vec<u8>> {
            Err(std::io::Error::other("disk full"))
        })
        .unwrap_err();
    match err {
        IoError::OutputError { target, .. } => assert_eq!(target, "house.ldr"),
        other => panic!("unexpected error: {other}"),
    }
}
