use glam::{DMat4, DVec3};
use ldraw_config::AppConfig;
use ldraw_core::geometry::Point3;
use ldraw_core::{
    BfcMode, Dom, DomResult, Element, Graphic, LibraryCatalog, License, NodeId, PageType, Property, Reference,
    Winding,
};
use ldraw_engine::session::Session;
use tracing::info;

use crate::errors::FrontendError;
use crate::resource_locator::{LibraryLocator, apply_library_roots};

/// 文档来源，便于前端呈现加载信息。
#[derive(Debug, Clone)]
pub enum DocumentSource {
    Demo,
}

/// 内置示例中的关键节点。
#[derive(Debug, Clone, Copy)]
pub struct DemoNodes {
    pub library: NodeId,
    pub brick_page: NodeId,
    pub model: NodeId,
    pub house: NodeId,
    pub wall: NodeId,
    pub wall_ref: NodeId,
    pub brick_ref: NodeId,
}

/// 统一封装加载后的会话与元信息。
#[derive(Debug)]
pub struct LoadedSession {
    pub session: Session,
    pub source: DocumentSource,
    pub demo: DemoNodes,
}

/// 构建内置示例：一个只读的零件库文档（`3001.dat`）与一个引用它的模型文档。
pub fn load_demo_session(config: &AppConfig) -> Result<LoadedSession, FrontendError> {
    let locator = LibraryLocator::from_config(None, config);
    let mut dom = Dom::new();
    apply_library_roots(&mut dom, &locator);

    let (library, brick_page) = build_library(&mut dom, &locator)?;
    let mut catalog = LibraryCatalog::new();
    let registered = catalog.register_document(&dom, library)?;
    dom.set_resolver(Box::new(catalog));

    let (model, house, wall, wall_ref, brick_ref) = build_model(&mut dom)?;
    info!(registered, pages = dom.pages(model)?.len(), "已构建内置示例文档");

    let mut session = Session::with_dom(dom, config.editor.undo_levels);
    session.open_document(model)?;
    Ok(LoadedSession {
        session,
        source: DocumentSource::Demo,
        demo: DemoNodes {
            library,
            brick_page,
            model,
            house,
            wall,
            wall_ref,
            brick_ref,
        },
    })
}

fn build_library(dom: &mut Dom, locator: &LibraryLocator) -> DomResult<(NodeId, NodeId)> {
    let document = dom.create_document();
    let filepath = match locator.roots().first() {
        Some(root) => root.join("parts").join("3001.dat").to_string_lossy().into_owned(),
        None => "ldraw\\parts\\3001.dat".to_string(),
    };
    dom.set_property(document, Property::Filepath(filepath))?;

    let page = dom.create_page("3001", PageType::Part)?;
    dom.add(document, page)?;
    for property in [
        Property::Title("Brick  2 x  4".to_string()),
        Property::Author(Some("James Jessiman".to_string())),
        Property::License(License::CcBy4),
        Property::Bfc(BfcMode::Certified(Winding::CounterClockwise)),
        Property::Category(Some("Brick".to_string())),
    ] {
        dom.set_property(page, property)?;
    }

    let step = dom.create_step();
    dom.add(page, step)?;
    let top = Graphic::quadrilateral(
        16,
        Point3::new(-40.0, 0.0, -20.0),
        Point3::new(40.0, 0.0, -20.0),
        Point3::new(40.0, 0.0, 20.0),
        Point3::new(-40.0, 0.0, 20.0),
    );
    let edge = Graphic::line(24, Point3::new(-40.0, 0.0, -20.0), Point3::new(40.0, 0.0, -20.0));
    for element in [Element::graphic(top), Element::graphic(edge)] {
        let node = dom.create_element(element)?;
        dom.add(step, node)?;
    }

    // 库中的页面只读
    dom.set_immutable(document)?;
    Ok((document, page))
}

fn build_model(dom: &mut Dom) -> DomResult<(NodeId, NodeId, NodeId, NodeId, NodeId)> {
    let document = dom.create_document();
    dom.set_property(document, Property::Filepath("demo\\house.mpd".to_string()))?;

    let house = dom.create_page("house", PageType::Model)?;
    let wall = dom.create_page("wall", PageType::Subpart)?;
    dom.add(document, house)?;
    dom.add(document, wall)?;
    for (page, property) in [
        (house, Property::Title("House".to_string())),
        (house, Property::Author(Some("Demo Builder".to_string()))),
        (house, Property::Bfc(BfcMode::Certified(Winding::CounterClockwise))),
        (wall, Property::Title("Wall".to_string())),
        (wall, Property::Bfc(BfcMode::Certified(Winding::CounterClockwise))),
        (wall, Property::InlineOnPublish(true)),
    ] {
        dom.set_property(page, property)?;
    }

    let wall_step = dom.create_step();
    dom.add(wall, wall_step)?;
    let panel = Graphic::triangle(
        16,
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(10.0, 0.0, 0.0),
        Point3::new(0.0, 10.0, 0.0),
    );
    let node = dom.create_element(Element::graphic(panel))?;
    dom.add(wall_step, node)?;

    let first = dom.create_step();
    let second = dom.create_step();
    dom.add(house, first)?;
    dom.add(house, second)?;
    let comment = dom.create_element(Element::comment("foundation"))?;
    dom.add(first, comment)?;
    let wall_ref = dom.create_element(Element::reference(
        Reference::new("s\\wall.dat")
            .with_colour(4)
            .with_matrix(DMat4::from_translation(DVec3::new(0.0, -24.0, 0.0))),
    ))?;
    dom.add(first, wall_ref)?;
    let brick_ref = dom.create_element(Element::reference(Reference::new("3001.dat").with_colour(1)))?;
    dom.add(second, brick_ref)?;

    Ok((document, house, wall, wall_ref, brick_ref))
}
