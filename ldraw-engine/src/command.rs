use std::collections::HashMap;

use glam::{DMat4, DVec3};
use ldraw_core::NodeId;
use tracing::debug;

use crate::session::Session;

#[derive(Debug, Clone)]
pub struct CommandRequest {
    pub name: String,
    pub args: Vec<String>,
}

impl CommandRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }
}

#[derive(Debug, Clone)]
pub struct CommandResponse {
    pub success: bool,
    pub message: Option<String>,
}

impl CommandResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
        }
    }
}

pub trait CommandHandler: Send + Sync {
    fn name(&self) -> &'static str;
    fn execute(&self, request: &CommandRequest, context: &mut CommandContext<'_>) -> CommandResponse;
}

pub struct CommandContext<'a> {
    pub session: &'a mut Session,
}

pub struct CommandBus {
    handlers: HashMap<&'static str, Box<dyn CommandHandler>>,
}

impl CommandBus {
    pub fn new() -> Self {
        let mut bus = Self {
            handlers: HashMap::new(),
        };
        bus.register(UndoCommand);
        bus.register(RedoCommand);
        bus.register(SelectCommand);
        bus.register(ClearSelectionCommand);
        bus.register(ReverseWindingCommand);
        bus.register(DeleteSelectionCommand);
        bus.register(TranslateCommand);
        bus
    }

    pub fn register<H: CommandHandler + 'static>(&mut self, handler: H) {
        self.handlers.insert(handler.name(), Box::new(handler));
    }

    pub fn dispatch(&self, request: &CommandRequest, context: &mut CommandContext<'_>) -> CommandResponse {
        if let Some(handler) = self.handlers.get(request.name.as_str()) {
            debug!(command = %request.name, args = ?request.args, "执行命令");
            handler.execute(request, context)
        } else {
            CommandResponse::err(format!("未知命令: {}", request.name))
        }
    }

    pub fn available_commands(&self) -> impl Iterator<Item = &&'static str> {
        self.handlers.keys()
    }
}

impl Default for CommandBus {
    fn default() -> Self {
        Self::new()
    }
}

/// 选中集为空时作用于当前文档。
fn targets(context: &CommandContext<'_>) -> Result<Vec<NodeId>, String> {
    if context.session.selection_len() > 0 {
        return Ok(context.session.selection().collect());
    }
    context
        .session
        .active_document()
        .map(|document| vec![document])
        .map_err(|err| err.to_string())
}

struct UndoCommand;

impl CommandHandler for UndoCommand {
    fn name(&self) -> &'static str {
        "undo"
    }

    fn execute(&self, _request: &CommandRequest, context: &mut CommandContext<'_>) -> CommandResponse {
        match context.session.undo() {
            Ok(true) => CommandResponse::ok("已撤销"),
            Ok(false) => CommandResponse::err("没有可撤销的操作"),
            Err(err) => CommandResponse::err(format!("撤销失败: {err}")),
        }
    }
}

struct RedoCommand;

impl CommandHandler for RedoCommand {
    fn name(&self) -> &'static str {
        "redo"
    }

    fn execute(&self, _request: &CommandRequest, context: &mut CommandContext<'_>) -> CommandResponse {
        match context.session.redo() {
            Ok(true) => CommandResponse::ok("已重做"),
            Ok(false) => CommandResponse::err("没有可重做的操作"),
            Err(err) => CommandResponse::err(format!("重做失败: {err}")),
        }
    }
}

struct SelectCommand;

impl CommandHandler for SelectCommand {
    fn name(&self) -> &'static str {
        "select"
    }

    fn execute(&self, request: &CommandRequest, context: &mut CommandContext<'_>) -> CommandResponse {
        if request.args.is_empty() {
            return CommandResponse::err("select 需要至少一个节点编号");
        }
        for arg in &request.args {
            let Ok(raw) = arg.trim_start_matches('#').parse::<u64>() else {
                return CommandResponse::err(format!("无效的节点编号: {arg}"));
            };
            if let Err(err) = context.session.select(NodeId::new(raw)) {
                return CommandResponse::err(err.to_string());
            }
        }
        CommandResponse::ok(format!("已选中 {} 个节点", context.session.selection_len()))
    }
}

struct ClearSelectionCommand;

impl CommandHandler for ClearSelectionCommand {
    fn name(&self) -> &'static str {
        "clear_selection"
    }

    fn execute(&self, _request: &CommandRequest, context: &mut CommandContext<'_>) -> CommandResponse {
        context.session.clear_selection();
        CommandResponse::ok("选中集已清空")
    }
}

struct ReverseWindingCommand;

impl CommandHandler for ReverseWindingCommand {
    fn name(&self) -> &'static str {
        "reverse_winding"
    }

    fn execute(&self, _request: &CommandRequest, context: &mut CommandContext<'_>) -> CommandResponse {
        let nodes = match targets(context) {
            Ok(nodes) => nodes,
            Err(message) => return CommandResponse::err(message),
        };
        let result = context.session.execute("reverse winding", |dom| {
            for node in &nodes {
                dom.reverse_winding(*node)?;
            }
            Ok(())
        });
        match result {
            Ok(()) => CommandResponse::ok(format!("已反转 {} 个节点的绕序", nodes.len())),
            Err(err) => CommandResponse::err(err.to_string()),
        }
    }
}

struct DeleteSelectionCommand;

impl CommandHandler for DeleteSelectionCommand {
    fn name(&self) -> &'static str {
        "delete_selection"
    }

    fn execute(&self, _request: &CommandRequest, context: &mut CommandContext<'_>) -> CommandResponse {
        let nodes: Vec<NodeId> = context.session.selection().collect();
        if nodes.is_empty() {
            return CommandResponse::err("选中集为空");
        }
        let result = context.session.execute("delete selection", |dom| {
            let mut removed = 0;
            for node in &nodes {
                if let Some(parent) = dom.parent(*node)? {
                    if dom.remove(parent, *node)? {
                        removed += 1;
                    }
                }
            }
            Ok(removed)
        });
        match result {
            Ok(removed) => {
                context.session.clear_selection();
                CommandResponse::ok(format!("已删除 {removed} 个节点"))
            }
            Err(err) => CommandResponse::err(err.to_string()),
        }
    }
}

struct TranslateCommand;

impl CommandHandler for TranslateCommand {
    fn name(&self) -> &'static str {
        "translate"
    }

    fn execute(&self, request: &CommandRequest, context: &mut CommandContext<'_>) -> CommandResponse {
        let offset: Vec<f64> = match request.args.iter().map(|arg| arg.parse::<f64>()).collect() {
            Ok(values) => values,
            Err(err) => return CommandResponse::err(format!("无效的平移量: {err}")),
        };
        let [x, y, z] = offset[..] else {
            return CommandResponse::err("translate 需要 3 个参数: x y z");
        };
        let nodes = match targets(context) {
            Ok(nodes) => nodes,
            Err(message) => return CommandResponse::err(message),
        };
        let matrix = DMat4::from_translation(DVec3::new(x, y, z));
        let result = context.session.execute("translate", |dom| {
            for node in &nodes {
                dom.transform(*node, &matrix)?;
            }
            Ok(())
        });
        match result {
            Ok(()) => CommandResponse::ok(format!("已平移 ({x}, {y}, {z})")),
            Err(err) => CommandResponse::err(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use ldraw_core::geometry::Point3;
    use ldraw_core::{Element, Graphic, PageType};

    use super::*;

    fn session_with_triangle() -> (Session, NodeId, NodeId) {
        let mut session = Session::new();
        let dom = session.dom_mut();
        let document = dom.create_document();
        let page = dom.create_page("main", PageType::Model).expect("创建页面");
        let step = dom.create_step();
        let triangle = dom
            .create_element(Element::graphic(Graphic::triangle(
                4,
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
            )))
            .expect("创建三角形");
        dom.add(step, triangle).expect("添加三角形");
        dom.add(page, step).expect("添加步骤");
        dom.add(document, page).expect("添加页面");
        session.open_document(document).expect("打开文档");
        (session, step, triangle)
    }

    fn vertices(session: &Session, node: NodeId) -> Vec<Point3> {
        session.dom().element(node).expect("元素").as_graphic().expect("图形").vertices.clone()
    }

    #[test]
    fn translate_and_undo_via_bus() {
        let (mut session, _, triangle) = session_with_triangle();
        let bus = CommandBus::new();
        let mut context = CommandContext { session: &mut session };

        let response = bus.dispatch(&CommandRequest::new("translate").with_args(["1", "2", "3"]), &mut context);
        assert!(response.success, "{:?}", response.message);
        assert_eq!(vertices(context.session, triangle)[0], Point3::new(1.0, 2.0, 3.0));

        let response = bus.dispatch(&CommandRequest::new("undo"), &mut context);
        assert!(response.success);
        assert_eq!(vertices(context.session, triangle)[0], Point3::new(0.0, 0.0, 0.0));

        let response = bus.dispatch(&CommandRequest::new("translate").with_args(["1"]), &mut context);
        assert!(!response.success);
    }

    #[test]
    fn reverse_winding_on_selection() {
        let (mut session, _, triangle) = session_with_triangle();
        let bus = CommandBus::new();
        let mut context = CommandContext { session: &mut session };
        let select = CommandRequest::new("select").with_args([triangle.to_string()]);
        assert!(bus.dispatch(&select, &mut context).success);

        assert!(bus.dispatch(&CommandRequest::new("reverse_winding"), &mut context).success);
        assert_eq!(vertices(context.session, triangle)[1], Point3::new(0.0, 1.0, 0.0));
        assert!(bus.dispatch(&CommandRequest::new("redo"), &mut context).message.is_some());
    }

    #[test]
    fn delete_selection_is_undoable() {
        let (mut session, step, triangle) = session_with_triangle();
        let bus = CommandBus::new();
        let mut context = CommandContext { session: &mut session };
        context.session.select(triangle).expect("选中");

        assert!(bus.dispatch(&CommandRequest::new("delete_selection"), &mut context).success);
        assert!(context.session.dom().elements(step).expect("元素").is_empty());
        assert_eq!(context.session.selection_len(), 0);

        assert!(bus.dispatch(&CommandRequest::new("undo"), &mut context).success);
        assert_eq!(context.session.dom().elements(step).expect("元素"), &[triangle]);
        assert!(!bus.dispatch(&CommandRequest::new("delete_selection"), &mut context).success);
    }

    #[test]
    fn unknown_command_is_reported() {
        let mut session = Session::new();
        let bus = CommandBus::new();
        let mut context = CommandContext { session: &mut session };
        let response = bus.dispatch(&CommandRequest::new("explode"), &mut context);
        assert!(!response.success);
        assert_eq!(bus.available_commands().count(), 7);
    }
}
