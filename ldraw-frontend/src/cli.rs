use std::io;

use ldraw_config::AppConfig;
use ldraw_core::{Dom, DomResult, NodeId, TargetStatus};
use ldraw_engine::command::{CommandBus, CommandContext, CommandRequest};
use ldraw_io::{CodeOptions, LDrawFacade};
use tracing::{info, warn};

use crate::errors::FrontendError;
use crate::loader::{DocumentSource, load_demo_session};

/// 简易 CLI 演示：构建内置示例，执行一组编辑命令，再打印文档结构与发布结果。
pub fn run_demo(config: &AppConfig) -> Result<(), FrontendError> {
    let mut loaded = load_demo_session(config)?;
    let demo = loaded.demo;
    let command_bus = CommandBus::new();
    let commands: Vec<&str> = command_bus.available_commands().copied().collect();
    println!("支持的命令: {}", commands.join(", "));

    let brick = demo.brick_ref.to_string();
    let script: [(&str, &[&str]); 5] = [
        ("select", &[brick.as_str()]),
        ("translate", &["20", "0", "0"]),
        ("undo", &[]),
        ("redo", &[]),
        ("clear_selection", &[]),
    ];
    {
        let mut context = CommandContext {
            session: &mut loaded.session,
        };
        for (name, args) in script {
            if let Err(err) = dispatch_cli_command(&command_bus, name, args, &mut context) {
                warn!("CLI 命令执行失败: {err}");
            }
        }
    }

    let session = &loaded.session;
    let dom = session.dom();
    println!("LDraw 文档模型 CLI 演示");
    match &loaded.source {
        DocumentSource::Demo => {
            println!("已构建内置示例：");
            println!("  - 零件库文档 ID = {}", demo.library.get());
            println!("  - 模型文档 ID = {}", demo.model.get());
        }
    }
    println!(
        "撤销栈: 可撤销 {} 步, 可重做 {} 步",
        session.undo_stack().undo_levels(),
        session.undo_stack().redo_levels()
    );

    let document = session.active_document()?;
    print_tree(dom, document)?;

    let options = CodeOptions::new(config.codegen.standard).with_palette(config.codegen.palette());
    let facade = LDrawFacade::new(options);
    println!("保存内容：");
    print!("{}", facade.code(dom, document)?);

    println!("发布内容：");
    let written = facade.publish(dom, document, |target: &str| {
        println!("--- {target} ---");
        Ok(io::stdout())
    })?;
    info!(files = written.len(), "CLI 演示发布完成");
    Ok(())
}

fn print_tree(dom: &Dom, document: NodeId) -> DomResult<()> {
    println!(
        "文档 {} ({:?}, {:?})：",
        dom.document(document)?.filepath,
        dom.document_type(document)?,
        dom.document_status(document)?
    );
    for page in dom.pages(document)? {
        let data = dom.page(*page)?;
        println!(
            "  - 页面 {} [{}], 步骤数={}, 发布时内联={}",
            dom.target_name(*page)?,
            data.page_type.code(),
            dom.steps(*page)?.len(),
            if data.inline_on_publish { "是" } else { "否" }
        );
        for node in dom.descendants(*page)? {
            let Some(reference) = dom.element(node).ok().and_then(|element| element.as_reference()) else {
                continue;
            };
            let status = match dom.target_status(node)? {
                TargetStatus::Resolved => "已解析",
                TargetStatus::Unresolved => "未解析",
                TargetStatus::CircularReference => "循环引用",
            };
            println!("    引用 #{} -> {} ({status})", node.get(), reference.target_name);
        }
    }
    Ok(())
}

fn dispatch_cli_command(
    bus: &CommandBus,
    name: &str,
    args: &[&str],
    context: &mut CommandContext<'_>,
) -> Result<(), FrontendError> {
    let request = CommandRequest::new(name).with_args(args.iter().copied());
    let response = bus.dispatch(&request, context);
    if response.success {
        if let Some(message) = response.message {
            println!("[命令] {message}");
        }
        Ok(())
    } else {
        Err(FrontendError::Command {
            name: name.to_string(),
            message: response.message.unwrap_or_else(|| "未知错误".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ldraw_core::Property;

    #[test]
    fn scripted_commands_are_undoable() {
        let mut loaded = load_demo_session(&AppConfig::default()).expect("构建示例");
        let bus = CommandBus::new();
        let brick = loaded.demo.brick_ref;
        let mut context = CommandContext {
            session: &mut loaded.session,
        };
        let id = brick.to_string();
        dispatch_cli_command(&bus, "select", &[id.as_str()], &mut context).expect("选中");
        dispatch_cli_command(&bus, "translate", &["20", "0", "0"], &mut context).expect("平移");
        let moved = context.session.dom().element(brick).expect("元素").as_reference().map(|r| r.matrix);
        assert_eq!(moved.map(|m| m.w_axis.x), Some(20.0));

        dispatch_cli_command(&bus, "undo", &[], &mut context).expect("撤销");
        let restored = context.session.dom().element(brick).expect("元素").as_reference().map(|r| r.matrix);
        assert_eq!(restored.map(|m| m.w_axis.x), Some(0.0));

        let err = dispatch_cli_command(&bus, "explode", &[], &mut context).unwrap_err();
        assert!(matches!(err, FrontendError::Command { ref name, .. } if name == "explode"));
    }

    #[test]
    fn library_page_cannot_be_edited_through_commands() {
        let mut loaded = load_demo_session(&AppConfig::default()).expect("构建示例");
        let page = loaded.demo.brick_page;
        let err = loaded
            .session
            .execute("rename", |dom| dom.set_property(page, Property::Title("x".to_string())))
            .unwrap_err();
        assert!(err.to_string().contains("read-only"));
        assert!(!loaded.session.undo_stack().can_undo());
    }
}
