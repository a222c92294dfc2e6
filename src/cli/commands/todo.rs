use crate::cli::Context;
use crate::cli::parser::TodoAction;
use crate::errors::AppResult;
use crate::models::todo::TodoPatch;
use crate::ui::messages::{info, success};
use crate::ui::render;

pub async fn handle(ctx: &Context, action: &TodoAction) -> AppResult<()> {
    let backend = ctx.backend()?;
    let actor = ctx.require_actor()?;

    match action {
        TodoAction::Add { name } => {
            let todo = backend.todos.add_todo(&actor, name).await?;
            success(format!("Todo #{} added", todo.id));
        }
        TodoAction::List => {
            let todos = backend.todos.list_todos(&actor).await?;
            if todos.is_empty() {
                info("Nothing to do.");
            }
            for todo in &todos {
                println!("{}", render::todo_line(todo));
            }
        }
        TodoAction::Done { id } => {
            let todo = backend.todos.toggle_todo(*id, &actor).await?;
            println!("{}", render::todo_line(&todo));
        }
        TodoAction::Rename { id, name } => {
            let todo = backend
                .todos
                .update_todo(*id, &actor, TodoPatch::rename(name.as_str()))
                .await?;
            println!("{}", render::todo_line(&todo));
        }
        TodoAction::Note { id, text } => {
            let todo = backend
                .todos
                .update_todo(*id, &actor, TodoPatch::note(text.as_str()))
                .await?;
            println!("{}", render::todo_line(&todo));
        }
    }
    Ok(())
}
