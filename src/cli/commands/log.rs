use crate::cli::Context;
use crate::config::BackendKind;
use crate::db::store::SqliteRepository;
use crate::errors::AppResult;
use crate::ui::messages::{info, warning};
use crate::ui::render;

pub async fn handle(ctx: &Context, print: bool) -> AppResult<()> {
    if !print {
        return Ok(());
    }
    if ctx.cfg.backend != BackendKind::Sqlite {
        warning("The audit log is only kept by the SQLite backend.");
        return Ok(());
    }

    let repo = SqliteRepository::open(&ctx.cfg.database)?;
    let entries = repo.audit_log().await?;
    if entries.is_empty() {
        info("The internal log is empty.");
        return Ok(());
    }

    println!("📜 Internal log:\n");
    for line in render::log_lines(&entries) {
        println!("{line}");
    }
    Ok(())
}
