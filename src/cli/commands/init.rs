use crate::cli::Context;
use crate::cli::parser::Cli;
use crate::config::{BackendKind, Config};
use crate::db::store::SqliteRepository;
use crate::errors::AppResult;
use crate::local::kv::FileStore;
use crate::ui::messages::{success, warning};

/// Handle the `init` command
///
/// This initializes:
///  - the config directory and file (skipped in test mode)
///  - the configured store, with all pending migrations for SQLite
pub async fn handle(cli: &Cli) -> AppResult<()> {
    let custom_db = match cli.backend {
        Some(BackendKind::Local) => None,
        _ => cli.db.as_deref(),
    };
    let mut cfg = Config::init_all(custom_db, cli.test)?;
    Context::apply_overrides(cli, &mut cfg);

    println!("⚙️  Initializing zensession…");
    if !cli.test {
        println!("📄 Config file : {}", Config::config_file().display());
    }

    match cfg.backend {
        BackendKind::Sqlite => {
            println!("🗄️  Database   : {}", cfg.database);
            let repo = SqliteRepository::open(&cfg.database)?;
            if let Err(e) = repo
                .audit("init", "", &format!("Database initialized at {}", cfg.database))
                .await
            {
                warning(format!("Failed to write internal log: {e}"));
            }
            success(format!("Database initialized at {}", cfg.database));
        }
        BackendKind::Local => {
            println!("🗄️  Local store: {}", cfg.local_store);
            let store = FileStore::open(&cfg.local_store)?;
            success(format!("Local store ready at {}", store.path().display()));
        }
    }

    Ok(())
}
