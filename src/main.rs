use mailmirror::{AsyncImapConnector, Database, SyncConfig, SyncManager};
use std::path::PathBuf;
use std::sync::Arc;

fn database_path() -> Result<PathBuf, String> {
    if let Ok(path) = std::env::var("MAILMIRROR_DB") {
        if !path.trim().is_empty() {
            return Ok(PathBuf::from(path));
        }
    }

    let app_dir = directories::ProjectDirs::from("com", "mailmirror", "mailmirror")
        .ok_or_else(|| "Failed to get app directories. Is HOME set?".to_string())?;

    let data_dir = app_dir.data_dir();
    std::fs::create_dir_all(data_dir)
        .map_err(|e| format!("Failed to create data directory at {:?}: {}", data_dir, e))?;

    Ok(data_dir.join("mailmirror.db"))
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let db_path = match database_path() {
        Ok(path) => path,
        Err(e) => {
            log::error!("{}", e);
            eprintln!("FATAL: {}", e);
            std::process::exit(1);
        }
    };
    log::info!("Database path: {:?}", db_path);

    let db = match Database::new(db_path) {
        Ok(db) => db,
        Err(e) => {
            log::error!("Failed to initialize database: {}", e);
            eprintln!("FATAL: Database initialization failed: {}", e);
            std::process::exit(1);
        }
    };

    let config = SyncConfig::from_env();
    log::info!(
        "Sync config: batch size {}, quota {}, {} accounts at a time",
        config.batch_size,
        config.check_quota,
        config.max_concurrent_accounts
    );

    let manager = SyncManager::new(Arc::new(AsyncImapConnector), Arc::new(db), config);

    let results = match manager.sync_all_accounts().await {
        Ok(results) => results,
        Err(e) => {
            log::error!("Sync failed: {}", e);
            std::process::exit(1);
        }
    };

    let mut failed = 0;
    for result in &results {
        if result.success {
            log::info!(
                "Account {}: {} new messages{}",
                result.account_id,
                result.count,
                if result.has_folder_errors() { " (with folder errors)" } else { "" }
            );
        } else {
            failed += 1;
            log::error!(
                "Account {}: {}",
                result.account_id,
                result.error.as_deref().unwrap_or("unknown error")
            );
        }
    }

    if failed > 0 {
        std::process::exit(2);
    }
}
