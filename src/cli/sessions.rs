// src/cli/sessions.rs - `noveler sessions` subcommands

use anyhow::Context;
use std::path::Path;

use super::{store_limits, SessionsAction};
use crate::chat::store::{SessionExport, SessionStore, SessionsSnapshot};
use crate::infra::config::Config;
use crate::infra::fs::write_private;
use crate::infra::paths;
use crate::util::preview;

pub async fn run_sessions(action: SessionsAction, config: &Config) -> anyhow::Result<()> {
    let path = paths::sessions_file_path();
    let store = SessionStore::load_or_default(&path, store_limits(config))?;

    match action {
        SessionsAction::List => list(&store),
        SessionsAction::Export { output } => {
            let json = serde_json::to_string_pretty(&store.export_all())?;
            match output {
                Some(out) => {
                    write_private(&out, json.as_bytes())
                        .await
                        .with_context(|| format!("writing {}", out.display()))?;
                    eprintln!("Exported {} sessions to {}", store.len(), out.display());
                }
                None => println!("{json}"),
            }
        }
        SessionsAction::Import { file } => import(store, &file, &path).await?,
    }
    Ok(())
}

fn list(store: &SessionStore) {
    let current = store.current_id();
    for session in store.list_sessions() {
        let marker = if Some(session.id.as_str()) == current {
            "*"
        } else {
            " "
        };
        let updated = chrono::DateTime::from_timestamp_millis(session.updated_at)
            .map(|d| {
                d.with_timezone(&chrono::Local)
                    .format("%Y-%m-%d %H:%M")
                    .to_string()
            })
            .unwrap_or_default();
        println!(
            "{marker} {}  {:<24}  {:>3} msgs  {updated}",
            session.id,
            preview(&session.title, 24),
            session.messages.len()
        );
    }
}

async fn import(mut store: SessionStore, file: &Path, store_path: &Path) -> anyhow::Result<()> {
    let content =
        std::fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
    let snapshot: SessionsSnapshot =
        serde_json::from_str(&content).with_context(|| format!("parsing {}", file.display()))?;

    let mut imported = 0;
    let mut skipped = 0;
    for session in snapshot.sessions {
        let messages = session.messages.clone();
        if store.import_session(SessionExport { session, messages }) {
            imported += 1;
        } else {
            skipped += 1;
        }
    }
    store.save_to(store_path).await?;
    eprintln!("Imported {imported} sessions ({skipped} skipped, id already present)");
    Ok(())
}
