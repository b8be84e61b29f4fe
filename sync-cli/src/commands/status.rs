//! Show whether this device is paired.

use anyhow::Result;
use sync_client::SyncError;

use super::{describe, shutdown_token, with_timeout, App};
use crate::output::{write_json, StatusReport};

/// Run the status command. Never pairs and never connects.
pub async fn run(app: &App) -> Result<()> {
    let authenticated = check(app).await?;

    if app.json {
        return write_json(&StatusReport { authenticated });
    }
    if authenticated {
        println!("Authenticated.");
    } else {
        println!("Not authenticated. Run `linksync auth`.");
    }
    Ok(())
}

async fn check(app: &App) -> Result<bool> {
    let signal = shutdown_token();
    let cancel = with_timeout(&signal, app.timeout);
    let engine = app.engine();

    let authed = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(SyncError::Cancelled),
        result = engine.is_authed() => result,
    };
    authed.map_err(|e| describe(e, &signal, app.timeout))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::{SessionState, SESSION_FILE};
    use tempfile::tempdir;

    #[tokio::test]
    async fn status_without_session() {
        let dir = tempdir().unwrap();
        let app = App::for_test(dir.path(), false);

        assert!(!check(&app).await.unwrap());
        assert!(run(&app).await.is_ok());
        // Nothing was created
        assert!(!dir.path().join(SESSION_FILE).exists());
        assert!(!dir.path().join("store").exists());
    }

    #[tokio::test]
    async fn status_with_session() {
        let dir = tempdir().unwrap();
        SessionState::new().unwrap().save(dir.path()).await.unwrap();
        let app = App::for_test(dir.path(), true);

        assert!(check(&app).await.unwrap());
        assert!(check(&app).await.unwrap());
    }

    #[tokio::test]
    async fn status_ignores_damaged_message_log() {
        let dir = tempdir().unwrap();
        SessionState::new().unwrap().save(dir.path()).await.unwrap();
        let store = dir.path().join("store");
        std::fs::create_dir_all(&store).unwrap();
        std::fs::write(
            store.join("messages.jsonl"),
            "{\"id\":\"m1\",\"chat\":\"c@s\",\"sender\":\"a@s\",\"timestamp\":1}\n{\"id\":\"m2\",\"te",
        )
        .unwrap();
        let app = App::for_test(dir.path(), true);

        assert!(check(&app).await.unwrap());
    }

    #[tokio::test]
    async fn status_ignores_lock() {
        let dir = tempdir().unwrap();
        let app = App::for_test(dir.path(), true);
        let _held = app.lock().unwrap();
        assert!(run(&app).await.is_ok());
    }
}
