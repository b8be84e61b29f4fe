//! Log this device out.

use anyhow::Result;

use super::{describe, shutdown_token, with_timeout, App};
use crate::output::{write_json, LogoutReport};

/// Run the logout command.
pub async fn run(app: &App) -> Result<()> {
    let _lock = app.lock()?;
    let signal = shutdown_token();
    let cancel = with_timeout(&signal, app.timeout);
    let engine = app.engine();

    engine
        .logout(&cancel)
        .await
        .map_err(|e| describe(e, &signal, app.timeout))?;

    if app.json {
        return write_json(&LogoutReport { logged_out: true });
    }
    println!("Logged out.");
    Ok(())
}
