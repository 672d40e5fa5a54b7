mod chat;
mod config;
mod error;
mod feed;
mod observability;
mod presence;
mod render;
mod session;
mod store_http;
mod typing;

use std::io::Write as _;
use std::sync::Arc;

use parlor_store::ChatStore;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::chat::ChatOutcome;
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::session::{SessionIdentity, SessionStore};
use crate::store_http::HttpStore;

#[tokio::main]
async fn main() {
    observability::init_tracing();

    if let Err(err) = run().await {
        tracing::error!(error = %err, "fatal");
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

async fn run() -> AppResult<()> {
    let config = Config::from_env()?;
    let sessions = SessionStore::open(config.session_db_path()).await?;
    let store: Arc<dyn ChatStore> =
        Arc::new(HttpStore::connect(config.server_url.clone(), config.ws_url()?).await?);

    // A persisted session skips the prompt; anything else redirects to
    // the login view.
    let session = match session::require_session(&sessions).await {
        Ok(session) => session,
        Err(AppError::NotAuthenticated) => login_prompt(store.as_ref(), &sessions).await?,
        Err(err) => return Err(err),
    };
    println!("signed in as {}", session.username);

    match chat::run(Arc::clone(&store), session.clone()).await? {
        ChatOutcome::Logout => {
            session::logout(store.as_ref(), &sessions, &session).await?;
            println!("signed out");
        }
        ChatOutcome::Quit => {
            println!("bye");
        }
    }
    Ok(())
}

async fn login_prompt(
    store: &dyn ChatStore,
    sessions: &SessionStore,
) -> AppResult<SessionIdentity> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("username: ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            return Err(AppError::validation("no username given"));
        };

        match session::login(store, sessions, &line).await {
            Ok(session) => return Ok(session),
            // Validation and store failures re-prompt; the user retries.
            Err(AppError::Validation(message)) => println!("{message}"),
            Err(AppError::Store(err)) => println!("login failed: {err}"),
            Err(other) => return Err(other),
        }
    }
}
