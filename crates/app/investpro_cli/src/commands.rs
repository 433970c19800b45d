//! Command implementations. Each one builds a fresh orchestrator over the
//! on-disk session file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use investpro_api_client::{ClientConfig, HttpAuthBackend};
use investpro_core::storage::FileStore;
use investpro_core::{
    InvalidationBus, Scope, Session, SessionConfig, SessionOrchestrator, TokenStore,
};

use crate::cli::Cli;
use crate::{Error, Result};

const DATA_DIR_NAME: &str = "investpro";

fn resolve_data_dir(explicit: Option<&Path>) -> Result<PathBuf> {
    match explicit {
        Some(dir) => Ok(dir.to_path_buf()),
        None => dirs::data_dir()
            .map(|dir| dir.join(DATA_DIR_NAME))
            .ok_or_else(|| {
                Error::Custom("Could not determine a data directory, pass --data-dir".into())
            }),
    }
}

fn client_config(args: &Cli) -> ClientConfig {
    let mut config = ClientConfig::from_env();
    if let Some(url) = &args.api_url {
        config = config.with_base_url(url.clone());
    }
    if let Some(url) = &args.admin_api_url {
        config.admin_api_base_url = url.clone();
    }
    config
}

fn orchestrator(args: &Cli) -> Result<SessionOrchestrator> {
    let data_dir = resolve_data_dir(args.data_dir.as_deref())?;
    let store = FileStore::in_dir(&data_dir);
    log::debug!("session file: {}", store.path().display());

    let tokens = TokenStore::new(Arc::new(store));
    let bus = InvalidationBus::new();
    let backend =
        HttpAuthBackend::from_config(&client_config(args), tokens.clone(), bus.clone())?;

    Ok(SessionOrchestrator::new(
        tokens,
        Arc::new(backend),
        bus,
        SessionConfig::from_env(),
    ))
}

fn print_session(session: &Session) {
    println!("phase: {}", session.phase);
    if let Some(scope) = session.scope {
        println!("scope: {scope}");
    }
    if let Some(user) = &session.user {
        println!("user:  {} <{}>", user.display_name(), user.email);
    }
}

pub async fn status(args: &Cli) -> Result<()> {
    let session = orchestrator(args)?.boot().await;
    print_session(&session);
    Ok(())
}

pub async fn login(args: &Cli, scope: Scope, email: &str, password: &str) -> Result<()> {
    let orchestrator = orchestrator(args)?;
    let user = match scope {
        Scope::Customer => orchestrator.login_customer(email, password).await?,
        Scope::Admin => orchestrator.login_admin(email, password).await?,
    };
    println!("Logged in as {} ({scope})", user.display_name());
    Ok(())
}

pub async fn logout(args: &Cli) -> Result<()> {
    let orchestrator = orchestrator(args)?;
    let had_session = orchestrator.token_store().active_scope().ok().flatten();
    orchestrator.logout().await;
    match had_session {
        Some(scope) => println!("Logged out ({scope})"),
        None => println!("Not logged in"),
    }
    Ok(())
}

pub async fn whoami(args: &Cli) -> Result<()> {
    let session = orchestrator(args)?.boot().await;
    match session.user {
        Some(user) if session.is_authenticated() => {
            println!("{}", serde_json::to_string_pretty(&user)?);
            Ok(())
        }
        _ => Err(Error::NotAuthenticated),
    }
}
