//! Serve command - run the HTTP API server.

use crate::auth::AuthVerifier;
use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::Orchestrator;
use crate::server::{run_server, AppState};
use anyhow::Result;
use std::sync::Arc;

/// Run the HTTP API server.
pub async fn run_serve(host: Option<String>, port: Option<u16>, mut settings: Settings) -> Result<()> {
    if let Some(host) = host {
        settings.server.host = host;
    }
    if let Some(port) = port {
        settings.server.port = port;
    }

    if settings.auth.jwt_secret.as_deref().unwrap_or("").is_empty() {
        Output::warning("NOTAT_JWT_SECRET is not set; authenticated endpoints will reject every request.");
    }

    let auth = Arc::new(AuthVerifier::new(&settings.auth));
    let orchestrator = Arc::new(Orchestrator::new(settings)?);

    let addr = format!(
        "{}:{}",
        orchestrator.settings().server.host,
        orchestrator.settings().server.port
    );
    Output::header("Notat API Server");
    println!();
    Output::success(&format!("Listening on http://{}", addr));
    println!();
    Output::info("Press Ctrl+C to stop the server.");

    run_server(Arc::new(AppState { orchestrator, auth })).await
}
