use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use hyper::service::{make_service_fn, service_fn};
use hyper::Server;

use merge_control::web::logger::init_logging;
use merge_control::web::router::handle_request;
use merge_control::web::state::{AppState, SharedAppState};
use merge_control_config::Settings;
use merge_control_types::{sys_info, sys_warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load();

    match init_logging(&settings) {
        Ok(path) => sys_info!("Logging to {}", path.display()),
        Err(e) => eprintln!("Failed to set up logging: {e}"),
    }

    let state: SharedAppState = Arc::new(
        AppState::from_settings(&settings).context("failed to initialize application state")?,
    );

    let addr: SocketAddr = settings
        .bind_addr
        .parse()
        .with_context(|| format!("invalid bind address: {}", settings.bind_addr))?;

    let make_svc = make_service_fn({
        let state = state.clone();
        move |_conn| {
            let state = state.clone();
            async move {
                Ok::<_, Infallible>(service_fn(move |req| handle_request(req, state.clone())))
            }
        }
    });

    let server = Server::try_bind(&addr)
        .with_context(|| format!("failed to bind {addr}"))?
        .serve(make_svc);

    sys_info!("Merge control server starting on http://{}", addr);
    sys_info!("Merge command: {}", state.supervisor.program());
    sys_info!("Configuration files: {}", state.configs.root().display());
    println!("Available endpoints:");
    println!("  GET    /health                     - Health check");
    println!("  POST   /start/                     - Start a merge job");
    println!("  GET    /stop/{{pid}}/                - Stop a merge job");
    println!("  GET    /get_pids/                  - List tracked jobs");
    println!("  GET    /check_progress/{{pid}}/      - Job status and output");
    println!("  POST   /upload_yaml/               - Store a YAML configuration");
    println!("  GET    /list_yaml_files/           - List stored configurations");
    println!("  DELETE /delete_yaml_file/?filename - Delete a stored configuration");
    println!("  POST   /upload_model/              - Publish a merged model");
    println!("  GET    /ram_usage/                 - Memory usage");
    println!("  GET    /hdd_usage/{{path}}           - Disk usage");

    let graceful = server.with_graceful_shutdown(async {
        if tokio::signal::ctrl_c().await.is_err() {
            sys_warn!("Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
        sys_info!("Shutting down");
    });

    graceful.await.context("server error")?;

    // Dropping the last state handle terminates any running merge jobs
    drop(state);
    Ok(())
}
