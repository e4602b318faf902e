//! # SimBridge Server
//!
//! Bridges a push-based flight simulator telemetry feed to a pull-based HTTP
//! endpoint. Any `GET` on the listen address returns the most recent aircraft
//! snapshot as JSON; any other method gets `405 Method Not Allowed`.
//!
//! ## Tasks:
//! - **Upstream**: keeps the simulator link alive. The connection manager
//!   retries on a fixed interval and re-subscribes after every link up.
//! - **Downstream**: the axum snapshot endpoint.
//!
//! Both run under `tokio-graceful` and stop on Ctrl+C or SIGTERM.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::runtime::Handle;
use tokio_graceful::Shutdown;
use tracing::{error, info};

use lib_simlink::core::TelemetrySource;
use lib_simlink::loggers::setup_logging;
use lib_simlink::sources::SyntheticSource;

mod simbridge_logic;
use simbridge_logic::{config, downstream, state, upstream};

fn load_dotenv() {
    let dotenv_os: &str = if cfg!(target_os = "windows") {
        ".env.windows"
    } else {
        ".env.linux"
    };

    dotenvy::dotenv().ok();
    dotenvy::from_filename(dotenv_os).ok();
}

#[tokio::main]
async fn main() -> Result<()> {
    load_dotenv();

    let settings = config::load_config()?;
    // Dropping the guard flushes the file log.
    let _log_guard = setup_logging(&settings.log_options())?;

    info!(
        listen_addr = %settings.listen_addr,
        empty_response = %settings.empty_response,
        "Starting SimBridge"
    );

    let source: Arc<dyn TelemetrySource> = Arc::new(SyntheticSource::new(settings.synthetic.clone()));
    let ctx = state::AppContext::new(&settings, source, Handle::current());

    let listener = downstream::bind(settings.listen_addr).await?;

    let shutdown: Shutdown = Shutdown::default();

    shutdown.spawn_task_fn({
        let ctx = ctx.clone();
        move |guard| upstream::run(ctx, guard)
    });

    shutdown.spawn_task_fn(move |guard| async move {
        if let Err(e) = downstream::run(listener, ctx, guard).await {
            error!("Downstream server failed: {:#}", e);
        }
    });

    match shutdown.shutdown_with_limit(Duration::from_secs(10)).await {
        Ok(elapsed) => {
            info!(
                "shutdown: gracefully {}s after shutdown signal received",
                elapsed.as_secs_f64()
            );
        }
        Err(e) => {
            info!("shutdown: forcefully due to timeout: {}", e);
        }
    }

    info!("Bye!");

    Ok(())
}
