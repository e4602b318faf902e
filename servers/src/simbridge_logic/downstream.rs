use crate::simbridge_logic::state::AppContext;
use anyhow::{Context, Result};
use lib_simlink::service::build_router;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio_graceful::ShutdownGuard;
use tracing::info;

/// Binds the listener up front so a taken port fails startup instead of a
/// background task.
pub async fn bind(addr: SocketAddr) -> Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind snapshot endpoint on {addr}"))
}

pub async fn run(listener: TcpListener, ctx: AppContext, shutdown_guard: ShutdownGuard) -> Result<()> {
    let app = build_router(ctx.query.clone());

    info!("Downstream server listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_guard.cancelled().await;
            info!("Downstream server shutting down.");
        })
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simbridge_logic::config::{resolve, Config};
    use lib_simlink::core::{TelemetrySnapshot, TelemetrySource, Title};
    use lib_simlink::sources::SyntheticSource;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio::runtime::Handle;

    async fn raw_request(addr: SocketAddr, method: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = format!(
            "{method} /plane HTTP/1.1\r\nHost: localhost\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
        );
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn test_serves_snapshot_over_tcp() {
        let settings = resolve(Config::default()).unwrap();
        let source: Arc<dyn TelemetrySource> = Arc::new(SyntheticSource::new(settings.synthetic.clone()));
        let ctx = AppContext::new(&settings, source, Handle::current());
        ctx.store.write(TelemetrySnapshot {
            title: Title::new("Beechcraft Baron"),
            latitude_deg: 40.6413,
            longitude_deg: -73.7781,
            altitude_ft: 13.0,
            heading_magnetic_deg: 44.0,
            airspeed_true_kts: 0.0,
            vertical_speed_fpm: 0.0,
        });

        let listener = bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (trigger, signal) = tokio::sync::oneshot::channel::<()>();
        let shutdown = tokio_graceful::Shutdown::new(async move {
            let _ = signal.await;
        });
        shutdown.spawn_task_fn({
            let ctx = ctx.clone();
            move |guard| run(listener, ctx, guard)
        });

        let ok = raw_request(addr, "GET").await;
        assert!(ok.starts_with("HTTP/1.1 200"), "{ok}");
        assert!(ok.contains("\"Title\":\"Beechcraft Baron\""), "{ok}");

        let rejected = raw_request(addr, "POST").await;
        assert!(rejected.starts_with("HTTP/1.1 405"), "{rejected}");

        trigger.send(()).unwrap();
        assert!(shutdown.shutdown_with_limit(Duration::from_secs(2)).await.is_ok());
    }

    #[tokio::test]
    async fn test_bind_conflict_is_reported() {
        let first = bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let taken = first.local_addr().unwrap();
        let err = bind(taken).await.unwrap_err();
        assert!(err.to_string().contains("Failed to bind"));
    }
}
