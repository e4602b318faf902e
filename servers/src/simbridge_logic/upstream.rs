use crate::simbridge_logic::state::AppContext;
use tokio_graceful::ShutdownGuard;
use tracing::{info, warn};

/// Starts the simulator link and reports its state transitions until
/// shutdown. Reconnection itself is owned by the connection manager.
pub async fn run(ctx: AppContext, shutdown_guard: ShutdownGuard) {
    let mut state_rx = ctx.link.watch_state();

    if ctx.link.start() {
        info!(
            application = %ctx.link.settings().application_name,
            retry_interval_ms = ctx.link.settings().retry_interval.as_millis() as u64,
            "Upstream connect loop started"
        );
    }

    loop {
        tokio::select! {
            _ = shutdown_guard.cancelled() => {
                info!(stats = ?ctx.link.stats(), "Upstream received shutdown signal.");
                break;
            }
            changed = state_rx.changed() => {
                if changed.is_err() {
                    warn!("Connection state channel closed");
                    break;
                }
                let state = *state_rx.borrow_and_update();
                info!(%state, stats = ?ctx.link.stats(), "Simulator link state changed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simbridge_logic::config::{resolve, Config};
    use lib_simlink::core::{ConnectionState, TelemetrySource};
    use lib_simlink::sources::SyntheticSource;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::runtime::Handle;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_upstream_connects_and_fills_the_store() {
        let settings = resolve(Config {
            retry_interval_ms: Some(20),
            synthetic_refuse_attempts: Some(1),
            ..Default::default()
        })
        .unwrap();
        let source: Arc<dyn TelemetrySource> = Arc::new(SyntheticSource::new(settings.synthetic.clone()));
        let ctx = AppContext::new(&settings, source, Handle::current());

        let (trigger, signal) = tokio::sync::oneshot::channel::<()>();
        let shutdown = tokio_graceful::Shutdown::new(async move {
            let _ = signal.await;
        });
        shutdown.spawn_task_fn({
            let ctx = ctx.clone();
            move |guard| run(ctx, guard)
        });

        let mut state_rx = ctx.link.watch_state();
        timeout(Duration::from_secs(3), state_rx.wait_for(|s| *s == ConnectionState::Connected))
            .await
            .unwrap()
            .unwrap();

        timeout(Duration::from_secs(3), async {
            while ctx.store.read_latest_or_empty().is_empty() {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .unwrap();

        trigger.send(()).unwrap();
        assert!(shutdown.shutdown_with_limit(Duration::from_secs(2)).await.is_ok());
    }
}
