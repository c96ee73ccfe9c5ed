//! Running an implementation until shutdown.

use crate::error::RuntimeResult;
use libonebot_core::app::OneBotImpl;
use tokio::signal;
use tracing::info;

/// Starts the implementation and runs it until Ctrl+C or SIGTERM, then
/// shuts it down in order: transports first, lifecycle hooks last.
pub async fn run(ob: &OneBotImpl) -> RuntimeResult<()> {
    ob.start().await?;
    info!(name = %ob.info().name, "Implementation is running, press Ctrl+C to stop");
    wait_for_shutdown().await;
    ob.shutdown().await;
    Ok(())
}

/// Like [`run`], but with a caller-provided shutdown future instead of
/// signal handling.
pub async fn run_until<F>(ob: &OneBotImpl, shutdown: F) -> RuntimeResult<()>
where
    F: std::future::Future<Output = ()>,
{
    ob.start().await?;
    shutdown.await;
    ob.shutdown().await;
    Ok(())
}

/// Waits for shutdown signals (Ctrl+C or SIGTERM).
async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to register SIGTERM handler");

        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
        info!("Received Ctrl+C, shutting down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConnectionConfig, HttpSection, RuntimeConfig};
    use libonebot_core::model::ImplInfo;
    use libonebot_core::prelude::Bot;

    #[tokio::test]
    async fn run_until_starts_and_stops() {
        let config = RuntimeConfig {
            connections: vec![ConnectionConfig::Http(HttpSection {
                host: "127.0.0.1".into(),
                port: 0,
                ..Default::default()
            })],
            ..Default::default()
        };
        let ob = config
            .builder(ImplInfo::new("test-impl", "0.1.0"))
            .unwrap()
            .bot(Bot::new("qq", "1"))
            .build()
            .unwrap();

        run_until(&ob, async {}).await.unwrap();
        // the supervisor is done once run_until returns
        assert!(ob.supervisor().is_cancelled());
    }
}
