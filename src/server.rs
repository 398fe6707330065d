use std::sync::Arc;

use anyhow::Result;
use tokio::signal;
use tokio::sync::watch;

use crate::api::ApiServer;
use crate::config::Config;
use crate::smtp::SmtpServer;
use crate::storage::Store;

/// The daemon: one shared store, one SMTP server, one HTTP API server.
pub struct Server {
    smtp: Arc<SmtpServer>,
    api: Arc<ApiServer>,
}

impl Server {
    pub fn new(config: Config, store: Arc<Store>) -> Self {
        Self {
            smtp: SmtpServer::new(config.smtp, store.clone()),
            api: ApiServer::new(config.http, store),
        }
    }

    /// Runs both servers until SIGINT/SIGTERM, then drains in-flight
    /// connections. Nothing is persisted: a restart loses all mail.
    pub async fn run(self) -> Result<()> {
        let (exit_tx, exit_rx) = watch::channel(false);

        #[cfg(unix)]
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;

        tokio::spawn(async move {
            #[cfg(unix)]
            tokio::select! {
                _ = signal::ctrl_c() => (),
                _ = sigterm.recv() => (),
            };
            #[cfg(not(unix))]
            let _ = signal::ctrl_c().await;

            tracing::info!("shutdown requested");
            let _ = exit_tx.send(true);
        });

        tokio::try_join!(self.smtp.run(exit_rx.clone()), self.api.run(exit_rx))?;

        Ok(())
    }
}
