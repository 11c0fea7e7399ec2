use anyhow::Result;
use todogate_core::Services;
use todogate_protocol_http::HTTPProtocolServer;
use tracing::*;

use crate::config::load_config;

pub(crate) async fn command(cli: &crate::Cli) -> Result<()> {
    let version = env!("CARGO_PKG_VERSION");
    info!(%version, "Todogate");

    let config = load_config(&cli.config)?;
    let listen = config.store.http.listen;
    let services = Services::new(config).await?;

    let server = HTTPProtocolServer::new(&services).run(listen);

    if console::user_attended() {
        info!("--------------------------------------------");
        info!("Todogate is now running.");
        info!("Accepting HTTP connections on {listen}");
        info!("--------------------------------------------");
    }

    #[cfg(target_os = "linux")]
    if let Ok(true) = sd_notify::booted() {
        use std::time::Duration;

        use sd_notify::NotifyState;
        tokio::spawn(async {
            if let Err(error) = async {
                sd_notify::notify(false, &[NotifyState::Ready])?;
                loop {
                    sd_notify::notify(false, &[NotifyState::Watchdog])?;
                    tokio::time::sleep(Duration::from_secs(15)).await;
                }
                #[allow(unreachable_code)]
                Ok::<(), anyhow::Error>(())
            }
            .await
            {
                error!(?error, "Failed to communicate with systemd");
            }
        });
    }

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Exiting");
        }
        result = server => {
            if let Err(error) = result {
                error!(?error, "HTTP server error");
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
