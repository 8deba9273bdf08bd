//! Process shutdown signals.

/// Resolves on ctrl-c, or SIGTERM on unix.
pub async fn shutdown_signal() -> anyhow::Result<()> {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            res = ctrl_c => {
                res?;
                tracing::info!("received ctrl-c, shutting down");
            }
            _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await?;
        tracing::info!("received ctrl-c, shutting down");
    }

    Ok(())
}
