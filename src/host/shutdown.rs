use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Cancels `cancelation` on ctrl-c. Returns as well once something else cancelled it, like the
/// browser closing stdin.
///
/// Browsers stop native hosts by closing the pipe, and on Windows by killing the process, so
/// the signal path mostly matters when running the host by hand.
pub async fn detect_shutdown(cancelation: CancellationToken) {
    select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received ctrl-c, shutting down");
            cancelation.cancel();
        },
        _ = cancelation.cancelled() => (),
    };
}
