use std::{path::PathBuf, sync::Arc};

use anyhow::Result;
use dispatch::EventDispatcher;
use native::{run_reader, run_writer, NativeBrowser};
use ticker::{Ticker, TICK_INTERVAL};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::mpsc,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::{
    storage::{open_store, SerializedStore, Store, StoreBackend},
    tracking::{focus::FocusGuard, tracker::ActivityTracker},
    utils::clock::{Clock, DefaultClock},
};

pub mod args;
pub mod dispatch;
pub mod native;
pub mod protocol;
pub mod shutdown;
pub mod ticker;

/// Represents the starting point for the host. Runs until the browser closes stdin or ctrl-c.
pub async fn start_host(dir: PathBuf, backend: StoreBackend) -> Result<()> {
    let store = Arc::new(SerializedStore::new(open_store(&dir, backend)?));
    let shutdown_token = CancellationToken::new();

    let (_, host_result) = tokio::join!(
        shutdown::detect_shutdown(shutdown_token.clone()),
        run_host(
            store,
            tokio::io::stdin(),
            tokio::io::stdout(),
            Arc::new(DefaultClock),
            shutdown_token.clone(),
        ),
    );
    host_result
}

/// Wires the reader, writer, ticker and dispatcher together over `input`/`output` and runs them
/// to completion.
pub async fn run_host<S, R, W>(
    store: Arc<SerializedStore<S>>,
    input: R,
    output: W,
    clock: Arc<dyn Clock>,
    shutdown_token: CancellationToken,
) -> Result<()>
where
    S: Store,
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let (inbound_sender, inbound_receiver) = mpsc::channel(64);
    let (outbound_sender, outbound_receiver) = mpsc::channel(64);
    let (alarm_sender, alarm_receiver) = mpsc::channel(8);

    let browser = Arc::new(NativeBrowser::new(outbound_sender.clone()));
    let tracker = ActivityTracker::new(store.clone(), browser.clone(), clock.clone());
    let guard = FocusGuard::new(store.clone(), browser.clone(), clock.clone(), alarm_sender.clone());
    let ticker = Ticker::new(alarm_sender, shutdown_token.clone(), TICK_INTERVAL, clock);
    let dispatcher = EventDispatcher::new(
        inbound_receiver,
        alarm_receiver,
        outbound_sender,
        tracker,
        guard,
        store,
        shutdown_token.clone(),
    );

    info!("Host running");
    let (reader_result, writer_result, ticker_result, dispatcher_result) = tokio::join!(
        run_reader(input, browser, inbound_sender, shutdown_token.clone()),
        run_writer(output, outbound_receiver),
        ticker.run(),
        async {
            // Once the dispatcher is gone nothing consumes events, stop everything else too.
            let result = dispatcher.run().await;
            shutdown_token.cancel();
            result
        },
    );

    if let Err(e) = &reader_result {
        error!("Reader got an error {e:?}");
    }
    if let Err(e) = &writer_result {
        error!("Writer got an error {e:?}");
    }
    if let Err(e) = ticker_result {
        error!("Ticker got an error {e:?}");
    }
    info!("Host stopped");
    dispatcher_result.and(writer_result)
}

#[cfg(test)]
mod host_tests {
    use std::sync::Arc;

    use anyhow::Result;
    use chrono::Local;
    use serde_json::{json, Value};
    use tokio::io::{duplex, DuplexStream};
    use tokio_util::sync::CancellationToken;

    use crate::{
        host::{
            native::{read_frame, write_frame},
            run_host,
        },
        storage::{memory::MemoryStore, SerializedStore},
        utils::{clock::testing::ManualClock, logging::TEST_LOGGING, time::date_label},
    };

    async fn send(pipe: &mut DuplexStream, message: Value) -> Result<()> {
        write_frame(pipe, &serde_json::to_vec(&message)?).await
    }

    async fn receive(pipe: &mut DuplexStream) -> Result<Value> {
        let frame = read_frame(pipe).await?.expect("host hung up");
        Ok(serde_json::from_slice(&frame)?)
    }

    /// Drives the host through the native messaging pipe like the extension does.
    #[tokio::test]
    async fn smoke_test_host() -> Result<()> {
        *TEST_LOGGING;
        let store = Arc::new(SerializedStore::new(MemoryStore::default()));
        let clock = ManualClock::at_test_start();
        let (mut to_host, host_input) = duplex(4096);
        let (host_output, mut from_host) = duplex(4096);

        let extension = async {
            assert_eq!(
                receive(&mut from_host).await?,
                json!({"command": "setIdleDetectionInterval", "seconds": 300})
            );

            send(&mut to_host, json!({
                "type": "startup",
                "tabs": [
                    {"id": 1, "windowId": 1, "url": "https://github.com/tokio-rs/tokio", "active": true},
                    {"id": 2, "windowId": 1, "url": "https://www.youtube.com/watch?v=1", "active": false},
                ],
            }))
            .await?;
            send(&mut to_host, json!({"action": "getCurrentTab", "id": 1})).await?;
            let current = receive(&mut from_host).await?;
            assert_eq!(current["id"], 1);
            assert_eq!(current["tab"]["id"], 1);
            assert_eq!(current["isIdle"], false);

            clock.advance_ms(90_000);
            send(&mut to_host, json!({"type": "tabActivated", "tabId": 2, "windowId": 1})).await?;
            send(&mut to_host, json!({"action": "startFocusMode", "data": {"duration": 30, "blockedSites": ["youtube.com"]}, "id": 2})).await?;
            assert_eq!(receive(&mut from_host).await?, json!({"id": 2, "success": true}));

            send(&mut to_host, json!({
                "type": "tabUpdated",
                "tabId": 2,
                "url": "https://www.youtube.com/watch?v=2",
                "tab": {"id": 2, "windowId": 1, "url": "https://www.youtube.com/watch?v=2", "active": true},
            }))
            .await?;
            assert_eq!(
                receive(&mut from_host).await?,
                json!({"command": "redirect", "tabId": 2, "url": "focus-blocked.html"})
            );

            send(&mut to_host, json!({"type": "GET_EXTENSION_DATA"})).await?;
            let data = receive(&mut from_host).await?;
            assert_eq!(data["type"], "EXTENSION_DATA_RESPONSE");
            let today = date_label(clock_time(&clock), &Local);
            assert_eq!(data["data"][today]["github.com"], 90_000);

            send(&mut to_host, json!({"action": "selfDestruct"})).await?;
            assert_eq!(receive(&mut from_host).await?, json!({"error": "Unknown action"}));

            drop(to_host);
            anyhow::Ok(())
        };

        let (hosted, extension_result) = tokio::join!(
            run_host(
                store.clone(),
                host_input,
                host_output,
                Arc::new(clock.clone()),
                CancellationToken::new(),
            ),
            extension,
        );
        hosted?;
        extension_result?;

        let data = store.read().await?;
        assert_eq!(data.sites["github.com"].time_spent, 90_000);
        assert_eq!(data.sessions.len(), 1);
        assert!(data.focus_mode.is_active);
        assert_eq!(data.focus_mode.blocked_sites, vec!["youtube.com".to_string()]);
        Ok(())
    }

    fn clock_time(clock: &ManualClock) -> chrono::DateTime<chrono::Utc> {
        use crate::utils::clock::Clock;
        clock.time()
    }
}
