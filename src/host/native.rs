//! Native messaging transport: length prefixed JSON frames on stdin/stdout, and the
//! [BrowserApi] the core talks to on top of them.

use std::{
    collections::HashMap,
    io::ErrorKind,
    sync::{Arc, Mutex, PoisonError},
};

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    select,
    sync::mpsc,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::browser::{BrowserApi, BrowserEvent, Tab, TabId};

use super::protocol::{decode_inbound, Command, Inbound, Outbound};

/// Browsers refuse messages from a host above this size.
pub const MAX_OUTBOUND_FRAME: usize = 1024 * 1024;
/// Largest message a browser sends to a host.
pub const MAX_INBOUND_FRAME: usize = 64 * 1024 * 1024;

/// Reads one frame. `None` means the browser closed the pipe between frames.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    let mut header = [0u8; 4];
    match reader.read_exact(&mut header).await {
        Ok(_) => (),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_ne_bytes(header) as usize;
    if len > MAX_INBOUND_FRAME {
        bail!("Frame of {len} bytes is over the limit");
    }

    let mut body = vec![0; len];
    reader
        .read_exact(&mut body)
        .await
        .context("Connection closed in the middle of a frame")?;
    Ok(Some(body))
}

pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, body: &[u8]) -> Result<()> {
    if body.len() > MAX_OUTBOUND_FRAME {
        bail!("Message of {} bytes is too large to send", body.len());
    }
    let len = body.len() as u32;
    writer.write_all(&len.to_ne_bytes()).await?;
    writer.write_all(body).await?;
    writer.flush().await?;
    Ok(())
}

/// Tabs as last reported by the extension.
#[derive(Debug, Default)]
struct TabCache {
    tabs: HashMap<TabId, Tab>,
    active: Option<TabId>,
}

impl TabCache {
    fn observe(&mut self, event: &BrowserEvent) {
        match event {
            BrowserEvent::Startup { tabs } => {
                self.active = tabs.iter().find(|tab| tab.active).map(|tab| tab.id);
                self.tabs = tabs.iter().map(|tab| (tab.id, tab.clone())).collect();
            }
            BrowserEvent::TabActivated { tab_id, .. } => {
                if let Some(previous) = self.active.and_then(|id| self.tabs.get_mut(&id)) {
                    previous.active = false;
                }
                if let Some(tab) = self.tabs.get_mut(tab_id) {
                    tab.active = true;
                }
                self.active = Some(*tab_id);
            }
            BrowserEvent::TabUpdated { tab_id, url, tab } => {
                let mut tab = tab.clone();
                if let Some(url) = url {
                    tab.url = Some(url.clone());
                }
                tab.active = self.active == Some(*tab_id);
                self.tabs.insert(*tab_id, tab);
            }
            BrowserEvent::TabRemoved { tab_id } => {
                self.tabs.remove(tab_id);
                if self.active == Some(*tab_id) {
                    self.active = None;
                }
            }
            BrowserEvent::FocusChanged { .. } | BrowserEvent::IdleStateChanged { .. } => (),
        }
    }
}

/// [BrowserApi] over native messaging. Queries are answered from the tab cache the reader keeps
/// up to date, commands are queued for the writer.
pub struct NativeBrowser {
    tabs: Mutex<TabCache>,
    outbound: mpsc::Sender<Outbound>,
}

impl NativeBrowser {
    pub fn new(outbound: mpsc::Sender<Outbound>) -> Self {
        Self {
            tabs: Mutex::new(TabCache::default()),
            outbound,
        }
    }

    /// Updates the tab cache. Called for every event before it is dispatched.
    pub fn observe(&self, event: &BrowserEvent) {
        self.tabs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .observe(event);
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.outbound
            .send(Outbound::Command(command))
            .await
            .map_err(|_| anyhow!("Browser connection is closed"))
    }
}

#[async_trait]
impl BrowserApi for NativeBrowser {
    async fn get_tab(&self, tab_id: TabId) -> Result<Tab> {
        let tabs = self.tabs.lock().unwrap_or_else(PoisonError::into_inner);
        tabs.tabs
            .get(&tab_id)
            .cloned()
            .ok_or_else(|| anyhow!("No tab with id {tab_id}"))
    }

    async fn active_tab(&self) -> Result<Option<Tab>> {
        let tabs = self.tabs.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(tabs.active.and_then(|id| tabs.tabs.get(&id)).cloned())
    }

    async fn redirect(&self, tab_id: TabId, page: &str) -> Result<()> {
        self.send(Command::Redirect {
            tab_id,
            url: page.to_string(),
        })
        .await
    }

    async fn set_idle_detection_interval(&self, seconds: u32) -> Result<()> {
        self.send(Command::SetIdleDetectionInterval { seconds }).await
    }
}

/// Reads frames until the browser hangs up, forwarding decoded messages to the dispatcher.
/// Hanging up, or a broken stream, triggers shutdown of the whole host.
pub async fn run_reader<R: AsyncRead + Unpin>(
    mut reader: R,
    browser: Arc<NativeBrowser>,
    inbound: mpsc::Sender<Inbound>,
    shutdown: CancellationToken,
) -> Result<()> {
    loop {
        let frame = select! {
            _ = shutdown.cancelled() => return Ok(()),
            frame = read_frame(&mut reader) => frame,
        };

        let frame = match frame {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                info!("Browser closed the connection");
                shutdown.cancel();
                return Ok(());
            }
            Err(e) => {
                shutdown.cancel();
                return Err(e.context("Failed to read from the browser"));
            }
        };

        let message = match decode_inbound(&frame) {
            Ok(message) => message,
            Err(e) => {
                warn!("Dropping malformed message {e:?}");
                continue;
            }
        };
        debug!("Received {message:?}");
        if let Inbound::Event(event) = &message {
            browser.observe(event);
        }
        if inbound.send(message).await.is_err() {
            return Ok(());
        }
    }
}

/// Writes queued messages until every sender is gone.
pub async fn run_writer<W: AsyncWrite + Unpin>(
    mut writer: W,
    mut outbound: mpsc::Receiver<Outbound>,
) -> Result<()> {
    while let Some(message) = outbound.recv().await {
        let body = serde_json::to_vec(&message)?;
        if let Err(e) = write_frame(&mut writer, &body).await {
            error!("Failed to send {message:?} {e:?}");
            if e.downcast_ref::<std::io::Error>().is_some() {
                return Err(e);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use serde_json::{json, Value};
    use tokio::io::duplex;

    use super::*;

    fn tab(id: TabId, url: &str, active: bool) -> Tab {
        Tab {
            id,
            window_id: Some(1),
            url: Some(url.into()),
            title: None,
            active,
        }
    }

    #[tokio::test]
    async fn frames_survive_the_pipe() -> Result<()> {
        let (mut client, mut host) = duplex(64);

        let body = br#"{"type":"tabRemoved","tabId":1}"#.to_vec();
        let (written, read) = tokio::join!(write_frame(&mut client, &body), read_frame(&mut host));
        written?;
        assert_eq!(read?, Some(body));

        drop(client);
        assert_eq!(read_frame(&mut host).await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn oversized_frames_are_rejected() -> Result<()> {
        let (mut client, mut host) = duplex(64);
        let len = (MAX_INBOUND_FRAME as u32 + 1).to_ne_bytes();
        client.write_all(&len).await?;

        assert!(read_frame(&mut host).await.is_err());
        assert!(write_frame(&mut client, &vec![b' '; MAX_OUTBOUND_FRAME + 1]).await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn tab_cache_follows_events() -> Result<()> {
        let (sender, _receiver) = mpsc::channel(4);
        let browser = NativeBrowser::new(sender);

        browser.observe(&BrowserEvent::Startup {
            tabs: vec![tab(1, "https://github.com", true), tab(2, "https://docs.rs", false)],
        });
        assert_eq!(browser.active_tab().await?.map(|t| t.id), Some(1));

        browser.observe(&BrowserEvent::TabActivated {
            tab_id: 2,
            window_id: Some(1),
        });
        assert_eq!(browser.active_tab().await?.map(|t| t.id), Some(2));
        assert!(!browser.get_tab(1).await?.active);

        browser.observe(&BrowserEvent::TabUpdated {
            tab_id: 2,
            url: Some("https://crates.io".into()),
            tab: tab(2, "https://docs.rs", false),
        });
        let updated = browser.get_tab(2).await?;
        assert_eq!(updated.url.as_deref(), Some("https://crates.io"));
        assert!(updated.active);

        browser.observe(&BrowserEvent::TabRemoved { tab_id: 2 });
        assert!(browser.get_tab(2).await.is_err());
        assert_eq!(browser.active_tab().await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn commands_are_queued_for_the_writer() -> Result<()> {
        let (sender, receiver) = mpsc::channel(4);
        let browser = NativeBrowser::new(sender);
        let (host_out, mut client_in) = duplex(1024);

        browser.redirect(9, "focus-blocked.html").await?;
        browser.set_idle_detection_interval(300).await?;
        drop(browser);
        run_writer(host_out, receiver).await?;

        let first: Value = serde_json::from_slice(&read_frame(&mut client_in).await?.unwrap())?;
        let second: Value = serde_json::from_slice(&read_frame(&mut client_in).await?.unwrap())?;
        assert_eq!(first, json!({"command": "redirect", "tabId": 9, "url": "focus-blocked.html"}));
        assert_eq!(second, json!({"command": "setIdleDetectionInterval", "seconds": 300}));
        Ok(())
    }

    #[tokio::test]
    async fn reader_skips_garbage_and_shuts_down_on_hang_up() -> Result<()> {
        let (mut client, host_in) = duplex(1024);
        let (out_sender, _out_receiver) = mpsc::channel(4);
        let browser = Arc::new(NativeBrowser::new(out_sender));
        let (sender, mut receiver) = mpsc::channel(4);
        let shutdown = CancellationToken::new();

        write_frame(&mut client, b"{\"type\":\"nonsense\"}").await?;
        write_frame(
            &mut client,
            br#"{"type":"startup","tabs":[{"id":3,"url":"https://github.com","active":true}]}"#,
        )
        .await?;
        drop(client);

        run_reader(host_in, browser.clone(), sender, shutdown.clone()).await?;

        assert!(matches!(
            receiver.recv().await,
            Some(Inbound::Event(BrowserEvent::Startup { .. }))
        ));
        assert_eq!(browser.active_tab().await?.map(|t| t.id), Some(3));
        assert!(shutdown.is_cancelled());
        Ok(())
    }
}
