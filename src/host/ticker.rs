use std::{sync::Arc, time::Duration};

use anyhow::Result;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::{browser::Alarm, utils::clock::Clock};

/// Periodic flush of the running interval.
pub const TICK_INTERVAL: Duration = Duration::from_secs(60);

/// Posts [Alarm::Tick] at a fixed rate until shutdown.
pub struct Ticker {
    alarms: mpsc::Sender<Alarm>,
    shutdown: CancellationToken,
    interval: Duration,
    clock: Arc<dyn Clock>,
}

impl Ticker {
    pub fn new(
        alarms: mpsc::Sender<Alarm>,
        shutdown: CancellationToken,
        interval: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            alarms,
            shutdown,
            interval,
            clock,
        }
    }

    /// Executes the ticker loop. Ticks are scheduled from the start instant, so a slow handler
    /// doesn't make the following ticks drift.
    pub async fn run(self) -> Result<()> {
        let mut tick_point = self.clock.instant();
        loop {
            tick_point += self.interval;

            tokio::select! {
                // Dropping the sender here is what lets the dispatcher's alarm channel close.
                _ = self.shutdown.cancelled() => {
                    return Ok(())
                }
                _ = self.clock.sleep_until(tick_point) => ()
            }

            debug!("Tick");
            self.alarms
                .send(Alarm::Tick)
                .await
                .inspect_err(|e| error!("Unexpected error during sending {e:?}"))?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::clock::DefaultClock;

    #[tokio::test(start_paused = true)]
    async fn ticks_until_shutdown() -> Result<()> {
        let (sender, mut receiver) = mpsc::channel(8);
        let shutdown = CancellationToken::new();
        let ticker = Ticker::new(sender, shutdown.clone(), TICK_INTERVAL, Arc::new(DefaultClock));

        let (result, ticks) = tokio::join!(ticker.run(), async {
            let mut ticks = 0;
            while ticks < 3 {
                if receiver.recv().await == Some(Alarm::Tick) {
                    ticks += 1;
                }
            }
            shutdown.cancel();
            ticks
        });

        result?;
        assert_eq!(ticks, 3);
        Ok(())
    }
}
