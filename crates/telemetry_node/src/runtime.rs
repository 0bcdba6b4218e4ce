//! Runtime loop
//!
//! One tick: keep the transport connected, drain inbound, run a deferred
//! reconfiguration, read the clock once, then give every channel its chance
//! to publish. Channels sharing a sample rate therefore publish on the same
//! tick.

use contracts::limits::{ensure_fits, MAX_GENERAL_STRING_LEN};
use contracts::{Clock, Timestamp, Transport};
use observability::record_channel_publish;
use tracing::{debug, error, instrument, warn};

use crate::error::{NodeError, Result};
use crate::node::{Node, Phase};

impl<T: Transport, C: Clock> Node<T, C> {
    /// Start the node, then tick forever with `poll_interval_ms` between ticks.
    ///
    /// Returns only if startup fails.
    pub async fn run(&mut self) -> Result<()> {
        self.start().await?;
        loop {
            self.tick().await?;
            self.clock.sleep(self.protocol.poll_interval_ms).await;
        }
    }

    /// One runtime iteration. Returns how many channels published.
    #[instrument(name = "node_tick", skip(self), level = "trace")]
    pub async fn tick(&mut self) -> Result<usize> {
        if matches!(
            self.phase,
            Phase::Created | Phase::Connecting | Phase::AnnouncingStartup
        ) {
            return Err(NodeError::NotStarted);
        }

        self.reconnect(self.protocol.reconnect_backoff_ms).await;

        if let Err(e) = self.drain_inbound().await {
            warn!(error = %e, "inbound drain failed");
        }

        if self.reconfigure_pending {
            self.reconfigure().await;
        }

        let now = self.clock.now();
        Ok(self.publish_due(now).await)
    }

    /// Ask every channel whether to publish at `now`
    async fn publish_due(&mut self, now: Timestamp) -> usize {
        let mut published = 0;

        for channel in self.registry.iter_mut() {
            if !channel.is_active() {
                continue;
            }

            let reading = channel.read_sensor();
            if !channel.should_publish_now(now, reading.force) {
                continue;
            }

            let id = channel.id();
            if let Err(e) = ensure_fits("sensor value", &reading.value, MAX_GENERAL_STRING_LEN) {
                error!(channel_id = id, error = %e, "sensor value rejected");
                continue;
            }

            let topic = &channel.config().publish_topic;
            match self.transport.publish(topic, reading.value.as_bytes()).await {
                Ok(()) => {
                    debug!(channel_id = id, topic = %topic, value = %reading.value, forced = reading.force, "published");
                    channel.on_publish(reading.value, now);
                    record_channel_publish(id, true);
                    self.stats.record_publish(true);
                    published += 1;
                }
                Err(e) => {
                    error!(channel_id = id, topic = %topic, error = %e, "failed to publish reading");
                    record_channel_publish(id, false);
                    self.stats.record_publish(false);
                }
            }
        }

        published
    }
}
