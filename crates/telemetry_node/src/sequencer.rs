//! Node sequencer
//!
//! Startup: `Connecting → AnnouncingStartup → PublishingChannelProperties(i)
//! → FetchingChannelConfig(i) → Ready`.
//! Reconfiguration: `Ready → Reconfiguring → FetchingChannelConfig(*) → Ready`.
//!
//! Retry policy differs per phase: a failed announcement waits
//! `startup_retry_delay_ms` and repeats the phase, while a timed-out
//! properties or configuration exchange is repeated for the same channel
//! straight away. Transport errors always back off by `connect_backoff_ms`.

use contracts::{
    ChannelConfigPayload, ChannelConfigRequest, ChannelId, ChannelPropertiesRequest, Clock,
    Operation, ResponseEnvelope, StartupInfo, Transport,
};
use observability::record_active_channels;
use tracing::{error, info, instrument, warn};

use crate::error::{NodeError, Result};
use crate::exchange::ExchangeOutcome;
use crate::node::{Node, Phase};

/// What to do after one per-channel exchange attempt
enum Attempt {
    Done(Option<ResponseEnvelope>),
    Retry,
}

impl<T: Transport, C: Clock> Node<T, C> {
    /// Run the startup protocol to `Ready`.
    ///
    /// Only a transport buffer reservation failure is fatal; every other
    /// failure is retried.
    #[instrument(
        name = "node_start",
        skip(self),
        fields(node_id = %self.identity.id, channels = self.registry.len())
    )]
    pub async fn start(&mut self) -> Result<()> {
        if self.phase != Phase::Created {
            return Err(NodeError::AlreadyStarted);
        }

        self.connect_phase().await?;
        self.announce_phase().await;
        self.subscribe_inbound().await;
        self.properties_phase().await;
        self.fetch_all_configs().await;

        self.phase = Phase::Ready;
        let active = self.registry.active_count();
        record_active_channels(active);
        info!(active_channels = active, "node ready");
        Ok(())
    }

    /// Re-fetch every channel's configuration, then forget last values
    #[instrument(name = "node_reconfigure", skip(self))]
    pub async fn reconfigure(&mut self) {
        self.reconfigure_pending = false;
        self.phase = Phase::Reconfiguring;
        info!("fetching new channel configurations");

        self.fetch_all_configs().await;
        self.registry.clear_last_values();

        self.phase = Phase::Ready;
        record_active_channels(self.registry.active_count());
        info!("reconfiguration complete");
    }

    #[instrument(name = "node_connect_phase", skip(self), fields(host = %self.connect.host, port = self.connect.port))]
    async fn connect_phase(&mut self) -> Result<()> {
        self.phase = Phase::Connecting;

        let requested = self.protocol.buffer_size;
        if let Err(e) = self.transport.reserve_buffer(requested) {
            error!(requested, error = %e, "transport buffer allocation failed, node halted");
            return Err(NodeError::BufferAllocation { requested });
        }
        info!(buffer_size = requested, "transport buffer reserved");

        loop {
            match self.transport.connect(&self.connect).await {
                Ok(()) => {
                    info!("connected to broker");
                    return Ok(());
                }
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(e) => {
                    warn!(
                        error = %e,
                        retry_in_ms = self.protocol.connect_backoff_ms,
                        "connection to broker failed"
                    );
                    self.clock.sleep(self.protocol.connect_backoff_ms).await;
                }
            }
        }
    }

    async fn announce_phase(&mut self) {
        self.phase = Phase::AnnouncingStartup;
        loop {
            self.reconnect(self.protocol.connect_backoff_ms).await;

            let payload = StartupInfo {
                node_id: self.identity.id.clone(),
                node_type: self.identity.node_type.clone(),
            };
            match self.exchange(Operation::SetNodeStartupInfo, payload).await {
                Ok(ExchangeOutcome::Completed(_)) => {
                    info!("startup information sent");
                    return;
                }
                Ok(ExchangeOutcome::TimedOut) => warn!(
                    retry_in_ms = self.protocol.startup_retry_delay_ms,
                    "startup announcement unanswered"
                ),
                Err(e) => warn!(
                    error = %e,
                    retry_in_ms = self.protocol.startup_retry_delay_ms,
                    "startup announcement failed"
                ),
            }
            self.clock.sleep(self.protocol.startup_retry_delay_ms).await;
        }
    }

    /// Subscribe to the four inbound topics
    pub(crate) async fn subscribe_inbound(&mut self) {
        for topic in self.inbound.all() {
            if let Err(e) = self.transport.subscribe(topic).await {
                warn!(topic = %topic, error = %e, "inbound subscription failed");
            }
        }
        self.inbound_subscribed = true;
    }

    async fn properties_phase(&mut self) {
        for id in self.registry.ids() {
            self.phase = Phase::PublishingChannelProperties(id);
            while let Attempt::Retry = self.properties_attempt(id).await {}
        }
        info!("channel properties published");
    }

    async fn properties_attempt(&mut self, id: ChannelId) -> Attempt {
        let Some(channel) = self.registry.get(id) else {
            return Attempt::Done(None);
        };
        let payload = ChannelPropertiesRequest {
            node_id: self.identity.id.clone(),
            channel: channel.properties(),
        };
        self.channel_exchange(id, Operation::SetChannelProperties, payload)
            .await
    }

    /// Fetch and apply the configuration of every channel, in order
    pub(crate) async fn fetch_all_configs(&mut self) {
        for id in self.registry.ids() {
            self.phase = Phase::FetchingChannelConfig(id);
            let response = loop {
                let payload = ChannelConfigRequest {
                    node_id: self.identity.id.clone(),
                    channel_id: id,
                };
                match self
                    .channel_exchange(id, Operation::GetChannelConfiguration, payload)
                    .await
                {
                    Attempt::Done(response) => break response,
                    Attempt::Retry => continue,
                }
            };
            if let Some(response) = response {
                self.apply_fetched_config(id, &response);
            }
        }
    }

    /// One per-channel exchange with the in-place retry policy
    async fn channel_exchange<P: serde::Serialize>(
        &mut self,
        id: ChannelId,
        operation: Operation,
        payload: P,
    ) -> Attempt {
        self.reconnect(self.protocol.connect_backoff_ms).await;

        match self.exchange(operation, payload).await {
            Ok(ExchangeOutcome::Completed(response)) => Attempt::Done(Some(response)),
            Ok(ExchangeOutcome::TimedOut) => {
                warn!(channel_id = id, operation = %operation, "no response, retrying channel");
                Attempt::Retry
            }
            Err(NodeError::Transport(e)) => {
                warn!(
                    channel_id = id,
                    operation = %operation,
                    error = %e,
                    retry_in_ms = self.protocol.connect_backoff_ms,
                    "transport error, retrying channel"
                );
                self.clock.sleep(self.protocol.connect_backoff_ms).await;
                Attempt::Retry
            }
            Err(e) => {
                error!(channel_id = id, operation = %operation, error = %e, "channel skipped");
                Attempt::Done(None)
            }
        }
    }

    fn apply_fetched_config(&mut self, requested: ChannelId, response: &ResponseEnvelope) {
        let topic = self
            .topics
            .response(Operation::GetChannelConfiguration)
            .unwrap_or_default();
        let payload: ChannelConfigPayload = match response.payload_as(&topic) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(channel_id = requested, error = %e, "configuration not understood, keeping previous");
                return;
            }
        };

        match self.registry.apply(&payload, self.clock.now()) {
            Ok(id) => {
                if let Some(channel) = self.registry.get(id) {
                    info!(
                        channel_id = id,
                        publish_topic = %channel.config().publish_topic,
                        sample_rate = channel.config().sample_rate,
                        status = %channel.status(),
                        "channel configured"
                    );
                }
            }
            Err(e) => warn!(
                channel_id = requested,
                reported_channel_id = ?payload.channel_id,
                error = %e,
                "configuration rejected"
            ),
        }
    }

    /// Block until the transport is connected, backing off `backoff_ms`
    /// between attempts. Inbound topics are re-subscribed after a reconnect.
    ///
    /// Returns `true` if a reconnect happened.
    pub(crate) async fn reconnect(&mut self, backoff_ms: u32) -> bool {
        if self.transport.is_connected() {
            return false;
        }

        warn!("transport disconnected, reconnecting");
        loop {
            match self.transport.connect(&self.connect).await {
                Ok(()) => {
                    info!("connection to broker re-established");
                    observability::record_reconnect(true);
                    self.stats.record_reconnect();
                    if self.inbound_subscribed {
                        self.subscribe_inbound().await;
                    }
                    return true;
                }
                Err(e) => {
                    observability::record_reconnect(false);
                    warn!(error = %e, retry_in_ms = backoff_ms, "reconnect failed");
                    self.clock.sleep(backoff_ms).await;
                }
            }
        }
    }
}
