//! Inbound dispatch
//!
//! Routes every inbound message by exact topic equality. Dispatch never
//! fails: malformed payloads and unknown topics are logged and dropped.

use contracts::limits::{ensure_fits, MAX_TOPIC_LEN};
use contracts::{
    decode_payload, encode_payload, ChannelConfigPayload, Clock, CmdStatus, IdentityReply,
    InboundRequest, ReplyEnvelope, ResponseEnvelope, Transport, TransportError,
};
use observability::record_inbound_message;
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use crate::node::Node;

/// Final status for a pushed configuration that could not be applied
const STATUS_INVALID_CONFIGURATION: &str = "InvalidConfiguration";

/// Final status for a node-identity assignment
const STATUS_NOT_SUPPORTED: &str = "NotSupported";

/// Where an inbound topic goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    IdentificationPoll,
    NodeConfigAssignment,
    ChannelConfigAssignment,
    ConfigChanged,
    /// Response to the outstanding exchange
    ExchangeResponse,
    Unknown,
}

impl<T: Transport, C: Clock> Node<T, C> {
    /// Classify `topic` against the registered topic table
    pub fn route(&self, topic: &str) -> Route {
        let inbound = &self.inbound;
        if topic == inbound.identification_poll {
            Route::IdentificationPoll
        } else if topic == inbound.node_config_assignment {
            Route::NodeConfigAssignment
        } else if topic == inbound.channel_config_assignment {
            Route::ChannelConfigAssignment
        } else if topic == inbound.config_changed {
            Route::ConfigChanged
        } else if self.slot.response_topic() == Some(topic) {
            Route::ExchangeResponse
        } else {
            Route::Unknown
        }
    }

    /// Handle one inbound message
    #[instrument(name = "node_dispatch", skip(self, payload), fields(topic = %topic, bytes = payload.len()))]
    pub async fn dispatch(&mut self, topic: &str, payload: &[u8]) {
        let route = self.route(topic);
        record_inbound_message(route != Route::Unknown);

        match route {
            Route::IdentificationPoll => self.on_identification_poll(topic, payload).await,
            Route::NodeConfigAssignment => self.on_node_config_assignment(topic, payload).await,
            Route::ChannelConfigAssignment => {
                self.on_channel_config_assignment(topic, payload).await
            }
            Route::ConfigChanged => {
                info!("configuration changed, reconfiguration scheduled");
                self.reconfigure_pending = true;
            }
            Route::ExchangeResponse => self.on_exchange_response(topic, payload),
            Route::Unknown => debug!("no handler for topic, dropped"),
        }
    }

    /// Poll the transport once and dispatch everything it delivered
    pub(crate) async fn drain_inbound(&mut self) -> Result<usize, TransportError> {
        let messages = self.transport.poll().await?;
        let count = messages.len();
        for message in messages {
            self.dispatch(&message.topic, &message.payload).await;
        }
        Ok(count)
    }

    fn on_exchange_response(&mut self, topic: &str, payload: &[u8]) {
        match decode_payload::<ResponseEnvelope>(topic, payload) {
            Ok(response) => {
                self.slot.offer(topic, response);
            }
            Err(e) => warn!(error = %e, "malformed response dropped"),
        }
    }

    /// Two-step reply: `Processing`, then `Done` with name and MAC
    async fn on_identification_poll(&mut self, topic: &str, payload: &[u8]) {
        let Some((reply_topic, correlation)) = self.reply_route(topic, payload) else {
            return;
        };

        self.reply::<IdentityReply>(&reply_topic, &correlation, CmdStatus::Processing, "", None)
            .await;
        let identity = IdentityReply {
            node_name: self.identity.name.clone(),
            mac: self.identity.id.clone(),
        };
        self.reply(&reply_topic, &correlation, CmdStatus::Done, "", Some(identity))
            .await;
        info!(reply_topic = %reply_topic, "identification poll answered");
    }

    /// Node identity is fixed at construction; the assignment is refused
    async fn on_node_config_assignment(&mut self, topic: &str, payload: &[u8]) {
        warn!("node identity assignment refused, identity is fixed");
        let Some((reply_topic, correlation)) = self.reply_route(topic, payload) else {
            return;
        };
        self.reply::<()>(
            &reply_topic,
            &correlation,
            CmdStatus::Failed(STATUS_NOT_SUPPORTED.to_string()),
            "node identity is fixed",
            None,
        )
        .await;
    }

    /// Apply a pushed channel configuration
    async fn on_channel_config_assignment(&mut self, topic: &str, payload: &[u8]) {
        let request = match decode_payload::<InboundRequest>(topic, payload) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "malformed channel configuration dropped");
                return;
            }
        };

        let config: ChannelConfigPayload = match serde_json::from_value(request.payload.clone()) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %e, "channel configuration payload not understood");
                ChannelConfigPayload::default()
            }
        };

        let now = self.clock.now();
        let applied = self.registry.apply(&config, now);
        match &applied {
            Ok(id) => {
                if let Some(channel) = self.registry.get_mut(*id) {
                    channel.clear_last_value();
                    info!(
                        channel_id = *id,
                        publish_topic = %channel.config().publish_topic,
                        sample_rate = channel.config().sample_rate,
                        status = %channel.status(),
                        "pushed channel configuration applied"
                    );
                }
            }
            Err(e) => warn!(error = %e, "pushed channel configuration rejected"),
        }
        observability::record_active_channels(self.registry.active_count());

        let Some(reply_topic) = request.response_topic.filter(|t| !t.is_empty()) else {
            return;
        };
        if let Err(e) = ensure_fits("ResponseTopic", &reply_topic, MAX_TOPIC_LEN) {
            warn!(error = %e, "reply topic rejected");
            return;
        }
        let correlation = request.correlation_data.unwrap_or_default();

        self.reply::<()>(&reply_topic, &correlation, CmdStatus::Processing, "", None)
            .await;
        match applied {
            Ok(_) => {
                self.reply::<()>(&reply_topic, &correlation, CmdStatus::Done, "", None)
                    .await
            }
            Err(e) => {
                self.reply::<()>(
                    &reply_topic,
                    &correlation,
                    CmdStatus::Failed(STATUS_INVALID_CONFIGURATION.to_string()),
                    &e.to_string(),
                    None,
                )
                .await
            }
        }
    }

    /// Extract `(ResponseTopic, CorrelationData)` from an inbound request
    fn reply_route(&self, topic: &str, payload: &[u8]) -> Option<(String, String)> {
        let request = match decode_payload::<InboundRequest>(topic, payload) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "malformed request dropped");
                return None;
            }
        };

        let Some(reply_topic) = request.response_topic.filter(|t| !t.is_empty()) else {
            warn!("request without ResponseTopic dropped");
            return None;
        };
        if let Err(e) = ensure_fits("ResponseTopic", &reply_topic, MAX_TOPIC_LEN) {
            warn!(error = %e, "reply topic rejected");
            return None;
        }

        Some((reply_topic, request.correlation_data.unwrap_or_default()))
    }

    /// Publish a reply envelope. Failures are logged, never propagated.
    async fn reply<P: Serialize>(
        &mut self,
        topic: &str,
        correlation: &str,
        status: CmdStatus,
        status_text: &str,
        payload: Option<P>,
    ) {
        let envelope = ReplyEnvelope {
            correlation_data: correlation.to_string(),
            cmd_status: status,
            cmd_status_text: status_text.to_string(),
            payload,
        };
        let bytes = match encode_payload(&envelope) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(topic = %topic, error = %e, "reply could not be encoded");
                return;
            }
        };
        if let Err(e) = self.transport.publish(topic, &bytes).await {
            error!(topic = %topic, error = %e, "failed to publish reply");
        }
    }
}
