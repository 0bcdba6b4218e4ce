//! Correlation exchange
//!
//! One request/response round trip with the backend: subscribe to the
//! response topic, publish `{ResponseTopic, CorrelationData, Payload}`, then
//! drain the transport until a final response arrives on exactly that topic
//! or the deadline passes. A `Processing` status does not move the deadline.
//!
//! Only one exchange can be outstanding; [`ExchangeSlot`] holds it.

use contracts::{
    encode_payload, Clock, CmdStatus, Operation, RequestEnvelope, ResponseEnvelope, Timestamp,
    Transport, TransportError,
};
use observability::{record_exchange, record_exchange_latency_ms, ExchangeOutcomeKind};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::error::{NodeError, Result};
use crate::node::Node;

/// The outstanding exchange
#[derive(Debug, Clone)]
pub struct Exchange {
    pub operation: Operation,
    pub token: String,
    pub response_topic: String,
    pub issued_at: Timestamp,
    pub timeout_ms: u32,
    /// A `Processing` acknowledgement has been seen
    pub processing: bool,
    response: Option<ResponseEnvelope>,
}

impl Exchange {
    /// Whether `timeout_ms` has elapsed at `now`
    pub fn is_expired(&self, now: Timestamp) -> bool {
        now.elapsed_since(self.issued_at) >= self.timeout_ms
    }
}

/// How an exchange ended
#[derive(Debug, Clone)]
pub enum ExchangeOutcome {
    /// A final response arrived
    Completed(ResponseEnvelope),
    /// Nothing final arrived before the deadline
    TimedOut,
}

impl ExchangeOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    pub fn response(&self) -> Option<&ResponseEnvelope> {
        match self {
            Self::Completed(response) => Some(response),
            Self::TimedOut => None,
        }
    }

    fn kind(&self) -> ExchangeOutcomeKind {
        match self {
            Self::Completed(r) if r.is_done() => ExchangeOutcomeKind::Done,
            Self::Completed(_) => ExchangeOutcomeKind::Rejected,
            Self::TimedOut => ExchangeOutcomeKind::TimedOut,
        }
    }
}

/// Single mutable slot for the outstanding exchange
#[derive(Debug, Default)]
pub struct ExchangeSlot {
    current: Option<Exchange>,
}

impl ExchangeSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&Exchange> {
        self.current.as_ref()
    }

    pub fn is_open(&self) -> bool {
        self.current.is_some()
    }

    /// Response topic of the outstanding exchange
    pub fn response_topic(&self) -> Option<&str> {
        self.current.as_ref().map(|e| e.response_topic.as_str())
    }

    /// Occupy the slot. Fails if another exchange is outstanding.
    pub fn open(
        &mut self,
        operation: Operation,
        token: String,
        response_topic: String,
        now: Timestamp,
        timeout_ms: u32,
    ) -> Result<&Exchange> {
        if let Some(outstanding) = &self.current {
            return Err(NodeError::exchange_busy(operation, outstanding.operation));
        }
        Ok(self.current.insert(Exchange {
            operation,
            token,
            response_topic,
            issued_at: now,
            timeout_ms,
            processing: false,
            response: None,
        }))
    }

    /// Offer a response received on `topic`.
    ///
    /// Returns `false` when no exchange is waiting on that exact topic.
    /// The first final response wins; later ones are ignored.
    pub fn offer(&mut self, topic: &str, response: ResponseEnvelope) -> bool {
        let Some(exchange) = self.current.as_mut() else {
            return false;
        };
        if exchange.response_topic != topic {
            return false;
        }

        if let Some(token) = response.correlation_data.as_deref() {
            if token != exchange.token {
                debug!(
                    operation = %exchange.operation,
                    expected = %exchange.token,
                    received = %token,
                    "correlation data mismatch, accepting by topic"
                );
            }
        }

        if response.is_processing() {
            debug!(operation = %exchange.operation, "backend is processing");
            exchange.processing = true;
        } else if exchange.response.is_none() {
            exchange.response = Some(response);
        }
        true
    }

    /// Take the outcome if the exchange has finished at `now`
    pub fn resolve(&mut self, now: Timestamp) -> Option<(Exchange, ExchangeOutcome)> {
        let exchange = self.current.as_mut()?;
        if let Some(response) = exchange.response.take() {
            let exchange = self.current.take()?;
            return Some((exchange, ExchangeOutcome::Completed(response)));
        }
        if exchange.is_expired(now) {
            let exchange = self.current.take()?;
            return Some((exchange, ExchangeOutcome::TimedOut));
        }
        None
    }

    /// Drop the outstanding exchange without an outcome
    pub fn abandon(&mut self) -> Option<Exchange> {
        self.current.take()
    }
}

impl<T: Transport, C: Clock> Node<T, C> {
    /// Run one correlation exchange to completion or timeout.
    ///
    /// The response topic is unsubscribed on every exit path. Messages on
    /// other topics that arrive during the wait are dispatched normally.
    #[instrument(name = "node_exchange", skip(self, payload), fields(operation = %operation))]
    pub async fn exchange<P: Serialize>(
        &mut self,
        operation: Operation,
        payload: P,
    ) -> Result<ExchangeOutcome> {
        if let Some(outstanding) = self.slot.current() {
            return Err(NodeError::exchange_busy(operation, outstanding.operation));
        }
        if !self.transport.is_connected() {
            return Err(TransportError::NotConnected.into());
        }

        let request_topic = self.topics.request(operation)?;
        let response_topic = self.topics.response(operation)?;
        let token = self.tokens.next_token();
        let request = encode_payload(&RequestEnvelope {
            response_topic: response_topic.clone(),
            correlation_data: token.clone(),
            payload,
        })?;

        self.transport.subscribe(&response_topic).await?;
        let issued_at = self.clock.now();
        self.slot.open(
            operation,
            token,
            response_topic.clone(),
            issued_at,
            self.protocol.response_timeout_ms,
        )?;

        let result = match self.transport.publish(&request_topic, &request).await {
            Ok(()) => self.await_response().await,
            Err(e) => {
                self.slot.abandon();
                Err(e.into())
            }
        };

        if let Err(e) = self.transport.unsubscribe(&response_topic).await {
            warn!(topic = %response_topic, error = %e, "failed to unsubscribe response topic");
        }

        if let Ok(outcome) = &result {
            let kind = outcome.kind();
            record_exchange(operation, kind);
            let latency = match outcome {
                ExchangeOutcome::Completed(_) => {
                    let ms = self.clock.now().elapsed_since(issued_at);
                    record_exchange_latency_ms(operation, ms);
                    Some(ms)
                }
                ExchangeOutcome::TimedOut => None,
            };
            self.stats.record_exchange(kind, latency);
            log_outcome(operation, outcome);
        }

        result
    }

    /// Drain and sleep until the slot resolves
    async fn await_response(&mut self) -> Result<ExchangeOutcome> {
        loop {
            if let Err(e) = self.drain_inbound().await {
                self.slot.abandon();
                return Err(e.into());
            }
            if let Some((_, outcome)) = self.slot.resolve(self.clock.now()) {
                return Ok(outcome);
            }
            self.clock.sleep(self.protocol.poll_interval_ms).await;
        }
    }
}

fn log_outcome(operation: Operation, outcome: &ExchangeOutcome) {
    match outcome {
        ExchangeOutcome::Completed(response) => match &response.cmd_status {
            Some(CmdStatus::Done) => info!(operation = %operation, "exchange completed"),
            status => warn!(
                operation = %operation,
                status = ?status,
                text = response.cmd_status_text.as_deref().unwrap_or(""),
                "exchange completed without Done status"
            ),
        },
        ExchangeOutcome::TimedOut => warn!(operation = %operation, "exchange timed out"),
    }
}
