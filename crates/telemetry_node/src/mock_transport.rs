//! Mock 发布/订阅传输
//!
//! 用于单元测试与端到端测试的 mock 实现：
//! - 共享状态 (`Arc<Mutex<…>>`)，克隆后可在节点持有传输的同时检查发布记录
//! - 支持注入失败场景（缓冲区分配、连接、指定 topic 发布）
//! - 支持脚本化应答器，按 [`ManualClock`] 的时间延迟投递消息
//! - 只投递当前已订阅 topic 的消息，未订阅的到期消息直接丢弃

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use contracts::{Clock, ConnectOptions, InboundMessage, Timestamp, Transport, TransportError};
use tracing::{debug, instrument};

use crate::clock::ManualClock;

/// 应答器：观察每一次发布，返回需要延迟投递的消息
pub trait Responder: Send {
    fn respond(&mut self, topic: &str, payload: &[u8]) -> Vec<ScheduledMessage>;
}

impl<F> Responder for F
where
    F: FnMut(&str, &[u8]) -> Vec<ScheduledMessage> + Send,
{
    fn respond(&mut self, topic: &str, payload: &[u8]) -> Vec<ScheduledMessage> {
        self(topic, payload)
    }
}

/// 延迟投递的消息
#[derive(Debug, Clone)]
pub struct ScheduledMessage {
    /// 相对于发布时刻的延迟 (毫秒)
    pub delay_ms: u32,
    pub message: InboundMessage,
}

impl ScheduledMessage {
    /// `delay_ms` 毫秒后投递
    pub fn after(delay_ms: u32, topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            delay_ms,
            message: InboundMessage::new(topic, payload),
        }
    }

    /// JSON 负载
    pub fn json(delay_ms: u32, topic: impl Into<String>, value: &serde_json::Value) -> Self {
        Self::after(delay_ms, topic, value.to_string())
    }
}

/// Mock 传输配置
#[derive(Debug, Default, Clone)]
pub struct MockConfig {
    /// 缓冲区分配失败
    pub fail_buffer: bool,
    /// 前 N 次连接失败
    pub fail_connects: u32,
    /// 发布到这些 topic 时失败
    pub fail_publish_topics: Vec<String>,
}

/// 已发布的消息
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: Bytes,
    /// 发布时刻
    pub at: Timestamp,
}

impl PublishedMessage {
    /// 按 JSON 解析负载
    pub fn json(&self) -> Option<serde_json::Value> {
        serde_json::from_slice(&self.payload).ok()
    }

    /// 负载文本
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

/// 订阅变更记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionEvent {
    Subscribed(String),
    Unsubscribed(String),
}

struct MockState {
    config: MockConfig,
    buffer_reserved: Option<usize>,
    connected: bool,
    connect_attempts: u32,
    subscriptions: Vec<String>,
    subscription_log: Vec<SubscriptionEvent>,
    published: Vec<PublishedMessage>,
    /// (到期时刻, 消息)
    scheduled: Vec<(Timestamp, InboundMessage)>,
    responder: Option<Box<dyn Responder>>,
}

/// Mock 传输
#[derive(Clone)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
    clock: ManualClock,
}

impl MockTransport {
    /// 创建默认 mock 传输
    pub fn new(clock: ManualClock) -> Self {
        Self::with_config(clock, MockConfig::default())
    }

    /// 使用配置创建 mock 传输
    pub fn with_config(clock: ManualClock, config: MockConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                config,
                buffer_reserved: None,
                connected: false,
                connect_attempts: 0,
                subscriptions: Vec::new(),
                subscription_log: Vec::new(),
                published: Vec::new(),
                scheduled: Vec::new(),
                responder: None,
            })),
            clock,
        }
    }

    /// 设置应答器
    pub fn with_responder(self, responder: impl Responder + 'static) -> Self {
        self.state().responder = Some(Box::new(responder));
        self
    }

    /// 立即投递一条消息（下次 poll 时可见）
    pub fn inject(&self, topic: impl Into<String>, payload: impl Into<Bytes>) {
        self.schedule(ScheduledMessage::after(0, topic, payload));
    }

    /// 按延迟投递一条消息
    pub fn schedule(&self, message: ScheduledMessage) {
        let due = self.clock.now().add_millis(message.delay_ms);
        self.state().scheduled.push((due, message.message));
    }

    /// 模拟断线：连接与订阅全部丢失
    pub fn drop_connection(&self) {
        let mut state = self.state();
        state.connected = false;
        state.subscriptions.clear();
    }

    /// 所有已发布消息
    pub fn published(&self) -> Vec<PublishedMessage> {
        self.state().published.clone()
    }

    /// 发布到指定 topic 的消息
    pub fn published_to(&self, topic: &str) -> Vec<PublishedMessage> {
        self.state()
            .published
            .iter()
            .filter(|m| m.topic == topic)
            .cloned()
            .collect()
    }

    /// 当前订阅
    pub fn subscriptions(&self) -> Vec<String> {
        self.state().subscriptions.clone()
    }

    pub fn is_subscribed(&self, topic: &str) -> bool {
        self.state().subscriptions.iter().any(|t| t == topic)
    }

    /// 订阅变更历史
    pub fn subscription_log(&self) -> Vec<SubscriptionEvent> {
        self.state().subscription_log.clone()
    }

    /// 连接尝试次数（含失败）
    pub fn connect_attempts(&self) -> u32 {
        self.state().connect_attempts
    }

    /// 已预留的缓冲区大小
    pub fn buffer_reserved(&self) -> Option<usize> {
        self.state().buffer_reserved
    }

    /// 尚未投递的消息数
    pub fn pending_deliveries(&self) -> usize {
        self.state().scheduled.len()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        // 测试线程 panic 后仍可读取状态
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// 到期判断，按回绕时间比较
fn is_due(now: Timestamp, due: Timestamp) -> bool {
    now.elapsed_since(due) <= u32::MAX / 2
}

impl Transport for MockTransport {
    fn reserve_buffer(&mut self, bytes: usize) -> Result<(), TransportError> {
        let mut state = self.state();
        if state.config.fail_buffer {
            return Err(TransportError::BufferAllocation { requested: bytes });
        }
        state.buffer_reserved = Some(bytes);
        Ok(())
    }

    #[instrument(name = "mock_transport_connect", skip(self, options), fields(client_id = %options.client_id))]
    async fn connect(&mut self, options: &ConnectOptions) -> Result<(), TransportError> {
        let mut state = self.state();
        state.connect_attempts += 1;
        if state.config.fail_connects > 0 {
            state.config.fail_connects -= 1;
            return Err(TransportError::ConnectFailed {
                message: "mock failure".into(),
            });
        }
        state.connected = true;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.state().connected
    }

    async fn subscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        let mut state = self.state();
        if !state.connected {
            return Err(TransportError::NotConnected);
        }
        if !state.subscriptions.iter().any(|t| t == topic) {
            state.subscriptions.push(topic.to_string());
        }
        state
            .subscription_log
            .push(SubscriptionEvent::Subscribed(topic.to_string()));
        Ok(())
    }

    async fn unsubscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        let mut state = self.state();
        if !state.connected {
            return Err(TransportError::NotConnected);
        }
        state.subscriptions.retain(|t| t != topic);
        state
            .subscription_log
            .push(SubscriptionEvent::Unsubscribed(topic.to_string()));
        Ok(())
    }

    async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), TransportError> {
        let now = self.clock.now();
        let mut state = self.state();
        if !state.connected {
            return Err(TransportError::NotConnected);
        }
        if state.config.fail_publish_topics.iter().any(|t| t == topic) {
            return Err(TransportError::PublishRejected {
                topic: topic.to_string(),
                message: "mock failure".into(),
            });
        }

        state.published.push(PublishedMessage {
            topic: topic.to_string(),
            payload: Bytes::copy_from_slice(payload),
            at: now,
        });

        // 应答器生成的消息按发布时刻排程
        let replies = match state.responder.as_mut() {
            Some(responder) => responder.respond(topic, payload),
            None => Vec::new(),
        };
        for reply in replies {
            let due = now.add_millis(reply.delay_ms);
            state.scheduled.push((due, reply.message));
        }
        Ok(())
    }

    async fn poll(&mut self) -> Result<Vec<InboundMessage>, TransportError> {
        let now = self.clock.now();
        let mut state = self.state();
        if !state.connected {
            return Err(TransportError::NotConnected);
        }

        let (due, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut state.scheduled)
            .into_iter()
            .partition(|(at, _)| is_due(now, *at));
        state.scheduled = pending;

        let mut delivered = Vec::new();
        for (_, message) in due {
            if state.subscriptions.iter().any(|t| *t == message.topic) {
                delivered.push(message);
            } else {
                debug!(topic = %message.topic, "not subscribed, message dropped");
            }
        }
        Ok(delivered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> ConnectOptions {
        ConnectOptions {
            host: "localhost".into(),
            port: 1883,
            client_id: "A4CF12B3D5E6".into(),
            username: None,
            password: None,
            keep_alive_secs: 30,
        }
    }

    #[tokio::test]
    async fn test_delivery_waits_for_clock() {
        let clock = ManualClock::new();
        let mut transport = MockTransport::new(clock.clone());
        transport.connect(&options()).await.unwrap();
        transport.subscribe("a").await.unwrap();

        transport.schedule(ScheduledMessage::after(100, "a", "x"));
        assert!(transport.poll().await.unwrap().is_empty());

        clock.advance(100);
        let messages = transport.poll().await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].topic, "a");
    }

    #[tokio::test]
    async fn test_unsubscribed_messages_dropped() {
        let clock = ManualClock::new();
        let mut transport = MockTransport::new(clock.clone());
        transport.connect(&options()).await.unwrap();
        transport.inject("b", "x");
        assert!(transport.poll().await.unwrap().is_empty());
        assert_eq!(transport.pending_deliveries(), 0);
    }

    #[tokio::test]
    async fn test_responder_schedules_replies() {
        let clock = ManualClock::new();
        let mut transport = MockTransport::new(clock.clone()).with_responder(
            |topic: &str, _payload: &[u8]| {
                vec![ScheduledMessage::after(5, format!("{topic}/reply"), "ok")]
            },
        );
        transport.connect(&options()).await.unwrap();
        transport.subscribe("req/reply").await.unwrap();
        transport.publish("req", b"hi").await.unwrap();

        clock.advance(5);
        let messages = transport.poll().await.unwrap();
        assert_eq!(messages[0].topic, "req/reply");
        assert_eq!(transport.published().len(), 1);
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let clock = ManualClock::new();
        let config = MockConfig {
            fail_buffer: true,
            fail_connects: 1,
            fail_publish_topics: vec!["x".into()],
        };
        let mut transport = MockTransport::with_config(clock, config);

        assert!(transport.reserve_buffer(812).unwrap_err().is_fatal());
        assert!(transport.connect(&options()).await.is_err());
        assert!(transport.connect(&options()).await.is_ok());
        assert!(transport.publish("x", b"1").await.is_err());
        assert_eq!(transport.connect_attempts(), 2);
    }

    #[tokio::test]
    async fn test_drop_connection_clears_subscriptions() {
        let clock = ManualClock::new();
        let mut transport = MockTransport::new(clock);
        transport.connect(&options()).await.unwrap();
        transport.subscribe("a").await.unwrap();

        transport.drop_connection();
        assert!(!transport.is_connected());
        assert!(transport.subscriptions().is_empty());
        assert!(matches!(
            transport.poll().await,
            Err(TransportError::NotConnected)
        ));
    }
}
