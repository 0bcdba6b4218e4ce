//! 脚本化后端
//!
//! 作为 [`MockTransport`](crate::mock_transport::MockTransport) 的应答器，
//! 模拟 dataaccess 服务：
//! - 解析 `req/<ns>/dataaccess/<op>` 请求并记录
//! - 在请求指定的 ResponseTopic 上回复，回显 CorrelationData
//! - 可配置：应答延迟、先回 `Processing`、忽略前 N 次请求、自定义状态

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use contracts::{
    ChannelConfiguration, ChannelId, CmdStatus, Operation, RequestEnvelope, ResponseEnvelope,
};
use serde_json::{json, Value};
use tracing::debug;

use crate::mock_transport::{Responder, ScheduledMessage};

/// 收到的请求
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub operation: Operation,
    pub correlation_data: String,
    pub payload: Value,
}

/// 请求记录（可克隆，后端移交给传输后仍可检查）
#[derive(Debug, Clone, Default)]
pub struct RequestLog {
    inner: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl RequestLog {
    fn lock(&self) -> MutexGuard<'_, Vec<RecordedRequest>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, request: RecordedRequest) {
        self.lock().push(request);
    }

    /// 所有请求
    pub fn all(&self) -> Vec<RecordedRequest> {
        self.lock().clone()
    }

    /// 请求操作序列
    pub fn operations(&self) -> Vec<Operation> {
        self.lock().iter().map(|r| r.operation).collect()
    }

    /// 某操作的请求次数
    pub fn count(&self, operation: Operation) -> usize {
        self.lock()
            .iter()
            .filter(|r| r.operation == operation)
            .count()
    }

    /// 某操作的请求负载
    pub fn payloads(&self, operation: Operation) -> Vec<Value> {
        self.lock()
            .iter()
            .filter(|r| r.operation == operation)
            .map(|r| r.payload.clone())
            .collect()
    }
}

/// 脚本化后端
#[derive(Debug, Clone)]
pub struct ScriptedBackend {
    request_prefix: String,
    /// 各通道配置
    configs: HashMap<ChannelId, ChannelConfiguration>,
    /// 覆盖整个 getchannelconfiguration 响应 Payload
    raw_config_payloads: HashMap<ChannelId, Value>,
    /// 最终应答延迟 (毫秒)
    reply_delay_ms: u32,
    /// 先回 Processing 的延迟
    processing_delay_ms: Option<u32>,
    /// 忽略前 N 次请求
    ignore_first: HashMap<Operation, u32>,
    /// 永不应答
    silent: Vec<Operation>,
    /// 自定义最终状态
    statuses: HashMap<Operation, (String, String)>,
    log: RequestLog,
}

impl ScriptedBackend {
    /// 创建后端，`namespace` 与节点协议命名空间一致
    pub fn new(namespace: &str) -> Self {
        Self {
            request_prefix: format!("req/{namespace}/dataaccess/"),
            configs: HashMap::new(),
            raw_config_payloads: HashMap::new(),
            reply_delay_ms: 20,
            processing_delay_ms: None,
            ignore_first: HashMap::new(),
            silent: Vec::new(),
            statuses: HashMap::new(),
            log: RequestLog::default(),
        }
    }

    /// 设置通道配置
    pub fn with_channel_config(mut self, id: ChannelId, config: ChannelConfiguration) -> Self {
        self.configs.insert(id, config);
        self
    }

    /// 直接指定 getchannelconfiguration 的响应 Payload
    pub fn with_raw_config_payload(mut self, id: ChannelId, payload: Value) -> Self {
        self.raw_config_payloads.insert(id, payload);
        self
    }

    /// 最终应答延迟
    pub fn with_reply_delay(mut self, delay_ms: u32) -> Self {
        self.reply_delay_ms = delay_ms;
        self
    }

    /// 先在 `delay_ms` 回 `Processing`，最终应答延迟不变
    pub fn with_processing(mut self, delay_ms: u32) -> Self {
        self.processing_delay_ms = Some(delay_ms);
        self
    }

    /// 忽略某操作的前 `n` 次请求
    pub fn ignore_first(mut self, operation: Operation, n: u32) -> Self {
        self.ignore_first.insert(operation, n);
        self
    }

    /// 某操作永不应答
    pub fn silent(mut self, operation: Operation) -> Self {
        self.silent.push(operation);
        self
    }

    /// 某操作以指定状态应答
    pub fn with_status(
        mut self,
        operation: Operation,
        status: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        self.statuses
            .insert(operation, (status.into(), text.into()));
        self
    }

    /// 请求记录句柄
    pub fn requests(&self) -> RequestLog {
        self.log.clone()
    }

    fn should_answer(&mut self, operation: Operation) -> bool {
        if self.silent.contains(&operation) {
            return false;
        }
        match self.ignore_first.get_mut(&operation) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                false
            }
            _ => true,
        }
    }

    fn response_payload(&self, operation: Operation, request: &Value) -> Value {
        if operation != Operation::GetChannelConfiguration {
            return Value::Null;
        }
        let Some(id) = request["ChannelId"]
            .as_u64()
            .and_then(|id| ChannelId::try_from(id).ok())
        else {
            return Value::Null;
        };
        if let Some(raw) = self.raw_config_payloads.get(&id) {
            return raw.clone();
        }
        json!({
            "ChannelId": id,
            "Configuration": self.configs.get(&id),
        })
    }
}

impl Responder for ScriptedBackend {
    fn respond(&mut self, topic: &str, payload: &[u8]) -> Vec<ScheduledMessage> {
        let Some(operation) = topic
            .strip_prefix(&self.request_prefix)
            .and_then(Operation::from_wire)
        else {
            return Vec::new();
        };
        let Ok(request) = serde_json::from_slice::<RequestEnvelope<Value>>(payload) else {
            debug!(topic, "backend could not parse request");
            return Vec::new();
        };

        self.log.push(RecordedRequest {
            operation,
            correlation_data: request.correlation_data.clone(),
            payload: request.payload.clone(),
        });

        if !self.should_answer(operation) {
            return Vec::new();
        }

        let mut replies = Vec::new();
        if let Some(delay) = self.processing_delay_ms {
            let processing = ResponseEnvelope {
                correlation_data: Some(request.correlation_data.clone()),
                cmd_status: Some(CmdStatus::Processing),
                cmd_status_text: Some(String::new()),
                payload: Value::Null,
            };
            replies.push(envelope_message(delay, &request.response_topic, &processing));
        }

        let (status, text) = self
            .statuses
            .get(&operation)
            .cloned()
            .unwrap_or_else(|| ("Done".to_string(), String::new()));
        let fin = ResponseEnvelope {
            correlation_data: Some(request.correlation_data.clone()),
            cmd_status: Some(CmdStatus::from(status)),
            cmd_status_text: Some(text),
            payload: self.response_payload(operation, &request.payload),
        };
        replies.push(envelope_message(
            self.reply_delay_ms,
            &request.response_topic,
            &fin,
        ));
        replies
    }
}

fn envelope_message(delay_ms: u32, topic: &str, envelope: &ResponseEnvelope) -> ScheduledMessage {
    let value = serde_json::to_value(envelope).unwrap_or(Value::Null);
    ScheduledMessage::json(delay_ms, topic, &value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(op: &str, payload: Value) -> (String, Vec<u8>) {
        let body = json!({
            "ResponseTopic": format!("res/rtl/abc/{op}"),
            "CorrelationData": "tok",
            "Payload": payload,
        });
        (
            format!("req/rtl/dataaccess/{op}"),
            serde_json::to_vec(&body).unwrap(),
        )
    }

    #[test]
    fn test_config_reply_echoes_correlation() {
        let mut backend = ScriptedBackend::new("rtl").with_channel_config(
            1,
            ChannelConfiguration {
                publish_topic: Some("plant/t".into()),
                sample_rate: Some(5.0),
                ..Default::default()
            },
        );
        let (topic, body) = request(
            "getchannelconfiguration",
            json!({ "NodeId": "ABC", "ChannelId": 1 }),
        );
        let replies = backend.respond(&topic, &body);

        assert_eq!(replies.len(), 1);
        let reply = &replies[0];
        assert_eq!(reply.message.topic, "res/rtl/abc/getchannelconfiguration");
        let value: Value = serde_json::from_slice(&reply.message.payload).unwrap();
        assert_eq!(value["CorrelationData"], "tok");
        assert_eq!(value["CmdStatus"], "Done");
        assert_eq!(value["Payload"]["Configuration"]["PublishTopic"], "plant/t");
        assert_eq!(backend.requests().count(Operation::GetChannelConfiguration), 1);
    }

    #[test]
    fn test_processing_then_done() {
        let mut backend = ScriptedBackend::new("rtl")
            .with_processing(100)
            .with_reply_delay(400);
        let (topic, body) = request("setnodestartupinfo", json!({ "NodeId": "ABC" }));
        let replies = backend.respond(&topic, &body);
        let delays: Vec<_> = replies.iter().map(|r| r.delay_ms).collect();
        assert_eq!(delays, vec![100, 400]);
    }

    #[test]
    fn test_ignore_first() {
        let mut backend =
            ScriptedBackend::new("rtl").ignore_first(Operation::SetChannelProperties, 1);
        let (topic, body) = request("setchannelproperties", json!({}));
        assert!(backend.respond(&topic, &body).is_empty());
        assert_eq!(backend.respond(&topic, &body).len(), 1);
    }

    #[test]
    fn test_foreign_topics_ignored() {
        let mut backend = ScriptedBackend::new("rtl");
        assert!(backend.respond("plant/t", b"21.5").is_empty());
        assert!(backend.requests().all().is_empty());
    }
}
