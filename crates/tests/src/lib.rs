//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 合约快照测试（wire 字段名、topic 格式）
//! - 模拟 e2e 测试（MockTransport + ScriptedBackend + ManualClock，无需 broker）

#[cfg(test)]
mod contract_tests {
    use contracts::{
        ChannelConfigPayload, CmdStatus, NodeId, Operation, ResponseEnvelope, StartupInfo,
        TopicScheme,
    };
    use serde_json::json;

    #[test]
    fn test_startup_info_field_names() {
        let info = StartupInfo {
            node_id: NodeId::new("A4CF12B3D5E6"),
            node_type: "esp32".to_string(),
        };
        let value = serde_json::to_value(&info).unwrap();
        assert_eq!(value, json!({ "NodeId": "A4CF12B3D5E6", "Type": "esp32" }));
    }

    #[test]
    fn test_topic_scheme_snapshot() {
        let scheme = TopicScheme::new("rtl", &NodeId::new("A4CF12B3D5E6")).unwrap();
        assert_eq!(
            scheme.request(Operation::GetChannelConfiguration).unwrap(),
            "req/rtl/dataaccess/getchannelconfiguration"
        );
        assert_eq!(
            scheme.response(Operation::SetNodeStartupInfo).unwrap(),
            "res/rtl/a4cf12b3d5e6/setnodestartupinfo"
        );

        let inbound = scheme.inbound().unwrap();
        assert_eq!(
            inbound.all(),
            [
                "req/rtl/logger/identificationpoll",
                "req/rtl/a4cf12b3d5e6/identificationassignment",
                "req/rtl/a4cf12b3d5e6/setchannelconfiguration",
                "not/A4CF12B3D5E6/configuration",
            ]
        );
    }

    #[test]
    fn test_response_envelope_is_lenient() {
        let response: ResponseEnvelope = serde_json::from_value(json!({
            "CorrelationData": "tok",
            "CmdStatus": "Busy",
        }))
        .unwrap();
        assert_eq!(response.cmd_status, Some(CmdStatus::Failed("Busy".into())));
        assert!(response.payload.is_null());

        let config: ChannelConfigPayload = serde_json::from_value(json!({
            "ChannelId": 2,
            "Configuration": { "PublishTopic": "", "kValue": 2.0 }
        }))
        .unwrap();
        assert_eq!(config.channel_id, Some(2));
        assert_eq!(config.publish_topic(), None);
    }
}

#[cfg(test)]
mod e2e_tests {
    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::{ChannelConfiguration, NodeSettings, Operation};
    use serde_json::json;
    use telemetry_node::{
        ChannelStatus, Clock, ExchangeOutcome, ManualClock, MockTransport, Node, Phase,
        ScriptedBackend, SensorReading, TokenGenerator,
    };

    const MAC: &str = "A4CF12B3D5E6";

    fn config(topic: &str, rate: f32) -> ChannelConfiguration {
        ChannelConfiguration {
            publish_topic: Some(topic.to_string()),
            sample_rate: Some(rate),
            k_value: Some(1.0),
            m_value: Some(0.0),
            unit: Some("C".to_string()),
            descriptor: Some("boiler outlet".to_string()),
            sensor_id: Some("T1".to_string()),
        }
    }

    fn node_with(
        settings: NodeSettings,
        backend: ScriptedBackend,
    ) -> (Node<MockTransport, ManualClock>, ManualClock) {
        let clock = ManualClock::new();
        let transport = MockTransport::new(clock.clone()).with_responder(backend);
        let node = Node::new(settings, transport, clock.clone()).unwrap();
        (node, clock)
    }

    /// 两个通道：一个配置为 5 Hz，一个配置为 0 Hz
    #[tokio::test]
    async fn test_two_channels_only_active_one_publishes() {
        let backend = ScriptedBackend::new("rtl")
            .with_channel_config(1, config("plant/temp", 5.0))
            .with_channel_config(2, config("plant/flow", 0.0));
        let requests = backend.requests();
        let (mut node, clock) = node_with(NodeSettings::new(MAC).with_name("boiler"), backend);

        node.add_channel("temperature", 10.0, |cal| {
            SensorReading::new(format!("{:.1}", cal.k * 21.5 + cal.m))
        })
        .unwrap();
        node.add_channel("flow", 1.0, |_| SensorReading::new("3")).unwrap();

        node.start().await.unwrap();
        assert_eq!(node.phase(), Phase::Ready);
        assert_eq!(
            requests.operations(),
            vec![
                Operation::SetNodeStartupInfo,
                Operation::SetChannelProperties,
                Operation::SetChannelProperties,
                Operation::GetChannelConfiguration,
                Operation::GetChannelConfiguration,
            ]
        );
        assert_eq!(node.channel(1).unwrap().status(), ChannelStatus::Online);
        assert_eq!(node.channel(2).unwrap().status(), ChannelStatus::Idle);

        clock.advance(1_000);
        for _ in 0..5 {
            node.tick().await.unwrap();
            clock.advance(200);
        }

        let temps: Vec<_> = node
            .transport()
            .published_to("plant/temp")
            .iter()
            .map(|m| m.text())
            .collect();
        assert_eq!(temps.len(), 5);
        assert!(temps.iter().all(|v| v == "21.5"));
        assert!(node.transport().published_to("plant/flow").is_empty());
    }

    #[tokio::test]
    async fn test_processing_then_done_completes_with_final_payload() {
        let backend = ScriptedBackend::new("rtl")
            .with_processing(100)
            .with_reply_delay(400);
        let (mut node, clock) = node_with(NodeSettings::new(MAC), backend);
        node.start().await.unwrap();

        let issued = clock.now();
        let outcome = node
            .exchange(
                Operation::SetNodeStartupInfo,
                json!({ "NodeId": MAC, "Type": "" }),
            )
            .await
            .unwrap();

        let elapsed = clock.now().elapsed_since(issued);
        assert!((400..500).contains(&elapsed), "elapsed {elapsed}");
        let response = outcome.response().unwrap();
        assert!(response.is_done());
        assert!(!node
            .transport()
            .is_subscribed("res/rtl/a4cf12b3d5e6/setnodestartupinfo"));
    }

    #[tokio::test]
    async fn test_seeded_tokens_are_sent_as_correlation_data() {
        let backend = ScriptedBackend::new("rtl").with_channel_config(1, config("plant/temp", 5.0));
        let requests = backend.requests();
        let (node, _clock) = node_with(NodeSettings::new(MAC), backend);
        let mut node = node.with_token_generator(TokenGenerator::seeded(42));
        node.add_channel("temperature", 10.0, |_| SensorReading::new("1"))
            .unwrap();
        node.start().await.unwrap();

        let mut expected = TokenGenerator::seeded(42);
        let sent: Vec<_> = requests
            .all()
            .into_iter()
            .map(|r| r.correlation_data)
            .collect();
        assert_eq!(sent.len(), 3);
        for token in sent {
            assert_eq!(token, expected.next_token());
        }
    }

    #[tokio::test]
    async fn test_unanswered_exchange_times_out_and_unsubscribes() {
        let backend = ScriptedBackend::new("rtl").silent(Operation::GetChannelConfiguration);
        let (mut node, clock) = node_with(NodeSettings::new(MAC), backend);
        node.start().await.unwrap();

        let issued = clock.now();
        let outcome = node
            .exchange(
                Operation::GetChannelConfiguration,
                json!({ "NodeId": MAC, "ChannelId": 1 }),
            )
            .await
            .unwrap();

        assert!(matches!(outcome, ExchangeOutcome::TimedOut));
        let elapsed = clock.now().elapsed_since(issued);
        assert!((30_000..30_100).contains(&elapsed), "elapsed {elapsed}");
        assert!(!node
            .transport()
            .is_subscribed("res/rtl/a4cf12b3d5e6/getchannelconfiguration"));
        assert_eq!(node.metrics_summary().timed_out, 1);
    }

    #[tokio::test]
    async fn test_config_fetch_timeout_retries_until_answered() {
        let backend = ScriptedBackend::new("rtl")
            .with_channel_config(1, config("plant/temp", 2.0))
            .ignore_first(Operation::GetChannelConfiguration, 1);
        let requests = backend.requests();
        let (mut node, clock) = node_with(NodeSettings::new(MAC), backend);
        node.add_channel("temperature", 10.0, |_| SensorReading::new("1"))
            .unwrap();

        node.start().await.unwrap();

        assert_eq!(requests.count(Operation::GetChannelConfiguration), 2);
        assert!(clock.now().as_millis() >= 30_000);
        assert_eq!(node.channel(1).unwrap().config().publish_topic, "plant/temp");
    }

    #[tokio::test]
    async fn test_config_changed_notification_refetches_every_channel() {
        let backend = ScriptedBackend::new("rtl")
            .with_channel_config(1, config("plant/temp", 5.0))
            .with_channel_config(2, config("plant/flow", 1.0));
        let requests = backend.requests();
        let (mut node, clock) = node_with(NodeSettings::new(MAC), backend);
        node.add_channel("temperature", 10.0, |_| SensorReading::new("1"))
            .unwrap();
        node.add_channel("flow", 10.0, |_| SensorReading::new("2"))
            .unwrap();
        node.start().await.unwrap();

        clock.advance(1_000);
        assert_eq!(node.tick().await.unwrap(), 2);

        node.transport()
            .inject(format!("not/{MAC}/configuration"), &b""[..]);
        node.tick().await.unwrap();

        assert_eq!(requests.count(Operation::GetChannelConfiguration), 4);
        assert_eq!(node.phase(), Phase::Ready);
        assert!(node.channels().all(|c| c.last_value().is_none()));
    }

    #[tokio::test]
    async fn test_reconnect_restores_inbound_subscriptions() {
        let backend = ScriptedBackend::new("rtl").with_channel_config(1, config("plant/temp", 5.0));
        let (mut node, clock) = node_with(NodeSettings::new(MAC), backend);
        node.add_channel("temperature", 10.0, |_| SensorReading::new("1"))
            .unwrap();
        node.start().await.unwrap();
        let attempts = node.transport().connect_attempts();

        node.transport().drop_connection();
        clock.advance(1_000);
        node.tick().await.unwrap();

        assert_eq!(node.transport().connect_attempts(), attempts + 1);
        for topic in node.inbound_topics().all() {
            assert!(node.transport().is_subscribed(topic), "{topic} not restored");
        }
        assert_eq!(node.transport().published_to("plant/temp").len(), 1);
    }

    #[tokio::test]
    async fn test_identification_poll_answered_from_runtime_loop() {
        let (mut node, _clock) = node_with(
            NodeSettings::new(MAC).with_name("boiler"),
            ScriptedBackend::new("rtl"),
        );
        node.start().await.unwrap();

        let poll = json!({
            "ResponseTopic": "res/rtl/logger/identificationpoll",
            "CorrelationData": "poll-1",
            "Payload": null
        });
        node.transport()
            .inject("req/rtl/logger/identificationpoll", poll.to_string());
        node.tick().await.unwrap();

        let replies = node
            .transport()
            .published_to("res/rtl/logger/identificationpoll");
        assert_eq!(replies.len(), 2);
        let done = replies[1].json().unwrap();
        assert_eq!(done["CmdStatus"], "Done");
        assert_eq!(done["CorrelationData"], "poll-1");
        assert_eq!(done["Payload"]["NodeName"], "boiler");
        assert_eq!(done["Payload"]["MAC"], MAC);
    }

    #[tokio::test]
    async fn test_pushed_configuration_moves_channel_topic() {
        let backend = ScriptedBackend::new("rtl").with_channel_config(1, config("plant/temp", 5.0));
        let (mut node, clock) = node_with(NodeSettings::new(MAC), backend);
        node.add_channel("temperature", 10.0, |_| SensorReading::new("7"))
            .unwrap();
        node.start().await.unwrap();

        let push = json!({
            "ResponseTopic": "res/rtl/a4cf12b3d5e6/setchannelconfiguration",
            "CorrelationData": "push-1",
            "Payload": {
                "ChannelId": 1,
                "Configuration": { "PublishTopic": "plant/temp2", "SampleRate": 2.0 }
            }
        });
        node.transport()
            .inject("req/rtl/a4cf12b3d5e6/setchannelconfiguration", push.to_string());
        node.tick().await.unwrap();

        let acks = node
            .transport()
            .published_to("res/rtl/a4cf12b3d5e6/setchannelconfiguration");
        assert_eq!(acks.len(), 2);
        assert_eq!(acks[1].json().unwrap()["CmdStatus"], "Done");

        clock.advance(1_000);
        node.tick().await.unwrap();
        assert!(node.transport().published_to("plant/temp").is_empty());
        assert_eq!(node.transport().published_to("plant/temp2").len(), 1);
    }

    #[tokio::test]
    async fn test_node_built_from_toml_blueprint() {
        let content = r#"
[node]
mac = "A4CF12B3D5E6"
name = "boiler"
node_type = "esp32"

[broker]
host = "broker.local"

[protocol]
namespace = "plant"
settle_delay_ms = 500
"#;
        let blueprint = ConfigLoader::load_from_str(content, ConfigFormat::Toml).unwrap();
        let backend = ScriptedBackend::new("plant").with_channel_config(1, config("plant/t", 5.0));
        let requests = backend.requests();
        let (mut node, clock) = node_with(blueprint.to_node_settings(), backend);
        node.add_channel("temperature", 10.0, |_| SensorReading::new("1"))
            .unwrap();
        node.start().await.unwrap();

        let startup = requests.payloads(Operation::SetNodeStartupInfo);
        assert_eq!(startup, vec![json!({ "NodeId": MAC, "Type": "esp32" })]);
        assert_eq!(node.transport().buffer_reserved(), Some(812));

        clock.advance(500);
        assert_eq!(node.tick().await.unwrap(), 1);
    }
}
