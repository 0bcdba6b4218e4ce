//! 配置校验模块
//!
//! 校验规则：
//! - mac 非空、字母数字、长度不超过 12
//! - name / node_type 不超过通用字符串上限
//! - namespace 合法且派生出的 topic 不超长
//! - 所有时间参数 > 0，poll 间隔小于响应超时 (`ProtocolConfig::validate`)
//! - buffer_size 能容纳最大 payload

use contracts::limits::{ensure_fits, MAX_GENERAL_STRING_LEN};
use contracts::{ContractError, NodeBlueprint, NodeId, TopicScheme};

/// 校验 NodeBlueprint 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(blueprint: &NodeBlueprint) -> Result<(), ContractError> {
    validate_identity(blueprint)?;
    validate_broker(blueprint)?;
    validate_protocol(blueprint)?;
    Ok(())
}

/// 校验节点身份
fn validate_identity(blueprint: &NodeBlueprint) -> Result<(), ContractError> {
    let id = NodeId::new(&blueprint.node.mac);
    id.validate()?;
    ensure_fits("node.name", &blueprint.node.name, MAX_GENERAL_STRING_LEN)?;
    ensure_fits(
        "node.node_type",
        &blueprint.node.node_type,
        MAX_GENERAL_STRING_LEN,
    )?;
    Ok(())
}

/// 校验 broker 配置
fn validate_broker(blueprint: &NodeBlueprint) -> Result<(), ContractError> {
    let broker = &blueprint.broker;
    if broker.host.is_empty() {
        return Err(ContractError::config_validation(
            "broker.host",
            "broker host cannot be empty",
        ));
    }
    if broker.port == 0 {
        return Err(ContractError::config_validation(
            "broker.port",
            "broker port must be > 0",
        ));
    }
    if broker.password.is_some() && broker.username.is_none() {
        return Err(ContractError::config_validation(
            "broker.password",
            "password given without username",
        ));
    }
    Ok(())
}

/// 校验协议参数
fn validate_protocol(blueprint: &NodeBlueprint) -> Result<(), ContractError> {
    let protocol = &blueprint.protocol;

    // namespace 与 topic 长度
    TopicScheme::new(&protocol.namespace, &NodeId::new(&blueprint.node.mac))?;

    protocol.validate()
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{BrokerConfig, ConfigVersion, NodeConfig, ProtocolConfig};

    fn sample_blueprint() -> NodeBlueprint {
        NodeBlueprint {
            version: ConfigVersion::V1,
            node: NodeConfig {
                mac: "A4CF12B3D5E6".into(),
                name: "boiler".into(),
                node_type: "esp32".into(),
            },
            broker: BrokerConfig {
                host: "localhost".into(),
                port: 1883,
                username: None,
                password: None,
                keep_alive_secs: 30,
            },
            protocol: ProtocolConfig::default(),
        }
    }

    #[test]
    fn test_valid_blueprint() {
        assert!(validate(&sample_blueprint()).is_ok());
    }

    #[test]
    fn test_bad_mac() {
        let mut bp = sample_blueprint();
        bp.node.mac = "A4:CF:12".into();
        let err = validate(&bp).unwrap_err();
        assert!(err.to_string().contains("node.mac"));
    }

    #[test]
    fn test_name_too_long() {
        let mut bp = sample_blueprint();
        bp.node.name = "a-very-long-node-name-indeed".into();
        let err = validate(&bp).unwrap_err();
        assert!(matches!(err, ContractError::LengthExceeded { .. }));
    }

    #[test]
    fn test_zero_timeout() {
        let mut bp = sample_blueprint();
        bp.protocol.response_timeout_ms = 0;
        let err = validate(&bp).unwrap_err();
        assert!(err.to_string().contains("response_timeout_ms"));
    }

    #[test]
    fn test_small_buffer() {
        let mut bp = sample_blueprint();
        bp.protocol.buffer_size = 256;
        assert!(validate(&bp).is_err());
    }

    #[test]
    fn test_password_without_username() {
        let mut bp = sample_blueprint();
        bp.broker.password = Some("secret".into());
        assert!(validate(&bp).is_err());
    }
}
