//! 配置解析模块
//!
//! 支持 TOML (主要) 和 JSON (可选) 格式。

use contracts::{ContractError, NodeBlueprint};

/// 配置文件格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// TOML 格式 (推荐)
    Toml,
    /// JSON 格式
    Json,
}

impl ConfigFormat {
    /// 从文件扩展名推断格式
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// 根据格式解析配置
///
/// 未出现的 `protocol` 字段取默认值，校验在解析之后单独进行。
pub fn parse(content: &str, format: ConfigFormat) -> Result<NodeBlueprint, ContractError> {
    let (label, result): (&str, Result<NodeBlueprint, Box<dyn std::error::Error + Send + Sync>>) =
        match format {
            ConfigFormat::Toml => ("TOML", toml::from_str(content).map_err(Into::into)),
            ConfigFormat::Json => ("JSON", serde_json::from_str(content).map_err(Into::into)),
        };
    result.map_err(|e| ContractError::ConfigParse {
        message: format!("{label} parse error: {e}"),
        source: Some(e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_toml_minimal() {
        let content = r#"
[node]
mac = "A4CF12B3D5E6"

[broker]
host = "broker.local"
"#;
        let result = parse(content, ConfigFormat::Toml);
        assert!(result.is_ok(), "Failed: {:?}", result.err());
        let bp = result.unwrap();
        assert_eq!(bp.node.mac, "A4CF12B3D5E6");
        assert_eq!(bp.broker.port, 1883);
        assert_eq!(bp.protocol.namespace, "rtl");
        assert_eq!(bp.protocol.response_timeout_ms, 30_000);
    }

    #[test]
    fn test_parse_toml_protocol_overrides() {
        let content = r#"
[node]
mac = "A4CF12B3D5E6"
name = "boiler"

[broker]
port = 8883
username = "node"
password = "secret"

[protocol]
namespace = "lab"
response_timeout_ms = 5000
"#;
        let bp = parse(content, ConfigFormat::Toml).unwrap();
        assert_eq!(bp.broker.host, "localhost");
        assert_eq!(bp.broker.username.as_deref(), Some("node"));
        assert_eq!(bp.protocol.namespace, "lab");
        assert_eq!(bp.protocol.response_timeout_ms, 5000);
        // 未指定字段取默认值
        assert_eq!(bp.protocol.settle_delay_ms, 1000);
    }

    #[test]
    fn test_parse_json_minimal() {
        let content = r#"{
            "node": { "mac": "A4CF12B3D5E6", "node_type": "esp32" },
            "broker": { "host": "10.0.0.2", "port": 1883 }
        }"#;
        let result = parse(content, ConfigFormat::Json);
        assert!(result.is_ok(), "Failed: {:?}", result.err());
        assert_eq!(result.unwrap().node.node_type, "esp32");
    }

    #[test]
    fn test_parse_toml_syntax_error() {
        let content = "invalid toml [[[";
        let result = parse(content, ConfigFormat::Toml);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, ContractError::ConfigParse { .. }));
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(
            ConfigFormat::from_extension("toml"),
            Some(ConfigFormat::Toml)
        );
        assert_eq!(
            ConfigFormat::from_extension("JSON"),
            Some(ConfigFormat::Json)
        );
        assert_eq!(ConfigFormat::from_extension("yaml"), None);
    }
}
