//! # Config Loader
//!
//! Configuration loading and parsing module.
//!
//! Responsibilities:
//! - Parse TOML/JSON configuration files
//! - Validate configuration legality
//! - Generate `NodeBlueprint`
//!
//! # Example
//!
//! ```no_run
//! use config_loader::ConfigLoader;
//! use std::path::Path;
//!
//! let blueprint = ConfigLoader::load_from_path(Path::new("node.toml")).unwrap();
//! println!("Node: {}", blueprint.node.mac);
//! ```

mod parser;
mod validator;

pub use contracts::NodeBlueprint;
pub use parser::ConfigFormat;

use contracts::ContractError;
use std::path::Path;

/// Configuration loader
///
/// Provides static methods to load configuration from files or strings.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from file path
    ///
    /// Automatically detects format from file extension (.toml / .json).
    ///
    /// # Errors
    /// - File read failure
    /// - Unsupported format
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_path(path: &Path) -> Result<NodeBlueprint, ContractError> {
        let format = Self::detect_format(path)?;
        let content = Self::read_file(path)?;
        Self::load_from_str(&content, format)
    }

    /// Load configuration from string
    ///
    /// # Errors
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_str(
        content: &str,
        format: ConfigFormat,
    ) -> Result<NodeBlueprint, ContractError> {
        Self::parse_and_validate(content, format)
    }

    /// Load a file, then let `NODE_BROKER_*` environment variables override
    /// the broker section so credentials can stay out of the file.
    ///
    /// Validation runs after the overrides are applied.
    pub fn load_from_path_with_env(path: &Path) -> Result<NodeBlueprint, ContractError> {
        let format = Self::detect_format(path)?;
        let content = Self::read_file(path)?;
        let mut blueprint = parser::parse(&content, format)?;
        apply_broker_overrides(&mut blueprint, |key| std::env::var(key).ok())?;
        validator::validate(&blueprint)?;
        Ok(blueprint)
    }

    /// Serialize NodeBlueprint to TOML string
    pub fn to_toml(blueprint: &NodeBlueprint) -> Result<String, ContractError> {
        toml::to_string_pretty(blueprint)
            .map_err(|e| ContractError::config_parse(format!("TOML serialize error: {e}")))
    }

    /// Serialize NodeBlueprint to JSON string
    pub fn to_json(blueprint: &NodeBlueprint) -> Result<String, ContractError> {
        serde_json::to_string_pretty(blueprint)
            .map_err(|e| ContractError::config_parse(format!("JSON serialize error: {e}")))
    }
}

impl ConfigLoader {
    /// Infer configuration format from file extension
    fn detect_format(path: &Path) -> Result<ConfigFormat, ContractError> {
        let ext = path.extension().and_then(|e| e.to_str()).ok_or_else(|| {
            ContractError::config_parse("cannot determine file format from extension")
        })?;

        ConfigFormat::from_extension(ext).ok_or_else(|| {
            ContractError::config_parse(format!("unsupported config format: .{ext}"))
        })
    }

    /// Read configuration file content
    fn read_file(path: &Path) -> Result<String, ContractError> {
        Ok(std::fs::read_to_string(path)?)
    }

    /// Parse and validate configuration content
    fn parse_and_validate(
        content: &str,
        format: ConfigFormat,
    ) -> Result<NodeBlueprint, ContractError> {
        let blueprint = parser::parse(content, format)?;
        validator::validate(&blueprint)?;
        Ok(blueprint)
    }
}

/// Override broker fields from `lookup`.
///
/// Recognised keys: `NODE_BROKER_HOST`, `NODE_BROKER_PORT`,
/// `NODE_BROKER_USERNAME`, `NODE_BROKER_PASSWORD`.
fn apply_broker_overrides(
    blueprint: &mut NodeBlueprint,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(), ContractError> {
    let broker = &mut blueprint.broker;
    if let Some(host) = lookup("NODE_BROKER_HOST") {
        broker.host = host;
    }
    if let Some(port) = lookup("NODE_BROKER_PORT") {
        broker.port = port.parse().map_err(|_| {
            ContractError::config_validation("NODE_BROKER_PORT", format!("not a port: {port}"))
        })?;
    }
    if let Some(username) = lookup("NODE_BROKER_USERNAME") {
        broker.username = Some(username);
    }
    if let Some(password) = lookup("NODE_BROKER_PASSWORD") {
        broker.password = Some(password);
    }
    Ok(())
}
