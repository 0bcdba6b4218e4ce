//! Measurement channel and its publish scheduler

use std::fmt;

use contracts::limits::{
    ensure_fits, MAX_DESCRIPTION_LEN, MAX_GENERAL_STRING_LEN, MAX_SHORT_STRING_LEN, MAX_TOPIC_LEN,
};
use contracts::{ChannelConfiguration, ChannelId, ChannelProperties, ContractError, Timestamp};
use serde::Serialize;

/// Calibration coefficients handed to the sensor function
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Calibration {
    pub k: f32,
    pub m: f32,
}

/// One sensor read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorReading {
    /// Value to publish, verbatim
    pub value: String,

    /// Publish now, regardless of the sample period
    pub force: bool,
}

impl SensorReading {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            force: false,
        }
    }

    /// A reading that asks to be published out of cadence
    pub fn forced(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            force: true,
        }
    }
}

/// Sensor function supplied by the channel owner
pub type SensorFn = Box<dyn FnMut(Calibration) -> SensorReading + Send>;

/// Channel status label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ChannelStatus {
    Idle,
    Online,
}

impl ChannelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Online => "Online",
        }
    }
}

impl fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Applied channel configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChannelConfig {
    pub publish_topic: String,
    /// Samples per second, 0 = disabled
    pub sample_rate: f32,
    pub k: f32,
    pub m: f32,
    pub unit: String,
    pub description: String,
    pub sensor_id: String,
}

impl ChannelConfig {
    /// Build from the wire shape, enforcing every string bound.
    ///
    /// Absent numbers default to 0 and absent strings to empty; the publish
    /// topic is the only required field.
    pub fn from_wire(wire: &ChannelConfiguration) -> Result<Self, ContractError> {
        let publish_topic = wire
            .publish_topic
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                ContractError::config_validation("PublishTopic", "missing or empty")
            })?;
        ensure_fits("PublishTopic", publish_topic, MAX_TOPIC_LEN)?;

        let unit = wire.unit.clone().unwrap_or_default();
        ensure_fits("Unit", &unit, MAX_SHORT_STRING_LEN)?;

        let description = wire.descriptor.clone().unwrap_or_default();
        ensure_fits("Descriptor", &description, MAX_DESCRIPTION_LEN)?;

        let sensor_id = wire.sensor_id.clone().unwrap_or_default();
        ensure_fits("Sensor_ID", &sensor_id, MAX_SHORT_STRING_LEN)?;

        Ok(Self {
            publish_topic: publish_topic.to_string(),
            sample_rate: wire.sample_rate.unwrap_or(0.0),
            k: wire.k_value.unwrap_or(0.0),
            m: wire.m_value.unwrap_or(0.0),
            unit,
            description,
            sensor_id,
        })
    }
}

/// `0 < rate <= max`; NaN is never in range
fn rate_in_range(rate: f32, max: f32) -> bool {
    rate > 0.0 && rate <= max
}

/// One measurement source
pub struct Channel {
    id: ChannelId,
    channel_type: String,
    max_sample_rate: f32,
    settle_delay_ms: u32,
    config: ChannelConfig,
    activated_at: Timestamp,
    /// Latched once the settle delay has passed since the last activation
    settled: bool,
    /// Start of the current sample period; forced publishes leave it alone
    period_anchor: Option<Timestamp>,
    last_publish: Option<Timestamp>,
    last_value: Option<String>,
    sensor: SensorFn,
}

impl Channel {
    /// Create an unconfigured (idle) channel
    pub fn new(
        id: ChannelId,
        channel_type: &str,
        max_sample_rate: f32,
        settle_delay_ms: u32,
        sensor: SensorFn,
    ) -> Result<Self, ContractError> {
        ensure_fits("channel.type", channel_type, MAX_GENERAL_STRING_LEN)?;
        Ok(Self {
            id,
            channel_type: channel_type.to_string(),
            max_sample_rate,
            settle_delay_ms,
            config: ChannelConfig::default(),
            activated_at: Timestamp::default(),
            settled: false,
            period_anchor: None,
            last_publish: None,
            last_value: None,
            sensor,
        })
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub fn channel_type(&self) -> &str {
        &self.channel_type
    }

    pub fn max_sample_rate(&self) -> f32 {
        self.max_sample_rate
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Active iff the configured rate is within `(0, max]`
    pub fn is_active(&self) -> bool {
        rate_in_range(self.config.sample_rate, self.max_sample_rate)
    }

    pub fn status(&self) -> ChannelStatus {
        if self.is_active() {
            ChannelStatus::Online
        } else {
            ChannelStatus::Idle
        }
    }

    pub fn activated_at(&self) -> Timestamp {
        self.activated_at
    }

    pub fn last_publish(&self) -> Option<Timestamp> {
        self.last_publish
    }

    pub fn last_value(&self) -> Option<&str> {
        self.last_value.as_deref()
    }

    /// Static properties advertised at startup
    pub fn properties(&self) -> ChannelProperties {
        ChannelProperties {
            channel_id: self.id,
            channel_type: self.channel_type.clone(),
            max_sample_rate: self.max_sample_rate,
        }
    }

    /// Replace the configuration.
    ///
    /// A valid configuration is applied wholesale and restarts the settle
    /// delay. Anything else (bad strings, rate outside `(0, max]`) keeps the
    /// previous configuration with its rate forced to 0, which idles the
    /// channel.
    pub fn apply_config(
        &mut self,
        wire: &ChannelConfiguration,
        now: Timestamp,
    ) -> Result<(), ContractError> {
        let result = ChannelConfig::from_wire(wire).and_then(|config| {
            if rate_in_range(config.sample_rate, self.max_sample_rate) {
                Ok(config)
            } else {
                Err(ContractError::config_validation(
                    "SampleRate",
                    format!(
                        "{} is outside (0, {}]",
                        config.sample_rate, self.max_sample_rate
                    ),
                ))
            }
        });

        match result {
            Ok(config) => {
                self.config = config;
                self.activated_at = now;
                self.settled = false;
                Ok(())
            }
            Err(e) => {
                self.config.sample_rate = 0.0;
                Err(e)
            }
        }
    }

    /// Forget the last published value
    pub fn clear_last_value(&mut self) {
        self.last_value = None;
    }

    /// Call the sensor function with the current calibration
    pub fn read_sensor(&mut self) -> SensorReading {
        let calibration = Calibration {
            k: self.config.k,
            m: self.config.m,
        };
        (self.sensor)(calibration)
    }

    /// Scheduling decision for `now`.
    ///
    /// Inactive channels never publish. After the settle delay a channel
    /// publishes once per `1000 / rate` ms measured from its last periodic
    /// publish, or immediately when `forced`, but never twice in the same
    /// millisecond. A forced publish does not move the periodic phase.
    pub fn should_publish_now(&mut self, now: Timestamp, forced: bool) -> bool {
        if !self.is_active() {
            return false;
        }

        if !self.settled {
            if now.elapsed_since(self.activated_at) < self.settle_delay_ms {
                return false;
            }
            self.settled = true;
        }

        if self.last_publish == Some(now) {
            return false;
        }
        forced || self.period_elapsed(now)
    }

    fn period_elapsed(&self, now: Timestamp) -> bool {
        match self.period_anchor {
            None => true,
            Some(anchor) => {
                let period_ms = 1000.0 / self.config.sample_rate;
                now.elapsed_since(anchor) as f32 >= period_ms
            }
        }
    }

    /// Record a successful publish. The periodic phase advances only when
    /// the period had elapsed at `now`.
    pub fn on_publish(&mut self, value: String, now: Timestamp) {
        if self.period_elapsed(now) {
            self.period_anchor = Some(now);
        }
        self.last_publish = Some(now);
        self.last_value = Some(value);
    }

    pub fn snapshot(&self) -> ChannelSnapshot {
        ChannelSnapshot {
            id: self.id,
            channel_type: self.channel_type.clone(),
            max_sample_rate: self.max_sample_rate,
            status: self.status(),
            config: self.config.clone(),
            last_publish_ms: self.last_publish.map(Timestamp::as_millis),
            last_value: self.last_value.clone(),
        }
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.id)
            .field("channel_type", &self.channel_type)
            .field("max_sample_rate", &self.max_sample_rate)
            .field("config", &self.config)
            .field("status", &self.status())
            .field("activated_at", &self.activated_at)
            .field("period_anchor", &self.period_anchor)
            .field("last_publish", &self.last_publish)
            .field("last_value", &self.last_value)
            .finish_non_exhaustive()
    }
}

/// Read-only view of a channel
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelSnapshot {
    pub id: ChannelId,
    pub channel_type: String,
    pub max_sample_rate: f32,
    pub status: ChannelStatus,
    pub config: ChannelConfig,
    pub last_publish_ms: Option<u32>,
    pub last_value: Option<String>,
}
