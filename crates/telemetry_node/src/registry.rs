//! Fixed-capacity channel table

use contracts::limits::MAX_CHANNEL_COUNT;
use contracts::{ChannelConfigPayload, ChannelId, ContractError, Timestamp};

use crate::channel::{Channel, ChannelSnapshot, SensorFn};
use crate::error::{NodeError, Result};

/// Ordered channel table. IDs are assigned 1, 2, 3… in registration order
/// and double as `index + 1`.
#[derive(Debug)]
pub struct ChannelRegistry {
    channels: Vec<Channel>,
    settle_delay_ms: u32,
}

impl ChannelRegistry {
    pub fn new(settle_delay_ms: u32) -> Self {
        Self {
            channels: Vec::with_capacity(MAX_CHANNEL_COUNT),
            settle_delay_ms,
        }
    }

    /// Register a channel and return its id
    pub fn register(
        &mut self,
        channel_type: &str,
        max_sample_rate: f32,
        sensor: SensorFn,
    ) -> Result<ChannelId> {
        if self.channels.len() >= MAX_CHANNEL_COUNT {
            return Err(NodeError::CapacityExceeded {
                capacity: MAX_CHANNEL_COUNT,
            });
        }

        let id = (self.channels.len() + 1) as ChannelId;
        let channel = Channel::new(
            id,
            channel_type,
            max_sample_rate,
            self.settle_delay_ms,
            sensor,
        )?;
        self.channels.push(channel);
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Registered ids, in order
    pub fn ids(&self) -> Vec<ChannelId> {
        self.channels.iter().map(Channel::id).collect()
    }

    /// Map a wire channel id onto a registered one
    pub fn resolve(&self, raw: i64) -> Option<ChannelId> {
        let id = ChannelId::try_from(raw).ok()?;
        (id >= 1 && id as usize <= self.channels.len()).then_some(id)
    }

    pub fn get(&self, id: ChannelId) -> Option<&Channel> {
        let index = (id as usize).checked_sub(1)?;
        self.channels.get(index)
    }

    pub fn get_mut(&mut self, id: ChannelId) -> Option<&mut Channel> {
        let index = (id as usize).checked_sub(1)?;
        self.channels.get_mut(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Channel> {
        self.channels.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Channel> {
        self.channels.iter_mut()
    }

    pub fn active_count(&self) -> usize {
        self.channels.iter().filter(|c| c.is_active()).count()
    }

    /// Apply a configuration answer (fetched or pushed) to the channel it names.
    ///
    /// A payload without a publish topic or with an unknown `ChannelId`
    /// leaves every channel untouched. A named channel whose configuration
    /// fails validation is idled by [`Channel::apply_config`].
    pub fn apply(
        &mut self,
        payload: &ChannelConfigPayload,
        now: Timestamp,
    ) -> std::result::Result<ChannelId, ContractError> {
        let configuration = match (&payload.configuration, payload.publish_topic()) {
            (Some(configuration), Some(_)) => configuration,
            _ => {
                return Err(ContractError::config_validation(
                    "Configuration.PublishTopic",
                    "missing or empty",
                ))
            }
        };

        let id = payload
            .channel_id
            .and_then(|raw| self.resolve(raw))
            .ok_or_else(|| {
                ContractError::config_validation(
                    "ChannelId",
                    format!("{:?} does not name a registered channel", payload.channel_id),
                )
            })?;

        let channel = self.get_mut(id).ok_or_else(|| {
            ContractError::config_validation("ChannelId", format!("{id} not registered"))
        })?;
        channel.apply_config(configuration, now)?;
        Ok(id)
    }

    /// Forget every channel's last published value
    pub fn clear_last_values(&mut self) {
        for channel in &mut self.channels {
            channel.clear_last_value();
        }
    }

    pub fn snapshots(&self) -> Vec<ChannelSnapshot> {
        self.channels.iter().map(Channel::snapshot).collect()
    }
}
