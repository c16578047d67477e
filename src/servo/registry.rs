//! Process-wide `name -> Servo` map. Built once at startup from the fixed
//! layout plus a calibration overlay; immutable afterwards (spec.md §4.3).

use super::motion::{Servo, ServoConfig};
use crate::pwm::PwmBus;
use std::collections::HashMap;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("duplicate servo name: {0}")]
    DuplicateName(String),
    #[error("duplicate channel: {0}")]
    DuplicateChannel(u8),
    #[error("invalid servo config for {name}: {reason}")]
    InvalidConfig { name: String, reason: String },
}

pub struct ServoRegistry {
    servos: HashMap<&'static str, Servo>,
    channels: std::collections::HashSet<u8>,
}

impl ServoRegistry {
    pub fn new() -> Self {
        Self {
            servos: HashMap::new(),
            channels: std::collections::HashSet::new(),
        }
    }

    pub fn register(
        &mut self,
        name: &'static str,
        channel: u8,
        config: ServoConfig,
        bus: PwmBus,
    ) -> Result<(), RegistryError> {
        config
            .validate()
            .map_err(|reason| RegistryError::InvalidConfig { name: name.to_string(), reason })?;
        if self.servos.contains_key(name) {
            return Err(RegistryError::DuplicateName(name.to_string()));
        }
        if !self.channels.insert(channel) {
            return Err(RegistryError::DuplicateChannel(channel));
        }
        self.servos.insert(name, Servo::new(name, channel, config, bus));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Servo> {
        self.servos.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Servo> {
        self.servos.get_mut(name)
    }

    /// Removes a servo from the registry, handing exclusive ownership to
    /// its permanent owner (a tracker or animation thread). The channel
    /// stays reserved — it is never reissued.
    pub fn take(&mut self, name: &str) -> Option<Servo> {
        self.servos.remove(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.servos.keys().copied()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Servo> {
        self.servos.values_mut()
    }
}

impl Default for ServoRegistry {
    fn default() -> Self {
        Self::new()
    }
}
