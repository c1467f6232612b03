use std::sync::{Arc, PoisonError, RwLock};

use leadline_core::ChannelConfig;

use crate::error::{ChannelError, Result};

enum Slot<S> {
    Empty,
    Disabled,
    Ready(Arc<S>),
}

/// Holder for an adapter's typed settings.
///
/// Settings are swapped wholesale on every `configure` and read as an `Arc`
/// snapshot, so an in-flight request keeps the settings it started with.
pub struct ConfigSlot<S> {
    slot: RwLock<Slot<S>>,
}

impl<S> ConfigSlot<S> {
    pub fn new() -> Self {
        Self {
            slot: RwLock::new(Slot::Empty),
        }
    }

    /// Replace the current settings.
    ///
    /// A disabled config is stored without parsing, so switching a channel
    /// off never needs valid credentials.
    pub fn install<F>(&self, config: &ChannelConfig, parse: F) -> Result<()>
    where
        F: FnOnce(&ChannelConfig) -> Result<S>,
    {
        let next = if config.enabled {
            Slot::Ready(Arc::new(parse(config)?))
        } else {
            Slot::Disabled
        };
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = next;
        Ok(())
    }

    /// Current settings, or why there are none.
    pub fn get(&self) -> Result<Arc<S>> {
        match &*self.slot.read().unwrap_or_else(PoisonError::into_inner) {
            Slot::Ready(s) => Ok(Arc::clone(s)),
            Slot::Disabled => Err(ChannelError::Disabled),
            Slot::Empty => Err(ChannelError::NotConfigured),
        }
    }
}

impl<S> Default for ConfigSlot<S> {
    fn default() -> Self {
        Self::new()
    }
}

/// Fetch a required, non-blank string field from a channel config.
pub fn required<'a>(value: &'a Option<String>, field: &str) -> Result<&'a str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ChannelError::Config(format!("missing {}", field)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_key(cfg: &ChannelConfig) -> Result<String> {
        required(&cfg.api_key, "api_key").map(String::from)
    }

    #[test]
    fn empty_then_ready_then_disabled() {
        let slot: ConfigSlot<String> = ConfigSlot::new();
        assert!(matches!(slot.get(), Err(ChannelError::NotConfigured)));

        slot.install(&ChannelConfig::new().with_api_key("k1"), parse_key)
            .unwrap();
        assert_eq!(slot.get().unwrap().as_str(), "k1");

        // disabled config skips parsing even with no credentials
        slot.install(&ChannelConfig::new().disabled(), parse_key)
            .unwrap();
        assert!(matches!(slot.get(), Err(ChannelError::Disabled)));
    }

    #[test]
    fn invalid_config_leaves_previous_settings() {
        let slot: ConfigSlot<String> = ConfigSlot::new();
        slot.install(&ChannelConfig::new().with_api_key("k1"), parse_key)
            .unwrap();
        let err = slot
            .install(&ChannelConfig::new().with_api_key("   "), parse_key)
            .unwrap_err();
        assert!(matches!(err, ChannelError::Config(_)));
        assert_eq!(slot.get().unwrap().as_str(), "k1");
    }
}
