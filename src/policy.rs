//! Enablement policy: whether a conversation's payloads get trimmed at all

use crate::cache::Override;
use std::collections::HashMap;

/// Decides per conversation whether the trimmer runs
pub trait EnablementPolicy {
    fn is_enabled(&self, conv_id: &str) -> bool;
}

impl<F> EnablementPolicy for F
where
    F: Fn(&str) -> bool,
{
    fn is_enabled(&self, conv_id: &str) -> bool {
        self(conv_id)
    }
}

/// Global switch with per-conversation overrides; an override always wins
#[derive(Debug, Clone)]
pub struct OptimizerSwitch {
    enabled: bool,
    overrides: HashMap<String, Override>,
}

impl Default for OptimizerSwitch {
    fn default() -> Self {
        Self::new(true)
    }
}

impl OptimizerSwitch {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            overrides: HashMap::new(),
        }
    }

    pub fn with_overrides(mut self, overrides: HashMap<String, Override>) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn set_override(&mut self, conv_id: &str, value: Override) {
        self.overrides.insert(conv_id.to_string(), value);
    }
}

impl EnablementPolicy for OptimizerSwitch {
    fn is_enabled(&self, conv_id: &str) -> bool {
        match self.overrides.get(conv_id) {
            Some(Override::On) => true,
            Some(Override::Off) => false,
            None => self.enabled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_override_beats_global_switch() {
        let mut switch = OptimizerSwitch::new(false);
        switch.set_override("on-conv", Override::On);
        assert!(switch.is_enabled("on-conv"));
        assert!(!switch.is_enabled("other"));

        let mut switch = OptimizerSwitch::new(true);
        switch.set_override("off-conv", Override::Off);
        assert!(!switch.is_enabled("off-conv"));
        assert!(switch.is_enabled("other"));
    }

    #[test]
    fn test_closure_policy() {
        let policy = |id: &str| id != "blocked";
        assert!(!policy.is_enabled("blocked"));
        assert!(policy.is_enabled("x"));
    }
}
