use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An optional feature a pipeline may declare.
///
/// Each capability gates one control on the control surface: the control
/// exists exactly while the active pipeline declares the capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    ToonShading,
}

impl Capability {
    pub const ALL: [Capability; 1] = [Capability::ToonShading];

    /// Name of the control that exposes this capability.
    pub fn control_name(self) -> &'static str {
        match self {
            Capability::ToonShading => "Toon Shading",
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Capability::ToonShading => write!(f, "toon shading"),
        }
    }
}

/// The set of capabilities declared by one pipeline instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitySet {
    bits: u32,
}

impl CapabilitySet {
    pub const fn empty() -> Self {
        Self { bits: 0 }
    }

    fn bit(capability: Capability) -> u32 {
        1 << (capability as u32)
    }

    pub fn with(mut self, capability: Capability) -> Self {
        self.insert(capability);
        self
    }

    pub fn insert(&mut self, capability: Capability) {
        self.bits |= Self::bit(capability);
    }

    pub fn contains(&self, capability: Capability) -> bool {
        self.bits & Self::bit(capability) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        Capability::ALL.into_iter().filter(|c| self.contains(*c))
    }
}

/// Settings that persist across pipeline switches.
///
/// A value is stored even while no active pipeline declares the matching
/// capability; it is applied again once one does.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StickySettings {
    values: BTreeMap<Capability, bool>,
}

impl StickySettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_toon_shading(mut self, enabled: bool) -> Self {
        self.set(Capability::ToonShading, enabled);
        self
    }

    /// Stored value for a capability, `false` if never set.
    pub fn get(&self, capability: Capability) -> bool {
        self.values.get(&capability).copied().unwrap_or(false)
    }

    pub fn set(&mut self, capability: Capability, enabled: bool) {
        self.values.insert(capability, enabled);
    }

    pub fn toon_shading(&self) -> bool {
        self.get(Capability::ToonShading)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_set() {
        let set = CapabilitySet::empty();
        assert!(set.is_empty());
        assert!(!set.contains(Capability::ToonShading));
        assert_eq!(set.iter().count(), 0);
    }

    #[test]
    fn test_insert_and_iter() {
        let set = CapabilitySet::empty().with(Capability::ToonShading);
        assert!(set.contains(Capability::ToonShading));
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![Capability::ToonShading]);
    }

    #[test]
    fn test_sticky_defaults_to_false() {
        let mut sticky = StickySettings::new();
        assert!(!sticky.toon_shading());
        sticky.set(Capability::ToonShading, true);
        assert!(sticky.get(Capability::ToonShading));
    }
}
