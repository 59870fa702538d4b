//! Profile objects consumed from the control panel.
pub mod applier;


use std::path::Path;

use serde::de::{self, Deserializer};
use serde::Deserialize;

use crate::state::Buttons;

/// A single button reference, deserialized from its profile name
/// ("cross", "l1", "dpad_up", ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Button(pub u32);

impl<'de> Deserialize<'de> for Button {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let name = String::deserialize(deserializer)?;
        Buttons::from_name(&name)
            .map(Button)
            .ok_or_else(|| de::Error::custom(format!("unknown button name: {name}")))
    }
}

/// Button-to-button substitution. Bidirectional remaps swap the two bits.
#[derive(Debug, Clone, Deserialize)]
pub struct Remap {
    pub source: Button,
    pub target: Button,
    #[serde(default)]
    pub bidirectional: bool,
}

/// When a macro's trigger edge qualifies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    #[default]
    OnPress,
    OnHold,
    OnRelease,
    Toggle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepAction {
    Press,
    Hold,
    Release,
    Wait,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SequenceStep {
    pub action: StepAction,
    #[serde(default)]
    pub button: Option<Button>,
    pub duration_ms: u64,
}

/// The four macro transducer kinds.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MacroKind {
    RapidFire { target: Button, rate: f64 },
    Toggle { target: Button },
    Turbo { target: Button, rate: f64 },
    Sequence { steps: Vec<SequenceStep> },
}

#[derive(Debug, Clone, Deserialize)]
pub struct MacroDef {
    pub trigger: Button,
    #[serde(default)]
    pub modifier: Option<Button>,
    #[serde(default)]
    pub activation: Activation,
    #[serde(flatten)]
    pub kind: MacroKind,
}

/// A remap/macro profile as the panel stores it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub remaps: Vec<Remap>,
    #[serde(default)]
    pub macros: Vec<MacroDef>,
}

impl Profile {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Load the profile from disk. A missing file is an empty profile;
    /// a malformed one is reported and ignored.
    pub fn load(path: &Path) -> Self {
        let Ok(text) = std::fs::read_to_string(path) else {
            return Self::default();
        };
        match Self::from_json(&text) {
            Ok(profile) => {
                log::info!(
                    "Loaded profile: {} remaps, {} macros",
                    profile.remaps.len(),
                    profile.macros.len()
                );
                profile
            }
            Err(e) => {
                log::warn!("Ignoring malformed profile {path:?}: {e}");
                Self::default()
            }
        }
    }
}
