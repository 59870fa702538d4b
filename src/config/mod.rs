//! Runtime configuration: the debug-category spec and the paired-host
//! address used by the wake flow.
#[cfg(test)]
pub mod config_test;

use std::io;
use std::path::Path;

use log::LevelFilter;
use thiserror::Error;

use crate::constants::{PAIRED_HOST_PATH, PS3_MAC_ENV};

/// A debug log category and the module trees it unlocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Input,
    Usb,
    Bt,
    State,
    Output,
    Profile,
    Lightbar,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::Input,
        Category::Usb,
        Category::Bt,
        Category::State,
        Category::Output,
        Category::Profile,
        Category::Lightbar,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Category::Input => "input",
            Category::Usb => "usb",
            Category::Bt => "bt",
            Category::State => "state",
            Category::Output => "output",
            Category::Profile => "profile",
            Category::Lightbar => "lightbar",
        }
    }

    fn bit(self) -> u32 {
        match self {
            Category::Input => 1 << 0,
            Category::Usb => 1 << 1,
            Category::Bt => 1 << 2,
            Category::State => 1 << 3,
            Category::Output => 1 << 4,
            Category::Profile => 1 << 5,
            Category::Lightbar => 1 << 6,
        }
    }

    fn targets(self) -> &'static [&'static str] {
        match self {
            Category::Input => &["padbridge::input", "padbridge::drivers"],
            Category::Usb => &["padbridge::target"],
            Category::Bt => &["padbridge::bluetooth"],
            Category::State => &["padbridge::state"],
            Category::Output => &["padbridge::output"],
            Category::Profile => &["padbridge::profile"],
            Category::Lightbar => &["padbridge::lightbar"],
        }
    }

    fn from_name(name: &str) -> Option<Category> {
        Category::ALL.iter().copied().find(|c| c.name() == name)
    }
}

#[derive(Debug, Error)]
pub enum DebugSpecError {
    #[error("unknown debug category: {0}")]
    UnknownCategory(String),
    #[error("invalid hex mask: {0}")]
    BadMask(String),
}

/// Parsed `--debug` spec: a mask over [Category] bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebugSpec {
    mask: u32,
}

impl DebugSpec {
    const ALL_MASK: u32 = (1 << 7) - 1;
    /// The categories worth watching on a quick look: the source side,
    /// the console link, and the state machine.
    const QUICK_MASK: u32 = 1 << 0 | 1 << 1 | 1 << 3;

    /// No debug categories enabled.
    pub fn errors_only() -> Self {
        Self { mask: 0 }
    }

    /// Accepts a preset (`all`, `none`, `quick`), a hex mask (`0x2a`), or
    /// a comma-separated category list (`input,usb`).
    pub fn parse(text: &str) -> Result<Self, DebugSpecError> {
        let text = text.trim().to_ascii_lowercase();
        match text.as_str() {
            "all" => return Ok(Self { mask: Self::ALL_MASK }),
            "none" | "" => return Ok(Self::errors_only()),
            "quick" => return Ok(Self { mask: Self::QUICK_MASK }),
            _ => {}
        }

        if let Some(hex) = text.strip_prefix("0x") {
            let mask = u32::from_str_radix(hex, 16)
                .map_err(|_| DebugSpecError::BadMask(text.clone()))?;
            return Ok(Self {
                mask: mask & Self::ALL_MASK,
            });
        }

        let mut mask = 0;
        for name in text.split(',') {
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            let category = Category::from_name(name)
                .ok_or_else(|| DebugSpecError::UnknownCategory(name.to_string()))?;
            mask |= category.bit();
        }
        Ok(Self { mask })
    }

    pub fn contains(&self, category: Category) -> bool {
        self.mask & category.bit() != 0
    }

    pub fn enabled(&self) -> impl Iterator<Item = Category> + '_ {
        Category::ALL.iter().copied().filter(|c| self.contains(*c))
    }
}

/// Install the global logger: info-level baseline, debug for the module
/// trees selected by the spec.
pub fn init_logging(spec: &DebugSpec) {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(LevelFilter::Info);
    for category in spec.enabled() {
        for target in category.targets() {
            builder.filter_module(target, LevelFilter::Debug);
        }
    }
    builder.init();
}

/// Parse a colon-separated Bluetooth address in display order.
pub fn parse_mac(text: &str) -> Option<[u8; 6]> {
    let mut mac = [0u8; 6];
    let mut parts = text.trim().split(':');
    for byte in mac.iter_mut() {
        *byte = u8::from_str_radix(parts.next()?, 16).ok()?;
    }
    if parts.next().is_some() {
        return None;
    }
    Some(mac)
}

pub fn format_mac(mac: &[u8; 6]) -> String {
    format!(
        "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
        mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]
    )
}

/// The console address the wake flow targets: the environment override
/// wins, then the pairing state written when the console last paired.
/// All-zero addresses mean "never paired" and are not a target.
pub fn paired_host() -> Option<[u8; 6]> {
    let from_env = std::env::var(PS3_MAC_ENV)
        .ok()
        .and_then(|text| parse_mac(&text));
    let mac = match from_env {
        Some(mac) => Some(mac),
        None => std::fs::read_to_string(PAIRED_HOST_PATH)
            .ok()
            .and_then(|text| parse_mac(&text)),
    }?;
    if mac == [0u8; 6] {
        return None;
    }
    Some(mac)
}

/// Remember the paired host across restarts.
pub fn store_paired_host(mac: &[u8; 6]) -> io::Result<()> {
    let path = Path::new(PAIRED_HOST_PATH);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, format!("{}\n", format_mac(mac)))?;
    log::info!("Paired host is now {}", format_mac(mac));
    Ok(())
}
