//! Boot configuration.
//!
//! ```toml
//! tick_rate_hz = 1500
//!
//! [range]
//! min = -5.0
//! max = 5.0
//!
//! [[channel]]
//! index = 1
//! scale = { degrees = [0, 2, 4, 5, 7, 9, 11] }
//! sequence = [{ loop = [
//!     { to = { volts = 2.0, time = 0.5 } },
//!     { to = { volts = 0.0, time = 0.5, shape = "sine" } },
//! ] }]
//! start = true
//!
//! [[input]]
//! index = 1
//! clock = 0.25
//! triggers = [{ channel = 1, action = 1 }]
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use cv_engine::{Action, EngineConfig, InputKind, NUM_INPUTS};
use cv_ir::{
    Channel, ConfigError, NodeDesc, OutputRange, ScaleConfig, Sequence, Shape, TickRate,
    DEFAULT_MAX_VOLTS, DEFAULT_MIN_VOLTS, DEFAULT_TICK_HZ,
};
use serde::{Deserialize, Serialize};

use crate::error::ControllerError;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BootConfig {
    #[serde(default = "default_tick_rate")]
    pub tick_rate_hz: u32,
    #[serde(default)]
    pub range: RangeConfig,
    #[serde(default, rename = "channel")]
    pub channels: Vec<ChannelConfig>,
    #[serde(default, rename = "input")]
    pub inputs: Vec<InputConfig>,
}

impl Default for BootConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: DEFAULT_TICK_HZ,
            range: RangeConfig::default(),
            channels: Vec::new(),
            inputs: Vec::new(),
        }
    }
}

fn default_tick_rate() -> u32 {
    DEFAULT_TICK_HZ
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RangeConfig {
    pub min: f32,
    pub max: f32,
}

impl Default for RangeConfig {
    fn default() -> Self {
        Self { min: DEFAULT_MIN_VOLTS, max: DEFAULT_MAX_VOLTS }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChannelConfig {
    /// 1-based output number.
    pub index: u8,
    /// Seconds for `set_volts` moves.
    #[serde(default)]
    pub slew: f32,
    #[serde(default = "default_shape")]
    pub slew_shape: String,
    #[serde(default)]
    pub scale: Option<ScaleSetting>,
    #[serde(default)]
    pub sequence: Option<Vec<NodeDesc>>,
    /// Overrides for the sequence's declared dynamics.
    #[serde(default)]
    pub dynamics: BTreeMap<String, f32>,
    /// Voltage set at boot, before any sequence starts.
    #[serde(default)]
    pub volts: Option<f32>,
    /// Start the sequence at boot.
    #[serde(default)]
    pub start: bool,
}

fn default_shape() -> String {
    Shape::Linear.name().to_string()
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScaleSetting {
    /// `"chromatic"` or `"none"`.
    Named(String),
    Custom {
        degrees: Vec<f32>,
        #[serde(default)]
        modulo: Option<f32>,
        #[serde(default)]
        scaling: Option<f32>,
    },
}

impl ScaleSetting {
    pub fn resolve(&self) -> Result<ScaleConfig, ControllerError> {
        match self {
            ScaleSetting::Named(name) => match name.to_ascii_lowercase().as_str() {
                "chromatic" => Ok(ScaleConfig::chromatic()),
                "none" | "off" => Ok(ScaleConfig::disabled()),
                other => Err(ControllerError::Invalid(format!("unknown scale `{other}`"))),
            },
            ScaleSetting::Custom { degrees, modulo, scaling } => {
                Ok(ScaleConfig::custom(degrees, *modulo, *scaling)?)
            }
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeConfig {
    #[default]
    Rising,
    Falling,
    Both,
}

impl EdgeConfig {
    pub fn matches(self, kind: InputKind) -> bool {
        matches!(
            (self, kind),
            (EdgeConfig::Rising | EdgeConfig::Both, InputKind::Rising)
                | (EdgeConfig::Falling | EdgeConfig::Both, InputKind::Falling)
        )
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InputConfig {
    /// 1-based input number.
    pub index: u8,
    /// Drive the input from an internal clock with this period in seconds.
    #[serde(default)]
    pub clock: Option<f32>,
    #[serde(default)]
    pub edge: EdgeConfig,
    #[serde(default)]
    pub triggers: Vec<TriggerConfig>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TriggerConfig {
    /// 1-based output number.
    pub channel: u8,
    pub action: u8,
}

impl BootConfig {
    /// Read and validate a TOML boot file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ControllerError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|source| ControllerError::Io { path: path.to_path_buf(), source })?;
        let config = Self::from_toml_str(&text)?;
        tracing::info!(
            path = %path.display(),
            channels = config.channels.len(),
            "boot config loaded"
        );
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ControllerError> {
        let config: BootConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn engine_config(&self) -> Result<EngineConfig, ControllerError> {
        Ok(EngineConfig {
            tick_rate: TickRate::new(self.tick_rate_hz)?,
            range: OutputRange::new(self.range.min, self.range.max)?,
            ..EngineConfig::default()
        })
    }

    /// Semantic checks beyond what deserialization enforces. Every sequence
    /// and scale is compiled here, so a config that validates will install.
    pub fn validate(&self) -> Result<(), ControllerError> {
        self.engine_config()?;

        let mut seen = BTreeSet::new();
        for ch in &self.channels {
            let channel = ch.channel()?;
            if !seen.insert(channel) {
                return Err(ControllerError::Invalid(format!("{channel} configured twice")));
            }
            ch.slew()?;
            if let Some(scale) = &ch.scale {
                scale.resolve()?;
            }
            if let Some(sequence) = ch.compile()? {
                for name in ch.dynamics.keys() {
                    if sequence.dynamics().find(name).is_none() {
                        return Err(ControllerError::Invalid(format!(
                            "{channel}: dynamic `{name}` is not declared by its sequence"
                        )));
                    }
                }
            } else if !ch.dynamics.is_empty() {
                return Err(ControllerError::Invalid(format!(
                    "{channel}: dynamics given without a sequence"
                )));
            }
            if ch.start && ch.sequence.is_none() {
                let reason = format!("{channel}: start without a sequence");
                return Err(ControllerError::Invalid(reason));
            }
        }

        let mut seen = BTreeSet::new();
        for input in &self.inputs {
            let index = input.input()?;
            if !seen.insert(index) {
                let reason = format!("input {} configured twice", input.index);
                return Err(ControllerError::Invalid(reason));
            }
            if let Some(period) = input.clock {
                if !period.is_finite() || period <= 0.0 {
                    return Err(ControllerError::Invalid(format!(
                        "input {}: clock period must be positive",
                        input.index
                    )));
                }
            }
            for trigger in &input.triggers {
                trigger.resolve()?;
            }
        }
        Ok(())
    }
}

impl ChannelConfig {
    pub fn channel(&self) -> Result<Channel, ControllerError> {
        Ok(cv_engine::channel(self.index)?)
    }

    pub fn slew(&self) -> Result<(f32, Shape), ControllerError> {
        if !self.slew.is_finite() {
            return Err(ConfigError::NonFiniteValue.into());
        }
        if self.slew < 0.0 {
            return Err(ConfigError::NegativeDuration(self.slew).into());
        }
        Ok((self.slew, Shape::parse(&self.slew_shape)?))
    }

    pub fn compile(&self) -> Result<Option<Sequence>, ControllerError> {
        self.sequence.as_deref().map(Sequence::compile).transpose().map_err(Into::into)
    }
}

impl InputConfig {
    /// 0-based input index.
    pub fn input(&self) -> Result<u8, ControllerError> {
        match self.index {
            n @ 1.. if (n as usize) <= NUM_INPUTS => Ok(n - 1),
            n => Err(cv_engine::EngineError::InvalidInput(n).into()),
        }
    }
}

impl TriggerConfig {
    pub fn resolve(&self) -> Result<(Channel, Action), ControllerError> {
        Ok((cv_engine::channel(self.channel)?, Action::try_from(self.action)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
        tick_rate_hz = 1000

        [range]
        min = -5.0
        max = 5.0

        [[channel]]
        index = 1
        slew = 0.01
        slew_shape = "sine"
        scale = { degrees = [0.0, 2.0, 4.0, 5.0, 7.0, 9.0, 11.0] }
        sequence = [{ loop = [
            { to = { volts = { var = "peak", default = 2.0 }, time = 0.5 } },
            { to = { volts = 0.0, time = 0.5, shape = "exp" } },
        ] }]
        dynamics = { peak = 3.0 }
        start = true

        [[channel]]
        index = 3
        scale = "chromatic"
        volts = 1.0

        [[input]]
        index = 1
        clock = 0.25
        triggers = [{ channel = 1, action = 1 }]
    "#;

    #[test]
    fn parses_full_config() {
        let config = BootConfig::from_toml_str(FULL).unwrap();
        assert_eq!(config.tick_rate_hz, 1000);
        assert_eq!(config.range, RangeConfig { min: -5.0, max: 5.0 });
        assert_eq!(config.channels.len(), 2);
        assert_eq!(config.channels[0].slew().unwrap(), (0.01, Shape::Sine));
        assert_eq!(config.channels[1].scale, Some(ScaleSetting::Named("chromatic".into())));
        assert_eq!(config.inputs[0].input().unwrap(), 0);
        assert_eq!(config.inputs[0].edge, EdgeConfig::Rising);

        let sequence = config.channels[0].compile().unwrap().unwrap();
        assert_eq!(sequence.step_count(), 2);
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config = BootConfig::from_toml_str("").unwrap();
        assert_eq!(config.tick_rate_hz, DEFAULT_TICK_HZ);
        assert_eq!(config.engine_config().unwrap().range, OutputRange::default());
    }

    #[test]
    fn rejects_negative_duration_in_sequence() {
        let text = r#"
            [[channel]]
            index = 2
            sequence = [{ to = { volts = 1.0, time = -0.5 } }]
        "#;
        assert!(matches!(
            BootConfig::from_toml_str(text),
            Err(ControllerError::Config(ConfigError::NegativeDuration(_)))
        ));
    }

    #[test]
    fn rejects_bad_channels_and_duplicates() {
        assert!(matches!(
            BootConfig::from_toml_str("[[channel]]\nindex = 5"),
            Err(ControllerError::Engine(cv_engine::EngineError::InvalidChannel(5)))
        ));
        assert!(matches!(
            BootConfig::from_toml_str("[[channel]]\nindex = 1\n[[channel]]\nindex = 1"),
            Err(ControllerError::Invalid(_))
        ));
    }

    #[test]
    fn rejects_unknown_scale_and_bad_range() {
        assert!(BootConfig::from_toml_str("[[channel]]\nindex = 1\nscale = \"lydian\"").is_err());
        assert!(matches!(
            BootConfig::from_toml_str("[range]\nmin = 2.0\nmax = 1.0"),
            Err(ControllerError::Config(ConfigError::InvalidRange { .. }))
        ));
        assert!(matches!(
            BootConfig::from_toml_str("tick_rate_hz = 0"),
            Err(ControllerError::Config(ConfigError::InvalidTickRate))
        ));
    }

    #[test]
    fn rejects_undeclared_dynamic_override() {
        let text = r#"
            [[channel]]
            index = 1
            sequence = [{ to = { volts = 1.0 } }]
            dynamics = { ghost = 1.0 }
        "#;
        assert!(matches!(BootConfig::from_toml_str(text), Err(ControllerError::Invalid(_))));
    }

    #[test]
    fn rejects_bad_triggers() {
        let text = r#"
            [[input]]
            index = 1
            triggers = [{ channel = 1, action = 7 }]
        "#;
        assert!(matches!(
            BootConfig::from_toml_str(text),
            Err(ControllerError::Engine(cv_engine::EngineError::UnknownAction(7)))
        ));
        assert!(BootConfig::from_toml_str("[[input]]\nindex = 3").is_err());
    }

    #[test]
    fn edges_match_their_kind() {
        assert!(EdgeConfig::Rising.matches(InputKind::Rising));
        assert!(!EdgeConfig::Rising.matches(InputKind::Falling));
        assert!(EdgeConfig::Both.matches(InputKind::Falling));
        assert!(!EdgeConfig::Both.matches(InputKind::Level(1.0)));
    }

    #[test]
    fn unknown_keys_are_parse_errors() {
        assert!(matches!(
            BootConfig::from_toml_str("tick_rate = 10"),
            Err(ControllerError::Parse(_))
        ));
    }
}
