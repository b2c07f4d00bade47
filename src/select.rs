//! Per-batch selection of model, edit format and message.
//!
//! Each dimension is driven by a [`Pick`] strategy. Random strategies draw
//! from a seedable generator so a run can be replayed with `--seed`.

use crate::config::RunConfig;
use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Chooses an index in `0..len` for the next batch.
pub trait Pick: Send {
    /// Returns the next index. `len` is never zero.
    fn pick(&mut self, len: usize) -> usize;
}

/// Always the first option.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstPick;

impl Pick for FirstPick {
    fn pick(&mut self, _len: usize) -> usize {
        0
    }
}

/// Cycles through the options in order.
#[derive(Debug, Clone, Copy, Default)]
pub struct TurnPick {
    turn: usize,
}

impl Pick for TurnPick {
    fn pick(&mut self, len: usize) -> usize {
        let index = self.turn % len;
        self.turn = self.turn.wrapping_add(1);
        index
    }
}

/// Uniformly random choice.
#[derive(Debug, Clone)]
pub struct UniformPick {
    rng: StdRng,
}

impl UniformPick {
    /// Creates a generator from a fixed seed.
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Pick for UniformPick {
    fn pick(&mut self, len: usize) -> usize {
        self.rng.random_range(0..len)
    }
}

/// How a value is chosen from its list for each batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SelectionMode {
    /// Always the same value
    #[serde(alias = "default")]
    Fixed,
    /// Uniformly random per batch
    #[default]
    Random,
    /// Round-robin in list order
    #[serde(alias = "round-robin", alias = "turn_based")]
    TurnBased,
}

impl fmt::Display for SelectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Fixed => "fixed",
            Self::Random => "random",
            Self::TurnBased => "turn-based",
        })
    }
}

/// Edit format passed with `--edit-format`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EditFormat {
    /// Search/replace blocks
    Diff,
    /// Unified diff
    Udiff,
}

impl EditFormat {
    const ALL: [Self; 2] = [Self::Diff, Self::Udiff];

    /// Flag value understood by the assistant.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Diff => "diff",
            Self::Udiff => "udiff",
        }
    }
}

impl fmt::Display for EditFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Edit format policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EditFormatMode {
    /// Always `diff`
    #[default]
    Diff,
    /// Always `udiff`
    #[serde(alias = "unified-diff")]
    Udiff,
    /// `diff` or `udiff` at random
    Random,
    /// Alternate `diff`, `udiff`, ...
    #[serde(alias = "round-robin", alias = "turn_based")]
    TurnBased,
    /// Leave the assistant's default
    None,
}

impl fmt::Display for EditFormatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Diff => "diff",
            Self::Udiff => "udiff",
            Self::Random => "random",
            Self::TurnBased => "turn-based",
            Self::None => "none",
        })
    }
}

/// What was selected for one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Choice {
    /// Model flag value, `None` for the assistant default
    pub model: Option<String>,
    /// Edit format flag value, `None` to omit the flag
    pub edit_format: Option<EditFormat>,
    /// Index of the message template
    pub message_index: usize,
}

// Keeps the three random streams independent under one seed.
const MODEL_SALT: u64 = 0;
const EDIT_FORMAT_SALT: u64 = 0x9E37_79B9_7F4A_7C15;
const MESSAGE_SALT: u64 = 0xC2B2_AE3D_27D4_EB4F;

/// Produces a [`Choice`] per batch.
pub struct Selector {
    fixed_model: Option<String>,
    models: Vec<String>,
    edit_format: EditFormatMode,
    message_count: usize,
    model_pick: Box<dyn Pick>,
    edit_pick: Box<dyn Pick>,
    message_pick: Box<dyn Pick>,
}

impl Selector {
    /// Builds the strategies described by `config`.
    #[must_use]
    pub fn from_config(config: &RunConfig, message_count: usize) -> Self {
        let seed = config.seed.unwrap_or_else(|| {
            let seed = rand::rng().random();
            debug!("Selection seed: {} (pass --seed to reproduce)", seed);
            seed
        });

        let (fixed_model, models) = match config.model_selection {
            SelectionMode::Fixed => (config.model.clone(), Vec::new()),
            _ => (None, config.models.clone()),
        };

        Self {
            fixed_model,
            models,
            edit_format: config.edit_format,
            message_count,
            model_pick: strategy(config.model_selection, seed ^ MODEL_SALT),
            edit_pick: match config.edit_format {
                EditFormatMode::Random => Box::new(UniformPick::seeded(seed ^ EDIT_FORMAT_SALT)),
                EditFormatMode::TurnBased => Box::new(TurnPick::default()),
                _ => Box::new(FirstPick),
            },
            message_pick: strategy(config.message_selection, seed ^ MESSAGE_SALT),
        }
    }

    /// Selects the values for the next batch.
    pub fn next_choice(&mut self) -> Choice {
        let model = if self.models.is_empty() {
            self.fixed_model.clone()
        } else {
            let i = self.model_pick.pick(self.models.len()).min(self.models.len() - 1);
            Some(self.models[i].clone())
        };

        let edit_format = match self.edit_format {
            EditFormatMode::Diff => Some(EditFormat::Diff),
            EditFormatMode::Udiff => Some(EditFormat::Udiff),
            EditFormatMode::None => None,
            EditFormatMode::Random | EditFormatMode::TurnBased => {
                let i = self.edit_pick.pick(EditFormat::ALL.len()) % EditFormat::ALL.len();
                Some(EditFormat::ALL[i])
            }
        };

        let message_index = if self.message_count <= 1 {
            0
        } else {
            self.message_pick.pick(self.message_count) % self.message_count
        };

        Choice {
            model,
            edit_format,
            message_index,
        }
    }
}

fn strategy(mode: SelectionMode, seed: u64) -> Box<dyn Pick> {
    match mode {
        SelectionMode::Fixed => Box::new(FirstPick),
        SelectionMode::Random => Box::new(UniformPick::seeded(seed)),
        SelectionMode::TurnBased => Box::new(TurnPick::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::TempDir;

    fn config(
        temp: &TempDir,
        tweak: impl FnOnce(crate::config::RunConfigBuilder) -> crate::config::RunConfigBuilder,
    ) -> RunConfig {
        tweak(RunConfig::builder().project_dir(temp.path()))
            .build()
            .unwrap()
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_turn_pick_cycles() {
        let mut pick = TurnPick::default();
        let picks: Vec<usize> = (0..5).map(|_| pick.pick(3)).collect();
        assert_eq!(picks, vec![0, 1, 2, 0, 1]);
    }

    #[test]
    fn test_uniform_pick_is_reproducible() {
        let mut a = UniformPick::seeded(7);
        let mut b = UniformPick::seeded(7);
        let first: Vec<usize> = (0..20).map(|_| a.pick(10)).collect();
        let second: Vec<usize> = (0..20).map(|_| b.pick(10)).collect();
        assert_eq!(first, second);
        assert!(first.iter().all(|&i| i < 10));
    }

    #[test]
    fn test_fixed_model() {
        let temp = TempDir::new().unwrap();
        let config = config(&temp, |b| {
            b.model_selection(SelectionMode::Fixed)
                .model("gpt-4o")
                .models(strings(&["a", "b"]))
        });
        let mut selector = Selector::from_config(&config, 1);

        for _ in 0..3 {
            assert_eq!(selector.next_choice().model.as_deref(), Some("gpt-4o"));
        }
    }

    #[test]
    fn test_fixed_without_model_omits_flag() {
        let temp = TempDir::new().unwrap();
        let config = config(&temp, |b| b.model_selection(SelectionMode::Fixed));
        let mut selector = Selector::from_config(&config, 1);
        assert_eq!(selector.next_choice().model, None);
    }

    #[test]
    fn test_turn_based_models() {
        let temp = TempDir::new().unwrap();
        let config = config(&temp, |b| {
            b.model_selection(SelectionMode::TurnBased)
                .models(strings(&["m1", "m2", "m3"]))
        });
        let mut selector = Selector::from_config(&config, 1);

        let models: Vec<Option<String>> = (0..4).map(|_| selector.next_choice().model).collect();
        assert_eq!(models, vec![
            Some("m1".to_string()),
            Some("m2".to_string()),
            Some("m3".to_string()),
            Some("m1".to_string()),
        ]);
    }

    #[test]
    fn test_seeded_random_is_reproducible() {
        let temp = TempDir::new().unwrap();
        let make = || {
            let config = config(&temp, |b| {
                b.model_selection(SelectionMode::Random)
                    .models(strings(&["m1", "m2", "m3", "m4"]))
                    .edit_format(EditFormatMode::Random)
                    .messages(strings(&["one", "two", "three"]))
                    .message_selection(SelectionMode::Random)
                    .seed(42)
            });
            let mut selector = Selector::from_config(&config, 3);
            (0..10).map(|_| selector.next_choice()).collect::<Vec<_>>()
        };

        assert_eq!(make(), make());
    }

    #[test]
    fn test_edit_format_turn_based_alternates() {
        let temp = TempDir::new().unwrap();
        let config = config(&temp, |b| b.edit_format(EditFormatMode::TurnBased));
        let mut selector = Selector::from_config(&config, 1);

        let formats: Vec<Option<EditFormat>> =
            (0..4).map(|_| selector.next_choice().edit_format).collect();
        assert_eq!(formats, vec![
            Some(EditFormat::Diff),
            Some(EditFormat::Udiff),
            Some(EditFormat::Diff),
            Some(EditFormat::Udiff),
        ]);
    }

    #[test]
    fn test_edit_format_fixed_and_none() {
        let temp = TempDir::new().unwrap();

        let udiff = config(&temp, |b| b.edit_format(EditFormatMode::Udiff));
        assert_eq!(
            Selector::from_config(&udiff, 1).next_choice().edit_format,
            Some(EditFormat::Udiff)
        );

        let none = config(&temp, |b| b.edit_format(EditFormatMode::None));
        assert_eq!(Selector::from_config(&none, 1).next_choice().edit_format, None);
    }

    #[test]
    fn test_message_turn_based() {
        let temp = TempDir::new().unwrap();
        let config = config(&temp, |b| b.message_selection(SelectionMode::TurnBased));

        let mut selector = Selector::from_config(&config, 2);
        let picks: Vec<usize> = (0..3).map(|_| selector.next_choice().message_index).collect();
        assert_eq!(picks, vec![0, 1, 0]);
    }

    #[test]
    fn test_mode_deserialization_aliases() {
        #[derive(Deserialize)]
        struct Modes {
            mode: SelectionMode,
            format: EditFormatMode,
        }

        let parsed: Modes = toml::from_str("mode = \"round-robin\"\nformat = \"unified-diff\"").unwrap();
        assert_eq!(parsed.mode, SelectionMode::TurnBased);
        assert_eq!(parsed.format, EditFormatMode::Udiff);

        let parsed: Modes = toml::from_str("mode = \"default\"\nformat = \"none\"").unwrap();
        assert_eq!(parsed.mode, SelectionMode::Fixed);
        assert_eq!(parsed.format, EditFormatMode::None);
    }
}
