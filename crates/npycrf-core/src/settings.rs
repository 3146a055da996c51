//! Global settings loaded from TOML.
//!
//! - `init_custom(toml_content)` sets a custom TOML before first `settings()` call
//! - `settings()` returns `&'static Settings` (lazy-init singleton)
//! - Default values are embedded via `include_str!("default_settings.toml")`

use std::sync::OnceLock;

use serde::Deserialize;

pub const DEFAULT_SETTINGS_TOML: &str = include_str!("default_settings.toml");

static CUSTOM_TOML: OnceLock<String> = OnceLock::new();

/// Set custom TOML before first `settings()` call.
pub fn init_custom(toml_content: String) -> Result<(), SettingsError> {
    parse_settings_toml(&toml_content)?;
    CUSTOM_TOML
        .set(toml_content)
        .map_err(|_| SettingsError::AlreadyInitialized)
}

/// Get or initialize the global settings singleton.
pub fn settings() -> &'static Settings {
    static INSTANCE: OnceLock<Settings> = OnceLock::new();
    INSTANCE.get_or_init(|| {
        let toml_str = CUSTOM_TOML
            .get()
            .map(|s| s.as_str())
            .unwrap_or(DEFAULT_SETTINGS_TOML);
        parse_settings_toml(toml_str).expect("settings TOML must be valid")
    })
}

/// Returns the embedded default settings TOML content.
pub fn default_toml() -> &'static str {
    DEFAULT_SETTINGS_TOML
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("TOML parse error: {0}")]
    Parse(String),
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
    #[error("settings already initialized")]
    AlreadyInitialized,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub lattice: LatticeSettings,
    pub numeric: NumericSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LatticeSettings {
    /// Longest segment the lattice enumerates.
    pub max_word_length: usize,
    /// Sentence capacity reserved by `Lattice::new`; grown on demand.
    pub initial_sentence_capacity: usize,
    /// Whether partition-function queries rescale the forward pass.
    pub use_scaling: bool,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct NumericSettings {
    /// How far above 1 a marginal may drift before it counts as a modeling error.
    pub overshoot_tolerance: f64,
    /// Allowed gap between the direct and complementary "neither boundary" marginal.
    pub boundary_tolerance: f64,
    /// Allowed relative gap between forward and backward partition functions.
    pub partition_tolerance: f64,
}

pub fn parse_settings_toml(toml_str: &str) -> Result<Settings, SettingsError> {
    let s: Settings = toml::from_str(toml_str).map_err(|e| SettingsError::Parse(e.to_string()))?;
    validate(&s)?;
    Ok(s)
}

fn validate(s: &Settings) -> Result<(), SettingsError> {
    macro_rules! check_positive_usize {
        ($section:ident . $field:ident) => {
            if s.$section.$field == 0 {
                return Err(SettingsError::InvalidValue {
                    field: concat!(stringify!($section), ".", stringify!($field)).to_string(),
                    reason: "must be positive".to_string(),
                });
            }
        };
    }
    macro_rules! check_tolerance {
        ($section:ident . $field:ident) => {
            let value = s.$section.$field;
            if !(value > 0.0 && value < 1.0) {
                return Err(SettingsError::InvalidValue {
                    field: concat!(stringify!($section), ".", stringify!($field)).to_string(),
                    reason: "must lie in (0, 1)".to_string(),
                });
            }
        };
    }

    check_positive_usize!(lattice.max_word_length);
    check_positive_usize!(lattice.initial_sentence_capacity);

    check_tolerance!(numeric.overshoot_tolerance);
    check_tolerance!(numeric.boundary_tolerance);
    check_tolerance!(numeric.partition_tolerance);

    Ok(())
}
