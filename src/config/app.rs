//! Main application configuration
//!
//! This module defines the primary configuration structures for the rating
//! engine, including TOML and environment variable loading and validation.

use crate::calibration::DEFAULT_STEP;
use crate::config::rating::RatingSettings;
use crate::form::{FormConfig, FormReduction};
use crate::prediction::PredictionConfig;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::env;
use std::path::{Path, PathBuf};

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub service: ServiceSettings,
    pub rating: RatingSettings,
    pub form: FormConfig,
    pub prediction: PredictionConfig,
    pub calibration: CalibrationSettings,
    pub pools: Vec<PoolSettings>,
}

/// Service-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Service name for logging and metrics
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

/// Calibration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationSettings {
    /// Grid spacing for the weight search
    pub step: f64,
}

/// One independent rating pool and its snapshot files
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolSettings {
    /// Pool name, e.g. "domestic"
    pub name: String,
    /// Ratings snapshot path
    pub ratings_path: PathBuf,
    /// Recent form snapshot path; form tracking is off when absent
    #[serde(default)]
    pub form_path: Option<PathBuf>,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: "team-elo".to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl Default for CalibrationSettings {
    fn default() -> Self {
        Self { step: DEFAULT_STEP }
    }
}

impl PoolSettings {
    pub fn new(name: impl Into<String>, ratings_path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            ratings_path: ratings_path.into(),
            form_path: None,
        }
    }

    pub fn with_form(mut self, form_path: impl Into<PathBuf>) -> Self {
        self.form_path = Some(form_path.into());
        self
    }

    /// Default pools under `data_dir`: domestic with form, international without
    pub fn defaults_in(data_dir: &Path) -> Vec<Self> {
        vec![
            Self::new("domestic", data_dir.join("domestic_teams.txt"))
                .with_form(data_dir.join("domestic_form.txt")),
            Self::new("international", data_dir.join("international_teams.txt")),
        ]
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match env::var(key) {
        Ok(value) => value
            .parse()
            .map(Some)
            .map_err(|_| anyhow!("Invalid {} value: {}", key, value)),
        Err(_) => Ok(None),
    }
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        if config.pools.is_empty() {
            config.pools = PoolSettings::defaults_in(Path::new("data"));
        }

        validate_config(&config)?;
        Ok(config)
    }

    /// Load configuration from environment variables with fallback to defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        // Service settings
        if let Ok(name) = env::var("SERVICE_NAME") {
            config.service.name = name;
        }
        if let Ok(log_level) = env::var("LOG_LEVEL") {
            config.service.log_level = log_level;
        }

        // Rating settings
        if let Some(k) = parse_env("RATING_K_FACTOR")? {
            config.rating.k_factor = k;
        }
        if let Some(initial) = parse_env("RATING_INITIAL")? {
            config.rating.initial_rating = initial;
        }

        // Form settings
        if let Ok(reduction) = env::var("FORM_REDUCTION") {
            config.form.reduction = reduction
                .parse::<FormReduction>()
                .map_err(|e| anyhow!("Invalid FORM_REDUCTION value: {}", e))?;
        }
        if let Some(win_delta) = parse_env("FORM_WIN_DELTA")? {
            config.form.win_delta = win_delta;
        }
        if let Some(draw_delta) = parse_env("FORM_DRAW_DELTA")? {
            config.form.draw_delta = draw_delta;
        }
        if let Some(gap_scale) = parse_env("FORM_GAP_SCALE")? {
            config.form.gap_scale = gap_scale;
        }

        // Prediction settings
        if let Some(max_draw) = parse_env("PREDICTION_MAX_DRAW_PROB")? {
            config.prediction.max_draw_prob = max_draw;
        }
        if let Some(min_draw) = parse_env("PREDICTION_MIN_DRAW_PROB")? {
            config.prediction.min_draw_prob = min_draw;
        }
        if let Some(weight_elo) = parse_env::<f64>("PREDICTION_WEIGHT_ELO")? {
            config.prediction.weight_elo = weight_elo;
            config.prediction.weight_form = 1.0 - weight_elo;
        }
        if let Some(auto_create) = parse_env("PREDICTION_AUTO_CREATE_UNKNOWN")? {
            config.prediction.auto_create_unknown = auto_create;
        }

        // Calibration settings
        if let Some(step) = parse_env("CALIBRATION_STEP")? {
            config.calibration.step = step;
        }

        // Pools
        let data_dir = env::var("DATA_DIR").unwrap_or_else(|_| "data".to_string());
        config.pools = PoolSettings::defaults_in(Path::new(&data_dir));

        validate_config(&config)?;
        Ok(config)
    }

    /// Settings for a named pool
    pub fn pool(&self, name: &str) -> Option<&PoolSettings> {
        self.pools.iter().find(|pool| pool.name == name)
    }
}

/// Validate configuration values
pub fn validate_config(config: &AppConfig) -> Result<()> {
    // Validate log level
    match config.service.log_level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        _ => return Err(anyhow!("Invalid log level: {}", config.service.log_level)),
    }

    // Validate rating settings
    if !config.rating.k_factor.is_finite() || config.rating.k_factor <= 0.0 {
        return Err(anyhow!("K-factor must be positive"));
    }
    if !config.rating.initial_rating.is_finite() {
        return Err(anyhow!("Initial rating must be a finite number"));
    }

    config.form.validate()?;
    config.prediction.validate()?;
    crate::calibration::WeightCalibrator::new(config.calibration.step)?;

    // Validate pools
    let mut names = HashSet::new();
    for pool in &config.pools {
        if pool.name.trim().is_empty() {
            return Err(anyhow!("Pool name cannot be empty"));
        }
        if !names.insert(pool.name.as_str()) {
            return Err(anyhow!("Duplicate pool name: {}", pool.name));
        }
        if pool.form_path.as_deref() == Some(pool.ratings_path.as_path()) {
            return Err(anyhow!(
                "Pool {} uses the same file for ratings and form",
                pool.name
            ));
        }
    }

    Ok(())
}
