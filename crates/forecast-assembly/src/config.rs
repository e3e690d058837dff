//! Converter configuration.
//!
//! Loaded from YAML with `${VAR}` / `${VAR:-default}` environment
//! substitution, e.g.
//!
//! ```yaml
//! product: gdps
//! variables: [ghi, total_cloud, temperature, wind_speed, wind_direction]
//! required: [ghi]
//! step_interval_hours: 3
//! output_dir: ${FORECAST_OUTPUT_DIR:-./output}
//! store:
//!   compression: blosc_zstd
//!   compression_level: 1
//!   shuffle: true
//! ```

use std::path::{Path, PathBuf};

use forecast_dataset::StoreConfig;
use serde::{Deserialize, Serialize};

use crate::error::{AssemblyError, Result};
use crate::inference::{DEFAULT_STEP_INTERVAL_HOURS, MAX_STEP_INTERVAL_HOURS};
use crate::variables::{Product, VariableKind};

fn default_step_interval() -> u32 {
    DEFAULT_STEP_INTERVAL_HOURS
}

/// Settings for converting the cycles of one product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssemblyConfig {
    pub product: Product,

    /// Variables to assemble; empty means every variable of the product.
    #[serde(default)]
    pub variables: Vec<VariableKind>,

    /// Variables whose absence or failure aborts the cycle.
    #[serde(default)]
    pub required: Vec<VariableKind>,

    #[serde(default = "default_step_interval")]
    pub step_interval_hours: u32,

    #[serde(default)]
    pub output_dir: Option<PathBuf>,

    #[serde(default)]
    pub store: StoreConfig,
}

impl AssemblyConfig {
    /// Every variable of `product`, none required, default step interval.
    pub fn new(product: Product) -> Self {
        Self {
            product,
            variables: Vec::new(),
            required: Vec::new(),
            step_interval_hours: DEFAULT_STEP_INTERVAL_HOURS,
            output_dir: None,
            store: StoreConfig::default(),
        }
    }

    /// Load and validate a YAML configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| AssemblyError::io(path, e))?;
        Self::from_yaml_str(&content).map_err(|e| match e {
            AssemblyError::InvalidConfig(msg) => {
                AssemblyError::InvalidConfig(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })
    }

    /// Parse and validate YAML text after environment substitution.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let expanded = expand_env_vars(content)?;
        let config: Self = serde_yaml::from_str(&expanded)
            .map_err(|e| AssemblyError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Variables to assemble, in the product's output order.
    pub fn enabled_variables(&self) -> Vec<VariableKind> {
        self.product
            .variables()
            .iter()
            .copied()
            .filter(|k| self.variables.is_empty() || self.variables.contains(k))
            .collect()
    }

    pub fn is_required(&self, kind: VariableKind) -> bool {
        self.required.contains(&kind)
    }

    /// Check the configuration once before any cycle is processed.
    pub fn validate(&self) -> Result<()> {
        for kind in self.variables.iter().chain(&self.required) {
            if kind.product() != self.product {
                return Err(AssemblyError::InvalidConfig(format!(
                    "variable '{}' is not provided by {}",
                    kind, self.product
                )));
            }
        }

        let enabled = self.enabled_variables();
        if let Some(kind) = self.required.iter().find(|k| !enabled.contains(k)) {
            return Err(AssemblyError::InvalidConfig(format!(
                "required variable '{}' is not enabled",
                kind
            )));
        }

        if self.step_interval_hours == 0 || self.step_interval_hours > MAX_STEP_INTERVAL_HOURS {
            return Err(AssemblyError::InvalidConfig(format!(
                "step_interval_hours must be between 1 and {}, got {}",
                MAX_STEP_INTERVAL_HOURS, self.step_interval_hours
            )));
        }

        self.store.validate().map_err(AssemblyError::InvalidConfig)
    }
}

/// Expand `${VAR}` and `${VAR:-default}` references.
fn expand_env_vars(content: &str) -> Result<String> {
    let mut result = String::with_capacity(content.len());
    let mut chars = content.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next();

            let mut expr = String::new();
            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(c) => expr.push(c),
                    None => {
                        return Err(AssemblyError::InvalidConfig(format!(
                            "unclosed variable substitution: ${{{}",
                            expr
                        )))
                    }
                }
            }

            result.push_str(&resolve_var_expr(&expr)?);
        } else {
            result.push(ch);
        }
    }

    Ok(result)
}

fn resolve_var_expr(expr: &str) -> Result<String> {
    if let Some((name, default)) = expr.split_once(":-") {
        match std::env::var(name.trim()) {
            Ok(val) if !val.is_empty() => Ok(val),
            _ => Ok(default.to_string()),
        }
    } else {
        std::env::var(expr.trim()).map_err(|_| {
            AssemblyError::InvalidConfig(format!("environment variable {} not set", expr))
        })
    }
}
