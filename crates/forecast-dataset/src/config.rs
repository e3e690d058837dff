//! Configuration for the Zarr dataset store.

use serde::{Deserialize, Serialize};

/// Options for writing dataset stores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Compression codec for every array in the store.
    pub compression: ZarrCompression,

    /// Compression level (1-9).
    pub compression_level: u8,

    /// Enable byte shuffle filter for better compression.
    pub shuffle: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            compression: ZarrCompression::BloscZstd,
            compression_level: 1,
            shuffle: true,
        }
    }
}

impl StoreConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Apply `ZARR_COMPRESSION`, `ZARR_COMPRESSION_LEVEL` and `ZARR_SHUFFLE`
    /// on top of this configuration.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(val) = std::env::var("ZARR_COMPRESSION") {
            self.compression = ZarrCompression::from_str(&val);
        }

        if let Ok(val) = std::env::var("ZARR_COMPRESSION_LEVEL") {
            if let Ok(level) = val.parse() {
                self.compression_level = level;
            }
        }

        if let Ok(val) = std::env::var("ZARR_SHUFFLE") {
            self.shuffle = val.to_lowercase() == "true" || val == "1";
        }

        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.compression != ZarrCompression::None
            && (self.compression_level == 0 || self.compression_level > 9)
        {
            return Err("zarr compression_level must be 1-9".to_string());
        }

        Ok(())
    }
}

/// Compression codec for Zarr arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZarrCompression {
    /// No compression.
    None,
    /// Blosc with LZ4.
    BloscLz4,
    /// Blosc with Zstd.
    #[default]
    BloscZstd,
}

impl ZarrCompression {
    /// Parse from string (case-insensitive); unknown names select Blosc/Zstd.
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "none" => Self::None,
            "lz4" | "blosc_lz4" => Self::BloscLz4,
            _ => Self::BloscZstd,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::BloscLz4 => "blosc_lz4",
            Self::BloscZstd => "blosc_zstd",
        }
    }
}

impl std::fmt::Display for ZarrCompression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
