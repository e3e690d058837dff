//! GRIB2 parameter and level lookup tables.
//!
//! Translates the numeric codes of the product definition section into the
//! short names used to select fields (`TMP`, `DSWRF`, ...) and readable level
//! descriptions. [`Grib2Tables::standard`] covers the WMO/NCEP codes of the
//! supported forecast products; callers can extend it with `add_parameter`.

use std::collections::HashMap;

/// Lookup key for parameter: (discipline, category, number)
pub type ParamKey = (u8, u8, u8);

/// Well-known fixed surface types (GRIB2 code table 4.5)
pub mod level_types {
    pub const SURFACE: u8 = 1;
    pub const CLOUD_BASE: u8 = 2;
    pub const TOP_OF_ATMOSPHERE: u8 = 8;
    pub const ISOBARIC: u8 = 100;
    pub const MEAN_SEA_LEVEL: u8 = 101;
    pub const HEIGHT_ABOVE_GROUND: u8 = 103;
    pub const ENTIRE_ATMOSPHERE: u8 = 200;
}

/// Level description - either static text or a template with {value} placeholder
#[derive(Debug, Clone)]
pub enum LevelDescription {
    /// Static description (e.g., "surface", "mean sea level")
    Static(String),
    /// Template with {value} placeholder (e.g., "{value} mb", "{value} m above ground")
    Template(String),
}

impl LevelDescription {
    /// Format the level description, substituting placeholders if it's a template.
    ///
    /// Supported placeholders:
    /// - `{value}` - Raw level value
    /// - `{value_mb}` - Value converted from Pa to mb (divided by 100)
    pub fn format(&self, value: f64) -> String {
        match self {
            LevelDescription::Static(s) => s.clone(),
            LevelDescription::Template(t) => t
                .replace("{value}", &format_number(value))
                .replace("{value_mb}", &format_number(value / 100.0)),
        }
    }
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

/// GRIB2 parameter and level lookup tables.
#[derive(Debug, Clone, Default)]
pub struct Grib2Tables {
    /// (discipline, category, number) -> parameter short name (e.g., "TMP", "UGRD")
    parameters: HashMap<ParamKey, String>,
    /// level_type -> description pattern
    levels: HashMap<u8, LevelDescription>,
}

impl Grib2Tables {
    /// Create empty tables
    pub fn new() -> Self {
        Self::default()
    }

    /// Tables covering the meteorological parameters of the GDPS and GFS products.
    pub fn standard() -> Self {
        let mut tables = Self::new();

        // Discipline 0, category 0: temperature
        tables.add_parameter(0, 0, 0, "TMP".to_string());
        tables.add_parameter(0, 0, 6, "DPT".to_string());
        // Category 1: moisture
        tables.add_parameter(0, 1, 1, "RH".to_string());
        tables.add_parameter(0, 1, 8, "APCP".to_string());
        // Category 2: momentum
        tables.add_parameter(0, 2, 0, "WDIR".to_string());
        tables.add_parameter(0, 2, 1, "WIND".to_string());
        tables.add_parameter(0, 2, 2, "UGRD".to_string());
        tables.add_parameter(0, 2, 3, "VGRD".to_string());
        tables.add_parameter(0, 2, 22, "GUST".to_string());
        // Category 3: mass
        tables.add_parameter(0, 3, 0, "PRES".to_string());
        tables.add_parameter(0, 3, 1, "PRMSL".to_string());
        tables.add_parameter(0, 3, 5, "HGT".to_string());
        // Category 4: short-wave radiation
        tables.add_parameter(0, 4, 7, "DSWRF".to_string());
        tables.add_parameter(0, 4, 8, "USWRF".to_string());
        // Category 5: long-wave radiation
        tables.add_parameter(0, 5, 3, "DLWRF".to_string());
        // Category 6: cloud
        tables.add_parameter(0, 6, 1, "TCDC".to_string());

        tables.add_level(level_types::SURFACE, LevelDescription::Static("surface".to_string()));
        tables.add_level(
            level_types::CLOUD_BASE,
            LevelDescription::Static("cloud base".to_string()),
        );
        tables.add_level(
            level_types::TOP_OF_ATMOSPHERE,
            LevelDescription::Static("top of atmosphere".to_string()),
        );
        tables.add_level(
            level_types::ISOBARIC,
            LevelDescription::Template("{value_mb} mb".to_string()),
        );
        tables.add_level(
            level_types::MEAN_SEA_LEVEL,
            LevelDescription::Static("mean sea level".to_string()),
        );
        tables.add_level(
            level_types::HEIGHT_ABOVE_GROUND,
            LevelDescription::Template("{value} m above ground".to_string()),
        );
        tables.add_level(
            level_types::ENTIRE_ATMOSPHERE,
            LevelDescription::Static("entire atmosphere".to_string()),
        );

        tables
    }

    /// Add a parameter mapping
    pub fn add_parameter(&mut self, discipline: u8, category: u8, number: u8, name: String) {
        self.parameters.insert((discipline, category, number), name);
    }

    /// Add a level description mapping
    pub fn add_level(&mut self, level_type: u8, description: LevelDescription) {
        self.levels.insert(level_type, description);
    }

    /// Look up parameter short name by GRIB2 codes.
    ///
    /// Returns "P{discipline}_{category}_{number}" if not found.
    pub fn get_parameter_name(&self, discipline: u8, category: u8, number: u8) -> String {
        self.parameters
            .get(&(discipline, category, number))
            .cloned()
            .unwrap_or_else(|| format!("P{}_{}_{}", discipline, category, number))
    }

    /// Look up level description by type code and value.
    ///
    /// Returns "Level type {type} value {value}" if not found.
    pub fn get_level_description(&self, level_type: u8, level_value: f64) -> String {
        match self.levels.get(&level_type) {
            Some(desc) => desc.format(level_value),
            None => format!("Level type {} value {}", level_type, format_number(level_value)),
        }
    }

    pub fn parameter_count(&self) -> usize {
        self.parameters.len()
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty() && self.levels.is_empty()
    }
}
