//! Catalogue of source products and the variables assembled from them.
//!
//! Every variable is a closed [`VariableKind`] variant carrying its GRIB
//! field, file-name token, step policy, level axis and output naming, so no
//! string dispatch happens while a cycle is being assembled.

use std::fmt;
use std::str::FromStr;

use grib2_parser::tables::level_types::{HEIGHT_ABOVE_GROUND, SURFACE};
use serde::{Deserialize, Serialize};

use crate::error::AssemblyError;
use crate::reader::FieldSelector;

/// Source forecast product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Product {
    /// Canadian global deterministic model, one field per file.
    Gdps,
    /// NCEP global model, several fields per file.
    Gfs,
}

impl Product {
    /// Product label stored in dataset metadata.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Gdps => "GDPS",
            Self::Gfs => "GFS",
        }
    }

    /// Every variable this product provides, in output order.
    pub fn variables(&self) -> &'static [VariableKind] {
        match self {
            Self::Gdps => &[
                VariableKind::Ghi,
                VariableKind::TotalCloud,
                VariableKind::Temperature,
                VariableKind::WindSpeed,
                VariableKind::WindDirection,
            ],
            Self::Gfs => &[VariableKind::GfsShortwave, VariableKind::GfsTemperature2m],
        }
    }

    /// Name of the cycle date axis.
    pub fn date_axis(&self) -> &'static str {
        match self {
            Self::Gdps => "forecastdate",
            Self::Gfs => "date",
        }
    }

    /// Name of the cycle time-of-day axis.
    pub fn time_axis(&self) -> &'static str {
        match self {
            Self::Gdps => "forecasttime",
            Self::Gfs => "time",
        }
    }

    /// Whether each file holds a single field (so files are selected per
    /// variable by name) rather than every field of a lead time.
    pub fn one_field_per_file(&self) -> bool {
        matches!(self, Self::Gdps)
    }
}

impl fmt::Display for Product {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Product {
    type Err = AssemblyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gdps" | "cmc" => Ok(Self::Gdps),
            "gfs" => Ok(Self::Gfs),
            other => Err(AssemblyError::InvalidConfig(format!(
                "unknown product '{}', expected gdps or gfs",
                other
            ))),
        }
    }
}

/// Where a variable's lead-time axis starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepPolicy {
    /// Defined at the initial time; the axis starts at 0h.
    FromInitial,
    /// Accumulated or averaged, undefined at the initial time. The lead-0
    /// file is dropped and the axis starts one interval in.
    AfterInitial,
}

impl StepPolicy {
    /// First lead hour of the axis for a given step interval.
    pub fn offset_hours(&self, interval_hours: u32) -> u32 {
        match self {
            Self::FromInitial => 0,
            Self::AfterInitial => interval_hours,
        }
    }
}

/// Vertical level axis of a level-resolving variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelAxis {
    pub name: &'static str,
    /// Units of the level token in source file names.
    pub units: &'static str,
    pub long_name: &'static str,
}

pub const AIR_PRESSURE: LevelAxis = LevelAxis {
    name: "air_pressure",
    units: "hPa",
    long_name: "air pressure",
};

pub const GROUND_LEVEL: LevelAxis = LevelAxis {
    name: "ground_level",
    units: "m",
    long_name: "height above ground",
};

/// A physical variable assembled into cycle datasets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableKind {
    /// GDPS downward short-wave radiation flux at the surface.
    Ghi,
    /// GDPS total cloud cover.
    TotalCloud,
    /// GDPS temperature on isobaric levels.
    Temperature,
    /// GDPS wind speed above ground.
    WindSpeed,
    /// GDPS wind direction above ground.
    WindDirection,
    /// GFS downward short-wave radiation flux at the surface.
    GfsShortwave,
    /// GFS 2 m temperature.
    GfsTemperature2m,
}

impl VariableKind {
    pub fn product(&self) -> Product {
        match self {
            Self::Ghi
            | Self::TotalCloud
            | Self::Temperature
            | Self::WindSpeed
            | Self::WindDirection => Product::Gdps,
            Self::GfsShortwave | Self::GfsTemperature2m => Product::Gfs,
        }
    }

    /// Configuration key, e.g. `wind_speed`.
    pub fn key(&self) -> &'static str {
        match self {
            Self::Ghi => "ghi",
            Self::TotalCloud => "total_cloud",
            Self::Temperature => "temperature",
            Self::WindSpeed => "wind_speed",
            Self::WindDirection => "wind_direction",
            Self::GfsShortwave => "gfs_shortwave",
            Self::GfsTemperature2m => "gfs_temperature_2m",
        }
    }

    /// Name of the variable in the output dataset.
    pub fn output_name(&self) -> &'static str {
        match self {
            Self::Ghi | Self::GfsShortwave => "ghi",
            Self::TotalCloud => "cloud",
            Self::Temperature => "temperature",
            Self::WindSpeed => "wind_speed",
            Self::WindDirection => "wind_direction",
            Self::GfsTemperature2m => "temperature_2m",
        }
    }

    pub fn long_name(&self) -> &'static str {
        match self {
            Self::Ghi | Self::GfsShortwave => "downward short-wave radiation flux",
            Self::TotalCloud => "total cloud cover",
            Self::Temperature => "air temperature",
            Self::WindSpeed => "wind speed",
            Self::WindDirection => "wind direction",
            Self::GfsTemperature2m => "air temperature at 2 m",
        }
    }

    pub fn units(&self) -> &'static str {
        match self {
            Self::Ghi | Self::GfsShortwave => "W m-2",
            Self::TotalCloud => "%",
            Self::Temperature | Self::GfsTemperature2m => "K",
            Self::WindSpeed => "m s-1",
            Self::WindDirection => "degree",
        }
    }

    /// `<VAR>_<LEVTYPE>` token identifying the variable's files, for
    /// products with one field per file.
    pub fn file_token(&self) -> Option<&'static str> {
        match self {
            Self::Ghi => Some("DSWRF_SFC"),
            Self::TotalCloud => Some("TCDC_SFC"),
            Self::Temperature => Some("TMP_ISBL"),
            Self::WindSpeed => Some("WIND_TGL"),
            Self::WindDirection => Some("WDIR_TGL"),
            Self::GfsShortwave | Self::GfsTemperature2m => None,
        }
    }

    /// Which GRIB field holds the variable.
    pub fn selector(&self) -> FieldSelector {
        match self {
            Self::Ghi => FieldSelector::parameter("DSWRF"),
            Self::TotalCloud => FieldSelector::parameter("TCDC"),
            Self::Temperature => FieldSelector::parameter("TMP"),
            Self::WindSpeed => FieldSelector::parameter("WIND"),
            Self::WindDirection => FieldSelector::parameter("WDIR"),
            Self::GfsShortwave => FieldSelector::parameter("DSWRF").at_level_type(SURFACE),
            Self::GfsTemperature2m => FieldSelector::parameter("TMP").at_level(HEIGHT_ABOVE_GROUND, 2.0),
        }
    }

    pub fn step_policy(&self) -> StepPolicy {
        match self {
            Self::Ghi | Self::GfsShortwave | Self::GfsTemperature2m => StepPolicy::AfterInitial,
            Self::TotalCloud | Self::Temperature | Self::WindSpeed | Self::WindDirection => {
                StepPolicy::FromInitial
            }
        }
    }

    /// Level axis for level-resolving variables.
    pub fn level_axis(&self) -> Option<LevelAxis> {
        match self {
            Self::Temperature => Some(AIR_PRESSURE),
            Self::WindSpeed | Self::WindDirection => Some(GROUND_LEVEL),
            _ => None,
        }
    }

    /// Name of the variable's lead-time axis.
    pub fn lead_axis(&self) -> &'static str {
        match self {
            Self::Ghi => "step_ghi",
            Self::TotalCloud => "step_cloud",
            Self::Temperature => "step_temp",
            Self::WindSpeed | Self::WindDirection => "step_wind",
            Self::GfsShortwave | Self::GfsTemperature2m => "step",
        }
    }
}

impl fmt::Display for VariableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for VariableKind {
    type Err = AssemblyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Product::Gdps
            .variables()
            .iter()
            .chain(Product::Gfs.variables())
            .find(|kind| kind.key() == s)
            .copied()
            .ok_or_else(|| AssemblyError::InvalidConfig(format!("unknown variable '{}'", s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalogue_belongs_to_its_product() {
        for product in [Product::Gdps, Product::Gfs] {
            for kind in product.variables() {
                assert_eq!(kind.product(), product);
                assert_eq!(kind.file_token().is_some(), product.one_field_per_file());
            }
        }
    }

    #[test]
    fn test_output_names_unique_per_product() {
        for product in [Product::Gdps, Product::Gfs] {
            let mut names: Vec<_> = product.variables().iter().map(|k| k.output_name()).collect();
            names.sort();
            names.dedup();
            assert_eq!(names.len(), product.variables().len());
        }
    }

    #[test]
    fn test_step_offsets() {
        assert_eq!(VariableKind::Ghi.step_policy().offset_hours(3), 3);
        assert_eq!(VariableKind::TotalCloud.step_policy().offset_hours(3), 0);
        assert_eq!(VariableKind::GfsTemperature2m.step_policy().offset_hours(6), 6);
    }

    #[test]
    fn test_gfs_selectors_pin_level() {
        let shortwave = VariableKind::GfsShortwave.selector();
        assert_eq!(shortwave.parameter, "DSWRF");
        assert_eq!(shortwave.level_type, Some(1));
        assert_eq!(shortwave.level_value, None);

        let t2m = VariableKind::GfsTemperature2m.selector();
        assert_eq!(t2m.level_type, Some(103));
        assert_eq!(t2m.level_value, Some(2.0));

        assert_eq!(VariableKind::Temperature.selector().level_type, None);
    }

    #[test]
    fn test_wind_variables_share_axes() {
        assert_eq!(VariableKind::WindSpeed.lead_axis(), VariableKind::WindDirection.lead_axis());
        assert_eq!(VariableKind::WindSpeed.level_axis(), Some(GROUND_LEVEL));
        assert_eq!(VariableKind::Temperature.level_axis(), Some(AIR_PRESSURE));
        assert_eq!(VariableKind::Ghi.level_axis(), None);
    }

    #[test]
    fn test_parse_keys() {
        for kind in Product::Gdps.variables().iter().chain(Product::Gfs.variables()) {
            assert_eq!(kind.key().parse::<VariableKind>().unwrap(), *kind);
        }
        assert!("humidity".parse::<VariableKind>().is_err());
        assert_eq!("GDPS".parse::<Product>().unwrap(), Product::Gdps);
        assert!("hrrr".parse::<Product>().is_err());
    }

    #[test]
    fn test_serde_keys_match() {
        let yaml = serde_yaml::to_string(&VariableKind::GfsTemperature2m).unwrap();
        assert_eq!(yaml.trim(), "gfs_temperature_2m");
        let kind: VariableKind = serde_yaml::from_str("total_cloud").unwrap();
        assert_eq!(kind, VariableKind::TotalCloud);
    }
}
