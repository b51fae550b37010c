//! Profile text parser
//!
//! Turns the service's human-oriented report into a typed, unit-normalized
//! [`ProfileTable`]. The report interleaves narrative text with the data block
//! without delimiters, so rows are recognized by shape: at least
//! [`MIN_ROW_TOKENS`] whitespace-separated tokens with a numeric first token.
//! Everything else is skipped.

use crate::client::RawResult;
use crate::error::ParseError;
use chrono::{DateTime, Utc};
use iri_common::time::{datetime_to_unix, format_calendar, from_day_of_year};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;
use std::path::Path;
use tracing::{debug, warn};

/// Zero-based line index of the observation-time header
pub const HEADER_LINE: usize = 3;

/// Minimum token count for a data row
pub const MIN_ROW_TOKENS: usize = 10;

/// Number of columns in a profile row
pub const COLUMN_COUNT: usize = 15;

/// `<year>/<signed day-of-year>/<fractional UT hour>UT`
static HEADER_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{4})/\s*(-?\d+)/\s*([\d.]+)UT").expect("header pattern is valid")
});

/// Profile columns, in report order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Quantity {
    /// Altitude (m)
    Altitude,
    /// Electron density (m⁻³)
    ElectronDensity,
    /// Ne / NmF2
    DensityRatio,
    /// Neutral temperature (K)
    NeutralTemp,
    /// Ion temperature (K)
    IonTemp,
    /// Electron temperature (K)
    ElectronTemp,
    /// O+ composition (%)
    OxygenIon,
    /// N+ composition (%)
    NitrogenIon,
    /// H+ composition (%)
    HydrogenIon,
    /// He+ composition (%)
    HeliumIon,
    /// O2+ composition (%)
    MolecularOxygenIon,
    /// NO+ composition (%)
    NitricOxideIon,
    /// Cluster ions (×1e16)
    Cluster,
    /// Total electron content (m⁻²)
    Tec,
    /// Trailing TEC percentage column (×1e16)
    TecPercent,
}

impl Quantity {
    pub const ALL: [Quantity; COLUMN_COUNT] = [
        Quantity::Altitude,
        Quantity::ElectronDensity,
        Quantity::DensityRatio,
        Quantity::NeutralTemp,
        Quantity::IonTemp,
        Quantity::ElectronTemp,
        Quantity::OxygenIon,
        Quantity::NitrogenIon,
        Quantity::HydrogenIon,
        Quantity::HeliumIon,
        Quantity::MolecularOxygenIon,
        Quantity::NitricOxideIon,
        Quantity::Cluster,
        Quantity::Tec,
        Quantity::TecPercent,
    ];

    /// Six ion-composition columns
    pub const COMPOSITION: [Quantity; 6] = [
        Quantity::OxygenIon,
        Quantity::NitrogenIon,
        Quantity::HydrogenIon,
        Quantity::HeliumIon,
        Quantity::MolecularOxygenIon,
        Quantity::NitricOxideIon,
    ];

    /// Column position in a row
    pub fn index(self) -> usize {
        self as usize
    }

    /// Short column label as printed in the report header
    pub fn label(self) -> &'static str {
        match self {
            Quantity::Altitude => "altitude",
            Quantity::ElectronDensity => "Ne",
            Quantity::DensityRatio => "Ne/NmF2",
            Quantity::NeutralTemp => "Tn",
            Quantity::IonTemp => "Ti",
            Quantity::ElectronTemp => "Te",
            Quantity::OxygenIon => "O+",
            Quantity::NitrogenIon => "N+",
            Quantity::HydrogenIon => "H+",
            Quantity::HeliumIon => "He+",
            Quantity::MolecularOxygenIon => "O2+",
            Quantity::NitricOxideIon => "NO+",
            Quantity::Cluster => "Clust",
            Quantity::Tec => "TEC",
            Quantity::TecPercent => "t/%",
        }
    }

    /// Convert a raw service value to MKSA units
    pub fn to_mksa(self, raw: f64) -> f64 {
        match self {
            Quantity::Altitude => raw * 1e3,
            Quantity::ElectronDensity => raw * 1e6,
            Quantity::OxygenIon
            | Quantity::NitrogenIon
            | Quantity::HydrogenIon
            | Quantity::HeliumIon
            | Quantity::MolecularOxygenIon
            | Quantity::NitricOxideIon => raw / 10.0,
            Quantity::Cluster | Quantity::Tec | Quantity::TecPercent => raw * 1e16,
            Quantity::DensityRatio
            | Quantity::NeutralTemp
            | Quantity::IonTemp
            | Quantity::ElectronTemp => raw,
        }
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One altitude row, MKSA units
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProfileRow {
    values: [f64; COLUMN_COUNT],
}

impl ProfileRow {
    /// Build a row from raw report tokens.
    ///
    /// Missing trailing cells and non-numeric tokens become NaN; tokens
    /// beyond [`COLUMN_COUNT`] are ignored.
    fn from_tokens(tokens: &[&str]) -> Self {
        let mut values = [f64::NAN; COLUMN_COUNT];
        for (quantity, token) in Quantity::ALL.iter().zip(tokens) {
            let raw = token.parse::<f64>().unwrap_or(f64::NAN);
            values[quantity.index()] = quantity.to_mksa(raw);
        }
        Self { values }
    }

    pub fn get(&self, quantity: Quantity) -> f64 {
        self.values[quantity.index()]
    }

    /// Altitude (m)
    pub fn altitude(&self) -> f64 {
        self.get(Quantity::Altitude)
    }

    pub fn values(&self) -> &[f64; COLUMN_COUNT] {
        &self.values
    }
}

/// Parsed altitude profile at one observation time
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileTable {
    pub observation_time: DateTime<Utc>,
    rows: Vec<ProfileRow>,
}

impl ProfileTable {
    pub fn new(observation_time: DateTime<Utc>, rows: Vec<ProfileRow>) -> Self {
        Self {
            observation_time,
            rows,
        }
    }

    /// Observation time as Unix seconds
    pub fn observation_unix(&self) -> f64 {
        datetime_to_unix(&self.observation_time)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[ProfileRow] {
        &self.rows
    }

    pub fn row(&self, index: usize) -> Option<&ProfileRow> {
        self.rows.get(index)
    }

    /// One column across all rows
    pub fn column(&self, quantity: Quantity) -> Vec<f64> {
        self.rows.iter().map(|r| r.get(quantity)).collect()
    }

    /// Row whose altitude is nearest `altitude_m`.
    ///
    /// Ties go to the first (lowest) row. Rows with an unknown altitude never match.
    pub fn nearest_row(&self, altitude_m: f64) -> Option<(usize, &ProfileRow)> {
        let mut best: Option<(usize, f64)> = None;
        for (i, row) in self.rows.iter().enumerate() {
            let distance = (row.altitude() - altitude_m).abs();
            if distance.is_nan() {
                continue;
            }
            if best.map_or(true, |(_, d)| distance < d) {
                best = Some((i, distance));
            }
        }
        best.map(|(i, _)| (i, &self.rows[i]))
    }

    /// Altitudes must be strictly increasing
    pub fn check_monotonic(&self) -> Result<(), ParseError> {
        for (index, pair) in self.rows.windows(2).enumerate() {
            let (previous, current) = (pair[0].altitude(), pair[1].altitude());
            if current.partial_cmp(&previous) != Some(Ordering::Greater) {
                return Err(ParseError::NonMonotonicAltitude {
                    index: index + 1,
                    previous,
                    current,
                });
            }
        }
        Ok(())
    }
}

/// Report parser
///
/// `parse*` methods fail soft and log the cause; `try_parse*` expose it.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProfileParser;

impl ProfileParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse a retrieved result
    pub fn parse(&self, raw: &RawResult) -> Option<ProfileTable> {
        soft(self.try_parse(raw))
    }

    /// Read and parse a text file
    pub fn parse_file(&self, path: impl AsRef<Path>) -> Option<ProfileTable> {
        soft(self.try_parse_file(path))
    }

    pub fn try_parse(&self, raw: &RawResult) -> Result<ProfileTable, ParseError> {
        require_text(&raw.destination)?;
        self.try_parse_text(&raw.text)
    }

    pub fn try_parse_file(&self, path: impl AsRef<Path>) -> Result<ProfileTable, ParseError> {
        let path = path.as_ref();
        require_text(path)?;
        let text = std::fs::read_to_string(path)?;
        self.try_parse_text(&text)
    }

    /// Parse report text directly
    pub fn try_parse_text(&self, text: &str) -> Result<ProfileTable, ParseError> {
        let lines: Vec<&str> = text.lines().collect();
        if lines.len() <= HEADER_LINE {
            return Err(ParseError::TooShort(lines.len()));
        }

        let observation_time = parse_header(lines[HEADER_LINE])?;

        let rows: Vec<ProfileRow> = lines
            .iter()
            .filter_map(|line| {
                let tokens: Vec<&str> = line.split_whitespace().collect();
                if tokens.len() < MIN_ROW_TOKENS || tokens[0].parse::<f64>().is_err() {
                    return None;
                }
                Some(ProfileRow::from_tokens(&tokens))
            })
            .collect();

        if rows.is_empty() {
            return Err(ParseError::NoRows);
        }

        let table = ProfileTable::new(observation_time, rows);
        table.check_monotonic()?;
        debug!(
            rows = table.len(),
            time = %format_calendar(&table.observation_time),
            "Parsed profile"
        );
        Ok(table)
    }
}

/// Resolve the observation time from the header line
pub fn parse_header(line: &str) -> Result<DateTime<Utc>, ParseError> {
    let caps = HEADER_PATTERN
        .captures(line)
        .ok_or(ParseError::MissingHeader(HEADER_LINE))?;

    let bad = |what: &str| ParseError::BadHeader(format!("{} in '{}'", what, line.trim()));

    let year: i32 = caps[1].parse().map_err(|_| bad("year"))?;
    // The service signs offset days; only the magnitude is a day-of-year
    let day_of_year: u32 = caps[2]
        .trim_start_matches('-')
        .parse()
        .map_err(|_| bad("day-of-year"))?;
    let ut_hours: f64 = caps[3].parse().map_err(|_| bad("UT hour"))?;

    from_day_of_year(year, day_of_year, ut_hours).map_err(|e| ParseError::BadHeader(e.to_string()))
}

fn require_text(path: &Path) -> Result<(), ParseError> {
    let ok = path.to_str().map_or(false, |s| s.ends_with("txt"));
    if ok {
        Ok(())
    } else {
        Err(ParseError::NotText(path.to_path_buf()))
    }
}

fn soft(result: Result<ProfileTable, ParseError>) -> Option<ProfileTable> {
    match result {
        Ok(table) => Some(table),
        Err(e) => {
            warn!(error = %e, "Profile parse failed");
            None
        }
    }
}
