//! Per-call request parameters for the remote model
//!
//! [`QueryParameters`] is immutable once built and passed by value into the
//! client. [`QueryParameters::normalized`] applies the service limits; the
//! client always submits the normalized form.

use crate::error::ClientError;
use chrono::{DateTime, Utc};
use iri_common::time::FORM_FORMAT;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Highest altitude the remote model computes (km)
pub const SERVICE_MAX_ALT_KM: f64 = 2000.0;

/// Largest altitude step the service accepts (km)
pub const MAX_STEP_KM: f64 = 500.0;

/// Smallest altitude step the service accepts (km)
pub const MIN_STEP_KM: f64 = 1.0;

/// The form rejects exact poles
const FORM_LAT_LIMIT: f64 = 89.9;

/// Default model version label
pub const DEFAULT_MODEL_VERSION: &str = "IRI 2020";

/// Coordinate frame of the submitted latitude/longitude
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoordinateFrame {
    Geographic,
    Geomagnetic,
}

impl CoordinateFrame {
    /// Visible option text in the service's coordinate selector
    pub fn form_label(&self) -> &'static str {
        match self {
            CoordinateFrame::Geographic => "Geographic",
            CoordinateFrame::Geomagnetic => "Geomagnetic",
        }
    }

    /// Parse a frame alias, falling back to the form's default for unknown text
    pub fn from_alias(text: &str) -> Self {
        text.parse().unwrap_or(CoordinateFrame::Geomagnetic)
    }
}

impl FromStr for CoordinateFrame {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "geog" | "geographic" => Ok(CoordinateFrame::Geographic),
            "geom" | "geomagnetic" => Ok(CoordinateFrame::Geomagnetic),
            other => Err(format!("unknown coordinate frame '{}'", other)),
        }
    }
}

impl fmt::Display for CoordinateFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.form_label())
    }
}

/// One profile request
#[derive(Debug, Clone, PartialEq)]
pub struct QueryParameters {
    /// Observation instant (UT)
    pub instant: DateTime<Utc>,
    /// Longitude in degrees; normalized into [0, 360)
    pub longitude: f64,
    /// Latitude in degrees; clamped into [-90, 90]
    pub latitude: f64,
    /// Lowest profile altitude (km)
    pub min_alt: f64,
    /// Highest profile altitude (km)
    pub max_alt: f64,
    /// Altitude step (km)
    pub step_alt: f64,
    /// Model version label, e.g. "IRI 2020"
    pub model_version: String,
    pub frame: CoordinateFrame,
    /// Text file the retrieved output is written to
    pub destination: PathBuf,
}

impl QueryParameters {
    /// Request with the service's default altitude grid (0–2000 km every 50 km)
    pub fn new(
        instant: DateTime<Utc>,
        longitude: f64,
        latitude: f64,
        destination: impl Into<PathBuf>,
    ) -> Self {
        Self {
            instant,
            longitude,
            latitude,
            min_alt: 0.0,
            max_alt: SERVICE_MAX_ALT_KM,
            step_alt: 50.0,
            model_version: DEFAULT_MODEL_VERSION.to_string(),
            frame: CoordinateFrame::Geographic,
            destination: destination.into(),
        }
    }

    pub fn with_altitude_grid(mut self, min_alt: f64, max_alt: f64, step_alt: f64) -> Self {
        self.min_alt = min_alt;
        self.max_alt = max_alt;
        self.step_alt = step_alt;
        self
    }

    pub fn with_model_version(mut self, version: impl Into<String>) -> Self {
        self.model_version = version.into();
        self
    }

    pub fn with_frame(mut self, frame: CoordinateFrame) -> Self {
        self.frame = frame;
        self
    }

    /// Apply the service limits.
    ///
    /// Longitude wraps into [0, 360), latitude clamps to [-90, 90], altitude
    /// bounds clamp to [0, 2000] km and the step to [1, 500] km. Non-finite
    /// numbers cannot be clamped meaningfully and are rejected.
    pub fn normalized(mut self) -> Result<Self, ClientError> {
        for (name, value) in [
            ("longitude", self.longitude),
            ("latitude", self.latitude),
            ("min_alt", self.min_alt),
            ("max_alt", self.max_alt),
            ("step_alt", self.step_alt),
        ] {
            if !value.is_finite() {
                return Err(ClientError::InvalidQuery(format!(
                    "{} must be finite, got {}",
                    name, value
                )));
            }
        }

        self.longitude = normalize_longitude(self.longitude);
        self.latitude = self.latitude.clamp(-90.0, 90.0);
        self.min_alt = self.min_alt.clamp(0.0, SERVICE_MAX_ALT_KM);
        self.max_alt = self.max_alt.clamp(0.0, SERVICE_MAX_ALT_KM);
        self.step_alt = self.step_alt.clamp(MIN_STEP_KM, MAX_STEP_KM);
        Ok(self)
    }

    /// Form field values in submission order, formatted the way the service expects
    pub fn form_fields(&self) -> Vec<(&'static str, String)> {
        let form_lat = self.latitude.clamp(-FORM_LAT_LIMIT, FORM_LAT_LIMIT);
        vec![
            ("lat", format!("{:.6}", form_lat)),
            ("lon", format!("{:.6}", self.longitude)),
            ("start", format!("{:.1}", self.min_alt)),
            ("stop", format!("{:.1}", self.max_alt)),
            ("step", format!("{:.1}", self.step_alt)),
            ("datetime", self.instant.format(FORM_FORMAT).to_string()),
        ]
    }

    /// Candidate radio values for the model version, with and without the "IRI" prefix
    pub fn model_version_candidates(&self) -> Vec<String> {
        let full = self.model_version.trim().to_string();
        let bare = full.replace("IRI", "").trim().to_string();
        if bare.is_empty() || bare == full {
            vec![full]
        } else {
            vec![bare, full]
        }
    }
}

/// Wrap a longitude into [0, 360)
pub fn normalize_longitude(longitude: f64) -> f64 {
    let wrapped = longitude.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negative inputs
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> QueryParameters {
        QueryParameters::new(
            Utc.with_ymd_and_hms(2012, 2, 11, 10, 0, 0).unwrap(),
            0.0,
            0.0,
            "out.txt",
        )
    }

    #[test]
    fn test_longitude_wraps_into_range() {
        for (input, expected) in [
            (-10.0, 350.0),
            (370.0, 10.0),
            (360.0, 0.0),
            (0.0, 0.0),
            (-720.0, 0.0),
            (359.5, 359.5),
        ] {
            let lon = normalize_longitude(input);
            assert!((lon - expected).abs() < 1e-9, "{} -> {}", input, lon);
            assert!((0.0..360.0).contains(&lon));
        }
        assert!(normalize_longitude(-1e-20) < 360.0);
    }

    #[test]
    fn test_normalized_clamps_all_fields() {
        let mut params = sample().with_altitude_grid(-100.0, 5000.0, 0.0);
        params.latitude = 123.0;
        params.longitude = -45.0;

        let params = params.normalized().unwrap();
        assert_eq!(params.latitude, 90.0);
        assert_eq!(params.longitude, 315.0);
        assert_eq!(params.min_alt, 0.0);
        assert_eq!(params.max_alt, 2000.0);
        assert_eq!(params.step_alt, MIN_STEP_KM);

        let params = sample().with_altitude_grid(100.0, 1000.0, 900.0);
        assert_eq!(params.normalized().unwrap().step_alt, MAX_STEP_KM);
    }

    #[test]
    fn test_latitude_lower_clamp() {
        let mut params = sample();
        params.latitude = -91.5;
        assert_eq!(params.normalized().unwrap().latitude, -90.0);
    }

    #[test]
    fn test_non_finite_rejected() {
        let mut params = sample();
        params.latitude = f64::NAN;
        assert!(matches!(
            params.normalized(),
            Err(ClientError::InvalidQuery(_))
        ));
    }

    #[test]
    fn test_form_fields_formatting() {
        let mut params = sample().with_altitude_grid(80.0, 1500.0, 25.0);
        params.latitude = 90.0;
        params.longitude = 135.25;

        let fields = params.form_fields();
        let names: Vec<&str> = fields.iter().map(|(n, _)| *n).collect();
        assert_eq!(names, ["lat", "lon", "start", "stop", "step", "datetime"]);
        assert_eq!(fields[0].1, "89.900000");
        assert_eq!(fields[1].1, "135.250000");
        assert_eq!(fields[2].1, "80.0");
        assert_eq!(fields[3].1, "1500.0");
        assert_eq!(fields[4].1, "25.0");
        assert_eq!(fields[5].1, "2012-02-11T10:00:00");
    }

    #[test]
    fn test_model_version_candidates() {
        assert_eq!(sample().model_version_candidates(), ["2020", "IRI 2020"]);
        assert_eq!(
            sample().with_model_version("2016").model_version_candidates(),
            ["2016"]
        );
    }

    #[test]
    fn test_frame_aliases() {
        assert_eq!(CoordinateFrame::from_alias("geog"), CoordinateFrame::Geographic);
        assert_eq!(CoordinateFrame::from_alias("GEOGRAPHIC"), CoordinateFrame::Geographic);
        assert_eq!(CoordinateFrame::from_alias("geom"), CoordinateFrame::Geomagnetic);
        assert_eq!(CoordinateFrame::from_alias("bogus"), CoordinateFrame::Geomagnetic);
        assert!("bogus".parse::<CoordinateFrame>().is_err());
    }
}
