//! Time-series aggregation
//!
//! Walks an external time/coordinate series, retrieves and parses one profile
//! per timestep, and samples each profile at the timestep's own altitude.
//!
//! All timesteps share one scratch destination. The run is strictly
//! sequential and any failed timestep aborts the whole batch; the scratch
//! file is removed afterwards on every path.

use crate::client::RemoteModelClient;
use crate::error::AggregateError;
use crate::parser::{ProfileParser, Quantity};
use crate::query::{normalize_longitude, CoordinateFrame, QueryParameters, SERVICE_MAX_ALT_KM};
use crate::session::SessionFactory;
use chrono::{DateTime, Utc};
use iri_common::human_time::progress_line;
use iri_common::time::unix_to_datetime;
use ndarray::{Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Coordinate-transform collaborator.
///
/// Called once per aggregation with the full series. Returns an `(N, 3)`
/// array of `(altitude km, latitude deg, longitude deg)` in geographic terms;
/// rows that cannot be transformed may carry NaN.
pub trait CoordinateTransform: Send + Sync {
    fn to_geographic(
        &self,
        times: &[f64],
        coordinates: ArrayView2<'_, f64>,
    ) -> Result<Array2<f64>, AggregateError>;
}

/// Identity transform for series already given as `(altitude km, latitude, longitude)`
#[derive(Debug, Clone, Copy, Default)]
pub struct PrecomputedGeographic;

impl CoordinateTransform for PrecomputedGeographic {
    fn to_geographic(
        &self,
        _times: &[f64],
        coordinates: ArrayView2<'_, f64>,
    ) -> Result<Array2<f64>, AggregateError> {
        Ok(coordinates.to_owned())
    }
}

/// One output row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesSample {
    /// Requested time (Unix seconds)
    pub time: f64,
    /// Requested altitude (m)
    pub altitude: f64,
    /// Altitude of the matched profile row (m)
    pub matched_altitude: f64,
    pub latitude: f64,
    /// Longitude in [0, 360)
    pub longitude: f64,
    /// Electron density (m⁻³)
    #[serde(rename = "Ne")]
    pub electron_density: f64,
    #[serde(rename = "O+")]
    pub o_plus: f64,
    #[serde(rename = "N+")]
    pub n_plus: f64,
    #[serde(rename = "H+")]
    pub h_plus: f64,
    #[serde(rename = "He+")]
    pub he_plus: f64,
    #[serde(rename = "O2+")]
    pub o2_plus: f64,
    #[serde(rename = "NO+")]
    pub no_plus: f64,
}

impl SeriesSample {
    /// Value of a recorded quantity; `None` for quantities not sampled
    pub fn get(&self, quantity: Quantity) -> Option<f64> {
        match quantity {
            Quantity::ElectronDensity => Some(self.electron_density),
            Quantity::OxygenIon => Some(self.o_plus),
            Quantity::NitrogenIon => Some(self.n_plus),
            Quantity::HydrogenIon => Some(self.h_plus),
            Quantity::HeliumIon => Some(self.he_plus),
            Quantity::MolecularOxygenIon => Some(self.o2_plus),
            Quantity::NitricOxideIon => Some(self.no_plus),
            Quantity::Altitude => Some(self.altitude),
            _ => None,
        }
    }
}

/// Aggregated series, samples in input order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeriesTable {
    pub samples: Vec<SeriesSample>,
}

impl SeriesTable {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn times(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.time).collect()
    }

    /// Requested altitudes (m)
    pub fn altitude(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.altitude).collect()
    }

    /// Column of a sampled quantity; empty for quantities not sampled
    pub fn column(&self, quantity: Quantity) -> Vec<f64> {
        self.samples.iter().filter_map(|s| s.get(quantity)).collect()
    }
}

/// Progress notifications for an external display
#[derive(Debug, Clone, PartialEq)]
pub enum SeriesEvent {
    Started { total: usize },
    Progress { index: usize, total: usize, elapsed: Duration },
    /// Timestep outside the service range; no request issued
    Skipped { index: usize, altitude_km: f64 },
    Completed { samples: usize },
    Aborted { index: usize, reason: String },
}

/// Geographic position of one timestep, or `None` when out of range
#[derive(Debug, Clone, Copy, PartialEq)]
struct Position {
    altitude_km: f64,
    latitude: f64,
    longitude: f64,
}

fn valid_position(row: &[f64]) -> Option<Position> {
    let (altitude_km, latitude, longitude) = (row[0], row[1], row[2]);
    if altitude_km.is_nan() || altitude_km > SERVICE_MAX_ALT_KM {
        return None;
    }
    if !latitude.is_finite() || !longitude.is_finite() {
        return None;
    }
    Some(Position {
        altitude_km,
        latitude,
        longitude: normalize_longitude(longitude),
    })
}

/// Series aggregator over a remote model client
pub struct SeriesAggregator<F, T> {
    client: RemoteModelClient<F>,
    transform: T,
    parser: ProfileParser,
    scratch: PathBuf,
    max_retries: u32,
    model_version: String,
    frame: CoordinateFrame,
    events: Option<UnboundedSender<SeriesEvent>>,
}

impl<F: SessionFactory, T: CoordinateTransform> SeriesAggregator<F, T> {
    pub fn new(client: RemoteModelClient<F>, transform: T, scratch: impl Into<PathBuf>) -> Self {
        Self {
            client,
            transform,
            parser: ProfileParser::new(),
            scratch: scratch.into(),
            max_retries: 3,
            model_version: crate::query::DEFAULT_MODEL_VERSION.to_string(),
            frame: CoordinateFrame::Geographic,
            events: None,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
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

    /// Publish progress events on `sender`
    pub fn with_events(mut self, sender: UnboundedSender<SeriesEvent>) -> Self {
        self.events = Some(sender);
        self
    }

    pub fn scratch_path(&self) -> &PathBuf {
        &self.scratch
    }

    /// Aggregate a series.
    ///
    /// `coordinates` must be `(N, 3)` with `N == times.len()`; both are checked
    /// before any request is issued. Any retrieval or parse failure aborts the
    /// batch.
    pub async fn aggregate(
        &self,
        times: &[f64],
        coordinates: ArrayView2<'_, f64>,
        altitude_step: f64,
    ) -> Result<SeriesTable, AggregateError> {
        if times.len() != coordinates.nrows() {
            error!(
                "The lengths of times ({}) and coordinates ({}) must be same",
                times.len(),
                coordinates.nrows()
            );
            return Err(AggregateError::LengthMismatch {
                times: times.len(),
                coordinates: coordinates.nrows(),
            });
        }
        if coordinates.ncols() != 3 {
            error!(shape = ?coordinates.shape(), "Coordinate shape error");
            return Err(AggregateError::BadShape(coordinates.shape().to_vec()));
        }

        let geographic = self.transform.to_geographic(times, coordinates)?;
        if geographic.dim() != (times.len(), 3) {
            return Err(AggregateError::Transform(format!(
                "expected ({}, 3), got {:?}",
                times.len(),
                geographic.shape()
            )));
        }

        let instants = times
            .iter()
            .map(|&t| unix_to_datetime(t))
            .collect::<Result<Vec<_>, _>>()?;

        let outcome = self
            .collect(times, &instants, geographic.view(), altitude_step)
            .await;

        self.remove_scratch().await;

        match &outcome {
            Ok(table) => {
                info!(samples = table.len(), "Series complete");
                self.emit(SeriesEvent::Completed {
                    samples: table.len(),
                });
            }
            Err(e) => error!(error = %e, "Series aborted"),
        }
        outcome
    }

    async fn collect(
        &self,
        times: &[f64],
        instants: &[DateTime<Utc>],
        geographic: ArrayView2<'_, f64>,
        altitude_step: f64,
    ) -> Result<SeriesTable, AggregateError> {
        let total = times.len();
        let started = Instant::now();
        let mut table = SeriesTable::default();
        self.emit(SeriesEvent::Started { total });

        for (index, row) in geographic.axis_iter(Axis(0)).enumerate() {
            let elapsed = started.elapsed();
            info!("{}", progress_line(index, total, elapsed));
            self.emit(SeriesEvent::Progress {
                index,
                total,
                elapsed,
            });

            let Some(position) = valid_position(&[row[0], row[1], row[2]]) else {
                debug!(index, altitude_km = row[0], "Out of service range, skipped");
                self.emit(SeriesEvent::Skipped {
                    index,
                    altitude_km: row[0],
                });
                continue;
            };

            let params = QueryParameters::new(
                instants[index],
                position.longitude,
                position.latitude,
                self.scratch.clone(),
            )
            .with_altitude_grid(0.0, SERVICE_MAX_ALT_KM, altitude_step)
            .with_model_version(self.model_version.clone())
            .with_frame(self.frame);

            let raw = match self.client.run(params, self.max_retries).await {
                Ok(raw) => raw,
                Err(source) => {
                    warn!(index, "Profile retrieval failed");
                    self.emit(SeriesEvent::Aborted {
                        index,
                        reason: source.to_string(),
                    });
                    return Err(AggregateError::Retrieval { index, source });
                }
            };

            let altitude_m = position.altitude_km * 1e3;
            let matched = self
                .parser
                .parse(&raw)
                .and_then(|profile| profile.nearest_row(altitude_m).map(|(_, r)| *r));
            let Some(matched) = matched else {
                self.emit(SeriesEvent::Aborted {
                    index,
                    reason: "profile parse failed".to_string(),
                });
                return Err(AggregateError::Parse { index });
            };

            table.samples.push(SeriesSample {
                time: times[index],
                altitude: altitude_m,
                matched_altitude: matched.altitude(),
                latitude: position.latitude,
                longitude: position.longitude,
                electron_density: matched.get(Quantity::ElectronDensity),
                o_plus: matched.get(Quantity::OxygenIon),
                n_plus: matched.get(Quantity::NitrogenIon),
                h_plus: matched.get(Quantity::HydrogenIon),
                he_plus: matched.get(Quantity::HeliumIon),
                o2_plus: matched.get(Quantity::MolecularOxygenIon),
                no_plus: matched.get(Quantity::NitricOxideIon),
            });
        }

        Ok(table)
    }

    async fn remove_scratch(&self) {
        match tokio::fs::remove_file(&self.scratch).await {
            Ok(()) => info!("Deleted temporal file: {}", self.scratch.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                path = %self.scratch.display(),
                error = %e,
                "Could not delete scratch file"
            ),
        }
    }

    fn emit(&self, event: SeriesEvent) {
        if let Some(tx) = &self.events {
            // Receiver gone means nobody is watching
            let _ = tx.send(event);
        }
    }
}
