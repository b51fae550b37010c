//! iri-profile: ionospheric profile retrieval and series aggregation
//!
//! Pipeline: [`aggregator::SeriesAggregator`] → [`client::RemoteModelClient`]
//! (one request per timestep) → [`parser::ProfileParser`] → back into the
//! aggregator's [`aggregator::SeriesTable`].

pub mod aggregator;
pub mod client;
pub mod error;
pub mod parser;
pub mod query;
pub mod session;

pub use crate::aggregator::{
    CoordinateTransform, PrecomputedGeographic, SeriesAggregator, SeriesEvent, SeriesSample,
    SeriesTable,
};
pub use crate::client::{ClientSettings, RawResult, RemoteModelClient};
pub use crate::error::{AggregateError, ClientError, FieldError, ParseError, SessionError};
pub use crate::parser::{ProfileParser, ProfileRow, ProfileTable, Quantity};
pub use crate::query::{CoordinateFrame, QueryParameters};
pub use crate::session::{InteractiveSession, Locator, SessionFactory};
