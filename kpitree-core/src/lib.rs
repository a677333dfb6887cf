//! KPI tree publishing core: domain types with no process or network I/O.
//!
//! - `date`: target dates, strictness, the localized date marker
//! - `query`: date parameterization of the stored analytical query
//! - `paths`: object URIs and the publication layout
//! - `calendar`: the calendar index document
//! - `collab`: traits for the generator, object storage, query store and operator

pub mod calendar;
pub mod collab;
pub mod date;
pub mod paths;
pub mod query;

pub use calendar::{CalendarIndex, Insert, Repair};
pub use collab::{
    AutoGate, GenerationError, HumanGate, ObjectStore, QueryStore, QueryStoreError,
    ReportGenerator, StorageError, StoredQuery,
};
pub use date::{DateError, DateMarker, DateStrictness, TargetDate};
pub use paths::{ObjectUri, PublicationPaths, UriError};
pub use query::{parameterize, parameterize_str, ParamStatus, Parameterized};
