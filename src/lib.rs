pub mod aggregate;
pub mod backend;
pub mod cache;
pub mod columnar;
pub mod config;
pub mod engine;
pub mod error;
pub mod maintenance;
pub mod model;
pub mod partition;
pub mod planner;
pub mod stats;
pub mod tier;

pub use engine::{Engine, Health};
pub use error::{ErrorKind, QueryError, Result};
pub use model::{Aggregation, AssetId, DataSet, Fingerprint, Metadata, Plan, Query, Row, SensorId, Tier, TimeRange};
