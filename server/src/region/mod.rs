//! Region geometry module
//!
//! Handles discovery, lazy loading and caching of per-region boundary shards,
//! and resolution of postal codes to the region that holds their boundary.

pub mod cache;
pub mod discovery;
pub mod index;
pub mod reader;
pub mod single_flight;
pub mod types;

pub use cache::RegionShardCache;
pub use discovery::{ShardManifest, discover_shards};
pub use index::{MatchBasis, PostalRegionIndex, RegionMatch, RegionTable, Unresolved};
pub use reader::{GeoJsonShardReader, ShardReader};
pub use single_flight::SingleFlight;
pub use types::{BoundaryRecord, GeometryShard, ShardError};
