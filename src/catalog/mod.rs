//! The catalog: a durable, queryable store of one row per analyzable file
//! (§4.1), replacing the teacher's media-library schema.

mod record;
mod store;

pub use record::{FeatureUpdate, HighLevelAttribs, ScalarConstraints, Tags, TrackRecord, HL_ATTRIB_NAMES};
pub use store::{Catalog, CatalogWriter, FeatureKind, HEAVY_COMMIT_INTERVAL, LIGHT_COMMIT_INTERVAL};
