pub mod archive;
pub mod coerce;
pub mod cricsheet;
pub mod provider;
pub mod selection;
pub mod table;

pub use archive::{visit_documents, MatchDocument};
pub use cricsheet::flatten_match;
pub use provider::DeliverySource;
pub use selection::{BestMatch, MatchFilter};
pub use table::{discover_tables, DeliveryTable, TABLE_SUFFIX};

use std::path::PathBuf;
use thiserror::Error;

/// Failures while turning a match record into a delivery table.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to read archive {}: {source}", .path.display())]
    Archive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("match record has no innings array")]
    MissingInnings,

    #[error("invalid ball label '{0}'")]
    BallLabel(String),
}
