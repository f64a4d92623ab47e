use anyhow::Result;

use crate::db::models::Delivery;

/// Trait that every delivery-table source must implement.
pub trait DeliverySource: Send + Sync {
    /// Load the full delivery sequence of one finished match.
    fn load(&self) -> Result<Vec<Delivery>>;

    /// Human-readable name for logging and output file naming.
    fn name(&self) -> &str;
}
