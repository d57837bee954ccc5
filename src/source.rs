//! Contract between the orchestration pipeline and the observation data source.

use crate::datacube::Datacube;
use crate::error::DatacubeError;
use crate::models::{AnalyticsRequest, Collection, QueryOptions};

use async_trait::async_trait;

/// Trait for datacube retrieval.
///
/// This forms the contract between the pipeline and the data source.
#[async_trait]
pub trait DatacubeSource: Send + Sync {
    /// Retrieve one datacube per requested collection.
    ///
    /// Returns the datacubes together with an index-aligned list of the collections that
    /// produced non-empty results. Collections yielding zero qualifying observations are
    /// silently dropped from both lists; they are not errors.
    ///
    /// # Arguments
    ///
    /// * `request`: Geometry, time window and entity identifier for the query
    /// * `options`: Collections, bands, cloud mask policy and clear-coverage threshold
    async fn generate_datacubes(
        &self,
        request: &AnalyticsRequest,
        options: &QueryOptions,
    ) -> Result<(Vec<Datacube>, Vec<Collection>), DatacubeError>;
}
