//! Conversion of datacubes to chunked Zarr artifacts on disk.

use crate::datacube::Datacube;
use crate::error::DatacubeError;
use crate::models::Collection;

use std::path::PathBuf;
use std::sync::Arc;
use time::format_description::well_known::Rfc3339;
use time::Date;
use zarrs::array::{ArrayBuilder, ChunkGrid, DataType, FillValue, ZARR_NAN_F32};
use zarrs::filesystem::FilesystemStore;
use zarrs::group::GroupBuilder;
use zarrs::storage::ReadableWritableListableStorage;

/// Side length of the spatial chunks written to each artifact.
const SPATIAL_CHUNK: u64 = 256;

/// Trait for converting datacubes into uploadable artifacts.
///
/// This forms the contract between the pipeline and the artifact format.
pub trait ArtifactWriter: Send + Sync {
    /// Convert a merged metacube, named from the entity and date range only.
    fn write_merged(
        &self,
        cube: Datacube,
        entity_id: &str,
        start_date: Date,
        end_date: Date,
    ) -> Result<PathBuf, DatacubeError>;

    /// Convert one sensor's datacube, named from the entity, date range and collection.
    fn write_sensor(
        &self,
        cube: Datacube,
        entity_id: &str,
        start_date: Date,
        end_date: Date,
        collection: Collection,
    ) -> Result<PathBuf, DatacubeError>;
}

/// Artifact name for a merged metacube.
///
/// Identical inputs always produce identical names, so re-runs replace rather than accumulate.
pub fn merged_artifact_name(entity_id: &str, start_date: Date, end_date: Date) -> String {
    format!("{}_{}_{}.zarr", entity_id, start_date, end_date)
}

/// Artifact name for a single sensor's datacube.
pub fn sensor_artifact_name(
    entity_id: &str,
    start_date: Date,
    end_date: Date,
    collection: Collection,
) -> String {
    format!("{}_{}_{}_{}.zarr", entity_id, start_date, end_date, collection)
}

/// Converter that writes datacubes as Zarr hierarchies under an output directory.
///
/// Each artifact holds one chunked `float32` array at `/measurements` with dimensions
/// time, band, y and x; coordinates are recorded as array attributes.
pub struct ZarrConverter {
    output_dir: PathBuf,
}

impl ZarrConverter {
    /// Create and return a [ZarrConverter].
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    fn write(&self, cube: Datacube, name: &str) -> Result<PathBuf, DatacubeError> {
        std::fs::create_dir_all(&self.output_dir)?;
        let path = self.output_dir.join(name);
        // Names are deterministic; a re-run replaces the previous artifact.
        if path.exists() {
            std::fs::remove_dir_all(&path)?;
        }

        let store: ReadableWritableListableStorage = Arc::new(FilesystemStore::new(&path)?);
        GroupBuilder::new()
            .build(store.clone(), "/")?
            .store_metadata()?;

        let times: Vec<String> = cube
            .times
            .iter()
            .map(|timestamp| timestamp.format(&Rfc3339))
            .collect::<Result<_, _>>()?;
        let mut attributes = serde_json::Map::new();
        attributes.insert("times".to_string(), serde_json::json!(times));
        attributes.insert("bands".to_string(), serde_json::json!(cube.bands));
        attributes.insert("y".to_string(), serde_json::json!(cube.y));
        attributes.insert("x".to_string(), serde_json::json!(cube.x));

        let (num_times, num_bands, height, width) = cube.values.dim();
        let shape = vec![
            num_times as u64,
            num_bands as u64,
            height as u64,
            width as u64,
        ];
        let chunk_shape = vec![
            1,
            1,
            (height as u64).min(SPATIAL_CHUNK),
            (width as u64).min(SPATIAL_CHUNK),
        ];
        let chunk_grid: ChunkGrid =
            chunk_shape
                .try_into()
                .map_err(|err: zarrs::plugin::PluginCreateError| DatacubeError::ZarrChunkShape {
                    reason: err.to_string(),
                })?;

        let array = ArrayBuilder::new(
            shape,
            DataType::Float32,
            chunk_grid,
            FillValue::from(ZARR_NAN_F32),
        )
        .dimension_names(["time", "band", "y", "x"].into())
        .attributes(attributes)
        .build(store, "/measurements")?;
        array.store_metadata()?;
        array.store_array_subset_ndarray(&[0, 0, 0, 0], cube.values)?;

        Ok(path)
    }
}

impl ArtifactWriter for ZarrConverter {
    fn write_merged(
        &self,
        cube: Datacube,
        entity_id: &str,
        start_date: Date,
        end_date: Date,
    ) -> Result<PathBuf, DatacubeError> {
        self.write(cube, &merged_artifact_name(entity_id, start_date, end_date))
    }

    fn write_sensor(
        &self,
        cube: Datacube,
        entity_id: &str,
        start_date: Date,
        end_date: Date,
        collection: Collection,
    ) -> Result<PathBuf, DatacubeError> {
        self.write(
            cube,
            &sensor_artifact_name(entity_id, start_date, end_date, collection),
        )
    }
}
