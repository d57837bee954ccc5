use crate::app_state::AppState;
use crate::cli::CommandLineArgs;
use crate::datacube::Datacube;
use crate::error::DatacubeError;
use crate::models::*;
use crate::source::DatacubeSource;
use crate::telemetry::{NetworkCounter, NetworkSample};
use crate::upload::{ArtifactStore, UploadDispatcher, UploadError};
use crate::zarr::{self, ArtifactWriter};

use async_trait::async_trait;
use axum::body::Bytes;
use clap::Parser;
use ndarray::Array4;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use time::macros::date;
use time::{Date, OffsetDateTime};

/// Polygon used across tests; intersects the test scene footprints.
pub(crate) const TEST_POLYGON: &str =
    "POLYGON ((1.26 43.427, 1.263 43.428, 1.263 43.426, 1.26 43.426, 1.26 43.427))";

/// Create an AnalyticsRequest for the canonical test window.
pub(crate) fn get_test_request() -> AnalyticsRequest {
    AnalyticsRequest {
        geometry: TEST_POLYGON.to_string(),
        start_date: date!(2019 - 05 - 01),
        end_date: date!(2019 - 05 - 31),
        entity_id: "entity_1".to_string(),
    }
}

/// Create QueryOptions with two collections and bandwidth-neutral defaults.
pub(crate) fn get_test_options() -> QueryOptions {
    QueryOptions {
        cloud_storage: CloudStorage::Aws,
        collections: CommaList(vec![Collection::Sentinel2L2a, Collection::VenusL2a]),
        assets: CommaList(vec![Band::Red, Band::Nir]),
        cloud_mask: CloudMask::Native,
        create_metacube: Question::No,
        clear_coverage: 0,
    }
}

/// Parse default command line arguments.
pub(crate) fn get_test_args() -> CommandLineArgs {
    CommandLineArgs::parse_from(["cubist"])
}

/// Create a small datacube on the shared 2x3 test grid.
pub(crate) fn make_cube(times: Vec<OffsetDateTime>, bands: Vec<&str>, fill: f32) -> Datacube {
    let y = vec![10.0, 20.0];
    let x = vec![1.0, 2.0, 3.0];
    let values = Array4::from_elem((times.len(), bands.len(), y.len(), x.len()), fill);
    Datacube::new(
        times,
        bands.iter().map(ToString::to_string).collect(),
        y,
        x,
        values,
    )
    .unwrap()
}

/// Serialise pixels into an 8-byte aligned byte buffer, as the S3 client returns them.
pub(crate) fn aligned_bytes(pixels: &[f32]) -> Bytes {
    let mut buf = maligned::align_first::<u8, maligned::A8>(pixels.len() * 4);
    for pixel in pixels {
        buf.extend_from_slice(&pixel.to_le_bytes());
    }
    buf.into()
}

/// Network counter that replays a scripted sequence of totals, repeating the last one.
pub(crate) struct ScriptedCounter {
    samples: Mutex<Vec<u64>>,
    cursor: Mutex<usize>,
}

impl ScriptedCounter {
    pub(crate) fn new(samples: Vec<u64>) -> Self {
        Self {
            samples: Mutex::new(samples),
            cursor: Mutex::new(0),
        }
    }
}

impl NetworkCounter for ScriptedCounter {
    fn sample(&self) -> NetworkSample {
        let samples = self.samples.lock().unwrap();
        let mut cursor = self.cursor.lock().unwrap();
        let index = (*cursor).min(samples.len().saturating_sub(1));
        *cursor += 1;
        NetworkSample {
            bytes_sent: samples.get(index).copied().unwrap_or(0),
            bytes_received: 0,
        }
    }
}

/// Datacube source returning a fixed set of cubes.
pub(crate) struct MockSource {
    cubes: Vec<(Datacube, Collection)>,
}

impl MockSource {
    pub(crate) fn with_cubes(cubes: Vec<(Datacube, Collection)>) -> Self {
        Self { cubes }
    }
}

#[async_trait]
impl DatacubeSource for MockSource {
    async fn generate_datacubes(
        &self,
        _request: &AnalyticsRequest,
        _options: &QueryOptions,
    ) -> Result<(Vec<Datacube>, Vec<Collection>), DatacubeError> {
        Ok(self.cubes.iter().cloned().unzip())
    }
}

/// Artifact writer that records conversions without touching the filesystem.
#[derive(Clone)]
pub(crate) struct MockConverter {
    conversions: Arc<Mutex<Vec<String>>>,
}

impl MockConverter {
    pub(crate) fn new() -> Self {
        Self {
            conversions: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Names of the artifacts converted so far, in call order.
    pub(crate) fn conversions(&self) -> Vec<String> {
        self.conversions.lock().unwrap().clone()
    }

    fn record(&self, name: String) -> PathBuf {
        self.conversions.lock().unwrap().push(name.clone());
        PathBuf::from(name)
    }
}

impl ArtifactWriter for MockConverter {
    fn write_merged(
        &self,
        _cube: Datacube,
        entity_id: &str,
        start_date: Date,
        end_date: Date,
    ) -> Result<PathBuf, DatacubeError> {
        Ok(self.record(zarr::merged_artifact_name(entity_id, start_date, end_date)))
    }

    fn write_sensor(
        &self,
        _cube: Datacube,
        entity_id: &str,
        start_date: Date,
        end_date: Date,
        collection: Collection,
    ) -> Result<PathBuf, DatacubeError> {
        Ok(self.record(zarr::sensor_artifact_name(
            entity_id, start_date, end_date, collection,
        )))
    }
}

/// Artifact store that records uploads and optionally fails at a given call index.
#[derive(Clone)]
pub(crate) struct MockStore {
    uploads: Arc<Mutex<Vec<String>>>,
    fail_at: Option<usize>,
}

impl MockStore {
    pub(crate) fn succeeding() -> Self {
        Self {
            uploads: Arc::new(Mutex::new(Vec::new())),
            fail_at: None,
        }
    }

    /// Fail the upload with the given zero-based call index.
    pub(crate) fn failing_at(index: usize) -> Self {
        Self {
            uploads: Arc::new(Mutex::new(Vec::new())),
            fail_at: Some(index),
        }
    }

    /// Names of the artifacts uploaded so far, in call order.
    pub(crate) fn uploaded(&self) -> Vec<String> {
        self.uploads.lock().unwrap().clone()
    }
}

#[async_trait]
impl ArtifactStore for MockStore {
    async fn upload(&self, artifact: &Path) -> Result<String, UploadError> {
        let mut uploads = self.uploads.lock().unwrap();
        if Some(uploads.len()) == self.fail_at {
            return Err(UploadError::ArtifactRead(std::io::Error::new(
                std::io::ErrorKind::Other,
                "injected upload failure",
            )));
        }
        let name = artifact
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or(UploadError::InvalidArtifact)?
            .to_string();
        uploads.push(name.clone());
        Ok(format!("s3://mock/{}", name))
    }
}

/// Build an AppState around mock collaborators and a scripted network counter.
///
/// The counter advances 1 GiB during generation and 2 GiB during upload.
pub(crate) fn get_test_state(
    source: MockSource,
    converter: MockConverter,
    store: MockStore,
    enable_bandwidth_telemetry: bool,
) -> AppState {
    let mut args = get_test_args();
    args.enable_bandwidth_telemetry = enable_bandwidth_telemetry;
    AppState {
        args,
        source: Arc::new(source),
        converter: Arc::new(converter),
        uploads: UploadDispatcher::with_stores(
            Some(Arc::new(store.clone())),
            Some(Arc::new(store)),
        ),
        network: Arc::new(ScriptedCounter::new(vec![0, 1073741824, 3221225472])),
    }
}
