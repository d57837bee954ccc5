//! Datacube retrieval from an S3-hosted observation catalog.
//!
//! Each collection publishes a scene catalog under `collections/<collection>/catalog.json`
//! describing a regular grid and the scenes observed on it. Band and cloud mask rasters are
//! stored as raw little-endian `f32` grids, one object per scene and band.

use crate::datacube::Datacube;
use crate::error::DatacubeError;
use crate::models::{self, AnalyticsRequest, Band, CloudMask, Collection, QueryOptions};
use crate::s3_client::{S3Client, S3Credentials};
use crate::source::DatacubeSource;

use async_trait::async_trait;
use axum::body::Bytes;
use geo::Intersects;
use ndarray::{s, Array2, Array4};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use time::{Date, OffsetDateTime};
use url::Url;

/// Regular coordinate grid shared by every scene of a collection.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct GridSpec {
    /// Easting of the western grid edge
    pub x_min: f64,
    /// Northing of the northern grid edge
    pub y_max: f64,
    /// Pixel size in coordinate units
    pub resolution: f64,
    /// Number of columns
    pub width: usize,
    /// Number of rows
    pub height: usize,
}

impl GridSpec {
    /// Easting of each pixel centre, west to east.
    pub fn x_coords(&self) -> Vec<f64> {
        (0..self.width)
            .map(|index| self.x_min + (index as f64 + 0.5) * self.resolution)
            .collect()
    }

    /// Northing of each pixel centre, north to south.
    pub fn y_coords(&self) -> Vec<f64> {
        (0..self.height)
            .map(|index| self.y_max - (index as f64 + 0.5) * self.resolution)
            .collect()
    }
}

/// One catalogued observation of a collection's grid.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SceneRecord {
    /// Scene identifier
    pub id: String,
    /// Observation timestamp
    #[serde(with = "time::serde::rfc3339")]
    pub datetime: OffsetDateTime,
    /// Footprint of valid pixels as `[x_min, y_min, x_max, y_max]`
    pub bbox: [f64; 4],
    /// Percentage of cloud-free pixels, per mask policy
    pub clear_percent: HashMap<CloudMask, f64>,
    /// Object key of each band raster
    pub assets: HashMap<Band, String>,
    /// Object key of each cloud mask raster
    pub masks: HashMap<CloudMask, String>,
}

/// Scene catalog of one collection.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct CollectionManifest {
    /// The collection the catalog describes
    pub collection: Collection,
    /// Grid shared by all scenes
    pub grid: GridSpec,
    /// Catalogued scenes
    pub scenes: Vec<SceneRecord>,
}

/// Datacube source backed by an S3-hosted observation catalog.
pub struct EarthDataStore {
    client: S3Client,
    bucket: String,
}

impl EarthDataStore {
    /// Create and return an [EarthDataStore].
    ///
    /// # Arguments
    ///
    /// * `url`: Catalog object storage API URL
    /// * `credentials`: Catalog object storage credentials
    /// * `bucket`: Bucket holding the catalog
    pub fn new(url: &Url, credentials: S3Credentials, bucket: &str) -> Self {
        Self {
            client: S3Client::new(url, credentials),
            bucket: bucket.to_string(),
        }
    }

    /// Fetch and decode the scene catalog of a collection.
    async fn fetch_manifest(
        &self,
        collection: Collection,
    ) -> Result<CollectionManifest, DatacubeError> {
        let key = format!("collections/{}/catalog.json", collection);
        let bytes = self.client.download_object(&self.bucket, &key).await?;
        serde_json::from_slice(&bytes).map_err(|cause| DatacubeError::ManifestDecode {
            collection: collection.to_string(),
            cause,
        })
    }

    /// Fetch one raster object and reinterpret it as a grid of pixel values.
    async fn fetch_raster(&self, key: &str, grid: &GridSpec) -> Result<Array2<f32>, DatacubeError> {
        let bytes = self.client.download_object(&self.bucket, key).await?;
        raster_from_bytes(&bytes, key, grid)
    }

    /// Build the datacube of one collection, if any scene qualifies.
    async fn collection_cube(
        &self,
        collection: Collection,
        aoi: &geo::Geometry<f64>,
        request: &AnalyticsRequest,
        options: &QueryOptions,
    ) -> Result<Option<Datacube>, DatacubeError> {
        let manifest = self.fetch_manifest(collection).await?;
        let mut scenes: Vec<&SceneRecord> = manifest
            .scenes
            .iter()
            .filter(|scene| {
                scene_qualifies(scene, aoi, request.start_date, request.end_date, options)
            })
            .collect();
        scenes.sort_by_key(|scene| scene.datetime);
        if scenes.is_empty() {
            return Ok(None);
        }

        let grid = manifest.grid;
        let bands = &options.assets.0;
        let mut values = Array4::<f32>::from_elem(
            (scenes.len(), bands.len(), grid.height, grid.width),
            f32::NAN,
        );
        let mut times = Vec::with_capacity(scenes.len());
        for (time_index, scene) in scenes.iter().enumerate() {
            let mask_key = scene
                .masks
                .get(&options.cloud_mask)
                .expect("qualifying scene has the selected cloud mask");
            let mask = self.fetch_raster(mask_key, &grid).await?;
            for (band_index, band) in bands.iter().enumerate() {
                let key = scene
                    .assets
                    .get(band)
                    .expect("qualifying scene has every requested band");
                let raster = self.fetch_raster(key, &grid).await?;
                let mut lane = values.slice_mut(s![time_index, band_index, .., ..]);
                lane.assign(&raster);
                // Mask rasters hold 1.0 for clear pixels and 0.0 for cloudy ones.
                lane.zip_mut_with(&mask, |value, mask| {
                    if *mask < 0.5 {
                        *value = f32::NAN;
                    }
                });
            }
            times.push(scene.datetime);
        }

        Datacube::new(
            times,
            bands.iter().map(ToString::to_string).collect(),
            grid.y_coords(),
            grid.x_coords(),
            values,
        )
        .map(Some)
    }
}

#[async_trait]
impl DatacubeSource for EarthDataStore {
    async fn generate_datacubes(
        &self,
        request: &AnalyticsRequest,
        options: &QueryOptions,
    ) -> Result<(Vec<Datacube>, Vec<Collection>), DatacubeError> {
        let aoi = models::parse_geometry(&request.geometry)?;
        let mut datacubes = Vec::new();
        let mut collections_done = Vec::new();
        for collection in &options.collections.0 {
            match self
                .collection_cube(*collection, &aoi, request, options)
                .await?
            {
                Some(cube) => {
                    tracing::info!(
                        "collection {} yielded {} observations",
                        collection,
                        cube.times.len()
                    );
                    datacubes.push(cube);
                    collections_done.push(*collection);
                }
                None => {
                    tracing::info!("collection {} yielded no qualifying scenes", collection);
                }
            }
        }
        Ok((datacubes, collections_done))
    }
}

/// Decide whether a scene qualifies for a request.
///
/// A scene qualifies when its observation date falls within the requested window, it meets the
/// clear-coverage threshold under the selected mask policy, its footprint intersects the area
/// of interest, and it carries the selected mask and every requested band.
fn scene_qualifies(
    scene: &SceneRecord,
    aoi: &geo::Geometry<f64>,
    start_date: Date,
    end_date: Date,
    options: &QueryOptions,
) -> bool {
    let date = scene.datetime.date();
    if date < start_date || date > end_date {
        return false;
    }
    let clear = scene
        .clear_percent
        .get(&options.cloud_mask)
        .copied()
        .unwrap_or(0.0);
    if clear < options.clear_coverage as f64 {
        return false;
    }
    if !scene.masks.contains_key(&options.cloud_mask) {
        return false;
    }
    if !options
        .assets
        .0
        .iter()
        .all(|band| scene.assets.contains_key(band))
    {
        return false;
    }
    footprint_intersects(scene.bbox, aoi)
}

/// Whether a scene footprint intersects the area of interest.
fn footprint_intersects(bbox: [f64; 4], aoi: &geo::Geometry<f64>) -> bool {
    let footprint = geo::Rect::new(
        geo::Coord {
            x: bbox[0],
            y: bbox[1],
        },
        geo::Coord {
            x: bbox[2],
            y: bbox[3],
        },
    )
    .to_polygon();
    aoi.intersects(&footprint)
}

/// Reinterpret raw little-endian raster bytes as a grid of pixel values.
///
/// Zerocopy provides a mechanism for converting between types.
/// Correct alignment of the data is necessary.
fn raster_from_bytes(
    data: &Bytes,
    key: &str,
    grid: &GridSpec,
) -> Result<Array2<f32>, DatacubeError> {
    let layout = zerocopy::LayoutVerified::<_, [f32]>::new_slice(&data[..]).ok_or(
        DatacubeError::RasterFromBytes {
            key: key.to_string(),
        },
    )?;
    Array2::from_shape_vec((grid.height, grid.width), layout.into_slice().to_vec())
        .map_err(DatacubeError::ShapeInvalid)
}
