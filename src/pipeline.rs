//! The datacube assembly and delivery pipeline.
//!
//! One request flows strictly sequentially through retrieval, optional metacube assembly,
//! conversion and upload. The pipeline holds no state between requests.

use crate::app_state::AppState;
use crate::datacube::{self, Datacube};
use crate::error::DatacubeError;
use crate::models::{AnalyticsRequest, Collection, CubeResponse, QueryOptions, Question};
use crate::telemetry::Telemetry;

use std::path::PathBuf;
use tracing::{event, Level};

/// Assemble, convert and deliver the datacubes for one request.
///
/// Returns the response payload, or the no-data response when retrieval yields nothing.
/// Conversion and upload are never attempted for an empty retrieval result.
pub async fn assemble_datacubes(
    state: &AppState,
    request: &AnalyticsRequest,
    options: &QueryOptions,
) -> Result<CubeResponse, DatacubeError> {
    let mut telemetry = Telemetry::start(state.network.as_ref());

    let (datacubes, collections_done) = state.source.generate_datacubes(request, options).await?;
    if datacubes.is_empty() {
        event!(Level::INFO, "no items found for entity {}", request.entity_id);
        return Ok(CubeResponse::NoData);
    }
    let cubes: Vec<(Datacube, Collection)> =
        datacubes.into_iter().zip(collections_done).collect();

    // Convert to artifacts: one for the metacube, or one per retained collection.
    let artifacts: Vec<PathBuf> = match options.create_metacube {
        Question::Yes => {
            let metacube = datacube::merge(cubes)?;
            telemetry.mark_generated();
            vec![state.converter.write_merged(
                metacube,
                &request.entity_id,
                request.start_date,
                request.end_date,
            )?]
        }
        Question::No => {
            telemetry.mark_generated();
            let mut artifacts = Vec::with_capacity(cubes.len());
            for (cube, collection) in cubes {
                artifacts.push(state.converter.write_sensor(
                    cube,
                    &request.entity_id,
                    request.start_date,
                    request.end_date,
                    collection,
                )?);
            }
            artifacts
        }
    };

    // Upload sequentially, aborting on the first failure. Artifacts uploaded before the
    // failure keep their objects, but their links are never returned to the caller.
    let mut links = Vec::with_capacity(artifacts.len());
    for artifact in &artifacts {
        match state.uploads.upload(artifact, options.cloud_storage).await {
            Ok(link) => links.push(link),
            Err(err) => {
                event!(
                    Level::ERROR,
                    "aborting delivery of {} artifacts after {} successful uploads",
                    artifacts.len(),
                    links.len()
                );
                return Err(err);
            }
        }
    }
    telemetry.mark_uploaded();

    let report = telemetry.finish();
    let bandwidth = state
        .args
        .enable_bandwidth_telemetry
        .then_some((report.generation_bytes, report.upload_bytes));
    Ok(CubeResponse::assembled(links, report.elapsed, bandwidth))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CloudStorage, StorageLinks};
    use crate::test_utils::{self, MockConverter, MockSource, MockStore};
    use time::macros::datetime;

    fn two_cubes() -> Vec<(Datacube, Collection)> {
        vec![
            (
                test_utils::make_cube(vec![datetime!(2019-05-02 0:00 UTC)], vec!["red"], 1.0),
                Collection::Sentinel2L2a,
            ),
            (
                test_utils::make_cube(vec![datetime!(2019-05-03 0:00 UTC)], vec!["red"], 2.0),
                Collection::VenusL2a,
            ),
        ]
    }

    #[tokio::test]
    async fn empty_retrieval_short_circuits() {
        let converter = MockConverter::new();
        let store = MockStore::succeeding();
        let state = test_utils::get_test_state(
            MockSource::with_cubes(vec![]),
            converter.clone(),
            store.clone(),
            false,
        );
        let request = test_utils::get_test_request();
        let options = test_utils::get_test_options();

        let response = assemble_datacubes(&state, &request, &options).await.unwrap();

        assert_eq!(response, CubeResponse::NoData);
        assert!(converter.conversions().is_empty());
        assert!(store.uploaded().is_empty());
    }

    #[tokio::test]
    async fn metacube_mode_converts_and_uploads_once() {
        let converter = MockConverter::new();
        let store = MockStore::succeeding();
        let state = test_utils::get_test_state(
            MockSource::with_cubes(two_cubes()),
            converter.clone(),
            store.clone(),
            false,
        );
        let request = test_utils::get_test_request();
        let mut options = test_utils::get_test_options();
        options.create_metacube = Question::Yes;

        let response = assemble_datacubes(&state, &request, &options).await.unwrap();

        assert_eq!(
            converter.conversions(),
            vec!["entity_1_2019-05-01_2019-05-31.zarr"]
        );
        assert_eq!(
            store.uploaded(),
            vec!["entity_1_2019-05-01_2019-05-31.zarr"]
        );
        let CubeResponse::Links(StorageLinks { storage_links, .. }) = response else {
            panic!("expected links");
        };
        assert_eq!(storage_links.len(), 1);
    }

    #[tokio::test]
    async fn per_sensor_mode_converts_and_uploads_each_collection_in_order() {
        let converter = MockConverter::new();
        let store = MockStore::succeeding();
        let state = test_utils::get_test_state(
            MockSource::with_cubes(two_cubes()),
            converter.clone(),
            store.clone(),
            false,
        );
        let request = test_utils::get_test_request();
        let options = test_utils::get_test_options();

        let response = assemble_datacubes(&state, &request, &options).await.unwrap();

        assert_eq!(
            converter.conversions(),
            vec![
                "entity_1_2019-05-01_2019-05-31_sentinel-2-l2a.zarr",
                "entity_1_2019-05-01_2019-05-31_venus-l2a.zarr",
            ]
        );
        assert_eq!(store.uploaded().len(), 2);
        let CubeResponse::Links(StorageLinks { storage_links, .. }) = response else {
            panic!("expected links");
        };
        assert_eq!(
            storage_links,
            vec![
                "s3://mock/entity_1_2019-05-01_2019-05-31_sentinel-2-l2a.zarr",
                "s3://mock/entity_1_2019-05-01_2019-05-31_venus-l2a.zarr",
            ]
        );
    }

    #[tokio::test]
    async fn upload_failure_aborts_without_partial_links() {
        let converter = MockConverter::new();
        let store = MockStore::failing_at(1);
        let state = test_utils::get_test_state(
            MockSource::with_cubes(two_cubes()),
            converter.clone(),
            store.clone(),
            false,
        );
        let request = test_utils::get_test_request();
        let options = test_utils::get_test_options();

        let err = assemble_datacubes(&state, &request, &options)
            .await
            .unwrap_err();

        match err {
            DatacubeError::Upload { backend, cause: _ } => {
                assert_eq!(backend, CloudStorage::Aws);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        // The first artifact was uploaded before the abort; its link is never returned.
        assert_eq!(store.uploaded().len(), 1);
    }

    #[tokio::test]
    async fn bandwidth_fields_follow_the_telemetry_switch() {
        let converter = MockConverter::new();
        let store = MockStore::succeeding();
        let state = test_utils::get_test_state(
            MockSource::with_cubes(two_cubes()),
            converter,
            store,
            true,
        );
        let request = test_utils::get_test_request();
        let options = test_utils::get_test_options();

        let response = assemble_datacubes(&state, &request, &options).await.unwrap();

        let CubeResponse::Links(body) = response else {
            panic!("expected links");
        };
        // Scripted counter advances 1 GiB during generation and 2 GiB during upload.
        assert_eq!(body.generation_network_use.as_deref(), Some("--- 8 Gb ---"));
        assert_eq!(body.upload_network_use.as_deref(), Some("--- 16 Gb ---"));
    }

    #[tokio::test]
    async fn bandwidth_fields_absent_when_disabled() {
        let converter = MockConverter::new();
        let store = MockStore::succeeding();
        let state = test_utils::get_test_state(
            MockSource::with_cubes(two_cubes()),
            converter,
            store,
            false,
        );
        let request = test_utils::get_test_request();
        let options = test_utils::get_test_options();

        let response = assemble_datacubes(&state, &request, &options).await.unwrap();

        let CubeResponse::Links(body) = response else {
            panic!("expected links");
        };
        assert_eq!(body.generation_network_use, None);
        assert_eq!(body.upload_network_use, None);
    }
}
