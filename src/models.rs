//! Data types and associated functions and methods

use crate::error::DatacubeError;

use serde::de::value::StrDeserializer;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use strum_macros::Display;
use time::Date;
use validator::{Validate, ValidationError};

/// Supported cloud storage backends for artifact delivery
#[derive(Clone, Copy, Debug, Deserialize, Display, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CloudStorage {
    /// AWS S3 (or any S3-compatible endpoint)
    #[strum(serialize = "AWS")]
    Aws,
    /// Azure Blob Storage
    #[strum(serialize = "Azure")]
    Azure,
}

/// Optical satellite collections available in the observation catalog
#[derive(Clone, Copy, Debug, Deserialize, Display, Eq, Hash, PartialEq, Serialize)]
pub enum Collection {
    #[serde(rename = "sentinel-2-l2a")]
    #[strum(serialize = "sentinel-2-l2a")]
    Sentinel2L2a,
    #[serde(rename = "landsat-c2l2-sr")]
    #[strum(serialize = "landsat-c2l2-sr")]
    LandsatC2l2Sr,
    #[serde(rename = "venus-l2a")]
    #[strum(serialize = "venus-l2a")]
    VenusL2a,
}

/// Spectral bands that can be requested as datacube variables
#[derive(Clone, Copy, Debug, Deserialize, Display, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Band {
    #[strum(serialize = "blue")]
    Blue,
    #[strum(serialize = "green")]
    Green,
    #[strum(serialize = "red")]
    Red,
    #[strum(serialize = "nir")]
    Nir,
}

/// Cloud mask policy applied to retrieved observations
#[derive(Clone, Copy, Debug, Deserialize, Display, Eq, Hash, PartialEq, Serialize)]
pub enum CloudMask {
    /// The sensor's native cloud classification
    #[serde(rename = "native")]
    #[strum(serialize = "native")]
    Native,
    /// The provider's cross-sensor agricultural cloud mask
    #[serde(rename = "ag-cloud-mask")]
    #[strum(serialize = "ag-cloud-mask")]
    AgCloudMask,
}

/// Yes/no choice for the metacube toggle
#[derive(Clone, Copy, Debug, Deserialize, Display, Eq, PartialEq, Serialize)]
pub enum Question {
    Yes,
    No,
}

/// A comma-separated list query parameter.
///
/// The query extractor deserialises each query parameter from a single string, so list-valued
/// parameters are accepted in comma-separated form, e.g. `collections=sentinel-2-l2a,venus-l2a`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CommaList<T>(pub Vec<T>);

impl<'de, T> Deserialize<'de> for CommaList<T>
where
    T: DeserializeOwned,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        let mut items = Vec::new();
        for part in raw.split(',').map(str::trim).filter(|part| !part.is_empty()) {
            items.push(T::deserialize(StrDeserializer::<D::Error>::new(part))?);
        }
        Ok(CommaList(items))
    }
}

/// Request body for the datacube endpoint
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize, Validate)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
#[validate(schema(function = "validate_date_range"))]
pub struct AnalyticsRequest {
    /// Area of interest as a well-known-text polygon
    #[validate(custom = "validate_geometry")]
    pub geometry: String,
    /// First day of the requested time window
    pub start_date: Date,
    /// Last day of the requested time window
    pub end_date: Date,
    /// Caller-side identifier used to name the produced artifacts
    #[validate(length(min = 1, message = "entityId must not be empty"))]
    pub entity_id: String,
}

/// Query parameters for the datacube endpoint
#[derive(Clone, Debug, Deserialize, PartialEq, Validate)]
pub struct QueryOptions {
    /// Cloud storage backend that receives the produced artifacts
    pub cloud_storage: CloudStorage,
    /// Collections to build datacubes from
    #[validate(custom = "validate_collections")]
    pub collections: CommaList<Collection>,
    /// Bands retrieved for each collection
    #[validate(custom = "validate_assets")]
    pub assets: CommaList<Band>,
    /// Cloud mask policy
    pub cloud_mask: CloudMask,
    /// Whether to merge all per-collection datacubes into a single metacube
    pub create_metacube: Question,
    /// Minimum percentage of cloud-free pixels for an observation to qualify
    #[serde(default)]
    #[validate(range(max = 100, message = "clear coverage must be between 0 and 100"))]
    pub clear_coverage: u8,
}

/// Validate a WKT geometry string
fn validate_geometry(geometry: &str) -> Result<(), ValidationError> {
    parse_geometry(geometry)
        .map(|_| ())
        .map_err(|_| ValidationError::new("geometry must be valid well-known text"))
}

/// Validate that the requested collection list is non-empty
fn validate_collections(collections: &CommaList<Collection>) -> Result<(), ValidationError> {
    if collections.0.is_empty() {
        return Err(ValidationError::new("collections must not be empty"));
    }
    Ok(())
}

/// Validate that the requested band list is non-empty
fn validate_assets(assets: &CommaList<Band>) -> Result<(), ValidationError> {
    if assets.0.is_empty() {
        return Err(ValidationError::new("assets must not be empty"));
    }
    Ok(())
}

/// Validate that the requested time window is not inverted
fn validate_date_range(request: &AnalyticsRequest) -> Result<(), ValidationError> {
    if request.start_date > request.end_date {
        return Err(ValidationError::new("startDate must not be after endDate"));
    }
    Ok(())
}

/// Parse a WKT geometry string into a [geo::Geometry].
pub fn parse_geometry(geometry: &str) -> Result<geo::Geometry<f64>, DatacubeError> {
    let parsed = geometry
        .parse::<wkt::Wkt<f64>>()
        .map_err(|err| DatacubeError::Geometry {
            reason: err.to_string(),
        })?;
    geo::Geometry::try_from(parsed).map_err(|err| DatacubeError::Geometry {
        reason: err.to_string(),
    })
}

/// Successful response body with one storage link per uploaded artifact.
#[derive(Debug, Deserialize, PartialEq, Serialize)]
pub struct StorageLinks {
    #[serde(rename = "Storage_links")]
    pub storage_links: Vec<String>,
    #[serde(rename = "Execution time")]
    pub execution_time: String,
    #[serde(
        rename = "Datacube generation network use",
        skip_serializing_if = "Option::is_none"
    )]
    pub generation_network_use: Option<String>,
    #[serde(
        rename = "Datacube upload network use",
        skip_serializing_if = "Option::is_none"
    )]
    pub upload_network_use: Option<String>,
}

/// Response of the datacube endpoint
#[derive(Debug, PartialEq)]
pub enum CubeResponse {
    /// Artifacts were produced and uploaded
    Links(StorageLinks),
    /// No qualifying observations were found; a normal outcome, not an error
    NoData,
}

impl CubeResponse {
    /// Assemble a success response from upload links and telemetry.
    ///
    /// # Arguments
    ///
    /// * `links`: One retrieval link per uploaded artifact, in upload order
    /// * `elapsed`: Wall-clock duration of the request
    /// * `bandwidth`: Generation and upload byte counts, when bandwidth reporting is enabled
    pub fn assembled(links: Vec<String>, elapsed: Duration, bandwidth: Option<(u64, u64)>) -> Self {
        CubeResponse::Links(StorageLinks {
            storage_links: links,
            execution_time: format_execution_time(elapsed),
            generation_network_use: bandwidth.map(|(generation, _)| format_network_use(generation)),
            upload_network_use: bandwidth.map(|(_, upload)| format_network_use(upload)),
        })
    }
}

/// Format a wall-clock duration as whole minutes and seconds.
///
/// Minutes and seconds are rounded to the nearest integer independently, so 125.6 seconds
/// formats as 2 minutes 6 seconds.
pub fn format_execution_time(elapsed: Duration) -> String {
    let total = elapsed.as_secs_f64();
    let minutes = (total / 60.0).round() as u64;
    let seconds = (total.round() as u64) % 60;
    format!("--- {} minutes {} seconds ---", minutes, seconds)
}

/// Format a byte count as gigabits, rounded to 3 decimal places.
pub fn format_network_use(bytes: u64) -> String {
    let gigabits = bytes as f64 / 1024.0 / 1024.0 / 1024.0 * 8.0;
    format!("--- {} Gb ---", (gigabits * 1000.0).round() / 1000.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils;
    use serde_test::{assert_de_tokens, assert_de_tokens_error, Configure, Token};
    use time::macros::date;

    #[test]
    fn test_request_fields() {
        let request = test_utils::get_test_request();
        request.validate().unwrap();
        assert_de_tokens(
            &request.readable(),
            &[
                Token::Struct {
                    name: "AnalyticsRequest",
                    len: 4,
                },
                Token::Str("geometry"),
                Token::Str(test_utils::TEST_POLYGON),
                Token::Str("startDate"),
                Token::Str("2019-05-01"),
                Token::Str("endDate"),
                Token::Str("2019-05-31"),
                Token::Str("entityId"),
                Token::Str("entity_1"),
                Token::StructEnd,
            ],
        )
    }

    #[test]
    fn test_request_unknown_field() {
        assert_de_tokens_error::<AnalyticsRequest>(
            &[
                Token::Struct {
                    name: "AnalyticsRequest",
                    len: 4,
                },
                Token::Str("foo"),
                Token::StructEnd,
            ],
            "unknown field `foo`, expected one of `geometry`, `startDate`, `endDate`, `entityId`",
        )
    }

    #[test]
    fn test_json_request() {
        let json = format!(
            r#"{{"geometry": "{}", "startDate": "2019-05-01", "endDate": "2019-05-31", "entityId": "entity_1"}}"#,
            test_utils::TEST_POLYGON
        );
        let request = serde_json::from_str::<AnalyticsRequest>(&json).unwrap();
        assert_eq!(request, test_utils::get_test_request());
    }

    #[test]
    #[should_panic(expected = "geometry must be valid well-known text")]
    fn test_invalid_geometry() {
        let mut request = test_utils::get_test_request();
        request.geometry = "POLYGON ((oops".to_string();
        request.validate().unwrap()
    }

    #[test]
    #[should_panic(expected = "startDate must not be after endDate")]
    fn test_inverted_date_range() {
        let mut request = test_utils::get_test_request();
        request.start_date = date!(2019 - 06 - 01);
        request.validate().unwrap()
    }

    #[test]
    #[should_panic(expected = "entityId must not be empty")]
    fn test_empty_entity_id() {
        let mut request = test_utils::get_test_request();
        request.entity_id = "".to_string();
        request.validate().unwrap()
    }

    #[test]
    fn test_comma_list_single() {
        let list: CommaList<Collection> =
            serde_json::from_str(r#""sentinel-2-l2a""#).unwrap();
        assert_eq!(list, CommaList(vec![Collection::Sentinel2L2a]));
    }

    #[test]
    fn test_comma_list_many() {
        let list: CommaList<Band> = serde_json::from_str(r#""red, nir,blue""#).unwrap();
        assert_eq!(list, CommaList(vec![Band::Red, Band::Nir, Band::Blue]));
    }

    #[test]
    fn test_comma_list_empty() {
        let list: CommaList<Band> = serde_json::from_str(r#""""#).unwrap();
        assert_eq!(list, CommaList(vec![]));
    }

    #[test]
    fn test_comma_list_unknown_variant() {
        serde_json::from_str::<CommaList<Band>>(r#""red,swir""#).unwrap_err();
    }

    #[test]
    fn test_options_valid() {
        test_utils::get_test_options().validate().unwrap()
    }

    #[test]
    #[should_panic(expected = "collections must not be empty")]
    fn test_empty_collections() {
        let mut options = test_utils::get_test_options();
        options.collections = CommaList(vec![]);
        options.validate().unwrap()
    }

    #[test]
    #[should_panic(expected = "assets must not be empty")]
    fn test_empty_assets() {
        let mut options = test_utils::get_test_options();
        options.assets = CommaList(vec![]);
        options.validate().unwrap()
    }

    #[test]
    #[should_panic(expected = "clear coverage must be between 0 and 100")]
    fn test_clear_coverage_out_of_range() {
        let mut options = test_utils::get_test_options();
        options.clear_coverage = 101;
        options.validate().unwrap()
    }

    #[test]
    fn test_parse_geometry() {
        let geometry = parse_geometry(test_utils::TEST_POLYGON).unwrap();
        assert!(matches!(geometry, geo::Geometry::Polygon(_)));
    }

    #[test]
    fn test_parse_geometry_invalid() {
        parse_geometry("not a polygon").unwrap_err();
    }

    #[test]
    fn test_execution_time_rounds_independently() {
        let formatted = format_execution_time(Duration::from_secs_f64(125.6));
        assert_eq!(formatted, "--- 2 minutes 6 seconds ---");
    }

    #[test]
    fn test_execution_time_zero() {
        let formatted = format_execution_time(Duration::from_secs(0));
        assert_eq!(formatted, "--- 0 minutes 0 seconds ---");
    }

    #[test]
    fn test_network_use_rounds_to_3dp() {
        // 1 GiB transferred is exactly 8 gigabits.
        assert_eq!(format_network_use(1073741824), "--- 8 Gb ---");
        assert_eq!(format_network_use(0), "--- 0 Gb ---");
        // 0.15 Gb is 20132659.2 bytes; rounding lands back on 0.15.
        assert_eq!(format_network_use(20132659), "--- 0.15 Gb ---");
    }

    #[test]
    fn test_response_with_bandwidth() {
        let response = CubeResponse::assembled(
            vec!["s3://bucket/a.zarr".to_string()],
            Duration::from_secs(61),
            Some((1073741824, 2147483648)),
        );
        let CubeResponse::Links(body) = response else {
            panic!("expected links");
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["Storage_links"][0], "s3://bucket/a.zarr");
        assert_eq!(value["Execution time"], "--- 1 minutes 1 seconds ---");
        assert_eq!(value["Datacube generation network use"], "--- 8 Gb ---");
        assert_eq!(value["Datacube upload network use"], "--- 16 Gb ---");
    }

    #[test]
    fn test_response_without_bandwidth() {
        let response = CubeResponse::assembled(
            vec!["s3://bucket/a.zarr".to_string()],
            Duration::from_secs(30),
            None,
        );
        let CubeResponse::Links(body) = response else {
            panic!("expected links");
        };
        let value = serde_json::to_value(&body).unwrap();
        let object = value.as_object().unwrap();
        assert!(!object.contains_key("Datacube generation network use"));
        assert!(!object.contains_key("Datacube upload network use"));
        assert_eq!(object.len(), 2);
    }
}
