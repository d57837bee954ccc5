use crate::cli::CommandLineArgs;
use crate::earthdata::EarthDataStore;
use crate::s3_client::S3Credentials;
use crate::source::DatacubeSource;
use crate::telemetry::{NetworkCounter, SysinfoNetworkCounter};
use crate::upload::UploadDispatcher;
use crate::zarr::{ArtifactWriter, ZarrConverter};

use std::sync::Arc;
use url::Url;

/// Shared application state passed to the datacube request handler.
pub struct AppState {
    /// Command line arguments.
    pub args: CommandLineArgs,

    /// Observation data source.
    pub source: Arc<dyn DatacubeSource>,

    /// Datacube to artifact converter.
    pub converter: Arc<dyn ArtifactWriter>,

    /// Cloud storage upload dispatcher.
    pub uploads: UploadDispatcher,

    /// Process-wide network byte counter.
    pub network: Arc<dyn NetworkCounter>,
}

impl AppState {
    /// Create and return an [AppState].
    pub fn new(args: &CommandLineArgs) -> Self {
        let catalog_url = Url::parse(&args.catalog_url).expect("invalid catalog URL");
        let credentials = S3Credentials::from_optional_keys(
            args.catalog_access_key.as_deref(),
            args.catalog_secret_key.as_deref(),
        );
        let source = EarthDataStore::new(&catalog_url, credentials, &args.catalog_bucket);

        Self {
            args: args.clone(),
            source: Arc::new(source),
            converter: Arc::new(ZarrConverter::new(&args.zarr_dir)),
            uploads: UploadDispatcher::from_args(args),
            network: Arc::new(SysinfoNetworkCounter::new()),
        }
    }
}

/// AppState wrapped in an Atomic Reference Count (Arc) to allow multiple references.
pub type SharedAppState = Arc<AppState>;
