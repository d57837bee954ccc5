//! Command Line Interface (CLI) arguments.

use clap::Parser;

/// Cubist command line interface
#[derive(Clone, Debug, Parser)]
pub struct CommandLineArgs {
    /// The IP address on which the server should listen
    #[arg(long, default_value = "0.0.0.0", env = "CUBIST_HOST")]
    pub host: String,
    /// The port to which the server should bind
    #[arg(long, default_value_t = 8080, env = "CUBIST_PORT")]
    pub port: u16,
    /// Flag indicating whether HTTPS should be used
    #[arg(long, default_value_t = false, env = "CUBIST_HTTPS")]
    pub https: bool,
    /// Path to the certificate file to be used for HTTPS encryption
    #[arg(
        long,
        default_value = "~/.config/cubist/certs/cert.pem",
        env = "CUBIST_CERT_FILE"
    )]
    pub cert_file: String,
    /// Path to the key file to be used for HTTPS encryption
    #[arg(
        long,
        default_value = "~/.config/cubist/certs/key.pem",
        env = "CUBIST_KEY_FILE"
    )]
    pub key_file: String,
    /// Maximum time in seconds to wait for operations to complete upon receiving `ctrl+c` signal.
    #[arg(long, default_value_t = 60, env = "CUBIST_SHUTDOWN_TIMEOUT")]
    pub graceful_shutdown_timeout: u64,
    /// Whether to include network bandwidth telemetry in responses.
    #[arg(long, default_value_t = false, env = "CUBIST_ENABLE_BANDWIDTH_TELEMETRY")]
    pub enable_bandwidth_telemetry: bool,
    /// Directory in which Zarr artifacts are assembled before upload
    #[arg(long, default_value = "./zarr", env = "CUBIST_ZARR_DIR")]
    pub zarr_dir: String,
    /// URL of the S3-compatible endpoint hosting the observation catalog
    #[arg(long, default_value = "http://localhost:9000", env = "CUBIST_CATALOG_URL")]
    pub catalog_url: String,
    /// Bucket holding the observation catalog
    #[arg(long, default_value = "earth-data", env = "CUBIST_CATALOG_BUCKET")]
    pub catalog_bucket: String,
    /// Access key for the observation catalog
    #[arg(long, env = "CUBIST_CATALOG_ACCESS_KEY")]
    pub catalog_access_key: Option<String>,
    /// Secret key for the observation catalog
    #[arg(long, env = "CUBIST_CATALOG_SECRET_KEY")]
    pub catalog_secret_key: Option<String>,
    /// URL of the S3-compatible endpoint receiving uploaded artifacts
    #[arg(long, env = "CUBIST_S3_UPLOAD_URL")]
    pub s3_upload_url: Option<String>,
    /// Bucket receiving uploaded artifacts
    #[arg(long, env = "CUBIST_S3_UPLOAD_BUCKET")]
    pub s3_upload_bucket: Option<String>,
    /// Access key for artifact uploads to S3
    #[arg(long, env = "CUBIST_S3_ACCESS_KEY")]
    pub s3_access_key: Option<String>,
    /// Secret key for artifact uploads to S3
    #[arg(long, env = "CUBIST_S3_SECRET_KEY")]
    pub s3_secret_key: Option<String>,
    /// Azure storage account receiving uploaded artifacts
    #[arg(long, env = "CUBIST_AZURE_ACCOUNT")]
    pub azure_account: Option<String>,
    /// Access key of the Azure storage account
    #[arg(long, env = "CUBIST_AZURE_ACCESS_KEY")]
    pub azure_access_key: Option<String>,
    /// Azure blob container receiving uploaded artifacts
    #[arg(long, env = "CUBIST_AZURE_CONTAINER")]
    pub azure_container: Option<String>,
}

/// Returns parsed command line arguments.
pub fn parse() -> CommandLineArgs {
    CommandLineArgs::parse()
}
