//! Artifact upload to cloud storage backends.
//!
//! A Zarr artifact is a directory tree; each backend walks the tree and uploads every file
//! under a key prefix equal to the artifact name, returning a retrieval link for the prefix.
//! One upload attempt is made per artifact, with no internal retry.

use crate::cli::CommandLineArgs;
use crate::error::DatacubeError;
use crate::models::CloudStorage;
use crate::s3_client::{self, S3Credentials};

use async_trait::async_trait;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::operation::create_bucket::CreateBucketError;
use aws_sdk_s3::operation::put_object::PutObjectError;
use aws_sdk_s3::primitives::ByteStream;
use aws_smithy_types::byte_stream::error::Error as ByteStreamError;
use object_store::azure::{MicrosoftAzure, MicrosoftAzureBuilder};
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use url::Url;
use walkdir::WalkDir;

/// Upload error type
///
/// Wrapped in [DatacubeError::Upload] together with the backend name before reaching a caller.
#[derive(Debug, Error)]
pub enum UploadError {
    /// Error reading an artifact file from disk
    #[error("error reading artifact from disk")]
    ArtifactRead(#[from] std::io::Error),

    /// Azure blob storage error
    #[error("Azure blob storage error")]
    Azure(#[from] object_store::Error),

    /// Invalid object path derived from an artifact file
    #[error("invalid object path")]
    AzurePath(#[from] object_store::path::Error),

    /// Artifact path with no final component to derive a key prefix from
    #[error("artifact path has no file name")]
    InvalidArtifact,

    /// Upload requested for a backend with no configured credentials
    #[error("no credentials configured for this backend")]
    NotConfigured,

    /// Artifact file outside the artifact directory
    #[error(transparent)]
    Prefix(#[from] std::path::StripPrefixError),

    /// Error streaming an artifact file to S3
    #[error("error streaming artifact from disk")]
    S3ByteStream(#[from] ByteStreamError),

    /// Error creating the destination S3 bucket
    #[error("error creating S3 bucket")]
    S3CreateBucket(#[from] SdkError<CreateBucketError>),

    /// Error sending an object to S3
    #[error("error sending object to S3 storage")]
    S3Put(#[from] SdkError<PutObjectError>),

    /// Error walking the artifact directory
    #[error("error walking artifact directory")]
    Walk(#[from] walkdir::Error),
}

/// Trait for uploading one artifact to a cloud storage backend.
///
/// This forms the contract between the upload dispatcher and the backends.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Upload the artifact directory and return a retrieval link.
    async fn upload(&self, artifact: &Path) -> Result<String, UploadError>;
}

/// The key prefix an artifact is uploaded under: its directory name.
fn artifact_prefix(artifact: &Path) -> Result<&str, UploadError> {
    artifact
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or(UploadError::InvalidArtifact)
}

/// The object keys and file paths of every file in an artifact directory, relative keys joined
/// with `/` under the artifact prefix.
fn artifact_objects(artifact: &Path) -> Result<Vec<(String, std::path::PathBuf)>, UploadError> {
    let prefix = artifact_prefix(artifact)?;
    let mut objects = Vec::new();
    for entry in WalkDir::new(artifact).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry.path().strip_prefix(artifact)?;
        let key = format!("{}/{}", prefix, relative.to_string_lossy());
        objects.push((key, entry.path().to_path_buf()));
    }
    Ok(objects)
}

/// Artifact store backed by an S3-compatible endpoint.
pub struct S3ArtifactStore {
    client: aws_sdk_s3::Client,
    endpoint: Url,
    bucket: String,
}

impl S3ArtifactStore {
    /// Create and return an [S3ArtifactStore].
    ///
    /// # Arguments
    ///
    /// * `url`: Object storage API URL
    /// * `credentials`: Object storage account credentials
    /// * `bucket`: Destination bucket for artifacts
    pub fn new(url: &Url, credentials: S3Credentials, bucket: &str) -> Self {
        Self {
            client: aws_sdk_s3::Client::from_conf(s3_client::build_config(url, credentials)),
            endpoint: url.clone(),
            bucket: bucket.to_string(),
        }
    }
}

#[async_trait]
impl ArtifactStore for S3ArtifactStore {
    async fn upload(&self, artifact: &Path) -> Result<String, UploadError> {
        // Create the destination bucket on first use.
        let head = self.client.head_bucket().bucket(&self.bucket).send().await;
        if head.is_err() {
            self.client
                .create_bucket()
                .bucket(&self.bucket)
                .send()
                .await?;
        }
        for (key, path) in artifact_objects(artifact)? {
            let body = ByteStream::from_path(&path).await?;
            self.client
                .put_object()
                .bucket(&self.bucket)
                .key(&key)
                .body(body)
                .send()
                .await?;
        }
        Ok(format!(
            "{}/{}/{}",
            self.endpoint.as_str().trim_end_matches('/'),
            self.bucket,
            artifact_prefix(artifact)?
        ))
    }
}

/// Artifact store backed by an Azure blob storage container.
pub struct AzureArtifactStore {
    store: MicrosoftAzure,
    account: String,
    container: String,
}

impl AzureArtifactStore {
    /// Create and return an [AzureArtifactStore].
    ///
    /// # Arguments
    ///
    /// * `account`: Storage account name
    /// * `access_key`: Storage account access key
    /// * `container`: Destination container for artifacts
    pub fn new(account: &str, access_key: &str, container: &str) -> Result<Self, UploadError> {
        let store = MicrosoftAzureBuilder::new()
            .with_account(account)
            .with_access_key(access_key)
            .with_container_name(container)
            .build()?;
        Ok(Self {
            store,
            account: account.to_string(),
            container: container.to_string(),
        })
    }
}

#[async_trait]
impl ArtifactStore for AzureArtifactStore {
    async fn upload(&self, artifact: &Path) -> Result<String, UploadError> {
        for (key, path) in artifact_objects(artifact)? {
            let location = ObjectPath::parse(&key)?;
            let payload = PutPayload::from(tokio::fs::read(&path).await?);
            self.store.put(&location, payload).await?;
        }
        Ok(format!(
            "https://{}.blob.core.windows.net/{}/{}",
            self.account,
            self.container,
            artifact_prefix(artifact)?
        ))
    }
}

/// Maps each cloud storage backend to its configured artifact store and performs uploads.
pub struct UploadDispatcher {
    aws: Option<Arc<dyn ArtifactStore>>,
    azure: Option<Arc<dyn ArtifactStore>>,
}

impl UploadDispatcher {
    /// Build the dispatcher from command line arguments.
    ///
    /// Backends with incomplete configuration are left unconfigured; requests selecting them
    /// fail at upload time.
    pub fn from_args(args: &CommandLineArgs) -> Self {
        let aws = match (&args.s3_upload_url, &args.s3_upload_bucket) {
            (Some(url), Some(bucket)) => {
                let url = Url::parse(url).expect("invalid S3 upload URL");
                let credentials = S3Credentials::from_optional_keys(
                    args.s3_access_key.as_deref(),
                    args.s3_secret_key.as_deref(),
                );
                Some(Arc::new(S3ArtifactStore::new(&url, credentials, bucket))
                    as Arc<dyn ArtifactStore>)
            }
            _ => None,
        };
        let azure = match (
            &args.azure_account,
            &args.azure_access_key,
            &args.azure_container,
        ) {
            (Some(account), Some(access_key), Some(container)) => Some(Arc::new(
                AzureArtifactStore::new(account, access_key, container)
                    .expect("failed to initialise Azure artifact store"),
            )
                as Arc<dyn ArtifactStore>),
            _ => None,
        };
        Self { aws, azure }
    }

    /// Build a dispatcher with explicit backend stores.
    pub fn with_stores(
        aws: Option<Arc<dyn ArtifactStore>>,
        azure: Option<Arc<dyn ArtifactStore>>,
    ) -> Self {
        Self { aws, azure }
    }

    /// Upload one artifact to the selected backend and return its retrieval link.
    ///
    /// Fails with [DatacubeError::Upload], naming the backend, when the backend is not
    /// configured or the upload attempt fails.
    pub async fn upload(
        &self,
        artifact: &Path,
        backend: CloudStorage,
    ) -> Result<String, DatacubeError> {
        let store = match backend {
            CloudStorage::Aws => self.aws.as_ref(),
            CloudStorage::Azure => self.azure.as_ref(),
        }
        .ok_or(DatacubeError::Upload {
            backend,
            cause: UploadError::NotConfigured,
        })?;
        store
            .upload(artifact)
            .await
            .map_err(|cause| DatacubeError::Upload { backend, cause })
    }
}
