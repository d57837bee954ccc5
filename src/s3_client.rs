//! A simplified S3 client that supports downloading catalog objects.
//! It attempts to hide the complexities of working with the AWS SDK for S3.

use crate::error::DatacubeError;

use aws_credential_types::Credentials;
use aws_sdk_s3::config::BehaviorVersion;
use aws_sdk_s3::Client;
use aws_types::region::Region;
use axum::body::Bytes;
use tracing::Instrument;
use url::Url;

/// Credentials for an S3-compatible object store.
#[derive(Clone)]
pub enum S3Credentials {
    AccessKey {
        access_key: String,
        secret_key: String,
    },
    None,
}

impl S3Credentials {
    /// Create an access key credential.
    pub fn access_key(access_key: &str, secret_key: &str) -> Self {
        S3Credentials::AccessKey {
            access_key: access_key.to_string(),
            secret_key: secret_key.to_string(),
        }
    }

    /// Create a credential from an optional access/secret key pair.
    ///
    /// Anonymous access is used unless both keys are present.
    pub fn from_optional_keys(access_key: Option<&str>, secret_key: Option<&str>) -> Self {
        match (access_key, secret_key) {
            (Some(access_key), Some(secret_key)) => Self::access_key(access_key, secret_key),
            _ => S3Credentials::None,
        }
    }
}

/// Build an AWS SDK S3 configuration for an endpoint and credentials.
pub fn build_config(url: &Url, credentials: S3Credentials) -> aws_sdk_s3::Config {
    let region = Region::new("us-east-1");
    let builder = aws_sdk_s3::Config::builder().behavior_version(BehaviorVersion::latest());
    let builder = match credentials {
        S3Credentials::AccessKey {
            access_key,
            secret_key,
        } => {
            let credentials = Credentials::from_keys(access_key, secret_key, None);
            builder.credentials_provider(credentials)
        }
        S3Credentials::None => builder,
    };
    builder
        .region(Some(region))
        .endpoint_url(url.to_string())
        .force_path_style(true)
        .build()
}

/// S3 client object.
#[derive(Clone)]
pub struct S3Client {
    /// Underlying AWS SDK S3 client object.
    client: Client,
}

impl S3Client {
    /// Creates an S3Client object
    ///
    /// # Arguments
    ///
    /// * `url`: Object storage API URL
    /// * `credentials`: Object storage account credentials
    pub fn new(url: &Url, credentials: S3Credentials) -> Self {
        Self {
            client: Client::from_conf(build_config(url, credentials)),
        }
    }

    /// Downloads an object from object storage and returns the data as Bytes
    ///
    /// # Arguments
    ///
    /// * `bucket`: Name of the bucket
    /// * `key`: Name of the object in the bucket
    pub async fn download_object(&self, bucket: &str, key: &str) -> Result<Bytes, DatacubeError> {
        let mut response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .instrument(tracing::Span::current())
            .await?;
        // Fail if the content length header is missing.
        let content_length: usize = response
            .content_length()
            .ok_or(DatacubeError::S3ContentLengthMissing)?
            .try_into()?;

        // The data returned by the S3 client does not have any alignment guarantees. In order to
        // reinterpret the data as an array of numbers with a higher alignment than 1, we need to
        // return the data in a Bytes object in which the underlying data has a higher alignment.
        // For now we're hard-coding an alignment of 8 bytes, although this should depend on the
        // data type, and potentially whether there are any SIMD requirements.
        // Create an 8-byte aligned Vec<u8>.
        let mut buf = maligned::align_first::<u8, maligned::A8>(content_length);

        // Iterate over the streaming response, copying data into the aligned Vec<u8>.
        while let Some(bytes) = response
            .body
            .try_next()
            .instrument(tracing::Span::current())
            .await?
        {
            buf.extend_from_slice(&bytes)
        }
        // Return as Bytes.
        Ok(buf.into())
    }
}
