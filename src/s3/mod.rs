//! # S3 Data Plane
//!
//! Builds the per-user S3 clients handed out by the client registry, and the
//! bucket operations the bucket controller performs with them.

use crate::constants::DEFAULT_S3_REGION;
use crate::credentials::CredentialPair;
use crate::observability::OperationTracker;
use aws_credential_types::Credentials;
use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
use thiserror::Error;
use tracing::{info, info_span, Instrument};

const SERVICE: &str = "s3";

#[derive(Debug, Error)]
#[error("S3 {operation} on bucket '{bucket}' failed: {message}")]
pub struct S3Error {
    pub operation: &'static str,
    pub bucket: String,
    pub message: String,
}

impl S3Error {
    fn from_sdk<E, R>(operation: &'static str, bucket: &str, error: &SdkError<E, R>) -> Self
    where
        E: ProvideErrorMetadata + std::error::Error + 'static,
        R: std::fmt::Debug,
    {
        let message = match (error.code(), error.message()) {
            (Some(code), Some(message)) => format!("{code}: {message}"),
            (Some(code), None) => code.to_string(),
            _ => aws_sdk_s3::error::DisplayErrorContext(error).to_string(),
        };
        Self {
            operation,
            bucket: bucket.to_string(),
            message,
        }
    }
}

/// Endpoint URL for a gateway host
///
/// Any scheme already present on `host_name` is dropped; `use_https` decides.
#[must_use]
pub fn resolve_host_base(host_name: &str, use_https: bool) -> String {
    let host = host_name
        .trim_start_matches("http://")
        .trim_start_matches("https://");
    if use_https {
        format!("https://{host}")
    } else {
        format!("http://{host}")
    }
}

/// S3 client for one user on one backend
///
/// Static credentials, path-style addressing, fixed region.
pub async fn build_client(
    host_name: &str,
    use_https: bool,
    credentials: &CredentialPair,
) -> aws_sdk_s3::Client {
    let credentials = Credentials::new(
        credentials.access_key(),
        credentials.secret_key(),
        None,
        None,
        "radosgw-user",
    );
    let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(aws_config::Region::new(DEFAULT_S3_REGION))
        .credentials_provider(credentials)
        .endpoint_url(resolve_host_base(host_name, use_https))
        .load()
        .await;

    let config = aws_sdk_s3::config::Builder::from(&sdk_config)
        .force_path_style(true)
        .build();
    aws_sdk_s3::Client::from_conf(config)
}

/// Whether the bucket exists and is reachable with this client
pub async fn bucket_exists(client: &aws_sdk_s3::Client, bucket: &str) -> Result<bool, S3Error> {
    let span = info_span!("s3.bucket.head", bucket.name = bucket);
    let tracker = OperationTracker::new(SERVICE, span.clone());
    async move {
        match client.head_bucket().bucket(bucket).send().await {
            Ok(_) => {
                tracker.record_success("head_bucket");
                Ok(true)
            }
            Err(e) => {
                let not_found = e
                    .as_service_error()
                    .is_some_and(aws_sdk_s3::operation::head_bucket::HeadBucketError::is_not_found);
                if not_found {
                    tracker.record_success("head_bucket");
                    Ok(false)
                } else {
                    let error = S3Error::from_sdk("head_bucket", bucket, &e);
                    tracker.record_error("head_bucket", &error.message);
                    Err(error)
                }
            }
        }
    }
    .instrument(span)
    .await
}

/// Create the bucket; a bucket already owned by this user counts as created
pub async fn create_bucket(
    client: &aws_sdk_s3::Client,
    bucket: &str,
    location_constraint: Option<&str>,
) -> Result<(), S3Error> {
    let span = info_span!("s3.bucket.create", bucket.name = bucket);
    let tracker = OperationTracker::new(SERVICE, span.clone());
    async move {
        let mut request = client.create_bucket().bucket(bucket);
        if let Some(location) = location_constraint.filter(|l| !l.is_empty()) {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(location))
                    .build(),
            );
        }

        match request.send().await {
            Ok(_) => {
                tracker.record_success("create_bucket");
                info!(bucket.name = bucket, "Created bucket");
                Ok(())
            }
            Err(e) if e.as_service_error().is_some_and(|se| se.is_bucket_already_owned_by_you()) => {
                tracker.record_success("create_bucket");
                Ok(())
            }
            Err(e) => {
                let error = S3Error::from_sdk("create_bucket", bucket, &e);
                tracker.record_error("create_bucket", &error.message);
                Err(error)
            }
        }
    }
    .instrument(span)
    .await
}

/// Delete the bucket; an absent bucket counts as deleted
pub async fn delete_bucket(client: &aws_sdk_s3::Client, bucket: &str) -> Result<(), S3Error> {
    let span = info_span!("s3.bucket.delete", bucket.name = bucket);
    let tracker = OperationTracker::new(SERVICE, span.clone());
    async move {
        match client.delete_bucket().bucket(bucket).send().await {
            Ok(_) => {
                tracker.record_success("delete_bucket");
                info!(bucket.name = bucket, "Deleted bucket");
                Ok(())
            }
            Err(e) if e.code() == Some("NoSuchBucket") => {
                tracker.record_success("delete_bucket");
                Ok(())
            }
            Err(e) => {
                let error = S3Error::from_sdk("delete_bucket", bucket, &e);
                tracker.record_error("delete_bucket", &error.message);
                Err(error)
            }
        }
    }
    .instrument(span)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_host_base_https_takes_precedence() {
        assert_eq!(
            resolve_host_base("http://rgw.example.com", true),
            "https://rgw.example.com"
        );
        assert_eq!(resolve_host_base("rgw.example.com", true), "https://rgw.example.com");
    }

    #[test]
    fn test_resolve_host_base_plain_http() {
        assert_eq!(
            resolve_host_base("https://rgw.local:7480", false),
            "http://rgw.local:7480"
        );
        assert_eq!(resolve_host_base("rgw.local:7480", false), "http://rgw.local:7480");
    }

    #[tokio::test]
    async fn test_build_client_uses_fixed_region() {
        let client = build_client(
            "rgw.local:7480",
            false,
            &CredentialPair::new("AK", "SK"),
        )
        .await;
        assert_eq!(
            client.config().region().map(|r| r.as_ref()),
            Some(DEFAULT_S3_REGION)
        );
    }
}
