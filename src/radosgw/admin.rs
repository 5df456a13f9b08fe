//! # Admin API Client
//!
//! Raw access to the RADOS Gateway admin REST API. Every response is
//! classified here; callers see `AdminError` kinds, never HTTP details.

use crate::constants::ADMIN_SIGNING_REGION;
use crate::credentials::CredentialPair;
use crate::observability::OperationTracker;
use crate::radosgw::signing::sign_request;
use crate::radosgw::{AdminError, AdminErrorKind, NewUser, RgwUser, UserQuota};
use async_trait::async_trait;
use reqwest::{Method, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{info_span, Instrument};

const SERVICE: &str = "radosgw-admin";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Admin operations consumed by the controller
#[async_trait]
pub trait AdminApi: Send + Sync {
    async fn get_user(&self, uid: &str) -> Result<RgwUser, AdminError>;

    async fn create_user(&self, user: &NewUser) -> Result<(), AdminError>;

    async fn set_user_quota(&self, uid: &str, quota: &UserQuota) -> Result<(), AdminError>;

    async fn remove_user(&self, uid: &str) -> Result<(), AdminError>;

    /// Names of the buckets owned by `uid`
    async fn list_user_buckets(&self, uid: &str) -> Result<Vec<String>, AdminError>;
}

/// Admin API client for one backend, authenticated with that backend's admin keys
#[derive(Debug, Clone)]
pub struct RgwAdminClient {
    http: reqwest::Client,
    endpoint: Url,
    credentials: CredentialPair,
}

impl RgwAdminClient {
    /// `endpoint` is the scheme and authority of the gateway, e.g. `https://rgw.example.com`
    pub fn new(endpoint: &str, credentials: CredentialPair) -> Result<Self, AdminError> {
        let endpoint = Url::parse(endpoint).map_err(|e| {
            AdminError::new(
                AdminErrorKind::Other,
                "connect",
                format!("invalid endpoint '{endpoint}': {e}"),
            )
        })?;
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AdminError::transport("connect", &e))?;
        Ok(Self {
            http,
            endpoint,
            credentials,
        })
    }

    fn url(&self, resource: &str, query: &[(&str, &str)], key_only: Option<&str>) -> Url {
        let mut url = self.endpoint.clone();
        url.set_path(&format!("/admin/{resource}"));
        {
            let mut pairs = url.query_pairs_mut();
            if let Some(key) = key_only {
                pairs.append_key_only(key);
            }
            pairs.append_pair("format", "json");
            for (k, v) in query {
                pairs.append_pair(k, v);
            }
        }
        url
    }

    /// Send a signed request and return the response body on success
    async fn call(
        &self,
        operation: &'static str,
        method: Method,
        url: Url,
    ) -> Result<String, AdminError> {
        let tracker = OperationTracker::new(SERVICE, tracing::Span::current());

        let mut request = self
            .http
            .request(method, url)
            .build()
            .map_err(|e| AdminError::transport(operation, &e))?;
        sign_request(&mut request, &self.credentials, ADMIN_SIGNING_REGION, operation)?;

        let response = match self.http.execute(request).await {
            Ok(r) => r,
            Err(e) => {
                tracker.record_error(operation, &e.to_string());
                return Err(AdminError::transport(operation, &e));
            }
        };

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AdminError::transport(operation, &e))?;

        if status.is_success() {
            tracker.record_success(operation);
            Ok(body)
        } else {
            let error = AdminError::from_response(operation, status.as_u16(), &body);
            // Not-found style answers are normal results for the caller
            if matches!(
                error.kind,
                AdminErrorKind::NoSuchUser | AdminErrorKind::KeyExists | AdminErrorKind::NoSuchBucket
            ) {
                tracker.record_success(operation);
            } else {
                tracker.record_error(operation, &error.message);
            }
            Err(error)
        }
    }

    fn parse<T: DeserializeOwned>(operation: &'static str, body: &str) -> Result<T, AdminError> {
        serde_json::from_str(body).map_err(|e| {
            AdminError::new(
                AdminErrorKind::Other,
                operation,
                format!("unexpected response body: {e}"),
            )
        })
    }
}

#[async_trait]
impl AdminApi for RgwAdminClient {
    async fn get_user(&self, uid: &str) -> Result<RgwUser, AdminError> {
        let span = info_span!("radosgw.admin.get_user", user.uid = uid);
        async move {
            let url = self.url("user", &[("uid", uid)], None);
            let body = self.call("get_user", Method::GET, url).await?;
            Self::parse("get_user", &body)
        }
        .instrument(span)
        .await
    }

    async fn create_user(&self, user: &NewUser) -> Result<(), AdminError> {
        let span = info_span!("radosgw.admin.create_user", user.uid = user.uid.as_str());
        async move {
            let max_buckets = user.max_buckets.map(|m| m.to_string());
            let mut query = vec![
                ("uid", user.uid.as_str()),
                ("display-name", user.display_name.as_str()),
                ("access-key", user.credentials.access_key()),
                ("secret-key", user.credentials.secret_key()),
            ];
            if let Some(max_buckets) = max_buckets.as_deref() {
                query.push(("max-buckets", max_buckets));
            }
            let url = self.url("user", &query, None);
            self.call("create_user", Method::PUT, url).await?;
            Ok(())
        }
        .instrument(span)
        .await
    }

    async fn set_user_quota(&self, uid: &str, quota: &UserQuota) -> Result<(), AdminError> {
        let span = info_span!("radosgw.admin.set_user_quota", user.uid = uid);
        async move {
            let max_size_kb = quota.max_size_kb.unwrap_or(-1).to_string();
            let max_objects = quota.max_objects.unwrap_or(-1).to_string();
            let url = self.url(
                "user",
                &[
                    ("uid", uid),
                    ("quota-type", "user"),
                    ("max-size-kb", max_size_kb.as_str()),
                    ("max-objects", max_objects.as_str()),
                    ("enabled", "true"),
                ],
                Some("quota"),
            );
            self.call("set_user_quota", Method::PUT, url).await?;
            Ok(())
        }
        .instrument(span)
        .await
    }

    async fn remove_user(&self, uid: &str) -> Result<(), AdminError> {
        let span = info_span!("radosgw.admin.remove_user", user.uid = uid);
        async move {
            let url = self.url("user", &[("uid", uid)], None);
            self.call("remove_user", Method::DELETE, url).await?;
            Ok(())
        }
        .instrument(span)
        .await
    }

    async fn list_user_buckets(&self, uid: &str) -> Result<Vec<String>, AdminError> {
        let span = info_span!("radosgw.admin.list_user_buckets", user.uid = uid);
        async move {
            let url = self.url("bucket", &[("uid", uid)], None);
            let body = self.call("list_user_buckets", Method::GET, url).await?;
            Self::parse("list_user_buckets", &body)
        }
        .instrument(span)
        .await
    }
}
