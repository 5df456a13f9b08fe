//! # Request Signing
//!
//! The admin API authenticates requests the same way S3 does: AWS Signature
//! Version 4 with service `s3`.

use crate::credentials::CredentialPair;
use crate::radosgw::{AdminError, AdminErrorKind};
use aws_credential_types::Credentials;
use aws_sigv4::http_request::{
    sign, PayloadChecksumKind, SignableBody, SignableRequest, SigningSettings,
};
use aws_sigv4::sign::v4;
use reqwest::header::{HeaderName, HeaderValue};
use std::time::SystemTime;

/// Sign `request` in place, adding the `Authorization`, `x-amz-date` and
/// `x-amz-content-sha256` headers
pub fn sign_request(
    request: &mut reqwest::Request,
    credentials: &CredentialPair,
    region: &str,
    operation: &'static str,
) -> Result<(), AdminError> {
    let signing_error =
        |e: &dyn std::fmt::Display| AdminError::new(AdminErrorKind::Other, operation, format!("signing failed: {e}"));

    let identity = Credentials::new(
        credentials.access_key(),
        credentials.secret_key(),
        None,
        None,
        "radosgw-admin",
    )
    .into();

    let mut settings = SigningSettings::default();
    settings.payload_checksum_kind = PayloadChecksumKind::XAmzSha256;

    let params = v4::SigningParams::builder()
        .identity(&identity)
        .region(region)
        .name("s3")
        .time(SystemTime::now())
        .settings(settings)
        .build()
        .map_err(|e| signing_error(&e))?
        .into();

    let headers: Vec<(String, String)> = request
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();
    let body = request
        .body()
        .and_then(reqwest::Body::as_bytes)
        .unwrap_or_default();

    let signable = SignableRequest::new(
        request.method().as_str(),
        request.url().as_str(),
        headers.iter().map(|(k, v)| (k.as_str(), v.as_str())),
        SignableBody::Bytes(body),
    )
    .map_err(|e| signing_error(&e))?;

    let (instructions, _signature) = sign(signable, &params)
        .map_err(|e| signing_error(&e))?
        .into_parts();

    for (name, value) in instructions.headers() {
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| signing_error(&e))?;
        let value = HeaderValue::from_str(value).map_err(|e| signing_error(&e))?;
        request.headers_mut().insert(name, value);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_request_adds_authorization() {
        let mut request = reqwest::Request::new(
            reqwest::Method::GET,
            reqwest::Url::parse("http://rgw.local:7480/admin/user?format=json&uid=alice").unwrap(),
        );
        let credentials = CredentialPair::new("ADMINACCESSKEY", "adminsecretkey");

        sign_request(&mut request, &credentials, "default", "get_user").unwrap();

        let authorization = request
            .headers()
            .get("authorization")
            .unwrap()
            .to_str()
            .unwrap();
        assert!(authorization.starts_with("AWS4-HMAC-SHA256 Credential=ADMINACCESSKEY/"));
        assert!(authorization.contains("/default/s3/aws4_request"));
        assert!(request.headers().contains_key("x-amz-date"));
        assert!(request.headers().contains_key("x-amz-content-sha256"));
    }
}
