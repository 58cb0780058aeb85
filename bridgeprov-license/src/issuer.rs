//! Remote license issuance.
//!
//! The issuing service is reached over HTTPS. A short connectivity probe
//! decides whether issuance is attempted at all; an unreachable service is
//! a routing decision, not an error.

use crate::activation::ActivationKey;
use crate::error::LicenseResult;
use crate::record::LicenseType;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// An issued license as received from the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedLicense {
    /// Raw record bytes (not yet verified).
    pub bytes: Vec<u8>,
    /// File name suggested by the service, if any.
    pub suggested_name: Option<String>,
}

/// What the caller asks the service for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuanceRequest {
    /// Requested license type.
    pub license_type: LicenseType,
    /// Requested validity in days; `0` asks for an unlimited license.
    pub validity_days: u32,
}

impl Default for IssuanceRequest {
    fn default() -> Self {
        Self {
            license_type: LicenseType::Activated,
            validity_days: 0,
        }
    }
}

/// A service that can issue license records.
#[async_trait]
pub trait RemoteIssuer: Send + Sync {
    /// Returns true if the service answers within the probe timeout.
    async fn probe(&self) -> bool;

    /// Requests a record for `key`.
    async fn request(
        &self,
        key: &ActivationKey,
        request: &IssuanceRequest,
    ) -> LicenseResult<IssuedLicense>;
}

/// Connection settings for [`HttpIssuer`].
#[derive(Clone, Serialize, Deserialize)]
pub struct IssuerConfig {
    /// Issuance endpoint.
    pub issue_url: String,
    /// Bearer token.
    pub token: String,
    /// Timeout of the connectivity probe.
    pub probe_timeout: Duration,
    /// Timeout of the issuance request.
    pub request_timeout: Duration,
}

impl std::fmt::Debug for IssuerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuerConfig")
            .field("issue_url", &self.issue_url)
            .field("token", &mask_token(&self.token))
            .field("probe_timeout", &self.probe_timeout)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl IssuerConfig {
    /// Creates a config with a 3 s probe and 30 s request timeout.
    pub fn new(issue_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            issue_url: issue_url.into(),
            token: token.into(),
            probe_timeout: Duration::from_secs(3),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Shows only the first and last four characters of a secret.
#[must_use]
pub fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}

/// Extracts the `filename=` hint from a `Content-Disposition` value.
#[must_use]
pub fn content_disposition_filename(header: &str) -> Option<String> {
    header.split(';').map(str::trim).find_map(|part| {
        let value = part.strip_prefix("filename=")?;
        let value = value.trim_matches('"').trim();
        (!value.is_empty()).then(|| value.to_string())
    })
}

#[cfg(feature = "online")]
pub use http::HttpIssuer;

#[cfg(feature = "online")]
mod http {
    use super::{
        content_disposition_filename, IssuanceRequest, IssuedLicense, IssuerConfig,
        RemoteIssuer,
    };
    use crate::activation::ActivationKey;
    use crate::error::{LicenseError, LicenseResult};
    use async_trait::async_trait;
    use reqwest::header::CONTENT_DISPOSITION;
    use reqwest::{Client, StatusCode};
    use tracing::{debug, info, warn};

    const MAX_ERROR_BODY: usize = 256;

    /// [`RemoteIssuer`] backed by `reqwest`.
    #[derive(Debug, Clone)]
    pub struct HttpIssuer {
        config: IssuerConfig,
        probe_client: Client,
        client: Client,
    }

    impl HttpIssuer {
        /// Builds the HTTP clients for `config`.
        ///
        /// # Errors
        ///
        /// Returns [`LicenseError::Network`] if the TLS backend cannot be
        /// initialized.
        pub fn new(config: IssuerConfig) -> LicenseResult<Self> {
            let probe_client = Client::builder()
                .timeout(config.probe_timeout)
                .build()
                .map_err(|e| LicenseError::Network(format!("failed to create HTTP client: {e}")))?;
            let client = Client::builder()
                .timeout(config.request_timeout)
                .build()
                .map_err(|e| LicenseError::Network(format!("failed to create HTTP client: {e}")))?;
            Ok(Self {
                config,
                probe_client,
                client,
            })
        }

        /// Returns the connection settings.
        #[must_use]
        pub fn config(&self) -> &IssuerConfig {
            &self.config
        }
    }

    #[async_trait]
    impl RemoteIssuer for HttpIssuer {
        async fn probe(&self) -> bool {
            match self.probe_client.get(&self.config.issue_url).send().await {
                Ok(response) => {
                    let reachable = !response.status().is_server_error();
                    debug!(status = %response.status(), reachable, "license server probe");
                    reachable
                }
                Err(e) => {
                    debug!(error = %e, "license server unreachable");
                    false
                }
            }
        }

        async fn request(
            &self,
            key: &ActivationKey,
            request: &IssuanceRequest,
        ) -> LicenseResult<IssuedLicense> {
            let license_type = request.license_type.as_raw().to_string();
            let validity_days = request.validity_days.to_string();
            info!(
                activation_key = %key,
                license_type = %license_type,
                validity_days = %validity_days,
                "requesting license"
            );

            let response = self
                .client
                .get(&self.config.issue_url)
                .bearer_auth(&self.config.token)
                .query(&[
                    ("activationKey", key.as_str()),
                    ("licenseType", license_type.as_str()),
                    ("validityDays", validity_days.as_str()),
                ])
                .send()
                .await
                .map_err(|e| LicenseError::Network(format!("license request failed: {e}")))?;

            let status = response.status();
            if status != StatusCode::OK {
                let body: String = response
                    .text()
                    .await
                    .unwrap_or_default()
                    .chars()
                    .take(MAX_ERROR_BODY)
                    .collect();
                warn!(status = %status, "license request rejected");
                return Err(LicenseError::IssuanceRejected {
                    status: status.as_u16(),
                    body,
                });
            }

            let suggested_name = response
                .headers()
                .get(CONTENT_DISPOSITION)
                .and_then(|v| v.to_str().ok())
                .and_then(content_disposition_filename);

            let bytes = response
                .bytes()
                .await
                .map_err(|e| LicenseError::Network(format!("failed to read license body: {e}")))?
                .to_vec();

            debug!(
                len = bytes.len(),
                suggested_name = suggested_name.as_deref().unwrap_or("-"),
                "received license"
            );
            Ok(IssuedLicense {
                bytes,
                suggested_name,
            })
        }
    }
}
