/// Verification certificates for confirmed anchors.
///
/// A certificate is created once, on first request, and never changes
/// afterwards except for its verification counter. Numbers are assigned by
/// the store under a per-year lock, so concurrent issuers never share one.
pub mod render;

use std::sync::Arc;

use chrono::{DateTime, Datelike, Utc};
use tracing::info;
use uuid::Uuid;

use crate::error::{AnchorError, Result};
use crate::state::models::{AnchorRecord, AnchorStatus, Certificate, NewCertificate};
use crate::state::AnchorStore;

pub use render::{qr_svg, CertificateRenderer, HtmlRenderer, RenderedDocument};

#[derive(Debug, Clone)]
pub struct CertificateConfig {
    /// Leading component of `PREFIX-YYYY-NNNNNN`.
    pub prefix: String,
    /// Public base URL; the anchor id is appended.
    pub verification_base_url: String,
}

impl Default for CertificateConfig {
    fn default() -> Self {
        Self {
            prefix: "SC".into(),
            verification_base_url: "http://localhost:8000/verify".into(),
        }
    }
}

impl CertificateConfig {
    pub fn verification_url(&self, anchor_id: Uuid) -> String {
        format!(
            "{}/{anchor_id}",
            self.verification_base_url.trim_end_matches('/')
        )
    }
}

#[derive(Clone)]
pub struct CertificateIssuer {
    store: Arc<dyn AnchorStore>,
    renderer: Arc<dyn CertificateRenderer>,
    config: CertificateConfig,
}

impl CertificateIssuer {
    pub fn new(store: Arc<dyn AnchorStore>, config: CertificateConfig) -> Self {
        Self::with_renderer(store, config, Arc::new(HtmlRenderer))
    }

    pub fn with_renderer(
        store: Arc<dyn AnchorStore>,
        config: CertificateConfig,
        renderer: Arc<dyn CertificateRenderer>,
    ) -> Self {
        Self {
            store,
            renderer,
            config,
        }
    }

    /// Return the anchor's certificate, issuing it on first call.
    pub async fn issue_or_get(&self, anchor_id: Uuid) -> Result<Certificate> {
        self.issue_or_get_at(anchor_id, Utc::now()).await
    }

    /// As [`Self::issue_or_get`], numbering into the year of `now`.
    pub async fn issue_or_get_at(&self, anchor_id: Uuid, now: DateTime<Utc>) -> Result<Certificate> {
        let anchor = self.confirmed_anchor(anchor_id).await?;

        if let Some(existing) = self.store.get_certificate(anchor.id).await? {
            return Ok(existing);
        }

        let certificate = self
            .store
            .create_certificate(&NewCertificate {
                anchor_id: anchor.id,
                prefix: self.config.prefix.clone(),
                year: now.year(),
                verification_url: self.config.verification_url(anchor.id),
            })
            .await?;

        info!(
            anchor_id = %anchor.id,
            certificate_number = %certificate.certificate_number,
            "Certificate issued"
        );
        Ok(certificate)
    }

    /// Render the human-facing attestation for a confirmed anchor.
    pub async fn render(&self, anchor_id: Uuid) -> Result<RenderedDocument> {
        let certificate = self.issue_or_get(anchor_id).await?;
        let anchor = self.confirmed_anchor(anchor_id).await?;
        self.renderer.render(&certificate, &anchor)
    }

    async fn confirmed_anchor(&self, anchor_id: Uuid) -> Result<AnchorRecord> {
        let anchor = self
            .store
            .get_anchor(anchor_id)
            .await?
            .ok_or_else(|| AnchorError::NotFound(format!("anchor {anchor_id}")))?;

        if anchor.status != AnchorStatus::Confirmed {
            return Err(AnchorError::PreconditionFailed(format!(
                "anchor {anchor_id} is {}, certificates require confirmed",
                anchor.status.as_str()
            )));
        }
        Ok(anchor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verification_url_joins_cleanly() {
        let id = Uuid::nil();
        let config = CertificateConfig {
            prefix: "SC".into(),
            verification_base_url: "https://example.org/verify/".into(),
        };
        assert_eq!(
            config.verification_url(id),
            format!("https://example.org/verify/{id}")
        );
    }
}
