/// Certificate rendering.
///
/// Rendering is a pure function of the certificate and its anchor; output
/// is regenerated on every request and never stored.
use qrcode::render::svg;
use qrcode::{EcLevel, QrCode};

use crate::error::{AnchorError, Result};
use crate::state::models::{AnchorKind, AnchorRecord, Certificate};

/// A rendered artifact ready to be served.
#[derive(Debug, Clone)]
pub struct RenderedDocument {
    pub content_type: &'static str,
    pub file_name: String,
    pub body: Vec<u8>,
}

/// Turns a certificate into a document. PDF renderers plug in here.
pub trait CertificateRenderer: Send + Sync {
    fn render(&self, certificate: &Certificate, anchor: &AnchorRecord) -> Result<RenderedDocument>;
}

/// SVG QR code encoding `data`.
pub fn qr_svg(data: &str) -> Result<String> {
    let code = QrCode::with_error_correction_level(data.as_bytes(), EcLevel::M)
        .map_err(|e| AnchorError::InvalidInput(format!("QR encoding failed: {e}")))?;

    Ok(code
        .render::<svg::Color>()
        .min_dimensions(180, 180)
        .quiet_zone(true)
        .build())
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Standalone HTML page with the QR code inlined.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlRenderer;

impl CertificateRenderer for HtmlRenderer {
    fn render(&self, certificate: &Certificate, anchor: &AnchorRecord) -> Result<RenderedDocument> {
        let qr = qr_svg(&certificate.verification_url)?;

        let mut rows = vec![
            ("Certificate number", certificate.certificate_number.clone()),
            ("Document hash (SHA-256)", anchor.document_hash.clone()),
            ("Network", anchor.network.clone().unwrap_or_default()),
            ("Transaction", anchor.tx_ref.clone().unwrap_or_default()),
            (
                "Block",
                anchor.block_ref.map(|b| b.to_string()).unwrap_or_default(),
            ),
            (
                "Confirmed at",
                anchor
                    .confirmed_at
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_default(),
            ),
        ];
        if let AnchorKind::BatchMember {
            batch_id,
            merkle_root,
            ..
        } = &anchor.kind
        {
            rows.push(("Batch", batch_id.clone()));
            rows.push(("Merkle root", merkle_root.clone()));
        }

        let table: String = rows
            .iter()
            .map(|(label, value)| {
                format!(
                    "<tr><th>{}</th><td><code>{}</code></td></tr>\n",
                    label,
                    escape_html(value)
                )
            })
            .collect();

        let url = escape_html(&certificate.verification_url);
        let html = format!(
            r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>Anchoring certificate {number}</title>
<style>
body {{ font-family: sans-serif; max-width: 48rem; margin: 2rem auto; }}
th {{ text-align: left; padding-right: 1rem; vertical-align: top; }}
code {{ word-break: break-all; }}
</style>
</head>
<body>
<h1>Document anchoring certificate</h1>
<p>The document with the hash below was recorded on a public ledger and has not changed since.</p>
<table>
{table}</table>
<h2>Verify</h2>
<p><a href="{url}">{url}</a></p>
{qr}
<p>Issued {issued}</p>
</body>
</html>
"#,
            number = escape_html(&certificate.certificate_number),
            issued = certificate.created_at.to_rfc3339(),
        );

        Ok(RenderedDocument {
            content_type: "text/html; charset=utf-8",
            file_name: format!("{}.html", certificate.certificate_number),
            body: html.into_bytes(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    #[test]
    fn test_qr_svg_is_svg() {
        let svg = qr_svg("https://example.org/verify/123").unwrap();
        assert!(svg.contains("<svg"));
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html(r#"<a href="x">&'"#), "&lt;a href=&quot;x&quot;&gt;&amp;&#39;");
    }

    #[test]
    fn test_html_contains_fields() {
        let now = Utc::now();
        let mut anchor = AnchorRecord::new(
            AnchorKind::Single {
                subject_ref: None,
                salt: "00".repeat(32),
            },
            "ab".repeat(32),
            now,
        );
        anchor.tx_ref = Some("0xfeed".into());
        anchor.network = Some("xphere".into());

        let certificate = Certificate {
            id: Uuid::now_v7(),
            anchor_id: anchor.id,
            certificate_number: "SC-2026-000001".into(),
            verification_url: "https://example.org/verify/1".into(),
            verification_count: 0,
            last_verified_at: None,
            created_at: now,
        };

        let doc = HtmlRenderer.render(&certificate, &anchor).unwrap();
        let html = String::from_utf8(doc.body).unwrap();
        assert_eq!(doc.file_name, "SC-2026-000001.html");
        assert!(html.contains("SC-2026-000001"));
        assert!(html.contains(&"ab".repeat(32)));
        assert!(html.contains("0xfeed"));
        assert!(html.contains("<svg"));
    }
}
