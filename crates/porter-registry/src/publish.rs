//! Multipart encoding for the publish operation.
//!
//! The registry accepts releases as `multipart/form-data` with a random
//! UUID boundary. Part order is fixed: the source archive, then the
//! optional archive signature, then the optional JSON metadata.

use uuid::Uuid;

use crate::error::{RegistryError, RegistryResult};
use crate::signing::SignatureFormat;

/// An encoded multipart request body.
#[derive(Debug, Clone)]
pub struct PublishBody {
    /// Boundary used between parts.
    pub boundary: String,

    /// Raw body bytes.
    pub bytes: Vec<u8>,

    /// Signature format, when a signature part is included.
    pub signature_format: Option<SignatureFormat>,
}

impl PublishBody {
    /// `Content-Type` header value for this body.
    pub fn content_type(&self) -> String {
        format!("multipart/form-data;boundary=\"{}\"", self.boundary)
    }
}

/// Encode a publish request body.
///
/// A signature without a declared format fails with
/// [`RegistryError::MissingSignatureFormat`] before anything is sent.
pub fn build_publish_body(
    archive: &[u8],
    signature: Option<&[u8]>,
    signature_format: Option<SignatureFormat>,
    metadata: Option<&serde_json::Value>,
) -> RegistryResult<PublishBody> {
    if signature.is_some() && signature_format.is_none() {
        return Err(RegistryError::MissingSignatureFormat);
    }

    let boundary = Uuid::new_v4().to_string();
    let mut bytes = Vec::with_capacity(archive.len() + 1024);

    append_part(
        &mut bytes,
        &boundary,
        "source-archive",
        "application/zip",
        "binary",
        archive,
    );

    if let Some(signature) = signature {
        append_part(
            &mut bytes,
            &boundary,
            "source-archive-signature",
            "application/octet-stream",
            "binary",
            signature,
        );
    }

    if let Some(metadata) = metadata {
        let json = serde_json::to_vec(metadata).map_err(|e| RegistryError::InvalidResponse {
            message: format!("failed to serialize publish metadata: {}", e),
        })?;
        append_part(
            &mut bytes,
            &boundary,
            "metadata",
            "application/json",
            "quoted-printable",
            &json,
        );
    }

    bytes.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());

    Ok(PublishBody {
        boundary,
        bytes,
        signature_format,
    })
}

fn append_part(
    bytes: &mut Vec<u8>,
    boundary: &str,
    name: &str,
    content_type: &str,
    transfer_encoding: &str,
    content: &[u8],
) {
    bytes.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    bytes.extend_from_slice(
        format!("Content-Disposition: form-data; name=\"{}\"\r\n", name).as_bytes(),
    );
    bytes.extend_from_slice(format!("Content-Type: {}\r\n", content_type).as_bytes());
    bytes.extend_from_slice(
        format!("Content-Transfer-Encoding: {}\r\n", transfer_encoding).as_bytes(),
    );
    bytes.extend_from_slice(b"\r\n");
    bytes.extend_from_slice(content);
    bytes.extend_from_slice(b"\r\n");
}
