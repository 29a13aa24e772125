use base64::{Engine as _, engine::general_purpose::STANDARD};
use queue::{ExtractionJob, JobImage, Message};

use crate::{ExtractError, ResultExtract};

const FALLBACK_MIME: &str = "application/octet-stream";
const FALLBACK_EXT: &str = "bin";

/// One uploaded file as received by the HTTP layer.
#[derive(Clone, Debug, Default)]
pub struct Upload {
    pub bytes: Vec<u8>,
    pub name: Option<String>,
    pub mime_type: Option<String>,
}

/// Extension of a file name, lowercased, when it looks like one.
fn name_extension(name: &str) -> Option<String> {
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// MIME type and extension of `bytes`.
///
/// Magic bytes win; otherwise the declared MIME type and the file name's
/// extension are used, then `application/octet-stream` and `bin`.
pub fn sniff(bytes: &[u8], declared_mime: Option<&str>, name: Option<&str>) -> (String, String) {
    if let Some(kind) = infer::get(bytes) {
        return (kind.mime_type().to_string(), kind.extension().to_string());
    }
    let mime = declared_mime
        .map(str::trim)
        .filter(|mime| !mime.is_empty())
        .unwrap_or(FALLBACK_MIME)
        .to_string();
    let ext = name
        .and_then(name_extension)
        .unwrap_or_else(|| FALLBACK_EXT.to_string());
    (mime, ext)
}

/// Build the extraction job for `user_id`. The job is validated here so the
/// caller can answer the upload request with the error.
pub fn build_job(user_id: &str, uploads: Vec<Upload>) -> ResultExtract<ExtractionJob> {
    let mut images = Vec::with_capacity(uploads.len());
    for (index, upload) in uploads.into_iter().enumerate() {
        if upload.bytes.is_empty() {
            return Err(ExtractError::InvalidInput(format!("image {index} is empty")));
        }
        let (mime_type, ext) = sniff(
            &upload.bytes,
            upload.mime_type.as_deref(),
            upload.name.as_deref(),
        );
        let name = upload
            .name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| format!("image-{index}.{ext}"));
        images.push(JobImage {
            content: STANDARD.encode(&upload.bytes),
            mime_type,
            name,
            ext,
        });
    }

    let job = ExtractionJob {
        images,
        user_id: user_id.to_string(),
    };
    job.validate()
        .map_err(|err| ExtractError::InvalidInput(err.to_string()))?;
    Ok(job)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

    #[test]
    fn magic_bytes_win_over_declared_type() {
        assert_eq!(
            sniff(&PNG, Some("image/jpeg"), Some("slip.jpg")),
            ("image/png".to_string(), "png".to_string())
        );
    }

    #[test]
    fn unknown_bytes_fall_back() {
        assert_eq!(
            sniff(b"plain", Some("image/heic"), Some("Slip.HEIC")),
            ("image/heic".to_string(), "heic".to_string())
        );
        assert_eq!(
            sniff(b"plain", None, Some("noext")),
            ("application/octet-stream".to_string(), "bin".to_string())
        );
    }

    #[test]
    fn job_encodes_images() {
        let job = build_job(
            "alice",
            vec![Upload {
                bytes: PNG.to_vec(),
                name: None,
                mime_type: None,
            }],
        )
        .unwrap();
        assert_eq!(job.user_id, "alice");
        assert_eq!(job.images[0].name, "image-0.png");
        assert_eq!(STANDARD.decode(&job.images[0].content).unwrap(), PNG);
    }

    #[test]
    fn job_needs_images_and_user() {
        assert!(matches!(
            build_job("alice", Vec::new()),
            Err(ExtractError::InvalidInput(_))
        ));
        assert!(matches!(
            build_job("alice", vec![Upload::default()]),
            Err(ExtractError::InvalidInput(_))
        ));
        let upload = Upload {
            bytes: PNG.to_vec(),
            ..Upload::default()
        };
        assert!(matches!(
            build_job(" ", vec![upload]),
            Err(ExtractError::InvalidInput(_))
        ));
    }
}
