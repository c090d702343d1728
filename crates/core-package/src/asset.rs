//! Asset probing boundary.
//!
//! Decoding, hashing and metadata extraction live outside the compiler; the
//! packager only needs a content hash to name the file, an extension, and
//! the geometry the target document records per asset kind.

/// Shape metadata for one asset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AssetGeometry {
    /// Costume rotation centre.
    Image { center_x: f64, center_y: f64 },
    /// Sound sample layout.
    Audio { sample_count: u64, rate: u32 },
}

/// What a probe learns about an asset payload.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetInfo {
    pub content_hash: String,
    pub extension: String,
    pub geometry: AssetGeometry,
}

impl AssetInfo {
    /// `<hash>.<ext>`, the on-disk name and `md5ext` value.
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.content_hash, self.extension)
    }
}

/// Raised by probes for payloads they cannot classify; surfaces to users as
/// an unsupported-asset compile error.
#[derive(Debug, thiserror::Error)]
#[error("unsupported asset '{name}': {reason}")]
pub struct ProbeError {
    pub name: String,
    pub reason: String,
}

/// External collaborator that inspects asset payloads.
pub trait AssetProbe {
    fn probe(&self, name: &str, data: &[u8]) -> Result<AssetInfo, ProbeError>;
}
