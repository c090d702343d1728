//! Default asset probe: content hashing plus magic-byte classification.
//!
//! Real geometry extraction (image centres, audio sample counts) needs
//! format decoding that stays outside the compiler; this probe supplies the
//! conservative defaults the target environment tolerates.

use core_package::{AssetGeometry, AssetInfo, AssetProbe, ProbeError};
use sha2::{Digest, Sha256};

#[derive(Debug, Default)]
pub struct SniffProbe;

impl AssetProbe for SniffProbe {
    fn probe(&self, name: &str, data: &[u8]) -> Result<AssetInfo, ProbeError> {
        let extension = sniff_extension(data).ok_or_else(|| ProbeError {
            name: name.to_string(),
            reason: "unrecognised file signature".to_string(),
        })?;
        let geometry = match extension {
            "png" | "jpg" | "svg" => AssetGeometry::Image {
                center_x: 0.0,
                center_y: 0.0,
            },
            _ => AssetGeometry::Audio {
                sample_count: 0,
                rate: 44100,
            },
        };
        Ok(AssetInfo {
            content_hash: hex_digest(data),
            extension: extension.to_string(),
            geometry,
        })
    }
}

fn sniff_extension(data: &[u8]) -> Option<&'static str> {
    if data.starts_with(b"\x89PNG") {
        Some("png")
    } else if data.starts_with(b"\xFF\xD8") {
        Some("jpg")
    } else if data.starts_with(b"<svg") || data.starts_with(b"<?xml") {
        Some("svg")
    } else if data.starts_with(b"RIFF") {
        Some("wav")
    } else if data.starts_with(b"ID3") || data.starts_with(b"\xFF\xFB") {
        Some("mp3")
    } else {
        None
    }
}

fn hex_digest(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}
