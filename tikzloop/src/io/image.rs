//! Image codec: raster file → inline `data:` URI for model requests.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

/// Read `path` and return `data:<mime>;base64,<payload>`.
pub fn encode_data_uri(path: &Path) -> Result<String> {
    let bytes = fs::read(path).with_context(|| format!("read image {}", path.display()))?;
    let mime = mime_for_path(path).unwrap_or("image/png");
    Ok(format!("data:{mime};base64,{}", BASE64.encode(bytes)))
}

fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        _ => None,
    }
}
