// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! QR image rendering: URL string in, PNG bytes out.

use image::{ImageFormat, Luma};
use qrcode::QrCode;

/// Rendered QR modules are scaled up to at least this many pixels per side.
const MIN_IMAGE_DIMENSION: u32 = 240;

#[derive(Debug, thiserror::Error)]
pub enum QrRenderError {
    #[error("QR encoding failed: {0}")]
    Encode(#[from] qrcode::types::QrError),

    #[error("PNG encoding failed: {0}")]
    Png(#[from] image::ImageError),
}

/// Render `url` as a PNG-encoded QR code.
///
/// Pure: same input, same bytes, no I/O beyond the in-memory buffer.
pub fn render_qr_png(url: &str) -> Result<Vec<u8>, QrRenderError> {
    let code = QrCode::new(url.as_bytes())?;
    let img = code
        .render::<Luma<u8>>()
        .min_dimensions(MIN_IMAGE_DIMENSION, MIN_IMAGE_DIMENSION)
        .build();

    let mut bytes = Vec::new();
    img.write_to(&mut std::io::Cursor::new(&mut bytes), ImageFormat::Png)?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_a_png() {
        let bytes = render_qr_png("https://attend.example.com/attend?token=abc").unwrap();
        // PNG magic bytes.
        assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");
    }

    #[test]
    fn rendering_is_deterministic() {
        let url = "https://attend.example.com/attend?token=abc";
        assert_eq!(render_qr_png(url).unwrap(), render_qr_png(url).unwrap());
    }
}
