// encode.rs: JPEG-encodes a capture and base64-encodes the bytes for
// inlining into a provider request.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, GenericImageView};

use crate::ai::RecognitionError;

/// Encode `img` as a JPEG of the given quality (1–100) and return it base64-encoded.
pub fn encode_jpeg_base64(img: &DynamicImage, quality: u8) -> Result<String, RecognitionError> {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return Err(RecognitionError::ImageEncoding(format!(
            "image has no pixels ({w}x{h})"
        )));
    }

    let mut jpeg_buf: Vec<u8> = Vec::new();
    {
        let mut encoder = JpegEncoder::new_with_quality(&mut jpeg_buf, quality.clamp(1, 100));
        // JPEG has no alpha channel; flatten to RGB first.
        encoder
            .encode(img.to_rgb8().as_raw(), w, h, image::ExtendedColorType::Rgb8)
            .map_err(|e| RecognitionError::ImageEncoding(format!("jpeg encode: {e}")))?;
    }

    Ok(BASE64.encode(&jpeg_buf))
}
