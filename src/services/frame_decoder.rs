use crate::error::{DecodeError, PreprocessError};
use base64::Engine;
use image::{DynamicImage, ImageBuffer, RgbImage};

/// Decoded screen frame, always 8-bit RGB in the capture's native size.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFrame {
    image: RgbImage,
}

impl RawFrame {
    /// Converts any decoded colour type to RGB: gray is replicated to three
    /// channels, alpha is dropped, wider samples are scaled down to 8 bits.
    pub fn from_dynamic(image: DynamicImage) -> Self {
        let image = match image {
            DynamicImage::ImageRgb8(rgb) => rgb,
            other => other.to_rgb8(),
        };
        RawFrame { image }
    }

    /// Builds a frame from an interleaved `u8` buffer with 1 (gray), 2 (gray
    /// + alpha), 3 (RGB) or 4 (RGBA) channels.
    pub fn from_pixels(
        width: u32,
        height: u32,
        channels: usize,
        data: Vec<u8>,
    ) -> Result<Self, PreprocessError> {
        let expected = width as usize * height as usize * channels;
        if !(1..=4).contains(&channels) {
            return Err(PreprocessError::UnsupportedChannels { channels });
        }
        if data.len() != expected {
            return Err(PreprocessError::BufferSize {
                expected,
                actual: data.len(),
            });
        }

        let buffer_size = PreprocessError::BufferSize {
            expected,
            actual: data.len(),
        };
        let image = match channels {
            1 => ImageBuffer::from_raw(width, height, data).map(DynamicImage::ImageLuma8),
            2 => ImageBuffer::from_raw(width, height, data).map(DynamicImage::ImageLumaA8),
            3 => ImageBuffer::from_raw(width, height, data).map(DynamicImage::ImageRgb8),
            _ => ImageBuffer::from_raw(width, height, data).map(DynamicImage::ImageRgba8),
        }
        .ok_or(buffer_size)?;

        Ok(RawFrame::from_dynamic(image))
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }
}

/// Decodes one base64 image payload. A leading `data:<mime>;base64,` prefix
/// is accepted, and so is line-wrapped (MIME style) base64.
pub fn decode(payload: &str) -> Result<RawFrame, DecodeError> {
    let encoded: String = strip_data_uri(payload.trim())
        .split_ascii_whitespace()
        .collect();
    if encoded.is_empty() {
        return Err(DecodeError::MalformedEncoding("empty payload".to_string()));
    }

    let bytes = base64::engine::general_purpose::STANDARD.decode(&encoded)?;
    if bytes.is_empty() {
        return Err(DecodeError::TruncatedData("payload decoded to zero bytes".to_string()));
    }

    let image = image::load_from_memory(&bytes)?;
    Ok(RawFrame::from_dynamic(image))
}

fn strip_data_uri(payload: &str) -> &str {
    if payload.starts_with("data:") {
        if let Some((header, body)) = payload.split_once(',') {
            if header.ends_with(";base64") {
                return body;
            }
        }
    }
    payload
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::codecs::png::PngEncoder;
    use image::{ExtendedColorType, ImageEncoder, Rgb};

    fn png_base64(image: &DynamicImage) -> String {
        let mut bytes = Vec::new();
        let encoder = PngEncoder::new(&mut bytes);
        let rgba = image.to_rgba8();
        encoder
            .write_image(&rgba, rgba.width(), rgba.height(), ExtendedColorType::Rgba8)
            .unwrap();
        base64::engine::general_purpose::STANDARD.encode(bytes)
    }

    #[test]
    fn decodes_png_at_native_size() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(7, 5, Rgb([10, 20, 30])));
        let frame = decode(&png_base64(&img)).unwrap();
        assert_eq!((frame.width(), frame.height()), (7, 5));
        assert_eq!(frame.image().get_pixel(3, 2), &Rgb([10, 20, 30]));
    }

    #[test]
    fn accepts_data_uri_prefix() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(2, 2, Rgb([1, 2, 3])));
        let payload = format!("data:image/png;base64,{}", png_base64(&img));
        assert!(decode(&payload).is_ok());
    }

    #[test]
    fn accepts_line_wrapped_base64() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(16, 16, Rgb([4, 5, 6])));
        let flat = png_base64(&img);
        let wrapped = flat
            .as_bytes()
            .chunks(76)
            .map(|line| std::str::from_utf8(line).unwrap())
            .collect::<Vec<_>>()
            .join("\n")
            + "\n";
        assert!(wrapped.lines().count() > 1);

        let frame = decode(&wrapped).unwrap();
        assert_eq!(frame.image().get_pixel(8, 8), &Rgb([4, 5, 6]));

        let crlf = wrapped.replace('\n', "\r\n");
        assert!(decode(&crlf).is_ok());
    }

    #[test]
    fn rejects_non_base64_payload() {
        assert!(matches!(
            decode("not base64 at all!!"),
            Err(DecodeError::MalformedEncoding(_))
        ));
        assert!(matches!(decode("   "), Err(DecodeError::MalformedEncoding(_))));
    }

    #[test]
    fn rejects_unknown_format() {
        let payload = base64::engine::general_purpose::STANDARD.encode(b"hello world, not an image");
        assert!(matches!(decode(&payload), Err(DecodeError::UnsupportedFormat(_))));
    }

    #[test]
    fn rejects_truncated_png() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(32, 32, Rgb([200, 0, 0])));
        let full = base64::engine::general_purpose::STANDARD
            .decode(png_base64(&img))
            .unwrap();
        let cut = base64::engine::general_purpose::STANDARD.encode(&full[..full.len() / 2]);
        assert!(matches!(decode(&cut), Err(DecodeError::TruncatedData(_))));
    }

    #[test]
    fn alpha_is_dropped_and_gray_replicated() {
        let rgba = RawFrame::from_pixels(1, 1, 4, vec![9, 8, 7, 0]).unwrap();
        assert_eq!(rgba.image().get_pixel(0, 0), &Rgb([9, 8, 7]));

        let gray = RawFrame::from_pixels(1, 1, 1, vec![42]).unwrap();
        assert_eq!(gray.image().get_pixel(0, 0), &Rgb([42, 42, 42]));

        let gray_alpha = RawFrame::from_pixels(1, 1, 2, vec![77, 255]).unwrap();
        assert_eq!(gray_alpha.image().get_pixel(0, 0), &Rgb([77, 77, 77]));
    }

    #[test]
    fn rejects_unsupported_channel_counts() {
        assert!(matches!(
            RawFrame::from_pixels(1, 1, 5, vec![0; 5]),
            Err(PreprocessError::UnsupportedChannels { channels: 5 })
        ));
        assert!(matches!(
            RawFrame::from_pixels(2, 2, 3, vec![0; 5]),
            Err(PreprocessError::BufferSize { expected: 12, actual: 5 })
        ));
    }
}
