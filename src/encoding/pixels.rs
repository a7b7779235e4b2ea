//! Raw sensor pixels to encoder input

use crate::camera_driver::PixelFormat;
use image::{ExtendedColorType, ImageFormat};
use std::borrow::Cow;

use super::EncodeError;

/// Pixels in a layout the image encoders accept
pub(crate) struct EncoderInput<'a> {
    pub data: Cow<'a, [u8]>,
    pub width: u32,
    pub height: u32,
    pub color: ExtendedColorType,
}

/// Convert a captured buffer to RGB8 or L8
pub(crate) fn encoder_input(
    data: &[u8],
    format: PixelFormat,
    width: u32,
    height: u32,
) -> Result<EncoderInput<'_>, EncodeError> {
    if let Some(bpp) = format.bytes_per_pixel() {
        let expected = width as usize * height as usize * bpp;
        if data.len() < expected {
            return Err(EncodeError::ShortFrame {
                expected,
                actual: data.len(),
            });
        }
    }

    let (data, color) = match format {
        PixelFormat::Rgb888 => (Cow::Borrowed(data), ExtendedColorType::Rgb8),
        PixelFormat::Grayscale => (Cow::Borrowed(data), ExtendedColorType::L8),
        PixelFormat::Rgb565 => (Cow::Owned(rgb565_to_rgb888(data)), ExtendedColorType::Rgb8),
        PixelFormat::Yuv422 => (Cow::Owned(yuyv_to_rgb888(data)), ExtendedColorType::Rgb8),
        PixelFormat::Jpeg => {
            let decoded = image::load_from_memory_with_format(data, ImageFormat::Jpeg)?.to_rgb8();
            let (w, h) = decoded.dimensions();
            return Ok(EncoderInput {
                data: Cow::Owned(decoded.into_raw()),
                width: w,
                height: h,
                color: ExtendedColorType::Rgb8,
            });
        }
    };

    Ok(EncoderInput {
        data,
        width,
        height,
        color,
    })
}

/// Big-endian RGB565 (sensor byte order)
fn rgb565_to_rgb888(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() / 2 * 3);
    for px in data.chunks_exact(2) {
        let v = u16::from_be_bytes([px[0], px[1]]);
        let r = ((v >> 11) & 0x1F) as u8;
        let g = ((v >> 5) & 0x3F) as u8;
        let b = (v & 0x1F) as u8;
        out.extend_from_slice(&[(r << 3) | (r >> 2), (g << 2) | (g >> 4), (b << 3) | (b >> 2)]);
    }
    out
}

/// YUYV 4:2:2, BT.601
fn yuyv_to_rgb888(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() / 2 * 3);
    for quad in data.chunks_exact(4) {
        let (y0, u, y1, v) = (quad[0], quad[1], quad[2], quad[3]);
        out.extend_from_slice(&yuv_to_rgb(y0, u, v));
        out.extend_from_slice(&yuv_to_rgb(y1, u, v));
    }
    out
}

fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let c = i32::from(y);
    let d = i32::from(u) - 128;
    let e = i32::from(v) - 128;
    let clamp = |x: i32| x.clamp(0, 255) as u8;
    [
        clamp(c + ((359 * e) >> 8)),
        clamp(c - ((88 * d + 183 * e) >> 8)),
        clamp(c + ((454 * d) >> 8)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rgb565_extremes() {
        assert_eq!(rgb565_to_rgb888(&[0xFF, 0xFF]), vec![255, 255, 255]);
        assert_eq!(rgb565_to_rgb888(&[0xF8, 0x00]), vec![255, 0, 0]);
        assert_eq!(rgb565_to_rgb888(&[0x00, 0x1F]), vec![0, 0, 255]);
    }

    #[test]
    fn test_yuyv_gray() {
        // Neutral chroma keeps luma as gray
        assert_eq!(yuyv_to_rgb888(&[100, 128, 200, 128]), vec![100, 100, 100, 200, 200, 200]);
    }

    #[test]
    fn test_short_frame_rejected() {
        let err = encoder_input(&[0u8; 10], PixelFormat::Rgb888, 4, 4)
            .err()
            .unwrap();
        assert!(matches!(err, EncodeError::ShortFrame { expected: 48, actual: 10 }));
    }
}
