//! Camera driver value types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Pixel format produced by the sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    /// Already JPEG-compressed by the sensor
    Jpeg,
    /// 16 bit RGB, big endian (sensor byte order)
    Rgb565,
    /// 24 bit RGB
    Rgb888,
    /// 8 bit luma
    Grayscale,
    /// YUYV 4:2:2
    Yuv422,
}

impl PixelFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpeg",
            Self::Rgb565 => "rgb565",
            Self::Rgb888 => "rgb888",
            Self::Grayscale => "grayscale",
            Self::Yuv422 => "yuv422",
        }
    }

    /// Bytes per pixel for uncompressed formats
    pub fn bytes_per_pixel(&self) -> Option<usize> {
        match self {
            Self::Jpeg => None,
            Self::Rgb565 | Self::Yuv422 => Some(2),
            Self::Rgb888 => Some(3),
            Self::Grayscale => Some(1),
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PixelFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(Self::Jpeg),
            "rgb565" => Ok(Self::Rgb565),
            "rgb888" | "rgb" => Ok(Self::Rgb888),
            "grayscale" | "gray" => Ok(Self::Grayscale),
            "yuv422" | "yuyv" => Ok(Self::Yuv422),
            other => Err(format!("unknown pixel format: {}", other)),
        }
    }
}

/// Sensor output resolution, indexed the way the control plane addresses it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameSize {
    R96x96,
    Qqvga,
    Qcif,
    Hqvga,
    R240x240,
    Qvga,
    Cif,
    Hvga,
    Vga,
    Svga,
    Xga,
    Hd,
    Sxga,
    Uxga,
}

impl FrameSize {
    const ALL: [FrameSize; 14] = [
        Self::R96x96,
        Self::Qqvga,
        Self::Qcif,
        Self::Hqvga,
        Self::R240x240,
        Self::Qvga,
        Self::Cif,
        Self::Hvga,
        Self::Vga,
        Self::Svga,
        Self::Xga,
        Self::Hd,
        Self::Sxga,
        Self::Uxga,
    ];

    /// Look up a frame size by its control-plane index
    pub fn from_index(index: i32) -> Option<Self> {
        usize::try_from(index)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
    }

    pub fn index(&self) -> u32 {
        Self::ALL
            .iter()
            .position(|f| f == self)
            .map(|i| i as u32)
            .unwrap_or(0)
    }

    /// (width, height) in pixels
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            Self::R96x96 => (96, 96),
            Self::Qqvga => (160, 120),
            Self::Qcif => (176, 144),
            Self::Hqvga => (240, 176),
            Self::R240x240 => (240, 240),
            Self::Qvga => (320, 240),
            Self::Cif => (400, 296),
            Self::Hvga => (480, 320),
            Self::Vga => (640, 480),
            Self::Svga => (800, 600),
            Self::Xga => (1024, 768),
            Self::Hd => (1280, 720),
            Self::Sxga => (1280, 1024),
            Self::Uxga => (1600, 1200),
        }
    }
}

/// Capture timestamp (seconds + microseconds)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameTimestamp {
    pub sec: i64,
    pub usec: u32,
}

impl FrameTimestamp {
    pub fn now() -> Self {
        let now = chrono::Utc::now();
        Self {
            sec: now.timestamp(),
            usec: now.timestamp_subsec_micros(),
        }
    }
}

impl fmt::Display for FrameTimestamp {
    /// `<sec>.<usec>` with microseconds zero-padded to 6 digits
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:06}", self.sec, self.usec)
    }
}

/// Pixel data handed out by the driver.
///
/// The buffer belongs to the driver's pool; it only leaves the driver
/// through `CameraDriver::frame_get` and must come back through
/// `CameraDriver::frame_return`.
#[derive(Debug)]
pub struct RawFrame {
    /// Driver pool slot the buffer came from
    pub slot: usize,
    pub buf: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub timestamp: FrameTimestamp,
}

impl RawFrame {
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

/// Sensor settings reachable through the control plane, one per driver setter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorControl {
    FrameSize,
    Quality,
    Contrast,
    Brightness,
    Saturation,
    GainCeiling,
    Colorbar,
    WhiteBalance,
    GainControl,
    ExposureControl,
    HorizontalMirror,
    VerticalFlip,
    AwbGain,
    AgcGain,
    AecValue,
    Aec2,
    Dcw,
    Bpc,
    Wpc,
    RawGamma,
    LensCorrection,
    SpecialEffect,
    WbMode,
    AeLevel,
}

impl SensorControl {
    /// Driver setter name, used in logs and error reports
    pub fn setter_name(&self) -> &'static str {
        match self {
            Self::FrameSize => "set_framesize",
            Self::Quality => "set_quality",
            Self::Contrast => "set_contrast",
            Self::Brightness => "set_brightness",
            Self::Saturation => "set_saturation",
            Self::GainCeiling => "set_gainceiling",
            Self::Colorbar => "set_colorbar",
            Self::WhiteBalance => "set_whitebal",
            Self::GainControl => "set_gain_ctrl",
            Self::ExposureControl => "set_exposure_ctrl",
            Self::HorizontalMirror => "set_hmirror",
            Self::VerticalFlip => "set_vflip",
            Self::AwbGain => "set_awb_gain",
            Self::AgcGain => "set_agc_gain",
            Self::AecValue => "set_aec_value",
            Self::Aec2 => "set_aec2",
            Self::Dcw => "set_dcw",
            Self::Bpc => "set_bpc",
            Self::Wpc => "set_wpc",
            Self::RawGamma => "set_raw_gma",
            Self::LensCorrection => "set_lenc",
            Self::SpecialEffect => "set_special_effect",
            Self::WbMode => "set_wb_mode",
            Self::AeLevel => "set_ae_level",
        }
    }
}

/// Live sensor configuration as reported by the driver
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SensorStatus {
    pub framesize: u32,
    pub quality: u32,
    pub brightness: i32,
    pub contrast: i32,
    pub saturation: i32,
    pub sharpness: i32,
    pub special_effect: u32,
    pub wb_mode: u32,
    pub awb: u32,
    pub awb_gain: u32,
    pub vflip: u32,
    pub hmirror: u32,
    pub aec: u32,
    pub aec2: u32,
    pub ae_level: i32,
    pub aec_value: u32,
    pub agc: u32,
    pub agc_gain: u32,
    pub gainceiling: u32,
    pub bpc: u32,
    pub wpc: u32,
    pub raw_gma: u32,
    pub lenc: u32,
    pub dcw: u32,
    pub colorbar: u32,
}

impl Default for SensorStatus {
    fn default() -> Self {
        Self {
            framesize: FrameSize::Vga.index(),
            quality: 12,
            brightness: 0,
            contrast: 0,
            saturation: 0,
            sharpness: 0,
            special_effect: 0,
            wb_mode: 0,
            awb: 1,
            awb_gain: 1,
            vflip: 0,
            hmirror: 0,
            aec: 1,
            aec2: 0,
            ae_level: 0,
            aec_value: 168,
            agc: 1,
            agc_gain: 0,
            gainceiling: 0,
            bpc: 0,
            wpc: 1,
            raw_gma: 1,
            lenc: 1,
            dcw: 1,
            colorbar: 0,
        }
    }
}

/// Raw sensor window configuration (`/resolution`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SensorWindow {
    pub start_x: i32,
    pub start_y: i32,
    pub end_x: i32,
    pub end_y: i32,
    pub offset_x: i32,
    pub offset_y: i32,
    pub total_x: i32,
    pub total_y: i32,
    pub output_x: i32,
    pub output_y: i32,
    pub scale: bool,
    pub binning: bool,
}

/// Raw PLL configuration (`/pll`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PllConfig {
    pub bypass: i32,
    pub multiplier: i32,
    pub sys_div: i32,
    pub root_div: i32,
    pub pre_div: i32,
    pub seld5: i32,
    pub pclk_enable: i32,
    pub pclk_div: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_zero_padded() {
        let ts = FrameTimestamp { sec: 12, usec: 345 };
        assert_eq!(ts.to_string(), "12.000345");
    }

    #[test]
    fn test_frame_size_index_roundtrip() {
        assert_eq!(FrameSize::from_index(8), Some(FrameSize::Vga));
        assert_eq!(FrameSize::Vga.index(), 8);
        assert_eq!(FrameSize::from_index(14), None);
        assert_eq!(FrameSize::from_index(-1), None);
    }

    #[test]
    fn test_pixel_format_parse() {
        assert_eq!("JPEG".parse::<PixelFormat>(), Ok(PixelFormat::Jpeg));
        assert_eq!("yuyv".parse::<PixelFormat>(), Ok(PixelFormat::Yuv422));
        assert!("bayer".parse::<PixelFormat>().is_err());
    }
}
