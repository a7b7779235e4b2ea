//! SimulatedCamera - in-process driver
//!
//! Stands in for the sensor when running on a host. Produces a moving
//! test pattern in the configured pixel format, keeps a small buffer
//! pool like the real driver (two slots by default) and a register map.

use super::types::*;
use super::{CameraDriver, DriverError, DriverResult};
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Driver error code for invalid arguments
const ESP_FAIL: i32 = -1;

/// Bytes kept from a frame marked as corrupt
const CORRUPT_FRAME_LEN: usize = 4;

/// Simulated driver configuration
#[derive(Debug, Clone)]
pub struct SimulatedCameraConfig {
    pub pixel_format: PixelFormat,
    pub frame_size: FrameSize,
    /// Number of pool slots
    pub fb_count: usize,
    pub sensor_present: bool,
}

impl Default for SimulatedCameraConfig {
    fn default() -> Self {
        Self {
            pixel_format: PixelFormat::Jpeg,
            frame_size: FrameSize::Vga,
            fb_count: 2,
            sensor_present: true,
        }
    }
}

struct SensorState {
    status: SensorStatus,
    pixel_format: PixelFormat,
    xclk_mhz: i32,
    registers: HashMap<u16, u8>,
    pll: PllConfig,
    window: SensorWindow,
    frame_counter: u64,
}

/// In-process camera driver
pub struct SimulatedCamera {
    sensor_present: bool,
    sensor: Mutex<SensorState>,
    /// Pool slots; `Some` while the buffer is home
    pool: Mutex<Vec<Option<Vec<u8>>>>,
    /// Remaining forced `frame_get` failures
    forced_failures: AtomicUsize,
    /// Remaining frames to hand out truncated
    forced_corruptions: AtomicUsize,
    gets: AtomicU64,
    returns: AtomicU64,
    bad_returns: AtomicU64,
}

impl SimulatedCamera {
    pub fn new(config: SimulatedCameraConfig) -> Self {
        let status = SensorStatus {
            framesize: config.frame_size.index(),
            ..SensorStatus::default()
        };
        let fb_count = config.fb_count.max(1);

        Self {
            sensor_present: config.sensor_present,
            sensor: Mutex::new(SensorState {
                status,
                pixel_format: config.pixel_format,
                xclk_mhz: 20,
                registers: HashMap::new(),
                pll: PllConfig::default(),
                window: SensorWindow::default(),
                frame_counter: 0,
            }),
            pool: Mutex::new((0..fb_count).map(|_| Some(Vec::new())).collect()),
            forced_failures: AtomicUsize::new(0),
            forced_corruptions: AtomicUsize::new(0),
            gets: AtomicU64::new(0),
            returns: AtomicU64::new(0),
            bad_returns: AtomicU64::new(0),
        }
    }

    /// Make the next `count` calls to `frame_get` report no frame
    pub fn fail_next_frames(&self, count: usize) {
        self.forced_failures.store(count, Ordering::SeqCst);
    }

    /// Hand out the next `count` frames cut short, so that decoding or
    /// converting them fails
    pub fn corrupt_next_frames(&self, count: usize) {
        self.forced_corruptions.store(count, Ordering::SeqCst);
    }

    /// Switch the output pixel format (sensor re-init in real hardware)
    pub fn set_pixel_format(&self, format: PixelFormat) {
        self.lock_sensor().pixel_format = format;
    }

    /// Successful `frame_get` calls so far
    pub fn frames_handed_out(&self) -> u64 {
        self.gets.load(Ordering::SeqCst)
    }

    /// `frame_return` calls that put a buffer back
    pub fn frames_returned(&self) -> u64 {
        self.returns.load(Ordering::SeqCst)
    }

    /// Returns for a slot that was already home
    pub fn bad_returns(&self) -> u64 {
        self.bad_returns.load(Ordering::SeqCst)
    }

    /// Buffers currently out of the pool
    pub fn outstanding(&self) -> usize {
        self.lock_pool().iter().filter(|slot| slot.is_none()).count()
    }

    pub fn xclk_mhz(&self) -> i32 {
        self.lock_sensor().xclk_mhz
    }

    pub fn pll(&self) -> PllConfig {
        self.lock_sensor().pll
    }

    pub fn window(&self) -> SensorWindow {
        self.lock_sensor().window
    }

    fn lock_sensor(&self) -> MutexGuard<'_, SensorState> {
        self.sensor.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_pool(&self) -> MutexGuard<'_, Vec<Option<Vec<u8>>>> {
        self.pool.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn take_forced_failure(&self) -> bool {
        take_one(&self.forced_failures)
    }

    fn take_forced_corruption(&self) -> bool {
        take_one(&self.forced_corruptions)
    }
}

impl CameraDriver for SimulatedCamera {
    fn frame_get(&self) -> Option<RawFrame> {
        if !self.sensor_present || self.take_forced_failure() {
            return None;
        }

        let (slot, mut buf) = {
            let mut pool = self.lock_pool();
            let slot = pool.iter().position(Option::is_some)?;
            (slot, pool[slot].take()?)
        };

        let (format, size, colorbar, quality, phase) = {
            let mut sensor = self.lock_sensor();
            sensor.frame_counter += 1;
            (
                sensor.pixel_format,
                FrameSize::from_index(sensor.status.framesize as i32).unwrap_or(FrameSize::Vga),
                sensor.status.colorbar != 0,
                sensor.status.quality,
                sensor.frame_counter,
            )
        };
        let (width, height) = size.dimensions();

        buf.clear();
        if let Err(e) = render_pattern(&mut buf, format, width, height, colorbar, quality, phase) {
            tracing::error!(error = %e, "Simulated sensor failed to render frame");
            self.lock_pool()[slot] = Some(buf);
            return None;
        }
        if self.take_forced_corruption() {
            buf.truncate(CORRUPT_FRAME_LEN);
        }

        self.gets.fetch_add(1, Ordering::SeqCst);
        Some(RawFrame {
            slot,
            buf,
            width,
            height,
            format,
            timestamp: FrameTimestamp::now(),
        })
    }

    fn frame_return(&self, frame: RawFrame) {
        let mut pool = self.lock_pool();
        match pool.get_mut(frame.slot) {
            Some(slot) if slot.is_none() => {
                *slot = Some(frame.buf);
                self.returns.fetch_add(1, Ordering::SeqCst);
            }
            _ => {
                self.bad_returns.fetch_add(1, Ordering::SeqCst);
                tracing::error!(slot = frame.slot, "Frame returned to a slot that is not out");
            }
        }
    }

    fn status(&self) -> Option<SensorStatus> {
        self.sensor_present.then(|| self.lock_sensor().status.clone())
    }

    fn pixel_format(&self) -> Option<PixelFormat> {
        self.sensor_present.then(|| self.lock_sensor().pixel_format)
    }

    fn set_control(&self, control: SensorControl, value: i32) -> DriverResult<()> {
        if !self.sensor_present {
            return Err(DriverError::new(control.setter_name(), ESP_FAIL));
        }
        let fail = || DriverError::new(control.setter_name(), ESP_FAIL);
        let flag = |v: i32| u32::from(v != 0);
        let in_range = |v: i32, lo: i32, hi: i32| (lo..=hi).contains(&v).then_some(v).ok_or_else(fail);

        let mut sensor = self.lock_sensor();
        let status = &mut sensor.status;
        match control {
            SensorControl::FrameSize => {
                let size = FrameSize::from_index(value).ok_or_else(fail)?;
                status.framesize = size.index();
            }
            SensorControl::Quality => status.quality = in_range(value, 0, 100)? as u32,
            SensorControl::Contrast => status.contrast = in_range(value, -2, 2)?,
            SensorControl::Brightness => status.brightness = in_range(value, -2, 2)?,
            SensorControl::Saturation => status.saturation = in_range(value, -2, 2)?,
            SensorControl::GainCeiling => status.gainceiling = in_range(value, 0, 6)? as u32,
            SensorControl::Colorbar => status.colorbar = flag(value),
            SensorControl::WhiteBalance => status.awb = flag(value),
            SensorControl::GainControl => status.agc = flag(value),
            SensorControl::ExposureControl => status.aec = flag(value),
            SensorControl::HorizontalMirror => status.hmirror = flag(value),
            SensorControl::VerticalFlip => status.vflip = flag(value),
            SensorControl::AwbGain => status.awb_gain = flag(value),
            SensorControl::AgcGain => status.agc_gain = in_range(value, 0, 30)? as u32,
            SensorControl::AecValue => status.aec_value = in_range(value, 0, 1200)? as u32,
            SensorControl::Aec2 => status.aec2 = flag(value),
            SensorControl::Dcw => status.dcw = flag(value),
            SensorControl::Bpc => status.bpc = flag(value),
            SensorControl::Wpc => status.wpc = flag(value),
            SensorControl::RawGamma => status.raw_gma = flag(value),
            SensorControl::LensCorrection => status.lenc = flag(value),
            SensorControl::SpecialEffect => status.special_effect = in_range(value, 0, 6)? as u32,
            SensorControl::WbMode => status.wb_mode = in_range(value, 0, 4)? as u32,
            SensorControl::AeLevel => status.ae_level = in_range(value, -2, 2)?,
        }
        Ok(())
    }

    fn set_xclk(&self, mhz: i32) -> DriverResult<()> {
        if !self.sensor_present || !(1..=40).contains(&mhz) {
            return Err(DriverError::new("set_xclk", ESP_FAIL));
        }
        self.lock_sensor().xclk_mhz = mhz;
        Ok(())
    }

    fn get_reg(&self, reg: i32, mask: i32) -> DriverResult<i32> {
        let reg = register_address(reg).ok_or(DriverError::new("get_reg", ESP_FAIL))?;
        let sensor = self.lock_sensor();
        let value = i32::from(sensor.registers.get(&reg).copied().unwrap_or(0));
        Ok(value & mask)
    }

    fn set_reg(&self, reg: i32, mask: i32, value: i32) -> DriverResult<()> {
        let reg = register_address(reg).ok_or(DriverError::new("set_reg", ESP_FAIL))?;
        let mut sensor = self.lock_sensor();
        let entry = sensor.registers.entry(reg).or_insert(0);
        let merged = (i32::from(*entry) & !mask) | (value & mask);
        *entry = (merged & 0xFF) as u8;
        Ok(())
    }

    fn set_pll(&self, pll: &PllConfig) -> DriverResult<()> {
        if !self.sensor_present {
            return Err(DriverError::new("set_pll", ESP_FAIL));
        }
        self.lock_sensor().pll = *pll;
        Ok(())
    }

    fn set_window(&self, window: &SensorWindow) -> DriverResult<()> {
        if !self.sensor_present || window.end_x < window.start_x || window.end_y < window.start_y {
            return Err(DriverError::new("set_res_raw", ESP_FAIL));
        }
        self.lock_sensor().window = *window;
        Ok(())
    }
}

fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

fn register_address(reg: i32) -> Option<u16> {
    u16::try_from(reg).ok()
}

/// Render a moving diagonal gradient (or colour bars) into `out`
fn render_pattern(
    out: &mut Vec<u8>,
    format: PixelFormat,
    width: u32,
    height: u32,
    colorbar: bool,
    quality: u32,
    phase: u64,
) -> image::ImageResult<()> {
    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    let shift = (phase % 256) as u32;
    for y in 0..height {
        for x in 0..width {
            let px = if colorbar {
                const BARS: [[u8; 3]; 8] = [
                    [255, 255, 255],
                    [255, 255, 0],
                    [0, 255, 255],
                    [0, 255, 0],
                    [255, 0, 255],
                    [255, 0, 0],
                    [0, 0, 255],
                    [0, 0, 0],
                ];
                BARS[((x * 8) / width.max(1)) as usize % 8]
            } else {
                [
                    ((x + shift) % 256) as u8,
                    ((y + shift) % 256) as u8,
                    ((x + y) % 256) as u8,
                ]
            };
            rgb.extend_from_slice(&px);
        }
    }

    match format {
        PixelFormat::Rgb888 => out.extend_from_slice(&rgb),
        PixelFormat::Rgb565 => {
            for px in rgb.chunks_exact(3) {
                let v = (u16::from(px[0] >> 3) << 11) | (u16::from(px[1] >> 2) << 5) | u16::from(px[2] >> 3);
                out.extend_from_slice(&v.to_be_bytes());
            }
        }
        PixelFormat::Grayscale => {
            out.extend(rgb.chunks_exact(3).map(|px| luma(px[0], px[1], px[2])));
        }
        PixelFormat::Yuv422 => {
            for pair in rgb.chunks(6) {
                let (r0, g0, b0) = (pair[0], pair[1], pair[2]);
                let (r1, g1, b1) = if pair.len() == 6 {
                    (pair[3], pair[4], pair[5])
                } else {
                    (r0, g0, b0)
                };
                let (u, v) = chroma(r0, g0, b0);
                out.extend_from_slice(&[luma(r0, g0, b0), u, luma(r1, g1, b1), v]);
            }
        }
        PixelFormat::Jpeg => {
            // Lower sensor quality values mean better images
            let jpeg_quality = (100u32.saturating_sub(quality * 3 / 2)).clamp(10, 95) as u8;
            JpegEncoder::new_with_quality(&mut *out, jpeg_quality).encode(
                &rgb,
                width,
                height,
                ExtendedColorType::Rgb8,
            )?;
        }
    }
    Ok(())
}

fn luma(r: u8, g: u8, b: u8) -> u8 {
    ((77 * u32::from(r) + 150 * u32::from(g) + 29 * u32::from(b)) >> 8) as u8
}

fn chroma(r: u8, g: u8, b: u8) -> (u8, u8) {
    let (r, g, b) = (i32::from(r), i32::from(g), i32::from(b));
    let u = ((-43 * r - 85 * g + 128 * b) >> 8) + 128;
    let v = ((128 * r - 107 * g - 21 * b) >> 8) + 128;
    (u.clamp(0, 255) as u8, v.clamp(0, 255) as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera(format: PixelFormat) -> SimulatedCamera {
        SimulatedCamera::new(SimulatedCameraConfig {
            pixel_format: format,
            frame_size: FrameSize::Qqvga,
            ..Default::default()
        })
    }

    #[test]
    fn test_pool_exhaustion_yields_no_frame() {
        let cam = camera(PixelFormat::Grayscale);
        let a = cam.frame_get().unwrap();
        let b = cam.frame_get().unwrap();
        assert!(cam.frame_get().is_none());
        assert_eq!(cam.outstanding(), 2);

        cam.frame_return(a);
        cam.frame_return(b);
        assert_eq!(cam.outstanding(), 0);
        assert_eq!(cam.frames_returned(), 2);
    }

    #[test]
    fn test_raw_buffer_sizes() {
        let cam = camera(PixelFormat::Rgb565);
        let frame = cam.frame_get().unwrap();
        assert_eq!(frame.len(), 160 * 120 * 2);
        assert_eq!(frame.format, PixelFormat::Rgb565);
        cam.frame_return(frame);

        cam.set_pixel_format(PixelFormat::Yuv422);
        let frame = cam.frame_get().unwrap();
        assert_eq!(frame.len(), 160 * 120 * 2);
        cam.frame_return(frame);
    }

    #[test]
    fn test_jpeg_frame_has_soi_marker() {
        let cam = camera(PixelFormat::Jpeg);
        let frame = cam.frame_get().unwrap();
        assert_eq!(&frame.buf[..2], &[0xFF, 0xD8]);
        cam.frame_return(frame);
    }

    #[test]
    fn test_forced_failures() {
        let cam = camera(PixelFormat::Grayscale);
        cam.fail_next_frames(1);
        assert!(cam.frame_get().is_none());
        let frame = cam.frame_get().unwrap();
        cam.frame_return(frame);
        assert_eq!(cam.frames_handed_out(), 1);
    }

    #[test]
    fn test_corrupt_frames_are_truncated() {
        let cam = camera(PixelFormat::Rgb565);
        cam.corrupt_next_frames(1);
        let frame = cam.frame_get().unwrap();
        assert_eq!(frame.len(), 4);
        cam.frame_return(frame);

        let frame = cam.frame_get().unwrap();
        assert_eq!(frame.len(), 160 * 120 * 2);
        cam.frame_return(frame);
        assert_eq!(cam.outstanding(), 0);
    }

    #[test]
    fn test_set_control_range_checks() {
        let cam = camera(PixelFormat::Jpeg);
        assert!(cam.set_control(SensorControl::Quality, 10).is_ok());
        assert_eq!(cam.status().unwrap().quality, 10);

        let err = cam.set_control(SensorControl::Brightness, 3).unwrap_err();
        assert_eq!(err.operation, "set_brightness");
        assert_eq!(err.code, -1);

        assert!(cam.set_control(SensorControl::FrameSize, 99).is_err());
        cam.set_control(SensorControl::VerticalFlip, 5).unwrap();
        assert_eq!(cam.status().unwrap().vflip, 1);
    }

    #[test]
    fn test_register_masking() {
        let cam = camera(PixelFormat::Jpeg);
        cam.set_reg(0x3008, 0xF0, 0xAB).unwrap();
        assert_eq!(cam.get_reg(0x3008, 0xFF).unwrap(), 0xA0);
        cam.set_reg(0x3008, 0x0F, 0x05).unwrap();
        assert_eq!(cam.get_reg(0x3008, 0xFF).unwrap(), 0xA5);
        assert!(cam.get_reg(-4, 0xFF).is_err());
    }

    #[test]
    fn test_missing_sensor() {
        let cam = SimulatedCamera::new(SimulatedCameraConfig {
            sensor_present: false,
            ..Default::default()
        });
        assert!(cam.status().is_none());
        assert!(cam.frame_get().is_none());
        assert!(cam.set_control(SensorControl::Quality, 10).is_err());
    }
}
