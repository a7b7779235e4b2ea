//! `/control` command table and value parsing

use crate::camera_driver::SensorControl;

/// One `/control` variable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Forwarded to the matching driver setter
    Sensor(SensorControl),
    LedIntensity,
    EnableCamera,
    DisableCamera,
    Restart,
}

/// Variable name → command
const COMMAND_TABLE: [(&str, Command); 28] = [
    ("framesize", Command::Sensor(SensorControl::FrameSize)),
    ("quality", Command::Sensor(SensorControl::Quality)),
    ("contrast", Command::Sensor(SensorControl::Contrast)),
    ("brightness", Command::Sensor(SensorControl::Brightness)),
    ("saturation", Command::Sensor(SensorControl::Saturation)),
    ("gainceiling", Command::Sensor(SensorControl::GainCeiling)),
    ("colorbar", Command::Sensor(SensorControl::Colorbar)),
    ("awb", Command::Sensor(SensorControl::WhiteBalance)),
    ("agc", Command::Sensor(SensorControl::GainControl)),
    ("aec", Command::Sensor(SensorControl::ExposureControl)),
    ("hmirror", Command::Sensor(SensorControl::HorizontalMirror)),
    ("vflip", Command::Sensor(SensorControl::VerticalFlip)),
    ("awb_gain", Command::Sensor(SensorControl::AwbGain)),
    ("agc_gain", Command::Sensor(SensorControl::AgcGain)),
    ("aec_value", Command::Sensor(SensorControl::AecValue)),
    ("aec2", Command::Sensor(SensorControl::Aec2)),
    ("dcw", Command::Sensor(SensorControl::Dcw)),
    ("bpc", Command::Sensor(SensorControl::Bpc)),
    ("wpc", Command::Sensor(SensorControl::Wpc)),
    ("raw_gma", Command::Sensor(SensorControl::RawGamma)),
    ("lenc", Command::Sensor(SensorControl::LensCorrection)),
    ("special_effect", Command::Sensor(SensorControl::SpecialEffect)),
    ("wb_mode", Command::Sensor(SensorControl::WbMode)),
    ("ae_level", Command::Sensor(SensorControl::AeLevel)),
    ("led_intensity", Command::LedIntensity),
    ("enable_camera", Command::EnableCamera),
    ("disable_camera", Command::DisableCamera),
    ("restart", Command::Restart),
];

impl Command {
    /// Exact, case-sensitive lookup
    pub fn parse(variable: &str) -> Option<Self> {
        COMMAND_TABLE
            .iter()
            .find(|(name, _)| *name == variable)
            .map(|(_, command)| *command)
    }

    pub fn names() -> impl Iterator<Item = &'static str> {
        COMMAND_TABLE.iter().map(|(name, _)| *name)
    }
}

/// C `atoi`: leading whitespace, optional sign, digits up to the first
/// non-digit. Anything unparseable is 0; out-of-range values saturate.
pub fn atoi(value: &str) -> i32 {
    let s = value.trim_start_matches(|c: char| c.is_ascii_whitespace() || c == '\x0b');
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };

    let limit = i64::from(i32::MAX) + 1;
    let magnitude = digits
        .bytes()
        .take_while(u8::is_ascii_digit)
        .fold(0i64, |acc, b| (acc * 10 + i64::from(b - b'0')).min(limit));

    let signed = if negative { -magnitude } else { magnitude };
    signed.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}
