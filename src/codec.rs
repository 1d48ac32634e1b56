//! Bidirectional translation between human property values and device codes.
//!
//! All parsers are pure functions over static tables; nothing here touches
//! the device. The tables follow the vendor's published code grids: apertures
//! and shutter speeds use the camera-native display strings (`5.6`, `0"5`,
//! `1/125`), ISO uses `Auto` plus plain numbers, and the mode properties use
//! symbolic names matched case-insensitively.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::traits::{CameraError, Result};

/// Property kinds the codec can translate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyKind {
    /// Aperture (Av).
    Aperture,
    /// Shutter speed (Tv).
    Shutter,
    /// ISO speed.
    Iso,
    /// Save-to destination.
    SaveTo,
    /// Auto-exposure mode.
    AeMode,
    /// Metering mode.
    Metering,
    /// White balance.
    WhiteBalance,
    /// Image quality.
    ImageQuality,
    /// Drive mode.
    DriveMode,
    /// Autofocus mode.
    AfMode,
    /// Live-view autofocus mode.
    EvfAfMode,
}

impl PropertyKind {
    /// External name of this kind, matching the profile document keys.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Aperture => "Av",
            Self::Shutter => "Tv",
            Self::Iso => "ISO",
            Self::SaveTo => "SaveTo",
            Self::AeMode => "AEMode",
            Self::Metering => "MeteringMode",
            Self::WhiteBalance => "WhiteBalance",
            Self::ImageQuality => "ImageQuality",
            Self::DriveMode => "DriveMode",
            Self::AfMode => "AFMode",
            Self::EvfAfMode => "EvfAFMode",
        }
    }
}

/// A property value as supplied by the caller.
///
/// Replaces ad-hoc int/float/string polymorphism with one tagged type parsed
/// at the codec boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    /// Numeric input (`5.6`, `0.5`, `400`).
    Number(f64),
    /// Free-form string input (`"f/5.6"`, `"1/125"`, `"auto"`).
    Text(String),
}

impl std::fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<u32> for PropertyValue {
    fn from(value: u32) -> Self {
        Self::Number(f64::from(value))
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Aperture codes and camera-native display strings.
const AV_TABLE: &[(u32, &str)] = &[
    (0x08, "1.0"),
    (0x0B, "1.1"),
    (0x0C, "1.2"),
    (0x10, "1.4"),
    (0x13, "1.6"),
    (0x14, "1.8"),
    (0x18, "2.0"),
    (0x1B, "2.2"),
    (0x1C, "2.5"),
    (0x20, "2.8"),
    (0x23, "3.2"),
    (0x24, "3.5"),
    (0x28, "4.0"),
    (0x2B, "4.5"),
    (0x2D, "5.0"),
    (0x30, "5.6"),
    (0x33, "6.3"),
    (0x34, "6.7"),
    (0x35, "7.1"),
    (0x38, "8.0"),
    (0x3B, "9.0"),
    (0x3C, "9.5"),
    (0x3D, "10"),
    (0x40, "11"),
    (0x43, "13"),
    (0x45, "14"),
    (0x48, "16"),
    (0x4B, "18"),
    (0x4C, "19"),
    (0x4D, "20"),
    (0x50, "22"),
    (0x53, "25"),
    (0x55, "29"),
    (0x58, "32"),
];

/// Shutter-speed codes and camera-native display strings.
///
/// `0"5` is half a second, `30"` is thirty seconds, fractions are as shown.
const TV_TABLE: &[(u32, &str)] = &[
    (0x0C, "Bulb"),
    (0x10, "30\""),
    (0x13, "25\""),
    (0x14, "20\""),
    (0x18, "15\""),
    (0x1B, "13\""),
    (0x1C, "10\""),
    (0x20, "8\""),
    (0x24, "6\""),
    (0x25, "5\""),
    (0x28, "4\""),
    (0x2B, "3\"2"),
    (0x2C, "3\""),
    (0x2D, "2\"5"),
    (0x30, "2\""),
    (0x33, "1\"6"),
    (0x34, "1\"5"),
    (0x35, "1\"3"),
    (0x38, "1\""),
    (0x3B, "0\"8"),
    (0x3C, "0\"7"),
    (0x3D, "0\"6"),
    (0x40, "0\"5"),
    (0x43, "0\"4"),
    (0x44, "0\"3"),
    (0x48, "1/4"),
    (0x4B, "1/5"),
    (0x4C, "1/6"),
    (0x50, "1/8"),
    (0x53, "1/10"),
    (0x55, "1/13"),
    (0x58, "1/15"),
    (0x5B, "1/20"),
    (0x5D, "1/25"),
    (0x60, "1/30"),
    (0x63, "1/40"),
    (0x64, "1/45"),
    (0x65, "1/50"),
    (0x68, "1/60"),
    (0x6B, "1/80"),
    (0x6C, "1/90"),
    (0x6D, "1/100"),
    (0x70, "1/125"),
    (0x73, "1/160"),
    (0x74, "1/180"),
    (0x75, "1/200"),
    (0x78, "1/250"),
    (0x7B, "1/320"),
    (0x7C, "1/350"),
    (0x7D, "1/400"),
    (0x80, "1/500"),
    (0x83, "1/640"),
    (0x84, "1/750"),
    (0x85, "1/800"),
    (0x88, "1/1000"),
    (0x8B, "1/1250"),
    (0x8C, "1/1500"),
    (0x8D, "1/1600"),
    (0x90, "1/2000"),
    (0x93, "1/2500"),
    (0x94, "1/3000"),
    (0x95, "1/3200"),
    (0x98, "1/4000"),
    (0x9B, "1/5000"),
    (0x9C, "1/6000"),
    (0xA0, "1/8000"),
];

/// Device code for automatic ISO selection.
const ISO_AUTO: u32 = 0x00;

/// ISO codes and their numeric speeds.
const ISO_TABLE: &[(u32, u32)] = &[
    (0x40, 50),
    (0x48, 100),
    (0x4B, 125),
    (0x4C, 160),
    (0x50, 200),
    (0x53, 250),
    (0x54, 320),
    (0x58, 400),
    (0x5B, 500),
    (0x5C, 640),
    (0x60, 800),
    (0x63, 1000),
    (0x64, 1250),
    (0x68, 1600),
    (0x6B, 2000),
    (0x6C, 2500),
    (0x70, 3200),
    (0x73, 4000),
    (0x74, 5000),
    (0x78, 6400),
    (0x7B, 8000),
    (0x7C, 10000),
    (0x80, 12800),
    (0x83, 16000),
    (0x88, 25600),
    (0x90, 51200),
    (0x98, 102400),
];

const SAVE_TO_TABLE: &[(u32, &str)] = &[(1, "Camera"), (2, "Host"), (3, "Both")];

const AE_MODE_TABLE: &[(u32, &str)] = &[
    (0, "Program"),
    (1, "Tv"),
    (2, "Av"),
    (3, "Manual"),
    (4, "Bulb"),
    (5, "ADep"),
    (6, "Dep"),
    (7, "Custom"),
    (9, "Green"),
    (10, "NightPortrait"),
    (11, "Sports"),
    (12, "Portrait"),
    (13, "Landscape"),
    (14, "Closeup"),
    (15, "FlashOff"),
];

const METERING_TABLE: &[(u32, &str)] = &[
    (1, "Spot"),
    (3, "Evaluative"),
    (4, "Partial"),
    (5, "CenterWeightedAverage"),
];

const WHITE_BALANCE_TABLE: &[(u32, &str)] = &[
    (0, "Auto"),
    (1, "Daylight"),
    (2, "Cloudy"),
    (3, "Tungsten"),
    (4, "Fluorescent"),
    (5, "Flash"),
    (6, "Manual"),
    (8, "Shade"),
    (9, "ColorTemperature"),
];

const IMAGE_QUALITY_TABLE: &[(u32, &str)] = &[
    (0x0010_FF0F, "LargeFineJpeg"),
    (0x0011_FF0F, "LargeNormalJpeg"),
    (0x0110_FF0F, "MediumFineJpeg"),
    (0x0210_FF0F, "SmallFineJpeg"),
    (0x0064_FF0F, "Raw"),
    (0x0064_0010, "RawAndLargeFineJpeg"),
];

const DRIVE_MODE_TABLE: &[(u32, &str)] = &[
    (0x00, "Single"),
    (0x01, "Continuous"),
    (0x04, "HighSpeedContinuous"),
    (0x05, "LowSpeedContinuous"),
    (0x10, "SelfTimer10s"),
    (0x11, "SelfTimer2s"),
];

const AF_MODE_TABLE: &[(u32, &str)] = &[
    (0, "OneShot"),
    (1, "AIServo"),
    (2, "AIFocus"),
    (3, "ManualFocus"),
];

const EVF_AF_MODE_TABLE: &[(u32, &str)] = &[
    (0, "Quick"),
    (1, "Live"),
    (2, "LiveFace"),
    (3, "LiveMulti"),
    (4, "LiveZone"),
];

/// Device code for manual focus, used by the manual-focus convenience flag.
pub const AF_MODE_MANUAL: u32 = 3;

/// Shortest-digits rendering of a number, mirroring C's `%g` for our inputs.
fn fmt_g(value: f64) -> String {
    format!("{value}")
}

/// Reverse aperture map: canonical display plus `5.6` / `f/5.6` aliases.
static AV_REVERSE: Lazy<HashMap<String, u32>> = Lazy::new(|| {
    let mut map = HashMap::new();
    for &(code, display) in AV_TABLE {
        let key = display.to_lowercase();
        if let Ok(fnum) = key.parse::<f64>() {
            map.insert(fmt_g(fnum), code);
            map.insert(format!("f/{}", fmt_g(fnum)), code);
        }
        map.insert(key, code);
    }
    map
});

/// Reverse shutter map: canonical display plus quote/suffix variants.
static TV_REVERSE: Lazy<HashMap<String, u32>> = Lazy::new(|| {
    let mut map = HashMap::new();
    for &(code, display) in TV_TABLE {
        let key = display.to_lowercase();
        if key.contains('"') || key.contains('/') || key.chars().all(|c| c.is_ascii_digit()) {
            map.insert(key.replace('"', "s").replace(' ', ""), code);
        }
        map.insert(key, code);
    }
    map
});

fn enum_table(kind: PropertyKind) -> &'static [(u32, &'static str)] {
    match kind {
        PropertyKind::SaveTo => SAVE_TO_TABLE,
        PropertyKind::AeMode => AE_MODE_TABLE,
        PropertyKind::Metering => METERING_TABLE,
        PropertyKind::WhiteBalance => WHITE_BALANCE_TABLE,
        PropertyKind::ImageQuality => IMAGE_QUALITY_TABLE,
        PropertyKind::DriveMode => DRIVE_MODE_TABLE,
        PropertyKind::AfMode => AF_MODE_TABLE,
        PropertyKind::EvfAfMode => EVF_AF_MODE_TABLE,
        PropertyKind::Aperture | PropertyKind::Shutter | PropertyKind::Iso => &[],
    }
}

fn unsupported(kind: PropertyKind, value: &PropertyValue) -> CameraError {
    CameraError::UnsupportedValue {
        kind: kind.name(),
        value: value.to_string(),
    }
}

/// Parse a human property value into its device code.
pub fn parse(kind: PropertyKind, value: &PropertyValue) -> Result<u32> {
    match kind {
        PropertyKind::Aperture => parse_aperture(value),
        PropertyKind::Shutter => parse_shutter(value),
        PropertyKind::Iso => parse_iso(value),
        _ => parse_enum(kind, value),
    }
}

/// Format a device code back into its display string.
///
/// Unknown codes fall back to the decimal code string rather than failing.
#[must_use]
pub fn format(kind: PropertyKind, code: u32) -> String {
    match kind {
        PropertyKind::Aperture => table_display(AV_TABLE, code),
        PropertyKind::Shutter => table_display(TV_TABLE, code),
        PropertyKind::Iso => iso_display(code),
        _ => table_display(enum_table(kind), code),
    }
}

/// All canonical display strings for a kind, in table order.
///
/// Used as a hint when the device cannot report its supported set.
#[must_use]
pub fn display_table(kind: PropertyKind) -> Vec<String> {
    match kind {
        PropertyKind::Aperture => AV_TABLE.iter().map(|&(_, d)| d.to_owned()).collect(),
        PropertyKind::Shutter => TV_TABLE.iter().map(|&(_, d)| d.to_owned()).collect(),
        PropertyKind::Iso => std::iter::once("Auto".to_owned())
            .chain(ISO_TABLE.iter().map(|&(_, n)| n.to_string()))
            .collect(),
        _ => enum_table(kind).iter().map(|&(_, d)| d.to_owned()).collect(),
    }
}

fn table_display(table: &[(u32, &str)], code: u32) -> String {
    table
        .iter()
        .find(|&&(c, _)| c == code)
        .map_or_else(|| code.to_string(), |&(_, d)| d.to_owned())
}

fn iso_display(code: u32) -> String {
    if code == ISO_AUTO {
        return "Auto".to_owned();
    }
    ISO_TABLE
        .iter()
        .find(|&&(c, _)| c == code)
        .map_or_else(|| code.to_string(), |&(_, n)| n.to_string())
}

fn parse_aperture(value: &PropertyValue) -> Result<u32> {
    let kind = PropertyKind::Aperture;
    match value {
        PropertyValue::Number(n) => {
            let key = fmt_g(*n);
            AV_REVERSE
                .get(&key)
                .or_else(|| AV_REVERSE.get(&format!("f/{key}")))
                .copied()
                .ok_or_else(|| unsupported(kind, value))
        }
        PropertyValue::Text(s) => {
            let mut key = s.trim().to_lowercase();
            if let Some(rest) = key.strip_prefix("f ") {
                key = format!("f/{rest}");
            }
            if let Some(&code) = AV_REVERSE.get(&key) {
                return Ok(code);
            }
            // tolerate a trailing "f" or stray spaces, e.g. "5.6f"
            let trimmed = key.trim_end_matches(['f', ' ']);
            AV_REVERSE
                .get(trimmed)
                .copied()
                .ok_or_else(|| unsupported(kind, value))
        }
    }
}

fn parse_shutter(value: &PropertyValue) -> Result<u32> {
    let kind = PropertyKind::Shutter;
    match value {
        PropertyValue::Number(n) => {
            parse_shutter_seconds(*n).ok_or_else(|| unsupported(kind, value))
        }
        PropertyValue::Text(s) => {
            let mut key = s.trim().to_lowercase();
            if key == "bulb" {
                return TV_REVERSE
                    .get("bulb")
                    .copied()
                    .ok_or_else(|| unsupported(kind, value));
            }
            key = key.replace('"', "s");
            if let Some(stripped) = key.strip_suffix("sec") {
                key = format!("{stripped}s");
            }
            if let Some(&code) = TV_REVERSE.get(&key) {
                return Ok(code);
            }
            if let Some(stripped) = key.strip_suffix('s') {
                if let Some(&code) = TV_REVERSE.get(stripped) {
                    return Ok(code);
                }
            }
            // decimal-second strings ("0.5", "2") go through the numeric path
            if let Ok(seconds) = key.trim_end_matches('s').parse::<f64>() {
                if let Some(code) = parse_shutter_seconds(seconds) {
                    return Ok(code);
                }
            }
            Err(unsupported(kind, value))
        }
    }
}

/// Match a duration in seconds against the shutter table.
///
/// Tries candidate display strings first, then the nearest entry by computed
/// seconds with a strict epsilon. The tight tolerance is intentional: this is
/// exact-match-or-fail, not a nearest-neighbor search.
fn parse_shutter_seconds(seconds: f64) -> Option<u32> {
    #[allow(clippy::cast_possible_truncation)]
    let whole = seconds as i64;
    let candidates = [
        format!("{}s", fmt_g(seconds)),
        whole.to_string(),
        format!("{whole}s"),
    ];
    for candidate in &candidates {
        if let Some(&code) = TV_REVERSE.get(candidate.as_str()) {
            return Some(code);
        }
    }
    let mut best: Option<(u32, f64)> = None;
    for &(code, display) in TV_TABLE {
        let Some(s) = shutter_display_seconds(display) else {
            continue;
        };
        let err = (s - seconds).abs();
        if best.is_none_or(|(_, e)| err < e) {
            best = Some((code, err));
        }
    }
    match best {
        Some((code, err)) if err < 1e-6 => Some(code),
        _ => None,
    }
}

/// Duration in seconds of a canonical shutter display string.
///
/// `Bulb` has no fixed duration and yields `None`.
fn shutter_display_seconds(display: &str) -> Option<f64> {
    let disp = display.trim();
    if disp.eq_ignore_ascii_case("bulb") {
        return None;
    }
    if let Some((whole, frac)) = disp.split_once('"') {
        // camera style: 0"5 = 0.5s, 3"2 = 3.2s, 30" = 30s
        if whole.chars().all(|c| c.is_ascii_digit()) && !whole.is_empty() {
            if frac.is_empty() {
                return whole.parse().ok();
            }
            if frac.chars().all(|c| c.is_ascii_digit()) {
                return format!("{whole}.{frac}").parse().ok();
            }
        }
        return None;
    }
    let d = disp.strip_suffix('s').unwrap_or(disp);
    if let Some((num, den)) = d.split_once('/') {
        let num: f64 = num.parse().ok()?;
        let den: f64 = den.parse().ok()?;
        if den == 0.0 {
            return None;
        }
        return Some(num / den);
    }
    d.parse().ok()
}

fn parse_iso(value: &PropertyValue) -> Result<u32> {
    let kind = PropertyKind::Iso;
    match value {
        PropertyValue::Number(n) => {
            if n.fract() != 0.0 || *n < 0.0 {
                return Err(unsupported(kind, value));
            }
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let speed = *n as u32;
            if speed == 0 {
                return Ok(ISO_AUTO);
            }
            ISO_TABLE
                .iter()
                .find(|&&(_, s)| s == speed)
                .map(|&(code, _)| code)
                .ok_or_else(|| unsupported(kind, value))
        }
        PropertyValue::Text(s) => {
            let key = s.trim().to_lowercase();
            if key == "auto" || key == "isoauto" {
                return Ok(ISO_AUTO);
            }
            let digits = key.strip_prefix("iso").unwrap_or(&key);
            if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
                if let Ok(speed) = digits.parse::<f64>() {
                    return parse_iso(&PropertyValue::Number(speed))
                        .map_err(|_| unsupported(kind, value));
                }
            }
            Err(unsupported(kind, value))
        }
    }
}

/// Strip spaces, dashes and underscores and lowercase, for alias matching.
fn normalize_alias(value: &str) -> String {
    value
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '_'))
        .collect::<String>()
        .to_lowercase()
}

/// Common synonyms for metering modes, applied before exact matching.
fn metering_alias(normalized: &str) -> Option<&'static str> {
    match normalized {
        "spot" | "partial" => Some("Partial"),
        "centerweighted" | "centerweightedaverage" | "average" => Some("CenterWeightedAverage"),
        "evaluative" => Some("Evaluative"),
        _ => None,
    }
}

fn parse_enum(kind: PropertyKind, value: &PropertyValue) -> Result<u32> {
    let table = enum_table(kind);
    match value {
        // raw numeric codes pass through untouched
        PropertyValue::Number(n) => {
            if n.fract() != 0.0 || *n < 0.0 || *n > f64::from(u32::MAX) {
                return Err(unsupported(kind, value));
            }
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            Ok(*n as u32)
        }
        PropertyValue::Text(s) => {
            let mut key = s.trim().to_owned();
            if kind == PropertyKind::Metering {
                if let Some(canonical) = metering_alias(&normalize_alias(&key)) {
                    key = canonical.to_owned();
                }
            }
            let normalized = normalize_alias(&key);
            for &(code, name) in table {
                if normalize_alias(name) == normalized {
                    return Ok(code);
                }
            }
            if !key.is_empty() && key.chars().all(|c| c.is_ascii_digit()) {
                if let Ok(code) = key.parse::<u32>() {
                    return Ok(code);
                }
            }
            Err(unsupported(kind, value))
        }
    }
}
