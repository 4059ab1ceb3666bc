//! RGB color type, HSV conversion and parameter-string parsing

use super::ParamError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 8-bit RGB color.
///
/// Serialized as `"#rrggbb"`; parsed from hex (`#ff8800`, `ff8800`, `#f80`),
/// `rgb(255, 136, 0)` or a small set of color names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);
    pub const WHITE: Rgb = Rgb::new(255, 255, 255);
    pub const RED: Rgb = Rgb::new(255, 0, 0);
    pub const GREEN: Rgb = Rgb::new(0, 255, 0);
    pub const BLUE: Rgb = Rgb::new(0, 0, 255);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Build from HSV. Hue in degrees (wrapped), saturation and value 0-1.
    pub fn from_hsv(hue: f32, saturation: f32, value: f32) -> Self {
        let h = hue.rem_euclid(360.0) / 60.0;
        let s = saturation.clamp(0.0, 1.0);
        let v = value.clamp(0.0, 1.0);

        let c = v * s;
        let x = c * (1.0 - (h % 2.0 - 1.0).abs());
        let m = v - c;

        let (r, g, b) = match h as u32 {
            0 => (c, x, 0.0),
            1 => (x, c, 0.0),
            2 => (0.0, c, x),
            3 => (0.0, x, c),
            4 => (x, 0.0, c),
            _ => (c, 0.0, x),
        };

        Self::new(
            unit_to_byte(r + m),
            unit_to_byte(g + m),
            unit_to_byte(b + m),
        )
    }

    /// Multiply every channel by `factor` (clamped at 0-255)
    pub fn scale(self, factor: f32) -> Self {
        let f = |c: u8| (c as f32 * factor).round().clamp(0.0, 255.0) as u8;
        Self::new(f(self.r), f(self.g), f(self.b))
    }

    /// Per-channel saturating add
    pub fn saturating_add(self, other: Rgb) -> Self {
        Self::new(
            self.r.saturating_add(other.r),
            self.g.saturating_add(other.g),
            self.b.saturating_add(other.b),
        )
    }

    fn named(name: &str) -> Option<Self> {
        let color = match name {
            "black" => Self::BLACK,
            "white" => Self::WHITE,
            "red" => Self::RED,
            "green" => Self::GREEN,
            "blue" => Self::BLUE,
            "yellow" => Self::new(255, 255, 0),
            "cyan" => Self::new(0, 255, 255),
            "magenta" | "pink" => Self::new(255, 0, 255),
            "orange" => Self::new(255, 128, 0),
            "purple" => Self::new(128, 0, 255),
            "warmwhite" | "warm_white" => Self::new(255, 200, 140),
            _ => return None,
        };
        Some(color)
    }
}

fn unit_to_byte(v: f32) -> u8 {
    (v * 255.0).round().clamp(0.0, 255.0) as u8
}

fn parse_hex(hex: &str) -> Option<Rgb> {
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    match hex.len() {
        6 => {
            let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
            Some(Rgb::new(channel(0)?, channel(2)?, channel(4)?))
        }
        3 => {
            // #f80 -> #ff8800
            let channel = |i: usize| u8::from_str_radix(&hex[i..i + 1], 16).ok().map(|v| v * 17);
            Some(Rgb::new(channel(0)?, channel(1)?, channel(2)?))
        }
        _ => None,
    }
}

fn parse_rgb_function(body: &str) -> Option<Rgb> {
    let parts: Vec<&str> = body.split(',').map(str::trim).collect();
    if parts.len() != 3 {
        return None;
    }
    let channel = |s: &str| s.parse::<u8>().ok();
    Some(Rgb::new(
        channel(parts[0])?,
        channel(parts[1])?,
        channel(parts[2])?,
    ))
}

impl FromStr for Rgb {
    type Err = ParamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let lower = trimmed.to_ascii_lowercase();

        let parsed = if let Some(hex) = lower.strip_prefix('#') {
            parse_hex(hex)
        } else if let Some(body) = lower
            .strip_prefix("rgb(")
            .and_then(|rest| rest.strip_suffix(')'))
        {
            parse_rgb_function(body)
        } else {
            Self::named(&lower).or_else(|| parse_hex(&lower))
        };

        parsed.ok_or_else(|| ParamError::InvalidColor(trimmed.to_string()))
    }
}

impl TryFrom<String> for Rgb {
    type Error = ParamError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Rgb> for String {
    fn from(color: Rgb) -> Self {
        color.to_string()
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hex_rgb_and_names() {
        assert_eq!("#ff8800".parse::<Rgb>().unwrap(), Rgb::new(255, 136, 0));
        assert_eq!("FF8800".parse::<Rgb>().unwrap(), Rgb::new(255, 136, 0));
        assert_eq!("#f80".parse::<Rgb>().unwrap(), Rgb::new(255, 136, 0));
        assert_eq!("rgb(1, 2, 3)".parse::<Rgb>().unwrap(), Rgb::new(1, 2, 3));
        assert_eq!(" Blue ".parse::<Rgb>().unwrap(), Rgb::BLUE);
    }

    #[test]
    fn rejects_garbage() {
        assert!("#12345".parse::<Rgb>().is_err());
        assert!("rgb(300, 0, 0)".parse::<Rgb>().is_err());
        assert!("not-a-color".parse::<Rgb>().is_err());
        assert!("#gg0000".parse::<Rgb>().is_err());
    }

    #[test]
    fn hsv_primaries() {
        assert_eq!(Rgb::from_hsv(0.0, 1.0, 1.0), Rgb::RED);
        assert_eq!(Rgb::from_hsv(120.0, 1.0, 1.0), Rgb::GREEN);
        assert_eq!(Rgb::from_hsv(240.0, 1.0, 1.0), Rgb::BLUE);
        assert_eq!(Rgb::from_hsv(360.0, 1.0, 1.0), Rgb::RED);
        assert_eq!(Rgb::from_hsv(-120.0, 1.0, 1.0), Rgb::BLUE);
        assert_eq!(Rgb::from_hsv(200.0, 0.0, 1.0), Rgb::WHITE);
        assert_eq!(Rgb::from_hsv(200.0, 1.0, 0.0), Rgb::BLACK);
    }

    #[test]
    fn serde_uses_hex_strings() {
        let json = serde_json::to_string(&Rgb::new(1, 2, 255)).unwrap();
        assert_eq!(json, "\"#0102ff\"");

        let color: Rgb = serde_json::from_str("\"purple\"").unwrap();
        assert_eq!(color, Rgb::new(128, 0, 255));

        assert!(serde_json::from_str::<Rgb>("\"nope\"").is_err());
        assert!(serde_json::from_str::<Rgb>("42").is_err());
    }

    #[test]
    fn scale_and_add_saturate() {
        assert_eq!(Rgb::new(200, 100, 0).scale(2.0), Rgb::new(255, 200, 0));
        assert_eq!(Rgb::WHITE.scale(0.0), Rgb::BLACK);
        assert_eq!(
            Rgb::new(200, 10, 0).saturating_add(Rgb::new(100, 10, 0)),
            Rgb::new(255, 20, 0)
        );
    }
}
