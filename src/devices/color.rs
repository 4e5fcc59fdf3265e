// devices/color.rs
use crate::models::Rgb;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hsv {
    /// Degrees, 0..=360.
    pub hue: u16,
    /// Percent, 0..=100.
    pub saturation: u8,
    /// Percent, 0..=100. Brightness is sent separately, so adapters rarely use this.
    pub value: u8,
}

pub fn rgb_to_hsv(rgb: Rgb) -> Hsv {
    let r = f64::from(rgb.r) / 255.0;
    let g = f64::from(rgb.g) / 255.0;
    let b = f64::from(rgb.b) / 255.0;

    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let mut hue = if delta == 0.0 {
        0.0
    } else if max == r {
        60.0 * (((g - b) / delta) % 6.0)
    } else if max == g {
        60.0 * ((b - r) / delta + 2.0)
    } else {
        60.0 * ((r - g) / delta + 4.0)
    };
    if hue < 0.0 {
        hue += 360.0;
    }

    let saturation = if max == 0.0 { 0.0 } else { delta / max };

    Hsv {
        hue: hue.round().clamp(0.0, 360.0) as u16,
        saturation: (saturation * 100.0).round().clamp(0.0, 100.0) as u8,
        value: (max * 100.0).round().clamp(0.0, 100.0) as u8,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hsv(r: u8, g: u8, b: u8) -> Hsv {
        rgb_to_hsv(Rgb { r, g, b })
    }

    #[test]
    fn primaries() {
        assert_eq!(hsv(255, 0, 0), Hsv { hue: 0, saturation: 100, value: 100 });
        assert_eq!(hsv(0, 255, 0), Hsv { hue: 120, saturation: 100, value: 100 });
        assert_eq!(hsv(0, 0, 255), Hsv { hue: 240, saturation: 100, value: 100 });
    }

    #[test]
    fn black_and_grey_have_no_saturation() {
        assert_eq!(hsv(0, 0, 0).saturation, 0);
        assert_eq!(hsv(0, 0, 0).hue, 0);
        let grey = hsv(128, 128, 128);
        assert_eq!(grey.saturation, 0);
        assert_eq!(grey.value, 50);
    }

    #[test]
    fn negative_hue_wraps() {
        // magenta-ish red: max is red and g < b
        let pink = hsv(255, 0, 128);
        assert_eq!(pink.hue, 330);
        assert_eq!(pink.saturation, 100);
    }

    #[test]
    fn mixed_channels_round() {
        let orange = hsv(255, 165, 0);
        assert_eq!(orange.hue, 39);
        assert_eq!(orange.saturation, 100);
    }
}
