//! Colour parsing, validation and blending for categorical annotations.
//!
//! Colours are plain strings: `#rgb`, `#rrggbb` or `#rrggbbaa` hex codes, or a
//! CSS/X11 colour name (case-insensitive).

use std::collections::BTreeMap;

use cellfate_core::{CellfateError, Result};

/// Default 20-colour palette for categorical annotations.
pub const DEFAULT_PALETTE: [&str; 20] = [
    "#1f77b4", "#ff7f0e", "#279e68", "#d62728", "#aa40fc", "#8c564b", "#e377c2", "#b5bd61",
    "#17becf", "#aec7e8", "#ffbb78", "#98df8a", "#ff9896", "#c5b0d5", "#c49c94", "#f7b6d2",
    "#dbdb8d", "#9edae5", "#ad494a", "#8c6d31",
];

/// Palette colour for position `k` (wraps around).
pub fn palette_color(k: usize) -> &'static str {
    DEFAULT_PALETTE[k % DEFAULT_PALETTE.len()]
}

const NAMED_COLORS: &[(&str, u32)] = &[
    ("aliceblue", 0xf0f8ff), ("antiquewhite", 0xfaebd7), ("aqua", 0x00ffff),
    ("aquamarine", 0x7fffd4), ("azure", 0xf0ffff), ("beige", 0xf5f5dc),
    ("bisque", 0xffe4c4), ("black", 0x000000), ("blanchedalmond", 0xffebcd),
    ("blue", 0x0000ff), ("blueviolet", 0x8a2be2), ("brown", 0xa52a2a),
    ("burlywood", 0xdeb887), ("cadetblue", 0x5f9ea0), ("chartreuse", 0x7fff00),
    ("chocolate", 0xd2691e), ("coral", 0xff7f50), ("cornflowerblue", 0x6495ed),
    ("cornsilk", 0xfff8dc), ("crimson", 0xdc143c), ("cyan", 0x00ffff),
    ("darkblue", 0x00008b), ("darkcyan", 0x008b8b), ("darkgoldenrod", 0xb8860b),
    ("darkgray", 0xa9a9a9), ("darkgreen", 0x006400), ("darkgrey", 0xa9a9a9),
    ("darkkhaki", 0xbdb76b), ("darkmagenta", 0x8b008b), ("darkolivegreen", 0x556b2f),
    ("darkorange", 0xff8c00), ("darkorchid", 0x9932cc), ("darkred", 0x8b0000),
    ("darksalmon", 0xe9967a), ("darkseagreen", 0x8fbc8f), ("darkslateblue", 0x483d8b),
    ("darkslategray", 0x2f4f4f), ("darkslategrey", 0x2f4f4f), ("darkturquoise", 0x00ced1),
    ("darkviolet", 0x9400d3), ("deeppink", 0xff1493), ("deepskyblue", 0x00bfff),
    ("dimgray", 0x696969), ("dimgrey", 0x696969), ("dodgerblue", 0x1e90ff),
    ("firebrick", 0xb22222), ("floralwhite", 0xfffaf0), ("forestgreen", 0x228b22),
    ("fuchsia", 0xff00ff), ("gainsboro", 0xdcdcdc), ("ghostwhite", 0xf8f8ff),
    ("gold", 0xffd700), ("goldenrod", 0xdaa520), ("gray", 0x808080),
    ("green", 0x008000), ("greenyellow", 0xadff2f), ("grey", 0x808080),
    ("honeydew", 0xf0fff0), ("hotpink", 0xff69b4), ("indianred", 0xcd5c5c),
    ("indigo", 0x4b0082), ("ivory", 0xfffff0), ("khaki", 0xf0e68c),
    ("lavender", 0xe6e6fa), ("lavenderblush", 0xfff0f5), ("lawngreen", 0x7cfc00),
    ("lemonchiffon", 0xfffacd), ("lightblue", 0xadd8e6), ("lightcoral", 0xf08080),
    ("lightcyan", 0xe0ffff), ("lightgoldenrodyellow", 0xfafad2), ("lightgray", 0xd3d3d3),
    ("lightgreen", 0x90ee90), ("lightgrey", 0xd3d3d3), ("lightpink", 0xffb6c1),
    ("lightsalmon", 0xffa07a), ("lightseagreen", 0x20b2aa), ("lightskyblue", 0x87cefa),
    ("lightslategray", 0x778899), ("lightslategrey", 0x778899), ("lightsteelblue", 0xb0c4de),
    ("lightyellow", 0xffffe0), ("lime", 0x00ff00), ("limegreen", 0x32cd32),
    ("linen", 0xfaf0e6), ("magenta", 0xff00ff), ("maroon", 0x800000),
    ("mediumaquamarine", 0x66cdaa), ("mediumblue", 0x0000cd), ("mediumorchid", 0xba55d3),
    ("mediumpurple", 0x9370db), ("mediumseagreen", 0x3cb371), ("mediumslateblue", 0x7b68ee),
    ("mediumspringgreen", 0x00fa9a), ("mediumturquoise", 0x48d1cc), ("mediumvioletred", 0xc71585),
    ("midnightblue", 0x191970), ("mintcream", 0xf5fffa), ("mistyrose", 0xffe4e1),
    ("moccasin", 0xffe4b5), ("navajowhite", 0xffdead), ("navy", 0x000080),
    ("oldlace", 0xfdf5e6), ("olive", 0x808000), ("olivedrab", 0x6b8e23),
    ("orange", 0xffa500), ("orangered", 0xff4500), ("orchid", 0xda70d6),
    ("palegoldenrod", 0xeee8aa), ("palegreen", 0x98fb98), ("paleturquoise", 0xafeeee),
    ("palevioletred", 0xdb7093), ("papayawhip", 0xffefd5), ("peachpuff", 0xffdab9),
    ("peru", 0xcd853f), ("pink", 0xffc0cb), ("plum", 0xdda0dd),
    ("powderblue", 0xb0e0e6), ("purple", 0x800080), ("rebeccapurple", 0x663399),
    ("red", 0xff0000), ("rosybrown", 0xbc8f8f), ("royalblue", 0x4169e1),
    ("saddlebrown", 0x8b4513), ("salmon", 0xfa8072), ("sandybrown", 0xf4a460),
    ("seagreen", 0x2e8b57), ("seashell", 0xfff5ee), ("sienna", 0xa0522d),
    ("silver", 0xc0c0c0), ("skyblue", 0x87ceeb), ("slateblue", 0x6a5acd),
    ("slategray", 0x708090), ("slategrey", 0x708090), ("snow", 0xfffafa),
    ("springgreen", 0x00ff7f), ("steelblue", 0x4682b4), ("tan", 0xd2b48c),
    ("teal", 0x008080), ("thistle", 0xd8bfd8), ("tomato", 0xff6347),
    ("turquoise", 0x40e0d0), ("violet", 0xee82ee), ("wheat", 0xf5deb3),
    ("white", 0xffffff), ("whitesmoke", 0xf5f5f5), ("yellow", 0xffff00),
    ("yellowgreen", 0x9acd32),
];

/// An RGB colour with channels in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgb {
    pub r: f64,
    pub g: f64,
    pub b: f64,
}

impl Rgb {
    fn from_u32(v: u32) -> Self {
        Self {
            r: f64::from((v >> 16) & 0xff) / 255.0,
            g: f64::from((v >> 8) & 0xff) / 255.0,
            b: f64::from(v & 0xff) / 255.0,
        }
    }

    /// Parse a hex code or colour name. Alpha channels are dropped.
    pub fn parse(color: &str) -> Option<Self> {
        let s = color.trim();
        if let Some(hex) = s.strip_prefix('#') {
            if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
                return None;
            }
            return match hex.len() {
                3 => {
                    let v = u32::from_str_radix(hex, 16).ok()?;
                    let (r, g, b) = ((v >> 8) & 0xf, (v >> 4) & 0xf, v & 0xf);
                    Some(Self::from_u32((r * 17) << 16 | (g * 17) << 8 | b * 17))
                }
                6 => u32::from_str_radix(hex, 16).ok().map(Self::from_u32),
                8 => u32::from_str_radix(&hex[..6], 16).ok().map(Self::from_u32),
                _ => None,
            };
        }
        let lower = s.to_ascii_lowercase();
        NAMED_COLORS
            .binary_search_by(|(name, _)| name.cmp(&lower.as_str()))
            .ok()
            .map(|i| Self::from_u32(NAMED_COLORS[i].1))
    }

    /// Render as `#rrggbb`.
    pub fn to_hex(self) -> String {
        let q = |v: f64| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        format!("#{:02x}{:02x}{:02x}", q(self.r), q(self.g), q(self.b))
    }

    /// Convert to hue/saturation/value, each in `[0, 1]`.
    pub fn to_hsv(self) -> [f64; 3] {
        let max = self.r.max(self.g).max(self.b);
        let min = self.r.min(self.g).min(self.b);
        let delta = max - min;
        let s = if max > 0.0 { delta / max } else { 0.0 };
        let h = if delta == 0.0 {
            0.0
        } else if max == self.r {
            ((self.g - self.b) / delta).rem_euclid(6.0) / 6.0
        } else if max == self.g {
            ((self.b - self.r) / delta + 2.0) / 6.0
        } else {
            ((self.r - self.g) / delta + 4.0) / 6.0
        };
        [h, s, max]
    }

    /// Inverse of [`Rgb::to_hsv`].
    pub fn from_hsv([h, s, v]: [f64; 3]) -> Self {
        let h6 = (h.rem_euclid(1.0)) * 6.0;
        let sector = h6.floor();
        let f = h6 - sector;
        let p = v * (1.0 - s);
        let q = v * (1.0 - s * f);
        let t = v * (1.0 - s * (1.0 - f));
        let (r, g, b) = match sector as u8 {
            0 => (v, t, p),
            1 => (q, v, p),
            2 => (p, v, t),
            3 => (p, q, v),
            4 => (t, p, v),
            _ => (v, p, q),
        };
        Self { r, g, b }
    }
}

/// Whether `color` is a recognized colour specification.
pub fn is_color_like(color: &str) -> bool {
    Rgb::parse(color).is_some()
}

/// Average colours in HSV space and render the result as `#rrggbb`.
///
/// # Errors
///
/// Returns an error if `colors` is empty or any entry is not colour-like.
pub fn mean_color<S: AsRef<str>>(colors: &[S]) -> Result<String> {
    if colors.is_empty() {
        return Err(CellfateError::InvalidInput(
            "cannot compute the mean of zero colors".into(),
        ));
    }
    let mut acc = [0.0; 3];
    for c in colors {
        let rgb = Rgb::parse(c.as_ref()).ok_or_else(|| {
            CellfateError::InvalidInput(format!("`{}` is not color-like", c.as_ref()))
        })?;
        for (a, v) in acc.iter_mut().zip(rgb.to_hsv()) {
            *a += v;
        }
    }
    let n = colors.len() as f64;
    Ok(Rgb::from_hsv(acc.map(|a| a / n)).to_hex())
}

/// Colours for a set of categories.
#[derive(Debug, Clone, PartialEq)]
pub enum ColorSpec {
    /// One colour per category, in category order.
    Ordered(Vec<String>),
    /// Category name to colour.
    Mapping(BTreeMap<String, String>),
}

impl From<Vec<String>> for ColorSpec {
    fn from(colors: Vec<String>) -> Self {
        ColorSpec::Ordered(colors)
    }
}

impl From<Vec<&str>> for ColorSpec {
    fn from(colors: Vec<&str>) -> Self {
        ColorSpec::Ordered(colors.into_iter().map(String::from).collect())
    }
}

impl From<BTreeMap<String, String>> for ColorSpec {
    fn from(mapping: BTreeMap<String, String>) -> Self {
        ColorSpec::Mapping(mapping)
    }
}

impl ColorSpec {
    /// Validate and align to `categories`, returning one colour per category.
    ///
    /// `what` names the argument in error messages.
    pub fn resolve(&self, categories: &[String], what: &str) -> Result<Vec<String>> {
        let colors = match self {
            ColorSpec::Ordered(colors) => {
                if colors.len() != categories.len() {
                    return Err(CellfateError::InvalidInput(format!(
                        "Length of `{what}` and categories differ in length: {} != {}",
                        colors.len(),
                        categories.len()
                    )));
                }
                colors.clone()
            }
            ColorSpec::Mapping(map) => {
                let missing: Vec<&str> = categories
                    .iter()
                    .filter(|c| !map.contains_key(*c))
                    .map(String::as_str)
                    .collect();
                if !missing.is_empty() {
                    return Err(CellfateError::InvalidInput(format!(
                        "Color mapper does not contain all categories: missing `{}`",
                        missing.join(", ")
                    )));
                }
                categories.iter().map(|c| map[c].clone()).collect()
            }
        };
        if !colors.iter().all(|c| is_color_like(c)) {
            return Err(CellfateError::InvalidInput(format!(
                "Not all colors are color-like in `{what}`."
            )));
        }
        Ok(colors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_colors_are_sorted() {
        assert!(NAMED_COLORS.windows(2).all(|w| w[0].0 < w[1].0));
    }

    #[test]
    fn parse_hex_and_names() {
        assert!(is_color_like("#fff"));
        assert!(is_color_like("#1f77b4"));
        assert!(is_color_like("#1f77b4ff"));
        assert!(is_color_like("Red"));
        assert!(!is_color_like("foo"));
        assert!(!is_color_like("#12345"));
        assert!(!is_color_like("#gggggg"));
        assert_eq!(Rgb::parse("#fff").unwrap().to_hex(), "#ffffff");
        assert_eq!(Rgb::parse("green").unwrap().to_hex(), "#008000");
    }

    #[test]
    fn hsv_roundtrip_on_palette() {
        for c in DEFAULT_PALETTE {
            let rgb = Rgb::parse(c).unwrap();
            assert_eq!(Rgb::from_hsv(rgb.to_hsv()).to_hex(), c);
        }
    }

    #[test]
    fn mean_of_red_and_blue() {
        // hue 0 and 2/3 average to 1/3 (green); saturation and value stay 1.
        assert_eq!(mean_color(&["red", "blue"]).unwrap(), "#00ff00");
        assert_eq!(mean_color(&["#123456"]).unwrap(), "#123456");
        assert!(mean_color::<&str>(&[]).is_err());
        assert!(mean_color(&["red", "nope"]).is_err());
    }

    #[test]
    fn resolve_ordered_and_mapping() {
        let cats = vec!["a".to_string(), "b".to_string()];
        let ordered = ColorSpec::from(vec!["red", "blue"]);
        assert_eq!(ordered.resolve(&cats, "colors").unwrap(), vec!["red", "blue"]);

        let short = ColorSpec::from(vec!["red"]);
        let err = short.resolve(&cats, "colors").unwrap_err();
        assert!(err.to_string().contains("differ in length"));

        let bad = ColorSpec::from(vec!["red", "foo"]);
        let err = bad.resolve(&cats, "colors").unwrap_err();
        assert!(err.to_string().contains("color-like"));

        let mut map = BTreeMap::new();
        map.insert("b".to_string(), "green".to_string());
        map.insert("a".to_string(), "black".to_string());
        assert_eq!(
            ColorSpec::from(map.clone()).resolve(&cats, "colors").unwrap(),
            vec!["black", "green"]
        );
        map.remove("a");
        let err = ColorSpec::from(map).resolve(&cats, "colors").unwrap_err();
        assert!(err.to_string().contains("Color mapper"));
    }
}
