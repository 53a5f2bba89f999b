use palette::{FromColor, Hsv, Srgb};
use std::fmt;
use std::sync::LazyLock;

/// The 17 semantic color classes the reference palette resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ColorClass {
    Red,
    Brown,
    Pink,
    Orange,
    Yellow,
    Green,
    Cyan,
    Teal,
    Blue,
    Purple,
    Magenta,
    Lilac,
    Black,
    DarkGray,
    Gray,
    LightGray,
    White,
}

impl ColorClass {
    pub const ALL: [Self; 17] = [
        Self::Red,
        Self::Brown,
        Self::Pink,
        Self::Orange,
        Self::Yellow,
        Self::Green,
        Self::Cyan,
        Self::Teal,
        Self::Blue,
        Self::Purple,
        Self::Magenta,
        Self::Lilac,
        Self::Black,
        Self::DarkGray,
        Self::Gray,
        Self::LightGray,
        Self::White,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Red => "Red",
            Self::Brown => "Brown",
            Self::Pink => "Pink",
            Self::Orange => "Orange",
            Self::Yellow => "Yellow",
            Self::Green => "Green",
            Self::Cyan => "Cyan",
            Self::Teal => "Teal",
            Self::Blue => "Blue",
            Self::Purple => "Purple",
            Self::Magenta => "Magenta",
            Self::Lilac => "Lilac",
            Self::Black => "Black",
            Self::DarkGray => "Dark Gray",
            Self::Gray => "Gray",
            Self::LightGray => "Light Gray",
            Self::White => "White",
        }
    }

    /// Representative hex used by analytics charts for this class.
    #[must_use]
    pub const fn display_hex(self) -> &'static str {
        match self {
            Self::Red => "#BC0E0E",
            Self::Brown => "#663300",
            Self::Pink => "#FF0080",
            Self::Orange => "#F27900",
            Self::Yellow => "#F2F20C",
            Self::Green => "#009900",
            Self::Cyan => "#29CCCC",
            Self::Teal => "#008080",
            Self::Blue => "#0A4BCC",
            Self::Purple => "#7E17E5",
            Self::Magenta => "#FF00FF",
            Self::Lilac => "#B300B3",
            Self::Black => "#000000",
            Self::DarkGray => "#404040",
            Self::Gray => "#808080",
            Self::LightGray => "#BFBFBF",
            Self::White => "#F7F7F7",
        }
    }

    /// Looks a class up by its display name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|class| class.as_str() == name)
    }
}

impl fmt::Display for ColorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One entry of the fixed reference palette.
#[derive(Debug, Clone, Copy)]
pub struct PaletteEntry {
    /// Lowercase hex without the `#` prefix.
    pub hex: &'static str,
    pub class: ColorClass,
    /// True for the 5-step gray ramp; desaturated samples snap here.
    pub monochrome: bool,
}

const fn colored(hex: &'static str, class: ColorClass) -> PaletteEntry {
    PaletteEntry { hex, class, monochrome: false }
}

const fn mono(hex: &'static str, class: ColorClass) -> PaletteEntry {
    PaletteEntry { hex, class, monochrome: true }
}

/// Reference palette: 12 hue columns × 4 variants plus the 5-step gray ramp.
pub const PALETTE: [PaletteEntry; 53] = [
    colored("ff0000", ColorClass::Red),
    colored("ff8080", ColorClass::Pink),
    colored("800000", ColorClass::Red),
    colored("804040", ColorClass::Brown),
    colored("ff8000", ColorClass::Orange),
    colored("ffbf80", ColorClass::Orange),
    colored("804000", ColorClass::Brown),
    colored("806040", ColorClass::Brown),
    colored("ffff00", ColorClass::Yellow),
    colored("ffff80", ColorClass::Yellow),
    colored("808000", ColorClass::Yellow),
    colored("808040", ColorClass::Yellow),
    colored("80ff00", ColorClass::Green),
    colored("bfff80", ColorClass::Green),
    colored("408000", ColorClass::Green),
    colored("608040", ColorClass::Green),
    colored("00ff00", ColorClass::Green),
    colored("80ff80", ColorClass::Green),
    colored("008000", ColorClass::Green),
    colored("408040", ColorClass::Green),
    colored("00ff80", ColorClass::Green),
    colored("80ffbf", ColorClass::Green),
    colored("008040", ColorClass::Green),
    colored("408060", ColorClass::Green),
    colored("00ffff", ColorClass::Cyan),
    colored("80ffff", ColorClass::Cyan),
    colored("008080", ColorClass::Teal),
    colored("408080", ColorClass::Teal),
    colored("0080ff", ColorClass::Blue),
    colored("80bfff", ColorClass::Cyan),
    colored("004080", ColorClass::Blue),
    colored("406080", ColorClass::Blue),
    colored("0000ff", ColorClass::Blue),
    colored("8080ff", ColorClass::Purple),
    colored("000080", ColorClass::Blue),
    colored("404080", ColorClass::Purple),
    colored("8000ff", ColorClass::Purple),
    colored("bf80ff", ColorClass::Purple),
    colored("400080", ColorClass::Purple),
    colored("604080", ColorClass::Purple),
    colored("ff00ff", ColorClass::Magenta),
    colored("ff80ff", ColorClass::Pink),
    colored("800080", ColorClass::Lilac),
    colored("804080", ColorClass::Lilac),
    colored("ff0080", ColorClass::Pink),
    colored("ff80bf", ColorClass::Pink),
    colored("800040", ColorClass::Lilac),
    colored("804060", ColorClass::Lilac),
    mono("000000", ColorClass::Black),
    mono("404040", ColorClass::DarkGray),
    mono("808080", ColorClass::Gray),
    mono("bfbfbf", ColorClass::LightGray),
    mono("ffffff", ColorClass::White),
];

/// Index of the `000000` entry, the forced target for very dark samples.
pub(crate) const BLACK_ENTRY: usize = 48;

/// HSV coordinates of every palette entry, on a 0–1 scale per channel.
static PALETTE_HSV: LazyLock<[[f64; 3]; PALETTE.len()]> = LazyLock::new(|| {
    let mut table = [[0.0; 3]; PALETTE.len()];
    for (i, entry) in PALETTE.iter().enumerate() {
        let rgb = parse_hex(entry.hex).expect("palette entry hex is well-formed");
        table[i] = rgb_to_hsv01(rgb);
    }
    table
});

/// Parses `rrggbb` (optionally `#`-prefixed) into an RGB triple.
#[must_use]
pub fn parse_hex(hex: &str) -> Option<[u8; 3]> {
    let hex = hex.strip_prefix('#').unwrap_or(hex);
    if hex.len() != 6 {
        return None;
    }
    let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
    let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
    let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
    Some([r, g, b])
}

/// `#`-prefixed lowercase hex for an RGB triple.
#[must_use]
pub fn rgb_to_hex(rgb: [u8; 3]) -> String {
    format!("#{:02x}{:02x}{:02x}", rgb[0], rgb[1], rgb[2])
}

/// RGB (0–255) to HSV with every channel on a 0–1 scale.
#[must_use]
pub fn rgb_to_hsv01(rgb: [u8; 3]) -> [f64; 3] {
    let srgb = Srgb::new(
        f32::from(rgb[0]) / 255.0,
        f32::from(rgb[1]) / 255.0,
        f32::from(rgb[2]) / 255.0,
    );
    let hsv = Hsv::from_color(srgb);
    [
        f64::from(hsv.hue.into_positive_degrees()) / 360.0,
        f64::from(hsv.saturation),
        f64::from(hsv.value),
    ]
}

/// Nearest palette entry to `hsv` by Euclidean distance over the raw
/// (h, s, v) components, restricted to the monochrome ramp or to the
/// colored entries. Hue is deliberately not treated as circular; the
/// reference table was tuned against the plain component distance.
#[must_use]
pub fn nearest_entry(hsv: [f64; 3], monochrome: bool) -> &'static PaletteEntry {
    let mut best = BLACK_ENTRY;
    let mut best_dist = f64::INFINITY;
    for (i, entry) in PALETTE.iter().enumerate() {
        if entry.monochrome != monochrome {
            continue;
        }
        let candidate = PALETTE_HSV[i];
        let dist = (candidate[0] - hsv[0]).powi(2)
            + (candidate[1] - hsv[1]).powi(2)
            + (candidate[2] - hsv[2]).powi(2);
        if dist < best_dist {
            best_dist = dist;
            best = i;
        }
    }
    &PALETTE[best]
}
