//! Fixed lookup tables consulted by constant folding: named colors and the
//! textual color forms accepted by color casts.

/// A subset of the X11 color names, stored as `0xRRGGBB`.
static COLOR_NAMES: &[(&str, u32)] = &[
    ("black", 0x000000),
    ("white", 0xffffff),
    ("red", 0xff0000),
    ("green", 0x00ff00),
    ("blue", 0x0000ff),
    ("yellow", 0xffff00),
    ("cyan", 0x00ffff),
    ("magenta", 0xff00ff),
    ("gray", 0xbebebe),
    ("grey", 0xbebebe),
    ("darkgray", 0xa9a9a9),
    ("darkgrey", 0xa9a9a9),
    ("lightgray", 0xd3d3d3),
    ("orange", 0xffa500),
    ("brown", 0xa52a2a),
    ("purple", 0xa020f0),
    ("pink", 0xffc0cb),
    ("gold", 0xffd700),
    ("darkred", 0x8b0000),
    ("darkgreen", 0x006400),
    ("darkblue", 0x00008b),
    ("lightblue", 0xadd8e6),
    ("olivedrab", 0x6b8e23),
    ("tan", 0xd2b48c),
    ("navy", 0x000080),
    ("maroon", 0xb03060),
];

/// Parse a color given as an X11 name (`"Dark Green"`), `#rgb`, `#rrggbb`,
/// a space-separated hex triplet (`"ff 80 00"`) or bare `rrggbb`.
pub fn parse_color(text: &str) -> Option<u32> {
    let trimmed = text.trim();
    let key: String = trimmed
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_lowercase())
        .collect();
    if let Some((_, rgb)) = COLOR_NAMES.iter().find(|(name, _)| *name == key) {
        return Some(*rgb);
    }

    if let Some(hex) = trimmed.strip_prefix('#') {
        return match hex.len() {
            3 => {
                let mut rgb = 0u32;
                for c in hex.chars() {
                    let d = c.to_digit(16)?;
                    rgb = (rgb << 8) | (d * 0x11);
                }
                Some(rgb)
            }
            6 => u32::from_str_radix(hex, 16).ok(),
            _ => None,
        };
    }

    let parts: Vec<&str> = trimmed.split_whitespace().collect();
    if parts.len() == 3 {
        let mut rgb = 0u32;
        for part in parts {
            let component = u32::from_str_radix(part, 16).ok()?;
            rgb = (rgb << 8) | component.min(0xff);
        }
        return Some(rgb);
    }

    if trimmed.len() == 6 {
        return u32::from_str_radix(trimmed, 16).ok();
    }
    None
}
