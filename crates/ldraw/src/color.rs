use std::fmt;

/// The "current colour" inherited from the referencing line.
pub const MAIN_COLOR: u32 = 16;
/// The complement/edge colour inherited from the referencing line.
pub const EDGE_COLOR: u32 = 24;

/// Colour codes reserved by LDraw for internal use.
const INTERNAL_CODES: [u32; 6] = [16, 24, 32, 493, 494, 495];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parses exactly six hex digits, `RRGGBB`.
    pub fn from_hex(s: &str) -> Option<Self> {
        if s.len() != 6 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        let v = u32::from_str_radix(s, 16).ok()?;
        Some(Self::new((v >> 16) as u8, (v >> 8) as u8, v as u8))
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

/// Colour as written on a geometry line. Colour tables are not consulted;
/// an index stays an opaque number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorRef {
    Index(u32),
    Direct(Rgb),
}

impl ColorRef {
    pub const MAIN: ColorRef = ColorRef::Index(MAIN_COLOR);
    pub const EDGE: ColorRef = ColorRef::Index(EDGE_COLOR);

    /// Parses a decimal index or a `0x2RRGGBB` direct colour.
    pub fn parse(token: &str) -> Option<ColorRef> {
        if let Some(hex) = token
            .strip_prefix("0x")
            .or_else(|| token.strip_prefix("0X"))
        {
            let rgb = hex.strip_prefix('2')?;
            return Rgb::from_hex(rgb).map(ColorRef::Direct);
        }
        if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        token.parse().ok().map(ColorRef::Index)
    }
}

impl fmt::Display for ColorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColorRef::Index(i) => write!(f, "{i}"),
            ColorRef::Direct(c) => write!(f, "0x2{:02X}{:02X}{:02X}", c.r, c.g, c.b),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Material {
    Solid,
    Transparent,
    Milky,
    Rubber,
    Chrome,
    Metal,
    Pearl,
    Glitter,
    Internal,
}

/// A `0 !COLOUR` definition line.
#[derive(Debug, Clone, PartialEq)]
pub struct ColourDefinition {
    pub name: String,
    pub code: u32,
    pub value: Rgb,
    pub edge: ColorRef,
    pub alpha: u8,
    pub material: Material,
}

impl ColourDefinition {
    /// Parses the tokens following `!COLOUR`. Keywords are case-insensitive
    /// and the keyword/value pairs may come in any order.
    pub fn parse(tokens: &[&str]) -> Result<Self, String> {
        let name = tokens
            .first()
            .filter(|n| {
                n.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
                    && n.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
            })
            .ok_or_else(|| "missing or invalid colour name".to_string())?;

        let value_of = |key: &str| -> Option<&str> {
            let pos = tokens.iter().position(|t| t.eq_ignore_ascii_case(key))?;
            tokens.get(pos + 1).copied()
        };
        let has = |key: &str| tokens.iter().any(|t| t.eq_ignore_ascii_case(key));

        let code_tok = value_of("CODE").ok_or("missing CODE")?;
        let value_tok = value_of("VALUE").ok_or("missing VALUE")?;
        let edge_tok = value_of("EDGE").ok_or("missing EDGE")?;

        let code: u32 = code_tok
            .parse()
            .map_err(|_| format!("invalid CODE value: {code_tok}"))?;
        let value = value_tok
            .strip_prefix('#')
            .and_then(Rgb::from_hex)
            .ok_or_else(|| format!("invalid VALUE format: {value_tok}"))?;
        let edge = match edge_tok.strip_prefix('#') {
            Some(hex) => Rgb::from_hex(hex).map(ColorRef::Direct),
            None => edge_tok.parse().ok().map(ColorRef::Index),
        }
        .ok_or_else(|| format!("invalid EDGE format: {edge_tok}"))?;
        let alpha: u8 = match value_of("ALPHA") {
            Some(a) => a.parse().map_err(|_| format!("invalid ALPHA value: {a}"))?,
            None => 255,
        };

        let mut material = if has("RUBBER") {
            Material::Rubber
        } else if has("CHROME") {
            Material::Chrome
        } else if has("METAL") {
            Material::Metal
        } else if has("PEARLESCENT") {
            Material::Pearl
        } else if has("GLITTER") || has("SPECKLE") {
            Material::Glitter
        } else {
            match alpha {
                240 => Material::Milky,
                128 => Material::Transparent,
                _ => Material::Solid,
            }
        };
        if INTERNAL_CODES.contains(&code) {
            material = Material::Internal;
        }

        Ok(Self {
            name: name.to_string(),
            code,
            value,
            edge,
            alpha,
            material,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_colour_is_not_an_index() {
        let direct = ColorRef::parse("0x2FF0000").unwrap();
        assert_eq!(direct, ColorRef::Direct(Rgb::new(255, 0, 0)));
        assert_ne!(direct, ColorRef::Index(16711680));
        assert_eq!(direct.to_string(), "0x2FF0000");
    }

    #[test]
    fn index_tokens() {
        assert_eq!(ColorRef::parse("16"), Some(ColorRef::MAIN));
        assert_eq!(ColorRef::parse("0"), Some(ColorRef::Index(0)));
        assert_eq!(ColorRef::parse("-1"), None);
        assert_eq!(ColorRef::parse("red"), None);
        assert_eq!(ColorRef::parse("0x3FF0000"), None);
        assert_eq!(ColorRef::parse("0x2FF00"), None);
        assert_eq!(ColorRef::parse(""), None);
    }

    #[test]
    fn colour_definition() {
        let toks: Vec<&str> = "Trans_Clear CODE 47 VALUE #FCFCFC EDGE #C3C3C3 ALPHA 128"
            .split_whitespace()
            .collect();
        let def = ColourDefinition::parse(&toks).unwrap();
        assert_eq!(def.name, "Trans_Clear");
        assert_eq!(def.code, 47);
        assert_eq!(def.value, Rgb::new(0xFC, 0xFC, 0xFC));
        assert_eq!(def.edge, ColorRef::Direct(Rgb::new(0xC3, 0xC3, 0xC3)));
        assert_eq!(def.material, Material::Transparent);
    }

    #[test]
    fn colour_definition_materials() {
        let parse = |s: &str| {
            let toks: Vec<&str> = s.split_whitespace().collect();
            ColourDefinition::parse(&toks).unwrap()
        };
        assert_eq!(
            parse("Chrome_Gold CODE 334 VALUE #DFC176 EDGE #C2C2C2 CHROME").material,
            Material::Chrome
        );
        assert_eq!(
            parse("Main_Colour CODE 16 VALUE #7F7F7F EDGE #333333").material,
            Material::Internal
        );
        let rubber = parse("Rubber_Black code 256 value #212121 edge 0 rubber");
        assert_eq!(rubber.material, Material::Rubber);
        assert_eq!(rubber.edge, ColorRef::Index(0));
    }

    #[test]
    fn colour_definition_errors() {
        let parse = |s: &str| {
            let toks: Vec<&str> = s.split_whitespace().collect();
            ColourDefinition::parse(&toks)
        };
        assert!(parse("Black CODE 0 VALUE #1B2A34").is_err());
        assert!(parse("Black CODE x VALUE #1B2A34 EDGE #2B4354").is_err());
        assert!(parse("Black CODE 0 VALUE 1B2A34 EDGE #2B4354").is_err());
        assert!(parse("9Black CODE 0 VALUE #1B2A34 EDGE #2B4354").is_err());
    }
}
