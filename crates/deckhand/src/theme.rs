/// An RGB colour used by the terminal renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgb(pub u8, pub u8, pub u8);

/// Terminal palette for a presentation theme.
#[derive(Debug, Clone, PartialEq)]
pub struct Theme {
    pub name: String,
    pub foreground: Rgb,
    pub heading: Rgb,
    pub accent: Rgb,
    pub muted: Rgb,
    pub code_foreground: Rgb,
}

impl Theme {
    pub fn dark() -> Self {
        Self {
            name: "dark".to_string(),
            foreground: Rgb(0xC8, 0xC8, 0xC8),
            heading: Rgb(0xFF, 0xFF, 0xFF),
            accent: Rgb(0x52, 0x94, 0xE2),
            muted: Rgb(0x80, 0x80, 0x80),
            code_foreground: Rgb(0xD4, 0xD4, 0xD4),
        }
    }

    pub fn light() -> Self {
        Self {
            name: "light".to_string(),
            foreground: Rgb(0x1A, 0x1A, 0x2E),
            heading: Rgb(0x16, 0x21, 0x3E),
            accent: Rgb(0x0F, 0x34, 0x60),
            muted: Rgb(0x6B, 0x6B, 0x7B),
            code_foreground: Rgb(0x33, 0x33, 0x33),
        }
    }

    /// Theme for a deck's `@theme` value. Anything but `light` renders dark,
    /// since terminals are dark far more often than not.
    pub fn from_name(name: &str) -> Self {
        match name {
            "light" => Self::light(),
            _ => Self::dark(),
        }
    }

    /// The syntect theme that matches this palette.
    pub fn syntect_theme_name(&self) -> &'static str {
        if self.name == "light" {
            "InspiredGitHub"
        } else {
            "base16-ocean.dark"
        }
    }
}
