//! Color palette mapping color classes to concrete RGB values.
//!
//! The host applies these to its own text widget; kiln itself never draws.

use kiln_types::ColorClass;

/// 24-bit RGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// Category color constants shared by both palettes.
mod colors {
    use super::Rgb;

    pub const TYPE: Rgb = Rgb::new(0, 191, 255); // deep sky blue
    pub const FLOW: Rgb = Rgb::new(238, 130, 238); // violet
    pub const ACCESS: Rgb = Rgb::new(255, 0, 255); // fuchsia
    pub const STD: Rgb = Rgb::new(255, 140, 0); // dark orange
    pub const PREPROC: Rgb = Rgb::new(34, 139, 34); // forest green
    pub const LITERAL: Rgb = Rgb::new(144, 238, 144); // light green
    pub const COMMENT: Rgb = Rgb::new(211, 211, 211); // light gray

    pub const DEFAULT_DARK: Rgb = Rgb::new(255, 255, 255);
    pub const DEFAULT_LIGHT: Rgb = Rgb::new(0, 0, 0);
}

/// Resolved palette used when applying highlight spans.
///
/// Only the default text color differs between the dark and light variants;
/// the category colors are fixed.
#[derive(Debug, Clone, Copy)]
pub struct Palette {
    pub default: Rgb,
    pub r#type: Rgb,
    pub flow: Rgb,
    pub access: Rgb,
    pub std: Rgb,
    pub preproc: Rgb,
    pub literal: Rgb,
    pub comment: Rgb,
}

impl Palette {
    /// Dark-background palette (the default).
    #[must_use]
    pub const fn standard() -> Self {
        Self {
            default: colors::DEFAULT_DARK,
            r#type: colors::TYPE,
            flow: colors::FLOW,
            access: colors::ACCESS,
            std: colors::STD,
            preproc: colors::PREPROC,
            literal: colors::LITERAL,
            comment: colors::COMMENT,
        }
    }

    /// Light-background palette.
    #[must_use]
    pub const fn light() -> Self {
        let mut palette = Self::standard();
        palette.default = colors::DEFAULT_LIGHT;
        palette
    }

    /// Color for a class.
    #[must_use]
    pub fn color(&self, class: ColorClass) -> Rgb {
        match class {
            ColorClass::Default => self.default,
            ColorClass::Type => self.r#type,
            ColorClass::Flow => self.flow,
            ColorClass::Access => self.access,
            ColorClass::Std => self.std,
            ColorClass::Preproc => self.preproc,
            ColorClass::Literal => self.literal,
            ColorClass::Comment => self.comment,
        }
    }
}
