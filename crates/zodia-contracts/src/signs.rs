use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::GenerationError;

/// The twelve zodiac signs. Each sign carries the fixed palette the free
/// gradient renderer uses, so two runs for the same sign always produce the
/// same background.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZodiacSign {
    Aries,
    Taurus,
    Gemini,
    Cancer,
    Leo,
    Virgo,
    Libra,
    Scorpio,
    Sagittarius,
    Capricorn,
    Aquarius,
    Pisces,
}

impl ZodiacSign {
    pub const ALL: [ZodiacSign; 12] = [
        ZodiacSign::Aries,
        ZodiacSign::Taurus,
        ZodiacSign::Gemini,
        ZodiacSign::Cancer,
        ZodiacSign::Leo,
        ZodiacSign::Virgo,
        ZodiacSign::Libra,
        ZodiacSign::Scorpio,
        ZodiacSign::Sagittarius,
        ZodiacSign::Capricorn,
        ZodiacSign::Aquarius,
        ZodiacSign::Pisces,
    ];

    /// Stable lowercase identifier used in filenames and receipts.
    pub fn slug(&self) -> &'static str {
        match self {
            ZodiacSign::Aries => "aries",
            ZodiacSign::Taurus => "taurus",
            ZodiacSign::Gemini => "gemini",
            ZodiacSign::Cancer => "cancer",
            ZodiacSign::Leo => "leo",
            ZodiacSign::Virgo => "virgo",
            ZodiacSign::Libra => "libra",
            ZodiacSign::Scorpio => "scorpio",
            ZodiacSign::Sagittarius => "sagittarius",
            ZodiacSign::Capricorn => "capricorn",
            ZodiacSign::Aquarius => "aquarius",
            ZodiacSign::Pisces => "pisces",
        }
    }

    /// Astrological symbol, used for reporting.
    pub fn symbol(&self) -> &'static str {
        match self {
            ZodiacSign::Aries => "\u{2648}",
            ZodiacSign::Taurus => "\u{2649}",
            ZodiacSign::Gemini => "\u{264a}",
            ZodiacSign::Cancer => "\u{264b}",
            ZodiacSign::Leo => "\u{264c}",
            ZodiacSign::Virgo => "\u{264d}",
            ZodiacSign::Libra => "\u{264e}",
            ZodiacSign::Scorpio => "\u{264f}",
            ZodiacSign::Sagittarius => "\u{2650}",
            ZodiacSign::Capricorn => "\u{2651}",
            ZodiacSign::Aquarius => "\u{2652}",
            ZodiacSign::Pisces => "\u{2653}",
        }
    }

    /// Three-letter abbreviation rendered inside the sign badge.
    pub fn abbreviation(&self) -> &'static str {
        match self {
            ZodiacSign::Aries => "ARI",
            ZodiacSign::Taurus => "TAU",
            ZodiacSign::Gemini => "GEM",
            ZodiacSign::Cancer => "CAN",
            ZodiacSign::Leo => "LEO",
            ZodiacSign::Virgo => "VIR",
            ZodiacSign::Libra => "LIB",
            ZodiacSign::Scorpio => "SCO",
            ZodiacSign::Sagittarius => "SAG",
            ZodiacSign::Capricorn => "CAP",
            ZodiacSign::Aquarius => "AQU",
            ZodiacSign::Pisces => "PIS",
        }
    }

    /// Gradient endpoints for the free renderer: (top RGB, bottom RGB).
    pub fn gradient_colors(&self) -> ([u8; 3], [u8; 3]) {
        match self {
            ZodiacSign::Aries => ([178, 34, 34], [255, 140, 0]),
            ZodiacSign::Taurus => ([34, 102, 51], [154, 205, 50]),
            ZodiacSign::Gemini => ([240, 196, 25], [255, 111, 97]),
            ZodiacSign::Cancer => ([70, 130, 180], [176, 224, 230]),
            ZodiacSign::Leo => ([218, 165, 32], [255, 69, 0]),
            ZodiacSign::Virgo => ([85, 107, 47], [189, 183, 107]),
            ZodiacSign::Libra => ([186, 85, 211], [255, 182, 193]),
            ZodiacSign::Scorpio => ([75, 0, 130], [139, 0, 0]),
            ZodiacSign::Sagittarius => ([148, 0, 211], [255, 140, 0]),
            ZodiacSign::Capricorn => ([47, 79, 79], [112, 128, 144]),
            ZodiacSign::Aquarius => ([0, 104, 139], [0, 206, 209]),
            ZodiacSign::Pisces => ([25, 25, 112], [72, 209, 204]),
        }
    }

    /// Accent color for the emoji badge, picked from the warm gradient end.
    pub fn accent_color(&self) -> [u8; 3] {
        self.gradient_colors().1
    }
}

impl fmt::Display for ZodiacSign {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for ZodiacSign {
    type Err = GenerationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        ZodiacSign::ALL
            .iter()
            .copied()
            .find(|sign| sign.slug() == normalized)
            .ok_or_else(|| {
                GenerationError::Configuration(format!("unknown zodiac sign '{value}'"))
            })
    }
}

/// Horoscope category. Drives the prompt theme sent to paid providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Love,
    Work,
    Health,
    General,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Love,
        Category::Work,
        Category::Health,
        Category::General,
    ];

    pub fn slug(&self) -> &'static str {
        match self {
            Category::Love => "love",
            Category::Work => "work",
            Category::Health => "health",
            Category::General => "general",
        }
    }

    /// Theme fragment injected into the text-to-image prompt.
    pub fn prompt_theme(&self) -> &'static str {
        match self {
            Category::Love => "romance, warm glowing hearts and soft rose nebulas",
            Category::Work => "ambition, golden constellations rising over a horizon",
            Category::Health => "vitality, serene celestial light over calm waters",
            Category::General => "destiny, a deep starfield and mystical cosmic dust",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for Category {
    type Err = GenerationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        Category::ALL
            .iter()
            .copied()
            .find(|category| category.slug() == normalized)
            .ok_or_else(|| {
                GenerationError::Configuration(format!("unknown category '{value}'"))
            })
    }
}
