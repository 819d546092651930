use std::path::PathBuf;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::modes::GenerationMode;
use crate::signs::{Category, ZodiacSign};

/// One generation call. Immutable for the duration of the call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub sign: ZodiacSign,
    pub category: Category,
    /// Horoscope text overlaid on the background. Must be non-empty.
    pub text: String,
    /// Calendar date stamped into the filename. `None` means today.
    pub date: Option<NaiveDate>,
    pub show_emoji: bool,
}

impl GenerationRequest {
    pub fn new(sign: ZodiacSign, category: Category, text: impl Into<String>) -> Self {
        Self {
            sign,
            category,
            text: text.into(),
            date: None,
            show_emoji: true,
        }
    }

    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    pub fn with_emoji(mut self, show_emoji: bool) -> Self {
        self.show_emoji = show_emoji;
        self
    }
}

/// Returned only once the final image is persisted. The caller owns it; the
/// pipeline keeps nothing across calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub final_image_path: PathBuf,
    pub backend_used: GenerationMode,
}
