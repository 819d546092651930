use std::fs;
use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::modes::GenerationMode;
use crate::signs::{Category, ZodiacSign};

pub const RECEIPT_SCHEMA_VERSION: u64 = 1;

/// Per-image cost record written next to the final image. Together with the
/// filename tag this is the durable audit trail for what each backend was
/// asked to do and what it billed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostReceipt {
    pub schema_version: u64,
    pub provider: String,
    pub backend_tag: Option<String>,
    pub sign: ZodiacSign,
    pub category: Category,
    pub date: NaiveDate,
    pub prompt: String,
    pub cost_estimate_usd: f64,
    pub image_path: String,
    pub created_at: String,
}

impl CostReceipt {
    pub fn new(
        provider: impl Into<String>,
        mode: GenerationMode,
        sign: ZodiacSign,
        category: Category,
        date: NaiveDate,
        prompt: impl Into<String>,
        image_path: impl Into<String>,
        created_at: impl Into<String>,
    ) -> Self {
        Self {
            schema_version: RECEIPT_SCHEMA_VERSION,
            provider: provider.into(),
            backend_tag: mode.backend_tag().map(str::to_string),
            sign,
            category,
            date,
            prompt: prompt.into(),
            cost_estimate_usd: mode.cost_estimate_usd(),
            image_path: image_path.into(),
            created_at: created_at.into(),
        }
    }
}

pub fn write_receipt(path: &Path, receipt: &CostReceipt) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let rendered = serde_json::to_string_pretty(receipt)?;
    fs::write(path, rendered)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{write_receipt, CostReceipt, RECEIPT_SCHEMA_VERSION};
    use crate::modes::GenerationMode;
    use crate::signs::{Category, ZodiacSign};

    fn receipt(mode: GenerationMode) -> CostReceipt {
        CostReceipt::new(
            "gradient",
            mode,
            ZodiacSign::Leo,
            Category::Love,
            NaiveDate::from_ymd_opt(2024, 11, 15).unwrap(),
            "mystical cosmic background for leo",
            "out/leo_love_2024-11-15.png",
            "2024-11-15T10:00:00+00:00",
        )
    }

    #[test]
    fn receipt_tag_and_cost_follow_mode() {
        let free = receipt(GenerationMode::Free);
        assert_eq!(free.backend_tag, None);
        assert_eq!(free.cost_estimate_usd, 0.0);

        let paid = receipt(GenerationMode::OpenAi);
        assert_eq!(paid.backend_tag.as_deref(), Some("openai"));
        assert!(paid.cost_estimate_usd > 0.0);
    }

    #[test]
    fn receipt_round_trips_through_json() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("receipt-test.json");
        let original = receipt(GenerationMode::Stability);
        write_receipt(&path, &original)?;

        let raw = std::fs::read_to_string(&path)?;
        let loaded: CostReceipt = serde_json::from_str(&raw)?;
        assert_eq!(loaded, original);
        assert_eq!(loaded.schema_version, RECEIPT_SCHEMA_VERSION);
        Ok(())
    }
}
