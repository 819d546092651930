use chrono::NaiveDate;

use crate::modes::GenerationMode;
use crate::signs::{Category, ZodiacSign};

/// Deterministic output filename: `{sign}_{category}[_{tag}]_{YYYY-MM-DD}.png`.
///
/// The tag segment appears only for paid backends and is the sole external
/// audit mechanism for cost attribution, so this function and the backend
/// selection must never disagree; both read the same `GenerationMode`.
/// Identical inputs always yield byte-identical names, so re-runs overwrite
/// instead of duplicating.
pub fn output_filename(
    sign: ZodiacSign,
    category: Category,
    mode: GenerationMode,
    date: NaiveDate,
) -> String {
    let stamp = date.format("%Y-%m-%d");
    match mode.backend_tag() {
        Some(tag) => format!("{}_{}_{}_{}.png", sign.slug(), category.slug(), tag, stamp),
        None => format!("{}_{}_{}.png", sign.slug(), category.slug(), stamp),
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::output_filename;
    use crate::modes::GenerationMode;
    use crate::signs::{Category, ZodiacSign};

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 11, 15).unwrap()
    }

    #[test]
    fn free_mode_has_no_tag_segment() {
        let name = output_filename(
            ZodiacSign::Leo,
            Category::Love,
            GenerationMode::Free,
            date(),
        );
        assert_eq!(name, "leo_love_2024-11-15.png");
        assert!(!name.contains("_stability_"));
        assert!(!name.contains("_openai_"));
    }

    #[test]
    fn paid_modes_embed_their_backend_tag() {
        assert_eq!(
            output_filename(
                ZodiacSign::Leo,
                Category::Love,
                GenerationMode::Stability,
                date()
            ),
            "leo_love_stability_2024-11-15.png"
        );
        assert_eq!(
            output_filename(
                ZodiacSign::Aries,
                Category::Work,
                GenerationMode::OpenAi,
                date()
            ),
            "aries_work_openai_2024-11-15.png"
        );
    }

    #[test]
    fn naming_is_deterministic() {
        for mode in GenerationMode::ALL {
            let first = output_filename(ZodiacSign::Pisces, Category::Health, mode, date());
            let second = output_filename(ZodiacSign::Pisces, Category::Health, mode, date());
            assert_eq!(first, second);
        }
    }

    #[test]
    fn tag_segment_tracks_mode_for_every_sign() {
        for sign in ZodiacSign::ALL {
            for mode in GenerationMode::ALL {
                let name = output_filename(sign, Category::General, mode, date());
                match mode.backend_tag() {
                    Some(tag) => assert!(name.contains(&format!("_{tag}_"))),
                    None => {
                        assert!(!name.contains("_stability_"));
                        assert!(!name.contains("_openai_"));
                    }
                }
            }
        }
    }
}
