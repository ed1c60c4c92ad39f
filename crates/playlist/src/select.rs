use serde::{Deserialize, Serialize};

use crate::model::Variant;

/// Policy for picking one rendition out of a master playlist.
///
/// I-frame-only variants are never picked. Ties go to the variant declared
/// first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariantSelection {
    #[default]
    HighestBitrate,
    LowestBitrate,
    /// Bandwidth nearest to the given bits per second.
    ClosestTo(u64),
}

impl VariantSelection {
    /// Index of the chosen variant, or `None` when nothing is selectable.
    pub fn select(&self, variants: &[Variant]) -> Option<usize> {
        let mut best: Option<(usize, u64)> = None;

        for (idx, variant) in variants.iter().enumerate() {
            if variant.iframe_only {
                continue;
            }
            let score = match self {
                // Inverted so that "lower is better" holds for every policy.
                VariantSelection::HighestBitrate => u64::MAX - variant.bandwidth,
                VariantSelection::LowestBitrate => variant.bandwidth,
                VariantSelection::ClosestTo(target) => variant.bandwidth.abs_diff(*target),
            };
            // Strict comparison keeps the earliest declaration on ties.
            if best.is_none_or(|(_, current)| score < current) {
                best = Some((idx, score));
            }
        }

        best.map(|(idx, _)| idx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn variant(name: &str, bandwidth: u64, iframe_only: bool) -> Variant {
        Variant {
            url: Url::parse(&format!("https://cdn.example.com/{name}.m3u8")).unwrap(),
            bandwidth,
            resolution: None,
            codecs: None,
            iframe_only,
        }
    }

    #[test]
    fn highest_bitrate_prefers_first_on_tie() {
        let variants = vec![
            variant("a", 1_000, false),
            variant("b", 3_000, false),
            variant("c", 3_000, false),
        ];
        assert_eq!(VariantSelection::HighestBitrate.select(&variants), Some(1));
    }

    #[test]
    fn iframe_variants_are_skipped() {
        let variants = vec![variant("trick", 9_000, true), variant("main", 2_000, false)];
        assert_eq!(VariantSelection::HighestBitrate.select(&variants), Some(1));
        assert_eq!(
            VariantSelection::HighestBitrate.select(&[variant("trick", 1, true)]),
            None
        );
    }

    #[test]
    fn lowest_and_closest() {
        let variants = vec![
            variant("a", 800_000, false),
            variant("b", 2_500_000, false),
            variant("c", 5_000_000, false),
        ];
        assert_eq!(VariantSelection::LowestBitrate.select(&variants), Some(0));
        assert_eq!(
            VariantSelection::ClosestTo(3_000_000).select(&variants),
            Some(1)
        );
    }
}
