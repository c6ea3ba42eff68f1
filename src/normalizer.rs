//! Deterministic text cleaning applied to every extracted track.

use crate::models::{NormalizedItem, RawItem};

/// Strips denylisted characters and joins title and artists into one key.
#[derive(Debug, Clone)]
pub struct Normalizer {
    denylist: Vec<char>,
}

impl Normalizer {
    pub fn new(denylist: impl Into<Vec<char>>) -> Self {
        Self {
            denylist: denylist.into(),
        }
    }

    /// Produce `"<cleanTitle> <cleanSubtitle>"`, trimmed.
    ///
    /// Total and idempotent: feeding the output back in as a title yields the same key.
    pub fn normalize(&self, raw: &RawItem) -> NormalizedItem {
        let title = self.clean(&raw.title);
        let subtitle = self.clean(&raw.subtitle);

        NormalizedItem::from_clean(format!("{title} {subtitle}").trim().to_string())
    }

    fn clean(&self, text: &str) -> String {
        text.chars()
            .filter(|c| !self.denylist.contains(c))
            .collect::<String>()
            .trim()
            .to_string()
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(vec!['-'])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_cleaned_title_and_artists() {
        let normalizer = Normalizer::default();
        let item = normalizer.normalize(&RawItem::new("  Semi-Charmed Life ", "Third Eye Blind"));
        assert_eq!(item.as_str(), "SemiCharmed Life Third Eye Blind");
    }

    #[test]
    fn strips_every_denylisted_character() {
        let normalizer = Normalizer::new(vec!['-', '*']);
        let samples = ["- a - b -", "***", "x-*-y", "", "plain"];

        for sample in samples {
            let item = normalizer.normalize(&RawItem::new(sample, ""));
            assert!(!item.as_str().contains('-'), "{sample:?} -> {item}");
            assert!(!item.as_str().contains('*'), "{sample:?} -> {item}");
        }
    }

    #[test]
    fn normalization_is_idempotent() {
        let normalizer = Normalizer::default();
        let samples = [
            RawItem::new("Title - Remix ", " A-ha, Someone "),
            RawItem::new("", ""),
            RawItem::new("---", "Unknown Artist"),
            RawItem::new("  spaced  out  ", ""),
        ];

        for raw in samples {
            let once = normalizer.normalize(&raw);
            let twice = normalizer.normalize(&once.as_raw());
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn empty_input_yields_empty_key() {
        let item = Normalizer::default().normalize(&RawItem::new(" - ", "  "));
        assert_eq!(item.as_str(), "");
    }
}
