//! Track extraction from rendered playlist markup.
//!
//! Only the items currently mounted by the virtualized list are present in the
//! markup, so this is called once per scroll position and the results merged
//! by the engine.

use anyhow::{Context, Result};
use regex::{Regex, RegexBuilder};
use scraper::{ElementRef, Html};

use crate::config::ExtractorConfig;
use crate::models::RawItem;
use crate::traits::ItemExtractor;

/// Extractor matching item, title and subtitle nodes by class-name patterns.
#[derive(Debug, Clone)]
pub struct ClassPatternExtractor {
    item: Regex,
    title: Regex,
    subtitle: Regex,
    placeholder: String,
}

impl ClassPatternExtractor {
    /// Compile the class patterns from `config`.
    ///
    /// # Errors
    /// - If any pattern is not a valid regular expression
    pub fn new(config: &ExtractorConfig) -> Result<Self> {
        Ok(Self {
            item: class_pattern(&config.item_class).context("invalid item class pattern")?,
            title: class_pattern(&config.title_class).context("invalid title class pattern")?,
            subtitle: class_pattern(&config.subtitle_class)
                .context("invalid subtitle class pattern")?,
            placeholder: config.subtitle_placeholder.clone(),
        })
    }

    fn is_item(&self, element: &ElementRef<'_>) -> bool {
        element.value().name() == "a" && has_class(element, &self.item)
    }

    fn is_title(&self, element: &ElementRef<'_>) -> bool {
        element.value().name() == "span" && has_class(element, &self.title)
    }

    fn is_subtitle(&self, element: &ElementRef<'_>) -> bool {
        element.value().name() == "span" && has_class(element, &self.subtitle)
    }
}

impl ItemExtractor for ClassPatternExtractor {
    fn extract_visible(&self, markup: &str) -> Vec<RawItem> {
        let document = Html::parse_document(markup);

        // Every element in document order, so "the nearest following subtitle"
        // is simply the next subtitle at a higher index.
        let elements: Vec<ElementRef<'_>> = document
            .root_element()
            .descendants()
            .filter_map(ElementRef::wrap)
            .collect();

        let mut next_subtitle = vec![None; elements.len()];
        let mut upcoming = None;
        for (index, element) in elements.iter().enumerate().rev() {
            next_subtitle[index] = upcoming;
            if self.is_subtitle(element) {
                upcoming = Some(index);
            }
        }

        let mut items = Vec::new();
        for (index, element) in elements.iter().enumerate() {
            if !self.is_item(element) {
                continue;
            }

            let Some(title_node) = element
                .descendants()
                .filter_map(ElementRef::wrap)
                .find(|child| self.is_title(child))
            else {
                continue;
            };

            let subtitle = next_subtitle[index].map_or_else(
                || self.placeholder.clone(),
                |position| joined_text(&elements[position], ", "),
            );

            items.push(RawItem::new(joined_text(&title_node, ""), subtitle));
        }

        items
    }
}

fn class_pattern(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern).case_insensitive(true).build()
}

fn has_class(element: &ElementRef<'_>, pattern: &Regex) -> bool {
    element.value().classes().any(|class| pattern.is_match(class))
}

/// Text fragments of `element`, each trimmed, empty ones dropped, joined by `separator`.
fn joined_text(element: &ElementRef<'_>, separator: &str) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|fragment| !fragment.is_empty())
        .collect::<Vec<_>>()
        .join(separator)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> ClassPatternExtractor {
        ClassPatternExtractor::new(&ExtractorConfig::default()).unwrap()
    }

    fn track(title: &str, artists: &[&str]) -> String {
        let artists = artists
            .iter()
            .map(|a| format!(r#"<a href="/artist">{a}</a>"#))
            .collect::<String>();
        format!(
            r#"<div class="CommonTrack_root__x1">
                 <a class="Meta_albumLink__abc" href="/album/1"><span class="Meta_title__q9">{title}</span></a>
                 <span class="Meta_subtitle__zz">{artists}</span>
               </div>"#
        )
    }

    #[test]
    fn reads_title_and_artists_in_document_order() {
        let markup = format!(
            "<html><body>{}{}</body></html>",
            track("First", &["Alpha"]),
            track("Second", &["Beta", "Gamma"])
        );

        let items = extractor().extract_visible(&markup);

        assert_eq!(
            items,
            vec![
                RawItem::new("First", "Alpha"),
                RawItem::new("Second", "Beta, Gamma"),
            ]
        );
    }

    #[test]
    fn skips_items_without_a_title_node() {
        let markup = format!(
            r#"<html><body>
                 <a class="Meta_albumLink__abc" href="/album/2"><span class="Cover">img</span></a>
                 <span class="Meta_subtitle__zz">Orphan</span>
                 {}
               </body></html>"#,
            track("Kept", &["Artist"])
        );

        let items = extractor().extract_visible(&markup);

        assert_eq!(items, vec![RawItem::new("Kept", "Artist")]);
    }

    #[test]
    fn substitutes_placeholder_when_no_subtitle_follows() {
        let markup = r#"<html><body>
              <a class="Meta_albumLink__abc"><span class="Meta_title__q9">Lonely</span></a>
            </body></html>"#;

        let items = extractor().extract_visible(markup);

        assert_eq!(items, vec![RawItem::new("Lonely", "Unknown Artist")]);
    }

    #[test]
    fn matches_artist_classes_case_insensitively() {
        let markup = r#"<html><body>
              <a class="meta_albumlink__abc"><span class="META_TITLE__q9">Loud</span></a>
              <span class="TrackArtists">Someone</span>
            </body></html>"#;

        let items = extractor().extract_visible(markup);

        assert_eq!(items, vec![RawItem::new("Loud", "Someone")]);
    }

    #[test]
    fn empty_markup_yields_nothing() {
        assert!(extractor().extract_visible("").is_empty());
    }

    #[test]
    fn rejects_invalid_patterns() {
        let config = ExtractorConfig {
            title_class: "(".to_string(),
            ..ExtractorConfig::default()
        };
        assert!(ClassPatternExtractor::new(&config).is_err());
    }
}
