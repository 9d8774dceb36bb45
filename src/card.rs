//! Positional decomposition of composite "card" strings.
//!
//! A card bundles several human-readable attributes joined by `" / "`,
//! e.g. `"[法] 玛格丽特·杜拉斯 / 2005 / 上海译文出版社"` for a book or
//! `"2024 / 法国 / 喜剧 爱情 / 劳拉·皮亚尼 / 卡米莉·拉瑟福德"` for a movie.
//! Which position means what depends on the data type, so the mapping is
//! an explicit, versioned [`CardLayout`] rather than per-caller guesswork.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::models::MediaKind;
use crate::normalize::{first_year, fold_width, split_contributors};

/// Sub-field delimiter inside a card.
pub const CARD_SEPARATOR: &str = " / ";

/// Position-to-meaning mapping for one data type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CardLayout {
    /// Bumped whenever a mapping changes, so persisted configs stay explicit
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contributor: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genres: Option<usize>,
}

/// Sub-fields extracted from one card.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CardFields {
    pub contributors: Vec<String>,
    pub secondary: Vec<String>,
    /// 4-digit year, or empty when none was found
    pub year: String,
    pub publisher: Option<String>,
    pub genres: Vec<String>,
}

impl CardLayout {
    /// Book cards: author / year / publisher
    pub fn book() -> Self {
        Self {
            version: 1,
            contributor: Some(0),
            secondary: None,
            year: Some(1),
            publisher: Some(2),
            genres: None,
        }
    }

    /// Movie cards: year / region / genres / director / cast
    pub fn movie() -> Self {
        Self {
            version: 1,
            contributor: Some(3),
            secondary: Some(4),
            year: Some(0),
            publisher: None,
            genres: Some(2),
        }
    }

    pub fn for_kind(kind: MediaKind) -> Self {
        match kind {
            MediaKind::Book => Self::book(),
            MediaKind::Movie => Self::movie(),
        }
    }

    /// Reject layouts that map two roles onto the same position.
    pub fn validate(&self) -> Result<()> {
        if self.version == 0 {
            bail!("card layout version must be at least 1");
        }
        let roles = [
            ("contributor", self.contributor),
            ("secondary", self.secondary),
            ("year", self.year),
            ("publisher", self.publisher),
            ("genres", self.genres),
        ];
        for (i, (name_a, pos_a)) in roles.iter().enumerate() {
            for (name_b, pos_b) in &roles[i + 1..] {
                if let (Some(a), Some(b)) = (pos_a, pos_b) {
                    if a == b {
                        bail!(
                            "card layout v{}: '{}' and '{}' both map to position {}",
                            self.version,
                            name_a,
                            name_b,
                            a
                        );
                    }
                }
            }
        }
        Ok(())
    }

    /// Split a card into positional sub-fields according to this layout.
    ///
    /// The year comes from the first 4-digit run in the year sub-field,
    /// falling back to the first one anywhere in the card.
    pub fn decompose(&self, card: &str) -> CardFields {
        let folded = fold_width(card);
        let parts: Vec<&str> = folded.split(CARD_SEPARATOR).map(str::trim).collect();
        let at = |pos: Option<usize>| {
            pos.and_then(|p| parts.get(p).copied())
                .filter(|s| !s.is_empty())
        };

        let year = at(self.year)
            .and_then(|s| first_year(s))
            .or_else(|| first_year(&folded))
            .unwrap_or_default();

        CardFields {
            contributors: at(self.contributor).map(split_contributors).unwrap_or_default(),
            secondary: at(self.secondary).map(split_contributors).unwrap_or_default(),
            year,
            publisher: at(self.publisher).map(str::to_string),
            genres: at(self.genres)
                .map(|g| g.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_book_card() {
        let fields = CardLayout::book().decompose("[法] 玛格丽特·杜拉斯 / 2005 / 上海译文出版社");
        assert_eq!(fields.contributors, vec!["玛格丽特·杜拉斯".to_string()]);
        assert_eq!(fields.year, "2005");
        assert_eq!(fields.publisher.as_deref(), Some("上海译文出版社"));
        assert!(fields.genres.is_empty());
    }

    #[test]
    fn test_book_card_two_fields() {
        let fields = CardLayout::book().decompose("[法] 玛格丽特·杜拉斯 / 2005");
        assert_eq!(fields.contributors, vec!["玛格丽特·杜拉斯".to_string()]);
        assert_eq!(fields.year, "2005");
        assert_eq!(fields.publisher, None);
    }

    #[test]
    fn test_movie_card() {
        let fields = CardLayout::movie()
            .decompose("2024 / 法国 / 喜剧 爱情 / 劳拉·皮亚尼 / 卡米莉·拉瑟福德, 巴勃罗·保利");
        assert_eq!(fields.year, "2024");
        assert_eq!(fields.genres, vec!["喜剧".to_string(), "爱情".to_string()]);
        assert_eq!(fields.contributors, vec!["劳拉·皮亚尼".to_string()]);
        assert_eq!(
            fields.secondary,
            vec!["卡米莉·拉瑟福德".to_string(), "巴勃罗·保利".to_string()]
        );
    }

    #[test]
    fn test_full_width_contributor_list() {
        let fields = CardLayout::book().decompose("（美）甲，乙 / ２０１１ / 某出版社");
        assert_eq!(fields.contributors, vec!["甲".to_string(), "乙".to_string()]);
        assert_eq!(fields.year, "2011");
    }

    #[test]
    fn test_year_falls_back_to_whole_card() {
        let fields = CardLayout::book().decompose("某作者 / 某译者 / 某出版社 / 2010-5");
        assert_eq!(fields.year, "2010");
    }

    #[test]
    fn test_empty_card() {
        assert_eq!(CardLayout::movie().decompose(""), CardFields::default());
    }

    #[test]
    fn test_validate_rejects_shared_position() {
        let mut layout = CardLayout::book();
        assert!(layout.validate().is_ok());
        layout.publisher = Some(0);
        let err = layout.validate().unwrap_err().to_string();
        assert!(err.contains("'contributor' and 'publisher'"));
    }

    #[test]
    fn test_layout_toml_roundtrip_keeps_unset_roles_absent() {
        let text = toml::to_string(&CardLayout::book()).unwrap();
        assert!(!text.contains("genres"));
        let back: CardLayout = toml::from_str(&text).unwrap();
        assert_eq!(back, CardLayout::book());
    }
}
