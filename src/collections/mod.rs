//! Source collections and the cardsets that subscribe to them
//!
//! A factsheet is a shared, ordered list of rows. A cardset binds one
//! factsheet to a presentation template; boxes subscribe to cardsets, and
//! the union of their rows is the membership the reconciler materializes.

pub mod factsheet;
pub mod page;

pub use factsheet::{row_id_for, Factsheet, Row};
pub use page::{PageKind, ParsedPage, TemplateFields};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{CardboxError, Result};
use crate::types::{CardId, CollectionId, RowId};

/// Words a cardset title or page name may not start with
pub const RESERVED_TITLES: &[&str] = &[
    "create", "tags", "list", "edit", "view", "cardset", "cardbox", "stats",
];

static VALID_CARDSET_TITLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z][\- a-z0-9]{4,49}$").expect("valid regex"));

static VALID_FACTSHEET_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z][_a-z0-9]{4,49}$").expect("valid regex"));

static TITLE_SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ _\-]+").expect("valid regex"));

/// Read-only ordered source of rows
pub trait SourceCollection {
    fn row_ids(&self) -> Vec<RowId>;

    fn row(&self, id: &RowId) -> Option<&Row>;
}

/// "Irregular French Verbs" -> "irregular_french_verbs"
pub fn title_to_name(title: &str) -> String {
    TITLE_SPACES.replace_all(title, "_").to_lowercase()
}

/// "irregular_french_verbs" -> "Irregular French Verbs"
pub fn name_to_title(name: &str) -> String {
    name.split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Validate a factsheet title and return its storage name
pub fn factsheet_name(title: &str) -> Result<String> {
    let name = title_to_name(title);
    if !VALID_FACTSHEET_NAME.is_match(&name) {
        return Err(CardboxError::InvalidCollection(format!(
            "title '{}' ({}) must start with a letter, contain only letters, numbers and spaces, and be 5 to 50 characters long",
            title, name
        )));
    }
    Ok(name)
}

/// A subscription binding a factsheet to a presentation template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cardset {
    pub id: CollectionId,
    pub title: String,
    pub owner: String,
    /// Name of the bound factsheet
    pub factsheet: String,
    pub template_name: String,
    pub public: bool,
}

impl Cardset {
    pub fn new(
        id: CollectionId,
        title: &str,
        owner: impl Into<String>,
        factsheet: impl Into<String>,
    ) -> Result<Self> {
        let mut cardset = Self {
            id,
            title: String::new(),
            owner: owner.into(),
            factsheet: factsheet.into(),
            template_name: "default".to_string(),
            public: true,
        };
        cardset.set_title(title)?;
        Ok(cardset)
    }

    pub fn set_title(&mut self, title: &str) -> Result<()> {
        let lower = title.to_lowercase();
        let reserved = RESERVED_TITLES.iter().any(|r| lower.starts_with(r));
        if reserved || !VALID_CARDSET_TITLE.is_match(&lower) {
            return Err(CardboxError::InvalidCollection(format!(
                "title '{}' must start with a letter, contain only letters, numbers, spaces and dashes, and not start with any of: {}",
                title,
                RESERVED_TITLES.join(", ")
            )));
        }
        self.title = title.to_string();
        Ok(())
    }

    /// Card ids of every row of `source`
    pub fn all_ids(&self, source: &impl SourceCollection) -> Vec<CardId> {
        source
            .row_ids()
            .into_iter()
            .map(|row| CardId {
                collection: self.id,
                row,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_title_name_conversion() {
        assert_eq!(title_to_name("Irregular  French-Verbs"), "irregular_french_verbs");
        assert_eq!(name_to_title("irregular_french_verbs"), "Irregular French Verbs");
        assert_eq!(name_to_title(""), "");
    }

    #[test]
    fn test_factsheet_name_validation() {
        assert_eq!(factsheet_name("World Capitals").unwrap(), "world_capitals");
        assert!(factsheet_name("abc").is_err());
        assert!(factsheet_name("1st list").is_err());
    }

    #[test]
    fn test_cardset_title_rejects_reserved_prefix() {
        assert!(Cardset::new(CollectionId(1), "Stats of things", "ann", "x").is_err());
        assert!(Cardset::new(CollectionId(1), "Capital cities", "ann", "x").is_ok());
    }

    #[test]
    fn test_all_ids_pairs_collection_with_rows() {
        let sheet = Factsheet::from_rows(
            "capitals",
            vec!["country".into(), "capital".into()],
            vec![
                vec!["France".into(), "Paris".into()],
                vec!["Japan".into(), "Tokyo".into()],
            ],
            Utc::now(),
        )
        .unwrap();
        let cardset = Cardset::new(CollectionId(9), "Capital cities", "ann", "capitals").unwrap();

        let ids = cardset.all_ids(&sheet);
        assert_eq!(ids.len(), 2);
        assert_eq!(ids[0].key(), format!("9-{}", row_id_for("France")));
    }
}
