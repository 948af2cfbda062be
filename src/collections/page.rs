//! Page kinds and their validation
//!
//! Lists, card templates and scheduler pages are authored as raw text. Each
//! kind validates its own content; dispatch is on the explicit kind tag.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::Factsheet;
use crate::error::{CardboxError, Result};
use crate::study::SchedulePolicy;

static CARD_FRONT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<!--FRONT-->(.*?)<!--/FRONT-->").expect("valid regex"));

static CARD_BACK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<!--BACK-->(.*?)<!--/BACK-->").expect("valid regex"));

static VARIABLE_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{([a-z0-9_]+)\}\}").expect("valid regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageKind {
    List,
    Template,
    Scheduler,
}

impl fmt::Display for PageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PageKind::List => "list",
            PageKind::Template => "template",
            PageKind::Scheduler => "scheduler",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for PageKind {
    type Err = CardboxError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "list" => Ok(PageKind::List),
            "template" => Ok(PageKind::Template),
            "scheduler" => Ok(PageKind::Scheduler),
            other => Err(CardboxError::InvalidPage(format!("unknown page kind '{}'", other))),
        }
    }
}

/// Field names a card template shows on each side
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TemplateFields {
    pub front: Vec<String>,
    /// Fields on the back that are not already on the front
    pub back: Vec<String>,
}

impl TemplateFields {
    pub fn all(&self) -> impl Iterator<Item = &String> {
        self.front.iter().chain(self.back.iter())
    }
}

/// Validated content of a page
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedPage {
    List(Factsheet),
    Template(TemplateFields),
    Scheduler(SchedulePolicy),
}

impl PageKind {
    /// Validate `raw` as a page of this kind
    pub fn validate(self, name: &str, raw: &str) -> Result<ParsedPage> {
        match self {
            PageKind::List => {
                Factsheet::parse(name, raw, chrono::Utc::now()).map(ParsedPage::List)
            }
            PageKind::Template => parse_template(raw).map(ParsedPage::Template),
            PageKind::Scheduler => SchedulePolicy::from_name(raw.trim())
                .map(ParsedPage::Scheduler)
                .map_err(|e| CardboxError::InvalidPage(e.to_string())),
        }
    }
}

fn parse_template(raw: &str) -> Result<TemplateFields> {
    let section = |re: &Regex, label: &str| -> Result<Vec<String>> {
        let body = re
            .captures(raw)
            .and_then(|c| c.get(1))
            .ok_or_else(|| CardboxError::InvalidPage(format!("template has no {} section", label)))?;
        let mut fields = Vec::new();
        for capture in VARIABLE_TAG.captures_iter(body.as_str()) {
            let field = capture[1].to_string();
            if !fields.contains(&field) {
                fields.push(field);
            }
        }
        Ok(fields)
    };

    let front = section(&CARD_FRONT, "front")?;
    let back = section(&CARD_BACK, "back")?
        .into_iter()
        .filter(|field| !front.contains(field))
        .collect();

    Ok(TemplateFields { front, back })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEMPLATE: &str = r#"
<div class="card">
<!--FRONT--><h1>{{question}}</h1><small>{{hint}}</small><!--/FRONT-->
<!--BACK-->
  <h1>{{question}}</h1>
  <p>{{answer}}</p>
<!--/BACK-->
</div>
"#;

    #[test]
    fn test_template_fields() {
        let ParsedPage::Template(fields) = PageKind::Template.validate("basic", TEMPLATE).unwrap()
        else {
            panic!("expected template");
        };
        assert_eq!(fields.front, vec!["question", "hint"]);
        assert_eq!(fields.back, vec!["answer"]);
        assert_eq!(fields.all().count(), 3);
    }

    #[test]
    fn test_template_without_back_is_invalid() {
        let raw = "<!--FRONT-->{{a}}<!--/FRONT-->";
        assert!(PageKind::Template.validate("half", raw).is_err());
    }

    #[test]
    fn test_scheduler_page_names_a_policy() {
        let parsed = PageKind::Scheduler.validate("fast", " exponential\n").unwrap();
        assert_eq!(parsed, ParsedPage::Scheduler(SchedulePolicy::Exponential));

        let err = PageKind::Scheduler.validate("evil", "__import__('os')").unwrap_err();
        assert!(matches!(err, CardboxError::InvalidPage(_)));
    }

    #[test]
    fn test_list_page_parses_factsheet() {
        let raw = "columns: [a, b]\nrows:\n  - [x, y]\n";
        let ParsedPage::List(sheet) = PageKind::List.validate("letters", raw).unwrap() else {
            panic!("expected list");
        };
        assert_eq!(sheet.len(), 1);
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!("template".parse::<PageKind>().unwrap(), PageKind::Template);
        assert!("page".parse::<PageKind>().is_err());
        assert_eq!(PageKind::Scheduler.to_string(), "scheduler");
    }
}
