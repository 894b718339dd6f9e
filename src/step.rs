//! Workflow step parameters.
//!
//! The workflow host hands every parameter over as a list of strings (a
//! single value may also arrive as a bare string or number). Scalar
//! parameters use the first value; item parameters are parallel lists
//! indexed by position in `item_link`.
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use thiserror::Error;

use crate::util::{strip_control_chars, validate_media_url, UrlValidationError};

#[derive(Debug, Error)]
pub enum InputError {
    #[error("Invalid step input JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Missing required parameter: {0}")]
    Missing(&'static str),

    #[error("Missing {field} for item {index}")]
    MissingItemField { field: &'static str, index: usize },

    #[error("Invalid item_length for item {index}: {value:?} is not a byte count")]
    InvalidLength { index: usize, value: String },

    #[error("Invalid item_link for item {index}: {source}")]
    InvalidLink {
        index: usize,
        #[source]
        source: UrlValidationError,
    },

    #[error("No items to add: item_link is empty")]
    NoItems,
}

/// Raw step parameters as supplied by the workflow host or the CLI.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StepInput {
    #[serde(deserialize_with = "first_value")]
    pub file: Option<String>,
    #[serde(deserialize_with = "first_value")]
    pub feed_title: Option<String>,
    #[serde(deserialize_with = "first_value")]
    pub feed_description: Option<String>,
    #[serde(deserialize_with = "first_value")]
    pub site_url: Option<String>,
    #[serde(deserialize_with = "all_values")]
    pub item_title: Vec<String>,
    #[serde(deserialize_with = "all_values")]
    pub item_content: Vec<String>,
    #[serde(deserialize_with = "all_values")]
    pub item_link: Vec<String>,
    #[serde(deserialize_with = "all_values")]
    pub item_length: Vec<String>,
    #[serde(deserialize_with = "all_values")]
    pub item_type: Vec<String>,
}

/// One item to append, after validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewItem {
    pub title: String,
    pub content: String,
    pub link: String,
    pub length: u64,
    pub mime_type: String,
}

/// Validated parameters for one feed update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateRequest {
    /// Storage path, always starting with `/`
    pub file: String,
    pub feed_title: String,
    pub feed_description: String,
    pub site_url: Option<String>,
    pub items: Vec<NewItem>,
}

impl StepInput {
    pub fn from_json(json: &str) -> Result<Self, InputError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Checks every parameter and pairs up the item lists.
    ///
    /// Fails on the first problem found; nothing is partially accepted.
    pub fn validate(&self) -> Result<UpdateRequest, InputError> {
        let file = non_blank(self.file.as_deref()).ok_or(InputError::Missing("file"))?;
        let file = if file.starts_with('/') {
            file.to_string()
        } else {
            format!("/{file}")
        };

        let feed_title =
            non_blank(self.feed_title.as_deref()).ok_or(InputError::Missing("feed_title"))?;
        let feed_description = self.feed_description.as_deref().unwrap_or("").trim();
        let site_url = non_blank(self.site_url.as_deref()).map(str::to_string);

        Ok(UpdateRequest {
            file,
            feed_title: strip_control_chars(feed_title).into_owned(),
            feed_description: strip_control_chars(feed_description).into_owned(),
            site_url,
            items: self.new_items()?,
        })
    }

    /// Builds one [`NewItem`] per `item_link` entry.
    ///
    /// `item_type` is broadcast when it holds a single value.
    pub fn new_items(&self) -> Result<Vec<NewItem>, InputError> {
        if self.item_link.is_empty() {
            return Err(InputError::NoItems);
        }

        self.item_link
            .iter()
            .enumerate()
            .map(|(index, link)| -> Result<NewItem, InputError> {
                let link = link.trim();
                validate_media_url(link)
                    .map_err(|source| InputError::InvalidLink { index, source })?;

                let title = non_blank(self.item_title.get(index).map(String::as_str)).ok_or(
                    InputError::MissingItemField {
                        field: "item_title",
                        index,
                    },
                )?;
                let content = self.item_content.get(index).map(String::as_str).unwrap_or("");

                let raw_length = self
                    .item_length
                    .get(index)
                    .filter(|v| !v.trim().is_empty())
                    .ok_or(InputError::MissingItemField {
                        field: "item_length",
                        index,
                    })?;
                let length = raw_length
                    .trim()
                    .parse::<u64>()
                    .map_err(|_| InputError::InvalidLength {
                        index,
                        value: raw_length.clone(),
                    })?;

                let mime_type = if self.item_type.len() == 1 {
                    self.item_type.first()
                } else {
                    self.item_type.get(index)
                };
                let mime_type = non_blank(mime_type.map(String::as_str)).ok_or(
                    InputError::MissingItemField {
                        field: "item_type",
                        index,
                    },
                )?;

                Ok(NewItem {
                    title: strip_control_chars(title).into_owned(),
                    content: strip_control_chars(content).into_owned(),
                    link: link.to_string(),
                    length,
                    mime_type: mime_type.to_string(),
                })
            })
            .collect()
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Flattens a JSON scalar or array of scalars into strings.
fn values_from_json<E: serde::de::Error>(value: Value) -> Result<Vec<String>, E> {
    fn scalar<E: serde::de::Error>(value: Value) -> Result<Option<String>, E> {
        match value {
            Value::Null => Ok(None),
            Value::String(s) => Ok(Some(s)),
            Value::Number(n) => Ok(Some(n.to_string())),
            other => Err(E::custom(format!(
                "expected a string or number, found {other}"
            ))),
        }
    }

    match value {
        // Lists are matched by position, so a null keeps its slot as ""
        Value::Array(items) => items
            .into_iter()
            .map(|v| scalar::<E>(v).map(Option::unwrap_or_default))
            .collect(),
        other => Ok(scalar::<E>(other)?.into_iter().collect()),
    }
}

fn all_values<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    values_from_json(value)
}

fn first_value<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(values_from_json::<D::Error>(value)?.into_iter().next())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn input() -> StepInput {
        StepInput {
            file: Some("podcast/feed.xml".into()),
            feed_title: Some("Morning Show".into()),
            feed_description: Some("Daily".into()),
            site_url: None,
            item_title: vec!["Ep 1".into(), "Ep 2".into()],
            item_content: vec!["First".into()],
            item_link: vec![
                "https://cdn.example.com/ep1.mp3".into(),
                "https://cdn.example.com/ep2.mp3".into(),
            ],
            item_length: vec!["1000".into(), " 2000 ".into()],
            item_type: vec!["audio/mpeg".into()],
        }
    }

    #[test]
    fn test_validate_pairs_items_by_index() {
        let request = input().validate().unwrap();
        assert_eq!(request.file, "/podcast/feed.xml");
        assert_eq!(request.feed_title, "Morning Show");
        assert_eq!(
            request.items,
            vec![
                NewItem {
                    title: "Ep 1".into(),
                    content: "First".into(),
                    link: "https://cdn.example.com/ep1.mp3".into(),
                    length: 1000,
                    mime_type: "audio/mpeg".into(),
                },
                NewItem {
                    title: "Ep 2".into(),
                    content: String::new(),
                    link: "https://cdn.example.com/ep2.mp3".into(),
                    length: 2000,
                    mime_type: "audio/mpeg".into(),
                },
            ]
        );
    }

    #[test]
    fn test_item_type_indexed_when_multiple() {
        let mut step = input();
        step.item_type = vec!["audio/mpeg".into(), "audio/x-m4a".into()];
        let items = step.new_items().unwrap();
        assert_eq!(items[0].mime_type, "audio/mpeg");
        assert_eq!(items[1].mime_type, "audio/x-m4a");
    }

    #[test]
    fn test_item_type_missing_for_index() {
        let mut step = input();
        step.item_link.push("https://cdn.example.com/ep3.mp3".into());
        step.item_title.push("Ep 3".into());
        step.item_length.push("3".into());
        step.item_type = vec!["audio/mpeg".into(), "audio/mpeg".into()];
        assert!(matches!(
            step.new_items(),
            Err(InputError::MissingItemField { field: "item_type", index: 2 })
        ));
    }

    #[test]
    fn test_missing_file_and_title() {
        let mut step = input();
        step.file = Some("  ".into());
        assert!(matches!(step.validate(), Err(InputError::Missing("file"))));

        let mut step = input();
        step.feed_title = None;
        assert!(matches!(step.validate(), Err(InputError::Missing("feed_title"))));
    }

    #[test]
    fn test_no_links_is_an_error() {
        let mut step = input();
        step.item_link.clear();
        assert!(matches!(step.validate(), Err(InputError::NoItems)));
    }

    #[test]
    fn test_bad_length_rejected() {
        let mut step = input();
        step.item_length[1] = "12abc".into();
        match step.new_items() {
            Err(InputError::InvalidLength { index, value }) => {
                assert_eq!(index, 1);
                assert_eq!(value, "12abc");
            }
            other => panic!("Expected InvalidLength, got {:?}", other),
        }

        let mut step = input();
        step.item_length.truncate(1);
        assert!(matches!(
            step.new_items(),
            Err(InputError::MissingItemField { field: "item_length", index: 1 })
        ));
    }

    #[test]
    fn test_bad_link_rejected() {
        let mut step = input();
        step.item_link[0] = "file:///etc/passwd".into();
        assert!(matches!(
            step.new_items(),
            Err(InputError::InvalidLink { index: 0, .. })
        ));
    }

    #[test]
    fn test_missing_title_rejected() {
        let mut step = input();
        step.item_title.truncate(1);
        assert!(matches!(
            step.new_items(),
            Err(InputError::MissingItemField { field: "item_title", index: 1 })
        ));
    }

    #[test]
    fn test_from_json_accepts_lists_scalars_and_numbers() {
        let json = r#"{
            "file": ["/feed.xml"],
            "feed_title": "Morning Show",
            "feed_description": ["Daily", "ignored"],
            "item_title": ["Ep 1"],
            "item_link": "https://cdn.example.com/ep1.mp3",
            "item_length": [4096],
            "item_type": ["audio/mpeg"],
            "unrelated": true
        }"#;

        let step = StepInput::from_json(json).unwrap();
        assert_eq!(step.file.as_deref(), Some("/feed.xml"));
        assert_eq!(step.feed_description.as_deref(), Some("Daily"));
        assert_eq!(step.item_link, vec!["https://cdn.example.com/ep1.mp3"]);
        assert_eq!(step.item_length, vec!["4096"]);
        assert!(step.item_content.is_empty());

        let request = step.validate().unwrap();
        assert_eq!(request.items[0].length, 4096);
    }

    #[test]
    fn test_from_json_null_keeps_item_positions() {
        let json = r#"{
            "file": "/feed.xml",
            "feed_title": "Morning Show",
            "item_title": ["Ep 1", "Ep 2"],
            "item_content": [null, "second body"],
            "item_link": ["https://cdn.example.com/ep1.mp3", "https://cdn.example.com/ep2.mp3"],
            "item_length": [null, 2048],
            "item_type": ["audio/mpeg"]
        }"#;

        let step = StepInput::from_json(json).unwrap();
        assert_eq!(step.item_content, vec!["", "second body"]);

        // A null length is reported against its own item
        assert!(matches!(
            step.new_items(),
            Err(InputError::MissingItemField { field: "item_length", index: 0 })
        ));

        let mut step = step;
        step.item_length[0] = "1024".into();
        let items = step.new_items().unwrap();
        assert_eq!(items[0].content, "");
        assert_eq!(items[1].content, "second body");
        assert_eq!(items[1].length, 2048);
    }

    #[test]
    fn test_link_published_as_given() {
        let mut step = input();
        step.item_link[0] = "  https://cdn.example.com  ".into();
        step.item_link[1] = "https://cdn.example.com/Ep%202.mp3?x=a b".into();
        let items = step.new_items().unwrap();
        assert_eq!(items[0].link, "https://cdn.example.com");
        assert_eq!(items[1].link, "https://cdn.example.com/Ep%202.mp3?x=a b");
    }

    #[test]
    fn test_from_json_rejects_objects() {
        let err = StepInput::from_json(r#"{"item_link": [{"url": "x"}]}"#).unwrap_err();
        assert!(matches!(err, InputError::Json(_)));
    }
}
