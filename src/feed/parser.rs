use anyhow::Result;
use chrono::{DateTime, Utc};
use feed_rs::parser;
use sha2::{Digest, Sha256};

use super::model::Enclosure;

/// Channel fields and entries read from an existing feed document.
#[derive(Debug, Clone)]
pub struct ParsedFeed {
    pub title: Option<String>,
    pub description: Option<String>,
    pub pub_date: Option<DateTime<Utc>>,
    pub entries: Vec<ParsedEntry>,
}

#[derive(Debug, Clone)]
pub struct ParsedEntry {
    pub guid: String,
    pub title: String,
    pub description: String,
    pub link: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub enclosure: Option<Enclosure>,
}

/// Parses an RSS, Atom or JSON feed document.
///
/// Any document `feed-rs` rejects is an error; the caller treats that as
/// fatal rather than starting a fresh feed over the unreadable one.
pub fn parse_existing(bytes: &[u8]) -> Result<ParsedFeed> {
    let feed = parser::parse(bytes)?;

    let entries: Vec<ParsedEntry> = feed
        .entries
        .into_iter()
        .map(|entry| {
            let link = entry.links.first().map(|l| l.href.clone());
            let date = entry.published.or(entry.updated);
            let description = entry
                .summary
                .map(|s| s.content)
                .or_else(|| entry.content.and_then(|c| c.body))
                .unwrap_or_default();
            let title = entry
                .title
                .map(|t| t.content)
                .unwrap_or_else(|| "Untitled".to_string());

            let enclosure = entry
                .media
                .iter()
                .flat_map(|m| m.content.iter())
                .find_map(|c| {
                    c.url.as_ref().map(|url| Enclosure {
                        url: url.to_string(),
                        length: c.size.unwrap_or(0),
                        mime_type: c
                            .content_type
                            .as_ref()
                            .map(|m| m.to_string())
                            .unwrap_or_default(),
                    })
                });

            let existing_id = if entry.id.is_empty() {
                None
            } else {
                Some(entry.id.as_str())
            };
            let guid = generate_guid(existing_id, link.as_deref(), &title, date);

            ParsedEntry {
                guid,
                title,
                description,
                link,
                date,
                enclosure,
            }
        })
        .collect();

    Ok(ParsedFeed {
        title: feed.title.map(|t| t.content),
        description: feed.description.map(|t| t.content),
        pub_date: feed.published.or(feed.updated),
        entries,
    })
}

/// Returns the trimmed existing id, or a SHA-256 of `link|title|timestamp`.
pub(crate) fn generate_guid(
    existing: Option<&str>,
    link: Option<&str>,
    title: &str,
    date: Option<DateTime<Utc>>,
) -> String {
    if let Some(guid) = existing {
        let trimmed = guid.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let input = format!(
        "{}|{}|{}",
        link.unwrap_or(""),
        title,
        date.map(|d| d.timestamp().to_string()).unwrap_or_default()
    );
    let hash = Sha256::digest(input.as_bytes());
    format!("{:x}", hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PODCAST_RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:itunes="http://www.itunes.com/dtds/podcast-1.0.dtd">
  <channel>
    <title>Morning Show</title>
    <description>Daily episodes</description>
    <link>https://example.com</link>
    <pubDate>Mon, 05 Oct 2026 08:00:00 GMT</pubDate>
    <item>
      <title>Episode 2</title>
      <description>Second</description>
      <link>https://example.com/ep2.mp3</link>
      <guid isPermaLink="false">ep-2</guid>
      <pubDate>Tue, 06 Oct 2026 08:00:00 GMT</pubDate>
      <enclosure url="https://example.com/ep2.mp3" length="2048" type="audio/mpeg"/>
    </item>
    <item>
      <title>Episode 1</title>
      <link>https://example.com/ep1.mp3</link>
      <guid>ep-1</guid>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn test_parse_channel_meta() {
        let feed = parse_existing(PODCAST_RSS.as_bytes()).unwrap();
        assert_eq!(feed.title.as_deref(), Some("Morning Show"));
        assert_eq!(feed.description.as_deref(), Some("Daily episodes"));
        assert!(feed.pub_date.is_some());
        assert_eq!(feed.entries.len(), 2);
    }

    #[test]
    fn test_parse_entry_with_enclosure() {
        let feed = parse_existing(PODCAST_RSS.as_bytes()).unwrap();
        let ep2 = &feed.entries[0];
        assert_eq!(ep2.guid, "ep-2");
        assert_eq!(ep2.title, "Episode 2");
        assert_eq!(ep2.description, "Second");
        assert_eq!(ep2.link.as_deref(), Some("https://example.com/ep2.mp3"));
        assert!(ep2.date.is_some());

        let enclosure = ep2.enclosure.as_ref().expect("enclosure should be parsed");
        assert_eq!(enclosure.url, "https://example.com/ep2.mp3");
        assert_eq!(enclosure.length, 2048);
        assert_eq!(enclosure.mime_type, "audio/mpeg");
    }

    #[test]
    fn test_parse_entry_without_enclosure() {
        let feed = parse_existing(PODCAST_RSS.as_bytes()).unwrap();
        let ep1 = &feed.entries[1];
        assert_eq!(ep1.guid, "ep-1");
        assert_eq!(ep1.description, "");
        assert!(ep1.enclosure.is_none());
    }

    #[test]
    fn test_parse_empty_channel() {
        let feed = parse_existing(
            br#"<?xml version="1.0"?><rss version="2.0"><channel></channel></rss>"#,
        )
        .unwrap();
        assert!(feed.entries.is_empty());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_existing(b"<not valid xml").is_err());
        assert!(parse_existing(b"").is_err());
    }

    #[test]
    fn test_generate_guid_prefers_existing() {
        assert_eq!(generate_guid(Some("  abc  "), None, "t", None), "abc");
    }

    #[test]
    fn test_generate_guid_hash_is_stable() {
        let a = generate_guid(None, Some("https://e.com/a"), "A", None);
        let b = generate_guid(Some(""), Some("https://e.com/a"), "A", None);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, generate_guid(None, Some("https://e.com/b"), "A", None));
    }
}
