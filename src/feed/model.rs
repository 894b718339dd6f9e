use chrono::{DateTime, Utc};

/// iTunes podcast fields written on the channel.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ItunesChannel {
    pub author: Option<String>,
    pub summary: Option<String>,
    pub subtitle: Option<String>,
    pub explicit: bool,
    pub image: Option<String>,
}

/// iTunes podcast fields written on each item.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ItunesItem {
    pub author: Option<String>,
    pub subtitle: Option<String>,
    pub explicit: bool,
    /// Episode duration in seconds
    pub duration: Option<u64>,
    pub image: Option<String>,
}

/// Channel-level metadata of a feed.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelMeta {
    pub title: String,
    pub description: String,
    /// Public URL of the feed file itself, when known
    pub feed_url: Option<String>,
    pub site_url: Option<String>,
    pub image_url: Option<String>,
    pub language: String,
    pub author: Option<String>,
    pub pub_date: DateTime<Utc>,
    pub itunes: ItunesChannel,
}

/// Media attachment of an item (the podcast episode file).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enclosure {
    pub url: String,
    /// Size in bytes
    pub length: u64,
    pub mime_type: String,
}

/// One entry of the feed.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedItem {
    pub guid: String,
    pub title: String,
    pub description: String,
    pub link: Option<String>,
    pub author: Option<String>,
    pub date: DateTime<Utc>,
    pub enclosure: Option<Enclosure>,
    pub itunes: ItunesItem,
}

/// Transient state of one feed update.
///
/// Built either from a parsed existing feed or from scratch, extended with
/// new items, serialized, and dropped once the upload completes.
#[derive(Debug, Clone)]
pub struct FeedState {
    pub meta: ChannelMeta,
    pub existing_items: Vec<FeedItem>,
    pub new_items: Vec<FeedItem>,
}

impl FeedState {
    pub fn new(meta: ChannelMeta, existing_items: Vec<FeedItem>) -> Self {
        Self {
            meta,
            existing_items,
            new_items: Vec::new(),
        }
    }

    /// Items in output order: new items first, then the existing ones.
    pub fn items(&self) -> impl Iterator<Item = &FeedItem> {
        self.new_items.iter().chain(self.existing_items.iter())
    }

    pub fn item_count(&self) -> usize {
        self.new_items.len() + self.existing_items.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(guid: &str) -> FeedItem {
        FeedItem {
            guid: guid.to_string(),
            title: guid.to_string(),
            description: String::new(),
            link: None,
            author: None,
            date: Utc::now(),
            enclosure: None,
            itunes: ItunesItem::default(),
        }
    }

    #[test]
    fn test_new_items_come_first() {
        let meta = ChannelMeta {
            title: "T".into(),
            description: "D".into(),
            feed_url: None,
            site_url: None,
            image_url: None,
            language: "en".into(),
            author: None,
            pub_date: Utc::now(),
            itunes: ItunesChannel::default(),
        };
        let mut state = FeedState::new(meta, vec![item("old-1"), item("old-2")]);
        state.new_items.push(item("new-1"));

        let order: Vec<&str> = state.items().map(|i| i.guid.as_str()).collect();
        assert_eq!(order, vec!["new-1", "old-1", "old-2"]);
        assert_eq!(state.item_count(), 3);
    }
}
