//! Appends items to a stored feed: read or create, extend, serialize, upload.
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::config::{ChannelDefaults, Config};
use crate::feed::parser::generate_guid;
use crate::feed::{
    parse_existing, render, ChannelMeta, Enclosure, FeedItem, FeedState, ItunesChannel,
    ItunesItem, ParsedEntry, ParsedFeed,
};
use crate::step::{InputError, NewItem, StepInput, UpdateRequest};
use crate::storage::{
    ChunkedUpload, ObjectStore, StorageError, UploadSummary, DEFAULT_PART_THRESHOLD,
    DEFAULT_WRITE_CHUNK,
};
use crate::util::is_placeholder_title;

/// Terminal failure of a feed update. Nothing is retried.
#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("Invalid input: {0}")]
    Input(#[from] InputError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// The file exists but is not a readable feed
    #[error("Failed to parse existing feed {path}: {message}")]
    Parse { path: String, message: String },

    #[error("Failed to generate feed XML: {0}")]
    Generate(String),
}

/// Tunables for one update, usually derived from [`Config`].
#[derive(Debug, Clone)]
pub struct UpdateSettings {
    pub channel: ChannelDefaults,
    pub chunk_threshold: usize,
    pub write_chunk: usize,
}

impl Default for UpdateSettings {
    fn default() -> Self {
        Self {
            channel: ChannelDefaults::default(),
            chunk_threshold: DEFAULT_PART_THRESHOLD,
            write_chunk: DEFAULT_WRITE_CHUNK,
        }
    }
}

impl From<&Config> for UpdateSettings {
    fn from(config: &Config) -> Self {
        Self {
            channel: config.channel.clone(),
            chunk_threshold: config.chunk_threshold_bytes,
            write_chunk: config.write_chunk_bytes,
        }
    }
}

/// Result of a successful update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateOutcome {
    /// Public URL of the feed file
    pub url: String,
    /// True when no feed existed and a new one was written
    pub created: bool,
    pub items_added: usize,
    pub total_items: usize,
    pub upload: UploadSummary,
}

/// Appends the input's items to the feed at `input.file`.
///
/// # Behavior
///
/// - A missing file starts a new feed from the input's title and description
/// - Any other read failure, and any parse failure, aborts the update
/// - New items are placed ahead of the existing ones
/// - The document is written back through a [`ChunkedUpload`]
/// - The returned URL is the one resolved while reading, or resolved after upload
pub async fn update_feed<S: ObjectStore + ?Sized>(
    store: &S,
    input: &StepInput,
    settings: &UpdateSettings,
) -> Result<UpdateOutcome, UpdateError> {
    update_feed_at(store, input, settings, Utc::now()).await
}

/// [`update_feed`] with an explicit clock.
pub async fn update_feed_at<S: ObjectStore + ?Sized>(
    store: &S,
    input: &StepInput,
    settings: &UpdateSettings,
    now: DateTime<Utc>,
) -> Result<UpdateOutcome, UpdateError> {
    let request = input.validate()?;

    let (mut state, created) = match read_existing(store, &request, &settings.channel, now).await? {
        Some(state) => (state, false),
        None => (create_state(&request, &settings.channel, now), true),
    };

    add_items(&mut state, &request.items, &settings.channel, now);
    tracing::debug!(
        file = %request.file,
        added = state.new_items.len(),
        existing = state.existing_items.len(),
        "Items added"
    );

    let upload = write_state(store, &request.file, &state, settings, now).await?;

    let url = match state.meta.feed_url.take() {
        Some(url) => url,
        None => store.public_url(&request.file).await?,
    };

    tracing::info!(
        file = %request.file,
        url = %url,
        created = created,
        added = state.new_items.len(),
        total = state.item_count(),
        bytes = upload.bytes,
        "Feed updated"
    );

    Ok(UpdateOutcome {
        url,
        created,
        items_added: state.new_items.len(),
        total_items: state.item_count(),
        upload,
    })
}

/// Reads and parses the stored feed. `Ok(None)` means the file does not exist.
async fn read_existing<S: ObjectStore + ?Sized>(
    store: &S,
    request: &UpdateRequest,
    channel: &ChannelDefaults,
    now: DateTime<Utc>,
) -> Result<Option<FeedState>, UpdateError> {
    let bytes = match store.read_file(&request.file).await {
        Ok(bytes) => bytes,
        Err(e) if e.is_not_found() => {
            tracing::info!(file = %request.file, "Feed file not found, creating a new feed");
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    };

    let parsed = parse_existing(&bytes).map_err(|e| UpdateError::Parse {
        path: request.file.clone(),
        message: e.to_string(),
    })?;
    tracing::debug!(
        file = %request.file,
        entries = parsed.entries.len(),
        "Parsed existing feed"
    );

    // The URL is resolved again after upload if this fails
    let feed_url = match store.public_url(&request.file).await {
        Ok(url) => Some(url),
        Err(e) => {
            tracing::warn!(file = %request.file, error = %e, "Could not resolve feed URL before upload");
            None
        }
    };

    Ok(Some(state_from_parsed(parsed, feed_url, request, channel, now)))
}

fn state_from_parsed(
    parsed: ParsedFeed,
    feed_url: Option<String>,
    request: &UpdateRequest,
    channel: &ChannelDefaults,
    now: DateTime<Utc>,
) -> FeedState {
    let title = parsed
        .title
        .filter(|t| !is_placeholder_title(t))
        .unwrap_or_else(|| request.feed_title.clone());
    let description = parsed
        .description
        .filter(|d| !is_placeholder_title(d))
        .unwrap_or_else(|| request.feed_description.clone());

    let mut meta = channel_meta(title, description, request, channel, parsed.pub_date.unwrap_or(now));
    meta.feed_url = feed_url;

    let existing = parsed
        .entries
        .into_iter()
        .map(|entry| existing_item(entry, channel, now))
        .collect();

    FeedState::new(meta, existing)
}

fn create_state(request: &UpdateRequest, channel: &ChannelDefaults, now: DateTime<Utc>) -> FeedState {
    let meta = channel_meta(
        request.feed_title.clone(),
        request.feed_description.clone(),
        request,
        channel,
        now,
    );
    FeedState::new(meta, Vec::new())
}

fn channel_meta(
    title: String,
    description: String,
    request: &UpdateRequest,
    channel: &ChannelDefaults,
    pub_date: DateTime<Utc>,
) -> ChannelMeta {
    ChannelMeta {
        title,
        description,
        feed_url: None,
        site_url: request.site_url.clone().or_else(|| channel.site_url.clone()),
        image_url: channel.image_url.clone(),
        language: channel.language.clone(),
        author: channel.author.clone(),
        pub_date,
        itunes: ItunesChannel {
            author: channel.author.clone(),
            summary: channel.summary.clone(),
            subtitle: channel.subtitle.clone(),
            explicit: channel.explicit,
            image: channel.image_url.clone(),
        },
    }
}

fn item_itunes(channel: &ChannelDefaults) -> ItunesItem {
    ItunesItem {
        author: channel.author.clone(),
        subtitle: channel.subtitle.clone(),
        explicit: channel.explicit,
        duration: channel.item_duration_secs,
        image: channel.image_url.clone(),
    }
}

fn existing_item(entry: ParsedEntry, channel: &ChannelDefaults, now: DateTime<Utc>) -> FeedItem {
    FeedItem {
        guid: entry.guid,
        title: entry.title,
        description: entry.description,
        link: entry.link,
        author: channel.author.clone(),
        date: entry.date.unwrap_or(now),
        enclosure: entry.enclosure.filter(|e| !e.url.is_empty()),
        itunes: item_itunes(channel),
    }
}

/// `position` keeps guids distinct when one run repeats a link and title.
fn new_item(
    item: &NewItem,
    position: usize,
    channel: &ChannelDefaults,
    now: DateTime<Utc>,
) -> FeedItem {
    let guid_key = format!("{}#{position}", item.title);
    FeedItem {
        guid: generate_guid(None, Some(&item.link), &guid_key, Some(now)),
        title: item.title.clone(),
        description: item.content.clone(),
        link: Some(item.link.clone()),
        author: channel.author.clone(),
        date: now,
        enclosure: Some(Enclosure {
            url: item.link.clone(),
            length: item.length,
            mime_type: item.mime_type.clone(),
        }),
        itunes: item_itunes(channel),
    }
}

fn add_items(state: &mut FeedState, items: &[NewItem], channel: &ChannelDefaults, now: DateTime<Utc>) {
    state
        .new_items
        .extend(
            items
                .iter()
                .enumerate()
                .map(|(position, item)| new_item(item, position, channel, now)),
        );
}

async fn write_state<S: ObjectStore + ?Sized>(
    store: &S,
    file: &str,
    state: &FeedState,
    settings: &UpdateSettings,
    now: DateTime<Utc>,
) -> Result<UploadSummary, UpdateError> {
    let xml = render(state, now).map_err(|e| UpdateError::Generate(e.to_string()))?;

    let mut upload = ChunkedUpload::with_threshold(store, file, settings.chunk_threshold);
    upload
        .write_all_chunked(xml.as_bytes(), settings.write_chunk)
        .await?;
    Ok(upload.finish().await?)
}
