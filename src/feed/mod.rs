//! Podcast feed reading, modelling and writing.
//!
//! - [`model`] - The transient [`FeedState`] and its channel/item types
//! - [`parser`] - Reads an existing feed document using the `feed-rs` crate
//! - [`generator`] - Writes RSS 2.0 with iTunes extensions using `quick-xml`

pub mod generator;
pub mod model;
pub mod parser;

pub use generator::{render, rss_date};
pub use model::{ChannelMeta, Enclosure, FeedItem, FeedState, ItunesChannel, ItunesItem};
pub use parser::{parse_existing, ParsedEntry, ParsedFeed};
