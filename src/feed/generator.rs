use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io::Cursor;

use super::model::{FeedItem, FeedState};
use crate::util::strip_control_chars;

const ITUNES_NS: &str = "http://www.itunes.com/dtds/podcast-1.0.dtd";
const ATOM_NS: &str = "http://www.w3.org/2005/Atom";
const DC_NS: &str = "http://purl.org/dc/elements/1.1/";
const GENERATOR: &str = concat!("castfeed ", env!("CARGO_PKG_VERSION"));

/// Formats a timestamp the way RSS `pubDate` expects (RFC 822, GMT).
pub fn rss_date(date: &DateTime<Utc>) -> String {
    date.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Serializes the feed state as an RSS 2.0 document with iTunes extensions.
///
/// Items are written in [`FeedState::items`] order, so new items lead.
/// `built_at` becomes the channel's `lastBuildDate`.
pub fn render(state: &FeedState, built_at: DateTime<Utc>) -> Result<String> {
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);
    let meta = &state.meta;

    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .context("Failed to write XML declaration")?;

    // <rss version="2.0" xmlns:...>
    let mut rss = BytesStart::new("rss");
    rss.push_attribute(("version", "2.0"));
    rss.push_attribute(("xmlns:itunes", ITUNES_NS));
    rss.push_attribute(("xmlns:atom", ATOM_NS));
    rss.push_attribute(("xmlns:dc", DC_NS));
    writer
        .write_event(Event::Start(rss))
        .context("Failed to write rss element")?;
    writer
        .write_event(Event::Start(BytesStart::new("channel")))
        .context("Failed to write channel element")?;

    text_element(&mut writer, "title", &meta.title)?;
    text_element(&mut writer, "description", &meta.description)?;
    if let Some(link) = meta.site_url.as_deref().or(meta.feed_url.as_deref()) {
        text_element(&mut writer, "link", link)?;
    }
    if let Some(ref feed_url) = meta.feed_url {
        writer
            .create_element("atom:link")
            .with_attribute(("href", feed_url.as_str()))
            .with_attribute(("rel", "self"))
            .with_attribute(("type", "application/rss+xml"))
            .write_empty()
            .context("Failed to write atom:link element")?;
    }
    text_element(&mut writer, "language", &meta.language)?;
    text_element(&mut writer, "pubDate", &rss_date(&meta.pub_date))?;
    text_element(&mut writer, "lastBuildDate", &rss_date(&built_at))?;
    text_element(&mut writer, "generator", GENERATOR)?;
    if let Some(ref author) = meta.author {
        text_element(&mut writer, "managingEditor", author)?;
    }

    if let Some(ref image_url) = meta.image_url {
        writer
            .write_event(Event::Start(BytesStart::new("image")))
            .context("Failed to write image element")?;
        text_element(&mut writer, "url", image_url)?;
        text_element(&mut writer, "title", &meta.title)?;
        if let Some(ref link) = meta.site_url {
            text_element(&mut writer, "link", link)?;
        }
        writer
            .write_event(Event::End(BytesEnd::new("image")))
            .context("Failed to write image end")?;
    }

    let itunes = &meta.itunes;
    optional_text(&mut writer, "itunes:author", itunes.author.as_deref())?;
    optional_text(&mut writer, "itunes:subtitle", itunes.subtitle.as_deref())?;
    optional_text(&mut writer, "itunes:summary", itunes.summary.as_deref())?;
    text_element(&mut writer, "itunes:explicit", bool_text(itunes.explicit))?;
    if let Some(ref image) = itunes.image {
        itunes_image(&mut writer, image)?;
    }

    for item in state.items() {
        write_item(&mut writer, item)?;
    }

    writer
        .write_event(Event::End(BytesEnd::new("channel")))
        .context("Failed to write channel end")?;
    writer
        .write_event(Event::End(BytesEnd::new("rss")))
        .context("Failed to write rss end")?;

    let result = writer.into_inner().into_inner();
    String::from_utf8(result).context("Generated feed contains invalid UTF-8")
}

fn write_item<W: std::io::Write>(writer: &mut Writer<W>, item: &FeedItem) -> Result<()> {
    writer
        .write_event(Event::Start(BytesStart::new("item")))
        .context("Failed to write item element")?;

    text_element(writer, "title", &item.title)?;
    text_element(writer, "description", &item.description)?;
    optional_text(writer, "link", item.link.as_deref())?;

    let guid = strip_control_chars(&item.guid);
    writer
        .create_element("guid")
        .with_attribute(("isPermaLink", "false"))
        .write_text_content(BytesText::new(&guid))
        .context("Failed to write guid element")?;

    optional_text(writer, "dc:creator", item.author.as_deref())?;
    text_element(writer, "pubDate", &rss_date(&item.date))?;

    if let Some(ref enclosure) = item.enclosure {
        let length = enclosure.length.to_string();
        writer
            .create_element("enclosure")
            .with_attribute(("url", enclosure.url.as_str()))
            .with_attribute(("length", length.as_str()))
            .with_attribute(("type", enclosure.mime_type.as_str()))
            .write_empty()
            .context("Failed to write enclosure element")?;
    }

    let itunes = &item.itunes;
    optional_text(writer, "itunes:author", itunes.author.as_deref())?;
    optional_text(writer, "itunes:subtitle", itunes.subtitle.as_deref())?;
    text_element(writer, "itunes:explicit", bool_text(itunes.explicit))?;
    if let Some(duration) = itunes.duration {
        text_element(writer, "itunes:duration", &duration.to_string())?;
    }
    if let Some(ref image) = itunes.image {
        itunes_image(writer, image)?;
    }

    writer
        .write_event(Event::End(BytesEnd::new("item")))
        .context("Failed to write item end")?;
    Ok(())
}

fn text_element<W: std::io::Write>(writer: &mut Writer<W>, name: &str, text: &str) -> Result<()> {
    let clean = strip_control_chars(text);
    writer
        .create_element(name)
        .write_text_content(BytesText::new(&clean))
        .with_context(|| format!("Failed to write {name} element"))?;
    Ok(())
}

fn optional_text<W: std::io::Write>(
    writer: &mut Writer<W>,
    name: &str,
    text: Option<&str>,
) -> Result<()> {
    match text {
        Some(text) => text_element(writer, name, text),
        None => Ok(()),
    }
}

fn itunes_image<W: std::io::Write>(writer: &mut Writer<W>, href: &str) -> Result<()> {
    writer
        .create_element("itunes:image")
        .with_attribute(("href", href))
        .write_empty()
        .context("Failed to write itunes:image element")?;
    Ok(())
}

fn bool_text(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}
