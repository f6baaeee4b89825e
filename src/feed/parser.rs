use rss::Channel;
use thiserror::Error;

/// One `<item>` of a fetched RSS document, before any normalization.
///
/// Missing elements are empty strings. `published` is the raw `<pubDate>`
/// text, left for the date normalizer to interpret.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Entry {
    pub title: String,
    pub link: String,
    pub description: String,
    pub published: String,
}

#[derive(Debug, Error)]
pub enum ParseError {
    /// The body is not well-formed XML, or ends early.
    #[error("XML parse error: {0}")]
    Xml(String),

    /// Well-formed XML whose root is not `<rss>`.
    #[error("document is not an RSS feed")]
    NotRss,
}

impl From<rss::Error> for ParseError {
    fn from(err: rss::Error) -> Self {
        match err {
            rss::Error::InvalidStartTag => ParseError::NotRss,
            other => ParseError::Xml(other.to_string()),
        }
    }
}

impl From<&rss::Item> for Entry {
    fn from(item: &rss::Item) -> Self {
        let text = |value: Option<&str>| value.unwrap_or_default().to_string();
        Entry {
            title: text(item.title()),
            link: text(item.link()),
            description: text(item.description()),
            published: text(item.pub_date()),
        }
    }
}

/// Parses an RSS document into its items, in document order.
///
/// Only `title`, `link`, `description` and `pubDate` are kept; the date is
/// left as written. Namespaced elements are ignored.
pub fn parse_entries(bytes: &[u8]) -> Result<Vec<Entry>, ParseError> {
    let channel = Channel::read_from(bytes)?;
    Ok(channel.items().iter().map(Entry::from).collect())
}
