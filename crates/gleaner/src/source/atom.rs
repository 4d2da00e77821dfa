//! Parser for the arXiv API's Atom feeds.
//!
//! The API answers both searches and id lookups with the same Atom document:
//!
//! ```xml
//! <feed xmlns="http://www.w3.org/2005/Atom">
//!   <opensearch:totalResults>1</opensearch:totalResults>
//!   <entry>
//!     <id>http://arxiv.org/abs/2306.01234v1</id>
//!     <published>2023-06-02T17:59:58Z</published>
//!     <title>A title</title>
//!     <summary>An abstract</summary>
//!     <author><name>Doe, J.</name></author>
//!     <link title="pdf" href="http://arxiv.org/pdf/2306.01234v1" rel="related"/>
//!     <arxiv:primary_category term="cs.LG"/>
//!     <category term="cs.LG"/>
//!   </entry>
//! </feed>
//! ```
//!
//! Elements are matched by local name, so namespace prefixes do not matter. Entries whose id
//! is not an arXiv abstract URL (the API reports query errors as such entries) are skipped.

use quick_xml::{
  events::{BytesStart, Event},
  Reader,
};

use super::*;

lazy_static! {
  /// Captures the short id from an abstract URL.
  static ref ABS_URL: Regex = Regex::new(r"arxiv\.org/abs/([^\s?#]+)$").unwrap();
}

/// One page of results.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Feed {
  /// Total number of results the query matches, across all pages
  pub total_results: usize,
  /// Number of `<entry>` elements on this page, including those that were dropped
  pub entry_count:   usize,
  /// The entries on this page, in feed order
  pub entries:       Vec<Entry>,
}

/// Fields collected while inside an `<entry>`.
#[derive(Debug, Default)]
struct EntryBuilder {
  /// Raw `<id>` text
  id:               String,
  /// Raw `<title>` text
  title:            String,
  /// Raw `<summary>` text
  summary:          String,
  /// Raw `<published>` text
  published:        String,
  /// `<author><name>` texts
  authors:          Vec<String>,
  /// `term` of `<arxiv:primary_category>`
  primary_category: Option<String>,
  /// `term` of each `<category>`
  categories:       Vec<String>,
  /// `href` of the PDF link
  pdf_url:          Option<String>,
}

/// Parses an Atom feed returned by the arXiv API.
pub fn parse_feed(xml: &str) -> Result<Feed> {
  let mut reader = Reader::from_str(xml);
  reader.config_mut().trim_text(true);

  let mut feed = Feed::default();
  let mut stack: Vec<String> = Vec::new();
  let mut current: Option<EntryBuilder> = None;

  loop {
    match reader.read_event()? {
      Event::Start(e) => {
        let name = local_name(&e);
        if name == "entry" {
          current = Some(EntryBuilder::default());
        } else if let Some(builder) = current.as_mut() {
          builder.attributes(&name, &e)?;
        }
        stack.push(name);
      },
      Event::Empty(e) =>
        if let Some(builder) = current.as_mut() {
          builder.attributes(&local_name(&e), &e)?;
        },
      Event::Text(e) => {
        let text = e.unescape().map_err(malformed)?;
        let Some(element) = stack.last().map(String::as_str) else { continue };
        match current.as_mut() {
          Some(builder) => builder.text(element, stack_parent(&stack), &text),
          None if element == "totalResults" =>
            feed.total_results = text.trim().parse().map_err(malformed)?,
          None => (),
        }
      },
      Event::End(_) =>
        if stack.pop().as_deref() == Some("entry") {
          feed.entry_count += 1;
          if let Some(entry) = current.take().and_then(EntryBuilder::build) {
            feed.entries.push(entry);
          }
        },
      Event::Eof => break,
      _ => (),
    }
  }

  Ok(feed)
}

impl EntryBuilder {
  /// Collects text content for the element `element` whose parent is `parent`.
  fn text(&mut self, element: &str, parent: Option<&str>, text: &str) {
    let target = match (element, parent) {
      ("id", Some("entry")) => &mut self.id,
      ("title", Some("entry")) => &mut self.title,
      ("summary", Some("entry")) => &mut self.summary,
      ("published", Some("entry")) => &mut self.published,
      ("name", Some("author")) => {
        self.authors.push(text.trim().to_string());
        return;
      },
      _ => return,
    };
    target.push_str(text);
  }

  /// Collects the attributes of categories and links.
  fn attributes(&mut self, element: &str, e: &BytesStart) -> Result<()> {
    match element {
      "primary_category" => self.primary_category = attribute(e, "term")?,
      "category" =>
        if let Some(term) = attribute(e, "term")? {
          self.categories.push(term);
        },
      "link" => {
        let is_pdf = attribute(e, "title")?.as_deref() == Some("pdf")
          || attribute(e, "type")?.as_deref() == Some("application/pdf");
        if is_pdf && self.pdf_url.is_none() {
          self.pdf_url = attribute(e, "href")?;
        }
      },
      _ => (),
    }
    Ok(())
  }

  /// Finishes the entry, or drops it if it is not a paper.
  fn build(self) -> Option<Entry> {
    let Some(id) = ABS_URL.captures(self.id.trim()).map(|cap| cap[1].to_string()) else {
      debug!("Skipping feed entry without an arXiv id: {:?}", self.id);
      return None;
    };
    let published = match DateTime::parse_from_rfc3339(self.published.trim()) {
      Ok(date) => date.with_timezone(&Utc),
      Err(e) => {
        warn!("Skipping {id}: invalid published date {:?} ({e})", self.published);
        return None;
      },
    };

    let mut categories = Vec::with_capacity(self.categories.len() + 1);
    for category in self.primary_category.into_iter().chain(self.categories) {
      if !categories.contains(&category) {
        categories.push(category);
      }
    }

    Some(Entry {
      id,
      title: normalize_whitespace(&self.title),
      authors: self.authors,
      summary: self.summary.trim().to_string(),
      categories,
      published,
      pdf_url: self.pdf_url,
    })
  }
}

/// Local (unprefixed) name of an element.
fn local_name(e: &BytesStart) -> String {
  String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

/// Name of the element enclosing the innermost open one.
fn stack_parent(stack: &[String]) -> Option<&str> {
  stack.len().checked_sub(2).map(|i| stack[i].as_str())
}

/// Value of the attribute with local name `key`, if present.
fn attribute(e: &BytesStart, key: &str) -> Result<Option<String>> {
  for attr in e.attributes().flatten() {
    if attr.key.local_name().as_ref() == key.as_bytes() {
      return Ok(Some(attr.unescape_value().map_err(malformed)?.into_owned()));
    }
  }
  Ok(None)
}

/// Collapses runs of whitespace (titles are wrapped across lines in the feed).
fn normalize_whitespace(s: &str) -> String { s.split_whitespace().collect::<Vec<_>>().join(" ") }

/// Wraps a content error in the feed.
fn malformed(e: impl Display) -> GleanerError {
  GleanerError::ApiError(format!("malformed feed: {e}"))
}
