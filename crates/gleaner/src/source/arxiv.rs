//! HTTP client for the arXiv query API.
//!
//! Searches are paginated with `start`/`max_results` and sorted by submission date, newest
//! first. Consecutive requests are spaced by the configured `request_interval`, which is how
//! arXiv asks clients to rate-limit themselves. A page that fails, or that comes back empty
//! before the advertised total is reached (the API does this intermittently), is retried up
//! to `max_retries` times before the result stream gives up with an error.

use super::{atom::Feed, *};

/// Default endpoint of the arXiv query API.
pub const ARXIV_API_URL: &str = "https://export.arxiv.org/api/query";

/// Base of arXiv's PDF links, used when an entry carries none.
pub const ARXIV_PDF_URL: &str = "https://arxiv.org/pdf";

/// [`PaperSource`] backed by the arXiv API.
#[derive(Debug, Clone)]
pub struct ArxivClient {
  /// Shared HTTP client carrying the timeout and user agent
  http:             reqwest::Client,
  /// Query endpoint
  base_url:         String,
  /// Results per page
  page_size:        usize,
  /// Delay between consecutive requests
  request_interval: Duration,
  /// Attempts per page beyond the first
  max_retries:      usize,
}

impl ArxivClient {
  /// Builds a client from the harvest options.
  pub fn new(config: &HarvestConfig) -> Result<Self> {
    let http = reqwest::Client::builder()
      .user_agent(concat!("gleaner/", env!("CARGO_PKG_VERSION")))
      .timeout(config.timeout)
      .build()?;
    Ok(Self {
      http,
      base_url: ARXIV_API_URL.to_string(),
      page_size: config.page_size,
      request_interval: config.request_interval,
      max_retries: config.max_retries,
    })
  }

  /// Points the client at a different query endpoint (a mirror, or a local stub).
  pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
    self.base_url = base_url.into();
    self
  }

  /// Requests one page of `search_query` starting at `offset`.
  async fn fetch_page(&self, search_query: &str, offset: usize) -> Result<Feed> {
    let params = [
      ("search_query", search_query.to_string()),
      ("start", offset.to_string()),
      ("max_results", self.page_size.to_string()),
      ("sortBy", "submittedDate".to_string()),
      ("sortOrder", "descending".to_string()),
    ];
    debug!("Fetching page at offset {offset} for query: {search_query}");
    self.fetch_feed(&params).await
  }

  /// Sends a query request and parses the feed it returns.
  async fn fetch_feed(&self, params: &[(&str, String)]) -> Result<Feed> {
    let response = self.http.get(&self.base_url).query(params).send().await?;
    let status = response.status();
    if !status.is_success() {
      return Err(GleanerError::ApiError(format!("arXiv API returned HTTP {status}")));
    }
    let body = response.text().await?;
    trace!("arXiv response: {body}");
    atom::parse_feed(&body)
  }

  /// Fetches a page, retrying failures and unexpected empty pages.
  async fn fetch_page_with_retries(&self, search_query: &str, offset: usize) -> Result<Feed> {
    let mut attempt = 0;
    loop {
      let error = match self.fetch_page(search_query, offset).await {
        Ok(feed) if feed.entry_count == 0 && offset < feed.total_results =>
          GleanerError::EmptyPage { offset, total: feed.total_results },
        Ok(feed) => return Ok(feed),
        Err(e) => e,
      };
      if attempt >= self.max_retries {
        return Err(error);
      }
      attempt += 1;
      warn!("Page at offset {offset} failed ({error}); retrying ({attempt}/{})", self.max_retries);
      tokio::time::sleep(self.request_interval).await;
    }
  }
}

/// Cursor over the pages of one search.
struct Pager<'a> {
  /// Client issuing the requests
  client:   &'a ArxivClient,
  /// Rendered query string
  query:    String,
  /// Offset of the next page to request
  offset:   usize,
  /// Total advertised by the first page
  total:    Option<usize>,
  /// Entries of the current page not yet handed out
  buffered: VecDeque<Entry>,
  /// Set once the sequence is exhausted or broken
  done:     bool,
}

impl Pager<'_> {
  /// Yields the next entry, fetching a new page when the current one is used up.
  async fn next_entry(&mut self) -> Result<Option<Entry>> {
    loop {
      if let Some(entry) = self.buffered.pop_front() {
        return Ok(Some(entry));
      }
      if self.done || self.total.is_some_and(|total| self.offset >= total) {
        return Ok(None);
      }
      if self.total.is_some() {
        tokio::time::sleep(self.client.request_interval).await;
      }

      let feed = self.client.fetch_page_with_retries(&self.query, self.offset).await?;
      self.absorb(feed);
    }
  }

  /// Buffers the papers of a fetched page and moves past every entry the server sent.
  ///
  /// Entries the parser dropped still occupy their slot in the server's result order.
  fn absorb(&mut self, feed: Feed) {
    self.total = Some(feed.total_results);
    if feed.entry_count == 0 {
      self.done = true;
    }
    self.offset += feed.entry_count;
    self.buffered.extend(feed.entries);
  }
}

#[async_trait]
impl PaperSource for ArxivClient {
  fn search(&self, query: &SearchQuery) -> BoxStream<'_, Result<Entry>> {
    let pager = Pager {
      client:   self,
      query:    query.to_string(),
      offset:   0,
      total:    None,
      buffered: VecDeque::new(),
      done:     false,
    };

    futures::stream::unfold(pager, |mut pager| async move {
      match pager.next_entry().await {
        Ok(Some(entry)) => Some((Ok(entry), pager)),
        Ok(None) => None,
        Err(e) => {
          pager.done = true;
          pager.buffered.clear();
          Some((Err(e), pager))
        },
      }
    })
    .boxed()
  }

  async fn lookup(&self, id: &str) -> Result<Entry> {
    if !is_arxiv_id(id) {
      return Err(GleanerError::InvalidIdentifier(id.to_string()));
    }
    let params = [("id_list", id.to_string()), ("max_results", "1".to_string())];
    let feed = self.fetch_feed(&params).await?;
    feed.entries.into_iter().next().ok_or_else(|| GleanerError::NotFound(id.to_string()))
  }

  async fn download(&self, entry: &Entry, destination: &Path) -> Result<()> {
    let url = pdf_url(entry);
    debug!("Downloading {} from {url}", entry.id);

    let response = self.http.get(&url).send().await?;
    let status = response.status();
    if !status.is_success() {
      return Err(GleanerError::ApiError(format!("Failed to download PDF: HTTP {status}")));
    }
    let bytes = response.bytes().await?;
    if !bytes.starts_with(b"%PDF") {
      return Err(GleanerError::ApiError(format!("{url} did not return a PDF")));
    }

    let partial = partial_path(destination);
    tokio::fs::write(&partial, &bytes).await?;
    if let Err(e) = tokio::fs::rename(&partial, destination).await {
      let _ = tokio::fs::remove_file(&partial).await;
      return Err(e.into());
    }
    Ok(())
  }
}

/// PDF location for `entry`, falling back to the canonical arXiv link.
fn pdf_url(entry: &Entry) -> String {
  entry.pdf_url.clone().unwrap_or_else(|| format!("{ARXIV_PDF_URL}/{}", entry.id))
}

/// Temporary name an artifact is written under before it is complete.
fn partial_path(destination: &Path) -> PathBuf {
  let mut partial = destination.as_os_str().to_owned();
  partial.push(".part");
  PathBuf::from(partial)
}
