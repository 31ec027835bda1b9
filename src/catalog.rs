use reqwest::blocking::Client;
use serde_json::Value;
use std::sync::OnceLock;
use std::time::Duration;

use crate::config::AppConfig;
use crate::error::SearchError;
use crate::models::{CatalogSource, SearchResultItem};

static SEARCH_DEBUG_ENABLED: OnceLock<bool> = OnceLock::new();

/// One external book-metadata source.
pub trait Catalog: Send + Sync {
  fn source(&self) -> CatalogSource;
  fn lookup(&self, query: &str, limit: usize) -> Result<Vec<SearchResultItem>, SearchError>;
}

pub struct HttpClient {
  client: Client,
  max_retries: u64,
  user_agent: String,
}

impl HttpClient {
  pub fn new(config: &AppConfig) -> Result<Self, SearchError> {
    let client = Client::builder()
      .timeout(Duration::from_secs(config.http_timeout_secs))
      .build()
      .map_err(|err| SearchError::Client(err.to_string()))?;
    Ok(Self::with_client(client, config))
  }

  pub(crate) fn with_client(client: Client, config: &AppConfig) -> Self {
    HttpClient {
      client,
      max_retries: config.http_max_retries,
      user_agent: config.user_agent.clone(),
    }
  }

  pub fn fetch_json(&self, url: &str) -> Result<Value, SearchError> {
    let debug_enabled = search_debug_enabled();
    if debug_enabled {
      log::info!("[search-debug] http start url={}", url);
    }

    let mut attempt = 0;
    loop {
      let response = self
        .client
        .get(url)
        .header(reqwest::header::ACCEPT, "application/json")
        .header(reqwest::header::USER_AGENT, self.user_agent.as_str())
        .send();

      let response = match response {
        Ok(value) => value,
        Err(err) => {
          if debug_enabled {
            log::warn!(
              "[search-debug] http transport_error url={} attempt={}",
              url,
              attempt + 1
            );
          }
          if attempt < self.max_retries {
            std::thread::sleep(Duration::from_millis(350 * (attempt + 1)));
            attempt += 1;
            continue;
          }
          return Err(SearchError::Http(err));
        }
      };

      let status = response.status();
      if status.is_success() {
        if debug_enabled {
          log::info!("[search-debug] http success url={} status={}", url, status);
        }
        let body = response.text()?;
        return Ok(serde_json::from_str(&body)?);
      }

      if debug_enabled {
        log::warn!(
          "[search-debug] http status url={} status={} attempt={}",
          url,
          status,
          attempt + 1
        );
      }

      if (status.as_u16() == 429 || status.is_server_error()) && attempt < self.max_retries {
        let retry_after_ms = response
          .headers()
          .get(reqwest::header::RETRY_AFTER)
          .and_then(|value| value.to_str().ok())
          .and_then(|value| value.parse::<u64>().ok())
          .map(|value| value * 1000)
          .unwrap_or(350 * (attempt + 1));
        std::thread::sleep(Duration::from_millis(retry_after_ms.min(4_000)));
        attempt += 1;
        continue;
      }

      return Err(SearchError::Status {
        status: status.as_u16(),
        url: url.to_string(),
      });
    }
  }
}

pub struct GoogleBooksCatalog {
  http: HttpClient,
  base_url: String,
}

impl GoogleBooksCatalog {
  pub fn new(config: &AppConfig) -> Result<Self, SearchError> {
    Ok(GoogleBooksCatalog {
      http: HttpClient::new(config)?,
      base_url: config.google_books_url.trim_end_matches('/').to_string(),
    })
  }
}

impl Catalog for GoogleBooksCatalog {
  fn source(&self) -> CatalogSource {
    CatalogSource::GoogleBooks
  }

  fn lookup(&self, query: &str, limit: usize) -> Result<Vec<SearchResultItem>, SearchError> {
    let url = format!(
      "{}/books/v1/volumes?q={}&maxResults={}",
      self.base_url,
      urlencoding::encode(&format!("intitle:{}", query)),
      limit
    );
    let data = self.http.fetch_json(&url)?;
    Ok(normalize_google_volumes(&data, limit))
  }
}

pub struct OpenLibraryCatalog {
  http: HttpClient,
  base_url: String,
  covers_url: String,
}

impl OpenLibraryCatalog {
  pub fn new(config: &AppConfig) -> Result<Self, SearchError> {
    Ok(OpenLibraryCatalog {
      http: HttpClient::new(config)?,
      base_url: config.open_library_url.trim_end_matches('/').to_string(),
      covers_url: config.open_library_covers_url.trim_end_matches('/').to_string(),
    })
  }
}

impl Catalog for OpenLibraryCatalog {
  fn source(&self) -> CatalogSource {
    CatalogSource::OpenLibrary
  }

  fn lookup(&self, query: &str, limit: usize) -> Result<Vec<SearchResultItem>, SearchError> {
    let url = format!(
      "{}/search.json?title={}&limit={}",
      self.base_url,
      urlencoding::encode(query),
      limit
    );
    let data = self.http.fetch_json(&url)?;
    Ok(normalize_openlibrary_docs(&data, &self.base_url, &self.covers_url, limit))
  }
}

pub fn normalize_google_volumes(data: &Value, limit: usize) -> Vec<SearchResultItem> {
  let items = data.get("items").and_then(|value| value.as_array()).cloned().unwrap_or_default();
  items
    .iter()
    .take(limit)
    .map(|item| {
      let info = item.get("volumeInfo").cloned().unwrap_or(Value::Null);
      let info_link = json_non_empty_str(&info, "infoLink")
        .or_else(|| json_non_empty_str(item, "selfLink"))
        .unwrap_or_default();
      let cover = info
        .get("imageLinks")
        .and_then(|links| {
          json_non_empty_str(links, "thumbnail")
            .or_else(|| json_non_empty_str(links, "smallThumbnail"))
        })
        .map(|value| upgrade_to_https(&value))
        .unwrap_or_default();

      SearchResultItem {
        source: CatalogSource::GoogleBooks,
        title: json_non_empty_str(&info, "title").unwrap_or_default(),
        authors: json_authors(info.get("authors")),
        page_count: json_page_count(info.get("pageCount")),
        info_link,
        cover,
      }
    })
    .collect()
}

pub fn normalize_openlibrary_docs(
  data: &Value,
  base_url: &str,
  covers_url: &str,
  limit: usize,
) -> Vec<SearchResultItem> {
  let docs = data.get("docs").and_then(|value| value.as_array()).cloned().unwrap_or_default();
  docs
    .iter()
    .take(limit)
    .map(|doc| {
      let info_link = json_non_empty_str(doc, "key")
        .map(|key| format!("{}{}", base_url, key))
        .unwrap_or_default();
      let cover = doc
        .get("cover_i")
        .and_then(|value| value.as_i64())
        .map(|value| format!("{}/b/id/{}-M.jpg", covers_url, value))
        .unwrap_or_default();

      SearchResultItem {
        source: CatalogSource::OpenLibrary,
        title: json_non_empty_str(doc, "title").unwrap_or_default(),
        authors: json_authors(doc.get("author_name")),
        page_count: json_page_count(doc.get("number_of_pages_median")),
        info_link,
        cover,
      }
    })
    .collect()
}

fn json_non_empty_str(value: &Value, key: &str) -> Option<String> {
  value
    .get(key)
    .and_then(|value| value.as_str())
    .filter(|value| !value.is_empty())
    .map(|value| value.to_string())
}

fn json_authors(value: Option<&Value>) -> Vec<String> {
  match value {
    Some(Value::Array(values)) => values
      .iter()
      .filter_map(|v| v.as_str().map(|s| s.to_string()))
      .collect(),
    Some(Value::String(single)) if !single.is_empty() => vec![single.clone()],
    _ => vec![],
  }
}

// Zero and non-numeric counts are unknown, never 0.
fn json_page_count(value: Option<&Value>) -> Option<u32> {
  let value = value?;
  value
    .as_u64()
    .or_else(|| {
      value
        .as_f64()
        .filter(|count| count.is_finite() && *count >= 1.0)
        .map(|count| count.round() as u64)
    })
    .filter(|count| *count > 0)
    .and_then(|count| u32::try_from(count).ok())
}

fn upgrade_to_https(url: &str) -> String {
  match url.strip_prefix("http://") {
    Some(rest) => format!("https://{}", rest),
    None => url.to_string(),
  }
}

pub(crate) fn search_debug_enabled() -> bool {
  *SEARCH_DEBUG_ENABLED.get_or_init(|| {
    std::env::var("READLOG_SEARCH_DEBUG")
      .map(|value| {
        let lowered = value.trim().to_ascii_lowercase();
        lowered == "1" || lowered == "true" || lowered == "yes" || lowered == "on"
      })
      .unwrap_or(false)
  })
}

#[cfg(test)]
mod tests {
  use super::{
    normalize_google_volumes, normalize_openlibrary_docs, upgrade_to_https, Catalog,
    GoogleBooksCatalog, HttpClient, OpenLibraryCatalog,
  };
  use crate::config::AppConfig;
  use crate::error::SearchError;
  use crate::models::CatalogSource;
  use serde_json::json;
  use std::io::{Read, Write};
  use std::net::TcpListener;
  use std::thread::{self, JoinHandle};
  use std::time::Duration;

  fn canned(status: &str, headers: &[&str], body: &str) -> String {
    let mut response = format!(
      "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n",
      status,
      body.len()
    );
    for header in headers {
      response.push_str(header);
      response.push_str("\r\n");
    }
    response.push_str("\r\n");
    response.push_str(body);
    response
  }

  // Answers one connection per canned response, in order; yields how many were served.
  fn serve(responses: Vec<String>) -> (String, JoinHandle<usize>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback");
    let url = format!("http://{}/lookup", listener.local_addr().expect("local addr"));
    let handle = thread::spawn(move || {
      let mut served = 0;
      for response in responses {
        let (mut stream, _) = listener.accept().expect("accept");
        stream
          .set_read_timeout(Some(Duration::from_secs(5)))
          .expect("read timeout");
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|window| window == b"\r\n\r\n") {
          match stream.read(&mut buf) {
            Ok(0) | Err(_) => break,
            Ok(read) => request.extend_from_slice(&buf[..read]),
          }
        }
        stream.write_all(response.as_bytes()).expect("write response");
        served += 1;
      }
      served
    });
    (url, handle)
  }

  fn loopback_client(max_retries: u64) -> HttpClient {
    let config = AppConfig {
      http_max_retries: max_retries,
      ..AppConfig::default()
    };
    let client = reqwest::blocking::Client::builder()
      .no_proxy()
      .timeout(Duration::from_secs(5))
      .build()
      .expect("client");
    HttpClient::with_client(client, &config)
  }

  #[test]
  fn non_success_status_is_a_status_error() {
    let (url, server) = serve(vec![canned("404 Not Found", &[], "{}")]);
    let result = loopback_client(0).fetch_json(&url);
    match result {
      Err(SearchError::Status { status, url: failed_url }) => {
        assert_eq!(status, 404);
        assert_eq!(failed_url, url);
      }
      other => panic!("expected status error, got {:?}", other),
    }
    assert_eq!(server.join().expect("server"), 1);
  }

  #[test]
  fn unparsable_body_is_a_json_error() {
    let (url, server) = serve(vec![canned("200 OK", &[], "<html>")]);
    let result = loopback_client(0).fetch_json(&url);
    assert!(matches!(result, Err(SearchError::Json(_))), "got {:?}", result);
    assert_eq!(server.join().expect("server"), 1);
  }

  #[test]
  fn server_error_is_not_retried_by_default() {
    let (url, server) = serve(vec![canned("503 Service Unavailable", &[], "")]);
    let result = loopback_client(0).fetch_json(&url);
    assert!(matches!(result, Err(SearchError::Status { status: 503, .. })));
    assert_eq!(server.join().expect("server"), 1);
  }

  #[test]
  fn retries_server_error_honoring_retry_after() {
    let (url, server) = serve(vec![
      canned("503 Service Unavailable", &["Retry-After: 0"], ""),
      canned("200 OK", &[], r#"{"items": []}"#),
    ]);
    let value = loopback_client(1).fetch_json(&url).expect("second attempt succeeds");
    assert_eq!(value, json!({ "items": [] }));
    assert_eq!(server.join().expect("server"), 2);
  }

  #[test]
  fn retries_rate_limit_then_gives_up_after_budget() {
    let (url, server) = serve(vec![
      canned("429 Too Many Requests", &["Retry-After: 0"], ""),
      canned("429 Too Many Requests", &["Retry-After: 0"], ""),
    ]);
    let result = loopback_client(1).fetch_json(&url);
    assert!(matches!(result, Err(SearchError::Status { status: 429, .. })));
    assert_eq!(server.join().expect("server"), 2);
  }

  #[test]
  fn upgrades_only_the_scheme_prefix() {
    assert_eq!(
      upgrade_to_https("http://books.google.com/c?img=1&redir=http://x"),
      "https://books.google.com/c?img=1&redir=http://x"
    );
    assert_eq!(upgrade_to_https("https://a/b"), "https://a/b");
    assert_eq!(upgrade_to_https(""), "");
  }

  #[test]
  fn normalizes_google_volumes() {
    let data = json!({
      "items": [
        {
          "selfLink": "https://www.googleapis.com/books/v1/volumes/abc",
          "volumeInfo": {
            "title": "Dune",
            "authors": ["Frank Herbert"],
            "pageCount": 412,
            "infoLink": "https://books.google.com/books?id=abc",
            "imageLinks": { "thumbnail": "http://books.google.com/cover.jpg" }
          }
        },
        {
          "selfLink": "https://www.googleapis.com/books/v1/volumes/def",
          "volumeInfo": {
            "title": "Dune Messiah",
            "pageCount": 0,
            "imageLinks": { "smallThumbnail": "https://books.google.com/small.jpg" }
          }
        },
        {}
      ]
    });

    let items = normalize_google_volumes(&data, 20);
    assert_eq!(items.len(), 3);
    assert_eq!(items[0].source, CatalogSource::GoogleBooks);
    assert_eq!(items[0].authors, vec!["Frank Herbert".to_string()]);
    assert_eq!(items[0].page_count, Some(412));
    assert_eq!(items[0].cover, "https://books.google.com/cover.jpg");

    assert!(items[1].authors.is_empty());
    assert_eq!(items[1].page_count, None);
    assert_eq!(items[1].info_link, "https://www.googleapis.com/books/v1/volumes/def");
    assert_eq!(items[1].cover, "https://books.google.com/small.jpg");

    assert_eq!(items[2].title, "");
    assert_eq!(items[2].info_link, "");
    assert_eq!(items[2].cover, "");
  }

  #[test]
  fn normalizes_openlibrary_docs() {
    let data = json!({
      "docs": [
        {
          "title": "Dune",
          "author_name": ["Frank Herbert", "Someone Else"],
          "number_of_pages_median": 528,
          "key": "/works/OL893415W",
          "cover_i": 11481354
        },
        { "title": "Dune", "author_name": "Frank Herbert" }
      ]
    });

    let items = normalize_openlibrary_docs(
      &data,
      "https://openlibrary.org",
      "https://covers.openlibrary.org",
      20,
    );
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].source, CatalogSource::OpenLibrary);
    assert_eq!(items[0].page_count, Some(528));
    assert_eq!(items[0].info_link, "https://openlibrary.org/works/OL893415W");
    assert_eq!(items[0].cover, "https://covers.openlibrary.org/b/id/11481354-M.jpg");
    assert_eq!(items[1].authors, vec!["Frank Herbert".to_string()]);
    assert_eq!(items[1].page_count, None);
    assert_eq!(items[1].info_link, "");
  }

  #[test]
  fn caps_results_and_tolerates_missing_collections() {
    let docs: Vec<_> = (0..30).map(|index| json!({ "title": format!("Book {}", index) })).collect();
    let items = normalize_openlibrary_docs(&json!({ "docs": docs }), "", "", 20);
    assert_eq!(items.len(), 20);
    assert!(normalize_google_volumes(&json!({ "totalItems": 0 }), 20).is_empty());
  }

  #[test]
  #[ignore = "network probe for manual debugging"]
  fn live_catalog_probe() {
    let config = AppConfig::default();
    let query = std::env::var("READLOG_PROBE_QUERY").unwrap_or_else(|_| "dune".to_string());
    let catalogs: Vec<Box<dyn Catalog>> = vec![
      Box::new(GoogleBooksCatalog::new(&config).expect("google client")),
      Box::new(OpenLibraryCatalog::new(&config).expect("openlibrary client")),
    ];
    for catalog in &catalogs {
      match catalog.lookup(&query, 5) {
        Ok(items) => {
          for item in items {
            println!(
              "probe source={} title=\"{}\" authors={} pages={:?}",
              catalog.source(),
              item.title,
              item.authors.join(", "),
              item.page_count
            );
          }
        }
        Err(err) => println!("probe source={} error={}", catalog.source(), err),
      }
    }
  }
}
