//! Provider stock feed read from a JSON-lines export.
//!
//! Each non-blank line is one [`ProviderStockLine`]:
//!
//! ```json
//! {"reference":"9782070612758","availableQuantity":3,"price":1250}
//! ```
//!
//! Pages are slices of the file; the cursor is the index of the first line
//! of the next page. The file is read once, off the runtime threads, on the
//! first page request.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use cap_std::{ambient_authority, fs::Dir};
use tokio::sync::OnceCell;

use crate::domain::catalogue_sync::{ProviderStockLine, StockDetailsPage, VenueProviderLink};
use crate::domain::ports::{StockDetailsSource, StockDetailsSourceError};

const DEFAULT_PAGE_SIZE: usize = 1_000;

/// File-backed implementation of [`StockDetailsSource`].
#[derive(Debug, Clone)]
pub struct StockFileSource {
    path: PathBuf,
    page_size: usize,
    lines: Arc<OnceCell<Vec<FeedLine>>>,
}

/// A non-blank line with its zero-based position in the file.
type FeedLine = (usize, String);

impl StockFileSource {
    /// Source reading `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            page_size: DEFAULT_PAGE_SIZE,
            lines: Arc::new(OnceCell::new()),
        }
    }

    /// Set the number of lines per page. Zero is treated as one.
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    async fn lines(&self) -> Result<&[FeedLine], StockDetailsSourceError> {
        let lines = self
            .lines
            .get_or_try_init(|| {
                let path = self.path.clone();
                async move {
                    let display = path.display().to_string();
                    tokio::task::spawn_blocking(move || read_contents(&path))
                        .await
                        .map_err(|err| {
                            StockDetailsSourceError::unavailable(format!("{display} ({err})"))
                        })?
                        .map(|contents| split_lines(&contents))
                }
            })
            .await?;
        Ok(lines.as_slice())
    }
}

fn read_contents(path: &Path) -> Result<String, StockDetailsSourceError> {
    let unavailable = |err: std::io::Error| {
        StockDetailsSourceError::unavailable(format!("{} ({err})", path.display()))
    };
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let file_name = path.file_name().ok_or_else(|| {
        StockDetailsSourceError::unavailable(format!("{} is not a file", path.display()))
    })?;
    let dir = Dir::open_ambient_dir(parent, ambient_authority()).map_err(unavailable)?;
    dir.read_to_string(Path::new(file_name)).map_err(unavailable)
}

fn split_lines(contents: &str) -> Vec<FeedLine> {
    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(number, line)| (number, line.to_owned()))
        .collect()
}

fn parse_cursor(cursor: Option<&str>) -> Result<usize, StockDetailsSourceError> {
    cursor.map_or(Ok(0), |raw| {
        raw.parse()
            .map_err(|_| StockDetailsSourceError::malformed(format!("invalid cursor {raw:?}")))
    })
}

fn parse_page(
    lines: &[FeedLine],
    start: usize,
    page_size: usize,
) -> Result<StockDetailsPage, StockDetailsSourceError> {
    let end = start.saturating_add(page_size).min(lines.len());
    let parsed = lines
        .get(start..end)
        .unwrap_or_default()
        .iter()
        .map(|(number, line)| {
            serde_json::from_str::<ProviderStockLine>(line).map_err(|err| {
                StockDetailsSourceError::malformed(format!("line {}: {err}", number + 1))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(StockDetailsPage {
        lines: parsed,
        next_cursor: (end < lines.len()).then(|| end.to_string()),
    })
}

#[async_trait]
impl StockDetailsSource for StockFileSource {
    async fn fetch_page(
        &self,
        _link: &VenueProviderLink,
        cursor: Option<String>,
    ) -> Result<StockDetailsPage, StockDetailsSourceError> {
        let start = parse_cursor(cursor.as_deref())?;
        let lines = self.lines().await?;
        parse_page(lines, start, self.page_size)
    }
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    use super::*;
    use crate::domain::{Cents, ProviderId, VenueId};

    const FEED: &str = concat!(
        r#"{"reference":"9782070612758","availableQuantity":3,"price":1250}"#,
        "\n\n",
        r#"{"reference":"9782253006329","availableQuantity":0,"price":790}"#,
        "\n",
        r#"{"reference":"9782081275232","availableQuantity":1,"price":0}"#,
        "\n",
    );

    #[fixture]
    fn link() -> VenueProviderLink {
        VenueProviderLink {
            venue_id: VenueId::new(1),
            provider_id: ProviderId::new(2),
            venue_id_at_offer_provider: Some("12345678200010".to_owned()),
        }
    }

    fn feed_file(contents: &str) -> (TempDir, PathBuf) {
        let dir = TempDir::new().expect("temp dir");
        Dir::open_ambient_dir(dir.path(), ambient_authority())
            .expect("open temp dir")
            .write("stocks.jsonl", contents)
            .expect("write feed");
        let path = dir.path().join("stocks.jsonl");
        (dir, path)
    }

    #[rstest]
    #[tokio::test]
    async fn pages_through_the_feed(link: VenueProviderLink) {
        let (_dir, path) = feed_file(FEED);
        let source = StockFileSource::new(path).with_page_size(2);

        let first = source.fetch_page(&link, None).await.expect("first page");
        assert_eq!(first.lines.len(), 2);
        assert_eq!(first.lines[0].price, Cents::new(1_250));
        assert_eq!(first.next_cursor.as_deref(), Some("2"));

        let second = source
            .fetch_page(&link, first.next_cursor)
            .await
            .expect("second page");
        assert_eq!(second.lines.len(), 1);
        assert_eq!(second.lines[0].reference, "9782081275232");
        assert_eq!(second.next_cursor, None);
    }

    #[rstest]
    #[tokio::test]
    async fn later_pages_are_served_from_the_first_read(link: VenueProviderLink) {
        let (dir, path) = feed_file(FEED);
        let source = StockFileSource::new(path).with_page_size(2);

        let first = source.fetch_page(&link, None).await.expect("first page");
        Dir::open_ambient_dir(dir.path(), ambient_authority())
            .expect("open temp dir")
            .remove_file("stocks.jsonl")
            .expect("remove feed");
        let second = source
            .fetch_page(&link, first.next_cursor)
            .await
            .expect("second page");

        assert_eq!(second.lines.len(), 1);
        assert_eq!(second.lines[0].reference, "9782081275232");
    }

    #[rstest]
    #[tokio::test]
    async fn failed_read_is_retried(link: VenueProviderLink) {
        let dir = TempDir::new().expect("temp dir");
        let source = StockFileSource::new(dir.path().join("stocks.jsonl"));
        source.fetch_page(&link, None).await.expect_err("no file yet");

        Dir::open_ambient_dir(dir.path(), ambient_authority())
            .expect("open temp dir")
            .write("stocks.jsonl", FEED)
            .expect("write feed");
        let page = source.fetch_page(&link, None).await.expect("file now present");

        assert_eq!(page.lines.len(), 3);
    }

    #[rstest]
    #[tokio::test]
    async fn malformed_line_names_its_number(link: VenueProviderLink) {
        let (_dir, path) = feed_file(concat!(
            r#"{"reference":"1","availableQuantity":1,"price":1}"#,
            "\nnope\n",
        ));
        let source = StockFileSource::new(path);

        let err = source.fetch_page(&link, None).await.expect_err("bad line");

        match err {
            StockDetailsSourceError::Malformed { message } => assert!(message.starts_with("line 2")),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[rstest]
    #[tokio::test]
    async fn missing_file_is_unavailable(link: VenueProviderLink) {
        let dir = TempDir::new().expect("temp dir");
        let source = StockFileSource::new(dir.path().join("absent.jsonl"));

        let err = source.fetch_page(&link, None).await.expect_err("no file");

        assert!(matches!(err, StockDetailsSourceError::Unavailable { .. }));
    }

    #[rstest]
    #[case(None, Ok(0))]
    #[case(Some("7"), Ok(7))]
    fn cursor_parses_offsets(#[case] raw: Option<&str>, #[case] expected: Result<usize, ()>) {
        assert_eq!(parse_cursor(raw).map_err(|_| ()), expected);
    }

    #[rstest]
    fn cursor_rejects_garbage() {
        assert!(matches!(
            parse_cursor(Some("abc")),
            Err(StockDetailsSourceError::Malformed { .. })
        ));
    }

    #[rstest]
    fn cursor_past_the_end_yields_an_empty_page() {
        let page = parse_page(&split_lines(FEED), 10, 5).expect("empty page");
        assert!(page.lines.is_empty());
        assert_eq!(page.next_cursor, None);
    }
}
