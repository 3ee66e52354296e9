use std::io::Write;
use std::time::Duration;

use anyhow::{ensure, Result};
use indicatif::{ProgressBar, ProgressStyle};
use rusqlite::Connection;
use tracing::{error, info, warn};

use crate::browser::PageFetcher;
use crate::csv_sink::CsvSink;
use crate::dataset;
use crate::error::ScrapeError;
use crate::extract::Extractor;
use crate::record::BusinessRecord;

/// Run stats returned after completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapeStats {
    pub total: usize,
    pub ok: usize,
    pub errors: usize,
}

/// Both record destinations, opened for the duration of one run.
pub struct Sinks<W: Write> {
    pub dataset: Connection,
    pub csv: CsvSink<W>,
}

impl<W: Write> Sinks<W> {
    /// The dataset row is committed only once the CSV row is written, so a
    /// failure in either leaves both sinks unchanged.
    fn write(&mut self, record: &BusinessRecord) -> Result<(), ScrapeError> {
        let tx = self
            .dataset
            .transaction()
            .map_err(|e| ScrapeError::Sink(e.into()))?;
        dataset::push(&tx, record).map_err(ScrapeError::Sink)?;
        self.csv.append(record).map_err(ScrapeError::Sink)?;
        tx.commit().map_err(|e| ScrapeError::Sink(e.into()))?;
        Ok(())
    }
}

/// Scrape `urls` one at a time. A failing URL is logged and skipped; the
/// browser session is closed once the list is done.
pub async fn scrape_all<F, W>(
    urls: &[String],
    mut fetcher: F,
    extractor: &Extractor,
    sinks: &mut Sinks<W>,
    delay: Duration,
) -> Result<ScrapeStats>
where
    F: PageFetcher,
    W: Write,
{
    ensure!(!urls.is_empty(), "Please provide at least one Yelp URL in the input");

    let pb = ProgressBar::new(urls.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );

    let mut ok = 0usize;
    let mut errors = 0usize;

    for url in urls {
        info!(%url, "Processing");
        match scrape_one(&mut fetcher, extractor, sinks, url).await {
            Ok(record) => {
                ok += 1;
                info!(%url, name = %record.name, "Successfully scraped");
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
            Err(e) => {
                errors += 1;
                error!(%url, error = %e, "Error processing page");
            }
        }
        pb.inc(1);
    }

    pb.finish_and_clear();

    if let Err(e) = fetcher.close().await {
        warn!(error = %e, "Browser did not shut down cleanly");
    }

    let total = urls.len();
    info!("Scraped {} pages ({} ok, {} errors)", total, ok, errors);
    Ok(ScrapeStats { total, ok, errors })
}

async fn scrape_one<F, W>(
    fetcher: &mut F,
    extractor: &Extractor,
    sinks: &mut Sinks<W>,
    url: &str,
) -> Result<BusinessRecord, ScrapeError>
where
    F: PageFetcher,
    W: Write,
{
    let html = fetcher.fetch(url).await?;
    let record = extractor.extract(&html, url);
    sinks.write(&record)?;
    Ok(record)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use tracing_subscriber::fmt::MakeWriter;

    use super::*;
    use crate::config::SelectorTable;

    /// Serves canned markup; URLs without an entry time out.
    struct FakeFetcher {
        pages: HashMap<String, String>,
        fetched: Arc<Mutex<Vec<String>>>,
        closed: Arc<Mutex<bool>>,
    }

    impl FakeFetcher {
        fn new(pages: &[(&str, &str)]) -> Self {
            Self {
                pages: pages
                    .iter()
                    .map(|(u, h)| (u.to_string(), h.to_string()))
                    .collect(),
                fetched: Arc::default(),
                closed: Arc::default(),
            }
        }
    }

    #[async_trait]
    impl PageFetcher for FakeFetcher {
        async fn fetch(&mut self, url: &str) -> Result<String, ScrapeError> {
            self.fetched.lock().unwrap().push(url.to_string());
            self.pages
                .get(url)
                .cloned()
                .ok_or_else(|| ScrapeError::NavigationTimeout {
                    url: url.to_string(),
                    timeout: Duration::from_secs(60),
                })
        }

        async fn close(self) -> Result<()> {
            *self.closed.lock().unwrap() = true;
            Ok(())
        }
    }

    fn sinks() -> Sinks<Vec<u8>> {
        let conn = Connection::open_in_memory().unwrap();
        dataset::init_schema(&conn).unwrap();
        Sinks {
            dataset: conn,
            csv: CsvSink::new(Vec::new()).unwrap(),
        }
    }

    /// Collects formatted log output.
    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl LogBuffer {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for LogBuffer {
        type Writer = LogBuffer;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    /// Accepts the header, then rejects every later write.
    #[derive(Default)]
    struct FailAfterHeader {
        header_written: bool,
    }

    impl io::Write for FailAfterHeader {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.header_written {
                return Err(io::Error::new(io::ErrorKind::Other, "disk full"));
            }
            self.header_written = true;
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn extractor() -> Extractor {
        Extractor::new(&SelectorTable::default()).unwrap()
    }

    fn page(name: &str) -> String {
        format!(
            r#"<html><body><h1 class="businessTitle">{}</h1>
            <div class="rating"><meta itemprop="ratingValue" content="4.0"></div>
            </body></html>"#,
            name
        )
    }

    const A: &str = "https://www.yelp.com/biz/alpha";
    const B: &str = "https://www.yelp.com/biz/bravo";
    const C: &str = "https://www.yelp.com/biz/charlie";

    #[tokio::test]
    async fn failed_url_is_skipped() {
        let (pa, pc) = (page("Alpha"), page("Charlie"));
        let fetcher = FakeFetcher::new(&[(A, pa.as_str()), (C, pc.as_str())]);
        let fetched = fetcher.fetched.clone();
        let closed = fetcher.closed.clone();
        let mut sinks = sinks();
        let urls: Vec<String> = [A, B, C].iter().map(|s| s.to_string()).collect();

        let logs = LogBuffer::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let stats = scrape_all(&urls, fetcher, &extractor(), &mut sinks, Duration::ZERO)
            .await
            .unwrap();

        assert_eq!(stats, ScrapeStats { total: 3, ok: 2, errors: 1 });

        let output = logs.contents();
        let failures: Vec<&str> = output
            .lines()
            .filter(|l| l.contains("Error processing page"))
            .collect();
        assert_eq!(failures.len(), 1);
        assert!(failures[0].contains("ERROR"));
        assert!(failures[0].contains(B));
        assert_eq!(*fetched.lock().unwrap(), urls);
        assert!(*closed.lock().unwrap());

        let stored = dataset::all(&sinks.dataset).unwrap();
        let names: Vec<&str> = stored.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Alpha", "Charlie"]);
        assert_eq!(stored[0].encid, "alpha");
        assert_eq!(stored[1].rating, 4.0);
    }

    #[tokio::test]
    async fn csv_rows_match_dataset_count() {
        let (pa, pb, pc) = (page("Alpha"), page("Bravo"), page("Charlie"));
        let fetcher =
            FakeFetcher::new(&[(A, pa.as_str()), (B, pb.as_str()), (C, pc.as_str())]);
        let mut sinks = sinks();
        let urls: Vec<String> = [A, B, C].iter().map(|s| s.to_string()).collect();

        let stats = scrape_all(&urls, fetcher, &extractor(), &mut sinks, Duration::ZERO)
            .await
            .unwrap();

        assert_eq!(stats.ok, 3);
        assert_eq!(sinks.csv.rows(), dataset::count(&sinks.dataset).unwrap());

        let Sinks { csv, .. } = sinks;
        let text = String::from_utf8(csv.into_inner().unwrap()).unwrap();
        // header + one line per record
        assert_eq!(text.lines().count(), 4);
    }

    #[tokio::test]
    async fn empty_list_aborts_before_fetching() {
        let fetcher = FakeFetcher::new(&[]);
        let fetched = fetcher.fetched.clone();
        let mut sinks = sinks();

        let err = scrape_all(&[], fetcher, &extractor(), &mut sinks, Duration::ZERO)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("at least one"));
        assert!(fetched.lock().unwrap().is_empty());
        assert_eq!(dataset::count(&sinks.dataset).unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn delay_follows_each_success() {
        let pa = page("Alpha");
        let fetcher = FakeFetcher::new(&[(A, pa.as_str())]);
        let mut sinks = sinks();
        let urls: Vec<String> = [A, B, A].iter().map(|s| s.to_string()).collect();

        let start = tokio::time::Instant::now();
        scrape_all(&urls, fetcher, &extractor(), &mut sinks, Duration::from_secs(2))
            .await
            .unwrap();

        // two successes, one sleep each; the failure adds none
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(4));
        assert!(elapsed < Duration::from_secs(6));
    }

    #[tokio::test]
    async fn failed_csv_write_leaves_dataset_untouched() {
        let pa = page("Alpha");
        let fetcher = FakeFetcher::new(&[(A, pa.as_str())]);
        let conn = Connection::open_in_memory().unwrap();
        dataset::init_schema(&conn).unwrap();
        let mut sinks = Sinks {
            dataset: conn,
            csv: CsvSink::new(FailAfterHeader::default()).unwrap(),
        };

        let stats = scrape_all(&[A.to_string()], fetcher, &extractor(), &mut sinks, Duration::ZERO)
            .await
            .unwrap();

        assert_eq!(stats, ScrapeStats { total: 1, ok: 0, errors: 1 });
        assert_eq!(dataset::count(&sinks.dataset).unwrap(), 0);
        assert_eq!(sinks.csv.rows(), 0);
    }

    #[tokio::test]
    async fn sinks_stay_in_step_across_runs() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("dataset.sqlite");
        let csv_path = dir.path().join("yelp_data.csv");
        let (pa, pb, pc) = (page("Alpha"), page("Bravo"), page("Charlie"));

        let runs: [&[&str]; 2] = [&[A], &[B, C]];
        for run in runs {
            let fetcher =
                FakeFetcher::new(&[(A, pa.as_str()), (B, pb.as_str()), (C, pc.as_str())]);
            let mut sinks = Sinks {
                dataset: dataset::open(&db).unwrap(),
                csv: CsvSink::open(&csv_path).unwrap(),
            };
            let urls: Vec<String> = run.iter().map(|s| s.to_string()).collect();
            scrape_all(&urls, fetcher, &extractor(), &mut sinks, Duration::ZERO)
                .await
                .unwrap();
        }

        let conn = dataset::open(&db).unwrap();
        let text = std::fs::read_to_string(&csv_path).unwrap();
        let csv_rows = text.lines().count() - 1;
        assert_eq!(dataset::count(&conn).unwrap(), 3);
        assert_eq!(csv_rows, 3);
        assert_eq!(text.matches("Business ID").count(), 1);
    }
}
