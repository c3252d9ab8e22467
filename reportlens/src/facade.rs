//! The `ReportAnalyzer` entry point.

use reportlens_storage::{create_storage, ReportHandle, ReportStorage, StorageConfig};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::analyzer::{Analysis, Analyzer, SummaryAnalyzer};
use crate::error::{Error, Result};
use crate::locator;
use crate::parser::{DefaultReportParser, ReportFormat, ReportParser};
use crate::report::StructuredReport;

/// Finds the latest report in a backend, parses it and analyzes it.
///
/// The backend is resolved and validated once at construction. After that
/// the analyzer holds no mutable state, so one instance can serve any number
/// of calls, concurrently or not, and a failed call leaves it usable.
#[derive(Clone)]
pub struct ReportAnalyzer {
    storage: Arc<dyn ReportStorage>,
    parser: Arc<dyn ReportParser>,
    analyzer: Arc<dyn Analyzer>,
}

impl ReportAnalyzer {
    /// Create an analyzer for a backend tag and its options.
    ///
    /// ```no_run
    /// use std::collections::BTreeMap;
    /// use reportlens::ReportAnalyzer;
    ///
    /// # async fn run() -> reportlens::Result<()> {
    /// let mut options = BTreeMap::new();
    /// options.insert("directory_path".to_string(), "./reports".to_string());
    ///
    /// let analyzer = ReportAnalyzer::new("local", &options)?;
    /// println!("{}", analyzer.analyze_latest_report().await?);
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    ///
    /// `Error::UnsupportedBackend` for unknown tags and
    /// `Error::Configuration` for missing, malformed or unusable options.
    pub fn new(storage_type: &str, options: &BTreeMap<String, String>) -> Result<Self> {
        let config = StorageConfig::from_options(storage_type, options)?;
        Self::from_config(&config)
    }

    /// Create an analyzer from an already-built storage configuration.
    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        let storage = create_storage(config)?;
        info!(
            backend = storage.backend_name(),
            location = %storage.location(),
            "Report storage ready"
        );
        Ok(Self::with_storage(storage))
    }

    /// Wrap an existing backend with the default parser and analyzer.
    pub fn with_storage(storage: Arc<dyn ReportStorage>) -> Self {
        Self {
            storage,
            parser: Arc::new(DefaultReportParser::default()),
            analyzer: Arc::new(SummaryAnalyzer::default()),
        }
    }

    pub fn with_parser(mut self, parser: Arc<dyn ReportParser>) -> Self {
        self.parser = parser;
        self
    }

    pub fn with_analyzer(mut self, analyzer: Arc<dyn Analyzer>) -> Self {
        self.analyzer = analyzer;
        self
    }

    /// Use the default parser with a fixed report format.
    pub fn with_format(self, format: ReportFormat) -> Self {
        self.with_parser(Arc::new(DefaultReportParser::new(format)))
    }

    pub fn storage(&self) -> &Arc<dyn ReportStorage> {
        &self.storage
    }

    /// Analyze the most recent report.
    ///
    /// # Errors
    ///
    /// `Error::NoReportsFound` when the backend is empty,
    /// `Error::MalformedReport` when the latest report cannot be parsed,
    /// `Error::NotFound` when it disappears twice while being read and
    /// `Error::Storage` for any other backend failure.
    #[instrument(skip(self), fields(backend = self.storage.backend_name()))]
    pub async fn analyze_latest_report(&self) -> Result<Analysis> {
        let report = self.latest_report().await?;
        let analysis = self.analyzer.analyze(&report);
        info!(
            source = %analysis.source,
            metrics = analysis.metric_count,
            "Analyzed latest report"
        );
        Ok(analysis)
    }

    /// Blocking variant of [`Self::analyze_latest_report`].
    ///
    /// Runs on a private current-thread runtime and therefore must not be
    /// called from inside an async context.
    pub fn analyze_latest_report_blocking(&self) -> Result<Analysis> {
        if tokio::runtime::Handle::try_current().is_ok() {
            return Err(Error::Configuration(
                "analyze_latest_report_blocking called from within an async runtime".to_string(),
            ));
        }
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        runtime.block_on(self.analyze_latest_report())
    }

    /// Read and parse the most recent report without analyzing it.
    pub async fn latest_report(&self) -> Result<StructuredReport> {
        let raw = locator::fetch_latest(self.storage.as_ref()).await?;
        debug!(key = %raw.handle.key, bytes = raw.data.len(), "Read latest report");
        self.parser.parse(&raw)
    }

    /// All visible reports, newest first.
    pub async fn list_reports(&self) -> Result<Vec<ReportHandle>> {
        let mut handles = self.storage.list_candidates().await?;
        handles.sort_by(|a, b| self.storage.compare_recency(b, a));
        Ok(handles)
    }
}

impl fmt::Debug for ReportAnalyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReportAnalyzer")
            .field("backend", &self.storage.backend_name())
            .field("location", &self.storage.location())
            .finish_non_exhaustive()
    }
}
