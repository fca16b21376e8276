//! Job handling and the per-repository worker loop.

use std::{
    any::Any,
    backtrace::Backtrace,
    cell::{Cell, RefCell},
    panic::{self, AssertUnwindSafe},
    sync::{Arc, Once},
};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};
use tracker_dl::{resolve_reference, DownloadError, FetchContext, Scheme};
use url::Url;

use crate::{
    annotations::enrich,
    chart::{load_archive, Chart, LICENSE_FILE, README_FILE},
    error::{ImageStoreError, TrackerError},
    logo::fetch_logo,
    services::Services,
    types::{ChartVersion, Job, JobKind, Link, Maintainer, Metadata, Package, Repository},
};

/// Step a job was in when it ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStage {
    Started,
    Retrieving,
    Parsing,
    Enriching,
    Registering,
}

/// Terminal state of a handled job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Registered,
    Unregistered,
    Failed(JobStage),
    Cancelled,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WorkerStats {
    pub registered: usize,
    pub unregistered: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl WorkerStats {
    pub fn record(&mut self, outcome: JobOutcome) {
        match outcome {
            JobOutcome::Registered => self.registered += 1,
            JobOutcome::Unregistered => self.unregistered += 1,
            JobOutcome::Failed(_) => self.failed += 1,
            JobOutcome::Cancelled => self.cancelled += 1,
        }
    }

    pub fn processed(&self) -> usize {
        self.registered + self.unregistered + self.failed + self.cancelled
    }
}

thread_local! {
    static PANIC_BACKTRACE: RefCell<Option<String>> = const { RefCell::new(None) };
}

static PANIC_HOOK: Once = Once::new();

/// Records a backtrace of every panic on the panicking thread so the job
/// boundary can log it.
fn install_panic_hook() {
    PANIC_HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            let backtrace = Backtrace::force_capture().to_string();
            PANIC_BACKTRACE.with(|slot| *slot.borrow_mut() = Some(backtrace));
            previous(info);
        }));
    });
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Processes the register and unregister jobs of one repository.
pub struct Worker {
    services: Arc<Services>,
    repo: Repository,
    cancel: CancellationToken,
}

impl Worker {
    pub fn new(services: Arc<Services>, repo: Repository, cancel: CancellationToken) -> Self {
        Self {
            services,
            repo,
            cancel,
        }
    }

    /// Handles jobs from `queue` until it is closed and drained, or until
    /// cancellation fires.
    ///
    /// Each job runs on a blocking thread. When cancellation wins over an
    /// in-flight job the worker returns without waiting for it; the job
    /// itself stops at its next network call.
    pub async fn run(self: Arc<Self>, mut queue: mpsc::Receiver<Job>) -> WorkerStats {
        let mut stats = WorkerStats::default();
        debug!(repo = %self.repo.name, "worker started");

        loop {
            let job = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                job = queue.recv() => match job {
                    Some(job) => job,
                    None => break,
                },
            };

            let worker = Arc::clone(&self);
            let task = tokio::task::spawn_blocking(move || worker.handle(&job));

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    debug!(repo = %self.repo.name, "abandoning in-flight job");
                    break;
                }
                result = task => match result {
                    Ok(outcome) => stats.record(outcome),
                    Err(err) => {
                        error!(repo = %self.repo.name, %err, "job task failed");
                        stats.record(JobOutcome::Failed(JobStage::Started));
                    }
                },
            }
        }

        debug!(
            repo = %self.repo.name,
            registered = stats.registered,
            unregistered = stats.unregistered,
            failed = stats.failed,
            "worker finished"
        );
        stats
    }

    /// Handles a single job. Panics are contained and reported as a failure
    /// at the stage they happened in.
    pub fn handle(&self, job: &Job) -> JobOutcome {
        install_panic_hook();
        let stage = Cell::new(JobStage::Started);

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            match job.kind {
                JobKind::Register => self.register(job, &stage),
                JobKind::Unregister => self.unregister(job, &stage),
            }
        }));

        match result {
            Ok(outcome) => outcome,
            Err(payload) => {
                let md = &job.chart_version.metadata;
                let message = panic_message(payload.as_ref());
                let backtrace = PANIC_BACKTRACE
                    .with(|slot| slot.borrow_mut().take())
                    .unwrap_or_default();
                error!(
                    repo = %self.repo.name,
                    package = %md.name,
                    version = %md.version,
                    stage = ?stage.get(),
                    panic = %message,
                    backtrace = %backtrace,
                    "job panicked"
                );
                self.report(md, &TrackerError::Panic(message));
                JobOutcome::Failed(stage.get())
            }
        }
    }

    fn register(&self, job: &Job, stage: &Cell<JobStage>) -> JobOutcome {
        let cv = &job.chart_version;
        let index_md = &cv.metadata;
        let ctx = FetchContext::new(self.repo.auth.as_ref(), &self.cancel);

        stage.set(JobStage::Retrieving);
        let chart_url = match self.chart_url(cv) {
            Ok(url) => url,
            Err(err) => return self.fail(index_md, stage.get(), err),
        };
        let data = match self.services.retriever.retrieve(&chart_url, &ctx) {
            Ok(data) => data,
            Err(source) => {
                let err = TrackerError::Retrieve {
                    url: chart_url.to_string(),
                    source,
                };
                return self.fail(index_md, stage.get(), err);
            }
        };

        stage.set(JobStage::Parsing);
        let chart = match load_archive(&data) {
            Ok(chart) => chart,
            Err(source) => {
                let err = TrackerError::Parse {
                    url: chart_url.to_string(),
                    source,
                };
                return self.fail(index_md, stage.get(), err);
            }
        };
        let md = &chart.metadata;
        if md.name != index_md.name || md.version != index_md.version {
            let err = TrackerError::IdentityMismatch {
                name: index_md.name.clone(),
                version: index_md.version.clone(),
            };
            return self.fail(md, stage.get(), err);
        }

        let mut package = self.build_package(cv, &chart, &chart_url);

        if job.store_logo {
            if let Some(icon) = md.icon.as_deref().filter(|icon| !icon.is_empty()) {
                package.logo_url = Some(icon.to_string());
                match self.store_logo(icon) {
                    Ok(id) => package.logo_image_id = id,
                    Err(err) if err.is_cancelled() => return self.cancelled(md),
                    Err(err) => self.warn(md, &err),
                }
            }
        }

        if matches!(Scheme::from_url(&chart_url), Ok(Scheme::Http)) {
            match self.has_provenance_file(&chart_url, &ctx) {
                Ok(signed) => package.signed = signed,
                Err(DownloadError::Cancelled) => return self.cancelled(md),
                Err(err) => self.warn(md, &TrackerError::Provenance(err)),
            }
        }

        stage.set(JobStage::Enriching);
        let package = match enrich(package, &md.annotations) {
            Ok(package) => package,
            Err(err) => return self.fail(md, stage.get(), err.into()),
        };

        stage.set(JobStage::Registering);
        debug!(repo = %self.repo.name, package = %md.name, version = %md.version, "registering package");
        match self.services.pm.register(&package) {
            Ok(()) => JobOutcome::Registered,
            Err(err) => self.fail(md, stage.get(), TrackerError::Register(err)),
        }
    }

    fn unregister(&self, job: &Job, stage: &Cell<JobStage>) -> JobOutcome {
        let md = &job.chart_version.metadata;
        let package = Package::identity(&md.name, &md.version, self.repo.clone());

        stage.set(JobStage::Registering);
        debug!(repo = %self.repo.name, package = %md.name, version = %md.version, "unregistering package");
        match self.services.pm.unregister(&package) {
            Ok(()) => JobOutcome::Unregistered,
            Err(err) => self.fail(md, stage.get(), TrackerError::Unregister(err)),
        }
    }

    fn chart_url(&self, cv: &ChartVersion) -> Result<Url, TrackerError> {
        let reference = cv.urls.first().ok_or(TrackerError::NoChartUrl)?;
        resolve_reference(&self.repo.url, reference).map_err(|source| {
            TrackerError::InvalidChartUrl {
                url: reference.clone(),
                source,
            }
        })
    }

    fn build_package(&self, cv: &ChartVersion, chart: &Chart, chart_url: &Url) -> Package {
        let md = &chart.metadata;
        let mut package = Package::identity(&md.name, &md.version, self.repo.clone());

        package.app_version = md.app_version.clone();
        package.digest = cv.digest.clone();
        package.description = md.description.clone();
        package.keywords = md.keywords.clone();
        package.home_url = md.home.clone();
        package.content_url = Some(chart_url.to_string());
        package.created_at = cv.created.map(|created| created.timestamp());
        package.deprecated = md.deprecated;
        package.values_schema = chart.schema.clone();

        if let Some(readme) = chart.file(README_FILE) {
            package.readme = Some(String::from_utf8_lossy(&readme.data).into_owned());
        }
        package.license = match chart.file(LICENSE_FILE) {
            Some(file) => self.services.ld.detect(&file.data),
            None => md.license.clone().unwrap_or_default(),
        };

        package.maintainers = md
            .maintainers
            .iter()
            .filter_map(|m| {
                let email = m.email.as_deref().filter(|e| !e.is_empty())?;
                Some(Maintainer {
                    name: m.name.clone(),
                    email: email.to_string(),
                })
            })
            .collect();
        package.links = md
            .sources
            .iter()
            .map(|url| {
                Link {
                    name: "source".to_string(),
                    url: url.clone(),
                }
            })
            .collect();
        package.is_operator = md.name.to_lowercase().contains("operator");

        if !md.dependencies.is_empty() {
            let dependencies = md
                .dependencies
                .iter()
                .map(|d| {
                    serde_json::json!({
                        "name": d.name,
                        "version": d.version,
                        "repository": d.repository,
                    })
                })
                .collect();
            package
                .data
                .insert("dependencies".to_string(), serde_json::Value::Array(dependencies));
        }

        package
    }

    /// Fetches the chart icon and saves it, returning the image id.
    /// Images in a format the store does not recognize are skipped.
    /// Repository credentials are never sent with the request.
    fn store_logo(&self, icon: &str) -> Result<Option<String>, TrackerError> {
        let ctx = FetchContext::anonymous(&self.cancel);
        let data = fetch_logo(self.services.retriever.http(), icon, &ctx).map_err(|source| {
            TrackerError::Logo {
                url: icon.to_string(),
                source,
            }
        })?;

        match self.services.is.save_image(&data) {
            Ok(id) => Ok(Some(id)),
            Err(ImageStoreError::UnknownFormat) => {
                trace!(url = icon, "skipping logo in unknown format");
                Ok(None)
            }
            Err(source) => {
                Err(TrackerError::SaveImage {
                    url: icon.to_string(),
                    source,
                })
            }
        }
    }

    /// Probes for a `.prov` file next to the chart archive.
    fn has_provenance_file(&self, chart_url: &Url, ctx: &FetchContext<'_>) -> Result<bool, DownloadError> {
        let raw = format!("{chart_url}.prov");
        let prov_url = Url::parse(&raw).map_err(|source| {
            DownloadError::InvalidUrl {
                url: raw,
                source,
            }
        })?;
        self.services.retriever.http().exists(&prov_url, ctx)
    }

    fn fail(&self, md: &Metadata, stage: JobStage, err: TrackerError) -> JobOutcome {
        if err.is_cancelled() {
            return self.cancelled(md);
        }
        self.warn(md, &err);
        JobOutcome::Failed(stage)
    }

    fn cancelled(&self, md: &Metadata) -> JobOutcome {
        debug!(repo = %self.repo.name, package = %md.name, version = %md.version, "job cancelled");
        JobOutcome::Cancelled
    }

    /// Logs the error and forwards it to the error collector unless the
    /// chart version is deprecated.
    fn warn(&self, md: &Metadata, err: &TrackerError) {
        warn!(
            repo = %self.repo.name,
            package = %md.name,
            version = %md.version,
            "{err}"
        );
        self.report(md, err);
    }

    fn report(&self, md: &Metadata, err: &TrackerError) {
        if md.deprecated {
            return;
        }
        let message = format!("{err} (package: {} version: {})", md.name, md.version);
        self.services.ec.append(&self.repo.repository_id, message);
    }
}
