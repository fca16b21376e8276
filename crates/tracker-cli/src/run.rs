use std::{
    collections::HashMap,
    fs,
    io::{self, Write},
    path::Path,
    sync::{Arc, Mutex},
};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracker_config::{Config, Repository as RepositoryConfig};
use tracker_core::{
    BoxError, ErrorsCollector, FsImageStore, Job, KeywordLicenseDetector, MemoryErrorsCollector,
    Package, PackageManager, Repository, Services, Worker, WorkerStats,
};
use tracker_dl::{BasicAuth, ClientConfig, HttpClient, HttpFetcher, OciFetcher, Retriever, TokenBucket};

use crate::error::{CliError, CliResult};

const QUEUE_CAPACITY: usize = 64;

/// A job of the job file, addressed to a configured repository.
#[derive(Debug, Deserialize)]
pub struct JobEntry {
    pub repository: String,
    #[serde(flatten)]
    pub job: Job,
}

#[derive(Serialize)]
#[serde(rename_all = "lowercase")]
enum Action {
    Register,
    Unregister,
}

#[derive(Serialize)]
struct Record<'a> {
    action: Action,
    package: &'a Package,
}

/// Package manager printing every call as a JSON line.
pub struct JsonLinesPackageManager<W> {
    out: Mutex<W>,
}

impl<W: Write> JsonLinesPackageManager<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    fn write(&self, action: Action, package: &Package) -> Result<(), BoxError> {
        let line = serde_json::to_string(&Record {
            action,
            package,
        })?;
        let mut out = self.out.lock().map_err(|_| "output writer poisoned")?;
        writeln!(out, "{line}")?;
        out.flush()?;
        Ok(())
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(|e| e.into_inner())
    }
}

impl<W: Write + Send> PackageManager for JsonLinesPackageManager<W> {
    fn register(&self, package: &Package) -> Result<(), BoxError> {
        self.write(Action::Register, package)
    }

    fn unregister(&self, package: &Package) -> Result<(), BoxError> {
        self.write(Action::Unregister, package)
    }
}

pub fn load_jobs(path: &Path) -> CliResult<Vec<JobEntry>> {
    let content = fs::read_to_string(path).map_err(|source| {
        CliError::ReadJobs {
            path: path.to_path_buf(),
            source,
        }
    })?;
    serde_json::from_str(&content).map_err(|source| {
        CliError::ParseJobs {
            path: path.to_path_buf(),
            source,
        }
    })
}

/// Splits jobs per repository, keeping the order of the configuration and
/// the order of jobs within each repository.
pub fn group_jobs<'a>(
    config: &'a Config,
    entries: Vec<JobEntry>,
) -> CliResult<Vec<(&'a RepositoryConfig, Vec<Job>)>> {
    let mut grouped: HashMap<String, Vec<Job>> = HashMap::new();
    for entry in entries {
        if config.get_repository(&entry.repository).is_none() {
            return Err(CliError::UnknownRepository(entry.repository));
        }
        grouped.entry(entry.repository).or_default().push(entry.job);
    }

    Ok(config
        .repositories
        .iter()
        .filter_map(|repo| grouped.remove(&repo.name).map(|jobs| (repo, jobs)))
        .collect())
}

pub fn to_repository(repo: &RepositoryConfig) -> CliResult<Repository> {
    let url = repo.parsed_url()?;
    let mut repository = Repository::new(&repo.repository_id, &repo.name, url);
    if repo.has_auth() {
        repository = repository.with_auth(BasicAuth::new(
            repo.auth_user.clone().unwrap_or_default(),
            repo.auth_pass.clone().unwrap_or_default(),
        ));
    }
    Ok(repository)
}

pub fn build_services(
    config: &Config,
    pm: Arc<dyn PackageManager>,
    ec: Arc<dyn ErrorsCollector>,
) -> CliResult<Services> {
    let client = HttpClient::new(&ClientConfig {
        user_agent: Some(config.user_agent().to_string()),
        timeout: Some(config.http_timeout()?),
        ..Default::default()
    });
    let limiter = Arc::new(TokenBucket::per_hour(
        config.github_rate_limit(),
        config.github_burst(),
    ));

    Ok(Services {
        retriever: Retriever::new(
            HttpFetcher::new(client.clone(), config.github_token.clone(), limiter),
            OciFetcher::new(client),
        ),
        pm,
        is: Arc::new(FsImageStore::new(config.images_path())),
        ld: Arc::new(KeywordLicenseDetector),
        ec,
    })
}

/// Runs one worker per repository until every queue is drained or `cancel`
/// fires.
pub async fn run_jobs(
    config: &Config,
    services: Arc<Services>,
    entries: Vec<JobEntry>,
    cancel: CancellationToken,
) -> CliResult<WorkerStats> {
    let groups = group_jobs(config, entries)?;

    let mut handles = Vec::with_capacity(groups.len());
    for (repo, jobs) in groups {
        let repository = to_repository(repo)?;
        debug!(repo = %repository.name, jobs = jobs.len(), "starting worker");

        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        let worker = Arc::new(Worker::new(services.clone(), repository, cancel.clone()));
        handles.push((repo.name.clone(), tokio::spawn(worker.run(rx))));

        tokio::spawn(async move {
            for job in jobs {
                if tx.send(job).await.is_err() {
                    break;
                }
            }
        });
    }

    let mut total = WorkerStats::default();
    for (name, handle) in handles {
        match handle.await {
            Ok(stats) => {
                total.registered += stats.registered;
                total.unregistered += stats.unregistered;
                total.failed += stats.failed;
                total.cancelled += stats.cancelled;
            }
            Err(err) => error!(repo = %name, %err, "worker task failed"),
        }
    }
    Ok(total)
}

/// `chart-tracker run`: processes the job file and reports collected errors.
pub async fn run(config: &Config, jobs_path: &Path, cancel: CancellationToken) -> CliResult<()> {
    let entries = load_jobs(jobs_path)?;
    info!("Loaded {} job(s) from {}", entries.len(), jobs_path.display());

    let ec = Arc::new(MemoryErrorsCollector::default());
    let pm = Arc::new(JsonLinesPackageManager::new(io::stdout()));
    let services = Arc::new(build_services(config, pm, ec.clone())?);

    let stats = run_jobs(config, services, entries, cancel.clone()).await?;
    info!(
        "Registered {}, unregistered {}, failed {}",
        stats.registered, stats.unregistered, stats.failed
    );

    let errors = ec.errors();
    for (repository_id, message) in &errors {
        error!(repository_id = %repository_id, "{message}");
    }

    if cancel.is_cancelled() {
        warn!("Interrupted before all jobs were processed");
        return Err(CliError::Interrupted);
    }
    if !errors.is_empty() {
        return Err(CliError::JobErrors(errors.len()));
    }
    Ok(())
}
