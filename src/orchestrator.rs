//! Batch orchestration.
//!
//! A root path expands into an ordered list of [`FileJob`]s, which run one
//! after another: read, transform, then either return the result (dry run)
//! or back up, write and optionally stage. A failing job is recorded in the
//! [`BatchReport`] and the batch moves on; jobs already written stay written.

use crate::error::{ErrorKind, PilotError, PilotResult};
use crate::files;
use crate::masking;
use crate::sanitizer;
use crate::stage::{GitStager, Stager};
use crate::tasks::{Task, TaskKind, TaskParams};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// Flags shared by every job in a batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchOptions {
    pub recursive: bool,
    pub backup: bool,
    pub dry_run: bool,
    /// Re-run the output sanitizer over the task result before writing.
    pub sanitize: bool,
    /// Run the masking engine over the task result before writing.
    pub mask_output: bool,
    /// Output file for a single-file root, output directory for a
    /// directory root.
    pub output: Option<PathBuf>,
    pub stage: bool,
}

/// One unit of batch work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileJob {
    pub source: PathBuf,
    pub output: Option<PathBuf>,
}

impl FileJob {
    /// Where the result lands: the explicit output, else the source itself.
    pub fn destination(&self) -> &Path {
        self.output.as_deref().unwrap_or(&self.source)
    }
}

/// Jobs expanded from a root path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    pub jobs: Vec<FileJob>,
    /// Directories under the root that could not be listed.
    pub unreadable: Vec<PathBuf>,
}

/// What a successful job did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    DryRun {
        output: String,
    },
    Written {
        destination: PathBuf,
        backup: Option<PathBuf>,
        staged: bool,
    },
}

#[derive(Debug)]
pub struct JobOutcome {
    pub path: PathBuf,
    pub result: PilotResult<JobStatus>,
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.result.as_ref().err().map(PilotError::kind)
    }
}

/// Result of one batch.
#[derive(Debug)]
pub struct BatchReport {
    pub task: TaskKind,
    pub outcomes: Vec<JobOutcome>,
    /// Set when the batch had nothing to do (missing root, no matches).
    pub notice: Option<String>,
    /// Directories skipped because they could not be listed.
    pub unreadable: Vec<PathBuf>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }
}

pub struct Orchestrator {
    task: Task,
    params: TaskParams,
    options: BatchOptions,
    stager: Box<dyn Stager>,
}

impl Orchestrator {
    pub fn new(task: Task, params: TaskParams, options: BatchOptions) -> Self {
        Self {
            task,
            params,
            options,
            stager: Box::new(GitStager),
        }
    }

    /// Replace the staging collaborator.
    pub fn with_stager(mut self, stager: Box<dyn Stager>) -> Self {
        self.stager = stager;
        self
    }

    pub fn options(&self) -> &BatchOptions {
        &self.options
    }

    /// Expand `root` into jobs. Sources are sorted and unique, and each job
    /// has its own destination.
    pub fn plan(&self, root: &Path) -> PilotResult<Plan> {
        if root.is_file() {
            return Ok(Plan {
                jobs: vec![FileJob {
                    source: root.to_path_buf(),
                    output: self.options.output.clone(),
                }],
                unreadable: Vec::new(),
            });
        }
        if !root.is_dir() {
            return Err(PilotError::input(root, "path does not exist"));
        }

        let scan = files::scan_directory(root, self.options.recursive);
        let jobs = scan
            .files
            .into_iter()
            .map(|source| {
                let output = self.options.output.as_ref().map(|out_dir| {
                    let relative = source.strip_prefix(root).unwrap_or(&source);
                    out_dir.join(relative)
                });
                FileJob { source, output }
            })
            .collect();
        Ok(Plan {
            jobs,
            unreadable: scan.unreadable,
        })
    }

    /// Run every job under `root` in order.
    pub async fn run(&self, root: &Path) -> BatchReport {
        let task = self.task.kind();
        let plan = match self.plan(root) {
            Ok(plan) => plan,
            Err(e) => {
                warn!(task = %task, path = %root.display(), error = %e, "nothing to process");
                return BatchReport {
                    task,
                    outcomes: Vec::new(),
                    notice: Some(format!("Provided path does not exist: {}", root.display())),
                    unreadable: Vec::new(),
                };
            }
        };
        if plan.jobs.is_empty() {
            warn!(task = %task, path = %root.display(), "no SQL files found");
            return BatchReport {
                task,
                outcomes: Vec::new(),
                notice: Some(format!("No SQL files found under {}", root.display())),
                unreadable: plan.unreadable,
            };
        }

        let mut report = self.run_jobs(&plan.jobs).await;
        report.unreadable = plan.unreadable;
        report
    }

    /// Run the given jobs in order. Each job's failure is recorded and the
    /// next job still runs.
    pub async fn run_jobs(&self, jobs: &[FileJob]) -> BatchReport {
        let task = self.task.kind();
        let mut report = BatchReport {
            task,
            outcomes: Vec::with_capacity(jobs.len()),
            notice: None,
            unreadable: Vec::new(),
        };

        info!(task = %task, jobs = jobs.len(), "starting batch");
        for job in jobs {
            let result = self.run_job(job).await;
            if let Err(e) = &result {
                match e.kind() {
                    ErrorKind::Filesystem => error!(
                        task = %task,
                        path = %job.source.display(),
                        error = %e,
                        "write failed, file may be left in its previous state"
                    ),
                    kind => error!(
                        task = %task,
                        path = %job.source.display(),
                        kind = %kind,
                        error = %e,
                        "job failed"
                    ),
                }
            }
            report.outcomes.push(JobOutcome {
                path: job.source.clone(),
                result,
            });
        }

        info!(
            task = %task,
            succeeded = report.succeeded(),
            failed = report.failed(),
            "batch finished"
        );
        report
    }

    /// Drive a single job through read, transform, backup, write and stage.
    /// Nothing touches the filesystem until the result is complete.
    pub async fn run_job(&self, job: &FileJob) -> PilotResult<JobStatus> {
        let task = self.task.kind();
        info!(task = %task, path = %job.source.display(), "processing");

        let text = files::read_source(&job.source)?;
        let mut result = self.task.run(&text, &self.params).await?;
        if self.options.sanitize {
            result = sanitizer::sanitize(&result);
        }
        if self.options.mask_output {
            result = masking::mask(&result);
        }

        if self.options.dry_run {
            return Ok(JobStatus::DryRun { output: result });
        }

        let backup = if self.options.backup {
            Some(files::backup(&job.source)?)
        } else {
            None
        };

        let destination = job.destination().to_path_buf();
        files::write_output(&destination, &result)?;
        info!(task = %task, path = %destination.display(), "updated");

        let staged = self.options.stage && self.stage(task, &destination);

        Ok(JobStatus::Written {
            destination,
            backup,
            staged,
        })
    }

    fn stage(&self, task: TaskKind, path: &Path) -> bool {
        match self.stager.stage(path) {
            Ok(()) => {
                info!(task = %task, path = %path.display(), "staged");
                true
            }
            Err(e) => {
                warn!(task = %task, path = %path.display(), error = %e, "stage failed");
                false
            }
        }
    }
}
