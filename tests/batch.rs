use async_trait::async_trait;
use pretty_assertions::assert_eq;
use sqlpilot::completion::StaticCompletion;
use sqlpilot::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn templates() -> Arc<TemplateIndex> {
    let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("prompts");
    Arc::new(TemplateIndex::open(root).expect("bundled prompts load"))
}

/// Echoes the last line of the prompt back inside a SQL fence, and fails for
/// prompts mentioning FAIL.
struct EchoCompletion;

#[async_trait]
impl CompletionClient for EchoCompletion {
    async fn complete(&self, prompt: &str, _temperature: f32) -> PilotResult<String> {
        if prompt.contains("FAIL") {
            return Err(PilotError::Completion("request timed out".to_string()));
        }
        let last = prompt.trim_end().lines().last().unwrap_or_default();
        Ok(format!("Rewritten:\n```sql\n{}\n```", last.to_uppercase()))
    }
}

fn orchestrator(kind: TaskKind, options: BatchOptions) -> Orchestrator {
    let params = TaskParams::default();
    let task = Task::new(kind, templates(), Arc::new(EchoCompletion), &params).unwrap();
    Orchestrator::new(task, params, options)
}

fn names(paths: &[PathBuf]) -> Vec<String> {
    paths
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect()
}

#[tokio::test]
async fn test_failed_read_does_not_stop_batch() {
    let dir = tempfile::tempdir().unwrap();
    let q1 = dir.path().join("q1.sql");
    let q2 = dir.path().join("q2.sql");
    let q3 = dir.path().join("q3.sql");
    fs::write(&q1, "select 1").unwrap();
    fs::write(&q3, "select 3").unwrap();

    let jobs: Vec<FileJob> = [&q1, &q2, &q3]
        .into_iter()
        .map(|p| FileJob {
            source: p.clone(),
            output: None,
        })
        .collect();

    let report = orchestrator(TaskKind::Refactor, BatchOptions::default())
        .run_jobs(&jobs)
        .await;

    assert_eq!(report.succeeded(), 2);
    assert_eq!(report.failed(), 1);
    assert!(report.outcomes[0].is_success());
    assert_eq!(report.outcomes[1].path, q2);
    assert_eq!(report.outcomes[1].error_kind(), Some(ErrorKind::Input));
    assert!(report.outcomes[2].is_success());

    assert_eq!(
        fs::read_to_string(&q1).unwrap(),
        "SELECT 1\n/*\nRewritten:\n*/"
    );
    assert_eq!(
        fs::read_to_string(&q3).unwrap(),
        "SELECT 3\n/*\nRewritten:\n*/"
    );
    assert!(!q2.exists());
}

#[tokio::test]
async fn test_completion_failure_is_job_scoped() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("a.sql"), "select a").unwrap();
    fs::write(dir.path().join("b.sql"), "select FAIL").unwrap();
    fs::write(dir.path().join("c.sql"), "select c").unwrap();

    let report = orchestrator(TaskKind::Explain, BatchOptions::default())
        .run(dir.path())
        .await;

    let kinds: Vec<_> = report.outcomes.iter().map(|o| o.error_kind()).collect();
    assert_eq!(kinds, vec![None, Some(ErrorKind::Completion), None]);
    assert_eq!(
        fs::read_to_string(dir.path().join("b.sql")).unwrap(),
        "select FAIL"
    );
}

#[tokio::test]
async fn test_backup_then_overwrite_and_rescan() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("q1.sql"), "select 1").unwrap();
    fs::write(dir.path().join("q2.SQL"), "select 2").unwrap();
    fs::write(dir.path().join("q1.sql.20240101_000000.bak"), "old").unwrap();
    fs::write(dir.path().join("notes.txt"), "not sql").unwrap();

    let options = BatchOptions {
        backup: true,
        recursive: true,
        ..BatchOptions::default()
    };
    let orch = orchestrator(TaskKind::Refactor, options);

    let jobs = orch.plan(dir.path()).unwrap().jobs;
    let sources: Vec<PathBuf> = jobs.iter().map(|j| j.source.clone()).collect();
    assert_eq!(names(&sources), vec!["q1.sql", "q2.SQL"]);

    let report = orch.run(dir.path()).await;
    assert_eq!(report.succeeded(), 2);

    let mut backups = Vec::new();
    for outcome in &report.outcomes {
        match &outcome.result {
            Ok(JobStatus::Written {
                destination,
                backup: Some(backup),
                ..
            }) => {
                assert_eq!(destination, &outcome.path);
                backups.push(backup.clone());
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
    assert_eq!(fs::read_to_string(&backups[0]).unwrap(), "select 1");
    assert_eq!(fs::read_to_string(&backups[1]).unwrap(), "select 2");

    // Backups written by the first run never become jobs.
    let rescanned: Vec<PathBuf> = orch
        .plan(dir.path())
        .unwrap()
        .jobs
        .into_iter()
        .map(|j| j.source)
        .collect();
    assert_eq!(names(&rescanned), vec!["q1.sql", "q2.SQL"]);
}

#[tokio::test]
async fn test_output_path_leaves_source_alone() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("report.sql");
    let out = dir.path().join("report.refactored.sql");
    fs::write(&src, "select x from t").unwrap();

    let report = orchestrator(
        TaskKind::Refactor,
        BatchOptions {
            output: Some(out.clone()),
            ..BatchOptions::default()
        },
    )
    .run(&src)
    .await;

    assert_eq!(report.succeeded(), 1);
    assert_eq!(fs::read_to_string(&src).unwrap(), "select x from t");
    assert!(fs::read_to_string(&out).unwrap().starts_with("SELECT X FROM T"));
}

#[tokio::test]
async fn test_mask_output_flag() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("q.sql");
    fs::write(&src, "select * from u where ssn = '123-45-6789'").unwrap();

    let report = orchestrator(
        TaskKind::Refactor,
        BatchOptions {
            mask_output: true,
            dry_run: true,
            ..BatchOptions::default()
        },
    )
    .run(&src)
    .await;

    match &report.outcomes[0].result {
        Ok(JobStatus::DryRun { output }) => {
            assert!(output.starts_with("SELECT * FROM U WHERE SSN = '[masked-ssn]'"));
            assert!(!output.contains("123-45-6789"));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[cfg(unix)]
#[tokio::test]
async fn test_dangling_file_in_scan_is_input_error() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("a.sql"), "select a").unwrap();
    std::os::unix::fs::symlink(dir.path().join("gone.sql"), dir.path().join("b.sql")).unwrap();
    fs::write(dir.path().join("c.sql"), "select c").unwrap();

    let report = orchestrator(TaskKind::Refactor, BatchOptions::default())
        .run(dir.path())
        .await;

    assert_eq!(report.outcomes.len(), 3);
    assert_eq!(report.outcomes[1].error_kind(), Some(ErrorKind::Input));
    assert_eq!(report.succeeded(), 2);
}

#[tokio::test]
async fn test_nl_to_sql_writes_answer() {
    let dir = tempfile::tempdir().unwrap();
    let schema = dir.path().join("schema.json");
    fs::write(&schema, r#"{"claims": ["id", "amount", "filed_on"]}"#).unwrap();
    let question = dir.path().join("question.txt");
    fs::write(&question, "Total claim amount filed last month?").unwrap();
    let answer = dir.path().join("answer.sql");

    let params = TaskParams {
        dialect: "T-SQL".to_string(),
        schema_path: schema,
        detect_only: false,
    };
    let client = Arc::new(StaticCompletion::new(
        "```sql\nSELECT SUM(amount) FROM claims WHERE filed_on >= DATEADD(month, -1, GETDATE());\n```\nAssumed filed_on is a date.",
    ));
    let task = Task::new(TaskKind::NlToSql, templates(), client.clone(), &params).unwrap();
    let report = Orchestrator::new(
        task,
        params,
        BatchOptions {
            output: Some(answer.clone()),
            ..BatchOptions::default()
        },
    )
    .run(&question)
    .await;

    assert_eq!(report.succeeded(), 1);
    assert_eq!(
        fs::read_to_string(&answer).unwrap(),
        "SELECT SUM(amount) FROM claims WHERE filed_on >= DATEADD(month, -1, GETDATE());\n/*\nAssumed filed_on is a date.\n*/"
    );
    assert!(client.prompts()[0].0.contains("Total claim amount filed last month?"));
}
