//! YAML to job-DAG expansion
//!
//! Takes a fully resolved configuration tree and produces the seed of a
//! pipeline: stages in declared order, each holding the jobs that survived
//! rule filtering, with their dependency edges validated acyclic.

use std::collections::{HashMap, HashSet};

use serde_yaml::Value;
use thiserror::Error;

use trellis_core::variables::{Variable, Variables};

use crate::rules::{evaluate_rules, Rule, RuleError, When};

/// Stage list used when the configuration declares none.
pub const DEFAULT_STAGES: [&str; 5] = [".pre", "build", "test", "deploy", ".post"];

/// Top-level keys that are not job definitions.
const RESERVED_KEYS: [&str; 5] = ["stages", "workflow", "include", "variables", "default"];

/// Errors raised while expanding a configuration into a job DAG.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProcessError {
    #[error("configuration must be a mapping")]
    NotAMapping,

    #[error("no jobs defined")]
    NoJobs,

    #[error("job `{job}` has no script")]
    MissingScript { job: String },

    #[error("job `{job}` references unknown stage `{stage}`")]
    UnknownStage { job: String, stage: String },

    #[error("job `{job}` needs undefined job `{need}`")]
    UnknownNeed { job: String, need: String },

    #[error("job `{job}` needs job `{need}`, which was removed by rules")]
    FilteredNeed { job: String, need: String },

    #[error("job `{job}` is part of a circular dependency chain")]
    NeedCycle { job: String },

    #[error("job `{job}`: {message}")]
    InvalidJob { job: String, message: String },

    #[error(transparent)]
    Rule(#[from] RuleError),
}

/// Artifact retention declared on a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpirePolicy {
    Never,
    In(chrono::Duration),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactSpec {
    pub paths: Vec<String>,
    pub expire_in: Option<ExpirePolicy>,
}

/// One job as seeded from configuration, before persistence.
#[derive(Debug, Clone, PartialEq)]
pub struct JobSeed {
    pub name: String,
    pub stage: String,
    pub script: Vec<String>,
    pub needs: Vec<String>,
    pub tags: Vec<String>,
    pub when: When,
    pub allow_failure: bool,
    pub variables: Variables,
    pub artifacts: Option<ArtifactSpec>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StageSeed {
    pub name: String,
    pub jobs: Vec<JobSeed>,
}

/// The seeded job DAG for one pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSeed {
    pub stages: Vec<StageSeed>,
    /// Jobs defined in configuration, before rule filtering. Lets the
    /// caller distinguish "everything filtered out" from "nothing defined".
    pub defined_jobs: usize,
}

impl PipelineSeed {
    /// Jobs that will actually be created.
    pub fn total_size(&self) -> usize {
        self.stages.iter().map(|s| s.jobs.len()).sum()
    }

    pub fn jobs(&self) -> impl Iterator<Item = &JobSeed> {
        self.stages.iter().flat_map(|s| s.jobs.iter())
    }
}

/// Expands a resolved configuration into a [`PipelineSeed`].
///
/// `request_vars` take precedence over configuration-level variables, which
/// take precedence over nothing; job-level variables sit between the two.
pub fn process(config: &Value, request_vars: &Variables) -> Result<PipelineSeed, ProcessError> {
    let map = config.as_mapping().ok_or(ProcessError::NotAMapping)?;

    let stages = parse_stages(config);
    let global_vars = parse_variables(map.get("variables"));

    let mut defined: Vec<JobSeed> = Vec::new();
    let mut kept_names: HashSet<String> = HashSet::new();

    for (key, body) in map {
        let Some(name) = key.as_str() else { continue };

        // Keys starting with `.` are hidden templates, never jobs.
        if RESERVED_KEYS.contains(&name) || name.starts_with('.') {
            continue;
        }

        let job = parse_job(name, body, &stages)?;

        let mut eval_vars = global_vars.clone();
        eval_vars.merge(&job.variables);
        eval_vars.merge(request_vars);

        let rules = match body.get("rules") {
            Some(rules_value) => Rule::parse_list(rules_value)?,
            None => Vec::new(),
        };

        let seed = if rules.is_empty() {
            Some(job)
        } else {
            match evaluate_rules(&rules, &eval_vars)? {
                Some(matched) if matched.when != When::Never => {
                    let mut job = job;
                    job.when = matched.when;
                    if let Some(allow_failure) = matched.allow_failure {
                        job.allow_failure = allow_failure;
                    }
                    Some(job)
                }
                _ => None,
            }
        };

        match seed {
            Some(job) if job.when != When::Never => {
                kept_names.insert(job.name.clone());
                defined.push(job);
            }
            _ => {
                // Filtered out, but still counts as defined.
                defined.push(JobSeed {
                    when: When::Never,
                    ..parse_job(name, body, &stages)?
                });
            }
        }
    }

    if defined.is_empty() {
        return Err(ProcessError::NoJobs);
    }

    let all_names: HashSet<&str> = defined.iter().map(|j| j.name.as_str()).collect();
    let kept: Vec<&JobSeed> = defined
        .iter()
        .filter(|j| kept_names.contains(&j.name))
        .collect();

    for job in &kept {
        for need in &job.needs {
            if !all_names.contains(need.as_str()) {
                return Err(ProcessError::UnknownNeed {
                    job: job.name.clone(),
                    need: need.clone(),
                });
            }
            if !kept_names.contains(need) {
                return Err(ProcessError::FilteredNeed {
                    job: job.name.clone(),
                    need: need.clone(),
                });
            }
        }
    }

    check_need_cycles(&kept)?;

    let mut stage_seeds: Vec<StageSeed> = Vec::new();
    for stage in &stages {
        let jobs: Vec<JobSeed> = kept
            .iter()
            .filter(|j| &j.stage == stage)
            .map(|j| (*j).clone())
            .collect();

        if !jobs.is_empty() {
            stage_seeds.push(StageSeed {
                name: stage.clone(),
                jobs,
            });
        }
    }

    Ok(PipelineSeed {
        stages: stage_seeds,
        defined_jobs: defined.len(),
    })
}

fn parse_stages(config: &Value) -> Vec<String> {
    config
        .get("stages")
        .and_then(Value::as_sequence)
        .map(|seq| {
            seq.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_else(|| DEFAULT_STAGES.iter().map(|s| s.to_string()).collect())
}

fn parse_variables(value: Option<&Value>) -> Variables {
    let Some(map) = value.and_then(Value::as_mapping) else {
        return Variables::new();
    };

    map.iter()
        .filter_map(|(k, v)| {
            let key = k.as_str()?;
            let value = scalar_to_string(v)?;
            Some(Variable::new(key, value))
        })
        .collect()
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn parse_job(name: &str, body: &Value, stages: &[String]) -> Result<JobSeed, ProcessError> {
    let body_map = body.as_mapping().ok_or_else(|| ProcessError::InvalidJob {
        job: name.to_string(),
        message: "job definition must be a mapping".to_string(),
    })?;

    let script = match body_map.get("script") {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Sequence(seq)) => seq
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    };

    if script.is_empty() {
        return Err(ProcessError::MissingScript {
            job: name.to_string(),
        });
    }

    let stage = body_map
        .get("stage")
        .and_then(Value::as_str)
        .unwrap_or("test")
        .to_string();

    if !stages.contains(&stage) {
        return Err(ProcessError::UnknownStage {
            job: name.to_string(),
            stage,
        });
    }

    let needs = string_list(body_map.get("needs"));
    let tags = string_list(body_map.get("tags"));

    let when = match body_map.get("when").and_then(Value::as_str) {
        Some(s) => When::parse(s)?,
        None => When::OnSuccess,
    };

    let allow_failure = body_map
        .get("allow_failure")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let artifacts = match body_map.get("artifacts") {
        Some(spec) => Some(parse_artifacts(name, spec)?),
        None => None,
    };

    Ok(JobSeed {
        name: name.to_string(),
        stage,
        script,
        needs,
        tags,
        when,
        allow_failure,
        variables: parse_variables(body_map.get("variables")),
        artifacts,
    })
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_sequence)
        .map(|seq| {
            seq.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn parse_artifacts(job: &str, spec: &Value) -> Result<ArtifactSpec, ProcessError> {
    let map = spec.as_mapping().ok_or_else(|| ProcessError::InvalidJob {
        job: job.to_string(),
        message: "artifacts must be a mapping".to_string(),
    })?;

    let expire_in = match map.get("expire_in").and_then(Value::as_str) {
        Some(s) => Some(parse_expire_in(s).map_err(|message| ProcessError::InvalidJob {
            job: job.to_string(),
            message,
        })?),
        None => None,
    };

    Ok(ArtifactSpec {
        paths: string_list(map.get("paths")),
        expire_in,
    })
}

/// Parses an `expire_in` duration: `never`, a bare number of seconds, or
/// `<n> <unit>` segments (`1 day`, `3 weeks 2 days`).
pub fn parse_expire_in(input: &str) -> Result<ExpirePolicy, String> {
    let input = input.trim();

    if input.eq_ignore_ascii_case("never") {
        return Ok(ExpirePolicy::Never);
    }

    if let Ok(seconds) = input.parse::<i64>() {
        return Ok(ExpirePolicy::In(chrono::Duration::seconds(seconds)));
    }

    let mut total = chrono::Duration::zero();
    let mut tokens = input
        .split_whitespace()
        .filter(|t| !t.eq_ignore_ascii_case("and"));

    let mut any = false;
    while let Some(amount) = tokens.next() {
        let amount: i64 = amount
            .parse()
            .map_err(|_| format!("invalid expire_in `{input}`"))?;
        let unit = tokens
            .next()
            .ok_or_else(|| format!("invalid expire_in `{input}`"))?;

        let seconds_per_unit = match unit.trim_end_matches('s') {
            "sec" | "second" => 1,
            "min" | "minute" => 60,
            "hr" | "hour" => 3600,
            "day" => 86_400,
            "week" => 7 * 86_400,
            "month" => 30 * 86_400,
            "year" => 365 * 86_400,
            other => return Err(format!("unknown expire_in unit `{other}`")),
        };

        total += chrono::Duration::seconds(amount * seconds_per_unit);
        any = true;
    }

    if !any {
        return Err(format!("invalid expire_in `{input}`"));
    }

    Ok(ExpirePolicy::In(total))
}

fn check_need_cycles(jobs: &[&JobSeed]) -> Result<(), ProcessError> {
    let by_name: HashMap<&str, &JobSeed> =
        jobs.iter().map(|j| (j.name.as_str(), *j)).collect();

    #[derive(Clone, Copy, PartialEq)]
    enum Color {
        White,
        Gray,
        Black,
    }

    let mut colors: HashMap<&str, Color> =
        jobs.iter().map(|j| (j.name.as_str(), Color::White)).collect();

    fn visit<'a>(
        name: &'a str,
        by_name: &HashMap<&'a str, &'a JobSeed>,
        colors: &mut HashMap<&'a str, Color>,
    ) -> Result<(), ProcessError> {
        match colors[name] {
            Color::Black => return Ok(()),
            Color::Gray => {
                return Err(ProcessError::NeedCycle {
                    job: name.to_string(),
                })
            }
            Color::White => {}
        }

        colors.insert(name, Color::Gray);

        if let Some(job) = by_name.get(name) {
            for need in &job.needs {
                visit(need.as_str(), by_name, colors)?;
            }
        }

        colors.insert(name, Color::Black);
        Ok(())
    }

    // Declaration order keeps the reported cycle member deterministic.
    for job in jobs {
        visit(job.name.as_str(), &by_name, &mut colors)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(yaml: &str) -> Value {
        serde_yaml::from_str(yaml).unwrap()
    }

    fn no_vars() -> Variables {
        Variables::new()
    }

    #[test]
    fn test_basic_expansion_in_stage_order() {
        let c = config(
            r#"
            stages: [build, test]
            run_tests:
              stage: test
              script: [cargo test]
            compile:
              stage: build
              script: [cargo build]
            "#,
        );

        let seed = process(&c, &no_vars()).unwrap();
        assert_eq!(seed.total_size(), 2);
        assert_eq!(seed.stages[0].name, "build");
        assert_eq!(seed.stages[0].jobs[0].name, "compile");
        assert_eq!(seed.stages[1].jobs[0].name, "run_tests");
    }

    #[test]
    fn test_default_stages_and_default_stage() {
        let c = config("unit:\n  script: [make check]");

        let seed = process(&c, &no_vars()).unwrap();
        assert_eq!(seed.stages[0].name, "test");
    }

    #[test]
    fn test_hidden_and_reserved_keys_skipped() {
        let c = config(
            r#"
            variables:
              TIER: app
            .template:
              script: [ignored]
            build:
              stage: build
              script: [make]
            "#,
        );

        let seed = process(&c, &no_vars()).unwrap();
        assert_eq!(seed.defined_jobs, 1);
        assert_eq!(seed.total_size(), 1);
    }

    #[test]
    fn test_missing_script_fails() {
        let c = config("broken:\n  stage: test");
        assert_eq!(
            process(&c, &no_vars()).unwrap_err(),
            ProcessError::MissingScript {
                job: "broken".to_string()
            }
        );
    }

    #[test]
    fn test_unknown_stage_fails() {
        let c = config("job:\n  stage: missing\n  script: [x]");
        assert!(matches!(
            process(&c, &no_vars()).unwrap_err(),
            ProcessError::UnknownStage { .. }
        ));
    }

    #[test]
    fn test_unknown_need_fails() {
        let c = config(
            r#"
            a:
              script: [x]
              needs: [ghost]
            "#,
        );
        assert_eq!(
            process(&c, &no_vars()).unwrap_err(),
            ProcessError::UnknownNeed {
                job: "a".to_string(),
                need: "ghost".to_string()
            }
        );
    }

    #[test]
    fn test_need_cycle_fails() {
        let c = config(
            r#"
            a:
              script: [x]
              needs: [b]
            b:
              script: [x]
              needs: [a]
            "#,
        );
        assert!(matches!(
            process(&c, &no_vars()).unwrap_err(),
            ProcessError::NeedCycle { .. }
        ));
    }

    #[test]
    fn test_rules_filter_jobs() {
        let c = config(
            r#"
            always_on:
              script: [x]
            gated:
              script: [x]
              rules:
                - if: $DEPLOY == "yes"
            "#,
        );

        let seed = process(&c, &no_vars()).unwrap();
        assert_eq!(seed.defined_jobs, 2);
        assert_eq!(seed.total_size(), 1);

        let vars: Variables = [Variable::new("DEPLOY", "yes")].into_iter().collect();
        let seed = process(&c, &vars).unwrap();
        assert_eq!(seed.total_size(), 2);
    }

    #[test]
    fn test_need_on_filtered_job_fails() {
        let c = config(
            r#"
            gated:
              script: [x]
              rules:
                - if: $DEPLOY == "yes"
            dependent:
              script: [x]
              needs: [gated]
            "#,
        );

        assert_eq!(
            process(&c, &no_vars()).unwrap_err(),
            ProcessError::FilteredNeed {
                job: "dependent".to_string(),
                need: "gated".to_string()
            }
        );
    }

    #[test]
    fn test_rule_match_overrides_when_and_allow_failure() {
        let c = config(
            r#"
            deploy:
              script: [x]
              rules:
                - if: $CI_COMMIT_BRANCH == "main"
                  when: manual
                  allow_failure: true
            "#,
        );

        let vars: Variables = [Variable::new("CI_COMMIT_BRANCH", "main")]
            .into_iter()
            .collect();
        let seed = process(&c, &vars).unwrap();
        let job = seed.jobs().next().unwrap();
        assert_eq!(job.when, When::Manual);
        assert!(job.allow_failure);
    }

    #[test]
    fn test_artifact_expiry_parsing() {
        let c = config(
            r#"
            build:
              stage: build
              script: [make]
              artifacts:
                paths: [target/]
                expire_in: 1 day
            "#,
        );

        let seed = process(&c, &no_vars()).unwrap();
        let job = seed.jobs().next().unwrap();
        let artifacts = job.artifacts.as_ref().unwrap();
        assert_eq!(
            artifacts.expire_in,
            Some(ExpirePolicy::In(chrono::Duration::days(1)))
        );
    }

    #[test]
    fn test_expire_in_grammar() {
        assert_eq!(parse_expire_in("never").unwrap(), ExpirePolicy::Never);
        assert_eq!(
            parse_expire_in("3600").unwrap(),
            ExpirePolicy::In(chrono::Duration::hours(1))
        );
        assert_eq!(
            parse_expire_in("3 weeks and 2 days").unwrap(),
            ExpirePolicy::In(chrono::Duration::days(23))
        );
        assert_eq!(
            parse_expire_in("30 minutes").unwrap(),
            ExpirePolicy::In(chrono::Duration::minutes(30))
        );
        assert!(parse_expire_in("soonish").is_err());
    }

    #[test]
    fn test_no_jobs_at_all() {
        let c = config("variables:\n  A: b");
        assert_eq!(process(&c, &no_vars()).unwrap_err(), ProcessError::NoJobs);
    }
}
