//! External include resolution

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_yaml::Value;
use tracing::debug;

use crate::context::ResolveContext;
use crate::error::{ResolveError, Result};
use crate::fetcher::{check_fragment_size, ConfigFetcher, FetchError};
use crate::merge::deep_merge;
use crate::source::Include;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A fully merged configuration tree.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub config: Value,
    /// Includes accounted by the expand-set over the whole run.
    pub includes_resolved: usize,
}

/// Resolves a configuration and all of its external includes into one tree.
///
/// Resolution is depth-first in declared order. Any failure aborts the run;
/// no partially merged tree is ever returned.
pub struct Resolver {
    fetcher: Arc<dyn ConfigFetcher>,
}

impl Resolver {
    pub fn new(fetcher: Arc<dyn ConfigFetcher>) -> Self {
        Self { fetcher }
    }

    /// Resolves `root_content` under `ctx`. The caller sets the run
    /// deadline on the context beforehand.
    pub async fn resolve(
        &self,
        ctx: &ResolveContext,
        root_content: &str,
    ) -> Result<ResolvedConfig> {
        let root = parse_fragment(ctx, "(root)", root_content)?;
        let config = self.expand(ctx.clone(), root).await?;

        Ok(ResolvedConfig {
            config,
            includes_resolved: ctx.includes_resolved(),
        })
    }

    /// Resolves the fragment's `include:` clause and merges the results
    /// beneath the fragment's own keys (the fragment wins conflicts).
    fn expand(&self, ctx: ResolveContext, fragment: Value) -> BoxFuture<'_, Result<Value>> {
        Box::pin(async move {
            let Value::Mapping(mut map) = fragment else {
                return Err(ResolveError::malformed(
                    "(fragment)",
                    "configuration must be a mapping",
                ));
            };

            let mut merged = Value::Mapping(Default::default());

            if let Some(clause) = map.remove("include") {
                for include in Include::parse_clause(&ctx, &clause)? {
                    ctx.check_execution_time()?;

                    let location = include.location();
                    ctx.admit(&include.id(&ctx), &location)?;

                    debug!(location = %ctx.mask(&location), "resolving include");

                    let content = self.fetch(&ctx, &include).await?;
                    let parsed = parse_fragment(&ctx, &location, &content)?;

                    let child_ctx = match &include {
                        Include::Project {
                            project, ref_name, ..
                        } => ctx.derive(
                            project.clone(),
                            ref_name.clone().unwrap_or_else(|| "HEAD".to_string()),
                        ),
                        _ => ctx.derive(ctx.project.clone(), ctx.sha.clone()),
                    };

                    let resolved = self.expand(child_ctx, parsed).await?;
                    deep_merge(&mut merged, resolved);
                }
            }

            deep_merge(&mut merged, Value::Mapping(map));
            Ok(merged)
        })
    }

    async fn fetch(&self, ctx: &ResolveContext, include: &Include) -> Result<String> {
        // The deadline bounds the run regardless of fan-out: no fetch is
        // begun after it passes.
        ctx.check_execution_time()?;

        let fetched = match include {
            Include::Local { file } => {
                self.fetcher
                    .fetch_local(&ctx.project, &ctx.sha, file)
                    .await
            }
            Include::Project {
                project,
                file,
                ref_name,
            } => {
                self.fetcher
                    .fetch_project(project, ref_name.as_deref(), file)
                    .await
            }
            Include::Remote { url } => self.fetcher.fetch_remote(url).await,
            Include::Template { name } => self.fetcher.fetch_template(name).await,
            Include::Artifact { job, file } => {
                let parent = ctx.parent_pipeline.ok_or_else(|| {
                    ResolveError::malformed(
                        ctx.mask(&include.location()),
                        "including configs from artifacts is only allowed when creating child pipelines",
                    )
                })?;
                self.fetcher.fetch_artifact(parent, job, file).await
            }
        };

        let content = fetched.map_err(|e| match e {
            FetchError::NotFound(_) => ResolveError::NotFound {
                location: ctx.mask(&include.location()),
            },
            other => ResolveError::malformed(ctx.mask(&include.location()), other.to_string()),
        })?;

        check_fragment_size(&content)
            .map_err(|e| ResolveError::malformed(ctx.mask(&include.location()), e.to_string()))?;

        Ok(content)
    }
}

fn parse_fragment(ctx: &ResolveContext, location: &str, content: &str) -> Result<Value> {
    let parsed: Value = serde_yaml::from_str(content)
        .map_err(|e| ResolveError::malformed(ctx.mask(location), ctx.mask(&e.to_string())))?;

    if parsed.is_null() {
        return Err(ResolveError::malformed(ctx.mask(location), "file is empty"));
    }

    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ExpandPolicy, MAX_INCLUDES};
    use crate::fetcher::StubFetcher;
    use std::time::Duration;
    use trellis_core::variables::{Variable, Variables};
    use uuid::Uuid;

    const PROJECT: &str = "group/app";
    const SHA: &str = "deadbeef";

    fn ctx() -> ResolveContext {
        ResolveContext::new(PROJECT, SHA, Variables::new(), ExpandPolicy::Dedup)
    }

    fn resolver(fetcher: StubFetcher) -> Resolver {
        Resolver::new(Arc::new(fetcher))
    }

    #[tokio::test]
    async fn test_root_without_includes_passes_through() {
        let r = resolver(StubFetcher::new());
        let resolved = r.resolve(&ctx(), "build:\n  script: [make]").await.unwrap();

        assert_eq!(resolved.includes_resolved, 0);
        assert!(resolved.config["build"].is_mapping());
    }

    #[tokio::test]
    async fn test_local_include_merged_root_wins() {
        let fetcher = StubFetcher::new().add_local(
            PROJECT,
            SHA,
            "ci/common.yml",
            "variables:\n  TIER: base\ncommon:\n  script: [shared]",
        );
        let r = resolver(fetcher);

        let resolved = r
            .resolve(
                &ctx(),
                "include: ci/common.yml\nvariables:\n  TIER: app\nbuild:\n  script: [make]",
            )
            .await
            .unwrap();

        assert_eq!(resolved.includes_resolved, 1);
        assert_eq!(
            resolved.config["variables"]["TIER"],
            Value::String("app".to_string())
        );
        assert!(resolved.config["common"].is_mapping());
        assert!(resolved.config["build"].is_mapping());
    }

    #[tokio::test]
    async fn test_nested_includes_resolve_depth_first() {
        let fetcher = StubFetcher::new()
            .add_local(PROJECT, SHA, "a.yml", "include: b.yml\nfrom_a:\n  script: [a]")
            .add_local(PROJECT, SHA, "b.yml", "from_b:\n  script: [b]");
        let r = resolver(fetcher);

        let resolved = r.resolve(&ctx(), "include: a.yml").await.unwrap();

        assert_eq!(resolved.includes_resolved, 2);
        assert!(resolved.config["from_a"].is_mapping());
        assert!(resolved.config["from_b"].is_mapping());
    }

    #[tokio::test]
    async fn test_circular_include_fails() {
        let fetcher = StubFetcher::new()
            .add_local(PROJECT, SHA, "a.yml", "include: b.yml")
            .add_local(PROJECT, SHA, "b.yml", "include: a.yml");
        let r = resolver(fetcher);

        let err = r.resolve(&ctx(), "include: a.yml").await.unwrap_err();
        assert!(matches!(err, ResolveError::CircularInclude { .. }));
    }

    #[tokio::test]
    async fn test_include_ceiling_fails_whole_resolution() {
        let mut fetcher = StubFetcher::new();
        for n in 0..=MAX_INCLUDES {
            let content = format!("include: f{}.yml", n + 1);
            fetcher = fetcher.add_local(PROJECT, SHA, &format!("f{n}.yml"), &content);
        }
        let r = resolver(fetcher);

        let err = r.resolve(&ctx(), "include: f0.yml").await.unwrap_err();
        assert!(matches!(err, ResolveError::TooManyIncludes { .. }));
    }

    #[tokio::test]
    async fn test_deadline_stops_further_fetches() {
        let fetcher = StubFetcher::new()
            .with_delay(Duration::from_millis(30))
            .add_local(PROJECT, SHA, "a.yml", "include: b.yml")
            .add_local(PROJECT, SHA, "b.yml", "unreached:\n  script: [x]");
        let r = resolver(fetcher);

        let mut ctx = ctx();
        ctx.set_deadline(Duration::from_millis(10));

        let err = r.resolve(&ctx, "include: a.yml").await.unwrap_err();
        assert_eq!(err, ResolveError::Timeout);
    }

    #[tokio::test]
    async fn test_missing_include_is_not_found() {
        let r = resolver(StubFetcher::new());
        let err = r.resolve(&ctx(), "include: missing.yml").await.unwrap_err();
        assert!(matches!(err, ResolveError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_artifact_include_requires_parent_pipeline() {
        let fetcher = StubFetcher::new().add_artifact("build", "gen.yml", "x:\n  script: [x]");
        let r = resolver(fetcher);

        let err = r
            .resolve(&ctx(), "include:\n  - job: build\n    artifact: gen.yml")
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::Malformed { .. }));
    }

    #[tokio::test]
    async fn test_artifact_include_with_parent_pipeline() {
        let fetcher = StubFetcher::new().add_artifact("build", "gen.yml", "x:\n  script: [x]");
        let r = resolver(fetcher);
        let ctx = ctx().with_parent_pipeline(Uuid::new_v4());

        let resolved = r
            .resolve(&ctx, "include:\n  - job: build\n    artifact: gen.yml")
            .await
            .unwrap();
        assert!(resolved.config["x"].is_mapping());
    }

    #[tokio::test]
    async fn test_error_locations_are_masked() {
        let mut vars = Variables::new();
        vars.push(Variable::masked("SECRET_DIR", "s3cretdir"));
        let ctx = ResolveContext::new(PROJECT, SHA, vars, ExpandPolicy::Dedup);

        let r = resolver(StubFetcher::new());
        let err = r
            .resolve(&ctx, "include: s3cretdir/ci.yml")
            .await
            .unwrap_err();

        let ResolveError::NotFound { location } = err else {
            panic!("expected NotFound, got {err:?}");
        };
        assert!(!location.contains("s3cretdir"));
        assert!(location.contains("[MASKED]"));
    }
}
