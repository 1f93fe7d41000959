//! Include source descriptors

use serde_yaml::Value;

use crate::context::ResolveContext;
use crate::error::ResolveError;

/// Stable identifier of one include occurrence, used for expand-set
/// membership and cycle detection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IncludeId(String);

impl IncludeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A reference to an external configuration fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Include {
    /// File in the same project at the same sha.
    Local { file: String },
    /// File in another project, optionally at a specific ref.
    Project {
        project: String,
        file: String,
        ref_name: Option<String>,
    },
    /// Fragment fetched over http(s).
    Remote { url: String },
    /// Named template from the template store.
    Template { name: String },
    /// File from a parent pipeline job's archive artifacts. Only legal when
    /// the resolution runs for a child pipeline.
    Artifact { job: String, file: String },
}

impl Include {
    /// Parses an `include:` clause: a single string, a single mapping, or a
    /// sequence of either.
    pub fn parse_clause(ctx: &ResolveContext, value: &Value) -> Result<Vec<Include>, ResolveError> {
        match value {
            Value::Sequence(entries) => entries
                .iter()
                .map(|entry| Self::parse_entry(ctx, entry))
                .collect(),
            other => Ok(vec![Self::parse_entry(ctx, other)?]),
        }
    }

    fn parse_entry(ctx: &ResolveContext, value: &Value) -> Result<Include, ResolveError> {
        match value {
            Value::String(s) if s.starts_with("http://") || s.starts_with("https://") => {
                Ok(Include::Remote { url: s.clone() })
            }
            Value::String(s) => Ok(Include::Local { file: s.clone() }),
            Value::Mapping(map) => {
                let field = |key: &str| -> Option<String> {
                    map.get(Value::String(key.to_string()))
                        .and_then(Value::as_str)
                        .map(str::to_string)
                };

                if let Some(file) = field("local") {
                    Ok(Include::Local { file })
                } else if let Some(url) = field("remote") {
                    Ok(Include::Remote { url })
                } else if let Some(name) = field("template") {
                    Ok(Include::Template { name })
                } else if let Some(file) = field("artifact") {
                    let job = field("job").ok_or_else(|| {
                        ResolveError::malformed(
                            ctx.mask(&file),
                            "a job must be provided when including configs from artifacts",
                        )
                    })?;
                    Ok(Include::Artifact { job, file })
                } else if let Some(project) = field("project") {
                    let file = field("file").ok_or_else(|| {
                        ResolveError::malformed(
                            ctx.mask(&project),
                            "a file must be provided when including from another project",
                        )
                    })?;
                    Ok(Include::Project {
                        project,
                        file,
                        ref_name: field("ref"),
                    })
                } else {
                    Err(ResolveError::malformed(
                        "include",
                        "unrecognized include entry",
                    ))
                }
            }
            _ => Err(ResolveError::malformed(
                "include",
                "include entries must be strings or mappings",
            )),
        }
    }

    /// Expand-set identifier for this include as seen from `ctx`.
    ///
    /// Local includes key on project and sha so the same path included from
    /// two different projects stays distinct.
    pub fn id(&self, ctx: &ResolveContext) -> IncludeId {
        let id = match self {
            Include::Local { file } => format!("local:{}:{}:{}", ctx.project, ctx.sha, file),
            Include::Project {
                project,
                file,
                ref_name,
            } => format!(
                "project:{}:{}:{}",
                project,
                ref_name.as_deref().unwrap_or("HEAD"),
                file
            ),
            Include::Remote { url } => format!("remote:{url}"),
            Include::Template { name } => format!("template:{name}"),
            Include::Artifact { job, file } => {
                format!(
                    "artifact:{}:{}:{}",
                    ctx.parent_pipeline
                        .map(|p| p.to_string())
                        .unwrap_or_default(),
                    job,
                    file
                )
            }
        };

        IncludeId::new(id)
    }

    /// Human-readable location for error attribution. Must be masked
    /// before it reaches an external surface.
    pub fn location(&self) -> String {
        match self {
            Include::Local { file } => file.clone(),
            Include::Project { project, file, .. } => format!("{project}/{file}"),
            Include::Remote { url } => url.clone(),
            Include::Template { name } => name.clone(),
            Include::Artifact { job, file } => format!("{job}:{file}"),
        }
    }
}
