//! Launch argument templates.
//!
//! Arguments and environment values of a launched binary may contain
//! placeholders that are filled in from the orchestrator right before the
//! process is spawned:
//!
//! | Placeholder | Value |
//! |---|---|
//! | `{datadir}` | the component's data directory |
//! | `{tempdir}` | a fresh scratch directory |
//! | `{jwt_path}` | the shared engine secret file |
//! | `{payload:<key>}` | a stored payload written to a JSON file |
//! | `{endpoint:<component-id>:<name>}` | a stable endpoint URL of another component |
//! | `{key:<role>}` | a derived dev key for the component's chain |
//! | `{key:<role>/<chain>}` | a derived dev key for an explicit chain |
//!
//! `{{` and `}}` produce literal braces. Unknown placeholders are errors.

use crate::error::{OrchestratorError, Result};
use crate::orchestrator::{LocalOrchestrator, Orchestrator};
use mamut_core::ComponentId;

/// Supplies values for placeholders.
pub trait Resolver {
    /// Resolves placeholder `name` with optional argument `arg`.
    fn resolve(&self, name: &str, arg: Option<&str>) -> Result<String>;
}

/// Expands every placeholder in `template`.
pub fn render(template: &str, resolver: &dyn Resolver) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.char_indices().peekable();

    while let Some((start, c)) = chars.next() {
        match c {
            '{' if matches!(chars.peek(), Some((_, '{'))) => {
                chars.next();
                out.push('{');
            }
            '}' if matches!(chars.peek(), Some((_, '}'))) => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let rest = &template[start + 1..];
                let end = rest
                    .find('}')
                    .ok_or_else(|| OrchestratorError::template(template, "unterminated placeholder"))?;
                let body = &rest[..end];
                let (name, arg) = match body.split_once(':') {
                    Some((name, arg)) => (name, Some(arg)),
                    None => (body, None),
                };
                out.push_str(&resolver.resolve(name, arg)?);
                // Skip past the closing brace.
                for _ in 0..=body.chars().count() {
                    chars.next();
                }
            }
            '}' => return Err(OrchestratorError::template(template, "unmatched '}'")),
            c => out.push(c),
        }
    }
    Ok(out)
}

/// Resolves placeholders for one component against a [`LocalOrchestrator`].
pub struct LaunchContext<'a> {
    orch: &'a LocalOrchestrator,
    id: &'a ComponentId,
}

impl<'a> LaunchContext<'a> {
    /// Creates a context for launching `id`.
    pub fn new(orch: &'a LocalOrchestrator, id: &'a ComponentId) -> Self {
        Self { orch, id }
    }

    fn find_component(&self, text: &str) -> Result<ComponentId> {
        self.orch
            .registries()
            .ids()
            .into_iter()
            .find(|id| id.to_string() == text)
            .ok_or_else(|| OrchestratorError::missing_dependency(self.id.to_string(), text))
    }

    fn key(&self, role: &str) -> Result<String> {
        if role.contains('/') {
            return Ok(self.orch.keys().derive(role).to_hex());
        }
        let chain = self.id.chain_id().ok_or_else(|| {
            OrchestratorError::template(
                format!("{{key:{role}}}"),
                format!("{} has no chain; use {{key:{role}/<chain>}}", self.id),
            )
        })?;
        Ok(self.orch.keys().key(role, chain).to_hex())
    }
}

impl Resolver for LaunchContext<'_> {
    fn resolve(&self, name: &str, arg: Option<&str>) -> Result<String> {
        let path = |p: std::path::PathBuf| p.display().to_string();
        match (name, arg) {
            ("datadir", None) => Ok(path(self.orch.datadir(self.id)?)),
            ("tempdir", None) => Ok(path(self.orch.scope().temp_dir()?)),
            ("jwt_path", None) => Ok(path(self.orch.jwt_path()?)),
            ("payload", Some(key)) => Ok(path(self.orch.payload_file(key)?)),
            ("endpoint", Some(arg)) => {
                let (component, endpoint) = arg.rsplit_once(':').ok_or_else(|| {
                    OrchestratorError::template(
                        format!("{{endpoint:{arg}}}"),
                        "expected {endpoint:<component-id>:<name>}",
                    )
                })?;
                let target = self.find_component(component)?;
                self.orch.endpoint_url(&target, endpoint)
            }
            ("key", Some(role)) => self.key(role),
            _ => {
                let text = match arg {
                    Some(arg) => format!("{{{name}:{arg}}}"),
                    None => format!("{{{name}}}"),
                };
                Err(OrchestratorError::template(text, "unknown placeholder"))
            }
        }
    }
}
