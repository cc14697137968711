//! Access gate for incoming requests.
//!
//! A request is authorized when its project exists and its token is listed
//! for that project. Both failure causes produce the same
//! [`ServerError::NotFound`], so a caller cannot tell which projects exist.
//!
//! Tokens are compared through their SHA-256 digests so the comparison time
//! does not depend on how long a matching prefix is.

use crate::config::{ProjectConfig, ProjectStore};
use crate::error::{ServerError, ServerResult};
use depot_protocol::Authority;
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Checks credentials against the project configuration store.
#[derive(Clone)]
pub struct AccessGate {
    projects: Arc<dyn ProjectStore>,
}

impl AccessGate {
    /// Creates a gate over `projects`.
    pub fn new(projects: Arc<dyn ProjectStore>) -> Self {
        Self { projects }
    }

    /// Authorizes `token` for `project_name`.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::NotFound`] if the project does not exist or the
    /// token is not one of its tokens.
    pub fn authorize(&self, project_name: &str, token: &str) -> ServerResult<ProjectConfig> {
        let project = self.projects.project(project_name);
        let presented = digest(token);

        // The presented token is hashed even when the project is unknown.
        let accepted = project.as_ref().is_some_and(|p| {
            p.access_tokens
                .iter()
                .fold(false, |found, t| found | constant_eq(&digest(t), &presented))
        });

        match project {
            Some(project) if accepted => Ok(project),
            _ => Err(ServerError::NotFound),
        }
    }

    /// Authorizes the credentials carried by a request.
    ///
    /// # Errors
    ///
    /// See [`AccessGate::authorize`].
    pub fn authorize_authority(&self, authority: &Authority) -> ServerResult<ProjectConfig> {
        self.authorize(&authority.project_name, &authority.access_token)
    }

    /// Returns the configured project names.
    pub fn project_names(&self) -> Vec<String> {
        self.projects.project_names()
    }
}

impl std::fmt::Debug for AccessGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessGate")
            .field("projects", &self.projects.project_names())
            .finish()
    }
}

fn digest(token: &str) -> [u8; 32] {
    Sha256::digest(token.as_bytes()).into()
}

fn constant_eq(a: &[u8; 32], b: &[u8; 32]) -> bool {
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProjectsSettings;

    fn gate() -> AccessGate {
        AccessGate::new(Arc::new(ProjectsSettings::new(vec![
            ProjectConfig::new("game", ["alpha", "beta"]),
            ProjectConfig::new("locked", Vec::<String>::new()),
        ])))
    }

    #[test]
    fn listed_token_is_accepted() {
        let gate = gate();
        assert_eq!(gate.authorize("game", "alpha").unwrap().name, "game");
        assert_eq!(gate.authorize("game", "beta").unwrap().name, "game");
    }

    #[test]
    fn failures_are_indistinguishable() {
        let gate = gate();
        let wrong_token = gate.authorize("game", "gamma").unwrap_err();
        let unknown_project = gate.authorize("nope", "alpha").unwrap_err();

        assert!(matches!(wrong_token, ServerError::NotFound));
        assert!(matches!(unknown_project, ServerError::NotFound));
        assert_eq!(wrong_token.to_string(), unknown_project.to_string());
        assert_eq!(wrong_token.response(), unknown_project.response());
    }

    #[test]
    fn project_without_tokens_rejects_everyone() {
        let gate = gate();
        assert!(gate.authorize("locked", "").is_err());
        assert!(gate.authorize("locked", "alpha").is_err());
    }

    #[test]
    fn token_comparison_is_exact() {
        let gate = gate();
        assert!(gate.authorize("game", "alph").is_err());
        assert!(gate.authorize("game", "alphaa").is_err());
        assert!(gate.authorize("game", "ALPHA").is_err());
    }

    #[test]
    fn authority_is_checked() {
        let gate = gate();
        assert!(gate
            .authorize_authority(&Authority::new("game", "alpha", "sam"))
            .is_ok());
        assert!(gate
            .authorize_authority(&Authority::new("game", "wrong", "sam"))
            .is_err());
    }
}
