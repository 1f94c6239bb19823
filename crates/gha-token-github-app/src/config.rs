// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Configuration for one credential run.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;
use tracing::warn;

use crate::diagnostics::DiagnosticSink;
use crate::error::GithubAppError;
use crate::jwt::AppIdentity;
use crate::secret::SecretString;

pub const DEFAULT_BASE_URL: &str = "https://api.github.com";

/// How an `owner/repo` target is mapped to an installation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResolveStrategy {
	/// `GET /repos/{owner}/{repo}/installation`, one round trip.
	#[default]
	DirectLookup,
	/// List every installation and scan its repositories. Costs one token
	/// mint and one repository listing per installation visited; only for
	/// deployments without the direct lookup endpoint.
	Enumerate,
}

/// Configuration for the GitHub App credential pipeline.
///
/// The private key lives inside [`AppIdentity`] as a [`SecretString`], so
/// `Debug` output never contains key material.
#[derive(Clone)]
pub struct GithubAppConfig {
	identity: AppIdentity,

	/// Base URL for GitHub API (validated, parsed)
	base_url: Url,

	strategy: ResolveStrategy,

	/// Wire diagnostics; `None` unless verbose output was requested
	diagnostics: Option<Arc<dyn DiagnosticSink>>,
}

impl fmt::Debug for GithubAppConfig {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("GithubAppConfig")
			.field("identity", &self.identity)
			.field("base_url", &self.base_url.as_str())
			.field("strategy", &self.strategy)
			.field("verbose", &self.diagnostics.is_some())
			.finish()
	}
}

impl GithubAppConfig {
	/// Validate a base URL.
	///
	/// Requirements:
	/// - Must be a valid URL that can carry a path
	/// - Must use http or https (http only makes sense for local mocks)
	/// - Must have a host
	fn validate_base_url(raw: &str) -> Result<Url, GithubAppError> {
		let url = Url::parse(raw.trim())
			.map_err(|e| GithubAppError::Config(format!("Invalid GitHub base URL '{raw}': {e}")))?;

		match url.scheme() {
			"https" => {}
			"http" => {
				warn!(url = %url, "GitHub base URL is not using https");
			}
			other => {
				return Err(GithubAppError::Config(format!(
					"GitHub base URL must use http or https, got '{other}'"
				)));
			}
		}

		if url.host_str().is_none() || url.cannot_be_a_base() {
			return Err(GithubAppError::Config(format!(
				"GitHub base URL must include a host: '{raw}'"
			)));
		}

		Ok(url)
	}

	/// Create a configuration against `https://api.github.com`.
	pub fn new(
		app_id: impl Into<String>,
		private_key_pem: impl Into<SecretString>,
	) -> Result<Self, GithubAppError> {
		Self::from_identity(AppIdentity::new(app_id, private_key_pem)?)
	}

	pub fn from_identity(identity: AppIdentity) -> Result<Self, GithubAppError> {
		Ok(Self {
			identity,
			base_url: Self::validate_base_url(DEFAULT_BASE_URL)?,
			strategy: ResolveStrategy::default(),
			diagnostics: None,
		})
	}

	/// Set a custom base URL (GitHub Enterprise Server or testing).
	pub fn with_base_url(mut self, url: impl AsRef<str>) -> Result<Self, GithubAppError> {
		self.base_url = Self::validate_base_url(url.as_ref())?;
		Ok(self)
	}

	/// Override the app JWT lifetime.
	pub fn with_jwt_lifetime(mut self, lifetime: Duration) -> Result<Self, GithubAppError> {
		self.identity = self.identity.with_lifetime(lifetime)?;
		Ok(self)
	}

	pub fn with_strategy(mut self, strategy: ResolveStrategy) -> Self {
		self.strategy = strategy;
		self
	}

	/// Render every request and response into `sink`.
	pub fn with_diagnostics(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
		self.diagnostics = Some(sink);
		self
	}

	pub fn identity(&self) -> &AppIdentity {
		&self.identity
	}

	pub fn app_id(&self) -> &str {
		self.identity.app_id()
	}

	pub fn base_url(&self) -> &Url {
		&self.base_url
	}

	pub fn strategy(&self) -> ResolveStrategy {
		self.strategy
	}

	pub fn diagnostics(&self) -> Option<Arc<dyn DiagnosticSink>> {
		self.diagnostics.clone()
	}

	/// Append path segments to the base URL, keeping any prefix such as
	/// `/api/v3`.
	pub fn endpoint(&self, segments: &[&str]) -> Result<Url, GithubAppError> {
		let mut url = self.base_url.clone();
		url.set_query(None);
		url
			.path_segments_mut()
			.map_err(|_| GithubAppError::Config(format!("Invalid base URL: {}", self.base_url)))?
			.pop_if_empty()
			.extend(segments);
		Ok(url)
	}

	/// `{base}/app/installations/{id}/access_tokens`
	pub fn access_tokens_url(&self, installation_id: u64) -> Result<Url, GithubAppError> {
		self.endpoint(&[
			"app",
			"installations",
			&installation_id.to_string(),
			"access_tokens",
		])
	}

	/// `{base}/repos/{owner}/{repo}/installation`
	pub fn repo_installation_url(&self, owner: &str, repo: &str) -> Result<Url, GithubAppError> {
		self.endpoint(&["repos", owner, repo, "installation"])
	}

	/// `{base}/app/installations`
	pub fn installations_url(&self) -> Result<Url, GithubAppError> {
		self.endpoint(&["app", "installations"])
	}
}
