// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Request targets and response schemas for the GitHub App endpoints.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::client::Authorization;
use crate::error::GithubAppError;
use crate::secret::SecretString;

/// A repository named as `owner/repo`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRef {
	pub owner: String,
	pub repo: String,
}

impl RepoRef {
	pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
		Self {
			owner: owner.into(),
			repo: repo.into(),
		}
	}

	/// Parse `owner/repo`. Exactly two non-empty segments are required.
	pub fn parse(value: &str) -> Result<Self, GithubAppError> {
		let invalid = || {
			GithubAppError::Config(format!(
				"repository must be in the form owner/repo but was: {value}"
			))
		};

		let mut parts = value.trim().split('/');
		let owner = parts.next().filter(|s| !s.is_empty()).ok_or_else(invalid)?;
		let repo = parts.next().filter(|s| !s.is_empty()).ok_or_else(invalid)?;
		if parts.next().is_some() {
			return Err(invalid());
		}

		Ok(Self::new(owner, repo))
	}
}

impl fmt::Display for RepoRef {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}/{}", self.owner, self.repo)
	}
}

/// Which credential the caller wants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallationTarget {
	/// Only the app JWT, no exchange.
	None,
	/// A known installation ID.
	ById(u64),
	/// The installation that can access this repository.
	ByRepository(RepoRef),
}

/// Response of `POST /app/installations/{id}/access_tokens`.
#[derive(Debug, Deserialize)]
pub(crate) struct AccessTokenResponse {
	pub token: String,
	pub expires_at: DateTime<Utc>,
}

/// An installation access token.
#[derive(Debug, Clone)]
pub struct InstallationToken {
	token: SecretString,
	expires_at: DateTime<Utc>,
}

impl InstallationToken {
	pub fn new(token: impl Into<SecretString>, expires_at: DateTime<Utc>) -> Self {
		Self {
			token: token.into(),
			expires_at,
		}
	}

	pub fn expose(&self) -> &str {
		self.token.expose()
	}

	pub fn expires_at(&self) -> DateTime<Utc> {
		self.expires_at
	}

	/// `Authorization: token <installation token>` for installation-scoped calls.
	pub fn authorization(&self) -> Authorization<'_> {
		Authorization::Token(self.expose())
	}
}

impl From<AccessTokenResponse> for InstallationToken {
	fn from(response: AccessTokenResponse) -> Self {
		Self::new(response.token, response.expires_at)
	}
}

/// GitHub App installation record.
#[derive(Debug, Clone, Deserialize)]
pub struct Installation {
	pub id: u64,
	pub access_tokens_url: String,
	pub repositories_url: String,
	#[serde(default)]
	pub account: Option<InstallationAccount>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InstallationAccount {
	pub login: String,
}

/// Response of the installation `repositories_url`.
#[derive(Debug, Deserialize)]
pub(crate) struct RepositoryList {
	pub repositories: Vec<Repository>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Repository {
	pub name: String,
	pub owner: RepositoryOwner,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RepositoryOwner {
	pub login: String,
}

impl Repository {
	/// Case-sensitive match on owner login and repository name.
	pub fn matches(&self, target: &RepoRef) -> bool {
		self.owner.login == target.owner && self.name == target.repo
	}
}
