// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Error types for GitHub App credential issuance.

use thiserror::Error;

/// Errors that can occur while issuing a GitHub App credential.
///
/// None of these are retried locally. Every variant is fatal to the run and
/// bubbles up to the caller unchanged.
#[derive(Debug, Error)]
pub enum GithubAppError {
	/// Missing, malformed or contradictory input, detected before any
	/// network call.
	#[error("Configuration error: {0}")]
	Config(String),

	/// Private key unreadable or not a valid PEM-encoded RSA key.
	#[error("Private key error: {0}")]
	Key(String),

	/// JWT construction or signing failed.
	#[error("JWT signing error: {0}")]
	Signing(String),

	/// Transport-level failure reaching GitHub.
	#[error("Network error: {0}")]
	Network(#[from] reqwest::Error),

	/// GitHub responded outside the 2xx range.
	#[error("GitHub API error: {status} from {method} {url} - {message}")]
	ApiError {
		status: u16,
		method: String,
		url: String,
		message: String,
	},

	/// Response body did not match the expected schema.
	#[error("Invalid response from GitHub: {0}")]
	Decode(String),

	/// No installation of the app can access the repository.
	#[error("Unable to find repository {owner}/{repo} in installations of app ID {app_id}")]
	InstallationNotFound {
		owner: String,
		repo: String,
		app_id: String,
	},
}

impl GithubAppError {
	/// Create an API error from the status code, request line and raw body.
	pub fn api_error(
		status: u16,
		method: impl Into<String>,
		url: impl Into<String>,
		body: &str,
	) -> Self {
		Self::ApiError {
			status,
			method: method.into(),
			url: url.into(),
			message: summarize_body(body),
		}
	}

	/// Create an installation not found error.
	pub fn installation_not_found(
		owner: impl Into<String>,
		repo: impl Into<String>,
		app_id: impl Into<String>,
	) -> Self {
		Self::InstallationNotFound {
			owner: owner.into(),
			repo: repo.into(),
			app_id: app_id.into(),
		}
	}

	/// HTTP status carried by an [`GithubAppError::ApiError`].
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::ApiError { status, .. } => Some(*status),
			Self::Network(e) => e.status().map(|s| s.as_u16()),
			_ => None,
		}
	}
}

/// Reduce an error body to a single line.
///
/// GitHub error payloads carry a `message` field; anything else is flattened.
fn summarize_body(body: &str) -> String {
	if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
		if let Some(message) = value.get("message").and_then(|m| m.as_str()) {
			return message.to_string();
		}
	}

	let flattened = body.split_whitespace().collect::<Vec<_>>().join(" ");
	if flattened.is_empty() {
		"<empty body>".to_string()
	} else {
		flattened
	}
}
