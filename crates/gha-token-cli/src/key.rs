// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Loading the app's private key.

use std::fs;
use std::path::Path;

use gha_token_github_app::{GithubAppError, Secret, SecretString};
use tracing::debug;

/// PEM contents supplied directly, for CI systems that expose secrets as
/// environment variables rather than files.
pub const PRIVATE_KEY_ENV: &str = "GHA_TOKEN_PRIVATE_KEY";

/// Read the PEM from `path`, falling back to [`PRIVATE_KEY_ENV`].
pub fn load_private_key(path: Option<&Path>) -> Result<SecretString, GithubAppError> {
	load_private_key_from(path, std::env::var(PRIVATE_KEY_ENV).ok())
}

fn load_private_key_from(
	path: Option<&Path>,
	inline: Option<String>,
) -> Result<SecretString, GithubAppError> {
	let pem = match (path, inline) {
		(Some(path), _) => {
			debug!(path = %path.display(), "Reading private key file");
			fs::read_to_string(path).map_err(|e| {
				GithubAppError::Key(format!(
					"Unable to read private key {}: {e}",
					path.display()
				))
			})?
		}
		(None, Some(inline)) => {
			debug!(env = PRIVATE_KEY_ENV, "Using inline private key");
			unescape_newlines(inline)
		}
		(None, None) => {
			return Err(GithubAppError::Config(format!(
				"a private key is required: pass --key-path or set {PRIVATE_KEY_ENV}"
			)));
		}
	};

	if pem.trim().is_empty() {
		return Err(GithubAppError::Key("private key is empty".to_string()));
	}

	Ok(Secret::new(pem))
}

/// Single-line secrets often carry `\n` escapes instead of newlines.
fn unescape_newlines(pem: String) -> String {
	if pem.contains('\n') {
		pem
	} else {
		pem.replace("\\n", "\n")
	}
}
