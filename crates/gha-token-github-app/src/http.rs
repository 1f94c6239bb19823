// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Shared HTTP client with a consistent User-Agent header.

use reqwest::{Client, ClientBuilder};

use crate::error::GithubAppError;

/// GitHub rejects API requests that carry no User-Agent.
pub fn user_agent() -> String {
	format!("gha-token/{}", env!("CARGO_PKG_VERSION"))
}

/// Client builder preconfigured with the standard User-Agent.
///
/// No timeout is set; the transport defaults apply.
pub fn builder() -> ClientBuilder {
	Client::builder().user_agent(user_agent())
}

/// Build the client used for one credential run.
pub fn new_client() -> Result<Client, GithubAppError> {
	builder()
		.build()
		.map_err(|e| GithubAppError::Config(format!("Failed to create HTTP client: {e}")))
}
