// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Verbose wire diagnostics.
//!
//! The provider client renders every outgoing request and incoming response
//! into a [`DiagnosticSink`] when one is configured. Nothing is rendered
//! otherwise.

use std::sync::Mutex;

use reqwest::header::{HeaderMap, AUTHORIZATION};

use crate::secret::REDACTED;

/// Receiver for formatted diagnostic messages.
pub trait DiagnosticSink: Send + Sync {
	fn emit(&self, message: &str);
}

/// Forwards diagnostics to `tracing` under the `gha_token::wire` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
	fn emit(&self, message: &str) {
		tracing::debug!(target: "gha_token::wire", "{message}");
	}
}

/// Collects diagnostics in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
	messages: Mutex<Vec<String>>,
}

impl RecordingSink {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn messages(&self) -> Vec<String> {
		self
			.messages
			.lock()
			.map(|m| m.clone())
			.unwrap_or_default()
	}
}

impl DiagnosticSink for RecordingSink {
	fn emit(&self, message: &str) {
		if let Ok(mut messages) = self.messages.lock() {
			messages.push(message.to_string());
		}
	}
}

/// Render a request as `GitHub request: METHOD URL` followed by headers.
///
/// The `Authorization` value is reduced to its scheme.
pub(crate) fn render_request(method: &str, url: &str, headers: &HeaderMap) -> String {
	let mut out = format!("GitHub request: {method} {url}");
	for (name, value) in headers {
		let value = if *name == AUTHORIZATION {
			let scheme = value
				.to_str()
				.ok()
				.and_then(|v| v.split_whitespace().next())
				.unwrap_or("");
			format!("{scheme} {REDACTED}")
		} else {
			String::from_utf8_lossy(value.as_bytes()).into_owned()
		};
		out.push_str(&format!("\n{name}: {value}"));
	}
	out
}

/// Render a response as status line, headers and body.
pub(crate) fn render_response(status: u16, headers: &HeaderMap, body: &str) -> String {
	let mut out = format!("GitHub response: {status}");
	for (name, value) in headers {
		out.push_str(&format!(
			"\n{name}: {}",
			String::from_utf8_lossy(value.as_bytes())
		));
	}
	out.push_str("\n\n");
	out.push_str(body);
	out
}
