// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Authenticated single-attempt requests against the GitHub REST API.

use std::sync::Arc;

use reqwest::header::{HeaderMap, ACCEPT, AUTHORIZATION, LINK};
use reqwest::{Client, Method, Url};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::diagnostics::{render_request, render_response, DiagnosticSink};
use crate::error::GithubAppError;

const ACCEPT_GITHUB_JSON: &str = "application/vnd.github+json";
const API_VERSION_HEADER: &str = "X-GitHub-Api-Version";
const API_VERSION: &str = "2022-11-28";

/// Credential presented in the `Authorization` header.
#[derive(Debug, Clone, Copy)]
pub enum Authorization<'a> {
	/// App JWT, for `/app/...` and repository installation lookups.
	Bearer(&'a str),
	/// Installation token, for installation-scoped resources.
	Token(&'a str),
}

impl Authorization<'_> {
	pub fn header_value(&self) -> String {
		match self {
			Authorization::Bearer(jwt) => format!("Bearer {jwt}"),
			Authorization::Token(token) => format!("token {token}"),
		}
	}
}

/// One decoded response plus the `rel="next"` link, if GitHub sent one.
#[derive(Debug)]
pub(crate) struct Page<T> {
	pub body: T,
	pub next: Option<Url>,
}

/// Thin GitHub REST client.
///
/// Every call is a single attempt. Network failures, non-2xx statuses and
/// undecodable bodies are all returned to the caller as errors; nothing is
/// retried here.
#[derive(Clone)]
pub struct GithubClient {
	http_client: Client,
	diagnostics: Option<Arc<dyn DiagnosticSink>>,
}

impl GithubClient {
	pub fn new(http_client: Client, diagnostics: Option<Arc<dyn DiagnosticSink>>) -> Self {
		Self {
			http_client,
			diagnostics,
		}
	}

	/// Send a request and decode the JSON body into `T`.
	pub async fn request<T>(
		&self,
		method: Method,
		url: Url,
		authorization: Authorization<'_>,
	) -> Result<T, GithubAppError>
	where
		T: DeserializeOwned,
	{
		Ok(self.request_page(method, url, authorization).await?.body)
	}

	pub(crate) async fn request_page<T>(
		&self,
		method: Method,
		url: Url,
		authorization: Authorization<'_>,
	) -> Result<Page<T>, GithubAppError>
	where
		T: DeserializeOwned,
	{
		let request = self
			.http_client
			.request(method.clone(), url.clone())
			.header(AUTHORIZATION, authorization.header_value())
			.header(ACCEPT, ACCEPT_GITHUB_JSON)
			.header(API_VERSION_HEADER, API_VERSION)
			.build()?;

		if let Some(sink) = &self.diagnostics {
			sink.emit(&render_request(
				method.as_str(),
				url.as_str(),
				request.headers(),
			));
		}

		debug!(method = %method, url = %url, "Sending GitHub request");

		let response = self.http_client.execute(request).await.map_err(|e| {
			debug!(error = %e, method = %method, url = %url, "Network error calling GitHub");
			GithubAppError::Network(e)
		})?;

		let status = response.status();
		let headers = response.headers().clone();
		let body = response.text().await?;

		if let Some(sink) = &self.diagnostics {
			sink.emit(&render_response(status.as_u16(), &headers, &body));
		}

		if !status.is_success() {
			debug!(status = status.as_u16(), method = %method, url = %url, "GitHub API error");
			return Err(GithubAppError::api_error(
				status.as_u16(),
				method.as_str(),
				url.as_str(),
				&body,
			));
		}

		let decoded = serde_json::from_str::<T>(&body).map_err(|e| {
			debug!(error = %e, url = %url, "Failed to parse GitHub response");
			GithubAppError::Decode(format!("{method} {url}: {e}"))
		})?;

		Ok(Page {
			body: decoded,
			next: next_link(&headers),
		})
	}
}

/// Extract the `rel="next"` target from a `Link` header.
pub(crate) fn next_link(headers: &HeaderMap) -> Option<Url> {
	headers
		.get_all(LINK)
		.iter()
		.filter_map(|value| value.to_str().ok())
		.flat_map(|value| value.split(','))
		.find_map(|entry| {
			let mut parts = entry.split(';');
			let target = parts.next()?.trim();
			let is_next = parts.any(|param| {
				let param = param.trim();
				param == r#"rel="next""# || param == "rel=next"
			});
			if !is_next {
				return None;
			}
			let target = target.strip_prefix('<')?.strip_suffix('>')?;
			Url::parse(target).ok()
		})
}
