// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! One-shot credential issuance: sign, resolve, exchange.

use chrono::{DateTime, Utc};
use reqwest::Client;
use tracing::{info, instrument};

use crate::client::GithubClient;
use crate::config::GithubAppConfig;
use crate::error::GithubAppError;
use crate::http;
use crate::jwt::{sign, SignedAssertion};
use crate::resolver::{mint_installation_token, InstallationResolver};
use crate::types::{InstallationTarget, InstallationToken};

/// The credential handed back to the caller.
#[derive(Debug, Clone)]
pub enum Credential {
	/// App JWT, when no installation or repository was requested.
	AppJwt(SignedAssertion),
	/// Installation access token.
	Installation(InstallationToken),
}

impl Credential {
	/// The raw credential string.
	pub fn expose(&self) -> &str {
		match self {
			Credential::AppJwt(assertion) => assertion.expose(),
			Credential::Installation(token) => token.expose(),
		}
	}

	pub fn expires_at(&self) -> Option<DateTime<Utc>> {
		match self {
			Credential::AppJwt(assertion) => {
				i64::try_from(assertion.expires_at())
					.ok()
					.and_then(|secs| DateTime::from_timestamp(secs, 0))
			}
			Credential::Installation(token) => Some(token.expires_at()),
		}
	}
}

/// Runs one request chain per call and holds no state between calls.
pub struct CredentialPipeline {
	config: GithubAppConfig,
	client: GithubClient,
}

impl CredentialPipeline {
	pub fn new(config: GithubAppConfig) -> Result<Self, GithubAppError> {
		Ok(Self::with_http_client(config, http::new_client()?))
	}

	pub fn with_http_client(config: GithubAppConfig, http_client: Client) -> Self {
		let client = GithubClient::new(http_client, config.diagnostics());
		Self { config, client }
	}

	pub fn config(&self) -> &GithubAppConfig {
		&self.config
	}

	/// Issue the credential for `target`.
	///
	/// - `None`: the app JWT itself.
	/// - `ById`: POST to the templated access token endpoint.
	/// - `ByRepository`: resolve the installation, then POST to its endpoint
	///   (unless resolution already minted a token).
	#[instrument(skip_all, fields(app_id = %self.config.app_id()))]
	pub async fn run(&self, target: &InstallationTarget) -> Result<Credential, GithubAppError> {
		let assertion = sign(self.config.identity())?;

		let resolver = InstallationResolver::new(&self.config, &self.client);
		let Some(resolved) = resolver.resolve(target, &assertion).await? else {
			info!(expires_at = assertion.expires_at(), "Generated JWT");
			return Ok(Credential::AppJwt(assertion));
		};

		let token = match resolved.token {
			Some(token) => token,
			None => {
				mint_installation_token(&self.client, resolved.access_tokens_url, &assertion).await?
			}
		};

		info!(
			installation_id = resolved.id,
			expires_at = %token.expires_at(),
			"Generated installation token"
		);

		Ok(Credential::Installation(token))
	}
}
