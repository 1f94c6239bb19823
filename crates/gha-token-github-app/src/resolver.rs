// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Maps an [`InstallationTarget`] to the endpoint that issues its
//! installation token.

use std::collections::VecDeque;

use reqwest::{Method, Url};
use tracing::{debug, info, instrument};

use crate::client::{Authorization, GithubClient};
use crate::config::{GithubAppConfig, ResolveStrategy};
use crate::error::GithubAppError;
use crate::jwt::SignedAssertion;
use crate::types::{
	AccessTokenResponse, Installation, InstallationTarget, InstallationToken, RepoRef,
	RepositoryList,
};

const PER_PAGE: &str = "100";

/// Where to mint an installation token.
#[derive(Debug, Clone)]
pub struct ResolvedInstallation {
	pub id: u64,
	pub access_tokens_url: Url,
	/// Set when resolution already had to mint a token for this installation.
	pub token: Option<InstallationToken>,
}

/// `POST {access_tokens_url}` with the app JWT.
pub async fn mint_installation_token(
	client: &GithubClient,
	access_tokens_url: Url,
	assertion: &SignedAssertion,
) -> Result<InstallationToken, GithubAppError> {
	let response: AccessTokenResponse = client
		.request(Method::POST, access_tokens_url, assertion.bearer())
		.await?;
	Ok(response.into())
}

/// Lazily paged `GET /app/installations`.
///
/// The next page is only requested once the buffered records run out.
pub struct InstallationStream<'a> {
	client: &'a GithubClient,
	authorization: Authorization<'a>,
	buffered: VecDeque<Installation>,
	next_page: Option<Url>,
}

impl<'a> InstallationStream<'a> {
	pub fn new(client: &'a GithubClient, first_page: Url, assertion: &'a SignedAssertion) -> Self {
		Self {
			client,
			authorization: assertion.bearer(),
			buffered: VecDeque::new(),
			next_page: Some(first_page),
		}
	}

	pub async fn next(&mut self) -> Result<Option<Installation>, GithubAppError> {
		loop {
			if let Some(installation) = self.buffered.pop_front() {
				return Ok(Some(installation));
			}

			let Some(url) = self.next_page.take() else {
				return Ok(None);
			};

			let page = self
				.client
				.request_page::<Vec<Installation>>(Method::GET, url, self.authorization)
				.await?;
			debug!(count = page.body.len(), "Installations page fetched");
			self.buffered.extend(page.body);
			self.next_page = page.next;
		}
	}
}

pub struct InstallationResolver<'a> {
	config: &'a GithubAppConfig,
	client: &'a GithubClient,
}

impl<'a> InstallationResolver<'a> {
	pub fn new(config: &'a GithubAppConfig, client: &'a GithubClient) -> Self {
		Self { config, client }
	}

	/// Resolve the token-issuance endpoint for `target`.
	///
	/// Returns `None` for [`InstallationTarget::None`]; there is nothing to
	/// exchange.
	pub async fn resolve(
		&self,
		target: &InstallationTarget,
		assertion: &SignedAssertion,
	) -> Result<Option<ResolvedInstallation>, GithubAppError> {
		match target {
			InstallationTarget::None => Ok(None),
			InstallationTarget::ById(id) => self.by_id(*id).map(Some),
			InstallationTarget::ByRepository(repo) => match self.config.strategy() {
				ResolveStrategy::DirectLookup => self.lookup(repo, assertion).await.map(Some),
				ResolveStrategy::Enumerate => self.enumerate(repo, assertion).await.map(Some),
			},
		}
	}

	/// The endpoint is templated from the ID; no request is made.
	pub fn by_id(&self, installation_id: u64) -> Result<ResolvedInstallation, GithubAppError> {
		Ok(ResolvedInstallation {
			id: installation_id,
			access_tokens_url: self.config.access_tokens_url(installation_id)?,
			token: None,
		})
	}

	/// `GET /repos/{owner}/{repo}/installation`.
	#[instrument(skip_all, fields(repo = %repo))]
	pub async fn lookup(
		&self,
		repo: &RepoRef,
		assertion: &SignedAssertion,
	) -> Result<ResolvedInstallation, GithubAppError> {
		let url = self.config.repo_installation_url(&repo.owner, &repo.repo)?;

		let installation: Installation = self
			.client
			.request(Method::GET, url, assertion.bearer())
			.await
			.map_err(|e| match e.status() {
				Some(404) => GithubAppError::installation_not_found(
					&repo.owner,
					&repo.repo,
					self.config.app_id(),
				),
				_ => e,
			})?;

		debug!(installation_id = installation.id, "Repository installation found");

		Ok(ResolvedInstallation {
			id: installation.id,
			access_tokens_url: parse_url(&installation.access_tokens_url)?,
			token: None,
		})
	}

	/// Scan every installation in order, minting a token for each and listing
	/// the repositories it can access, until one contains `repo`.
	#[instrument(skip_all, fields(repo = %repo))]
	pub async fn enumerate(
		&self,
		repo: &RepoRef,
		assertion: &SignedAssertion,
	) -> Result<ResolvedInstallation, GithubAppError> {
		let mut first_page = self.config.installations_url()?;
		first_page.query_pairs_mut().append_pair("per_page", PER_PAGE);

		let mut installations = InstallationStream::new(self.client, first_page, assertion);
		let mut scanned = 0usize;

		while let Some(installation) = installations.next().await? {
			scanned += 1;
			let access_tokens_url = parse_url(&installation.access_tokens_url)?;
			let token =
				mint_installation_token(self.client, access_tokens_url.clone(), assertion).await?;

			if self.installation_has_repo(&installation, &token, repo).await? {
				info!(
					installation_id = installation.id,
					scanned, "Found installation for repository"
				);
				return Ok(ResolvedInstallation {
					id: installation.id,
					access_tokens_url,
					token: Some(token),
				});
			}
		}

		debug!(scanned, "No installation can access repository");
		Err(GithubAppError::installation_not_found(
			&repo.owner,
			&repo.repo,
			self.config.app_id(),
		))
	}

	/// Page through the installation's repositories with its own token,
	/// stopping at the first match.
	async fn installation_has_repo(
		&self,
		installation: &Installation,
		token: &InstallationToken,
		repo: &RepoRef,
	) -> Result<bool, GithubAppError> {
		let mut url = parse_url(&installation.repositories_url)?;
		url.query_pairs_mut().append_pair("per_page", PER_PAGE);

		loop {
			let page = self
				.client
				.request_page::<RepositoryList>(Method::GET, url, token.authorization())
				.await?;

			if page.body.repositories.iter().any(|r| r.matches(repo)) {
				return Ok(true);
			}

			match page.next {
				Some(next) => url = next,
				None => return Ok(false),
			}
		}
	}
}

fn parse_url(raw: &str) -> Result<Url, GithubAppError> {
	Url::parse(raw).map_err(|e| GithubAppError::Decode(format!("Invalid URL '{raw}': {e}")))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::jwt::{sign, test_keys};
	use serde_json::json;
	use wiremock::matchers::{header, method, path, query_param};
	use wiremock::{Mock, MockServer, ResponseTemplate};

	fn setup(server: &MockServer, strategy: ResolveStrategy) -> (GithubAppConfig, GithubClient) {
		let config = GithubAppConfig::new("148759", test_keys::rsa_pair().0.clone())
			.unwrap()
			.with_base_url(server.uri())
			.unwrap()
			.with_strategy(strategy);
		(config, GithubClient::new(reqwest::Client::new(), None))
	}

	fn installation_json(server: &MockServer, id: u64) -> serde_json::Value {
		json!({
			"id": id,
			"access_tokens_url": format!("{}/app/installations/{id}/access_tokens", server.uri()),
			"repositories_url": format!("{}/installation/{id}/repositories", server.uri()),
		})
	}

	fn token_json(token: &str) -> serde_json::Value {
		json!({"token": token, "expires_at": "2030-01-01T00:00:00Z"})
	}

	fn repos_json(repos: &[(&str, &str)]) -> serde_json::Value {
		json!({
			"total_count": repos.len(),
			"repositories": repos
				.iter()
				.map(|(owner, name)| json!({"name": name, "owner": {"login": owner}}))
				.collect::<Vec<_>>(),
		})
	}

	#[tokio::test]
	async fn test_none_target_resolves_to_nothing() {
		let server = MockServer::start().await;
		let (config, client) = setup(&server, ResolveStrategy::DirectLookup);
		let assertion = sign(config.identity()).unwrap();

		let resolved = InstallationResolver::new(&config, &client)
			.resolve(&InstallationTarget::None, &assertion)
			.await
			.unwrap();
		assert!(resolved.is_none());
		assert!(server.received_requests().await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_by_id_makes_no_request() {
		let server = MockServer::start().await;
		let (config, client) = setup(&server, ResolveStrategy::DirectLookup);
		let assertion = sign(config.identity()).unwrap();

		let resolved = InstallationResolver::new(&config, &client)
			.resolve(&InstallationTarget::ById(20435383), &assertion)
			.await
			.unwrap()
			.unwrap();

		assert_eq!(resolved.id, 20435383);
		assert_eq!(
			resolved.access_tokens_url.as_str(),
			format!("{}/app/installations/20435383/access_tokens", server.uri())
		);
		assert!(resolved.token.is_none());
		assert!(server.received_requests().await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_lookup_uses_returned_access_tokens_url() {
		let server = MockServer::start().await;
		let (config, client) = setup(&server, ResolveStrategy::DirectLookup);
		let assertion = sign(config.identity()).unwrap();

		Mock::given(method("GET"))
			.and(path("/repos/acme/widgets/installation"))
			.and(header(
				"authorization",
				format!("Bearer {}", assertion.expose()).as_str(),
			))
			.respond_with(ResponseTemplate::new(200).set_body_json(installation_json(&server, 42)))
			.expect(1)
			.mount(&server)
			.await;

		let resolved = InstallationResolver::new(&config, &client)
			.lookup(&RepoRef::new("acme", "widgets"), &assertion)
			.await
			.unwrap();

		assert_eq!(resolved.id, 42);
		assert_eq!(
			resolved.access_tokens_url.as_str(),
			format!("{}/app/installations/42/access_tokens", server.uri())
		);
		assert!(resolved.token.is_none());
	}

	#[tokio::test]
	async fn test_lookup_404_is_installation_not_found() {
		let server = MockServer::start().await;
		let (config, client) = setup(&server, ResolveStrategy::DirectLookup);
		let assertion = sign(config.identity()).unwrap();

		Mock::given(method("GET"))
			.and(path("/repos/acme/widgets/installation"))
			.respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "Not Found"})))
			.mount(&server)
			.await;

		let err = InstallationResolver::new(&config, &client)
			.lookup(&RepoRef::new("acme", "widgets"), &assertion)
			.await
			.unwrap_err();

		match err {
			GithubAppError::InstallationNotFound {
				owner,
				repo,
				app_id,
			} => {
				assert_eq!((owner.as_str(), repo.as_str()), ("acme", "widgets"));
				assert_eq!(app_id, "148759");
			}
			other => panic!("unexpected error: {other:?}"),
		}
	}

	#[tokio::test]
	async fn test_lookup_500_is_api_error() {
		let server = MockServer::start().await;
		let (config, client) = setup(&server, ResolveStrategy::DirectLookup);
		let assertion = sign(config.identity()).unwrap();

		Mock::given(method("GET"))
			.respond_with(ResponseTemplate::new(500))
			.mount(&server)
			.await;

		let err = InstallationResolver::new(&config, &client)
			.lookup(&RepoRef::new("acme", "widgets"), &assertion)
			.await
			.unwrap_err();
		assert_eq!(err.status(), Some(500));
	}

	#[tokio::test]
	async fn test_enumerate_stops_at_first_match() {
		let server = MockServer::start().await;
		let (config, client) = setup(&server, ResolveStrategy::Enumerate);
		let assertion = sign(config.identity()).unwrap();

		Mock::given(method("GET"))
			.and(path("/app/installations"))
			.and(query_param("per_page", "100"))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!([
				installation_json(&server, 1),
				installation_json(&server, 2),
				installation_json(&server, 3),
			])))
			.expect(1)
			.mount(&server)
			.await;

		for id in [1u64, 2] {
			Mock::given(method("POST"))
				.and(path(format!("/app/installations/{id}/access_tokens")))
				.respond_with(ResponseTemplate::new(201).set_body_json(token_json(&format!("ghs_{id}"))))
				.expect(1)
				.mount(&server)
				.await;
		}
		Mock::given(method("GET"))
			.and(path("/installation/1/repositories"))
			.and(header("authorization", "token ghs_1"))
			.respond_with(ResponseTemplate::new(200).set_body_json(repos_json(&[("acme", "other")])))
			.expect(1)
			.mount(&server)
			.await;
		Mock::given(method("GET"))
			.and(path("/installation/2/repositories"))
			.and(header("authorization", "token ghs_2"))
			.respond_with(ResponseTemplate::new(200).set_body_json(repos_json(&[
				("someone", "widgets"),
				("acme", "widgets"),
			])))
			.expect(1)
			.mount(&server)
			.await;
		// Installation 3 must never be touched.
		Mock::given(method("POST"))
			.and(path("/app/installations/3/access_tokens"))
			.respond_with(ResponseTemplate::new(201).set_body_json(token_json("ghs_3")))
			.expect(0)
			.mount(&server)
			.await;

		let resolved = InstallationResolver::new(&config, &client)
			.enumerate(&RepoRef::new("acme", "widgets"), &assertion)
			.await
			.unwrap();

		assert_eq!(resolved.id, 2);
		assert_eq!(resolved.token.unwrap().expose(), "ghs_2");
	}

	#[tokio::test]
	async fn test_enumerate_follows_pagination() {
		let server = MockServer::start().await;
		let (config, client) = setup(&server, ResolveStrategy::Enumerate);
		let assertion = sign(config.identity()).unwrap();

		let second_page = format!("{}/app/installations?per_page=100&page=2", server.uri());
		Mock::given(method("GET"))
			.and(path("/app/installations"))
			.and(query_param("page", "2"))
			.respond_with(
				ResponseTemplate::new(200).set_body_json(json!([installation_json(&server, 9)])),
			)
			.expect(1)
			.mount(&server)
			.await;
		Mock::given(method("GET"))
			.and(path("/app/installations"))
			.respond_with(
				ResponseTemplate::new(200)
					.insert_header("link", format!(r#"<{second_page}>; rel="next""#).as_str())
					.set_body_json(json!([])),
			)
			.expect(1)
			.mount(&server)
			.await;
		Mock::given(method("POST"))
			.and(path("/app/installations/9/access_tokens"))
			.respond_with(ResponseTemplate::new(201).set_body_json(token_json("ghs_9")))
			.expect(1)
			.mount(&server)
			.await;

		let repos_page_two = format!("{}/installation/9/repositories?per_page=100&page=2", server.uri());
		Mock::given(method("GET"))
			.and(path("/installation/9/repositories"))
			.and(query_param("page", "2"))
			.respond_with(ResponseTemplate::new(200).set_body_json(repos_json(&[("acme", "widgets")])))
			.expect(1)
			.mount(&server)
			.await;
		Mock::given(method("GET"))
			.and(path("/installation/9/repositories"))
			.respond_with(
				ResponseTemplate::new(200)
					.insert_header("link", format!(r#"<{repos_page_two}>; rel="next""#).as_str())
					.set_body_json(repos_json(&[("acme", "gadgets")])),
			)
			.expect(1)
			.mount(&server)
			.await;

		let resolved = InstallationResolver::new(&config, &client)
			.enumerate(&RepoRef::new("acme", "widgets"), &assertion)
			.await
			.unwrap();
		assert_eq!(resolved.id, 9);
	}

	#[tokio::test]
	async fn test_enumerate_miss_after_scanning_everything() {
		let server = MockServer::start().await;
		let (config, client) = setup(&server, ResolveStrategy::Enumerate);
		let assertion = sign(config.identity()).unwrap();

		let ids = [11u64, 12, 13];
		Mock::given(method("GET"))
			.and(path("/app/installations"))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!(ids
				.iter()
				.map(|id| installation_json(&server, *id))
				.collect::<Vec<_>>())))
			.expect(1)
			.mount(&server)
			.await;
		for id in ids {
			Mock::given(method("POST"))
				.and(path(format!("/app/installations/{id}/access_tokens")))
				.respond_with(ResponseTemplate::new(201).set_body_json(token_json("ghs_x")))
				.expect(1)
				.mount(&server)
				.await;
			Mock::given(method("GET"))
				.and(path(format!("/installation/{id}/repositories")))
				.respond_with(ResponseTemplate::new(200).set_body_json(repos_json(&[("Acme", "widgets")])))
				.expect(1)
				.mount(&server)
				.await;
		}

		let err = InstallationResolver::new(&config, &client)
			.enumerate(&RepoRef::new("acme", "widgets"), &assertion)
			.await
			.unwrap_err();

		assert!(matches!(err, GithubAppError::InstallationNotFound { .. }));
		let message = err.to_string();
		assert!(message.contains("acme/widgets"));
		assert!(message.contains("148759"));
	}

	#[tokio::test]
	async fn test_enumerate_miss_lists_every_repository_page() {
		let server = MockServer::start().await;
		let (config, client) = setup(&server, ResolveStrategy::Enumerate);
		let assertion = sign(config.identity()).unwrap();

		Mock::given(method("GET"))
			.and(path("/app/installations"))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!([
				installation_json(&server, 21),
				installation_json(&server, 22),
			])))
			.expect(1)
			.mount(&server)
			.await;
		for id in [21u64, 22] {
			Mock::given(method("POST"))
				.and(path(format!("/app/installations/{id}/access_tokens")))
				.respond_with(ResponseTemplate::new(201).set_body_json(token_json("ghs_x")))
				.expect(1)
				.mount(&server)
				.await;
		}

		// Installation 21 spans two pages, installation 22 fits in one.
		let page_two = format!("{}/installation/21/repositories?per_page=100&page=2", server.uri());
		Mock::given(method("GET"))
			.and(path("/installation/21/repositories"))
			.and(query_param("page", "2"))
			.respond_with(ResponseTemplate::new(200).set_body_json(repos_json(&[("acme", "tools")])))
			.expect(1)
			.mount(&server)
			.await;
		Mock::given(method("GET"))
			.and(path("/installation/21/repositories"))
			.respond_with(
				ResponseTemplate::new(200)
					.insert_header("link", format!(r#"<{page_two}>; rel="next""#).as_str())
					.set_body_json(repos_json(&[("acme", "gadgets")])),
			)
			.expect(1)
			.mount(&server)
			.await;
		Mock::given(method("GET"))
			.and(path("/installation/22/repositories"))
			.respond_with(ResponseTemplate::new(200).set_body_json(repos_json(&[("other", "widgets")])))
			.expect(1)
			.mount(&server)
			.await;

		let err = InstallationResolver::new(&config, &client)
			.enumerate(&RepoRef::new("acme", "widgets"), &assertion)
			.await
			.unwrap_err();
		assert!(matches!(err, GithubAppError::InstallationNotFound { .. }));

		let requests = server.received_requests().await.unwrap();
		let mints = requests.iter().filter(|r| r.method.as_str() == "POST").count();
		let listings = requests
			.iter()
			.filter(|r| r.url.path().ends_with("/repositories"))
			.count();
		assert_eq!(mints, 2);
		assert_eq!(listings, 3);
	}

	#[tokio::test]
	async fn test_enumerate_stops_on_mint_failure() {
		let server = MockServer::start().await;
		let (config, client) = setup(&server, ResolveStrategy::Enumerate);
		let assertion = sign(config.identity()).unwrap();

		Mock::given(method("GET"))
			.and(path("/app/installations"))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!([
				installation_json(&server, 1),
				installation_json(&server, 2),
			])))
			.mount(&server)
			.await;
		Mock::given(method("POST"))
			.and(path("/app/installations/1/access_tokens"))
			.respond_with(ResponseTemplate::new(403).set_body_json(json!({"message": "suspended"})))
			.expect(1)
			.mount(&server)
			.await;
		Mock::given(method("POST"))
			.and(path("/app/installations/2/access_tokens"))
			.respond_with(ResponseTemplate::new(201).set_body_json(token_json("ghs_2")))
			.expect(0)
			.mount(&server)
			.await;

		let err = InstallationResolver::new(&config, &client)
			.enumerate(&RepoRef::new("acme", "widgets"), &assertion)
			.await
			.unwrap_err();
		assert_eq!(err.status(), Some(403));
	}

	#[tokio::test]
	async fn test_invalid_access_tokens_url_is_decode_error() {
		let server = MockServer::start().await;
		let (config, client) = setup(&server, ResolveStrategy::DirectLookup);
		let assertion = sign(config.identity()).unwrap();

		Mock::given(method("GET"))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!({
				"id": 1,
				"access_tokens_url": "not a url",
				"repositories_url": "also not",
			})))
			.mount(&server)
			.await;

		let err = InstallationResolver::new(&config, &client)
			.lookup(&RepoRef::new("acme", "widgets"), &assertion)
			.await
			.unwrap_err();
		assert!(matches!(err, GithubAppError::Decode(_)), "got {err:?}");
	}
}
