// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! gha-token - print a GitHub App credential
//!
//! Prints the app JWT, or an installation access token when an installation
//! ID or repository is given, to stdout with no trailing newline so that it
//! can be captured directly by scripts. Logs and diagnostics go to stderr.

use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::debug;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use gha_token_github_app::{
	Credential, CredentialPipeline, GithubAppConfig, InstallationTarget, RepoRef,
	ResolveStrategy, TracingSink, DEFAULT_BASE_URL,
};

mod key;

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum StrategyArg {
	/// Ask GitHub for the repository's installation directly
	Lookup,
	/// Scan every installation's repositories (older GitHub Enterprise)
	Enumerate,
}

impl From<StrategyArg> for ResolveStrategy {
	fn from(v: StrategyArg) -> Self {
		match v {
			StrategyArg::Lookup => ResolveStrategy::DirectLookup,
			StrategyArg::Enumerate => ResolveStrategy::Enumerate,
		}
	}
}

/// Generate a GitHub App JWT or installation access token
#[derive(Parser, Debug)]
#[command(name = "gha-token", version, about, long_about = None)]
struct Args {
	/// Application ID as defined in app settings
	#[arg(short, long = "app", env = "GHA_TOKEN_APP_ID")]
	app_id: String,

	/// Path to key PEM file generated in app settings
	#[arg(short, long, env = "GHA_TOKEN_KEY_PATH")]
	key_path: Option<PathBuf>,

	/// GitHub API URL
	#[arg(long, env = "GHA_TOKEN_API_URL", default_value = DEFAULT_BASE_URL)]
	api_url: String,

	/// Installation ID of the application
	#[arg(short, long = "inst", env = "GHA_TOKEN_INSTALLATION_ID", conflicts_with = "repo")]
	installation_id: Option<u64>,

	/// {owner/repo} of the GitHub repository
	#[arg(short, long, env = "GHA_TOKEN_REPO")]
	repo: Option<String>,

	/// App JWT lifetime in seconds (GitHub accepts at most 600)
	#[arg(long, env = "GHA_TOKEN_JWT_LIFETIME", value_name = "SECONDS")]
	jwt_lifetime: Option<u64>,

	/// How to find the installation for --repo
	#[arg(long, value_enum, default_value_t = StrategyArg::Lookup)]
	strategy: StrategyArg,

	/// Verbose stderr, including every GitHub request and response
	#[arg(short, long)]
	verbose: bool,

	/// Output logs as JSON
	#[arg(long)]
	json_logs: bool,
}

impl Args {
	fn target(&self) -> Result<InstallationTarget> {
		Ok(match (self.installation_id, &self.repo) {
			(Some(id), _) => InstallationTarget::ById(id),
			(None, Some(repo)) => InstallationTarget::ByRepository(RepoRef::parse(repo)?),
			(None, None) => InstallationTarget::None,
		})
	}

	fn config(&self, private_key_pem: gha_token_github_app::SecretString) -> Result<GithubAppConfig> {
		let mut config = GithubAppConfig::new(&self.app_id, private_key_pem)?
			.with_base_url(&self.api_url)?
			.with_strategy(self.strategy.into());

		if let Some(secs) = self.jwt_lifetime {
			config = config.with_jwt_lifetime(Duration::from_secs(secs))?;
		}
		if self.verbose {
			config = config.with_diagnostics(Arc::new(TracingSink));
		}

		Ok(config)
	}
}

fn describe(target: &InstallationTarget, app_id: &str) -> String {
	match target {
		InstallationTarget::None => format!("failed to generate JWT for app ID {app_id}"),
		InstallationTarget::ById(id) => format!(
			"failed to get installation token for app ID {app_id} and installation ID {id}"
		),
		InstallationTarget::ByRepository(repo) => {
			format!("failed to get installation token for app ID {app_id} and repo {repo}")
		}
	}
}

fn init_tracing(verbose: bool, json: bool) {
	// Without -v a failed run leaves exactly one line on stderr: the error.
	let default_directives = if verbose {
		"warn,gha_token=debug,gha_token_github_app=debug,gha_token_cli=debug"
	} else {
		"off"
	};
	let filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives));

	// stdout carries the credential only.
	let ansi = io::stderr().is_terminal();
	if json {
		tracing_subscriber::registry()
			.with(filter)
			.with(fmt::layer().json().with_writer(io::stderr))
			.init();
	} else {
		tracing_subscriber::registry()
			.with(filter)
			.with(fmt::layer().compact().with_ansi(ansi).with_writer(io::stderr))
			.init();
	}
}

async fn run(args: &Args) -> Result<Credential> {
	let target = args.target()?;
	let private_key_pem = key::load_private_key(args.key_path.as_deref())?;
	let config = args.config(private_key_pem)?;

	debug!(?config, ?target, "Issuing credential");

	let pipeline = CredentialPipeline::new(config)?;
	pipeline
		.run(&target)
		.await
		.with_context(|| describe(&target, &args.app_id))
}

fn write_credential(credential: &Credential) -> io::Result<()> {
	let mut stdout = io::stdout().lock();
	stdout.write_all(credential.expose().as_bytes())?;
	stdout.flush()
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
	let args = Args::parse();
	init_tracing(args.verbose, args.json_logs);

	let result = run(&args).await.and_then(|credential| {
		write_credential(&credential).context("failed to write credential to stdout")
	});

	match result {
		Ok(()) => ExitCode::SUCCESS,
		Err(err) => {
			eprintln!("gha-token: {err:#}");
			ExitCode::FAILURE
		}
	}
}
