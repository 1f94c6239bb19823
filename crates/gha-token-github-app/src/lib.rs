// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! GitHub App credential issuance.
//!
//! Signs an app JWT with the app's RSA key and, when asked, exchanges it for
//! an installation access token, either for a known installation ID or for
//! the installation that can access a given repository.

pub mod client;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod http;
pub mod jwt;
pub mod pipeline;
pub mod resolver;
pub mod secret;
pub mod types;

pub use client::{Authorization, GithubClient};
pub use config::{GithubAppConfig, ResolveStrategy, DEFAULT_BASE_URL};
pub use diagnostics::{DiagnosticSink, RecordingSink, TracingSink};
pub use error::GithubAppError;
pub use jwt::{sign, sign_at, AppIdentity, SignedAssertion, DEFAULT_JWT_LIFETIME, MAX_JWT_LIFETIME};
pub use pipeline::{Credential, CredentialPipeline};
pub use resolver::{InstallationResolver, InstallationStream, ResolvedInstallation};
pub use secret::{Secret, SecretString};
pub use types::{Installation, InstallationTarget, InstallationToken, RepoRef, Repository};
