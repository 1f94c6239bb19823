// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! JWT generation for GitHub App authentication.

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::client::Authorization;
use crate::error::GithubAppError;
use crate::secret::{Secret, SecretString};

/// Default app JWT lifetime.
pub const DEFAULT_JWT_LIFETIME: Duration = Duration::from_secs(10 * 60);

/// Longest lifetime GitHub accepts for an app JWT.
pub const MAX_JWT_LIFETIME: Duration = Duration::from_secs(10 * 60);

/// JWT claims for GitHub App authentication.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct Claims {
	/// Issued at (seconds since epoch).
	pub iat: u64,
	/// Expiration (seconds since epoch).
	pub exp: u64,
	/// Issuer (GitHub App ID or client ID).
	pub iss: String,
}

/// The registered application a JWT is issued for.
#[derive(Clone)]
pub struct AppIdentity {
	app_id: String,
	private_key_pem: SecretString,
	lifetime: Duration,
}

impl fmt::Debug for AppIdentity {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("AppIdentity")
			.field("app_id", &self.app_id)
			.field("private_key_pem", &self.private_key_pem)
			.field("lifetime", &self.lifetime)
			.finish()
	}
}

impl AppIdentity {
	/// Create an identity with the default 10 minute JWT lifetime.
	pub fn new(
		app_id: impl Into<String>,
		private_key_pem: impl Into<SecretString>,
	) -> Result<Self, GithubAppError> {
		let app_id = app_id.into().trim().to_string();
		if app_id.is_empty() {
			return Err(GithubAppError::Config("App ID must not be empty".to_string()));
		}

		Ok(Self {
			app_id,
			private_key_pem: private_key_pem.into(),
			lifetime: DEFAULT_JWT_LIFETIME,
		})
	}

	/// Override the JWT lifetime.
	///
	/// Lifetimes above [`MAX_JWT_LIFETIME`] are passed through; GitHub
	/// rejects them, not this crate.
	pub fn with_lifetime(mut self, lifetime: Duration) -> Result<Self, GithubAppError> {
		if lifetime.as_secs() == 0 {
			return Err(GithubAppError::Config(
				"JWT lifetime must be at least one second".to_string(),
			));
		}
		if lifetime > MAX_JWT_LIFETIME {
			warn!(
				lifetime_secs = lifetime.as_secs(),
				max_secs = MAX_JWT_LIFETIME.as_secs(),
				"JWT lifetime exceeds the GitHub maximum and will likely be rejected"
			);
		}
		self.lifetime = lifetime;
		Ok(self)
	}

	pub fn app_id(&self) -> &str {
		&self.app_id
	}

	pub fn lifetime(&self) -> Duration {
		self.lifetime
	}

	pub(crate) fn private_key_pem(&self) -> &str {
		self.private_key_pem.expose()
	}
}

/// A signed app-level JWT.
#[derive(Clone, Debug)]
pub struct SignedAssertion {
	token: SecretString,
	issued_at: u64,
	expires_at: u64,
}

impl SignedAssertion {
	/// The compact `header.claims.signature` string.
	pub fn expose(&self) -> &str {
		self.token.expose()
	}

	pub fn issued_at(&self) -> u64 {
		self.issued_at
	}

	pub fn expires_at(&self) -> u64 {
		self.expires_at
	}

	/// `Authorization: Bearer <jwt>` for app-level endpoints.
	pub fn bearer(&self) -> Authorization<'_> {
		Authorization::Bearer(self.expose())
	}
}

/// Sign an app JWT issued now.
pub fn sign(identity: &AppIdentity) -> Result<SignedAssertion, GithubAppError> {
	let now = SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.map_err(|e| GithubAppError::Signing(format!("System time error: {e}")))?;

	sign_at(identity, now.as_secs())
}

/// Sign an app JWT with an explicit issued-at timestamp.
///
/// The claim set is `iss = app_id`, `iat = issued_at` and
/// `exp = issued_at + lifetime`, signed with RS256.
#[instrument(skip(identity), fields(app_id = %identity.app_id()))]
pub fn sign_at(identity: &AppIdentity, issued_at: u64) -> Result<SignedAssertion, GithubAppError> {
	let encoding_key = EncodingKey::from_rsa_pem(identity.private_key_pem().as_bytes())
		.map_err(|e| GithubAppError::Key(format!("Invalid RSA private key: {e}")))?;

	// NumericDate is a signed 64-bit count of seconds.
	let exp = issued_at
		.checked_add(identity.lifetime().as_secs())
		.filter(|exp| i64::try_from(*exp).is_ok())
		.ok_or_else(|| {
			GithubAppError::Config(format!(
				"JWT lifetime of {}s does not fit in an expiry timestamp",
				identity.lifetime().as_secs()
			))
		})?;

	let claims = Claims {
		iat: issued_at,
		exp,
		iss: identity.app_id().to_string(),
	};

	let header = Header::new(Algorithm::RS256);

	let token = encode(&header, &claims, &encoding_key).map_err(|e| match e.kind() {
		ErrorKind::InvalidRsaKey(_) | ErrorKind::InvalidKeyFormat => {
			GithubAppError::Key(format!("Invalid RSA private key: {e}"))
		}
		_ => GithubAppError::Signing(format!("Failed to encode JWT: {e}")),
	})?;

	debug!(iat = claims.iat, exp = claims.exp, "Generated GitHub App JWT");

	Ok(SignedAssertion {
		token: Secret::new(token),
		issued_at: claims.iat,
		expires_at: claims.exp,
	})
}
