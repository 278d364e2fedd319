use anyhow::{anyhow, Result};
use pasetors::claims::{Claims, ClaimsValidationRules};
use pasetors::keys::AsymmetricPublicKey;
use pasetors::token::UntrustedToken;
use pasetors::{public, version4::V4, Public};

use crate::app::error::ResourceError;
use crate::domain::identity::Identity;

pub const PERMISSION_LEVEL_CLAIM: &str = "x_permission_level";

const BEARER_SCHEME: &str = "Bearer";

/// Verifies PASETO v4.public access tokens issued by the auth service.
///
/// Only the issuer's public key is held here; tokens are signed elsewhere.
#[derive(Clone)]
pub struct TokenVerifier {
    public_key: [u8; 32],
    issuer: Option<String>,
}

impl TokenVerifier {
    pub fn new(public_key: [u8; 32], issuer: Option<String>) -> Self {
        Self { public_key, issuer }
    }

    /// Checks a raw `Authorization` header value of the form `Bearer <token>`.
    pub fn authenticate_header(&self, header: Option<&str>) -> Result<Identity, ResourceError> {
        let header =
            header.ok_or_else(|| ResourceError::unauthorized("missing Authorization header"))?;

        let (scheme, token) = header
            .split_once(' ')
            .ok_or_else(|| ResourceError::unauthorized("malformed Authorization header"))?;
        if scheme != BEARER_SCHEME {
            return Err(ResourceError::unauthorized("invalid authentication scheme"));
        }

        self.verify(token.trim())
    }

    pub fn verify(&self, token: &str) -> Result<Identity, ResourceError> {
        let claims = self
            .verify_claims(token)
            .map_err(|err| ResourceError::unauthorized(err.to_string()))?;
        identity_from_claims(&claims)
    }

    fn verify_claims(&self, token: &str) -> Result<Claims> {
        let key = AsymmetricPublicKey::<V4>::from(&self.public_key)?;
        let mut rules = ClaimsValidationRules::new();
        if let Some(issuer) = &self.issuer {
            rules.validate_issuer_with(issuer);
        }

        let untrusted = UntrustedToken::<Public, V4>::try_from(token)
            .map_err(|err| anyhow!("undecodable token: {}", err))?;
        let trusted = public::verify(&key, &untrusted, &rules, None, None)
            .map_err(|err| anyhow!("token rejected: {}", err))?;

        trusted
            .payload_claims()
            .cloned()
            .ok_or_else(|| anyhow!("token carries no claims"))
    }
}

fn identity_from_claims(claims: &Claims) -> Result<Identity, ResourceError> {
    let id = claims
        .get_claim("sub")
        .and_then(|value| value.as_str())
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| ResourceError::unauthorized("missing sub claim"))?;

    // Older tokens were minted without a permission level.
    let permission_level = match claims.get_claim(PERMISSION_LEVEL_CLAIM) {
        None => 0,
        Some(value) => value
            .as_i64()
            .or_else(|| value.as_str().and_then(|raw| raw.parse().ok()))
            .ok_or_else(|| {
                ResourceError::unauthorized(format!("invalid {} claim", PERMISSION_LEVEL_CLAIM))
            })?,
    };

    Ok(Identity {
        id: id.to_string(),
        permission_level,
    })
}
