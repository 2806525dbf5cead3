use anyhow::{anyhow, bail, Context};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use marginalia_common::types::Commenter;

/// Identity tokens live long: commenters sign in once and keep the token
/// in browser storage across visits.
pub const IDENTITY_TOKEN_TTL_SECONDS: i64 = 365 * 24 * 60 * 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IdentityTokenClaims {
    sub: String,
    provider: String,
    name: String,
    iat: i64,
    exp: i64,
}

/// A validated commenter identity extracted from a bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommenterIdentity {
    pub commenter: Commenter,
    pub display_name: String,
}

#[derive(Clone)]
pub struct IdentityTokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl IdentityTokenService {
    pub fn new(secret: &str) -> anyhow::Result<Self> {
        if secret.len() < 32 {
            bail!("jwt secret must be at least 32 characters long");
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        })
    }

    pub fn issue_identity_token(&self, identity: &CommenterIdentity) -> anyhow::Result<String> {
        self.issue_identity_token_at(identity, current_unix_timestamp()?)
    }

    fn issue_identity_token_at(
        &self,
        identity: &CommenterIdentity,
        issued_at: i64,
    ) -> anyhow::Result<String> {
        let claims = IdentityTokenClaims {
            sub: identity.commenter.oauth_user_id.clone(),
            provider: identity.commenter.oauth_provider.clone(),
            name: identity.display_name.clone(),
            iat: issued_at,
            exp: issued_at + IDENTITY_TOKEN_TTL_SECONDS,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .context("failed to encode identity token")
    }

    pub fn validate_identity_token(&self, token: &str) -> anyhow::Result<CommenterIdentity> {
        let claims = decode::<IdentityTokenClaims>(token, &self.decoding_key, &self.validation)
            .context("failed to decode identity token")?
            .claims;

        if claims.provider.is_empty() || claims.sub.is_empty() {
            return Err(anyhow!("identity token claims missing provider or subject"));
        }

        Ok(CommenterIdentity {
            commenter: Commenter {
                oauth_provider: claims.provider,
                oauth_user_id: claims.sub,
            },
            display_name: claims.name,
        })
    }
}

fn current_unix_timestamp() -> anyhow::Result<i64> {
    let duration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|error| anyhow!("system clock is before unix epoch: {error}"))?;

    i64::try_from(duration.as_secs()).context("unix timestamp overflow")
}
