use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use farebox_core::identity::RequesterDirectory;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
}

/// Resolves bearer tokens minted by the user directory into a requester id.
/// Identity is optional everywhere in the booking flow, so an invalid or
/// expired token resolves to anonymous instead of failing the request.
pub struct JwtRequesterDirectory {
    secret: String,
}

impl JwtRequesterDirectory {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }
}

impl RequesterDirectory for JwtRequesterDirectory {
    fn resolve_requester(&self, token: &str) -> Option<String> {
        match decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        ) {
            Ok(data) => Some(data.claims.sub),
            Err(err) => {
                tracing::debug!("Unresolvable bearer token: {}", err);
                None
            }
        }
    }
}
