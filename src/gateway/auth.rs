use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DispatchError;

/// Bearer token claims issued by the surrounding platform. This service only
/// verifies them; it never issues tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub tenant_id: Uuid,
    pub exp: usize,
}

pub fn verify_token(jwt_secret: &str, token: &str) -> Result<Claims, DispatchError> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(jwt_secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map_err(|e| DispatchError::Unauthorized(format!("invalid token: {}", e)))?;

    Ok(data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{EncodingKey, Header, encode};

    fn token_for(secret: &str, user: Uuid, tenant: Uuid) -> String {
        let claims = Claims {
            sub: user,
            tenant_id: tenant,
            exp: (chrono::Utc::now().timestamp() + 3600) as usize,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn valid_token_round_trips() {
        let user = Uuid::new_v4();
        let tenant = Uuid::new_v4();
        let token = token_for("secret", user, tenant);

        let claims = verify_token("secret", &token).unwrap();
        assert_eq!(claims.sub, user);
        assert_eq!(claims.tenant_id, tenant);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = token_for("secret", Uuid::new_v4(), Uuid::new_v4());
        assert!(matches!(
            verify_token("other", &token),
            Err(DispatchError::Unauthorized(_))
        ));
    }

    #[test]
    fn garbage_token_is_rejected() {
        assert!(verify_token("secret", "not.a.token").is_err());
    }
}
