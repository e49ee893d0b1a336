// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::domain::auth::{AuthError, IdentityVerifier, VerifiedIdentity};

/// Claims carried by session bearer tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
}

/// HS256 bearer-token verifier.
pub struct JwtIdentityVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtIdentityVerifier {
    pub fn new(secret: &str, issuer: Option<&str>) -> anyhow::Result<Self> {
        if secret.is_empty() {
            anyhow::bail!("JWT secret must not be empty");
        }

        let mut validation = Validation::new(Algorithm::HS256);
        match issuer {
            // `iss` is only compared when present, so it must also be required.
            Some(issuer) => {
                validation.set_required_spec_claims(&["exp", "sub", "iss"]);
                validation.set_issuer(&[issuer]);
            }
            None => validation.set_required_spec_claims(&["exp", "sub"]),
        }

        Ok(Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        })
    }
}

impl IdentityVerifier for JwtIdentityVerifier {
    fn verify(&self, token: &str) -> Result<VerifiedIdentity, AuthError> {
        let data = decode::<SessionClaims>(token, &self.decoding_key, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::InvalidToken(e.to_string()),
            }
        })?;

        let claims = data.claims;
        Ok(VerifiedIdentity {
            user_id: claims.sub,
            tenant_id: claims.tenant_id.filter(|t| !t.is_empty()),
            role: claims.role,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &str = "test-secret";

    fn sign(claims: &SessionClaims, secret: &str) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn claims(tenant: Option<&str>, exp_offset: i64) -> SessionClaims {
        SessionClaims {
            sub: "user-1".to_string(),
            tenant_id: tenant.map(str::to_string),
            role: Some("recruiter".to_string()),
            exp: chrono::Utc::now().timestamp() + exp_offset,
            iss: None,
        }
    }

    #[test]
    fn test_valid_token_yields_identity() {
        let verifier = JwtIdentityVerifier::new(SECRET, None).unwrap();
        let identity = verifier.verify(&sign(&claims(Some("t1"), 3600), SECRET)).unwrap();
        assert_eq!(identity.user_id, "user-1");
        assert_eq!(identity.tenant_id.as_deref(), Some("t1"));
        assert_eq!(identity.role.as_deref(), Some("recruiter"));
    }

    #[test]
    fn test_token_without_tenant_is_still_verified() {
        let verifier = JwtIdentityVerifier::new(SECRET, None).unwrap();
        let identity = verifier.verify(&sign(&claims(None, 3600), SECRET)).unwrap();
        assert_eq!(identity.tenant_id, None);
    }

    #[test]
    fn test_rejects_wrong_secret_and_expired() {
        let verifier = JwtIdentityVerifier::new(SECRET, None).unwrap();
        assert!(matches!(
            verifier.verify(&sign(&claims(Some("t1"), 3600), "other")),
            Err(AuthError::InvalidToken(_))
        ));
        assert!(matches!(
            verifier.verify(&sign(&claims(Some("t1"), -3600), SECRET)),
            Err(AuthError::Expired)
        ));
        assert!(verifier.verify("garbage").is_err());
    }

    #[test]
    fn test_issuer_is_enforced_when_configured() {
        let verifier = JwtIdentityVerifier::new(SECRET, Some("tenantry")).unwrap();
        assert!(verifier.verify(&sign(&claims(Some("t1"), 3600), SECRET)).is_err());

        let mut issued = claims(Some("t1"), 3600);
        issued.iss = Some("tenantry".to_string());
        assert!(verifier.verify(&sign(&issued, SECRET)).is_ok());
    }

    #[test]
    fn test_foreign_issuer_is_rejected() {
        let verifier = JwtIdentityVerifier::new(SECRET, Some("tenantry")).unwrap();
        let mut issued = claims(Some("t1"), 3600);
        issued.iss = Some("someone-else".to_string());
        assert!(matches!(
            verifier.verify(&sign(&issued, SECRET)),
            Err(AuthError::InvalidToken(_))
        ));
    }

    #[test]
    fn test_new_rejects_empty_secret() {
        assert!(JwtIdentityVerifier::new("", None).is_err());
    }
}
