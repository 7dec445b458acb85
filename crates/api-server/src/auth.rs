//! Bearer token authentication and role/capability gating.
//!
//! Development: accepts fixed dev credentials and encodes the role in the
//! token itself. Production: replace with JWT + the platform's identity
//! service.

use axum::extract::Request;
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Dev token prefix; the role segment follows it.
const DEV_TOKEN_PREFIX: &str = "dega_dev_";

// ─── Roles & Capabilities ──────────────────────────────────────────────────

/// Caller roles known to the ads subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Regular platform member: can view ads, no campaign management.
    Member,
    /// Advertiser account: manages its own campaigns and credits.
    Advertiser,
    /// Platform founder/operator: full administrative access.
    Founder,
}

/// What a caller is allowed to do. Checked against the role instead of
/// comparing role names at call sites, so new roles slot in without
/// touching the handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Create and manage own campaigns and credits.
    ManageOwnCampaigns,
    /// Campaigns go live without review.
    AutoApprove,
    /// Administrative surface: approve/reject any campaign, revenue report.
    AdministerAds,
}

impl Role {
    pub fn can(&self, capability: Capability) -> bool {
        match capability {
            Capability::ManageOwnCampaigns => {
                matches!(self, Role::Advertiser | Role::Founder)
            }
            Capability::AutoApprove | Capability::AdministerAds => matches!(self, Role::Founder),
        }
    }

    fn token_segment(&self) -> &'static str {
        match self {
            Role::Member => "member",
            Role::Advertiser => "adv",
            Role::Founder => "founder",
        }
    }

    fn from_token_segment(segment: &str) -> Option<Self> {
        match segment {
            "member" => Some(Role::Member),
            "adv" => Some(Role::Advertiser),
            "founder" => Some(Role::Founder),
            _ => None,
        }
    }
}

// ─── Login ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: String,
    pub role: Role,
    pub expires_at: DateTime<Utc>,
}

/// Validate a login request and return a bearer token carrying the role.
pub fn authenticate(req: &LoginRequest) -> Result<LoginResponse, String> {
    // Development credentials only.
    let role = if req.username == "founder" && req.password == "founder" {
        Role::Founder
    } else if req.password == "dega2024" {
        Role::Advertiser
    } else if req.password == "member" {
        Role::Member
    } else {
        return Err("Invalid credentials".to_string());
    };
    Ok(LoginResponse {
        token: generate_token(role),
        user: req.username.clone(),
        role,
        expires_at: Utc::now() + Duration::hours(24),
    })
}

/// Generate a random bearer token for the given role.
fn generate_token(role: Role) -> String {
    let mut rng = rand::thread_rng();
    let bytes: Vec<u8> = (0..32).map(|_| rng.gen()).collect();
    format!(
        "{}{}_{}",
        DEV_TOKEN_PREFIX,
        role.token_segment(),
        bytes
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect::<String>()
    )
}

/// Parse the role back out of a dev bearer token.
fn role_from_token(token: &str) -> Option<Role> {
    let rest = token.strip_prefix(DEV_TOKEN_PREFIX)?;
    let (segment, secret) = rest.split_once('_')?;
    if secret.is_empty() {
        return None;
    }
    Role::from_token_segment(segment)
}

// ─── Middleware ────────────────────────────────────────────────────────────

/// Axum middleware that checks the bearer token and attaches the caller's
/// role to the request. Skips auth for login and the health probes.
pub async fn auth_middleware(mut req: Request, next: Next) -> Response {
    let path = req.uri().path().to_string();

    if path.ends_with("/auth/login")
        || path.starts_with("/health")
        || path.starts_with("/ready")
        || path.starts_with("/live")
    {
        return next.run(req).await;
    }

    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    let token = match auth_header {
        Some(value) if value.starts_with("Bearer ") => &value[7..],
        _ => {
            return unauthorized(
                "missing_auth",
                "Authorization header with Bearer token required",
            )
        }
    };

    match role_from_token(token) {
        Some(role) => {
            req.extensions_mut().insert(role);
            next.run(req).await
        }
        None => unauthorized("invalid_token", "Invalid or expired bearer token"),
    }
}

fn unauthorized(error: &str, message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(crate::rest::ErrorResponse {
            error: error.to_string(),
            message: message.to_string(),
        }),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capabilities_by_role() {
        assert!(Role::Founder.can(Capability::AdministerAds));
        assert!(Role::Founder.can(Capability::AutoApprove));
        assert!(Role::Founder.can(Capability::ManageOwnCampaigns));

        assert!(Role::Advertiser.can(Capability::ManageOwnCampaigns));
        assert!(!Role::Advertiser.can(Capability::AdministerAds));
        assert!(!Role::Advertiser.can(Capability::AutoApprove));

        assert!(!Role::Member.can(Capability::ManageOwnCampaigns));
    }

    #[test]
    fn test_token_roundtrip_carries_role() {
        for role in [Role::Member, Role::Advertiser, Role::Founder] {
            let token = generate_token(role);
            assert_eq!(role_from_token(&token), Some(role));
        }
        assert_eq!(role_from_token("garbage"), None);
        assert_eq!(role_from_token("dega_dev_unknown_abc"), None);
    }

    #[test]
    fn test_authenticate_dev_credentials() {
        let resp = authenticate(&LoginRequest {
            username: "founder".into(),
            password: "founder".into(),
        })
        .unwrap();
        assert_eq!(resp.role, Role::Founder);

        let resp = authenticate(&LoginRequest {
            username: "acme".into(),
            password: "dega2024".into(),
        })
        .unwrap();
        assert_eq!(resp.role, Role::Advertiser);

        assert!(authenticate(&LoginRequest {
            username: "acme".into(),
            password: "wrong".into(),
        })
        .is_err());
    }
}
