//! Entitlement gate: allow/deny decisions for (identity, course).
//!
//! The purchase ledger itself is an external system, reached through
//! the [`EntitlementOracle`] trait. The gate fails closed on every
//! ambiguity: anonymous identity, missing content group, oracle error.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::RwLock;

use crate::registry::Course;

/// Role granting unconditional access.
pub const ADMIN_ROLE: &str = "administrator";

/// Authenticated user details, as asserted by the front proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserInfo {
    /// Stable user identifier.
    pub id: String,

    /// Email, when the proxy forwards one.
    pub email: Option<String>,

    /// Role names; `administrator` bypasses the purchase check.
    pub roles: Vec<String>,
}

/// The requesting identity. Authentication is an external concern; this
/// is only what the request asserts about itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    /// No authenticated user.
    Anonymous,

    /// An authenticated user.
    User(UserInfo),
}

impl Identity {
    /// Whether any user is authenticated.
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Identity::User(_))
    }

    /// Whether the identity carries the administrator role.
    pub fn is_admin(&self) -> bool {
        match self {
            Identity::Anonymous => false,
            Identity::User(user) => user.roles.iter().any(|r| r == ADMIN_ROLE),
        }
    }
}

/// External "has purchased" oracle, keyed by (user, content group).
#[async_trait]
pub trait EntitlementOracle: Send + Sync {
    /// Human-readable oracle name, for logs.
    fn name(&self) -> &str;

    /// Whether `user` has purchased `content_group_id`.
    async fn has_purchased(&self, user: &UserInfo, content_group_id: &str) -> Result<bool>;
}

/// Oracle backed by an HTTP commerce endpoint.
///
/// Issues `GET {endpoint}?user={id}&group={group}` and expects
/// `{"purchased": bool}` back.
pub struct HttpOracle {
    client: reqwest::Client,
    endpoint: String,
}

#[derive(Debug, Deserialize)]
struct PurchaseResponse {
    purchased: bool,
}

impl HttpOracle {
    /// Create an oracle against a commerce endpoint URL.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl EntitlementOracle for HttpOracle {
    fn name(&self) -> &str {
        "http"
    }

    async fn has_purchased(&self, user: &UserInfo, content_group_id: &str) -> Result<bool> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("user", user.id.as_str()), ("group", content_group_id)])
            .send()
            .await
            .with_context(|| format!("Entitlement request failed: {}", self.endpoint))?
            .error_for_status()
            .context("Entitlement endpoint returned an error status")?;

        let body: PurchaseResponse = response
            .json()
            .await
            .context("Failed to parse entitlement response")?;
        Ok(body.purchased)
    }
}

/// In-memory grant set. Used by tests and by deployments that manage
/// entitlements out of band.
#[derive(Default)]
pub struct StaticOracle {
    grants: RwLock<HashSet<(String, String)>>,
}

impl StaticOracle {
    /// Empty oracle: denies everyone.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a purchase for (user id, content group id).
    pub async fn grant(&self, user_id: impl Into<String>, group: impl Into<String>) {
        self.grants
            .write()
            .await
            .insert((user_id.into(), group.into()));
    }

    /// Remove a purchase.
    pub async fn revoke(&self, user_id: &str, group: &str) {
        self.grants
            .write()
            .await
            .remove(&(user_id.to_string(), group.to_string()));
    }
}

#[async_trait]
impl EntitlementOracle for StaticOracle {
    fn name(&self) -> &str {
        "static"
    }

    async fn has_purchased(&self, user: &UserInfo, content_group_id: &str) -> Result<bool> {
        let grants = self.grants.read().await;
        Ok(grants.contains(&(user.id.clone(), content_group_id.to_string())))
    }
}

/// The access-control gate consulted by the router.
pub struct Gate {
    oracle: Arc<dyn EntitlementOracle>,
}

impl Gate {
    /// Wire the gate to its oracle.
    pub fn new(oracle: Arc<dyn EntitlementOracle>) -> Self {
        Self { oracle }
    }

    /// Decide access for `identity` to `course`.
    ///
    /// Order matters: anonymous is denied before the admin shortcut, a
    /// course without a content group denies everyone but admins, and
    /// an oracle failure is a deny, never an allow.
    pub async fn has_access(&self, course: &Course, identity: &Identity) -> bool {
        let user = match identity {
            Identity::Anonymous => return false,
            Identity::User(user) => user,
        };

        if identity.is_admin() {
            return true;
        }

        let Some(group) = course.content_group_id.as_deref() else {
            tracing::debug!(course = %course.slug, "deny: no content group configured");
            return false;
        };

        match self.oracle.has_purchased(user, group).await {
            Ok(purchased) => purchased,
            Err(e) => {
                tracing::warn!(
                    oracle = self.oracle.name(),
                    user = %user.id,
                    group = %group,
                    error = %e,
                    "entitlement oracle failed; denying"
                );
                false
            }
        }
    }
}
