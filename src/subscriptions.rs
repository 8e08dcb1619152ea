//! Pricing plans and the user's active subscription

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use log::{error, info};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::auth::Identity;
use crate::error::{Error, GatewayError, PersistStage, Result};
use crate::postgrest::{Database, Query};
use crate::profiles::PROFILES_TABLE;

/// Table holding at most one subscription row per user
pub const SUBSCRIPTIONS_TABLE: &str = "subscriptions";

/// Pricing tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Plan {
    Basic,
    Premium,
    Business,
}

impl Plan {
    pub const ALL: [Plan; 3] = [Plan::Basic, Plan::Premium, Plan::Business];

    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Basic => "Basic",
            Plan::Premium => "Premium",
            Plan::Business => "Business",
        }
    }

    /// Monthly price in Kenyan shillings
    pub fn price_ksh(&self) -> u32 {
        match self {
            Plan::Basic => 0,
            Plan::Premium => 999,
            Plan::Business => 2499,
        }
    }

    pub fn features(&self) -> &'static [&'static str] {
        match self {
            Plan::Basic => &[
                "Basic product listings",
                "Contact via phone",
                "Basic product details",
                "Standard support",
            ],
            Plan::Premium => &[
                "Verified seller badge",
                "Product analytics",
                "Multiple product images",
                "Featured listings",
                "Priority support",
            ],
            Plan::Business => &[
                "All Premium features",
                "In-app messaging",
                "Market insights",
                "Bulk listings",
                "API access",
                "Dedicated support",
            ],
        }
    }

    pub fn is_recommended(&self) -> bool {
        *self == Plan::Premium
    }

    /// Feature flags stored on the profile; `None` for the free plan
    pub fn premium_features(&self) -> Option<Value> {
        match self {
            Plan::Basic => None,
            Plan::Premium => Some(json!({
                "verified": true,
                "analytics": true,
                "featured": true,
            })),
            Plan::Business => Some(json!({
                "verified": true,
                "analytics": true,
                "featured": true,
                "messaging": true,
                "market_insights": true,
                "bulk_listings": true,
                "api_access": true,
            })),
        }
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Plan {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Plan::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| format!("unknown plan: {}", s))
    }
}

/// Plan selection for the signed-in user; no payment is taken
#[derive(Clone)]
pub struct SubscriptionService {
    db: Arc<dyn Database>,
}

impl SubscriptionService {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    /// Plan of the user's active subscription, `Basic` when there is none
    pub async fn current_plan(&self, identity: &Identity) -> Result<Plan> {
        let query = Query::default()
            .eq("user_id", identity.id)
            .eq("status", "active")
            .limit(1);
        let rows = self
            .db
            .select(SUBSCRIPTIONS_TABLE, &query)
            .await
            .map_err(|e| {
                error!("subscription query failed: {}", e);
                Error::Query(e)
            })?;

        Ok(rows
            .first()
            .and_then(|row| row.get("plan"))
            .and_then(Value::as_str)
            .and_then(|plan| plan.parse().ok())
            .unwrap_or(Plan::Basic))
    }

    /// Switch the user to `plan` and update the premium flag on their profile.
    ///
    /// Choosing the current plan changes nothing.
    pub async fn choose_plan(&self, identity: &Identity, plan: Plan) -> Result<Plan> {
        if self.current_plan(identity).await? == plan {
            return Ok(plan);
        }

        let by_user = Query::default().eq("user_id", identity.id);
        let existing = self
            .db
            .select(SUBSCRIPTIONS_TABLE, &by_user.clone().limit(1))
            .await
            .map_err(|e| write_failure(PersistStage::Update, e))?;

        let now = Utc::now();
        if existing.is_empty() {
            let row = json!({
                "user_id": identity.id,
                "plan": plan,
                "status": "active",
                "started_at": now,
            });
            self.db
                .insert(SUBSCRIPTIONS_TABLE, row)
                .await
                .map_err(|e| write_failure(PersistStage::Insert, e))?;
        } else {
            let changes = json!({ "plan": plan, "status": "active", "updated_at": now });
            self.db
                .update(SUBSCRIPTIONS_TABLE, &by_user, changes)
                .await
                .map_err(|e| write_failure(PersistStage::Update, e))?;
        }

        let profile_changes = json!({
            "is_premium": plan != Plan::Basic,
            "premium_features": plan.premium_features(),
        });
        self.db
            .update(PROFILES_TABLE, &Query::default().eq("id", identity.id), profile_changes)
            .await
            .map_err(|e| write_failure(PersistStage::Update, e))?;

        info!("{} switched to the {} plan", identity.id, plan);
        Ok(plan)
    }
}

fn write_failure(stage: PersistStage, err: GatewayError) -> Error {
    error!("subscription {} failed: {}", stage, err);
    Error::persistence(stage, err)
}
