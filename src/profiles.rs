//! User profiles

use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{error, info};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::auth::{Identity, UserType};
use crate::error::{Error, GatewayError, PersistStage, Result};
use crate::listings::SellerContact;
use crate::postgrest::{decode_rows, Database, Query};

/// Table holding one profile per user, keyed on the auth user id
pub const PROFILES_TABLE: &str = "profiles";

/// Columns anyone may read off a farmer's profile
pub const CONTACT_COLUMNS: &str = "id,full_name,farm_name,location,phone_number";

/// A user's profile row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default = "default_user_type")]
    pub user_type: UserType,

    // Farmer
    #[serde(default)]
    pub farm_name: Option<String>,
    #[serde(default)]
    pub farm_size: Option<String>,
    #[serde(default)]
    pub main_products: Option<String>,

    // Buyer
    #[serde(default)]
    pub company_name: Option<String>,
    /// retailer, wholesaler, processor, exporter or other
    #[serde(default)]
    pub business_type: Option<String>,
    #[serde(default)]
    pub preferred_products: Option<String>,

    #[serde(default)]
    pub is_premium: bool,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

fn default_user_type() -> UserType {
    UserType::Buyer
}

impl Profile {
    /// Empty profile for `id` with the given role
    pub fn new(id: Uuid, user_type: UserType) -> Self {
        Self {
            id,
            full_name: None,
            phone_number: None,
            location: None,
            user_type,
            farm_name: None,
            farm_size: None,
            main_products: None,
            company_name: None,
            business_type: None,
            preferred_products: None,
            is_premium: false,
            updated_at: None,
        }
    }

    pub fn is_farmer(&self) -> bool {
        self.user_type == UserType::Farmer
    }
}

/// Profile reads and writes
#[derive(Clone)]
pub struct ProfileRepository {
    db: Arc<dyn Database>,
}

impl ProfileRepository {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    /// The signed-in user's profile, created on first visit.
    ///
    /// A new profile takes its role from the sign-up metadata, defaulting
    /// to buyer.
    pub async fn load_or_create(&self, identity: &Identity) -> Result<Profile> {
        let query = Query::default().eq("id", identity.id).limit(1);
        let rows = self
            .db
            .select(PROFILES_TABLE, &query)
            .await
            .map_err(read_failure)?;

        if let Some(profile) = decode_rows::<Profile>(rows).map_err(read_failure)?.pop() {
            return Ok(profile);
        }

        let role = identity.role_hint.unwrap_or(UserType::Buyer);
        let rows = self
            .db
            .insert(PROFILES_TABLE, json!({ "id": identity.id, "user_type": role }))
            .await
            .map_err(|e| write_failure(PersistStage::Insert, e))?;

        let profile = first_row(rows, PersistStage::Insert)?;
        info!("created {} profile for {}", role, identity.id);
        Ok(profile)
    }

    /// Save the signed-in user's profile.
    ///
    /// The row id is always the identity's, whatever `profile.id` says. The
    /// premium flag is left alone; only a plan change sets it.
    pub async fn save(&self, identity: &Identity, profile: &Profile) -> Result<Profile> {
        let mut row = serde_json::to_value(profile)
            .map_err(|e| write_failure(PersistStage::Upsert, e.into()))?;
        if let Some(fields) = row.as_object_mut() {
            fields.remove("is_premium");
        }
        row["id"] = json!(identity.id);
        row["updated_at"] = json!(Utc::now());

        let rows = self
            .db
            .upsert(PROFILES_TABLE, row, "id")
            .await
            .map_err(|e| write_failure(PersistStage::Upsert, e))?;

        let saved = first_row(rows, PersistStage::Upsert)?;
        info!("saved profile {}", identity.id);
        Ok(saved)
    }

    /// Public contact fields of a farmer, if the profile exists
    pub async fn contact(&self, farmer_id: &Uuid) -> Result<Option<SellerContact>> {
        let query = Query::select(CONTACT_COLUMNS).eq("id", farmer_id).limit(1);
        let rows = self
            .db
            .select(PROFILES_TABLE, &query)
            .await
            .map_err(read_failure)?;
        Ok(decode_rows(rows).map_err(read_failure)?.pop())
    }
}

fn first_row(rows: Vec<serde_json::Value>, stage: PersistStage) -> Result<Profile> {
    decode_rows::<Profile>(rows)
        .map_err(|e| write_failure(stage, e))?
        .into_iter()
        .next()
        .ok_or_else(|| write_failure(stage, GatewayError::status(500, "no profile row returned")))
}

fn read_failure(err: GatewayError) -> Error {
    error!("profile query failed: {}", err);
    Error::Query(err)
}

fn write_failure(stage: PersistStage, err: GatewayError) -> Error {
    error!("profile {} failed: {}", stage, err);
    Error::persistence(stage, err)
}
