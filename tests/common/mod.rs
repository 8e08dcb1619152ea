#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde_json::{json, Map, Value};
use tokio::sync::{broadcast, Semaphore};
use uuid::Uuid;

use mkulima_expo::auth::{AuthBackend, AuthResponse, Identity, Session, User, UserType};
use mkulima_expo::config::Config;
use mkulima_expo::error::GatewayError;
use mkulima_expo::listings::ListingDraft;
use mkulima_expo::postgrest::{Database, Filter, Query};
use mkulima_expo::realtime::{ChangeFeed, ChangeKind, ChangeStream, TableChange};
use mkulima_expo::storage::{ImageFile, ObjectStorage};
use mkulima_expo::MkulimaExpo;

pub const PUBLIC_BASE: &str = "https://memory.test/storage/v1/object/public";

struct Account {
    password: String,
    user: User,
}

/// Supabase stand-in that keeps every table, object and account in memory.
///
/// Queries are evaluated from the structured [`Query`], so filter handling is
/// exercised the same way the HTTP gateway encodes it.
pub struct MemoryBackend {
    tables: Mutex<HashMap<String, Vec<Value>>>,
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
    accounts: Mutex<HashMap<String, Account>>,
    feeds: Mutex<HashMap<String, broadcast::Sender<TableChange>>>,
    calls: Mutex<Vec<String>>,
    failing: Mutex<HashSet<String>>,
    uploads_before_failure: Mutex<Option<usize>>,
    select_gate: Mutex<Option<Arc<Semaphore>>>,
    clock: AtomicI64,
}

impl MemoryBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            tables: Mutex::new(HashMap::new()),
            objects: Mutex::new(BTreeMap::new()),
            accounts: Mutex::new(HashMap::new()),
            feeds: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
            uploads_before_failure: Mutex::new(None),
            select_gate: Mutex::new(None),
            clock: AtomicI64::new(0),
        })
    }

    /// Make every call of `op` (e.g. "insert", "upload", "sign_out") fail
    pub fn fail_on(&self, op: &str) {
        self.failing.lock().unwrap().insert(op.to_string());
    }

    /// Let `count` uploads succeed, then fail the rest
    pub fn fail_uploads_after(&self, count: usize) {
        *self.uploads_before_failure.lock().unwrap() = Some(count);
    }

    /// Hold every following select after it has read its rows, until the
    /// returned gate hands out a permit per select
    pub fn hold_selects(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.select_gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    /// Let selects issued from now on answer right away
    pub fn release_selects(&self) {
        *self.select_gate.lock().unwrap() = None;
    }

    pub fn heal(&self) {
        self.failing.lock().unwrap().clear();
        *self.uploads_before_failure.lock().unwrap() = None;
    }

    /// Number of recorded calls whose name starts with `prefix`
    pub fn calls(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.tables
            .lock()
            .unwrap()
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    pub fn object_paths(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    /// Put a row in place without recording a call or notifying anyone
    pub fn seed(&self, table: &str, row: Value) -> Value {
        let row = self.complete_row(row);
        self.tables
            .lock()
            .unwrap()
            .entry(table.to_string())
            .or_default()
            .push(row.clone());
        row
    }

    /// A listing owned by `farmer_id` with the given title and status
    pub fn seed_listing(&self, farmer_id: Uuid, title: &str, status: &str) -> Value {
        self.seed(
            "product_listings",
            json!({
                "farmer_id": farmer_id,
                "title": title,
                "description": format!("{} from the farm", title),
                "category": "Vegetables",
                "quantity": 10,
                "unit": "kg",
                "price_per_unit": 50,
                "location": "Nakuru",
                "availability_date": "2025-01-01",
                "images": [],
                "status": status,
            }),
        )
    }

    pub fn seed_profile(&self, id: Uuid, name: &str, phone: Option<&str>) -> Value {
        self.seed(
            "profiles",
            json!({
                "id": id,
                "full_name": name,
                "user_type": "farmer",
                "phone_number": phone,
            }),
        )
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn check(&self, op: &str) -> Result<(), GatewayError> {
        if self.failing.lock().unwrap().contains(op) {
            Err(GatewayError::status(503, format!("{} unavailable", op)))
        } else {
            Ok(())
        }
    }

    fn tick(&self) -> String {
        let seconds = self.clock.fetch_add(1, Ordering::SeqCst);
        let base = Utc.with_ymd_and_hms(2025, 1, 1, 8, 0, 0).unwrap();
        (base + chrono::Duration::seconds(seconds)).to_rfc3339()
    }

    fn complete_row(&self, mut row: Value) -> Value {
        let fields = row.as_object_mut().expect("rows are objects");
        fields
            .entry("id")
            .or_insert_with(|| json!(Uuid::new_v4()));
        if !fields.contains_key("created_at") {
            fields.insert("created_at".into(), json!(self.tick()));
        }
        fields.entry("updated_at").or_insert(Value::Null);
        row
    }

    fn notify(&self, table: &str, kind: ChangeKind, record: &Value) {
        if let Some(sender) = self.feeds.lock().unwrap().get(table) {
            let _ = sender.send(TableChange {
                table: table.to_string(),
                kind,
                record: record.clone(),
            });
        }
    }

    fn embed(&self, columns: &str, mut row: Value) -> Value {
        let Some(start) = columns.find("profiles:farmer_id(") else {
            return project(columns, row);
        };
        let inner = &columns[start + "profiles:farmer_id(".len()..];
        let fields: Vec<&str> = inner.trim_end_matches(')').split(',').collect();

        let farmer_id = row.get("farmer_id").cloned().unwrap_or(Value::Null);
        let profile = self
            .rows("profiles")
            .into_iter()
            .find(|p| p.get("id") == Some(&farmer_id))
            .map(|p| project(&fields.join(","), p))
            .unwrap_or(Value::Null);
        row["profiles"] = profile;
        row
    }
}

fn project(columns: &str, row: Value) -> Value {
    if columns.starts_with('*') {
        return row;
    }
    let mut out = Map::new();
    for column in columns.split(',') {
        if let Some(value) = row.get(column) {
            out.insert(column.to_string(), value.clone());
        }
    }
    Value::Object(out)
}

fn cell(row: &Value, column: &str) -> Option<String> {
    match row.get(column)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn number(row: &Value, column: &str) -> Option<f64> {
    cell(row, column)?.parse().ok()
}

fn ilike(text: &str, pattern: &str) -> bool {
    let text = text.to_lowercase();
    let pattern = pattern.to_lowercase();
    let parts: Vec<&str> = pattern.split('%').collect();
    if parts.len() == 1 {
        return text == pattern;
    }

    let (first, rest) = parts.split_first().unwrap();
    let (last, middle) = rest.split_last().unwrap();
    if !text.starts_with(first) {
        return false;
    }
    let mut pos = first.len();
    for part in middle {
        match text[pos..].find(part) {
            Some(found) => pos += found + part.len(),
            None => return false,
        }
    }
    text.len() >= pos + last.len() && text.ends_with(last)
}

fn matches(row: &Value, filter: &Filter) -> bool {
    match filter {
        Filter::Eq(column, value) => cell(row, column).as_deref() == Some(value.as_str()),
        Filter::ILike(column, pattern) => cell(row, column).map_or(false, |s| ilike(&s, pattern)),
        Filter::Gte(column, value) => {
            number(row, column).zip(value.parse::<f64>().ok()).map_or(false, |(a, b)| a >= b)
        }
        Filter::Lte(column, value) => {
            number(row, column).zip(value.parse::<f64>().ok()).map_or(false, |(a, b)| a <= b)
        }
        Filter::Or(filters) => filters.iter().any(|f| matches(row, f)),
    }
}

fn matches_all(row: &Value, query: &Query) -> bool {
    query.filters.iter().all(|f| matches(row, f))
}

fn merge(row: &mut Value, changes: &Value) {
    if let (Some(row), Some(changes)) = (row.as_object_mut(), changes.as_object()) {
        for (key, value) in changes {
            row.insert(key.clone(), value.clone());
        }
    }
}

#[async_trait]
impl Database for MemoryBackend {
    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Value>, GatewayError> {
        self.record(format!("select {}", table));
        self.check("select")?;

        let mut rows: Vec<Value> = self
            .rows(table)
            .into_iter()
            .filter(|row| matches_all(row, query))
            .collect();

        if let Some(order) = &query.order {
            rows.sort_by(|a, b| {
                let ordering = cell(a, &order.column).cmp(&cell(b, &order.column));
                if order.ascending {
                    ordering
                } else {
                    ordering.reverse()
                }
            });
        }

        let offset = query.offset.unwrap_or(0) as usize;
        let limit = query.limit.map(|l| l as usize).unwrap_or(usize::MAX);
        let rows: Vec<Value> = rows
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|row| self.embed(&query.columns, row))
            .collect();

        let gate = self.select_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        Ok(rows)
    }

    async fn insert(&self, table: &str, row: Value) -> Result<Vec<Value>, GatewayError> {
        self.record(format!("insert {}", table));
        self.check("insert")?;

        let row = self.seed(table, row);
        self.notify(table, ChangeKind::Insert, &row);
        Ok(vec![row])
    }

    async fn update(
        &self,
        table: &str,
        query: &Query,
        changes: Value,
    ) -> Result<Vec<Value>, GatewayError> {
        self.record(format!("update {}", table));
        self.check("update")?;

        let mut updated = Vec::new();
        {
            let mut tables = self.tables.lock().unwrap();
            for row in tables.entry(table.to_string()).or_default().iter_mut() {
                if matches_all(row, query) {
                    merge(row, &changes);
                    updated.push(row.clone());
                }
            }
        }
        for row in &updated {
            self.notify(table, ChangeKind::Update, row);
        }
        Ok(updated)
    }

    async fn upsert(
        &self,
        table: &str,
        row: Value,
        on_conflict: &str,
    ) -> Result<Vec<Value>, GatewayError> {
        self.record(format!("upsert {}", table));
        self.check("upsert")?;

        let key = row.get(on_conflict).cloned();
        let existing = {
            let mut tables = self.tables.lock().unwrap();
            tables
                .entry(table.to_string())
                .or_default()
                .iter_mut()
                .find(|r| key.is_some() && r.get(on_conflict) == key.as_ref())
                .map(|r| {
                    merge(r, &row);
                    r.clone()
                })
        };

        match existing {
            Some(merged) => {
                self.notify(table, ChangeKind::Update, &merged);
                Ok(vec![merged])
            }
            None => {
                let row = self.seed(table, row);
                self.notify(table, ChangeKind::Insert, &row);
                Ok(vec![row])
            }
        }
    }

    async fn delete(&self, table: &str, query: &Query) -> Result<Vec<Value>, GatewayError> {
        self.record(format!("delete {}", table));
        self.check("delete")?;

        let removed: Vec<Value> = {
            let mut tables = self.tables.lock().unwrap();
            let rows = tables.entry(table.to_string()).or_default();
            let (removed, kept): (Vec<Value>, Vec<Value>) =
                rows.drain(..).partition(|row| matches_all(row, query));
            *rows = kept;
            removed
        };
        for row in &removed {
            self.notify(table, ChangeKind::Delete, row);
        }
        Ok(removed)
    }
}

#[async_trait]
impl ObjectStorage for MemoryBackend {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        data: Vec<u8>,
        _content_type: &str,
    ) -> Result<(), GatewayError> {
        self.record(format!("upload {}/{}", bucket, path));
        self.check("upload")?;

        {
            let mut remaining = self.uploads_before_failure.lock().unwrap();
            if let Some(left) = remaining.as_mut() {
                if *left == 0 {
                    return Err(GatewayError::status(500, "storage quota exceeded"));
                }
                *left -= 1;
            }
        }

        let key = format!("{}/{}", bucket, path);
        let mut objects = self.objects.lock().unwrap();
        if objects.contains_key(&key) {
            return Err(GatewayError::status(409, "The resource already exists"));
        }
        objects.insert(key, data);
        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("{}/{}/{}", PUBLIC_BASE, bucket, path)
    }

    async fn remove(&self, bucket: &str, paths: &[String]) -> Result<(), GatewayError> {
        self.record(format!("remove {}", bucket));
        self.check("remove")?;

        let mut objects = self.objects.lock().unwrap();
        for path in paths {
            objects.remove(&format!("{}/{}", bucket, path));
        }
        Ok(())
    }
}

fn session_for(user: &User) -> Session {
    Session {
        access_token: format!("access-{}", Uuid::new_v4()),
        refresh_token: format!("refresh-{}", user.id),
        expires_in: 3600,
        expires_at: None,
        token_type: "bearer".to_string(),
        user: user.clone(),
    }
}

#[async_trait]
impl AuthBackend for MemoryBackend {
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: Value,
    ) -> Result<AuthResponse, GatewayError> {
        self.record("sign_up".to_string());
        self.check("sign_up")?;

        if password.len() < 6 {
            return Err(GatewayError::status(
                422,
                "Password should be at least 6 characters",
            ));
        }
        let mut accounts = self.accounts.lock().unwrap();
        if accounts.contains_key(email) {
            return Err(GatewayError::status(422, "User already registered"));
        }

        let user = User {
            id: Uuid::new_v4(),
            email: Some(email.to_string()),
            user_metadata: metadata,
        };
        accounts.insert(
            email.to_string(),
            Account {
                password: password.to_string(),
                user: user.clone(),
            },
        );

        Ok(AuthResponse {
            session: Some(session_for(&user)),
            user,
        })
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, GatewayError> {
        self.record("sign_in".to_string());
        self.check("sign_in")?;

        let accounts = self.accounts.lock().unwrap();
        match accounts.get(email) {
            Some(account) if account.password == password => Ok(session_for(&account.user)),
            _ => Err(GatewayError::status(400, "Invalid login credentials")),
        }
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Session, GatewayError> {
        self.record("refresh".to_string());
        self.check("refresh")?;

        let accounts = self.accounts.lock().unwrap();
        accounts
            .values()
            .find(|a| format!("refresh-{}", a.user.id) == refresh_token)
            .map(|a| session_for(&a.user))
            .ok_or_else(|| GatewayError::status(400, "Invalid Refresh Token"))
    }

    async fn sign_out(&self, _access_token: &str) -> Result<(), GatewayError> {
        self.record("sign_out".to_string());
        self.check("sign_out")
    }
}

#[async_trait]
impl ChangeFeed for MemoryBackend {
    async fn subscribe(&self, table: &str) -> Result<ChangeStream, GatewayError> {
        self.record(format!("subscribe {}", table));
        self.check("subscribe")?;

        let mut feeds = self.feeds.lock().unwrap();
        let sender = feeds
            .entry(table.to_string())
            .or_insert_with(|| broadcast::channel(64).0);
        Ok(sender.subscribe())
    }
}

pub fn config() -> Config {
    Config::new("https://memory.test", "anon-key").with_notice_ttl(Duration::from_secs(3))
}

pub fn app_with(config: Config) -> (MkulimaExpo, Arc<MemoryBackend>) {
    let _ = pretty_env_logger::try_init();
    let backend = MemoryBackend::new();
    let app = MkulimaExpo::with_backends(
        config,
        backend.clone(),
        backend.clone(),
        backend.clone(),
        backend.clone(),
    );
    (app, backend)
}

pub fn app() -> (MkulimaExpo, Arc<MemoryBackend>) {
    app_with(config())
}

/// Sign up and stay signed in as a farmer
pub async fn sign_up_farmer(app: &MkulimaExpo, email: &str) -> Identity {
    app.session()
        .sign_up(email, "shamba-password", UserType::Farmer)
        .await
        .expect("sign-up succeeds")
}

pub fn tomatoes() -> ListingDraft {
    ListingDraft {
        title: "Tomatoes".into(),
        description: "Fresh".into(),
        category: "Vegetables".into(),
        quantity: "10".into(),
        unit: "kg".into(),
        price_per_unit: "50".into(),
        location: "Nakuru".into(),
        availability_date: "2025-01-01".into(),
        ..Default::default()
    }
}

pub fn jpeg(name: &str, size: usize) -> ImageFile {
    ImageFile::new(name, "image/jpeg", vec![0xFF; size])
}

/// Poll `check` until it holds or a second has passed
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
