use super::{AccountRecord, AccountStore, BackendError, UsageIncrement};
use crate::plans::{Limit, PlanId};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

const COLLECTION: &str = "users";
const MAX_COMMIT_ATTEMPTS: usize = 3;

/// Account documents stored in Firestore and accessed over its REST API.
///
/// Usage counters are updated with a `:commit` write guarded by the document's `updateTime`, so a
/// concurrent writer makes the commit fail instead of silently overwriting the count.
pub struct FirestoreAccountStore {
    http: Client,
    base_url: String,
    project_id: String,
    api_key: String,
}

impl FirestoreAccountStore {
    /// Create a store for the given endpoint, project and web API key.
    pub fn new(base_url: String, project_id: String, api_key: String) -> Self {
        let http = Client::builder()
            .user_agent("rusty-scribe/firestore")
            .build()
            .expect("Failed to construct reqwest::Client for Firestore");
        Self {
            http,
            base_url,
            project_id,
            api_key,
        }
    }

    fn database_path(&self) -> String {
        format!("projects/{}/databases/(default)/documents", self.project_id)
    }

    fn document_name(&self, uid: &str) -> String {
        format!("{}/{COLLECTION}/{uid}", self.database_path())
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{path}", self.base_url.trim_end_matches('/'))
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, BackendError> {
        request
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await
            .map_err(|error| {
                BackendError::Unavailable(format!(
                    "failed to reach Firestore at {}: {error}",
                    self.base_url
                ))
            })
    }

    async fn fetch(&self, uid: &str) -> Result<Option<StoredAccount>, BackendError> {
        let response = self
            .send(self.http.get(self.url(&self.document_name(uid))))
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let document = decode_document(ensure_success(response).await?).await?;
        Ok(Some(document.into_account(uid)))
    }

    async fn fetch_existing(&self, uid: &str) -> Result<StoredAccount, BackendError> {
        self.fetch(uid)
            .await?
            .ok_or_else(|| BackendError::NotFound(uid.to_string()))
    }

    /// Write the usage fields if the document is unchanged since `update_time`.
    ///
    /// Returns `Ok(false)` when the precondition failed.
    async fn commit_usage(
        &self,
        uid: &str,
        update_time: &str,
        count: u64,
        period: &str,
    ) -> Result<bool, BackendError> {
        let body = json!({
            "writes": [{
                "update": {
                    "name": self.document_name(uid),
                    "fields": {
                        "monthlyUsage": integer_value(count),
                        "usagePeriod": string_value(period),
                    }
                },
                "updateMask": { "fieldPaths": ["monthlyUsage", "usagePeriod"] },
                "currentDocument": { "updateTime": update_time }
            }]
        });
        let url = self.url(&format!("{}:commit", self.database_path()));
        let response = self.send(self.http.post(url).json(&body)).await?;
        let status = response.status();
        if status == StatusCode::CONFLICT {
            return Ok(false);
        }
        if status == StatusCode::BAD_REQUEST {
            let text = response.text().await.unwrap_or_default();
            if text.contains("FAILED_PRECONDITION") {
                return Ok(false);
            }
            return Err(BackendError::Rejected(text));
        }
        ensure_success(response).await?;
        Ok(true)
    }
}

#[async_trait]
impl AccountStore for FirestoreAccountStore {
    async fn load_account(&self, uid: &str) -> Result<Option<AccountRecord>, BackendError> {
        Ok(self.fetch(uid).await?.map(|stored| stored.record))
    }

    async fn create_account(
        &self,
        uid: &str,
        email: Option<&str>,
    ) -> Result<AccountRecord, BackendError> {
        let mut fields = Map::new();
        fields.insert("plan".into(), string_value(PlanId::Free.as_str()));
        fields.insert("monthlyUsage".into(), integer_value(0));
        if let Some(email) = email {
            fields.insert("email".into(), string_value(email));
        }
        if let Ok(created_at) = OffsetDateTime::now_utc().format(&Rfc3339) {
            fields.insert("createdAt".into(), json!({ "timestampValue": created_at }));
        }

        let url = self.url(&format!("{}/{COLLECTION}", self.database_path()));
        let response = self
            .send(
                self.http
                    .post(url)
                    .query(&[("documentId", uid)])
                    .json(&json!({ "fields": fields })),
            )
            .await?;
        if response.status() == StatusCode::CONFLICT {
            tracing::debug!(uid, "Account document already exists");
            return Ok(self.fetch_existing(uid).await?.record);
        }
        let document = decode_document(ensure_success(response).await?).await?;
        tracing::info!(uid, "Created account document");
        Ok(document.into_account(uid).record)
    }

    async fn set_plan(&self, uid: &str, plan: PlanId) -> Result<(), BackendError> {
        let response = self
            .send(
                self.http
                    .patch(self.url(&self.document_name(uid)))
                    .query(&[
                        ("updateMask.fieldPaths", "plan"),
                        ("currentDocument.exists", "true"),
                    ])
                    .json(&json!({ "fields": { "plan": string_value(plan.as_str()) } })),
            )
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(BackendError::NotFound(uid.to_string()));
        }
        ensure_success(response).await?;
        Ok(())
    }

    async fn try_increment_usage(
        &self,
        uid: &str,
        period: &str,
        quota: Limit,
    ) -> Result<UsageIncrement, BackendError> {
        for attempt in 1..=MAX_COMMIT_ATTEMPTS {
            let stored = self.fetch_existing(uid).await?;
            let current = stored.record.usage_in(period);
            if quota.is_exhausted_at(current) {
                return Ok(UsageIncrement::LimitReached);
            }
            let update_time = stored.update_time.ok_or_else(|| {
                BackendError::InvalidResponse("document is missing updateTime".into())
            })?;
            if self
                .commit_usage(uid, &update_time, current + 1, period)
                .await?
            {
                return Ok(UsageIncrement::Applied(current + 1));
            }
            tracing::debug!(uid, attempt, "Usage increment lost a race; retrying");
        }
        Err(BackendError::Contention(format!(
            "usage increment for {uid} failed after {MAX_COMMIT_ATTEMPTS} attempts"
        )))
    }

    async fn decrement_usage(&self, uid: &str, period: &str) -> Result<u64, BackendError> {
        for attempt in 1..=MAX_COMMIT_ATTEMPTS {
            let stored = self.fetch_existing(uid).await?;
            let current = stored.record.usage_in(period);
            if current == 0 {
                return Ok(0);
            }
            let update_time = stored.update_time.ok_or_else(|| {
                BackendError::InvalidResponse("document is missing updateTime".into())
            })?;
            if self
                .commit_usage(uid, &update_time, current - 1, period)
                .await?
            {
                return Ok(current - 1);
            }
            tracing::debug!(uid, attempt, "Usage decrement lost a race; retrying");
        }
        Err(BackendError::Contention(format!(
            "usage decrement for {uid} failed after {MAX_COMMIT_ATTEMPTS} attempts"
        )))
    }
}

struct StoredAccount {
    record: AccountRecord,
    update_time: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FirestoreDocument {
    #[serde(default)]
    fields: HashMap<String, Value>,
    #[serde(default)]
    update_time: Option<String>,
}

impl FirestoreDocument {
    fn into_account(self, uid: &str) -> StoredAccount {
        let string_field = |name: &str| {
            self.fields
                .get(name)
                .and_then(|value| value.get("stringValue"))
                .and_then(Value::as_str)
                .map(str::to_string)
        };
        let plan = string_field("plan")
            .map(|raw| PlanId::from_stored(&raw))
            .unwrap_or_default();
        let monthly_usage = self
            .fields
            .get("monthlyUsage")
            .and_then(integer_field)
            .unwrap_or(0);
        StoredAccount {
            record: AccountRecord {
                uid: uid.to_string(),
                email: string_field("email"),
                plan,
                monthly_usage,
                usage_period: string_field("usagePeriod"),
            },
            update_time: self.update_time,
        }
    }
}

/// Firestore encodes 64-bit integers as strings; accept plain numbers too.
fn integer_field(value: &Value) -> Option<u64> {
    let raw = value.get("integerValue")?;
    raw.as_u64()
        .or_else(|| raw.as_str().and_then(|text| text.parse().ok()))
}

fn string_value(value: &str) -> Value {
    json!({ "stringValue": value })
}

fn integer_value(value: u64) -> Value {
    json!({ "integerValue": value.to_string() })
}

async fn ensure_success(response: Response) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(BackendError::RequestFailed(format!(
        "Firestore returned {status}: {body}"
    )))
}

async fn decode_document(response: Response) -> Result<FirestoreDocument, BackendError> {
    response.json().await.map_err(|error| {
        BackendError::InvalidResponse(format!("failed to decode Firestore document: {error}"))
    })
}
