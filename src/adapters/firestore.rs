use std::time::Duration;

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::adapters::device_store::{DeviceStore, RecordFeed, StoreError};
use crate::adapters::firestore_value::{decode_fields, encode_fields};
use crate::domain::device_record::{DeviceRecord, RecordPatch};

const DEFAULT_ENDPOINT: &str = "https://firestore.googleapis.com/v1";
const DEFAULT_DATABASE: &str = "(default)";
const REQUEST_TIMEOUT_SECONDS: u64 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirestoreSettings {
    pub project_id: String,
    pub api_key: Option<String>,
    pub database_id: String,
    pub endpoint: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FirebaseBlob {
    project_id: Option<String>,
    api_key: Option<String>,
    database_id: Option<String>,
    firestore_endpoint: Option<String>,
}

impl FirestoreSettings {
    pub fn from_blob(raw: &str) -> Result<Self, StoreError> {
        let blob: FirebaseBlob = serde_json::from_str(raw)
            .map_err(|error| StoreError::Config(format!("store config is not valid JSON: {error}")))?;

        let project_id = non_empty(blob.project_id)
            .ok_or_else(|| StoreError::Config("store config requires projectId".to_string()))?;

        Ok(Self {
            project_id,
            api_key: non_empty(blob.api_key),
            database_id: non_empty(blob.database_id).unwrap_or_else(|| DEFAULT_DATABASE.to_string()),
            endpoint: non_empty(blob.firestore_endpoint)
                .map(|endpoint| endpoint.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
        })
    }

    fn documents_url(&self) -> String {
        format!(
            "{}/projects/{}/databases/{}/documents",
            self.endpoint, self.project_id, self.database_id
        )
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[derive(Debug, Deserialize)]
struct FirestoreDocument {
    name: String,
    #[serde(default)]
    fields: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct RunQueryItem {
    document: Option<FirestoreDocument>,
}

#[derive(Debug, Clone)]
pub struct FirestoreStore {
    client: reqwest::Client,
    documents_url: String,
    collection: String,
    api_key: Option<String>,
    poll_interval: Duration,
}

impl FirestoreStore {
    pub fn new(
        settings: &FirestoreSettings,
        collection: &str,
        poll_interval: Duration,
    ) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECONDS))
            .build()?;

        Ok(Self {
            client,
            documents_url: settings.documents_url(),
            collection: collection.to_string(),
            api_key: settings.api_key.clone(),
            poll_interval,
        })
    }

    fn document_url(&self, id: &str) -> String {
        format!("{}/{}/{}", self.documents_url, self.collection, id)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.query(&[("key", key)]),
            None => request,
        }
    }
}

#[async_trait]
impl DeviceStore for FirestoreStore {
    async fn get(&self, id: &str) -> Result<Option<DeviceRecord>, StoreError> {
        if id.trim().is_empty() || id.contains('/') {
            return Ok(None);
        }

        let response = self
            .authorize(self.client.get(self.document_url(id)))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let document: FirestoreDocument = ensure_success(response).await?.json().await?;
        decode_document(&document).map(Some)
    }

    async fn find_by_uid(&self, uid: &str) -> Result<Vec<DeviceRecord>, StoreError> {
        let query = json!({
            "structuredQuery": {
                "from": [{ "collectionId": self.collection }],
                "where": {
                    "fieldFilter": {
                        "field": { "fieldPath": "uid" },
                        "op": "EQUAL",
                        "value": { "stringValue": uid }
                    }
                }
            }
        });

        let response = self
            .authorize(
                self.client
                    .post(format!("{}:runQuery", self.documents_url))
                    .json(&query),
            )
            .send()
            .await?;
        let items: Vec<RunQueryItem> = ensure_success(response).await?.json().await?;

        items
            .iter()
            .filter_map(|item| item.document.as_ref())
            .map(decode_document)
            .collect()
    }

    async fn merge(&self, id: &str, patch: &RecordPatch) -> Result<(), StoreError> {
        let plain = match serde_json::to_value(patch) {
            Ok(Value::Object(fields)) => fields,
            Ok(_) => Map::new(),
            Err(error) => return Err(StoreError::Decode(error.to_string())),
        };

        let mask: Vec<(&str, &str)> = patch
            .field_paths()
            .into_iter()
            .map(|path| ("updateMask.fieldPaths", path))
            .collect();

        let response = self
            .authorize(
                self.client
                    .patch(self.document_url(id))
                    .query(&mask)
                    .json(&json!({ "fields": encode_fields(&plain) })),
            )
            .send()
            .await?;
        ensure_success(response).await?;
        Ok(())
    }

    fn subscribe(&self, id: &str, cancel: CancellationToken) -> RecordFeed {
        let (tx, rx) = mpsc::channel(16);
        let store = self.clone();
        let id = id.to_string();
        tokio::spawn(async move { watch_document(store, id, tx, cancel).await });
        rx
    }
}

// Fetch failures are pushed once per outage; polling carries on until cancelled or until the
// receiver goes away.
async fn watch_document(
    store: FirestoreStore,
    id: String,
    tx: mpsc::Sender<Result<DeviceRecord, StoreError>>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(store.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_pushed: Option<DeviceRecord> = None;
    let mut failing = false;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let message = match store.get(&id).await {
            Ok(Some(record)) => {
                failing = false;
                if last_pushed.as_ref() == Some(&record) {
                    continue;
                }
                last_pushed = Some(record.clone());
                Ok(record)
            }
            Ok(None) => Err(StoreError::Missing(id.clone())),
            Err(error) => Err(error),
        };

        if let Err(error) = &message {
            if failing {
                tracing::debug!(document = %id, error = %error, "document watch still failing");
                continue;
            }
            failing = true;
        }

        if tx.send(message).await.is_err() {
            break;
        }
    }

    tracing::debug!(document = %id, "document watch stopped");
}

async fn ensure_success(response: Response) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(StoreError::Status {
        status: status.as_u16(),
        body,
    })
}

fn decode_document(document: &FirestoreDocument) -> Result<DeviceRecord, StoreError> {
    let id = document
        .name
        .rsplit('/')
        .next()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| StoreError::Decode(format!("document name {:?} has no id", document.name)))?;

    let plain = decode_fields(&document.fields).map_err(|error| StoreError::Decode(error.to_string()))?;
    let mut record: DeviceRecord = serde_json::from_value(Value::Object(plain))
        .map_err(|error| StoreError::Decode(error.to_string()))?;
    record.id = id.to_string();
    Ok(record)
}
