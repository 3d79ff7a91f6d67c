use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::RegistryError;

/// Content type of the Confluent schema registry REST API.
pub const REGISTRY_CONTENT_TYPE: &str = "application/vnd.schemaregistry.v1+json";

/// Schema registered under a subject, as returned by `versions/latest`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RegisteredSchema {
    pub id: u32,
    pub schema: String,
}

/// Value subject of a topic (`TopicNameStrategy`).
pub fn value_subject(topic: &str) -> String {
    format!("{topic}-value")
}

// ════════════════════════════════════════════════════════════════
//  SchemaRegistry trait
// ════════════════════════════════════════════════════════════════

/// Разрешение schema id ↔ определение схемы.
///
/// Реализации: [`HttpSchemaRegistry`] (Confluent REST), [`InMemoryRegistry`].
pub trait SchemaRegistry: Send + Sync {
    /// Определение схемы (JSON) по глобальному id.
    fn schema_by_id(
        &self,
        id: u32,
    ) -> Pin<Box<dyn Future<Output = Result<String, RegistryError>> + Send + '_>>;

    /// Зарегистрировать схему под subject'ом; идемпотентно, возвращает id.
    fn register<'a>(
        &'a self,
        subject: &'a str,
        schema: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<u32, RegistryError>> + Send + 'a>>;

    /// Последняя версия схемы subject'а.
    fn latest<'a>(
        &'a self,
        subject: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<RegisteredSchema, RegistryError>> + Send + 'a>>;
}

// ════════════════════════════════════════════════════════════════
//  HTTP implementation
// ════════════════════════════════════════════════════════════════

#[derive(Deserialize)]
struct SchemaBody {
    schema: String,
}

#[derive(Deserialize)]
struct IdBody {
    id: u32,
}

pub struct HttpSchemaRegistry {
    http: reqwest::Client,
    base_url: String,
}

impl HttpSchemaRegistry {
    /// `timeout` bounds every registry request end to end.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, RegistryError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(RegistryError::Client)?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        url: String,
        what: impl FnOnce() -> String,
    ) -> Result<T, RegistryError> {
        let resp = request
            .header(reqwest::header::ACCEPT, REGISTRY_CONTENT_TYPE)
            .send()
            .await
            .map_err(|source| RegistryError::Transport { url: url.clone(), source })?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|source| RegistryError::Transport { url: url.clone(), source })?;

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(RegistryError::NotFound(what()));
        }
        if !status.is_success() {
            return Err(RegistryError::Status { url, status: status.as_u16(), body });
        }
        serde_json::from_str(&body).map_err(|source| RegistryError::Body { url, source })
    }
}

impl SchemaRegistry for HttpSchemaRegistry {
    fn schema_by_id(
        &self,
        id: u32,
    ) -> Pin<Box<dyn Future<Output = Result<String, RegistryError>> + Send + '_>> {
        Box::pin(async move {
            let url = format!("{}/schemas/ids/{id}", self.base_url);
            tracing::debug!(%url, "fetching schema");
            let body: SchemaBody = self
                .call(self.http.get(&url), url, || format!("schema id {id}"))
                .await?;
            Ok(body.schema)
        })
    }

    fn register<'a>(
        &'a self,
        subject: &'a str,
        schema: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<u32, RegistryError>> + Send + 'a>> {
        Box::pin(async move {
            let url = format!("{}/subjects/{subject}/versions", self.base_url);
            tracing::debug!(%url, "registering schema");
            let request = self
                .http
                .post(&url)
                .header(reqwest::header::CONTENT_TYPE, REGISTRY_CONTENT_TYPE)
                .body(serde_json::json!({ "schema": schema }).to_string());
            let body: IdBody = self
                .call(request, url, || format!("subject {subject}"))
                .await?;
            Ok(body.id)
        })
    }

    fn latest<'a>(
        &'a self,
        subject: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<RegisteredSchema, RegistryError>> + Send + 'a>> {
        Box::pin(async move {
            let url = format!("{}/subjects/{subject}/versions/latest", self.base_url);
            tracing::debug!(%url, "fetching latest schema");
            self.call(self.http.get(&url), url, || format!("subject {subject}"))
                .await
        })
    }
}

// ════════════════════════════════════════════════════════════════
//  In-memory implementation (local runs, tests)
// ════════════════════════════════════════════════════════════════

#[derive(Default)]
struct MemoryState {
    schemas: Vec<String>,
    subjects: HashMap<String, Vec<u32>>,
}

/// Registry living in process memory. Ids start at 1.
#[derive(Default)]
pub struct InMemoryRegistry {
    state: tokio::sync::Mutex<MemoryState>,
    requests: AtomicUsize,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of calls served so far, of any kind.
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::Relaxed)
    }

    async fn insert(&self, subject: Option<&str>, schema: &str) -> u32 {
        let mut state = self.state.lock().await;
        let id = match state.schemas.iter().position(|s| s == schema) {
            Some(i) => i as u32 + 1,
            None => {
                state.schemas.push(schema.to_string());
                state.schemas.len() as u32
            }
        };
        if let Some(subject) = subject {
            let versions = state.subjects.entry(subject.to_string()).or_default();
            if !versions.contains(&id) {
                versions.push(id);
            }
        }
        id
    }

    /// Store a schema without binding it to a subject.
    pub async fn add_schema(&self, schema: &str) -> u32 {
        self.insert(None, schema).await
    }
}

impl SchemaRegistry for InMemoryRegistry {
    fn schema_by_id(
        &self,
        id: u32,
    ) -> Pin<Box<dyn Future<Output = Result<String, RegistryError>> + Send + '_>> {
        Box::pin(async move {
            self.requests.fetch_add(1, Ordering::Relaxed);
            let state = self.state.lock().await;
            id.checked_sub(1)
                .and_then(|i| state.schemas.get(i as usize))
                .cloned()
                .ok_or_else(|| RegistryError::NotFound(format!("schema id {id}")))
        })
    }

    fn register<'a>(
        &'a self,
        subject: &'a str,
        schema: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<u32, RegistryError>> + Send + 'a>> {
        Box::pin(async move {
            self.requests.fetch_add(1, Ordering::Relaxed);
            Ok(self.insert(Some(subject), schema).await)
        })
    }

    fn latest<'a>(
        &'a self,
        subject: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<RegisteredSchema, RegistryError>> + Send + 'a>> {
        Box::pin(async move {
            self.requests.fetch_add(1, Ordering::Relaxed);
            let state = self.state.lock().await;
            state
                .subjects
                .get(subject)
                .and_then(|versions| versions.last())
                .and_then(|&id| {
                    state.schemas.get(id as usize - 1).map(|schema| RegisteredSchema {
                        id,
                        schema: schema.clone(),
                    })
                })
                .ok_or_else(|| RegistryError::NotFound(format!("subject {subject}")))
        })
    }
}
