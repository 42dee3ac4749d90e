//! Remote workflow store.
//!
//! The store is a document-shaped key-value service. The engine only needs
//! create, fetch, partial update and delete; [`WorkflowStore`] is that seam and
//! [`HttpWorkflowStore`] talks to the JSON API:
//!
//! | operation | request |
//! |-----------|---------|
//! | create    | `POST   {base}/api/workflows` |
//! | get       | `GET    {base}/api/workflows/{id}` |
//! | update    | `PUT    {base}/api/workflows/{id}` |
//! | delete    | `DELETE {base}/api/workflows/{id}` |

use crate::document::{NewWorkflow, WorkflowDocument, WorkflowUpdate};
use crate::error::StoreError;
use async_trait::async_trait;
use nodeloom_core::{FolderId, WorkflowId};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, instrument};

/// Operations on the remote workflow store.
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// Creates an empty workflow and returns the stored document.
    async fn create_workflow(
        &self,
        name: &str,
        folder_id: Option<&FolderId>,
    ) -> Result<WorkflowDocument, StoreError>;

    /// Fetches a workflow.
    async fn get_workflow(&self, workflow_id: &WorkflowId) -> Result<WorkflowDocument, StoreError>;

    /// Applies a partial update and returns the updated document.
    async fn update_workflow(
        &self,
        workflow_id: &WorkflowId,
        update: &WorkflowUpdate,
    ) -> Result<WorkflowDocument, StoreError>;

    /// Deletes a workflow.
    async fn delete_workflow(&self, workflow_id: &WorkflowId) -> Result<(), StoreError>;
}

/// Configuration for the remote workflow store.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteStoreConfig {
    /// Base URL of the store, e.g. `http://localhost:3000`.
    pub base_url: String,

    /// Bearer token sent with every request.
    #[serde(default)]
    pub api_token: Option<String>,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_timeout_seconds() -> u64 {
    30
}

/// [`WorkflowStore`] backed by the store's HTTP API.
#[derive(Debug, Clone)]
pub struct HttpWorkflowStore {
    client: reqwest::Client,
    base_url: String,
    api_token: Option<String>,
}

impl HttpWorkflowStore {
    /// Creates a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidConfig`] if the base URL is empty or the
    /// HTTP client cannot be built.
    pub fn new(config: &RemoteStoreConfig) -> Result<Self, StoreError> {
        let base_url = config.base_url.trim().trim_end_matches('/');
        if base_url.is_empty() {
            return Err(StoreError::InvalidConfig {
                reason: "base url is empty".to_string(),
            });
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| StoreError::InvalidConfig {
                reason: e.to_string(),
            })?;

        Ok(Self {
            client,
            base_url: base_url.to_string(),
            api_token: config.api_token.clone().filter(|t| !t.trim().is_empty()),
        })
    }

    fn collection_url(&self) -> String {
        format!("{}/api/workflows", self.base_url)
    }

    fn workflow_url(&self, workflow_id: &WorkflowId) -> String {
        format!("{}/api/workflows/{}", self.base_url, workflow_id)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(
        &self,
        request: RequestBuilder,
        workflow_id: Option<&WorkflowId>,
    ) -> Result<Response, StoreError> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::NOT_FOUND
            && let Some(workflow_id) = workflow_id
        {
            return Err(StoreError::NotFound {
                workflow_id: workflow_id.clone(),
            });
        }

        let body = response.text().await.unwrap_or_default();
        Err(StoreError::Rejected {
            status: status.as_u16(),
            reason: error_message(&body).unwrap_or_else(|| status.to_string()),
        })
    }
}

fn transport_error(err: reqwest::Error) -> StoreError {
    if err.is_timeout() {
        StoreError::Timeout
    } else {
        StoreError::RequestFailed {
            reason: err.to_string(),
        }
    }
}

/// Extracts `{"error": "..."}` from an error body, if present.
fn error_message(body: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: String,
    }
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .map(|b| b.error)
        .filter(|e| !e.trim().is_empty())
}

async fn parse<T: DeserializeOwned>(response: Response) -> Result<T, StoreError> {
    let body = response.text().await.map_err(transport_error)?;
    serde_json::from_str(&body).map_err(|e| StoreError::ResponseParseFailed {
        reason: e.to_string(),
    })
}

#[async_trait]
impl WorkflowStore for HttpWorkflowStore {
    #[instrument(skip(self))]
    async fn create_workflow(
        &self,
        name: &str,
        folder_id: Option<&FolderId>,
    ) -> Result<WorkflowDocument, StoreError> {
        let body = NewWorkflow {
            name: name.to_string(),
            folder_id: folder_id.cloned(),
        };
        let response = self
            .send(self.client.post(self.collection_url()).json(&body), None)
            .await?;
        let document: WorkflowDocument = parse(response).await?;
        debug!(workflow_id = %document.id, "workflow created");
        Ok(document)
    }

    #[instrument(skip_all, fields(workflow_id = %workflow_id))]
    async fn get_workflow(&self, workflow_id: &WorkflowId) -> Result<WorkflowDocument, StoreError> {
        let response = self
            .send(self.client.get(self.workflow_url(workflow_id)), Some(workflow_id))
            .await?;
        parse(response).await
    }

    #[instrument(skip_all, fields(workflow_id = %workflow_id))]
    async fn update_workflow(
        &self,
        workflow_id: &WorkflowId,
        update: &WorkflowUpdate,
    ) -> Result<WorkflowDocument, StoreError> {
        let response = self
            .send(
                self.client.put(self.workflow_url(workflow_id)).json(update),
                Some(workflow_id),
            )
            .await?;
        parse(response).await
    }

    #[instrument(skip_all, fields(workflow_id = %workflow_id))]
    async fn delete_workflow(&self, workflow_id: &WorkflowId) -> Result<(), StoreError> {
        self.send(
            self.client.delete(self.workflow_url(workflow_id)),
            Some(workflow_id),
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Path;
    use axum::http::{HeaderMap, StatusCode, header};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::{Value as JsonValue, json};

    /// Serves `router` on a local port and returns its base URL.
    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(listener, router).await.expect("serve");
        });
        format!("http://{addr}")
    }

    /// A store that knows only `wf-1` and wants the bearer token `secret`.
    fn store_api() -> Router {
        Router::new()
            .route(
                "/api/workflows",
                post(|headers: HeaderMap, Json(body): Json<JsonValue>| async move {
                    let authorized = headers
                        .get(header::AUTHORIZATION)
                        .and_then(|v| v.to_str().ok())
                        == Some("Bearer secret");
                    if !authorized {
                        return (StatusCode::UNAUTHORIZED, Json(json!({"error": "bad token"})));
                    }
                    (
                        StatusCode::CREATED,
                        Json(json!({"id": "wf-1", "name": body["name"], "folderId": body["folderId"]})),
                    )
                }),
            )
            .route(
                "/api/workflows/{id}",
                get(|Path(id): Path<String>| async move {
                    if id == "wf-1" {
                        (StatusCode::OK, Json(json!({"id": "wf-1", "name": "Stored"})))
                    } else {
                        (StatusCode::NOT_FOUND, Json(json!({"error": "no such workflow"})))
                    }
                })
                .put(|| async {
                    (StatusCode::CONFLICT, Json(json!({"error": "workflow is locked"})))
                }),
            )
    }

    fn authorized(base_url: String) -> HttpWorkflowStore {
        HttpWorkflowStore::new(&RemoteStoreConfig {
            base_url,
            api_token: Some("secret".to_string()),
            timeout_seconds: 5,
        })
        .expect("store")
    }

    #[tokio::test]
    async fn create_sends_token_and_returns_document() {
        let store = authorized(serve(store_api()).await);
        let document = store
            .create_workflow("Captions", Some(&FolderId::new("folder-1")))
            .await
            .expect("create");
        assert_eq!(document.id, WorkflowId::new("wf-1"));
        assert_eq!(document.name, "Captions");
        assert_eq!(document.folder_id, Some(FolderId::new("folder-1")));
    }

    #[tokio::test]
    async fn missing_token_is_rejected_with_body_message() {
        let store = HttpWorkflowStore::new(&config(&serve(store_api()).await)).expect("store");
        let err = store.create_workflow("Captions", None).await.unwrap_err();
        assert_eq!(
            err,
            StoreError::Rejected {
                status: 401,
                reason: "bad token".to_string()
            }
        );
    }

    #[tokio::test]
    async fn get_maps_missing_workflow_to_not_found() {
        let store = authorized(serve(store_api()).await);
        let document = store
            .get_workflow(&WorkflowId::new("wf-1"))
            .await
            .expect("get");
        assert_eq!(document.name, "Stored");

        let err = store
            .get_workflow(&WorkflowId::new("wf-2"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            StoreError::NotFound {
                workflow_id: WorkflowId::new("wf-2")
            }
        );
    }

    #[tokio::test]
    async fn update_conflict_is_rejected() {
        let store = authorized(serve(store_api()).await);
        let err = store
            .update_workflow(&WorkflowId::new("wf-1"), &WorkflowUpdate::default())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            StoreError::Rejected {
                status: 409,
                reason: "workflow is locked".to_string()
            }
        );
    }

    fn config(base_url: &str) -> RemoteStoreConfig {
        RemoteStoreConfig {
            base_url: base_url.to_string(),
            api_token: None,
            timeout_seconds: 5,
        }
    }

    #[test]
    fn config_defaults_timeout() {
        let config: RemoteStoreConfig =
            serde_json::from_str(r#"{"base_url":"http://localhost:3000"}"#).expect("deserialize");
        assert_eq!(config.timeout_seconds, 30);
        assert!(config.api_token.is_none());
    }

    #[test]
    fn urls_ignore_trailing_slash() {
        let store = HttpWorkflowStore::new(&config("http://localhost:3000/")).expect("store");
        assert_eq!(store.collection_url(), "http://localhost:3000/api/workflows");
        assert_eq!(
            store.workflow_url(&WorkflowId::new("wf-1")),
            "http://localhost:3000/api/workflows/wf-1"
        );
    }

    #[test]
    fn empty_base_url_is_invalid() {
        assert!(matches!(
            HttpWorkflowStore::new(&config("  ")),
            Err(StoreError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn error_body_message_is_extracted() {
        assert_eq!(
            error_message(r#"{"error":"name taken"}"#),
            Some("name taken".to_string())
        );
        assert_eq!(error_message("<html>"), None);
        assert_eq!(error_message(r#"{"error":""}"#), None);
    }

    #[tokio::test]
    async fn unreachable_store_is_request_failure() {
        let store = HttpWorkflowStore::new(&config("http://127.0.0.1:9")).expect("store");
        let err = store
            .get_workflow(&WorkflowId::new("wf-1"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::RequestFailed { .. } | StoreError::Timeout
        ));
    }
}
