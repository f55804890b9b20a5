use crate::domain::messages::{CalculateMatricesRequest, MatrixPayload};
use crate::domain::ports::{MatrixDispatcher, ResourceManagerClient};
use crate::utils::error::{AllocError, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::collections::BTreeMap;
use std::time::Duration;

pub const DISPATCH_TIMEOUT: Duration = Duration::from_secs(10);
pub const RESOURCE_MANAGER_TIMEOUT: Duration = Duration::from_secs(30);

fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim().trim_end_matches('/'), path)
}

/// Sends each user's actual time and expense vectors to its node.
#[derive(Debug, Clone)]
pub struct HttpMatrixDispatcher {
    client: Client,
    user_urls: BTreeMap<String, String>,
}

impl HttpMatrixDispatcher {
    pub fn new(user_urls: BTreeMap<String, String>) -> Result<Self> {
        let client = Client::builder().timeout(DISPATCH_TIMEOUT).build()?;
        Ok(Self { client, user_urls })
    }
}

#[async_trait]
impl MatrixDispatcher for HttpMatrixDispatcher {
    fn targets(&self) -> Vec<String> {
        self.user_urls
            .iter()
            .filter(|(_, url)| !url.trim().is_empty())
            .map(|(user, _)| user.clone())
            .collect()
    }

    async fn dispatch(&self, user_id: &str, payload: &MatrixPayload) -> Result<serde_json::Value> {
        let base = self
            .user_urls
            .get(user_id)
            .ok_or_else(|| AllocError::MissingConfigError {
                field: format!("user_urls.{}", user_id),
            })?;
        let url = join_url(base, "receive_matrices");
        tracing::debug!("Sending matrices to {} at {}", user_id, url);

        let response = self
            .client
            .post(&url)
            .json(payload)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }
}

/// Client of the provider node's `/calculate_matrices`.
#[derive(Debug, Clone)]
pub struct HttpResourceManagerClient {
    client: Client,
    base_url: String,
}

impl HttpResourceManagerClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder().timeout(RESOURCE_MANAGER_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: base_url.to_string(),
        })
    }

    pub fn endpoint(&self) -> String {
        join_url(&self.base_url, "calculate_matrices")
    }
}

#[async_trait]
impl ResourceManagerClient for HttpResourceManagerClient {
    async fn calculate_matrices(
        &self,
        request: &CalculateMatricesRequest,
    ) -> Result<serde_json::Value> {
        let url = self.endpoint();
        tracing::info!("📤 Sending allocations to resource manager: {}", url);

        let response = self.client.post(&url).json(request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!("Resource manager answered {}: {}", status, body);
            return Err(AllocError::StepFailed {
                step: "calculate_matrices".to_string(),
                detail: format!("HTTP {}: {}", status, body),
            });
        }

        tracing::info!("Resource manager response: {}", status);
        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let client = HttpResourceManagerClient::new("http://10.0.0.5:5001/").unwrap();
        assert_eq!(client.endpoint(), "http://10.0.0.5:5001/calculate_matrices");
    }

    #[test]
    fn test_blank_urls_are_not_targets() {
        let dispatcher = HttpMatrixDispatcher::new(BTreeMap::from([
            ("S1".to_string(), "http://a:5000".to_string()),
            ("S2".to_string(), " ".to_string()),
        ]))
        .unwrap();
        assert_eq!(dispatcher.targets(), vec!["S1"]);
    }

    #[tokio::test]
    async fn test_dispatch_posts_payload() {
        let server = MockServer::start();
        let api_mock = server.mock(|when, then| {
            when.method(POST)
                .path("/receive_matrices")
                .json_body(json!({"time_vector": [0.0, 9.0], "expense_vector": [0.0, 5.4], "step": 1}));
            then.status(200).json_body(json!({"user_id": "S1", "actual_utility": 0.1}));
        });

        let dispatcher =
            HttpMatrixDispatcher::new(BTreeMap::from([("S1".to_string(), server.base_url())]))
                .unwrap();
        let payload = MatrixPayload {
            time_vector: vec![0.0, 9.0],
            expense_vector: vec![0.0, 5.4],
            step: 1,
        };
        let response = dispatcher.dispatch("S1", &payload).await.unwrap();

        api_mock.assert();
        assert_eq!(response["user_id"], "S1");
    }

    #[tokio::test]
    async fn test_dispatch_to_unconfigured_user() {
        let dispatcher = HttpMatrixDispatcher::new(BTreeMap::new()).unwrap();
        let payload = MatrixPayload {
            time_vector: vec![],
            expense_vector: vec![],
            step: 1,
        };
        assert!(dispatcher.dispatch("S1", &payload).await.is_err());
    }

    #[tokio::test]
    async fn test_resource_manager_error_status() {
        let server = MockServer::start();
        let api_mock = server.mock(|when, then| {
            when.method(POST).path("/calculate_matrices");
            then.status(400).json_body(json!({"error": "Missing allocations"}));
        });

        let client = HttpResourceManagerClient::new(&server.base_url()).unwrap();
        let err = client
            .calculate_matrices(&CalculateMatricesRequest::default())
            .await
            .unwrap_err();

        api_mock.assert();
        assert!(err.to_string().contains("400"));
    }
}
