use anyhow::Context;
use axum::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

/// One item the classifier recognized on a meal photo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedFood {
    pub name: String,
    pub confidence: f64,
}

#[async_trait]
pub trait FoodClassifier: Send + Sync {
    async fn classify(
        &self,
        image_id: Uuid,
        storage_path: &str,
    ) -> anyhow::Result<Vec<DetectedFood>>;
}

/// Classifier reached over HTTP (edge function or internal service).
pub struct HttpClassifier {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpClassifier {
    pub fn new(endpoint: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
        }
    }
}

#[derive(Serialize)]
struct ClassifyRequest<'a> {
    image_id: Uuid,
    storage_path: &'a str,
}

#[derive(Deserialize)]
struct ClassifyResponse {
    detected_foods: Vec<DetectedFood>,
}

#[async_trait]
impl FoodClassifier for HttpClassifier {
    async fn classify(
        &self,
        image_id: Uuid,
        storage_path: &str,
    ) -> anyhow::Result<Vec<DetectedFood>> {
        let url = format!("{}/classify-image", self.endpoint.trim_end_matches('/'));
        let resp = self
            .client
            .post(&url)
            .json(&ClassifyRequest {
                image_id,
                storage_path,
            })
            .send()
            .await
            .context("classifier request")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("classifier returned {}: {}", status, body);
        }

        let parsed: ClassifyResponse = resp.json().await.context("classifier response body")?;
        debug!(%image_id, foods = parsed.detected_foods.len(), "classification ok");
        Ok(parsed.detected_foods)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detected_food_deserializes_classifier_payload() {
        let json = r#"{"detected_foods":[{"name":"Arroz","confidence":0.85}]}"#;
        let parsed: ClassifyResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.detected_foods.len(), 1);
        assert_eq!(parsed.detected_foods[0].name, "Arroz");
        assert!((parsed.detected_foods[0].confidence - 0.85).abs() < f64::EPSILON);
    }
}
