//! Bedrock pass-through calls: foundation-model listing and model
//! invocation, with the request body shaped per model family.

use chrono::Utc;
use serde_json::{json, Value};

use crate::config::AwsSettings;

use super::{host_of, require_credentials, sign, ApiError};

#[derive(Clone)]
pub struct BedrockClient {
    http: reqwest::Client,
    settings: AwsSettings,
}

impl BedrockClient {
    pub fn new(http: reqwest::Client, settings: AwsSettings) -> Self {
        Self { http, settings }
    }

    async fn signed_json(
        &self,
        endpoint_service: &str,
        method: &str,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, ApiError> {
        let creds = require_credentials(&self.settings)?;
        let endpoint = self.settings.endpoint_for(endpoint_service);
        let host = host_of(&endpoint)?;
        let canonical_path = sign::encode_path(path);
        let payload = match &body {
            Some(v) => serde_json::to_vec(v).map_err(ApiError::transport)?,
            None => Vec::new(),
        };

        let mut extra_headers: Vec<(&str, &str)> = vec![("accept", "application/json")];
        if body.is_some() {
            extra_headers.push(("content-type", "application/json"));
        }
        // Both bedrock and bedrock-runtime endpoints sign as "bedrock".
        let sig = sign::sign(
            creds,
            self.settings.signing_region_for(endpoint_service),
            "bedrock",
            method,
            &host,
            &canonical_path,
            &[],
            &extra_headers,
            &payload,
            Utc::now(),
        );

        let url = format!("{endpoint}{canonical_path}");
        let mut req = match method {
            "POST" => self.http.post(&url),
            _ => self.http.get(&url),
        };
        req = req
            .header("accept", "application/json")
            .header("x-amz-date", &sig.amz_date)
            .header("authorization", &sig.authorization);
        if body.is_some() {
            req = req.header("content-type", "application/json");
        }
        if let Some(token) = &sig.security_token {
            req = req.header("x-amz-security-token", token);
        }

        let resp = req.body(payload).send().await.map_err(ApiError::transport)?;
        let status = resp.status();
        let text = resp.text().await.map_err(ApiError::transport)?;
        if status.is_success() {
            return serde_json::from_str(&text).map_err(ApiError::transport);
        }
        // Bedrock errors are JSON with a "message" field.
        let message = serde_json::from_str::<Value>(&text)
            .ok()
            .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
            .unwrap_or_else(|| format!("provider returned HTTP {}", status.as_u16()));
        Err(ApiError { code: None, message })
    }

    /// Foundation-model summaries as the provider reports them.
    pub async fn list_models(&self) -> Result<Vec<Value>, ApiError> {
        let body = self.signed_json("bedrock", "GET", "/foundation-models", None).await?;
        Ok(body
            .get("modelSummaries")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default())
    }

    /// Detail record for one foundation model.
    pub async fn model_detail(&self, model_id: &str) -> Result<Value, ApiError> {
        let body = self
            .signed_json("bedrock", "GET", &format!("/foundation-models/{model_id}"), None)
            .await?;
        Ok(body.get("modelDetails").cloned().unwrap_or(body))
    }

    /// Invoke a model with a plain prompt. The request body shape depends on
    /// the model family named in the model id.
    pub async fn invoke(
        &self,
        model_id: &str,
        prompt: &str,
        temperature: Option<f64>,
        top_p: Option<f64>,
    ) -> Result<Value, ApiError> {
        let body = invoke_body(model_id, prompt, temperature, top_p)?;
        self.signed_json("bedrock-runtime", "POST", &format!("/model/{model_id}/invoke"), Some(body))
            .await
    }
}

/// Per-family request body. Token budget is fixed at 300, matching the
/// dashboard's short-answer use.
fn invoke_body(
    model_id: &str,
    prompt: &str,
    temperature: Option<f64>,
    top_p: Option<f64>,
) -> Result<Value, ApiError> {
    let temperature = temperature.unwrap_or(0.5);
    let top_p = top_p.unwrap_or(0.9);
    if model_id.contains("anthropic") {
        Ok(json!({
            "prompt": format!("\n\nHuman: {prompt}\n\nAssistant:"),
            "max_tokens_to_sample": 300,
            "temperature": temperature,
            "top_p": top_p,
        }))
    } else if model_id.contains("amazon") {
        Ok(json!({
            "inputText": prompt,
            "textGenerationConfig": {
                "temperature": temperature,
                "topP": top_p,
                "maxTokenCount": 300,
            },
        }))
    } else if model_id.contains("mistral") {
        Ok(json!({
            "prompt": prompt,
            "max_tokens": 300,
            "temperature": temperature,
            "top_p": top_p,
        }))
    } else {
        Err(ApiError::transport(format!("Unsupported model type {model_id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anthropic_body_wraps_prompt_in_dialogue_markers() {
        let b = invoke_body("anthropic.claude-v2", "hi", None, None).unwrap();
        assert_eq!(b["prompt"], "\n\nHuman: hi\n\nAssistant:");
        assert_eq!(b["max_tokens_to_sample"], 300);
        assert_eq!(b["temperature"], 0.5);
    }

    #[test]
    fn amazon_body_uses_generation_config() {
        let b = invoke_body("amazon.titan-text-lite-v1", "hi", Some(0.2), Some(0.7)).unwrap();
        assert_eq!(b["inputText"], "hi");
        assert_eq!(b["textGenerationConfig"]["topP"], 0.7);
        assert_eq!(b["textGenerationConfig"]["maxTokenCount"], 300);
    }

    #[test]
    fn mistral_body_is_flat() {
        let b = invoke_body("mistral.mistral-7b-instruct", "hi", None, None).unwrap();
        assert_eq!(b["prompt"], "hi");
        assert_eq!(b["max_tokens"], 300);
    }

    #[test]
    fn unknown_family_is_rejected() {
        let err = invoke_body("cohere.command-text", "hi", None, None).unwrap_err();
        assert!(err.message.contains("Unsupported model type"));
    }
}
