//! HTTP translator speaking the LibreTranslate API

use crate::error::TranslateError;
use crate::localizer::Translator;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
struct TranslateRequest<'a> {
    q: &'a str,
    source: &'a str,
    target: &'a str,
    format: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    api_key: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct TranslateResponse {
    #[serde(rename = "translatedText")]
    translated_text: String,
}

/// `POST {endpoint}/translate` client
#[derive(Debug, Clone)]
pub struct LibreTranslate {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl LibreTranslate {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_key: None,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }
}

#[async_trait]
impl Translator for LibreTranslate {
    async fn translate(
        &self,
        text: &str,
        source_locale: &str,
        target_locale: &str,
    ) -> Result<String, TranslateError> {
        let request = TranslateRequest {
            q: text,
            source: source_locale,
            target: target_locale,
            format: "text",
            api_key: self.api_key.as_deref(),
        };

        let response = self
            .client
            .post(format!("{}/translate", self.endpoint))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TranslateError::Rejected(format!("{status}: {body}")));
        }

        let parsed: TranslateResponse = response.json().await?;
        if parsed.translated_text.trim().is_empty() {
            return Err(TranslateError::Rejected("empty translation".to_string()));
        }
        Ok(parsed.translated_text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_translate_posts_libretranslate_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/translate"))
            .and(body_json(json!({
                "q": "phone",
                "source": "en",
                "target": "fr",
                "format": "text"
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "translatedText": "téléphone" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let translator = LibreTranslate::new(format!("{}/", server.uri()));
        let translated = translator.translate("phone", "en", "fr").await.unwrap();
        assert_eq!(translated, "téléphone");
    }

    #[tokio::test]
    async fn test_translate_sends_api_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/translate"))
            .and(body_json(json!({
                "q": "name",
                "source": "en",
                "target": "de",
                "format": "text",
                "api_key": "secret"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "translatedText": "Name" })))
            .mount(&server)
            .await;

        let translator = LibreTranslate::new(server.uri()).with_api_key("secret");
        assert_eq!(translator.translate("name", "en", "de").await.unwrap(), "Name");
    }

    #[tokio::test]
    async fn test_error_status_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/translate"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({ "error": "bad target" })))
            .mount(&server)
            .await;

        let translator = LibreTranslate::new(server.uri());
        let err = translator.translate("email", "en", "zz").await.unwrap_err();
        assert!(matches!(err, TranslateError::Rejected(msg) if msg.contains("bad target")));
    }

    #[tokio::test]
    async fn test_empty_translation_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "translatedText": " " })))
            .mount(&server)
            .await;

        let translator = LibreTranslate::new(server.uri());
        assert!(translator.translate("email", "en", "fr").await.is_err());
    }
}
