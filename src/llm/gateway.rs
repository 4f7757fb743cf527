// AI gateway client
//
// Posts assembled histories to the hosted coaching endpoint. Callers never
// see an error from this client: transport failures, non-2xx statuses and
// malformed bodies all collapse into literal fallback strings that get
// persisted like any other reply.

use reqwest::Client;
use serde::Deserialize;

use super::history::{CoachingRole, CoachingTurn, ConverseRequest};

/// Returned when the endpoint answers but its `response` field is missing
/// or empty.
pub const EMPTY_RESPONSE_FALLBACK: &str = "I'm sorry, I couldn't generate a response.";

/// Returned on any transport or non-2xx failure.
pub const GATEWAY_FAILURE_FALLBACK: &str =
    "I'm sorry, I couldn't process your request at this time. Please try again later.";

#[derive(Debug, Clone, Deserialize)]
struct CoachResponse {
    #[serde(default)]
    response: Option<String>,
}

/// Client for the external coaching endpoint.
///
/// No timeout is applied to the call; a hang at the endpoint hangs the
/// requesting action (known gap).
pub struct AiGateway {
    client: Client,
    endpoint: String,
}

impl AiGateway {
    pub fn new(endpoint: String) -> Self {
        Self {
            client: Client::new(),
            endpoint,
        }
    }

    /// Send the assembled histories and return the reply text. Infallible
    /// by contract.
    pub async fn coach(&self, request: &ConverseRequest) -> String {
        match self.try_coach(request).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!("AI gateway call failed: {}", e);
                GATEWAY_FAILURE_FALLBACK.to_string()
            }
        }
    }

    /// Single-turn invocation: wraps one message as a one-entry coaching
    /// history through the same endpoint.
    pub async fn complete(&self, content: &str) -> String {
        let request = ConverseRequest {
            user_input: content.to_string(),
            dialogue_history: vec![],
            coaching_history: vec![CoachingTurn {
                role: CoachingRole::User,
                content: content.to_string(),
            }],
        };
        self.coach(&request).await
    }

    async fn try_coach(
        &self,
        request: &ConverseRequest,
    ) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(format!("gateway returned {}: {}", status, body).into());
        }

        let body: CoachResponse = response.json().await?;
        Ok(reply_from_body(body))
    }
}

/// Extract the reply text, substituting the empty-field fallback.
fn reply_from_body(body: CoachResponse) -> String {
    match body.response {
        Some(text) if !text.is_empty() => text,
        _ => EMPTY_RESPONSE_FALLBACK.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_from_body_with_text() {
        let body: CoachResponse = serde_json::from_str(r#"{"response":"try this"}"#).unwrap();
        assert_eq!(reply_from_body(body), "try this");
    }

    #[test]
    fn test_reply_from_body_empty_field() {
        let body: CoachResponse = serde_json::from_str(r#"{"response":""}"#).unwrap();
        assert_eq!(reply_from_body(body), EMPTY_RESPONSE_FALLBACK);
    }

    #[test]
    fn test_reply_from_body_missing_field() {
        let body: CoachResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(reply_from_body(body), EMPTY_RESPONSE_FALLBACK);
    }

    #[tokio::test]
    async fn test_coach_returns_apology_on_transport_failure() {
        // Nothing listens on this port.
        let gateway = AiGateway::new("http://127.0.0.1:1/coach".to_string());
        let request = ConverseRequest {
            user_input: "hello".to_string(),
            dialogue_history: vec![],
            coaching_history: vec![],
        };
        assert_eq!(gateway.coach(&request).await, GATEWAY_FAILURE_FALLBACK);
    }

    #[tokio::test]
    async fn test_complete_returns_apology_on_transport_failure() {
        let gateway = AiGateway::new("http://127.0.0.1:1/coach".to_string());
        assert_eq!(gateway.complete("hello").await, GATEWAY_FAILURE_FALLBACK);
    }
}
