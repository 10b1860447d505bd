use crate::core::stream::StreamDemux;
use crate::domain::model::{CastSequence, InterpretationOutcome, StreamUsage};
use crate::domain::ports::Interpreter;
use crate::utils::error::{DivinationError, Result};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// Header carrying the one-time unlock token minted by the reward flow.
pub const UNLOCK_TOKEN_HEADER: &str = "X-Ad-Session";

#[derive(Debug, Serialize)]
struct AskRequest<'a> {
    question: &'a str,
    throws: [u8; 6],
}

/// Buffered (non-streaming) interpretation response.
#[derive(Debug, Clone, Deserialize)]
pub struct BufferedReading {
    pub reading_id: Option<i64>,
    pub hexagram_code: String,
    pub changing_lines: Vec<u8>,
    pub content: String,
    #[serde(default)]
    pub saved_to_history: bool,
    #[serde(default)]
    pub token_usage: Option<StreamUsage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryItem {
    pub reading_id: i64,
    pub question: String,
    pub created_at: String,
    #[serde(default)]
    pub is_pinned: bool,
    #[serde(default)]
    pub hexagram_code: Option<String>,
    #[serde(default)]
    pub changing_lines: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryPage {
    pub items: Vec<HistoryItem>,
    pub total: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryDetail {
    pub reading_id: i64,
    pub question: String,
    pub content: String,
    pub created_at: String,
    #[serde(default)]
    pub is_pinned: bool,
    #[serde(default)]
    pub hexagram_code: Option<String>,
    #[serde(default)]
    pub changing_lines: Option<Vec<u8>>,
}

#[derive(Debug, Deserialize)]
struct PinResponse {
    #[serde(default)]
    pinned: bool,
}

/// Completing the reward flow grants either spendable silver or a time-boxed
/// unlock token for one retried interpretation.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "reward_type", rename_all = "snake_case")]
pub enum RewardOutcome {
    Silver {
        silver_granted: i64,
        new_silver_balance: i64,
    },
    Unlock {
        ad_session_token: String,
        expires_in: u64,
    },
}

/// HTTP client for the remote interpretation, history and reward services.
///
/// Transport is a single reliable request per call; no retry policy here.
pub struct InterpreterClient {
    base_url: String,
    auth_token: Option<String>,
    http: Client,
}

impl InterpreterClient {
    pub fn new(base_url: &str, auth_token: Option<String>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_token,
            http: Client::new(),
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self.http.request(method, format!("{}{path}", self.base_url));
        if let Some(token) = &self.auth_token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        builder
    }

    /// 402 means the account cannot pay for the interpretation; everything
    /// else non-2xx is opaque and surfaced with the response body.
    async fn ensure_ask_ok(response: Response) -> Result<Response> {
        match response.status() {
            status if status.is_success() => Ok(response),
            StatusCode::PAYMENT_REQUIRED => Err(DivinationError::InsufficientFunds),
            _ => Err(DivinationError::InterpretationFailed {
                message: response.text().await.unwrap_or_default(),
            }),
        }
    }

    async fn ensure_ok(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            Err(DivinationError::RemoteError {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            })
        }
    }

    /// Buffered variant of the interpretation request: the server resolves
    /// and saves the whole reading, then returns it as one JSON object.
    pub async fn interpret_buffered(
        &self,
        question: &str,
        throws: &CastSequence,
        unlock_token: Option<&str>,
    ) -> Result<BufferedReading> {
        let mut builder = self
            .request(reqwest::Method::POST, "/ask")
            .header(ACCEPT, "application/json")
            .json(&AskRequest {
                question,
                throws: throws.values(),
            });
        if let Some(token) = unlock_token {
            builder = builder.header(UNLOCK_TOKEN_HEADER, token);
        }

        let response = Self::ensure_ask_ok(builder.send().await?).await?;
        Ok(response.json().await?)
    }

    pub async fn history_list(&self, limit: u32, offset: u32) -> Result<HistoryPage> {
        let response = self
            .request(reqwest::Method::GET, "/history/list")
            .query(&[("limit", limit), ("offset", offset)])
            .send()
            .await?;
        Ok(Self::ensure_ok(response).await?.json().await?)
    }

    pub async fn history_detail(&self, reading_id: i64) -> Result<HistoryDetail> {
        let response = self
            .request(reqwest::Method::GET, &format!("/history/detail/{reading_id}"))
            .send()
            .await?;
        Ok(Self::ensure_ok(response).await?.json().await?)
    }

    /// Returns the pin state acknowledged by the server.
    pub async fn set_pinned(&self, reading_id: i64, pin: bool) -> Result<bool> {
        let response = self
            .request(reqwest::Method::POST, "/history/pin")
            .json(&serde_json::json!({ "reading_id": reading_id, "pin": pin }))
            .send()
            .await?;
        let ack: PinResponse = Self::ensure_ok(response).await?.json().await?;
        Ok(ack.pinned)
    }

    pub async fn delete_reading(&self, reading_id: i64) -> Result<()> {
        let response = self
            .request(reqwest::Method::POST, "/history/delete")
            .json(&serde_json::json!({ "reading_id": reading_id }))
            .send()
            .await?;
        Self::ensure_ok(response).await?;
        Ok(())
    }

    /// Submits proof of a completed ad view to the reward service.
    pub async fn complete_ad(&self, provider: &str, ad_proof: &str) -> Result<RewardOutcome> {
        let response = self
            .request(reqwest::Method::POST, "/ads/complete")
            .json(&serde_json::json!({ "provider": provider, "ad_proof": ad_proof }))
            .send()
            .await?;
        Ok(Self::ensure_ok(response).await?.json().await?)
    }
}

#[async_trait]
impl Interpreter for InterpreterClient {
    async fn interpret_stream(
        &self,
        question: &str,
        throws: &CastSequence,
        unlock_token: Option<&str>,
        cancel: &CancellationToken,
        on_fragment: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> Result<InterpretationOutcome> {
        let mut builder = self
            .request(reqwest::Method::POST, "/ask")
            .header(ACCEPT, "text/plain")
            .json(&AskRequest {
                question,
                throws: throws.values(),
            });
        if let Some(token) = unlock_token {
            builder = builder.header(UNLOCK_TOKEN_HEADER, token);
        }

        let mut response = Self::ensure_ask_ok(builder.send().await?).await?;

        let mut content = String::new();
        let mut demux = StreamDemux::new();
        // The consuming view may go away mid-stream; fragments then stop
        // flowing outward, but the full text is still assembled.
        let mut emit = |fragment: &str| {
            content.push_str(fragment);
            if !cancel.is_cancelled() {
                on_fragment(fragment);
            }
        };

        while let Some(chunk) = response.chunk().await? {
            demux.push_bytes(&chunk, &mut emit);
        }

        let usage = demux.finish(&mut emit);
        drop(emit);
        tracing::debug!(
            "interpretation stream complete: {} chars, usage {:?}",
            content.chars().count(),
            usage
        );
        Ok(InterpretationOutcome { content, usage })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::stream::USAGE_SENTINEL;
    use httpmock::prelude::*;

    fn throws() -> CastSequence {
        CastSequence::from_values(&[7, 9, 8, 6, 7, 7]).unwrap()
    }

    #[tokio::test]
    async fn streamed_ask_demuxes_narrative_and_usage() {
        let server = MockServer::start();
        let body = format!(
            "卦象顯示，宜守不宜進。\n{USAGE_SENTINEL}{{\"input_tokens\":12,\"output_tokens\":34,\"total_tokens\":46}}"
        );
        let ask_mock = server.mock(|when, then| {
            when.method(POST)
                .path("/ask")
                .header("Accept", "text/plain")
                .header("Authorization", "Bearer session-token")
                .json_body(serde_json::json!({
                    "question": "該不該換工作",
                    "throws": [7, 9, 8, 6, 7, 7]
                }));
            then.status(200)
                .header("Content-Type", "text/plain")
                .body(&body);
        });

        let client = InterpreterClient::new(&server.base_url(), Some("session-token".into()));
        let cancel = CancellationToken::new();
        let mut streamed = String::new();
        let outcome = client
            .interpret_stream(
                "該不該換工作",
                &throws(),
                None,
                &cancel,
                &mut |s| streamed.push_str(s),
            )
            .await
            .unwrap();

        ask_mock.assert();
        assert_eq!(streamed, "卦象顯示，宜守不宜進。");
        assert_eq!(outcome.content, streamed);
        let usage = outcome.usage.unwrap();
        assert_eq!(usage.input_tokens, 12);
        assert_eq!(usage.output_tokens, 34);
        assert_eq!(usage.total_tokens, 46);
    }

    #[tokio::test]
    async fn streamed_ask_without_sentinel_has_no_usage() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/ask");
            then.status(200).body("純敘述內容");
        });

        let client = InterpreterClient::new(&server.base_url(), None);
        let cancel = CancellationToken::new();
        let mut streamed = String::new();
        let outcome = client
            .interpret_stream("q", &throws(), None, &cancel, &mut |s| {
                streamed.push_str(s)
            })
            .await
            .unwrap();

        assert_eq!(streamed, "純敘述內容");
        assert!(outcome.usage.is_none());
    }

    #[tokio::test]
    async fn payment_required_maps_to_insufficient_funds() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/ask");
            then.status(402).body("{\"error\":\"no_balance\"}");
        });

        let client = InterpreterClient::new(&server.base_url(), None);
        let cancel = CancellationToken::new();
        let err = client
            .interpret_stream("q", &throws(), None, &cancel, &mut |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, DivinationError::InsufficientFunds));
    }

    #[tokio::test]
    async fn unlock_token_is_sent_in_the_ad_session_header() {
        let server = MockServer::start();
        let unlocked = server.mock(|when, then| {
            when.method(POST)
                .path("/ask")
                .header(UNLOCK_TOKEN_HEADER, "one-time-unlock");
            then.status(200).body("有備無患。");
        });

        let client = InterpreterClient::new(&server.base_url(), None);
        let cancel = CancellationToken::new();
        let outcome = client
            .interpret_stream("q", &throws(), Some("one-time-unlock"), &cancel, &mut |_| {})
            .await
            .unwrap();

        unlocked.assert();
        assert_eq!(outcome.content, "有備無患。");
    }

    #[tokio::test]
    async fn other_failures_carry_the_response_body() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/ask");
            then.status(503).body("llm_unavailable");
        });

        let client = InterpreterClient::new(&server.base_url(), None);
        let cancel = CancellationToken::new();
        let err = client
            .interpret_stream("q", &throws(), None, &cancel, &mut |_| {})
            .await
            .unwrap_err();
        match err {
            DivinationError::InterpretationFailed { message } => {
                assert_eq!(message, "llm_unavailable")
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn cancelled_consumer_stops_receiving_fragments() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/ask");
            then.status(200).body("narrative that nobody is watching");
        });

        let client = InterpreterClient::new(&server.base_url(), None);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut streamed = String::new();
        let outcome = client
            .interpret_stream("q", &throws(), None, &cancel, &mut |s| {
                streamed.push_str(s)
            })
            .await
            .unwrap();

        assert!(streamed.is_empty());
        assert_eq!(outcome.content, "narrative that nobody is watching");
    }

    #[tokio::test]
    async fn buffered_ask_parses_the_saved_reading() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/ask").header("Accept", "application/json");
            then.status(200).json_body(serde_json::json!({
                "reading_id": 42,
                "hexagram_code": "110011",
                "changing_lines": [2, 4],
                "content": "中孚，豚魚吉。",
                "saved_to_history": true,
                "token_usage": {"input_tokens": 1, "output_tokens": 2, "total_tokens": 3}
            }));
        });

        let client = InterpreterClient::new(&server.base_url(), None);
        let reading = client.interpret_buffered("q", &throws(), None).await.unwrap();
        assert_eq!(reading.reading_id, Some(42));
        assert_eq!(reading.hexagram_code, "110011");
        assert_eq!(reading.changing_lines, vec![2, 4]);
        assert!(reading.saved_to_history);
        assert_eq!(reading.token_usage.unwrap().total_tokens, 3);
    }

    #[tokio::test]
    async fn history_list_is_paged() {
        let server = MockServer::start();
        let list_mock = server.mock(|when, then| {
            when.method(GET)
                .path("/history/list")
                .query_param("limit", "20")
                .query_param("offset", "40");
            then.status(200).json_body(serde_json::json!({
                "items": [{
                    "reading_id": 7,
                    "question": "問姻緣",
                    "created_at": "2026-08-01T09:30:00Z",
                    "is_pinned": true,
                    "hexagram_code": "010001",
                    "changing_lines": [5]
                }],
                "total": 41
            }));
        });

        let client = InterpreterClient::new(&server.base_url(), None);
        let page = client.history_list(20, 40).await.unwrap();
        list_mock.assert();
        assert_eq!(page.total, 41);
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].reading_id, 7);
        assert_eq!(page.items[0].hexagram_code.as_deref(), Some("010001"));
    }

    #[tokio::test]
    async fn history_detail_pin_and_delete() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/history/detail/7");
            then.status(200).json_body(serde_json::json!({
                "reading_id": 7,
                "question": "問姻緣",
                "content": "全文內容",
                "created_at": "2026-08-01T09:30:00Z",
                "is_pinned": false
            }));
        });
        let pin_mock = server.mock(|when, then| {
            when.method(POST)
                .path("/history/pin")
                .json_body(serde_json::json!({"reading_id": 7, "pin": true}));
            then.status(200)
                .json_body(serde_json::json!({"ok": true, "pinned": true}));
        });
        let delete_mock = server.mock(|when, then| {
            when.method(POST)
                .path("/history/delete")
                .json_body(serde_json::json!({"reading_id": 7}));
            then.status(200).json_body(serde_json::json!({"ok": true}));
        });

        let client = InterpreterClient::new(&server.base_url(), None);

        let detail = client.history_detail(7).await.unwrap();
        assert_eq!(detail.content, "全文內容");

        assert!(client.set_pinned(7, true).await.unwrap());
        pin_mock.assert();

        client.delete_reading(7).await.unwrap();
        delete_mock.assert();
    }

    #[tokio::test]
    async fn history_failures_surface_status_and_body() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path_contains("/history/detail");
            then.status(404).body("not_found");
        });

        let client = InterpreterClient::new(&server.base_url(), None);
        let err = client.history_detail(999).await.unwrap_err();
        assert!(matches!(
            err,
            DivinationError::RemoteError { status: 404, .. }
        ));
    }

    #[tokio::test]
    async fn reward_flow_parses_both_outcomes() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST)
                .path("/ads/complete")
                .json_body(serde_json::json!({"provider": "admob", "ad_proof": "proof-a"}));
            then.status(200).json_body(serde_json::json!({
                "reward_type": "silver",
                "silver_granted": 2,
                "new_silver_balance": 5
            }));
        });
        server.mock(|when, then| {
            when.method(POST)
                .path("/ads/complete")
                .json_body(serde_json::json!({"provider": "unknown", "ad_proof": "proof-b"}));
            then.status(200).json_body(serde_json::json!({
                "reward_type": "unlock",
                "ad_session_token": "unlock-abc",
                "expires_in": 300
            }));
        });

        let client = InterpreterClient::new(&server.base_url(), None);

        match client.complete_ad("admob", "proof-a").await.unwrap() {
            RewardOutcome::Silver {
                silver_granted,
                new_silver_balance,
            } => {
                assert_eq!(silver_granted, 2);
                assert_eq!(new_silver_balance, 5);
            }
            other => panic!("unexpected reward: {other:?}"),
        }

        match client.complete_ad("unknown", "proof-b").await.unwrap() {
            RewardOutcome::Unlock {
                ad_session_token,
                expires_in,
            } => {
                assert_eq!(ad_session_token, "unlock-abc");
                assert_eq!(expires_in, 300);
            }
            other => panic!("unexpected reward: {other:?}"),
        }
    }
}
