//! A [`LogSink`] speaking the PutLogEvents JSON protocol over HTTP.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{Connector, Credentials, Error, LogEvent, LogSink, PutError};

const TARGET: &str = "Logs_20140328.PutLogEvents";
const CONTENT_TYPE: &str = "application/x-amz-json-1.1";

#[derive(Debug, Clone)]
pub struct HttpConnector {
    endpoint: String,
}

impl HttpConnector {
    pub fn new(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
        }
    }
}

impl Connector for HttpConnector {
    type Sink = HttpSink;

    fn connect(&self, credentials: &Credentials) -> Result<HttpSink, Error> {
        log::debug!("building log client for key {}", credentials.access_key);
        Ok(HttpSink {
            client: reqwest::Client::builder().build().map_err(Error::Client)?,
            endpoint: self.endpoint.clone(),
            credentials: credentials.clone(),
        })
    }
}

#[derive(Debug)]
pub struct HttpSink {
    client: reqwest::Client,
    endpoint: String,
    credentials: Credentials,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PutRequest<'a> {
    log_group_name: &'a str,
    log_stream_name: &'a str,
    log_events: &'a [LogEvent],
    #[serde(skip_serializing_if = "Option::is_none")]
    sequence_token: Option<&'a str>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PutResponse {
    next_sequence_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorResponse {
    #[serde(rename = "__type", default)]
    kind: String,
    #[serde(alias = "Message", default)]
    message: String,
    expected_sequence_token: Option<String>,
}

impl ErrorResponse {
    fn into_error(self, status: u16) -> PutError {
        // The type may come qualified, as in `com.amazonaws.logs#Name`.
        let kind = self.kind.rsplit('#').next().unwrap_or("").to_string();
        match kind.as_str() {
            "DataAlreadyAcceptedException" => PutError::DataAlreadyAccepted {
                expected_sequence_token: self.expected_sequence_token,
                message: self.message,
            },
            "InvalidSequenceTokenException" => PutError::InvalidSequenceToken {
                expected_sequence_token: self.expected_sequence_token,
                message: self.message,
            },
            _ => PutError::Rejected {
                status,
                message: if self.message.is_empty() {
                    self.kind
                } else {
                    self.message
                },
            },
        }
    }
}

#[async_trait]
impl LogSink for HttpSink {
    async fn put_log_events(
        &self,
        group: &str,
        stream: &str,
        events: &[LogEvent],
        sequence_token: Option<&str>,
    ) -> Result<Option<String>, PutError> {
        // The explicit content type survives `json()`, which only fills it in
        // when missing.
        let resp = self
            .client
            .post(&self.endpoint)
            .header("x-amz-target", TARGET)
            .header("content-type", CONTENT_TYPE)
            .basic_auth(&self.credentials.access_key, Some(&self.credentials.secret_key))
            .json(&PutRequest {
                log_group_name: group,
                log_stream_name: stream,
                log_events: events,
                sequence_token,
            })
            .send()
            .await?;

        let status = resp.status();
        let raw = resp.bytes().await?;
        if status.is_success() {
            return Ok(serde_json::from_slice::<PutResponse>(&raw)
                .ok()
                .and_then(|parsed| parsed.next_sequence_token));
        }

        let parsed: ErrorResponse = serde_json::from_slice(&raw).unwrap_or_else(|_| ErrorResponse {
            message: String::from_utf8_lossy(&raw).into_owned(),
            ..ErrorResponse::default()
        });
        Err(parsed.into_error(status.as_u16()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(body: &str) -> PutError {
        serde_json::from_str::<ErrorResponse>(body)
            .unwrap()
            .into_error(400)
    }

    #[test]
    fn test_error_classification() {
        match classify(
            r#"{"__type":"com.amazonaws.logs#InvalidSequenceTokenException","message":"The given sequenceToken is invalid. The next expected sequenceToken is: 123","expectedSequenceToken":"123"}"#,
        ) {
            PutError::InvalidSequenceToken {
                expected_sequence_token,
                ..
            } => assert_eq!(expected_sequence_token.as_deref(), Some("123")),
            other => panic!("unexpected error: {:?}", other),
        }

        let err = classify(
            r#"{"__type":"DataAlreadyAcceptedException","Message":"already accepted, next token 987"}"#,
        );
        assert!(matches!(err, PutError::DataAlreadyAccepted { .. }));
        assert_eq!(err.expected_sequence_token().as_deref(), Some("987"));

        assert!(matches!(
            classify(r#"{"__type":"ResourceNotFoundException"}"#),
            PutError::Rejected { status: 400, ref message } if message == "ResourceNotFoundException"
        ));
    }

    #[test]
    fn test_request_encoding() -> anyhow::Result<()> {
        let events = [LogEvent {
            timestamp: 1,
            message: "hi".into(),
        }];
        let encoded = serde_json::to_value(&PutRequest {
            log_group_name: "client",
            log_stream_name: "me@example.com",
            log_events: &events,
            sequence_token: None,
        })?;

        assert_eq!(
            encoded,
            serde_json::json!({
                "logGroupName": "client",
                "logStreamName": "me@example.com",
                "logEvents": [{"timestamp": 1, "message": "hi"}],
            })
        );

        Ok(())
    }
}
