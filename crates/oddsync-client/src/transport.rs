// Push transport: one server-sent-events subscription per `open` call.
//
// The transport only opens and reads. Reconnecting is the connection
// manager's job, so reqwest-eventsource's own retry is switched off.

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use reqwest::header::ACCEPT;
use reqwest_eventsource::{Event, EventSource};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("push endpoint returned status {0}")]
    Status(u16),

    #[error("push stream network error: {0}")]
    Network(String),

    #[error("push stream closed by server")]
    Closed,

    #[error("push stream protocol error: {0}")]
    Protocol(String),
}

impl From<reqwest_eventsource::Error> for TransportError {
    fn from(err: reqwest_eventsource::Error) -> Self {
        match err {
            reqwest_eventsource::Error::InvalidStatusCode(status, _response) => {
                TransportError::Status(status.as_u16())
            }
            reqwest_eventsource::Error::Transport(e) => TransportError::Network(e.to_string()),
            reqwest_eventsource::Error::StreamEnded => TransportError::Closed,
            other => TransportError::Protocol(other.to_string()),
        }
    }
}

/// Raw message payloads from one live subscription. Yields `Err` once when
/// the subscription dies; callers drop the stream after that.
pub type PushStream = BoxStream<'static, Result<String, TransportError>>;

/// Something that can open a push subscription.
#[async_trait]
pub trait PushTransport: Send + Sync {
    /// Open a new subscription. Resolves once the stream is established, so
    /// `Ok` means the server accepted it.
    async fn open(&self, credential: Option<&str>) -> Result<PushStream, TransportError>;
}

// ---------------------------------------------------------------------------
// SseTransport
// ---------------------------------------------------------------------------

pub struct SseTransport {
    http: reqwest::Client,
    url: String,
}

impl SseTransport {
    pub fn new(http: reqwest::Client, url: String) -> Self {
        Self { http, url }
    }
}

#[async_trait]
impl PushTransport for SseTransport {
    async fn open(&self, credential: Option<&str>) -> Result<PushStream, TransportError> {
        // Browser EventSource clients cannot set headers, so the backend reads
        // the session token from the query string on this endpoint.
        let mut request = self.http.get(&self.url).header(ACCEPT, "text/event-stream");
        if let Some(token) = credential {
            request = request.query(&[("token", token)]);
        }

        let mut es =
            EventSource::new(request).map_err(|e| TransportError::Protocol(e.to_string()))?;
        es.set_retry_policy(Box::new(reqwest_eventsource::retry::Never));

        match es.next().await {
            Some(Ok(Event::Open)) => {
                debug!(url = %self.url, "SSE connection opened");
            }
            Some(Ok(Event::Message(msg))) => {
                es.close();
                return Err(TransportError::Protocol(format!(
                    "received `{}` event before the stream opened",
                    msg.event
                )));
            }
            Some(Err(err)) => {
                es.close();
                return Err(err.into());
            }
            None => return Err(TransportError::Closed),
        }

        let messages = es.filter_map(|event| async move {
            match event {
                Ok(Event::Open) => None,
                Ok(Event::Message(msg)) => Some(Ok(msg.data)),
                Err(err) => Some(Err(TransportError::from(err))),
            }
        });

        Ok(messages.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Accept one connection, send `response`, keep the socket open for
    /// `linger_ms`, and return the raw request line block.
    async fn serve_sse(
        response: &'static str,
        linger_ms: u64,
    ) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let n = socket.read(&mut buf).await.unwrap();
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.flush().await.unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(linger_ms)).await;
            String::from_utf8_lossy(&buf[..n]).to_string()
        });

        (format!("http://{addr}/api/events"), handle)
    }

    #[tokio::test]
    async fn forwards_message_payloads_in_order() {
        let (url, server) = serve_sse(
            concat!(
                "HTTP/1.1 200 OK\r\n",
                "Content-Type: text/event-stream\r\n",
                "Cache-Control: no-cache\r\n",
                "\r\n",
                "data: {\"type\":\"predictions\"}\n\n",
                "data: {\"type\":\"bets\",\"user_id\":\"u1\"}\n\n",
            ),
            100,
        )
        .await;

        let transport = SseTransport::new(reqwest::Client::new(), url);
        let mut stream = transport.open(Some("tok 1")).await.unwrap();

        assert_eq!(
            stream.next().await,
            Some(Ok(r#"{"type":"predictions"}"#.to_string()))
        );
        assert_eq!(
            stream.next().await,
            Some(Ok(r#"{"type":"bets","user_id":"u1"}"#.to_string()))
        );

        let request = server.await.unwrap();
        assert!(
            request.starts_with("GET /api/events?token=tok+1 ")
                || request.starts_with("GET /api/events?token=tok%201 "),
            "token should be sent as a query parameter: {request}"
        );
    }

    #[tokio::test]
    async fn server_close_surfaces_as_error() {
        let (url, _server) = serve_sse(
            concat!(
                "HTTP/1.1 200 OK\r\n",
                "Content-Type: text/event-stream\r\n",
                "\r\n",
                "data: {\"type\":\"leaderboard\"}\n\n",
            ),
            0,
        )
        .await;

        let transport = SseTransport::new(reqwest::Client::new(), url);
        let mut stream = transport.open(None).await.unwrap();

        assert!(matches!(stream.next().await, Some(Ok(_))));
        assert!(matches!(stream.next().await, Some(Err(_))));
    }

    #[tokio::test]
    async fn rejected_subscription_fails_to_open() {
        let (url, _server) = serve_sse(
            concat!(
                "HTTP/1.1 401 Unauthorized\r\n",
                "Content-Type: application/json\r\n",
                "Content-Length: 2\r\n",
                "\r\n",
                "{}",
            ),
            100,
        )
        .await;

        let transport = SseTransport::new(reqwest::Client::new(), url);
        let err = transport.open(None).await.err().unwrap();
        assert_eq!(err, TransportError::Status(401));
    }

    #[tokio::test]
    async fn unreachable_endpoint_fails_to_open() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let transport =
            SseTransport::new(reqwest::Client::new(), format!("http://{addr}/api/events"));
        let err = transport.open(None).await.err().unwrap();
        assert!(matches!(err, TransportError::Network(_)));
    }
}
