// ABOUTME: Health probe abstraction and the HTTP implementation used against real targets.
// ABOUTME: The HTTP probe speaks plain HTTP/1.1 over a fresh TCP connection per check.

use async_trait::async_trait;
use http_body_util::{BodyExt, Empty};
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;

use super::policy::HealthCheckPolicy;
use crate::types::{ApplicationProtocol, Endpoint};

/// Outcome of a single health probe against one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeResult {
    Healthy,
    Unhealthy(String),
}

impl ProbeResult {
    pub fn is_healthy(&self) -> bool {
        matches!(self, ProbeResult::Healthy)
    }
}

/// Issues one health check against a registered target.
///
/// Implementations must not enforce the policy timeout themselves; the
/// caller wraps every probe in `policy.timeout`.
#[async_trait]
pub trait TargetProbe: Send + Sync {
    async fn probe(&self, target: &Endpoint, policy: &HealthCheckPolicy) -> ProbeResult;
}

/// Probes targets with `GET <policy.path>` and checks the status matcher.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    user_agent: String,
}

impl Default for HttpProbe {
    fn default() -> Self {
        Self {
            user_agent: format!("cutover-health-checker/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl HttpProbe {
    pub fn new() -> Self {
        Self::default()
    }

    async fn status_of(&self, target: &Endpoint, path: &str) -> Result<u16, String> {
        let stream = TcpStream::connect((target.host(), target.port()))
            .await
            .map_err(|e| format!("connect to {} failed: {}", target, e))?;

        let io = TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| format!("HTTP handshake with {} failed: {}", target, e))?;

        tokio::spawn(async move {
            if let Err(e) = conn.await {
                tracing::debug!("health check connection closed with error: {}", e);
            }
        });

        let req = hyper::Request::builder()
            .method("GET")
            .uri(path)
            .header("Host", target.to_string())
            .header("User-Agent", &self.user_agent)
            .body(Empty::<bytes::Bytes>::new())
            .map_err(|e| format!("failed to build request: {}", e))?;

        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| format!("request to {} failed: {}", target, e))?;

        let status = resp.status().as_u16();

        // Drain so the connection shuts down cleanly.
        let _ = resp.into_body().collect().await;

        Ok(status)
    }
}

#[async_trait]
impl TargetProbe for HttpProbe {
    async fn probe(&self, target: &Endpoint, policy: &HealthCheckPolicy) -> ProbeResult {
        if policy.protocol == ApplicationProtocol::Https {
            return ProbeResult::Unhealthy("https health checks are not supported".to_string());
        }

        let target = match policy.port {
            Some(port) => target.with_port(port),
            None => target.clone(),
        };

        match self.status_of(&target, &policy.path).await {
            Ok(status) if policy.matcher.matches(status) => ProbeResult::Healthy,
            Ok(status) => ProbeResult::Unhealthy(format!(
                "{} returned {} (expected {})",
                target, status, policy.matcher
            )),
            Err(reason) => ProbeResult::Unhealthy(reason),
        }
    }
}
