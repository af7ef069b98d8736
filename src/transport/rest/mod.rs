//! Eureka REST transport.
//!
//! Speaks the Eureka v2 REST API over HTTP with JSON bodies. Multiple
//! registry nodes may be configured; each call starts at the node that last
//! answered and fails over to the others on transient errors.

mod wire;

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use reqwest::{header, Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::{RegistryTransport, Result, TransportError};
use crate::config::{ConfigError, ServiceUrlConfig};
use crate::model::{Application, Instance, InstanceStatus};

use wire::{ApplicationEnvelope, ApplicationsEnvelope, InstanceEnvelope, WireInstance};

/// Registry transport over the Eureka REST API.
pub struct RestTransport {
    client: Client,
    urls: Vec<String>,
    /// Index of the node that answered most recently.
    preferred: AtomicUsize,
}

impl RestTransport {
    /// Create a transport for the configured registry nodes.
    pub fn new(config: &ServiceUrlConfig) -> std::result::Result<Self, ConfigError> {
        let urls = config.urls();
        if urls.is_empty() {
            return Err(ConfigError::NoServiceUrl);
        }
        for url in &urls {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::InvalidServiceUrl {
                    url: url.clone(),
                    message: "expected an http:// or https:// URL".to_string(),
                });
            }
        }

        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ConfigError::InvalidServiceUrl {
                url: urls.join(","),
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            urls,
            preferred: AtomicUsize::new(0),
        })
    }

    /// Configured registry base URLs.
    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    /// Backoff for idempotent reads.
    fn backoff() -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_secs(2))
            .with_max_times(3)
            .with_jitter()
    }

    /// Run `call` against each registry node in turn, starting with the
    /// preferred one, until one succeeds or returns a non-transient error.
    async fn with_failover<T, F, Fut>(&self, call: F) -> Result<T>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let start = self.preferred.load(Ordering::Relaxed) % self.urls.len();
        let mut last_error = None;

        for offset in 0..self.urls.len() {
            let index = (start + offset) % self.urls.len();
            let base = &self.urls[index];
            match call(base.clone()).await {
                Ok(value) => {
                    self.preferred.store(index, Ordering::Relaxed);
                    return Ok(value);
                }
                Err(e) if e.is_transient() => {
                    warn!(url = %base, error = %e, "Registry node failed, trying next");
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error
            .unwrap_or_else(|| TransportError::Unavailable("no registry nodes".to_string())))
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.client
            .request(method, url)
            .header(header::ACCEPT, "application/json")
    }

    /// Send a request whose response body is ignored.
    async fn send(&self, method: Method, url: String, request: RequestBuilder) -> Result<StatusCode> {
        let response = request.send().await.map_err(|source| TransportError::Http {
            url: url.clone(),
            source,
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                method: method_name(&method),
                url,
                status: status.as_u16(),
            });
        }
        Ok(status)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: String) -> Result<T> {
        let response = self
            .request(Method::GET, &url)
            .send()
            .await
            .map_err(|source| TransportError::Http {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                method: "GET",
                url,
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|source| TransportError::Http {
                url: url.clone(),
                source,
            })?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn fetch_application(&self, app_id: &str) -> Result<Application> {
        let app = app_id.to_uppercase();
        let result = self
            .with_failover(|base| {
                let url = format!("{}/apps/{}", base, app);
                async move { self.get_json::<ApplicationEnvelope>(url).await }
            })
            .await;

        match result {
            Ok(envelope) => Ok(envelope.application.into()),
            Err(TransportError::Status { status: 404, .. }) => Err(TransportError::NotFound(app)),
            Err(e) => Err(e),
        }
    }

    async fn fetch_all(&self) -> Result<Vec<Application>> {
        let envelope = self
            .with_failover(|base| {
                let url = format!("{}/apps", base);
                async move { self.get_json::<ApplicationsEnvelope>(url).await }
            })
            .await?;

        Ok(envelope
            .applications
            .application
            .into_vec()
            .into_iter()
            .map(Application::from)
            .collect())
    }
}

fn method_name(method: &Method) -> &'static str {
    match *method {
        Method::POST => "POST",
        Method::PUT => "PUT",
        Method::DELETE => "DELETE",
        _ => "GET",
    }
}

#[async_trait]
impl RegistryTransport for RestTransport {
    async fn register(&self, app: &str, instance: &Instance) -> Result<()> {
        let body = serde_json::to_vec(&InstanceEnvelope {
            instance: WireInstance::from(instance),
        })?;

        self.with_failover(|base| {
            let url = format!("{}/apps/{}", base, app);
            let request = self
                .request(Method::POST, &url)
                .header(header::CONTENT_TYPE, "application/json")
                .body(body.clone());
            async move { self.send(Method::POST, url, request).await }
        })
        .await?;

        debug!(app = %app, instance_id = %instance.instance_id, "Registered with registry");
        Ok(())
    }

    async fn deregister(&self, app: &str, instance_id: &str) -> Result<()> {
        self.with_failover(|base| {
            let url = format!("{}/apps/{}/{}", base, app, instance_id);
            let request = self.request(Method::DELETE, &url);
            async move { self.send(Method::DELETE, url, request).await }
        })
        .await?;
        Ok(())
    }

    async fn heartbeat(&self, app: &str, instance_id: &str) -> Result<()> {
        self.with_failover(|base| {
            let url = format!("{}/apps/{}/{}", base, app, instance_id);
            let request = self.request(Method::PUT, &url);
            async move { self.send(Method::PUT, url, request).await }
        })
        .await?;
        Ok(())
    }

    async fn update_status(
        &self,
        app: &str,
        instance_id: &str,
        status: InstanceStatus,
    ) -> Result<()> {
        self.with_failover(|base| {
            let url = format!("{}/apps/{}/{}/status", base, app, instance_id);
            let request = self
                .request(Method::PUT, &url)
                .query(&[("value", status.as_str())]);
            async move { self.send(Method::PUT, url, request).await }
        })
        .await?;
        Ok(())
    }

    async fn query_application(&self, app_id: &str) -> Result<Application> {
        (|| self.fetch_application(app_id))
            .retry(Self::backoff())
            .when(TransportError::is_transient)
            .notify(|e, delay| {
                warn!(app = %app_id, error = %e, ?delay, "Application query failed, retrying");
            })
            .await
    }

    async fn query_all(&self) -> Result<Vec<Application>> {
        (|| self.fetch_all())
            .retry(Self::backoff())
            .when(TransportError::is_transient)
            .notify(|e, delay| {
                warn!(error = %e, ?delay, "Registry query failed, retrying");
            })
            .await
    }
}
