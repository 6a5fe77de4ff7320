//! Azure Storage Queue backend over the REST API.
//!
//! Speaks the storage queue wire protocol directly:
//! - SharedKeyLite request signing (HMAC-SHA256 over the canonicalized
//!   request, base64 signature)
//! - XML message envelopes parsed with `quick-xml`
//! - Queue create/exists, put/get/delete message operations
//!
//! The service assigns `MessageId` and `PopReceipt` itself; both come back
//! in the response bodies. Storage queues have no server-side long poll, so
//! a bounded-wait lease is a single finite round trip: the wait window
//! bounds the request, and an empty queue answers immediately.
//!
//! Message text is base64-armored before it goes into the XML envelope,
//! matching what the platform SDKs put on the wire.

use crate::error::{ConfigurationError, QueueError};
use crate::message::{Address, LeaseToken, LeasedMessage, MessageId};
use crate::service::QueueService;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::Method;
use sha2::Sha256;
use url::Url;

#[cfg(test)]
#[path = "azure_tests.rs"]
mod tests;

/// Storage service protocol version sent with every request.
const STORAGE_API_VERSION: &str = "2018-03-28";

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for the Azure Storage Queue backend
#[derive(Debug, Clone)]
pub struct AzureQueueConfig {
    /// Storage account name.
    pub account: String,
    /// Base64-encoded account access key.
    pub access_key: String,
    /// Endpoint override, e.g. `http://127.0.0.1:10001/devstoreaccount1`
    /// for an emulator. Defaults to the public queue endpoint of the
    /// account.
    pub endpoint: Option<String>,
    /// Default per-request timeout.
    pub request_timeout: Duration,
}

impl AzureQueueConfig {
    /// Create a configuration for an account with its access key.
    pub fn new(account: String, access_key: String) -> Self {
        Self {
            account,
            access_key,
            endpoint: None,
            request_timeout: Duration::seconds(30),
        }
    }

    /// Point the service at a custom endpoint (emulators, private clouds).
    pub fn with_endpoint(mut self, endpoint: String) -> Self {
        self.endpoint = Some(endpoint);
        self
    }
}

// ============================================================================
// Handle
// ============================================================================

/// Local reference to one storage queue
///
/// Construction is pure string work; whether the queue exists on the
/// service is a separate question.
#[derive(Debug, Clone)]
pub struct AzureQueueHandle {
    address: Address,
    queue_url: String,
    messages_url: String,
}

impl AzureQueueHandle {
    /// Address this handle points at.
    pub fn address(&self) -> &Address {
        &self.address
    }
}

// ============================================================================
// AzureQueueService
// ============================================================================

/// Azure Storage Queue service implementation
pub struct AzureQueueService {
    account: String,
    key: Vec<u8>,
    endpoint: String,
    timeout_seconds: i64,
    http: reqwest::Client,
}

impl AzureQueueService {
    /// Create a new service, validating the configuration up front.
    pub fn new(config: AzureQueueConfig) -> Result<Self, ConfigurationError> {
        if config.account.is_empty() {
            return Err(ConfigurationError::Missing {
                key: "account".to_string(),
            });
        }
        if config.access_key.is_empty() {
            return Err(ConfigurationError::Missing {
                key: "access_key".to_string(),
            });
        }

        let key = STANDARD.decode(config.access_key.as_bytes()).map_err(|e| {
            ConfigurationError::Invalid {
                message: format!("access key is not valid base64: {e}"),
            }
        })?;

        let endpoint = match &config.endpoint {
            Some(endpoint) => endpoint.trim_end_matches('/').to_string(),
            None => format!("https://{}.queue.core.windows.net", config.account),
        };
        Url::parse(&endpoint).map_err(|e| ConfigurationError::Invalid {
            message: format!("invalid endpoint '{endpoint}': {e}"),
        })?;

        let request_timeout =
            config
                .request_timeout
                .to_std()
                .map_err(|_| ConfigurationError::InvalidOption {
                    option: "request_timeout".to_string(),
                    reason: "must be positive".to_string(),
                })?;

        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| ConfigurationError::Invalid {
                message: format!("could not build HTTP client: {e}"),
            })?;

        Ok(Self {
            account: config.account,
            key,
            endpoint,
            timeout_seconds: config.request_timeout.num_seconds(),
            http,
        })
    }

    /// Build the `Authorization` header value for a request.
    fn authorization(
        &self,
        verb: &str,
        content_type: &str,
        date: &str,
        canonical_resource: &str,
    ) -> Result<String, QueueError> {
        let string_to_sign = string_to_sign(verb, content_type, date, canonical_resource);

        let mut mac = Hmac::<Sha256>::new_from_slice(&self.key).map_err(|_| {
            QueueError::AuthenticationFailed {
                message: "invalid account key".to_string(),
            }
        })?;
        mac.update(string_to_sign.as_bytes());
        let signature = STANDARD.encode(mac.finalize().into_bytes());

        Ok(format!("SharedKeyLite {}:{}", self.account, signature))
    }

    /// Issue a signed request.
    ///
    /// `comp` is both a query parameter and, per the SharedKeyLite scheme,
    /// the only query parameter that participates in the signature.
    async fn request(
        &self,
        method: Method,
        url: &str,
        comp: Option<&'static str>,
        query: &[(&str, String)],
        body: Option<String>,
        timeout: Option<std::time::Duration>,
    ) -> Result<reqwest::Response, QueueError> {
        let parsed = Url::parse(url).map_err(|e| QueueError::ConnectionFailed {
            message: format!("invalid request URL '{url}': {e}"),
        })?;

        let mut canonical_resource = format!("/{}{}", self.account, parsed.path());
        if let Some(comp) = comp {
            canonical_resource.push_str("?comp=");
            canonical_resource.push_str(comp);
        }

        let date = Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        let content_type = if body.is_some() { "application/xml" } else { "" };
        let authorization =
            self.authorization(method.as_str(), content_type, &date, &canonical_resource)?;

        let mut builder = self
            .http
            .request(method, parsed)
            .header("x-ms-date", date)
            .header("x-ms-version", STORAGE_API_VERSION)
            .header("Authorization", authorization);

        if let Some(comp) = comp {
            builder = builder.query(&[("comp", comp)]);
        }
        if !query.is_empty() {
            builder = builder.query(query);
        }
        if let Some(body) = body {
            builder = builder.header("Content-Type", "application/xml").body(body);
        }
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        builder.send().await.map_err(|e| self.map_transport_error(e))
    }

    fn map_transport_error(&self, error: reqwest::Error) -> QueueError {
        if error.is_timeout() {
            QueueError::Timeout {
                seconds: self.timeout_seconds,
            }
        } else {
            QueueError::ConnectionFailed {
                message: error.to_string(),
            }
        }
    }

    /// Turn a non-success response into the matching error.
    async fn fail(&self, queue: &Address, response: reqwest::Response) -> QueueError {
        let status = response.status().as_u16();
        let header_code = response
            .headers()
            .get("x-ms-error-code")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response.text().await.unwrap_or_default();
        let code = header_code
            .or_else(|| parse_error_code(&body))
            .unwrap_or_else(|| "Unknown".to_string());

        map_failure(status, &code, queue, &body)
    }

    async fn leased_messages(
        &self,
        handle: &AzureQueueHandle,
        count: u32,
        visibility: Duration,
        timeout: Option<std::time::Duration>,
    ) -> Result<Vec<LeasedMessage>, QueueError> {
        let query = [
            ("numofmessages", count.to_string()),
            ("visibilitytimeout", visibility.num_seconds().max(1).to_string()),
        ];

        let response = self
            .request(
                Method::GET,
                &handle.messages_url,
                None,
                &query,
                None,
                timeout,
            )
            .await?;

        if !response.status().is_success() {
            return Err(self.fail(&handle.address, response).await);
        }

        let body = response
            .text()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        parse_message_list(&body)?
            .into_iter()
            .map(|raw| raw.into_leased_message())
            .collect()
    }
}

#[async_trait]
impl QueueService for AzureQueueService {
    type Handle = AzureQueueHandle;

    fn handle(&self, address: &Address) -> Self::Handle {
        let queue_url = format!("{}/{}", self.endpoint, address);
        let messages_url = format!("{queue_url}/messages");
        AzureQueueHandle {
            address: address.clone(),
            queue_url,
            messages_url,
        }
    }

    async fn create_if_not_exists(&self, handle: &Self::Handle) -> Result<(), QueueError> {
        let response = self
            .request(Method::PUT, &handle.queue_url, None, &[], None, None)
            .await?;

        // 201 created, 204 already exists with matching metadata, 409
        // already exists with different metadata. All leave the queue in
        // place.
        match response.status().as_u16() {
            201 | 204 | 409 => Ok(()),
            _ => Err(self.fail(&handle.address, response).await),
        }
    }

    async fn exists(&self, handle: &Self::Handle) -> Result<bool, QueueError> {
        let response = self
            .request(
                Method::GET,
                &handle.queue_url,
                Some("metadata"),
                &[],
                None,
                None,
            )
            .await?;

        match response.status().as_u16() {
            200 => Ok(true),
            404 => Ok(false),
            _ => Err(self.fail(&handle.address, response).await),
        }
    }

    async fn enqueue(
        &self,
        handle: &Self::Handle,
        payload: String,
    ) -> Result<MessageId, QueueError> {
        let text = STANDARD.encode(payload.as_bytes());
        let body = format!("<QueueMessage><MessageText>{text}</MessageText></QueueMessage>");

        let response = self
            .request(
                Method::POST,
                &handle.messages_url,
                None,
                &[],
                Some(body),
                None,
            )
            .await?;

        if !response.status().is_success() {
            return Err(self.fail(&handle.address, response).await);
        }

        let body = response
            .text()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let assigned = parse_message_list(&body)?
            .into_iter()
            .next()
            .ok_or_else(|| QueueError::Provider {
                status: 201,
                code: "MalformedResponse".to_string(),
                message: "put-message response carried no message entry".to_string(),
            })?;

        Ok(MessageId::from(assigned.message_id))
    }

    async fn lease(
        &self,
        handle: &Self::Handle,
        wait: Duration,
        visibility: Duration,
    ) -> Result<Option<LeasedMessage>, QueueError> {
        // The storage service answers a get-messages request immediately;
        // the wait window time-boxes the round trip.
        let timeout = wait.to_std().ok();
        let mut messages = self.leased_messages(handle, 1, visibility, timeout).await?;
        Ok(messages.pop())
    }

    async fn delete(&self, handle: &Self::Handle, lease: &LeaseToken) -> Result<(), QueueError> {
        let url = format!("{}/{}", handle.messages_url, lease.message_id());
        let query = [("popreceipt", lease.pop_receipt().to_string())];

        let response = self
            .request(Method::DELETE, &url, None, &query, None, None)
            .await?;

        match response.status().as_u16() {
            204 => Ok(()),
            404 | 400 => Err(QueueError::LeaseNotFound {
                message_id: lease.message_id().to_string(),
            }),
            _ => Err(self.fail(&handle.address, response).await),
        }
    }

    async fn fetch_batch(
        &self,
        handle: &Self::Handle,
        count: u32,
        visibility: Duration,
    ) -> Result<Vec<LeasedMessage>, QueueError> {
        self.leased_messages(handle, count, visibility, None).await
    }
}

// ============================================================================
// Signing and response parsing
// ============================================================================

/// SharedKeyLite string-to-sign for the queue service.
///
/// The date rides in the canonicalized `x-ms-date` header, so the plain
/// `Date` line stays empty.
fn string_to_sign(verb: &str, content_type: &str, date: &str, canonical_resource: &str) -> String {
    format!(
        "{verb}\n\n{content_type}\n\nx-ms-date:{date}\nx-ms-version:{STORAGE_API_VERSION}\n{canonical_resource}"
    )
}

/// Map a failed response to a queue error.
fn map_failure(status: u16, code: &str, queue: &Address, body: &str) -> QueueError {
    match (status, code) {
        (401 | 403, _) => QueueError::AuthenticationFailed {
            message: code.to_string(),
        },
        (404, "QueueNotFound") | (404, "QueueNotExist") => QueueError::QueueNotFound {
            queue: queue.to_string(),
        },
        _ => QueueError::Provider {
            status,
            code: code.to_string(),
            message: body.chars().take(512).collect(),
        },
    }
}

/// One `<QueueMessage>` entry from a storage response
#[derive(Debug, Default)]
struct RawMessage {
    message_id: String,
    pop_receipt: String,
    message_text: String,
    dequeue_count: u32,
    insertion_time: Option<DateTime<Utc>>,
}

impl RawMessage {
    fn into_leased_message(self) -> Result<LeasedMessage, QueueError> {
        let decoded = STANDARD
            .decode(self.message_text.as_bytes())
            .map_err(|e| QueueError::Provider {
                status: 200,
                code: "InvalidMessageText".to_string(),
                message: format!("message text is not valid base64: {e}"),
            })?;
        let payload = String::from_utf8(decoded).map_err(|e| QueueError::Provider {
            status: 200,
            code: "InvalidMessageText".to_string(),
            message: format!("message text is not valid UTF-8: {e}"),
        })?;

        Ok(LeasedMessage {
            payload,
            lease: LeaseToken::new(MessageId::from(self.message_id), self.pop_receipt),
            dequeue_count: self.dequeue_count.max(1),
            inserted_at: self.insertion_time,
        })
    }
}

fn xml_error(error: quick_xml::Error) -> QueueError {
    QueueError::Provider {
        status: 200,
        code: "MalformedResponse".to_string(),
        message: format!("could not parse XML response: {error}"),
    }
}

/// Parse a `<QueueMessagesList>` response body.
fn parse_message_list(xml: &str) -> Result<Vec<RawMessage>, QueueError> {
    let mut reader = Reader::from_str(xml);
    let mut messages = Vec::new();
    let mut current: Option<RawMessage> = None;
    let mut field: Option<Vec<u8>> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"QueueMessage" => current = Some(RawMessage::default()),
                name => field = Some(name.to_vec()),
            },
            Ok(Event::Text(t)) => {
                let text = t.unescape().map_err(xml_error)?.into_owned();
                record_field(&mut current, &field, text);
            }
            Ok(Event::CData(t)) => {
                let text = String::from_utf8_lossy(&t.into_inner()).into_owned();
                record_field(&mut current, &field, text);
            }
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"QueueMessage" => {
                    if let Some(message) = current.take() {
                        messages.push(message);
                    }
                }
                _ => field = None,
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error(e)),
            _ => {}
        }
    }

    Ok(messages)
}

fn record_field(current: &mut Option<RawMessage>, field: &Option<Vec<u8>>, text: String) {
    let (Some(message), Some(field)) = (current.as_mut(), field.as_ref()) else {
        return;
    };

    match field.as_slice() {
        b"MessageId" => message.message_id = text,
        b"PopReceipt" => message.pop_receipt = text,
        b"MessageText" => message.message_text = text,
        b"DequeueCount" => message.dequeue_count = text.trim().parse().unwrap_or(0),
        b"InsertionTime" => {
            message.insertion_time = DateTime::parse_from_rfc2822(text.trim())
                .ok()
                .map(|dt| dt.with_timezone(&Utc));
        }
        _ => {}
    }
}

/// Extract `<Code>` from a storage error body, if present.
fn parse_error_code(body: &str) -> Option<String> {
    let mut reader = Reader::from_str(body);
    let mut in_code = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.name().as_ref() == b"Code" => in_code = true,
            Ok(Event::Text(t)) if in_code => {
                return t.unescape().ok().map(|code| code.into_owned());
            }
            Ok(Event::End(_)) => in_code = false,
            Ok(Event::Eof) | Err(_) => return None,
            _ => {}
        }
    }
}
