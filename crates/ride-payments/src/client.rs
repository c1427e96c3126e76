//! External payment processor client (§4.3 "External (card) payment",
//! "Resilient external client"). Mirrors the driver-to-solver HTTP client's
//! shape elsewhere in this workspace: a thin `reqwest::Client` wrapper with
//! one `request_response` helper, here additionally wrapped in a circuit
//! breaker and a retrying send.

use {
    crate::{
        circuit_breaker::{CircuitBreaker, CircuitBreakerConfig},
        retry::{self, RetryConfig, Retryable},
    },
    async_trait::async_trait,
    ride_core::CoreError,
    serde::{Deserialize, Serialize},
    std::time::Duration,
};

const RESPONSE_TIME_LIMIT: Duration = Duration::from_secs(20);

#[derive(Debug)]
pub struct ProcessorError {
    pub status: Option<u16>,
    pub message: String,
}

impl Retryable for ProcessorError {
    fn is_retryable(&self) -> bool {
        match self.status {
            Some(status) => retry::is_retryable_status(status),
            // Transport-level failures with no status at all (timeouts,
            // connection resets) are retried by default (§4.3).
            None => true,
        }
    }
}

impl From<ProcessorError> for CoreError {
    fn from(err: ProcessorError) -> Self {
        CoreError::service_unavailable(err.message)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentIntentRequest {
    pub amount_minor_units: i64,
    pub currency: String,
    pub reference: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefundRequest {
    pub charge_id: String,
    pub amount_minor_units: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Refund {
    pub id: String,
    pub status: String,
}

/// What `ProcessStripePayment`/`ProcessRefund` need from the processor. A
/// trait boundary so tests can swap in a fake without standing up a real
/// HTTP endpoint.
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    async fn create_payment_intent(
        &self,
        request: PaymentIntentRequest,
    ) -> Result<PaymentIntent, ProcessorError>;

    async fn create_refund(&self, request: RefundRequest) -> Result<Refund, ProcessorError>;
}

/// `reqwest`-backed processor client, resilient per §4.3: a circuit breaker
/// short-circuits calls while the processor is unhealthy, and admitted calls
/// are retried with exponential backoff + jitter.
pub struct ResilientProcessorClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    breaker: CircuitBreaker,
    retry_config: RetryConfig,
}

impl ResilientProcessorClient {
    pub fn new(base_url: String, api_key: String) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(RESPONSE_TIME_LIMIT)
                .build()
                .expect("valid reqwest client"),
            base_url,
            api_key,
            breaker: CircuitBreaker::new(CircuitBreakerConfig::default()),
            retry_config: RetryConfig::default(),
        }
    }

    async fn post<Req: Serialize + Sync, Res: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &Req,
    ) -> Result<Res, ProcessorError> {
        self.breaker
            .call(
                || async {
                    retry::retry(self.retry_config, || async {
                        self.send_once(path, body).await
                    })
                    .await
                },
                || ProcessorError {
                    status: None,
                    message: "payments are temporarily unavailable".to_string(),
                },
            )
            .await
    }

    async fn send_once<Req: Serialize + Sync, Res: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &Req,
    ) -> Result<Res, ProcessorError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|err| ProcessorError { status: err.status().map(|s| s.as_u16()), message: err.to_string() })?;

        let status = response.status().as_u16();
        if status >= 400 {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "processor error".to_string());
            return Err(ProcessorError { status: Some(status), message });
        }
        response
            .json::<Res>()
            .await
            .map_err(|err| ProcessorError { status: None, message: err.to_string() })
    }
}

#[async_trait]
impl PaymentProcessor for ResilientProcessorClient {
    async fn create_payment_intent(
        &self,
        request: PaymentIntentRequest,
    ) -> Result<PaymentIntent, ProcessorError> {
        self.post("/v1/payment_intents", &request).await
    }

    async fn create_refund(&self, request: RefundRequest) -> Result<Refund, ProcessorError> {
        self.post("/v1/refunds", &request).await
    }
}
