//! HTTP探测器实现
//!
//! 对目标URL执行一次GET请求，并将结果归类为带标签的探测结果

use crate::error::{MonitorError, Result};
use crate::health::model::{is_healthy_status, truncate_message, MAX_ERROR_MESSAGE_CHARS};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::{redirect, Client};
use serde::Serialize;
use std::error::Error as StdError;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{error, info, warn};

/// 默认 User-Agent
pub const DEFAULT_USER_AGENT: &str = "URLChecker/1.0 (Health Monitor)";

/// 默认 Accept 请求头
pub const DEFAULT_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

/// 单次探测的结果
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProbeOutcome {
    /// 收到HTTP响应（任意状态码）
    Success { status_code: u16, elapsed_seconds: f64 },
    /// 请求超时
    Timeout { elapsed_seconds: f64 },
    /// TLS/证书错误
    TlsError { elapsed_seconds: f64, message: String },
    /// 连接失败
    ConnectionError { elapsed_seconds: f64 },
    /// 其他请求级错误
    OtherRequestError { elapsed_seconds: f64, message: String },
}

impl ProbeOutcome {
    /// HTTP状态码（仅在收到响应时存在）
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ProbeOutcome::Success { status_code, .. } => Some(*status_code),
            _ => None,
        }
    }

    /// 从请求开始到结果确定的耗时（秒）
    pub fn elapsed_seconds(&self) -> f64 {
        match self {
            ProbeOutcome::Success { elapsed_seconds, .. }
            | ProbeOutcome::Timeout { elapsed_seconds }
            | ProbeOutcome::TlsError { elapsed_seconds, .. }
            | ProbeOutcome::ConnectionError { elapsed_seconds }
            | ProbeOutcome::OtherRequestError { elapsed_seconds, .. } => *elapsed_seconds,
        }
    }

    /// 是否健康
    pub fn is_healthy(&self) -> bool {
        is_healthy_status(self.status_code())
    }

    /// 是否为网络层失败（超时、TLS、连接）
    pub fn is_network_failure(&self) -> bool {
        matches!(
            self,
            ProbeOutcome::Timeout { .. }
                | ProbeOutcome::TlsError { .. }
                | ProbeOutcome::ConnectionError { .. }
        )
    }

    /// 是否为通用请求错误
    pub fn is_request_error(&self) -> bool {
        matches!(self, ProbeOutcome::OtherRequestError { .. })
    }

    /// 写入记录的错误信息，收到HTTP响应时为空
    pub fn error_message(&self) -> Option<String> {
        match self {
            ProbeOutcome::Success { .. } => None,
            ProbeOutcome::Timeout { .. } => Some("Request timeout".to_string()),
            ProbeOutcome::TlsError { message, .. } => Some(format!(
                "SSL error: {}",
                truncate_message(message, MAX_ERROR_MESSAGE_CHARS)
            )),
            ProbeOutcome::ConnectionError { .. } => Some("Connection failed".to_string()),
            ProbeOutcome::OtherRequestError { message, .. } => Some(format!(
                "Request error: {}",
                truncate_message(message, MAX_ERROR_MESSAGE_CHARS)
            )),
        }
    }
}

/// 探测器trait，定义单次探测接口
#[async_trait]
pub trait Prober: Send + Sync {
    /// 对URL执行一次探测，不产生除网络请求外的副作用
    async fn probe(&self, url: &str) -> ProbeOutcome;
}

/// 探测请求参数
#[derive(Debug, Clone)]
pub struct ProbeSettings {
    /// 请求超时时间
    pub timeout: Duration,
    /// User-Agent
    pub user_agent: String,
    /// Accept 请求头
    pub accept: String,
    /// 最大重定向次数
    pub max_redirects: usize,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            accept: DEFAULT_ACCEPT.to_string(),
            max_redirects: 10,
        }
    }
}

/// 基于reqwest的HTTP探测器
pub struct HttpProber {
    /// HTTP客户端
    client: Client,
    /// 请求超时时间
    timeout: Duration,
}

impl HttpProber {
    /// 创建新的HTTP探测器
    ///
    /// # 参数
    /// * `settings` - 探测请求参数
    ///
    /// # 返回
    /// * `Result<Self>` - 探测器实例
    pub fn new(settings: &ProbeSettings) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let accept = HeaderValue::from_str(&settings.accept)
            .unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_ACCEPT));
        headers.insert(ACCEPT, accept);

        // 证书校验保持reqwest默认（开启）
        let client = Client::builder()
            .timeout(settings.timeout)
            .user_agent(settings.user_agent.clone())
            .default_headers(headers)
            .redirect(redirect::Policy::limited(settings.max_redirects))
            .build()
            .map_err(MonitorError::ClientBuild)?;

        Ok(Self {
            client,
            timeout: settings.timeout,
        })
    }

    /// 将reqwest错误归类为探测结果
    fn classify_error(error: &reqwest::Error, elapsed_seconds: f64) -> ProbeOutcome {
        if error.is_timeout() {
            ProbeOutcome::Timeout { elapsed_seconds }
        } else if let Some(message) = tls_failure(error) {
            ProbeOutcome::TlsError {
                elapsed_seconds,
                message: truncate_message(&message, MAX_ERROR_MESSAGE_CHARS),
            }
        } else if error.is_connect() {
            ProbeOutcome::ConnectionError { elapsed_seconds }
        } else {
            ProbeOutcome::OtherRequestError {
                elapsed_seconds,
                message: truncate_message(&error.to_string(), MAX_ERROR_MESSAGE_CHARS),
            }
        }
    }
}

/// 在错误来源链中查找TLS/证书错误
fn tls_failure(error: &reqwest::Error) -> Option<String> {
    error.source().and_then(find_tls_error)
}

/// 沿来源链查找TLS错误，优先返回 `rustls::Error` 的描述
///
/// `std::io::Error` 的 `source()` 会跳过它包装的内部错误，
/// 所以遇到 io 错误时通过 `get_ref()` 进入内部错误继续查找。
/// 找不到 `rustls::Error` 时按文本匹配，返回最内层匹配的描述。
fn find_tls_error(start: &(dyn StdError + 'static)) -> Option<String> {
    let mut text_match = None;
    let mut current = Some(start);

    while let Some(cause) = current {
        if let Some(tls) = cause.downcast_ref::<rustls::Error>() {
            return Some(tls.to_string());
        }

        if mentions_tls(&cause.to_string()) {
            text_match = Some(cause.to_string());
        }

        current = match cause.downcast_ref::<std::io::Error>() {
            Some(io_error) => match io_error.get_ref() {
                Some(inner) => Some(inner as &(dyn StdError + 'static)),
                None => cause.source(),
            },
            None => cause.source(),
        };
    }

    text_match
}

fn mentions_tls(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower.contains("certificate")
        || lower.contains("tls")
        || lower.contains("ssl")
        || lower.contains("handshake")
}

#[async_trait]
impl Prober for HttpProber {
    async fn probe(&self, url: &str) -> ProbeOutcome {
        let start_time = Instant::now();

        let response_result = timeout(self.timeout, self.client.get(url).send()).await;
        let elapsed_seconds = start_time.elapsed().as_secs_f64();

        let outcome = match response_result {
            Ok(Ok(response)) => ProbeOutcome::Success {
                status_code: response.status().as_u16(),
                elapsed_seconds,
            },
            Ok(Err(e)) => Self::classify_error(&e, elapsed_seconds),
            Err(_) => ProbeOutcome::Timeout { elapsed_seconds },
        };

        match &outcome {
            ProbeOutcome::Success { status_code, .. } => {
                info!("URL {}: Status {}, Time {:.3}s", url, status_code, elapsed_seconds)
            }
            ProbeOutcome::OtherRequestError { .. } => {
                error!("探测 {} 请求错误: {}", url, outcome.error_message().unwrap_or_default())
            }
            _ => warn!("探测 {} 失败: {}", url, outcome.error_message().unwrap_or_default()),
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[derive(Debug, thiserror::Error)]
    #[error("client error")]
    struct ClientError(#[source] io::Error);

    fn fast_settings() -> ProbeSettings {
        ProbeSettings {
            timeout: Duration::from_secs(5),
            ..Default::default()
        }
    }

    #[test]
    fn test_probe_settings_default() {
        let settings = ProbeSettings::default();
        assert_eq!(settings.timeout, Duration::from_secs(30));
        assert_eq!(settings.user_agent, "URLChecker/1.0 (Health Monitor)");
        assert_eq!(settings.max_redirects, 10);
    }

    #[test]
    fn test_outcome_error_messages() {
        assert_eq!(
            ProbeOutcome::Timeout { elapsed_seconds: 30.0 }.error_message(),
            Some("Request timeout".to_string())
        );
        assert_eq!(
            ProbeOutcome::ConnectionError { elapsed_seconds: 0.1 }.error_message(),
            Some("Connection failed".to_string())
        );
        assert_eq!(
            ProbeOutcome::Success {
                status_code: 404,
                elapsed_seconds: 0.1
            }
            .error_message(),
            None
        );

        let tls = ProbeOutcome::TlsError {
            elapsed_seconds: 0.2,
            message: "invalid peer certificate: UnknownIssuer".to_string(),
        };
        assert_eq!(
            tls.error_message().as_deref(),
            Some("SSL error: invalid peer certificate: UnknownIssuer")
        );
    }

    #[test]
    fn test_request_error_message_is_bounded() {
        let outcome = ProbeOutcome::OtherRequestError {
            elapsed_seconds: 0.1,
            message: "e".repeat(300),
        };
        let message = outcome.error_message().unwrap();
        assert_eq!(message, format!("Request error: {}", "e".repeat(100)));
    }

    #[test]
    fn test_outcome_classes() {
        let timeout = ProbeOutcome::Timeout { elapsed_seconds: 1.0 };
        assert!(timeout.is_network_failure());
        assert!(!timeout.is_request_error());
        assert!(!timeout.is_healthy());

        let other = ProbeOutcome::OtherRequestError {
            elapsed_seconds: 1.0,
            message: "boom".to_string(),
        };
        assert!(other.is_request_error());
        assert!(!other.is_network_failure());

        let ok = ProbeOutcome::Success {
            status_code: 302,
            elapsed_seconds: 0.3,
        };
        assert!(ok.is_healthy());
        assert_eq!(ok.elapsed_seconds(), 0.3);
    }

    #[tokio::test]
    async fn test_probe_sends_identifying_headers() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/health")
            .match_header("user-agent", DEFAULT_USER_AGENT)
            .match_header("accept", DEFAULT_ACCEPT)
            .with_status(200)
            .create_async()
            .await;

        let prober = HttpProber::new(&fast_settings()).unwrap();
        let outcome = prober.probe(&format!("{}/health", server.url())).await;

        mock.assert_async().await;
        assert_eq!(outcome.status_code(), Some(200));
        assert!(outcome.is_healthy());
    }

    #[tokio::test]
    async fn test_probe_follows_redirects() {
        let mut server = mockito::Server::new_async().await;
        let target = format!("{}/final", server.url());
        let _redirect = server
            .mock("GET", "/start")
            .with_status(301)
            .with_header("location", &target)
            .create_async()
            .await;
        let _final = server
            .mock("GET", "/final")
            .with_status(204)
            .create_async()
            .await;

        let prober = HttpProber::new(&fast_settings()).unwrap();
        let outcome = prober.probe(&format!("{}/start", server.url())).await;

        assert_eq!(outcome.status_code(), Some(204));
    }

    #[tokio::test]
    async fn test_probe_server_error_is_still_a_response() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/")
            .with_status(503)
            .create_async()
            .await;

        let prober = HttpProber::new(&fast_settings()).unwrap();
        let outcome = prober.probe(&server.url()).await;

        assert_eq!(outcome.status_code(), Some(503));
        assert!(!outcome.is_healthy());
        assert!(outcome.error_message().is_none());
    }

    #[tokio::test]
    async fn test_probe_connection_refused() {
        // 绑定后立即释放端口，得到一个没有监听者的地址
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let prober = HttpProber::new(&fast_settings()).unwrap();
        let outcome = prober.probe(&format!("http://127.0.0.1:{port}/")).await;

        assert!(matches!(outcome, ProbeOutcome::ConnectionError { .. }));
        assert_eq!(outcome.error_message().as_deref(), Some("Connection failed"));
    }

    #[tokio::test]
    async fn test_probe_invalid_url_is_request_error() {
        let prober = HttpProber::new(&fast_settings()).unwrap();
        let outcome = prober.probe("not a url").await;

        assert!(outcome.is_request_error());
        assert!(outcome
            .error_message()
            .unwrap()
            .starts_with("Request error: "));
    }

    #[test]
    fn test_rustls_error_inside_io_error_is_found() {
        let io_error = io::Error::new(
            io::ErrorKind::InvalidData,
            rustls::Error::InvalidCertificate(rustls::CertificateError::UnknownIssuer),
        );
        let wrapped = ClientError(io_error);

        let message = find_tls_error(&wrapped).unwrap();
        assert!(message.to_lowercase().contains("certificate"));
    }

    #[test]
    fn test_plain_io_error_is_not_tls() {
        let wrapped = ClientError(io::Error::new(
            io::ErrorKind::ConnectionRefused,
            "connection refused",
        ));
        assert!(find_tls_error(&wrapped).is_none());
    }

    #[test]
    fn test_tls_text_is_matched_as_fallback() {
        let wrapped = ClientError(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "tls handshake eof",
        ));
        assert_eq!(find_tls_error(&wrapped).as_deref(), Some("tls handshake eof"));
    }
}
