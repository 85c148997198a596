//! 翻译服务接口
//!
//! 引擎只依赖 [`TranslationProvider`]，具体实现可以是本地的前缀回显、
//! 需要异步初始化的远程服务，或者 DeepLX 兼容接口。

use std::cell::Cell;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::LocalBoxFuture;
use futures::FutureExt;
use tokio::sync::OnceCell;

use crate::translation::config::{constants, ProviderConfig};
use crate::translation::error::{TranslationError, TranslationResult};

/// 翻译服务
#[async_trait(?Send)]
pub trait TranslationProvider {
    /// 翻译一段文本；失败时返回错误，由调用方决定是否重试
    async fn translate(&self, text: &str) -> TranslationResult<String>;

    /// 日志中显示的名称
    fn name(&self) -> &str {
        "provider"
    }
}

// ============================================================================
// 前缀回显
// ============================================================================

/// 返回 `prefix + text` 的离线实现，记录调用次数
#[derive(Debug, Default)]
pub struct PrefixProvider {
    prefix: String,
    calls: Cell<usize>,
}

impl PrefixProvider {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            calls: Cell::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

#[async_trait(?Send)]
impl TranslationProvider for PrefixProvider {
    async fn translate(&self, text: &str) -> TranslationResult<String> {
        self.calls.set(self.calls.get() + 1);
        Ok(format!("{}{}", self.prefix, text))
    }

    fn name(&self) -> &str {
        "prefix"
    }
}

// ============================================================================
// 延迟初始化
// ============================================================================

type ProviderInit<P> = Box<dyn Fn() -> LocalBoxFuture<'static, TranslationResult<P>>>;

/// 首次调用前异步初始化内部服务；初始化失败时下次调用重新尝试
pub struct LazyProvider<P> {
    init: ProviderInit<P>,
    cell: OnceCell<P>,
    init_attempts: Cell<usize>,
}

impl<P: TranslationProvider + 'static> LazyProvider<P> {
    pub fn new<F, Fut>(init: F) -> Self
    where
        F: Fn() -> Fut + 'static,
        Fut: Future<Output = TranslationResult<P>> + 'static,
    {
        Self {
            init: Box::new(move || init().boxed_local()),
            cell: OnceCell::new(),
            init_attempts: Cell::new(0),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.cell.initialized()
    }

    pub fn init_attempts(&self) -> usize {
        self.init_attempts.get()
    }

    async fn inner(&self) -> TranslationResult<&P> {
        self.cell
            .get_or_try_init(|| {
                self.init_attempts.set(self.init_attempts.get() + 1);
                (self.init)()
            })
            .await
            .map_err(|e| TranslationError::ProviderError(format!("翻译服务初始化失败: {}", e)))
    }
}

#[async_trait(?Send)]
impl<P: TranslationProvider + 'static> TranslationProvider for LazyProvider<P> {
    async fn translate(&self, text: &str) -> TranslationResult<String> {
        let inner = self.inner().await?;
        inner.translate(text).await
    }

    fn name(&self) -> &str {
        match self.cell.get() {
            Some(inner) => inner.name(),
            None => "lazy",
        }
    }
}

// ============================================================================
// 重试策略
// ============================================================================

/// 指数退避重试，只重试 [`TranslationError::is_retryable`] 为真的错误
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 总尝试次数（含第一次）
    pub max_attempts: usize,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: constants::DEFAULT_RETRY_ATTEMPTS,
            base_delay: constants::DEFAULT_RETRY_BASE_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &ProviderConfig) -> Self {
        Self {
            max_attempts: config.retry_attempts.max(1),
            base_delay: config.retry_base_delay(),
        }
    }

    /// 不重试
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
        }
    }

    fn delay_for(&self, attempt: usize) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16) as u32;
        self.base_delay.saturating_mul(2u32.pow(exponent))
    }

    pub async fn run<T, F, Fut>(&self, mut operation: F) -> TranslationResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = TranslationResult<T>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    let delay = self.delay_for(attempt);
                    tracing::warn!(
                        "翻译请求失败 (第 {}/{} 次)，{:?} 后重试: {}",
                        attempt,
                        self.max_attempts,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

// ============================================================================
// DeepLX
// ============================================================================

#[cfg(feature = "deeplx")]
pub use deeplx::DeepLxProvider;

#[cfg(feature = "deeplx")]
mod deeplx {
    use async_trait::async_trait;
    use serde::{Deserialize, Serialize};

    use super::TranslationProvider;
    use crate::translation::config::ProviderConfig;
    use crate::translation::error::{TranslationError, TranslationResult};

    #[derive(Serialize)]
    struct DeepLxRequest<'a> {
        text: &'a str,
        source_lang: &'a str,
        target_lang: &'a str,
    }

    #[derive(Deserialize)]
    struct DeepLxResponse {
        code: Option<i64>,
        data: Option<String>,
        message: Option<String>,
    }

    /// DeepLX 兼容接口
    pub struct DeepLxProvider {
        client: reqwest::Client,
        api_url: String,
        source_lang: String,
        target_lang: String,
    }

    impl DeepLxProvider {
        pub fn new(config: &ProviderConfig) -> TranslationResult<Self> {
            if config.api_url.trim().is_empty() {
                return Err(TranslationError::ConfigError("API 地址为空".to_string()));
            }
            let client = reqwest::Client::builder()
                .timeout(config.timeout())
                .build()
                .map_err(|e| TranslationError::ConfigError(format!("创建 HTTP 客户端失败: {}", e)))?;
            Ok(Self {
                client,
                api_url: config.api_url.clone(),
                source_lang: wire_lang(&config.source_lang),
                target_lang: wire_lang(&config.target_lang),
            })
        }
    }

    /// DeepLX 使用大写语言代码，`auto` 保持原样
    fn wire_lang(lang: &str) -> String {
        let lang = lang.trim();
        if lang.eq_ignore_ascii_case("auto") {
            "auto".to_string()
        } else {
            lang.to_ascii_uppercase()
        }
    }

    fn status_error(status: reqwest::StatusCode, body: &str) -> TranslationError {
        let message = match status.as_u16() {
            401 | 403 => "翻译服务拒绝访问，请检查访问令牌".to_string(),
            404 => "翻译接口不存在，请检查 API 地址".to_string(),
            429 => "翻译请求过于频繁".to_string(),
            _ => format!("翻译服务返回 {}: {}", status, body.chars().take(200).collect::<String>()),
        };
        if status.is_server_error() || status.as_u16() == 429 {
            TranslationError::NetworkError(message)
        } else {
            TranslationError::ProviderError(message)
        }
    }

    #[async_trait(?Send)]
    impl TranslationProvider for DeepLxProvider {
        async fn translate(&self, text: &str) -> TranslationResult<String> {
            let request = DeepLxRequest {
                text,
                source_lang: &self.source_lang,
                target_lang: &self.target_lang,
            };
            let response = self
                .client
                .post(&self.api_url)
                .json(&request)
                .send()
                .await
                .map_err(|e| {
                    if e.is_timeout() {
                        TranslationError::TimeoutError(format!("翻译请求超时: {}", e))
                    } else {
                        TranslationError::NetworkError(format!("翻译请求失败: {}", e))
                    }
                })?;

            let status = response.status();
            let body = response
                .text()
                .await
                .map_err(|e| TranslationError::NetworkError(format!("读取响应失败: {}", e)))?;
            if !status.is_success() {
                return Err(status_error(status, &body));
            }

            let parsed: DeepLxResponse = serde_json::from_str(&body)?;
            if let Some(code) = parsed.code {
                if code != 200 {
                    return Err(TranslationError::ProviderError(format!(
                        "翻译服务返回错误码 {}: {}",
                        code,
                        parsed.message.unwrap_or_default()
                    )));
                }
            }
            parsed
                .data
                .ok_or_else(|| TranslationError::ProviderError("响应中缺少 data 字段".to_string()))
        }

        fn name(&self) -> &str {
            "deeplx"
        }
    }

}
