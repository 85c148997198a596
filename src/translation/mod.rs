//! 翻译模块
//!
//! 采用清晰的模块化架构：
//! - **core**: 渲染控制器、翻译服务接口、触发源与变更协调
//! - **pipeline**: 边界分类、分段、候选收集和语言过滤
//! - **storage**: 翻译缓存和节点渲染状态
//! - **config**: 规则、设置与配置管理
//! - **error**: 错误处理
//!
//! # 基本用法
//!
//! ```rust,no_run
//! use std::rc::Rc;
//! use web_translator::parsers::html_to_dom;
//! use web_translator::translation::{translate_document, EngineConfig, PrefixProvider};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let dom = html_to_dom(b"<p>Hello</p>", "utf-8")?;
//! let provider = Rc::new(PrefixProvider::new("X:"));
//! let stats = translate_document(dom.document.clone(), EngineConfig::default(), provider).await?;
//! println!("完成 {} 次渲染", stats.renders_completed);
//! # Ok(())
//! # }
//! ```

// ============================================================================
// 子模块声明
// ============================================================================

/// 配置管理模块 - 规则、调度设置与翻译服务配置
pub mod config;

/// 渲染核心模块 - 控制器、翻译服务与回写
pub mod core;

/// 错误处理模块 - 统一的错误类型和处理机制
pub mod error;

/// 文本处理管道模块 - 分类、分段、收集与过滤
pub mod pipeline;

/// 存储模块 - 翻译缓存与渲染状态
pub mod storage;

// ============================================================================
// 核心API导出
// ============================================================================

pub use self::core::{
    ControllerBuilder, ControllerStats, FeedOptions, LazyProvider, MutationReconciler,
    MutationRecord, PrefixProvider, RecordingFeed, RenderController, RenderOutcome, RetryPolicy,
    TranslationProvider, TriggerFeed,
};
#[cfg(feature = "deeplx")]
pub use self::core::DeepLxProvider;

pub use config::{
    constants, ConfigManager, DisplayMode, EngineConfig, ProviderConfig, Rule, RuleCallbacks,
    SegmentOptions, Setting, SettingsStore, StaticSettings, TextStyle, Trigger, UserSettings,
};

pub use error::{ErrorCategory, ErrorSeverity, ErrorStats, TranslationError, TranslationResult};

pub use pipeline::{
    BoundaryClassifier, BoundaryInfo, ContentLanguageFilter, Fingerprint, LanguageClassifier,
    LanguageGuess, Segment, SegmentContext, TargetCollector, TextSegmenter, WhatlangClassifier,
};

pub use storage::{CacheStats, TargetState, TranslationCache};

// ============================================================================
// 便利函数
// ============================================================================

/// 一次性翻译整个文档
///
/// 触发方式强制为 `open`，在内部的 `LocalSet` 上等待全部渲染结束后返回统计。
/// 需要在 tokio 运行时中调用。
pub async fn translate_document(
    document: markup5ever_rcdom::Handle,
    mut config: EngineConfig,
    provider: std::rc::Rc<dyn TranslationProvider>,
) -> TranslationResult<ControllerStats> {
    config.rule.trigger = Trigger::Open;
    let controller = RenderController::builder(document, config, provider).build()?;

    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            controller.start();
            controller.wait_idle().await;
        })
        .await;

    let stats = controller.stats();
    tracing::info!(
        "文档翻译完成: 完成 {} 次, 失败 {} 次, 翻译调用 {} 次",
        stats.renders_completed,
        stats.renders_failed,
        stats.provider_calls
    );
    Ok(stats)
}
