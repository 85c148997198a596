//! # Web Translator Library
//!
//! 增量式网页翻译引擎：把活动文档切分成适合翻译的段落，调用翻译服务，
//! 再以叠加或替换的方式把译文写回文档。
//!
//! ## 模块组织
//!
//! - `parsers` - HTML 文档模型、样式、选择器与序列化
//! - `translation` - 分段、收集、渲染控制与翻译服务
//! - `env` - 环境变量配置

pub mod env;
pub mod parsers;
pub mod translation;

// Re-export commonly used items for convenience
pub use parsers::{get_charset, html_to_dom, serialize_document};
pub use translation::{
    translate_document, EngineConfig, RenderController, RenderOutcome, TranslationError,
    TranslationProvider, TranslationResult,
};
