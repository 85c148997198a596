//! 存储模块
//!
//! 翻译缓存、进行中请求表和节点渲染状态

pub mod cache;

pub use cache::{
    CacheStats, ContentBackup, InFlightMap, RenderToken, SharedTranslation, TargetCache,
    TargetState, TranslationCache,
};
