//! 渲染核心
//!
//! - [`controller`]：目标节点的注册、触发、渲染与拆除
//! - [`provider`]：翻译服务接口与重试
//! - [`triggers`]：可见性与悬停触发源
//! - [`writer`]：叠加与替换两种回写方式
//! - [`reconciler`]：文档结构变更后的增量注册

pub mod controller;
pub mod provider;
pub mod reconciler;
pub mod triggers;
pub mod writer;

pub use controller::{ControllerBuilder, ControllerStats, RenderController, RenderOutcome};
#[cfg(feature = "deeplx")]
pub use provider::DeepLxProvider;
pub use provider::{LazyProvider, PrefixProvider, RetryPolicy, TranslationProvider};
pub use reconciler::{MutationReconciler, MutationRecord};
pub use triggers::{FeedFactory, FeedOptions, RecordingFeed, TriggerFeed, TriggerFeeds};
