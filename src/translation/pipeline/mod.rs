//! 翻译管道模块
//!
//! 边界分类、分段、候选收集和内容语言过滤

pub mod boundary;
pub mod collector;
pub mod filters;
pub mod segment;
pub mod segmenter;

// 重新导出主要类型
pub use boundary::{BoundaryClassifier, BoundaryInfo};
pub use collector::{CollectionStats, TargetCollector};
pub use filters::{ContentLanguageFilter, LanguageClassifier, LanguageGuess, WhatlangClassifier};
pub use segment::{Fingerprint, Segment, SegmentContext};
pub use segmenter::{ends_sentence, SegmenterStats, TextSegmenter};
