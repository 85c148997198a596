//! 翻译规则与调度设置
//!
//! [`Rule`] 描述“翻译什么、怎么显示、何时触发”，[`Setting`] 描述调度与标记相关的
//! 参数。两者都可以从配置文件反序列化，缺省字段取默认值。

use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use markup5ever_rcdom::Handle;
use serde::{Deserialize, Serialize};

use super::constants;

/// 译文显示模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayMode {
    /// 原文保留，译文插入宿主元素
    #[default]
    Overlay,
    /// 译文直接覆盖原文文本
    Replace,
}

impl DisplayMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisplayMode::Overlay => "overlay",
            DisplayMode::Replace => "replace",
        }
    }
}

impl FromStr for DisplayMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "overlay" => Ok(DisplayMode::Overlay),
            "replace" => Ok(DisplayMode::Replace),
            other => Err(format!("未知显示模式 '{}'，可选: overlay, replace", other)),
        }
    }
}

impl fmt::Display for DisplayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 渲染触发方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trigger {
    /// 进入视口时
    #[default]
    Scroll,
    /// 注册后立即
    Open,
    /// 悬停时
    Hover,
    /// 由调用方显式触发
    Manual,
}

impl FromStr for Trigger {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "scroll" => Ok(Trigger::Scroll),
            "open" => Ok(Trigger::Open),
            "hover" => Ok(Trigger::Hover),
            "manual" => Ok(Trigger::Manual),
            other => Err(format!(
                "未知触发方式 '{}'，可选: scroll, open, hover, manual",
                other
            )),
        }
    }
}

/// 译文装饰样式，写入宿主元素的 `data-style`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TextStyle {
    #[default]
    None,
    Underline,
    Dashed,
    Dotted,
    Highlight,
    Weakened,
}

impl TextStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            TextStyle::None => "none",
            TextStyle::Underline => "underline",
            TextStyle::Dashed => "dashed",
            TextStyle::Dotted => "dotted",
            TextStyle::Highlight => "highlight",
            TextStyle::Weakened => "weakened",
        }
    }
}

/// 分段参数，长度均按字符计
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentOptions {
    pub max_chunk_size: usize,
    pub min_chunk_size: usize,
    pub preserve_sentences: bool,
    pub preserve_context: bool,
    pub context_overlap: usize,
}

impl Default for SegmentOptions {
    fn default() -> Self {
        Self {
            max_chunk_size: constants::DEFAULT_MAX_CHUNK_SIZE,
            min_chunk_size: constants::DEFAULT_MIN_CHUNK_SIZE,
            preserve_sentences: true,
            preserve_context: false,
            context_overlap: constants::DEFAULT_CONTEXT_OVERLAP,
        }
    }
}

/// 一条翻译规则
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Rule {
    /// 分号分隔的选择器，支持 `host::shadow::inner`
    pub selector: String,
    pub mode: DisplayMode,
    pub trigger: Trigger,
    /// 段落文本长度下限（字符）
    pub min_text_length: usize,
    /// 段落文本长度上限（字符）
    pub max_text_length: usize,
    pub style: TextStyle,
    pub segment: SegmentOptions,
}

impl Default for Rule {
    fn default() -> Self {
        Self {
            selector: constants::DEFAULT_SELECTOR.to_string(),
            mode: DisplayMode::default(),
            trigger: Trigger::default(),
            min_text_length: constants::DEFAULT_MIN_TEXT_LENGTH,
            max_text_length: constants::DEFAULT_MAX_TEXT_LENGTH,
            style: TextStyle::default(),
            segment: SegmentOptions::default(),
        }
    }
}

impl Rule {
    pub fn with_selector(selector: &str) -> Self {
        Self {
            selector: selector.to_string(),
            ..Self::default()
        }
    }
}

/// 调度与标记设置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Setting {
    pub reflow_debounce_ms: u64,
    pub mutation_debounce_ms: u64,
    /// 可见性阈值，交给宿主的可见性监听使用
    pub visibility_threshold: f32,
    pub skip_tags: Vec<String>,
    /// 额外视为行内的标签
    pub inline_tags: Vec<String>,
    pub host_tag: String,
    pub host_class: String,
    /// 分段缓存容量
    pub segment_cache_size: usize,
}

impl Default for Setting {
    fn default() -> Self {
        Self {
            reflow_debounce_ms: constants::DEFAULT_REFLOW_DEBOUNCE_MS,
            mutation_debounce_ms: constants::DEFAULT_MUTATION_DEBOUNCE_MS,
            visibility_threshold: constants::DEFAULT_VISIBILITY_THRESHOLD,
            skip_tags: constants::SKIP_TAGS.iter().map(|t| t.to_string()).collect(),
            inline_tags: constants::INLINE_TAGS.iter().map(|t| t.to_string()).collect(),
            host_tag: constants::DEFAULT_HOST_TAG.to_string(),
            host_class: constants::DEFAULT_HOST_CLASS.to_string(),
            segment_cache_size: constants::DEFAULT_SEGMENT_CACHE_SIZE,
        }
    }
}

impl Setting {
    pub fn is_skip_tag(&self, tag: &str) -> bool {
        self.skip_tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }

    pub fn is_inline_tag(&self, tag: &str) -> bool {
        self.inline_tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }
}

/// 节点回调
pub type NodeCallback = Rc<dyn Fn(&Handle)>;

/// 规则生命周期回调，不参与序列化
#[derive(Clone, Default)]
pub struct RuleCallbacks {
    /// 某个节点开始翻译
    pub on_render_start: Option<NodeCallback>,
    /// 注销时，节点已恢复原状
    pub on_removed: Option<NodeCallback>,
}

impl fmt::Debug for RuleCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleCallbacks")
            .field("on_render_start", &self.on_render_start.is_some())
            .field("on_removed", &self.on_removed.is_some())
            .finish()
    }
}

/// 用户持久化设置中与渲染相关的部分
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSettings {
    pub enabled: bool,
    pub mode: Option<DisplayMode>,
    pub style: Option<TextStyle>,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            mode: None,
            style: None,
        }
    }
}

/// 持久化用户设置的读取接口，只在注册时读取
pub trait SettingsStore {
    fn load(&self) -> UserSettings;
}

/// 内存中的固定设置
#[derive(Debug, Clone, Default)]
pub struct StaticSettings(pub UserSettings);

impl SettingsStore for StaticSettings {
    fn load(&self) -> UserSettings {
        self.0.clone()
    }
}
