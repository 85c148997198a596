//! 翻译配置管理模块
//!
//! 提供规则、设置和服务配置，支持环境变量、配置文件和默认值

pub mod manager;
pub mod rule;

// 重新导出主要类型
pub use manager::{ConfigManager, EngineConfig, ProviderConfig};
pub use rule::{
    DisplayMode, NodeCallback, Rule, RuleCallbacks, SegmentOptions, Setting, SettingsStore,
    StaticSettings, TextStyle, Trigger, UserSettings,
};

/// 配置常量
pub mod constants {
    use std::time::Duration;

    // 规则默认值
    pub const DEFAULT_SELECTOR: &str =
        "h1, h2, h3, h4, h5, h6, p, li, dd, dt, blockquote, figcaption, td, th, summary";
    pub const DEFAULT_MIN_TEXT_LENGTH: usize = 1;
    pub const DEFAULT_MAX_TEXT_LENGTH: usize = 5000;

    // 分段相关
    pub const DEFAULT_MAX_CHUNK_SIZE: usize = 1000;
    pub const DEFAULT_MIN_CHUNK_SIZE: usize = 0;
    pub const DEFAULT_CONTEXT_OVERLAP: usize = 30;
    pub const DEFAULT_SEGMENT_CACHE_SIZE: usize = 256;

    // 调度相关
    pub const DEFAULT_REFLOW_DEBOUNCE_MS: u64 = 300;
    pub const DEFAULT_MUTATION_DEBOUNCE_MS: u64 = 50;
    pub const DEFAULT_VISIBILITY_THRESHOLD: f32 = 0.1;

    // 注入标记
    pub const DEFAULT_HOST_TAG: &str = "web-translator-host";
    pub const DEFAULT_HOST_CLASS: &str = "web-translator-result";
    pub const STYLE_MARKER_ATTR: &str = "data-web-translator-style";

    // 默认API设置
    pub const DEFAULT_API_URL: &str = "http://localhost:1188/translate";
    pub const DEFAULT_TARGET_LANG: &str = "zh";
    pub const DEFAULT_SOURCE_LANG: &str = "auto";
    pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

    // 重试
    pub const DEFAULT_RETRY_ATTEMPTS: usize = 2;
    pub const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_millis(200);

    // 跳过的元素
    pub const SKIP_TAGS: &[&str] = &[
        "script", "style", "noscript", "template", "code", "pre", "kbd", "samp", "var",
        "textarea", "input", "select", "option", "button", "svg", "math", "canvas", "video",
        "audio", "iframe", "object", "embed", "img", "picture", "head", "title", "meta", "link",
        "base",
    ];

    // 文本可以跨越的行内标签
    pub const INLINE_TAGS: &[&str] = &[
        "a", "abbr", "b", "bdi", "bdo", "cite", "data", "del", "dfn", "em", "font", "i", "ins",
        "mark", "q", "rp", "rt", "ruby", "s", "small", "span", "strong", "sub", "sup", "time",
        "u", "wbr",
    ];

    // 配置文件搜索路径
    pub const CONFIG_PATHS: &[&str] = &[
        "web-translator.toml",
        ".web-translator.toml",
        "web-translator.json",
        "~/.config/web-translator/config.toml",
        "/etc/web-translator/config.toml",
    ];
}

/// 便利函数
pub fn config_file_exists() -> bool {
    constants::CONFIG_PATHS
        .iter()
        .any(|path| std::path::Path::new(shellexpand::tilde(path).as_ref()).exists())
}

/// 加载配置，失败时退回默认配置
pub fn load_engine_config() -> EngineConfig {
    match ConfigManager::new() {
        Ok(manager) => manager.into_config(),
        Err(e) => {
            tracing::warn!("配置加载失败，使用默认配置: {}", e);
            EngineConfig::default()
        }
    }
}
