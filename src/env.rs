//! 统一的环境变量管理系统
//!
//! 提供类型安全、可验证的环境变量访问，所有变量以 `WEB_TRANSLATOR_` 开头

use std::env;
use std::fmt;

use crate::translation::config::{DisplayMode, Trigger};

/// 环境变量解析错误
#[derive(Debug, Clone)]
pub struct EnvError {
    pub variable: String,
    pub message: String,
}

impl fmt::Display for EnvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Environment variable '{}': {}", self.variable, self.message)
    }
}

impl std::error::Error for EnvError {}

pub type EnvResult<T> = Result<T, EnvError>;

/// 环境变量访问器特性
pub trait EnvVar<T> {
    const NAME: &'static str;
    const DEFAULT: Option<T>;
    const DESCRIPTION: &'static str;

    fn parse(value: &str) -> EnvResult<T>;

    fn get() -> EnvResult<T> {
        match env::var(Self::NAME) {
            Ok(value) => Self::parse(&value),
            Err(_) => {
                if let Some(default) = Self::DEFAULT {
                    Ok(default)
                } else {
                    Err(EnvError {
                        variable: Self::NAME.to_string(),
                        message: "Required environment variable not set".to_string(),
                    })
                }
            }
        }
    }

    /// 只在变量被显式设置时返回值
    fn get_set() -> Option<EnvResult<T>> {
        env::var(Self::NAME).ok().map(|value| Self::parse(&value))
    }

    fn get_or_default(default: T) -> T {
        Self::get().unwrap_or(default)
    }
}

/// 核心环境变量定义
pub mod core {
    use super::*;

    /// 日志级别
    pub struct LogLevel;
    impl EnvVar<String> for LogLevel {
        const NAME: &'static str = "WEB_TRANSLATOR_LOG_LEVEL";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "Log level: trace, debug, info, warn, error";

        fn get() -> EnvResult<String> {
            match env::var(Self::NAME) {
                Ok(value) => Self::parse(&value),
                Err(_) => Ok("info".to_string()),
            }
        }

        fn parse(value: &str) -> EnvResult<String> {
            match value.to_lowercase().as_str() {
                "trace" | "debug" | "info" | "warn" | "error" => Ok(value.to_lowercase()),
                _ => Err(EnvError {
                    variable: Self::NAME.to_string(),
                    message: format!(
                        "Invalid log level '{}'. Use: trace, debug, info, warn, error",
                        value
                    ),
                }),
            }
        }
    }
}

/// 翻译服务相关环境变量
pub mod translation {
    use super::*;

    /// 翻译功能启用状态
    pub struct Enabled;
    impl EnvVar<bool> for Enabled {
        const NAME: &'static str = "WEB_TRANSLATOR_ENABLED";
        const DEFAULT: Option<bool> = Some(true);
        const DESCRIPTION: &'static str = "Enable translation rendering";

        fn parse(value: &str) -> EnvResult<bool> {
            parse_bool(value, Self::NAME)
        }
    }

    /// 目标语言
    pub struct TargetLang;
    impl EnvVar<String> for TargetLang {
        const NAME: &'static str = "WEB_TRANSLATOR_TARGET_LANG";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "Target language for translation (ISO 639-1 code)";

        fn parse(value: &str) -> EnvResult<String> {
            let lang = value.trim().to_lowercase();
            if lang.len() != 2 {
                return Err(EnvError {
                    variable: Self::NAME.to_string(),
                    message: "Language code must be 2 characters (ISO 639-1)".to_string(),
                });
            }
            Ok(lang)
        }
    }

    /// 源语言
    pub struct SourceLang;
    impl EnvVar<String> for SourceLang {
        const NAME: &'static str = "WEB_TRANSLATOR_SOURCE_LANG";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str =
            "Expected source language of page text ('auto' disables the language filter)";

        fn parse(value: &str) -> EnvResult<String> {
            let lang = value.trim().to_lowercase();
            if lang == "auto" || lang.len() == 2 {
                Ok(lang)
            } else {
                Err(EnvError {
                    variable: Self::NAME.to_string(),
                    message: "Language code must be 'auto' or 2 characters (ISO 639-1)"
                        .to_string(),
                })
            }
        }
    }

    /// DeepLX 接口地址
    pub struct ApiUrl;
    impl EnvVar<String> for ApiUrl {
        const NAME: &'static str = "WEB_TRANSLATOR_API_URL";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "DeepLX-compatible translation endpoint";

        fn parse(value: &str) -> EnvResult<String> {
            let url = value.trim();
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(EnvError {
                    variable: Self::NAME.to_string(),
                    message: "URL must start with http:// or https://".to_string(),
                });
            }
            Ok(url.to_string())
        }
    }
}

/// 规则相关环境变量
pub mod rule {
    use super::*;

    /// 选择器
    pub struct Selector;
    impl EnvVar<String> for Selector {
        const NAME: &'static str = "WEB_TRANSLATOR_SELECTOR";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "Semicolon-separated selector spec for candidate nodes";

        fn parse(value: &str) -> EnvResult<String> {
            if value.trim().is_empty() {
                return Err(EnvError {
                    variable: Self::NAME.to_string(),
                    message: "Selector must not be empty".to_string(),
                });
            }
            Ok(value.trim().to_string())
        }
    }

    /// 显示模式
    pub struct Mode;
    impl EnvVar<DisplayMode> for Mode {
        const NAME: &'static str = "WEB_TRANSLATOR_MODE";
        const DEFAULT: Option<DisplayMode> = Some(DisplayMode::Overlay);
        const DESCRIPTION: &'static str = "Display mode: overlay, replace";

        fn parse(value: &str) -> EnvResult<DisplayMode> {
            value.parse().map_err(|message| EnvError {
                variable: Self::NAME.to_string(),
                message,
            })
        }
    }

    /// 触发方式
    pub struct TriggerKind;
    impl EnvVar<Trigger> for TriggerKind {
        const NAME: &'static str = "WEB_TRANSLATOR_TRIGGER";
        const DEFAULT: Option<Trigger> = Some(Trigger::Scroll);
        const DESCRIPTION: &'static str = "Render trigger: scroll, open, hover, manual";

        fn parse(value: &str) -> EnvResult<Trigger> {
            value.parse().map_err(|message| EnvError {
                variable: Self::NAME.to_string(),
                message,
            })
        }
    }

    /// 单段最大字符数
    pub struct MaxChunkSize;
    impl EnvVar<usize> for MaxChunkSize {
        const NAME: &'static str = "WEB_TRANSLATOR_MAX_CHUNK_SIZE";
        const DEFAULT: Option<usize> = Some(1000);
        const DESCRIPTION: &'static str = "Maximum characters per segment";

        fn parse(value: &str) -> EnvResult<usize> {
            parse_positive_usize(value, Self::NAME, 1, 100_000)
        }
    }

    /// 是否附带上下文
    pub struct PreserveContext;
    impl EnvVar<bool> for PreserveContext {
        const NAME: &'static str = "WEB_TRANSLATOR_PRESERVE_CONTEXT";
        const DEFAULT: Option<bool> = Some(false);
        const DESCRIPTION: &'static str = "Send neighbouring segment text as context";

        fn parse(value: &str) -> EnvResult<bool> {
            parse_bool(value, Self::NAME)
        }
    }
}

/// 调度相关环境变量
pub mod setting {
    use super::*;

    /// 规则变更后的重排防抖（毫秒）
    pub struct ReflowDebounceMs;
    impl EnvVar<u64> for ReflowDebounceMs {
        const NAME: &'static str = "WEB_TRANSLATOR_REFLOW_DEBOUNCE_MS";
        const DEFAULT: Option<u64> = Some(300);
        const DESCRIPTION: &'static str = "Debounce before rebuilding all targets after a rule change";

        fn parse(value: &str) -> EnvResult<u64> {
            parse_positive_usize(value, Self::NAME, 0, 60_000).map(|ms| ms as u64)
        }
    }

    /// 文档变更的批处理防抖（毫秒）
    pub struct MutationDebounceMs;
    impl EnvVar<u64> for MutationDebounceMs {
        const NAME: &'static str = "WEB_TRANSLATOR_MUTATION_DEBOUNCE_MS";
        const DEFAULT: Option<u64> = Some(50);
        const DESCRIPTION: &'static str = "Debounce for batching inserted nodes";

        fn parse(value: &str) -> EnvResult<u64> {
            parse_positive_usize(value, Self::NAME, 0, 60_000).map(|ms| ms as u64)
        }
    }

    /// 译文宿主标签
    pub struct HostTag;
    impl EnvVar<String> for HostTag {
        const NAME: &'static str = "WEB_TRANSLATOR_HOST_TAG";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "Tag name of injected translation host elements";

        fn parse(value: &str) -> EnvResult<String> {
            let tag = value.trim().to_ascii_lowercase();
            if tag.is_empty() || !tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
                return Err(EnvError {
                    variable: Self::NAME.to_string(),
                    message: format!("Invalid tag name '{}'", value),
                });
            }
            Ok(tag)
        }
    }
}

fn parse_bool(value: &str, var_name: &str) -> EnvResult<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" | "enabled" => Ok(true),
        "false" | "0" | "no" | "off" | "disabled" => Ok(false),
        _ => Err(EnvError {
            variable: var_name.to_string(),
            message: format!(
                "Invalid boolean value '{}'. Use: true/false, 1/0, yes/no, on/off, enabled/disabled",
                value
            ),
        }),
    }
}

fn parse_positive_usize(value: &str, var_name: &str, min: usize, max: usize) -> EnvResult<usize> {
    let num: usize = value.trim().parse().map_err(|_| EnvError {
        variable: var_name.to_string(),
        message: "Must be a valid positive number".to_string(),
    })?;

    if num < min {
        return Err(EnvError {
            variable: var_name.to_string(),
            message: format!("Value {} is below minimum {}", num, min),
        });
    }

    if num > max {
        return Err(EnvError {
            variable: var_name.to_string(),
            message: format!("Value {} exceeds maximum {}", num, max),
        });
    }

    Ok(num)
}

/// 环境变量文档生成器
pub fn generate_env_docs() -> String {
    let entries: [(&str, &str); 13] = [
        (core::LogLevel::NAME, core::LogLevel::DESCRIPTION),
        (translation::Enabled::NAME, translation::Enabled::DESCRIPTION),
        (translation::TargetLang::NAME, translation::TargetLang::DESCRIPTION),
        (translation::SourceLang::NAME, translation::SourceLang::DESCRIPTION),
        (translation::ApiUrl::NAME, translation::ApiUrl::DESCRIPTION),
        (rule::Selector::NAME, rule::Selector::DESCRIPTION),
        (rule::Mode::NAME, rule::Mode::DESCRIPTION),
        (rule::TriggerKind::NAME, rule::TriggerKind::DESCRIPTION),
        (rule::MaxChunkSize::NAME, rule::MaxChunkSize::DESCRIPTION),
        (rule::PreserveContext::NAME, rule::PreserveContext::DESCRIPTION),
        (setting::ReflowDebounceMs::NAME, setting::ReflowDebounceMs::DESCRIPTION),
        (setting::MutationDebounceMs::NAME, setting::MutationDebounceMs::DESCRIPTION),
        (setting::HostTag::NAME, setting::HostTag::DESCRIPTION),
    ];

    let mut docs = String::from("# Environment Variables\n\n");
    for (name, description) in entries {
        docs.push_str(&format!("- `{}`: {}\n", name, description));
    }
    docs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boolean_parsing() {
        assert!(translation::Enabled::parse("true").unwrap());
        assert!(translation::Enabled::parse("YES").unwrap());
        assert!(!translation::Enabled::parse("off").unwrap());
        assert!(translation::Enabled::parse("maybe").is_err());
    }

    #[test]
    fn test_mode_and_trigger_parsing() {
        assert_eq!(rule::Mode::parse("Replace").unwrap(), DisplayMode::Replace);
        assert!(rule::Mode::parse("sideways").is_err());
        assert_eq!(rule::TriggerKind::parse("hover").unwrap(), Trigger::Hover);
        assert!(rule::TriggerKind::parse("never").is_err());
    }

    #[test]
    fn test_numeric_validation() {
        assert_eq!(rule::MaxChunkSize::parse("200").unwrap(), 200);
        assert!(rule::MaxChunkSize::parse("0").is_err());
        assert!(rule::MaxChunkSize::parse("abc").is_err());
        assert_eq!(setting::MutationDebounceMs::parse("0").unwrap(), 0);
    }

    #[test]
    fn test_language_and_url_validation() {
        assert_eq!(translation::SourceLang::parse("AUTO").unwrap(), "auto");
        assert!(translation::TargetLang::parse("chinese").is_err());
        assert!(translation::ApiUrl::parse("http://localhost:1188/translate").is_ok());
        assert!(translation::ApiUrl::parse("ftp://example.com").is_err());
        assert!(setting::HostTag::parse("my host").is_err());
    }

    #[test]
    fn test_env_docs_list_all_variables() {
        let docs = generate_env_docs();
        assert!(docs.contains("WEB_TRANSLATOR_SELECTOR"));
        assert!(docs.contains("WEB_TRANSLATOR_LOG_LEVEL"));
    }
}
