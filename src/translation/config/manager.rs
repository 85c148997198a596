//! 配置管理器
//!
//! 提供统一的配置接口，支持文件配置、环境变量和默认值

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::constants;
use super::rule::{Rule, Setting};
use crate::translation::error::{TranslationError, TranslationResult};

/// 翻译服务配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub enabled: bool,
    pub api_url: String,
    pub source_lang: String,
    pub target_lang: String,
    pub timeout_secs: u64,
    pub retry_attempts: usize,
    pub retry_base_delay_ms: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_url: constants::DEFAULT_API_URL.to_string(),
            source_lang: constants::DEFAULT_SOURCE_LANG.to_string(),
            target_lang: constants::DEFAULT_TARGET_LANG.to_string(),
            timeout_secs: constants::DEFAULT_REQUEST_TIMEOUT.as_secs(),
            retry_attempts: constants::DEFAULT_RETRY_ATTEMPTS,
            retry_base_delay_ms: constants::DEFAULT_RETRY_BASE_DELAY.as_millis() as u64,
        }
    }
}

impl ProviderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }
}

/// 引擎完整配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub rule: Rule,
    pub setting: Setting,
    pub provider: ProviderConfig,
}

impl EngineConfig {
    /// 验证配置
    pub fn validate(&self) -> TranslationResult<()> {
        let segment = &self.rule.segment;
        if segment.max_chunk_size == 0 {
            return Err(TranslationError::ConfigError(
                "分段最大长度不能为0".to_string(),
            ));
        }

        if segment.min_chunk_size > segment.max_chunk_size {
            return Err(TranslationError::ConfigError(format!(
                "分段最小长度 {} 大于最大长度 {}",
                segment.min_chunk_size, segment.max_chunk_size
            )));
        }

        if segment.preserve_context && segment.context_overlap == 0 {
            return Err(TranslationError::ConfigError(
                "启用上下文时重叠长度不能为0".to_string(),
            ));
        }

        if self.rule.min_text_length > self.rule.max_text_length {
            return Err(TranslationError::ConfigError(format!(
                "文本最小长度 {} 大于最大长度 {}",
                self.rule.min_text_length, self.rule.max_text_length
            )));
        }

        if self.setting.host_tag.trim().is_empty() {
            return Err(TranslationError::ConfigError("宿主标签不能为空".to_string()));
        }

        if !(0.0..=1.0).contains(&self.setting.visibility_threshold) {
            return Err(TranslationError::ConfigError(
                "可见性阈值必须在 0 到 1 之间".to_string(),
            ));
        }

        Ok(())
    }

    /// 应用环境变量覆盖
    pub fn apply_env_overrides(&mut self) {
        use crate::env::{rule, setting, translation, EnvVar};

        // 解析失败的变量只记录警告，保留原值
        macro_rules! apply {
            ($var:ty, $target:expr) => {
                match <$var>::get_set() {
                    Some(Ok(value)) => $target = value,
                    Some(Err(e)) => tracing::warn!("忽略环境变量: {}", e),
                    None => {}
                }
            };
        }

        apply!(translation::Enabled, self.provider.enabled);
        apply!(translation::TargetLang, self.provider.target_lang);
        apply!(translation::SourceLang, self.provider.source_lang);
        apply!(translation::ApiUrl, self.provider.api_url);

        apply!(rule::Selector, self.rule.selector);
        apply!(rule::Mode, self.rule.mode);
        apply!(rule::TriggerKind, self.rule.trigger);
        apply!(rule::MaxChunkSize, self.rule.segment.max_chunk_size);
        apply!(rule::PreserveContext, self.rule.segment.preserve_context);

        apply!(setting::ReflowDebounceMs, self.setting.reflow_debounce_ms);
        apply!(setting::MutationDebounceMs, self.setting.mutation_debounce_ms);
        apply!(setting::HostTag, self.setting.host_tag);
    }
}

/// 配置管理器
pub struct ConfigManager {
    config: EngineConfig,
}

impl ConfigManager {
    /// 按搜索路径加载配置
    pub fn new() -> TranslationResult<Self> {
        Self::load_dotenv();
        let mut config = Self::load_config()?;
        config.apply_env_overrides();
        config.validate()?;

        Ok(Self { config })
    }

    /// 从指定文件加载配置
    pub fn from_file(path: &str) -> TranslationResult<Self> {
        Self::load_dotenv();
        let expanded_path = shellexpand::tilde(path);
        let mut config = Self::load_from_file(&expanded_path)?;
        config.apply_env_overrides();
        config.validate()?;

        Ok(Self { config })
    }

    /// 获取配置
    pub fn get_config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn into_config(self) -> EngineConfig {
        self.config
    }

    fn load_config() -> TranslationResult<EngineConfig> {
        for path in constants::CONFIG_PATHS {
            let expanded_path = shellexpand::tilde(path);
            if Path::new(expanded_path.as_ref()).exists() {
                tracing::info!("加载配置文件: {}", expanded_path);
                return Self::load_from_file(&expanded_path);
            }
        }

        tracing::info!("未找到配置文件，使用默认配置");
        Ok(EngineConfig::default())
    }

    fn load_from_file(path: &str) -> TranslationResult<EngineConfig> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| TranslationError::ConfigError(format!("读取配置文件失败: {}", e)))?;

        if path.ends_with(".json") {
            serde_json::from_str(&content)
                .map_err(|e| TranslationError::ConfigError(format!("解析JSON配置失败: {}", e)))
        } else {
            toml::from_str(&content)
                .map_err(|e| TranslationError::ConfigError(format!("解析TOML配置失败: {}", e)))
        }
    }

    /// 加载 .env 文件
    pub fn load_dotenv() {
        let env_files = [".env.local", ".env"];

        for env_file in &env_files {
            if Path::new(env_file).exists() && dotenv::from_filename(env_file).is_ok() {
                tracing::info!("已加载环境变量文件: {}", env_file);
                break;
            }
        }
    }

    /// 生成示例配置文件
    pub fn generate_example_config(path: &str) -> TranslationResult<()> {
        let config = EngineConfig::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| TranslationError::ConfigError(format!("序列化配置失败: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| TranslationError::ConfigError(format!("写入配置文件失败: {}", e)))?;

        Ok(())
    }
}
