// 集成测试公共模块
//
// 提供文档构造、测试用翻译服务、语言识别桩和断言辅助

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use async_trait::async_trait;
use markup5ever_rcdom::{Handle, RcDom};

use web_translator::parsers::html::dom::{
    find_elements, get_node_attr, html_to_dom, is_element_named, text_content,
};
use web_translator::parsers::serialize_document;
use web_translator::translation::{
    DisplayMode, EngineConfig, LanguageClassifier, LanguageGuess, RenderController,
    RetryPolicy, Rule, TranslationError, TranslationProvider, TranslationResult, Trigger,
};

pub const HOST_TAG: &str = "web-translator-host";

// ============================================================================
// 文档辅助
// ============================================================================

pub fn parse(html: &str) -> RcDom {
    html_to_dom(html.as_bytes(), "utf-8").expect("HTML should parse")
}

pub fn by_id(root: &Handle, id: &str) -> Handle {
    find_elements(root, &|n: &Handle| get_node_attr(n, "id").as_deref() == Some(id))
        .into_iter()
        .next()
        .unwrap_or_else(|| panic!("no element with id {}", id))
}

pub fn text(node: &Handle) -> String {
    text_content(node, &|_| false)
}

/// 节点下的全部宿主元素
pub fn hosts_under(node: &Handle) -> Vec<Handle> {
    find_elements(node, &|n: &Handle| is_element_named(n, HOST_TAG))
}

pub fn serialize(document: &Handle) -> String {
    String::from_utf8(serialize_document(document, "").expect("serialize")).expect("utf-8")
}

// ============================================================================
// 配置构建
// ============================================================================

/// 测试配置构建器
pub struct TestConfigBuilder {
    config: EngineConfig,
}

impl TestConfigBuilder {
    pub fn new(selector: &str) -> Self {
        let mut config = EngineConfig::default();
        config.rule = Rule {
            selector: selector.to_string(),
            trigger: Trigger::Manual,
            ..Rule::default()
        };
        Self { config }
    }

    pub fn mode(mut self, mode: DisplayMode) -> Self {
        self.config.rule.mode = mode;
        self
    }

    pub fn trigger(mut self, trigger: Trigger) -> Self {
        self.config.rule.trigger = trigger;
        self
    }

    pub fn source_lang(mut self, lang: &str) -> Self {
        self.config.provider.source_lang = lang.to_string();
        self
    }

    pub fn reflow_debounce_ms(mut self, ms: u64) -> Self {
        self.config.setting.reflow_debounce_ms = ms;
        self
    }

    pub fn mutation_debounce_ms(mut self, ms: u64) -> Self {
        self.config.setting.mutation_debounce_ms = ms;
        self
    }

    pub fn build(self) -> EngineConfig {
        self.config
    }
}

/// 文档加控制器，常用组合
pub struct TestEnvironment {
    pub dom: RcDom,
    pub controller: RenderController,
    pub provider: Rc<DelayedProvider>,
}

impl TestEnvironment {
    pub fn new(html: &str, config: EngineConfig) -> Self {
        let dom = parse(html);
        let provider = Rc::new(DelayedProvider::new("X:"));
        let controller = RenderController::builder(dom.document.clone(), config, provider.clone())
            .retry(RetryPolicy::none())
            .build()
            .expect("controller should build");
        Self {
            dom,
            controller,
            provider,
        }
    }

    pub fn root(&self) -> Handle {
        self.dom.document.clone()
    }

    pub fn node(&self, id: &str) -> Handle {
        by_id(&self.dom.document, id)
    }
}

// ============================================================================
// 测试用翻译服务
// ============================================================================

/// 返回 `prefix + text`，可以为指定文本设置延迟
pub struct DelayedProvider {
    prefix: String,
    delays: RefCell<HashMap<String, Duration>>,
    calls: Cell<usize>,
    seen: RefCell<Vec<String>>,
}

impl DelayedProvider {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            delays: RefCell::new(HashMap::new()),
            calls: Cell::new(0),
            seen: RefCell::new(Vec::new()),
        }
    }

    pub fn delay(&self, text: &str, delay: Duration) {
        self.delays.borrow_mut().insert(text.to_string(), delay);
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }

    /// 收到过的请求文本
    pub fn seen(&self) -> Vec<String> {
        self.seen.borrow().clone()
    }
}

#[async_trait(?Send)]
impl TranslationProvider for DelayedProvider {
    async fn translate(&self, text: &str) -> TranslationResult<String> {
        self.calls.set(self.calls.get() + 1);
        self.seen.borrow_mut().push(text.to_string());
        let delay = self.delays.borrow().get(text).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(format!("{}{}", self.prefix, text))
    }
}

/// 前 `failures` 次调用失败
pub struct FlakyProvider {
    failures: Cell<usize>,
    retryable: bool,
    calls: Cell<usize>,
}

impl FlakyProvider {
    pub fn new(failures: usize, retryable: bool) -> Self {
        Self {
            failures: Cell::new(failures),
            retryable,
            calls: Cell::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

#[async_trait(?Send)]
impl TranslationProvider for FlakyProvider {
    async fn translate(&self, text: &str) -> TranslationResult<String> {
        self.calls.set(self.calls.get() + 1);
        if self.failures.get() > 0 {
            self.failures.set(self.failures.get() - 1);
            return Err(if self.retryable {
                TranslationError::NetworkError("connection reset".to_string())
            } else {
                TranslationError::ConfigError("invalid api key".to_string())
            });
        }
        Ok(format!("OK:{}", text))
    }
}

// ============================================================================
// 语言识别桩
// ============================================================================

/// 文本包含关键字时给出可靠的语言判断，否则返回未知
pub struct KeywordClassifier {
    rules: Vec<(String, String)>,
}

impl KeywordClassifier {
    pub fn new(rules: &[(&str, &str)]) -> Self {
        Self {
            rules: rules
                .iter()
                .map(|(keyword, lang)| (keyword.to_string(), lang.to_string()))
                .collect(),
        }
    }
}

#[async_trait(?Send)]
impl LanguageClassifier for KeywordClassifier {
    async fn detect(&self, text: &str) -> TranslationResult<LanguageGuess> {
        Ok(self
            .rules
            .iter()
            .find(|(keyword, _)| text.contains(keyword.as_str()))
            .map(|(_, lang)| LanguageGuess::reliable(lang))
            .unwrap_or_else(LanguageGuess::unknown))
    }
}

/// 总是失败的识别器
pub struct BrokenClassifier;

#[async_trait(?Send)]
impl LanguageClassifier for BrokenClassifier {
    async fn detect(&self, _text: &str) -> TranslationResult<LanguageGuess> {
        Err(TranslationError::ClassifierError("model unavailable".to_string()))
    }
}

// ============================================================================
// 断言辅助
// ============================================================================

pub struct AssertionHelper;

impl AssertionHelper {
    /// 节点下恰好一个宿主元素，返回它
    pub fn single_host(node: &Handle) -> Handle {
        let hosts = hosts_under(node);
        assert_eq!(hosts.len(), 1, "expected exactly one host marker");
        hosts[0].clone()
    }

    pub fn no_hosts(node: &Handle) {
        assert!(hosts_under(node).is_empty(), "expected no host markers");
    }
}
