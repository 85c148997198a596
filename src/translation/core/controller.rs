//! 渲染控制器
//!
//! 每个目标节点的状态机：
//!
//! ```text
//! 未注册 → Registered → Rendering → Rendered
//!                  ↑          │ ↺ 新的渲染覆盖旧的
//!                  └──────────┘ 失败或没有可翻译文本
//! ```
//!
//! 所有状态都挂在控制器实例上，运行在单线程的 `LocalSet` 中。触发源回调会在
//! 本地任务集上派生渲染任务；渲染开始前写入的令牌在全部译文返回后再比对一次，
//! 被更新的渲染覆盖时直接丢弃结果，不触碰文档。

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::time::Duration;

use futures::future::join_all;
use futures::FutureExt;
use markup5ever_rcdom::Handle;
use tokio::task::JoinHandle;

use super::provider::{RetryPolicy, TranslationProvider};
use super::triggers::{FeedFactory, FeedOptions, TriggerFeeds};
use super::writer;
use crate::parsers::html::dom::{
    get_node_name, is_blank, remove_from_parent, text_content, tree_root, NodeRef,
};
use crate::parsers::html::fragments::FragmentRegistry;
use crate::parsers::html::selector::SelectorSpec;
use crate::parsers::html::style::{InlineStyleResolver, StyleResolver};
use crate::translation::config::{
    DisplayMode, EngineConfig, Rule, RuleCallbacks, Setting, SettingsStore, StaticSettings,
    TextStyle, Trigger, UserSettings,
};
use crate::translation::error::{helpers, ErrorStats, TranslationError, TranslationResult};
use crate::translation::pipeline::{
    BoundaryClassifier, ContentLanguageFilter, LanguageClassifier, Segment, TargetCollector,
    TextSegmenter, WhatlangClassifier,
};
use crate::translation::storage::{
    CacheStats, ContentBackup, InFlightMap, RenderToken, TargetCache, TargetState,
    TranslationCache,
};

/// 一次渲染的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderOutcome {
    /// 译文已写回
    Rendered { segments: usize },
    /// 没有可翻译的文本，节点保持 Registered
    Empty,
    /// 被同一节点上更新的渲染覆盖，结果已丢弃
    Superseded,
    NotRegistered,
    /// 翻译失败，节点保持 Registered，可以再次触发
    Failed(TranslationError),
}

impl RenderOutcome {
    pub fn is_rendered(&self) -> bool {
        matches!(self, RenderOutcome::Rendered { .. })
    }
}

/// 控制器统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControllerStats {
    pub registered: u64,
    pub renders_started: u64,
    pub renders_completed: u64,
    pub renders_superseded: u64,
    pub renders_failed: u64,
    pub renders_empty: u64,
    pub provider_calls: u64,
    pub cache_hits: u64,
    pub dedup_joins: u64,
    pub reflows: u64,
}

// ============================================================================
// 由配置派生的组件
// ============================================================================

/// 随规则变化整体重建的组件
struct Pipeline {
    setting: Rc<Setting>,
    classifier: BoundaryClassifier,
    segmenter: TextSegmenter,
    collector: TargetCollector,
    selector: SelectorSpec,
}

impl Pipeline {
    fn build(
        config: &EngineConfig,
        style: Rc<dyn StyleResolver>,
        fragments: Rc<FragmentRegistry>,
    ) -> Self {
        let setting = Rc::new(config.setting.clone());
        let classifier = BoundaryClassifier::new(setting.clone(), style);
        Self {
            setting,
            segmenter: TextSegmenter::new(
                config.rule.segment.clone(),
                classifier.clone(),
                fragments.clone(),
            ),
            collector: TargetCollector::new(classifier.clone(), fragments),
            classifier,
            selector: SelectorSpec::parse_lenient(&config.rule.selector),
        }
    }
}

// ============================================================================
// 构建器
// ============================================================================

pub struct ControllerBuilder {
    root: Handle,
    config: EngineConfig,
    provider: Rc<dyn TranslationProvider>,
    classifier: Option<Rc<dyn LanguageClassifier>>,
    style: Option<Rc<dyn StyleResolver>>,
    fragments: Option<Rc<FragmentRegistry>>,
    settings: Option<Rc<dyn SettingsStore>>,
    callbacks: RuleCallbacks,
    visibility: Option<FeedFactory>,
    hover: Option<FeedFactory>,
    retry: Option<RetryPolicy>,
}

impl ControllerBuilder {
    /// 内容语言识别，默认使用 whatlang
    pub fn classifier(mut self, classifier: Rc<dyn LanguageClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// 布局信息来源，默认只看内联样式
    pub fn style_resolver(mut self, style: Rc<dyn StyleResolver>) -> Self {
        self.style = Some(style);
        self
    }

    pub fn fragments(mut self, fragments: Rc<FragmentRegistry>) -> Self {
        self.fragments = Some(fragments);
        self
    }

    pub fn settings(mut self, settings: Rc<dyn SettingsStore>) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn callbacks(mut self, callbacks: RuleCallbacks) -> Self {
        self.callbacks = callbacks;
        self
    }

    pub fn visibility_feed<F>(mut self, factory: F) -> Self
    where
        F: Fn(&FeedOptions) -> Rc<dyn super::triggers::TriggerFeed> + 'static,
    {
        self.visibility = Some(Box::new(factory));
        self
    }

    pub fn hover_feed<F>(mut self, factory: F) -> Self
    where
        F: Fn(&FeedOptions) -> Rc<dyn super::triggers::TriggerFeed> + 'static,
    {
        self.hover = Some(Box::new(factory));
        self
    }

    /// 覆盖配置中的重试策略
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn build(self) -> TranslationResult<RenderController> {
        self.config.validate()?;

        let style = self
            .style
            .unwrap_or_else(|| Rc::new(InlineStyleResolver::new()) as Rc<dyn StyleResolver>);
        let fragments = self
            .fragments
            .unwrap_or_else(|| Rc::new(FragmentRegistry::new()));
        let classifier = self
            .classifier
            .unwrap_or_else(|| Rc::new(WhatlangClassifier) as Rc<dyn LanguageClassifier>);
        let language_filter =
            ContentLanguageFilter::new(classifier, &self.config.provider.source_lang);
        let retry = self
            .retry
            .unwrap_or_else(|| RetryPolicy::from_config(&self.config.provider));
        let pipeline = Pipeline::build(&self.config, style.clone(), fragments.clone());

        tracing::debug!(
            "创建渲染控制器: 模式 {}, 触发 {:?}, 选择器 {}",
            self.config.rule.mode,
            self.config.rule.trigger,
            self.config.rule.selector
        );

        Ok(RenderController {
            inner: Rc::new(ControllerInner {
                root: self.root,
                config: RefCell::new(self.config),
                pipeline: RefCell::new(Rc::new(pipeline)),
                style,
                fragments,
                provider: self.provider,
                language_filter,
                retry,
                settings_store: self
                    .settings
                    .unwrap_or_else(|| Rc::new(StaticSettings::default()) as Rc<dyn SettingsStore>),
                user_settings: RefCell::new(UserSettings::default()),
                callbacks: self.callbacks,
                feeds: TriggerFeeds::new(self.visibility, self.hover),
                targets: RefCell::new(HashMap::new()),
                hosts: RefCell::new(HashMap::new()),
                stylesheets: RefCell::new(HashMap::new()),
                translations: TranslationCache::new(),
                in_flight: InFlightMap::new(),
                next_token: Cell::new(0),
                generation: Cell::new(0),
                stats: Cell::new(ControllerStats::default()),
                errors: RefCell::new(ErrorStats::default()),
                tasks: RefCell::new(Vec::new()),
                pending_reflow: RefCell::new(None),
                pending_rule: RefCell::new(None),
                reflowing: Cell::new(false),
            }),
        })
    }
}

// ============================================================================
// 控制器
// ============================================================================

struct ControllerInner {
    root: Handle,
    config: RefCell<EngineConfig>,
    pipeline: RefCell<Rc<Pipeline>>,
    style: Rc<dyn StyleResolver>,
    fragments: Rc<FragmentRegistry>,
    provider: Rc<dyn TranslationProvider>,
    language_filter: ContentLanguageFilter,
    retry: RetryPolicy,
    settings_store: Rc<dyn SettingsStore>,
    user_settings: RefCell<UserSettings>,
    callbacks: RuleCallbacks,
    feeds: TriggerFeeds,
    targets: RefCell<HashMap<NodeRef, TargetCache>>,
    /// 叠加模式下每个目标的宿主元素
    hosts: RefCell<HashMap<NodeRef, Handle>>,
    /// 文档根或片段根 → 注入的样式表
    stylesheets: RefCell<HashMap<NodeRef, Handle>>,
    translations: TranslationCache,
    in_flight: InFlightMap,
    next_token: Cell<u64>,
    /// 每次拆除加一，拆除前发起的翻译不再写入缓存
    generation: Cell<u64>,
    stats: Cell<ControllerStats>,
    errors: RefCell<ErrorStats>,
    tasks: RefCell<Vec<JoinHandle<()>>>,
    pending_reflow: RefCell<Option<JoinHandle<()>>>,
    pending_rule: RefCell<Option<Rule>>,
    reflowing: Cell<bool>,
}

/// 渲染控制器，克隆开销很小，所有克隆共享同一份状态
#[derive(Clone)]
pub struct RenderController {
    inner: Rc<ControllerInner>,
}

impl RenderController {
    pub fn builder(
        root: Handle,
        config: EngineConfig,
        provider: Rc<dyn TranslationProvider>,
    ) -> ControllerBuilder {
        ControllerBuilder {
            root,
            config,
            provider,
            classifier: None,
            style: None,
            fragments: None,
            settings: None,
            callbacks: RuleCallbacks::default(),
            visibility: None,
            hover: None,
            retry: None,
        }
    }

    // ------------------------------------------------------------------
    // 查询
    // ------------------------------------------------------------------

    pub fn root(&self) -> &Handle {
        &self.inner.root
    }

    pub fn fragments(&self) -> &Rc<FragmentRegistry> {
        &self.inner.fragments
    }

    pub fn config(&self) -> EngineConfig {
        self.inner.config.borrow().clone()
    }

    pub fn stats(&self) -> ControllerStats {
        self.inner.stats.get()
    }

    /// 渲染失败按类别和严重程度的统计
    pub fn error_stats(&self) -> ErrorStats {
        self.inner.errors.borrow().clone()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.inner.translations.get_stats()
    }

    pub fn state_of(&self, node: &Handle) -> Option<TargetState> {
        self.inner
            .targets
            .borrow()
            .get(&NodeRef::new(node))
            .map(|entry| entry.state)
    }

    pub fn is_registered(&self, node: &Handle) -> bool {
        self.inner.targets.borrow().contains_key(&NodeRef::new(node))
    }

    pub fn registered_count(&self) -> usize {
        self.inner.targets.borrow().len()
    }

    /// 叠加模式下节点当前的宿主元素
    pub fn host_of(&self, node: &Handle) -> Option<Handle> {
        self.inner.hosts.borrow().get(&NodeRef::new(node)).cloned()
    }

    pub fn is_reflowing(&self) -> bool {
        self.inner.reflowing.get()
    }

    pub fn has_pending_reflow(&self) -> bool {
        self.inner.pending_reflow.borrow().is_some()
    }

    /// 节点是否为引擎注入的宿主元素或样式表
    pub fn is_engine_marker(&self, node: &Handle) -> bool {
        self.pipeline().classifier.is_host_marker(node) || writer::is_injected_stylesheet(node)
    }

    fn feed_options(&self) -> FeedOptions {
        FeedOptions::from(self.pipeline().setting.as_ref())
    }

    fn pipeline(&self) -> Rc<Pipeline> {
        self.inner.pipeline.borrow().clone()
    }

    fn effective_mode(&self) -> DisplayMode {
        let rule_mode = self.inner.config.borrow().rule.mode;
        self.inner.user_settings.borrow().mode.unwrap_or(rule_mode)
    }

    fn effective_style(&self) -> TextStyle {
        let rule_style = self.inner.config.borrow().rule.style;
        self.inner.user_settings.borrow().style.unwrap_or(rule_style)
    }

    fn bump<F: FnOnce(&mut ControllerStats)>(&self, update: F) {
        let mut stats = self.inner.stats.get();
        update(&mut stats);
        self.inner.stats.set(stats);
    }

    fn issue_token(&self) -> RenderToken {
        let next = self.inner.next_token.get() + 1;
        self.inner.next_token.set(next);
        RenderToken(next)
    }

    fn is_current(&self, key: &NodeRef, token: RenderToken) -> bool {
        self.inner
            .targets
            .borrow()
            .get(key)
            .is_some_and(|entry| entry.last_render_token == Some(token))
    }

    /// 令牌仍然有效时更新状态
    fn settle(&self, key: &NodeRef, token: RenderToken, state: TargetState) -> bool {
        let mut targets = self.inner.targets.borrow_mut();
        match targets.get_mut(key) {
            Some(entry) if entry.last_render_token == Some(token) => {
                entry.state = state;
                true
            }
            _ => false,
        }
    }

    // ------------------------------------------------------------------
    // 注册
    // ------------------------------------------------------------------

    /// 读取用户设置并注册整个文档中的候选节点，返回新注册的数量
    pub fn start(&self) -> usize {
        let settings = self.inner.settings_store.load();
        let enabled = settings.enabled && self.inner.config.borrow().provider.enabled;
        *self.inner.user_settings.borrow_mut() = settings;
        if !enabled {
            tracing::info!("翻译已禁用，跳过注册");
            return 0;
        }
        let root = self.inner.root.clone();
        let registered = self.scan(&root);
        tracing::info!("初始注册完成: {} 个目标节点", registered);
        registered
    }

    /// 在子树中收集候选并注册新节点，返回新注册的数量
    pub fn scan(&self, subtree: &Handle) -> usize {
        if !self.inner.user_settings.borrow().enabled {
            return 0;
        }
        let pipeline = self.pipeline();
        let (candidates, _) = pipeline
            .collector
            .collect_with_stats(subtree, &pipeline.selector);
        candidates
            .iter()
            .filter(|node| self.register(node))
            .count()
    }

    /// 注册单个节点并按规则接上触发方式；已注册时返回 false
    pub fn register(&self, node: &Handle) -> bool {
        let key = NodeRef::new(node);
        {
            let mut targets = self.inner.targets.borrow_mut();
            if targets.contains_key(&key) {
                return false;
            }
            targets.insert(key, TargetCache::new());
        }
        self.bump(|s| s.registered += 1);

        let trigger = self.inner.config.borrow().rule.trigger;
        match trigger {
            Trigger::Open => self.spawn_render(node),
            Trigger::Manual => {}
            Trigger::Scroll => {
                if !self.inner.feeds.observe_visibility(node, &self.feed_options()) {
                    tracing::debug!("没有可见性触发源，立即渲染");
                    self.spawn_render(node);
                }
            }
            Trigger::Hover => {
                if !self.inner.feeds.observe_hover(node, &self.feed_options()) {
                    tracing::debug!("没有悬停触发源，立即渲染");
                    self.spawn_render(node);
                }
            }
        }
        true
    }

    // ------------------------------------------------------------------
    // 触发
    // ------------------------------------------------------------------

    /// 显式触发渲染；节点未注册时返回 false
    pub fn trigger(&self, node: &Handle) -> bool {
        if !self.is_registered(node) {
            return false;
        }
        self.spawn_render(node);
        true
    }

    /// 可见性触发源回调，只触发一次
    pub fn on_visible(&self, node: &Handle) -> bool {
        self.inner.feeds.unobserve_visibility(node);
        self.trigger(node)
    }

    /// 悬停触发源回调，只触发一次
    pub fn on_hover(&self, node: &Handle) -> bool {
        self.inner.feeds.unobserve_hover(node);
        self.trigger(node)
    }

    /// 节点是否还在等待可见性或悬停
    pub fn is_waiting_for_trigger(&self, node: &Handle) -> bool {
        self.inner.feeds.is_waiting(node)
    }

    /// 在本地任务集上派生渲染任务，必须在 `LocalSet` 内调用
    fn spawn_render(&self, node: &Handle) {
        let this = self.clone();
        let node = node.clone();
        let handle = tokio::task::spawn_local(async move {
            this.render(&node).await;
        });
        let mut tasks = self.inner.tasks.borrow_mut();
        tasks.retain(|task| !task.is_finished());
        tasks.push(handle);
    }

    /// 等待所有已派生的渲染与重排任务结束
    pub async fn wait_idle(&self) {
        loop {
            let mut pending: Vec<JoinHandle<()>> = self.inner.tasks.borrow_mut().drain(..).collect();
            if let Some(reflow) = self.inner.pending_reflow.borrow_mut().take() {
                pending.push(reflow);
            }
            if pending.is_empty() {
                return;
            }
            for task in pending {
                if let Err(e) = task.await {
                    if !e.is_cancelled() {
                        tracing::error!("渲染任务异常退出: {}", e);
                    }
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // 渲染
    // ------------------------------------------------------------------

    /// 渲染一个已注册的节点
    pub async fn render(&self, node: &Handle) -> RenderOutcome {
        let key = NodeRef::new(node);
        let token = self.issue_token();
        let backup = {
            let mut targets = self.inner.targets.borrow_mut();
            let Some(entry) = targets.get_mut(&key) else {
                return RenderOutcome::NotRegistered;
            };
            entry.last_render_token = Some(token);
            entry.state = TargetState::Rendering;
            entry.content_backup.clone()
        };
        self.bump(|s| s.renders_started += 1);

        let pipeline = self.pipeline();
        let mode = self.effective_mode();

        // 重复渲染前先回到原始状态
        self.remove_host(node, &pipeline.setting);
        if let Some(backup) = backup.as_ref() {
            backup.restore();
        }

        let raw = text_content(node, &|n: &Handle| pipeline.classifier.is_host_marker(n));
        if is_blank(&raw) {
            self.settle(&key, token, TargetState::Registered);
            self.bump(|s| s.renders_empty += 1);
            return RenderOutcome::Empty;
        }

        let exclude = self.exclusions_for(node, &pipeline);

        if mode == DisplayMode::Replace && backup.is_none() {
            let snapshot = ContentBackup::capture(node, &|n: &Handle| {
                pipeline.classifier.is_host_marker(n) || exclude.contains(&NodeRef::new(n))
            });
            if let Some(entry) = self.inner.targets.borrow_mut().get_mut(&key) {
                entry.content_backup = Some(snapshot);
            }
        }

        let segments = pipeline
            .segmenter
            .segment(node, (!exclude.is_empty()).then_some(&exclude));
        let (min_len, max_len) = {
            let config = self.inner.config.borrow();
            (config.rule.min_text_length, config.rule.max_text_length)
        };
        let segments: Vec<Segment> = segments
            .into_iter()
            .filter(|segment| {
                let len = segment.char_len();
                len >= min_len && len <= max_len
            })
            .collect();
        let segments = self
            .inner
            .language_filter
            .filter_by_source_language(segments)
            .await;

        if segments.is_empty() {
            self.settle(&key, token, TargetState::Registered);
            self.bump(|s| s.renders_empty += 1);
            return RenderOutcome::Empty;
        }

        if let Some(callback) = self.inner.callbacks.on_render_start.as_ref() {
            callback(node);
        }

        let results = join_all(segments.iter().map(|s| self.translate_segment(s))).await;

        if !self.is_current(&key, token) {
            tracing::debug!("<{}> 的渲染已被覆盖，丢弃结果", describe(node));
            self.bump(|s| s.renders_superseded += 1);
            return RenderOutcome::Superseded;
        }

        let translated = match results.into_iter().collect::<TranslationResult<Vec<String>>>() {
            Ok(translated) => translated,
            Err(e) => {
                helpers::log_error(&e.clone().with_context(format!("<{}>", describe(node))));
                self.inner.errors.borrow_mut().record_error(&e);
                self.settle(&key, token, TargetState::Registered);
                self.bump(|s| s.renders_failed += 1);
                return RenderOutcome::Failed(e);
            }
        };

        match mode {
            DisplayMode::Replace => {
                for (segment, text) in segments.iter().zip(translated.iter()) {
                    writer::apply_replace(segment, text);
                }
            }
            DisplayMode::Overlay => {
                let host = writer::build_host(
                    &pipeline.setting,
                    mode,
                    self.effective_style(),
                    &writer::join_translations(&translated),
                );
                writer::place_host(node, &host, !exclude.is_empty());
                self.inner.hosts.borrow_mut().insert(key.clone(), host);
                self.ensure_stylesheet(node, &pipeline.setting);
            }
        }

        self.settle(&key, token, TargetState::Rendered);
        self.bump(|s| s.renders_completed += 1);
        tracing::debug!(
            "<{}> 渲染完成: {} 个段落 ({})",
            describe(node),
            segments.len(),
            mode
        );
        RenderOutcome::Rendered {
            segments: segments.len(),
        }
    }

    /// 嵌套的选择器匹配和已注册的后代目标，分段时整棵子树跳过
    fn exclusions_for(&self, node: &Handle, pipeline: &Pipeline) -> HashSet<NodeRef> {
        let mut exclude: HashSet<NodeRef> = pipeline
            .selector
            .query_all(node, &self.inner.fragments)
            .into_iter()
            .filter(|n| !Rc::ptr_eq(n, node))
            .map(NodeRef)
            .collect();
        for key in self.inner.targets.borrow().keys() {
            if self.inner.fragments.is_composed_ancestor(node, key.handle()) {
                exclude.insert(key.clone());
            }
        }
        exclude
    }

    /// 翻译一个段落：缓存命中直接返回，同一指纹正在翻译时等待同一个 future
    async fn translate_segment(&self, segment: &Segment) -> TranslationResult<String> {
        let fingerprint = segment.fingerprint.clone();
        if let Some(hit) = self.inner.translations.get(&fingerprint) {
            self.bump(|s| s.cache_hits += 1);
            return Ok(hit);
        }
        if let Some(shared) = self.inner.in_flight.get(&fingerprint) {
            self.bump(|s| s.dedup_joins += 1);
            return shared.await;
        }

        let provider = self.inner.provider.clone();
        let retry = self.inner.retry;
        let segment = segment.clone();
        let shared = async move {
            let payload = segment.payload();
            let raw = retry.run(|| provider.translate(&payload)).await?;
            Ok::<String, TranslationError>(segment.strip_context(&raw))
        }
        .boxed_local()
        .shared();

        let generation = self.inner.generation.get();
        self.inner.in_flight.insert(fingerprint.clone(), shared.clone());
        self.bump(|s| s.provider_calls += 1);
        let result = shared.clone().await;
        self.inner.in_flight.remove_if_same(&fingerprint, &shared);
        if self.inner.generation.get() != generation {
            tracing::debug!("段落 {} 的译文来自拆除前，不写入缓存", fingerprint);
            return result;
        }
        if let Ok(translated) = result.as_ref() {
            self.inner.translations.insert(fingerprint, translated.clone());
        }
        result
    }

    fn remove_host(&self, node: &Handle, setting: &Setting) {
        if let Some(host) = self.inner.hosts.borrow_mut().remove(&NodeRef::new(node)) {
            remove_from_parent(&host);
        }
        writer::remove_child_hosts(node, &setting.host_tag);
    }

    /// 每个文档根和片段根只注入一次样式表
    fn ensure_stylesheet(&self, node: &Handle, setting: &Setting) {
        let root = tree_root(node);
        let key = NodeRef::new(&root);
        if self.inner.stylesheets.borrow().contains_key(&key) {
            return;
        }
        let style = writer::inject_stylesheet(&root, setting);
        self.inner.stylesheets.borrow_mut().insert(key, style);
    }

    // ------------------------------------------------------------------
    // 注销与拆除
    // ------------------------------------------------------------------

    /// 注销单个节点：移除宿主元素、恢复替换前的原文并调用移除回调
    pub fn unregister(&self, node: &Handle) -> bool {
        let Some(entry) = self.inner.targets.borrow_mut().remove(&NodeRef::new(node)) else {
            return false;
        };
        let pipeline = self.pipeline();
        self.restore_target(node, &entry, &pipeline.setting);
        self.inner.feeds.unobserve_all(node);
        pipeline.segmenter.invalidate(node);
        if let Some(callback) = self.inner.callbacks.on_removed.as_ref() {
            callback(node);
        }
        true
    }

    fn restore_target(&self, node: &Handle, entry: &TargetCache, setting: &Setting) {
        self.remove_host(node, setting);
        if let Some(backup) = entry.content_backup.as_ref() {
            backup.restore();
        }
    }

    /// 已从文档移除的子树：只丢弃记录，不再改动节点
    pub fn forget(&self, removed: &Handle) -> usize {
        let doomed: Vec<NodeRef> = self
            .inner
            .targets
            .borrow()
            .keys()
            .filter(|key| {
                Rc::ptr_eq(key.handle(), removed)
                    || self.inner.fragments.is_composed_ancestor(removed, key.handle())
            })
            .cloned()
            .collect();
        let pipeline = self.pipeline();
        for key in doomed.iter() {
            self.inner.targets.borrow_mut().remove(key);
            self.inner.hosts.borrow_mut().remove(key);
            self.inner.feeds.unobserve_all(key.handle());
            pipeline.segmenter.invalidate(key.handle());
        }
        if !doomed.is_empty() {
            tracing::debug!("移除 {} 个已脱离文档的目标", doomed.len());
        }
        doomed.len()
    }

    /// 丢弃全部分段缓存
    pub fn invalidate_segments(&self) {
        self.pipeline().segmenter.clear_cache();
    }

    /// 拆除全部状态：移除注入的标记、恢复原文、清空缓存
    pub fn teardown(&self) {
        if !self.inner.reflowing.get() {
            self.cancel_pending_reflow();
        }
        let pipeline = self.pipeline();
        let entries: Vec<(NodeRef, TargetCache)> =
            self.inner.targets.borrow_mut().drain().collect();
        let count = entries.len();
        for (key, entry) in entries.iter() {
            self.restore_target(key.handle(), entry, &pipeline.setting);
            if let Some(callback) = self.inner.callbacks.on_removed.as_ref() {
                callback(key.handle());
            }
        }

        let hosts: Vec<Handle> = self.inner.hosts.borrow_mut().drain().map(|(_, h)| h).collect();
        for host in hosts.iter() {
            remove_from_parent(host);
        }
        let sheets: Vec<Handle> = self
            .inner
            .stylesheets
            .borrow_mut()
            .drain()
            .map(|(_, s)| s)
            .collect();
        for sheet in sheets.iter() {
            remove_from_parent(sheet);
        }

        self.inner.translations.clear();
        self.inner.in_flight.clear();
        self.inner.generation.set(self.inner.generation.get() + 1);
        pipeline.segmenter.clear_cache();
        self.inner.feeds.disconnect_all();
        tracing::info!("已拆除 {} 个目标节点", count);
    }

    // ------------------------------------------------------------------
    // 规则变更
    // ------------------------------------------------------------------

    /// 更换规则；在防抖时间后整体重建，期间的多次调用只生效最后一次
    pub fn update_rule(&self, rule: Rule) {
        *self.inner.pending_rule.borrow_mut() = Some(rule);
        self.cancel_pending_reflow();

        let delay = Duration::from_millis(self.inner.config.borrow().setting.reflow_debounce_ms);
        let this = self.clone();
        let handle = tokio::task::spawn_local(async move {
            tokio::time::sleep(delay).await;
            this.inner.pending_reflow.borrow_mut().take();
            this.reflow_now();
        });
        *self.inner.pending_reflow.borrow_mut() = Some(handle);
    }

    fn cancel_pending_reflow(&self) {
        if let Some(handle) = self.inner.pending_reflow.borrow_mut().take() {
            handle.abort();
        }
    }

    /// 立即拆除并按当前（或待生效的）规则重建；已在重建中时返回 false
    pub fn reflow_now(&self) -> bool {
        if self.inner.reflowing.replace(true) {
            tracing::debug!("重排进行中，忽略重复请求");
            return false;
        }
        self.cancel_pending_reflow();

        if let Some(rule) = self.inner.pending_rule.borrow_mut().take() {
            let mut candidate = self.inner.config.borrow().clone();
            candidate.rule = rule;
            match candidate.validate() {
                Ok(()) => *self.inner.config.borrow_mut() = candidate,
                Err(e) => tracing::warn!("新规则无效，继续使用原规则: {}", e),
            }
        }

        self.teardown();
        let pipeline = Pipeline::build(
            &self.inner.config.borrow(),
            self.inner.style.clone(),
            self.inner.fragments.clone(),
        );
        *self.inner.pipeline.borrow_mut() = Rc::new(pipeline);
        let registered = self.start();

        self.bump(|s| s.reflows += 1);
        self.inner.reflowing.set(false);
        tracing::info!("规则已重建: {} 个目标节点", registered);
        true
    }
}

fn describe(node: &Handle) -> &str {
    get_node_name(node).unwrap_or("#node")
}
