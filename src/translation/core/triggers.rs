//! 触发源
//!
//! 可见性和悬停由宿主环境监听。控制器只通过 [`TriggerFeed`] 订阅和取消订阅节点，
//! 宿主在事件发生时回调 `RenderController::on_visible` / `on_hover`。

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use markup5ever_rcdom::Handle;

use crate::parsers::html::dom::NodeRef;
use crate::translation::config::Setting;

/// 宿主提供的触发源
pub trait TriggerFeed {
    fn observe(&self, node: &Handle);
    fn unobserve(&self, node: &Handle);
    /// 取消全部订阅
    fn disconnect(&self);
}

/// 只记录订阅关系的内存实现
#[derive(Default)]
pub struct RecordingFeed {
    observed: RefCell<Vec<Handle>>,
    disconnects: Cell<usize>,
}

impl RecordingFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_observing(&self, node: &Handle) -> bool {
        self.observed
            .borrow()
            .iter()
            .any(|n| std::rc::Rc::ptr_eq(n, node))
    }

    pub fn observed(&self) -> Vec<Handle> {
        self.observed.borrow().clone()
    }

    pub fn observed_count(&self) -> usize {
        self.observed.borrow().len()
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.get()
    }
}

impl TriggerFeed for RecordingFeed {
    fn observe(&self, node: &Handle) {
        if !self.is_observing(node) {
            self.observed.borrow_mut().push(node.clone());
        }
    }

    fn unobserve(&self, node: &Handle) {
        self.observed
            .borrow_mut()
            .retain(|n| !std::rc::Rc::ptr_eq(n, node));
    }

    fn disconnect(&self) {
        self.observed.borrow_mut().clear();
        self.disconnects.set(self.disconnects.get() + 1);
    }
}

/// 创建触发源时交给宿主的参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeedOptions {
    /// 节点可见比例达到该值才算进入视口
    pub visibility_threshold: f32,
}

impl From<&Setting> for FeedOptions {
    fn from(setting: &Setting) -> Self {
        Self {
            visibility_threshold: setting.visibility_threshold,
        }
    }
}

impl Default for FeedOptions {
    fn default() -> Self {
        Self::from(&Setting::default())
    }
}

/// 触发源工厂
pub type FeedFactory = Box<dyn Fn(&FeedOptions) -> Rc<dyn TriggerFeed>>;

/// 一个懒创建的触发源
struct LazyFeed {
    factory: Option<FeedFactory>,
    feed: RefCell<Option<Rc<dyn TriggerFeed>>>,
    subscribed: RefCell<std::collections::HashSet<NodeRef>>,
}

impl LazyFeed {
    fn new(factory: Option<FeedFactory>) -> Self {
        Self {
            factory,
            feed: RefCell::new(None),
            subscribed: RefCell::new(Default::default()),
        }
    }

    fn get_or_create(&self, options: &FeedOptions) -> Option<Rc<dyn TriggerFeed>> {
        if let Some(feed) = self.feed.borrow().as_ref() {
            return Some(feed.clone());
        }
        let feed = (self.factory.as_ref()?)(options);
        *self.feed.borrow_mut() = Some(feed.clone());
        Some(feed)
    }

    fn observe(&self, node: &Handle, options: &FeedOptions) -> bool {
        match self.get_or_create(options) {
            Some(feed) => {
                feed.observe(node);
                self.subscribed.borrow_mut().insert(NodeRef::new(node));
                true
            }
            None => false,
        }
    }

    fn unobserve(&self, node: &Handle) {
        if !self.subscribed.borrow_mut().remove(&NodeRef::new(node)) {
            return;
        }
        if let Some(feed) = self.feed.borrow().as_ref() {
            feed.unobserve(node);
        }
    }

    fn is_subscribed(&self, node: &Handle) -> bool {
        self.subscribed.borrow().contains(&NodeRef::new(node))
    }

    fn disconnect(&self) {
        self.subscribed.borrow_mut().clear();
        if let Some(feed) = self.feed.borrow_mut().take() {
            feed.disconnect();
        }
    }
}

/// 控制器持有的可见性与悬停触发源，首次使用时才创建
pub struct TriggerFeeds {
    visibility: LazyFeed,
    hover: LazyFeed,
}

impl TriggerFeeds {
    pub fn new(visibility: Option<FeedFactory>, hover: Option<FeedFactory>) -> Self {
        Self {
            visibility: LazyFeed::new(visibility),
            hover: LazyFeed::new(hover),
        }
    }

    /// 订阅可见性；没有配置工厂时返回 false
    ///
    /// `options` 只在首次创建触发源时使用，断开后重新创建时才会生效。
    pub fn observe_visibility(&self, node: &Handle, options: &FeedOptions) -> bool {
        self.visibility.observe(node, options)
    }

    pub fn unobserve_visibility(&self, node: &Handle) {
        self.visibility.unobserve(node);
    }

    pub fn observe_hover(&self, node: &Handle, options: &FeedOptions) -> bool {
        self.hover.observe(node, options)
    }

    pub fn unobserve_hover(&self, node: &Handle) {
        self.hover.unobserve(node);
    }

    pub fn is_waiting(&self, node: &Handle) -> bool {
        self.visibility.is_subscribed(node) || self.hover.is_subscribed(node)
    }

    /// 取消某个节点的全部订阅
    pub fn unobserve_all(&self, node: &Handle) {
        self.visibility.unobserve(node);
        self.hover.unobserve(node);
    }

    /// 断开全部触发源，下次使用时重新创建
    pub fn disconnect_all(&self) {
        self.visibility.disconnect();
        self.hover.disconnect();
    }
}

impl Default for TriggerFeeds {
    fn default() -> Self {
        Self::new(None, None)
    }
}
