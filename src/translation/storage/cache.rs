//! 翻译缓存与渲染状态存储
//!
//! - [`TranslationCache`]：指纹 → 译文，只在整体拆除时清空
//! - [`InFlightMap`]：指纹 → 共享的进行中翻译，同一段文本的并发请求等待同一个 future
//! - [`TargetCache`]：每个已注册节点的渲染令牌与原文备份

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use futures::future::{LocalBoxFuture, Shared};
use markup5ever_rcdom::{Handle, NodeData};

use crate::parsers::html::dom::{set_text, text_of};
use crate::translation::error::TranslationResult;
use crate::translation::pipeline::segment::Fingerprint;

/// 缓存统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub total_requests: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub total_entries: usize,
}

impl CacheStats {
    /// 获取缓存命中率
    pub fn hit_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.cache_hits as f64 / self.total_requests as f64
        }
    }
}

// ============================================================================
// 翻译缓存
// ============================================================================

/// 指纹到译文的映射，只增不减
#[derive(Debug, Default)]
pub struct TranslationCache {
    entries: RefCell<HashMap<Fingerprint, String>>,
    stats: Cell<CacheStats>,
}

impl TranslationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取缓存条目，同时记录命中统计
    pub fn get(&self, fingerprint: &Fingerprint) -> Option<String> {
        let found = self.entries.borrow().get(fingerprint).cloned();
        let mut stats = self.stats.get();
        stats.total_requests += 1;
        if found.is_some() {
            stats.cache_hits += 1;
        } else {
            stats.cache_misses += 1;
        }
        self.stats.set(stats);
        found
    }

    /// 只读查询，不计入统计
    pub fn peek(&self, fingerprint: &Fingerprint) -> Option<String> {
        self.entries.borrow().get(fingerprint).cloned()
    }

    pub fn insert(&self, fingerprint: Fingerprint, translated: String) {
        self.entries.borrow_mut().insert(fingerprint, translated);
    }

    pub fn contains_key(&self, fingerprint: &Fingerprint) -> bool {
        self.entries.borrow().contains_key(fingerprint)
    }

    pub fn size(&self) -> usize {
        self.entries.borrow().len()
    }

    /// 清空缓存
    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }

    /// 获取统计信息
    pub fn get_stats(&self) -> CacheStats {
        let mut stats = self.stats.get();
        stats.total_entries = self.size();
        stats
    }

    pub fn reset_stats(&self) {
        self.stats.set(CacheStats::default());
    }
}

// ============================================================================
// 进行中的翻译
// ============================================================================

/// 可被多个调用方同时等待的翻译结果
pub type SharedTranslation = Shared<LocalBoxFuture<'static, TranslationResult<String>>>;

/// 指纹 → 进行中的翻译
#[derive(Default)]
pub struct InFlightMap {
    pending: RefCell<HashMap<Fingerprint, SharedTranslation>>,
}

impl InFlightMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, fingerprint: &Fingerprint) -> Option<SharedTranslation> {
        self.pending.borrow().get(fingerprint).cloned()
    }

    pub fn insert(&self, fingerprint: Fingerprint, future: SharedTranslation) {
        self.pending.borrow_mut().insert(fingerprint, future);
    }

    pub fn remove(&self, fingerprint: &Fingerprint) {
        self.pending.borrow_mut().remove(fingerprint);
    }

    /// 只有登记的仍是 `future` 本身时才移除，返回是否移除
    pub fn remove_if_same(&self, fingerprint: &Fingerprint, future: &SharedTranslation) -> bool {
        let mut pending = self.pending.borrow_mut();
        match pending.get(fingerprint) {
            Some(current) if current.ptr_eq(future) => {
                pending.remove(fingerprint);
                true
            }
            _ => false,
        }
    }

    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.pending.borrow().contains_key(fingerprint)
    }

    pub fn len(&self) -> usize {
        self.pending.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.pending.borrow_mut().clear();
    }
}

// ============================================================================
// 节点渲染状态
// ============================================================================

/// 单个目标节点的状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetState {
    Registered,
    Rendering,
    Rendered,
}

/// 渲染令牌，单调递增
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RenderToken(pub u64);

/// 替换模式下的原文快照：每个文本叶子和它的原始内容
#[derive(Clone, Default)]
pub struct ContentBackup {
    leaves: Vec<(Handle, String)>,
}

impl ContentBackup {
    /// 记录子树中全部文本叶子；`skip` 返回 true 的元素不进入
    pub fn capture<F>(root: &Handle, skip: &F) -> Self
    where
        F: Fn(&Handle) -> bool,
    {
        let mut leaves = Vec::new();
        capture_into(root, skip, &mut leaves);
        Self { leaves }
    }

    /// 把每个叶子写回原文
    pub fn restore(&self) {
        for (leaf, original) in self.leaves.iter() {
            set_text(leaf, original);
        }
    }

    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }
}

fn capture_into<F>(node: &Handle, skip: &F, out: &mut Vec<(Handle, String)>)
where
    F: Fn(&Handle) -> bool,
{
    match &node.data {
        NodeData::Text { .. } => {
            if let Some(text) = text_of(node) {
                out.push((node.clone(), text));
            }
        }
        NodeData::Element { .. } if skip(node) => {}
        _ => {
            for child in node.children.borrow().iter() {
                capture_into(child, skip, out);
            }
        }
    }
}

/// 每个已注册节点一份
#[derive(Clone)]
pub struct TargetCache {
    pub state: TargetState,
    pub content_backup: Option<ContentBackup>,
    pub last_render_token: Option<RenderToken>,
}

impl TargetCache {
    pub fn new() -> Self {
        Self {
            state: TargetState::Registered,
            content_backup: None,
            last_render_token: None,
        }
    }
}

impl Default for TargetCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::html::dom::{append_child, create_element, create_text, is_element_named};
    use futures::FutureExt;

    #[test]
    fn test_cache_hit_statistics() {
        let cache = TranslationCache::new();
        let fp = Fingerprint::of("hello");
        assert_eq!(cache.get(&fp), None);
        cache.insert(fp.clone(), "你好".to_string());
        assert_eq!(cache.get(&fp).as_deref(), Some("你好"));

        let stats = cache.get_stats();
        assert_eq!(stats.total_requests, 2);
        assert_eq!(stats.cache_hits, 1);
        assert_eq!(stats.total_entries, 1);
        assert!((stats.hit_rate() - 0.5).abs() < f64::EPSILON);

        cache.clear();
        assert_eq!(cache.size(), 0);
    }

    #[tokio::test]
    async fn test_inflight_shares_one_future() {
        let map = InFlightMap::new();
        let fp = Fingerprint::of("x");
        let shared = async { Ok::<_, crate::translation::error::TranslationError>("X".to_string()) }
            .boxed_local()
            .shared();
        map.insert(fp.clone(), shared);

        let first = map.get(&fp).unwrap();
        let second = map.get(&fp).unwrap();
        assert_eq!(first.await.unwrap(), "X");
        assert_eq!(second.await.unwrap(), "X");
        map.remove(&fp);
        assert!(map.is_empty());
    }

    #[tokio::test]
    async fn test_inflight_keeps_newer_registration() {
        let map = InFlightMap::new();
        let fp = Fingerprint::of("x");
        let old = async { Ok::<_, crate::translation::error::TranslationError>("old".to_string()) }
            .boxed_local()
            .shared();
        let new = async { Ok::<_, crate::translation::error::TranslationError>("new".to_string()) }
            .boxed_local()
            .shared();
        map.insert(fp.clone(), old.clone());
        // 清空后同一指纹又登记了新的翻译
        map.clear();
        map.insert(fp.clone(), new.clone());

        assert_eq!(old.clone().await.unwrap(), "old");
        assert!(!map.remove_if_same(&fp, &old));
        assert!(map.contains(&fp));
        assert!(map.remove_if_same(&fp, &new));
        assert!(map.is_empty());
    }

    #[test]
    fn test_backup_restores_leaves() {
        let p = create_element("p", &[]);
        let a = create_text("Hello ");
        let b = create_element("b", &[]);
        let c = create_text("world");
        let host = create_element("web-translator-host", &[]);
        append_child(&p, &a);
        append_child(&b, &c);
        append_child(&p, &b);
        append_child(&host, &create_text("译文"));
        append_child(&p, &host);

        let backup =
            ContentBackup::capture(&p, &|n: &Handle| is_element_named(n, "web-translator-host"));
        assert_eq!(backup.len(), 2);
        set_text(&a, "A");
        set_text(&c, "C");
        backup.restore();
        assert_eq!(text_of(&a).as_deref(), Some("Hello "));
        assert_eq!(text_of(&c).as_deref(), Some("world"));
    }
}
