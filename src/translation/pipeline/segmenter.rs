//! 文本分段器
//!
//! 深度优先遍历子树（含嵌套片段），跨越行内节点拼接文本叶子，在块级边界、
//! 跳过节点和长度阈值处断开，生成按文档顺序排列的 [`Segment`]。

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::rc::Rc;
use std::sync::OnceLock;

use lru::LruCache;
use markup5ever_rcdom::{Handle, NodeData};
use regex::Regex;

use super::boundary::BoundaryClassifier;
use super::segment::Segment;
use crate::parsers::html::dom::{get_parent, is_blank, NodeRef};
use crate::parsers::html::fragments::FragmentRegistry;
use crate::translation::config::{constants, SegmentOptions};

/// 句末标点，允许后随引号和括号
fn sentence_end_regex() -> &'static Regex {
    static SENTENCE_END: OnceLock<Regex> = OnceLock::new();
    SENTENCE_END.get_or_init(|| {
        Regex::new(r#"[.!?;。！？；…‼⁇]["'”’)\]）」』》]*\s*$"#).expect("句末标点正则无效")
    })
}

/// 文本是否以句末标点结尾
pub fn ends_sentence(text: &str) -> bool {
    sentence_end_regex().is_match(text)
}

/// 分段统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SegmenterStats {
    pub passes: usize,
    pub cache_hits: usize,
    pub segments_produced: usize,
}

/// 进行中的段落
#[derive(Default)]
struct Accumulator {
    leaves: Vec<Handle>,
    text: String,
    char_len: usize,
    anchor_top: Option<Handle>,
    anchor_bottom: Option<Handle>,
}

impl Accumulator {
    fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    fn push_text(&mut self, text: &str) {
        self.text.push_str(text);
        self.char_len += text.chars().count();
    }
}

pub struct TextSegmenter {
    options: SegmentOptions,
    classifier: BoundaryClassifier,
    fragments: Rc<FragmentRegistry>,
    cache: RefCell<LruCache<NodeRef, Vec<Segment>>>,
    stats: Cell<SegmenterStats>,
}

impl TextSegmenter {
    pub fn new(
        options: SegmentOptions,
        classifier: BoundaryClassifier,
        fragments: Rc<FragmentRegistry>,
    ) -> Self {
        let capacity = NonZeroUsize::new(classifier.setting().segment_cache_size)
            .or_else(|| NonZeroUsize::new(constants::DEFAULT_SEGMENT_CACHE_SIZE))
            .unwrap_or(NonZeroUsize::MIN);
        Self {
            options,
            classifier,
            fragments,
            cache: RefCell::new(LruCache::new(capacity)),
            stats: Cell::new(SegmenterStats::default()),
        }
    }

    pub fn options(&self) -> &SegmentOptions {
        &self.options
    }

    pub fn classifier(&self) -> &BoundaryClassifier {
        &self.classifier
    }

    pub fn stats(&self) -> SegmenterStats {
        self.stats.get()
    }

    /// 对 `root` 分段
    ///
    /// 传入 `exclude` 时总是重新计算，不读也不写缓存。
    pub fn segment(&self, root: &Handle, exclude: Option<&HashSet<NodeRef>>) -> Vec<Segment> {
        let key = NodeRef::new(root);
        if exclude.is_none() {
            if let Some(cached) = self.cache.borrow_mut().get(&key) {
                self.update_stats(|s| s.cache_hits += 1);
                return cached.clone();
            }
        }

        let empty = HashSet::new();
        let exclude_set = exclude.unwrap_or(&empty);
        let mut acc = Accumulator::default();
        let mut segments = Vec::new();

        let block = if self.classifier.classify(root).is_inline {
            self.nearest_block(root)
        } else {
            root.clone()
        };
        self.walk(root, &block, exclude_set, &mut acc, &mut segments);
        self.finalize(&mut acc, &mut segments);

        if self.options.preserve_context {
            self.stitch_context(&mut segments);
        }

        tracing::debug!(
            "分段完成: {} 个段落 (排除 {} 个节点)",
            segments.len(),
            exclude_set.len()
        );
        self.update_stats(|s| {
            s.passes += 1;
            s.segments_produced += segments.len();
        });

        if exclude.is_none() {
            self.cache.borrow_mut().put(key, segments.clone());
        }
        segments
    }

    /// 丢弃某个节点的缓存分段
    pub fn invalidate(&self, node: &Handle) {
        self.cache.borrow_mut().pop(&NodeRef::new(node));
    }

    pub fn clear_cache(&self) {
        self.cache.borrow_mut().clear();
    }

    pub fn cached_len(&self) -> usize {
        self.cache.borrow().len()
    }

    fn update_stats<F: FnOnce(&mut SegmenterStats)>(&self, update: F) {
        let mut stats = self.stats.get();
        update(&mut stats);
        self.stats.set(stats);
    }

    fn nearest_block(&self, node: &Handle) -> Handle {
        let mut current = get_parent(node);
        while let Some(parent) = current {
            if !self.classifier.classify(&parent).is_inline {
                return parent;
            }
            current = get_parent(&parent);
        }
        node.clone()
    }

    fn walk(
        &self,
        node: &Handle,
        block: &Handle,
        exclude: &HashSet<NodeRef>,
        acc: &mut Accumulator,
        out: &mut Vec<Segment>,
    ) {
        match &node.data {
            NodeData::Text { contents } => {
                let text = contents.borrow().to_string();
                if is_blank(&text) {
                    // 纯空白叶子不参与分段，只保留词间的一个空格
                    if !acc.is_empty() && !acc.text.ends_with(char::is_whitespace) {
                        acc.push_text(" ");
                    }
                    return;
                }
                self.push_leaf(node, &text, block, acc, out);
            }
            NodeData::Element { .. } | NodeData::Document => {
                if exclude.contains(&NodeRef::new(node)) {
                    self.finalize(acc, out);
                    return;
                }
                let info = self.classifier.classify(node);
                if info.is_skipped {
                    self.finalize(acc, out);
                    return;
                }

                if info.is_inline {
                    self.walk_children(node, block, exclude, acc, out);
                } else {
                    self.finalize(acc, out);
                    self.walk_children(node, node, exclude, acc, out);
                    self.finalize(acc, out);
                }
            }
            _ => {}
        }
    }

    fn walk_children(
        &self,
        node: &Handle,
        block: &Handle,
        exclude: &HashSet<NodeRef>,
        acc: &mut Accumulator,
        out: &mut Vec<Segment>,
    ) {
        if let Some(fragment) = self.fragments.fragment_of(node) {
            self.walk(&fragment, block, exclude, acc, out);
        }
        let children: Vec<Handle> = node.children.borrow().clone();
        for child in children.iter() {
            self.walk(child, block, exclude, acc, out);
        }
    }

    fn push_leaf(
        &self,
        leaf: &Handle,
        text: &str,
        block: &Handle,
        acc: &mut Accumulator,
        out: &mut Vec<Segment>,
    ) {
        let leaf_len = text.chars().count();
        let max = self.options.max_chunk_size;
        if !acc.is_empty()
            && acc.char_len + leaf_len > max
            && acc.char_len >= self.options.min_chunk_size
            && (!self.options.preserve_sentences || ends_sentence(text) || acc.char_len >= max)
        {
            self.finalize(acc, out);
        }

        if acc.is_empty() {
            acc.anchor_top = Some(block.clone());
        }
        acc.anchor_bottom = Some(get_parent(leaf).unwrap_or_else(|| block.clone()));
        acc.leaves.push(leaf.clone());
        acc.push_text(text);
    }

    fn finalize(&self, acc: &mut Accumulator, out: &mut Vec<Segment>) {
        let finished = std::mem::take(acc);
        if finished.leaves.is_empty() || is_blank(&finished.text) {
            return;
        }
        let (Some(top), Some(bottom)) = (finished.anchor_top, finished.anchor_bottom) else {
            return;
        };
        out.push(Segment::new(finished.leaves, &finished.text, top, bottom));
    }

    fn stitch_context(&self, segments: &mut [Segment]) {
        let overlap = self.options.context_overlap;
        if overlap == 0 {
            return;
        }
        let heads: Vec<String> = segments
            .iter()
            .map(|s| s.text.chars().take(overlap).collect())
            .collect();
        let tails: Vec<String> = segments
            .iter()
            .map(|s| {
                let skip = s.char_len().saturating_sub(overlap);
                s.text.chars().skip(skip).collect()
            })
            .collect();

        let count = segments.len();
        for (index, segment) in segments.iter_mut().enumerate() {
            segment.context.before = (index > 0).then(|| tails[index - 1].clone());
            segment.context.after = (index + 1 < count).then(|| heads[index + 1].clone());
        }
    }
}
