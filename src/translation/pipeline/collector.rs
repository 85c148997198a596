//! 候选节点收集器
//!
//! 三轮收集后合并：
//!
//! 1. 规则选择器直接匹配（含 `host::shadow::inner` 形式）
//! 2. 每个匹配节点向上找到最近的、自身带有直接文本的祖先
//! 3. 全树扫描没有元素子节点、带直接文本的“叶子容器”
//!
//! 最后过滤掉不可见、已含译文标记、位于跳过标签内、空的自定义元素，以及
//! 包含其他候选却没有自身文本的外层节点。

use std::collections::HashSet;
use std::rc::Rc;

use markup5ever_rcdom::{Handle, NodeData};

use super::boundary::BoundaryClassifier;
use crate::parsers::html::dom::{
    get_node_name, has_direct_text, has_element_children, is_blank, text_content,
    NodeRef,
};
use crate::parsers::html::fragments::FragmentRegistry;
use crate::parsers::html::selector::SelectorSpec;

/// 收集统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectionStats {
    pub selector_matches: usize,
    pub ancestor_additions: usize,
    pub leaf_additions: usize,
    pub filtered_out: usize,
}

pub struct TargetCollector {
    classifier: BoundaryClassifier,
    fragments: Rc<FragmentRegistry>,
}

impl TargetCollector {
    pub fn new(classifier: BoundaryClassifier, fragments: Rc<FragmentRegistry>) -> Self {
        Self {
            classifier,
            fragments,
        }
    }

    /// 按选择器字符串收集，无效的选择器段被忽略
    pub fn collect(&self, root: &Handle, selector: &str) -> Vec<Handle> {
        let spec = SelectorSpec::parse_lenient(selector);
        self.collect_with_stats(root, &spec).0
    }

    /// 收集 `root` 子树（含嵌套片段）中的候选节点，按文档顺序返回
    pub fn collect_with_stats(
        &self,
        root: &Handle,
        spec: &SelectorSpec,
    ) -> (Vec<Handle>, CollectionStats) {
        let mut stats = CollectionStats::default();
        let mut candidates: HashSet<NodeRef> = HashSet::new();

        // 第一轮：选择器
        let matched = spec.query_all(root, &self.fragments);
        stats.selector_matches = matched.len();
        for node in matched.iter() {
            candidates.insert(NodeRef::new(node));
        }

        // 第二轮：带直接文本的最近祖先
        for node in matched.iter() {
            if let Some(ancestor) = self.text_bearing_ancestor(node, root) {
                if candidates.insert(NodeRef::new(&ancestor)) {
                    stats.ancestor_additions += 1;
                }
            }
        }

        // 第三轮：叶子容器
        let mut leaves = Vec::new();
        self.fragments.walk_composed(root, &mut |node| {
            if !matches!(node.data, NodeData::Element { .. }) {
                return !matches!(node.data, NodeData::Text { .. });
            }
            if self.classifier.is_skip_tagged(node) {
                return false;
            }
            if !has_element_children(node)
                && self.fragments.fragment_of(node).is_none()
                && has_direct_text(node)
            {
                leaves.push(node.clone());
            }
            true
        });
        // 行内叶子提升到块级祖先；祖先被外层过滤去掉时退回行内片段本身
        let mut promotions: Vec<(Handle, Handle)> = Vec::new();
        for leaf in leaves {
            if self.classifier.style().is_hidden(&leaf) {
                continue;
            }
            let target = if self.classifier.classify(&leaf).is_inline {
                match self.block_ancestor_within(&leaf, root) {
                    Some(block) => {
                        promotions.push((self.inline_run_root(&leaf, &block), block.clone()));
                        Some(block)
                    }
                    None => Some(leaf),
                }
            } else {
                Some(leaf)
            };
            if let Some(target) = target {
                if candidates.insert(NodeRef::new(&target)) {
                    stats.leaf_additions += 1;
                }
            }
        }

        let before_filter = candidates.len();
        let kept = self.filter(root, candidates, &promotions);
        stats.filtered_out = before_filter.saturating_sub(kept.len());

        tracing::debug!(
            "收集候选节点: 选择器 {} 个, 祖先 {} 个, 叶子 {} 个, 过滤 {} 个",
            stats.selector_matches,
            stats.ancestor_additions,
            stats.leaf_additions,
            stats.filtered_out
        );
        (kept, stats)
    }

    fn text_bearing_ancestor(&self, node: &Handle, root: &Handle) -> Option<Handle> {
        if std::rc::Rc::ptr_eq(node, root) {
            return None;
        }
        let mut current = self.fragments.composed_parent(node);
        while let Some(parent) = current {
            if matches!(parent.data, NodeData::Element { .. }) {
                if self.classifier.is_skip_tagged(&parent) {
                    return None;
                }
                if has_direct_text(&parent) {
                    return Some(parent);
                }
            }
            if std::rc::Rc::ptr_eq(&parent, root) {
                return None;
            }
            current = self.fragments.composed_parent(&parent);
        }
        None
    }

    /// 行内叶子的最近块级祖先，不越过 `root`
    fn block_ancestor_within(&self, node: &Handle, root: &Handle) -> Option<Handle> {
        let mut current = self.fragments.composed_parent(node);
        while let Some(parent) = current {
            if matches!(parent.data, NodeData::Element { .. }) {
                let info = self.classifier.classify(&parent);
                if info.is_skipped {
                    return None;
                }
                if !info.is_inline {
                    return Some(parent);
                }
            }
            if std::rc::Rc::ptr_eq(&parent, root) {
                return None;
            }
            current = self.fragments.composed_parent(&parent);
        }
        None
    }

    /// `block` 之下包含 `leaf` 的最外层行内节点
    fn inline_run_root(&self, leaf: &Handle, block: &Handle) -> Handle {
        let mut run = leaf.clone();
        let mut current = self.fragments.composed_parent(leaf);
        while let Some(parent) = current {
            if Rc::ptr_eq(&parent, block) {
                break;
            }
            if matches!(parent.data, NodeData::Element { .. }) {
                run = parent.clone();
            }
            current = self.fragments.composed_parent(&parent);
        }
        run
    }

    fn contains_host_marker(&self, node: &Handle) -> bool {
        let mut found = false;
        self.fragments.walk_composed(node, &mut |n| {
            if self.classifier.is_host_marker(n) {
                found = true;
            }
            !found
        });
        found
    }

    fn is_empty_custom_element(&self, node: &Handle) -> bool {
        get_node_name(node).is_some_and(|tag| tag.contains('-'))
            && self.fragments.fragment_of(node).is_none()
            && is_blank(&text_content(node, &|_| false))
    }

    fn admissible(&self, node: &Handle) -> bool {
        if self.classifier.style().is_hidden(node) {
            return false;
        }
        if self.classifier.classify(node).is_skipped {
            return false;
        }
        let ancestors = self.fragments.composed_ancestors(node);
        if ancestors
            .iter()
            .any(|a| self.classifier.is_skip_tagged(a) || self.classifier.is_opted_out(a))
        {
            return false;
        }
        if self.contains_host_marker(node) {
            return false;
        }
        !self.is_empty_custom_element(node)
    }

    fn filter(
        &self,
        root: &Handle,
        candidates: HashSet<NodeRef>,
        promotions: &[(Handle, Handle)],
    ) -> Vec<Handle> {
        let mut kept: HashSet<NodeRef> = candidates
            .into_iter()
            .filter(|candidate| self.admissible(candidate.handle()))
            .collect();

        // 被提升的块级祖先若会因外层规则被去掉，改为登记行内片段
        let containers = self.containers_of(&kept);
        let dropped: HashSet<NodeRef> = kept
            .iter()
            .filter(|c| containers.contains(*c) && !has_direct_text(c.handle()))
            .cloned()
            .collect();
        for (run, block) in promotions {
            if dropped.contains(&NodeRef::new(block)) && self.admissible(run) {
                kept.insert(NodeRef::new(run));
            }
        }

        // 外层节点包含其他候选且没有自身文本时去掉
        let containers = self.containers_of(&kept);
        kept.retain(|candidate| {
            !containers.contains(candidate) || has_direct_text(candidate.handle())
        });

        let mut ordered = Vec::with_capacity(kept.len());
        self.fragments.walk_composed(root, &mut |node| {
            if kept.contains(&NodeRef::new(node)) {
                ordered.push(node.clone());
            }
            true
        });
        ordered
    }

    fn containers_of(&self, nodes: &HashSet<NodeRef>) -> HashSet<NodeRef> {
        let mut containers = HashSet::new();
        for node in nodes.iter() {
            for ancestor in self.fragments.composed_ancestors(node.handle()) {
                containers.insert(NodeRef::new(&ancestor));
            }
        }
        containers
    }
}
