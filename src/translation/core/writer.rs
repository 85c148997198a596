//! 译文回写
//!
//! 叠加模式在节点内插入一个带标记的宿主元素；替换模式把译文按字符数比例
//! 分配回原来的文本叶子。

use markup5ever_rcdom::{Handle, NodeData};

use crate::parsers::html::dom::{
    append_child, create_element, create_text, get_child_node_by_name, insert_after,
    is_element_named, last_direct_text_leaf, remove_from_parent, set_text, text_of,
};
use crate::translation::config::{constants, DisplayMode, Setting, TextStyle};
use crate::translation::pipeline::Segment;

/// 创建叠加模式的宿主元素
pub fn build_host(setting: &Setting, mode: DisplayMode, style: TextStyle, text: &str) -> Handle {
    let host = create_element(
        &setting.host_tag,
        &[
            ("class", setting.host_class.as_str()),
            ("data-mode", mode.as_str()),
            ("data-style", style.as_str()),
        ],
    );
    append_child(&host, &create_text(text));
    host
}

/// 放置宿主元素：节点含有嵌套目标时紧跟在最后一个直接文本叶子之后，否则追加到末尾
pub fn place_host(node: &Handle, host: &Handle, has_nested_targets: bool) {
    if has_nested_targets {
        if let Some(leaf) = last_direct_text_leaf(node) {
            insert_after(node, &leaf, host);
            return;
        }
    }
    append_child(node, host);
}

/// 移除节点自身的宿主元素（直接子节点），嵌套目标的宿主不受影响；返回移除数量
pub fn remove_child_hosts(node: &Handle, host_tag: &str) -> usize {
    let hosts: Vec<Handle> = node
        .children
        .borrow()
        .iter()
        .filter(|child| is_element_named(child, host_tag))
        .cloned()
        .collect();
    for host in hosts.iter() {
        remove_from_parent(host);
    }
    hosts.len()
}

/// 拼接各段译文
pub fn join_translations(translations: &[String]) -> String {
    translations
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// 按权重把文本切成若干片，最后一片拿走余下全部字符
///
/// 权重全为零时整段交给第一片。按字符而不是字节切分。
pub fn distribute(text: &str, weights: &[usize]) -> Vec<String> {
    if weights.is_empty() {
        return Vec::new();
    }
    let chars: Vec<char> = text.chars().collect();
    let total_chars = chars.len();
    let total_weight: usize = weights.iter().sum();
    if total_weight == 0 {
        let mut parts = vec![String::new(); weights.len()];
        parts[0] = text.to_string();
        return parts;
    }

    let mut parts = Vec::with_capacity(weights.len());
    let mut start = 0;
    let mut cumulative = 0;
    for (index, weight) in weights.iter().enumerate() {
        cumulative += weight;
        let end = if index + 1 == weights.len() {
            total_chars
        } else {
            ((total_chars * cumulative + total_weight / 2) / total_weight).clamp(start, total_chars)
        };
        parts.push(chars[start..end].iter().collect());
        start = end;
    }
    parts
}

/// 替换模式：把一段译文写回它的文本叶子
pub fn apply_replace(segment: &Segment, translated: &str) {
    let weights: Vec<usize> = segment
        .leaves
        .iter()
        .map(|leaf| text_of(leaf).map(|t| t.trim().chars().count()).unwrap_or(0))
        .collect();
    let parts = distribute(translated.trim(), &weights);
    for (leaf, part) in segment.leaves.iter().zip(parts) {
        set_text(leaf, &part);
    }
}

// ============================================================================
// 样式表
// ============================================================================

/// 共享样式表内容
pub fn stylesheet_text(setting: &Setting) -> String {
    let tag = &setting.host_tag;
    format!(
        "{tag} {{ display: block; margin-top: 0.25em; }}\n\
         {tag}[data-style=\"underline\"] {{ text-decoration: underline; }}\n\
         {tag}[data-style=\"dashed\"] {{ text-decoration: underline dashed; }}\n\
         {tag}[data-style=\"dotted\"] {{ text-decoration: underline dotted; }}\n\
         {tag}[data-style=\"highlight\"] {{ background-color: #fff3a3; }}\n\
         {tag}[data-style=\"weakened\"] {{ opacity: 0.6; }}\n"
    )
}

/// 在文档根或片段根注入样式表，返回插入的节点
///
/// 文档根优先插入 `<head>`，没有 `<head>` 时插入 `<html>`，都没有时直接挂在根下。
pub fn inject_stylesheet(root: &Handle, setting: &Setting) -> Handle {
    let style = create_element("style", &[(constants::STYLE_MARKER_ATTR, "")]);
    append_child(&style, &create_text(&stylesheet_text(setting)));

    let html = get_child_node_by_name(root, "html");
    let head = html
        .as_ref()
        .and_then(|html| get_child_node_by_name(html, "head"));
    let parent = head.or(html).unwrap_or_else(|| root.clone());
    append_child(&parent, &style);
    style
}

/// 节点是否为注入的样式表
pub fn is_injected_stylesheet(node: &Handle) -> bool {
    match &node.data {
        NodeData::Element { attrs, .. } => {
            is_element_named(node, "style")
                && attrs
                    .borrow()
                    .iter()
                    .any(|attr| &*attr.name.local == constants::STYLE_MARKER_ATTR)
        }
        _ => false,
    }
}
