use std::cell::RefCell;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use encoding_rs::Encoding;
use html5ever::interface::{Attribute, QualName};
use html5ever::parse_document;
use html5ever::tendril::{StrTendril, TendrilSink};
use html5ever::{namespace_url, ns, LocalName};
use markup5ever_rcdom::{Handle, Node, NodeData, RcDom};

/// 将 HTML 字节转换为 DOM
pub fn html_to_dom(data: &[u8], document_encoding: &str) -> std::io::Result<RcDom> {
    let s: String = match Encoding::for_label(document_encoding.as_bytes()) {
        Some(encoding) => {
            let (string, _, _) = encoding.decode(data);
            string.to_string()
        }
        None => String::from_utf8_lossy(data).to_string(),
    };

    parse_document(RcDom::default(), Default::default())
        .from_utf8()
        .read_from(&mut s.as_bytes())
}

/// 以指针身份比较和哈希的节点引用
///
/// rcdom 的 `Handle` 本身没有实现 `Hash`/`Eq`，所有以节点为键的表都通过它完成。
/// 持有 `NodeRef` 即持有一份 `Rc` 克隆，节点在引用存活期间不会被释放。
#[derive(Clone)]
pub struct NodeRef(pub Handle);

impl NodeRef {
    pub fn new(handle: &Handle) -> Self {
        Self(handle.clone())
    }

    pub fn handle(&self) -> &Handle {
        &self.0
    }
}

impl PartialEq for NodeRef {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for NodeRef {}

impl Hash for NodeRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Rc::as_ptr(&self.0) as usize).hash(state);
    }
}

impl std::fmt::Debug for NodeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "NodeRef({}@{:p})",
            get_node_name(&self.0).unwrap_or("#node"),
            Rc::as_ptr(&self.0)
        )
    }
}

/// 获取节点属性值
pub fn get_node_attr(node: &Handle, attr_name: &str) -> Option<String> {
    match &node.data {
        NodeData::Element { attrs, .. } => {
            for attr in attrs.borrow().iter() {
                if &*attr.name.local == attr_name {
                    return Some(attr.value.to_string());
                }
            }
            None
        }
        _ => None,
    }
}

/// 获取节点名称
pub fn get_node_name(node: &Handle) -> Option<&'_ str> {
    match &node.data {
        NodeData::Element { name, .. } => Some(name.local.as_ref()),
        _ => None,
    }
}

/// 判断节点是否为指定标签的元素（忽略大小写）
pub fn is_element_named(node: &Handle, tag: &str) -> bool {
    get_node_name(node).is_some_and(|name| name.eq_ignore_ascii_case(tag))
}

/// 获取父节点
///
/// `parent` 是 `Cell<Option<Weak>>`，读取时必须取出再放回。
pub fn get_parent(child: &Handle) -> Option<Handle> {
    let weak = child.parent.take();
    let parent = weak.as_ref().and_then(|node| node.upgrade());
    child.parent.set(weak);
    parent
}

/// 设置节点属性，`None` 表示删除
pub fn set_node_attr(node: &Handle, attr_name: &str, attr_value: Option<String>) {
    if let NodeData::Element { attrs, .. } = &node.data {
        let attrs_mut = &mut attrs.borrow_mut();
        let mut i = 0;
        let mut found_existing_attr: bool = false;

        while i < attrs_mut.len() {
            if &attrs_mut[i].name.local == attr_name {
                found_existing_attr = true;

                if let Some(attr_value) = attr_value.as_deref() {
                    attrs_mut[i].value.clear();
                    attrs_mut[i].value.push_slice(attr_value);
                } else {
                    attrs_mut.remove(i);
                    continue;
                }
            }

            i += 1;
        }

        if !found_existing_attr {
            if let Some(attr_value) = attr_value {
                attrs_mut.push(Attribute {
                    name: QualName::new(None, ns!(), LocalName::from(attr_name)),
                    value: StrTendril::from_slice(&attr_value),
                });
            }
        }
    };
}

/// 创建一个游离的 HTML 元素
pub fn create_element(tag: &str, attrs: &[(&str, &str)]) -> Handle {
    let attrs = attrs
        .iter()
        .map(|(name, value)| Attribute {
            name: QualName::new(None, ns!(), LocalName::from(*name)),
            value: StrTendril::from_slice(value),
        })
        .collect();

    Node::new(NodeData::Element {
        name: QualName::new(None, ns!(html), LocalName::from(tag)),
        attrs: RefCell::new(attrs),
        template_contents: RefCell::new(None),
        mathml_annotation_xml_integration_point: false,
    })
}

/// 创建一个游离的文本节点
pub fn create_text(text: &str) -> Handle {
    Node::new(NodeData::Text {
        contents: RefCell::new(StrTendril::from_slice(text)),
    })
}

/// 创建嵌套片段的根节点（相当于 shadow root）
pub fn create_fragment_root() -> Handle {
    Node::new(NodeData::Document)
}

/// 追加子节点
pub fn append_child(parent: &Handle, child: &Handle) {
    remove_from_parent(child);
    child.parent.set(Some(Rc::downgrade(parent)));
    parent.children.borrow_mut().push(child.clone());
}

/// 在 `reference` 之后插入子节点；`reference` 不是 `parent` 的子节点时退化为追加
pub fn insert_after(parent: &Handle, reference: &Handle, child: &Handle) {
    remove_from_parent(child);
    child.parent.set(Some(Rc::downgrade(parent)));
    let mut children = parent.children.borrow_mut();
    match children.iter().position(|c| Rc::ptr_eq(c, reference)) {
        Some(index) => children.insert(index + 1, child.clone()),
        None => children.push(child.clone()),
    }
}

/// 把节点从父节点中摘除，没有父节点时什么也不做
pub fn remove_from_parent(node: &Handle) {
    if let Some(parent) = get_parent(node) {
        parent
            .children
            .borrow_mut()
            .retain(|child| !Rc::ptr_eq(child, node));
    }
    node.parent.set(None);
}

/// 读取文本节点内容
pub fn text_of(node: &Handle) -> Option<String> {
    match &node.data {
        NodeData::Text { contents } => Some(contents.borrow().to_string()),
        _ => None,
    }
}

/// 覆盖文本节点内容，非文本节点忽略
pub fn set_text(node: &Handle, text: &str) {
    if let NodeData::Text { contents } = &node.data {
        *contents.borrow_mut() = StrTendril::from_slice(text);
    }
}

/// 判断字符串是否只由空白组成
pub fn is_blank(text: &str) -> bool {
    text.trim().is_empty()
}

/// 拼接子树内全部文本；`skip` 返回 true 的元素连同子树一起跳过
pub fn text_content<F>(node: &Handle, skip: &F) -> String
where
    F: Fn(&Handle) -> bool,
{
    let mut out = String::new();
    collect_text(node, skip, &mut out);
    out
}

fn collect_text<F>(node: &Handle, skip: &F, out: &mut String)
where
    F: Fn(&Handle) -> bool,
{
    match &node.data {
        NodeData::Text { contents } => out.push_str(&contents.borrow()),
        NodeData::Element { .. } if skip(node) => {}
        NodeData::Comment { .. } | NodeData::ProcessingInstruction { .. } => {}
        _ => {
            for child in node.children.borrow().iter() {
                collect_text(child, skip, out);
            }
        }
    }
}

/// 节点自身（非后代）是否含有非空白文本
pub fn has_direct_text(node: &Handle) -> bool {
    node.children
        .borrow()
        .iter()
        .any(|child| text_of(child).is_some_and(|text| !is_blank(&text)))
}

/// 节点是否有元素子节点
pub fn has_element_children(node: &Handle) -> bool {
    node.children
        .borrow()
        .iter()
        .any(|child| matches!(child.data, NodeData::Element { .. }))
}

/// 最后一个非空白的直接文本子节点
pub fn last_direct_text_leaf(node: &Handle) -> Option<Handle> {
    node.children
        .borrow()
        .iter()
        .rev()
        .find(|child| text_of(child).is_some_and(|text| !is_blank(&text)))
        .cloned()
}

/// `ancestor` 是否为 `node` 的严格祖先
pub fn is_ancestor_of(ancestor: &Handle, node: &Handle) -> bool {
    let mut current = get_parent(node);
    while let Some(parent) = current {
        if Rc::ptr_eq(&parent, ancestor) {
            return true;
        }
        current = get_parent(&parent);
    }
    false
}

/// 沿父链向上找到第一个满足条件的祖先（不含自身）
pub fn find_ancestor<F>(node: &Handle, predicate: F) -> Option<Handle>
where
    F: Fn(&Handle) -> bool,
{
    let mut current = get_parent(node);
    while let Some(parent) = current {
        if predicate(&parent) {
            return Some(parent);
        }
        current = get_parent(&parent);
    }
    None
}

/// 树根（没有父节点的最上层节点）
pub fn tree_root(node: &Handle) -> Handle {
    let mut current = node.clone();
    while let Some(parent) = get_parent(&current) {
        current = parent;
    }
    current
}

/// 根据名称获取子节点
pub fn get_child_node_by_name(parent: &Handle, node_name: &str) -> Option<Handle> {
    let children = parent.children.borrow();
    children
        .iter()
        .find(|child| is_element_named(child, node_name))
        .cloned()
}

/// 深度优先收集子树中满足条件的元素（含自身）
pub fn find_elements<F>(node: &Handle, predicate: &F) -> Vec<Handle>
where
    F: Fn(&Handle) -> bool,
{
    let mut found = Vec::new();
    find_elements_into(node, predicate, &mut found);
    found
}

fn find_elements_into<F>(node: &Handle, predicate: &F, found: &mut Vec<Handle>)
where
    F: Fn(&Handle) -> bool,
{
    if matches!(node.data, NodeData::Element { .. }) && predicate(node) {
        found.push(node.clone());
    }
    for child in node.children.borrow().iter() {
        find_elements_into(child, predicate, found);
    }
}
