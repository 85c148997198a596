//! 嵌套片段（shadow root）登记表
//!
//! rcdom 没有 shadow DOM 的概念。宿主环境在为元素挂载封装的子文档时，
//! 通过显式的注册钩子把“宿主元素 → 片段根”登记到这里，分段器、收集器和
//! 变更协调器都从这张表读取嵌套片段。

use std::cell::RefCell;
use std::collections::HashMap;

use markup5ever_rcdom::Handle;

use super::dom::{get_parent, tree_root, NodeRef};

#[derive(Default)]
pub struct FragmentRegistry {
    by_host: RefCell<HashMap<NodeRef, Handle>>,
    by_root: RefCell<HashMap<NodeRef, Handle>>,
}

impl FragmentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记宿主元素的片段根；返回 false 表示同一片段已登记过
    pub fn attach(&self, host: &Handle, root: &Handle) -> bool {
        let host_key = NodeRef::new(host);
        if let Some(existing) = self.by_host.borrow().get(&host_key) {
            if std::rc::Rc::ptr_eq(existing, root) {
                return false;
            }
        }
        if let Some(previous) = self.by_host.borrow_mut().insert(host_key, root.clone()) {
            self.by_root.borrow_mut().remove(&NodeRef::new(&previous));
        }
        self.by_root
            .borrow_mut()
            .insert(NodeRef::new(root), host.clone());
        true
    }

    /// 移除宿主元素的片段登记
    pub fn detach(&self, host: &Handle) -> Option<Handle> {
        let root = self.by_host.borrow_mut().remove(&NodeRef::new(host))?;
        self.by_root.borrow_mut().remove(&NodeRef::new(&root));
        Some(root)
    }

    pub fn fragment_of(&self, host: &Handle) -> Option<Handle> {
        self.by_host.borrow().get(&NodeRef::new(host)).cloned()
    }

    pub fn host_of(&self, root: &Handle) -> Option<Handle> {
        self.by_root.borrow().get(&NodeRef::new(root)).cloned()
    }

    pub fn is_fragment_root(&self, node: &Handle) -> bool {
        self.by_root.borrow().contains_key(&NodeRef::new(node))
    }

    pub fn len(&self) -> usize {
        self.by_host.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_host.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.by_host.borrow_mut().clear();
        self.by_root.borrow_mut().clear();
    }

    /// 父节点；片段根的父节点是它的宿主元素
    pub fn composed_parent(&self, node: &Handle) -> Option<Handle> {
        get_parent(node).or_else(|| self.host_of(node))
    }

    /// 从近到远的祖先链（穿过片段边界）
    pub fn composed_ancestors(&self, node: &Handle) -> Vec<Handle> {
        let mut ancestors = Vec::new();
        let mut current = self.composed_parent(node);
        while let Some(parent) = current {
            current = self.composed_parent(&parent);
            ancestors.push(parent);
        }
        ancestors
    }

    /// `ancestor` 是否为 `node` 的严格祖先（穿过片段边界）
    pub fn is_composed_ancestor(&self, ancestor: &Handle, node: &Handle) -> bool {
        let mut current = self.composed_parent(node);
        while let Some(parent) = current {
            if std::rc::Rc::ptr_eq(&parent, ancestor) {
                return true;
            }
            current = self.composed_parent(&parent);
        }
        false
    }

    /// 节点所在的文档根（穿过片段边界）
    pub fn composed_root(&self, node: &Handle) -> Handle {
        let mut root = tree_root(node);
        while let Some(host) = self.host_of(&root) {
            root = tree_root(&host);
        }
        root
    }

    /// 节点是否挂在 `document` 上（穿过片段边界）
    ///
    /// 未挂载的片段根本身也是 `Document` 节点，只能按身份比较。
    pub fn is_connected(&self, node: &Handle, document: &Handle) -> bool {
        std::rc::Rc::ptr_eq(&self.composed_root(node), document)
    }

    /// 按文档顺序深度优先遍历，包括嵌套片段
    ///
    /// 宿主元素的片段内容排在它的普通子节点之前。`visit` 返回 false 时不进入该节点的子树。
    pub fn walk_composed<F>(&self, node: &Handle, visit: &mut F)
    where
        F: FnMut(&Handle) -> bool,
    {
        if !visit(node) {
            return;
        }
        if let Some(fragment) = self.fragment_of(node) {
            self.walk_composed(&fragment, visit);
        }
        let children: Vec<Handle> = node.children.borrow().clone();
        for child in children.iter() {
            self.walk_composed(child, visit);
        }
    }
}
