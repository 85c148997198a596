//! HTML 文档模型
//!
//! - `dom`: 节点操作、身份键和文本读写
//! - `style`: 布局显示类别与可见性
//! - `fragments`: 嵌套片段（shadow root）登记
//! - `selector`: 规则选择器
//! - `serializer`: 序列化与字符集

pub mod dom;
pub mod fragments;
pub mod selector;
pub mod serializer;
pub mod style;

// 重新导出主要的公共 API
pub use dom::{
    get_child_node_by_name, get_node_attr, get_node_name, html_to_dom, set_node_attr, NodeRef,
};
pub use fragments::FragmentRegistry;
pub use selector::{SelectorChain, SelectorList, SelectorSpec, SHADOW_SEPARATOR};
pub use serializer::{get_charset, serialize_document};
pub use style::{Display, InlineStyleResolver, StyleResolver};
