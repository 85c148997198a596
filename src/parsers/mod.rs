//! # 解析器模块
//!
//! 目前只有 HTML：文档解析、节点操作、样式与选择器、序列化。

pub mod html;

pub use html::{get_charset, html_to_dom, serialize_document};
