//! 文档变更协调
//!
//! 宿主把结构变更批量交给 [`MutationReconciler::handle`]。新插入的节点先攒起来，
//! 防抖后再跑一次候选收集；被移除的节点立即丢弃记录；属性变更只用来发现
//! 新挂载的嵌套片段。控制器整体重建期间忽略所有变更。

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use markup5ever_rcdom::{Handle, NodeData};
use tokio::task::JoinHandle;

use super::controller::RenderController;

/// 一批结构变更
#[derive(Clone, Default)]
pub struct MutationRecord {
    pub added: Vec<Handle>,
    pub removed: Vec<Handle>,
    pub attribute_changed: Vec<Handle>,
}

impl MutationRecord {
    pub fn added(nodes: Vec<Handle>) -> Self {
        Self {
            added: nodes,
            ..Self::default()
        }
    }

    pub fn removed(nodes: Vec<Handle>) -> Self {
        Self {
            removed: nodes,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.attribute_changed.is_empty()
    }
}

pub struct MutationReconciler {
    controller: RenderController,
    pending: Rc<RefCell<Vec<Handle>>>,
    flush_task: RefCell<Option<JoinHandle<()>>>,
    debounce: Duration,
}

impl MutationReconciler {
    pub fn new(controller: RenderController) -> Self {
        let debounce = Duration::from_millis(controller.config().setting.mutation_debounce_ms);
        Self {
            controller,
            pending: Rc::new(RefCell::new(Vec::new())),
            flush_task: RefCell::new(None),
            debounce,
        }
    }

    pub fn controller(&self) -> &RenderController {
        &self.controller
    }

    pub fn pending_len(&self) -> usize {
        self.pending.borrow().len()
    }

    /// 宿主挂载嵌套片段时调用；宿主元素已在文档中时立即收集片段内的候选
    pub fn attach_fragment(&self, host: &Handle, root: &Handle) -> usize {
        if !self.controller.fragments().attach(host, root) {
            return 0;
        }
        let connected = self
            .controller
            .fragments()
            .is_connected(host, self.controller.root());
        if self.controller.is_reflowing() || !connected {
            return 0;
        }
        self.controller.invalidate_segments();
        let registered = self.controller.scan(host);
        tracing::debug!("嵌套片段挂载，新注册 {} 个目标", registered);
        registered
    }

    /// 处理一批变更，需要在 `LocalSet` 内调用
    pub fn handle(&self, records: &[MutationRecord]) {
        if self.controller.is_reflowing() {
            return;
        }
        if records.iter().all(MutationRecord::is_empty) {
            return;
        }
        self.controller.invalidate_segments();

        let mut queued = false;
        for record in records {
            for node in record.removed.iter() {
                self.controller.forget(node);
            }
            for node in record.added.iter() {
                if !matches!(node.data, NodeData::Element { .. }) || self.contains_marker(node) {
                    continue;
                }
                if self.controller.fragments().fragment_of(node).is_some() {
                    // 带片段的新节点立即处理
                    self.controller.scan(node);
                    continue;
                }
                self.pending.borrow_mut().push(node.clone());
                queued = true;
            }
            for node in record.attribute_changed.iter() {
                if self.controller.fragments().fragment_of(node).is_some() {
                    self.controller.scan(node);
                }
            }
        }

        if queued {
            self.schedule_flush();
        }
    }

    fn contains_marker(&self, node: &Handle) -> bool {
        let mut found = false;
        self.controller.fragments().walk_composed(node, &mut |n| {
            if self.controller.is_engine_marker(n) {
                found = true;
            }
            !found
        });
        found
    }

    /// 重新开始防抖计时
    fn schedule_flush(&self) {
        if let Some(task) = self.flush_task.borrow_mut().take() {
            task.abort();
        }
        let controller = self.controller.clone();
        let pending = self.pending.clone();
        let delay = self.debounce;
        let task = tokio::task::spawn_local(async move {
            tokio::time::sleep(delay).await;
            flush_pending(&controller, &pending);
        });
        *self.flush_task.borrow_mut() = Some(task);
    }

    /// 立即处理攒下的插入节点，返回新注册的数量
    pub fn flush(&self) -> usize {
        if let Some(task) = self.flush_task.borrow_mut().take() {
            task.abort();
        }
        flush_pending(&self.controller, &self.pending)
    }

    /// 等待防抖任务结束
    pub async fn settle(&self) {
        let task = self.flush_task.borrow_mut().take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

fn flush_pending(controller: &RenderController, pending: &RefCell<Vec<Handle>>) -> usize {
    let nodes: Vec<Handle> = pending.borrow_mut().drain(..).collect();
    if controller.is_reflowing() || nodes.is_empty() {
        return 0;
    }
    let registered: usize = nodes
        .iter()
        .filter(|node| controller.fragments().is_connected(node, controller.root()))
        .map(|node| controller.scan(node))
        .sum();
    tracing::debug!(
        "处理 {} 个插入节点，新注册 {} 个目标",
        nodes.len(),
        registered
    );
    registered
}

impl Drop for MutationReconciler {
    fn drop(&mut self) {
        if let Some(task) = self.flush_task.get_mut().take() {
            task.abort();
        }
    }
}
