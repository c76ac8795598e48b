use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::task::JoinHandle;

/// 实时订阅句柄
///
/// 关闭或丢弃时取消订阅任务，并把所属组件标记为已分离，
/// 之后到达的回调一律忽略。
#[derive(Debug)]
pub struct FeedHandle {
    task: Option<JoinHandle<()>>,
    detached: Arc<AtomicBool>,
}

impl FeedHandle {
    pub(crate) fn new(task: JoinHandle<()>, detached: Arc<AtomicBool>) -> Self {
        Self {
            task: Some(task),
            detached,
        }
    }

    /// 订阅是否已经结束（被存储端取消或连接断开）
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }

    pub fn close(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(task) = self.task.take() {
            self.detached.store(true, Ordering::SeqCst);
            task.abort();
        }
    }
}

impl Drop for FeedHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
