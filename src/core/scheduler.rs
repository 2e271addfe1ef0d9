//! 后台任务调度
//!
//! 编排器总是持有一个调度器能力，从不判断「调度器是否存在」。后台任务
//! （开放实体抽取、上报）都是纯增量操作，进程关闭时整体丢弃也不会损坏状态。

use std::sync::Mutex;

use futures_util::future::BoxFuture;
use tokio_util::sync::CancellationToken;

/// 任务调度接口：投递一个已装箱的后台任务
pub trait TaskScheduler: Send + Sync {
    fn spawn(&self, task: BoxFuture<'static, ()>);
}

/// Tokio 调度器：任务挂在取消令牌下，shutdown 时未完成的任务被放弃
pub struct TokioScheduler {
    cancel: CancellationToken,
}

impl TokioScheduler {
    pub fn new() -> Self {
        Self {
            cancel: CancellationToken::new(),
        }
    }

    /// 放弃所有在飞的后台任务
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

impl Default for TokioScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskScheduler for TokioScheduler {
    fn spawn(&self, task: BoxFuture<'static, ()>) {
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = task => {}
            }
        });
    }
}

/// 空调度器：直接丢弃任务（同步上下文或不需要后台工作的测试）
pub struct NoopScheduler;

impl TaskScheduler for NoopScheduler {
    fn spawn(&self, _task: BoxFuture<'static, ()>) {}
}

/// 收集式调度器：任务攒着不跑，测试里显式 drain 后逐个 await，执行时机完全确定
#[derive(Default)]
pub struct CollectingScheduler {
    tasks: Mutex<Vec<BoxFuture<'static, ()>>>,
}

impl CollectingScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drain(&self) -> Vec<BoxFuture<'static, ()>> {
        std::mem::take(&mut self.tasks.lock().unwrap())
    }

    pub fn pending(&self) -> usize {
        self.tasks.lock().unwrap().len()
    }
}

impl TaskScheduler for CollectingScheduler {
    fn spawn(&self, task: BoxFuture<'static, ()>) {
        self.tasks.lock().unwrap().push(task);
    }
}
