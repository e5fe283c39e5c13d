//! 兑换状态后台对账任务

use std::{sync::Arc, time::Duration};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::error::{AppError, AppResult};
use crate::service::swap_orchestrator::SwapOrchestrator;

/// 周期性调用 `reconcile_pending` 的后台任务
pub struct ReconciliationWorker {
    orchestrator: Arc<SwapOrchestrator>,
    interval: Duration,
}

/// 运行中的任务句柄，`shutdown` 后等待当前一轮结束
pub struct WorkerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl WorkerHandle {
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            tracing::error!(error = ?e, "reconciliation worker terminated abnormally");
        }
    }
}

impl ReconciliationWorker {
    /// 间隔必须大于 0
    pub fn new(orchestrator: Arc<SwapOrchestrator>, interval: Duration) -> AppResult<Self> {
        if interval.is_zero() {
            return Err(AppError::Config(
                "reconciliation interval must be greater than 0".into(),
            ));
        }
        Ok(Self {
            orchestrator,
            interval,
        })
    }

    /// 启动后台任务
    pub fn spawn(self) -> WorkerHandle {
        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(self.run(rx));
        WorkerHandle { shutdown: tx, task }
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            "Swap reconciliation worker started, interval={}s",
            self.interval.as_secs()
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.orchestrator.reconcile_pending().await {
                        Ok(updated) => {
                            if updated > 0 {
                                tracing::info!(count = updated, "Reconciled pending swaps");
                            } else {
                                tracing::debug!("Reconciliation pass found no changes");
                            }
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "Reconciliation pass failed");
                        }
                    }
                }
                changed = shutdown.changed() => {
                    // 发送端被丢弃同样视为停止
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Swap reconciliation worker stopped");
    }
}
