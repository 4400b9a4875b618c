//! 优雅关闭
//!
//! 各后台任务（消费循环、outbox 中继）共享同一个 `watch` 通道，
//! 主进程收到信号后发送 `true`，任务在当前消息处理完成后退出。

use tokio::sync::watch;

/// 等待关闭信号
///
/// 发送端被丢弃时同样视为关闭，避免任务在无人管理时空转。
pub async fn wait_for_shutdown(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}
