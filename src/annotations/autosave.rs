//! 自動保存
//!
//! 編集のたびに `touch` し、最後の編集から一定時間たったら `flush` する。
//! 失敗した変更はストアに残るので、次の編集か `flush_now` で再送される。

use super::backend::AnnotationBackend;
use super::store::{AnnotationStore, FlushOutcome};
use crate::error::{DashError, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

enum Command {
    Touch,
    FlushNow(oneshot::Sender<Result<FlushOutcome>>),
    Shutdown(oneshot::Sender<Result<FlushOutcome>>),
}

pub struct AutoSaver {
    commands: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
}

impl AutoSaver {
    /// 自動保存タスクを起動（tokio ランタイム内で呼ぶ）
    pub fn spawn<B: AnnotationBackend>(store: Arc<AnnotationStore<B>>, delay: Duration) -> Self {
        let (commands, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(store, delay, rx));
        Self { commands, task }
    }

    /// 編集があったことを知らせる（保存予定を後ろにずらす）
    pub fn touch(&self) {
        let _ = self.commands.send(Command::Touch);
    }

    /// 待たずに保存
    pub async fn flush_now(&self) -> Result<FlushOutcome> {
        self.request(Command::FlushNow).await
    }

    /// 最後に保存してタスクを止める
    pub async fn shutdown(self) -> Result<FlushOutcome> {
        let outcome = self.request(Command::Shutdown).await;
        if let Err(e) = self.task.await {
            warn!(error = %e, "自動保存タスクが異常終了しました");
        }
        outcome
    }

    async fn request(
        &self,
        make: impl FnOnce(oneshot::Sender<Result<FlushOutcome>>) -> Command,
    ) -> Result<FlushOutcome> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .map_err(|_| DashError::Backend("自動保存タスクが停止しています".into()))?;
        rx.await
            .map_err(|_| DashError::Backend("自動保存タスクが応答しませんでした".into()))?
    }
}

async fn run<B: AnnotationBackend>(
    store: Arc<AnnotationStore<B>>,
    delay: Duration,
    mut commands: mpsc::UnboundedReceiver<Command>,
) {
    let mut deadline: Option<Instant> = None;

    loop {
        let wake_at = deadline;
        let timer = async move {
            match wake_at {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Touch) => {
                    deadline = Some(Instant::now() + delay);
                }
                Some(Command::FlushNow(reply)) => {
                    deadline = None;
                    let _ = reply.send(store.flush().await);
                }
                Some(Command::Shutdown(reply)) => {
                    let _ = reply.send(store.flush().await);
                    break;
                }
                None => {
                    // ハンドルが drop された
                    if let Err(e) = store.flush().await {
                        warn!(error = %e, "終了時の保存に失敗しました");
                    }
                    break;
                }
            },
            _ = timer => {
                deadline = None;
                match store.flush().await {
                    Ok(FlushOutcome::Skipped) => {
                        deadline = Some(Instant::now() + delay);
                    }
                    Ok(outcome) => debug!(?outcome, "自動保存しました"),
                    Err(e) => warn!(error = %e, "自動保存に失敗しました。次の編集で再試行します"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotations::{MemoryBackend, NoteEdit};

    #[tokio::test(start_paused = true)]
    async fn test_debounce_waits_for_quiet_period() {
        let backend = MemoryBackend::new();
        let store = Arc::new(AnnotationStore::new(backend.clone()));
        let saver = AutoSaver::spawn(Arc::clone(&store), Duration::from_millis(2000));

        store.update("RV1", NoteEdit::discussion("a"));
        saver.touch();
        tokio::time::sleep(Duration::from_millis(1500)).await;
        store.update("RV1", NoteEdit::discussion("ab"));
        saver.touch();
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(backend.stored().is_empty());

        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(backend.stored()["RV1"].discussion_note, "ab");
        assert!(!store.has_unsaved_changes());

        saver.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_flush_now_and_shutdown() {
        let backend = MemoryBackend::new();
        let store = Arc::new(AnnotationStore::new(backend.clone()));
        let saver = AutoSaver::spawn(Arc::clone(&store), Duration::from_secs(60));

        store.update("RV1", NoteEdit::follow_up("yes"));
        saver.touch();
        let outcome = saver.flush_now().await.unwrap();
        assert_eq!(outcome, FlushOutcome::Persisted { upserted: 1, deleted: 0 });

        store.delete("RV1");
        let outcome = saver.shutdown().await.unwrap();
        assert_eq!(outcome, FlushOutcome::Persisted { upserted: 0, deleted: 1 });
        assert!(backend.stored().is_empty());
    }
}
