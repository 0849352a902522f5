//! AutoSaveScheduler - debounce 付きの自動保存
//!
//! # フロー
//! 1. `trigger_auto_save()`: 保存対象なら debounce タイマーを（再）開始
//! 2. タイマー満了: 保存対象かを再確認して DocumentSink に書き込む
//! 3. `force_save()`: 保留中のタイマーを取り消して即座に書き込む
//!
//! # 保存対象の判定
//! - dirty でなければ保存しない
//! - 一度も保存されていない新規インスタンスは、ユーザーデータが入るまで保存しない
//!   （フォームの content heuristic、またはデフォルト以外のタイトル）
//! - 一度保存されたら dirty なだけで保存対象
//!
//! 書き込みは write gate で直列化され、同時に走るのは 1 件まで。
//!
//! ステータス: `Idle → Pending → Saving → {Saved | Error}`

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Mutex as AsyncMutex, watch};
use tokio::task::JoinHandle;

use crate::domain::DocumentTaskInstance;
use crate::ports::{Clock, DocumentSink, StageForm};

/// An open document shared between the UI side and the scheduler.
pub type SharedInstance = Arc<AsyncMutex<DocumentTaskInstance>>;

type StatusCallback = Box<dyn Fn(SaveStatus) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveStatus {
    #[default]
    Idle,
    Pending,
    Saving,
    Saved,
    Error,
}

/// Does `instance` qualify for a write right now?
pub fn is_save_eligible(instance: &DocumentTaskInstance, forms: &[Arc<dyn StageForm>]) -> bool {
    if !instance.is_dirty {
        return false;
    }
    if !instance.is_brand_new() || !instance.has_default_title() {
        return true;
    }
    forms.iter().any(|form| {
        instance
            .stage_data
            .payload(form.stage_id())
            .is_some_and(|payload| form.has_user_content(payload))
    })
}

struct Inner {
    instance: SharedInstance,
    sink: Arc<dyn DocumentSink>,
    forms: Vec<Arc<dyn StageForm>>,
    clock: Arc<dyn Clock>,
    debounce: Duration,
    status_tx: watch::Sender<SaveStatus>,
    callbacks: Mutex<Vec<StatusCallback>>,
    /// Generation of the scheduled timer, and its task.
    pending: Mutex<Option<(u64, JoinHandle<()>)>>,
    generation: AtomicU64,
    write_gate: AsyncMutex<()>,
}

impl Inner {
    fn emit(&self, status: SaveStatus) {
        self.status_tx.send_replace(status);
        let callbacks = self.callbacks.lock().unwrap_or_else(PoisonError::into_inner);
        for callback in callbacks.iter() {
            callback(status);
        }
    }

    fn cancel_pending(&self) -> bool {
        let taken = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match taken {
            Some((_, handle)) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Forget the timer slot if it still belongs to `generation`.
    fn release_slot(&self, generation: u64) {
        let mut slot = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|(g, _)| *g == generation) {
            *slot = None;
        }
    }

    async fn eligible(&self) -> bool {
        let instance = self.instance.lock().await;
        is_save_eligible(&instance, &self.forms)
    }

    /// One write. `gated` re-checks eligibility first (the debounced path).
    async fn persist(&self, gated: bool) -> bool {
        let _gate = self.write_gate.lock().await;

        let (snapshot, revision) = {
            let instance = self.instance.lock().await;
            if gated && !is_save_eligible(&instance, &self.forms) {
                // 直前の force_save が書き終えていれば Saved のまま
                let still_dirty = instance.is_dirty;
                drop(instance);
                if still_dirty {
                    self.emit(SaveStatus::Idle);
                }
                return false;
            }
            (instance.clone(), instance.revision())
        };

        self.emit(SaveStatus::Saving);
        match self.sink.persist(&snapshot).await {
            Ok(receipt) => {
                let mut instance = self.instance.lock().await;
                instance.mark_saved(receipt.document_id.clone(), self.clock.now(), revision);
                let still_dirty = instance.is_dirty;
                drop(instance);
                tracing::debug!(document_id = %receipt.document_id, still_dirty, "document saved");
                self.emit(SaveStatus::Saved);
                true
            }
            Err(err) => {
                tracing::warn!(
                    project_id = %snapshot.project_id,
                    error = %err,
                    "document save failed"
                );
                self.emit(SaveStatus::Error);
                false
            }
        }
    }
}

pub struct AutoSaveScheduler {
    inner: Arc<Inner>,
}

impl AutoSaveScheduler {
    pub fn new(
        instance: SharedInstance,
        sink: Arc<dyn DocumentSink>,
        forms: Vec<Arc<dyn StageForm>>,
        clock: Arc<dyn Clock>,
        debounce: Duration,
    ) -> Self {
        let (status_tx, _) = watch::channel(SaveStatus::Idle);
        Self {
            inner: Arc::new(Inner {
                instance,
                sink,
                forms,
                clock,
                debounce,
                status_tx,
                callbacks: Mutex::new(Vec::new()),
                pending: Mutex::new(None),
                generation: AtomicU64::new(0),
                write_gate: AsyncMutex::new(()),
            }),
        }
    }

    pub fn instance(&self) -> SharedInstance {
        Arc::clone(&self.inner.instance)
    }

    pub fn status(&self) -> SaveStatus {
        *self.inner.status_tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SaveStatus> {
        self.inner.status_tx.subscribe()
    }

    pub fn on_status_change(&self, callback: impl Fn(SaveStatus) + Send + Sync + 'static) {
        self.inner
            .callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Box::new(callback));
    }

    pub async fn is_eligible(&self) -> bool {
        self.inner.eligible().await
    }

    pub fn has_pending(&self) -> bool {
        self.inner
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Start (or restart) the debounce window. Returns false when the instance does not
    /// qualify for a write, in which case nothing is scheduled.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn trigger_auto_save(&self) -> bool {
        if !self.inner.eligible().await {
            return false;
        }

        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(inner.debounce).await;
            inner.release_slot(generation);
            inner.persist(true).await;
        });

        let previous = self
            .inner
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace((generation, handle));
        if let Some((_, old)) = previous {
            old.abort();
        }
        self.inner.emit(SaveStatus::Pending);
        true
    }

    /// Write now, bypassing the debounce and the content gate. Cancels any pending timer.
    pub async fn force_save(&self) -> bool {
        self.inner.cancel_pending();
        self.inner.persist(false).await
    }

    /// Drop an unfired timer. Returns whether one was pending.
    pub fn cancel_pending(&self) -> bool {
        let cancelled = self.inner.cancel_pending();
        if cancelled && self.status() == SaveStatus::Pending {
            self.inner.emit(SaveStatus::Idle);
        }
        cancelled
    }
}

impl Drop for AutoSaveScheduler {
    fn drop(&mut self) {
        self.inner.cancel_pending();
    }
}
