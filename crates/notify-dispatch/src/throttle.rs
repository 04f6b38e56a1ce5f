//! 키 단위 메시지 throttle 및 배치 전송.
//!
//! (카테고리, 서브키) 쌍마다 마지막 전송 시각과 대기 메시지 큐를 관리합니다.
//!
//! - [`ThrottleRegistry::decide`]: 지금 바로 보내도 되는지 판단하고, 허용 시 윈도우를 재시작
//! - [`ThrottleRegistry::enqueue`]: 윈도우 안의 메시지를 큐에 쌓고, 키당 하나의 flush 타이머를 예약
//! - [`ThrottleRegistry::cleanup`]: 모든 타이머 취소 및 상태 폐기 (종료 시 호출)
//!
//! 상태 맵 전체를 하나의 mutex가 보호합니다. flush 태스크는 대기(sleep) 중에는
//! 락을 잡지 않고, 큐를 비우는 순간에만 잡습니다. 전송은 항상 락 밖에서 수행됩니다.
//!
//! 전송 실패는 재시도하지 않습니다 (at-most-once).

use std::collections::hash_map::Entry;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::types::{NotificationCategory, SendFn};

/// 배치 메시지 사이 구분자.
pub const BATCH_SEPARATOR: &str = "\n---\n";

/// 키당 대기 메시지 기본 상한.
pub const DEFAULT_MAX_PENDING: usize = 50;

/// throttle 상태 식별자.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ThrottleKey {
    pub category: NotificationCategory,
    pub subkey: String,
}

impl ThrottleKey {
    pub fn new(category: NotificationCategory, subkey: impl Into<String>) -> Self {
        Self {
            category,
            subkey: subkey.into(),
        }
    }
}

/// 예약된 flush 타이머.
///
/// `id`는 flush 태스크가 깨어났을 때 자신이 아직 유효한 타이머인지 확인하는 데 사용합니다.
#[derive(Debug)]
struct FlushTimer {
    id: u64,
    cancel: CancellationToken,
}

/// 키별 가변 상태.
#[derive(Debug, Default)]
struct ThrottleState {
    /// 마지막 전송(즉시 전송 승인 또는 flush) 시각
    last_sent: Option<Instant>,
    /// flush 대기 메시지 (삽입 순서 유지)
    pending: VecDeque<String>,
    /// 마지막 flush 이후 상한 초과로 버려진 메시지 수
    dropped: usize,
    /// 활성 flush 타이머 (키당 최대 1개)
    timer: Option<FlushTimer>,
}

struct RegistryInner {
    states: Mutex<HashMap<ThrottleKey, ThrottleState>>,
    max_pending: usize,
    next_timer_id: AtomicU64,
    /// 큐를 비우고 전송 중인 flush 수
    in_flight: AtomicUsize,
}

/// 키 단위 throttle 레지스트리.
///
/// 복제 비용이 낮은 핸들이며, 복제본은 모두 같은 상태를 공유합니다.
#[derive(Clone)]
pub struct ThrottleRegistry {
    inner: Arc<RegistryInner>,
}

impl Default for ThrottleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ThrottleRegistry {
    /// 기본 대기 상한([`DEFAULT_MAX_PENDING`])으로 생성합니다.
    pub fn new() -> Self {
        Self::with_max_pending(DEFAULT_MAX_PENDING)
    }

    /// 키당 대기 메시지 상한을 지정하여 생성합니다. 0이면 무제한입니다.
    ///
    /// 상한에 도달하면 가장 오래된 메시지를 버립니다.
    pub fn with_max_pending(max_pending: usize) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                states: Mutex::new(HashMap::new()),
                max_pending,
                next_timer_id: AtomicU64::new(1),
                in_flight: AtomicUsize::new(0),
            }),
        }
    }

    /// 지금 즉시 전송해도 되는지 판단합니다.
    ///
    /// `interval`이 0이면 상태를 건드리지 않고 항상 `true`입니다.
    /// 처음 보는 키이거나 마지막 전송 후 `interval` 이상 지났으면 마지막 전송 시각을
    /// 현재로 갱신하고 `true`를 반환합니다.
    pub async fn decide(
        &self,
        category: NotificationCategory,
        interval: Duration,
        subkey: &str,
    ) -> bool {
        if interval.is_zero() {
            return true;
        }

        let key = ThrottleKey::new(category, subkey);
        let mut states = self.inner.states.lock().await;
        let now = Instant::now();

        match states.entry(key) {
            Entry::Vacant(slot) => {
                slot.insert(ThrottleState {
                    last_sent: Some(now),
                    ..Default::default()
                });
                true
            }
            Entry::Occupied(mut slot) => {
                let state = slot.get_mut();
                match state.last_sent {
                    Some(last) if now.duration_since(last) < interval => false,
                    _ => {
                        state.last_sent = Some(now);
                        true
                    }
                }
            }
        }
    }

    /// 메시지를 배치 큐에 추가합니다.
    ///
    /// `interval`이 0이면 큐를 거치지 않고 `send_fn`으로 즉시 전송합니다.
    /// 키에 예약된 flush가 없으면 `interval` 후 실행되는 flush를 하나 예약하며,
    /// 이미 예약되어 있으면 그 배치에 합류합니다. 배치는 예약 시점의 `send_fn`으로 전송됩니다.
    pub async fn enqueue(
        &self,
        category: NotificationCategory,
        interval: Duration,
        message: String,
        send_fn: SendFn,
        subkey: &str,
    ) {
        let key = ThrottleKey::new(category, subkey);

        if interval.is_zero() {
            deliver(&send_fn, message, &key).await;
            return;
        }

        let mut states = self.inner.states.lock().await;
        let state = states.entry(key.clone()).or_default();

        let max_pending = self.inner.max_pending;
        if max_pending > 0 && state.pending.len() >= max_pending {
            state.pending.pop_front();
            state.dropped += 1;
            warn!(
                category = %key.category,
                key = %key.subkey,
                max_pending,
                "Pending queue full, dropping oldest message"
            );
        }
        state.pending.push_back(message);

        if state.timer.is_some() {
            debug!(
                category = %key.category,
                key = %key.subkey,
                pending = state.pending.len(),
                "Joined scheduled batch"
            );
            return;
        }

        let id = self.inner.next_timer_id.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        state.timer = Some(FlushTimer {
            id,
            cancel: cancel.clone(),
        });

        debug!(
            category = %key.category,
            key = %key.subkey,
            interval_secs = interval.as_secs_f64(),
            "Scheduled batch flush"
        );

        let registry = self.clone();
        tokio::spawn(async move {
            registry.run_flush(key, id, interval, cancel, send_fn).await;
        });
    }

    /// 모든 flush 타이머를 취소하고 상태를 폐기합니다.
    ///
    /// 이미 큐를 비운 flush는 전송을 마칩니다. 이후 호출에서 모든 키는 처음 보는 키로 취급됩니다.
    pub async fn cleanup(&self) {
        let mut states = self.inner.states.lock().await;

        let mut cancelled = 0usize;
        for state in states.values_mut() {
            if let Some(timer) = state.timer.take() {
                timer.cancel.cancel();
                cancelled += 1;
            }
        }
        let discarded = states.len();
        states.clear();

        info!(cancelled, discarded, "Throttle registry cleaned up");
    }

    /// 현재 추적 중인 키 수.
    pub async fn tracked_keys(&self) -> usize {
        self.inner.states.lock().await.len()
    }

    /// 키의 대기 메시지 수.
    pub async fn pending_count(&self, category: NotificationCategory, subkey: &str) -> usize {
        let key = ThrottleKey::new(category, subkey);
        self.inner
            .states
            .lock()
            .await
            .get(&key)
            .map(|s| s.pending.len())
            .unwrap_or(0)
    }

    /// 키에 예약된 flush가 있는지 확인.
    pub async fn has_timer(&self, category: NotificationCategory, subkey: &str) -> bool {
        let key = ThrottleKey::new(category, subkey);
        self.inner
            .states
            .lock()
            .await
            .get(&key)
            .is_some_and(|s| s.timer.is_some())
    }

    /// 예약되었거나 전송 중인 flush 수.
    ///
    /// 0이면 대기 중인 배치가 모두 처리된 상태입니다.
    pub async fn scheduled_flushes(&self) -> usize {
        let states = self.inner.states.lock().await;
        let scheduled = states.values().filter(|s| s.timer.is_some()).count();
        scheduled + self.inner.in_flight.load(Ordering::SeqCst)
    }

    async fn run_flush(
        self,
        key: ThrottleKey,
        id: u64,
        interval: Duration,
        cancel: CancellationToken,
        send_fn: SendFn,
    ) {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(category = %key.category, key = %key.subkey, "Batch flush cancelled");
                return;
            }
            _ = tokio::time::sleep(interval) => {}
        }

        let (messages, dropped, _in_flight) = {
            let mut states = self.inner.states.lock().await;
            let Some(state) = states.get_mut(&key) else {
                return;
            };
            // cleanup 이후 같은 키로 새 타이머가 예약되었을 수 있음
            if state.timer.as_ref().map(|t| t.id) != Some(id) {
                return;
            }
            state.timer = None;
            if state.pending.is_empty() {
                return;
            }
            state.last_sent = Some(Instant::now());
            let dropped = std::mem::take(&mut state.dropped);
            // 타이머 해제와 같은 임계 구역에서 증가시켜 scheduled_flushes가 전송 중인 배치를 놓치지 않음
            let guard = InFlightGuard::enter(&self.inner.in_flight);
            (state.pending.drain(..).collect::<Vec<_>>(), dropped, guard)
        };

        debug!(
            category = %key.category,
            key = %key.subkey,
            count = messages.len(),
            dropped,
            "Flushing batch"
        );

        let text = combine_batch(messages, dropped);
        deliver(&send_fn, text, &key).await;
    }
}

/// 전송 중인 flush 수를 세는 가드. 전송 future가 panic 해도 drop 시 감소합니다.
struct InFlightGuard<'a> {
    counter: &'a AtomicUsize,
}

impl<'a> InFlightGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self { counter }
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

/// 대기 메시지를 한 건의 전송 텍스트로 합칩니다.
///
/// 메시지가 하나뿐이고 버려진 메시지가 없으면 그대로 반환합니다.
pub fn combine_batch(mut messages: Vec<String>, dropped: usize) -> String {
    if messages.len() == 1 && dropped == 0 {
        return messages.remove(0);
    }

    let mut header = format!("📊 <b>Batched Updates ({})</b>", messages.len());
    if dropped > 0 {
        header.push_str(&format!(" <i>(+{dropped} older dropped)</i>"));
    }

    format!("{header}\n\n{}", messages.join(BATCH_SEPARATOR))
}

async fn deliver(send_fn: &SendFn, text: String, key: &ThrottleKey) {
    if let Err(e) = send_fn(text).await {
        error!(
            category = %key.category,
            key = %key.subkey,
            error = %e,
            "Notification delivery failed, message dropped"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NotificationError, NotificationResult};
    use futures::future::BoxFuture;
    use std::sync::atomic::AtomicUsize;

    type Sent = Arc<std::sync::Mutex<Vec<String>>>;

    fn recorder() -> (SendFn, Sent) {
        let sent: Sent = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = Arc::clone(&sent);
        let send_fn: SendFn = Arc::new(move |text: String| -> BoxFuture<'static, NotificationResult<()>> {
            let sink = Arc::clone(&sink);
            Box::pin(async move {
                sink.lock().unwrap().push(text);
                Ok(())
            })
        });
        (send_fn, sent)
    }

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    const PRICE: NotificationCategory = NotificationCategory::PriceAlert;

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_always_immediate() {
        let registry = ThrottleRegistry::new();
        let (send_fn, sent) = recorder();

        for _ in 0..5 {
            assert!(registry.decide(PRICE, Duration::ZERO, "BTCUSDT").await);
        }
        registry
            .enqueue(PRICE, Duration::ZERO, "now".into(), send_fn, "BTCUSDT")
            .await;

        assert_eq!(*sent.lock().unwrap(), vec!["now".to_string()]);
        assert_eq!(registry.tracked_keys().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_decide_window() {
        let registry = ThrottleRegistry::new();

        assert!(registry.decide(PRICE, secs(60), "BTCUSDT").await);
        tokio::time::sleep(secs(59)).await;
        assert!(!registry.decide(PRICE, secs(60), "BTCUSDT").await);
        tokio::time::sleep(secs(1)).await;
        assert!(registry.decide(PRICE, secs(60), "BTCUSDT").await);
        assert!(!registry.decide(PRICE, secs(60), "BTCUSDT").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_are_independent() {
        let registry = ThrottleRegistry::new();

        assert!(registry.decide(PRICE, secs(60), "BTCUSDT").await);
        assert!(registry.decide(PRICE, secs(60), "ETHUSDT").await);
        assert!(
            registry
                .decide(NotificationCategory::SystemAlert, secs(60), "BTCUSDT")
                .await
        );
        assert!(!registry.decide(PRICE, secs(60), "BTCUSDT").await);
        assert_eq!(registry.tracked_keys().await, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_price_alert_scenario() {
        let registry = ThrottleRegistry::new();
        let (send_fn, sent) = recorder();
        let interval = secs(60);

        // t=0
        assert!(registry.decide(PRICE, interval, "BTCUSDT").await);

        // t=10
        tokio::time::sleep(secs(10)).await;
        assert!(!registry.decide(PRICE, interval, "BTCUSDT").await);
        registry
            .enqueue(PRICE, interval, "A".into(), Arc::clone(&send_fn), "BTCUSDT")
            .await;

        // t=40
        tokio::time::sleep(secs(30)).await;
        registry
            .enqueue(PRICE, interval, "B".into(), Arc::clone(&send_fn), "BTCUSDT")
            .await;
        assert_eq!(registry.pending_count(PRICE, "BTCUSDT").await, 2);
        assert!(sent.lock().unwrap().is_empty());

        // t=71
        tokio::time::sleep(secs(31)).await;
        {
            let sent = sent.lock().unwrap();
            assert_eq!(sent.len(), 1);
            assert_eq!(sent[0], "📊 <b>Batched Updates (2)</b>\n\nA\n---\nB");
        }
        assert!(!registry.has_timer(PRICE, "BTCUSDT").await);

        // t=75: flush(t=70) 기준 5초 경과
        tokio::time::sleep(secs(4)).await;
        assert!(!registry.decide(PRICE, interval, "BTCUSDT").await);

        // t=130
        tokio::time::sleep(secs(55)).await;
        assert!(registry.decide(PRICE, interval, "BTCUSDT").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_message_sent_verbatim() {
        let registry = ThrottleRegistry::new();
        let (send_fn, sent) = recorder();

        registry
            .enqueue(PRICE, secs(5), "only".into(), send_fn, "SOL")
            .await;
        assert_eq!(registry.scheduled_flushes().await, 1);
        tokio::time::sleep(secs(6)).await;

        assert_eq!(*sent.lock().unwrap(), vec!["only".to_string()]);
        assert_eq!(registry.scheduled_flushes().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_enqueue_single_timer() {
        let registry = ThrottleRegistry::new();
        let (send_fn, sent) = recorder();

        tokio::join!(
            registry.enqueue(PRICE, secs(30), "one".into(), Arc::clone(&send_fn), "X"),
            registry.enqueue(PRICE, secs(30), "two".into(), Arc::clone(&send_fn), "X"),
        );
        assert!(registry.has_timer(PRICE, "X").await);

        tokio::time::sleep(secs(31)).await;
        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("Batched Updates (2)"));
        assert!(sent[0].contains("one"));
        assert!(sent[0].contains("two"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_send_per_flush_window() {
        let registry = ThrottleRegistry::new();
        let (send_fn, sent) = recorder();

        for window in 0..3 {
            for i in 0..4 {
                registry
                    .enqueue(
                        PRICE,
                        secs(10),
                        format!("w{window}-m{i}"),
                        Arc::clone(&send_fn),
                        "ETH",
                    )
                    .await;
            }
            tokio::time::sleep(secs(11)).await;
        }

        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 3);
        for (window, text) in sent.iter().enumerate() {
            assert!(text.starts_with("📊 <b>Batched Updates (4)</b>"));
            let body: Vec<&str> = text
                .split_once("\n\n")
                .unwrap()
                .1
                .split(BATCH_SEPARATOR)
                .collect();
            let expected: Vec<String> = (0..4).map(|i| format!("w{window}-m{i}")).collect();
            assert_eq!(body, expected);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_send_releases_in_flight_count() {
        let registry = ThrottleRegistry::new();
        let panicking: SendFn = Arc::new(|text: String| -> BoxFuture<'static, NotificationResult<()>> {
            Box::pin(async move {
                if text.contains("boom") {
                    panic!("sender bug");
                }
                Ok(())
            })
        });

        registry
            .enqueue(PRICE, secs(5), "boom".into(), panicking, "BTCUSDT")
            .await;
        assert_eq!(registry.scheduled_flushes().await, 1);
        tokio::time::sleep(secs(10)).await;

        assert_eq!(registry.scheduled_flushes().await, 0);

        // 이후 배치는 정상 처리
        let (send_fn, sent) = recorder();
        registry
            .enqueue(PRICE, secs(5), "after".into(), send_fn, "BTCUSDT")
            .await;
        tokio::time::sleep(secs(6)).await;
        assert_eq!(*sent.lock().unwrap(), vec!["after".to_string()]);
        assert_eq!(registry.scheduled_flushes().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_flush_is_not_requeued() {
        let registry = ThrottleRegistry::new();
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        let failing: SendFn = Arc::new(move |_text: String| -> BoxFuture<'static, NotificationResult<()>> {
            counter.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Err(NotificationError::SendFailed("boom".into())) })
        });

        registry
            .enqueue(PRICE, secs(5), "lost".into(), Arc::clone(&failing), "K")
            .await;
        tokio::time::sleep(secs(6)).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(registry.pending_count(PRICE, "K").await, 0);

        let (send_fn, sent) = recorder();
        registry
            .enqueue(PRICE, secs(5), "next".into(), send_fn, "K")
            .await;
        tokio::time::sleep(secs(6)).await;

        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(*sent.lock().unwrap(), vec!["next".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_enqueue_during_inflight_send_gets_own_flush() {
        let registry = ThrottleRegistry::new();
        let sent: Sent = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = Arc::clone(&sent);
        let slow: SendFn = Arc::new(move |text: String| -> BoxFuture<'static, NotificationResult<()>> {
            let sink = Arc::clone(&sink);
            Box::pin(async move {
                tokio::time::sleep(secs(5)).await;
                sink.lock().unwrap().push(text);
                Ok(())
            })
        });

        registry
            .enqueue(PRICE, secs(10), "A".into(), Arc::clone(&slow), "K")
            .await;
        // t=12: A의 flush는 t=10에 시작해 t=15까지 전송 중
        tokio::time::sleep(secs(12)).await;
        registry
            .enqueue(PRICE, secs(10), "B".into(), Arc::clone(&slow), "K")
            .await;
        assert!(registry.has_timer(PRICE, "K").await);

        tokio::time::sleep(secs(20)).await;
        assert_eq!(*sent.lock().unwrap(), vec!["A".to_string(), "B".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_cap_drops_oldest() {
        let registry = ThrottleRegistry::with_max_pending(3);
        let (send_fn, sent) = recorder();

        for i in 1..=5 {
            registry
                .enqueue(PRICE, secs(10), format!("m{i}"), Arc::clone(&send_fn), "K")
                .await;
        }
        assert_eq!(registry.pending_count(PRICE, "K").await, 3);

        tokio::time::sleep(secs(11)).await;
        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(
            sent[0],
            "📊 <b>Batched Updates (3)</b> <i>(+2 older dropped)</i>\n\nm3\n---\nm4\n---\nm5"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_cancels_and_resets() {
        let registry = ThrottleRegistry::new();
        let (send_fn, sent) = recorder();

        assert!(registry.decide(PRICE, secs(60), "BTCUSDT").await);
        registry
            .enqueue(PRICE, secs(60), "queued".into(), Arc::clone(&send_fn), "BTCUSDT")
            .await;

        registry.cleanup().await;
        assert_eq!(registry.tracked_keys().await, 0);

        tokio::time::sleep(secs(61)).await;
        assert!(sent.lock().unwrap().is_empty());

        // 정리 후에는 처음 보는 키와 동일
        assert!(registry.decide(PRICE, secs(60), "BTCUSDT").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_timer_does_not_flush_new_batch() {
        let registry = ThrottleRegistry::new();
        let (send_fn, sent) = recorder();

        registry
            .enqueue(PRICE, secs(10), "old".into(), Arc::clone(&send_fn), "K")
            .await;
        registry.cleanup().await;

        tokio::time::sleep(secs(5)).await;
        registry
            .enqueue(PRICE, secs(10), "new".into(), Arc::clone(&send_fn), "K")
            .await;

        // 취소된 첫 타이머의 마감(t=10)에는 아무것도 전송되지 않음
        tokio::time::sleep(secs(6)).await;
        assert!(sent.lock().unwrap().is_empty());

        tokio::time::sleep(secs(5)).await;
        assert_eq!(*sent.lock().unwrap(), vec!["new".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_enqueue_without_decide_then_decide_allows() {
        let registry = ThrottleRegistry::new();
        let (send_fn, _sent) = recorder();

        registry
            .enqueue(PRICE, secs(60), "queued".into(), send_fn, "K")
            .await;
        assert!(registry.decide(PRICE, secs(60), "K").await);
        assert!(!registry.decide(PRICE, secs(60), "K").await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_decide_single_winner() {
        let registry = ThrottleRegistry::new();

        let handles: Vec<_> = (0..32)
            .map(|_| {
                let registry = registry.clone();
                tokio::spawn(async move { registry.decide(PRICE, secs(60), "BTCUSDT").await })
            })
            .collect();

        let mut approved = 0;
        for handle in handles {
            if handle.await.unwrap() {
                approved += 1;
            }
        }
        assert_eq!(approved, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_enqueue_multi_thread_single_flush() {
        let registry = ThrottleRegistry::with_max_pending(0);
        let (send_fn, sent) = recorder();

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let registry = registry.clone();
                let send_fn = Arc::clone(&send_fn);
                tokio::spawn(async move {
                    registry
                        .enqueue(PRICE, Duration::from_millis(200), format!("m{i}"), send_fn, "K")
                        .await;
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        tokio::time::sleep(Duration::from_millis(600)).await;
        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].starts_with("📊 <b>Batched Updates (16)</b>"));
    }

    #[test]
    fn test_combine_batch() {
        assert_eq!(combine_batch(vec!["x".into()], 0), "x");
        assert_eq!(
            combine_batch(vec!["x".into()], 4),
            "📊 <b>Batched Updates (1)</b> <i>(+4 older dropped)</i>\n\nx"
        );
        assert_eq!(
            combine_batch(vec!["a".into(), "b".into(), "c".into()], 0),
            "📊 <b>Batched Updates (3)</b>\n\na\n---\nb\n---\nc"
        );
    }
}
