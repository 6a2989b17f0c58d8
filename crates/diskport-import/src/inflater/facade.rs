//! Main/shadow inflation
//!
//! The main inflater's outcome is always what the facade returns. The shadow runs
//! concurrently on its own disk and only contributes a comparison result to the
//! inflation telemetry; its failures are swallowed. Once main has finished the
//! shadow gets a grace period, then it is cancelled and, failing that, abandoned.

use crate::step::{Inflater, Step};
use async_trait::async_trait;
use diskport_import_types::{Inflation, InflationFailure, ShadowTestFields};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, info, warn};

pub const MATCH_RESULT_OK: &str = "true";

/// How long the shadow may outlive the main inflater
pub const SHADOW_GRACE_PERIOD: Duration = Duration::from_secs(180);

type ShadowOutcome = Result<Result<Inflation, InflationFailure>, JoinError>;

pub struct InflaterFacade {
    main: Arc<dyn Inflater>,
    shadow: Arc<dyn Inflater>,
    shadow_grace: Duration,
    main_finished: AtomicBool,
}

impl InflaterFacade {
    pub fn new(main: Arc<dyn Inflater>, shadow: Arc<dyn Inflater>) -> Self {
        Self {
            main,
            shadow,
            shadow_grace: SHADOW_GRACE_PERIOD,
            main_finished: AtomicBool::new(false),
        }
    }

    pub fn with_shadow_grace(mut self, grace: Duration) -> Self {
        self.shadow_grace = grace;
        self
    }

    /// Wait for the shadow, cancelling it once the grace period runs out
    async fn collect_shadow(
        &self,
        mut shadow_task: JoinHandle<Result<Inflation, InflationFailure>>,
    ) -> ShadowOutcome {
        if let Ok(joined) = tokio::time::timeout(self.shadow_grace, &mut shadow_task).await {
            return joined;
        }

        warn!(
            "⏱️ Shadow inflation still running {:?} after the main inflater, cancelling it",
            self.shadow_grace
        );
        let cancel = self.shadow.cancel("main inflater finished");
        if tokio::time::timeout(self.shadow_grace, cancel).await.is_err() {
            debug!("Shadow inflater did not acknowledge the cancel");
        }
        if let Ok(joined) = tokio::time::timeout(self.shadow_grace, &mut shadow_task).await {
            return joined;
        }
        shadow_task.abort();
        shadow_task.await
    }
}

/// Outcome of comparing the main disk with the shadow disk
pub fn compare_inflations(
    main: &Result<Inflation, InflationFailure>,
    shadow: &Result<Result<Inflation, InflationFailure>, JoinError>,
) -> String {
    let main = match main {
        Ok(main) => main,
        Err(_) => return "Main inflater failed".to_string(),
    };
    let shadow = match shadow {
        Ok(Ok(shadow)) => shadow,
        Ok(Err(failure)) => return format!("Shadow inflater error: {}", failure),
        Err(join_err) if join_err.is_cancelled() => return "Shadow inflater canceled".to_string(),
        Err(join_err) => return format!("Shadow inflater error: {}", join_err),
    };

    if !shadow.disk.is_allocated() {
        "Shadow inflater canceled".to_string()
    } else if main.disk.size_gb != shadow.disk.size_gb {
        "Size mismatch".to_string()
    } else if main.shadow_fields.checksum.is_empty() || shadow.shadow_fields.checksum.is_empty() {
        "Checksum missing".to_string()
    } else if main.shadow_fields.checksum != shadow.shadow_fields.checksum {
        "Content mismatch".to_string()
    } else {
        MATCH_RESULT_OK.to_string()
    }
}

#[async_trait]
impl Step for InflaterFacade {
    /// Only main's outcome counts: once it is in, the shadow is stopped and the
    /// inflation is reported as not interrupted
    async fn cancel(&self, reason: &str) -> bool {
        if self.main_finished.load(Ordering::SeqCst) {
            self.shadow.cancel(reason).await;
            return false;
        }
        let (main, _) = tokio::join!(self.main.cancel(reason), self.shadow.cancel(reason));
        main
    }

    fn trace_logs(&self) -> Vec<String> {
        let mut logs = self.main.trace_logs();
        logs.extend(self.shadow.trace_logs());
        logs
    }
}

#[async_trait]
impl Inflater for InflaterFacade {
    async fn inflate(&self) -> Result<Inflation, InflationFailure> {
        let shadow = Arc::clone(&self.shadow);
        let shadow_task = tokio::spawn(async move { shadow.inflate().await });

        let mut main_result = self.main.inflate().await;
        self.main_finished.store(true, Ordering::SeqCst);
        if main_result.is_err() {
            self.shadow.cancel("main inflater failed").await;
        }
        let shadow_result = self.collect_shadow(shadow_task).await;

        let match_result = compare_inflations(&main_result, &shadow_result);
        if match_result == MATCH_RESULT_OK {
            info!("👥 Shadow disk matches the inflated disk");
        } else {
            warn!("⚠️ Shadow inflation discrepancy: {}", match_result);
        }

        let shadow_fields: &mut ShadowTestFields = match &mut main_result {
            Ok(inflation) => &mut inflation.shadow_fields,
            Err(failure) => &mut failure.shadow_fields,
        };
        shadow_fields.match_result = Some(match_result);
        shadow_fields.shadow_inflation_time = match &shadow_result {
            Ok(Ok(shadow)) if shadow.disk.is_allocated() => Some(shadow.shadow_fields.inflation_time),
            _ => None,
        };
        main_result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::{run_step, RunContext};
    use crate::test_support::FakeInflater;
    use diskport_import_types::{ImportError, PersistentDisk};
    use std::sync::atomic::AtomicUsize;
    use tokio_util::sync::CancellationToken;

    struct FixedInflater {
        result: fn() -> Result<Inflation, InflationFailure>,
        cancel_calls: AtomicUsize,
        log: &'static str,
    }

    impl FixedInflater {
        fn new(log: &'static str, result: fn() -> Result<Inflation, InflationFailure>) -> Arc<Self> {
            Arc::new(Self {
                result,
                cancel_calls: AtomicUsize::new(0),
                log,
            })
        }
    }

    #[async_trait]
    impl Step for FixedInflater {
        async fn cancel(&self, _reason: &str) -> bool {
            self.cancel_calls.fetch_add(1, Ordering::SeqCst);
            true
        }

        fn trace_logs(&self) -> Vec<String> {
            vec![self.log.to_string()]
        }
    }

    #[async_trait]
    impl Inflater for FixedInflater {
        async fn inflate(&self) -> Result<Inflation, InflationFailure> {
            (self.result)()
        }
    }

    fn inflation(uri: &str, size_gb: i64, checksum: &str, secs: u64) -> Inflation {
        Inflation {
            disk: PersistentDisk {
                uri: uri.to_string(),
                size_gb,
                source_gb: 2,
                source_type: "vmdk".to_string(),
            },
            shadow_fields: ShadowTestFields {
                inflation_type: "qemu".to_string(),
                inflation_time: Duration::from_secs(secs),
                checksum: checksum.to_string(),
                ..Default::default()
            },
        }
    }

    fn main_ok() -> Result<Inflation, InflationFailure> {
        Ok(inflation("zones/z/disks/disk-1", 10, "a-b-c-d", 300))
    }

    fn shadow_same() -> Result<Inflation, InflationFailure> {
        Ok(inflation("zones/z/disks/shadow-disk-1", 10, "a-b-c-d", 60))
    }

    fn shadow_other_content() -> Result<Inflation, InflationFailure> {
        Ok(inflation("zones/z/disks/shadow-disk-1", 10, "a-b-c-x", 60))
    }

    fn shadow_failed() -> Result<Inflation, InflationFailure> {
        Err(InflationFailure::new(ImportError::Inflation("bad format".to_string())))
    }

    fn main_failed() -> Result<Inflation, InflationFailure> {
        Err(InflationFailure::with_disk(
            PersistentDisk {
                uri: "zones/z/disks/disk-1".to_string(),
                ..Default::default()
            },
            ImportError::Inflation("worker failed".to_string()),
        ))
    }

    #[tokio::test]
    async fn test_matching_shadow() {
        let facade = InflaterFacade::new(FixedInflater::new("main", main_ok), FixedInflater::new("shadow", shadow_same));

        let result = facade.inflate().await.unwrap();
        assert_eq!(result.disk.uri, "zones/z/disks/disk-1");
        assert_eq!(result.shadow_fields.match_result.as_deref(), Some("true"));
        assert_eq!(result.shadow_fields.shadow_inflation_time, Some(Duration::from_secs(60)));
        assert_eq!(facade.trace_logs(), vec!["main".to_string(), "shadow".to_string()]);
    }

    #[tokio::test]
    async fn test_content_mismatch_is_telemetry_only() {
        let facade = InflaterFacade::new(
            FixedInflater::new("main", main_ok),
            FixedInflater::new("shadow", shadow_other_content),
        );

        let result = facade.inflate().await.unwrap();
        assert_eq!(result.disk, main_ok().unwrap().disk);
        assert_eq!(result.shadow_fields.match_result.as_deref(), Some("Content mismatch"));
    }

    #[tokio::test]
    async fn test_shadow_failure_is_swallowed() {
        let facade = InflaterFacade::new(FixedInflater::new("main", main_ok), FixedInflater::new("shadow", shadow_failed));

        let result = facade.inflate().await.unwrap();
        assert_eq!(
            result.shadow_fields.match_result.as_deref(),
            Some("Shadow inflater error: Inflation failed: bad format")
        );
        assert_eq!(result.shadow_fields.shadow_inflation_time, None);
    }

    #[tokio::test]
    async fn test_main_failure_cancels_shadow() {
        let shadow = FixedInflater::new("shadow", shadow_same);
        let facade = InflaterFacade::new(FixedInflater::new("main", main_failed), shadow.clone());

        let failure = facade.inflate().await.unwrap_err();
        assert_eq!(failure.disk.uri, "zones/z/disks/disk-1");
        assert_eq!(shadow.cancel_calls.load(Ordering::SeqCst), 1);
        assert_eq!(failure.shadow_fields.match_result.as_deref(), Some("Main inflater failed"));
    }

    #[tokio::test]
    async fn test_slow_shadow_does_not_fail_finished_main() {
        let shadow = Arc::new(FakeInflater::new("zones/z/disks/shadow-disk-1").with_delay(Duration::from_secs(30)));
        let facade = Arc::new(InflaterFacade::new(FixedInflater::new("main", main_ok), shadow.clone()));
        let ctx = RunContext::new(CancellationToken::new(), Some(Duration::from_millis(300)));

        let started = std::time::Instant::now();
        let (result, _) = run_step(&ctx, facade, |facade| async move { facade.inflate().await }).await;

        assert!(started.elapsed() < Duration::from_secs(5));
        let inflation = result.unwrap();
        assert_eq!(inflation.disk.uri, "zones/z/disks/disk-1");
        assert_eq!(shadow.cancel_calls.load(Ordering::SeqCst), 1);
        assert!(inflation
            .shadow_fields
            .match_result
            .unwrap()
            .starts_with("Shadow inflater error"));
    }

    #[tokio::test]
    async fn test_shadow_past_grace_period_is_abandoned() {
        let mut stubborn = FakeInflater::new("zones/z/disks/shadow-disk-1").with_delay(Duration::from_secs(30));
        stubborn.cancellable = false;
        let shadow = Arc::new(stubborn);
        let facade = InflaterFacade::new(FixedInflater::new("main", main_ok), shadow.clone())
            .with_shadow_grace(Duration::from_millis(50));

        let started = std::time::Instant::now();
        let inflation = facade.inflate().await.unwrap();

        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(inflation.disk.uri, "zones/z/disks/disk-1");
        assert_eq!(inflation.shadow_fields.match_result.as_deref(), Some("Shadow inflater canceled"));
        assert_eq!(inflation.shadow_fields.shadow_inflation_time, None);
        assert_eq!(shadow.cancel_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancel_after_main_finished_is_refused() {
        let main = FixedInflater::new("main", main_ok);
        let shadow = FixedInflater::new("shadow", shadow_same);
        let facade = InflaterFacade::new(main.clone(), shadow.clone());

        facade.inflate().await.unwrap();
        assert!(!facade.cancel("timed-out").await);
        assert_eq!(main.cancel_calls.load(Ordering::SeqCst), 0);
        assert_eq!(shadow.cancel_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancel_fans_out() {
        let main = FixedInflater::new("main", main_ok);
        let shadow = FixedInflater::new("shadow", shadow_same);
        let facade = InflaterFacade::new(main.clone(), shadow.clone());

        assert!(facade.cancel("timed-out").await);
        assert_eq!(main.cancel_calls.load(Ordering::SeqCst), 1);
        assert_eq!(shadow.cancel_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_compare_outcomes() {
        let shadow = |r: Result<Inflation, InflationFailure>| -> Result<Result<Inflation, InflationFailure>, JoinError> { Ok(r) };

        assert_eq!(compare_inflations(&main_failed(), &shadow(shadow_same())), "Main inflater failed");
        assert_eq!(
            compare_inflations(&main_ok(), &shadow(Ok(Inflation::default()))),
            "Shadow inflater canceled"
        );
        assert_eq!(
            compare_inflations(&main_ok(), &shadow(Ok(inflation("zones/z/disks/s", 11, "a-b-c-d", 1)))),
            "Size mismatch"
        );
        assert_eq!(
            compare_inflations(&main_ok(), &shadow(Ok(inflation("zones/z/disks/s", 10, "", 1)))),
            "Checksum missing"
        );
        assert_eq!(compare_inflations(&main_ok(), &shadow(shadow_same())), "true");
    }
}
