#![allow(dead_code)]

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use docket_core::impls::InMemoryKvStore;
use docket_core::ports::{FixedClock, KvStore};
use docket_core::{DocketConfig, Orchestrator, OrchestratorBuilder};

pub const TASK: &str = "rfp_question_list_new_framework";
pub const PROJECT: &str = "acct1#proj1";

pub struct Harness {
    pub kv: Arc<InMemoryKvStore>,
    pub clock: Arc<FixedClock>,
    pub orchestrator: Orchestrator,
}

pub fn harness() -> Harness {
    harness_with(DocketConfig::default())
}

pub fn harness_with(config: DocketConfig) -> Harness {
    let kv = Arc::new(InMemoryKvStore::new());
    harness_on(kv, config)
}

/// A second orchestrator over the same storage (another tab, or a reload).
pub fn harness_on(kv: Arc<InMemoryKvStore>, config: DocketConfig) -> Harness {
    let clock = Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2024, 9, 2, 10, 0, 0).unwrap(),
    ));
    let orchestrator = OrchestratorBuilder::new()
        .with_config(config)
        .with_kv_store(kv.clone() as Arc<dyn KvStore>)
        .with_clock(clock.clone())
        .with_builtin_forms()
        .unwrap()
        .build()
        .unwrap();
    Harness {
        kv,
        clock,
        orchestrator,
    }
}
