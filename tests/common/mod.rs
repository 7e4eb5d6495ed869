#![allow(dead_code, unused_imports)]

pub use plmflow_test_utils::builders::{FlowBuilder, TemplateBuilder, TemplateTaskBuilder};
pub use plmflow_test_utils::fakes::{
    FixedRoutingPolicy, RacingStore, RecordingIntegrations, RecordingNotifier,
    RecordingProcurement, RecordingTracker,
};
pub use plmflow_test_utils::harness::{
    date, engine_with_outbox, ids_by_code, instantiate, memory_store, role, task_by_code,
    test_engine,
};
pub use plmflow_test_utils::{init_tracing, with_timeout};

pub type TestResult = Result<(), Box<dyn std::error::Error>>;
