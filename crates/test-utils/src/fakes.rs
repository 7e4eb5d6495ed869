use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use chrono::{DateTime, NaiveDate, Utc};
use plmflow::engine::{Channel, RoutingDecision, RoutingPolicy};
use plmflow::errors::Result;
use plmflow::model::{
    ApprovalId, ApprovalRequest, ApprovalReviewer, FlowSchema, NewApproval, NewReviewer, NewTask,
    Project, ProjectId, ProjectRoleAssignment, ProjectTemplate, ReviewerId, Task, TaskActionLog,
    TaskDependency, TaskId, UserId,
};
use plmflow::outbox::{
    BackendFuture, ExternalTaskTracker, Integrations, NotificationSink, ProcurementControl,
};
use plmflow::store::{MemoryStore, Store};
use plmflow::types::ReviewerStatus;
use serde_json::Value;

/// A fake tracker that:
/// - records created and completed records
/// - fails the first `failures` calls, to exercise outbox retries.
#[derive(Debug, Default)]
pub struct RecordingTracker {
    created: Mutex<Vec<(String, String)>>,
    completed: Mutex<Vec<String>>,
    attempts: AtomicU32,
    failures: AtomicU32,
    next_id: AtomicU64,
}

impl RecordingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(failures: u32) -> Self {
        let tracker = Self::default();
        tracker.failures.store(failures, Ordering::SeqCst);
        tracker
    }

    /// `(summary, assignee)` of every created record.
    pub fn created(&self) -> Vec<(String, String)> {
        self.created.lock().unwrap().clone()
    }

    pub fn completed(&self) -> Vec<String> {
        self.completed.lock().unwrap().clone()
    }

    /// Calls made, including failed ones.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    fn should_fail(&self) -> bool {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl ExternalTaskTracker for RecordingTracker {
    fn create_task<'a>(
        &'a self,
        summary: &'a str,
        _description: &'a str,
        assignee: &'a str,
    ) -> BackendFuture<'a, String> {
        Box::pin(async move {
            if self.should_fail() {
                return Err(anyhow!("tracker unavailable"));
            }
            let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
            self.created
                .lock()
                .unwrap()
                .push((summary.to_string(), assignee.to_string()));
            Ok(format!("ext-{id}"))
        })
    }

    fn complete_task<'a>(&'a self, external_id: &'a str) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            if self.should_fail() {
                return Err(anyhow!("tracker unavailable"));
            }
            self.completed.lock().unwrap().push(external_id.to_string());
            Ok(())
        })
    }
}

#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(String, Value)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<(String, Value)> {
        self.sent.lock().unwrap().clone()
    }

    /// Users that received a notification whose `kind` is `kind`.
    pub fn recipients(&self, kind: &str) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|(_, payload)| payload["kind"] == kind)
            .map(|(user, _)| user)
            .collect()
    }
}

impl NotificationSink for RecordingNotifier {
    fn notify<'a>(&'a self, user: &'a str, payload: &'a Value) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            self.sent
                .lock()
                .unwrap()
                .push((user.to_string(), payload.clone()));
            Ok(())
        })
    }
}

#[derive(Debug, Default)]
pub struct RecordingProcurement {
    started: Mutex<Vec<(ProjectId, TaskId, String)>>,
}

impl RecordingProcurement {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn started_codes(&self) -> Vec<String> {
        self.started
            .lock()
            .unwrap()
            .iter()
            .map(|(_, _, code)| code.clone())
            .collect()
    }
}

impl ProcurementControl for RecordingProcurement {
    fn task_started<'a>(
        &'a self,
        project: ProjectId,
        task: TaskId,
        code: &'a str,
    ) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            self.started
                .lock()
                .unwrap()
                .push((project, task, code.to_string()));
            Ok(())
        })
    }
}

/// The three recording fakes, plus the `Integrations` wired to them.
pub struct RecordingIntegrations {
    pub tracker: Arc<RecordingTracker>,
    pub notifier: Arc<RecordingNotifier>,
    pub procurement: Arc<RecordingProcurement>,
}

impl RecordingIntegrations {
    pub fn new() -> Self {
        Self::with_tracker(RecordingTracker::new())
    }

    pub fn with_tracker(tracker: RecordingTracker) -> Self {
        Self {
            tracker: Arc::new(tracker),
            notifier: Arc::new(RecordingNotifier::new()),
            procurement: Arc::new(RecordingProcurement::new()),
        }
    }

    pub fn integrations(&self) -> Integrations {
        Integrations {
            tracker: self.tracker.clone(),
            notifier: self.notifier.clone(),
            procurement: self.procurement.clone(),
        }
    }
}

impl Default for RecordingIntegrations {
    fn default() -> Self {
        Self::new()
    }
}

/// A routing policy that always answers the same way and records calls.
/// `None` makes every evaluation fail.
#[derive(Debug)]
pub struct FixedRoutingPolicy {
    decision: Option<RoutingDecision>,
    calls: Mutex<Vec<(String, String, Value)>>,
}

impl FixedRoutingPolicy {
    pub fn automatic(rule_id: &str) -> Self {
        Self::new(Some(RoutingDecision {
            channel: Channel::Automatic,
            rule_id: Some(rule_id.to_string()),
            reason: "matched by test policy".to_string(),
        }))
    }

    pub fn human() -> Self {
        Self::new(Some(RoutingDecision::human("test policy routes to review")))
    }

    pub fn failing() -> Self {
        Self::new(None)
    }

    fn new(decision: Option<RoutingDecision>) -> Self {
        Self {
            decision,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(String, String, Value)> {
        self.calls.lock().unwrap().clone()
    }
}

impl RoutingPolicy for FixedRoutingPolicy {
    fn evaluate(
        &self,
        domain: &str,
        event_kind: &str,
        context: &Value,
    ) -> anyhow::Result<RoutingDecision> {
        self.calls
            .lock()
            .unwrap()
            .push((domain.to_string(), event_kind.to_string(), context.clone()));
        self.decision
            .clone()
            .ok_or_else(|| anyhow!("routing service unavailable"))
    }
}

/// A [`Store`] over a [`MemoryStore`] where another writer can slip in.
///
/// After [`RacingStore::race_on`], each of the next reads that returns the
/// task hands the caller its copy and then saves the task again behind its
/// back, bumping the version. The caller's next save of that copy then
/// fails with `Conflict`, as if a concurrent request had won the race.
#[derive(Debug, Default)]
pub struct RacingStore {
    inner: MemoryStore,
    races: Mutex<HashMap<TaskId, usize>>,
}

impl RacingStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Interfere after the next `times` reads of `task`.
    pub fn race_on(&self, task: TaskId, times: usize) {
        self.races.lock().unwrap().insert(task, times);
    }

    /// Interfering writes still pending for `task`.
    pub fn races_left(&self, task: TaskId) -> usize {
        self.races.lock().unwrap().get(&task).copied().unwrap_or(0)
    }

    fn interfere<'a>(&self, tasks: impl IntoIterator<Item = &'a Task>) {
        for task in tasks {
            let armed = {
                let mut races = self.races.lock().unwrap();
                match races.get_mut(&task.id) {
                    Some(left) if *left > 0 => {
                        *left -= 1;
                        true
                    }
                    _ => false,
                }
            };
            if armed {
                let current = self.inner.task(task.id).unwrap().unwrap();
                self.inner.save_task(&current).unwrap();
            }
        }
    }
}

impl Store for RacingStore {
    fn insert_project(
        &self,
        name: &str,
        template_id: Option<&str>,
        start_date: NaiveDate,
        skip_weekends: bool,
    ) -> Result<Project> {
        self.inner
            .insert_project(name, template_id, start_date, skip_weekends)
    }

    fn project(&self, id: ProjectId) -> Result<Option<Project>> {
        self.inner.project(id)
    }

    fn put_template(&self, template: ProjectTemplate) -> Result<()> {
        self.inner.put_template(template)
    }

    fn template(&self, id: &str) -> Result<Option<ProjectTemplate>> {
        self.inner.template(id)
    }

    fn put_flow(&self, code: &str, flow: FlowSchema) -> Result<()> {
        self.inner.put_flow(code, flow)
    }

    fn flow(&self, code: &str) -> Result<Option<FlowSchema>> {
        self.inner.flow(code)
    }

    fn insert_task(&self, task: NewTask) -> Result<Task> {
        self.inner.insert_task(task)
    }

    fn task(&self, id: TaskId) -> Result<Option<Task>> {
        let task = self.inner.task(id)?;
        self.interfere(task.iter());
        Ok(task)
    }

    fn task_by_code(&self, project: ProjectId, code: &str) -> Result<Option<Task>> {
        self.inner.task_by_code(project, code)
    }

    fn project_tasks(&self, project: ProjectId) -> Result<Vec<Task>> {
        self.inner.project_tasks(project)
    }

    fn phase_tasks(&self, project: ProjectId, phase: &str) -> Result<Vec<Task>> {
        let tasks = self.inner.phase_tasks(project, phase)?;
        self.interfere(tasks.iter());
        Ok(tasks)
    }

    fn save_task(&self, task: &Task) -> Result<Task> {
        self.inner.save_task(task)
    }

    fn set_external_id(&self, task: TaskId, external_id: &str) -> Result<()> {
        self.inner.set_external_id(task, external_id)
    }

    fn insert_dependency(&self, dep: TaskDependency) -> Result<()> {
        self.inner.insert_dependency(dep)
    }

    fn dependencies_of(&self, task: TaskId) -> Result<Vec<TaskDependency>> {
        self.inner.dependencies_of(task)
    }

    fn dependents_of(&self, task: TaskId) -> Result<Vec<TaskDependency>> {
        self.inner.dependents_of(task)
    }

    fn append_log(&self, entry: TaskActionLog) -> Result<TaskActionLog> {
        self.inner.append_log(entry)
    }

    fn task_logs(&self, task: TaskId) -> Result<Vec<TaskActionLog>> {
        self.inner.task_logs(task)
    }

    fn upsert_role_assignment(&self, assignment: ProjectRoleAssignment) -> Result<()> {
        self.inner.upsert_role_assignment(assignment)
    }

    fn role_assignee(&self, project: ProjectId, phase: &str, role: &str) -> Result<Option<UserId>> {
        self.inner.role_assignee(project, phase, role)
    }

    fn insert_approval(
        &self,
        approval: NewApproval,
        reviewers: Vec<NewReviewer>,
    ) -> Result<ApprovalRequest> {
        self.inner.insert_approval(approval, reviewers)
    }

    fn approval(&self, id: ApprovalId) -> Result<Option<ApprovalRequest>> {
        self.inner.approval(id)
    }

    fn open_approval_for_task(&self, task: TaskId) -> Result<Option<ApprovalRequest>> {
        self.inner.open_approval_for_task(task)
    }

    fn save_approval(&self, approval: &ApprovalRequest) -> Result<ApprovalRequest> {
        self.inner.save_approval(approval)
    }

    fn reviewers(&self, approval: ApprovalId) -> Result<Vec<ApprovalReviewer>> {
        self.inner.reviewers(approval)
    }

    fn decide_reviewer(
        &self,
        reviewer: ReviewerId,
        status: ReviewerStatus,
        comment: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<ApprovalReviewer> {
        self.inner.decide_reviewer(reviewer, status, comment, at)
    }

    fn advance_approval(
        &self,
        id: ApprovalId,
        expected_node: usize,
        next_node: usize,
        reviewers: Vec<NewReviewer>,
    ) -> Result<ApprovalRequest> {
        self.inner
            .advance_approval(id, expected_node, next_node, reviewers)
    }
}
