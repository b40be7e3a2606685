//! Progression engine.
//!
//! Owns the unlock/complete state machine of one module. All mutations of
//! [`ProgressionState`] go through this struct, and every mutation is written
//! back to the store before the call returns.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::Config;
use crate::core::checkpoint::CheckpointGate;
use crate::core::module::Module;
use crate::core::objectives::ObjectiveTracker;
use crate::core::section::{Activity, Section};
use crate::core::state::{derive_progress, ProgressionState, SectionStatus, Snapshot};
use crate::error::{Result, StepgateError};
use crate::evaluate::{
    judge_choice, judge_code, judge_numeric, judge_quiz, CodeRunner, ExecutionOutput,
    InvalidAnswer, Mismatch, NoRunner, Verdict,
};
use crate::storage::{KeyValueStore, PersistedState};

/// Result of one graded submission.
#[derive(Debug, Clone, PartialEq)]
pub struct Attempt {
    pub index: usize,
    pub verdict: Verdict,
    /// Text to show next to the section.
    pub feedback: String,
    /// Whether this attempt completed the section for the first time.
    pub newly_completed: bool,
    /// Section to scroll to after a correct answer.
    pub next: Option<usize>,
    /// Captured output of a code exercise run.
    pub output: Option<ExecutionOutput>,
}

/// Returned when the module checkpoint is passed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleCompletion {
    pub module_id: String,
    pub completed_at: DateTime<Utc>,
    pub objectives_completed: usize,
}

/// State machine for one module.
///
/// Construct it, call [`ensure_consistency`](Self::ensure_consistency) once,
/// then query it to render and feed it the learner's attempts.
#[derive(Debug)]
pub struct ProgressionEngine<S: KeyValueStore, R: CodeRunner = NoRunner> {
    module: Module,
    state: ProgressionState,
    persisted: PersistedState<S>,
    runner: R,
    default_tolerance: f64,
}

impl<S: KeyValueStore, R: CodeRunner> ProgressionEngine<S, R> {
    /// Create an engine, restoring any snapshot the store holds.
    ///
    /// The persisted progress value is discarded and derived again from the
    /// completed sections.
    pub fn new(module: Module, store: S, runner: R, config: &Config) -> Self {
        let persisted = PersistedState::with_prefix(store, &config.storage.key_prefix, &module.id);
        let state = persisted
            .load()
            .map(ProgressionState::from_snapshot)
            .unwrap_or_default();

        let mut engine = Self {
            module,
            state,
            persisted,
            runner,
            default_tolerance: config.evaluation.default_tolerance,
        };
        engine.refresh_progress();
        engine
    }

    pub fn module(&self) -> &Module {
        &self.module
    }

    pub fn state(&self) -> &ProgressionState {
        &self.state
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Current state in its persisted form.
    pub fn snapshot(&self) -> Snapshot {
        self.state.to_snapshot()
    }

    // =========================================================================
    // Unlocking
    // =========================================================================

    /// Repair the unlocked set against the completed set and the section list.
    ///
    /// A completed blocking section unlocks the run of sections after it up
    /// to and including the next blocking one; an unlocked non-blocking
    /// section unlocks its successor. Every addition is forward, so a single
    /// pass reaches the fixed point. Returns how many sections were unlocked.
    pub fn ensure_consistency(&mut self) -> usize {
        let len = self.module.len();
        let before = self.state.unlocked.len();
        self.state.unlocked.insert(0);

        for i in 0..len {
            if self.state.completed.contains(&i) && self.module.is_blocking(i) {
                self.cascade_from(i + 1);
            }
            let open = i == 0 || self.state.unlocked.contains(&i);
            if open && !self.module.is_blocking(i) && i + 1 < len {
                self.state.unlocked.insert(i + 1);
            }
        }

        let added = self.state.unlocked.len() - before;
        if added > 0 {
            tracing::debug!(
                "module {}: consistency pass unlocked {} sections",
                self.module.id,
                added
            );
        }
        self.refresh_progress();
        self.save();
        added
    }

    /// Whether the learner can see and interact with section `index`.
    pub fn is_unlocked(&self, index: usize) -> bool {
        self.state.unlocked.contains(&index) || (index == 0 && !self.module.is_blocking(0))
    }

    /// Unlock forward from `index + 1` through the next blocking section.
    ///
    /// Exactly one gate opens per call. Returns the section to scroll to,
    /// or `None` when `index` is the last section.
    pub fn unlock_next(&mut self, index: usize) -> Result<Option<usize>> {
        self.module.require(index)?;

        let next = index + 1;
        if next >= self.module.len() {
            return Ok(None);
        }

        let added = self.cascade_from(next);
        tracing::debug!(
            "module {}: section {} unlocked {} sections",
            self.module.id,
            index,
            added
        );
        self.save();
        Ok(Some(next))
    }

    /// Unlock `start`, `start + 1`, ... stopping after the first blocking
    /// section. Returns how many were newly unlocked.
    fn cascade_from(&mut self, start: usize) -> usize {
        let mut added = 0;
        for j in start..self.module.len() {
            if self.state.unlocked.insert(j) {
                added += 1;
            }
            if self.module.is_blocking(j) {
                break;
            }
        }
        added
    }

    // =========================================================================
    // Completion
    // =========================================================================

    /// Record section `index` as solved. Does not grade.
    ///
    /// Returns whether it was newly completed. Completing a non-blocking
    /// section is refused: those are tracked by unlocking only.
    pub fn complete_section(&mut self, index: usize) -> Result<bool> {
        let section = self.module.require(index)?;
        if !section.is_blocking() {
            return Err(StepgateError::NotBlocking { index });
        }
        let objective = section.completes_objective;

        if !self.state.completed.insert(index) {
            return Ok(false);
        }

        self.refresh_progress();
        if let Some(objective) = objective {
            ObjectiveTracker::new(&mut self.state.objectives, self.module.objectives.len())
                .complete(objective);
        }
        tracing::debug!(
            "module {}: section {} completed, progress {}%",
            self.module.id,
            index,
            self.state.progress
        );
        self.save();
        Ok(true)
    }

    /// Mark a learning objective complete. Returns whether it was new.
    pub fn complete_objective(&mut self, index: usize) -> bool {
        let added = ObjectiveTracker::new(&mut self.state.objectives, self.module.objectives.len())
            .complete(index);
        if added {
            self.save();
        }
        added
    }

    pub fn count_blocking(&self) -> usize {
        self.module.count_blocking()
    }

    pub fn count_completed_blocking(&self) -> usize {
        self.state.count_completed_blocking(&self.module)
    }

    /// Progress percentage, 0 to 100.
    pub fn progress(&self) -> u32 {
        self.state.progress
    }

    fn refresh_progress(&mut self) {
        self.state.progress = derive_progress(self.count_completed_blocking(), self.count_blocking());
    }

    // =========================================================================
    // Checkpoint
    // =========================================================================

    pub fn can_checkpoint(&self) -> bool {
        self.count_completed_blocking() >= self.count_blocking()
    }

    /// Pass the module checkpoint.
    ///
    /// Fails with `IncompleteExercises` while a blocking section is unsolved.
    /// Passing it again keeps the first recorded completion time.
    pub fn complete_checkpoint(&mut self) -> Result<ModuleCompletion> {
        CheckpointGate::new(&self.module, &mut self.state).complete()?;

        self.save();
        let completed_at = match self.persisted.completed_at() {
            Some(first) => first,
            None => {
                let now = Utc::now();
                self.persisted.mark_completed(now);
                now
            }
        };

        tracing::info!("module {} completed", self.module.id);
        Ok(ModuleCompletion {
            module_id: self.module.id.clone(),
            completed_at,
            objectives_completed: self.state.objectives.len(),
        })
    }

    /// Whether the module-level completed flag is set.
    pub fn is_module_completed(&self) -> bool {
        self.persisted.is_completed()
    }

    /// When the checkpoint was passed, if recorded.
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.persisted.completed_at()
    }

    /// Forget all progress: both stored keys are removed and the state goes
    /// back to its initial form, with leading non-blocking sections unlocked
    /// again and a fresh snapshot written.
    pub fn reset(&mut self) {
        self.persisted.clear();
        self.state = ProgressionState::default();
        tracing::debug!("module {}: progress reset", self.module.id);
        self.ensure_consistency();
    }

    // =========================================================================
    // Display queries
    // =========================================================================

    pub fn section_status(&self, index: usize) -> Result<SectionStatus> {
        let section = self.module.require(index)?;
        Ok(self.status_of(index, section))
    }

    /// Status of every section, in order.
    pub fn statuses(&self) -> Vec<SectionStatus> {
        self.module
            .sections
            .iter()
            .enumerate()
            .map(|(i, section)| self.status_of(i, section))
            .collect()
    }

    fn status_of(&self, index: usize, section: &Section) -> SectionStatus {
        if section.is_blocking() && self.state.completed.contains(&index) {
            SectionStatus::Completed
        } else if self.is_unlocked(index) {
            SectionStatus::Unlocked
        } else {
            SectionStatus::Locked
        }
    }

    pub fn hint(&self, index: usize) -> Result<Option<&str>> {
        Ok(self.module.require(index)?.hint.as_deref())
    }

    pub fn explanation(&self, index: usize) -> Result<Option<&str>> {
        Ok(self.module.require(index)?.explanation.as_deref())
    }

    pub fn wrong_explanation(&self, index: usize) -> Result<Option<&str>> {
        Ok(self.module.require(index)?.wrong_explanation.as_deref())
    }

    pub fn solution(&self, index: usize) -> Result<Option<&str>> {
        Ok(self.module.require(index)?.solution())
    }

    /// Code the editor of section `index` resets to.
    pub fn starter_code(&self, index: usize) -> Result<Option<&str>> {
        Ok(self.module.require(index)?.starter_code())
    }

    // =========================================================================
    // Grading
    // =========================================================================

    /// Run free code from a sample section. Never affects progression.
    pub async fn run_snippet(&self, source: &str) -> Result<ExecutionOutput> {
        self.runner.run(source).await
    }

    /// Judge a numeric answer for section `index`.
    pub fn submit_numeric(&mut self, index: usize, input: &str) -> Result<Attempt> {
        let section = self.open_section(index)?;
        let Activity::Numeric(spec) = &section.activity else {
            return Err(StepgateError::WrongSectionKind {
                index,
                expected: "numeric exercise",
            });
        };

        let verdict = judge_numeric(spec, input, self.default_tolerance);
        let feedback = feedback(section, &verdict);
        self.record(index, verdict, feedback, None)
    }

    /// Judge an option selection for a multiple-choice exercise or quiz.
    pub fn submit_choice(&mut self, index: usize, selected: Option<usize>) -> Result<Attempt> {
        let section = self.open_section(index)?;
        let verdict = match &section.activity {
            Activity::Choice(spec) => judge_choice(spec, selected),
            Activity::Quiz(spec) => judge_quiz(spec, selected),
            _ => {
                return Err(StepgateError::WrongSectionKind {
                    index,
                    expected: "multiple-choice",
                })
            }
        };

        let feedback = feedback(section, &verdict);
        self.record(index, verdict, feedback, None)
    }

    /// Run and judge the learner's code for a code exercise.
    ///
    /// The engine stays mutably borrowed until the run returns, so the same
    /// engine cannot take a second submission in the meantime.
    pub async fn submit_code(&mut self, index: usize, source: &str) -> Result<Attempt> {
        let section = self.open_section(index)?;
        let Activity::Code(spec) = &section.activity else {
            return Err(StepgateError::WrongSectionKind {
                index,
                expected: "code exercise",
            });
        };

        let judged = judge_code(spec, source, &self.runner).await;
        let feedback = feedback(section, &judged.verdict);
        self.record(index, judged.verdict, feedback, judged.output)
    }

    fn open_section(&self, index: usize) -> Result<&Section> {
        let section = self.module.require(index)?;
        if !self.is_unlocked(index) {
            return Err(StepgateError::SectionLocked { index });
        }
        Ok(section)
    }

    fn record(
        &mut self,
        index: usize,
        verdict: Verdict,
        feedback: String,
        output: Option<ExecutionOutput>,
    ) -> Result<Attempt> {
        let (newly_completed, next) = if verdict.is_correct() {
            let newly = self.complete_section(index)?;
            (newly, self.unlock_next(index)?)
        } else {
            (false, None)
        };

        tracing::debug!(
            "module {}: section {} judged {:?}",
            self.module.id,
            index,
            verdict.outcome()
        );
        Ok(Attempt {
            index,
            verdict,
            feedback,
            newly_completed,
            next,
            output,
        })
    }

    fn save(&self) {
        self.persisted.save(&self.state.to_snapshot());
    }
}

/// Learner-facing text for a verdict.
fn feedback(section: &Section, verdict: &Verdict) -> String {
    let code = match &section.activity {
        Activity::Code(spec) => Some(spec),
        _ => None,
    };

    match verdict {
        Verdict::Correct => code
            .and_then(|spec| spec.success_message.clone())
            .or_else(|| section.explanation.clone())
            .unwrap_or_else(|| "Correct!".to_string()),
        Verdict::Incorrect(Mismatch::ExecutionFailed { message }) => {
            format!("Execution error: {}", message)
        }
        Verdict::Incorrect(mismatch) => code
            .and_then(|spec| spec.error_message.clone())
            .or_else(|| section.wrong_explanation.clone())
            .unwrap_or_else(|| match mismatch {
                Mismatch::MissingOutput { expected } => {
                    format!("Expected output containing {:?}", expected)
                }
                Mismatch::ValidationFailed => "The result is not correct yet.".to_string(),
                _ => "Incorrect, try again.".to_string(),
            }),
        Verdict::Invalid(InvalidAnswer::InvalidInput { .. }) => {
            "Enter a valid number".to_string()
        }
        Verdict::Invalid(InvalidAnswer::NoSelection) => "Select an answer".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluate::runner::fake::FakeRunner;
    use crate::storage::persisted::tests::BrokenStore;
    use crate::storage::MemoryStore;
    use std::collections::BTreeSet;
    use std::sync::Arc;

    fn module(json: &str) -> Module {
        Module::from_json(json).unwrap()
    }

    fn engine(json: &str) -> ProgressionEngine<Arc<MemoryStore>> {
        engine_with_store(json, Arc::new(MemoryStore::new()))
    }

    fn engine_with_store(json: &str, store: Arc<MemoryStore>) -> ProgressionEngine<Arc<MemoryStore>> {
        let mut engine = ProgressionEngine::new(module(json), store, NoRunner, &Config::default());
        engine.ensure_consistency();
        engine
    }

    fn code_engine(json: &str, runner: FakeRunner) -> ProgressionEngine<Arc<MemoryStore>, FakeRunner> {
        let mut engine = ProgressionEngine::new(
            module(json),
            Arc::new(MemoryStore::new()),
            runner,
            &Config::default(),
        );
        engine.ensure_consistency();
        engine
    }

    fn set(items: &[usize]) -> BTreeSet<usize> {
        items.iter().copied().collect()
    }

    /// blocking, concept, concept, blocking, blocking
    const GATES: &str = r#"{
        "id": "gates",
        "content": [
            {"type": "exercise", "answer": 1},
            {"type": "concept"},
            {"type": "example"},
            {"type": "quiz", "options": ["a", "b"], "correct": 0},
            {"type": "exercise", "answer": 2}
        ]
    }"#;

    const CONCEPT_THEN_EXERCISE: &str = r#"{
        "id": "c",
        "objectives": ["read", "solve"],
        "content": [
            {"type": "concept", "title": "Intro"},
            {"type": "exercise", "exerciseType": "mcq", "options": ["x", "y", "z"], "correct": 2, "completesObjective": 1}
        ]
    }"#;

    #[test]
    fn test_numeric_exercise_completes_module() {
        let mut engine = engine(
            r#"{"id": "a", "content": [{"type": "exercise", "correctAnswer": 4, "tolerance": 0.01}]}"#,
        );

        let attempt = engine.submit_numeric(0, "4").unwrap();
        assert_eq!(attempt.verdict, Verdict::Correct);
        assert!(attempt.newly_completed);
        assert_eq!(attempt.next, None);
        assert_eq!(engine.state().completed_sections(), &set(&[0]));
        assert_eq!(engine.progress(), 100);
    }

    #[test]
    fn test_wrong_quiz_answer_does_not_unlock() {
        let mut engine = engine(
            r#"{"id": "b", "content": [
                {"type": "quiz", "options": ["a", "b"], "correct": 1},
                {"type": "quiz", "options": ["a", "b"], "correct": 0}
            ]}"#,
        );

        let attempt = engine.submit_choice(0, Some(0)).unwrap();
        assert!(matches!(attempt.verdict, Verdict::Incorrect(_)));
        assert_eq!(engine.state().unlocked_sections(), &set(&[0]));
        assert!(engine.state().completed_sections().is_empty());

        let attempt = engine.submit_choice(0, Some(1)).unwrap();
        assert!(attempt.verdict.is_correct());
        assert_eq!(attempt.next, Some(1));
        assert_eq!(engine.state().unlocked_sections(), &set(&[0, 1]));
        assert_eq!(engine.progress(), 50);
    }

    #[test]
    fn test_leading_concept_unlocks_exercise_on_load() {
        let engine = engine(CONCEPT_THEN_EXERCISE);
        assert!(engine.is_unlocked(1));
        assert_eq!(
            engine.statuses(),
            vec![SectionStatus::Unlocked, SectionStatus::Unlocked]
        );
    }

    #[test]
    fn test_checkpoint_requires_every_blocking_section() {
        let mut engine = engine(
            r#"{"id": "d", "objectives": ["one", "two", "three"], "content": [
                {"type": "exercise", "answer": 1, "completesObjective": 0},
                {"type": "exercise", "answer": 2}
            ]}"#,
        );

        engine.submit_numeric(0, "1").unwrap();
        assert!(!engine.can_checkpoint());
        let err = engine.complete_checkpoint().unwrap_err();
        assert!(matches!(
            err,
            StepgateError::IncompleteExercises {
                completed: 1,
                total: 2
            }
        ));
        assert!(!engine.is_module_completed());

        engine.submit_numeric(1, "2").unwrap();
        let completion = engine.complete_checkpoint().unwrap();
        assert_eq!(completion.module_id, "d");
        assert_eq!(completion.objectives_completed, 3);
        assert_eq!(engine.progress(), 100);
        assert_eq!(engine.state().completed_objectives(), &set(&[0, 1, 2]));
        assert!(engine.is_module_completed());
        assert_eq!(engine.completed_at(), Some(completion.completed_at));
    }

    #[test]
    fn test_single_gate_advance() {
        let mut engine = engine(GATES);
        assert_eq!(engine.state().unlocked_sections(), &set(&[0]));

        engine.complete_section(0).unwrap();
        assert_eq!(engine.unlock_next(0).unwrap(), Some(1));
        assert_eq!(engine.state().unlocked_sections(), &set(&[0, 1, 2, 3]));
        assert!(!engine.is_unlocked(4));
    }

    #[test]
    fn test_unlock_next_at_end() {
        let mut engine = engine(GATES);
        assert_eq!(engine.unlock_next(4).unwrap(), None);
        assert!(matches!(
            engine.unlock_next(5),
            Err(StepgateError::SectionOutOfRange { index: 5, len: 5 })
        ));
    }

    #[test]
    fn test_complete_section_is_idempotent() {
        let mut engine = engine(GATES);
        assert!(engine.complete_section(3).unwrap());
        assert!(!engine.complete_section(3).unwrap());
        assert_eq!(engine.count_completed_blocking(), 1);
        assert_eq!(engine.progress(), 33);
    }

    #[test]
    fn test_complete_non_blocking_refused() {
        let mut engine = engine(GATES);
        assert!(matches!(
            engine.complete_section(1),
            Err(StepgateError::NotBlocking { index: 1 })
        ));
        assert!(engine.state().completed_sections().is_empty());
    }

    #[test]
    fn test_completion_forwards_objective() {
        let mut engine = engine(CONCEPT_THEN_EXERCISE);
        engine.submit_choice(1, Some(2)).unwrap();
        assert_eq!(engine.state().completed_objectives(), &set(&[1]));
    }

    #[test]
    fn test_complete_objective() {
        let mut engine = engine(CONCEPT_THEN_EXERCISE);
        assert!(engine.complete_objective(0));
        assert!(!engine.complete_objective(0));
        assert!(!engine.complete_objective(7));
        assert_eq!(engine.state().completed_objectives(), &set(&[0]));
    }

    #[test]
    fn test_locked_section_refuses_attempts() {
        let mut engine = engine(GATES);
        assert!(matches!(
            engine.submit_choice(3, Some(0)),
            Err(StepgateError::SectionLocked { index: 3 })
        ));
    }

    #[test]
    fn test_wrong_judge_refused() {
        let mut engine = engine(GATES);
        assert!(matches!(
            engine.submit_choice(0, Some(0)),
            Err(StepgateError::WrongSectionKind { index: 0, .. })
        ));
    }

    #[test]
    fn test_invalid_answer_changes_nothing() {
        let mut engine = engine(GATES);
        let before = engine.snapshot();

        let attempt = engine.submit_numeric(0, "four").unwrap();
        assert_eq!(
            attempt.verdict,
            Verdict::Invalid(InvalidAnswer::InvalidInput {
                input: "four".to_string()
            })
        );
        assert_eq!(attempt.feedback, "Enter a valid number");
        assert_eq!(engine.snapshot(), before);
    }

    #[test]
    fn test_no_selection_feedback() {
        let mut engine = engine(CONCEPT_THEN_EXERCISE);
        let attempt = engine.submit_choice(1, None).unwrap();
        assert_eq!(attempt.feedback, "Select an answer");
        assert!(engine.state().completed_sections().is_empty());
    }

    #[test]
    fn test_feedback_uses_explanations() {
        let mut engine = engine(
            r#"{"id": "f", "content": [{
                "type": "exercise", "answer": 3,
                "explanation": "3 is right", "wrongExplanation": "count again"
            }]}"#,
        );
        assert_eq!(engine.submit_numeric(0, "2").unwrap().feedback, "count again");
        assert_eq!(engine.submit_numeric(0, "3").unwrap().feedback, "3 is right");
    }

    #[test]
    fn test_state_restored_from_store() {
        let store = Arc::new(MemoryStore::new());
        {
            let mut engine = engine_with_store(GATES, Arc::clone(&store));
            engine.submit_numeric(0, "1").unwrap();
        }

        let engine = engine_with_store(GATES, Arc::clone(&store));
        assert_eq!(engine.state().completed_sections(), &set(&[0]));
        assert_eq!(engine.state().unlocked_sections(), &set(&[0, 1, 2, 3]));
        assert_eq!(engine.progress(), 33);
    }

    #[test]
    fn test_consistency_repairs_partial_snapshot() {
        let store = Arc::new(MemoryStore::new());
        store
            .set(
                "module-gates-data",
                r#"{"progress": 0, "completedSections": [0, 3], "unlockedSections": [0]}"#,
            )
            .unwrap();

        let engine = engine_with_store(GATES, store);
        assert_eq!(engine.state().unlocked_sections(), &set(&[0, 1, 2, 3, 4]));
        assert_eq!(engine.progress(), 67);
    }

    #[test]
    fn test_stale_progress_recomputed() {
        let store = Arc::new(MemoryStore::new());
        store
            .set("module-gates-data", r#"{"progress": 90, "completedSections": []}"#)
            .unwrap();
        assert_eq!(engine_with_store(GATES, store).progress(), 0);
    }

    #[test]
    fn test_module_without_blocking_sections() {
        let engine = engine(r#"{"id": "r", "content": [{"type": "concept"}, {"type": "warning"}]}"#);
        assert_eq!(engine.progress(), 100);
        assert!(engine.can_checkpoint());
        assert_eq!(engine.state().unlocked_sections(), &set(&[0, 1]));
    }

    #[test]
    fn test_reset_clears_store_and_state() {
        let store = Arc::new(MemoryStore::new());
        let mut engine = engine_with_store(CONCEPT_THEN_EXERCISE, Arc::clone(&store));
        engine.submit_choice(1, Some(2)).unwrap();
        engine.complete_checkpoint().unwrap();
        assert_eq!(store.len(), 2);

        engine.reset();
        assert!(!store.contains("module-c-completed").unwrap());
        assert!(!engine.is_module_completed());
        assert_eq!(engine.progress(), 0);
        assert!(engine.state().completed_sections().is_empty());
        assert!(engine.state().completed_objectives().is_empty());

        // the concept still opens the exercise behind it
        assert!(engine.is_unlocked(1));
        assert!(engine.submit_choice(1, Some(2)).unwrap().verdict.is_correct());

        let stored = PersistedState::new(Arc::clone(&store), "c").load().unwrap();
        assert_eq!(stored.unlocked_sections, vec![0, 1]);
    }

    #[test]
    fn test_repeated_checkpoint_keeps_first_completion_time() {
        let store = Arc::new(MemoryStore::new());
        let mut engine = engine_with_store(CONCEPT_THEN_EXERCISE, Arc::clone(&store));
        engine.submit_choice(1, Some(2)).unwrap();

        let first = engine.complete_checkpoint().unwrap();
        let stored = store.get("module-c-completed").unwrap();
        let second = engine.complete_checkpoint().unwrap();

        assert_eq!(second.completed_at, first.completed_at);
        assert_eq!(engine.completed_at(), Some(first.completed_at));
        assert_eq!(store.get("module-c-completed").unwrap(), stored);
    }

    #[test]
    fn test_broken_store_keeps_session_in_memory() {
        let mut engine =
            ProgressionEngine::new(module(GATES), BrokenStore, NoRunner, &Config::default());
        engine.ensure_consistency();

        let attempt = engine.submit_numeric(0, "1").unwrap();
        assert!(attempt.verdict.is_correct());
        assert_eq!(engine.progress(), 33);
        assert!(engine.is_unlocked(3));
    }

    #[test]
    fn test_custom_key_prefix() {
        let store = Arc::new(MemoryStore::new());
        let mut config = Config::default();
        config.storage.key_prefix = "course".to_string();

        let mut engine = ProgressionEngine::new(module(GATES), Arc::clone(&store), NoRunner, &config);
        engine.ensure_consistency();
        assert!(store.contains("course-gates-data").unwrap());
        assert!(!store.contains("module-gates-data").unwrap());
    }

    #[test]
    fn test_auxiliary_queries() {
        let engine = engine(
            r#"{"id": "q", "content": [
                {"type": "code", "code": "print(1)"},
                {"type": "exercise-code", "starterCode": "x = ", "solution": "x = 1", "hint": "assign"}
            ]}"#,
        );
        assert_eq!(engine.starter_code(0).unwrap(), Some("print(1)"));
        assert_eq!(engine.starter_code(1).unwrap(), Some("x = "));
        assert_eq!(engine.solution(1).unwrap(), Some("x = 1"));
        assert_eq!(engine.hint(1).unwrap(), Some("assign"));
        assert_eq!(engine.hint(0).unwrap(), None);
        assert!(engine.solution(9).is_err());
    }

    #[test]
    fn test_section_status() {
        let mut engine = engine(GATES);
        engine.submit_numeric(0, "1").unwrap();
        assert_eq!(engine.section_status(0).unwrap(), SectionStatus::Completed);
        assert_eq!(engine.section_status(3).unwrap(), SectionStatus::Unlocked);
        assert_eq!(engine.section_status(4).unwrap(), SectionStatus::Locked);
        assert!(engine.section_status(5).is_err());
    }

    const CODE: &str = r#"{"id": "code", "content": [
        {"type": "exercise-code", "expectedOutput": "42", "successMessage": "Well done", "errorMessage": "Not 42"},
        {"type": "concept"}
    ]}"#;

    #[tokio::test]
    async fn test_code_exercise_correct() {
        let mut engine = code_engine(CODE, FakeRunner::printing("42\n"));

        let attempt = engine.submit_code(0, "print(42)").await.unwrap();
        assert!(attempt.verdict.is_correct());
        assert_eq!(attempt.feedback, "Well done");
        assert_eq!(attempt.output.unwrap().stdout, "42\n");
        assert_eq!(attempt.next, Some(1));
        assert_eq!(engine.progress(), 100);
        assert_eq!(engine.runner().call_count(), 1);
    }

    #[tokio::test]
    async fn test_code_exercise_wrong_output() {
        let mut engine = code_engine(CODE, FakeRunner::printing("41\n"));

        let attempt = engine.submit_code(0, "print(41)").await.unwrap();
        assert_eq!(attempt.feedback, "Not 42");
        assert!(!engine.is_unlocked(1));
    }

    #[tokio::test]
    async fn test_code_exercise_execution_error() {
        let mut engine = code_engine(CODE, FakeRunner::raising("NameError: x"));

        let attempt = engine.submit_code(0, "print(x)").await.unwrap();
        assert!(matches!(
            attempt.verdict,
            Verdict::Incorrect(Mismatch::ExecutionFailed { .. })
        ));
        assert!(attempt.feedback.contains("NameError"));
        assert!(engine.state().completed_sections().is_empty());
    }

    #[tokio::test]
    async fn test_run_snippet_does_not_progress() {
        let engine = code_engine(CODE, FakeRunner::printing("hello\n"));
        let before = engine.snapshot();

        let output = engine.run_snippet("print('hello')").await.unwrap();
        assert_eq!(output.stdout, "hello\n");
        assert_eq!(engine.snapshot(), before);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn module_json(blocking: &[bool]) -> String {
            let content: Vec<String> = blocking
                .iter()
                .map(|&b| {
                    if b {
                        r#"{"type": "quiz", "options": ["a", "b"], "correct": 0}"#.to_string()
                    } else {
                        r#"{"type": "concept"}"#.to_string()
                    }
                })
                .collect();
            format!(r#"{{"id": "p", "objectives": ["o"], "content": [{}]}}"#, content.join(","))
        }

        #[derive(Debug, Clone)]
        enum Op {
            Complete(usize),
            UnlockNext(usize),
            Submit(usize, usize),
            Objective(usize),
            Consistency,
        }

        fn op() -> impl Strategy<Value = Op> {
            prop_oneof![
                (0usize..12).prop_map(Op::Complete),
                (0usize..12).prop_map(Op::UnlockNext),
                (0usize..12, 0usize..2).prop_map(|(i, o)| Op::Submit(i, o)),
                (0usize..3).prop_map(Op::Objective),
                Just(Op::Consistency),
            ]
        }

        fn apply(engine: &mut ProgressionEngine<Arc<MemoryStore>>, op: &Op) {
            // Precondition errors are expected for random indices.
            match *op {
                Op::Complete(i) => {
                    let _ = engine.complete_section(i);
                }
                Op::UnlockNext(i) => {
                    let _ = engine.unlock_next(i);
                }
                Op::Submit(i, o) => {
                    let _ = engine.submit_choice(i, Some(o));
                }
                Op::Objective(i) => {
                    engine.complete_objective(i);
                }
                Op::Consistency => {
                    engine.ensure_consistency();
                }
            }
        }

        proptest! {
            #[test]
            fn prop_ensure_consistency_idempotent(
                blocking in proptest::collection::vec(any::<bool>(), 1..10),
                completed in proptest::collection::btree_set(0usize..10, 0..5),
                unlocked in proptest::collection::btree_set(0usize..10, 0..5),
            ) {
                let store = Arc::new(MemoryStore::new());
                let snapshot = Snapshot {
                    progress: 0,
                    completed_objectives: vec![],
                    completed_sections: completed.into_iter().collect(),
                    unlocked_sections: unlocked.into_iter().collect(),
                };
                store.set("module-p-data", &serde_json::to_string(&snapshot).unwrap()).unwrap();

                let mut engine = ProgressionEngine::new(
                    module(&module_json(&blocking)), store, NoRunner, &Config::default());
                engine.ensure_consistency();
                let once = engine.state().clone();
                prop_assert_eq!(engine.ensure_consistency(), 0);
                prop_assert_eq!(engine.state(), &once);
            }

            #[test]
            fn prop_operations_preserve_invariants(
                blocking in proptest::collection::vec(any::<bool>(), 1..10),
                ops in proptest::collection::vec(op(), 0..30),
            ) {
                let json = module_json(&blocking);
                let mut engine = engine(&json);

                for op in &ops {
                    let before = engine.state().clone();
                    apply(&mut engine, op);
                    let after = engine.state();

                    // Sets only grow.
                    prop_assert!(before.unlocked_sections().is_subset(after.unlocked_sections()));
                    prop_assert!(before.completed_sections().is_subset(after.completed_sections()));
                    prop_assert!(before.completed_objectives().is_subset(after.completed_objectives()));

                    prop_assert!(after.unlocked_sections().contains(&0));
                    prop_assert!(after.completed_sections().iter().all(|&i| blocking[i]));

                    let total = blocking.iter().filter(|&&b| b).count();
                    let expected = if total == 0 {
                        100
                    } else {
                        (100.0 * engine.count_completed_blocking() as f64 / total as f64).round() as u32
                    };
                    prop_assert_eq!(engine.progress(), expected);
                }
            }

            #[test]
            fn prop_correct_answer_opens_one_gate(
                blocking in proptest::collection::vec(any::<bool>(), 2..10),
            ) {
                let json = module_json(&blocking);
                let mut engine = engine(&json);
                let Some(first) = blocking.iter().position(|&b| b) else {
                    return Ok(());
                };

                engine.submit_choice(first, Some(0)).unwrap();
                let gates_open = engine
                    .state()
                    .unlocked_sections()
                    .iter()
                    .filter(|&&i| i > first && blocking[i])
                    .count();
                prop_assert!(gates_open <= 1);
            }
        }
    }
}
