//! Data sources - named live variables usable in prop bindings and actions.
//!
//! The [`DataSourceEngine`] owns the current value of every declared data
//! source. All writes go through [`DataSourceEngine::set_values`], which
//! applies a whole update set under one write lock and one revision bump, so
//! a reader never sees part of an update.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::codec::{self, VariablesMap};
use crate::expression::{ExpressionError, ExpressionEvaluator, Interpreter};
use crate::prop::ExpressionRef;
use crate::value::Value;
use crate::{StudioError, StudioResult};

/// Unique identifier of a data source.
pub type DataSourceId = String;

/// Capacity of the change notification channel.
const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// What kind of data a data source holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSourceKind {
    /// A page-authored variable.
    Variable,
    /// A value passed in by the host (URL params, system values).
    Parameter,
    /// The result of a fetched resource.
    Resource,
}

/// A declared data source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSource {
    /// Unique identifier.
    pub id: DataSourceId,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Data source kind.
    pub kind: DataSourceKind,
    /// Value on (re)mount.
    #[serde(default)]
    pub initial_value: Value,
}

impl DataSource {
    /// Declare a variable.
    #[must_use]
    pub fn variable(id: impl Into<DataSourceId>, initial_value: impl Into<Value>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            kind: DataSourceKind::Variable,
            initial_value: initial_value.into(),
        }
    }
}

/// Notification sent after every applied update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValuesChanged {
    /// Data sources whose value changed.
    pub ids: Vec<DataSourceId>,
    /// Engine revision after the update.
    pub revision: u64,
}

/// A value read together with the revision it was last written at.
#[derive(Debug, Clone, PartialEq)]
pub struct Lookup {
    /// Current value, or the initial value if never written.
    pub value: Value,
    /// Revision of the last write to this data source (0 if never written).
    pub revision: u64,
}

#[derive(Debug, Default)]
struct EngineState {
    sources: IndexMap<DataSourceId, DataSource>,
    values: HashMap<DataSourceId, Value>,
    written_at: HashMap<DataSourceId, u64>,
    revision: u64,
}

impl EngineState {
    fn lookup(&self, id: &str) -> Option<Lookup> {
        let source = self.sources.get(id)?;
        Some(Lookup {
            value: self
                .values
                .get(id)
                .cloned()
                .unwrap_or_else(|| source.initial_value.clone()),
            revision: self.written_at.get(id).copied().unwrap_or(0),
        })
    }

    fn bump(&mut self, ids: &[DataSourceId]) -> u64 {
        self.revision += 1;
        for id in ids {
            self.written_at.insert(id.clone(), self.revision);
        }
        self.revision
    }
}

/// Holds the current value of every data source and runs actions.
pub struct DataSourceEngine {
    state: RwLock<EngineState>,
    changes: broadcast::Sender<ValuesChanged>,
    evaluator: Arc<dyn ExpressionEvaluator>,
}

impl std::fmt::Debug for DataSourceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataSourceEngine")
            .field("revision", &self.revision())
            .finish_non_exhaustive()
    }
}

impl Default for DataSourceEngine {
    fn default() -> Self {
        Self::new(Arc::new(Interpreter::new()))
    }
}

impl DataSourceEngine {
    /// Create an engine that runs actions with `evaluator`.
    #[must_use]
    pub fn new(evaluator: Arc<dyn ExpressionEvaluator>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            state: RwLock::new(EngineState::default()),
            changes,
            evaluator,
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, EngineState> {
        self.state
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, EngineState> {
        self.state
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Declare the data sources of a document, resetting every value to its
    /// initial value.
    pub fn mount(&self, sources: impl IntoIterator<Item = DataSource>) {
        let (ids, revision) = {
            let mut state = self.write();
            state.sources = sources.into_iter().map(|s| (s.id.clone(), s)).collect();
            state.values.clear();
            let ids: Vec<DataSourceId> = state.sources.keys().cloned().collect();
            let revision = state.bump(&ids);
            tracing::info!(count = ids.len(), revision, "Mounted data sources");
            (ids, revision)
        };
        self.notify(ids, revision);
    }

    /// Add or replace declarations without touching other data sources.
    ///
    /// A redeclared data source keeps its current value.
    pub fn upsert_sources(&self, sources: impl IntoIterator<Item = DataSource>) {
        let (ids, revision) = {
            let mut state = self.write();
            let mut ids = Vec::new();
            for source in sources {
                ids.push(source.id.clone());
                state.sources.insert(source.id.clone(), source);
            }
            let revision = state.bump(&ids);
            (ids, revision)
        };
        self.notify(ids, revision);
    }

    /// Remove declarations and their values.
    pub fn remove_sources(&self, ids: &[DataSourceId]) {
        let revision = {
            let mut state = self.write();
            for id in ids {
                state.sources.shift_remove(id);
                state.values.remove(id);
            }
            state.bump(ids)
        };
        self.notify(ids.to_vec(), revision);
    }

    /// Reset every value to its initial value (re-mount).
    pub fn reset(&self) {
        let (ids, revision) = {
            let mut state = self.write();
            state.values.clear();
            let ids: Vec<DataSourceId> = state.sources.keys().cloned().collect();
            let revision = state.bump(&ids);
            (ids, revision)
        };
        self.notify(ids, revision);
    }

    /// Whether `id` is declared.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.read().sources.contains_key(id)
    }

    /// Get a declaration.
    #[must_use]
    pub fn source(&self, id: &str) -> Option<DataSource> {
        self.read().sources.get(id).cloned()
    }

    /// Current value of `id`, falling back to its initial value.
    ///
    /// Returns `None` if `id` is not declared.
    #[must_use]
    pub fn get_value(&self, id: &str) -> Option<Value> {
        self.read().lookup(id).map(|l| l.value)
    }

    /// Current value and write revision of `id`, read atomically.
    #[must_use]
    pub fn lookup(&self, id: &str) -> Option<Lookup> {
        self.read().lookup(id)
    }

    /// Snapshot of every declared data source's current value.
    #[must_use]
    pub fn values(&self) -> VariablesMap {
        let state = self.read();
        state
            .sources
            .keys()
            .filter_map(|id| state.lookup(id).map(|l| (id.clone(), l.value)))
            .collect()
    }

    /// Engine revision; bumps once per applied update.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.read().revision
    }

    /// Apply all `updates` together.
    ///
    /// Updates for undeclared data sources are skipped with a warning. Returns
    /// the ids that were applied.
    pub fn set_values(&self, updates: VariablesMap) -> Vec<DataSourceId> {
        let (applied, revision) = {
            let mut state = self.write();
            let mut applied = Vec::with_capacity(updates.len());
            for (id, value) in updates {
                if state.sources.contains_key(&id) {
                    state.values.insert(id.clone(), value);
                    applied.push(id);
                } else {
                    tracing::warn!(data_source = %id, "Ignoring update for undeclared data source");
                }
            }
            if applied.is_empty() {
                return applied;
            }
            let revision = state.bump(&applied);
            tracing::debug!(count = applied.len(), revision, "Applied data source values");
            (applied, revision)
        };
        self.notify(applied.clone(), revision);
        applied
    }

    /// Execute `code` against `current_values`, crossing the codec boundary in
    /// both directions. Returns the decoded values the code assigned.
    ///
    /// # Errors
    ///
    /// Returns [`ExpressionError`] if evaluation fails or its result does not
    /// decode.
    pub fn execute_expression(
        &self,
        code: &str,
        args: &VariablesMap,
        current_values: &VariablesMap,
    ) -> Result<VariablesMap, ExpressionError> {
        let encoded = self.evaluator.evaluate(
            code,
            &codec::encode_values(args),
            &codec::encode_values(current_values),
        )?;
        if !encoded.is_object() {
            return Err(ExpressionError::BadResult(
                codec::json_kind(&encoded).to_string(),
            ));
        }
        Ok(codec::decode_values(&encoded)?)
    }

    /// Run an action and apply its result.
    ///
    /// Either every value the action computed is applied or, on failure, none.
    ///
    /// # Errors
    ///
    /// Returns [`StudioError::ExpressionExecutionFailure`] if the action fails.
    pub fn run_action(
        &self,
        action: &ExpressionRef,
        args: VariablesMap,
    ) -> StudioResult<Vec<DataSourceId>> {
        for name in &action.args {
            if !args.contains_key(name) {
                tracing::debug!(arg = %name, "Action argument not supplied");
            }
        }
        let current = self.values();
        match self.execute_expression(&action.code, &args, &current) {
            Ok(updates) => Ok(self.set_values(updates)),
            Err(e) => {
                tracing::warn!(code = %action.code, "Action failed, no values applied: {e}");
                Err(StudioError::ExpressionExecutionFailure(e))
            }
        }
    }

    /// Subscribe to change notifications.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ValuesChanged> {
        self.changes.subscribe()
    }

    /// `revision` is the one the write produced, read under its lock.
    fn notify(&self, ids: Vec<DataSourceId>, revision: u64) {
        // No receivers is fine
        let _ = self.changes.send(ValuesChanged { ids, revision });
    }
}
