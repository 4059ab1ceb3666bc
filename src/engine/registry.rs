//! Execution registry: at most one active execution per preset id

use super::{ExecutionContext, ExecutionId, ExecutionSnapshot, ExecutionState};
use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::time::Instant;

#[derive(Default)]
struct Inner {
    executions: HashMap<ExecutionId, ExecutionContext>,
    by_preset: HashMap<String, ExecutionId>,
}

impl Inner {
    fn take(&mut self, id: ExecutionId) -> Option<ExecutionContext> {
        let mut ctx = self.executions.remove(&id)?;
        if self.by_preset.get(ctx.preset_id()) == Some(&id) {
            self.by_preset.remove(ctx.preset_id());
        }
        ctx.transition(ExecutionState::Stopping);
        Some(ctx)
    }
}

/// Owned set of active executions behind one lock.
///
/// Contexts leave the registry already in `Stopping`, under the same lock the
/// tick iterates with, so a removed context is never rendered again.
#[derive(Default)]
pub struct ExecutionRegistry {
    inner: Mutex<Inner>,
}

impl ExecutionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an execution, returning any execution of the same preset it replaced
    pub fn register(&self, ctx: ExecutionContext) -> Option<ExecutionContext> {
        let mut inner = self.inner.lock();
        let previous = inner.by_preset.get(ctx.preset_id()).copied();
        let replaced = previous.and_then(|id| inner.take(id));

        inner.by_preset.insert(ctx.preset_id().to_string(), ctx.id());
        inner.executions.insert(ctx.id(), ctx);
        replaced
    }

    pub fn remove(&self, id: ExecutionId) -> Option<ExecutionContext> {
        self.inner.lock().take(id)
    }

    pub fn remove_preset(&self, preset_id: &str) -> Option<ExecutionContext> {
        let mut inner = self.inner.lock();
        let id = inner.by_preset.get(preset_id).copied()?;
        inner.take(id)
    }

    /// Remove every execution
    pub fn drain(&self) -> Vec<ExecutionContext> {
        let mut inner = self.inner.lock();
        let ids: Vec<ExecutionId> = inner.executions.keys().copied().collect();
        ids.into_iter().filter_map(|id| inner.take(id)).collect()
    }

    /// Visit every active execution under the lock
    pub fn for_each_active<F>(&self, mut visit: F)
    where
        F: FnMut(&mut ExecutionContext),
    {
        let mut inner = self.inner.lock();
        inner
            .executions
            .values_mut()
            .filter(|ctx| ctx.state() == ExecutionState::Active)
            .for_each(|ctx| visit(ctx));
    }

    /// Remove the executions that have run their course
    pub fn remove_completed(&self) -> Vec<ExecutionContext> {
        let mut inner = self.inner.lock();
        let completed: Vec<ExecutionId> = inner
            .executions
            .values()
            .filter(|ctx| ctx.is_completed())
            .map(|ctx| ctx.id())
            .collect();

        completed
            .into_iter()
            .filter_map(|id| inner.take(id))
            .collect()
    }

    /// Snapshots of active executions, ordered by preset id
    pub fn list(&self, now: Instant) -> Vec<ExecutionSnapshot> {
        let inner = self.inner.lock();
        let mut snapshots: Vec<ExecutionSnapshot> = inner
            .executions
            .values()
            .filter(|ctx| ctx.state() == ExecutionState::Active)
            .map(|ctx| ctx.snapshot(now))
            .collect();
        snapshots.sort_by(|a, b| a.preset_id.cmp(&b.preset_id));
        snapshots
    }

    pub fn contains_preset(&self, preset_id: &str) -> bool {
        self.inner.lock().by_preset.contains_key(preset_id)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().executions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::{Effect, VolumeParams};
    use crate::engine::{PresetDefinition, StartRequest};
    use std::time::Duration;

    fn active(preset_id: &str) -> ExecutionContext {
        let mut ctx = ExecutionContext::new(
            StartRequest::new(PresetDefinition::new(preset_id)),
            Effect::VolumeReactive(VolumeParams::default()),
            Duration::from_secs(10),
            Instant::now(),
        );
        ctx.transition(ExecutionState::Starting);
        ctx.transition(ExecutionState::Active);
        ctx
    }

    #[test]
    fn register_replaces_same_preset() {
        let registry = ExecutionRegistry::new();
        let first = active("p");
        let first_id = first.id();

        assert!(registry.register(first).is_none());
        let replaced = registry.register(active("p")).unwrap();

        assert_eq!(replaced.id(), first_id);
        assert_eq!(replaced.state(), ExecutionState::Stopping);
        assert_eq!(registry.len(), 1);

        let listed = registry.list(Instant::now());
        assert_eq!(listed.len(), 1);
        assert_ne!(listed[0].id, first_id);
    }

    #[test]
    fn different_presets_coexist() {
        let registry = ExecutionRegistry::new();
        registry.register(active("b"));
        registry.register(active("a"));

        let presets: Vec<String> = registry
            .list(Instant::now())
            .into_iter()
            .map(|s| s.preset_id)
            .collect();
        assert_eq!(presets, vec!["a", "b"]);
    }

    #[test]
    fn remove_by_id_and_preset() {
        let registry = ExecutionRegistry::new();
        let ctx = active("a");
        let id = ctx.id();
        registry.register(ctx);
        registry.register(active("b"));

        assert_eq!(registry.remove(id).unwrap().state(), ExecutionState::Stopping);
        assert!(registry.remove(id).is_none());
        assert!(!registry.contains_preset("a"));

        assert!(registry.remove_preset("b").is_some());
        assert!(registry.remove_preset("b").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn completed_contexts_stay_until_removed() {
        let registry = ExecutionRegistry::new();
        registry.register(active("keep"));
        registry.register(active("done"));

        let mut visited = 0;
        registry.for_each_active(|ctx| {
            visited += 1;
            if ctx.preset_id() == "done" {
                ctx.complete();
            }
        });
        assert_eq!(visited, 2);

        let mut visited = Vec::new();
        registry.for_each_active(|ctx| visited.push(ctx.preset_id().to_string()));
        assert_eq!(visited, vec!["keep"]);
        assert!(registry.contains_preset("done"));
        assert_eq!(registry.list(Instant::now()).len(), 1);

        let removed = registry.remove_completed();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].preset_id(), "done");
        assert!(!registry.contains_preset("done"));
        assert!(registry.remove_completed().is_empty());
    }

    #[test]
    fn drain_empties_everything() {
        let registry = ExecutionRegistry::new();
        registry.register(active("a"));
        registry.register(active("b"));

        let drained = registry.drain();

        assert_eq!(drained.len(), 2);
        assert!(drained.iter().all(|c| c.state() == ExecutionState::Stopping));
        assert!(registry.is_empty());
    }
}
