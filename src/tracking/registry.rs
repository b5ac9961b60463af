use crate::domain::{EntityKey, Lifecycle, TaskGroup, TaskInstance};
use std::collections::HashMap;

/// Handle into the registry arena; stale after the next rebuild
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewHandle {
    index: usize,
    generation: u64,
}

/// One displayed row or stack
#[derive(Debug, Clone, PartialEq)]
pub struct ViewModel {
    pub entity: EntityKey,
    pub title: String,
    /// Instance ids shown by this view (one for a row)
    pub member_ids: Vec<i64>,
    pub total: i64,
    pub cost: f64,
    /// Showing a running session
    pub live: bool,
    pub lifecycle: Lifecycle,
}

/// Id-keyed arena of the currently loaded view-models
#[derive(Debug, Default)]
pub struct ViewRegistry {
    generation: u64,
    views: Vec<ViewModel>,
    by_entity: HashMap<EntityKey, usize>,
    by_instance: HashMap<i64, usize>,
    instances: HashMap<i64, TaskInstance>,
}

impl ViewRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace every view from freshly grouped data. Old handles go stale.
    pub fn rebuild(&mut self, groups: &[TaskGroup]) {
        self.generation += 1;
        self.views.clear();
        self.by_entity.clear();
        self.by_instance.clear();
        self.instances.clear();

        for group in groups {
            let index = self.views.len();
            let entity = if group.is_stack() {
                EntityKey::Stack(group.key.clone())
            } else {
                EntityKey::Task(group.members[0].id)
            };
            for member in &group.members {
                self.by_instance.insert(member.id, index);
                self.instances.insert(member.id, member.clone());
            }
            self.by_entity.insert(entity.clone(), index);
            self.views.push(ViewModel {
                entity,
                title: group.latest_task().name.clone(),
                member_ids: group.member_ids(),
                total: group.total_duration,
                cost: group.total_cost,
                live: false,
                lifecycle: Lifecycle::Live,
            });
        }
    }

    fn handle(&self, index: usize) -> ViewHandle {
        ViewHandle {
            index,
            generation: self.generation,
        }
    }

    /// The view displaying `instance_id`, either its row or its stack
    pub fn locate(&self, instance_id: i64) -> Option<ViewHandle> {
        self.by_instance.get(&instance_id).map(|&i| self.handle(i))
    }

    pub fn get(&self, handle: ViewHandle) -> Option<&ViewModel> {
        if handle.generation != self.generation {
            return None;
        }
        self.views.get(handle.index)
    }

    pub fn get_mut(&mut self, handle: ViewHandle) -> Option<&mut ViewModel> {
        if handle.generation != self.generation {
            return None;
        }
        self.views.get_mut(handle.index)
    }

    /// Mark a view as disposed (its widget is gone); it receives no further updates
    pub fn dispose(&mut self, entity: &EntityKey) -> bool {
        match self.by_entity.get(entity) {
            Some(&i) => {
                self.views[i].lifecycle = Lifecycle::Disposed;
                true
            }
            None => false,
        }
    }

    pub fn instance(&self, instance_id: i64) -> Option<&TaskInstance> {
        self.instances.get(&instance_id)
    }

    pub fn instance_mut(&mut self, instance_id: i64) -> Option<&mut TaskInstance> {
        self.instances.get_mut(&instance_id)
    }

    pub fn contains_instance(&self, instance_id: i64) -> bool {
        self.instances.contains_key(&instance_id)
    }

    pub fn views(&self) -> &[ViewModel] {
        &self.views
    }

    #[cfg(test)]
    pub fn instance_ids(&self) -> Vec<i64> {
        self.views
            .iter()
            .flat_map(|v| v.member_ids.iter().copied())
            .collect()
    }
}
