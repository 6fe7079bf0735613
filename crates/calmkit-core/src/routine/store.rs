//! Routine storage and persistence.
//!
//! Definitions are stored whole; a save replaces any earlier definition
//! with the same id.

use std::collections::HashMap;

use tracing::{debug, warn};
use uuid::Uuid;

use super::definition::RoutineDefinition;
use crate::error::StoreError;
use crate::storage::Database;

const KEY_PREFIX: &str = "routine:";

pub trait RoutineStore {
    /// All definitions ordered by name, then id.
    fn list(&self) -> Result<Vec<RoutineDefinition>, StoreError>;

    /// Validate and persist `routine`, assigning an id if it has none.
    /// Returns the stored definition.
    fn save(&mut self, routine: RoutineDefinition) -> Result<RoutineDefinition, StoreError>;

    fn load(&self, id: &str) -> Result<RoutineDefinition, StoreError>;

    fn delete(&mut self, id: &str) -> Result<(), StoreError>;
}

fn prepare(mut routine: RoutineDefinition) -> Result<RoutineDefinition, StoreError> {
    routine.validate()?;
    if routine.id.trim().is_empty() {
        routine.id = Uuid::new_v4().to_string();
    }
    Ok(routine)
}

fn sort_routines(routines: &mut [RoutineDefinition]) {
    routines.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
}

/// In-process store.
#[derive(Debug, Clone, Default)]
pub struct MemoryRoutineStore {
    routines: HashMap<String, RoutineDefinition>,
}

impl MemoryRoutineStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RoutineStore for MemoryRoutineStore {
    fn list(&self) -> Result<Vec<RoutineDefinition>, StoreError> {
        let mut routines: Vec<_> = self.routines.values().cloned().collect();
        sort_routines(&mut routines);
        Ok(routines)
    }

    fn save(&mut self, routine: RoutineDefinition) -> Result<RoutineDefinition, StoreError> {
        let routine = prepare(routine)?;
        self.routines.insert(routine.id.clone(), routine.clone());
        Ok(routine)
    }

    fn load(&self, id: &str) -> Result<RoutineDefinition, StoreError> {
        self.routines
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn delete(&mut self, id: &str) -> Result<(), StoreError> {
        self.routines
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }
}

/// One JSON blob per routine in the database's `kv` table, keyed
/// `routine:<id>`.
pub struct KvRoutineStore<'a> {
    db: &'a Database,
}

impl<'a> KvRoutineStore<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    fn key(id: &str) -> String {
        format!("{KEY_PREFIX}{id}")
    }
}

impl RoutineStore for KvRoutineStore<'_> {
    /// Blobs that no longer decode are skipped with a warning.
    fn list(&self) -> Result<Vec<RoutineDefinition>, StoreError> {
        let mut routines = Vec::new();
        for (key, blob) in self.db.kv_keys_with_prefix(KEY_PREFIX)? {
            match serde_json::from_str::<RoutineDefinition>(&blob) {
                Ok(routine) => routines.push(routine),
                Err(e) => warn!(%key, error = %e, "skipping unreadable routine"),
            }
        }
        sort_routines(&mut routines);
        Ok(routines)
    }

    fn save(&mut self, routine: RoutineDefinition) -> Result<RoutineDefinition, StoreError> {
        let routine = prepare(routine)?;
        let blob = serde_json::to_string(&routine)?;
        self.db.kv_set(&Self::key(&routine.id), &blob)?;
        debug!(id = %routine.id, name = %routine.name, "routine saved");
        Ok(routine)
    }

    fn load(&self, id: &str) -> Result<RoutineDefinition, StoreError> {
        let blob = self
            .db
            .kv_get(&Self::key(id))?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        Ok(serde_json::from_str(&blob)?)
    }

    fn delete(&mut self, id: &str) -> Result<(), StoreError> {
        if self.db.kv_delete(&Self::key(id))? {
            debug!(id, "routine deleted");
            Ok(())
        } else {
            Err(StoreError::NotFound(id.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::routine::{ActivityType, RoutineStep};

    fn morning() -> RoutineDefinition {
        RoutineDefinition::new(
            "Morning",
            vec![
                RoutineStep::new(ActivityType::Breathing, 60),
                RoutineStep::new(ActivityType::Stretch, 90).with_label("Neck rolls"),
            ],
        )
    }

    fn exercise(store: &mut dyn RoutineStore) {
        let saved = store.save(morning()).unwrap();
        let mut unnamed = RoutineDefinition::new("Evening", vec![RoutineStep::new(ActivityType::Rest, 30)]);
        unnamed.id = String::new();
        let evening = store.save(unnamed).unwrap();
        assert!(!evening.id.is_empty());

        assert_eq!(store.load(&saved.id).unwrap(), saved);
        let names: Vec<String> = store.list().unwrap().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["Evening", "Morning"]);

        let empty = RoutineDefinition::new("Empty", vec![]);
        assert!(matches!(
            store.save(empty),
            Err(StoreError::Invalid(EngineError::InvalidRoutineDefinition(_)))
        ));

        store.delete(&saved.id).unwrap();
        assert!(matches!(store.load(&saved.id), Err(StoreError::NotFound(_))));
        assert!(matches!(store.delete(&saved.id), Err(StoreError::NotFound(_))));
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn memory_store_behaviour() {
        exercise(&mut MemoryRoutineStore::new());
    }

    #[test]
    fn kv_store_behaviour() {
        let db = Database::open_memory().unwrap();
        exercise(&mut KvRoutineStore::new(&db));
    }

    #[test]
    fn kv_store_skips_corrupt_blobs() {
        let db = Database::open_memory().unwrap();
        let mut store = KvRoutineStore::new(&db);
        store.save(morning()).unwrap();
        db.kv_set("routine:broken", "{not json").unwrap();
        assert_eq!(store.list().unwrap().len(), 1);
        assert!(matches!(store.load("broken"), Err(StoreError::Serialize(_))));
    }

    #[test]
    fn save_replaces_same_id() {
        let mut store = MemoryRoutineStore::new();
        let mut routine = store.save(morning()).unwrap();
        routine.name = "Morning v2".into();
        store.save(routine.clone()).unwrap();
        let all = store.list().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "Morning v2");
    }
}
