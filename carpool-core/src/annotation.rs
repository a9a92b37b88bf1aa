use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use uuid::Uuid;

use crate::geo::Coordinate;
use crate::identity::PassengerIdentity;

/// Device-local display data, scoped to the passenger who produced it.
///
/// A fix recorded for one passenger is never visible to another. Never
/// consulted for capacity decisions; losing or corrupting an entry only
/// changes what that passenger's listing shows.
pub trait AnnotationCache: Send + Sync {
    fn get(&self, owner: &PassengerIdentity, trip_id: Uuid) -> Option<Coordinate>;
    fn set(&self, owner: &PassengerIdentity, trip_id: Uuid, location: Coordinate);
    fn remove(&self, owner: &PassengerIdentity, trip_id: Uuid);
}

#[derive(Debug, Default)]
pub struct InMemoryAnnotationCache {
    entries: RwLock<HashMap<(PassengerIdentity, Uuid), Coordinate>>,
}

impl InMemoryAnnotationCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AnnotationCache for InMemoryAnnotationCache {
    fn get(&self, owner: &PassengerIdentity, trip_id: Uuid) -> Option<Coordinate> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(owner.clone(), trip_id))
            .copied()
    }

    fn set(&self, owner: &PassengerIdentity, trip_id: Uuid, location: Coordinate) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((owner.clone(), trip_id), location);
    }

    fn remove(&self, owner: &PassengerIdentity, trip_id: Uuid) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&(owner.clone(), trip_id));
    }
}
