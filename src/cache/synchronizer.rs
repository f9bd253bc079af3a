//! Synchronizer - the two-phase optimistic mutation state machine.
//!
//! Every mutation runs `Idle -> OptimisticApplied -> {Reconciled |
//! RolledBack} -> Idle`: `begin` applies the optimistic delta and
//! registers the pending entry, `commit` reconciles it against the
//! registry-confirmed record, `abort` restores the captured pre-image.
//! At most one unresolved mutation may target a given entity; mutations
//! for independent entities interleave freely.

use std::collections::HashMap;

use uuid::Uuid;

use super::mutation::{Mutation, MutationOutcome, Target, UndoRecord};
use super::projection::Projection;
use super::CacheError;
use crate::registry::{Car, PersonWithCars};

/// Handle for a pending mutation, consumed by `commit` or `abort`.
#[derive(Debug)]
pub struct Ticket {
    key: String,
}

impl Ticket {
    /// The entity key this ticket is pending under.
    pub fn key(&self) -> &str {
        &self.key
    }
}

struct Pending {
    mutation: Mutation,
    placeholder: Option<String>,
    undo: Vec<u8>,
}

/// Client-side mutation synchronizer. Owns the local projection and at
/// most one unresolved optimistic delta per entity.
#[derive(Default)]
pub struct Synchronizer {
    projection: Projection,
    pending: HashMap<String, Pending>,
}

impl Synchronizer {
    /// Create a synchronizer over an empty projection.
    pub fn new() -> Self {
        Self::default()
    }

    /// The current local projection.
    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    /// Whether any mutation is still unresolved.
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Replace the projection with freshly fetched authoritative state.
    ///
    /// Refused while mutations are unresolved - their tickets would
    /// otherwise reconcile against state they never touched.
    pub fn hydrate(
        &mut self,
        people: Vec<PersonWithCars>,
        cars: Vec<Car>,
    ) -> Result<(), CacheError> {
        if let Some(key) = self.pending.keys().next() {
            return Err(CacheError::PendingMutation { key: key.clone() });
        }
        self.projection = Projection::from_parts(people, cars);
        Ok(())
    }

    /// Apply a mutation's optimistic delta and register it as pending.
    ///
    /// A failed begin leaves the projection untouched.
    pub fn begin(&mut self, mutation: Mutation) -> Result<Ticket, CacheError> {
        let (key, placeholder) = match mutation.target() {
            Target::NewPerson => {
                let id = local_id();
                (format!("person:{}", id), Some(id))
            }
            Target::NewCar => {
                let id = local_id();
                (format!("car:{}", id), Some(id))
            }
            Target::Person(id) => (format!("person:{}", id), None),
            Target::Car(id) => (format!("car:{}", id), None),
        };
        if self.pending.contains_key(&key) {
            return Err(CacheError::PendingMutation { key });
        }

        let record = mutation.apply_optimistic(&mut self.projection, placeholder.as_deref());
        let undo = match bitcode::serialize(&record) {
            Ok(bytes) => bytes,
            Err(err) => {
                record.apply(&mut self.projection);
                return Err(CacheError::Codec(err.to_string()));
            }
        };

        self.pending.insert(
            key.clone(),
            Pending {
                mutation,
                placeholder,
                undo,
            },
        );
        Ok(Ticket { key })
    }

    /// Reconcile a pending mutation against its confirmed outcome.
    pub fn commit(&mut self, ticket: Ticket, outcome: MutationOutcome) -> Result<(), CacheError> {
        let pending = match self.pending.remove(&ticket.key) {
            Some(pending) => pending,
            None => return Err(CacheError::UnknownTicket),
        };
        if !pending.mutation.matches(&outcome) {
            let key = ticket.key.clone();
            self.pending.insert(ticket.key, pending);
            return Err(CacheError::OutcomeMismatch { key });
        }

        pending
            .mutation
            .reconcile(&mut self.projection, pending.placeholder.as_deref(), &outcome);
        Ok(())
    }

    /// Discard a pending mutation, restoring the pre-mutation projection.
    pub fn abort(&mut self, ticket: Ticket) -> Result<(), CacheError> {
        let pending = match self.pending.remove(&ticket.key) {
            Some(pending) => pending,
            None => return Err(CacheError::UnknownTicket),
        };
        let record: UndoRecord = match bitcode::deserialize(&pending.undo) {
            Ok(record) => record,
            Err(err) => {
                let message = err.to_string();
                self.pending.insert(ticket.key, pending);
                return Err(CacheError::Codec(message));
            }
        };

        record.apply(&mut self.projection);
        Ok(())
    }
}

fn local_id() -> String {
    format!("local-{}", Uuid::new_v4())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{OwnedCar, Person};
    use rust_decimal::Decimal;

    fn person(id: &str, first: &str, last: &str) -> Person {
        Person {
            id: id.to_string(),
            first_name: first.to_string(),
            last_name: last.to_string(),
        }
    }

    fn car(id: &str, person_id: &str, price: i64) -> Car {
        Car {
            id: id.to_string(),
            year: 2019,
            make: "Toyota".to_string(),
            model: "Corolla".to_string(),
            price: Decimal::from(price),
            person_id: person_id.to_string(),
        }
    }

    fn hydrated() -> Synchronizer {
        let c1 = car("c1", "1", 40000);
        let c2 = car("c2", "2", 60000);
        let people = vec![
            PersonWithCars {
                id: "1".into(),
                first_name: "Bill".into(),
                last_name: "Gates".into(),
                cars: vec![OwnedCar::from(&c1)],
            },
            PersonWithCars {
                id: "2".into(),
                first_name: "Steve".into(),
                last_name: "Jobs".into(),
                cars: vec![OwnedCar::from(&c2)],
            },
        ];
        let mut sync = Synchronizer::new();
        sync.hydrate(people, vec![c1, c2]).unwrap();
        sync
    }

    #[test]
    fn begin_commit_swaps_placeholder_for_confirmed_person() {
        let mut sync = hydrated();
        let ticket = sync
            .begin(Mutation::AddPerson {
                first_name: "Ada".into(),
                last_name: "Lovelace".into(),
            })
            .unwrap();

        // Optimistically visible under a placeholder id.
        assert!(sync
            .projection()
            .people()
            .iter()
            .any(|view| view.id.starts_with("local-")));

        sync.commit(
            ticket,
            MutationOutcome::Person(person("42", "Ada", "Lovelace")),
        )
        .unwrap();

        assert!(!sync.has_pending());
        let view = sync.projection().person("42").unwrap();
        assert_eq!(view.last_name, "Lovelace");
        assert!(view.cars.is_empty());
        assert!(sync
            .projection()
            .people()
            .iter()
            .all(|view| !view.id.starts_with("local-")));
    }

    #[test]
    fn begin_abort_restores_projection_exactly() {
        let mut sync = hydrated();
        let before = sync.projection().clone();

        let ticket = sync
            .begin(Mutation::UpdateCar {
                id: "c1".into(),
                year: 2020,
                make: "Toyota".into(),
                model: "Corolla".into(),
                price: Decimal::from(45000),
                person_id: "2".into(),
            })
            .unwrap();
        assert_ne!(sync.projection(), &before);

        sync.abort(ticket).unwrap();
        assert_eq!(sync.projection(), &before);
        assert!(!sync.has_pending());
    }

    #[test]
    fn same_entity_mutation_is_refused_while_pending() {
        let mut sync = hydrated();
        let _ticket = sync
            .begin(Mutation::UpdatePerson {
                id: "1".into(),
                first_name: "William".into(),
                last_name: "Gates".into(),
            })
            .unwrap();

        let err = sync
            .begin(Mutation::DeletePerson { id: "1".into() })
            .unwrap_err();
        assert_eq!(
            err,
            CacheError::PendingMutation {
                key: "person:1".into()
            }
        );
    }

    #[test]
    fn independent_entities_interleave() {
        let mut sync = hydrated();
        let first = sync
            .begin(Mutation::UpdatePerson {
                id: "1".into(),
                first_name: "William".into(),
                last_name: "Gates".into(),
            })
            .unwrap();
        let second = sync
            .begin(Mutation::DeleteCar { id: "c2".into() })
            .unwrap();

        // Resolve out of submission order; each entity reconciles alone.
        sync.commit(second, MutationOutcome::Car(car("c2", "2", 60000)))
            .unwrap();
        sync.abort(first).unwrap();

        assert_eq!(sync.projection().person("1").unwrap().first_name, "Bill");
        assert!(sync.projection().car("c2").is_none());
        assert!(!sync.has_pending());
    }

    #[test]
    fn interleaved_rollback_preserves_other_optimistic_delta() {
        let mut sync = hydrated();
        let doomed = sync
            .begin(Mutation::UpdatePerson {
                id: "1".into(),
                first_name: "William".into(),
                last_name: "Gates".into(),
            })
            .unwrap();
        let kept = sync
            .begin(Mutation::UpdatePerson {
                id: "2".into(),
                first_name: "Steven".into(),
                last_name: "Jobs".into(),
            })
            .unwrap();

        sync.abort(doomed).unwrap();

        // The scoped undo restored person 1 without clobbering person 2.
        assert_eq!(sync.projection().person("1").unwrap().first_name, "Bill");
        assert_eq!(sync.projection().person("2").unwrap().first_name, "Steven");

        sync.commit(
            kept,
            MutationOutcome::Person(person("2", "Steven", "Jobs")),
        )
        .unwrap();
        assert!(!sync.has_pending());
    }

    #[test]
    fn commit_with_mismatched_outcome_is_rejected() {
        let mut sync = hydrated();
        let ticket = sync
            .begin(Mutation::DeleteCar { id: "c1".into() })
            .unwrap();

        let err = sync
            .commit(
                ticket,
                MutationOutcome::Person(person("1", "Bill", "Gates")),
            )
            .unwrap_err();
        assert!(matches!(err, CacheError::OutcomeMismatch { .. }));

        // Still pending; the mutation can be resolved properly.
        assert!(sync.has_pending());
    }

    #[test]
    fn unknown_ticket_is_rejected() {
        let mut sync = hydrated();
        let ticket = sync
            .begin(Mutation::DeleteCar { id: "c1".into() })
            .unwrap();
        sync.commit(ticket, MutationOutcome::Car(car("c1", "1", 40000)))
            .unwrap();

        let stale = Ticket {
            key: "car:c1".into(),
        };
        assert_eq!(sync.abort(stale).unwrap_err(), CacheError::UnknownTicket);
    }

    #[test]
    fn hydrate_is_refused_while_pending() {
        let mut sync = hydrated();
        let _ticket = sync
            .begin(Mutation::DeleteCar { id: "c1".into() })
            .unwrap();

        let err = sync.hydrate(Vec::new(), Vec::new()).unwrap_err();
        assert!(matches!(err, CacheError::PendingMutation { .. }));
    }

    #[test]
    fn add_car_rollback_leaves_projection_structurally_equal() {
        let mut sync = hydrated();
        let before = sync.projection().clone();

        let ticket = sync
            .begin(Mutation::AddCar {
                year: 2018,
                make: "Ford".into(),
                model: "Focus".into(),
                price: Decimal::from(35000),
                person_id: "1".into(),
            })
            .unwrap();
        assert_eq!(sync.projection().cars().len(), 3);

        sync.abort(ticket).unwrap();
        assert_eq!(sync.projection(), &before);
    }
}
