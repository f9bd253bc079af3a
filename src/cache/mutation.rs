//! Mutation - the six mutation kinds and their projection effects.
//!
//! Each kind has a statically known optimistic effect, reconciliation
//! effect, and undo record, applied through exhaustive matches rather
//! than field-name dispatch.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::projection::Projection;
use crate::registry::{Car, OwnedCar, Person, PersonWithCars};

/// A mutation the cache can apply optimistically and reconcile.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    AddPerson {
        first_name: String,
        last_name: String,
    },
    UpdatePerson {
        id: String,
        first_name: String,
        last_name: String,
    },
    DeletePerson {
        id: String,
    },
    AddCar {
        year: i32,
        make: String,
        model: String,
        price: Decimal,
        person_id: String,
    },
    UpdateCar {
        id: String,
        year: i32,
        make: String,
        model: String,
        price: Decimal,
        person_id: String,
    },
    DeleteCar {
        id: String,
    },
}

/// The registry-confirmed result of a mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationOutcome {
    Person(Person),
    Car(Car),
}

/// The entity a mutation targets, used to serialize same-entity
/// submissions. Adds target the entity about to exist, addressed by a
/// local placeholder id.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Target {
    NewPerson,
    NewCar,
    Person(String),
    Car(String),
}

/// Scoped pre-image captured at `begin` and applied at `abort`. Restores
/// exactly the entries the optimistic delta touched, so rollbacks for
/// independent entities compose.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) enum UndoRecord {
    None,
    RemovePerson {
        id: String,
    },
    RestorePersonNames {
        id: String,
        first_name: String,
        last_name: String,
    },
    ReinsertPerson {
        index: usize,
        view: PersonWithCars,
        cars: Vec<(usize, Car)>,
    },
    RemoveCar {
        id: String,
    },
    RestoreCar {
        car: Car,
        owned_index: Option<usize>,
    },
    ReinsertCar {
        flat_index: usize,
        car: Car,
        owned_index: Option<usize>,
    },
}

impl Mutation {
    pub(crate) fn target(&self) -> Target {
        match self {
            Mutation::AddPerson { .. } => Target::NewPerson,
            Mutation::UpdatePerson { id, .. } | Mutation::DeletePerson { id } => {
                Target::Person(id.clone())
            }
            Mutation::AddCar { .. } => Target::NewCar,
            Mutation::UpdateCar { id, .. } | Mutation::DeleteCar { id } => Target::Car(id.clone()),
        }
    }

    pub(crate) fn matches(&self, outcome: &MutationOutcome) -> bool {
        matches!(
            (self, outcome),
            (
                Mutation::AddPerson { .. }
                    | Mutation::UpdatePerson { .. }
                    | Mutation::DeletePerson { .. },
                MutationOutcome::Person(_)
            ) | (
                Mutation::AddCar { .. } | Mutation::UpdateCar { .. } | Mutation::DeleteCar { .. },
                MutationOutcome::Car(_)
            )
        )
    }

    /// Apply the optimistic delta for this mutation, returning the undo
    /// record that restores the pre-mutation projection.
    ///
    /// `placeholder` is the locally assigned id for add mutations.
    /// Mutations referencing an entity the projection does not hold fail
    /// closed: no delta, `UndoRecord::None`.
    pub(crate) fn apply_optimistic(
        &self,
        projection: &mut Projection,
        placeholder: Option<&str>,
    ) -> UndoRecord {
        match self {
            Mutation::AddPerson {
                first_name,
                last_name,
            } => {
                let id = match placeholder {
                    Some(local) => local.to_string(),
                    None => return UndoRecord::None,
                };
                projection.push_person(PersonWithCars {
                    id: id.clone(),
                    first_name: first_name.clone(),
                    last_name: last_name.clone(),
                    cars: Vec::new(),
                });
                UndoRecord::RemovePerson { id }
            }
            Mutation::UpdatePerson {
                id,
                first_name,
                last_name,
            } => match projection.person_mut(id) {
                Some(view) => {
                    let undo = UndoRecord::RestorePersonNames {
                        id: id.clone(),
                        first_name: view.first_name.clone(),
                        last_name: view.last_name.clone(),
                    };
                    view.first_name = first_name.clone();
                    view.last_name = last_name.clone();
                    undo
                }
                None => UndoRecord::None,
            },
            Mutation::DeletePerson { id } => match projection.remove_person(id) {
                Some((index, view)) => {
                    let cars = projection.drain_cars_of(id);
                    UndoRecord::ReinsertPerson { index, view, cars }
                }
                None => UndoRecord::None,
            },
            Mutation::AddCar {
                year,
                make,
                model,
                price,
                person_id,
            } => {
                let id = match placeholder {
                    Some(local) => local.to_string(),
                    None => return UndoRecord::None,
                };
                if projection.person_index(person_id).is_none() {
                    return UndoRecord::None;
                }
                let car = Car {
                    id: id.clone(),
                    year: *year,
                    make: make.clone(),
                    model: model.clone(),
                    price: *price,
                    person_id: person_id.clone(),
                };
                projection.insert_owned(person_id, None, OwnedCar::from(&car));
                projection.push_car(car);
                UndoRecord::RemoveCar { id }
            }
            Mutation::UpdateCar {
                id,
                year,
                make,
                model,
                price,
                person_id,
            } => {
                let old = match projection.car(id) {
                    Some(car) => car.clone(),
                    None => return UndoRecord::None,
                };
                let owned_index = projection.owned_position(id).map(|(_, ci)| ci);
                let updated = Car {
                    id: id.clone(),
                    year: *year,
                    make: make.clone(),
                    model: model.clone(),
                    price: *price,
                    person_id: person_id.clone(),
                };
                projection.apply_confirmed_car(id, &updated);
                UndoRecord::RestoreCar {
                    car: old,
                    owned_index,
                }
            }
            Mutation::DeleteCar { id } => match projection.remove_flat(id) {
                Some((flat_index, car)) => {
                    let owned_index = projection.remove_owned(id).map(|(_, ci)| ci);
                    UndoRecord::ReinsertCar {
                        flat_index,
                        car,
                        owned_index,
                    }
                }
                None => UndoRecord::None,
            },
        }
    }

    /// Reconcile the optimistic delta against the registry-confirmed
    /// record: swap placeholder identities for server-assigned ones,
    /// overwrite optimistic guesses with confirmed field values, and
    /// repair every denormalized view the entity touches.
    pub(crate) fn reconcile(
        &self,
        projection: &mut Projection,
        placeholder: Option<&str>,
        outcome: &MutationOutcome,
    ) {
        match (self, outcome) {
            (Mutation::AddPerson { .. }, MutationOutcome::Person(person)) => {
                if let Some(local_id) = placeholder {
                    projection.confirm_person(local_id, person);
                }
            }
            (Mutation::UpdatePerson { .. }, MutationOutcome::Person(person)) => {
                if let Some(view) = projection.person_mut(&person.id) {
                    view.first_name = person.first_name.clone();
                    view.last_name = person.last_name.clone();
                }
            }
            (Mutation::DeletePerson { .. }, MutationOutcome::Person(_)) => {
                // The optimistic delta already discarded the view and its
                // cars; confirmation adds nothing.
            }
            (Mutation::AddCar { .. }, MutationOutcome::Car(car)) => {
                if let Some(local_id) = placeholder {
                    projection.apply_confirmed_car(local_id, car);
                }
            }
            (Mutation::UpdateCar { .. }, MutationOutcome::Car(car)) => {
                projection.apply_confirmed_car(&car.id, car);
            }
            (Mutation::DeleteCar { .. }, MutationOutcome::Car(_)) => {}
            // Kind mismatches are rejected before reconciliation.
            _ => {}
        }
    }
}

impl UndoRecord {
    /// Apply the undo, restoring the projection entries the optimistic
    /// delta touched, including their original positions.
    pub(crate) fn apply(self, projection: &mut Projection) {
        match self {
            UndoRecord::None => {}
            UndoRecord::RemovePerson { id } => {
                projection.remove_person(&id);
            }
            UndoRecord::RestorePersonNames {
                id,
                first_name,
                last_name,
            } => {
                if let Some(view) = projection.person_mut(&id) {
                    view.first_name = first_name;
                    view.last_name = last_name;
                }
            }
            UndoRecord::ReinsertPerson { index, view, cars } => {
                projection.insert_person(index, view);
                projection.restore_cars(cars);
            }
            UndoRecord::RemoveCar { id } => {
                projection.remove_flat(&id);
                projection.remove_owned(&id);
            }
            UndoRecord::RestoreCar { car, owned_index } => {
                projection.restore_car(car, owned_index);
            }
            UndoRecord::ReinsertCar {
                flat_index,
                car,
                owned_index,
            } => {
                let owner = car.person_id.clone();
                let owned = OwnedCar::from(&car);
                projection.insert_flat(flat_index, car);
                if let Some(index) = owned_index {
                    projection.insert_owned(&owner, Some(index), owned);
                }
            }
        }
    }
}
