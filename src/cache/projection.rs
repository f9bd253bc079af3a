//! Projection - the client-local denormalized mirror of registry state.

use crate::registry::{Car, OwnedCar, Person, PersonWithCars};

/// The client-local mirror of registry state: every person with their
/// materialized car list, plus the flat car listing.
///
/// The people views are denormalized. Reconciliation repairs them so
/// that after every confirmed mutation a view's car list equals the flat
/// listing filtered by its owner - no duplicates, no omissions, no stale
/// entries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Projection {
    people: Vec<PersonWithCars>,
    cars: Vec<Car>,
}

impl Projection {
    /// Create an empty projection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a projection from fetched registry state.
    pub fn from_parts(people: Vec<PersonWithCars>, cars: Vec<Car>) -> Self {
        Projection { people, cars }
    }

    /// The cached people views, in insertion order.
    pub fn people(&self) -> &[PersonWithCars] {
        &self.people
    }

    /// The cached flat car listing, in insertion order.
    pub fn cars(&self) -> &[Car] {
        &self.cars
    }

    /// Look up a cached person view.
    pub fn person(&self, id: &str) -> Option<&PersonWithCars> {
        self.people.iter().find(|view| view.id == id)
    }

    /// Look up a cached car record.
    pub fn car(&self, id: &str) -> Option<&Car> {
        self.cars.iter().find(|car| car.id == id)
    }

    // ------------------------------------------------------------------
    // People primitives
    // ------------------------------------------------------------------

    pub(crate) fn person_index(&self, id: &str) -> Option<usize> {
        self.people.iter().position(|view| view.id == id)
    }

    pub(crate) fn person_mut(&mut self, id: &str) -> Option<&mut PersonWithCars> {
        self.people.iter_mut().find(|view| view.id == id)
    }

    pub(crate) fn push_person(&mut self, view: PersonWithCars) {
        self.people.push(view);
    }

    pub(crate) fn insert_person(&mut self, index: usize, view: PersonWithCars) {
        let index = index.min(self.people.len());
        self.people.insert(index, view);
    }

    pub(crate) fn remove_person(&mut self, id: &str) -> Option<(usize, PersonWithCars)> {
        let index = self.person_index(id)?;
        Some((index, self.people.remove(index)))
    }

    /// Swap a placeholder view's identity for the confirmed record.
    pub(crate) fn confirm_person(&mut self, local_id: &str, confirmed: &Person) {
        if let Some(view) = self.person_mut(local_id) {
            view.id = confirmed.id.clone();
            view.first_name = confirmed.first_name.clone();
            view.last_name = confirmed.last_name.clone();
        }
    }

    // ------------------------------------------------------------------
    // Flat car-list primitives
    // ------------------------------------------------------------------

    pub(crate) fn flat_index(&self, id: &str) -> Option<usize> {
        self.cars.iter().position(|car| car.id == id)
    }

    pub(crate) fn push_car(&mut self, car: Car) {
        self.cars.push(car);
    }

    pub(crate) fn insert_flat(&mut self, index: usize, car: Car) {
        let index = index.min(self.cars.len());
        self.cars.insert(index, car);
    }

    pub(crate) fn remove_flat(&mut self, id: &str) -> Option<(usize, Car)> {
        let index = self.flat_index(id)?;
        Some((index, self.cars.remove(index)))
    }

    /// Remove every flat car owned by `person_id`, keeping the original
    /// indices so a rollback can reinsert them in place.
    pub(crate) fn drain_cars_of(&mut self, person_id: &str) -> Vec<(usize, Car)> {
        let mut removed = Vec::new();
        let mut kept = Vec::with_capacity(self.cars.len());
        for (index, car) in self.cars.drain(..).enumerate() {
            if car.person_id == person_id {
                removed.push((index, car));
            } else {
                kept.push(car);
            }
        }
        self.cars = kept;
        removed
    }

    /// Reinsert cars removed by `drain_cars_of`, ascending by original
    /// index, restoring the original ordering.
    pub(crate) fn restore_cars(&mut self, removed: Vec<(usize, Car)>) {
        for (index, car) in removed {
            self.insert_flat(index, car);
        }
    }

    // ------------------------------------------------------------------
    // Denormalized view primitives
    // ------------------------------------------------------------------

    /// Position of a car inside whichever owner view holds it.
    pub(crate) fn owned_position(&self, car_id: &str) -> Option<(usize, usize)> {
        self.people.iter().enumerate().find_map(|(pi, view)| {
            view.cars
                .iter()
                .position(|owned| owned.id == car_id)
                .map(|ci| (pi, ci))
        })
    }

    /// Remove a car from whichever owner view holds it. Returns the owner
    /// id and the position the entry sat at.
    pub(crate) fn remove_owned(&mut self, car_id: &str) -> Option<(String, usize)> {
        let (pi, ci) = self.owned_position(car_id)?;
        self.people[pi].cars.remove(ci);
        Some((self.people[pi].id.clone(), ci))
    }

    /// Insert a car entry into its owner's view, appending when no
    /// position is given. Returns false when the owner is not cached.
    pub(crate) fn insert_owned(
        &mut self,
        person_id: &str,
        position: Option<usize>,
        owned: OwnedCar,
    ) -> bool {
        match self.person_mut(person_id) {
            Some(view) => {
                match position {
                    Some(index) => {
                        let index = index.min(view.cars.len());
                        view.cars.insert(index, owned);
                    }
                    None => view.cars.push(owned),
                }
                true
            }
            None => false,
        }
    }

    /// Where a car belongs inside its owner's view: after every other car
    /// the owner holds earlier in the flat listing. Keeps view order and
    /// flat order agreeing after a move.
    fn owned_insert_position(&self, person_id: &str, car_id: &str) -> usize {
        self.cars
            .iter()
            .take_while(|car| car.id != car_id)
            .filter(|car| car.person_id == person_id)
            .count()
    }

    /// Overwrite the car known locally as `local_id` with the confirmed
    /// record, moving its view entry when ownership changed. The car
    /// keeps exactly one occurrence across all owners' views.
    pub(crate) fn apply_confirmed_car(&mut self, local_id: &str, confirmed: &Car) {
        let flat = match self.flat_index(local_id) {
            Some(index) => index,
            None => return, // unknown locally: fail closed
        };
        self.cars[flat] = confirmed.clone();

        let target = self.person_index(&confirmed.person_id);
        match self.owned_position(local_id) {
            Some((pi, ci)) if Some(pi) == target => {
                self.people[pi].cars[ci] = OwnedCar::from(confirmed);
            }
            Some((pi, ci)) => {
                self.people[pi].cars.remove(ci);
                if target.is_some() {
                    let position = self.owned_insert_position(&confirmed.person_id, &confirmed.id);
                    self.insert_owned(
                        &confirmed.person_id,
                        Some(position),
                        OwnedCar::from(confirmed),
                    );
                }
            }
            None => {
                if target.is_some() {
                    let position = self.owned_insert_position(&confirmed.person_id, &confirmed.id);
                    self.insert_owned(
                        &confirmed.person_id,
                        Some(position),
                        OwnedCar::from(confirmed),
                    );
                }
            }
        }
    }

    /// Put a previously captured car record back: flat entry restored in
    /// place, view entry moved back to its old owner and position.
    pub(crate) fn restore_car(&mut self, car: Car, owned_index: Option<usize>) {
        match self.flat_index(&car.id) {
            Some(index) => self.cars[index] = car.clone(),
            None => self.cars.push(car.clone()),
        }
        self.remove_owned(&car.id);
        if let Some(index) = owned_index {
            self.insert_owned(&car.person_id, Some(index), OwnedCar::from(&car));
        }
    }
}
