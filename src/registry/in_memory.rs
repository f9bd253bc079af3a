//! InMemoryRegistry - HashMap-backed registry for tests and single-process use.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use rust_decimal::Decimal;
use uuid::Uuid;

use super::{Car, Person, Registry, RegistryError};

/// Internal stored wrapper. The insertion sequence keeps listings in
/// insertion order despite the map-backed storage.
#[derive(Debug)]
struct Stored<T> {
    data: T,
    seq: u64,
}

#[derive(Debug)]
struct Tables {
    people: HashMap<String, Stored<Person>>,
    cars: HashMap<String, Stored<Car>>,
    next_seq: u64,
}

impl Tables {
    fn empty() -> Self {
        Tables {
            people: HashMap::new(),
            cars: HashMap::new(),
            next_seq: 1,
        }
    }

    fn next_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }
}

/// In-memory registry backed by HashMaps behind a single RwLock.
///
/// Clone-friendly via Arc: clones share storage. Every mutation holds the
/// write lock for its full duration, so cascade effects are never
/// partially observable.
#[derive(Clone, Debug)]
pub struct InMemoryRegistry {
    tables: Arc<RwLock<Tables>>,
}

impl Default for InMemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        InMemoryRegistry {
            tables: Arc::new(RwLock::new(Tables::empty())),
        }
    }

    /// Bulk-load a registry from existing records, e.g. seed data with
    /// caller-assigned ids. Rejects duplicate ids and cars referencing a
    /// missing person.
    pub fn with_records(people: Vec<Person>, cars: Vec<Car>) -> Result<Self, RegistryError> {
        let mut tables = Tables::empty();

        for person in people {
            let seq = tables.next_seq();
            let id = person.id.clone();
            if tables.people.insert(id.clone(), Stored { data: person, seq }).is_some() {
                return Err(RegistryError::Storage(format!("duplicate person id: {}", id)));
            }
        }

        for car in cars {
            if !tables.people.contains_key(&car.person_id) {
                return Err(RegistryError::ForeignKeyViolation {
                    car_id: car.id,
                    person_id: car.person_id,
                });
            }
            let seq = tables.next_seq();
            let id = car.id.clone();
            if tables.cars.insert(id.clone(), Stored { data: car, seq }).is_some() {
                return Err(RegistryError::Storage(format!("duplicate car id: {}", id)));
            }
        }

        Ok(InMemoryRegistry {
            tables: Arc::new(RwLock::new(tables)),
        })
    }

    fn fresh_id() -> String {
        Uuid::new_v4().to_string()
    }
}

fn in_order<T: Clone>(records: &HashMap<String, Stored<T>>) -> Vec<T> {
    let mut stored: Vec<&Stored<T>> = records.values().collect();
    stored.sort_by_key(|s| s.seq);
    stored.into_iter().map(|s| s.data.clone()).collect()
}

impl Registry for InMemoryRegistry {
    fn people(&self) -> Result<Vec<Person>, RegistryError> {
        let tables = self
            .tables
            .read()
            .map_err(|_| RegistryError::Storage("lock poisoned".into()))?;
        Ok(in_order(&tables.people))
    }

    fn cars(&self) -> Result<Vec<Car>, RegistryError> {
        let tables = self
            .tables
            .read()
            .map_err(|_| RegistryError::Storage("lock poisoned".into()))?;
        Ok(in_order(&tables.cars))
    }

    fn person(&self, id: &str) -> Result<Person, RegistryError> {
        let tables = self
            .tables
            .read()
            .map_err(|_| RegistryError::Storage("lock poisoned".into()))?;
        tables
            .people
            .get(id)
            .map(|s| s.data.clone())
            .ok_or_else(|| RegistryError::NotFound {
                collection: "people",
                id: id.to_string(),
            })
    }

    fn add_person(&self, first_name: &str, last_name: &str) -> Result<Person, RegistryError> {
        let mut tables = self
            .tables
            .write()
            .map_err(|_| RegistryError::Storage("lock poisoned".into()))?;

        let person = Person {
            id: Self::fresh_id(),
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
        };
        let seq = tables.next_seq();
        tables.people.insert(
            person.id.clone(),
            Stored {
                data: person.clone(),
                seq,
            },
        );
        Ok(person)
    }

    fn update_person(
        &self,
        id: &str,
        first_name: &str,
        last_name: &str,
    ) -> Result<Person, RegistryError> {
        let mut tables = self
            .tables
            .write()
            .map_err(|_| RegistryError::Storage("lock poisoned".into()))?;

        let stored = tables
            .people
            .get_mut(id)
            .ok_or_else(|| RegistryError::NotFound {
                collection: "people",
                id: id.to_string(),
            })?;
        stored.data.first_name = first_name.to_string();
        stored.data.last_name = last_name.to_string();
        Ok(stored.data.clone())
    }

    fn delete_person(&self, id: &str) -> Result<Person, RegistryError> {
        let mut tables = self
            .tables
            .write()
            .map_err(|_| RegistryError::Storage("lock poisoned".into()))?;

        let removed = tables
            .people
            .remove(id)
            .ok_or_else(|| RegistryError::NotFound {
                collection: "people",
                id: id.to_string(),
            })?;

        // Cascade: no car may keep referencing the removed person.
        tables.cars.retain(|_, stored| stored.data.person_id != id);

        Ok(removed.data)
    }

    fn add_car(
        &self,
        year: i32,
        make: &str,
        model: &str,
        price: Decimal,
        person_id: &str,
    ) -> Result<Car, RegistryError> {
        let mut tables = self
            .tables
            .write()
            .map_err(|_| RegistryError::Storage("lock poisoned".into()))?;

        if !tables.people.contains_key(person_id) {
            return Err(RegistryError::NotFound {
                collection: "people",
                id: person_id.to_string(),
            });
        }

        let car = Car {
            id: Self::fresh_id(),
            year,
            make: make.to_string(),
            model: model.to_string(),
            price,
            person_id: person_id.to_string(),
        };
        let seq = tables.next_seq();
        tables.cars.insert(
            car.id.clone(),
            Stored {
                data: car.clone(),
                seq,
            },
        );
        Ok(car)
    }

    fn update_car(
        &self,
        id: &str,
        year: i32,
        make: &str,
        model: &str,
        price: Decimal,
        person_id: &str,
    ) -> Result<Car, RegistryError> {
        let mut tables = self
            .tables
            .write()
            .map_err(|_| RegistryError::Storage("lock poisoned".into()))?;

        let Tables { people, cars, .. } = &mut *tables;
        let stored = cars.get_mut(id).ok_or_else(|| RegistryError::NotFound {
            collection: "cars",
            id: id.to_string(),
        })?;
        if !people.contains_key(person_id) {
            return Err(RegistryError::ForeignKeyViolation {
                car_id: id.to_string(),
                person_id: person_id.to_string(),
            });
        }

        stored.data.year = year;
        stored.data.make = make.to_string();
        stored.data.model = model.to_string();
        stored.data.price = price;
        stored.data.person_id = person_id.to_string();
        Ok(stored.data.clone())
    }

    fn delete_car(&self, id: &str) -> Result<Car, RegistryError> {
        let mut tables = self
            .tables
            .write()
            .map_err(|_| RegistryError::Storage("lock poisoned".into()))?;

        tables
            .cars
            .remove(id)
            .map(|s| s.data)
            .ok_or_else(|| RegistryError::NotFound {
                collection: "cars",
                id: id.to_string(),
            })
    }
}
