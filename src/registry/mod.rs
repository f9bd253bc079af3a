//! Registry - Authoritative relational state for people and their cars.
//!
//! The registry owns the two collections and enforces referential
//! integrity: every car references an existing person, and deleting a
//! person cascades to the cars it owns. A failed mutation leaves the
//! collections exactly as they were.
//!
//! ## Example
//!
//! ```ignore
//! use motorpool::{InMemoryRegistry, Registry};
//! use rust_decimal::Decimal;
//!
//! let registry = InMemoryRegistry::new();
//! let ada = registry.add_person("Ada", "Lovelace")?;
//! registry.add_car(2019, "Toyota", "Corolla", Decimal::from(40000), &ada.id)?;
//!
//! let view = registry.person_with_cars(&ada.id)?;
//! assert_eq!(view.cars.len(), 1);
//! ```

mod in_memory;

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A registered person. Owns zero or more cars by reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
}

/// A registered car. `person_id` always references an existing person.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Car {
    pub id: String,
    pub year: i32,
    pub make: String,
    pub model: String,
    pub price: Decimal,
    pub person_id: String,
}

/// A car as it appears nested under its owner. The owning id is implied
/// by the list it sits in, so the shape omits it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnedCar {
    pub id: String,
    pub year: i32,
    pub make: String,
    pub model: String,
    pub price: Decimal,
}

impl From<Car> for OwnedCar {
    fn from(car: Car) -> Self {
        OwnedCar {
            id: car.id,
            year: car.year,
            make: car.make,
            model: car.model,
            price: car.price,
        }
    }
}

impl From<&Car> for OwnedCar {
    fn from(car: &Car) -> Self {
        car.clone().into()
    }
}

/// A person together with the live filter of cars that reference them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonWithCars {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub cars: Vec<OwnedCar>,
}

impl PersonWithCars {
    /// Assemble the denormalized shape from a person and their cars.
    pub fn new(person: Person, cars: Vec<OwnedCar>) -> Self {
        PersonWithCars {
            id: person.id,
            first_name: person.first_name,
            last_name: person.last_name,
            cars,
        }
    }
}

/// Error type for registry operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// A referenced identifier does not exist.
    NotFound { collection: &'static str, id: String },
    /// A car mutation would leave it pointing at a missing person.
    ForeignKeyViolation { car_id: String, person_id: String },
    /// Storage-level error.
    Storage(String),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::NotFound { collection, id } => {
                write!(f, "not found: {}:{}", collection, id)
            }
            RegistryError::ForeignKeyViolation { car_id, person_id } => {
                write!(
                    f,
                    "car {} cannot reference missing person {}",
                    car_id, person_id
                )
            }
            RegistryError::Storage(msg) => write!(f, "registry storage error: {}", msg),
        }
    }
}

impl std::error::Error for RegistryError {}

/// Authoritative storage seam for people and cars.
///
/// Mutations are synchronous and serialized: each one completes in full
/// (cascade effects included) before the next begins, and is immediately
/// visible to subsequent queries.
pub trait Registry: Send + Sync {
    /// All people, in insertion order.
    fn people(&self) -> Result<Vec<Person>, RegistryError>;

    /// All cars, in insertion order.
    fn cars(&self) -> Result<Vec<Car>, RegistryError>;

    /// Look up one person by id.
    fn person(&self, id: &str) -> Result<Person, RegistryError>;

    /// Register a person under a fresh identifier.
    fn add_person(&self, first_name: &str, last_name: &str) -> Result<Person, RegistryError>;

    /// Replace both name fields of an existing person.
    fn update_person(
        &self,
        id: &str,
        first_name: &str,
        last_name: &str,
    ) -> Result<Person, RegistryError>;

    /// Remove a person and every car they own. Returns the removed person.
    fn delete_person(&self, id: &str) -> Result<Person, RegistryError>;

    /// Register a car under a fresh identifier. The owner must exist.
    fn add_car(
        &self,
        year: i32,
        make: &str,
        model: &str,
        price: Decimal,
        person_id: &str,
    ) -> Result<Car, RegistryError>;

    /// Replace all fields of an existing car. Reassignment to a missing
    /// person is a `ForeignKeyViolation`.
    fn update_car(
        &self,
        id: &str,
        year: i32,
        make: &str,
        model: &str,
        price: Decimal,
        person_id: &str,
    ) -> Result<Car, RegistryError>;

    /// Remove a car. Returns the removed record.
    fn delete_car(&self, id: &str) -> Result<Car, RegistryError>;

    /// One person with the live filter of cars referencing them.
    ///
    /// The car list is computed from the car collection on every call,
    /// never stored redundantly.
    fn person_with_cars(&self, id: &str) -> Result<PersonWithCars, RegistryError> {
        let person = self.person(id)?;
        let cars = self
            .cars()?
            .into_iter()
            .filter(|car| car.person_id == person.id)
            .map(OwnedCar::from)
            .collect();
        Ok(PersonWithCars::new(person, cars))
    }

    /// Every person with their cars, in insertion order.
    fn people_with_cars(&self) -> Result<Vec<PersonWithCars>, RegistryError> {
        let cars = self.cars()?;
        Ok(self
            .people()?
            .into_iter()
            .map(|person| {
                let owned = cars
                    .iter()
                    .filter(|car| car.person_id == person.id)
                    .map(OwnedCar::from)
                    .collect();
                PersonWithCars::new(person, owned)
            })
            .collect())
    }
}

pub use in_memory::InMemoryRegistry;
