//! Client - the fixed operation contract presented to the UI layer.
//!
//! A client owns a registry handle and a synchronizer. Every mutation
//! runs the full optimistic cycle: apply the local delta, issue the
//! mutation to the registry, then reconcile the projection against the
//! confirmed record - or roll the delta back and re-raise the registry's
//! error. Queries are served from the local projection; `refetch` pulls
//! authoritative state back in.
//!
//! ## Example
//!
//! ```ignore
//! use motorpool::{Client, InMemoryRegistry};
//!
//! let mut client = Client::new(InMemoryRegistry::new())?;
//! let ada = client.add_person("Ada", "Lovelace")?;
//!
//! let view = client.get_person_with_cars(&ada.id)?;
//! assert!(view.cars.is_empty());
//! ```

use std::fmt;

use rust_decimal::Decimal;

#[cfg(feature = "emitter")]
use event_emitter_rs::EventEmitter;

use crate::cache::{CacheError, Mutation, MutationOutcome, Projection, Synchronizer, Ticket};
use crate::registry::{Car, Person, PersonWithCars, Registry, RegistryError};

/// Error type for client operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    Registry(RegistryError),
    Cache(CacheError),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::Registry(err) => write!(f, "registry error: {}", err),
            ClientError::Cache(err) => write!(f, "cache error: {}", err),
        }
    }
}

impl std::error::Error for ClientError {}

impl From<RegistryError> for ClientError {
    fn from(err: RegistryError) -> Self {
        ClientError::Registry(err)
    }
}

impl From<CacheError> for ClientError {
    fn from(err: CacheError) -> Self {
        ClientError::Cache(err)
    }
}

/// The operation surface the presentation layer calls.
pub struct Client<R: Registry> {
    registry: R,
    sync: Synchronizer,
    #[cfg(feature = "emitter")]
    emitter: EventEmitter,
}

impl<R: Registry> Client<R> {
    /// Create a client over a registry and hydrate the projection from
    /// its current state.
    pub fn new(registry: R) -> Result<Self, ClientError> {
        let mut client = Client {
            registry,
            sync: Synchronizer::new(),
            #[cfg(feature = "emitter")]
            emitter: EventEmitter::new(),
        };
        client.refetch()?;
        Ok(client)
    }

    /// The underlying registry handle.
    pub fn registry(&self) -> &R {
        &self.registry
    }

    /// The current local projection.
    pub fn projection(&self) -> &Projection {
        self.sync.projection()
    }

    /// Replace the local projection with authoritative registry state.
    pub fn refetch(&mut self) -> Result<(), ClientError> {
        let people = self.registry.people_with_cars()?;
        let cars = self.registry.cars()?;
        self.sync.hydrate(people, cars)?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Queries (served from the local projection)
    // ------------------------------------------------------------------

    /// Every cached person with their cars.
    pub fn list_people_with_cars(&self) -> Vec<PersonWithCars> {
        self.sync.projection().people().to_vec()
    }

    /// The cached flat car listing.
    pub fn list_cars(&self) -> Vec<Car> {
        self.sync.projection().cars().to_vec()
    }

    /// One cached person with their cars.
    pub fn get_person_with_cars(&self, id: &str) -> Result<PersonWithCars, ClientError> {
        self.sync
            .projection()
            .person(id)
            .cloned()
            .ok_or_else(|| {
                ClientError::Registry(RegistryError::NotFound {
                    collection: "people",
                    id: id.to_string(),
                })
            })
    }

    // ------------------------------------------------------------------
    // Mutations (optimistic apply -> registry -> commit or abort)
    // ------------------------------------------------------------------

    pub fn add_person(&mut self, first_name: &str, last_name: &str) -> Result<Person, ClientError> {
        let ticket = self.sync.begin(Mutation::AddPerson {
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
        })?;
        let person = self.resolve_person(ticket, self.registry.add_person(first_name, last_name))?;
        self.emit("PersonAdded", &person);
        Ok(person)
    }

    pub fn update_person(
        &mut self,
        id: &str,
        first_name: &str,
        last_name: &str,
    ) -> Result<Person, ClientError> {
        let ticket = self.sync.begin(Mutation::UpdatePerson {
            id: id.to_string(),
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
        })?;
        let person =
            self.resolve_person(ticket, self.registry.update_person(id, first_name, last_name))?;
        self.emit("PersonUpdated", &person);
        Ok(person)
    }

    /// Delete a person. The registry cascades to their cars, and the
    /// projection discards the person's materialized view along with the
    /// cascaded cars.
    pub fn delete_person(&mut self, id: &str) -> Result<Person, ClientError> {
        let ticket = self.sync.begin(Mutation::DeletePerson { id: id.to_string() })?;
        let person = self.resolve_person(ticket, self.registry.delete_person(id))?;
        self.emit("PersonDeleted", &person);
        Ok(person)
    }

    pub fn add_car(
        &mut self,
        year: i32,
        make: &str,
        model: &str,
        price: Decimal,
        person_id: &str,
    ) -> Result<Car, ClientError> {
        let ticket = self.sync.begin(Mutation::AddCar {
            year,
            make: make.to_string(),
            model: model.to_string(),
            price,
            person_id: person_id.to_string(),
        })?;
        let car = self.resolve_car(
            ticket,
            self.registry.add_car(year, make, model, price, person_id),
        )?;
        self.emit("CarAdded", &car);
        Ok(car)
    }

    pub fn update_car(
        &mut self,
        id: &str,
        year: i32,
        make: &str,
        model: &str,
        price: Decimal,
        person_id: &str,
    ) -> Result<Car, ClientError> {
        let ticket = self.sync.begin(Mutation::UpdateCar {
            id: id.to_string(),
            year,
            make: make.to_string(),
            model: model.to_string(),
            price,
            person_id: person_id.to_string(),
        })?;
        let car = self.resolve_car(
            ticket,
            self.registry
                .update_car(id, year, make, model, price, person_id),
        )?;
        self.emit("CarUpdated", &car);
        Ok(car)
    }

    pub fn delete_car(&mut self, id: &str) -> Result<Car, ClientError> {
        let ticket = self.sync.begin(Mutation::DeleteCar { id: id.to_string() })?;
        let car = self.resolve_car(ticket, self.registry.delete_car(id))?;
        self.emit("CarDeleted", &car);
        Ok(car)
    }

    // ------------------------------------------------------------------
    // Event subscription
    // ------------------------------------------------------------------

    /// Subscribe to confirmed-mutation events (`"PersonAdded"`,
    /// `"CarUpdated"`, ...). The handler receives the confirmed record as
    /// JSON. Returns the listener id.
    #[cfg(feature = "emitter")]
    pub fn on<F>(&mut self, event: &str, handler: F) -> String
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        self.emitter.on(event, handler)
    }

    fn resolve_person(
        &mut self,
        ticket: Ticket,
        result: Result<Person, RegistryError>,
    ) -> Result<Person, ClientError> {
        match result {
            Ok(person) => {
                self.sync
                    .commit(ticket, MutationOutcome::Person(person.clone()))?;
                Ok(person)
            }
            Err(err) => {
                self.sync.abort(ticket)?;
                Err(err.into())
            }
        }
    }

    fn resolve_car(
        &mut self,
        ticket: Ticket,
        result: Result<Car, RegistryError>,
    ) -> Result<Car, ClientError> {
        match result {
            Ok(car) => {
                self.sync.commit(ticket, MutationOutcome::Car(car.clone()))?;
                Ok(car)
            }
            Err(err) => {
                self.sync.abort(ticket)?;
                Err(err.into())
            }
        }
    }

    #[cfg(feature = "emitter")]
    fn emit<T: serde::Serialize>(&mut self, event: &str, payload: &T) {
        if let Ok(json) = serde_json::to_string(payload) {
            self.emitter.emit(event, json);
        }
    }

    #[cfg(not(feature = "emitter"))]
    fn emit<T: serde::Serialize>(&mut self, _event: &str, _payload: &T) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::InMemoryRegistry;

    fn client() -> Client<InMemoryRegistry> {
        Client::new(InMemoryRegistry::new()).unwrap()
    }

    #[test]
    fn add_person_round_trip() {
        let mut client = client();
        let ada = client.add_person("Ada", "Lovelace").unwrap();

        let view = client.get_person_with_cars(&ada.id).unwrap();
        assert_eq!(view.id, ada.id);
        assert_eq!(view.first_name, "Ada");
        assert_eq!(view.last_name, "Lovelace");
        assert!(view.cars.is_empty());
    }

    #[test]
    fn get_missing_person_is_not_found() {
        let client = client();
        let err = client.get_person_with_cars("missing").unwrap_err();
        assert!(matches!(
            err,
            ClientError::Registry(RegistryError::NotFound { .. })
        ));
    }

    #[test]
    fn add_car_appears_in_owner_view() {
        let mut client = client();
        let owner = client.add_person("Bill", "Gates").unwrap();
        let car = client
            .add_car(2019, "Toyota", "Corolla", Decimal::from(40000), &owner.id)
            .unwrap();

        let view = client.get_person_with_cars(&owner.id).unwrap();
        assert_eq!(view.cars.len(), 1);
        assert_eq!(view.cars[0].id, car.id);
        assert!(!car.id.starts_with("local-"));
    }

    #[test]
    fn cache_matches_registry_after_each_mutation() {
        let mut client = client();
        let a = client.add_person("Bill", "Gates").unwrap();
        let b = client.add_person("Steve", "Jobs").unwrap();
        let car = client
            .add_car(2019, "Acura", "MDX", Decimal::from(60000), &a.id)
            .unwrap();
        client
            .update_car(&car.id, 2020, "Acura", "MDX", Decimal::from(61000), &b.id)
            .unwrap();
        client.update_person(&a.id, "William", "Gates").unwrap();
        client.delete_car(&car.id).unwrap();

        assert_eq!(
            client.list_people_with_cars(),
            client.registry().people_with_cars().unwrap()
        );
        assert_eq!(client.list_cars(), client.registry().cars().unwrap());
    }

    #[test]
    fn delete_person_discards_view_and_cascaded_cars() {
        let mut client = client();
        let owner = client.add_person("Bill", "Gates").unwrap();
        let other = client.add_person("Steve", "Jobs").unwrap();
        client
            .add_car(2019, "Toyota", "Corolla", Decimal::from(40000), &owner.id)
            .unwrap();
        let kept = client
            .add_car(2019, "Acura", "MDX", Decimal::from(60000), &other.id)
            .unwrap();

        client.delete_person(&owner.id).unwrap();

        assert!(client.get_person_with_cars(&owner.id).is_err());
        let cars = client.list_cars();
        assert_eq!(cars.len(), 1);
        assert_eq!(cars[0].id, kept.id);
        assert_eq!(client.list_cars(), client.registry().cars().unwrap());
    }

    #[test]
    fn failed_mutation_rolls_back_and_reraises() {
        let registry = InMemoryRegistry::new();
        let mut client = Client::new(registry.clone()).unwrap();
        let owner = client.add_person("Bill", "Gates").unwrap();

        // Delete the person behind the cache's back, so the optimistic
        // delta applies locally but the registry refuses the mutation.
        registry.delete_person(&owner.id).unwrap();
        let before = client.projection().clone();

        let err = client
            .add_car(2019, "Toyota", "Corolla", Decimal::from(40000), &owner.id)
            .unwrap_err();
        assert!(matches!(
            err,
            ClientError::Registry(RegistryError::NotFound { .. })
        ));
        assert_eq!(client.projection(), &before);
    }

    #[test]
    fn reassignment_is_visible_in_both_views() {
        let mut client = client();
        let a = client.add_person("A", "A").unwrap();
        let b = client.add_person("B", "B").unwrap();
        let car = client
            .add_car(2019, "Acura", "MDX", Decimal::from(60000), &a.id)
            .unwrap();

        client
            .update_car(&car.id, 2020, "Acura", "MDX", Decimal::from(61000), &b.id)
            .unwrap();

        assert!(client
            .get_person_with_cars(&a.id)
            .unwrap()
            .cars
            .is_empty());
        let b_view = client.get_person_with_cars(&b.id).unwrap();
        assert_eq!(b_view.cars.len(), 1);
        assert_eq!(b_view.cars[0].price, Decimal::from(61000));
    }

    #[test]
    fn refetch_restores_projection_from_registry() {
        let registry = InMemoryRegistry::new();
        let mut client = Client::new(registry.clone()).unwrap();
        let owner = client.add_person("Bill", "Gates").unwrap();

        // A second writer mutates the registry; the projection is stale
        // until refetch.
        registry
            .add_car(2018, "Ford", "Focus", Decimal::from(35000), &owner.id)
            .unwrap();
        assert!(client
            .get_person_with_cars(&owner.id)
            .unwrap()
            .cars
            .is_empty());

        client.refetch().unwrap();
        assert_eq!(
            client.get_person_with_cars(&owner.id).unwrap().cars.len(),
            1
        );
    }

    #[cfg(feature = "emitter")]
    #[test]
    fn confirmed_mutations_emit_events() {
        use std::sync::{Arc, Mutex};

        let mut client = client();
        let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        client.on("PersonAdded", move |payload: String| {
            sink.lock().unwrap().push(payload);
        });

        let ada = client.add_person("Ada", "Lovelace").unwrap();

        let events = seen.lock().unwrap();
        assert_eq!(events.len(), 1);
        let payload: serde_json::Value = serde_json::from_str(&events[0]).unwrap();
        assert_eq!(payload["id"], serde_json::Value::String(ada.id.clone()));
        assert_eq!(payload["firstName"], "Ada");
    }
}
