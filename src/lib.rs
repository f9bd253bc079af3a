mod cache;
mod client;
mod registry;

pub use cache::{CacheError, Mutation, MutationOutcome, Projection, Synchronizer, Ticket};
pub use client::{Client, ClientError};
pub use registry::{
    Car, InMemoryRegistry, OwnedCar, Person, PersonWithCars, Registry, RegistryError,
};

// Re-export the EventEmitter from the event_emitter_rs crate
#[cfg(feature = "emitter")]
pub use event_emitter_rs::EventEmitter;
