//! Particle generators: per-generator spawn, aging and movement.

pub mod generator_data;
pub mod generator_operations;

pub use generator_data::{
    Generator, GeneratorDef, GeneratorFlags, Particle, StageDef, StageFlags, TypeFilter,
};
pub use generator_operations::{generator_think, presimulate, GenContext};
