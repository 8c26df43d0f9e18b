pub mod from_engine;
pub mod to_engine;
