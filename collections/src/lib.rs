//! Small fixed- and growable-capacity collections used to back the engine's
//! arenas without reaching for a generic `HashMap<K, Box<V>>` everywhere.

pub mod ring;
pub mod slab;
