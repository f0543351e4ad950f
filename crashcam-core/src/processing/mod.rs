pub mod concat;
pub mod container;
pub mod readiness;
pub mod ring_buffer;
