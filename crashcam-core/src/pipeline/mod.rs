pub mod handoff;
pub mod persistor;
