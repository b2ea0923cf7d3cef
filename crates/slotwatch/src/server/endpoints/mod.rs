pub mod reconcile;
pub mod roster;
pub mod status;
