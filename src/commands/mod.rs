/// Commandes d'état et de relance du backend.
pub mod backend;
/// Commandes de diagnostic: rapport système, journaux, runtime Java.
pub mod diagnostics;
