/// Utilitaires transverses de gestion de process externes.
pub mod process;
