//! Entrypoint de la bibliothèque du shell desktop GestoTeam.
//!
//! Le coeur (résolution du runtime Java, supervision du backend, journal,
//! cycle de vie) compile et se teste sans Tauri. La feature `desktop` ajoute
//! la fenêtre, les plugins et les commandes IPC, puis délègue à `app::run()`.

pub mod backend;
pub mod config;
pub mod diagnostics;
pub mod lifecycle;
pub mod runtime;
pub mod utils;

#[cfg(feature = "desktop")]
mod app;
#[cfg(feature = "desktop")]
mod commands;

/// Lance l'application Tauri.
#[cfg(feature = "desktop")]
pub fn run() {
    app::run();
}
