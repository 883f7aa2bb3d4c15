pub mod bluetooth;
pub mod config;
pub mod error;
pub mod events;
pub mod input;
pub mod presentation;
pub mod session;
pub mod sound;
pub mod timers;
pub mod tasks {
    pub mod control_socket;
    pub mod controller;
}
