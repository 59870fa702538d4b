//! Controller-translation bridge: ingests DualSense input over
//! Bluetooth/USB and presents a DualShock 3 to a PlayStation 3 through a
//! Linux USB gadget, translating input, output, and lifecycle between
//! the two ecosystems.
pub mod bluetooth;
pub mod cli;
pub mod config;
pub mod constants;
pub mod drivers;
pub mod input;
pub mod lightbar;
pub mod output;
pub mod profile;
pub mod state;
pub mod target;
