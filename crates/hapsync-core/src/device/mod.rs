//! Remote actuation device control
//!
//! The device plays a hosted motion script against its own clock; the client
//! uploads the script, switches the device into scripted-playback mode, and
//! issues the start/correct/stop commands the coordinator needs.

pub mod client;

pub use client::{ApiGeneration, DeviceControl, DeviceError, HttpDeviceClient};
