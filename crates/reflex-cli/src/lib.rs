//! Reflex CLI library: command implementations shared by the `reflex`
//! binary and its integration tests.

pub mod commands;
