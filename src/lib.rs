//! riotbot — scripted onboarding tutorial for chat rooms.

pub mod channels;
pub mod config;
pub mod error;
pub mod tutorial;
