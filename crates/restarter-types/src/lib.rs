//! Common types used throughout `restarter`.
//!
//! This crate holds the data model for the single resource kind the
//! Restarter service persists, together with its JSON wire form.

mod resource;

pub use resource::{LabelInput, Resource, ResourceId};
