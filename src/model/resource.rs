//! # Resources: named units under mutual exclusion.
//!
//! A [`Resource`] admits at most one started task at a time. [`Resource::acquire`]
//! and [`Resource::release`] are the only legal transitions; the controller
//! persists the resource after each one.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::store::Document;

/// Allocation status of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceStatus {
    /// No started task holds the resource.
    Free,
    /// A started task holds the resource.
    Locked,
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResourceStatus::Free => "free",
            ResourceStatus::Locked => "locked",
        })
    }
}

/// A named unit required by tasks, managed by the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    /// Resource name; primary key.
    #[serde(rename = "_key")]
    pub name: String,
    /// Current allocation status.
    pub status: ResourceStatus,
}

impl Resource {
    /// Creates a free resource with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: ResourceStatus::Free,
        }
    }

    /// Puts the resource in the locked state.
    ///
    /// Returns `false` if it was already locked.
    pub fn acquire(&mut self) -> bool {
        if self.status == ResourceStatus::Locked {
            return false;
        }
        self.status = ResourceStatus::Locked;
        true
    }

    /// Puts the resource back in the free state.
    ///
    /// Returns `false` if it was already free.
    pub fn release(&mut self) -> bool {
        if self.status == ResourceStatus::Free {
            return false;
        }
        self.status = ResourceStatus::Free;
        true
    }
}

impl Document for Resource {
    const COLLECTION: &'static str = "resources";

    fn key(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn conflict_patch(&self) -> Value {
        serde_json::json!({ "status": self.status })
    }
}
