// Copyright 2024 Saptak Santra
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Error types

use std::fmt;

/// ECS error type
#[derive(Debug, Clone)]
pub enum EcsError {
    /// Entity not found (stale or never issued handle)
    EntityNotFound,

    /// Component not found
    ComponentNotFound,

    /// Invalid entity ID (the reserved invalid handle)
    InvalidEntity,

    /// System not found
    SystemNotFound,

    /// Hierarchy operation error (cycle, self-attach, etc.)
    HierarchyError(String),

    /// Configuration rejected during validation or parsing
    ConfigError(String),

    /// Spawn error with detailed context
    SpawnError(SpawnError),
}

/// Detailed spawn error types
#[derive(Debug, Clone)]
pub enum SpawnError {
    /// Handle index space exhausted
    EntityCapacityExhausted { attempted: u64, capacity: u64 },
}

impl fmt::Display for SpawnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpawnError::EntityCapacityExhausted { attempted, capacity } => {
                write!(f, "Entity capacity exhausted: attempted to allocate index {attempted}, max is {capacity}")
            }
        }
    }
}

impl fmt::Display for EcsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EcsError::EntityNotFound => write!(f, "Entity not found"),
            EcsError::ComponentNotFound => write!(f, "Component not found"),
            EcsError::InvalidEntity => write!(f, "Invalid entity ID"),
            EcsError::SystemNotFound => write!(f, "System not found"),
            EcsError::HierarchyError(msg) => write!(f, "Hierarchy error: {msg}"),
            EcsError::ConfigError(msg) => write!(f, "Config error: {msg}"),
            EcsError::SpawnError(spawn_err) => write!(f, "Spawn error: {spawn_err}"),
        }
    }
}

impl std::error::Error for EcsError {}

impl From<SpawnError> for EcsError {
    fn from(err: SpawnError) -> Self {
        EcsError::SpawnError(err)
    }
}

impl From<serde_json::Error> for EcsError {
    fn from(err: serde_json::Error) -> Self {
        EcsError::ConfigError(err.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, EcsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_error_converts() {
        let err: EcsError = SpawnError::EntityCapacityExhausted {
            attempted: 10,
            capacity: 9,
        }
        .into();
        assert!(matches!(err, EcsError::SpawnError(_)));
        assert_eq!(
            err.to_string(),
            "Spawn error: Entity capacity exhausted: attempted to allocate index 10, max is 9"
        );
    }

    #[test]
    fn test_hierarchy_error_message() {
        let err = EcsError::HierarchyError("cycle".to_string());
        assert_eq!(err.to_string(), "Hierarchy error: cycle");
    }
}
