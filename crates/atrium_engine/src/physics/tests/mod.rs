//! Cross-module integration tests for the physics layer
