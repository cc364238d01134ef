//! Standard exit codes for CLI operations
//!
//! These exit codes follow Unix conventions and sysexits.h where applicable.

#![allow(dead_code)]

/// Success - every diff was produced
pub const SUCCESS: i32 = 0;

/// General error - unspecified failure, timeout, or partial failure
pub const ERROR: i32 = 1;

/// Input error - unreadable or unparseable manifests
pub const INPUT_ERROR: i32 = 2;

/// Resolution error - composition, revision, XRD or function lookup failed
pub const RESOLUTION_ERROR: i32 = 3;

/// Render error - the external function pipeline failed
pub const RENDER_ERROR: i32 = 4;

/// Apply error - dry-run apply rejected by the apiserver
pub const APPLY_ERROR: i32 = 5;

/// Usage error - invalid arguments or options (following sysexits.h convention)
pub const USAGE_ERROR: i32 = 64;
