//! API middleware stack.
//!
//! Execution order (outermost → innermost):
//! 1. Auth: session token or login bypass, injects `UserContext`
//! 2. Audit: logs method, path, user and status

pub mod audit;
pub mod auth;
