//! Purpose: Small numeric demonstrations carried over from the teaching scripts.
//! Exports: `gears` (gear ratio kinematics), `fatigue` (S-N damage accumulation + timing).
//! Role: Library functions printed by `notekeep demo`; no shared state with the notes API.
pub mod fatigue;
pub mod gears;
