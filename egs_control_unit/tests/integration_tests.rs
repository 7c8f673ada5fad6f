//! Integration tests for the EGS Control Unit.
//!
//! Each test brings up the full stack on the `simulation` HAL backend:
//! driver → calibration → controller → cycle runner, and drives the
//! simulated gearbox through its plant handle.

mod integration;
