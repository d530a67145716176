//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises a slice of the pipeline
//! against mock adapters.  All tests run on the host with no real
//! hardware required.

mod bus_pipeline_tests;
mod mock_hw;
mod ring_pipeline_tests;
