//! Test suites for the relay's chat behaviour.

mod support;
