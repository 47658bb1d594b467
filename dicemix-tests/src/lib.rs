//! End-to-end tests of DiceMix sessions, see `tests/`
