//! Integration test harness for `tablebp-core`; see `tests/`.
